//! Helper functions and macros

use core::fmt;

use num_traits::{PrimInt, FromBytes};

/// Convert `v` from 1-based to 0-based, clamping the result with `cap`
///
/// # Examples
///
/// ```
/// # const fn b0(v: usize, cap: usize) -> usize {
/// #     let v = v.saturating_sub(1);
/// #     if v < cap { v } else { cap }
/// # }
///
/// assert_eq!(b0(1, 10), 0);   // 1-based 1 -> 0-based 0
/// assert_eq!(b0(5, 10), 4);   // 1-based 5 -> 0-based 4
/// assert_eq!(b0(0, 10), 0);   // saturating_sub prevents underflow; 0 saturates to 0
/// assert_eq!(b0(15, 10), 10); // clamped to cap = 10
/// ```
pub const fn b0(v: usize, cap: usize) -> usize {
    let v = v.saturating_sub(1);
    if v < cap { v } else { cap }
}

#[track_caller]
#[inline(always)]
pub fn le_bytes_into_int<T>(bytes: &[u8]) -> T
where
    T: PrimInt + FromBytes,
    <T as FromBytes>::Bytes: Sized + for<'a> TryFrom<&'a [u8]>,
    for<'a> <<T as FromBytes>::Bytes as TryFrom<&'a [u8]>>::Error: fmt::Debug,
{
    let array: <T as FromBytes>::Bytes = bytes.try_into().expect("wrong length");
    T::from_le_bytes(&array)
}

// Check if v fits into 12-bits signed integer (i12)
#[inline(always)]
pub const fn fits_into_12_bits(v: i64) -> bool {
    const BOUND: i64 = 1 << (12 - 1);
    v >= -BOUND && v < BOUND
}

// Check if v fits into 32-bits signed integer (i32)
#[inline(always)]
pub const fn fits_into_32_bits(v: i64) -> bool {
    v >= i32::MIN as i64 && v <= i32::MAX as i64
}

#[inline(always)]
pub const fn align_up(v: u64, align: u64) -> u64 {
    debug_assert!(align.is_power_of_two());
    (v + align - 1) & !(align - 1)
}

#[doc(hidden)]
macro_rules! debug_from_display {
    ($type: ty, newline) => {
        const _: fn() = || {
            fn assert_impl_display<T: std::fmt::Display>() {}
            assert_impl_display::<$type>();
        };

        impl std::fmt::Debug for $type {
            #[inline(always)]
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                writeln!(f)?;
                std::fmt::Display::fmt(self, f)
            }
        }
    };
}

// Generates `$no_at_name(..)` that forwards to `$name_at(section, ..)` with the current section
macro_rules! with_no_at {
    (
        $no_at_name: ident,
        $(#[$meta:meta])*
        pub fn $name_at:ident
        $(<$($generics:tt),*>)?
        (
            &mut $self:ident,
            $section:ident: $section_type:ty $(, $arg:ident: $ty:ty $(,)?)*
        ) $(-> $ret:ty)? $body:block
    ) => {
        $(#[$meta])*
        pub fn $name_at
        $(<$($generics),*>)?
        (
            &mut $self, $section: $section_type $(, $arg: $ty)*
        )
        $(-> $ret)?
        $body

        $(#[$meta])*
        #[track_caller]
        #[inline(always)]
        #[allow(unused_attributes)]
        pub fn $no_at_name
        $(<$($generics),*>)?
        (&mut $self $(, $arg: $ty)*)
        $(-> $ret)?
        {
            let $section = $self.curr_section();
            $self.$name_at($section $(, $arg)*)
        }
    };
}
