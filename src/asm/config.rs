//! Emission session configuration and code-cache bounds

use crate::util::misc;
use crate::materialize::{self, Strategy};

/// Absolute bounds `[low, high)` of the code cache the emitted code will live in.
#[derive(Eq, Hash, Copy, Clone, Debug, PartialEq)]
pub struct CodeCacheBounds {
    pub low: u64,
    pub high: u64,
}

impl CodeCacheBounds {
    #[track_caller]
    #[inline(always)]
    pub const fn new(low: u64, high: u64) -> Self {
        assert!(low <= high, "code cache bounds are reversed");
        Self { low, high }
    }

    #[inline(always)]
    pub const fn size(&self) -> u64 {
        self.high - self.low
    }

    #[inline(always)]
    pub const fn contains(&self, address: u64) -> bool {
        address >= self.low && address < self.high
    }

    /// Is the cache too large for a `jal` to reach every address in it from every other?
    #[inline(always)]
    pub const fn far_branches(&self) -> bool {
        self.size() > materialize::JAL_MAX as u64
    }

    /// Can an `auipc` pair anywhere in the cache reach `target`?
    #[inline(always)]
    pub const fn pcrel_reaches(&self, target: u64) -> bool {
        matches!{
            Strategy::for_patchable(target, self.low, self.high.saturating_sub(1)),
            Strategy::PcRel32
        }
    }
}

/// Layout of a [`CodeBuffer`](crate::asm::buffer::CodeBuffer).
///
/// Both sections together must stay within `jal` reach (1 MiB), so that every call
/// site reaches every trampoline stub.
///
/// # Example
/// ```
/// use rvjit::asm::config::Config;
///
/// let config = Config::new()
///     .insts_base(0x4000_0000)
///     .insts_capacity(64 * 1024)
///     .stubs_capacity(4 * 1024);
///
/// assert_eq!(config.stubs_base(), 0x4001_0000);
/// assert!(!config.code_cache_bounds().far_branches());
/// ```
#[derive(Copy, Clone, Debug)]
pub struct Config {
    insts_base: u64,
    insts_capacity: usize,
    stubs_capacity: usize,
    code_cache: Option<CodeCacheBounds>,
}

impl Default for Config {
    #[inline(always)]
    fn default() -> Self {
        Self {
            insts_base: 0,
            insts_capacity: Self::DEFAULT_INSTS_CAPACITY,
            stubs_capacity: Self::DEFAULT_STUBS_CAPACITY,
            code_cache: None,
        }
    }
}

impl Config {
    pub const DEFAULT_INSTS_CAPACITY: usize = 1008 * 1024;
    pub const DEFAULT_STUBS_CAPACITY: usize = 16 * 1024;

    #[inline(always)]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runtime address of the first instruction byte
    #[track_caller]
    #[inline(always)]
    pub fn insts_base(mut self, base: u64) -> Self {
        assert!(base % 4 == 0, "instruction base {base:#x} is not 4-byte aligned");
        self.insts_base = base;
        self
    }

    #[inline(always)]
    pub fn insts_capacity(mut self, capacity: usize) -> Self {
        self.insts_capacity = capacity;
        self
    }

    #[inline(always)]
    pub fn stubs_capacity(mut self, capacity: usize) -> Self {
        self.stubs_capacity = capacity;
        self
    }

    /// Bounds of the whole code cache; defaults to the buffer itself
    #[inline(always)]
    pub fn code_cache(mut self, low: u64, high: u64) -> Self {
        self.code_cache = Some(CodeCacheBounds::new(low, high));
        self
    }

    #[inline(always)]
    pub const fn get_insts_base(&self) -> u64 {
        self.insts_base
    }

    #[inline(always)]
    pub const fn get_insts_capacity(&self) -> usize {
        self.insts_capacity
    }

    #[inline(always)]
    pub const fn get_stubs_capacity(&self) -> usize {
        self.stubs_capacity
    }

    /// The stub section directly follows the instruction section, 8-byte aligned.
    #[inline(always)]
    pub const fn stubs_base(&self) -> u64 {
        misc::align_up(self.insts_base + self.insts_capacity as u64, 8)
    }

    /// Does a `jal` anywhere in the instruction section reach any stub?
    #[inline(always)]
    pub const fn stubs_in_jal_reach(&self) -> bool {
        // a stub starts at least `STUB_SIZE` bytes before the end of its section
        let span = self.stubs_base() - self.insts_base + self.stubs_capacity as u64;
        span <= materialize::JAL_MAX as u64 + 2
    }

    #[inline(always)]
    pub(crate) const fn explicit_code_cache(&self) -> Option<CodeCacheBounds> {
        self.code_cache
    }

    #[inline]
    pub const fn code_cache_bounds(&self) -> CodeCacheBounds {
        match self.code_cache {
            Some(bounds) => bounds,
            None => CodeCacheBounds::new(
                self.insts_base,
                self.stubs_base() + self.stubs_capacity as u64
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_cache_is_the_buffer() {
        let config = Config::new().insts_base(0x1000).insts_capacity(0x102);
        let bounds = config.code_cache_bounds();
        assert_eq!(config.stubs_base(), 0x1108);
        assert_eq!(bounds.low, 0x1000);
        assert_eq!(bounds.high, 0x1108 + Config::DEFAULT_STUBS_CAPACITY as u64);
    }

    #[test]
    fn default_layout_keeps_stubs_in_reach() {
        let config = Config::new().insts_base(0x4000_0000);
        assert!(config.stubs_in_jal_reach());
        assert_eq!(config.code_cache_bounds().size(), 1 << 20);

        assert!(!config.insts_capacity(1 << 20).stubs_in_jal_reach());
        assert!(!Config::new().stubs_capacity(16 * 1024 + 8).stubs_in_jal_reach());
    }

    #[test]
    fn far_branches_follow_cache_size() {
        assert!(!CodeCacheBounds::new(0, 1 << 19).far_branches());
        assert!(CodeCacheBounds::new(0, 2 << 20).far_branches());
    }

    #[test]
    fn pcrel_reach_over_whole_cache() {
        let cache = CodeCacheBounds::new(0x1000_0000, 0x2000_0000);
        assert!(cache.pcrel_reaches(0x1800_0000));
        assert!(cache.pcrel_reaches(cache.low + materialize::PCREL_MAX as u64));
        assert!(!cache.pcrel_reaches(cache.low + materialize::PCREL_MAX as u64 + 1));
    }
}
