use crate::asm::label::LabelInfo;
use crate::asm::buffer::SectionKind;
use crate::util::diag::{
    self,
    DiagnosticRenderer,
    UnboundLabelDiagnostic
};

use std::fs;
use std::sync::Arc;

use thiserror::Error;
use rustc_hash::FxHashMap;

/// Recoverable emission failures; the caller decides whether to retry in a larger buffer.
#[derive(Eq, Clone, Debug, Error, PartialEq)]
pub enum EmitError {
    #[error("{section} section exhausted: {requested} bytes requested, {remaining} remaining")]
    BufferExhausted {
        section: SectionKind,
        requested: usize,
        remaining: usize,
    },

    #[error("call at {call_site:#x} cannot reach {target:#x} and no trampoline can serve it")]
    UnreachableWithoutTrampoline {
        call_site: u64,
        target: u64,
    },
}

/// Error returned by [`Assembler::finish`](crate::asm::Assembler::finish).
#[derive(Error)]
pub enum FinishError {
    /// Pre-rendered miette diagnostics, one per label that was never bound
    #[error("{rendered}")]
    UnboundLabels { rendered: String },

    #[error(transparent)]
    Emit(#[from] EmitError),
}

debug_from_display!(FinishError, newline);

impl FinishError {
    pub(crate) fn from_unbound_labels<'a>(labels: impl IntoIterator<Item = &'a LabelInfo>) -> FinishError {
        #[allow(clippy::default_constructed_unit_structs)]
        let renderer = DiagnosticRenderer::default();

        let mut file_cache = FxHashMap::<_, Arc<str>>::default();

        let reports = labels.into_iter().map(|info| {
            let file_path = info.caller_loc.file();

            let content = file_cache.entry(file_path).or_insert_with(|| {
                fs::read_to_string(file_path).unwrap_or_default().into()
            });

            let (named_src, span) = diag::text_into_named_source_and_source_span(
                Arc::clone(content),
                file_path,
                info.caller_loc.line() as _,
                info.caller_loc.column() as _,
                info.name.len().max(1)
            );

            let diag = UnboundLabelDiagnostic {
                span,
                src: named_src,
                name: info.name.clone()
            };

            renderer.render_to_string(&diag)
        }).collect::<Vec<_>>();

        FinishError::UnboundLabels {
            // join multiple diagnostics with a blank line between them
            rendered: reports.join("\n\n")
        }
    }
}
