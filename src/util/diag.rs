use crate::util::misc;

use std::sync::Arc;

use thiserror::Error;
use memchr::Memchr;
use miette::{
    Diagnostic,
    SourceSpan,
    NamedSource,
    GraphicalReportHandler,
};

#[derive(Debug, Error, Diagnostic)]
#[error("unbound label '{name}'")]
#[diagnostic(code(rvjit::unbound_label), help("bind it before finishing the assembler"))]
pub struct UnboundLabelDiagnostic {
    pub name: String,

    /// The span inside `src` that should be highlighted
    #[label("label created here is never bound")]
    pub span: SourceSpan,

    /// The source file content (miette prints this)
    #[source_code]
    pub src: NamedSource
}

pub struct DiagnosticRenderer {
    handler: GraphicalReportHandler,
}

impl Default for DiagnosticRenderer {
    #[inline(always)]
    fn default() -> Self {
        Self { handler: GraphicalReportHandler::new() }
    }
}

impl DiagnosticRenderer {
    const RENDERED_PREALLOCATION_SIZE: usize = 512;

    #[inline]
    pub fn render_to_string(&self, diag: &impl Diagnostic) -> String {
        let mut rendered = String::with_capacity(
            Self::RENDERED_PREALLOCATION_SIZE
        );

        if self.handler.render_report(&mut rendered, diag).is_err() {
            rendered.clear();
            rendered.push_str(&diag.to_string());
        }

        rendered
    }
}

#[inline(always)]
const fn byte_offset_from_line_offsets(
    line_start : usize,
    line_end   : usize,
    target_col : usize
) -> usize {
    let line_len = line_end - line_start;
    let col0 = misc::b0(target_col, line_len);
    line_start + col0
}

#[inline]
pub fn text_into_named_source_and_source_span(
    text      : impl Into<Arc<str>>,
    file_path : impl AsRef<str>,

    line          : usize,
    column        : usize,
    highlight_len : usize
) -> (NamedSource, SourceSpan) {
    let text = text.into();

    if !text.is_empty() {
        let line = misc::b0(line, line);
        let byte_offset = calculate_byte_offset(&text, line, column);
        let highlight_len = highlight_len.min(text.len() - byte_offset);

        (
            NamedSource::new(file_path, Arc::clone(&text)),
            SourceSpan::new(byte_offset.into(), highlight_len.into()),
        )
    } else {
        (
            NamedSource::new(file_path, ""),
            SourceSpan::new(0.into(), 0.into())
        )
    }
}

/// Byte offset of 0-based `target_line`, 1-based `target_col` in `text`.
///
/// Lines past the end of `text` resolve to the end of the last line.
pub fn calculate_byte_offset(text: &str, target_line: usize, target_col: usize) -> usize {
    if target_line == 0 {
        let line_end = memchr::memchr(b'\n', text.as_bytes()).unwrap_or(text.len());
        return byte_offset_from_line_offsets(0, line_end, target_col)
    }

    let mut curr_line = 0;
    let mut last_newline_pos = 0;

    let mut newline_iter = Memchr::new(b'\n', text.as_bytes());
    while let Some(pos) = newline_iter.next() {
        if curr_line + 1 == target_line {
            let line_start = pos + 1;
            let line_end = newline_iter.next().unwrap_or(text.len());
            return byte_offset_from_line_offsets(
                line_start,
                line_end,
                target_col
            )
        }

        curr_line += 1;
        last_newline_pos = pos;
    }

    // target line is beyond the file -> use end of file
    let final_offset = misc::b0(
        target_col,
        text.len() - last_newline_pos
    );

    last_newline_pos + final_offset
}
