//! Source-context diagnostic rendering for `tcs` and thrown failures
//! (spec.md §4.7/§7): three lines of context with a caret under the byte
//! offset, colorized when attached to a terminal.

use std::fmt;

use crate::error::{SourceSpan, SxsError};

/// One formatted diagnostic, ready to print.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub message: String,
    pub span: Option<SourceSpan>,
}

impl Diagnostic {
    #[must_use]
    pub fn from_error(err: &SxsError) -> Self {
        Self { message: err.to_string(), span: err.span() }
    }

    /// Renders the diagnostic against `source`, with a caret line under the
    /// span's column. `color` gates ANSI escapes; callers decide this via
    /// `std::io::IsTerminal` rather than baking a terminal check in here, so
    /// the formatter stays pure and testable.
    #[must_use]
    pub fn render(&self, source: &str, color: bool) -> String {
        let Some(span) = self.span else {
            return self.message.clone();
        };
        let lines: Vec<&str> = source.lines().collect();
        let line_idx = span.line.saturating_sub(1) as usize;
        let line_text = lines.get(line_idx).copied().unwrap_or("");
        let caret_col = span.column.saturating_sub(1) as usize;

        let mut out = String::new();
        if color {
            out.push_str("\x1b[1;31merror\x1b[0m: ");
        } else {
            out.push_str("error: ");
        }
        out.push_str(&self.message);
        out.push('\n');
        out.push_str(&format!(" --> line {}, column {}\n", span.line, span.column));
        out.push_str(&format!("{line_text}\n"));
        out.push_str(&" ".repeat(caret_col));
        if color {
            out.push_str("\x1b[1;31m^\x1b[0m");
        } else {
            out.push('^');
        }
        out
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_caret_under_column() {
        let d = Diagnostic {
            message: "type_error: expected :int, got :str".to_string(),
            span: Some(SourceSpan { byte_offset: 4, line: 1, column: 5 }),
        };
        let rendered = d.render("(def x \"y\")", false);
        assert!(rendered.contains("type_error"));
        assert!(rendered.contains('^'));
    }

    #[test]
    fn renders_plain_without_span() {
        let d = Diagnostic { message: "assert_failed: boom".to_string(), span: None };
        assert_eq!(d.render("whatever", false), "assert_failed: boom");
    }
}
