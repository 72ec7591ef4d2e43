//! The cell-store parser (spec.md §4.1): a byte-oriented recursive-descent
//! reader that turns source text into a forest of `Cell`s.
//!
//! Grounded on the teacher's `RunResult`/single-pass-`Result` idiom (the
//! teacher itself delegates Python parsing to an external crate, so the
//! concrete recursive-descent shape here follows spec.md's EBNF directly,
//! kept in the same error-as-value style as the rest of this crate).

use std::rc::Rc;

use crate::cell::Cell;
use crate::error::{SourceSpan, SpanMap, SxsError};

const DELIMITERS: &[char] = &['(', ')', '[', ']', '{', '}', '"', ';', '#', '@', '\''];

/// Parses every top-level cell in `source`, stopping at the first error.
pub fn parse_program(source: &str) -> Result<Vec<Cell>, SxsError> {
    parse_program_with_spans(source).map(|(cells, _)| cells)
}

/// Same as `parse_program`, but also returns a `SpanMap` correlating every
/// list/symbol/string cell back to the byte range it was parsed from. Used
/// by `tcs::Checker` to point diagnostics at the offending token rather than
/// always byte offset 0 (spec.md §4.7/§7).
pub fn parse_program_with_spans(source: &str) -> Result<(Vec<Cell>, SpanMap), SxsError> {
    let mut reader = Reader::new(source);
    let mut cells = Vec::new();
    loop {
        reader.skip_trivia();
        if reader.at_end() {
            break;
        }
        cells.push(reader.parse_cell()?);
    }
    Ok((cells, reader.spans))
}

/// Parses exactly one cell, ignoring any trailing source (used by the
/// `eval` builtin, spec.md §4.5, which parses a single `DqList` payload).
pub fn parse_one(source: &str) -> Result<Cell, SxsError> {
    let mut reader = Reader::new(source);
    reader.skip_trivia();
    if reader.at_end() {
        return Err(reader.err_at(0, "empty input"));
    }
    reader.parse_cell()
}

struct Reader<'s> {
    source: &'s str,
    bytes: &'s [u8],
    pos: usize,
    spans: SpanMap,
}

impl<'s> Reader<'s> {
    fn new(source: &'s str) -> Self {
        Self { source, bytes: source.as_bytes(), pos: 0, spans: SpanMap::default() }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    fn err_at(&self, pos: usize, message: impl Into<String>) -> SxsError {
        SxsError::ParseError { message: message.into(), span: SourceSpan::locate(self.source, pos) }
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(b' ' | b'\t' | b'\n' | b'\r') => {
                    self.pos += 1;
                }
                Some(b';') => {
                    while let Some(b) = self.peek() {
                        if b == b'\n' {
                            break;
                        }
                        self.pos += 1;
                    }
                }
                _ => break,
            }
        }
    }

    fn parse_cell(&mut self) -> Result<Cell, SxsError> {
        self.skip_trivia();
        let start = self.pos;
        let cell = match self.peek() {
            None => return Err(self.err_at(start, "EmptyInput: unexpected end of input")),
            Some(b'(') => self.parse_list(b'(', b')', false)?,
            Some(b'[') => self.parse_list(b'[', b']', true)?,
            Some(b'{') => self.parse_brace_list()?,
            Some(b'"') => self.parse_string()?,
            Some(b'\'') => {
                self.advance();
                let inner = self.parse_cell()?;
                Cell::Some(Rc::new(inner))
            }
            Some(b'#') => self.parse_datum()?,
            Some(b'@') => {
                self.advance();
                let inner = self.parse_cell()?;
                Cell::Error(Rc::new(inner))
            }
            Some(b')' | b']' | b'}') => return Err(self.err_at(start, "UnexpectedCloser")),
            Some(_) => self.parse_atom()?,
        };
        if let Some(key) = cell.span_key() {
            self.spans.entry(key).or_insert_with(|| SourceSpan::locate(self.source, start));
        }
        Ok(cell)
    }

    fn parse_list(&mut self, open: u8, close: u8, is_bracket: bool) -> Result<Cell, SxsError> {
        let start = self.pos;
        self.advance();
        let mut items = Vec::new();
        loop {
            self.skip_trivia();
            match self.peek() {
                None => {
                    let kind = if open == b'(' { "UnclosedParen" } else { "UnclosedBracket" };
                    return Err(self.err_at(start, kind));
                }
                Some(b) if b == close => {
                    self.advance();
                    break;
                }
                _ => items.push(self.parse_cell()?),
            }
        }
        Ok(if is_bracket { Cell::bracket_list(items) } else { Cell::paren_list(items) })
    }

    fn parse_brace_list(&mut self) -> Result<Cell, SxsError> {
        let start = self.pos;
        self.advance();
        let mut items = Vec::new();
        loop {
            self.skip_trivia();
            match self.peek() {
                None => return Err(self.err_at(start, "UnclosedBrace")),
                Some(b'}') => {
                    self.advance();
                    break;
                }
                _ => items.push(self.parse_cell()?),
            }
        }
        Ok(Cell::brace_list(items))
    }

    fn parse_datum(&mut self) -> Result<Cell, SxsError> {
        let start = self.pos;
        self.advance();
        self.skip_trivia();
        if self.peek() != Some(b'(') {
            return Err(self.err_at(start, "expected '(' after '#'"));
        }
        match self.parse_list(b'(', b')', false)? {
            Cell::ParenList(items) => Ok(Cell::Datum(items)),
            other => Ok(other),
        }
    }

    fn parse_string(&mut self) -> Result<Cell, SxsError> {
        let start = self.pos;
        self.advance();
        let mut out = String::new();
        loop {
            match self.advance() {
                None => return Err(self.err_at(start, "UnclosedString")),
                Some(b'"') => break,
                Some(b'\\') => match self.advance() {
                    Some(b'"') => out.push('"'),
                    Some(b'\\') => out.push('\\'),
                    Some(b'n') => out.push('\n'),
                    Some(b't') => out.push('\t'),
                    Some(other) => {
                        out.push('\\');
                        out.push(other as char);
                    }
                    None => return Err(self.err_at(start, "UnclosedString")),
                },
                Some(b) if b < 0x80 => out.push(b as char),
                Some(b) => {
                    // Multi-byte UTF-8 sequence: re-decode from source by offset.
                    let rest = &self.source[self.pos - 1..];
                    let ch = rest.chars().next().expect("valid utf8 source");
                    self.pos += ch.len_utf8() - 1;
                    let _ = b;
                    out.push(ch);
                }
            }
        }
        Ok(Cell::string(out))
    }

    fn parse_atom(&mut self) -> Result<Cell, SxsError> {
        let start = self.pos;
        while let Some(b) = self.peek() {
            let ch = b as char;
            if b.is_ascii_whitespace() || DELIMITERS.contains(&ch) {
                break;
            }
            self.pos += 1;
        }
        let text = &self.source[start..self.pos];
        if text.is_empty() {
            return Err(self.err_at(start, "EmptyInput"));
        }
        Ok(classify_atom(text).map_err(|msg| self.err_at(start, msg))?)
    }
}

fn classify_atom(text: &str) -> Result<Cell, String> {
    if is_integer_literal(text) {
        return text
            .parse::<i64>()
            .map(Cell::Integer)
            .map_err(|_| format!("InvalidNumber: {text}"));
    }
    if is_real_literal(text) {
        return text
            .parse::<f64>()
            .map(Cell::Real)
            .map_err(|_| format!("InvalidNumber: {text}"));
    }
    Ok(Cell::symbol(text))
}

fn is_integer_literal(text: &str) -> bool {
    let body = text.strip_prefix('-').unwrap_or(text);
    !body.is_empty() && body.bytes().all(|b| b.is_ascii_digit())
}

fn is_real_literal(text: &str) -> bool {
    let body = text.strip_prefix('-').unwrap_or(text);
    let Some((int_part, rest)) = body.split_once('.') else {
        return false;
    };
    if int_part.is_empty() || !int_part.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    let frac_part = match rest.split_once(['e', 'E']) {
        Some((frac, exp)) => {
            let exp = exp.strip_prefix('-').unwrap_or(exp);
            if exp.is_empty() || !exp.bytes().all(|b| b.is_ascii_digit()) {
                return false;
            }
            frac
        }
        None => rest,
    };
    !frac_part.is_empty() && frac_part.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_paren_list() {
        let cells = parse_program("(def x 1)").unwrap();
        assert_eq!(cells.len(), 1);
        assert_eq!(cells[0].tag(), crate::cell::CellTag::ParenList);
    }

    #[test]
    fn parses_integer_and_real() {
        assert_eq!(parse_one("42").unwrap().to_string(), "42");
        assert_eq!(parse_one("-3.14").unwrap().to_string(), "-3.14");
        assert_eq!(parse_one("-5").unwrap().to_string(), "-5");
    }

    #[test]
    fn parses_string_with_escapes() {
        let c = parse_one(r#""a\"b""#).unwrap();
        match c {
            Cell::DqList(s) => assert_eq!(&*s, "a\"b"),
            _ => panic!("expected DqList"),
        }
    }

    #[test]
    fn parses_quote_and_error_payload() {
        assert_eq!(parse_one("'42").unwrap().tag(), crate::cell::CellTag::Some);
        assert_eq!(parse_one("@(1)").unwrap().tag(), crate::cell::CellTag::Error);
    }

    #[test]
    fn parses_datum_directive() {
        let c = parse_one(r#"#(import a "b.sxs")"#).unwrap();
        assert_eq!(c.tag(), crate::cell::CellTag::Datum);
    }

    #[test]
    fn comment_is_discarded() {
        let cells = parse_program("; comment\n(def x 1) ; trailing\n").unwrap();
        assert_eq!(cells.len(), 1);
    }

    #[test]
    fn unclosed_paren_is_error() {
        assert!(parse_program("(def x 1").is_err());
    }

    #[test]
    fn unexpected_closer_is_error() {
        assert!(parse_program(")").is_err());
    }

    #[test]
    fn minus_digit_is_integer_not_symbol() {
        let c = parse_one("-5").unwrap();
        assert_eq!(c.tag(), crate::cell::CellTag::Integer);
    }

    #[test]
    fn bare_minus_is_symbol() {
        let c = parse_one("-").unwrap();
        assert_eq!(c.tag(), crate::cell::CellTag::Symbol);
    }

    #[test]
    fn spans_locate_a_later_top_level_cell_past_the_first_line() {
        let (cells, spans) = parse_program_with_spans("(def x 1)\n(def y 2)").unwrap();
        let span = cells[1].span_key().and_then(|k| spans.get(&k)).copied().unwrap();
        assert_eq!(span.line, 2);
        assert_eq!(span.column, 1);
    }
}
