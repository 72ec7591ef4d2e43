//! Parser/printer round trips and parse-error kinds (spec.md §4.1, §8).

use sxs::{Cell, SxsError};

#[test]
fn round_trips_simple_program() {
    let source = "(def x 1) (def y 2)";
    let cells = sxs::parser::parse_program(source).unwrap();
    assert_eq!(cells.len(), 2);
    let printed: Vec<String> = cells.iter().map(sxs::printer::print_cell).collect();
    assert_eq!(printed, vec!["(def x 1)", "(def y 2)"]);
}

#[test]
fn round_trips_nested_shapes() {
    let source = r#"(def r {1 "two" [3 4]})"#;
    let cells = sxs::parser::parse_program(source).unwrap();
    assert_eq!(sxs::printer::print_cell(&cells[0]), source);
}

#[test]
fn datum_directive_round_trips_with_hash_prefix() {
    let source = r#"#(import a "a.sxs")"#;
    let cells = sxs::parser::parse_program(source).unwrap();
    assert_eq!(cells[0].tag(), sxs::CellTag::Datum);
    assert_eq!(sxs::printer::print_cell(&cells[0]), source);
}

#[test]
fn unclosed_paren_is_parse_error() {
    let err = sxs::parser::parse_program("(def x 1").unwrap_err();
    assert!(matches!(err, SxsError::ParseError { .. }));
}

#[test]
fn unexpected_closer_is_parse_error() {
    let err = sxs::parser::parse_program(")").unwrap_err();
    assert!(matches!(err, SxsError::ParseError { .. }));
}

#[test]
fn negative_integer_literal_parses_as_integer() {
    let cells = sxs::parser::parse_program("-5").unwrap();
    assert_eq!(cells[0], Cell::Integer(-5));
}

#[test]
fn bare_dash_parses_as_symbol() {
    let cells = sxs::parser::parse_program("-").unwrap();
    assert_eq!(cells[0], Cell::symbol("-"));
}

#[test]
fn comments_are_discarded() {
    let cells = sxs::parser::parse_program("; a comment\n(def x 1) ; trailing").unwrap();
    assert_eq!(cells.len(), 1);
}
