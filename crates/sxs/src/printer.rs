//! The inverse of `parser`: renders a `Cell` back to its literal textual
//! form (spec.md §4.1). `Cell`'s own `Display` impl does the rendering;
//! this module is the public entry point plus the round-trip contract.

use crate::cell::Cell;

/// Renders `cell` to the same textual form the parser would read back,
/// for every tag except `Aberrant`/`Error` (spec.md §4.1, §8's round-trip
/// property is scoped to exclude those two).
#[must_use]
pub fn print_cell(cell: &Cell) -> String {
    cell.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_one;

    fn round_trips(text: &str) {
        let cell = parse_one(text).unwrap();
        let printed = print_cell(&cell);
        let reparsed = parse_one(&printed).unwrap();
        assert_eq!(print_cell(&reparsed), printed);
    }

    #[test]
    fn round_trips_paren_list() {
        round_trips("(def x 1)");
    }

    #[test]
    fn round_trips_nested_lists() {
        round_trips("[(def a 1) (def b 2.5)]");
    }

    #[test]
    fn round_trips_string() {
        round_trips(r#""hello world""#);
    }

    #[test]
    fn round_trips_symbol() {
        round_trips("foo-bar");
    }

    #[test]
    fn aberrant_prints_handle_form() {
        assert_eq!(print_cell(&Cell::Aberrant(7)), "?fn<7>");
    }
}
