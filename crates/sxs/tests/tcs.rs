//! The static type-and-scope checker, end to end (spec.md §4.7, §8).

use sxs::tcs::Checker;

fn check(src: &str) -> sxs::tcs::CheckReport {
    let cells = sxs::parser::parse_program(src).unwrap();
    Checker::check_program(&cells, src)
}

#[test]
fn accepts_a_well_typed_program() {
    let report = check("(def x 1) (def f (fn (a :int) :int [a])) (f x)");
    assert!(report.ok, "unexpected diagnostics: {:?}", report.diagnostics.iter().map(ToString::to_string).collect::<Vec<_>>());
}

#[test]
fn rejects_if_branches_with_incompatible_types() {
    let report = check(r#"(def r (if 1 1 "two"))"#);
    assert!(!report.ok);
}

#[test]
fn rejects_a_call_whose_argument_type_does_not_match_the_declared_parameter() {
    let report = check(r#"(def f (fn (a :int) :int [a])) (f "x")"#);
    assert!(!report.ok);
}

#[test]
fn rejects_redefining_a_name_already_bound_in_the_same_scope() {
    let report = check("(def x 1) (def x 2)");
    assert!(!report.ok);
}

#[test]
fn rejects_an_import_whose_path_does_not_resolve() {
    let report = check(r#"[#(import a "nowhere.sxs")]"#);
    assert!(!report.ok);
}

#[test]
fn accepts_an_import_whose_path_resolves_on_the_include_path() {
    let source = r#"#(import m "math_lib.sxs")"#;
    let cells = sxs::parser::parse_program(source).unwrap();
    let report = Checker::check_program_with_include_paths(&cells, source, vec!["tests/fixtures".into()]);
    assert!(report.ok, "unexpected diagnostics: {:?}", report.diagnostics.iter().map(ToString::to_string).collect::<Vec<_>>());
}

#[test]
fn rejects_an_unknown_symbol_reference() {
    let report = check("never_defined");
    assert!(!report.ok);
}

#[test]
fn rejects_a_match_whose_arms_disagree_in_type() {
    let report = check(r#"(def r (match 1 (1 1) (2 "two")))"#);
    assert!(!report.ok);
}

#[test]
fn a_diagnostic_on_a_later_line_points_at_that_line_not_the_start_of_the_file() {
    let source = "(def x 1)\n(def r (if 1 1 \"two\"))";
    let (cells, spans) = sxs::parser::parse_program_with_spans(source).unwrap();
    let report = Checker::check_program_with_spans(&cells, source, Vec::new(), spans);
    assert!(!report.ok);
    let span = report.diagnostics[0].span.expect("diagnostic should carry a span");
    assert_eq!(span.line, 2);
    assert_ne!(span.column, 1, "caret should not default to column 1 for a cell on line 2");
}
