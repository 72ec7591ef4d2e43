//! The testable properties from spec.md §8, run end to end through
//! `Interpreter::run_source` and `tcs::Checker::check_program`.

use sxs::tcs::Checker;
use sxs::{Cell, CellTag, Interpreter, SxsError};

#[test]
fn printer_round_trips_a_program_unchanged() {
    let source = r#"(def point (fn (x :int y :int) :int [(if x x y)]))"#;
    let cells = sxs::parser::parse_program(source).unwrap();
    let printed = sxs::printer::print_cell(&cells[0]);
    let reparsed = sxs::parser::parse_program(&printed).unwrap();
    assert_eq!(cells, reparsed);
}

#[test]
fn a_lambda_can_be_defined_applied_and_its_scope_is_isolated() {
    let mut interp = Interpreter::new_root();
    let result = interp
        .run_source("(def add1 (fn (a :int) :int [(if a a a)])) (apply add1 {5})")
        .unwrap();
    assert_eq!(result, Cell::Integer(5));
    assert!(!interp.has_symbol("a", false));
}

#[test]
fn do_done_exits_only_the_innermost_loop() {
    let mut interp = Interpreter::new_root();
    let result = interp
        .run_source(
            "(def r (do [ (def inner (do [ (done 1) ])) (done inner) ]))",
        )
        .unwrap();
    assert_eq!(result, Cell::Integer(1));
}

#[test]
fn match_with_no_matching_arm_yields_an_error_cell_not_a_thrown_failure() {
    let mut interp = Interpreter::new_root();
    let result = interp.run_source("(match 999 (1 \"a\") (2 \"b\"))").unwrap();
    assert_eq!(result.tag(), CellTag::Error);
}

#[test]
fn reflect_selects_the_arm_matching_the_runtime_tag() {
    let mut interp = Interpreter::new_root();
    let result = interp.run_source("(reflect 3.14 (:int 100) (:real 200))").unwrap();
    assert_eq!(result, Cell::Integer(200));
}

#[test]
fn recover_catches_a_thrown_assert_failure_and_binds_its_message() {
    let mut interp = Interpreter::new_root();
    let result = interp.run_source(r#"(recover [(assert 0 "boom") 0] [$exception])"#).unwrap();
    assert_eq!(result, Cell::string("boom"));
}

#[test]
fn assert_throws_carrying_the_exact_user_supplied_message() {
    let mut interp = Interpreter::new_root();
    let err = interp.run_source(r#"(assert 0 "custom")"#).unwrap_err();
    match err {
        SxsError::AssertFailed { message } => assert_eq!(message, "custom"),
        other => panic!("expected AssertFailed, got {other:?}"),
    }
}

#[test]
fn importing_a_file_and_calling_its_exported_lambda_works_across_files() {
    let mut interp = Interpreter::new_root();
    let result = interp
        .run_source(r#"#(import m "tests/fixtures/math_lib.sxs") (m/identity 11)"#)
        .unwrap();
    assert_eq!(result, Cell::Integer(11));
}

#[test]
fn checker_rejects_every_scenario_from_the_spec_table() {
    let scenarios: &[&str] = &[
        r#"(def r (if 1 1 "two"))"#,
        r#"(def f (fn (a :int) :int [a])) (f "x")"#,
        "(def x 1) (def x 2)",
        r#"[#(import a "nowhere.sxs")]"#,
    ];
    for src in scenarios {
        let cells = sxs::parser::parse_program(src).unwrap();
        let report = Checker::check_program(&cells, src);
        assert!(!report.ok, "expected rejection for: {src}");
    }
}

#[test]
fn checker_accepts_a_program_the_interpreter_also_runs_successfully() {
    let source = "(def x 1) (def f (fn (a :int) :int [a])) (f x)";
    let cells = sxs::parser::parse_program(source).unwrap();
    assert!(Checker::check_program(&cells, source).ok);

    let mut interp = Interpreter::new_root();
    assert_eq!(interp.run_source(source).unwrap(), Cell::Integer(1));
}
