//! The builtin operator table, end to end through `Interpreter::run_source`
//! (spec.md §4.5, §8).

use sxs::io::CollectStringPrint;
use sxs::{Cell, Interpreter, SxsError};

fn run(src: &str) -> Cell {
    let mut interp = Interpreter::new_root();
    interp.run_source(src).unwrap()
}

#[test]
fn if_picks_the_truthy_branch() {
    assert_eq!(run("(if 1 42 99)"), Cell::Integer(42));
    assert_eq!(run("(if 0 42 99)"), Cell::Integer(99));
}

#[test]
fn match_falls_through_to_error_cell_without_throwing() {
    let result = run("(match 5 (1 10) (2 20))");
    assert_eq!(result.tag(), sxs::CellTag::Error);
}

#[test]
fn reflect_dispatches_on_runtime_tag() {
    assert_eq!(run(r#"(reflect "x" (:int 1) (:str 2))"#), Cell::Integer(2));
}

#[test]
fn recover_binds_exception_message() {
    let result = run(r#"(recover [(assert 0 "nope") 1] [$exception])"#);
    assert_eq!(result, Cell::string("nope"));
}

#[test]
fn try_falls_back_on_thrown_failure() {
    let result = run(r#"(try (assert 0 "boom") "fallback")"#);
    assert_eq!(result, Cell::string("fallback"));
}

#[test]
fn try_returns_first_arm_when_it_does_not_throw() {
    assert_eq!(run("(try 1 2)"), Cell::Integer(1));
}

#[test]
fn assert_throws_with_the_verbatim_message() {
    let mut interp = Interpreter::new_root();
    let err = interp.run_source(r#"(assert 0 "custom message")"#).unwrap_err();
    match err {
        SxsError::AssertFailed { message } => assert_eq!(message, "custom message"),
        other => panic!("expected AssertFailed, got {other:?}"),
    }
}

#[test]
fn do_done_returns_the_signaled_value() {
    assert_eq!(run("(do [(done 7)])"), Cell::Integer(7));
}

#[test]
fn do_exposes_one_based_iteration_count() {
    assert_eq!(run("(do [(done $iterations)])"), Cell::Integer(1));
}

#[test]
fn done_outside_a_loop_is_an_error() {
    let mut interp = Interpreter::new_root();
    let err = interp.run_source("(done 1)").unwrap_err();
    assert!(matches!(err, SxsError::DoneOutsideLoop));
}

#[test]
fn at_indexes_lists_positionally() {
    assert_eq!(run("(at 1 [10 20 30])"), Cell::Integer(20));
}

#[test]
fn at_out_of_bounds_yields_error_cell_not_throw() {
    assert_eq!(run("(at 9 [1 2])").tag(), sxs::CellTag::Error);
}

#[test]
fn at_indexes_strings_by_byte() {
    assert_eq!(run(r#"(at 1 "hi")"#), Cell::Integer(b'i' as i64));
}

#[test]
fn cast_retags_a_brace_list_as_a_declared_form() {
    let result = run("#(define-form point (:int :int)) (cast point {1 2})");
    assert_eq!(result.form_name(), Some("point"));
}

#[test]
fn cast_with_wrong_shape_throws() {
    let mut interp = Interpreter::new_root();
    let err = interp
        .run_source(r#"#(define-form point (:int :int)) (cast point {1 "two"})"#)
        .unwrap_err();
    assert!(matches!(err, SxsError::TypeMismatch { .. }));
}

#[test]
fn eval_parses_and_runs_a_string_argument() {
    assert_eq!(run(r#"(eval "(if 1 5 6)")"#), Cell::Integer(5));
}

#[test]
fn export_marks_a_binding_reachable_through_its_prefix() {
    let mut interp = Interpreter::new_root();
    interp.run_source(r#"(export answer 42)"#).unwrap();
    assert!(interp.has_symbol("answer", false));
}

#[test]
fn debug_emits_one_bracketed_line_per_call_and_returns_zero() {
    let mut interp = Interpreter::new_root();
    interp.set_printer(Box::new(CollectStringPrint::default()));
    let result = interp.run_source(r#"(debug "hi" 42)"#).unwrap();
    assert_eq!(result, Cell::Integer(0));
}
