//! Scope stack and lambda-table behavior (spec.md §4.2-§4.4, §8).

use sxs::{Cell, Interpreter, SxsError};

#[test]
fn def_binds_in_current_scope() {
    let mut interp = Interpreter::new_root();
    let result = interp.run_source("(def x 42) x").unwrap();
    assert_eq!(result, Cell::Integer(42));
}

#[test]
fn set_rebinds_existing_top_frame_name() {
    let mut interp = Interpreter::new_root();
    let result = interp.run_source("(def x 1) (set x 2) x").unwrap();
    assert_eq!(result, Cell::Integer(2));
}

#[test]
fn lambda_invocation_does_not_leak_inner_defs_to_caller() {
    let mut interp = Interpreter::new_root();
    interp
        .run_source("(def f (fn () :int [(def inner 1) inner])) (f)")
        .unwrap();
    assert!(interp.has_symbol("f", false));
    assert!(!interp.has_symbol("inner", false));
}

#[test]
fn lambda_params_do_not_leak_into_enclosing_scope() {
    let mut interp = Interpreter::new_root();
    interp
        .run_source("(def f (fn (a :int) :int [a])) (f 5)")
        .unwrap();
    assert!(!interp.has_symbol("a", false));
}

#[test]
fn invalidated_lambda_id_cannot_be_invoked_after_its_scope_pops() {
    // A lambda defined inside another lambda's body is declared at the
    // inner call's depth; once that call returns, its handle is dead.
    let mut interp = Interpreter::new_root();
    let err = interp
        .run_source(
            "(def outer (fn () :aberrant [(def inner (fn () :int [1])) inner])) \
             (def captured (outer)) \
             (apply captured {})",
        )
        .unwrap_err();
    assert!(matches!(err, SxsError::LambdaInvalidated { .. }));
}

#[test]
fn repeated_calls_to_the_same_lambda_do_not_leak_state_between_calls() {
    let mut interp = Interpreter::new_root();
    let result = interp
        .run_source(
            "(def pick (fn (a :int b :int) :int [(if a a b)])) \
             (def first (pick 1 2)) (def second (pick 0 9)) \
             (match first (1 (match second (9 777) (0 0))) (0 0))",
        )
        .unwrap();
    assert_eq!(result, Cell::Integer(777));
}

#[test]
fn arity_mismatch_on_lambda_call_is_reported() {
    let mut interp = Interpreter::new_root();
    let err = interp
        .run_source("(def f (fn (a :int) :int [a])) (f 1 2)")
        .unwrap_err();
    assert!(matches!(err, SxsError::ArityMismatch { .. }));
}

#[test]
fn param_type_mismatch_on_lambda_call_is_reported() {
    let mut interp = Interpreter::new_root();
    let err = interp
        .run_source(r#"(def f (fn (a :int) :int [a])) (f "not an int")"#)
        .unwrap_err();
    assert!(matches!(err, SxsError::TypeMismatch { .. }));
}

#[test]
fn return_type_mismatch_is_reported() {
    let mut interp = Interpreter::new_root();
    let err = interp
        .run_source(r#"(def f (fn () :int ["not an int"])) (f)"#)
        .unwrap_err();
    assert!(matches!(err, SxsError::ReturnTypeMismatch { .. }));
}
