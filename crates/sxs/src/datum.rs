//! Datum directive dispatch (spec.md §4.5): `#(…)` forms evaluated inline,
//! with no separate macro-expansion pass.
//!
//! `#(define-kernel …)`/`#(define-function …)` manifest shapes are grounded
//! on `examples/original_source/sxs/data.hpp`'s `KERNEL_SXS`/
//! `HELLO_WORLD_MODULE` templates; `#(debug …)` is grounded on
//! `examples/original_source/pkg/core/instructions/instructions.cpp`'s
//! `debug` symbol, routed through the same `debug_emit` helper the `debug`
//! builtin uses.

use std::rc::Rc;

use crate::cell::Cell;
use crate::error::{SxsError, SxsResult};
use crate::forms::FormShape;
use crate::interpreter::Interpreter;
use crate::types::TypeTag;

pub(crate) fn eval_datum(interp: &mut Interpreter, items: &Rc<Vec<Cell>>) -> SxsResult<Cell> {
    let Some(Cell::Symbol(directive)) = items.first() else {
        return Err(SxsError::ParseError {
            message: "datum directive must start with a symbol".to_string(),
            span: crate::error::SourceSpan::at_start(),
        });
    };
    let args = &items[1..];
    match directive.as_ref() {
        "import" => eval_import(interp, args),
        "load" => eval_load(interp, args),
        "define-form" => eval_define_form(interp, args),
        "define-kernel" => Ok(Cell::None),
        "define-function" => Ok(Cell::None),
        "debug" => interp.debug_emit(args),
        other => Err(SxsError::UnknownSymbol { name: format!("#({other} …)") }),
    }
}

fn eval_import(interp: &mut Interpreter, args: &[Cell]) -> SxsResult<Cell> {
    if args.len() != 2 {
        return Err(SxsError::ArityMismatch { op: "import".to_string(), expected: 2, actual: args.len() });
    }
    let prefix = match &args[0] {
        Cell::Symbol(s) => s.to_string(),
        other => return Err(SxsError::TypeMismatch { expected: ":symbol".to_string(), actual: other.tag(), span: None }),
    };
    let path = match &args[1] {
        Cell::DqList(s) => s.to_string(),
        other => return Err(SxsError::TypeMismatch { expected: ":str".to_string(), actual: other.tag(), span: None }),
    };
    interp.import_file(&prefix, &path)?;
    Ok(Cell::None)
}

fn eval_load(interp: &mut Interpreter, args: &[Cell]) -> SxsResult<Cell> {
    if args.len() != 1 {
        return Err(SxsError::ArityMismatch { op: "load".to_string(), expected: 1, actual: args.len() });
    }
    let name = match &args[0] {
        Cell::DqList(s) => s.to_string(),
        other => return Err(SxsError::TypeMismatch { expected: ":str".to_string(), actual: other.tag(), span: None }),
    };
    interp.load_kernel(&name)?;
    Ok(Cell::None)
}

/// `#(define-form <name> <shape>)`: `<shape>` is either a paren list of
/// type symbols (fixed fields) or a single type symbol prefixed by `...`
/// meaning homogeneous-variadic, per spec.md §4.7.
fn eval_define_form(interp: &mut Interpreter, args: &[Cell]) -> SxsResult<Cell> {
    if args.len() != 2 {
        return Err(SxsError::ArityMismatch { op: "define-form".to_string(), expected: 2, actual: args.len() });
    }
    let name = match &args[0] {
        Cell::Symbol(s) => s.to_string(),
        other => return Err(SxsError::TypeMismatch { expected: ":symbol".to_string(), actual: other.tag(), span: None }),
    };
    let shape = match &args[1] {
        Cell::ParenList(items) => {
            let types = items
                .iter()
                .map(|c| match c {
                    Cell::Symbol(s) => TypeTag::parse(s).ok_or_else(|| SxsError::InvalidType { text: s.to_string() }),
                    other => Err(SxsError::TypeMismatch { expected: ":symbol".to_string(), actual: other.tag(), span: None }),
                })
                .collect::<SxsResult<Vec<_>>>()?;
            FormShape::Fields(types)
        }
        Cell::Symbol(s) => {
            let element_type = TypeTag::parse(s).ok_or_else(|| SxsError::InvalidType { text: s.to_string() })?;
            FormShape::Variadic(element_type)
        }
        other => return Err(SxsError::TypeMismatch { expected: "form shape".to_string(), actual: other.tag(), span: None }),
    };
    interp.define_form(&name, shape);
    Ok(Cell::None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn define_form_registers_fixed_shape() {
        let mut interp = Interpreter::new_root();
        interp.run_source("#(define-form point (:int :int))").unwrap();
        assert!(interp.forms.is_defined("point"));
    }

    #[test]
    fn debug_directive_returns_zero() {
        let mut interp = Interpreter::new_root();
        let result = interp.run_source(r#"#(debug "hi")"#).unwrap();
        assert_eq!(result, Cell::Integer(0));
    }

    #[test]
    fn import_missing_file_reports_not_found() {
        let mut interp = Interpreter::new_root();
        let err = interp.run_source(r#"#(import a "missing.sxs")"#).unwrap_err();
        assert!(matches!(err, SxsError::ImportNotFound { .. }));
    }
}
