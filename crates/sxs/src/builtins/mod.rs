//! The builtin operator set (spec.md §4.5): `def`/`set`, `fn`, `if`,
//! `match`, `reflect`, `recover`, `assert`, `apply`, `do`/`done`, `at`,
//! `cast`, `debug`, `eval`, `try`, `export`.
//!
//! `Op` follows the teacher's `strum`-derived fixed-string-enum idiom
//! (`crates/monty/src/builtins/mod.rs`'s `Builtins`/`BuiltinsFunctions`);
//! the operator bodies are an `impl Interpreter` block grounded on concrete
//! contracts in `examples/original_source/pkg/core/instructions/instructions.cpp`
//! (`set`, `fn`, `debug`) and spec.md's table for the rest.

use std::rc::Rc;

use crate::cell::{Cell, CellTag};
use crate::error::{SxsError, SxsResult};
use crate::interpreter::Interpreter;
use crate::lambda::Param;
use crate::types::TypeTag;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumString, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum Op {
    Def,
    Set,
    Fn,
    If,
    Match,
    Reflect,
    Recover,
    Assert,
    Apply,
    Do,
    Done,
    At,
    Cast,
    Debug,
    Eval,
    Try,
    Export,
}

fn expect_symbol(cell: &Cell) -> SxsResult<String> {
    match cell {
        Cell::Symbol(s) => Ok(s.to_string()),
        other => Err(SxsError::TypeMismatch { expected: ":symbol".to_string(), actual: other.tag(), span: None }),
    }
}

fn expect_string(cell: &Cell) -> SxsResult<Rc<str>> {
    match cell {
        Cell::DqList(s) => Ok(s.clone()),
        other => Err(SxsError::TypeMismatch { expected: ":str".to_string(), actual: other.tag(), span: None }),
    }
}

fn expect_integer(cell: &Cell) -> SxsResult<i64> {
    match cell {
        Cell::Integer(n) => Ok(*n),
        other => Err(SxsError::TypeMismatch { expected: ":int".to_string(), actual: other.tag(), span: None }),
    }
}

fn expect_bracket_list(cell: &Cell) -> SxsResult<Vec<Cell>> {
    match cell {
        Cell::BracketList(items) => Ok(items.to_vec()),
        other => Err(SxsError::TypeMismatch { expected: ":bracket-list".to_string(), actual: other.tag(), span: None }),
    }
}

impl Interpreter {
    /// `def`/`set` (spec.md §4.5): binds the evaluated second operand to
    /// the first operand's symbol in the top frame. Grounded on
    /// `instructions.cpp`'s `set` handler's exact arity-check shape.
    pub(crate) fn op_def_set(&mut self, args: &[Cell]) -> SxsResult<Cell> {
        let name = expect_symbol(&args[0])?;
        let value = self.eval(&args[1])?;
        self.scope.define(name, value);
        Ok(Cell::None)
    }

    /// `fn` (spec.md §4.3): `(fn (params…) :ret [body])`.
    pub(crate) fn op_fn(&mut self, args: &[Cell]) -> SxsResult<Cell> {
        let param_items = match &args[0] {
            Cell::ParenList(items) => items.clone(),
            other => return Err(SxsError::TypeMismatch { expected: ":paren-list".to_string(), actual: other.tag(), span: None }),
        };
        if param_items.len() % 2 != 0 {
            return Err(SxsError::ArityMismatch { op: "fn params".to_string(), expected: param_items.len() + 1, actual: param_items.len() });
        }
        let mut params = Vec::with_capacity(param_items.len() / 2);
        for pair in param_items.chunks(2) {
            let name = expect_symbol(&pair[0])?;
            let type_text = expect_symbol(&pair[1])?;
            let declared_type = TypeTag::parse(&type_text)
                .ok_or_else(|| SxsError::InvalidType { text: type_text.clone() })?;
            params.push(Param { name, declared_type });
        }

        let ret_text = expect_symbol(&args[1])?;
        let return_type =
            TypeTag::parse(&ret_text).ok_or_else(|| SxsError::InvalidType { text: ret_text.clone() })?;

        let body = match &args[2] {
            Cell::BracketList(_) => args[2].clone(),
            other => return Err(SxsError::TypeMismatch { expected: ":bracket-list".to_string(), actual: other.tag(), span: None }),
        };

        let id = self.record_lambda(params, return_type, body);
        Ok(Cell::Aberrant(id))
    }

    /// `if` (spec.md §4.5): `Integer` zero is false, every other value
    /// (including nonzero `Integer`) is true.
    pub(crate) fn op_if(&mut self, args: &[Cell]) -> SxsResult<Cell> {
        let cond = self.eval(&args[0])?;
        if cond.truthy() {
            self.eval(&args[1])
        } else {
            self.eval(&args[2])
        }
    }

    /// `match` (spec.md §4.5): patterns are literal scalars; symbols
    /// resolve before comparing if bound. No match → `Error` cell, never a
    /// throw (spec.md §8's match-exhaustiveness property).
    pub(crate) fn op_match(&mut self, args: &[Cell]) -> SxsResult<Cell> {
        let scrutinee = self.eval(&args[0])?;
        if matches!(scrutinee, Cell::Aberrant(_)) {
            return Err(SxsError::TypeMismatch { expected: "non-aberrant".to_string(), actual: CellTag::Aberrant, span: None });
        }
        for arm in &args[1..] {
            let items = arm.items().ok_or_else(|| SxsError::TypeMismatch {
                expected: ":paren-list arm".to_string(),
                actual: arm.tag(),
                span: None,
            })?;
            if items.len() != 2 {
                return Err(SxsError::ArityMismatch { op: "match arm".to_string(), expected: 2, actual: items.len() });
            }
            let pattern = self.resolve_pattern(&items[0])?;
            if pattern.value_eq(&scrutinee) {
                return self.eval(&items[1]);
            }
        }
        Ok(Cell::Error(Rc::new(Cell::paren_list(vec![Cell::string("no arm matched")]))))
    }

    fn resolve_pattern(&mut self, pattern: &Cell) -> SxsResult<Cell> {
        match pattern {
            Cell::Symbol(name) => self.scope.lookup(name).cloned().ok_or_else(|| SxsError::UnknownSymbol { name: name.to_string() }),
            literal => Ok(literal.clone()),
        }
    }

    /// `reflect` (spec.md §4.5): selects the first arm whose `:type`
    /// matches the runtime tag (or declared signature, for `:aberrant`) of
    /// the evaluated expression.
    pub(crate) fn op_reflect(&mut self, args: &[Cell]) -> SxsResult<Cell> {
        let value = self.eval(&args[0])?;
        for arm in &args[1..] {
            let items = arm.items().ok_or_else(|| SxsError::TypeMismatch {
                expected: ":paren-list arm".to_string(),
                actual: arm.tag(),
                span: None,
            })?;
            if items.len() != 2 {
                return Err(SxsError::ArityMismatch { op: "reflect arm".to_string(), expected: 2, actual: items.len() });
            }
            let type_text = expect_symbol(&items[0])?;
            let declared = TypeTag::parse(&type_text).ok_or_else(|| SxsError::InvalidType { text: type_text.clone() })?;
            if self.reflect_arm_matches(&declared, &value) {
                return self.eval(&items[1]);
            }
        }
        Ok(Cell::Error(Rc::new(Cell::paren_list(vec![Cell::string("no arm matched")]))))
    }

    fn reflect_arm_matches(&self, declared: &TypeTag, value: &Cell) -> bool {
        if let (TypeTag::Fn(sig), Cell::Aberrant(id)) = (declared, value) {
            let Some(record) = self.lambdas.get(*id) else { return false };
            return record.params.len() == sig.params.len()
                && record.params.iter().zip(&sig.params).all(|(p, t)| &p.declared_type == t)
                && record.return_type.to_string() == sig.ret.to_string();
        }
        declared.matches_tag(value.tag())
    }

    /// `recover` (spec.md §4.5): catches thrown failures only, never
    /// `Error` cell values. `$exception` is bound to the failure message.
    pub(crate) fn op_recover(&mut self, args: &[Cell]) -> SxsResult<Cell> {
        let body = expect_bracket_list(&args[0])?;
        match self.eval_body(&body) {
            Ok(value) => Ok(value),
            Err(err) => {
                self.scope.push();
                self.scope.define("$exception", Cell::string(err.to_string()));
                let handler = expect_bracket_list(&args[1])?;
                let result = self.eval_body(&handler);
                self.scope.pop();
                result
            }
        }
    }

    /// `assert` (spec.md §4.5): zero condition throws `AssertFailed` with
    /// the user message verbatim.
    pub(crate) fn op_assert(&mut self, args: &[Cell]) -> SxsResult<Cell> {
        let cond = expect_integer(&self.eval(&args[0])?)?;
        let message = expect_string(&self.eval(&args[1])?)?;
        if cond == 0 {
            return Err(SxsError::AssertFailed { message: message.to_string() });
        }
        Ok(Cell::None)
    }

    /// `apply` (spec.md §4.5): invokes a lambda with a literal brace list's
    /// elements as positional arguments.
    pub(crate) fn op_apply(&mut self, args: &[Cell]) -> SxsResult<Cell> {
        let callee = self.eval(&args[0])?;
        let brace = self.eval(&args[1])?;
        let elements = match &brace {
            Cell::BraceList(items, _) => items.to_vec(),
            other => return Err(SxsError::TypeMismatch { expected: ":list-c".to_string(), actual: other.tag(), span: None }),
        };
        self.eval_apply_value(&callee, &elements)
    }

    /// `do` (spec.md §4.5): pushes a loop frame, runs the body repeatedly
    /// until `done` signals; `$iterations` is 1-based in a pushed scope
    /// each pass.
    pub(crate) fn op_do(&mut self, args: &[Cell]) -> SxsResult<Cell> {
        let body = expect_bracket_list(&args[0])?;
        self.loops.push();
        loop {
            self.scope.push();
            let iteration = self.loops.increment_iteration();
            self.scope.define("$iterations", Cell::Integer(iteration));
            let result = self.eval_body(&body);
            self.scope.pop();
            result?;
            if self.loops.should_exit_innermost() {
                break;
            }
        }
        Ok(self.loops.pop().unwrap_or(Cell::None))
    }

    /// `done` (spec.md §4.5): signals the innermost loop frame; outside a
    /// loop, throws `DoneOutsideLoop`.
    pub(crate) fn op_done(&mut self, args: &[Cell]) -> SxsResult<Cell> {
        let value = self.eval(&args[0])?;
        if !self.loops.signal_done(value) {
            return Err(SxsError::DoneOutsideLoop);
        }
        Ok(Cell::None)
    }

    /// `at` (spec.md §4.5): list indexing returns `Error` on out-of-bounds
    /// (a value, not a throw); `DqList` indexing is byte-oriented.
    pub(crate) fn op_at(&mut self, args: &[Cell]) -> SxsResult<Cell> {
        let index = expect_integer(&self.eval(&args[0])?)?;
        let collection = self.eval(&args[1])?;
        if let Cell::DqList(s) = &collection {
            return Ok(index_bytes(s, index));
        }
        let Some(items) = collection.items() else {
            return Err(SxsError::TypeMismatch { expected: "indexable".to_string(), actual: collection.tag(), span: None });
        };
        if index < 0 || index as usize >= items.len() {
            return Ok(Cell::Error(Rc::new(Cell::paren_list(vec![Cell::string("index out of bounds")]))));
        }
        Ok(items[index as usize].clone())
    }

    /// `cast` (spec.md §4.5): retags a brace list as a user-defined form;
    /// a shape mismatch throws (spec.md §9's open-question resolution).
    pub(crate) fn op_cast(&mut self, args: &[Cell]) -> SxsResult<Cell> {
        let form_name = expect_symbol(&args[0])?;
        let value = self.eval(&args[1])?;
        let Cell::BraceList(items, _) = &value else {
            return Err(SxsError::TypeMismatch { expected: ":list-c".to_string(), actual: value.tag(), span: None });
        };
        let shape = self
            .forms
            .get(&form_name)
            .cloned()
            .ok_or_else(|| SxsError::InvalidType { text: form_name.clone() })?;
        let tags: Vec<CellTag> = items.iter().map(Cell::tag).collect();
        if !shape.matches(&tags) {
            return Err(SxsError::TypeMismatch {
                expected: format!("form {form_name}"),
                actual: CellTag::BraceList,
                span: None,
            });
        }
        Ok(Cell::form(items.to_vec(), form_name))
    }

    /// `debug` (spec.md §4.5, SPEC_FULL.md §2.1): emits each argument's
    /// printed form, `[DEBUG]`-prefixed and space-separated, and returns
    /// `Integer(0)`. Shared with `#(debug …)` via `debug_emit`.
    pub(crate) fn op_debug(&mut self, args: &[Cell]) -> SxsResult<Cell> {
        self.debug_emit(args)
    }

    pub(crate) fn debug_emit(&mut self, args: &[Cell]) -> SxsResult<Cell> {
        let mut line = String::from("[DEBUG]");
        for arg in args {
            let value = self.eval(arg)?;
            line.push(' ');
            line.push_str(&crate::printer::print_cell(&value));
        }
        self.printer.print_line(&line);
        Ok(Cell::Integer(0))
    }

    /// `eval` (spec.md §4.5): parses a `DqList` argument as a cell, then
    /// evaluates it in the current scope.
    pub(crate) fn op_eval(&mut self, args: &[Cell]) -> SxsResult<Cell> {
        let value = self.eval(&args[0])?;
        let Cell::DqList(text) = &value else {
            return Err(SxsError::EvalRequiresString);
        };
        let parsed = crate::parser::parse_one(text)?;
        self.eval(&parsed)
    }

    /// `try` (spec.md §4.5): evaluates the first arm; on a thrown failure,
    /// evaluates and returns the second.
    pub(crate) fn op_try(&mut self, args: &[Cell]) -> SxsResult<Cell> {
        match self.eval(&args[0]) {
            Ok(value) => Ok(value),
            Err(_) => self.eval(&args[1]),
        }
    }

    /// `export` (spec.md §4.5): `def` plus marking the binding visible
    /// through the file's import prefix.
    pub(crate) fn op_export(&mut self, args: &[Cell]) -> SxsResult<Cell> {
        let name = expect_symbol(&args[0])?;
        let value = self.eval(&args[1])?;
        self.scope.define(name.clone(), value);
        self.mark_exported(&name);
        Ok(Cell::None)
    }
}

fn index_bytes(s: &str, index: i64) -> Cell {
    let bytes = s.as_bytes();
    if index < 0 || index as usize >= bytes.len() {
        return Cell::Error(Rc::new(Cell::paren_list(vec![Cell::string("index out of bounds")])));
    }
    Cell::Integer(i64::from(bytes[index as usize]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn op_parses_from_str() {
        assert_eq!("def".parse::<Op>().unwrap(), Op::Def);
        assert_eq!("do".parse::<Op>().unwrap(), Op::Do);
        assert!("not-an-op".parse::<Op>().is_err());
    }

    #[test]
    fn at_out_of_bounds_is_error_cell_not_throw() {
        let mut interp = Interpreter::new_root();
        let result = interp.run_source("(at 5 [1 2])").unwrap();
        assert_eq!(result.tag(), CellTag::Error);
    }

    #[test]
    fn at_indexes_string_as_bytes() {
        let mut interp = Interpreter::new_root();
        let result = interp.run_source(r#"(at 0 "hi")"#).unwrap();
        assert_eq!(result, Cell::Integer(b'h' as i64));
    }
}
