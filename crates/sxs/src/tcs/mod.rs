//! The static type-and-scope checker (spec.md §4.7): a parallel abstract
//! evaluator that mirrors `Interpreter`'s traversal shape but replaces
//! evaluation with type inference and never executes side effects or loads
//! dylibs.

use ahash::AHashMap;

use crate::cell::{Cell, CellTag};
use crate::diagnostics::Diagnostic;
use crate::error::{SourceSpan, SpanMap};
use crate::types::TypeTag;

/// More precise than a bare cell tag: tracks user-defined form names and
/// lambda identity, per spec.md §3 "TypeInfo (checker only)".
#[derive(Debug, Clone, PartialEq)]
pub struct TypeInfo {
    pub base_type: TypeTag,
    pub form_name: Option<String>,
    pub lambda_id: Option<u64>,
    pub is_variadic: bool,
}

impl TypeInfo {
    fn of(base_type: TypeTag) -> Self {
        Self { base_type, form_name: None, lambda_id: None, is_variadic: false }
    }

    fn none() -> Self {
        Self::of(TypeTag::None)
    }

    /// Structural compatibility used when two branches/arms must agree
    /// (spec.md §4.7's `if`/`match`/`reflect`/`recover`/`try` rules).
    /// `:none` is compatible with anything, mirroring `TypeTag::matches_tag`.
    fn compatible(&self, other: &Self) -> bool {
        self.base_type == TypeTag::None
            || other.base_type == TypeTag::None
            || self.base_type == other.base_type
    }
}

#[derive(Debug, Clone)]
struct LambdaSig {
    params: Vec<TypeTag>,
    ret: TypeTag,
}

struct CheckerFrame {
    bindings: AHashMap<String, TypeInfo>,
}

/// Collected diagnostics plus overall pass/fail, per spec.md §7: "the
/// checker does not short-circuit on the first error unless the
/// surrounding construct's type is unrecoverable."
pub struct CheckReport {
    pub ok: bool,
    pub diagnostics: Vec<Diagnostic>,
}

pub struct Checker<'s> {
    source: &'s str,
    frames: Vec<CheckerFrame>,
    lambdas: AHashMap<u64, LambdaSig>,
    next_lambda_id: u64,
    forms: AHashMap<String, crate::forms::FormShape>,
    diagnostics: Vec<Diagnostic>,
    include_paths: Vec<std::path::PathBuf>,
    spans: SpanMap,
}

impl<'s> Checker<'s> {
    #[must_use]
    pub fn new(source: &'s str) -> Self {
        Self {
            source,
            frames: vec![CheckerFrame { bindings: AHashMap::new() }],
            lambdas: AHashMap::new(),
            next_lambda_id: 0,
            forms: AHashMap::new(),
            diagnostics: Vec::new(),
            include_paths: Vec::new(),
            spans: SpanMap::default(),
        }
    }

    #[must_use]
    pub fn with_include_paths(mut self, paths: Vec<std::path::PathBuf>) -> Self {
        self.include_paths = paths;
        self
    }

    /// Attaches the span map `parser::parse_program_with_spans` produced for
    /// `source`, so diagnostics point at the cell that caused them instead of
    /// always byte offset 0.
    #[must_use]
    pub fn with_spans(mut self, spans: SpanMap) -> Self {
        self.spans = spans;
        self
    }

    /// Runs the checker over every top-level cell, returning a full report
    /// (never stops at the first recoverable diagnostic).
    pub fn check_program(cells: &[Cell], source: &'s str) -> CheckReport {
        Self::check_program_with_include_paths(cells, source, Vec::new())
    }

    /// Same as `check_program`, but resolves `#(import …)` paths against
    /// `include_paths` too, matching `Interpreter::with_include_paths`.
    pub fn check_program_with_include_paths(
        cells: &[Cell],
        source: &'s str,
        include_paths: Vec<std::path::PathBuf>,
    ) -> CheckReport {
        Self::check_program_with_spans(cells, source, include_paths, SpanMap::default())
    }

    /// Same as `check_program_with_include_paths`, but also takes the
    /// `SpanMap` produced by parsing the same `source` with
    /// `parser::parse_program_with_spans`, so diagnostics locate the real
    /// offending token rather than always line 1, column 1.
    pub fn check_program_with_spans(
        cells: &[Cell],
        source: &'s str,
        include_paths: Vec<std::path::PathBuf>,
        spans: SpanMap,
    ) -> CheckReport {
        let mut checker = Self::new(source).with_include_paths(include_paths).with_spans(spans);
        let mut fatal = false;
        for cell in cells {
            if checker.check_cell(cell).is_err() {
                fatal = true;
                break;
            }
        }
        CheckReport { ok: !fatal && checker.diagnostics.is_empty(), diagnostics: checker.diagnostics }
    }

    /// The span recorded for `cell` during parsing, if the checker was built
    /// with a span map and `cell` has one (scalars with no heap payload never
    /// do; see `Cell::span_key`).
    fn span_of(&self, cell: &Cell) -> Option<SourceSpan> {
        cell.span_key().and_then(|key| self.spans.get(&key)).copied()
    }

    fn error(&mut self, message: impl Into<String>, span: Option<SourceSpan>) {
        let span = Some(span.unwrap_or_else(|| SourceSpan::locate(self.source, 0)));
        self.diagnostics.push(Diagnostic { message: message.into(), span });
    }

    fn define(&mut self, name: &str, info: TypeInfo, span: Option<SourceSpan>) {
        let top = self.frames.last_mut().expect("checker scope always has a top frame");
        if top.bindings.contains_key(name) {
            self.error(format!("redefinition: {name} is already defined in this scope"), span);
            return;
        }
        top.bindings.insert(name.to_string(), info);
    }

    fn lookup(&self, name: &str) -> Option<&TypeInfo> {
        self.frames.iter().rev().find_map(|f| f.bindings.get(name))
    }

    fn push(&mut self) {
        self.frames.push(CheckerFrame { bindings: AHashMap::new() });
    }

    fn pop(&mut self) {
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    /// Type-infers one cell. `Err(())` marks an unrecoverable stop (an
    /// unresolved symbol where a lambda call was expected); every other
    /// problem is recorded as a diagnostic and checking continues with a
    /// best-effort `:none` result so later siblings still get checked.
    fn check_cell(&mut self, cell: &Cell) -> Result<TypeInfo, ()> {
        match cell {
            Cell::Integer(_) => Ok(TypeInfo::of(TypeTag::Int)),
            Cell::Real(_) => Ok(TypeInfo::of(TypeTag::Real)),
            Cell::DqList(_) => Ok(TypeInfo::of(TypeTag::Str)),
            Cell::Rune(_) => Ok(TypeInfo::of(TypeTag::Rune)),
            Cell::None => Ok(TypeInfo::of(TypeTag::None)),
            Cell::Some(_) => Ok(TypeInfo::of(TypeTag::Some)),
            Cell::Error(_) => Ok(TypeInfo::of(TypeTag::Error)),
            Cell::Aberrant(_) => Ok(TypeInfo::of(TypeTag::Aberrant)),
            Cell::Environment => Ok(TypeInfo::none()),
            Cell::Symbol(name) => Ok(self.lookup(name).cloned().unwrap_or_else(|| {
                let span = self.span_of(cell);
                self.error(format!("unknown_symbol: {name}"), span);
                TypeInfo::none()
            })),
            Cell::BraceList(items, form_name) => {
                for item in items.iter() {
                    self.check_cell(item)?;
                }
                Ok(TypeInfo { base_type: TypeTag::ListC, form_name: form_name.as_deref().map(String::from), lambda_id: None, is_variadic: false })
            }
            Cell::BracketList(items) => {
                let mut last = TypeInfo::none();
                for item in items.iter() {
                    last = self.check_cell(item)?;
                }
                Ok(last)
            }
            Cell::ParenList(items) => {
                let span = self.span_of(cell);
                self.check_call(items, span)
            }
            Cell::Datum(items) => {
                let span = self.span_of(cell);
                self.check_datum(items, span)
            }
        }
    }

    fn check_call(&mut self, items: &[Cell], call_span: Option<SourceSpan>) -> Result<TypeInfo, ()> {
        let Some(head) = items.first() else {
            return Ok(TypeInfo::none());
        };
        let args = &items[1..];
        if let Cell::Symbol(name) = head {
            if name.contains('/') {
                // Import/kernel calls are checked against a manifest the
                // checker does not load eagerly here; treat as `:none`
                // (unknown at static time) unless a specific diagnostic
                // applies, matching spec.md §4.7's import/kernel checking.
                for arg in args {
                    self.check_cell(arg)?;
                }
                return Ok(TypeInfo::none());
            }
            if let Ok(op) = name.parse::<crate::builtins::Op>() {
                return self.check_builtin(op, args, call_span);
            }
        }
        let callee = self.check_cell(head)?;
        self.check_lambda_call(&callee, args, call_span)
    }

    fn check_lambda_call(
        &mut self,
        callee: &TypeInfo,
        args: &[Cell],
        call_span: Option<SourceSpan>,
    ) -> Result<TypeInfo, ()> {
        let arg_types: Vec<TypeInfo> = args.iter().map(|a| self.check_cell(a)).collect::<Result<_, _>>()?;
        let Some(id) = callee.lambda_id else {
            return Ok(TypeInfo::none());
        };
        let Some(sig) = self.lambdas.get(&id).cloned() else {
            return Ok(TypeInfo::none());
        };
        if sig.params.len() != arg_types.len() {
            self.error(
                format!("arity_mismatch: expected {}, got {}", sig.params.len(), arg_types.len()),
                call_span,
            );
            return Ok(TypeInfo::of(sig.ret));
        }
        for (declared, actual) in sig.params.iter().zip(&arg_types) {
            if !type_compatible(declared, &actual.base_type) {
                self.error(format!("type_error: expected {declared}, got {}", actual.base_type), call_span);
            }
        }
        Ok(TypeInfo::of(sig.ret))
    }

    fn check_datum(&mut self, items: &[Cell], call_span: Option<SourceSpan>) -> Result<TypeInfo, ()> {
        let Some(Cell::Symbol(directive)) = items.first() else {
            return Ok(TypeInfo::none());
        };
        let args = &items[1..];
        match directive.as_ref() {
            "import" => self.check_import(args, call_span),
            "define-form" => {
                self.check_define_form(args);
                Ok(TypeInfo::none())
            }
            _ => {
                for arg in args {
                    self.check_cell(arg)?;
                }
                Ok(TypeInfo::none())
            }
        }
    }

    fn check_import(&mut self, args: &[Cell], call_span: Option<SourceSpan>) -> Result<TypeInfo, ()> {
        let Some(Cell::DqList(path)) = args.get(1) else {
            return Ok(TypeInfo::none());
        };
        let found = std::path::Path::new(path.as_ref()).is_file()
            || self.include_paths.iter().any(|dir| dir.join(path.as_ref()).is_file());
        if !found {
            self.error(format!("import_not_found: {path}"), call_span);
        }
        Ok(TypeInfo::none())
    }

    fn check_define_form(&mut self, args: &[Cell]) {
        let (Some(Cell::Symbol(name)), Some(shape_cell)) = (args.first(), args.get(1)) else {
            return;
        };
        let shape = match shape_cell {
            Cell::ParenList(items) => {
                let types: Vec<TypeTag> = items
                    .iter()
                    .filter_map(|c| if let Cell::Symbol(s) = c { TypeTag::parse(s) } else { None })
                    .collect();
                crate::forms::FormShape::Fields(types)
            }
            Cell::Symbol(s) => {
                let Some(t) = TypeTag::parse(s) else { return };
                crate::forms::FormShape::Variadic(t)
            }
            _ => return,
        };
        self.forms.insert(name.to_string(), shape);
    }

    fn check_builtin(
        &mut self,
        op: crate::builtins::Op,
        args: &[Cell],
        call_span: Option<SourceSpan>,
    ) -> Result<TypeInfo, ()> {
        use crate::builtins::Op;
        match op {
            Op::Def | Op::Set | Op::Export => {
                if let (Some(Cell::Symbol(name)), Some(value)) = (args.first(), args.get(1)) {
                    let info = self.check_cell(value)?;
                    let span = self.span_of(&args[0]);
                    self.define(name, info, span);
                }
                Ok(TypeInfo::none())
            }
            Op::Fn => self.check_fn(args),
            Op::If => {
                if let Some(cond) = args.first() {
                    let cond_ty = self.check_cell(cond)?;
                    if cond_ty.base_type != TypeTag::Int && cond_ty.base_type != TypeTag::None {
                        self.error("type_error: if condition must be :int", call_span);
                    }
                }
                let then_ty = args.get(1).map(|c| self.check_cell(c)).transpose()?.unwrap_or_else(TypeInfo::none);
                let else_ty = args.get(2).map(|c| self.check_cell(c)).transpose()?.unwrap_or_else(TypeInfo::none);
                if !then_ty.compatible(&else_ty) {
                    self.error(
                        format!("type_error: expected {}, got {}", then_ty.base_type, else_ty.base_type),
                        call_span,
                    );
                }
                Ok(then_ty)
            }
            Op::Match => {
                if let Some(scrutinee) = args.first() {
                    self.check_cell(scrutinee)?;
                }
                let mut result = TypeInfo::none();
                for arm in &args[1..] {
                    if let Some(items) = arm.items() {
                        if items.len() == 2 {
                            let arm_ty = self.check_cell(&items[1])?;
                            if result.base_type != TypeTag::None && !result.compatible(&arm_ty) {
                                self.error("type_error: match arms must agree", call_span);
                            }
                            result = arm_ty;
                        }
                    }
                }
                Ok(result)
            }
            Op::Reflect => {
                if let Some(expr) = args.first() {
                    self.check_cell(expr)?;
                }
                let mut result = TypeInfo::none();
                for arm in &args[1..] {
                    if let Some(items) = arm.items() {
                        if items.len() == 2 {
                            result = self.check_cell(&items[1])?;
                        }
                    }
                }
                Ok(result)
            }
            Op::Recover | Op::Try => {
                let first = args.first().map(|c| self.check_cell(c)).transpose()?.unwrap_or_else(TypeInfo::none);
                self.push();
                self.define("$exception", TypeInfo::of(TypeTag::Str), None);
                let second = args.get(1).map(|c| self.check_cell(c)).transpose()?.unwrap_or_else(TypeInfo::none);
                self.pop();
                if !first.compatible(&second) {
                    self.error(
                        format!("type_error: expected {}, got {}", first.base_type, second.base_type),
                        call_span,
                    );
                }
                Ok(first)
            }
            Op::Assert => {
                if let Some(cond) = args.first() {
                    let ty = self.check_cell(cond)?;
                    if ty.base_type != TypeTag::Int && ty.base_type != TypeTag::None {
                        self.error("type_error: assert condition must be :int", call_span);
                    }
                }
                if let Some(message) = args.get(1) {
                    let ty = self.check_cell(message)?;
                    if ty.base_type != TypeTag::Str && ty.base_type != TypeTag::None {
                        self.error("type_error: assert message must be :str", call_span);
                    }
                }
                Ok(TypeInfo::none())
            }
            Op::Apply => {
                let callee = args.first().map(|c| self.check_cell(c)).transpose()?.unwrap_or_else(TypeInfo::none);
                if let Some(Cell::BraceList(items, _)) = args.get(1) {
                    return self.check_lambda_call(&callee, items, call_span);
                }
                Ok(TypeInfo::none())
            }
            Op::Do => {
                self.push();
                self.define("$iterations", TypeInfo::of(TypeTag::Int), None);
                let ty = args.first().map(|c| self.check_cell(c)).transpose()?.unwrap_or_else(TypeInfo::none);
                self.pop();
                Ok(ty)
            }
            Op::Done => args.first().map(|c| self.check_cell(c)).transpose().map(|o| o.unwrap_or_else(TypeInfo::none)),
            Op::At => {
                for arg in args {
                    self.check_cell(arg)?;
                }
                Ok(TypeInfo::none())
            }
            Op::Cast => {
                if let Some(value) = args.get(1) {
                    self.check_cell(value)?;
                }
                Ok(TypeInfo::of(TypeTag::ListC))
            }
            Op::Debug => {
                for arg in args {
                    self.check_cell(arg)?;
                }
                Ok(TypeInfo::of(TypeTag::Int))
            }
            Op::Eval => {
                if let Some(arg) = args.first() {
                    let ty = self.check_cell(arg)?;
                    if ty.base_type != TypeTag::Str && ty.base_type != TypeTag::None {
                        self.error("type_error: eval requires :str", call_span);
                    }
                }
                Ok(TypeInfo::none())
            }
        }
    }

    fn check_fn(&mut self, args: &[Cell]) -> Result<TypeInfo, ()> {
        let Some(Cell::ParenList(param_items)) = args.first() else {
            return Ok(TypeInfo::none());
        };
        let mut params = Vec::new();
        self.push();
        for pair in param_items.chunks(2) {
            let (Cell::Symbol(name), Cell::Symbol(type_text)) = (&pair[0], &pair[1]) else { continue };
            let Some(declared_type) = TypeTag::parse(type_text) else {
                let span = self.span_of(&pair[1]);
                self.error(format!("invalid_type: {type_text}"), span);
                continue;
            };
            let span = self.span_of(&pair[0]);
            self.define(name, TypeInfo::of(declared_type.clone()), span);
            params.push(declared_type);
        }
        let ret = args
            .get(1)
            .and_then(|c| if let Cell::Symbol(s) = c { TypeTag::parse(s) } else { None })
            .unwrap_or(TypeTag::None);
        if let Some(Cell::BracketList(body)) = args.get(2) {
            for item in body.iter() {
                self.check_cell(item)?;
            }
        }
        self.pop();

        let id = self.next_lambda_id;
        self.next_lambda_id += 1;
        self.lambdas.insert(id, LambdaSig { params, ret });
        Ok(TypeInfo { base_type: TypeTag::Aberrant, form_name: None, lambda_id: Some(id), is_variadic: false })
    }
}

fn type_compatible(declared: &TypeTag, actual: &TypeTag) -> bool {
    *declared == TypeTag::None || *actual == TypeTag::None || declared == actual
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_program;

    fn check(src: &str) -> CheckReport {
        let cells = parse_program(src).unwrap();
        Checker::check_program(&cells, src)
    }

    #[test]
    fn rejects_if_branch_type_mismatch() {
        let report = check(r#"(def r (if 1 42 "string"))"#);
        assert!(!report.ok);
    }

    #[test]
    fn rejects_call_type_mismatch() {
        let report = check(r#"(def add (fn (a :int) :int [42])) (add "x")"#);
        assert!(!report.ok);
    }

    #[test]
    fn rejects_redefinition_in_same_scope() {
        let report = check("(def x 1) (def x 2)");
        assert!(!report.ok);
    }

    #[test]
    fn rejects_import_not_found() {
        let report = check(r#"[#(import a "missing.sxs")]"#);
        assert!(!report.ok);
    }

    #[test]
    fn accepts_well_typed_program() {
        let report = check("(def x 1) (def y (if x 1 2))");
        assert!(report.ok);
    }
}
