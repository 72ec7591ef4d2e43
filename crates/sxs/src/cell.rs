//! The SLP object model: tagged, immutable cells shared by reference count.
//!
//! Grounded on spec.md §3 and the teacher's `Object`/`Heap` split
//! (`examples/scostello-monty/src/object.rs`, `src/heap.rs`): small immediate
//! values live inline, aggregate values live behind a shared pointer. Unlike
//! the teacher's mutable arena, a cell is immutable once constructed (spec.md
//! §3 invariant), so child cells are `Rc<Cell>` rather than arena handles —
//! there is no refcount bookkeeping to get wrong, `Rc::clone` is the refcount.

use std::fmt;
use std::rc::Rc;

/// The closed tag set from spec.md §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum CellTag {
    #[strum(serialize = "none")]
    None,
    #[strum(serialize = "some")]
    Some,
    #[strum(serialize = "paren-list")]
    ParenList,
    #[strum(serialize = "bracket-list")]
    BracketList,
    #[strum(serialize = "brace-list")]
    BraceList,
    #[strum(serialize = "dq-list")]
    DqList,
    #[strum(serialize = "symbol")]
    Symbol,
    #[strum(serialize = "rune")]
    Rune,
    #[strum(serialize = "integer")]
    Integer,
    #[strum(serialize = "real")]
    Real,
    #[strum(serialize = "error")]
    Error,
    #[strum(serialize = "datum")]
    Datum,
    #[strum(serialize = "aberrant")]
    Aberrant,
    #[strum(serialize = "environment")]
    Environment,
}

/// A tagged cell. Cheap to clone: `Rc::clone` on the payload, no deep copy.
///
/// `ParenList`/`BracketList`/`BraceList`/`Datum` share the same payload shape
/// (an ordered child vector) and are distinguished only by tag, mirroring
/// spec.md §4.1's grammar (a datum directive parses exactly like a paren
/// list, just tagged differently).
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    None,
    Some(Rc<Cell>),
    ParenList(Rc<Vec<Cell>>),
    BracketList(Rc<Vec<Cell>>),
    BraceList(Rc<Vec<Cell>>, Option<Rc<str>>),
    DqList(Rc<str>),
    Symbol(Rc<str>),
    Rune(char),
    Integer(i64),
    Real(f64),
    Error(Rc<Cell>),
    Datum(Rc<Vec<Cell>>),
    Aberrant(u64),
    Environment,
}

impl Cell {
    #[must_use]
    pub fn symbol(name: impl Into<Rc<str>>) -> Self {
        Self::Symbol(name.into())
    }

    #[must_use]
    pub fn string(text: impl Into<Rc<str>>) -> Self {
        Self::DqList(text.into())
    }

    #[must_use]
    pub fn paren_list(items: Vec<Cell>) -> Self {
        Self::ParenList(Rc::new(items))
    }

    #[must_use]
    pub fn bracket_list(items: Vec<Cell>) -> Self {
        Self::BracketList(Rc::new(items))
    }

    #[must_use]
    pub fn brace_list(items: Vec<Cell>) -> Self {
        Self::BraceList(Rc::new(items), None)
    }

    /// A brace list cast/constructed as a named user form (spec.md §4.7).
    #[must_use]
    pub fn form(items: Vec<Cell>, form_name: impl Into<Rc<str>>) -> Self {
        Self::BraceList(Rc::new(items), Some(form_name.into()))
    }

    #[must_use]
    pub fn tag(&self) -> CellTag {
        match self {
            Self::None => CellTag::None,
            Self::Some(_) => CellTag::Some,
            Self::ParenList(_) => CellTag::ParenList,
            Self::BracketList(_) => CellTag::BracketList,
            Self::BraceList(..) => CellTag::BraceList,
            Self::DqList(_) => CellTag::DqList,
            Self::Symbol(_) => CellTag::Symbol,
            Self::Rune(_) => CellTag::Rune,
            Self::Integer(_) => CellTag::Integer,
            Self::Real(_) => CellTag::Real,
            Self::Error(_) => CellTag::Error,
            Self::Datum(_) => CellTag::Datum,
            Self::Aberrant(_) => CellTag::Aberrant,
            Self::Environment => CellTag::Environment,
        }
    }

    /// Children of any list-shaped cell (`ParenList`/`BracketList`/
    /// `BraceList`/`Datum`); `None` for every other tag.
    #[must_use]
    pub fn items(&self) -> Option<&[Cell]> {
        match self {
            Self::ParenList(v) | Self::BracketList(v) | Self::Datum(v) => Some(v),
            Self::BraceList(v, _) => Some(v),
            _ => None,
        }
    }

    /// The user-declared form name, if this is a cast/constructed form value.
    #[must_use]
    pub fn form_name(&self) -> Option<&str> {
        match self {
            Self::BraceList(_, Some(name)) => Some(name),
            _ => None,
        }
    }

    /// Truthiness per spec.md §4.5 `if`: `Integer` zero is false, every other
    /// value (including `Integer` nonzero) is true.
    #[must_use]
    pub fn truthy(&self) -> bool {
        !matches!(self, Self::Integer(0))
    }

    /// Pointer identity of this cell's heap payload, used to correlate a
    /// cell with the source span it was parsed from (`error::SpanMap`).
    /// Scalars with no heap payload (`Integer`, `Real`, `Rune`, `None`,
    /// `Aberrant`, `Environment`) have no identity to key on.
    #[must_use]
    pub fn span_key(&self) -> Option<usize> {
        match self {
            Self::Some(inner) | Self::Error(inner) => Some(Rc::as_ptr(inner) as usize),
            Self::ParenList(items) | Self::BracketList(items) | Self::Datum(items) => {
                Some(Rc::as_ptr(items) as usize)
            }
            Self::BraceList(items, _) => Some(Rc::as_ptr(items) as usize),
            Self::DqList(s) | Self::Symbol(s) => Some(Rc::as_ptr(s) as *const u8 as usize),
            Self::None | Self::Rune(_) | Self::Integer(_) | Self::Real(_) | Self::Aberrant(_) | Self::Environment => {
                None
            }
        }
    }

    /// Value-equality used by `match` patterns (spec.md §4.5): same tag,
    /// same scalar payload. Aberrant compares by lambda ID.
    #[must_use]
    pub fn value_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Integer(a), Self::Integer(b)) => a == b,
            (Self::Real(a), Self::Real(b)) => a == b,
            (Self::DqList(a), Self::DqList(b)) => a == b,
            (Self::Symbol(a), Self::Symbol(b)) => a == b,
            (Self::Rune(a), Self::Rune(b)) => a == b,
            (Self::Aberrant(a), Self::Aberrant(b)) => a == b,
            (Self::None, Self::None) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Some(inner) => write!(f, "'{inner}"),
            Self::ParenList(items) => write_list(f, '(', ')', items),
            Self::BracketList(items) => write_list(f, '[', ']', items),
            Self::BraceList(items, _) => write_list(f, '{', '}', items),
            Self::DqList(s) => write!(f, "\"{}\"", escape_string(s)),
            Self::Symbol(s) => write!(f, "{s}"),
            Self::Rune(c) => write!(f, "{c}"),
            Self::Integer(n) => write!(f, "{n}"),
            Self::Real(n) => write!(f, "{}", format_real(*n)),
            Self::Error(payload) => write!(f, "@{payload}"),
            Self::Datum(items) => {
                write!(f, "#")?;
                write_list(f, '(', ')', items)
            }
            Self::Aberrant(id) => write!(f, "?fn<{id}>"),
            Self::Environment => write!(f, "<environment>"),
        }
    }
}

/// Renders a real so it always keeps a decimal point: Rust's default `f64`
/// `Display` prints a whole-valued real like `5.0` as `"5"`, which the
/// parser reads back as `Integer(5)` instead (spec.md §8's parse-round-trip
/// invariant: `parse(print(c)) == c`).
fn format_real(n: f64) -> String {
    let s = n.to_string();
    if s.contains('.') || s.contains("inf") || s.contains("NaN") {
        s
    } else {
        format!("{s}.0")
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, open: char, close: char, items: &[Cell]) -> fmt::Result {
    write!(f, "{open}")?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, " ")?;
        }
        write!(f, "{item}")?;
    }
    write!(f, "{close}")
}

fn escape_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            _ => out.push(c),
        }
    }
    out
}
