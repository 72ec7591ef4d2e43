//! Base type tags and function-signature types used by `fn`/`cast`/`reflect`
//! and mirrored (without execution) by the `tcs` checker.
//!
//! Grounded on spec.md §4.7: the closed set of `:`-prefixed type symbols plus
//! the `:fn<T1,T2,...>R` signature form.

use std::fmt;
use std::str::FromStr;

use crate::cell::CellTag;

/// A base type tag, as recognized textually by a leading-colon symbol.
///
/// Parsing/printing are hand-rolled rather than `strum`-derived because the
/// `Fn` variant carries a nested `:fn<...>R` signature that the derive
/// macros can't express; the other tags are still the same flat, closed set
/// `strum` handles elsewhere in this crate (see `builtins::Op`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeTag {
    Int,
    Real,
    Str,
    Symbol,
    None,
    Some,
    Rune,
    Error,
    Datum,
    Aberrant,
    ListP,
    ListB,
    ListC,
    /// `:fn<T1,T2,...>R` — a lambda signature: parameter types plus return type.
    Fn(FnSignature),
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int => write!(f, ":int"),
            Self::Real => write!(f, ":real"),
            Self::Str => write!(f, ":str"),
            Self::Symbol => write!(f, ":symbol"),
            Self::None => write!(f, ":none"),
            Self::Some => write!(f, ":some"),
            Self::Rune => write!(f, ":rune"),
            Self::Error => write!(f, ":error"),
            Self::Datum => write!(f, ":datum"),
            Self::Aberrant => write!(f, ":aberrant"),
            Self::ListP => write!(f, ":list-p"),
            Self::ListB => write!(f, ":list-b"),
            Self::ListC => write!(f, ":list-c"),
            Self::Fn(sig) => write!(f, "{sig}"),
        }
    }
}

/// A lambda's declared parameter types and return type, as written in a
/// `:fn<T1,T2,...>R` signature symbol (used by `reflect` arms and by `tcs`
/// when checking a call against a declared lambda type).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FnSignature {
    pub params: Vec<TypeTag>,
    pub ret: Box<TypeTag>,
}

impl fmt::Display for FnSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ":fn<")?;
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{p}")?;
        }
        write!(f, ">{}", self.ret)
    }
}

/// Parses a single base tag (not `:fn<...>R`, which only `TypeTag::parse`
/// handles, since it needs to recurse).
impl FromStr for TypeTag {
    type Err = ();

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        Self::base_from_str(text).ok_or(())
    }
}

impl TypeTag {
    /// Parses a type symbol's text (including the leading `:`) into a `TypeTag`.
    ///
    /// Handles the closed set of base tags plus the `:fn<...>R` signature form,
    /// which `strum::EnumString` cannot express on its own.
    pub fn parse(text: &str) -> Option<Self> {
        if let Some(inner) = text.strip_prefix(":fn<") {
            let close = inner.find('>')?;
            let (params_text, rest) = inner.split_at(close);
            let ret_text = &rest[1..];
            if ret_text.is_empty() {
                return None;
            }
            let params = if params_text.is_empty() {
                Vec::new()
            } else {
                params_text
                    .split(',')
                    .map(|p| Self::parse(p.trim()))
                    .collect::<Option<Vec<_>>>()?
            };
            let ret = Box::new(Self::parse(ret_text)?);
            return Some(Self::Fn(FnSignature { params, ret }));
        }
        text.parse().ok()
    }

    /// The base tags, for `FromStr`'s lookup; `Fn` is handled separately by
    /// `parse` and has no fixed textual form of its own.
    fn base_from_str(text: &str) -> Option<Self> {
        Some(match text {
            ":int" => Self::Int,
            ":real" => Self::Real,
            ":str" => Self::Str,
            ":symbol" => Self::Symbol,
            ":none" => Self::None,
            ":some" => Self::Some,
            ":rune" => Self::Rune,
            ":error" => Self::Error,
            ":datum" => Self::Datum,
            ":aberrant" => Self::Aberrant,
            ":list-p" => Self::ListP,
            ":list-b" => Self::ListB,
            ":list-c" => Self::ListC,
            _ => return None,
        })
    }

    /// Whether a runtime cell's tag satisfies this declared type.
    ///
    /// `:none` matches anything (spec.md §4.3 step 3, §4.7 open question on
    /// return-position `:none`, resolved in DESIGN.md: it matches in both
    /// parameter and return position).
    #[must_use]
    pub fn matches_tag(&self, tag: CellTag) -> bool {
        match self {
            Self::None => true,
            Self::Int => tag == CellTag::Integer,
            Self::Real => tag == CellTag::Real,
            Self::Str => tag == CellTag::DqList,
            Self::Symbol => tag == CellTag::Symbol,
            Self::Some => tag == CellTag::Some,
            Self::Rune => tag == CellTag::Rune,
            Self::Error => tag == CellTag::Error,
            Self::Datum => tag == CellTag::Datum,
            Self::Aberrant | Self::Fn(_) => tag == CellTag::Aberrant,
            Self::ListP => tag == CellTag::ParenList,
            Self::ListB => tag == CellTag::BracketList,
            Self::ListC => tag == CellTag::BraceList,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_base_tags() {
        assert_eq!(TypeTag::parse(":int"), Some(TypeTag::Int));
        assert_eq!(TypeTag::parse(":none"), Some(TypeTag::None));
        assert_eq!(TypeTag::parse(":bogus"), None);
    }

    #[test]
    fn parses_fn_signature() {
        let sig = TypeTag::parse(":fn<:int,:int>:int").unwrap();
        match sig {
            TypeTag::Fn(sig) => {
                assert_eq!(sig.params, vec![TypeTag::Int, TypeTag::Int]);
                assert_eq!(*sig.ret, TypeTag::Int);
            }
            _ => panic!("expected Fn"),
        }
    }

    #[test]
    fn none_matches_any_tag() {
        assert!(TypeTag::None.matches_tag(CellTag::Integer));
        assert!(TypeTag::None.matches_tag(CellTag::DqList));
    }

    #[test]
    fn int_matches_only_integer() {
        assert!(TypeTag::Int.matches_tag(CellTag::Integer));
        assert!(!TypeTag::Int.matches_tag(CellTag::Real));
    }
}
