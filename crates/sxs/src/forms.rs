//! User-defined forms (spec.md §4.7): a named structural type built atop a
//! brace list, registered via `#(define-form <name> <shape>)`.

use ahash::AHashMap;

use crate::cell::CellTag;
use crate::types::TypeTag;

/// The field-type shape of a declared form: either a fixed sequence of
/// field types, or a single homogeneous variadic element type.
#[derive(Debug, Clone)]
pub enum FormShape {
    Fields(Vec<TypeTag>),
    Variadic(TypeTag),
}

impl FormShape {
    /// Whether `field_tags` (the runtime tags of a brace list's elements,
    /// in order) satisfies this shape.
    #[must_use]
    pub fn matches(&self, field_tags: &[CellTag]) -> bool {
        match self {
            Self::Fields(types) => {
                types.len() == field_tags.len()
                    && types.iter().zip(field_tags).all(|(t, tag)| t.matches_tag(*tag))
            }
            Self::Variadic(element_type) => field_tags.iter().all(|tag| element_type.matches_tag(*tag)),
        }
    }
}

#[derive(Debug, Default)]
pub struct FormRegistry {
    forms: AHashMap<String, FormShape>,
}

impl FormRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define(&mut self, name: impl Into<String>, shape: FormShape) {
        self.forms.insert(name.into(), shape);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FormShape> {
        self.forms.get(name)
    }

    #[must_use]
    pub fn is_defined(&self, name: &str) -> bool {
        self.forms.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_shape_checks_arity_and_types() {
        let shape = FormShape::Fields(vec![TypeTag::Int, TypeTag::Str]);
        assert!(shape.matches(&[CellTag::Integer, CellTag::DqList]));
        assert!(!shape.matches(&[CellTag::Integer]));
        assert!(!shape.matches(&[CellTag::Integer, CellTag::Integer]));
    }

    #[test]
    fn variadic_shape_checks_element_type() {
        let shape = FormShape::Variadic(TypeTag::Int);
        assert!(shape.matches(&[]));
        assert!(shape.matches(&[CellTag::Integer, CellTag::Integer]));
        assert!(!shape.matches(&[CellTag::Integer, CellTag::DqList]));
    }

    #[test]
    fn registry_round_trip() {
        let mut reg = FormRegistry::new();
        reg.define("point", FormShape::Fields(vec![TypeTag::Int, TypeTag::Int]));
        assert!(reg.is_defined("point"));
        assert!(!reg.is_defined("other"));
    }
}
