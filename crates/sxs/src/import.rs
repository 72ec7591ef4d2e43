//! The import registry (spec.md §3 "Import slot", §4.6): per-imported-file
//! sub-interpreters, prefixed symbol access, cycle guard.
//!
//! Grounded on the teacher's index-based `Namespaces` registry pattern
//! (`crates/monty/src/namespace.rs`) for "central storage owning all slots,
//! looked up by key" texture, adapted here to string-prefix keys since
//! spec.md keys imports by declared prefix, not a compile-time slot index.

use ahash::AHashMap;

use crate::error::SxsError;
use crate::interpreter::Interpreter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    InProgress,
    Ready,
    Failed,
}

pub struct ImportSlot {
    pub prefix: String,
    pub file_path: String,
    pub child: Option<Interpreter>,
    pub load_state: LoadState,
}

/// Registers loaded imports and enforces the cycle guard and the
/// same-prefix-different-path `Redefinition` rule (spec.md §4.5 datum
/// directives, §4.6 cycle guard, §8's import-idempotence property).
#[derive(Default)]
pub struct ImportRegistry {
    slots: AHashMap<String, ImportSlot>,
}

impl ImportRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, prefix: &str) -> Option<&ImportSlot> {
        self.slots.get(prefix)
    }

    #[must_use]
    pub fn is_registered(&self, prefix: &str) -> bool {
        self.slots.contains_key(prefix)
    }

    /// Marks a prefix `InProgress`, returning an error if it would create a
    /// cycle or redefine an existing prefix with a different path.
    pub fn begin_load(&mut self, prefix: &str, file_path: &str) -> Result<bool, SxsError> {
        if let Some(existing) = self.slots.get(prefix) {
            if existing.load_state == LoadState::InProgress {
                return Err(SxsError::ImportCycle { path: file_path.to_string() });
            }
            if existing.file_path != file_path {
                return Err(SxsError::ImportRedefinition { prefix: prefix.to_string() });
            }
            // Idempotent: same prefix, same path, already loaded.
            return Ok(false);
        }
        self.slots.insert(
            prefix.to_string(),
            ImportSlot {
                prefix: prefix.to_string(),
                file_path: file_path.to_string(),
                child: None,
                load_state: LoadState::InProgress,
            },
        );
        Ok(true)
    }

    pub fn complete_load(&mut self, prefix: &str, child: Interpreter) {
        if let Some(slot) = self.slots.get_mut(prefix) {
            slot.child = Some(child);
            slot.load_state = LoadState::Ready;
        }
    }

    pub fn fail_load(&mut self, prefix: &str) {
        if let Some(slot) = self.slots.get_mut(prefix) {
            slot.load_state = LoadState::Failed;
        }
    }

    /// Moves the child interpreter out of its slot so the caller can invoke
    /// a lambda on it without aliasing the parent's own `&mut self`; call
    /// `put_child` to restore it afterward.
    pub fn take_child(&mut self, prefix: &str) -> Option<Interpreter> {
        self.slots.get_mut(prefix)?.child.take()
    }

    pub fn put_child(&mut self, prefix: &str, child: Interpreter) {
        if let Some(slot) = self.slots.get_mut(prefix) {
            slot.child = Some(child);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_import_same_path_is_idempotent() {
        let mut reg = ImportRegistry::new();
        assert!(reg.begin_load("a", "f.sxs").unwrap());
        reg.complete_load("a", Interpreter::new_root());
        assert!(!reg.begin_load("a", "f.sxs").unwrap());
    }

    #[test]
    fn different_path_same_prefix_is_redefinition() {
        let mut reg = ImportRegistry::new();
        reg.begin_load("a", "f.sxs").unwrap();
        reg.complete_load("a", Interpreter::new_root());
        let err = reg.begin_load("a", "g.sxs").unwrap_err();
        assert!(matches!(err, SxsError::ImportRedefinition { .. }));
    }

    #[test]
    fn in_progress_reimport_is_cycle() {
        let mut reg = ImportRegistry::new();
        reg.begin_load("a", "f.sxs").unwrap();
        let err = reg.begin_load("a", "f.sxs").unwrap_err();
        assert!(matches!(err, SxsError::ImportCycle { .. }));
    }
}
