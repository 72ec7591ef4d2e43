//! The lambda table (spec.md §4.3-4.4): stable `u64` IDs for user functions,
//! reclaimed only when their declaring scope frame pops.
//!
//! Grounded on the teacher's `Heap`/`ObjectId` arena
//! (`examples/scostello-monty/src/heap.rs`): a monotonic-handle arena is
//! exactly the right shape for spec.md §9's "model lambdas as values
//! holding a `u64` handle into an arena keyed by ID; ID invalidation
//! replaces pointer invalidation." Unlike `Heap`, IDs here are never
//! reused — an invalidated entry is removed outright, not freed into a
//! reuse pool, since spec.md treats invalidation (not memory pressure) as
//! the only cleanup trigger.

use ahash::AHashMap;

use crate::cell::Cell;
use crate::types::TypeTag;

/// One declared lambda parameter: `name :declared-type`.
#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub declared_type: TypeTag,
}

/// Which interpreter instance owns a lambda's body — the root interpreter
/// or one of its imports, keyed by prefix (spec.md §3 "defining_interpreter_ref").
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum InterpreterRef {
    Root,
    Import(String),
}

#[derive(Debug, Clone)]
pub struct LambdaRecord {
    pub id: u64,
    pub params: Vec<Param>,
    pub return_type: TypeTag,
    pub body: Cell,
    pub defining_interpreter: InterpreterRef,
    /// The scope depth (per `Scope::push`) this lambda was declared at;
    /// removed from the table when that depth pops.
    pub declaring_depth: u64,
}

#[derive(Debug, Default)]
pub struct LambdaTable {
    next_id: u64,
    records: AHashMap<u64, LambdaRecord>,
}

impl LambdaTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates the next monotonic ID and records the lambda, per spec.md
    /// §4.3 steps 3-4.
    pub fn define(
        &mut self,
        params: Vec<Param>,
        return_type: TypeTag,
        body: Cell,
        defining_interpreter: InterpreterRef,
        declaring_depth: u64,
    ) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.records.insert(
            id,
            LambdaRecord { id, params, return_type, body, defining_interpreter, declaring_depth },
        );
        id
    }

    #[must_use]
    pub fn get(&self, id: u64) -> Option<&LambdaRecord> {
        self.records.get(&id)
    }

    /// Removes every lambda whose declaring frame was `depth` (spec.md
    /// §4.4), invoked when that scope frame pops. Returns the removed IDs.
    pub fn invalidate_depth(&mut self, depth: u64) -> Vec<u64> {
        let dead: Vec<u64> =
            self.records.values().filter(|r| r.declaring_depth == depth).map(|r| r.id).collect();
        for id in &dead {
            self.records.remove(id);
        }
        dead
    }

    #[must_use]
    pub fn is_live(&self, id: u64) -> bool {
        self.records.contains_key(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body() -> Cell {
        Cell::bracket_list(vec![Cell::Integer(1)])
    }

    #[test]
    fn allocates_monotonic_ids() {
        let mut table = LambdaTable::new();
        let a = table.define(vec![], TypeTag::None, body(), InterpreterRef::Root, 0);
        let b = table.define(vec![], TypeTag::None, body(), InterpreterRef::Root, 0);
        assert!(b > a);
    }

    #[test]
    fn invalidate_depth_removes_only_matching() {
        let mut table = LambdaTable::new();
        let a = table.define(vec![], TypeTag::None, body(), InterpreterRef::Root, 0);
        let b = table.define(vec![], TypeTag::None, body(), InterpreterRef::Root, 1);
        table.invalidate_depth(0);
        assert!(!table.is_live(a));
        assert!(table.is_live(b));
    }

    #[test]
    fn dead_ids_are_not_reused() {
        let mut table = LambdaTable::new();
        let a = table.define(vec![], TypeTag::None, body(), InterpreterRef::Root, 0);
        table.invalidate_depth(0);
        let b = table.define(vec![], TypeTag::None, body(), InterpreterRef::Root, 0);
        assert_ne!(a, b);
    }
}
