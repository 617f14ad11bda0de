//! Per-entry operation chains and the collapsing rules.

use serde::{Deserialize, Serialize};

use crate::ops::Operation;
use crate::types::BlockPointer;

/// Accumulated, collapsed operation history of one filesystem entry since
/// the start of the revision range.
///
/// `original` is the entry's identity at the start of the range and never
/// changes; `most_recent` tracks the identity after the latest processed
/// revision. The op list reflects net logical change, not revision count:
/// appends go through the collapse rules below.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Chain {
    original: BlockPointer,
    most_recent: BlockPointer,
    ops: Vec<Operation>,
}

impl Chain {
    pub(crate) fn new(original: BlockPointer) -> Self {
        Self {
            original,
            most_recent: original,
            ops: Vec::new(),
        }
    }

    pub fn original(&self) -> BlockPointer {
        self.original
    }

    pub fn most_recent(&self) -> BlockPointer {
        self.most_recent
    }

    pub fn ops(&self) -> &[Operation] {
        &self.ops
    }

    /// True when the chain saw neither pointer movement nor any surviving
    /// op; such chains are pruned after construction.
    pub(crate) fn is_inert(&self) -> bool {
        self.ops.is_empty() && self.original == self.most_recent
    }

    pub(crate) fn set_most_recent(&mut self, ptr: BlockPointer) {
        self.most_recent = ptr;
    }

    /// Append a create. A create of a name already created on this chain
    /// replaces the earlier create: a rename onto an existing name
    /// overwrites the target, so only the latest entry under that name
    /// survives.
    pub(crate) fn push_create(&mut self, op: Operation) {
        debug_assert!(matches!(op, Operation::Create { .. }));
        let name = op.name().map(str::to_owned);
        if let Some(name) = name {
            self.ops.retain(
                |existing| !matches!(existing, Operation::Create { name: n, .. } if *n == name),
            );
        }
        self.ops.push(op);
    }

    /// Append a remove. A remove cancels the create of the same name still
    /// on this chain (net "never existed"); both drop. Returns true when
    /// the remove actually landed on the chain.
    pub(crate) fn push_remove(&mut self, op: Operation) -> bool {
        debug_assert!(matches!(op, Operation::Remove { .. }));
        let name = match &op {
            Operation::Remove { name, .. } => name.clone(),
            _ => unreachable!(),
        };
        let created = self
            .ops
            .iter()
            .rposition(|existing| matches!(existing, Operation::Create { name: n, .. } if *n == name));
        match created {
            Some(pos) => {
                self.ops.remove(pos);
                false
            }
            None => {
                self.ops.push(op);
                true
            }
        }
    }

    /// Retarget the create-half of an earlier rename to its final name.
    /// Returns false when no such half is present (it may have been
    /// cancelled by an intervening remove).
    pub(crate) fn rename_create_half(&mut self, old_name: &str, new_name: &str) -> bool {
        for op in self.ops.iter_mut().rev() {
            if let Operation::Create { name, renamed, .. } = op {
                if *renamed && name == old_name {
                    *name = new_name.to_owned();
                    return true;
                }
            }
        }
        false
    }

    /// Drop all set-attribute ops; used when the target entry is removed,
    /// collapsing setattr-then-remove to the remove alone.
    pub(crate) fn drop_set_attrs(&mut self) {
        self.ops
            .retain(|op| !matches!(op, Operation::SetAttr { .. }));
    }

    pub(crate) fn push_set_attr(&mut self, op: Operation) {
        debug_assert!(matches!(op, Operation::SetAttr { .. }));
        self.ops.push(op);
    }

    /// Syncs never collapse; each may carry separately replayable content.
    pub(crate) fn push_sync(&mut self, op: Operation) {
        debug_assert!(matches!(op, Operation::Sync { .. }));
        self.ops.push(op);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EntryType;

    fn ptr(n: u8) -> BlockPointer {
        BlockPointer([n; 32])
    }

    fn create(name: &str) -> Operation {
        Operation::create(name, ptr(1), EntryType::File)
    }

    fn remove(name: &str) -> Operation {
        Operation::remove(name, ptr(1))
    }

    #[test]
    fn test_create_then_remove_cancels() {
        let mut chain = Chain::new(ptr(1));
        chain.push_create(create("a"));
        assert!(!chain.push_remove(remove("a")));
        assert!(chain.ops().is_empty());
        assert!(chain.is_inert());
    }

    #[test]
    fn test_remove_of_unseen_name_lands() {
        let mut chain = Chain::new(ptr(1));
        assert!(chain.push_remove(remove("pre-existing")));
        assert_eq!(chain.ops().len(), 1);
    }

    #[test]
    fn test_create_overwrites_same_name() {
        let mut chain = Chain::new(ptr(1));
        chain.push_create(create("a"));
        chain.push_create(Operation::create_half("a", ptr(1), EntryType::File));
        assert_eq!(chain.ops().len(), 1);
        assert!(matches!(
            chain.ops()[0],
            Operation::Create { renamed: true, .. }
        ));
    }

    #[test]
    fn test_rename_create_half_retargets_latest() {
        let mut chain = Chain::new(ptr(1));
        chain.push_create(Operation::create_half("mid", ptr(1), EntryType::File));
        assert!(chain.rename_create_half("mid", "final"));
        assert_eq!(chain.ops()[0].name(), Some("final"));
        // a plain create is not a rename half
        chain.push_create(create("plain"));
        assert!(!chain.rename_create_half("plain", "other"));
    }

    #[test]
    fn test_syncs_stay_distinct() {
        let mut chain = Chain::new(ptr(2));
        chain.push_sync(Operation::sync(ptr(2)));
        chain.push_sync(Operation::sync(ptr(2)));
        assert_eq!(chain.ops().len(), 2);
    }

    #[test]
    fn test_drop_set_attrs_keeps_syncs() {
        let mut chain = Chain::new(ptr(2));
        chain.push_set_attr(Operation::set_attr(
            "f",
            ptr(1),
            crate::types::Attribute::Exec,
            ptr(2),
        ));
        chain.push_sync(Operation::sync(ptr(2)));
        chain.drop_set_attrs();
        assert_eq!(chain.ops().len(), 1);
        assert!(matches!(chain.ops()[0], Operation::Sync { .. }));
    }
}
