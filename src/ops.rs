//! The operation log model.
//!
//! Each revision carries an ordered list of operations. Every operation also
//! records, in order, the block pointers it unreferenced and the pointers it
//! minted in their place, including ancestor directories up to the revision
//! root. The chain builder follows those records to keep a stable identity
//! for each entry across pointer churn.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ChainError, Result};
use crate::types::{Attribute, BlockPointer, BlockUpdate, EntryType};

/// Discriminant of an operation, used for collapsing and for grouping
/// summaries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OpKind {
    Create,
    Remove,
    Rename,
    SetAttr,
    Sync,
}

impl OpKind {
    /// Notification verb for this kind of change.
    pub fn notification_str(&self) -> &'static str {
        match self {
            OpKind::Create => "create",
            OpKind::Remove => "delete",
            OpKind::Rename => "rename",
            OpKind::SetAttr => "modify",
            OpKind::Sync => "modify",
        }
    }
}

/// A single filesystem metadata operation.
///
/// Directory pointers (`dir`, `old_dir`, `new_dir`) and file pointers are
/// given in pre-operation ("unreferenced") identity; the post-operation
/// identities live in `updates`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    Create {
        name: String,
        dir: BlockPointer,
        entry_type: EntryType,
        /// True when this create is the destination half of a rename.
        renamed: bool,
        updates: Vec<BlockUpdate>,
    },
    Remove {
        name: String,
        dir: BlockPointer,
        updates: Vec<BlockUpdate>,
    },
    Rename {
        old_name: String,
        old_dir: BlockPointer,
        new_name: String,
        new_dir: BlockPointer,
        /// The moved entry itself, in pre-operation identity.
        target: BlockPointer,
        entry_type: EntryType,
        updates: Vec<BlockUpdate>,
    },
    SetAttr {
        name: String,
        dir: BlockPointer,
        attr: Attribute,
        target: BlockPointer,
        updates: Vec<BlockUpdate>,
    },
    Sync {
        file: BlockPointer,
        updates: Vec<BlockUpdate>,
    },
}

impl Operation {
    pub fn create(name: impl Into<String>, dir: BlockPointer, entry_type: EntryType) -> Self {
        Operation::Create {
            name: name.into(),
            dir,
            entry_type,
            renamed: false,
            updates: Vec::new(),
        }
    }

    /// The destination half of a rename: a create marked `renamed`, with
    /// no updates of its own.
    pub(crate) fn create_half(
        name: impl Into<String>,
        dir: BlockPointer,
        entry_type: EntryType,
    ) -> Self {
        Operation::Create {
            name: name.into(),
            dir,
            entry_type,
            renamed: true,
            updates: Vec::new(),
        }
    }

    pub fn remove(name: impl Into<String>, dir: BlockPointer) -> Self {
        Operation::Remove {
            name: name.into(),
            dir,
            updates: Vec::new(),
        }
    }

    pub fn rename(
        old_name: impl Into<String>,
        old_dir: BlockPointer,
        new_name: impl Into<String>,
        new_dir: BlockPointer,
        target: BlockPointer,
        entry_type: EntryType,
    ) -> Self {
        Operation::Rename {
            old_name: old_name.into(),
            old_dir,
            new_name: new_name.into(),
            new_dir,
            target,
            entry_type,
            updates: Vec::new(),
        }
    }

    pub fn set_attr(
        name: impl Into<String>,
        dir: BlockPointer,
        attr: Attribute,
        target: BlockPointer,
    ) -> Self {
        Operation::SetAttr {
            name: name.into(),
            dir,
            attr,
            target,
            updates: Vec::new(),
        }
    }

    pub fn sync(file: BlockPointer) -> Self {
        Operation::Sync {
            file,
            updates: Vec::new(),
        }
    }

    pub fn kind(&self) -> OpKind {
        match self {
            Operation::Create { .. } => OpKind::Create,
            Operation::Remove { .. } => OpKind::Remove,
            Operation::Rename { .. } => OpKind::Rename,
            Operation::SetAttr { .. } => OpKind::SetAttr,
            Operation::Sync { .. } => OpKind::Sync,
        }
    }

    /// Record one pointer remap caused by this operation. Within a single
    /// operation each unref pointer may appear at most once.
    pub fn add_update(&mut self, unref: BlockPointer, ref_: BlockPointer) -> Result<()> {
        if self.updates().iter().any(|u| u.unref == unref) {
            return Err(ChainError::DuplicateUpdate(unref));
        }
        self.updates_mut().push(BlockUpdate::new(unref, ref_));
        Ok(())
    }

    pub fn updates(&self) -> &[BlockUpdate] {
        match self {
            Operation::Create { updates, .. }
            | Operation::Remove { updates, .. }
            | Operation::Rename { updates, .. }
            | Operation::SetAttr { updates, .. }
            | Operation::Sync { updates, .. } => updates,
        }
    }

    fn updates_mut(&mut self) -> &mut Vec<BlockUpdate> {
        match self {
            Operation::Create { updates, .. }
            | Operation::Remove { updates, .. }
            | Operation::Rename { updates, .. }
            | Operation::SetAttr { updates, .. }
            | Operation::Sync { updates, .. } => updates,
        }
    }

    /// The entry name this operation touches, when it carries one.
    pub fn name(&self) -> Option<&str> {
        match self {
            Operation::Create { name, .. }
            | Operation::Remove { name, .. }
            | Operation::SetAttr { name, .. } => Some(name),
            Operation::Rename { new_name, .. } => Some(new_name),
            Operation::Sync { .. } => None,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Create {
                name, entry_type, ..
            } => write!(f, "create {} ({})", name, entry_type.as_str()),
            Operation::Remove { name, .. } => write!(f, "rm {}", name),
            Operation::Rename {
                old_name, new_name, ..
            } => write!(f, "rename {} -> {}", old_name, new_name),
            Operation::SetAttr { name, attr, .. } => {
                write!(f, "setattr {} {}", attr.as_str(), name)
            }
            Operation::Sync { .. } => write!(f, "sync"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ptr(n: u8) -> BlockPointer {
        BlockPointer([n; 32])
    }

    #[test]
    fn test_duplicate_update_rejected() {
        let mut op = Operation::create("file", ptr(1), EntryType::File);
        op.add_update(ptr(1), ptr(2)).unwrap();
        op.add_update(ptr(3), ptr(4)).unwrap();
        let err = op.add_update(ptr(1), ptr(5)).unwrap_err();
        assert!(matches!(err, ChainError::DuplicateUpdate(p) if p == ptr(1)));
        assert_eq!(op.updates().len(), 2);
    }

    #[test]
    fn test_display() {
        let co = Operation::create("readme", ptr(1), EntryType::File);
        assert_eq!(co.to_string(), "create readme (file)");

        let ro = Operation::rename("a", ptr(1), "b", ptr(2), ptr(3), EntryType::Dir);
        assert_eq!(ro.to_string(), "rename a -> b");

        let so = Operation::set_attr("bin", ptr(1), Attribute::Exec, ptr(2));
        assert_eq!(so.to_string(), "setattr ex bin");
    }

    #[test]
    fn test_notification_verbs() {
        assert_eq!(OpKind::Remove.notification_str(), "delete");
        assert_eq!(OpKind::Sync.notification_str(), "modify");
        assert_eq!(OpKind::SetAttr.notification_str(), "modify");
    }
}
