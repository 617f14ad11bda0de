//! Core types for the chain engine.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::ops::Operation;

/// Opaque content identifier for a metadata block.
///
/// Equality and hashing go by the identifier only; a pointer never changes
/// once minted. Copy-on-write gives every modified entry a fresh pointer on
/// each revision, so the same logical entry is known by many pointers over
/// time.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockPointer(pub [u8; 32]);

impl BlockPointer {
    /// Derive a pointer from block content.
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        BlockPointer(hasher.finalize().into())
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| hex::FromHexError::InvalidStringLength)?;
        Ok(BlockPointer(arr))
    }
}

impl fmt::Debug for BlockPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ptr({}...)", &self.to_hex()[..8])
    }
}

impl fmt::Display for BlockPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// One block-pointer remap record: the pointer an operation unreferenced and
/// the pointer it minted in its place.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockUpdate {
    pub unref: BlockPointer,
    #[serde(rename = "ref")]
    pub ref_: BlockPointer,
}

impl BlockUpdate {
    pub fn new(unref: BlockPointer, ref_: BlockPointer) -> Self {
        Self { unref, ref_ }
    }
}

/// Type of a directory entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryType {
    File,
    Exec,
    Dir,
    Sym,
}

impl EntryType {
    /// Notification rendering. Executables render identically to plain
    /// files in the notification format.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::File => "file",
            EntryType::Exec => "file",
            EntryType::Dir => "dir",
            EntryType::Sym => "sym",
        }
    }
}

/// Attribute kinds a set-attribute operation can touch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Attribute {
    Exec,
    Mtime,
    Size,
}

impl Attribute {
    pub fn as_str(&self) -> &'static str {
        match self {
            Attribute::Exec => "ex",
            Attribute::Mtime => "mtime",
            Attribute::Size => "size",
        }
    }
}

/// Identity of the writer of a revision.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WriterId(pub u64);

impl fmt::Debug for WriterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WriterId({})", self.0)
    }
}

impl fmt::Display for WriterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a top-level folder.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FolderId(pub u64);

impl fmt::Debug for FolderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FolderId({})", self.0)
    }
}

impl fmt::Display for FolderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a resident in-memory node.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

/// Where a renamed entry came from and where it ended up, in original
/// (range-stable) identifiers. Chained renames keep the first-seen source
/// and the last-seen destination.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameInfo {
    pub original_old_parent: BlockPointer,
    pub old_name: String,
    pub original_new_parent: BlockPointer,
    pub new_name: String,
}

/// One causally ordered metadata change unit.
///
/// `root` is the root pointer the folder ends up with after this revision's
/// operations; the builder uses it to verify continuity with the prior
/// revision.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Revision {
    pub writer: WriterId,
    pub ops: Vec<Operation>,
    pub root: BlockPointer,
}

impl Revision {
    pub fn new(writer: WriterId, root: BlockPointer) -> Self {
        Self {
            writer,
            ops: Vec::new(),
            root,
        }
    }

    pub fn add_op(&mut self, op: Operation) {
        self.ops.push(op);
    }
}

/// Head metadata for a folder-branch, consumed by the status keeper.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootMetadata {
    pub folder: FolderId,
    pub writer: WriterId,
    pub disk_usage: u64,
    /// True when the head sits on a local unmerged branch.
    pub staged: bool,
}
