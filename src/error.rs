//! Error types for the chain engine.

use crate::ops::OpKind;
use crate::types::BlockPointer;
use thiserror::Error;

/// Main error type for chain construction and status operations.
///
/// Construction failures are fatal to the build: the builder fails fast with
/// one error identifying the offending revision or operation and yields no
/// usable chain set. `PointerNotFound` is the one recoverable class; callers
/// treat it as "no information about that pointer."
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("no revisions to process")]
    EmptyRange,

    #[error(
        "revision {revision} is not causally chained: declared root {declared} \
         does not match running root {expected}"
    )]
    NonCausalRevision {
        revision: usize,
        declared: BlockPointer,
        expected: BlockPointer,
    },

    #[error("duplicate update for unref pointer {0} within one operation")]
    DuplicateUpdate(BlockPointer),

    #[error("revision {revision}: update unrefs {pointer}, which an earlier update superseded")]
    StaleUpdate {
        revision: usize,
        pointer: BlockPointer,
    },

    #[error("revision {revision}: {kind:?} on removed entry {original}")]
    RemovedEntryModified {
        revision: usize,
        kind: OpKind,
        original: BlockPointer,
    },

    #[error("revision {revision}: remove of missing entry {name:?} in {dir}")]
    RemoveOfMissingEntry {
        revision: usize,
        name: String,
        dir: BlockPointer,
    },

    #[error("revision {revision}: pointer {pointer} outside the bounding chain set")]
    UnboundedPointer {
        revision: usize,
        pointer: BlockPointer,
    },

    #[error("pointer not found: {0}")]
    PointerNotFound(BlockPointer),

    #[error("collaborator failure: {0}")]
    Collaborator(String),
}

/// Result type for chain operations.
pub type Result<T> = std::result::Result<T, ChainError>;
