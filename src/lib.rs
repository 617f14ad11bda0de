//! # CR-Chains
//!
//! Conflict-resolution chain engine for the metadata log of a distributed,
//! versioned, encrypted filesystem.
//!
//! ## Core Concepts
//!
//! - **Revisions**: Causally ordered, append-only metadata change units,
//!   each carrying an ordered operation log and pointer remap records
//! - **Pointer identity**: Copy-on-write gives entries fresh block pointers
//!   every revision; the engine tracks original-to-most-recent identity
//! - **Chains**: Per-entry collapsed operation history since divergence,
//!   consumed by the merge resolver and the status display
//! - **Status**: Snapshots plus a missed-wakeup-free change wait primitive
//!
//! ## Example
//!
//! ```ignore
//! use crchains::{CrChains, EntryType, Operation, Revision, WriterId};
//!
//! let mut op = Operation::create("notes.txt", dir, EntryType::File);
//! op.add_update(root, new_root)?;
//! op.add_update(dir, new_dir)?;
//!
//! let mut rev = Revision::new(WriterId(1), new_root);
//! rev.add_op(op);
//!
//! let chains = CrChains::build(&[rev], None, true)?;
//! let chain = chains.chain_by_original(dir)?;
//! ```

pub mod chains;
pub mod error;
pub mod ops;
pub mod status;
pub mod types;

// Re-exports
pub use chains::{Chain, ChainKey, ChainSummary, CrChains, NodeCache};
pub use error::{ChainError, Result};
pub use ops::{OpKind, Operation};
pub use status::{DirtyNode, FolderStatus, IdentityProvider, StatusKeeper, WaitHandle};
pub use types::*;
