//! Folder-branch status keeper.
//!
//! Holds the latest head metadata, the current unmerged/merged chain pair,
//! and the set of dirty in-memory nodes, and broadcasts changes through a
//! missed-wakeup-free one-shot wait primitive.

use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::chains::{ChainSummary, CrChains, NodeCache};
use crate::error::Result;
use crate::types::{BlockPointer, FolderId, NodeId, RootMetadata, WriterId};

/// Collaborators the keeper consults while building a snapshot. They may
/// block on network round trips and own their cancellation; a failure
/// propagates verbatim and no partial snapshot is returned.
pub trait IdentityProvider: Send + Sync {
    fn resolve_writer(&self, writer: WriterId) -> Result<String>;
    fn is_rekey_pending(&self, folder: FolderId) -> bool;
}

/// A dirty in-memory node tracked for the status display.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DirtyNode {
    pub id: NodeId,
    pub pointer: BlockPointer,
}

/// Snapshot of a folder-branch's status; encodes directly as JSON.
#[derive(Clone, Debug, Default, Serialize)]
pub struct FolderStatus {
    pub staged: bool,
    pub head_writer: String,
    pub disk_usage: u64,
    pub rekey_pending: bool,
    pub folder_id: Option<String>,
    pub dirty_paths: Vec<String>,
    pub unmerged: Vec<ChainSummary>,
    pub merged: Vec<ChainSummary>,
}

#[derive(Debug)]
struct Signal {
    version: Mutex<u64>,
    cond: Condvar,
}

/// One-shot wait primitive handed out by [`StatusKeeper::get_status`].
///
/// The handle captures the change version current at snapshot time and
/// becomes ready once any later effective mutation advances it. A waiter
/// that captured the handle before the mutation is guaranteed to observe
/// the advance; there is no missed-wakeup window.
#[derive(Debug)]
pub struct WaitHandle {
    seen: u64,
    signal: Arc<Signal>,
}

impl WaitHandle {
    pub fn is_ready(&self) -> bool {
        *self.signal.version.lock() > self.seen
    }

    /// Block until a mutation lands after the snapshot this handle came
    /// from. Returns immediately when one already has.
    pub fn wait(&self) {
        let mut version = self.signal.version.lock();
        while *version <= self.seen {
            self.signal.cond.wait(&mut version);
        }
    }

    /// Like [`wait`](Self::wait), bounded; returns whether the handle
    /// became ready within the timeout.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut version = self.signal.version.lock();
        while *version <= self.seen {
            if self.signal.cond.wait_until(&mut version, deadline).timed_out() {
                return *version > self.seen;
            }
        }
        true
    }
}

#[derive(Default)]
struct StatusData {
    md: Option<RootMetadata>,
    unmerged: Option<Arc<CrChains>>,
    merged: Option<Arc<CrChains>>,
    dirty: HashMap<NodeId, BlockPointer>,
}

/// Holds and updates the status for one folder-branch.
///
/// Lock order is data first, then the signal version; neither lock is held
/// while a waiter blocks on a handle. Bookkeeping calls never fail and are
/// no-ops when the new value equals the current one.
pub struct StatusKeeper {
    node_cache: Arc<dyn NodeCache + Send + Sync>,
    identity: Arc<dyn IdentityProvider>,
    data: Mutex<StatusData>,
    signal: Arc<Signal>,
}

impl StatusKeeper {
    pub fn new(
        node_cache: Arc<dyn NodeCache + Send + Sync>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            node_cache,
            identity,
            data: Mutex::new(StatusData::default()),
            signal: Arc::new(Signal {
                version: Mutex::new(0),
                cond: Condvar::new(),
            }),
        }
    }

    // data lock must be held by the caller
    fn signal_change_locked(&self) {
        let mut version = self.signal.version.lock();
        *version += 1;
        self.signal.cond.notify_all();
    }

    /// Install the current head metadata.
    pub fn set_root_metadata(&self, md: RootMetadata) {
        let mut data = self.data.lock();
        if data.md.as_ref() == Some(&md) {
            return;
        }
        data.md = Some(md);
        self.signal_change_locked();
    }

    /// Install the latest unmerged/merged chain pair.
    pub fn set_cr_chains(&self, unmerged: Option<Arc<CrChains>>, merged: Option<Arc<CrChains>>) {
        let mut data = self.data.lock();
        if same_chains(&data.unmerged, &unmerged) && same_chains(&data.merged, &merged) {
            return;
        }
        data.unmerged = unmerged;
        data.merged = merged;
        self.signal_change_locked();
    }

    pub fn add_dirty_node(&self, node: DirtyNode) {
        let mut data = self.data.lock();
        if data.dirty.contains_key(&node.id) {
            return;
        }
        data.dirty.insert(node.id, node.pointer);
        self.signal_change_locked();
    }

    pub fn remove_dirty_node(&self, id: NodeId) {
        let mut data = self.data.lock();
        if data.dirty.remove(&id).is_none() {
            return;
        }
        self.signal_change_locked();
    }

    /// Atomically snapshot the current status and return it with a wait
    /// handle for the next change.
    pub fn get_status(&self) -> Result<(FolderStatus, WaitHandle)> {
        let data = self.data.lock();

        let mut status = FolderStatus::default();
        if let Some(md) = &data.md {
            status.staged = md.staged;
            status.head_writer = self.identity.resolve_writer(md.writer)?;
            status.disk_usage = md.disk_usage;
            status.rekey_pending = self.identity.is_rekey_pending(md.folder);
            status.folder_id = Some(md.folder.to_string());
        }

        let mut dirty_paths: Vec<String> = data
            .dirty
            .values()
            .map(|&ptr| {
                self.node_cache
                    .path_from_most_recent(ptr)
                    .unwrap_or_else(|| format!("({})", &ptr.to_hex()[..8]))
            })
            .collect();
        dirty_paths.sort();
        status.dirty_paths = dirty_paths;

        // Identify summaries through the unmerged chains; those are the
        // most likely to match a node in the cache.
        if let Some(unmerged) = &data.unmerged {
            status.unmerged = unmerged.summary(unmerged, self.node_cache.as_ref());
            if let Some(merged) = &data.merged {
                status.merged = merged.summary(unmerged, self.node_cache.as_ref());
            }
        }

        let seen = *self.signal.version.lock();
        Ok((
            status,
            WaitHandle {
                seen,
                signal: self.signal.clone(),
            },
        ))
    }
}

fn same_chains(a: &Option<Arc<CrChains>>, b: &Option<Arc<CrChains>>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(x), Some(y)) => Arc::ptr_eq(x, y),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChainError;
    use crate::ops::Operation;
    use crate::types::{EntryType, Revision};
    use std::thread;

    struct FakeCache(HashMap<BlockPointer, String>);

    impl NodeCache for FakeCache {
        fn path_from_most_recent(&self, most_recent: BlockPointer) -> Option<String> {
            self.0.get(&most_recent).cloned()
        }
    }

    struct FakeIdentity {
        fail: bool,
        rekey: bool,
    }

    impl IdentityProvider for FakeIdentity {
        fn resolve_writer(&self, writer: WriterId) -> Result<String> {
            if self.fail {
                return Err(ChainError::Collaborator("identity service down".into()));
            }
            Ok(format!("user{}", writer.0))
        }

        fn is_rekey_pending(&self, _folder: FolderId) -> bool {
            self.rekey
        }
    }

    fn ptr(n: u8) -> BlockPointer {
        BlockPointer([n; 32])
    }

    fn keeper(fail: bool) -> StatusKeeper {
        StatusKeeper::new(
            Arc::new(FakeCache(HashMap::new())),
            Arc::new(FakeIdentity { fail, rekey: true }),
        )
    }

    fn md() -> RootMetadata {
        RootMetadata {
            folder: FolderId(7),
            writer: WriterId(3),
            disk_usage: 4096,
            staged: true,
        }
    }

    #[test]
    fn test_snapshot_fields() {
        let keeper = keeper(false);
        keeper.set_root_metadata(md());
        keeper.add_dirty_node(DirtyNode {
            id: NodeId(1),
            pointer: ptr(9),
        });

        let (status, _) = keeper.get_status().unwrap();
        assert!(status.staged);
        assert_eq!(status.head_writer, "user3");
        assert_eq!(status.disk_usage, 4096);
        assert!(status.rekey_pending);
        assert_eq!(status.folder_id.as_deref(), Some("7"));
        assert_eq!(status.dirty_paths.len(), 1);

        // encodes directly as JSON
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["head_writer"], "user3");
    }

    #[test]
    fn test_collaborator_error_yields_no_partial_snapshot() {
        let keeper = keeper(true);
        keeper.set_root_metadata(md());
        let err = keeper.get_status().unwrap_err();
        assert!(matches!(err, ChainError::Collaborator(_)));
    }

    #[test]
    fn test_wait_handle_ready_once_per_distinct_mutation() {
        let keeper = keeper(false);
        let (_, handle) = keeper.get_status().unwrap();
        assert!(!handle.is_ready());

        keeper.set_root_metadata(md());
        assert!(handle.is_ready());

        // identical value: no further signal
        let (_, handle) = keeper.get_status().unwrap();
        keeper.set_root_metadata(md());
        assert!(!handle.is_ready());
        assert!(!handle.wait_timeout(Duration::from_millis(20)));

        // distinct value signals again
        let mut changed = md();
        changed.disk_usage += 1;
        keeper.set_root_metadata(changed);
        assert!(handle.is_ready());
    }

    #[test]
    fn test_dirty_node_bookkeeping_is_idempotent() {
        let keeper = keeper(false);
        let node = DirtyNode {
            id: NodeId(5),
            pointer: ptr(5),
        };
        keeper.add_dirty_node(node);
        let (_, handle) = keeper.get_status().unwrap();

        keeper.add_dirty_node(node);
        assert!(!handle.is_ready());

        keeper.remove_dirty_node(NodeId(5));
        assert!(handle.is_ready());

        let (_, handle) = keeper.get_status().unwrap();
        keeper.remove_dirty_node(NodeId(5));
        assert!(!handle.is_ready());
    }

    #[test]
    fn test_set_same_chains_pair_is_noop() {
        let keeper = keeper(false);
        let root = ptr(1);
        let dir = ptr(2);
        let mut op = Operation::create("f", dir, EntryType::File);
        op.add_update(root, ptr(11)).unwrap();
        op.add_update(dir, ptr(12)).unwrap();
        let mut rev = Revision::new(WriterId(1), ptr(11));
        rev.add_op(op);
        let chains = Arc::new(CrChains::build(&[rev], None, true).unwrap());

        keeper.set_cr_chains(Some(chains.clone()), None);
        let (status, handle) = keeper.get_status().unwrap();
        assert!(!status.unmerged.is_empty());
        assert!(status.merged.is_empty());

        keeper.set_cr_chains(Some(chains.clone()), None);
        assert!(!handle.is_ready());

        keeper.set_cr_chains(Some(chains.clone()), Some(chains.clone()));
        assert!(handle.is_ready());
    }

    #[test]
    fn test_waiter_wakes_on_mutation() {
        let keeper = Arc::new(keeper(false));
        let (_, handle) = keeper.get_status().unwrap();

        let mutator = {
            let keeper = keeper.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(10));
                keeper.set_root_metadata(md());
            })
        };

        assert!(handle.wait_timeout(Duration::from_secs(5)));
        mutator.join().unwrap();
    }
}
