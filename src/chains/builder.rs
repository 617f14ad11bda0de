//! Chain-set construction from an ordered revision range.
//!
//! The builder walks revisions strictly oldest to newest and, per
//! filesystem entry, accumulates a collapsed chain of everything that
//! happened to it, keyed by the entry's identity at the start of the range.
//! Chains live in an arena addressed by opaque keys; the original and
//! most-recent maps both point into that arena.

use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use tracing::{debug, trace};

use crate::chains::chain::Chain;
use crate::error::{ChainError, Result};
use crate::ops::{OpKind, Operation};
use crate::types::{BlockPointer, BlockUpdate, RenameInfo, Revision};

/// Opaque arena key addressing one chain record.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct ChainKey(u64);

/// The per-entry chain index for one divergence range.
///
/// Built once from an ordered revision sequence and immutable thereafter;
/// a new divergence range requires a new instance. Both lookup maps address
/// the same arena records, so `len()` counts distinct entries ever touched.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CrChains {
    chains: HashMap<ChainKey, Chain>,
    by_original: HashMap<BlockPointer, ChainKey>,
    by_most_recent: HashMap<BlockPointer, ChainKey>,
    renamed_originals: HashMap<BlockPointer, RenameInfo>,
    original_root: BlockPointer,
    next_key: u64,
}

impl CrChains {
    /// Build the chain set for `revisions`, oldest first.
    ///
    /// When `bound` is given, operations whose resolved originals fall
    /// outside the reference set are an error under `strict` and skipped
    /// otherwise; pointer-identity tracking is unaffected either way.
    pub fn build(
        revisions: &[Revision],
        bound: Option<&CrChains>,
        strict: bool,
    ) -> Result<CrChains> {
        let first = revisions.first().ok_or(ChainError::EmptyRange)?;
        let mut builder = Builder {
            cc: CrChains::empty(first.root),
            bound,
            strict,
            removed: HashSet::new(),
            removed_names: HashSet::new(),
            known_targets: HashMap::new(),
        };
        for (i, revision) in revisions.iter().enumerate() {
            builder.process_revision(i, revision)?;
        }
        builder.cc.prune();
        Ok(builder.cc)
    }

    fn empty(root: BlockPointer) -> Self {
        Self {
            chains: HashMap::new(),
            by_original: HashMap::new(),
            by_most_recent: HashMap::new(),
            renamed_originals: HashMap::new(),
            original_root: root,
            next_key: 0,
        }
    }

    /// The root pointer's identity at the start of the range; fixed at
    /// construction.
    pub fn original_root(&self) -> BlockPointer {
        self.original_root
    }

    /// Count of distinct entries ever touched in the range.
    pub fn len(&self) -> usize {
        self.by_original.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_original.is_empty()
    }

    /// Look up a chain by the entry's start-of-range identity.
    pub fn chain_by_original(&self, original: BlockPointer) -> Result<&Chain> {
        self.by_original
            .get(&original)
            .map(|key| self.chain(*key))
            .ok_or(ChainError::PointerNotFound(original))
    }

    /// Look up a chain by the entry's latest identity.
    pub fn chain_by_most_recent(&self, most_recent: BlockPointer) -> Result<&Chain> {
        self.by_most_recent
            .get(&most_recent)
            .map(|key| self.chain(*key))
            .ok_or(ChainError::PointerNotFound(most_recent))
    }

    /// Rename record for an entry's original pointer, when the range
    /// renamed it. Spans the first-seen source to the last-seen
    /// destination.
    pub fn rename_info(&self, original: BlockPointer) -> Option<&RenameInfo> {
        self.renamed_originals.get(&original)
    }

    pub fn renamed_originals(&self) -> &HashMap<BlockPointer, RenameInfo> {
        &self.renamed_originals
    }

    /// Iterate all chains in arena order (unspecified).
    pub fn chains(&self) -> impl Iterator<Item = &Chain> {
        self.chains.values()
    }

    fn chain(&self, key: ChainKey) -> &Chain {
        self.chains.get(&key).expect("chain arena key is valid")
    }

    fn chain_mut(&mut self, key: ChainKey) -> &mut Chain {
        self.chains.get_mut(&key).expect("chain arena key is valid")
    }

    fn alloc(&mut self, chain: Chain) -> ChainKey {
        let key = ChainKey(self.next_key);
        self.next_key += 1;
        self.chains.insert(key, chain);
        key
    }

    /// Resolve a pointer to its start-of-range identity. First-seen
    /// pointers are their own original.
    fn resolve_original(&self, ptr: BlockPointer) -> BlockPointer {
        match self.by_most_recent.get(&ptr) {
            Some(key) => self.chain(*key).original(),
            None => ptr,
        }
    }

    /// Apply one remap record, extending an existing chain or starting a
    /// new one, and re-key the most-recent table.
    fn apply_update(&mut self, update: &BlockUpdate) {
        match self.by_most_recent.remove(&update.unref) {
            Some(key) => {
                self.chain_mut(key).set_most_recent(update.ref_);
                self.by_most_recent.insert(update.ref_, key);
            }
            None => {
                let mut chain = Chain::new(update.unref);
                chain.set_most_recent(update.ref_);
                let key = self.alloc(chain);
                self.by_original.insert(update.unref, key);
                self.by_most_recent.insert(update.ref_, key);
            }
        }
    }

    /// Chain for an already-resolved original, created on first touch.
    fn ensure_chain(&mut self, original: BlockPointer) -> ChainKey {
        match self.by_original.get(&original) {
            Some(key) => *key,
            None => {
                let key = self.alloc(Chain::new(original));
                self.by_original.insert(original, key);
                self.by_most_recent.insert(original, key);
                key
            }
        }
    }

    /// Drop chains that saw neither pointer movement nor any surviving op.
    fn prune(&mut self) {
        let dead: Vec<ChainKey> = self
            .chains
            .iter()
            .filter(|(_, chain)| chain.is_inert())
            .map(|(key, _)| *key)
            .collect();
        for key in dead {
            if let Some(chain) = self.chains.remove(&key) {
                self.by_original.remove(&chain.original());
                self.by_most_recent.remove(&chain.most_recent());
            }
        }
    }
}

/// Transient construction state; only the finished `CrChains` survives.
struct Builder<'a> {
    cc: CrChains,
    bound: Option<&'a CrChains>,
    strict: bool,
    /// Originals whose entries were removed in-range; later setattr/sync
    /// on them is non-causal input.
    removed: HashSet<BlockPointer>,
    /// (parent original, name) pairs known absent at the current point.
    removed_names: HashSet<(BlockPointer, String)>,
    /// (parent original, name) -> target original, for entries whose
    /// target pointer the range revealed (renames and setattrs).
    known_targets: HashMap<(BlockPointer, String), BlockPointer>,
}

impl Builder<'_> {
    fn process_revision(&mut self, index: usize, revision: &Revision) -> Result<()> {
        debug!(
            revision = index,
            writer = revision.writer.0,
            ops = revision.ops.len(),
            "processing revision"
        );
        for op in &revision.ops {
            self.process_op(index, op)?;
        }

        if index == 0 {
            self.cc.original_root = self.cc.resolve_original(revision.root);
        } else {
            let expected = self
                .cc
                .by_original
                .get(&self.cc.original_root)
                .map(|key| self.cc.chain(*key).most_recent())
                .unwrap_or(self.cc.original_root);
            if revision.root != expected {
                return Err(ChainError::NonCausalRevision {
                    revision: index,
                    declared: revision.root,
                    expected,
                });
            }
        }
        Ok(())
    }

    fn process_op(&mut self, rev: usize, op: &Operation) -> Result<()> {
        trace!(revision = rev, %op, "processing operation");
        match op {
            Operation::Create { name, .. } => self.process_create(rev, op, name),
            Operation::Remove { name, .. } => self.process_remove(rev, op, name),
            Operation::Rename { .. } => self.process_rename(rev, op),
            Operation::SetAttr { name, .. } => self.process_set_attr(rev, op, name),
            Operation::Sync { .. } => self.process_sync(rev, op),
        }
    }

    fn process_create(&mut self, rev: usize, op: &Operation, name: &str) -> Result<()> {
        let Operation::Create { dir, .. } = op else {
            unreachable!()
        };
        let dir_orig = self.cc.resolve_original(*dir);
        self.apply_updates(rev, op)?;
        if !self.in_bound(rev, &[dir_orig])? {
            return Ok(());
        }
        let key = self.cc.ensure_chain(dir_orig);
        self.removed_names.remove(&(dir_orig, name.to_owned()));
        self.cc.chain_mut(key).push_create(op.clone());
        Ok(())
    }

    fn process_remove(&mut self, rev: usize, op: &Operation, name: &str) -> Result<()> {
        let Operation::Remove { dir, .. } = op else {
            unreachable!()
        };
        let dir_orig = self.cc.resolve_original(*dir);
        self.apply_updates(rev, op)?;
        if !self.in_bound(rev, &[dir_orig])? {
            return Ok(());
        }
        if self.removed_names.contains(&(dir_orig, name.to_owned())) {
            return Err(ChainError::RemoveOfMissingEntry {
                revision: rev,
                name: name.to_owned(),
                dir: dir_orig,
            });
        }
        self.mark_removed(dir_orig, name);
        let key = self.cc.ensure_chain(dir_orig);
        self.cc.chain_mut(key).push_remove(op.clone());
        self.removed_names.insert((dir_orig, name.to_owned()));
        Ok(())
    }

    fn process_rename(&mut self, rev: usize, op: &Operation) -> Result<()> {
        let Operation::Rename {
            old_name,
            old_dir,
            new_name,
            new_dir,
            target,
            entry_type,
            ..
        } = op
        else {
            unreachable!()
        };
        let old_dir_orig = self.cc.resolve_original(*old_dir);
        let new_dir_orig = self.cc.resolve_original(*new_dir);
        let target_orig = self.cc.resolve_original(*target);
        if self.removed.contains(&target_orig) {
            return Err(ChainError::RemovedEntryModified {
                revision: rev,
                kind: OpKind::Rename,
                original: target_orig,
            });
        }
        self.apply_updates(rev, op)?;
        if !self.in_bound(rev, &[old_dir_orig, new_dir_orig, target_orig])? {
            return Ok(());
        }

        // An entry we already saw renamed gets its existing create-half
        // retargeted in place, so the net record spans the first source and
        // the final destination, never an intermediate hop.
        if let Some(info) = self.cc.renamed_originals.get(&target_orig).cloned() {
            let prev_parent = info.original_new_parent;
            let prev_name = info.new_name;
            let half_retargeted = match self.cc.by_original.get(&prev_parent).copied() {
                Some(key) => self
                    .cc
                    .chain_mut(key)
                    .rename_create_half(&prev_name, new_name),
                None => false,
            };
            if half_retargeted {
                self.known_targets.remove(&(prev_parent, prev_name.clone()));
                self.removed_names.insert((prev_parent, prev_name));
                self.record_rename(target_orig, old_dir_orig, old_name, new_dir_orig, new_name);
                return Ok(());
            }
        }

        // First rename of this entry (or its earlier create-half was
        // cancelled): synthesize the remove half on the source chain and
        // the create half on the destination chain.
        if self
            .removed_names
            .contains(&(old_dir_orig, old_name.to_owned()))
        {
            return Err(ChainError::RemoveOfMissingEntry {
                revision: rev,
                name: old_name.to_owned(),
                dir: old_dir_orig,
            });
        }
        let old_key = self.cc.ensure_chain(old_dir_orig);
        self.cc
            .chain_mut(old_key)
            .push_remove(Operation::remove(old_name.clone(), *old_dir));
        self.removed_names
            .insert((old_dir_orig, old_name.to_owned()));
        self.known_targets.remove(&(old_dir_orig, old_name.clone()));

        let new_key = self.cc.ensure_chain(new_dir_orig);
        self.cc
            .chain_mut(new_key)
            .push_create(Operation::create_half(
                new_name.clone(),
                *new_dir,
                *entry_type,
            ));
        self.record_rename(target_orig, old_dir_orig, old_name, new_dir_orig, new_name);
        Ok(())
    }

    /// Maintain the rename record and name bookkeeping shared by both
    /// rename paths. The first-seen source is kept on later renames.
    fn record_rename(
        &mut self,
        target_orig: BlockPointer,
        old_dir_orig: BlockPointer,
        old_name: &str,
        new_dir_orig: BlockPointer,
        new_name: &str,
    ) {
        match self.cc.renamed_originals.entry(target_orig) {
            Entry::Occupied(mut entry) => {
                let info = entry.get_mut();
                info.original_new_parent = new_dir_orig;
                info.new_name = new_name.to_owned();
            }
            Entry::Vacant(entry) => {
                entry.insert(RenameInfo {
                    original_old_parent: old_dir_orig,
                    old_name: old_name.to_owned(),
                    original_new_parent: new_dir_orig,
                    new_name: new_name.to_owned(),
                });
            }
        }
        self.removed_names
            .remove(&(new_dir_orig, new_name.to_owned()));
        self.known_targets
            .insert((new_dir_orig, new_name.to_owned()), target_orig);
    }

    fn process_set_attr(&mut self, rev: usize, op: &Operation, name: &str) -> Result<()> {
        let Operation::SetAttr { dir, target, .. } = op else {
            unreachable!()
        };
        let dir_orig = self.cc.resolve_original(*dir);
        let target_orig = self.cc.resolve_original(*target);
        // A removed entry is known either by its target pointer or, for
        // pre-range entries whose pointer the range never revealed, by its
        // (parent, name) pair.
        if self.removed.contains(&target_orig)
            || self
                .removed_names
                .contains(&(dir_orig, name.to_owned()))
        {
            return Err(ChainError::RemovedEntryModified {
                revision: rev,
                kind: OpKind::SetAttr,
                original: target_orig,
            });
        }
        self.apply_updates(rev, op)?;
        if !self.in_bound(rev, &[target_orig])? {
            return Ok(());
        }
        let key = self.cc.ensure_chain(target_orig);
        self.cc.chain_mut(key).push_set_attr(op.clone());
        self.known_targets
            .insert((dir_orig, name.to_owned()), target_orig);
        Ok(())
    }

    fn process_sync(&mut self, rev: usize, op: &Operation) -> Result<()> {
        let Operation::Sync { file, .. } = op else {
            unreachable!()
        };
        let file_orig = self.cc.resolve_original(*file);
        if self.removed.contains(&file_orig) {
            return Err(ChainError::RemovedEntryModified {
                revision: rev,
                kind: OpKind::Sync,
                original: file_orig,
            });
        }
        self.apply_updates(rev, op)?;
        if !self.in_bound(rev, &[file_orig])? {
            return Ok(());
        }
        let key = self.cc.ensure_chain(file_orig);
        self.cc.chain_mut(key).push_sync(op.clone());
        Ok(())
    }

    /// When the removed name's target is known, mark it removed and drop
    /// its setattrs, collapsing setattr-then-remove to the remove alone.
    fn mark_removed(&mut self, dir_orig: BlockPointer, name: &str) {
        if let Some(target) = self
            .known_targets
            .remove(&(dir_orig, name.to_owned()))
        {
            self.removed.insert(target);
            if let Some(key) = self.cc.by_original.get(&target).copied() {
                self.cc.chain_mut(key).drop_set_attrs();
            }
        }
    }

    fn apply_updates(&mut self, rev: usize, op: &Operation) -> Result<()> {
        let mut seen = HashSet::new();
        for update in op.updates() {
            if !seen.insert(update.unref) {
                return Err(ChainError::DuplicateUpdate(update.unref));
            }
            // An unref that is some chain's original but no longer its
            // most-recent pointer was already superseded in-range; letting
            // it through would orphan the existing chain's arena record.
            if !self.cc.by_most_recent.contains_key(&update.unref)
                && self.cc.by_original.contains_key(&update.unref)
            {
                return Err(ChainError::StaleUpdate {
                    revision: rev,
                    pointer: update.unref,
                });
            }
            self.cc.apply_update(update);
        }
        Ok(())
    }

    fn in_bound(&self, rev: usize, originals: &[BlockPointer]) -> Result<bool> {
        let Some(bound) = self.bound else {
            return Ok(true);
        };
        for original in originals {
            if !bound.by_original.contains_key(original) {
                if self.strict {
                    return Err(ChainError::UnboundedPointer {
                        revision: rev,
                        pointer: *original,
                    });
                }
                return Ok(false);
            }
        }
        Ok(true)
    }
}
