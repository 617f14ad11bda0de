//! Chain summary projection for the status layer.
//!
//! Read-only rendering of a chain set into human-readable entries;
//! diagnostics only, never used for correctness.

use serde::{Deserialize, Serialize};

use crate::chains::builder::CrChains;
use crate::chains::chain::Chain;
use crate::ops::OpKind;
use crate::types::BlockPointer;

/// Cache of resident in-memory nodes, keyed by most-recent pointer.
/// Collaborator owned outside the engine.
pub trait NodeCache {
    /// Current path of the resident node for a pointer, if any.
    fn path_from_most_recent(&self, most_recent: BlockPointer) -> Option<String>;
}

/// One chain rendered for the status display.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChainSummary {
    pub path: String,
    /// Rendered ops, grouped by operation kind with in-kind order kept.
    pub ops: Vec<String>,
}

impl CrChains {
    /// Render every chain. `identify` is the chain set used to find
    /// resident nodes; callers pass the unmerged chains, since those are
    /// the most likely to match the cache. Falls back to a name taken from
    /// the chain's own ops when no node is resident.
    pub fn summary(&self, identify: &CrChains, cache: &dyn NodeCache) -> Vec<ChainSummary> {
        let mut chains: Vec<&Chain> = self.chains().collect();
        chains.sort_by_key(|chain| chain.original());

        chains
            .into_iter()
            .map(|chain| {
                let path = identify
                    .chain_by_original(chain.original())
                    .ok()
                    .and_then(|ic| cache.path_from_most_recent(ic.most_recent()))
                    .unwrap_or_else(|| synthesized_path(chain));

                let mut rendered: Vec<(OpKind, String)> = chain
                    .ops()
                    .iter()
                    .map(|op| {
                        (
                            op.kind(),
                            format!("{} [{}]", op, op.kind().notification_str()),
                        )
                    })
                    .collect();
                rendered.sort_by_key(|(kind, _)| *kind);

                ChainSummary {
                    path,
                    ops: rendered.into_iter().map(|(_, s)| s).collect(),
                }
            })
            .collect()
    }
}

fn synthesized_path(chain: &Chain) -> String {
    chain
        .ops()
        .iter()
        .find_map(|op| op.name())
        .map(str::to_owned)
        .unwrap_or_else(|| format!("({})", &chain.most_recent().to_hex()[..8]))
}
