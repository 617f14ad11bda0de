//! Chain construction, collapsing, and projection.

mod builder;
mod chain;
mod summary;

pub use builder::{ChainKey, CrChains};
pub use chain::Chain;
pub use summary::{ChainSummary, NodeCache};
