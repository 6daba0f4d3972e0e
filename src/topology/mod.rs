//! Partition topology: the proxy state machine and the ledger behind it.
//!
//! ```text
//! NoProxy --add--> SinglePartitionProxy --add--> MultiPartitionProxy
//!    ^                 |      ^                        |
//!    |              collapse  +--------remove----------+
//!    +--(renamed)------+
//! ```

pub mod ledger;
pub mod manager;
pub mod state;

pub use manager::MorphManager;
pub use state::{BaseRelation, Topology, TopologySnapshot};
