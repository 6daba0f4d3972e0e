//! Observed state of an association.

use crate::catalog::RelationKind;
use crate::config::PartitionSource;
use crate::naming::Association;
use crate::partition::PartitionSet;
use serde::Serialize;

/// What occupies the base table name
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "kind", rename_all = "snake_case")]
pub enum BaseRelation {
    /// Nothing
    Vacant,
    /// The union view over this association's partitions
    ProxyView,
    /// The sole partition table, renamed by a collapse
    Collapsed,
    /// Something this association did not create
    Foreign(RelationKind),
}

/// Proxy lifecycle stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Topology {
    /// No view, trigger or function (nothing registered, or collapsed)
    NoProxy,
    /// View and trigger in front of two or more partitions
    MultiPartitionProxy,
    /// View and trigger in front of a single partition, not yet collapsed
    SinglePartitionProxy,
}

impl Topology {
    pub fn classify(base: &BaseRelation, partitions: &PartitionSet) -> Self {
        match (base, partitions.len()) {
            (BaseRelation::Collapsed, _) | (_, 0) => Topology::NoProxy,
            (_, 1) => Topology::SinglePartitionProxy,
            _ => Topology::MultiPartitionProxy,
        }
    }
}

/// Result of `MorphManager::status`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopologySnapshot {
    pub association: Association,
    pub source: PartitionSource,
    pub base_relation: BaseRelation,
    pub topology: Topology,
    pub partitions: PartitionSet,
    /// Partitions were read from the trigger function, not the ledger
    pub adopted: bool,
    pub trigger_function: Option<String>,
}
