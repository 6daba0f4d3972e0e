//! Partitions of a polymorphic association and the live set they form.

use crate::error::{MorphError, MorphResult};
use crate::naming::{
    unqualified, validate_identifier, validate_qualified, Association, NamingStrategy,
};
use sea_query::ColumnDef;
use serde::Serialize;

/// One (association, child table) pair, stored in `<base>_<child>` and
/// selected by rows whose `<column>_type` equals `type_tag`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Partition {
    association: Association,
    child_table: String,
    type_tag: String,
}

impl Partition {
    /// Build a partition, deriving its type tag from the naming strategy.
    pub fn new(
        association: &Association,
        child_table: impl Into<String>,
        naming: &dyn NamingStrategy,
    ) -> MorphResult<Self> {
        let child_table = child_table.into();
        let type_tag = naming.type_tag(&child_table);
        Self::with_type_tag(association, child_table, type_tag)
    }

    /// Build a partition with an already known type tag.
    pub fn with_type_tag(
        association: &Association,
        child_table: impl Into<String>,
        type_tag: impl Into<String>,
    ) -> MorphResult<Self> {
        let child_table = child_table.into();
        let type_tag = type_tag.into();
        validate_qualified(&child_table)?;
        validate_identifier(unqualified(&association.partition_table(&child_table)))?;
        if type_tag.is_empty() {
            return Err(MorphError::InvalidIdentifier {
                identifier: child_table,
                reason: "type tag is empty".to_string(),
            });
        }
        Ok(Self {
            association: association.clone(),
            child_table,
            type_tag,
        })
    }

    pub fn association(&self) -> &Association {
        &self.association
    }

    pub fn child_table(&self) -> &str {
        &self.child_table
    }

    pub fn type_tag(&self) -> &str {
        &self.type_tag
    }

    /// Physical table holding this partition's rows
    pub fn table_name(&self) -> String {
        self.association.partition_table(&self.child_table)
    }

    fn same_child(&self, child_table: &str) -> bool {
        self.child_table == child_table
            || unqualified(&self.child_table) == unqualified(child_table)
    }
}

/// Ordered, duplicate-free partitions registered against one association.
///
/// Order is registration order: removing a child and adding it again moves
/// it to the end.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(transparent)]
pub struct PartitionSet {
    partitions: Vec<Partition>,
}

impl PartitionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.partitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Partition> {
        self.partitions.iter()
    }

    pub fn first(&self) -> Option<&Partition> {
        self.partitions.first()
    }

    pub fn contains(&self, child_table: &str) -> bool {
        self.get(child_table).is_some()
    }

    pub fn get(&self, child_table: &str) -> Option<&Partition> {
        self.partitions.iter().find(|p| p.same_child(child_table))
    }

    /// Append a partition.
    ///
    /// # Errors
    ///
    /// `DuplicatePartition` if the child table is already a member; the set is
    /// left unchanged.
    pub fn push(&mut self, partition: Partition) -> MorphResult<()> {
        if self.contains(partition.child_table()) {
            return Err(MorphError::DuplicatePartition {
                base_table: partition.association().base_table().to_string(),
                child_table: partition.child_table().to_string(),
            });
        }
        self.partitions.push(partition);
        Ok(())
    }

    /// Copy of the set with `partition` appended.
    pub fn with(&self, partition: Partition) -> MorphResult<Self> {
        let mut next = self.clone();
        next.push(partition)?;
        Ok(next)
    }

    /// Copy of the set without `child_table`.
    pub fn without(&self, child_table: &str) -> Self {
        Self {
            partitions: self
                .partitions
                .iter()
                .filter(|p| !p.same_child(child_table))
                .cloned()
                .collect(),
        }
    }

    pub fn child_tables(&self) -> Vec<&str> {
        self.partitions.iter().map(Partition::child_table).collect()
    }
}

impl<'a> IntoIterator for &'a PartitionSet {
    type Item = &'a Partition;
    type IntoIter = std::slice::Iter<'a, Partition>;

    fn into_iter(self) -> Self::IntoIter {
        self.partitions.iter()
    }
}

/// Column layout of a newly created partition table
#[derive(Debug, Clone)]
pub enum PartitionLayout {
    /// Explicit column definitions (needed for the first partition)
    Columns(Vec<ColumnDef>),
    /// Copy columns, defaults and indexes from an existing table
    Like(String),
}
