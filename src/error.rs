//! Errors raised by the partition engine

use crate::catalog::RelationKind;
use crate::executor::StoreError;
use std::fmt;

/// Partition engine errors
///
/// Every variant is raised synchronously to the immediate caller. The engine
/// performs no rollback of its own; the caller's transaction boundary undoes
/// statements that were already applied.
#[derive(Debug)]
pub enum MorphError {
    /// The child table already has a routing branch for this association
    DuplicatePartition {
        base_table: String,
        child_table: String,
    },
    /// An object that is not a proxy of this association occupies the base name
    ConflictingBaseTable {
        base_table: String,
        found: RelationKind,
    },
    /// The child table is not registered for this association
    UnknownPartition {
        base_table: String,
        child_table: String,
    },
    /// Collapse requires exactly one registered partition
    NotCollapsible {
        base_table: String,
        remaining: usize,
    },
    /// First partition of an association needs explicit column definitions
    MissingLayout { partition_table: String },
    /// Identifier cannot be used in generated SQL
    InvalidIdentifier { identifier: String, reason: String },
    /// Existing trigger function could not be read back into a partition set
    MalformedTriggerSource { function_name: String, reason: String },
    /// Underlying statement failure, propagated unchanged
    NativeStore(StoreError),
}

impl fmt::Display for MorphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MorphError::DuplicatePartition {
                base_table,
                child_table,
            } => write!(
                f,
                "Partition for '{}' already exists on '{}'",
                child_table, base_table
            ),
            MorphError::ConflictingBaseTable { base_table, found } => write!(
                f,
                "'{}' already exists as an unrelated {}. \
                 Rename or drop it manually before partitioning this association",
                base_table, found
            ),
            MorphError::UnknownPartition {
                base_table,
                child_table,
            } => write!(
                f,
                "No partition for '{}' is registered on '{}'",
                child_table, base_table
            ),
            MorphError::NotCollapsible {
                base_table,
                remaining,
            } => write!(
                f,
                "Cannot collapse '{}': {} partitions registered, exactly 1 required",
                base_table, remaining
            ),
            MorphError::MissingLayout { partition_table } => write!(
                f,
                "Cannot create '{}': no sibling partition to copy columns from, \
                 pass an explicit column layout",
                partition_table
            ),
            MorphError::InvalidIdentifier { identifier, reason } => {
                write!(f, "Invalid identifier '{}': {}", identifier, reason)
            }
            MorphError::MalformedTriggerSource {
                function_name,
                reason,
            } => write!(
                f,
                "Cannot read partitions from {}(): {}",
                function_name, reason
            ),
            MorphError::NativeStore(e) => write!(f, "Store error: {}", e),
        }
    }
}

impl std::error::Error for MorphError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MorphError::NativeStore(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for MorphError {
    fn from(error: StoreError) -> Self {
        MorphError::NativeStore(error)
    }
}

pub type MorphResult<T> = Result<T, MorphError>;
