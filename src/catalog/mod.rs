//! Live schema state as seen by the partition engine.
//!
//! The engine never talks to the database directly. Everything it needs to
//! know (what occupies a name, the current trigger function, the ledger) and
//! everything it changes goes through a [`Catalog`].

pub mod postgres;
pub mod source;

pub use postgres::PgCatalog;
pub use source::parse_trigger_source;

use crate::error::MorphResult;
use crate::naming::Association;
use crate::sql::Statement;
use chrono::NaiveDateTime;
use serde::Serialize;
use std::fmt;

/// Ledger table used unless configured otherwise
pub const DEFAULT_LEDGER_TABLE: &str = "morphguard_partitions";

/// Kind of relation occupying a name
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    Table,
    View,
    /// Anything else (materialized view, sequence, foreign table, ...)
    Other(String),
}

impl RelationKind {
    /// Map a `pg_class.relkind` code.
    pub fn from_relkind(relkind: &str) -> Self {
        match relkind {
            "r" | "p" => RelationKind::Table,
            "v" => RelationKind::View,
            "m" => RelationKind::Other("materialized view".to_string()),
            "S" => RelationKind::Other("sequence".to_string()),
            "f" => RelationKind::Other("foreign table".to_string()),
            "i" | "I" => RelationKind::Other("index".to_string()),
            "c" => RelationKind::Other("composite type".to_string()),
            other => RelationKind::Other(format!("relation (relkind '{}')", other)),
        }
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelationKind::Table => write!(f, "table"),
            RelationKind::View => write!(f, "view"),
            RelationKind::Other(kind) => write!(f, "{}", kind),
        }
    }
}

/// One registered partition as stored in the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    pub child_table: String,
    pub type_tag: String,
    pub position: i32,
    pub collapsed: bool,
    pub registered_at: Option<NaiveDateTime>,
}

/// Read and write access to the schema the engine manages.
///
/// Reads are always live: the engine calls them immediately before planning
/// a mutation and keeps no cache between operations.
pub trait Catalog {
    /// What occupies `name`, if anything.
    fn relation_kind(&self, name: &str) -> MorphResult<Option<RelationKind>>;

    fn table_exists(&self, name: &str) -> MorphResult<bool> {
        Ok(matches!(self.relation_kind(name)?, Some(RelationKind::Table)))
    }

    /// Body of the named trigger function, `None` if it does not exist.
    fn trigger_source(&self, function_name: &str) -> MorphResult<Option<String>>;

    /// Table holding the partition ledger, `table` or `schema.table`.
    ///
    /// Scripts planned against this catalog write their ledger rows here.
    fn ledger_table(&self) -> &str;

    /// Ledger rows for `association` in registration order.
    ///
    /// An absent ledger table reads as empty.
    fn ledger_entries(&self, association: &Association) -> MorphResult<Vec<LedgerEntry>>;

    /// Run one SQL command.
    fn execute(&self, sql: &str) -> MorphResult<()>;

    /// Apply one structured statement.
    fn apply(&self, statement: &Statement) -> MorphResult<()> {
        self.execute(&statement.to_sql())
    }
}
