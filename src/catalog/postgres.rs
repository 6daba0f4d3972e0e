//! PostgreSQL catalog over a [`MorphExecutor`].

use super::{Catalog, LedgerEntry, RelationKind, DEFAULT_LEDGER_TABLE};
use crate::config::PartitionConfig;
use crate::error::MorphResult;
use crate::executor::{MorphExecutor, StoreError};
use crate::naming::{validate_qualified, Association};
use may_postgres::Row;

/// Catalog backed by `pg_class`, `pg_proc` and the partition ledger table.
///
/// Pass a [`Transaction`](crate::transaction::Transaction) as the executor to
/// make the reads and the applied script part of one transaction.
pub struct PgCatalog<'a> {
    executor: &'a dyn MorphExecutor,
    ledger_table: String,
}

impl<'a> PgCatalog<'a> {
    pub fn new(executor: &'a dyn MorphExecutor) -> Self {
        Self {
            executor,
            ledger_table: DEFAULT_LEDGER_TABLE.to_string(),
        }
    }

    /// Catalog using the configured ledger table.
    pub fn from_config(
        executor: &'a dyn MorphExecutor,
        config: &PartitionConfig,
    ) -> MorphResult<Self> {
        Self::new(executor).with_ledger_table(config.ledger_table.as_str())
    }

    /// Use a different ledger table (`table` or `schema.table`).
    pub fn with_ledger_table(mut self, ledger_table: impl Into<String>) -> MorphResult<Self> {
        let ledger_table = ledger_table.into();
        validate_qualified(&ledger_table)?;
        self.ledger_table = ledger_table;
        Ok(self)
    }

    fn ledger_present(&self) -> MorphResult<bool> {
        let row = self.executor.query_one(
            "SELECT to_regclass($1::text) IS NOT NULL",
            &[&self.ledger_table],
        )?;
        Ok(column(&row, 0)?)
    }
}

fn column<'r, T>(row: &'r Row, idx: usize) -> Result<T, StoreError>
where
    T: may_postgres::types::FromSql<'r>,
{
    row.try_get(idx)
        .map_err(|e| StoreError::ParseError(format!("column {}: {}", idx, e)))
}

impl Catalog for PgCatalog<'_> {
    fn ledger_table(&self) -> &str {
        &self.ledger_table
    }

    fn relation_kind(&self, name: &str) -> MorphResult<Option<RelationKind>> {
        let rows = self.executor.query_all(
            "SELECT c.relkind::text FROM pg_class c WHERE c.oid = to_regclass($1::text)",
            &[&name],
        )?;
        match rows.first() {
            Some(row) => {
                let relkind: String = column(row, 0)?;
                Ok(Some(RelationKind::from_relkind(&relkind)))
            }
            None => Ok(None),
        }
    }

    fn trigger_source(&self, function_name: &str) -> MorphResult<Option<String>> {
        let signature = format!("{}()", function_name);
        let rows = self.executor.query_all(
            "SELECT p.prosrc FROM pg_proc p WHERE p.oid = to_regprocedure($1::text)",
            &[&signature],
        )?;
        match rows.first() {
            Some(row) => Ok(Some(column(row, 0)?)),
            None => Ok(None),
        }
    }

    fn ledger_entries(&self, association: &Association) -> MorphResult<Vec<LedgerEntry>> {
        if !self.ledger_present()? {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT child_table, type_tag, position, collapsed, registered_at FROM {} \
             WHERE base_table = $1 AND discriminator = $2 ORDER BY position",
            self.ledger_table
        );
        let base_table = association.base_table();
        let discriminator = association.discriminator();
        let rows = self.executor.query_all(&sql, &[&base_table, &discriminator])?;

        rows.iter()
            .map(|row| {
                Ok(LedgerEntry {
                    child_table: column(row, 0)?,
                    type_tag: column(row, 1)?,
                    position: column(row, 2)?,
                    collapsed: column(row, 3)?,
                    registered_at: column(row, 4)?,
                })
            })
            .collect()
    }

    fn execute(&self, sql: &str) -> MorphResult<()> {
        log::debug!("executing: {}", sql);
        self.executor.execute(sql, &[])?;
        Ok(())
    }
}
