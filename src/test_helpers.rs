//! Test helpers: an in-memory catalog and live test database access.
//!
//! [`InMemoryCatalog`] applies [`Statement`]s structurally and enforces the
//! dependency rules PostgreSQL would (a trigger needs its view and function,
//! a function cannot be dropped while a trigger uses it, a table cannot be
//! dropped while a view selects from it), so planning bugs surface as errors
//! in unit tests instead of against a live server.

use crate::catalog::{Catalog, LedgerEntry, RelationKind, DEFAULT_LEDGER_TABLE};
use crate::connection::{connect, ConnectionError};
use crate::error::{MorphError, MorphResult};
use crate::executor::{MayPostgresExecutor, StoreError};
use crate::naming::{validate_qualified, Association};
use crate::sql::Statement;
use chrono::Utc;
use std::cell::RefCell;
use std::collections::BTreeMap;

pub const TEST_DATABASE_URL_ENV: &str = "MORPHGUARD_TEST_DATABASE_URL";

#[derive(Debug, Clone)]
struct LedgerRow {
    base_table: String,
    discriminator: String,
    entry: LedgerEntry,
}

#[derive(Debug, Default)]
struct CatalogState {
    relations: BTreeMap<String, RelationKind>,
    /// view -> tables it selects from
    views: BTreeMap<String, Vec<String>>,
    functions: BTreeMap<String, String>,
    /// trigger -> (table, function)
    triggers: BTreeMap<String, (String, String)>,
    /// ledger table -> rows
    ledgers: BTreeMap<String, Vec<LedgerRow>>,
    executed: Vec<String>,
    fail_on: Option<String>,
}

/// Catalog kept in memory
#[derive(Debug)]
pub struct InMemoryCatalog {
    state: RefCell<CatalogState>,
    ledger_table: String,
}

impl Default for InMemoryCatalog {
    fn default() -> Self {
        Self {
            state: RefCell::default(),
            ledger_table: DEFAULT_LEDGER_TABLE.to_string(),
        }
    }
}

fn rejected(message: String) -> MorphError {
    MorphError::NativeStore(StoreError::QueryError(message))
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read ledger rows from `ledger_table` instead of the default.
    pub fn with_ledger_table(mut self, ledger_table: impl Into<String>) -> MorphResult<Self> {
        let ledger_table = ledger_table.into();
        validate_qualified(&ledger_table)?;
        self.ledger_table = ledger_table;
        Ok(self)
    }

    /// Create a plain table, e.g. an unrelated one holding the base name.
    pub fn create_table(&self, name: &str) {
        self.state
            .borrow_mut()
            .relations
            .insert(name.to_string(), RelationKind::Table);
    }

    pub fn create_view(&self, name: &str, sources: &[&str]) {
        let mut state = self.state.borrow_mut();
        state.relations.insert(name.to_string(), RelationKind::View);
        state
            .views
            .insert(name.to_string(), sources.iter().map(|s| s.to_string()).collect());
    }

    pub fn create_relation(&self, name: &str, kind: RelationKind) {
        self.state.borrow_mut().relations.insert(name.to_string(), kind);
    }

    /// Install a trigger function body directly, bypassing the ledger.
    pub fn install_function(&self, name: &str, body: &str) {
        self.state
            .borrow_mut()
            .functions
            .insert(name.to_string(), body.to_string());
    }

    /// Reject the first statement whose SQL contains `fragment`.
    pub fn fail_on(&self, fragment: &str) {
        self.state.borrow_mut().fail_on = Some(fragment.to_string());
    }

    /// SQL of every statement applied or executed so far, in order
    pub fn executed(&self) -> Vec<String> {
        self.state.borrow().executed.clone()
    }

    pub fn clear_executed(&self) {
        self.state.borrow_mut().executed.clear();
    }

    pub fn view_sources(&self, view: &str) -> Option<Vec<String>> {
        self.state.borrow().views.get(view).cloned()
    }

    pub fn function_body(&self, name: &str) -> Option<String> {
        self.state.borrow().functions.get(name).cloned()
    }

    pub fn has_trigger(&self, name: &str) -> bool {
        self.state.borrow().triggers.contains_key(name)
    }

    pub fn relation_names(&self) -> Vec<String> {
        self.state.borrow().relations.keys().cloned().collect()
    }

    fn record(&self, sql: String) -> MorphResult<()> {
        let mut state = self.state.borrow_mut();
        if let Some(fragment) = &state.fail_on {
            if sql.contains(fragment.as_str()) {
                state.fail_on = None;
                return Err(rejected(format!("injected failure: {}", sql)));
            }
        }
        state.executed.push(sql);
        Ok(())
    }
}

impl CatalogState {
    fn kind(&self, name: &str) -> Option<&RelationKind> {
        self.relations.get(name)
    }

    fn depending_views(&self, table: &str) -> Vec<String> {
        self.views
            .iter()
            .filter(|(_, sources)| sources.iter().any(|s| s == table))
            .map(|(view, _)| view.clone())
            .collect()
    }

    fn ledger_rows(&mut self, ledger: &str) -> MorphResult<&mut Vec<LedgerRow>> {
        self.ledgers
            .get_mut(ledger)
            .ok_or_else(|| rejected(format!("relation \"{}\" does not exist", ledger)))
    }

    fn apply(&mut self, statement: &Statement) -> MorphResult<()> {
        match statement {
            Statement::CreateLedger { ledger } => {
                if !self.ledgers.contains_key(ledger) {
                    self.ledgers.insert(ledger.clone(), Vec::new());
                    self.relations.insert(ledger.clone(), RelationKind::Table);
                }
            }
            Statement::CreatePartitionTable { table, .. } => {
                self.relations
                    .entry(table.clone())
                    .or_insert(RelationKind::Table);
            }
            Statement::CreateOrReplaceView { view, sources } => {
                match self.kind(view) {
                    None | Some(RelationKind::View) => {}
                    Some(_) => return Err(rejected(format!("\"{}\" is not a view", view))),
                }
                if let Some(missing) = sources
                    .iter()
                    .find(|s| self.kind(s) != Some(&RelationKind::Table))
                {
                    return Err(rejected(format!("relation \"{}\" does not exist", missing)));
                }
                self.relations.insert(view.clone(), RelationKind::View);
                self.views.insert(view.clone(), sources.clone());
            }
            Statement::DropView { view, if_exists } => match self.kind(view) {
                Some(RelationKind::View) => {
                    self.relations.remove(view);
                    self.views.remove(view);
                    self.triggers.retain(|_, (table, _)| table != view);
                }
                None if *if_exists => {}
                None => return Err(rejected(format!("view \"{}\" does not exist", view))),
                Some(_) => return Err(rejected(format!("\"{}\" is not a view", view))),
            },
            Statement::CreateOrReplaceFunction { function, body } => {
                self.functions.insert(function.clone(), body.clone());
            }
            Statement::DropFunction { function } => {
                if self.triggers.values().any(|(_, f)| f == function) {
                    return Err(rejected(format!(
                        "cannot drop function {}() because other objects depend on it",
                        function
                    )));
                }
                self.functions.remove(function);
            }
            Statement::DropTrigger { trigger, table } => {
                if self.triggers.get(trigger).map(|(t, _)| t == table).unwrap_or(false) {
                    self.triggers.remove(trigger);
                }
            }
            Statement::CreateTrigger {
                trigger,
                table,
                function,
            } => {
                if self.kind(table) != Some(&RelationKind::View) {
                    return Err(rejected(format!(
                        "\"{}\" is not a view; INSTEAD OF triggers need a view",
                        table
                    )));
                }
                if !self.functions.contains_key(function) {
                    return Err(rejected(format!("function {}() does not exist", function)));
                }
                if self.triggers.contains_key(trigger) {
                    return Err(rejected(format!("trigger \"{}\" already exists", trigger)));
                }
                self.triggers
                    .insert(trigger.clone(), (table.clone(), function.clone()));
            }
            Statement::RenameTable { from, to } => {
                match self.kind(from) {
                    Some(RelationKind::Table) => {}
                    None => return Ok(()),
                    Some(_) => return Err(rejected(format!("\"{}\" is not a table", from))),
                }
                if self.kind(to).is_some() {
                    return Err(rejected(format!("relation \"{}\" already exists", to)));
                }
                self.relations.remove(from);
                self.relations.insert(to.clone(), RelationKind::Table);
                for sources in self.views.values_mut() {
                    for source in sources.iter_mut().filter(|s| *s == from) {
                        *source = to.clone();
                    }
                }
            }
            Statement::DropTable { table } => match self.kind(table) {
                Some(RelationKind::Table) => {
                    let dependents = self.depending_views(table);
                    if !dependents.is_empty() {
                        return Err(rejected(format!(
                            "cannot drop table {} because view {} depends on it",
                            table,
                            dependents.join(", ")
                        )));
                    }
                    self.relations.remove(table);
                }
                None => {}
                Some(_) => return Err(rejected(format!("\"{}\" is not a table", table))),
            },
            Statement::LedgerInsert {
                ledger,
                base_table,
                discriminator,
                child_table,
                type_tag,
            } => {
                let rows = self.ledger_rows(ledger)?;
                let same_association = |row: &&LedgerRow| {
                    row.base_table == *base_table && row.discriminator == *discriminator
                };
                if rows
                    .iter()
                    .filter(same_association)
                    .any(|row| row.entry.child_table == *child_table)
                {
                    return Ok(());
                }
                let position = rows
                    .iter()
                    .filter(same_association)
                    .map(|row| row.entry.position)
                    .max()
                    .unwrap_or(0)
                    + 1;
                rows.push(LedgerRow {
                    base_table: base_table.clone(),
                    discriminator: discriminator.clone(),
                    entry: LedgerEntry {
                        child_table: child_table.clone(),
                        type_tag: type_tag.clone(),
                        position,
                        collapsed: false,
                        registered_at: Some(Utc::now().naive_utc()),
                    },
                });
            }
            Statement::LedgerDelete {
                ledger,
                base_table,
                discriminator,
                child_table,
            } => {
                self.ledger_rows(ledger)?.retain(|row| {
                    !(row.base_table == *base_table
                        && row.discriminator == *discriminator
                        && row.entry.child_table == *child_table)
                });
            }
            Statement::LedgerSetCollapsed {
                ledger,
                base_table,
                discriminator,
                collapsed,
            } => {
                for row in self.ledger_rows(ledger)?.iter_mut() {
                    if row.base_table == *base_table && row.discriminator == *discriminator {
                        row.entry.collapsed = *collapsed;
                    }
                }
            }
        }
        Ok(())
    }
}

impl Catalog for InMemoryCatalog {
    fn relation_kind(&self, name: &str) -> MorphResult<Option<RelationKind>> {
        Ok(self.state.borrow().kind(name).cloned())
    }

    fn trigger_source(&self, function_name: &str) -> MorphResult<Option<String>> {
        Ok(self.function_body(function_name))
    }

    fn ledger_table(&self) -> &str {
        &self.ledger_table
    }

    fn ledger_entries(&self, association: &Association) -> MorphResult<Vec<LedgerEntry>> {
        let state = self.state.borrow();
        let mut entries: Vec<LedgerEntry> = state
            .ledgers
            .get(&self.ledger_table)
            .into_iter()
            .flatten()
            .filter(|row| {
                row.base_table == association.base_table()
                    && row.discriminator == association.discriminator()
            })
            .map(|row| row.entry.clone())
            .collect();
        entries.sort_by_key(|entry| entry.position);
        Ok(entries)
    }

    /// Raw SQL is recorded but has no structural effect.
    fn execute(&self, sql: &str) -> MorphResult<()> {
        self.record(sql.to_string())
    }

    fn apply(&self, statement: &Statement) -> MorphResult<()> {
        self.record(statement.to_sql())?;
        self.state.borrow_mut().apply(statement)
    }
}

/// Live PostgreSQL database for integration tests
///
/// The URL comes from `MORPHGUARD_TEST_DATABASE_URL`; tests skip when it is
/// not set.
pub struct TestDatabase {
    url: String,
}

impl TestDatabase {
    /// The configured test database URL, if any
    pub fn url() -> Option<String> {
        std::env::var(TEST_DATABASE_URL_ENV)
            .ok()
            .filter(|url| !url.trim().is_empty())
    }

    pub fn new() -> Result<Self, ConnectionError> {
        let url = Self::url().ok_or(ConnectionError::MissingConnectionString)?;
        Ok(Self { url })
    }

    /// A fresh connection wrapped in an executor
    pub fn executor(&self) -> Result<MayPostgresExecutor, ConnectionError> {
        Ok(MayPostgresExecutor::new(connect(&self.url)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(name: &str, sources: &[&str]) -> Statement {
        Statement::CreateOrReplaceView {
            view: name.to_string(),
            sources: sources.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_trigger_requires_view_and_function() {
        let catalog = InMemoryCatalog::new();
        let trigger = Statement::CreateTrigger {
            trigger: "t".to_string(),
            table: "likes".to_string(),
            function: "f".to_string(),
        };
        assert!(catalog.apply(&trigger).is_err());

        catalog.create_table("likes_posts");
        catalog.apply(&view("likes", &["likes_posts"])).unwrap();
        assert!(catalog.apply(&trigger).is_err());

        catalog.install_function("f", "BEGIN RETURN NEW; END;");
        catalog.apply(&trigger).unwrap();
        assert!(catalog.has_trigger("t"));
    }

    #[test]
    fn test_table_used_by_view_cannot_be_dropped() {
        let catalog = InMemoryCatalog::new();
        catalog.create_table("likes_posts");
        catalog.apply(&view("likes", &["likes_posts"])).unwrap();
        let drop = Statement::DropTable {
            table: "likes_posts".to_string(),
        };
        let err = catalog.apply(&drop).unwrap_err();
        assert!(matches!(err, MorphError::NativeStore(_)));
    }

    #[test]
    fn test_ledger_rows_are_kept_per_table() {
        let insert = |ledger: &str| Statement::LedgerInsert {
            ledger: ledger.to_string(),
            base_table: "likes".to_string(),
            discriminator: "likeable".to_string(),
            child_table: "posts".to_string(),
            type_tag: "Post".to_string(),
        };
        let catalog = InMemoryCatalog::new()
            .with_ledger_table("poly_ledger")
            .unwrap();
        let likes = Association::new("likes", "likeable").unwrap();

        for ledger in ["morphguard_partitions", "poly_ledger"] {
            catalog
                .apply(&Statement::CreateLedger {
                    ledger: ledger.to_string(),
                })
                .unwrap();
        }
        catalog.apply(&insert("morphguard_partitions")).unwrap();
        assert!(catalog.ledger_entries(&likes).unwrap().is_empty());

        catalog.apply(&insert("poly_ledger")).unwrap();
        assert_eq!(catalog.ledger_entries(&likes).unwrap().len(), 1);
        assert_eq!(catalog.ledger_table(), "poly_ledger");
    }

    #[test]
    fn test_rename_of_missing_table_is_skipped() {
        let catalog = InMemoryCatalog::new();
        catalog.create_table("likes");
        let rename = Statement::RenameTable {
            from: "likes_posts".to_string(),
            to: "likes".to_string(),
        };
        catalog.apply(&rename).unwrap();
        assert_eq!(catalog.relation_names(), vec!["likes".to_string()]);
    }

    #[test]
    fn test_injected_failure_fires_once() {
        let catalog = InMemoryCatalog::new();
        catalog.fail_on("DROP VIEW");
        let drop = Statement::DropView {
            view: "likes".to_string(),
            if_exists: true,
        };
        assert!(catalog.apply(&drop).is_err());
        assert!(catalog.apply(&drop).is_ok());
        assert_eq!(catalog.executed(), vec!["DROP VIEW IF EXISTS likes;".to_string()]);
    }
}
