//! Structured DDL/DML statements.
//!
//! Plans are built from `Statement` values rather than raw strings so that a
//! catalog can inspect what it is asked to apply; [`Statement::to_sql`] is the
//! only place that turns them into text. Each statement renders to exactly one
//! SQL command, which keeps them executable over the extended query protocol.

use serde::Serialize;
use std::fmt;

/// One generated SQL command
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Statement {
    /// `CREATE TABLE IF NOT EXISTS` for the partition ledger
    CreateLedger { ledger: String },
    /// Pre-rendered `CREATE TABLE IF NOT EXISTS` for a partition
    CreatePartitionTable { table: String, sql: String },
    /// `CREATE OR REPLACE VIEW <view> AS SELECT * FROM p1 UNION ALL ...`
    CreateOrReplaceView { view: String, sources: Vec<String> },
    DropView { view: String, if_exists: bool },
    /// `CREATE OR REPLACE FUNCTION <function>() RETURNS TRIGGER AS $$ <body> $$`
    CreateOrReplaceFunction { function: String, body: String },
    DropFunction { function: String },
    DropTrigger { trigger: String, table: String },
    CreateTrigger {
        trigger: String,
        table: String,
        function: String,
    },
    RenameTable { from: String, to: String },
    DropTable { table: String },
    /// Append a child to the ledger after the current last position
    LedgerInsert {
        ledger: String,
        base_table: String,
        discriminator: String,
        child_table: String,
        type_tag: String,
    },
    LedgerDelete {
        ledger: String,
        base_table: String,
        discriminator: String,
        child_table: String,
    },
    LedgerSetCollapsed {
        ledger: String,
        base_table: String,
        discriminator: String,
        collapsed: bool,
    },
}

impl Statement {
    pub fn to_sql(&self) -> String {
        match self {
            Statement::CreateLedger { ledger } => format!(
                "CREATE TABLE IF NOT EXISTS {ledger} (\n\
                 \x20   base_table VARCHAR(255) NOT NULL,\n\
                 \x20   discriminator VARCHAR(63) NOT NULL,\n\
                 \x20   child_table VARCHAR(255) NOT NULL,\n\
                 \x20   type_tag VARCHAR(255) NOT NULL,\n\
                 \x20   position INTEGER NOT NULL,\n\
                 \x20   collapsed BOOLEAN NOT NULL DEFAULT FALSE,\n\
                 \x20   registered_at TIMESTAMP NOT NULL DEFAULT NOW(),\n\
                 \x20   PRIMARY KEY (base_table, discriminator, child_table)\n\
                 );"
            ),
            Statement::CreatePartitionTable { sql, .. } => sql.clone(),
            Statement::CreateOrReplaceView { view, sources } => {
                let selects: Vec<String> = sources
                    .iter()
                    .map(|source| format!("SELECT * FROM {source}"))
                    .collect();
                format!(
                    "CREATE OR REPLACE VIEW {view} AS {};",
                    selects.join(" UNION ALL ")
                )
            }
            Statement::DropView { view, if_exists } => {
                if *if_exists {
                    format!("DROP VIEW IF EXISTS {view};")
                } else {
                    format!("DROP VIEW {view};")
                }
            }
            Statement::CreateOrReplaceFunction { function, body } => format!(
                "CREATE OR REPLACE FUNCTION {function}() RETURNS TRIGGER AS $$\n{body} $$ LANGUAGE plpgsql;"
            ),
            Statement::DropFunction { function } => {
                format!("DROP FUNCTION IF EXISTS {function}();")
            }
            Statement::DropTrigger { trigger, table } => {
                format!("DROP TRIGGER IF EXISTS {trigger} ON {table};")
            }
            Statement::CreateTrigger {
                trigger,
                table,
                function,
            } => format!(
                "CREATE TRIGGER {trigger} INSTEAD OF INSERT ON {table} FOR EACH ROW EXECUTE PROCEDURE {function}();"
            ),
            Statement::RenameTable { from, to } => {
                // RENAME TO takes a bare name; the table stays in its schema
                let to = to.rsplit_once('.').map_or(to.as_str(), |(_, name)| name);
                format!("ALTER TABLE IF EXISTS {from} RENAME TO {to};")
            }
            Statement::DropTable { table } => format!("DROP TABLE IF EXISTS {table};"),
            Statement::LedgerInsert {
                ledger,
                base_table,
                discriminator,
                child_table,
                type_tag,
            } => format!(
                "INSERT INTO {ledger} (base_table, discriminator, child_table, type_tag, position) \
                 SELECT {base}, {disc}, {child}, {tag}, COALESCE(MAX(position), 0) + 1 \
                 FROM {ledger} WHERE base_table = {base} AND discriminator = {disc} \
                 ON CONFLICT (base_table, discriminator, child_table) DO NOTHING;",
                base = quote_literal(base_table),
                disc = quote_literal(discriminator),
                child = quote_literal(child_table),
                tag = quote_literal(type_tag),
            ),
            Statement::LedgerDelete {
                ledger,
                base_table,
                discriminator,
                child_table,
            } => format!(
                "DELETE FROM {ledger} WHERE base_table = {} AND discriminator = {} AND child_table = {};",
                quote_literal(base_table),
                quote_literal(discriminator),
                quote_literal(child_table),
            ),
            Statement::LedgerSetCollapsed {
                ledger,
                base_table,
                discriminator,
                collapsed,
            } => format!(
                "UPDATE {ledger} SET collapsed = {} WHERE base_table = {} AND discriminator = {};",
                if *collapsed { "TRUE" } else { "FALSE" },
                quote_literal(base_table),
                quote_literal(discriminator),
            ),
        }
    }

    /// Short label used in logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Statement::CreateLedger { .. } => "create_ledger",
            Statement::CreatePartitionTable { .. } => "create_partition_table",
            Statement::CreateOrReplaceView { .. } => "create_view",
            Statement::DropView { .. } => "drop_view",
            Statement::CreateOrReplaceFunction { .. } => "create_function",
            Statement::DropFunction { .. } => "drop_function",
            Statement::DropTrigger { .. } => "drop_trigger",
            Statement::CreateTrigger { .. } => "create_trigger",
            Statement::RenameTable { .. } => "rename_table",
            Statement::DropTable { .. } => "drop_table",
            Statement::LedgerInsert { .. } => "ledger_insert",
            Statement::LedgerDelete { .. } => "ledger_delete",
            Statement::LedgerSetCollapsed { .. } => "ledger_set_collapsed",
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sql())
    }
}

/// Ordered statements for one operation.
///
/// Order matters inside the caller's transaction: functions are created
/// before the triggers that call them, and views are dropped before a table
/// is renamed into their name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Script {
    statements: Vec<Statement>,
}

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, statement: Statement) {
        self.statements.push(statement);
    }

    pub fn extend(&mut self, statements: impl IntoIterator<Item = Statement>) {
        self.statements.extend(statements);
    }

    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Statement> {
        self.statements.iter()
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// All statements, one per line group
    pub fn to_sql(&self) -> String {
        self.statements
            .iter()
            .map(Statement::to_sql)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl<'a> IntoIterator for &'a Script {
    type Item = &'a Statement;
    type IntoIter = std::slice::Iter<'a, Statement>;

    fn into_iter(self) -> Self::IntoIter {
        self.statements.iter()
    }
}

/// Quote a string literal, doubling embedded single quotes
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drop_statements() {
        let drop_table = Statement::DropTable {
            table: "likes_comments".to_string(),
        };
        assert_eq!(drop_table.to_sql(), "DROP TABLE IF EXISTS likes_comments;");

        let drop_view = Statement::DropView {
            view: "likes".to_string(),
            if_exists: false,
        };
        assert_eq!(drop_view.to_sql(), "DROP VIEW likes;");

        let drop_function = Statement::DropFunction {
            function: "likes_likeable_fun".to_string(),
        };
        assert_eq!(drop_function.to_sql(), "DROP FUNCTION IF EXISTS likes_likeable_fun();");
    }

    #[test]
    fn test_union_view() {
        let view = Statement::CreateOrReplaceView {
            view: "likes".to_string(),
            sources: vec!["likes_comments".to_string(), "likes_posts".to_string()],
        };
        assert_eq!(
            view.to_sql(),
            "CREATE OR REPLACE VIEW likes AS SELECT * FROM likes_comments UNION ALL SELECT * FROM likes_posts;"
        );
    }

    #[test]
    fn test_rename_keeps_schema_out_of_target() {
        let rename = Statement::RenameTable {
            from: "app.likes_posts".to_string(),
            to: "app.likes".to_string(),
        };
        assert_eq!(rename.to_sql(), "ALTER TABLE IF EXISTS app.likes_posts RENAME TO likes;");
    }

    #[test]
    fn test_ledger_insert_appends_after_last_position() {
        let insert = Statement::LedgerInsert {
            ledger: "morphguard_partitions".to_string(),
            base_table: "likes".to_string(),
            discriminator: "likeable".to_string(),
            child_table: "comments".to_string(),
            type_tag: "Comment".to_string(),
        };
        let sql = insert.to_sql();
        assert!(sql.contains("COALESCE(MAX(position), 0) + 1"));
        assert!(sql.contains("'comments', 'Comment'"));
        assert!(sql.ends_with("DO NOTHING;"));
    }

    #[test]
    fn test_quote_literal_escapes_quotes() {
        assert_eq!(quote_literal("O'Brien"), "'O''Brien'");
    }

    #[test]
    fn test_script_serializes_as_tagged_list() {
        let mut script = Script::new();
        script.push(Statement::DropTable {
            table: "likes_comments".to_string(),
        });
        let json = serde_json::to_value(&script).expect("serializable");
        assert_eq!(json[0]["kind"], "drop_table");
        assert_eq!(json[0]["table"], "likes_comments");
    }
}
