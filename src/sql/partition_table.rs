//! `CREATE TABLE` for partition tables.
//!
//! Every partition carries a `CHECK` pinning its type tag and a foreign key
//! from `<column>_id` to the child table, so the polymorphic reference gets
//! real referential integrity per type.

use super::statement::{quote_literal, Statement};
use crate::naming::unqualified;
use crate::partition::{Partition, PartitionLayout};
use sea_query::{Expr, ExprTrait, ForeignKey, PostgresQueryBuilder, Table, TableCreateStatement};

/// Build the statement creating `partition` with the given layout.
pub fn create_partition_table(partition: &Partition, layout: &PartitionLayout) -> Statement {
    let sql = match layout {
        PartitionLayout::Columns(columns) => columns_sql(partition, columns),
        PartitionLayout::Like(template) => like_sql(partition, template),
    };
    Statement::CreatePartitionTable {
        table: partition.table_name(),
        sql,
    }
}

fn columns_sql(partition: &Partition, columns: &[sea_query::ColumnDef]) -> String {
    let association = partition.association();
    let table = partition.table_name();

    let mut stmt = Table::create();
    set_table(&mut stmt, &table);
    stmt.if_not_exists();
    for column in columns {
        stmt.col(column.clone());
    }
    stmt.check(Expr::col(association.type_column()).eq(partition.type_tag().to_string()));

    let mut foreign_key = ForeignKey::create();
    foreign_key
        .from_tbl(unqualified(&table).to_string())
        .from_col(association.id_column())
        .to_tbl(unqualified(partition.child_table()).to_string())
        .to_col(association.referenced_column().to_string());
    stmt.foreign_key(&mut foreign_key);

    let mut sql = stmt.build(PostgresQueryBuilder);
    if let Some((schema, child)) = partition.child_table().rsplit_once('.') {
        // Foreign key targets are emitted unqualified; point them at the child's schema
        sql = sql.replace(
            &format!("REFERENCES \"{child}\""),
            &format!("REFERENCES \"{schema}\".\"{child}\""),
        );
    }
    sql.push(';');
    sql
}

fn set_table(stmt: &mut TableCreateStatement, table: &str) {
    match table.rsplit_once('.') {
        Some((schema, name)) => {
            stmt.table((schema.to_string(), name.to_string()));
        }
        None => {
            stmt.table(table.to_string());
        }
    }
}

fn like_sql(partition: &Partition, template: &str) -> String {
    let association = partition.association();
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (\
         LIKE {template} INCLUDING DEFAULTS INCLUDING INDEXES, \
         CHECK ({type_column} = {tag}), \
         FOREIGN KEY ({id_column}) REFERENCES {child} ({referenced}));",
        table = partition.table_name(),
        type_column = association.type_column(),
        tag = quote_literal(partition.type_tag()),
        id_column = association.id_column(),
        child = partition.child_table(),
        referenced = association.referenced_column(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::naming::{Association, DefaultNaming};
    use sea_query::ColumnDef;

    fn comments() -> Partition {
        let assoc = Association::new("likes", "likeable").expect("valid association");
        Partition::new(&assoc, "comments", &DefaultNaming::new()).expect("valid partition")
    }

    #[test]
    fn test_like_layout() {
        let layout = PartitionLayout::Like("likes_posts".to_string());
        let stmt = create_partition_table(&comments(), &layout);
        assert_eq!(
            stmt.to_sql(),
            "CREATE TABLE IF NOT EXISTS likes_comments (LIKE likes_posts INCLUDING DEFAULTS INCLUDING INDEXES, \
             CHECK (likeable_type = 'Comment'), FOREIGN KEY (likeable_id) REFERENCES comments (id));"
        );
        assert!(matches!(
            stmt,
            Statement::CreatePartitionTable { ref table, .. } if table == "likes_comments"
        ));
    }

    #[test]
    fn test_columns_layout() {
        let columns = vec![
            ColumnDef::new("id").integer().not_null().primary_key().to_owned(),
            ColumnDef::new("likeable_id").integer().not_null().to_owned(),
            ColumnDef::new("likeable_type").string().not_null().to_owned(),
        ];
        let sql = create_partition_table(&comments(), &PartitionLayout::Columns(columns)).to_sql();

        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS \"likes_comments\""), "{sql}");
        assert!(sql.contains("\"likeable_type\""), "{sql}");
        assert!(sql.contains("CHECK"), "{sql}");
        assert!(sql.contains("'Comment'"), "{sql}");
        assert!(sql.contains("FOREIGN KEY (\"likeable_id\")"), "{sql}");
        assert!(sql.contains("REFERENCES \"comments\""), "{sql}");
        assert!(sql.ends_with(';'));
    }
}
