//! Routing trigger synthesis.
//!
//! The trigger function routes each inserted row to its partition with one
//! IF/ELSIF branch per partition, in partition-set order. Rows whose type tag
//! has no branch hit an `ELSE RAISE EXCEPTION` so they fail loudly instead of
//! disappearing.

use super::statement::{quote_literal, Statement};
use crate::error::MorphResult;
use crate::naming::Association;
use crate::partition::{Partition, PartitionSet};

/// The IF/ELSIF chain for `partitions`, without the closing `ELSE`/`END IF`.
pub fn render_branches(association: &Association, partitions: &PartitionSet) -> String {
    let type_column = association.type_column();
    let mut out = String::new();
    for (i, partition) in partitions.iter().enumerate() {
        let keyword = if i == 0 { "IF" } else { "ELSIF" };
        out.push_str(&format!(
            "{keyword} (NEW.{type_column} = {}) THEN\n  INSERT INTO {} VALUES (NEW.*);\n",
            quote_literal(partition.type_tag()),
            partition.table_name(),
        ));
    }
    out
}

/// Branches for the live set plus `partition`.
///
/// # Errors
///
/// `DuplicatePartition` if the child already has a branch.
pub fn append_branch(
    association: &Association,
    live: &PartitionSet,
    partition: Partition,
) -> MorphResult<String> {
    let next = live.with(partition)?;
    Ok(render_branches(association, &next))
}

/// Function body (`BEGIN ... END;`) with the raise-on-unknown fallback.
pub fn render_function_body(association: &Association, partitions: &PartitionSet) -> String {
    let fallback = format!(
        "RAISE EXCEPTION 'Wrong \"{column}\"=\"%\" used. Create proper partition table and update {function} function', NEW.{column};",
        column = association.type_column(),
        function = association.trigger_function_name(),
    );

    if partitions.is_empty() {
        return format!("BEGIN\n{fallback}\nRETURN NEW;\nEND;");
    }

    format!(
        "BEGIN\n{}ELSE\n  {fallback}\nEND IF;\nRETURN NEW;\nEND;",
        render_branches(association, partitions)
    )
}

pub fn create_function(association: &Association, partitions: &PartitionSet) -> Statement {
    Statement::CreateOrReplaceFunction {
        function: association.trigger_function_name(),
        body: render_function_body(association, partitions),
    }
}

/// `CREATE OR REPLACE FUNCTION ...` as SQL text
pub fn render_function(association: &Association, partitions: &PartitionSet) -> String {
    create_function(association, partitions).to_sql()
}

/// Drop-then-create pair for the `INSTEAD OF INSERT` trigger on the view
pub fn trigger_statements(association: &Association) -> [Statement; 2] {
    [
        Statement::DropTrigger {
            trigger: association.trigger_name(),
            table: association.view_name(),
        },
        Statement::CreateTrigger {
            trigger: association.trigger_name(),
            table: association.view_name(),
            function: association.trigger_function_name(),
        },
    ]
}

/// `DROP TRIGGER IF EXISTS ...; CREATE TRIGGER ...;`
pub fn create_before_insert_trigger_sql(association: &Association) -> String {
    trigger_statements(association)
        .iter()
        .map(Statement::to_sql)
        .collect::<Vec<_>>()
        .join(" ")
}
