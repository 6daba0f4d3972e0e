//! Partition ledger: explicit, persisted partition set membership.
//!
//! One row per registered child, ordered by `position`. Rows of a collapsed
//! association carry `collapsed = true` so the renamed base table can be told
//! apart from an unrelated table of the same name.

use crate::catalog::{parse_trigger_source, Catalog, LedgerEntry};
use crate::config::PartitionSource;
use crate::error::MorphResult;
use crate::naming::Association;
use crate::partition::{Partition, PartitionSet};
use crate::sql::Statement;

/// Partition set as read from the catalog
#[derive(Debug, Clone, Default)]
pub(crate) struct LivePartitions {
    pub partitions: PartitionSet,
    pub collapsed: bool,
    /// Read from the trigger function; the ledger has no rows yet
    pub adopted: bool,
    pub trigger_function: Option<String>,
}

pub(crate) fn read(
    catalog: &dyn Catalog,
    association: &Association,
    source: PartitionSource,
) -> MorphResult<LivePartitions> {
    let function_name = association.trigger_function_name();
    let trigger_source = catalog.trigger_source(&function_name)?;
    let trigger_function = trigger_source.as_ref().map(|_| function_name.clone());

    if source == PartitionSource::Ledger {
        let entries = catalog.ledger_entries(association)?;
        if !entries.is_empty() {
            return Ok(LivePartitions {
                collapsed: entries.iter().any(|entry| entry.collapsed),
                partitions: from_entries(association, &entries)?,
                adopted: false,
                trigger_function,
            });
        }
    }

    let partitions = match &trigger_source {
        Some(body) => parse_trigger_source(association, body)?,
        None => PartitionSet::new(),
    };
    let adopted = source == PartitionSource::Ledger && !partitions.is_empty();
    if adopted {
        log::warn!(
            "adopting {} partition(s) of {} from {}()",
            partitions.len(),
            association.base_table(),
            function_name
        );
    }

    Ok(LivePartitions {
        partitions,
        collapsed: false,
        adopted,
        trigger_function,
    })
}

fn from_entries(association: &Association, entries: &[LedgerEntry]) -> MorphResult<PartitionSet> {
    let mut partitions = PartitionSet::new();
    for entry in entries {
        partitions.push(Partition::with_type_tag(
            association,
            entry.child_table.as_str(),
            entry.type_tag.as_str(),
        )?)?;
    }
    Ok(partitions)
}

pub fn create(ledger: &str) -> Statement {
    Statement::CreateLedger {
        ledger: ledger.to_string(),
    }
}

pub fn insert(ledger: &str, partition: &Partition) -> Statement {
    Statement::LedgerInsert {
        ledger: ledger.to_string(),
        base_table: partition.association().base_table().to_string(),
        discriminator: partition.association().discriminator().to_string(),
        child_table: partition.child_table().to_string(),
        type_tag: partition.type_tag().to_string(),
    }
}

pub fn delete(ledger: &str, partition: &Partition) -> Statement {
    Statement::LedgerDelete {
        ledger: ledger.to_string(),
        base_table: partition.association().base_table().to_string(),
        discriminator: partition.association().discriminator().to_string(),
        child_table: partition.child_table().to_string(),
    }
}

pub fn set_collapsed(ledger: &str, association: &Association, collapsed: bool) -> Statement {
    Statement::LedgerSetCollapsed {
        ledger: ledger.to_string(),
        base_table: association.base_table().to_string(),
        discriminator: association.discriminator().to_string(),
        collapsed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::naming::DefaultNaming;
    use crate::sql::trigger::render_function_body;
    use crate::test_helpers::InMemoryCatalog;

    fn likes() -> Association {
        Association::new("likes", "likeable").unwrap()
    }

    fn partition(child: &str) -> Partition {
        Partition::new(&likes(), child, &DefaultNaming::new()).unwrap()
    }

    #[test]
    fn test_empty_catalog_reads_empty() {
        let catalog = InMemoryCatalog::new();
        let live = read(&catalog, &likes(), PartitionSource::Ledger).unwrap();
        assert!(live.partitions.is_empty());
        assert!(!live.adopted);
        assert!(live.trigger_function.is_none());
    }

    #[test]
    fn test_ledger_rows_win_over_trigger_source() {
        let catalog = InMemoryCatalog::new();
        catalog.apply(&create("morphguard_partitions")).unwrap();
        catalog.apply(&insert("morphguard_partitions", &partition("posts"))).unwrap();
        catalog.install_function(
            "likes_likeable_fun",
            &render_function_body(&likes(), &PartitionSet::new()),
        );

        let live = read(&catalog, &likes(), PartitionSource::Ledger).unwrap();
        assert_eq!(live.partitions.child_tables(), vec!["posts"]);
        assert!(!live.adopted);
        assert_eq!(live.trigger_function.as_deref(), Some("likes_likeable_fun"));
    }

    #[test]
    fn test_adopts_from_trigger_source_when_ledger_is_empty() {
        let catalog = InMemoryCatalog::new();
        let set = PartitionSet::new()
            .with(partition("comments"))
            .and_then(|s| s.with(partition("posts")))
            .unwrap();
        catalog.install_function("likes_likeable_fun", &render_function_body(&likes(), &set));

        let live = read(&catalog, &likes(), PartitionSource::Ledger).unwrap();
        assert_eq!(live.partitions, set);
        assert!(live.adopted);

        let live = read(&catalog, &likes(), PartitionSource::TriggerSource).unwrap();
        assert_eq!(live.partitions, set);
        assert!(!live.adopted);
    }

    #[test]
    fn test_collapsed_flag() {
        let catalog = InMemoryCatalog::new();
        catalog.apply(&create("morphguard_partitions")).unwrap();
        catalog.apply(&insert("morphguard_partitions", &partition("posts"))).unwrap();
        catalog
            .apply(&set_collapsed("morphguard_partitions", &likes(), true))
            .unwrap();

        let live = read(&catalog, &likes(), PartitionSource::Ledger).unwrap();
        assert!(live.collapsed);
    }
}
