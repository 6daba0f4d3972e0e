//! Reading a partition set back out of an existing routing function.
//!
//! Used to adopt associations that were partitioned before the ledger
//! existed, and as the only source when the engine is configured with
//! `PartitionSource::TriggerSource`.

use crate::error::{MorphError, MorphResult};
use crate::naming::{unqualified, Association};
use crate::partition::{Partition, PartitionSet};
use once_cell::sync::Lazy;
use regex::Regex;

static BRANCH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?is)\b(?:ELS)?IF\s*\(\s*NEW\.([A-Za-z_][A-Za-z0-9_]*)\s*=\s*'((?:[^']|'')*)'\s*\)\s*THEN\s*INSERT\s+INTO\s+([A-Za-z0-9_.]+)\s+VALUES\s*\(\s*NEW\.\*\s*\)\s*;",
    )
    .expect("valid branch regex")
});

static INSERT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bINSERT\s+INTO\b").expect("valid insert regex"));

/// Parse the IF/ELSIF branches of `source` into a partition set, in branch
/// order.
///
/// A body without branches (every partition removed) parses as an empty set.
///
/// # Errors
///
/// `MalformedTriggerSource` when a branch tests another column, inserts into
/// a table that is not `<base>_<child>`, routes the same child twice, or an
/// `INSERT INTO` is not part of a recognizable branch.
pub fn parse_trigger_source(association: &Association, source: &str) -> MorphResult<PartitionSet> {
    let function_name = association.trigger_function_name();
    let malformed = |reason: String| MorphError::MalformedTriggerSource {
        function_name: function_name.clone(),
        reason,
    };

    let type_column = association.type_column();
    let prefix = format!("{}_", unqualified(association.base_table()));
    let mut partitions = PartitionSet::new();
    let mut branches = 0;

    for caps in BRANCH.captures_iter(source) {
        branches += 1;
        let column = &caps[1];
        let tag = caps[2].replace("''", "'");
        let table = &caps[3];

        if !column.eq_ignore_ascii_case(&type_column) {
            return Err(malformed(format!(
                "branch tests NEW.{} instead of NEW.{}",
                column, type_column
            )));
        }
        let child = unqualified(table)
            .strip_prefix(&prefix)
            .filter(|child| !child.is_empty())
            .ok_or_else(|| malformed(format!("'{}' is not named {}<child>", table, prefix)))?;

        let partition = Partition::with_type_tag(association, child, tag)?;
        partitions
            .push(partition)
            .map_err(|_| malformed(format!("'{}' is routed more than once", child)))?;
    }

    let inserts = INSERT.find_iter(source).count();
    if inserts != branches {
        return Err(malformed(format!(
            "{} INSERT statements but only {} recognizable branches",
            inserts, branches
        )));
    }

    Ok(partitions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::naming::DefaultNaming;
    use crate::sql::trigger::render_function_body;

    fn likes() -> Association {
        Association::new("likes", "likeable").unwrap()
    }

    fn set(children: &[&str]) -> PartitionSet {
        let naming = DefaultNaming::new();
        let mut set = PartitionSet::new();
        for child in children {
            set.push(Partition::new(&likes(), *child, &naming).unwrap()).unwrap();
        }
        set
    }

    #[test]
    fn test_parses_rendered_body_in_order() {
        let rendered = set(&["posts", "comments", "blog_posts"]);
        let body = render_function_body(&likes(), &rendered);

        let parsed = parse_trigger_source(&likes(), &body).unwrap();
        assert_eq!(parsed, rendered);
        assert_eq!(parsed.child_tables(), vec!["posts", "comments", "blog_posts"]);
    }

    #[test]
    fn test_body_without_branches_is_empty() {
        let body = render_function_body(&likes(), &PartitionSet::new());
        assert!(parse_trigger_source(&likes(), &body).unwrap().is_empty());
    }

    #[test]
    fn test_handwritten_body_with_custom_tag() {
        let source = "
            BEGIN
              if (NEW.likeable_type = 'Admin''s') then
                INSERT INTO likes_admins VALUES (NEW.*);
              ELSE
                RAISE EXCEPTION 'nope';
              END IF;
              RETURN NEW;
            END;";
        let parsed = parse_trigger_source(&likes(), source).unwrap();
        let admins = parsed.get("admins").unwrap();
        assert_eq!(admins.type_tag(), "Admin's");
        assert_eq!(admins.table_name(), "likes_admins");
    }

    #[test]
    fn test_foreign_table_prefix_is_malformed() {
        let source = "IF (NEW.likeable_type = 'Post') THEN INSERT INTO audit_posts VALUES (NEW.*);";
        let err = parse_trigger_source(&likes(), source).unwrap_err();
        assert!(matches!(err, MorphError::MalformedTriggerSource { .. }));
    }

    #[test]
    fn test_other_column_is_malformed() {
        let source = "IF (NEW.kind = 'Post') THEN INSERT INTO likes_posts VALUES (NEW.*);";
        assert!(matches!(
            parse_trigger_source(&likes(), source),
            Err(MorphError::MalformedTriggerSource { .. })
        ));
    }

    #[test]
    fn test_unrecognized_insert_is_malformed() {
        let source = "BEGIN INSERT INTO likes_posts SELECT NEW.*; RETURN NEW; END;";
        let err = parse_trigger_source(&likes(), source).unwrap_err();
        assert!(err.to_string().contains("likes_likeable_fun"));
    }
}
