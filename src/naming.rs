//! Canonical names for the objects generated for a polymorphic association.
//!
//! For `Association::new("likes", "likeable")` and child table `comments`:
//!
//! | object            | name                             |
//! |-------------------|----------------------------------|
//! | partition table   | `likes_comments`                 |
//! | view              | `likes`                          |
//! | trigger           | `likes_likeable_insert_trigger`  |
//! | trigger function  | `likes_likeable_fun`             |
//! | type tag          | `'Comment'`                      |
//!
//! Type tags come from a [`NamingStrategy`]. They are written as string
//! literals into the routing function, so they must match the discriminator
//! values the application stores; that is a caller contract and is not
//! checked here.

use crate::config::PartitionConfig;
use crate::error::{MorphError, MorphResult};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;

/// PostgreSQL truncates identifiers longer than `NAMEDATALEN - 1` bytes
pub const MAX_IDENTIFIER_LEN: usize = 63;

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"));

/// A polymorphic relation: the logical table readers see and the
/// discriminator stem that expands to `<stem>_id` / `<stem>_type`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Association {
    base_table: String,
    discriminator: String,
    referenced_column: String,
}

impl Association {
    /// Create an association, validating every identifier that ends up in SQL.
    ///
    /// `base_table` may carry one schema qualifier (`app.likes`).
    pub fn new(
        base_table: impl Into<String>,
        discriminator: impl Into<String>,
    ) -> MorphResult<Self> {
        let base_table = base_table.into();
        let discriminator = discriminator.into();
        validate_qualified(&base_table)?;
        validate_identifier(&discriminator)?;

        let association = Self {
            base_table,
            discriminator,
            referenced_column: "id".to_string(),
        };
        // Derived names must survive PostgreSQL's identifier truncation
        validate_identifier(&association.trigger_name())?;
        validate_identifier(unqualified(&association.trigger_function_name()))?;
        validate_identifier(&association.id_column())?;
        validate_identifier(&association.type_column())?;
        Ok(association)
    }

    /// Column on each child table referenced by `<stem>_id` (default `id`).
    pub fn with_referenced_column(mut self, column: impl Into<String>) -> MorphResult<Self> {
        let column = column.into();
        validate_identifier(&column)?;
        self.referenced_column = column;
        Ok(self)
    }

    pub fn base_table(&self) -> &str {
        &self.base_table
    }

    pub fn discriminator(&self) -> &str {
        &self.discriminator
    }

    pub fn referenced_column(&self) -> &str {
        &self.referenced_column
    }

    pub fn id_column(&self) -> String {
        format!("{}_id", self.discriminator)
    }

    pub fn type_column(&self) -> String {
        format!("{}_type", self.discriminator)
    }

    /// `<base>_<child>`, keeping the base table's schema qualifier.
    pub fn partition_table(&self, child_table: &str) -> String {
        qualify(
            schema_of(&self.base_table),
            &format!("{}_{}", unqualified(&self.base_table), unqualified(child_table)),
        )
    }

    /// `<base>_<column>_insert_trigger`; trigger names are never schema-qualified.
    pub fn trigger_name(&self) -> String {
        format!(
            "{}_{}_insert_trigger",
            unqualified(&self.base_table),
            self.discriminator
        )
    }

    /// `<base>_<column>_fun`
    pub fn trigger_function_name(&self) -> String {
        qualify(
            schema_of(&self.base_table),
            &format!("{}_{}_fun", unqualified(&self.base_table), self.discriminator),
        )
    }

    /// The view keeps the logical table name.
    pub fn view_name(&self) -> String {
        self.base_table.clone()
    }
}

/// Strategy mapping a child table name to its discriminator type tag
pub trait NamingStrategy {
    fn type_tag(&self, child_table: &str) -> String;
}

/// English singularization plus PascalCase, the way class names are derived
/// from table names (`comments` → `Comment`, `blog_posts` → `BlogPost`).
///
/// Explicit overrides win over the rules.
#[derive(Debug, Clone, Default)]
pub struct DefaultNaming {
    overrides: BTreeMap<String, String>,
}

impl DefaultNaming {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_override(mut self, child_table: impl Into<String>, tag: impl Into<String>) -> Self {
        self.overrides.insert(child_table.into(), tag.into());
        self
    }

    pub fn from_config(config: &PartitionConfig) -> Self {
        Self {
            overrides: config.type_tags.clone(),
        }
    }
}

impl NamingStrategy for DefaultNaming {
    fn type_tag(&self, child_table: &str) -> String {
        if let Some(tag) = self
            .overrides
            .get(child_table)
            .or_else(|| self.overrides.get(unqualified(child_table)))
        {
            return tag.clone();
        }
        pascal_case(&singularize(unqualified(child_table)))
    }
}

static IRREGULAR: &[(&str, &str)] = &[
    ("people", "person"),
    ("men", "man"),
    ("women", "woman"),
    ("children", "child"),
    ("mice", "mouse"),
    ("geese", "goose"),
    ("teeth", "tooth"),
    ("feet", "foot"),
    ("oxen", "ox"),
    ("moves", "move"),
    ("zombies", "zombie"),
];

static UNCOUNTABLE: &[&str] = &[
    "equipment",
    "information",
    "rice",
    "money",
    "species",
    "series",
    "fish",
    "sheep",
    "jeans",
    "police",
    "news",
];

// Checked in order; first match wins
static RULES: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r"(matr)ices$", "${1}ix"),
        (r"(vert|ind)ices$", "${1}ex"),
        (r"(alias|status)(es)?$", "${1}"),
        (r"(octop|vir)(us|i)$", "${1}us"),
        (r"(cris|test)(is|es)$", "${1}is"),
        (r"(shoe)s$", "${1}"),
        (r"(o)es$", "${1}"),
        (r"(bus)(es)?$", "${1}"),
        (r"(x|ch|ss|sh)es$", "${1}"),
        (r"(m)ovies$", "${1}ovie"),
        (r"([^aeiouy]|qu)ies$", "${1}y"),
        (r"(hive|tive)s$", "${1}"),
        (r"([lr])ves$", "${1}f"),
        (r"([^f])ves$", "${1}fe"),
        (r"([ti])a$", "${1}um"),
        (r"(ss)$", "${1}"),
        (r"(us)$", "${1}"),
        (r"s$", ""),
    ]
    .into_iter()
    .map(|(pattern, replacement)| {
        (
            Regex::new(pattern).expect("valid singularization rule"),
            replacement,
        )
    })
    .collect()
});

/// Singularize the last `_`-separated word of a table name.
pub fn singularize(table: &str) -> String {
    let (head, last) = match table.rfind('_') {
        Some(idx) => table.split_at(idx + 1),
        None => ("", table),
    };
    let lower = last.to_lowercase();

    if UNCOUNTABLE.contains(&lower.as_str()) {
        return table.to_string();
    }
    if let Some((_, singular)) = IRREGULAR.iter().find(|(plural, _)| *plural == lower) {
        return format!("{head}{singular}");
    }
    for (rule, replacement) in RULES.iter() {
        if rule.is_match(last) {
            return format!("{head}{}", rule.replace(last, *replacement));
        }
    }
    table.to_string()
}

/// Convert snake_case to PascalCase
pub fn pascal_case(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut capitalize = true;
    for c in s.chars() {
        if c == '_' {
            capitalize = true;
        } else if capitalize {
            result.extend(c.to_uppercase());
            capitalize = false;
        } else {
            result.push(c);
        }
    }
    result
}

/// Validate a bare SQL identifier.
pub fn validate_identifier(identifier: &str) -> MorphResult<()> {
    if identifier.len() > MAX_IDENTIFIER_LEN {
        return Err(MorphError::InvalidIdentifier {
            identifier: identifier.to_string(),
            reason: format!("longer than {MAX_IDENTIFIER_LEN} bytes"),
        });
    }
    if !IDENTIFIER.is_match(identifier) {
        return Err(MorphError::InvalidIdentifier {
            identifier: identifier.to_string(),
            reason: "expected [A-Za-z_][A-Za-z0-9_]*".to_string(),
        });
    }
    Ok(())
}

/// Validate `table` or `schema.table`.
pub fn validate_qualified(name: &str) -> MorphResult<()> {
    let mut parts = name.split('.');
    let first = parts.next().unwrap_or_default();
    match (parts.next(), parts.next()) {
        (None, _) => validate_identifier(first),
        (Some(table), None) => {
            validate_identifier(first)?;
            validate_identifier(table)
        }
        (Some(_), Some(_)) => Err(MorphError::InvalidIdentifier {
            identifier: name.to_string(),
            reason: "at most one schema qualifier is allowed".to_string(),
        }),
    }
}

/// Relation name without its schema qualifier.
pub fn unqualified(name: &str) -> &str {
    name.rsplit_once('.').map_or(name, |(_, table)| table)
}

fn schema_of(name: &str) -> Option<&str> {
    name.rsplit_once('.').map(|(schema, _)| schema)
}

fn qualify(schema: Option<&str>, name: &str) -> String {
    match schema {
        Some(schema) => format!("{schema}.{name}"),
        None => name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn likes() -> Association {
        Association::new("likes", "likeable").expect("valid association")
    }

    #[test]
    fn test_derived_names() {
        let assoc = likes();
        assert_eq!(assoc.partition_table("comments"), "likes_comments");
        assert_eq!(assoc.trigger_name(), "likes_likeable_insert_trigger");
        assert_eq!(assoc.trigger_function_name(), "likes_likeable_fun");
        assert_eq!(assoc.view_name(), "likes");
        assert_eq!(assoc.id_column(), "likeable_id");
        assert_eq!(assoc.type_column(), "likeable_type");
        assert_eq!(assoc.referenced_column(), "id");
    }

    #[test]
    fn test_schema_qualified_names() {
        let assoc = Association::new("app.likes", "likeable").expect("valid association");
        assert_eq!(assoc.partition_table("blog.comments"), "app.likes_comments");
        assert_eq!(assoc.trigger_name(), "likes_likeable_insert_trigger");
        assert_eq!(assoc.trigger_function_name(), "app.likes_likeable_fun");
        assert_eq!(assoc.view_name(), "app.likes");
    }

    #[test]
    fn test_invalid_identifiers_are_rejected() {
        assert!(Association::new("likes; DROP TABLE users", "likeable").is_err());
        assert!(Association::new("likes", "like-able").is_err());
        assert!(Association::new("a.b.c", "likeable").is_err());
        assert!(Association::new("", "likeable").is_err());
        assert!(likes().with_referenced_column("uuid").is_ok());
        assert!(likes().with_referenced_column("1id").is_err());
    }

    #[test]
    fn test_overlong_derived_names_are_rejected() {
        let base = "a".repeat(40);
        let err = Association::new(base, "discriminator_stem").unwrap_err();
        assert!(matches!(err, MorphError::InvalidIdentifier { .. }));
    }

    #[test]
    fn test_type_tags() {
        let naming = DefaultNaming::new();
        assert_eq!(naming.type_tag("comments"), "Comment");
        assert_eq!(naming.type_tag("posts"), "Post");
        assert_eq!(naming.type_tag("blog_posts"), "BlogPost");
        assert_eq!(naming.type_tag("categories"), "Category");
        assert_eq!(naming.type_tag("addresses"), "Address");
        assert_eq!(naming.type_tag("boxes"), "Box");
        assert_eq!(naming.type_tag("people"), "Person");
        assert_eq!(naming.type_tag("statuses"), "Status");
        assert_eq!(naming.type_tag("public.comments"), "Comment");
    }

    #[test]
    fn test_singularize_rules() {
        assert_eq!(singularize("wolves"), "wolf");
        assert_eq!(singularize("knives"), "knife");
        assert_eq!(singularize("archives"), "archive");
        assert_eq!(singularize("heroes"), "hero");
        assert_eq!(singularize("shoes"), "shoe");
        assert_eq!(singularize("movies"), "movie");
        assert_eq!(singularize("indices"), "index");
        assert_eq!(singularize("media"), "medium");
        assert_eq!(singularize("news"), "news");
        assert_eq!(singularize("user_news"), "user_news");
        assert_eq!(singularize("class"), "class");
        assert_eq!(singularize("comment"), "comment");
    }

    #[test]
    fn test_overrides_win() {
        let naming = DefaultNaming::new().with_override("people", "Human");
        assert_eq!(naming.type_tag("people"), "Human");
        assert_eq!(naming.type_tag("comments"), "Comment");
    }

    #[test]
    fn test_from_config_overrides() {
        let mut config = PartitionConfig::default();
        config.type_tags.insert("octopi".to_string(), "Octopus".to_string());
        let naming = DefaultNaming::from_config(&config);
        assert_eq!(naming.type_tag("octopi"), "Octopus");
    }

    #[test]
    fn test_pascal_case() {
        assert_eq!(pascal_case("blog_post"), "BlogPost");
        assert_eq!(pascal_case("comment"), "Comment");
        assert_eq!(pascal_case("_user_id"), "UserId");
    }
}
