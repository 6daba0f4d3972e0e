//! # morphguard
//!
//! Polymorphic-association partitioning for PostgreSQL.
//!
//! A polymorphic table such as `likes (likeable_id, likeable_type, ...)` is
//! split into one table per referenced type (`likes_comments`, `likes_posts`),
//! each with a real foreign key. A view keeps the name `likes` for readers and
//! an `INSTEAD OF INSERT` trigger routes writes by `likeable_type`. When only
//! one partition is left the proxy can be collapsed: the sole partition is
//! renamed back to `likes`.
//!
//! [`MorphManager`] plans every change as a [`Script`] of [`Statement`]s and
//! applies it through a [`Catalog`]; [`PgCatalog`] runs them over
//! `may_postgres`.

pub mod catalog;
pub mod config;
pub mod connection;
pub mod error;
pub mod executor;
#[cfg(any(feature = "metrics", feature = "tracing"))]
pub mod metrics;
pub mod naming;
pub mod partition;
pub mod sql;
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;
pub mod topology;
pub mod transaction;

pub use catalog::{Catalog, LedgerEntry, PgCatalog, RelationKind, DEFAULT_LEDGER_TABLE};
pub use config::{MorphConfig, PartitionSource};
pub use connection::{connect, connect_with_config, ConnectionError};
pub use error::{MorphError, MorphResult};
pub use executor::{MayPostgresExecutor, MorphExecutor, StoreError};
pub use naming::{Association, DefaultNaming, NamingStrategy};
pub use partition::{Partition, PartitionLayout, PartitionSet};
pub use sql::{Script, Statement};
pub use topology::{BaseRelation, MorphManager, Topology, TopologySnapshot};
pub use transaction::Transaction;
