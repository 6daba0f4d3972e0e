//! SQL synthesis for partitioned polymorphic associations.
//!
//! - [`statement`]: the structured [`Statement`]s a plan is made of
//! - [`trigger`]: routing function and trigger rendering
//! - [`partition_table`]: `CREATE TABLE` for a new partition

pub mod partition_table;
pub mod statement;
pub mod trigger;

pub use statement::{quote_literal, Script, Statement};
