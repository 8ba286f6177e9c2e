//! Rule storage internals
//!
//! Leaf to root: [`record`] and [`filter`] define the data, [`predicate`]
//! turns them into conditions, `sql` and `schema` talk to SQLite, and
//! [`store`] ties everything into the [`adapter::Adapter`] surface.

pub mod adapter;
pub mod config;
pub mod error;
pub mod filter;
pub mod predicate;
pub mod record;
pub mod ruleset;
pub(crate) mod schema;
pub(crate) mod sql;
pub mod store;
pub mod validation;
