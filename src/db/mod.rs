//! Database module: the dialect adapter and its backends.
//!
//! Layout:
//! - `adapter.rs`: `DbAdapter`, the query interface shared by both backends
//! - `sqlite.rs` / `postgres.rs`: pool setup, parameter binding, row decoding
//! - `params.rs`: bound values and the `params!` list
//! - `models.rs`: result shapes (`Row`, `RunResult`)
//! - `schema.rs`: SQL DDL for the application tables (SQLite dialect)

pub mod adapter;
pub mod models;
pub mod params;
pub mod postgres;
pub mod schema;
pub mod sqlite;

pub use adapter::DbAdapter;
pub use models::{Row, RunResult};
pub use params::{Param, Params};
pub use postgres::PgPool;
pub use schema::{COLUMN_ADDITIONS, FLEET_SCHEMA};
pub use sqlite::SqlitePool;
