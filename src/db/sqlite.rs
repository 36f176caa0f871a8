use crate::db::models::Row;
use crate::db::params::{Param, Params};
use crate::error::FleetDbError;
use base64::{Engine, engine::general_purpose::STANDARD};
use serde_json::Value;
use sqlx::query::Query;
use sqlx::sqlite::{
    SqliteArguments, SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow,
    SqliteSynchronous,
};
use sqlx::{Column, Pool, Row as _, Sqlite, TypeInfo, ValueRef};
use std::{fs, path::Path};
use tracing::info;

pub type SqlitePool = Pool<Sqlite>;

/// Open (creating if needed) the SQLite file in WAL mode.
///
/// The pool holds a single connection. Each SQLite connection caches the
/// schema, so DDL issued on one connection would not be seen by its siblings
/// and later statements would be prepared against stale table definitions.
pub async fn connect(path: &Path) -> Result<SqlitePool, FleetDbError> {
    if let Some(dir) = path.parent()
        && !dir.as_os_str().is_empty()
        && !dir.exists()
    {
        fs::create_dir_all(dir)?;
        info!(path = %dir.display(), "created database directory");
    }

    // Foreign keys stay off, as with the stock sqlite3 driver the schema was written for.
    let connect_opts = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(false);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(connect_opts)
        .await?;
    Ok(pool)
}

pub(crate) fn bind<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    params: &Params,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for param in params {
        query = match param {
            Param::Null => query.bind(None::<String>),
            Param::Bool(v) => query.bind(*v),
            Param::Int(v) => query.bind(*v),
            Param::Float(v) => query.bind(*v),
            Param::Text(v) => query.bind(v.clone()),
            Param::Bytes(v) => query.bind(v.clone()),
            Param::Date(v) => query.bind(*v),
            Param::Timestamp(v) => query.bind(*v),
        };
    }
    query
}

/// Decode by storage class of each value, not by declared column type,
/// since SQLite columns may hold any class.
pub(crate) fn row_to_json(row: &SqliteRow) -> Result<Row, FleetDbError> {
    let mut out = Row::new();
    for column in row.columns() {
        let idx = column.ordinal();
        let raw = row.try_get_raw(idx)?;
        let value = if raw.is_null() {
            Value::Null
        } else {
            match raw.type_info().name() {
                "INTEGER" | "BOOLEAN" => Value::from(row.try_get_unchecked::<i64, _>(idx)?),
                "REAL" | "NUMERIC" => Value::from(row.try_get_unchecked::<f64, _>(idx)?),
                "BLOB" => Value::String(STANDARD.encode(row.try_get_unchecked::<Vec<u8>, _>(idx)?)),
                _ => Value::String(row.try_get_unchecked::<String, _>(idx)?),
            }
        };
        out.insert(column.name().to_string(), value);
    }
    Ok(out)
}
