use crate::config::{Config, DatabaseTarget};
use crate::db::models::{Row, RunResult};
use crate::db::params::Params;
use crate::db::postgres::{self, PgPool};
use crate::db::sqlite::{self, SqlitePool};
use crate::dialect::{self, Backend};
use crate::error::FleetDbError;
use std::borrow::Cow;
use tracing::{debug, error, info};

#[derive(Clone)]
enum BackendPool {
    Sqlite(SqlitePool),
    Postgres(PgPool),
}

/// One query interface over either backend.
///
/// Raw operations (`run`, `get`, `all`, `query`) execute the SQL as given.
/// The `*_converted` operations first translate SQLite-flavoured SQL for the
/// active backend. Clones share the same pool.
#[derive(Clone)]
pub struct DbAdapter {
    pool: BackendPool,
}

impl DbAdapter {
    /// Connect to the backend selected by `cfg`.
    ///
    /// PostgreSQL pools connect lazily; the startup ping result is logged
    /// but does not fail construction.
    pub async fn connect(cfg: &Config) -> Result<Self, FleetDbError> {
        match cfg.target() {
            DatabaseTarget::Postgres { url } => {
                info!(backend = %Backend::Postgres, "using PostgreSQL");
                let adapter = Self::from_pg_pool(postgres::connect_lazy(&url, cfg.pool_size)?);
                match adapter.ping().await {
                    Ok(()) => info!("connected to PostgreSQL"),
                    Err(e) => error!(error = %e, "failed to connect to PostgreSQL"),
                }
                Ok(adapter)
            }
            DatabaseTarget::Sqlite { path } => {
                info!(backend = %Backend::Sqlite, path = %path.display(), "using SQLite");
                let pool = sqlite::connect(&path).await?;
                info!("connected to SQLite");
                Ok(Self::from_sqlite_pool(pool))
            }
        }
    }

    pub fn from_sqlite_pool(pool: SqlitePool) -> Self {
        Self {
            pool: BackendPool::Sqlite(pool),
        }
    }

    pub fn from_pg_pool(pool: PgPool) -> Self {
        Self {
            pool: BackendPool::Postgres(pool),
        }
    }

    pub fn backend(&self) -> Backend {
        match self.pool {
            BackendPool::Sqlite(_) => Backend::Sqlite,
            BackendPool::Postgres(_) => Backend::Postgres,
        }
    }

    pub fn convert_sql<'a>(&self, sql: &'a str) -> Cow<'a, str> {
        self.backend().convert(sql)
    }

    /// Execute a mutating statement.
    ///
    /// On PostgreSQL a plain `INSERT INTO` gets `RETURNING id` appended so the
    /// new id can be reported as `last_id`.
    pub async fn run(
        &self,
        sql: &str,
        params: impl Into<Params>,
    ) -> Result<RunResult, FleetDbError> {
        let params = params.into();
        match &self.pool {
            BackendPool::Sqlite(pool) => {
                self.log_statement("run", sql, &params);
                let done = sqlite::bind(sqlx::query(sql), &params)
                    .execute(pool)
                    .await?;
                let changes = done.rows_affected();
                let last_id =
                    (dialect::is_insert(sql) && changes > 0).then(|| done.last_insert_rowid());
                Ok(RunResult { last_id, changes })
            }
            BackendPool::Postgres(pool) => {
                let sql = dialect::with_returning_id(sql);
                self.log_statement("run", &sql, &params);
                if dialect::is_insert_into(&sql) {
                    let rows = postgres::bind(sqlx::query(&sql), &params)
                        .fetch_all(pool)
                        .await?;
                    Ok(RunResult {
                        last_id: rows.first().and_then(postgres::returned_id),
                        changes: rows.len() as u64,
                    })
                } else {
                    let done = postgres::bind(sqlx::query(&sql), &params)
                        .execute(pool)
                        .await?;
                    Ok(RunResult {
                        last_id: None,
                        changes: done.rows_affected(),
                    })
                }
            }
        }
    }

    /// First row of the result, if any.
    pub async fn get(
        &self,
        sql: &str,
        params: impl Into<Params>,
    ) -> Result<Option<Row>, FleetDbError> {
        let params = params.into();
        self.log_statement("get", sql, &params);
        match &self.pool {
            BackendPool::Sqlite(pool) => sqlite::bind(sqlx::query(sql), &params)
                .fetch_optional(pool)
                .await?
                .as_ref()
                .map(sqlite::row_to_json)
                .transpose(),
            BackendPool::Postgres(pool) => postgres::bind(sqlx::query(sql), &params)
                .fetch_optional(pool)
                .await?
                .as_ref()
                .map(postgres::row_to_json)
                .transpose(),
        }
    }

    /// Every row of the result, in backend order.
    pub async fn all(
        &self,
        sql: &str,
        params: impl Into<Params>,
    ) -> Result<Vec<Row>, FleetDbError> {
        let params = params.into();
        self.log_statement("all", sql, &params);
        match &self.pool {
            BackendPool::Sqlite(pool) => sqlite::bind(sqlx::query(sql), &params)
                .fetch_all(pool)
                .await?
                .iter()
                .map(sqlite::row_to_json)
                .collect(),
            BackendPool::Postgres(pool) => postgres::bind(sqlx::query(sql), &params)
                .fetch_all(pool)
                .await?
                .iter()
                .map(postgres::row_to_json)
                .collect(),
        }
    }

    /// Same as [`DbAdapter::all`].
    pub async fn query(
        &self,
        sql: &str,
        params: impl Into<Params>,
    ) -> Result<Vec<Row>, FleetDbError> {
        self.all(sql, params).await
    }

    pub async fn run_converted(
        &self,
        sql: &str,
        params: impl Into<Params>,
    ) -> Result<RunResult, FleetDbError> {
        let sql = self.convert_sql(sql);
        self.run(&sql, params).await
    }

    pub async fn get_converted(
        &self,
        sql: &str,
        params: impl Into<Params>,
    ) -> Result<Option<Row>, FleetDbError> {
        let sql = self.convert_sql(sql);
        self.get(&sql, params).await
    }

    pub async fn all_converted(
        &self,
        sql: &str,
        params: impl Into<Params>,
    ) -> Result<Vec<Row>, FleetDbError> {
        let sql = self.convert_sql(sql);
        self.all(&sql, params).await
    }

    pub async fn query_converted(
        &self,
        sql: &str,
        params: impl Into<Params>,
    ) -> Result<Vec<Row>, FleetDbError> {
        let sql = self.convert_sql(sql);
        self.query(&sql, params).await
    }

    /// Round-trip to the backend.
    pub async fn ping(&self) -> Result<(), FleetDbError> {
        match &self.pool {
            BackendPool::Sqlite(pool) => {
                sqlx::query("SELECT 1").execute(pool).await?;
            }
            BackendPool::Postgres(pool) => {
                sqlx::query("SELECT NOW()").execute(pool).await?;
            }
        }
        Ok(())
    }

    pub async fn close(&self) {
        match &self.pool {
            BackendPool::Sqlite(pool) => pool.close().await,
            BackendPool::Postgres(pool) => pool.close().await,
        }
    }

    fn log_statement(&self, op: &'static str, sql: &str, params: &Params) {
        debug!(backend = %self.backend(), op, sql, params = params.len(), "executing statement");
    }
}
