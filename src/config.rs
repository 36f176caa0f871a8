//! Process configuration, extracted once at startup and passed explicitly.
//!
//! Sources, lowest precedence first:
//! - built-in defaults (`Config::default()`)
//! - environment: `DATABASE_URL`, `DATABASE_PATH`, `DATABASE_POOL_SIZE`, `LOGLEVEL`

use crate::dialect::Backend;
use crate::error::FleetDbError;
use figment::{
    Figment,
    providers::{Env, Serialized},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_SQLITE_PATH: &str = "./database.sqlite";

const ENV_KEYS: [&str; 4] = [
    "DATABASE_URL",
    "DATABASE_PATH",
    "DATABASE_POOL_SIZE",
    "LOGLEVEL",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// PostgreSQL connection string. Unset or blank selects SQLite.
    pub database_url: Option<String>,
    /// SQLite database file, used only when `database_url` is unset.
    pub database_path: PathBuf,
    /// PostgreSQL pool size. SQLite always uses one connection.
    pub pool_size: u32,
    pub loglevel: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            database_path: PathBuf::from(DEFAULT_SQLITE_PATH),
            pool_size: 10,
            loglevel: "info".to_string(),
        }
    }
}

/// Where the adapter connects; fixed for the life of the adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseTarget {
    Postgres { url: String },
    Sqlite { path: PathBuf },
}

impl Config {
    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(Config::default())).merge(
            Env::raw().only(&ENV_KEYS).map(|key| {
                if key.as_str().eq_ignore_ascii_case("DATABASE_POOL_SIZE") {
                    "pool_size".into()
                } else {
                    key.into()
                }
            }),
        )
    }

    pub fn from_env() -> Result<Self, FleetDbError> {
        Ok(Self::figment().extract()?)
    }

    pub fn target(&self) -> DatabaseTarget {
        match self.database_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => DatabaseTarget::Postgres {
                url: url.to_string(),
            },
            _ => DatabaseTarget::Sqlite {
                path: self.database_path.clone(),
            },
        }
    }

    pub fn backend(&self) -> Backend {
        match self.target() {
            DatabaseTarget::Postgres { .. } => Backend::Postgres,
            DatabaseTarget::Sqlite { .. } => Backend::Sqlite,
        }
    }
}
