pub mod config;
pub mod db;
pub mod dialect;
pub mod error;

pub use config::Config;
pub use db::{DbAdapter, Param, Params, Row, RunResult};
pub use dialect::Backend;
pub use error::FleetDbError;
