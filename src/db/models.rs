use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One result row: column name to JSON scalar, same shape for both backends.
pub type Row = Map<String, Value>;

/// Outcome of a mutating statement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    /// Id of the inserted row, when the statement was an INSERT that produced one.
    #[serde(rename = "lastID")]
    pub last_id: Option<i64>,
    pub changes: u64,
}
