//! Run data models returned by the platform runs API

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single call run processed by the platform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    /// Platform identifier (string or numeric upstream); `null` when absent
    #[serde(default)]
    pub id: Value,

    /// Processing status as reported upstream
    #[serde(default)]
    pub status: Option<String>,

    /// Every other field on the run, including outcome markers
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl RunRecord {
    /// String value of a field, if present and a string
    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    /// Identifier rendered without JSON quoting
    pub fn id_display(&self) -> String {
        match &self.id {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// One page of runs
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunsPage {
    /// Runs in the order returned by the platform
    #[serde(default)]
    pub data: Vec<RunRecord>,

    /// Remaining top-level fields (pagination metadata and the like)
    #[serde(flatten)]
    pub meta: Map<String, Value>,
}
