//! Boundary to the remote test-management workspace
//!
//! The migration only needs three operations: read a collection with
//! selected fields and an optional filter, create an entity, and upload a
//! test's step script. [`Workspace`] captures exactly that; [`HttpWorkspace`]
//! talks to a real server and [`MemoryWorkspace`] keeps everything in process.

pub mod http;
pub mod memory;
pub mod query;
pub mod requests;

use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::entities::EntityModel;

pub use http::{ConnectionSettings, HttpWorkspace};
pub use memory::MemoryWorkspace;
pub use query::{Query, QueryValue};

/// Operations the migration performs against the remote service
pub trait Workspace: Send + Sync {
    /// Read entities of a collection, restricted to `fields` (plus id and type)
    fn query(
        &self,
        collection: &str,
        fields: &[&str],
        filter: Option<&Query>,
    ) -> Result<Vec<RemoteRecord>, RemoteError>;

    /// Create one entity and return the created record
    fn create(&self, collection: &str, entity: &EntityModel) -> Result<RemoteRecord, RemoteError>;

    /// Replace the step script of a test; `body` is the complete JSON request body
    fn put_script(&self, test_id: &str, body: &str) -> Result<(), RemoteError>;
}

/// One entity as returned by the remote service
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct RemoteRecord(Map<String, Value>);

impl RemoteRecord {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Wrap a JSON value; anything but an object becomes an empty record
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map),
            _ => Self::default(),
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Field rendered as text; numbers are accepted, null and objects are not
    pub fn text(&self, field: &str) -> Option<String> {
        value_text(self.0.get(field)?)
    }

    pub fn id(&self) -> Option<String> {
        self.text(crate::entities::field::ID)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_json(self) -> Value {
        Value::Object(self.0)
    }
}

pub(crate) fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Errors from the remote service
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("invalid server URL '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("request to {url} failed with status {status}: {message}")]
    Status {
        url: String,
        status: u16,
        message: String,
    },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("unexpected response: {0}")]
    Response(String),

    #[error("{collection} returned no entity after create")]
    NothingCreated { collection: String },

    #[error("{0}")]
    Rejected(String),
}

impl From<reqwest::Error> for RemoteError {
    fn from(e: reqwest::Error) -> Self {
        RemoteError::Transport(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_text() {
        let record = RemoteRecord::from_json(json!({
            "id": 1001,
            "name": "Ana",
            "parent": null,
            "owner": {"id": "1"}
        }));

        assert_eq!(record.id(), Some("1001".to_string()));
        assert_eq!(record.text("name"), Some("Ana".to_string()));
        assert_eq!(record.text("parent"), None);
        assert_eq!(record.text("owner"), None);
        assert_eq!(record.text("missing"), None);
    }

    #[test]
    fn test_record_from_non_object() {
        let record = RemoteRecord::from_json(json!([1, 2]));
        assert!(record.fields().is_empty());
    }
}
