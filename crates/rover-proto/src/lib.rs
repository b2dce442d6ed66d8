pub mod command;
pub mod http;
pub mod telemetry;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Envelope carried on the event channel in both directions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl Frame {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self { event: event.into(), data }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtoError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtoError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProtoError {
    #[error("malformed json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed `{event}` payload: {source}")]
    Payload {
        event: &'static str,
        #[source]
        source: serde_json::Error,
    },
}
