//! The relayed message and its JSON codec.

use serde::{Deserialize, Serialize};

use crate::errors::Result;

/// A file snippet shared between clients.
///
/// Wire form: `{"content": "...", "fileExtension": "..."}`. Both fields are
/// required strings; unknown fields are ignored on decode and never emitted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMessage {
    /// File body.
    pub content: String,
    /// Extension hint such as `"rs"` or `"txt"`. Not validated.
    pub file_extension: String,
}

impl FileMessage {
    /// Build a message from its two fields.
    pub fn new(content: impl Into<String>, file_extension: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            file_extension: file_extension.into(),
        }
    }

    /// Decode one inbound payload.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(payload)?)
    }

    /// Encode to the JSON text sent to clients.
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
