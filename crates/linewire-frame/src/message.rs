//! The boundary between framing and the RPC engine.
//!
//! Framing never looks inside a message. It only needs a canonical text
//! rendering when writing and a parse from text when reading.

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Errors produced while rendering or parsing message text.
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Engine-specific rendering or parse failure.
    #[error("{0}")]
    Invalid(String),
}

/// One logical RPC unit as seen by the transport.
pub trait Message: Sized {
    /// Render the message to its canonical text.
    fn to_text(&self) -> Result<String, MessageError>;

    /// Parse a message from frame content.
    fn from_text(text: &str) -> Result<Self, MessageError>;
}

impl Message for String {
    fn to_text(&self) -> Result<String, MessageError> {
        Ok(self.clone())
    }

    fn from_text(text: &str) -> Result<Self, MessageError> {
        Ok(text.to_string())
    }
}

impl Message for serde_json::Value {
    fn to_text(&self) -> Result<String, MessageError> {
        serde_json::to_string(self).map_err(Into::into)
    }

    fn from_text(text: &str) -> Result<Self, MessageError> {
        serde_json::from_str(text).map_err(Into::into)
    }
}

/// Adapts any serde type into a [`Message`] rendered as compact JSON.
///
/// Compact JSON never contains a raw line break, so it is safe in line mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Json<T>(pub T);

impl<T> Json<T> {
    /// Unwrap the inner value.
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T: Serialize + DeserializeOwned> Message for Json<T> {
    fn to_text(&self) -> Result<String, MessageError> {
        serde_json::to_string(&self.0).map_err(Into::into)
    }

    fn from_text(text: &str) -> Result<Self, MessageError> {
        serde_json::from_str(text).map(Json).map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Call {
        method: String,
        id: u32,
    }

    #[test]
    fn json_wrapper_renders_compact() {
        let msg = Json(Call {
            method: "ping".into(),
            id: 7,
        });
        assert_eq!(msg.to_text().unwrap(), r#"{"method":"ping","id":7}"#);
    }

    #[test]
    fn json_wrapper_rejects_malformed() {
        let err = Json::<Call>::from_text("{not json").unwrap_err();
        assert!(matches!(err, MessageError::Json(_)));
    }

    #[test]
    fn embedded_newlines_are_escaped() {
        let value = serde_json::json!({ "text": "a\nb" });
        let text = value.to_text().unwrap();
        assert!(!text.contains('\n'));
        assert_eq!(serde_json::Value::from_text(&text).unwrap(), value);
    }
}
