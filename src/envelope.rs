// Typed wrapper for stored values

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

/// Stored value with its encoding recorded at write time
///
/// Serialized as `{"kind":"json","payload":...}` or `{"kind":"raw","payload":"..."}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "lowercase")]
pub enum Envelope {
    /// Structured value
    Json(Value),
    /// Opaque string, stored as given
    Raw(String),
}

impl Envelope {
    /// Wrap a serializable value
    pub fn json<T: Serialize + ?Sized>(value: &T) -> serde_json::Result<Self> {
        Ok(Envelope::Json(serde_json::to_value(value)?))
    }

    /// Encode to the text form written to a backend
    pub fn encode(&self) -> String {
        // Serializing a Value or String cannot fail
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Decode stored text
    ///
    /// Text that is not an envelope predates envelopes and is kept as raw.
    pub fn decode(text: &str) -> Self {
        serde_json::from_str(text).unwrap_or_else(|_| Envelope::Raw(text.to_string()))
    }

    /// Check whether the text is already an encoded envelope
    pub fn is_encoded(text: &str) -> bool {
        serde_json::from_str::<Envelope>(text).is_ok()
    }

    /// Convert the payload into the requested type
    ///
    /// A raw payload is offered to `T` as a JSON string.
    pub fn into_value<T: DeserializeOwned>(self) -> serde_json::Result<T> {
        match self {
            Envelope::Json(value) => serde_json::from_value(value),
            Envelope::Raw(s) => serde_json::from_value(Value::String(s)),
        }
    }
}
