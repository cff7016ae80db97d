//! Schema definitions for recorded demonstration episodes
//!
//! Records:
//! - `Episode`: one demonstration (metadata + ordered trace)
//! - `TraceSample`: one arm-state sample, opaque apart from `timestamp_ms` and `image`
//! - `ImageSidecar`: raw bytes of one per-image metadata file

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Key of the optional millisecond timestamp inside a trace sample.
pub const TIMESTAMP_KEY: &str = "timestamp_ms";

/// Identifier of an episode within a store (file stem or directory name).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EpisodeId(pub String);

impl EpisodeId {
    pub fn new(id: impl Into<String>) -> Self {
        EpisodeId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EpisodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for EpisodeId {
    fn from(s: String) -> Self {
        EpisodeId(s)
    }
}

impl From<&str> for EpisodeId {
    fn from(s: &str) -> Self {
        EpisodeId(s.to_string())
    }
}

/// A single recorded arm-state sample.
///
/// Every field other than `image` is kept verbatim in `fields`, including
/// `timestamp_ms`, so an episode survives a read/align/write cycle unchanged
/// apart from its image column.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TraceSample {
    /// Image assigned to this sample (output of alignment)
    #[serde(default)]
    pub image: Option<String>,
    /// Remaining arm-state fields
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl TraceSample {
    /// A sample carrying only a timestamp.
    pub fn at(timestamp_ms: i64) -> Self {
        let mut fields = Map::new();
        fields.insert(TIMESTAMP_KEY.to_string(), Value::from(timestamp_ms));
        Self {
            image: None,
            fields,
        }
    }

    /// A sample without a timestamp.
    pub fn untimed() -> Self {
        Self::default()
    }

    /// Millisecond timestamp of this sample, if it declares a usable one.
    ///
    /// Integers are taken as-is; floats are truncated toward zero. Any other
    /// JSON value counts as no timestamp.
    pub fn timestamp_ms(&self) -> Option<i64> {
        match self.fields.get(TIMESTAMP_KEY)? {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
            _ => None,
        }
    }
}

/// One complete demonstration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Episode {
    /// Free-form recording metadata
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// Ordered arm-state samples
    pub trace: Vec<TraceSample>,
    /// Any other top-level keys, preserved on write
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Episode {
    pub fn new(trace: Vec<TraceSample>) -> Self {
        Self {
            trace,
            ..Default::default()
        }
    }

    /// Image column, in sample order.
    pub fn images(&self) -> Vec<Option<&str>> {
        self.trace.iter().map(|s| s.image.as_deref()).collect()
    }
}

/// Raw contents of one per-image metadata file.
///
/// Expected shape is `{"timestamp": <decimal seconds>, "filename": <string>}`,
/// but nothing here validates it: malformed sidecars are reported by the
/// index builder, not by storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSidecar {
    /// Name of the sidecar (file name); defines processing order
    pub source: String,
    /// Raw bytes as read from storage
    pub contents: Vec<u8>,
}

impl ImageSidecar {
    pub fn new(source: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        Self {
            source: source.into(),
            contents: contents.into(),
        }
    }

    /// Build a sidecar from a JSON value (mostly for tests and fakes).
    pub fn from_json(source: impl Into<String>, value: &Value) -> Self {
        Self::new(source, value.to_string().into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_episode_roundtrip_preserves_unknown_fields() {
        let raw = json!({
            "metadata": {"description": "pick up the lego piece"},
            "recorded_by": "keyboard",
            "trace": [
                {"timestamp_ms": 1000, "angles": [1.0, 2.0], "gripper": 40},
                {"angles": [1.5, 2.5]}
            ]
        });

        let episode: Episode = serde_json::from_value(raw).unwrap();
        assert_eq!(episode.trace.len(), 2);
        assert_eq!(episode.extra["recorded_by"], "keyboard");
        assert_eq!(episode.trace[0].fields["gripper"], 40);

        let back = serde_json::to_value(&episode).unwrap();
        assert_eq!(back["trace"][0]["angles"], json!([1.0, 2.0]));
        assert_eq!(back["trace"][0]["timestamp_ms"], 1000);
        assert_eq!(back["trace"][1]["image"], Value::Null);
        assert_eq!(back["metadata"]["description"], "pick up the lego piece");
    }

    #[test]
    fn test_episode_without_trace_is_rejected() {
        let raw = json!({"metadata": {}});
        assert!(serde_json::from_value::<Episode>(raw).is_err());
    }

    #[test]
    fn test_timestamp_parsing() {
        let int: TraceSample = serde_json::from_value(json!({"timestamp_ms": 42})).unwrap();
        assert_eq!(int.timestamp_ms(), Some(42));

        let float: TraceSample = serde_json::from_value(json!({"timestamp_ms": 42.9})).unwrap();
        assert_eq!(float.timestamp_ms(), Some(42));

        let text: TraceSample = serde_json::from_value(json!({"timestamp_ms": "42"})).unwrap();
        assert_eq!(text.timestamp_ms(), None);

        let null: TraceSample = serde_json::from_value(json!({"timestamp_ms": null})).unwrap();
        assert_eq!(null.timestamp_ms(), None);

        assert_eq!(TraceSample::untimed().timestamp_ms(), None);
        assert_eq!(TraceSample::at(-5).timestamp_ms(), Some(-5));
    }

    #[test]
    fn test_episode_id_display() {
        let id = EpisodeId::new("20250722155656");
        assert_eq!(id.to_string(), "20250722155656");
        assert_eq!(id.as_str(), "20250722155656");
    }
}
