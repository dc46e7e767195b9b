//! Version Metadata - Optional Enrichment
//!
//! `meta.json` is written by the engine next to the artifacts. It is never
//! required to serve a version: a missing file yields the derived fields only.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const METADATA_FILENAME: &str = "meta.json";

/// What kind of primary export a version carries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Still,
    Animation,
    Web3d,
}

impl MediaType {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "still" => Some(MediaType::Still),
            "animation" => Some(MediaType::Animation),
            "web3d" => Some(MediaType::Web3d),
            _ => None,
        }
    }

    /// Export format served when a version is requested without a format.
    pub fn primary_format(&self) -> &'static str {
        match self {
            MediaType::Still => "png",
            MediaType::Animation => "mp4",
            MediaType::Web3d => "html",
        }
    }
}

/// Metadata record of one version.
///
/// Serializes as a flat JSON object so arbitrary engine-provided keys survive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(Map<String, Value>);

impl Metadata {
    /// Fields every version has, whether or not `meta.json` exists.
    pub fn derived(visualization: &str, version: &str) -> Self {
        let mut map = Map::new();
        map.insert("title".into(), Value::String(visualization.to_string()));
        map.insert("version".into(), Value::String(version.to_string()));
        Self(map)
    }

    /// Overlays `other`'s values on top of this record.
    pub fn merge(&mut self, other: Map<String, Value>) {
        self.0.extend(other);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn title(&self) -> Option<&str> {
        self.get("title").and_then(Value::as_str)
    }

    pub fn version(&self) -> Option<&str> {
        self.get("version").and_then(Value::as_str)
    }

    pub fn media_type(&self) -> Option<MediaType> {
        self.get("mediaType").and_then(Value::as_str).and_then(MediaType::parse)
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

/// One visualization with all of its versions, newest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisualizationSummary {
    #[serde(skip)]
    pub name: String,
    pub versions: Vec<Metadata>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_file_values_override_derived() {
        let mut meta = Metadata::derived("demo", "20240101T1000");
        let file = json!({"title": "Demo Scene", "mediaType": "animation"});
        meta.merge(file.as_object().unwrap().clone());

        assert_eq!(meta.title(), Some("Demo Scene"));
        assert_eq!(meta.version(), Some("20240101T1000"));
        assert_eq!(meta.media_type(), Some(MediaType::Animation));
    }

    #[test]
    fn test_unknown_media_type() {
        let mut meta = Metadata::derived("demo", "v");
        meta.merge(json!({"mediaType": "hologram"}).as_object().unwrap().clone());
        assert_eq!(meta.media_type(), None);
    }

    #[test]
    fn test_serializes_flat() {
        let meta = Metadata::derived("demo", "v1");
        let out = serde_json::to_value(&meta).unwrap();
        assert_eq!(out, json!({"title": "demo", "version": "v1"}));
    }
}
