//! The input contract of the export pipeline.
//!
//! An upstream loader assembles an [`ExportContext`] from stored
//! annotations, raw items and the task configuration; exporters only ever
//! read it. Item fields are kept as raw JSON because upstream item shapes
//! vary by task type.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use super::record::AnnotationRecord;

/// The kind of annotation layer a schema configures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationType {
    Span,
    ImageAnnotation,
    TieredAnnotation,

    /// Anything this pipeline does not export (radio, checkbox, ...).
    #[serde(other)]
    Other,
}

/// One annotation-layer configuration from the task config.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SchemaConfig {
    pub name: String,

    pub annotation_type: AnnotationType,

    /// Labels in declaration order. May be empty for free-label schemas.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,

    /// Tier declarations for tiered schemas, empty otherwise.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tiers: Vec<TierConfig>,
}

impl SchemaConfig {
    pub fn new(name: impl Into<String>, annotation_type: AnnotationType) -> Self {
        Self {
            name: name.into(),
            annotation_type,
            labels: Vec::new(),
            tiers: Vec::new(),
        }
    }

    /// Adds declared labels, preserving order.
    pub fn with_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels.extend(labels.into_iter().map(Into::into));
        self
    }

    pub fn with_tiers(mut self, tiers: Vec<TierConfig>) -> Self {
        self.tiers = tiers;
        self
    }
}

/// One tier of a tiered schema.
///
/// A tier without a parent is independent (time-alignable); a tier with a
/// parent is dependent and its `constraint` names the ELAN constraint type.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TierConfig {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,

    /// ELAN constraint stereotype, e.g. `Symbolic_Association`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraint: Option<String>,
}

impl TierConfig {
    pub fn independent(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            constraint: None,
        }
    }

    pub fn dependent(
        name: impl Into<String>,
        parent: impl Into<String>,
        constraint: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            parent: Some(parent.into()),
            constraint: Some(constraint.into()),
        }
    }

    pub fn is_independent(&self) -> bool {
        self.parent.is_none()
    }
}

/// Raw fields of one dataset item, as loaded from upstream storage.
///
/// Field names are task-dependent, so the exporters go through the typed
/// accessors here instead of reaching into the map.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemData(pub BTreeMap<String, serde_json::Value>);

impl ItemData {
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    /// The item text, checking the `text`, `sentence` and `content` keys in
    /// that order.
    pub fn text(&self) -> Option<&str> {
        ["text", "sentence", "content"]
            .iter()
            .find_map(|key| self.0.get(*key).and_then(|v| v.as_str()))
    }

    /// Image dimensions, when both are present and positive.
    pub fn image_size(&self) -> Option<(u32, u32)> {
        let width = self.0.get("width").and_then(|v| v.as_u64())?;
        let height = self.0.get("height").and_then(|v| v.as_u64())?;
        if width == 0 || height == 0 {
            return None;
        }
        Some((width as u32, height as u32))
    }

    /// The item's file name, checking `filename`, `file_name` and `image`.
    pub fn file_name(&self) -> Option<&str> {
        ["filename", "file_name", "image"]
            .iter()
            .find_map(|key| self.0.get(*key).and_then(|v| v.as_str()))
    }

    /// Inserts a raw field, mainly useful when assembling contexts in tests.
    pub fn insert(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.0.insert(key.into(), value);
    }
}

/// Everything one export call needs, assembled by an upstream loader.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ExportContext {
    /// The full task configuration, passed through untyped.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub config: serde_json::Value,

    /// All annotation records, in storage order. Ordering matters: dedup
    /// policies and discovered-label numbering follow first encounter.
    pub annotations: Vec<AnnotationRecord>,

    /// Raw items keyed by instance id. Records may reference instances with
    /// no entry here; exporters warn and continue.
    #[serde(default)]
    pub items: BTreeMap<String, ItemData>,

    /// Annotation-layer configurations, in task-config order.
    pub schemas: Vec<SchemaConfig>,

    /// Default directory for multi-file exports.
    #[serde(default)]
    pub output_dir: PathBuf,
}

impl ExportContext {
    /// Schemas of one annotation type, in declaration order.
    pub fn schemas_of(
        &self,
        annotation_type: AnnotationType,
    ) -> impl Iterator<Item = &SchemaConfig> {
        self.schemas
            .iter()
            .filter(move |schema| schema.annotation_type == annotation_type)
    }

    /// The first schema of one annotation type, if any.
    pub fn first_schema_of(&self, annotation_type: AnnotationType) -> Option<&SchemaConfig> {
        self.schemas_of(annotation_type).next()
    }

    pub fn item(&self, instance_id: &str) -> Option<&ItemData> {
        self.items.get(instance_id)
    }

    /// The file name recorded for an instance, falling back to the
    /// instance id when the item is missing or carries no name.
    pub fn file_name_for<'a>(&'a self, instance_id: &'a str) -> &'a str {
        self.item(instance_id)
            .and_then(ItemData::file_name)
            .unwrap_or(instance_id)
    }
}

/// Flat per-export configuration, e.g. `tokenization`, `schema_name`.
///
/// Recognized keys are documented per exporter; unknown keys are ignored.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExportOptions(pub BTreeMap<String, String>);

impl ExportOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Builds options from `key=value` pairs, as passed on the CLI.
    pub fn from_pairs<'a, I>(pairs: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut options = Self::new();
        for pair in pairs {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| format!("option '{}' is not of the form key=value", pair))?;
            options.set(key.trim(), value.trim());
        }
        Ok(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn annotation_type_parses_stored_names() {
        let schema: SchemaConfig = serde_json::from_str(
            r#"{"name": "objects", "annotation_type": "image_annotation", "labels": ["cat"]}"#,
        )
        .expect("parse schema");

        assert_eq!(schema.annotation_type, AnnotationType::ImageAnnotation);
        assert_eq!(schema.labels, vec!["cat"]);
    }

    #[test]
    fn unknown_annotation_type_maps_to_other() {
        let schema: SchemaConfig =
            serde_json::from_str(r#"{"name": "mood", "annotation_type": "radio"}"#)
                .expect("parse schema");
        assert_eq!(schema.annotation_type, AnnotationType::Other);
    }

    #[test]
    fn item_text_checks_fallback_keys_in_order() {
        let mut item = ItemData::default();
        item.insert("content", json!("from content"));
        assert_eq!(item.text(), Some("from content"));

        item.insert("sentence", json!("from sentence"));
        assert_eq!(item.text(), Some("from sentence"));

        item.insert("text", json!("from text"));
        assert_eq!(item.text(), Some("from text"));
    }

    #[test]
    fn item_image_size_requires_positive_dimensions() {
        let mut item = ItemData::default();
        item.insert("width", json!(640));
        assert_eq!(item.image_size(), None);

        item.insert("height", json!(0));
        assert_eq!(item.image_size(), None);

        item.insert("height", json!(480));
        assert_eq!(item.image_size(), Some((640, 480)));
    }

    #[test]
    fn options_parse_key_value_pairs() {
        let options =
            ExportOptions::from_pairs(["tokenization=word_punct", "schema_name = ner "])
                .expect("parse options");
        assert_eq!(options.get("tokenization"), Some("word_punct"));
        assert_eq!(options.get("schema_name"), Some("ner"));
        assert_eq!(options.get_or("missing", "fallback"), "fallback");
    }

    #[test]
    fn options_reject_malformed_pairs() {
        let err = ExportOptions::from_pairs(["tokenization"]).unwrap_err();
        assert!(err.contains("key=value"));
    }
}
