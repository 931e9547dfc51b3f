//! Annotation records as produced by the platform's storage layer.
//!
//! A record holds everything one annotator said about one instance. The
//! shapes here mirror the stored JSON: label schemas map to key/value
//! choices, span schemas to ordered span lists, image schemas to lists of
//! geometric objects.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// All annotations from a single annotator for a single instance.
///
/// Records are immutable once handed to the pipeline; exporters only read.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AnnotationRecord {
    /// Dataset item key this record annotates.
    pub instance_id: String,

    /// The annotator who produced this record.
    pub user_id: String,

    /// Label-schema annotations: schema name -> label key -> value.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, BTreeMap<String, serde_json::Value>>,

    /// Span annotations, ordered as the annotator created them.
    ///
    /// Keyed by schema name for span schemas. For tiered schemas the key is
    /// the tier name; tier membership comes from the schema's `tiers`
    /// declaration.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub spans: BTreeMap<String, Vec<Span>>,

    /// Relations between spans, referenced by span id.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<SpanLink>,

    /// Image annotations: schema name -> list of geometric objects.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub image_annotations: BTreeMap<String, Vec<ImageAnnotation>>,
}

impl AnnotationRecord {
    /// Creates an empty record for the given instance and annotator.
    pub fn new(instance_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            user_id: user_id.into(),
            ..Default::default()
        }
    }
}

/// One annotated span.
///
/// `start`/`end` are half-open character offsets into the item text. For
/// tiered (time-aligned) schemas the character offsets are unused and the
/// `start_time`/`end_time` pair (milliseconds) carries the alignment;
/// dependent-tier spans reference their parent through `parent_id`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Span {
    #[serde(default)]
    pub start: usize,

    #[serde(default)]
    pub end: usize,

    /// The label this span carries. Stored annotations use `name`
    /// interchangeably.
    #[serde(alias = "name")]
    pub label: String,

    /// Span identity, required only when other spans or tiers refer to it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Start time in milliseconds for time-aligned schemas.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<u64>,

    /// End time in milliseconds for time-aligned schemas.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<u64>,

    /// Id of the parent span on the parent tier, for dependent tiers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

impl Span {
    /// Creates a character-offset span.
    pub fn new(start: usize, end: usize, label: impl Into<String>) -> Self {
        Self {
            start,
            end,
            label: label.into(),
            ..Default::default()
        }
    }

    /// Creates a time-aligned span (milliseconds).
    pub fn timed(label: impl Into<String>, start_time: u64, end_time: u64) -> Self {
        Self {
            label: label.into(),
            start_time: Some(start_time),
            end_time: Some(end_time),
            ..Default::default()
        }
    }

    /// Character length of the span. Malformed spans (end < start) count as 0.
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    /// Returns true when the span covers no characters.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Length of the overlap with the half-open range `[start, end)`.
    pub fn overlap(&self, start: usize, end: usize) -> usize {
        let lo = self.start.max(start);
        let hi = self.end.min(end);
        hi.saturating_sub(lo)
    }
}

/// A directed relation between two spans.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SpanLink {
    pub from_id: String,
    pub to_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// One geometric annotation on an image.
///
/// The stored representation tags each object with a `type` string; the
/// tagged union makes the per-format geometry dispatch exhaustive.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ImageAnnotation {
    /// Axis-aligned box, top-left corner plus dimensions, in pixels.
    Bbox {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
        label: String,
    },

    /// Closed polygon as an ordered point list.
    Polygon { points: Vec<[f64; 2]>, label: String },

    /// Freehand outline; treated as a polygon by every exporter.
    Freeform { points: Vec<[f64; 2]>, label: String },

    /// A single keypoint.
    Landmark { x: f64, y: f64, label: String },

    /// A binary pixel mask in the platform's native RLE.
    Mask { rle: Rle, label: String },
}

impl ImageAnnotation {
    /// The label this object carries, regardless of geometry.
    pub fn label(&self) -> &str {
        match self {
            ImageAnnotation::Bbox { label, .. }
            | ImageAnnotation::Polygon { label, .. }
            | ImageAnnotation::Freeform { label, .. }
            | ImageAnnotation::Landmark { label, .. }
            | ImageAnnotation::Mask { label, .. } => label,
        }
    }

    /// The stored `type` tag, for warning messages.
    pub fn kind(&self) -> &'static str {
        match self {
            ImageAnnotation::Bbox { .. } => "bbox",
            ImageAnnotation::Polygon { .. } => "polygon",
            ImageAnnotation::Freeform { .. } => "freeform",
            ImageAnnotation::Landmark { .. } => "landmark",
            ImageAnnotation::Mask { .. } => "mask",
        }
    }
}

/// Run-length encoded binary mask, row-major, alternating runs starting
/// with background.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Rle {
    pub counts: Vec<u32>,

    /// `[height, width]`, matching the stored convention.
    pub size: [u32; 2],
}

impl Rle {
    pub fn new(counts: Vec<u32>, height: u32, width: u32) -> Self {
        Self {
            counts,
            size: [height, width],
        }
    }

    pub fn height(&self) -> u32 {
        self.size[0]
    }

    pub fn width(&self) -> u32 {
        self.size[1]
    }
}
