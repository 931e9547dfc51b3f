//! Value types for the annotation export pipeline.
//!
//! This module defines the input side ([`ExportContext`] and everything it
//! carries) and the output side ([`ExportResult`]) of every export. The
//! types are permissive by design: records loaded from upstream storage may
//! reference missing items or carry labels no schema declares, and the
//! exporters report those as warnings rather than refusing to parse.

mod context;
mod record;
mod result;

pub use context::{
    AnnotationType, ExportContext, ExportOptions, ItemData, SchemaConfig, TierConfig,
};
pub use record::{AnnotationRecord, ImageAnnotation, Rle, Span, SpanLink};
pub use result::ExportResult;
