//! Exporter contract and registry.
//!
//! Each target format implements [`Exporter`]; the [`ExporterRegistry`]
//! owns one instance per format name and dispatches by name, checking
//! [`Exporter::can_export`] before any file is written. The registry is
//! built explicitly at process start via [`ExporterRegistry::with_builtins`]
//! and treated as read-only afterwards; it is a value handed to callers,
//! not a global.

pub mod coco;
pub mod conll2003;
pub mod conllu;
pub mod eaf;
pub mod mask_png;
pub mod textgrid;
pub mod voc;
pub mod yolo;

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

use crate::error::ExportError;
use crate::model::{ExportContext, ExportOptions, ExportResult};

/// The conversion capability every format provides.
pub trait Exporter {
    /// The registry key, e.g. `"coco"`.
    fn format_name(&self) -> &'static str;

    /// Checks whether the context holds anything this format can express.
    ///
    /// A pure predicate: it inspects the context and returns the reason the
    /// export cannot proceed, without mutating anything or touching disk.
    fn can_export(&self, context: &ExportContext) -> Result<(), String>;

    /// Converts the context and writes the output files.
    ///
    /// Per-item problems become warnings on the result; the full output is
    /// materialized in memory before the first write.
    fn export(
        &self,
        context: &ExportContext,
        output_path: &Path,
        options: &ExportOptions,
    ) -> ExportResult;
}

/// The closed set of built-in export formats.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportFormat {
    Coco,
    Yolo,
    PascalVoc,
    Conll2003,
    Conllu,
    MaskPng,
    Eaf,
    TextGrid,
}

impl ExportFormat {
    /// All built-in formats, in registration order.
    pub fn all() -> [ExportFormat; 8] {
        [
            ExportFormat::Coco,
            ExportFormat::Yolo,
            ExportFormat::PascalVoc,
            ExportFormat::Conll2003,
            ExportFormat::Conllu,
            ExportFormat::MaskPng,
            ExportFormat::Eaf,
            ExportFormat::TextGrid,
        ]
    }

    /// Registry name for the format.
    pub fn name(&self) -> &'static str {
        match self {
            ExportFormat::Coco => "coco",
            ExportFormat::Yolo => "yolo",
            ExportFormat::PascalVoc => "voc",
            ExportFormat::Conll2003 => "conll2003",
            ExportFormat::Conllu => "conllu",
            ExportFormat::MaskPng => "mask-png",
            ExportFormat::Eaf => "eaf",
            ExportFormat::TextGrid => "textgrid",
        }
    }

    pub fn from_name(name: &str) -> Option<ExportFormat> {
        ExportFormat::all()
            .into_iter()
            .find(|format| format.name() == name)
    }

    fn exporter(&self) -> Box<dyn Exporter> {
        match self {
            ExportFormat::Coco => Box::new(coco::CocoExporter),
            ExportFormat::Yolo => Box::new(yolo::YoloExporter),
            ExportFormat::PascalVoc => Box::new(voc::VocExporter),
            ExportFormat::Conll2003 => Box::new(conll2003::Conll2003Exporter),
            ExportFormat::Conllu => Box::new(conllu::ConlluExporter),
            ExportFormat::MaskPng => Box::new(mask_png::MaskPngExporter),
            ExportFormat::Eaf => Box::new(eaf::EafExporter),
            ExportFormat::TextGrid => Box::new(textgrid::TextGridExporter),
        }
    }
}

/// Name-keyed table of exporters, populated once at startup.
pub struct ExporterRegistry {
    exporters: BTreeMap<String, Box<dyn Exporter>>,
}

impl ExporterRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            exporters: BTreeMap::new(),
        }
    }

    /// Creates a registry holding every built-in exporter.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for format in ExportFormat::all() {
            registry
                .register(format.exporter())
                .expect("built-in formats have unique non-empty names");
        }
        registry
    }

    /// Adds an exporter. Fails when the name is empty or already taken.
    pub fn register(&mut self, exporter: Box<dyn Exporter>) -> Result<(), ExportError> {
        let name = exporter.format_name();
        if name.is_empty() {
            return Err(ExportError::EmptyFormatName);
        }
        if self.exporters.contains_key(name) {
            return Err(ExportError::DuplicateFormat(name.to_string()));
        }
        self.exporters.insert(name.to_string(), exporter);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&dyn Exporter> {
        self.exporters.get(name).map(Box::as_ref)
    }

    /// Registered format names, for discovery UIs.
    pub fn get_supported_formats(&self) -> Vec<&str> {
        self.exporters.keys().map(String::as_str).collect()
    }

    /// One line per exporter, for `--help`-style listings.
    pub fn list_exporters(&self) -> String {
        let mut listing = String::new();
        for name in self.exporters.keys() {
            writeln!(listing, "{}", name).expect("write to string");
        }
        listing
    }

    /// Dispatches an export by format name.
    ///
    /// Unknown names are an error. An incompatible context short-circuits
    /// to a failed [`ExportResult`] before any file is written.
    pub fn export(
        &self,
        name: &str,
        context: &ExportContext,
        output_path: &Path,
        options: &ExportOptions,
    ) -> Result<ExportResult, ExportError> {
        let exporter = self
            .get(name)
            .ok_or_else(|| ExportError::UnknownFormat(name.to_string()))?;

        if let Err(reason) = exporter.can_export(context) {
            return Ok(ExportResult::failure(
                name,
                format!("context cannot be exported: {}", reason),
            ));
        }

        Ok(exporter.export(context, output_path, options))
    }
}

impl Default for ExporterRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

pub(crate) fn xml_escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// File stem of an item file name: final path component, extension removed.
pub(crate) fn file_stem(name: &str) -> &str {
    let base = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(name);
    match base.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => base,
    }
}

/// Makes a label safe to use inside a file name.
pub(crate) fn sanitize_component(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Keeps the first record per instance, in encounter order.
///
/// When several annotators labeled the same instance, later records are
/// dropped and reported so the data loss stays visible.
pub(crate) fn first_record_per_instance<'a>(
    annotations: &'a [crate::model::AnnotationRecord],
    result: &mut ExportResult,
) -> Vec<&'a crate::model::AnnotationRecord> {
    let mut seen: BTreeMap<&str, &str> = BTreeMap::new();
    let mut kept = Vec::new();

    for record in annotations {
        if let Some(kept_user) = seen.get(record.instance_id.as_str()).copied() {
            result.warn(format!(
                "instance '{}': keeping annotator '{}', dropping '{}'",
                record.instance_id, kept_user, record.user_id
            ));
            continue;
        }
        seen.insert(&record.instance_id, &record.user_id);
        kept.push(record);
    }

    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    struct DummyExporter(&'static str);

    impl Exporter for DummyExporter {
        fn format_name(&self) -> &'static str {
            self.0
        }

        fn can_export(&self, _context: &ExportContext) -> Result<(), String> {
            Err("dummy never exports".to_string())
        }

        fn export(
            &self,
            _context: &ExportContext,
            _output_path: &Path,
            _options: &ExportOptions,
        ) -> ExportResult {
            ExportResult::new(self.0)
        }
    }

    #[test]
    fn builtins_register_all_formats() {
        let registry = ExporterRegistry::with_builtins();
        let formats = registry.get_supported_formats();
        assert_eq!(formats.len(), 8);
        for format in ExportFormat::all() {
            assert!(registry.get(format.name()).is_some());
        }
    }

    #[test]
    fn register_rejects_duplicates() {
        let mut registry = ExporterRegistry::new();
        registry
            .register(Box::new(DummyExporter("dup")))
            .expect("first registration succeeds");

        let err = registry
            .register(Box::new(DummyExporter("dup")))
            .unwrap_err();
        assert!(matches!(err, ExportError::DuplicateFormat(name) if name == "dup"));
    }

    #[test]
    fn register_rejects_empty_names() {
        let mut registry = ExporterRegistry::new();
        let err = registry.register(Box::new(DummyExporter(""))).unwrap_err();
        assert!(matches!(err, ExportError::EmptyFormatName));
    }

    #[test]
    fn unknown_format_is_an_error() {
        let registry = ExporterRegistry::with_builtins();
        let context = ExportContext::default();
        let err = registry
            .export(
                "nope",
                &context,
                Path::new("out"),
                &ExportOptions::default(),
            )
            .unwrap_err();
        assert!(matches!(err, ExportError::UnknownFormat(name) if name == "nope"));
    }

    #[test]
    fn incompatible_context_short_circuits_to_failed_result() {
        let mut registry = ExporterRegistry::new();
        registry
            .register(Box::new(DummyExporter("dummy")))
            .expect("register dummy");

        let result = registry
            .export(
                "dummy",
                &ExportContext::default(),
                Path::new("out"),
                &ExportOptions::default(),
            )
            .expect("dispatch returns a result");

        assert!(!result.success);
        assert!(result.errors[0].contains("dummy never exports"));
        assert!(result.files_written.is_empty());
    }

    #[test]
    fn format_names_round_trip() {
        for format in ExportFormat::all() {
            assert_eq!(ExportFormat::from_name(format.name()), Some(format));
        }
        assert_eq!(ExportFormat::from_name("bogus"), None);
    }
}
