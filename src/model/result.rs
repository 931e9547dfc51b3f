//! Structured result of one export call.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// What an export call produced.
///
/// Constructed once per [`Exporter::export`](crate::export::Exporter::export)
/// call and never mutated after return. Warnings are recoverable per-item
/// problems; any entry in `errors` implies `success == false`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExportResult {
    pub success: bool,

    pub format_name: String,

    /// Paths written, in write order.
    pub files_written: Vec<PathBuf>,

    pub warnings: Vec<String>,

    pub errors: Vec<String>,

    /// Per-format counters, e.g. `num_images`, `num_annotations`.
    pub stats: BTreeMap<String, u64>,
}

impl ExportResult {
    /// Creates a successful result to accumulate into.
    pub fn new(format_name: impl Into<String>) -> Self {
        Self {
            success: true,
            format_name: format_name.into(),
            files_written: Vec::new(),
            warnings: Vec::new(),
            errors: Vec::new(),
            stats: BTreeMap::new(),
        }
    }

    /// Creates a failed result carrying a single error, for exports that
    /// cannot start at all.
    pub fn failure(format_name: impl Into<String>, error: impl Into<String>) -> Self {
        let mut result = Self::new(format_name);
        result.fail(error);
        result
    }

    /// Records a recoverable problem. The offending item is skipped, the
    /// export continues.
    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        log::warn!("[{}] {}", self.format_name, message);
        self.warnings.push(message);
    }

    /// Records a fatal problem and marks the result failed.
    pub fn fail(&mut self, message: impl Into<String>) {
        let message = message.into();
        log::error!("[{}] {}", self.format_name, message);
        self.errors.push(message);
        self.success = false;
    }

    pub fn add_file(&mut self, path: impl Into<PathBuf>) {
        self.files_written.push(path.into());
    }

    pub fn set_stat(&mut self, key: impl Into<String>, value: u64) {
        self.stats.insert(key.into(), value);
    }

    pub fn bump_stat(&mut self, key: &str) {
        *self.stats.entry(key.to_string()).or_insert(0) += 1;
    }

    pub fn warning_count(&self) -> usize {
        self.warnings.len()
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }
}

impl fmt::Display for ExportResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Export to '{}' {}",
            self.format_name,
            if self.success { "succeeded" } else { "FAILED" }
        )?;

        if !self.files_written.is_empty() {
            writeln!(f, "Files written:")?;
            for path in &self.files_written {
                writeln!(f, "  {}", path.display())?;
            }
        }

        if !self.stats.is_empty() {
            writeln!(f, "Stats:")?;
            for (key, value) in &self.stats {
                writeln!(f, "  {}: {}", key, value)?;
            }
        }

        if !self.warnings.is_empty() {
            writeln!(f, "{} warning(s):", self.warnings.len())?;
            for warning in &self.warnings {
                writeln!(f, "  warning: {}", warning)?;
            }
        }

        if !self.errors.is_empty() {
            writeln!(f, "{} error(s):", self.errors.len())?;
            for error in &self.errors {
                writeln!(f, "  error: {}", error)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warnings_do_not_fail_the_result() {
        let mut result = ExportResult::new("coco");
        result.warn("instance 'a' has no item entry");
        assert!(result.success);
        assert_eq!(result.warning_count(), 1);
    }

    #[test]
    fn errors_fail_the_result() {
        let mut result = ExportResult::new("yolo");
        result.fail("no image dimensions");
        assert!(!result.success);
        assert_eq!(result.error_count(), 1);
    }

    #[test]
    fn display_report_lists_files_and_stats() {
        let mut result = ExportResult::new("coco");
        result.add_file("out/annotations.json");
        result.set_stat("num_images", 5);

        let report = result.to_string();
        assert!(report.contains("Export to 'coco' succeeded"));
        assert!(report.contains("out/annotations.json"));
        assert!(report.contains("num_images: 5"));
    }
}
