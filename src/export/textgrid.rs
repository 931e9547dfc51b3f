//! Praat TextGrid exporter.
//!
//! One file per (instance, tiered schema), interval tiers only. Praat
//! requires every tier to tile its time range without gaps, so empty
//! intervals are inserted wherever annotations leave one. Times are stored
//! in milliseconds upstream and written in seconds here.
//!
//! Recognized options: `variant` (`long`, the verbose key=value form, or
//! `short`, the positional form).

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use super::{file_stem, first_record_per_instance, sanitize_component, Exporter, ExportFormat};
use crate::model::{
    AnnotationRecord, AnnotationType, ExportContext, ExportOptions, ExportResult, SchemaConfig,
};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Variant {
    Long,
    Short,
}

pub struct TextGridExporter;

impl Exporter for TextGridExporter {
    fn format_name(&self) -> &'static str {
        ExportFormat::TextGrid.name()
    }

    fn can_export(&self, context: &ExportContext) -> Result<(), String> {
        match context.first_schema_of(AnnotationType::TieredAnnotation) {
            None => Err("context has no tiered_annotation schema".to_string()),
            Some(schema) if schema.tiers.is_empty() => {
                Err(format!("tiered schema '{}' declares no tiers", schema.name))
            }
            Some(_) => Ok(()),
        }
    }

    fn export(
        &self,
        context: &ExportContext,
        output_path: &Path,
        options: &ExportOptions,
    ) -> ExportResult {
        let mut result = ExportResult::new(self.format_name());

        let variant = match options.get_or("variant", "long") {
            "long" => Variant::Long,
            "short" => Variant::Short,
            other => {
                result.fail(format!("unknown TextGrid variant '{}'", other));
                return result;
            }
        };

        if let Err(source) = fs::create_dir_all(output_path) {
            result.fail(format!(
                "failed to create {}: {}",
                output_path.display(),
                source
            ));
            return result;
        }

        let mut num_intervals: u64 = 0;

        for record in first_record_per_instance(&context.annotations, &mut result) {
            for schema in context.schemas_of(AnnotationType::TieredAnnotation) {
                if schema.tiers.is_empty() {
                    continue;
                }

                let Some(tiers) = collect_tiers(record, schema, &mut result) else {
                    continue;
                };

                num_intervals += tiers
                    .iter()
                    .map(|tier| tier.intervals.len() as u64)
                    .sum::<u64>();

                let document = match variant {
                    Variant::Long => render_long(&tiers),
                    Variant::Short => render_short(&tiers),
                };

                let stem = file_stem(context.file_name_for(&record.instance_id));
                let grid_path = output_path.join(format!(
                    "{}_{}.TextGrid",
                    stem,
                    sanitize_component(&schema.name)
                ));

                if let Err(source) = fs::write(&grid_path, document) {
                    result.fail(format!(
                        "failed to write {}: {}",
                        grid_path.display(),
                        source
                    ));
                    return result;
                }
                result.add_file(grid_path);
            }
        }

        result.set_stat("num_files", result.files_written.len() as u64);
        result.set_stat("num_intervals", num_intervals);
        result
    }
}

struct Interval {
    xmin: f64,
    xmax: f64,
    text: String,
}

struct GridTier {
    name: String,
    xmin: f64,
    xmax: f64,
    intervals: Vec<Interval>,
}

/// Builds gapless interval tiers for one (record, schema) pair.
///
/// Returns `None` when no tier carries any time-aligned span, in which
/// case no file should be written.
fn collect_tiers(
    record: &AnnotationRecord,
    schema: &SchemaConfig,
    result: &mut ExportResult,
) -> Option<Vec<GridTier>> {
    // Timed (start, end, label) triples per tier, in milliseconds.
    let mut timed: Vec<(String, Vec<(u64, u64, String)>)> = Vec::new();
    let mut min_ms = u64::MAX;
    let mut max_ms = 0u64;

    for tier in &schema.tiers {
        let mut entries = Vec::new();
        for span in record.spans.get(&tier.name).map(Vec::as_slice).unwrap_or(&[]) {
            let (Some(start), Some(end)) = (span.start_time, span.end_time) else {
                result.warn(format!(
                    "instance '{}', tier '{}': span '{}' has no time alignment, skipped",
                    record.instance_id, tier.name, span.label
                ));
                continue;
            };
            min_ms = min_ms.min(start);
            max_ms = max_ms.max(end);
            entries.push((start, end, span.label.clone()));
        }
        entries.sort_by_key(|&(start, end, _)| (start, end));
        timed.push((tier.name.clone(), entries));
    }

    if min_ms > max_ms {
        return None;
    }

    let xmin = min_ms as f64 / 1000.0;
    let xmax = max_ms as f64 / 1000.0;

    let tiers = timed
        .into_iter()
        .map(|(name, entries)| {
            let intervals = tile_intervals(&name, &entries, min_ms, max_ms, record, result);
            GridTier {
                name,
                xmin,
                xmax,
                intervals,
            }
        })
        .collect();

    Some(tiers)
}

/// Tiles `[min_ms, max_ms]` with the tier's annotations, inserting empty
/// intervals into every gap. Overlapping annotations are clamped forward
/// with a warning so the invariant holds for any input.
fn tile_intervals(
    tier_name: &str,
    entries: &[(u64, u64, String)],
    min_ms: u64,
    max_ms: u64,
    record: &AnnotationRecord,
    result: &mut ExportResult,
) -> Vec<Interval> {
    let mut intervals = Vec::new();
    let mut cursor = min_ms;

    for (start, end, label) in entries {
        let mut start = *start;
        let end = *end;

        if start < cursor {
            result.warn(format!(
                "instance '{}', tier '{}': interval '{}' overlaps its predecessor, clamped",
                record.instance_id, tier_name, label
            ));
            start = cursor;
        }
        if end <= start {
            continue;
        }

        if start > cursor {
            intervals.push(Interval {
                xmin: cursor as f64 / 1000.0,
                xmax: start as f64 / 1000.0,
                text: String::new(),
            });
        }

        intervals.push(Interval {
            xmin: start as f64 / 1000.0,
            xmax: end as f64 / 1000.0,
            text: label.clone(),
        });
        cursor = end;
    }

    if cursor < max_ms || intervals.is_empty() {
        intervals.push(Interval {
            xmin: cursor as f64 / 1000.0,
            xmax: max_ms as f64 / 1000.0,
            text: String::new(),
        });
    }

    intervals
}

/// Praat number formatting: plain decimal, no trailing zeros.
fn fmt_time(value: f64) -> String {
    format!("{}", value)
}

fn quoted(text: &str) -> String {
    format!("\"{}\"", text.replace('"', "\"\""))
}

fn render_long(tiers: &[GridTier]) -> String {
    let xmin = tiers.first().map(|t| t.xmin).unwrap_or(0.0);
    let xmax = tiers.first().map(|t| t.xmax).unwrap_or(0.0);

    let mut out = String::new();
    out.push_str("File type = \"ooTextFile\"\n");
    out.push_str("Object class = \"TextGrid\"\n\n");
    writeln!(out, "xmin = {}", fmt_time(xmin)).expect("write to string");
    writeln!(out, "xmax = {}", fmt_time(xmax)).expect("write to string");
    out.push_str("tiers? <exists>\n");
    writeln!(out, "size = {}", tiers.len()).expect("write to string");
    out.push_str("item []:\n");

    for (tier_idx, tier) in tiers.iter().enumerate() {
        writeln!(out, "    item [{}]:", tier_idx + 1).expect("write to string");
        out.push_str("        class = \"IntervalTier\"\n");
        writeln!(out, "        name = {}", quoted(&tier.name)).expect("write to string");
        writeln!(out, "        xmin = {}", fmt_time(tier.xmin)).expect("write to string");
        writeln!(out, "        xmax = {}", fmt_time(tier.xmax)).expect("write to string");
        writeln!(out, "        intervals: size = {}", tier.intervals.len())
            .expect("write to string");

        for (interval_idx, interval) in tier.intervals.iter().enumerate() {
            writeln!(out, "        intervals [{}]:", interval_idx + 1).expect("write to string");
            writeln!(out, "            xmin = {}", fmt_time(interval.xmin))
                .expect("write to string");
            writeln!(out, "            xmax = {}", fmt_time(interval.xmax))
                .expect("write to string");
            writeln!(out, "            text = {}", quoted(&interval.text))
                .expect("write to string");
        }
    }

    out
}

fn render_short(tiers: &[GridTier]) -> String {
    let xmin = tiers.first().map(|t| t.xmin).unwrap_or(0.0);
    let xmax = tiers.first().map(|t| t.xmax).unwrap_or(0.0);

    let mut out = String::new();
    out.push_str("File type = \"ooTextFile\"\n");
    out.push_str("Object class = \"TextGrid\"\n\n");
    writeln!(out, "{}", fmt_time(xmin)).expect("write to string");
    writeln!(out, "{}", fmt_time(xmax)).expect("write to string");
    out.push_str("<exists>\n");
    writeln!(out, "{}", tiers.len()).expect("write to string");

    for tier in tiers {
        out.push_str("\"IntervalTier\"\n");
        writeln!(out, "{}", quoted(&tier.name)).expect("write to string");
        writeln!(out, "{}", fmt_time(tier.xmin)).expect("write to string");
        writeln!(out, "{}", fmt_time(tier.xmax)).expect("write to string");
        writeln!(out, "{}", tier.intervals.len()).expect("write to string");

        for interval in &tier.intervals {
            writeln!(out, "{}", fmt_time(interval.xmin)).expect("write to string");
            writeln!(out, "{}", fmt_time(interval.xmax)).expect("write to string");
            writeln!(out, "{}", quoted(&interval.text)).expect("write to string");
        }
    }

    out
}
