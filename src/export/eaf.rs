//! ELAN EAF exporter.
//!
//! One `.eaf` document per (instance, tiered schema). All time values
//! referenced by independent tiers are deduplicated into a sorted
//! `TIME_ORDER` table; independent-tier annotations become
//! `ALIGNABLE_ANNOTATION` elements referencing two slots, dependent-tier
//! annotations become `REF_ANNOTATION` elements referencing their parent.

use chrono::{SecondsFormat, Utc};
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use super::{file_stem, first_record_per_instance, sanitize_component, xml_escape, Exporter, ExportFormat};
use crate::model::{
    AnnotationRecord, AnnotationType, ExportContext, ExportOptions, ExportResult, SchemaConfig,
    Span, TierConfig,
};

const EAF_SCHEMA_LOCATION: &str = "http://www.mpi.nl/tools/elan/EAFv3.0.xsd";

/// ELAN's standard constraint stereotypes, declared in every document.
const CONSTRAINTS: [(&str, &str); 4] = [
    (
        "Time_Subdivision",
        "Time subdivision of parent annotation's time interval, no time gaps allowed within this interval",
    ),
    (
        "Symbolic_Subdivision",
        "Symbolic subdivision of a parent annotation. Annotations refering to the same parent are ordered",
    ),
    ("Symbolic_Association", "1-1 association with a parent annotation"),
    (
        "Included_In",
        "Time alignable annotations within the parent annotation's time interval, gaps are allowed",
    ),
];

pub struct EafExporter;

impl Exporter for EafExporter {
    fn format_name(&self) -> &'static str {
        ExportFormat::Eaf.name()
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
        _options: &ExportOptions,
    ) -> ExportResult {
        let mut result = ExportResult::new(self.format_name());

        if let Err(source) = fs::create_dir_all(output_path) {
            result.fail(format!(
                "failed to create {}: {}",
                output_path.display(),
                source
            ));
            return result;
        }

        let mut num_annotations: u64 = 0;

        for record in first_record_per_instance(&context.annotations, &mut result) {
            for schema in context.schemas_of(AnnotationType::TieredAnnotation) {
                if schema.tiers.is_empty() {
                    continue;
                }
                let has_data = schema
                    .tiers
                    .iter()
                    .any(|tier| record.spans.get(&tier.name).is_some_and(|s| !s.is_empty()));
                if !has_data {
                    continue;
                }

                let document = render_eaf(record, schema, &mut result, &mut num_annotations);

                let stem = file_stem(context.file_name_for(&record.instance_id));
                let eaf_path = output_path.join(format!(
                    "{}_{}.eaf",
                    stem,
                    sanitize_component(&schema.name)
                ));

                if let Err(source) = fs::write(&eaf_path, document) {
                    result.fail(format!(
                        "failed to write {}: {}",
                        eaf_path.display(),
                        source
                    ));
                    return result;
                }
                result.add_file(eaf_path);
            }
        }

        result.set_stat("num_files", result.files_written.len() as u64);
        result.set_stat("num_annotations", num_annotations);
        result
    }
}

fn render_eaf(
    record: &AnnotationRecord,
    schema: &SchemaConfig,
    result: &mut ExportResult,
    num_annotations: &mut u64,
) -> String {
    // Pass 1: time slots from every alignable span, annotation ids for
    // everything that will render, span id -> annotation id for parent refs.
    let mut time_values: BTreeSet<u64> = BTreeSet::new();
    let mut annotation_ids: BTreeMap<(usize, usize), String> = BTreeMap::new();
    let mut id_by_span_id: BTreeMap<&str, String> = BTreeMap::new();
    let mut next_annotation = 1usize;

    for (tier_idx, tier) in schema.tiers.iter().enumerate() {
        let spans = record.spans.get(&tier.name).map(Vec::as_slice).unwrap_or(&[]);
        for (span_idx, span) in spans.iter().enumerate() {
            let renders = if tier.is_independent() {
                match (span.start_time, span.end_time) {
                    (Some(start), Some(end)) => {
                        time_values.insert(start);
                        time_values.insert(end);
                        true
                    }
                    _ => {
                        result.warn(format!(
                            "instance '{}', tier '{}': span '{}' has no time alignment, skipped",
                            record.instance_id, tier.name, span.label
                        ));
                        false
                    }
                }
            } else {
                span.parent_id.is_some()
            };

            if renders {
                let annotation_id = format!("a{}", next_annotation);
                next_annotation += 1;
                if let Some(span_id) = span.id.as_deref() {
                    id_by_span_id.insert(span_id, annotation_id.clone());
                }
                annotation_ids.insert((tier_idx, span_idx), annotation_id);
            }
        }
    }

    let slot_ids: BTreeMap<u64, String> = time_values
        .iter()
        .enumerate()
        .map(|(idx, &value)| (value, format!("ts{}", idx + 1)))
        .collect();

    // Pass 2: render the document.
    let mut xml = String::new();
    writeln!(xml, "<?xml version=\"1.0\" encoding=\"UTF-8\"?>").expect("write to string");
    writeln!(
        xml,
        "<ANNOTATION_DOCUMENT AUTHOR=\"\" DATE=\"{}\" FORMAT=\"3.0\" VERSION=\"3.0\" \
         xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\" \
         xsi:noNamespaceSchemaLocation=\"{}\">",
        Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        EAF_SCHEMA_LOCATION
    )
    .expect("write to string");
    writeln!(xml, "  <HEADER MEDIA_FILE=\"\" TIME_UNITS=\"milliseconds\"/>")
        .expect("write to string");

    writeln!(xml, "  <TIME_ORDER>").expect("write to string");
    for (value, slot_id) in &slot_ids {
        writeln!(
            xml,
            "    <TIME_SLOT TIME_SLOT_ID=\"{}\" TIME_VALUE=\"{}\"/>",
            slot_id, value
        )
        .expect("write to string");
    }
    writeln!(xml, "  </TIME_ORDER>").expect("write to string");

    for (tier_idx, tier) in schema.tiers.iter().enumerate() {
        let spans = record.spans.get(&tier.name).map(Vec::as_slice).unwrap_or(&[]);

        if tier.is_independent() {
            writeln!(
                xml,
                "  <TIER LINGUISTIC_TYPE_REF=\"default-lt\" TIER_ID=\"{}\">",
                xml_escape(&tier.name)
            )
            .expect("write to string");
        } else {
            writeln!(
                xml,
                "  <TIER LINGUISTIC_TYPE_REF=\"{}\" PARENT_REF=\"{}\" TIER_ID=\"{}\">",
                xml_escape(&linguistic_type_id(tier)),
                xml_escape(tier.parent.as_deref().unwrap_or_default()),
                xml_escape(&tier.name)
            )
            .expect("write to string");
        }

        for (span_idx, span) in spans.iter().enumerate() {
            let Some(annotation_id) = annotation_ids.get(&(tier_idx, span_idx)) else {
                continue;
            };

            if tier.is_independent() {
                render_alignable(&mut xml, annotation_id, span, &slot_ids);
                *num_annotations += 1;
            } else {
                let parent = span.parent_id.as_deref().expect("checked in pass 1");
                let Some(parent_ref) = id_by_span_id.get(parent) else {
                    result.warn(format!(
                        "instance '{}', tier '{}': span '{}' references unknown parent '{}', skipped",
                        record.instance_id, tier.name, span.label, parent
                    ));
                    continue;
                };
                render_reference(&mut xml, annotation_id, parent_ref, span);
                *num_annotations += 1;
            }
        }

        writeln!(xml, "  </TIER>").expect("write to string");
    }

    writeln!(
        xml,
        "  <LINGUISTIC_TYPE GRAPHIC_REFERENCES=\"false\" LINGUISTIC_TYPE_ID=\"default-lt\" \
         TIME_ALIGNABLE=\"true\"/>"
    )
    .expect("write to string");
    for tier in schema.tiers.iter().filter(|tier| !tier.is_independent()) {
        writeln!(
            xml,
            "  <LINGUISTIC_TYPE CONSTRAINTS=\"{}\" GRAPHIC_REFERENCES=\"false\" \
             LINGUISTIC_TYPE_ID=\"{}\" TIME_ALIGNABLE=\"false\"/>",
            xml_escape(tier_constraint(tier)),
            xml_escape(&linguistic_type_id(tier))
        )
        .expect("write to string");
    }

    for (stereotype, description) in CONSTRAINTS {
        writeln!(
            xml,
            "  <CONSTRAINT DESCRIPTION=\"{}\" STEREOTYPE=\"{}\"/>",
            description, stereotype
        )
        .expect("write to string");
    }

    writeln!(xml, "</ANNOTATION_DOCUMENT>").expect("write to string");
    xml
}

fn render_alignable(xml: &mut String, annotation_id: &str, span: &Span, slot_ids: &BTreeMap<u64, String>) {
    let start = span.start_time.expect("checked in pass 1");
    let end = span.end_time.expect("checked in pass 1");

    writeln!(xml, "    <ANNOTATION>").expect("write to string");
    writeln!(
        xml,
        "      <ALIGNABLE_ANNOTATION ANNOTATION_ID=\"{}\" TIME_SLOT_REF1=\"{}\" TIME_SLOT_REF2=\"{}\">",
        annotation_id, slot_ids[&start], slot_ids[&end]
    )
    .expect("write to string");
    writeln!(
        xml,
        "        <ANNOTATION_VALUE>{}</ANNOTATION_VALUE>",
        xml_escape(&span.label)
    )
    .expect("write to string");
    writeln!(xml, "      </ALIGNABLE_ANNOTATION>").expect("write to string");
    writeln!(xml, "    </ANNOTATION>").expect("write to string");
}

fn render_reference(xml: &mut String, annotation_id: &str, parent_ref: &str, span: &Span) {
    writeln!(xml, "    <ANNOTATION>").expect("write to string");
    writeln!(
        xml,
        "      <REF_ANNOTATION ANNOTATION_ID=\"{}\" ANNOTATION_REF=\"{}\">",
        annotation_id, parent_ref
    )
    .expect("write to string");
    writeln!(
        xml,
        "        <ANNOTATION_VALUE>{}</ANNOTATION_VALUE>",
        xml_escape(&span.label)
    )
    .expect("write to string");
    writeln!(xml, "      </REF_ANNOTATION>").expect("write to string");
    writeln!(xml, "    </ANNOTATION>").expect("write to string");
}

fn linguistic_type_id(tier: &TierConfig) -> String {
    format!("{}-lt", tier.name)
}

fn tier_constraint(tier: &TierConfig) -> &str {
    tier.constraint.as_deref().unwrap_or("Symbolic_Association")
}
