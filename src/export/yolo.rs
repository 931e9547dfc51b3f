//! Ultralytics-style YOLO exporter.
//!
//! Writes `labels/<stem>.txt` files with normalized center-form boxes at
//! six decimal places, a `classes.txt` in category-id order and a
//! `data.yaml`. YOLO cannot normalize without image dimensions, so
//! `can_export` fails globally when any annotated instance lacks them.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use super::{file_stem, Exporter, ExportFormat};
use crate::cv::{self, rle};
use crate::model::{
    AnnotationType, ExportContext, ExportOptions, ExportResult, ImageAnnotation,
};

pub struct YoloExporter;

impl Exporter for YoloExporter {
    fn format_name(&self) -> &'static str {
        ExportFormat::Yolo.name()
    }

    fn can_export(&self, context: &ExportContext) -> Result<(), String> {
        if context
            .first_schema_of(AnnotationType::ImageAnnotation)
            .is_none()
        {
            return Err("context has no image_annotation schema".to_string());
        }

        for record in &context.annotations {
            if record.image_annotations.values().all(Vec::is_empty) {
                continue;
            }
            let has_size = context
                .item(&record.instance_id)
                .and_then(|item| item.image_size())
                .is_some();
            if !has_size {
                return Err(format!(
                    "instance '{}' has image annotations but no image dimensions",
                    record.instance_id
                ));
            }
        }

        Ok(())
    }

    fn export(
        &self,
        context: &ExportContext,
        output_path: &Path,
        _options: &ExportOptions,
    ) -> ExportResult {
        let mut result = ExportResult::new(self.format_name());

        let mapping = cv::build_category_mapping(&context.annotations, &context.schemas);

        // stem -> label lines, stems in first-encounter order via the id map.
        let mut lines_by_stem: BTreeMap<String, String> = BTreeMap::new();
        let mut num_annotations: u64 = 0;

        for record in &context.annotations {
            let stem = file_stem(context.file_name_for(&record.instance_id)).to_string();

            let Some((image_width, image_height)) = context
                .item(&record.instance_id)
                .and_then(|item| item.image_size())
            else {
                result.warn(format!(
                    "instance '{}' has no image dimensions, skipped",
                    record.instance_id
                ));
                continue;
            };

            let lines = lines_by_stem.entry(stem).or_default();

            for objects in record.image_annotations.values() {
                for object in objects {
                    let Some(class_id) = mapping.id_of(object.label()) else {
                        result.warn(format!(
                            "instance '{}': unknown label '{}' skipped",
                            record.instance_id,
                            object.label()
                        ));
                        continue;
                    };

                    let Some((x, y, width, height)) =
                        object_bbox(object, &record.instance_id, &mut result)
                    else {
                        continue;
                    };

                    let (cx, cy, nw, nh) = cv::normalize_bbox(
                        x,
                        y,
                        width,
                        height,
                        image_width as f64,
                        image_height as f64,
                    );

                    writeln!(
                        lines,
                        "{} {:.6} {:.6} {:.6} {:.6}",
                        class_id, cx, cy, nw, nh
                    )
                    .expect("write to string");
                    num_annotations += 1;
                }
            }
        }

        let labels_dir = output_path.join("labels");
        if let Err(source) = fs::create_dir_all(&labels_dir) {
            result.fail(format!(
                "failed to create {}: {}",
                labels_dir.display(),
                source
            ));
            return result;
        }

        for (stem, lines) in &lines_by_stem {
            let label_path = labels_dir.join(format!("{}.txt", stem));
            if let Err(source) = fs::write(&label_path, lines) {
                result.fail(format!(
                    "failed to write {}: {}",
                    label_path.display(),
                    source
                ));
                return result;
            }
            result.add_file(label_path);
        }

        let classes_path = output_path.join("classes.txt");
        let mut classes = String::new();
        for name in mapping.names() {
            writeln!(classes, "{}", name).expect("write to string");
        }
        if let Err(source) = fs::write(&classes_path, classes) {
            result.fail(format!(
                "failed to write {}: {}",
                classes_path.display(),
                source
            ));
            return result;
        }
        result.add_file(classes_path);

        let yaml_path = output_path.join("data.yaml");
        if let Err(source) = fs::write(&yaml_path, data_yaml(mapping.names())) {
            result.fail(format!(
                "failed to write {}: {}",
                yaml_path.display(),
                source
            ));
            return result;
        }
        result.add_file(yaml_path);

        result.set_stat("num_label_files", lines_by_stem.len() as u64);
        result.set_stat("num_annotations", num_annotations);
        result.set_stat("num_categories", mapping.len() as u64);
        result
    }
}

/// Reduces any geometry to a pixel-space `(x, y, w, h)` box, or skips it.
fn object_bbox(
    object: &ImageAnnotation,
    instance_id: &str,
    result: &mut ExportResult,
) -> Option<(f64, f64, f64, f64)> {
    match object {
        ImageAnnotation::Bbox {
            x,
            y,
            width,
            height,
            ..
        } => Some((*x, *y, *width, *height)),

        ImageAnnotation::Polygon { points, .. } | ImageAnnotation::Freeform { points, .. } => {
            result.warn(format!(
                "instance '{}': {} converted to its enclosing bbox",
                instance_id,
                object.kind()
            ));
            Some(cv::polygon_to_bbox(points))
        }

        ImageAnnotation::Mask { rle: mask_rle, .. } => {
            if mask_rle.width() == 0 || mask_rle.height() == 0 {
                result.warn(format!(
                    "instance '{}': mask has no usable size, skipped",
                    instance_id
                ));
                return None;
            }
            result.warn(format!(
                "instance '{}': mask converted to its enclosing bbox",
                instance_id
            ));
            let mask = rle::decode_rle(&mask_rle.counts, mask_rle.width(), mask_rle.height());
            let (x, y, w, h) = rle::rle_bbox(&mask, mask_rle.width(), mask_rle.height());
            Some((x as f64, y as f64, w as f64, h as f64))
        }

        ImageAnnotation::Landmark { .. } => {
            result.warn(format!(
                "instance '{}': landmark annotations are not supported by YOLO export, skipped",
                instance_id
            ));
            None
        }
    }
}

fn data_yaml(names: &[String]) -> String {
    let mut yaml = String::new();
    yaml.push_str("path: .\n");
    yaml.push_str("train: images/train\n");
    yaml.push_str("val: images/val\n");
    writeln!(yaml, "nc: {}", names.len()).expect("write to string");
    yaml.push_str("names:\n");
    for (idx, name) in names.iter().enumerate() {
        writeln!(yaml, "  {}: {}", idx, yaml_single_quoted(name)).expect("write to string");
    }
    yaml
}

fn yaml_single_quoted(raw: &str) -> String {
    format!("'{}'", raw.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AnnotationRecord, ItemData, SchemaConfig};
    use serde_json::json;

    fn context_with(objects: Vec<ImageAnnotation>, with_dims: bool) -> ExportContext {
        let mut record = AnnotationRecord::new("item-1", "user-1");
        record.image_annotations.insert("objects".into(), objects);

        let mut item = ItemData::default();
        item.insert("filename", json!("shots/img_001.jpg"));
        if with_dims {
            item.insert("width", json!(200));
            item.insert("height", json!(100));
        }

        let mut context = ExportContext {
            annotations: vec![record],
            schemas: vec![SchemaConfig::new("objects", AnnotationType::ImageAnnotation)
                .with_labels(["cat", "dog"])],
            ..Default::default()
        };
        context.items.insert("item-1".into(), item);
        context
    }

    #[test]
    fn can_export_fails_globally_without_dimensions() {
        let context = context_with(
            vec![ImageAnnotation::Bbox {
                x: 0.0,
                y: 0.0,
                width: 10.0,
                height: 10.0,
                label: "cat".into(),
            }],
            false,
        );

        let err = YoloExporter.can_export(&context).unwrap_err();
        assert!(err.contains("item-1"));
        assert!(err.contains("dimensions"));
    }

    #[test]
    fn bbox_lines_are_normalized_center_form() {
        let context = context_with(
            vec![ImageAnnotation::Bbox {
                x: 50.0,
                y: 25.0,
                width: 100.0,
                height: 50.0,
                label: "dog".into(),
            }],
            true,
        );

        let temp = tempfile::tempdir().expect("create temp dir");
        let result = YoloExporter.export(&context, temp.path(), &ExportOptions::default());
        assert!(result.success);

        let label = fs::read_to_string(temp.path().join("labels/img_001.txt"))
            .expect("read label file");
        assert_eq!(label, "1 0.500000 0.500000 0.500000 0.500000\n");

        let classes =
            fs::read_to_string(temp.path().join("classes.txt")).expect("read classes.txt");
        assert_eq!(classes, "cat\ndog\n");

        let yaml = fs::read_to_string(temp.path().join("data.yaml")).expect("read data.yaml");
        assert!(yaml.contains("nc: 2"));
        assert!(yaml.contains("0: 'cat'"));
        assert!(yaml.contains("1: 'dog'"));
    }

    #[test]
    fn polygon_is_reduced_to_enclosing_bbox_with_warning() {
        let context = context_with(
            vec![ImageAnnotation::Polygon {
                points: vec![[0.0, 0.0], [100.0, 0.0], [50.0, 50.0]],
                label: "cat".into(),
            }],
            true,
        );

        let temp = tempfile::tempdir().expect("create temp dir");
        let result = YoloExporter.export(&context, temp.path(), &ExportOptions::default());

        assert!(result.success);
        assert!(result.warnings[0].contains("enclosing bbox"));

        let label = fs::read_to_string(temp.path().join("labels/img_001.txt"))
            .expect("read label file");
        assert_eq!(label, "0 0.250000 0.250000 0.500000 0.500000\n");
    }

    #[test]
    fn stats_count_files_and_annotations() {
        let context = context_with(
            vec![
                ImageAnnotation::Bbox {
                    x: 0.0,
                    y: 0.0,
                    width: 10.0,
                    height: 10.0,
                    label: "cat".into(),
                },
                ImageAnnotation::Landmark {
                    x: 1.0,
                    y: 1.0,
                    label: "cat".into(),
                },
            ],
            true,
        );

        let temp = tempfile::tempdir().expect("create temp dir");
        let result = YoloExporter.export(&context, temp.path(), &ExportOptions::default());

        assert_eq!(result.stats["num_label_files"], 1);
        assert_eq!(result.stats["num_annotations"], 1);
        assert_eq!(result.stats["num_categories"], 2);
        assert_eq!(result.warning_count(), 1);
    }
}
