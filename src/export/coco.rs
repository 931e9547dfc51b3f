//! COCO JSON exporter.
//!
//! One JSON file per export: `images` (one entry per distinct annotated
//! instance, first occurrence wins the file name and dimensions),
//! `annotations` and `categories` (1-indexed ids). Polygons become
//! flattened segmentations with a derived bbox and shoelace area; masks
//! become COCO-compatible RLE strings with `iscrowd = 1`.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use super::{Exporter, ExportFormat};
use crate::cv::{self, rle};
use crate::model::{
    AnnotationType, ExportContext, ExportOptions, ExportResult, ImageAnnotation,
};

#[derive(Serialize)]
struct CocoDataset {
    images: Vec<CocoImage>,
    annotations: Vec<CocoAnnotation>,
    categories: Vec<CocoCategory>,
}

#[derive(Serialize)]
struct CocoImage {
    id: u64,
    file_name: String,
    width: u32,
    height: u32,
}

#[derive(Serialize)]
struct CocoCategory {
    id: u64,
    name: String,
    supercategory: String,
}

#[derive(Serialize)]
struct CocoAnnotation {
    id: u64,
    image_id: u64,
    category_id: u64,

    /// COCO bbox format: [x, y, width, height] with (x,y) as top-left corner
    bbox: [f64; 4],

    area: f64,

    segmentation: CocoSegmentation,

    iscrowd: u8,
}

#[derive(Serialize)]
#[serde(untagged)]
enum CocoSegmentation {
    Polygons(Vec<Vec<f64>>),
    Rle { counts: String, size: [u32; 2] },
}

pub struct CocoExporter;

impl Exporter for CocoExporter {
    fn format_name(&self) -> &'static str {
        ExportFormat::Coco.name()
    }

    fn can_export(&self, context: &ExportContext) -> Result<(), String> {
        if context
            .first_schema_of(AnnotationType::ImageAnnotation)
            .is_none()
        {
            return Err("context has no image_annotation schema".to_string());
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

        let categories: Vec<CocoCategory> = mapping
            .names()
            .iter()
            .enumerate()
            .map(|(idx, name)| CocoCategory {
                id: (idx + 1) as u64,
                name: name.clone(),
                supercategory: "none".to_string(),
            })
            .collect();

        // First pass: one image per distinct instance, encounter order.
        let mut images: Vec<CocoImage> = Vec::new();
        let mut image_id_by_instance: BTreeMap<&str, u64> = BTreeMap::new();

        for record in &context.annotations {
            if image_id_by_instance.contains_key(record.instance_id.as_str()) {
                continue;
            }

            let image_id = (images.len() + 1) as u64;
            image_id_by_instance.insert(&record.instance_id, image_id);

            let (width, height) = match context.item(&record.instance_id) {
                Some(item) => item.image_size().unwrap_or_else(|| {
                    result.warn(format!(
                        "instance '{}' has no image dimensions",
                        record.instance_id
                    ));
                    (0, 0)
                }),
                None => {
                    result.warn(format!(
                        "instance '{}' has no item entry",
                        record.instance_id
                    ));
                    (0, 0)
                }
            };

            images.push(CocoImage {
                id: image_id,
                file_name: context.file_name_for(&record.instance_id).to_string(),
                width,
                height,
            });
        }

        // Second pass: annotations, ids dense 1-based in encounter order.
        let mut annotations: Vec<CocoAnnotation> = Vec::new();
        let mut next_annotation_id: u64 = 1;

        for record in &context.annotations {
            let image_id = image_id_by_instance[record.instance_id.as_str()];
            let image_size = context
                .item(&record.instance_id)
                .and_then(|item| item.image_size());

            for objects in record.image_annotations.values() {
                for object in objects {
                    let Some(category_idx) = mapping.id_of(object.label()) else {
                        result.warn(format!(
                            "instance '{}': unknown label '{}' skipped",
                            record.instance_id,
                            object.label()
                        ));
                        continue;
                    };
                    let category_id = (category_idx + 1) as u64;

                    let Some(converted) =
                        convert_object(object, image_size, &record.instance_id, &mut result)
                    else {
                        continue;
                    };

                    annotations.push(CocoAnnotation {
                        id: next_annotation_id,
                        image_id,
                        category_id,
                        bbox: converted.bbox,
                        area: converted.area,
                        segmentation: converted.segmentation,
                        iscrowd: converted.iscrowd,
                    });
                    next_annotation_id += 1;
                }
            }
        }

        result.set_stat("num_images", images.len() as u64);
        result.set_stat("num_annotations", annotations.len() as u64);
        result.set_stat("num_categories", categories.len() as u64);

        let dataset = CocoDataset {
            images,
            annotations,
            categories,
        };

        if let Some(parent) = output_path.parent() {
            if !parent.as_os_str().is_empty() {
                if let Err(source) = std::fs::create_dir_all(parent) {
                    result.fail(format!(
                        "failed to create {}: {}",
                        parent.display(),
                        source
                    ));
                    return result;
                }
            }
        }

        let file = match File::create(output_path) {
            Ok(file) => file,
            Err(source) => {
                result.fail(format!(
                    "failed to create {}: {}",
                    output_path.display(),
                    source
                ));
                return result;
            }
        };

        if let Err(source) = serde_json::to_writer_pretty(BufWriter::new(file), &dataset) {
            result.fail(format!(
                "failed to write {}: {}",
                output_path.display(),
                source
            ));
            return result;
        }

        result.add_file(output_path);
        result
    }
}

struct ConvertedObject {
    bbox: [f64; 4],
    area: f64,
    segmentation: CocoSegmentation,
    iscrowd: u8,
}

fn convert_object(
    object: &ImageAnnotation,
    image_size: Option<(u32, u32)>,
    instance_id: &str,
    result: &mut ExportResult,
) -> Option<ConvertedObject> {
    match object {
        ImageAnnotation::Bbox {
            x,
            y,
            width,
            height,
            ..
        } => Some(ConvertedObject {
            bbox: [*x, *y, *width, *height],
            area: width * height,
            segmentation: CocoSegmentation::Polygons(vec![]),
            iscrowd: 0,
        }),

        ImageAnnotation::Polygon { points, .. } | ImageAnnotation::Freeform { points, .. } => {
            let (x, y, width, height) = cv::polygon_to_bbox(points);
            Some(ConvertedObject {
                bbox: [x, y, width, height],
                area: cv::polygon_area(points),
                segmentation: CocoSegmentation::Polygons(vec![cv::flatten_polygon(points)]),
                iscrowd: 0,
            })
        }

        ImageAnnotation::Mask { rle: mask_rle, .. } => {
            let (width, height) = if mask_rle.width() > 0 && mask_rle.height() > 0 {
                (mask_rle.width(), mask_rle.height())
            } else if let Some((width, height)) = image_size {
                (width, height)
            } else {
                result.warn(format!(
                    "instance '{}': mask has no usable size, skipped",
                    instance_id
                ));
                return None;
            };

            let mask = rle::decode_rle(&mask_rle.counts, width, height);
            let (x, y, w, h) = rle::rle_bbox(&mask, width, height);
            let counts = rle::column_major_rle_counts(&mask, width, height);

            Some(ConvertedObject {
                bbox: [x as f64, y as f64, w as f64, h as f64],
                area: rle::rle_area(&mask) as f64,
                segmentation: CocoSegmentation::Rle {
                    counts: rle::encode_coco_rle_string(&counts),
                    size: [height, width],
                },
                iscrowd: 1,
            })
        }

        ImageAnnotation::Landmark { .. } => {
            result.warn(format!(
                "instance '{}': landmark annotations are not supported by COCO export, skipped",
                instance_id
            ));
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AnnotationRecord, ItemData, Rle, SchemaConfig};
    use serde_json::{json, Value};

    fn image_context(objects: Vec<ImageAnnotation>) -> ExportContext {
        let mut record = AnnotationRecord::new("item-1", "user-1");
        record.image_annotations.insert("objects".into(), objects);

        let mut item = ItemData::default();
        item.insert("filename", json!("img_001.jpg"));
        item.insert("width", json!(100));
        item.insert("height", json!(80));

        let mut context = ExportContext {
            annotations: vec![record],
            schemas: vec![SchemaConfig::new("objects", AnnotationType::ImageAnnotation)
                .with_labels(["cat"])],
            ..Default::default()
        };
        context.items.insert("item-1".into(), item);
        context
    }

    fn export_to_value(context: &ExportContext) -> (ExportResult, Value) {
        let temp = tempfile::tempdir().expect("create temp dir");
        let output = temp.path().join("annotations.json");

        let result = CocoExporter.export(context, &output, &ExportOptions::default());
        let data = std::fs::read_to_string(&output).expect("read coco json");
        (result, serde_json::from_str(&data).expect("parse coco json"))
    }

    #[test]
    fn can_export_requires_image_schema() {
        let context = ExportContext {
            schemas: vec![SchemaConfig::new("ner", AnnotationType::Span)],
            ..Default::default()
        };
        let err = CocoExporter.can_export(&context).unwrap_err();
        assert!(err.contains("image_annotation"));
    }

    #[test]
    fn bbox_exports_directly() {
        let context = image_context(vec![ImageAnnotation::Bbox {
            x: 10.0,
            y: 20.0,
            width: 30.0,
            height: 40.0,
            label: "cat".into(),
        }]);

        let (result, value) = export_to_value(&context);
        assert!(result.success);

        let ann = &value["annotations"][0];
        assert_eq!(ann["bbox"], json!([10.0, 20.0, 30.0, 40.0]));
        assert_eq!(ann["area"], json!(1200.0));
        assert_eq!(ann["iscrowd"], json!(0));
        assert_eq!(ann["category_id"], json!(1));
        assert_eq!(value["images"][0]["file_name"], json!("img_001.jpg"));
        assert_eq!(value["categories"][0]["id"], json!(1));
    }

    #[test]
    fn polygon_gets_segmentation_bbox_and_shoelace_area() {
        let context = image_context(vec![ImageAnnotation::Polygon {
            points: vec![[0.0, 0.0], [10.0, 0.0], [10.0, 10.0], [0.0, 10.0]],
            label: "cat".into(),
        }]);

        let (result, value) = export_to_value(&context);
        assert!(result.success);

        let ann = &value["annotations"][0];
        assert_eq!(ann["area"], json!(100.0));
        assert_eq!(ann["bbox"], json!([0.0, 0.0, 10.0, 10.0]));
        assert_eq!(
            ann["segmentation"][0],
            json!([0.0, 0.0, 10.0, 0.0, 10.0, 10.0, 0.0, 10.0])
        );
    }

    #[test]
    fn mask_exports_as_rle_with_iscrowd() {
        let context = image_context(vec![ImageAnnotation::Mask {
            rle: Rle::new(vec![4, 2, 3], 3, 3),
            label: "cat".into(),
        }]);

        let (result, value) = export_to_value(&context);
        assert!(result.success);

        let ann = &value["annotations"][0];
        assert_eq!(ann["iscrowd"], json!(1));
        assert_eq!(ann["area"], json!(2.0));
        assert_eq!(ann["segmentation"]["size"], json!([3, 3]));
        assert!(ann["segmentation"]["counts"].is_string());
    }

    #[test]
    fn landmark_is_skipped_with_warning() {
        let context = image_context(vec![ImageAnnotation::Landmark {
            x: 5.0,
            y: 5.0,
            label: "cat".into(),
        }]);

        let (result, value) = export_to_value(&context);
        assert!(result.success);
        assert_eq!(result.warning_count(), 1);
        assert_eq!(value["annotations"].as_array().expect("array").len(), 0);
    }

    #[test]
    fn missing_item_entry_warns_but_exports() {
        let mut context = image_context(vec![]);
        context.items.clear();

        let (result, value) = export_to_value(&context);
        assert!(result.success);
        assert!(result.warnings[0].contains("no item entry"));
        assert_eq!(value["images"][0]["width"], json!(0));
        assert_eq!(value["images"][0]["file_name"], json!("item-1"));
    }
}
