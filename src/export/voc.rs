//! Pascal VOC XML exporter.
//!
//! One `<stem>.xml` per annotated instance, written by hand in document
//! order. Boxes are integer-rounded; polygons, freeform outlines and masks
//! are reduced to their enclosing box.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use super::{file_stem, xml_escape, Exporter, ExportFormat};
use crate::cv::{self, rle};
use crate::model::{
    AnnotationType, ExportContext, ExportOptions, ExportResult, ImageAnnotation,
};

pub struct VocExporter;

impl Exporter for VocExporter {
    fn format_name(&self) -> &'static str {
        ExportFormat::PascalVoc.name()
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

        // instance -> converted objects, instances in first-encounter order.
        let mut order: Vec<&str> = Vec::new();
        let mut boxes_by_instance: BTreeMap<&str, Vec<VocObject>> = BTreeMap::new();
        let mut num_objects: u64 = 0;

        for record in &context.annotations {
            if !boxes_by_instance.contains_key(record.instance_id.as_str()) {
                order.push(&record.instance_id);
                boxes_by_instance.insert(&record.instance_id, Vec::new());
            }

            let converted = boxes_by_instance
                .get_mut(record.instance_id.as_str())
                .expect("inserted above");

            for objects in record.image_annotations.values() {
                for object in objects {
                    if let Some(voc) = convert_object(object, &record.instance_id, &mut result) {
                        converted.push(voc);
                        num_objects += 1;
                    }
                }
            }
        }

        if let Err(source) = fs::create_dir_all(output_path) {
            result.fail(format!(
                "failed to create {}: {}",
                output_path.display(),
                source
            ));
            return result;
        }

        for &instance_id in &order {
            let file_name = context.file_name_for(instance_id);
            let (width, height) = match context.item(instance_id) {
                Some(item) => item.image_size().unwrap_or_else(|| {
                    result.warn(format!("instance '{}' has no image dimensions", instance_id));
                    (0, 0)
                }),
                None => {
                    result.warn(format!("instance '{}' has no item entry", instance_id));
                    (0, 0)
                }
            };

            let xml = render_voc_xml(
                file_name,
                width,
                height,
                &boxes_by_instance[instance_id],
            );

            let xml_path = output_path.join(format!("{}.xml", file_stem(file_name)));
            if let Err(source) = fs::write(&xml_path, xml) {
                result.fail(format!("failed to write {}: {}", xml_path.display(), source));
                return result;
            }
            result.add_file(xml_path);
        }

        result.set_stat("num_files", order.len() as u64);
        result.set_stat("num_objects", num_objects);
        result
    }
}

struct VocObject {
    name: String,
    xmin: i64,
    ymin: i64,
    xmax: i64,
    ymax: i64,
}

fn convert_object(
    object: &ImageAnnotation,
    instance_id: &str,
    result: &mut ExportResult,
) -> Option<VocObject> {
    let (x, y, width, height) = match object {
        ImageAnnotation::Bbox {
            x,
            y,
            width,
            height,
            ..
        } => (*x, *y, *width, *height),

        ImageAnnotation::Polygon { points, .. } | ImageAnnotation::Freeform { points, .. } => {
            cv::polygon_to_bbox(points)
        }

        ImageAnnotation::Mask { rle: mask_rle, .. } => {
            if mask_rle.width() == 0 || mask_rle.height() == 0 {
                result.warn(format!(
                    "instance '{}': mask has no usable size, skipped",
                    instance_id
                ));
                return None;
            }
            let mask = rle::decode_rle(&mask_rle.counts, mask_rle.width(), mask_rle.height());
            let (x, y, w, h) = rle::rle_bbox(&mask, mask_rle.width(), mask_rle.height());
            (x as f64, y as f64, w as f64, h as f64)
        }

        ImageAnnotation::Landmark { .. } => {
            result.warn(format!(
                "instance '{}': landmark annotations are not supported by VOC export, skipped",
                instance_id
            ));
            return None;
        }
    };

    Some(VocObject {
        name: object.label().to_string(),
        xmin: x.round() as i64,
        ymin: y.round() as i64,
        xmax: (x + width).round() as i64,
        ymax: (y + height).round() as i64,
    })
}

fn render_voc_xml(file_name: &str, width: u32, height: u32, objects: &[VocObject]) -> String {
    let mut xml = String::new();

    writeln!(xml, "<?xml version=\"1.0\" encoding=\"utf-8\"?>").expect("write to string");
    writeln!(xml, "<annotation>").expect("write to string");
    writeln!(xml, "  <folder>JPEGImages</folder>").expect("write to string");
    writeln!(xml, "  <filename>{}</filename>", xml_escape(file_name)).expect("write to string");
    writeln!(xml, "  <size>").expect("write to string");
    writeln!(xml, "    <width>{}</width>", width).expect("write to string");
    writeln!(xml, "    <height>{}</height>", height).expect("write to string");
    writeln!(xml, "    <depth>3</depth>").expect("write to string");
    writeln!(xml, "  </size>").expect("write to string");
    writeln!(xml, "  <segmented>0</segmented>").expect("write to string");

    for object in objects {
        writeln!(xml, "  <object>").expect("write to string");
        writeln!(xml, "    <name>{}</name>", xml_escape(&object.name)).expect("write to string");
        writeln!(xml, "    <pose>Unspecified</pose>").expect("write to string");
        writeln!(xml, "    <truncated>0</truncated>").expect("write to string");
        writeln!(xml, "    <difficult>0</difficult>").expect("write to string");
        writeln!(xml, "    <bndbox>").expect("write to string");
        writeln!(xml, "      <xmin>{}</xmin>", object.xmin).expect("write to string");
        writeln!(xml, "      <ymin>{}</ymin>", object.ymin).expect("write to string");
        writeln!(xml, "      <xmax>{}</xmax>", object.xmax).expect("write to string");
        writeln!(xml, "      <ymax>{}</ymax>", object.ymax).expect("write to string");
        writeln!(xml, "    </bndbox>").expect("write to string");
        writeln!(xml, "  </object>").expect("write to string");
    }

    writeln!(xml, "</annotation>").expect("write to string");
    xml
}
