//! Per-label mask PNG exporter.
//!
//! Decodes every mask annotation and writes one RGBA PNG per
//! (instance, label) pair that has foreground pixels. All masks of a label
//! on one instance are unioned onto a single canvas. Foreground color
//! cycles through a fixed 10-color palette by category index, background
//! stays transparent.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use image::{Rgba, RgbaImage};

use super::{file_stem, sanitize_component, Exporter, ExportFormat};
use crate::cv::{self, rle};
use crate::model::{
    AnnotationType, ExportContext, ExportOptions, ExportResult, ImageAnnotation, Rle,
};

/// Foreground colors, cycled by category index.
const PALETTE: [(u8, u8, u8); 10] = [
    (230, 25, 75),
    (60, 180, 75),
    (255, 225, 25),
    (0, 130, 200),
    (245, 130, 48),
    (145, 30, 180),
    (70, 240, 240),
    (240, 50, 230),
    (210, 245, 60),
    (250, 190, 212),
];

pub struct MaskPngExporter;

impl Exporter for MaskPngExporter {
    fn format_name(&self) -> &'static str {
        ExportFormat::MaskPng.name()
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

        // (instance, label) -> mask RLEs, grouped in encounter order.
        let mut order: Vec<(String, String)> = Vec::new();
        let mut rles_by_key: BTreeMap<(String, String), Vec<&Rle>> = BTreeMap::new();

        for record in &context.annotations {
            for objects in record.image_annotations.values() {
                for object in objects {
                    let ImageAnnotation::Mask { rle: mask_rle, label } = object else {
                        continue;
                    };

                    let key = (record.instance_id.clone(), label.clone());
                    if !rles_by_key.contains_key(&key) {
                        order.push(key.clone());
                    }
                    rles_by_key.entry(key).or_default().push(mask_rle);
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

        let mut num_masks: u64 = 0;

        for key in &order {
            let (instance_id, label) = key;
            let rles = &rles_by_key[key];

            // Canvas size: item dimensions, else the first usable RLE size.
            let canvas = context
                .item(instance_id)
                .and_then(|item| item.image_size())
                .or_else(|| {
                    rles.iter()
                        .find(|r| r.width() > 0 && r.height() > 0)
                        .map(|r| (r.width(), r.height()))
                });

            let Some((width, height)) = canvas else {
                result.warn(format!(
                    "instance '{}': no image dimensions and no RLE size for label '{}', skipped",
                    instance_id, label
                ));
                continue;
            };

            let mut union = vec![0u8; (width as usize) * (height as usize)];
            for mask_rle in rles {
                let decoded = rle::decode_rle(&mask_rle.counts, width, height);
                for (dst, src) in union.iter_mut().zip(decoded) {
                    *dst |= src;
                }
            }

            if rle::rle_area(&union) == 0 {
                continue;
            }

            let category_idx = mapping.id_of(label).unwrap_or(0);
            let (r, g, b) = PALETTE[category_idx % PALETTE.len()];

            let img = RgbaImage::from_fn(width, height, |x, y| {
                if union[(y * width + x) as usize] != 0 {
                    Rgba([r, g, b, 255])
                } else {
                    Rgba([0, 0, 0, 0])
                }
            });

            let stem = file_stem(context.file_name_for(instance_id));
            let png_path =
                output_path.join(format!("{}_{}.png", stem, sanitize_component(label)));

            if let Err(source) = img.save(&png_path) {
                result.fail(format!("failed to write {}: {}", png_path.display(), source));
                return result;
            }
            result.add_file(png_path);
            num_masks += 1;
        }

        result.set_stat("num_masks", num_masks);
        result
    }
}
