//! Shared context builders for integration tests.

#![allow(dead_code)]

use serde_json::json;

use annoport::model::{
    AnnotationRecord, AnnotationType, ExportContext, ImageAnnotation, ItemData, SchemaConfig,
    Span, TierConfig,
};

/// A context with `n` image instances, each carrying one bbox of `label`.
pub fn bbox_context(n: usize, label: &str) -> ExportContext {
    let mut context = ExportContext {
        schemas: vec![
            SchemaConfig::new("objects", AnnotationType::ImageAnnotation).with_labels([label]),
        ],
        ..Default::default()
    };

    for i in 0..n {
        let instance_id = format!("img-{:03}", i);

        let mut record = AnnotationRecord::new(&instance_id, "annotator-1");
        record.image_annotations.insert(
            "objects".into(),
            vec![ImageAnnotation::Bbox {
                x: 10.0 * i as f64,
                y: 5.0,
                width: 40.0,
                height: 30.0,
                label: label.to_string(),
            }],
        );
        context.annotations.push(record);

        let mut item = ItemData::default();
        item.insert("filename", json!(format!("{}.jpg", instance_id)));
        item.insert("width", json!(640));
        item.insert("height", json!(480));
        context.items.insert(instance_id, item);
    }

    context
}

/// A context with one text instance and the given NER spans.
pub fn span_context(text: &str, spans: Vec<Span>) -> ExportContext {
    let mut record = AnnotationRecord::new("doc-1", "annotator-1");
    record.spans.insert("ner".into(), spans);

    let mut item = ItemData::default();
    item.insert("text", json!(text));

    let mut context = ExportContext {
        annotations: vec![record],
        schemas: vec![SchemaConfig::new("ner", AnnotationType::Span).with_labels(["LOC", "PER"])],
        ..Default::default()
    };
    context.items.insert("doc-1".into(), item);
    context
}

/// A context with one audio instance and a two-tier schema.
pub fn tiered_context() -> ExportContext {
    let mut record = AnnotationRecord::new("rec-1", "annotator-1");

    let mut first = Span::timed("hello", 0, 450);
    first.id = Some("s1".into());
    let mut second = Span::timed("world", 600, 900);
    second.id = Some("s2".into());
    record.spans.insert("words".into(), vec![first, second]);

    let mut gloss = Span::new(0, 0, "HELLO");
    gloss.parent_id = Some("s1".into());
    record.spans.insert("gloss".into(), vec![gloss]);

    let mut item = ItemData::default();
    item.insert("filename", json!("session_01.wav"));

    let mut context = ExportContext {
        annotations: vec![record],
        schemas: vec![
            SchemaConfig::new("speech", AnnotationType::TieredAnnotation).with_tiers(vec![
                TierConfig::independent("words"),
                TierConfig::dependent("gloss", "words", "Symbolic_Association"),
            ]),
        ],
        ..Default::default()
    };
    context.items.insert("rec-1".into(), item);
    context
}
