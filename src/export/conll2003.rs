//! CoNLL-2003 exporter.
//!
//! One tab-separated `WORD POS CHUNK NER` file covering all instances,
//! each document preceded by a `-DOCSTART-` line, sentences separated by
//! blank lines. POS and chunk columns are emitted as `-X-` because the
//! platform stores no syntax layers.
//!
//! Recognized options: `tokenization` (`whitespace`|`word_punct`),
//! `schema_name` (defaults to the first span schema), `tagging_scheme`
//! (`bio`|`bioes`).

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use super::{first_record_per_instance, Exporter, ExportFormat};
use crate::model::{AnnotationType, ExportContext, ExportOptions, ExportResult};
use crate::text::{
    char_spans_to_bio_tags, group_sentences, tokenize_text, TaggingScheme, TokenizeMethod,
};

pub struct Conll2003Exporter;

impl Exporter for Conll2003Exporter {
    fn format_name(&self) -> &'static str {
        ExportFormat::Conll2003.name()
    }

    fn can_export(&self, context: &ExportContext) -> Result<(), String> {
        if context.first_schema_of(AnnotationType::Span).is_none() {
            return Err("context has no span schema".to_string());
        }
        Ok(())
    }

    fn export(
        &self,
        context: &ExportContext,
        output_path: &Path,
        options: &ExportOptions,
    ) -> ExportResult {
        let mut result = ExportResult::new(self.format_name());

        let Some(settings) = TextExportSettings::resolve(context, options, &mut result) else {
            return result;
        };

        let mut out = String::new();
        let mut num_documents: u64 = 0;
        let mut num_sentences: u64 = 0;
        let mut num_tokens: u64 = 0;

        for record in first_record_per_instance(&context.annotations, &mut result) {
            let Some(text) = context.item(&record.instance_id).and_then(|item| item.text())
            else {
                result.warn(format!(
                    "instance '{}' has no text, skipped",
                    record.instance_id
                ));
                continue;
            };

            let tokens = tokenize_text(text, settings.tokenization);
            let spans = record
                .spans
                .get(&settings.schema_name)
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            let tags = char_spans_to_bio_tags(&tokens, spans, settings.scheme);

            out.push_str("-DOCSTART-\t-X-\t-X-\tO\n\n");
            num_documents += 1;

            for sentence in group_sentences(&tokens) {
                for idx in &sentence {
                    writeln!(out, "{}\t-X-\t-X-\t{}", tokens[*idx].text, tags[*idx])
                        .expect("write to string");
                    num_tokens += 1;
                }
                out.push('\n');
                num_sentences += 1;
            }
        }

        if let Some(parent) = output_path.parent() {
            if !parent.as_os_str().is_empty() {
                if let Err(source) = fs::create_dir_all(parent) {
                    result.fail(format!("failed to create {}: {}", parent.display(), source));
                    return result;
                }
            }
        }

        if let Err(source) = fs::write(output_path, out) {
            result.fail(format!(
                "failed to write {}: {}",
                output_path.display(),
                source
            ));
            return result;
        }
        result.add_file(output_path);

        result.set_stat("num_documents", num_documents);
        result.set_stat("num_sentences", num_sentences);
        result.set_stat("num_tokens", num_tokens);
        result
    }
}

/// Option resolution shared by both CoNLL exporters.
pub(super) struct TextExportSettings {
    pub tokenization: TokenizeMethod,
    pub schema_name: String,
    pub scheme: TaggingScheme,
}

impl TextExportSettings {
    /// Resolves options against the context, failing the result on
    /// unrecognized values or missing schemas.
    pub(super) fn resolve(
        context: &ExportContext,
        options: &ExportOptions,
        result: &mut ExportResult,
    ) -> Option<Self> {
        let tokenization = match options.get("tokenization") {
            None => TokenizeMethod::default(),
            Some(name) => match TokenizeMethod::from_name(name) {
                Some(method) => method,
                None => {
                    result.fail(format!("unknown tokenization method '{}'", name));
                    return None;
                }
            },
        };

        let scheme = match options.get("tagging_scheme") {
            None => TaggingScheme::default(),
            Some(name) => match TaggingScheme::from_name(name) {
                Some(scheme) => scheme,
                None => {
                    result.fail(format!("unknown tagging scheme '{}'", name));
                    return None;
                }
            },
        };

        let schema_name = match options.get("schema_name") {
            Some(name) => {
                if !context.schemas.iter().any(|schema| schema.name == name) {
                    result.fail(format!("schema '{}' not found in context", name));
                    return None;
                }
                name.to_string()
            }
            None => match context.first_schema_of(AnnotationType::Span) {
                Some(schema) => schema.name.clone(),
                None => {
                    result.fail("context has no span schema");
                    return None;
                }
            },
        };

        Some(Self {
            tokenization,
            schema_name,
            scheme,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AnnotationRecord, ItemData, SchemaConfig, Span};
    use serde_json::json;

    fn ner_context() -> ExportContext {
        let mut record = AnnotationRecord::new("doc-1", "user-1");
        record
            .spans
            .insert("ner".into(), vec![Span::new(0, 8, "LOC")]);

        let mut item = ItemData::default();
        item.insert("text", json!("New York is big. Paris too."));

        let mut context = ExportContext {
            annotations: vec![record],
            schemas: vec![SchemaConfig::new("ner", AnnotationType::Span)
                .with_labels(["LOC", "PER"])],
            ..Default::default()
        };
        context.items.insert("doc-1".into(), item);
        context
    }

    fn export_to_string(context: &ExportContext, options: &ExportOptions) -> (ExportResult, String) {
        let temp = tempfile::tempdir().expect("create temp dir");
        let output = temp.path().join("out.conll");
        let result = Conll2003Exporter.export(context, &output, options);
        let content = fs::read_to_string(&output).unwrap_or_default();
        (result, content)
    }

    #[test]
    fn writes_docstart_sentences_and_tags() {
        let (result, content) = export_to_string(&ner_context(), &ExportOptions::default());
        assert!(result.success);

        let expected = "-DOCSTART-\t-X-\t-X-\tO\n\n\
                        New\t-X-\t-X-\tB-LOC\n\
                        York\t-X-\t-X-\tI-LOC\n\
                        is\t-X-\t-X-\tO\n\
                        big.\t-X-\t-X-\tO\n\n\
                        Paris\t-X-\t-X-\tO\n\
                        too.\t-X-\t-X-\tO\n\n";
        assert_eq!(content, expected);
        assert_eq!(result.stats["num_documents"], 1);
        assert_eq!(result.stats["num_sentences"], 2);
        assert_eq!(result.stats["num_tokens"], 6);
    }

    #[test]
    fn first_annotator_wins_with_warning() {
        let mut context = ner_context();
        let mut second = AnnotationRecord::new("doc-1", "user-2");
        second
            .spans
            .insert("ner".into(), vec![Span::new(17, 22, "LOC")]);
        context.annotations.push(second);

        let (result, content) = export_to_string(&context, &ExportOptions::default());
        assert!(result.success);
        assert_eq!(result.warning_count(), 1);
        assert!(result.warnings[0].contains("dropping 'user-2'"));
        // user-1's tags, not user-2's.
        assert!(content.contains("New\t-X-\t-X-\tB-LOC"));
        assert!(content.contains("Paris\t-X-\t-X-\tO"));
    }

    #[test]
    fn missing_text_skips_instance_with_warning() {
        let mut context = ner_context();
        context.items.clear();

        let (result, content) = export_to_string(&context, &ExportOptions::default());
        assert!(result.success);
        assert!(result.warnings[0].contains("has no text"));
        assert!(!content.contains("-DOCSTART-"));
    }

    #[test]
    fn unknown_tokenization_fails_without_writing() {
        let mut options = ExportOptions::default();
        options.set("tokenization", "bogus");

        let (result, content) = export_to_string(&ner_context(), &options);
        assert!(!result.success);
        assert!(result.files_written.is_empty());
        assert!(content.is_empty());
    }

    #[test]
    fn bioes_scheme_is_selectable() {
        let mut context = ner_context();
        context.annotations[0]
            .spans
            .insert("ner".into(), vec![Span::new(17, 22, "LOC")]);

        let mut options = ExportOptions::default();
        options.set("tagging_scheme", "bioes");

        let (_, content) = export_to_string(&context, &options);
        assert!(content.contains("Paris\t-X-\t-X-\tS-LOC"));
    }
}
