//! CoNLL-U exporter.
//!
//! Ten tab-separated columns per token, `# sent_id` / `# text` comments per
//! sentence. The platform has no dependency parses, so syntactic columns
//! are `_` placeholders; NER tags travel in MISC as `NER=<tag>` together
//! with `SpaceAfter=No` for tokens the source text runs together.
//!
//! Recognized options: `tokenization`, `schema_name`, `tagging_scheme`
//! (shared with the CoNLL-2003 exporter) and `pos_column`, naming a second
//! span schema whose labels populate UPOS.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use super::conll2003::TextExportSettings;
use super::{first_record_per_instance, Exporter, ExportFormat};
use crate::model::{AnnotationType, ExportContext, ExportOptions, ExportResult, Span};
use crate::text::{
    char_spans_to_bio_tags, group_sentences, slice_chars, tokenize_text, TaggingScheme, Token,
};

pub struct ConlluExporter;

impl Exporter for ConlluExporter {
    fn format_name(&self) -> &'static str {
        ExportFormat::Conllu.name()
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

        let pos_schema = match options.get("pos_column") {
            Some(name) => {
                if !context.schemas.iter().any(|schema| schema.name == name) {
                    result.fail(format!("pos_column schema '{}' not found in context", name));
                    return result;
                }
                Some(name.to_string())
            }
            None => None,
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
            let ner_spans = record
                .spans
                .get(&settings.schema_name)
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            let ner_tags = char_spans_to_bio_tags(&tokens, ner_spans, settings.scheme);

            let pos_tags = pos_schema.as_deref().map(|name| {
                let pos_spans = record.spans.get(name).map(Vec::as_slice).unwrap_or(&[]);
                upos_tags(&tokens, pos_spans)
            });

            num_documents += 1;

            for (sentence_idx, sentence) in group_sentences(&tokens).iter().enumerate() {
                let first = tokens[sentence[0]].start;
                let last = tokens[*sentence.last().expect("sentences are non-empty")].end;

                writeln!(out, "# sent_id = {}-{}", record.instance_id, sentence_idx + 1)
                    .expect("write to string");
                writeln!(out, "# text = {}", slice_chars(text, first, last))
                    .expect("write to string");

                for (pos_in_sentence, &idx) in sentence.iter().enumerate() {
                    let token = &tokens[idx];
                    let upos = pos_tags
                        .as_ref()
                        .map(|tags| tags[idx].as_str())
                        .unwrap_or("_");

                    writeln!(
                        out,
                        "{}\t{}\t_\t{}\t_\t_\t_\t_\t_\t{}",
                        pos_in_sentence + 1,
                        token.text,
                        upos,
                        misc_field(&ner_tags[idx], token, tokens.get(idx + 1)),
                    )
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

/// Per-token UPOS labels from a span schema, majority-overlap aligned.
///
/// Reuses the BIO aligner and strips the boundary prefix: a token inside a
/// `NOUN` span yields `NOUN`, uncovered tokens yield `_`.
fn upos_tags(tokens: &[Token], spans: &[Span]) -> Vec<String> {
    char_spans_to_bio_tags(tokens, spans, TaggingScheme::Bio)
        .into_iter()
        .map(|tag| match tag.split_once('-') {
            Some((_, label)) => label.to_string(),
            None => "_".to_string(),
        })
        .collect()
}

fn misc_field(ner_tag: &str, token: &Token, next: Option<&Token>) -> String {
    let mut parts = Vec::new();

    if ner_tag != "O" {
        parts.push(format!("NER={}", ner_tag));
    }

    if let Some(next) = next {
        if token.end == next.start {
            parts.push("SpaceAfter=No".to_string());
        }
    }

    if parts.is_empty() {
        "_".to_string()
    } else {
        parts.join("|")
    }
}
