//! Text utilities for the CoNLL exporters.
//!
//! Tokens carry character offsets (not byte offsets) into the original
//! text, matching the convention of the stored span annotations, with the
//! invariant that the characters at `start..end` spell the token exactly.

use regex::Regex;
use std::sync::OnceLock;

use crate::model::Span;

/// One token with half-open character offsets into the source text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token {
    pub text: String,
    pub start: usize,
    pub end: usize,
}

impl Token {
    /// Character length of the token.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Tokenization method, selected by the `tokenization` export option.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TokenizeMethod {
    /// Split on runs of non-whitespace; punctuation stays attached.
    #[default]
    Whitespace,

    /// Additionally split each chunk into word-character runs and
    /// individual punctuation characters.
    WordPunct,
}

impl TokenizeMethod {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "whitespace" => Some(TokenizeMethod::Whitespace),
            "word_punct" => Some(TokenizeMethod::WordPunct),
            _ => None,
        }
    }
}

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\S+").expect("valid regex"))
}

fn word_punct_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\w+|[^\w\s]").expect("valid regex"))
}

/// Splits text into tokens with character offsets.
pub fn tokenize_text(text: &str, method: TokenizeMethod) -> Vec<Token> {
    let re = match method {
        TokenizeMethod::Whitespace => whitespace_re(),
        TokenizeMethod::WordPunct => word_punct_re(),
    };

    let mut tokens = Vec::new();
    let mut char_pos = 0usize;
    let mut byte_pos = 0usize;

    for found in re.find_iter(text) {
        let start = char_pos + text[byte_pos..found.start()].chars().count();
        let len = found.as_str().chars().count();

        tokens.push(Token {
            text: found.as_str().to_string(),
            start,
            end: start + len,
        });

        char_pos = start + len;
        byte_pos = found.end();
    }

    tokens
}

/// Slice of `text` by character offsets, for `# text = ...` style output.
pub fn slice_chars(text: &str, start: usize, end: usize) -> String {
    text.chars().skip(start).take(end.saturating_sub(start)).collect()
}

/// Token tagging scheme for span-to-tag conversion.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TaggingScheme {
    #[default]
    Bio,
    Bioes,
}

impl TaggingScheme {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "bio" => Some(TaggingScheme::Bio),
            "bioes" => Some(TaggingScheme::Bioes),
            _ => None,
        }
    }
}

/// Converts character-offset spans to one tag per token.
///
/// Spans are applied longest first (ties keep input order), and a token
/// joins a span when their overlap covers at least half the token and no
/// longer span claimed it already. The first token of a span tags `B-`,
/// the rest `I-`; under BIOES a single-token span becomes `S-` and the
/// final token of a multi-token span `E-`. Unclaimed tokens tag `O`.
pub fn char_spans_to_bio_tags(
    tokens: &[Token],
    spans: &[Span],
    scheme: TaggingScheme,
) -> Vec<String> {
    let mut tags = vec!["O".to_string(); tokens.len()];
    let mut claimed = vec![false; tokens.len()];

    let mut order: Vec<usize> = (0..spans.len()).collect();
    order.sort_by_key(|&i| std::cmp::Reverse(spans[i].len()));

    for &span_idx in &order {
        let span = &spans[span_idx];

        let members: Vec<usize> = tokens
            .iter()
            .enumerate()
            .filter(|(token_idx, token)| {
                !claimed[*token_idx]
                    && !token.is_empty()
                    && span.overlap(token.start, token.end) * 2 >= token.len()
            })
            .map(|(token_idx, _)| token_idx)
            .collect();

        if members.is_empty() {
            continue;
        }

        for (pos, &token_idx) in members.iter().enumerate() {
            claimed[token_idx] = true;
            tags[token_idx] = if pos == 0 {
                format!("B-{}", span.label)
            } else {
                format!("I-{}", span.label)
            };
        }

        if scheme == TaggingScheme::Bioes {
            if members.len() == 1 {
                tags[members[0]] = format!("S-{}", span.label);
            } else {
                let last = *members.last().expect("members checked non-empty");
                tags[last] = format!("E-{}", span.label);
            }
        }
    }

    tags
}

/// True when a token can close a sentence.
fn is_terminal(token: &Token) -> bool {
    token.text.ends_with(['.', '!', '?', '\u{3002}'])
}

/// Groups tokens into sentences by index.
///
/// A token ends a sentence when it ends with terminal punctuation and is
/// either the last token or followed by a token starting with an uppercase
/// character. Trailing tokens with no terminal form a final sentence, so
/// the result partitions all token indices.
pub fn group_sentences(tokens: &[Token]) -> Vec<Vec<usize>> {
    let mut sentences = Vec::new();
    let mut current = Vec::new();

    for (i, token) in tokens.iter().enumerate() {
        current.push(i);

        if !is_terminal(token) {
            continue;
        }

        let closes = match tokens.get(i + 1) {
            None => true,
            Some(next) => next
                .text
                .chars()
                .next()
                .map(char::is_uppercase)
                .unwrap_or(false),
        };

        if closes {
            sentences.push(std::mem::take(&mut current));
        }
    }

    if !current.is_empty() {
        sentences.push(current);
    }

    sentences
}
