use crate::types::Suggestion;
use crate::utils::text::{strip_code_fence, strip_fence_markers};
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;
use tracing::debug;

static TITLE_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)"title"\s*:\s*"((?:[^"\\]|\\.)*)""#).expect("title pattern is valid")
});

static BODY_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)"body"\s*:\s*"((?:[^"\\]|\\.)*)""#).expect("body pattern is valid")
});

// Greedy: runs to the last quote in the text, swallowing stray unescaped quotes.
static BODY_FIELD_LOOSE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)"body"\s*:\s*"(.*)""#).expect("loose body pattern is valid")
});

static BODY_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""?body"?\s*:"#).expect("body key pattern is valid"));

const DEFAULT_MAX_TITLE_CHARS: usize = 120;

/// Turns a free-form generation reply into a `{title, body}` suggestion.
///
/// Never fails: each strategy is tried in turn and the last one always
/// produces something, possibly the empty suggestion.
pub struct ResponseParser {
    max_title_chars: usize,
}

impl ResponseParser {
    pub fn new() -> Self {
        Self {
            max_title_chars: DEFAULT_MAX_TITLE_CHARS,
        }
    }

    pub fn with_max_title_chars(mut self, max_title_chars: usize) -> Self {
        self.max_title_chars = max_title_chars;
        self
    }

    pub fn parse(&self, raw: &str) -> Suggestion {
        debug!("Parsing generation reply ({} bytes)", raw.len());

        let payload = strip_code_fence(raw);

        if let Some(suggestion) = decode_strict(&payload) {
            debug!(strategy = "strict", "parsed generation reply");
            return suggestion;
        }

        if let Some(suggestion) = decode_strict(&sanitize_json_strings(&payload)) {
            debug!(strategy = "sanitized", "parsed generation reply");
            return suggestion;
        }

        if let Some(suggestion) = extract_fields(raw) {
            debug!(strategy = "field_extraction", "parsed generation reply");
            return suggestion;
        }

        debug!(strategy = "plain_text", "parsed generation reply");
        self.plain_text(raw)
    }

    fn plain_text(&self, raw: &str) -> Suggestion {
        let body = strip_fence_markers(raw);

        let title = body
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty() && !is_delimiter(line))
            .map(|line| {
                line.trim_start_matches('#')
                    .trim()
                    .trim_matches('*')
                    .trim()
                    .chars()
                    .take(self.max_title_chars)
                    .collect::<String>()
            })
            .unwrap_or_default();

        Suggestion::new(title, body)
    }
}

impl Default for ResponseParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Strict JSON decoding of the text, then of its outermost `{...}` slice.
fn decode_strict(text: &str) -> Option<Suggestion> {
    let trimmed = text.trim();
    if let Some(suggestion) = decode_object(trimmed) {
        return Some(suggestion);
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start || (start == 0 && end == trimmed.len() - 1) {
        return None;
    }
    decode_object(&trimmed[start..=end])
}

fn decode_object(text: &str) -> Option<Suggestion> {
    let value: Value = serde_json::from_str(text).ok()?;
    let object = value.as_object()?;

    let title = string_field(object, "title");
    let body = string_field(object, "body");
    if title.trim().is_empty() && body.trim().is_empty() {
        return None;
    }

    Some(Suggestion::new(title.trim(), body))
}

fn string_field(object: &Map<String, Value>, key: &str) -> String {
    object
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .and_then(|(_, v)| v.as_str())
        .unwrap_or_default()
        .to_string()
}

/// Escape raw newlines, carriage returns and tabs that appear inside JSON strings.
pub fn sanitize_json_strings(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escape_next = false;

    for ch in text.chars() {
        if escape_next {
            result.push(ch);
            escape_next = false;
            continue;
        }
        match ch {
            '\\' => {
                result.push(ch);
                escape_next = true;
            }
            '"' => {
                in_string = !in_string;
                result.push(ch);
            }
            '\n' if in_string => result.push_str("\\n"),
            '\r' if in_string => result.push_str("\\r"),
            '\t' if in_string => result.push_str("\\t"),
            _ => result.push(ch),
        }
    }

    result
}

/// Regex recovery of `title` and `body` from JSON-ish text that does not decode.
fn extract_fields(raw: &str) -> Option<Suggestion> {
    let title_match = TITLE_FIELD.captures(raw)?;
    let title = unescape(title_match.get(1).map(|m| m.as_str()).unwrap_or_default());
    let title_end = title_match.get(0).map(|m| m.end()).unwrap_or(raw.len());

    let mut body = BODY_FIELD
        .captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| unescape(m.as_str()))
        .unwrap_or_default();

    if body.trim().is_empty() {
        body = BODY_FIELD_LOOSE
            .captures(raw)
            .and_then(|c| c.get(1))
            .map(|m| unescape(m.as_str()))
            .unwrap_or_default();
    }

    if body.trim().is_empty() {
        body = unescape(&strip_artifacts(&raw[title_end..]));
    }

    Some(Suggestion::new(title.trim(), body))
}

/// Whatever trails the title, minus JSON punctuation and code fences.
fn strip_artifacts(text: &str) -> String {
    let without_fences = strip_fence_markers(text);
    let without_key = BODY_KEY.replace(&without_fences, "");
    without_key
        .trim()
        .trim_matches(|c: char| c == '"' || c == ',' || c == '{' || c == '}' || c.is_whitespace())
        .to_string()
}

/// Decode JSON string escapes; unknown escapes are kept verbatim.
fn unescape(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '\\' {
            result.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => result.push('\n'),
            Some('t') => result.push('\t'),
            Some('r') => result.push('\r'),
            Some('b') => result.push('\u{8}'),
            Some('f') => result.push('\u{c}'),
            Some('"') => result.push('"'),
            Some('\\') => result.push('\\'),
            Some('/') => result.push('/'),
            Some('u') => {
                let hex: String = (0..4).filter_map(|_| chars.next_if(|c| c.is_ascii_hexdigit())).collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(decoded) if hex.len() == 4 => result.push(decoded),
                    _ => {
                        result.push_str("\\u");
                        result.push_str(&hex);
                    }
                }
            }
            Some(other) => {
                result.push('\\');
                result.push(other);
            }
            None => result.push('\\'),
        }
    }

    result
}

fn is_delimiter(line: &str) -> bool {
    line.starts_with("```") || matches!(line, "{" | "}" | "[" | "]" | "---" | "***")
}
