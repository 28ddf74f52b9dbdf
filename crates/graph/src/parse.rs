//! Parsing of model output.
//!
//! Models wrap JSON in code fences, answer with bare words, or return lists
//! where an object was asked for. Every parser here accepts those shapes and
//! returns `None` (or an empty string) instead of failing.

use ragchat_knowledge::Document;
use serde_json::Value;
use std::collections::BTreeSet;

/// Remove a surrounding Markdown code fence (```` ```json ... ``` ````).
pub fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed.to_string();
    };
    // drop the info string (e.g. `json`) on the opening line
    let body = match rest.find('\n') {
        Some(pos) => &rest[pos + 1..],
        None => rest.trim_start_matches(|c: char| c.is_ascii_alphabetic()),
    };
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
        .to_string()
}

/// Normalize a string to a two-letter ISO 639-1 code, or `""`.
///
/// `"DE"` → `"de"`, `"en-US"` → `"en"`, `"not-a-code"` → `""`.
pub fn normalize_language_str(value: &str) -> String {
    let lowered = value.trim().to_lowercase();
    let primary = lowered.split(|c: char| c == '-' || c == '_').next().unwrap_or_default();
    if primary.len() == 2 && primary.chars().all(|c| c.is_ascii_alphabetic()) {
        primary.to_string()
    } else {
        String::new()
    }
}

/// Normalize a parsed JSON value to a language code, or `""`.
///
/// Lists yield their first element, objects their `language` field; numbers,
/// booleans and null yield `""`.
pub fn normalize_language(value: &Value) -> String {
    match value {
        Value::String(s) => normalize_language_str(s),
        Value::Array(items) => items.first().map(normalize_language).unwrap_or_default(),
        Value::Object(map) => map.get("language").map(normalize_language).unwrap_or_default(),
        _ => String::new(),
    }
}

/// Extract the language code from a detector reply.
pub fn extract_language(raw: &str) -> Option<String> {
    let cleaned = strip_code_fences(raw);

    if let Ok(value) = serde_json::from_str::<Value>(&cleaned) {
        let code = normalize_language(&value);
        return (!code.is_empty()).then_some(code);
    }

    // `language: de`, `'language': 'de'`, `{language = "de"}`
    if let Some(value) = loose_field(&cleaned, "language") {
        let code = normalize_language_str(&value);
        if !code.is_empty() {
            return Some(code);
        }
    }

    let bare = cleaned.trim_matches(|c: char| !c.is_alphanumeric());
    let code = normalize_language_str(bare);
    (!code.is_empty()).then_some(code)
}

/// Parse a boolean verdict stored under `field` (e.g. `{"harmful": false}`).
pub fn parse_verdict(raw: &str, field: &str) -> Option<bool> {
    let cleaned = strip_code_fences(raw);

    if let Ok(value) = serde_json::from_str::<Value>(&cleaned) {
        return verdict_from_value(&value, field);
    }

    if let Some(value) = loose_field(&cleaned, field) {
        return parse_bool_word(&value);
    }

    parse_bool_word(cleaned.trim_matches(|c: char| !c.is_alphanumeric()))
}

fn verdict_from_value(value: &Value, field: &str) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => parse_bool_word(s),
        Value::Array(items) => items.first().and_then(|v| verdict_from_value(v, field)),
        Value::Object(map) => map.get(field).and_then(|v| verdict_from_value(v, field)),
        _ => None,
    }
}

fn parse_bool_word(word: &str) -> Option<bool> {
    match word.trim().to_lowercase().as_str() {
        "true" | "yes" => Some(true),
        "false" | "no" => Some(false),
        _ => None,
    }
}

const QUOTES_AND_BLANKS: &[char] = &['"', '\'', ' ', '\t'];

/// The token following `field` and a `:`/`=` separator, quotes removed.
///
/// `field` must start a word: `unhelpful: true` carries no `helpful` value.
fn loose_field(text: &str, field: &str) -> Option<String> {
    let lowered = text.to_lowercase();
    let field = field.to_lowercase();
    lowered
        .match_indices(&field)
        .filter(|(pos, _)| {
            lowered[..*pos]
                .chars()
                .next_back()
                .map_or(true, |c| !c.is_alphanumeric() && c != '_')
        })
        .find_map(|(pos, _)| field_value(&lowered[pos + field.len()..]))
}

fn field_value(rest: &str) -> Option<String> {
    let rest = rest.trim_start_matches(QUOTES_AND_BLANKS);
    let rest = rest
        .strip_prefix(':')
        .or_else(|| rest.strip_prefix('='))?
        .trim_start_matches(QUOTES_AND_BLANKS);
    let value: String = rest
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '-' || *c == '_')
        .collect();
    (!value.is_empty()).then_some(value)
}

/// Parse a structured generation reply (`{"answer": ..., "citations": [...]}`).
///
/// Citations may be 1-based document numbers, numeric strings or document
/// ids; anything not naming one of `documents` is dropped.
pub fn parse_generated_answer_strict(
    raw: &str,
    documents: &[Document],
) -> Option<(String, BTreeSet<String>)> {
    let value: Value = serde_json::from_str(&strip_code_fences(raw)).ok()?;
    let object = match &value {
        Value::Array(items) => items.first()?.as_object()?,
        other => other.as_object()?,
    };
    let answer = object.get("answer")?.as_str()?.trim().to_string();

    let citations = object
        .get("citations")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| resolve_citation(item, documents))
                .collect()
        })
        .unwrap_or_default();

    Some((answer, citations))
}

/// Like [`parse_generated_answer_strict`], but unstructured replies become
/// the answer text with no citations.
pub fn parse_generated_answer(raw: &str, documents: &[Document]) -> (String, BTreeSet<String>) {
    parse_generated_answer_strict(raw, documents)
        .unwrap_or_else(|| (strip_code_fences(raw), BTreeSet::new()))
}

fn resolve_citation(item: &Value, documents: &[Document]) -> Option<String> {
    let by_number = |n: u64| {
        let index = usize::try_from(n).ok()?.checked_sub(1)?;
        documents.get(index).map(|d| d.id.clone())
    };
    match item {
        Value::Number(n) => by_number(n.as_u64()?),
        Value::String(s) => match s.trim().trim_start_matches('[').trim_end_matches(']').parse::<u64>() {
            Ok(n) => by_number(n),
            Err(_) => documents.iter().find(|d| d.id == *s).map(|d| d.id.clone()),
        },
        _ => None,
    }
}
