//! Extraction of JSON objects from model-generated text
//!
//! Model output is untrusted. Callers try [`strict_object`] first, then
//! [`scan_objects_with_key`], then fall back to their own default; nothing
//! here attempts repair beyond that.

use serde_json::{Map, Value};

/// Remove a surrounding Markdown code fence (```` ```json ... ``` ````), if any
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(after_open) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (`json`, `JSON`, ...) on the opening line
    let body = match after_open.find('\n') {
        Some(newline) => after_open.get(newline + 1..).unwrap_or(""),
        None => after_open.trim_start_matches(|c: char| c.is_ascii_alphabetic()),
    };
    let body = body.trim_end();
    body.strip_suffix("```").unwrap_or(body).trim()
}

/// Whole text (fences stripped) parsed as a single JSON object
pub fn strict_object(text: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(strip_code_fences(text)) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Every bracket-balanced JSON object in `text` that has `key` at its top
/// level, smallest first
pub fn scan_objects_with_key(text: &str, key: &str) -> Vec<Map<String, Value>> {
    let bytes = text.as_bytes();
    let mut found: Vec<(usize, Map<String, Value>)> = Vec::new();

    for (start, _) in bytes.iter().enumerate().filter(|(_, b)| **b == b'{') {
        let Some(end) = matching_brace(bytes, start) else {
            continue;
        };
        let Some(candidate) = text.get(start..=end) else {
            continue;
        };
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(candidate) {
            if map.contains_key(key) {
                found.push((end - start, map));
            }
        }
    }

    found.sort_by_key(|(len, _)| *len);
    found.into_iter().map(|(_, map)| map).collect()
}

/// Index of the `}` closing the `{` at `start`, honouring JSON strings.
///
/// Braces, quotes and backslashes are ASCII, so byte scanning never splits a
/// UTF-8 sequence.
fn matching_brace(bytes: &[u8], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &byte) in bytes.get(start..)?.iter().enumerate() {
        if in_string {
            match byte {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(start + offset);
                }
            }
            _ => {}
        }
    }
    None
}

/// String form of a JSON value; strings are returned without quotes
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
