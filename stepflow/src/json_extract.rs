//! Extracts the first structured value (array or object) from noisy LLM output.
//!
//! Fallback tiers, first success wins:
//! 1. strip wrapping (BOM, code fences, a leading `json` tag) and parse the whole text;
//! 2. locate the first `[` or `{` and scan to its balanced partner (string and escape aware);
//! 3. drop trailing commas inside the candidate;
//! 4. close a truncated candidate (open string, open brackets), backing off to the last
//!    complete element when that is not enough;
//! 5. give up with `None`.

use serde_json::{Map, Value};

/// Most back-off attempts when repairing a truncated value.
const MAX_BACKOFF_ATTEMPTS: usize = 64;

/// Returns the first JSON array or object found in `text`, or `None`.
pub fn extract_first_value(text: &str) -> Option<Value> {
    let cleaned = strip_wrapping(text);
    if cleaned.is_empty() {
        return None;
    }
    if let Ok(v) = serde_json::from_str::<Value>(cleaned) {
        if v.is_array() || v.is_object() {
            return Some(v);
        }
    }

    let start = cleaned.find(|c: char| c == '[' || c == '{')?;
    let candidate = &cleaned[start..];
    match balanced_end(candidate) {
        Some(end) => parse_lenient(&candidate[..end]),
        None => repair_truncated(candidate),
    }
}

/// Like [`extract_first_value`] but only returns arrays; an object wrapping a list of
/// items (e.g. `{"steps": [...]}`) yields that list, see [`wrapped_array`].
pub fn extract_first_array(text: &str) -> Option<Vec<Value>> {
    match extract_first_value(text)? {
        Value::Array(items) => Some(items),
        Value::Object(map) => wrapped_array(&map).cloned(),
        _ => None,
    }
}

/// The list an object wraps: its `steps` or `plan` array, else its only array field when
/// that array holds nothing but objects.
pub fn wrapped_array(map: &Map<String, Value>) -> Option<&Vec<Value>> {
    for key in ["steps", "plan"] {
        if let Some(Value::Array(items)) = map.get(key) {
            return Some(items);
        }
    }
    let mut arrays = map.values().filter_map(Value::as_array);
    let only = arrays.next()?;
    if arrays.next().is_some() || only.is_empty() || !only.iter().all(Value::is_object) {
        return None;
    }
    Some(only)
}

fn strip_wrapping(text: &str) -> &str {
    let mut s = text.trim_start_matches('\u{feff}').trim();
    if let Some(rest) = s.strip_prefix("```") {
        // Drop the fence line, including any language tag.
        s = match rest.find('\n') {
            Some(nl) => &rest[nl + 1..],
            None => rest.trim_start_matches(|c: char| c.is_ascii_alphabetic()),
        };
        if let Some(close) = s.rfind("```") {
            s = &s[..close];
        }
        s = s.trim();
    }
    if let (Some(tag), Some(rest)) = (s.get(..4), s.get(4..)) {
        if tag.eq_ignore_ascii_case("json") && rest.starts_with(|c: char| c.is_whitespace() || c == ':') {
            s = rest.trim_start_matches(|c: char| c.is_whitespace() || c == ':');
        }
    }
    s
}

/// Byte index just past the bracket that closes the one at position 0.
fn balanced_end(s: &str) -> Option<usize> {
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '[' => stack.push(']'),
            '{' => stack.push('}'),
            ']' | '}' => {
                if stack.pop() != Some(c) {
                    return None;
                }
                if stack.is_empty() {
                    return Some(i + c.len_utf8());
                }
            }
            _ => {}
        }
    }
    None
}

fn parse_lenient(candidate: &str) -> Option<Value> {
    if let Ok(v) = serde_json::from_str::<Value>(candidate) {
        return Some(v);
    }
    serde_json::from_str::<Value>(&remove_trailing_commas(candidate)).ok()
}

/// Removes commas directly followed (modulo whitespace) by `]` or `}`, outside strings.
fn remove_trailing_commas(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::with_capacity(s.len());
    let mut in_string = false;
    let mut escaped = false;
    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            out.push(c);
            continue;
        }
        if c == '"' {
            in_string = true;
        }
        if c == ',' {
            let next = chars[i + 1..].iter().find(|c| !c.is_whitespace());
            if matches!(next, Some(']') | Some('}')) {
                continue;
            }
        }
        out.push(c);
    }
    out
}

/// Appends whatever closes an unterminated value: a quote for an open string, `null` for a
/// dangling key, then the missing brackets.
fn close_open(s: &str) -> String {
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    for c in s.chars() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '[' => stack.push(']'),
            '{' => stack.push('}'),
            ']' | '}' => {
                stack.pop();
            }
            _ => {}
        }
    }
    let mut out = s.to_string();
    if in_string {
        if escaped {
            out.pop();
        }
        out.push('"');
    }
    let trimmed_len = out.trim_end().len();
    out.truncate(trimmed_len);
    if out.ends_with(':') {
        out.push_str("null");
    }
    while out.ends_with(',') {
        out.pop();
    }
    while let Some(closer) = stack.pop() {
        out.push(closer);
    }
    out
}

fn repair_truncated(candidate: &str) -> Option<Value> {
    if let Some(v) = parse_lenient(&close_open(candidate)) {
        return Some(v);
    }
    // Back off to the last complete element and close from there.
    let cut_points: Vec<usize> = candidate
        .char_indices()
        .filter(|(_, c)| matches!(c, '}' | ']' | ','))
        .map(|(i, _)| i)
        .collect();
    for &i in cut_points.iter().rev().take(MAX_BACKOFF_ATTEMPTS) {
        let head = &candidate[..=i];
        if let Some(v) = parse_lenient(&close_open(head)) {
            return Some(v);
        }
    }
    None
}
