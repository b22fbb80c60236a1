// SPDX-License-Identifier: MIT OR Apache-2.0
//! Second-chance JSON recovery for LLM answers.
//!
//! Models emit JSON wrapped in prose, truncated mid-object, or with a
//! trailing comma. The helpers here recover the common shapes; anything
//! worse stays unparsed and the caller decides what to store.

use serde_json::Value;

/// Trim leading prose before the first `{` or `[`.
#[must_use]
pub fn slice_from_first_bracket(text: &str) -> &str {
    let brace = text.find('{');
    let bracket = text.find('[');
    match (brace, bracket) {
        (Some(a), Some(b)) => &text[a.min(b)..],
        (Some(a), None) => &text[a..],
        (None, Some(b)) => &text[b..],
        (None, None) => text,
    }
}

/// Close unbalanced brackets and strings and drop a trailing comma, then
/// try parsing again.
#[must_use]
pub fn repair_json(candidate: &str) -> Option<Value> {
    let mut trimmed = candidate.trim().trim_end_matches(',').to_string();

    let mut stack = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    for ch in trimmed.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => stack.push('}'),
            '[' if !in_string => stack.push(']'),
            '}' | ']' if !in_string => {
                stack.pop();
            }
            _ => {}
        }
    }
    if in_string {
        trimmed.push('"');
    }
    while let Some(closer) = stack.pop() {
        trimmed.push(closer);
    }
    serde_json::from_str(&trimmed).ok()
}

/// Parse `candidate` as a JSON object, repairing if needed.
///
/// Used by the smart-table shortcut: a prompt that *is* a JSON schema means
/// extraction and indexing can be skipped entirely.
#[must_use]
pub fn parse_object_lenient(candidate: &str) -> Option<serde_json::Map<String, Value>> {
    let sliced = slice_from_first_bracket(candidate);
    let parsed = serde_json::from_str::<Value>(sliced)
        .ok()
        .or_else(|| repair_json(sliced))?;
    match parsed {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn slice_finds_earliest_bracket() {
        assert_eq!(
            slice_from_first_bracket("text [1, 2] {\"a\": 1}"),
            "[1, 2] {\"a\": 1}"
        );
        assert_eq!(slice_from_first_bracket("no json"), "no json");
    }

    #[test]
    fn repairs_truncated_objects() {
        assert_eq!(
            repair_json("{\"a\": {\"b\": 1}").unwrap(),
            json!({"a": {"b": 1}})
        );
        assert_eq!(repair_json("[1, 2,").unwrap(), json!([1, 2]));
    }

    #[test]
    fn repairs_unterminated_strings() {
        assert_eq!(
            repair_json("{\"a\": \"oops").unwrap(),
            json!({"a": "oops"})
        );
    }

    #[test]
    fn hopeless_input_stays_unparsed() {
        assert!(repair_json("{: nope ::").is_none());
    }

    #[test]
    fn lenient_object_parse_requires_an_object() {
        assert!(parse_object_lenient("{\"col1\": \"string\"}").is_some());
        assert!(parse_object_lenient("schema: {\"col1\": \"string\"}").is_some());
        assert!(parse_object_lenient("[1, 2]").is_none());
        assert!(parse_object_lenient("Extract the revenue").is_none());
    }
}
