// SPDX-License-Identifier: MIT OR Apache-2.0
//! Profile overrides, the smart-table shortcut, and metric merging.

use docpipe_core::json_repair::parse_object_lenient;
use serde_json::{Map, Value};

/// `(profile field, tool-settings / output field)` pairs an LLM profile can
/// override.
const PROFILE_FIELD_MAP: [(&str, &str); 8] = [
    ("chunk_size", "chunk_size"),
    ("chunk_overlap", "chunk_overlap"),
    ("embedding_model_id", "embedding"),
    ("llm_id", "llm"),
    ("similarity_top_k", "similarity_top_k"),
    ("vector_store_id", "vector_db"),
    ("x2text_id", "x2text_adapter"),
    ("retrieval_strategy", "retrieval_strategy"),
];

/// Overlay an LLM profile on `tool_settings` and every output entry.
///
/// Returns a change log (`section.field: old -> new`) for telemetry.
pub fn apply_profile_overrides(tool_metadata: &mut Map<String, Value>, profile: &Value) -> Vec<String> {
    let mut changes = Vec::new();
    let Some(profile) = profile.as_object() else {
        return changes;
    };

    if let Some(tool_settings) = tool_metadata
        .get_mut("tool_settings")
        .and_then(Value::as_object_mut)
    {
        apply_to_section(tool_settings, profile, "tool_settings", &mut changes);
    }

    if let Some(outputs) = tool_metadata.get_mut("outputs").and_then(Value::as_array_mut) {
        for (index, output) in outputs.iter_mut().enumerate() {
            let label = output
                .get("name")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("output_{index}"));
            if let Some(output) = output.as_object_mut() {
                apply_to_section(output, profile, &format!("output[{label}]"), &mut changes);
            }
        }
    }
    changes
}

fn apply_to_section(
    section: &mut Map<String, Value>,
    profile: &Map<String, Value>,
    section_label: &str,
    changes: &mut Vec<String>,
) {
    for (profile_key, section_key) in PROFILE_FIELD_MAP {
        let Some(new_value) = profile.get(profile_key) else {
            continue;
        };
        // Only fields the section already carries are overridden.
        let Some(old_value) = section.get(section_key) else {
            continue;
        };
        if old_value != new_value {
            changes.push(format!(
                "{section_label}.{section_key}: {old_value} -> {new_value}"
            ));
            section.insert(section_key.to_string(), new_value.clone());
        }
    }
}

/// Whether extraction and indexing can be skipped: some output carries
/// `table_settings` and its prompt parses as a JSON object (a table schema
/// rather than a question).
#[must_use]
pub fn should_skip_for_smart_table(outputs: &[Value]) -> bool {
    outputs.iter().any(|output| {
        output.get("table_settings").is_some()
            && output
                .get("prompt")
                .and_then(Value::as_str)
                .and_then(parse_object_lenient)
                .is_some()
    })
}

/// Merge two metrics maps; entries present in both merge shallowly, with
/// the first map winning on key conflicts.
#[must_use]
pub fn merge_metrics(first: &Map<String, Value>, second: &Map<String, Value>) -> Map<String, Value> {
    let mut merged = Map::new();
    let keys: Vec<&String> = first.keys().chain(second.keys()).collect();
    for key in keys {
        if merged.contains_key(key) {
            continue;
        }
        let value = match (first.get(key), second.get(key)) {
            (Some(Value::Object(a)), Some(Value::Object(b))) => {
                let mut combined = b.clone();
                for (k, v) in a {
                    combined.insert(k.clone(), v.clone());
                }
                Value::Object(combined)
            }
            (Some(a), _) => a.clone(),
            (None, Some(b)) => b.clone(),
            (None, None) => continue,
        };
        merged.insert(key.clone(), value);
    }
    merged
}
