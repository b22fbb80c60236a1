// SPDX-License-Identifier: MIT OR Apache-2.0
//! Prompt construction, completion, and the JSON answer branch.

use crate::error::LegacyExecutorError;
use docpipe_adapters::LlmAdapter;
use docpipe_core::json_repair::{repair_json, slice_from_first_bracket};
use serde_json::{Map, Value};

/// Stateless prompt helpers used by the answer loop.
pub struct AnswerPromptService;

impl AnswerPromptService {
    /// Assemble the final prompt sent to the LLM.
    ///
    /// Grammar entries `{word, synonyms[]}` expand to human-readable synonym
    /// notes between the instruction and the postamble.
    #[must_use]
    pub fn construct_prompt(
        preamble: &str,
        prompt: &str,
        postamble: &str,
        grammar_list: &[Value],
        context: &str,
        platform_postamble: &str,
        word_confidence_postamble: &str,
    ) -> String {
        let mut assembled = format!("{preamble}\n\nQuestion or Instruction: {prompt}");
        if !grammar_list.is_empty() {
            assembled.push('\n');
            for grammar in grammar_list {
                let word = grammar.get("word").and_then(Value::as_str).unwrap_or("");
                let synonyms: Vec<&str> = grammar
                    .get("synonyms")
                    .and_then(Value::as_array)
                    .map(|list| list.iter().filter_map(Value::as_str).collect())
                    .unwrap_or_default();
                if !word.is_empty() && !synonyms.is_empty() {
                    assembled.push_str(&format!(
                        "\nNote: You can consider that the word {word} is same as {} \
                         in both the question and the context.",
                        synonyms.join(", ")
                    ));
                }
            }
        }
        let mut trailer = String::new();
        for postscript in [platform_postamble, word_confidence_postamble] {
            if !postscript.is_empty() {
                trailer.push_str(postscript);
                trailer.push_str("\n\n");
            }
        }
        assembled.push_str(&format!(
            "\n\n{postamble}\n\nContext:\n---------------\n{context}\n\
             -----------------\n\n{trailer}Answer:"
        ));
        assembled
    }

    /// Run one completion and record highlight metadata under `prompt_key`.
    ///
    /// # Errors
    ///
    /// [`LegacyExecutorError::RateLimit`] and
    /// [`LegacyExecutorError::Completion`] for adapter failures.
    pub async fn run_completion(
        llm: &dyn LlmAdapter,
        prompt: &str,
        metadata: Option<&mut Map<String, Value>>,
        prompt_key: Option<&str>,
    ) -> Result<String, LegacyExecutorError> {
        let completion = llm.complete(prompt).await.map_err(|err| match err {
            docpipe_adapters::AdapterError::RateLimited { .. } => {
                LegacyExecutorError::RateLimit(err.to_string())
            }
            other => LegacyExecutorError::Completion(other.to_string()),
        })?;

        if let (Some(metadata), Some(prompt_key)) = (metadata, prompt_key) {
            if let Some(highlight) = completion.highlight_data.clone() {
                nested_insert(metadata, "highlight_data", prompt_key, highlight);
            }
            if let Some(line_numbers) = completion.line_numbers.clone() {
                nested_insert(metadata, "line_numbers", prompt_key, line_numbers);
            }
            if let Some(confidence) = completion.confidence_data.clone() {
                nested_insert(metadata, "confidence_data", prompt_key, confidence);
            }
            if let Some(whisper_hash) = completion.whisper_hash.clone() {
                metadata.insert("whisper_hash".into(), Value::String(whisper_hash));
            }
        }
        Ok(completion.text)
    }

    /// Resolve `%name%` back-references against earlier prompts' outputs.
    ///
    /// # Errors
    ///
    /// [`LegacyExecutorError::VariableNotFound`] when a referenced variable
    /// has not been produced yet.
    pub fn extract_variable(
        structured_output: &Map<String, Value>,
        variable_names: &[String],
        promptx: &str,
    ) -> Result<String, LegacyExecutorError> {
        let mut resolved = promptx.to_string();
        for variable_name in variable_names {
            let marker = format!("%{variable_name}%");
            if !resolved.contains(&marker) {
                continue;
            }
            let value = structured_output
                .get(variable_name)
                .ok_or_else(|| LegacyExecutorError::VariableNotFound(variable_name.clone()))?;
            let rendered = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            resolved = resolved.replace(&marker, &rendered);
        }
        if resolved != promptx {
            tracing::info!("Prompt after variable replacement: {resolved}");
        }
        Ok(resolved)
    }

    /// The JSON branch of the type-coercion table.
    ///
    /// `"NA"` and `"[]"` become null; otherwise the answer is sliced from
    /// its first bracket and parsed, with a repair pass as second chance.
    /// Unparseable answers store an empty object.
    pub fn handle_json(
        answer: &str,
        structured_output: &mut Map<String, Value>,
        prompt_key: &str,
    ) {
        if answer.trim().eq_ignore_ascii_case("na") || answer.trim() == "[]" {
            structured_output.insert(prompt_key.to_string(), Value::Null);
            return;
        }
        let candidate = slice_from_first_bracket(answer);
        let parsed = serde_json::from_str::<Value>(candidate)
            .ok()
            .or_else(|| repair_json(candidate));
        match parsed {
            Some(value) => {
                structured_output.insert(prompt_key.to_string(), value);
            }
            None => {
                tracing::error!(
                    "Error parsing response (to json)\nCandidate JSON: {candidate}"
                );
                structured_output.insert(prompt_key.to_string(), Value::Object(Map::new()));
            }
        }
    }

}

fn nested_insert(metadata: &mut Map<String, Value>, section: &str, key: &str, value: Value) {
    if let Some(section_map) = metadata
        .entry(section.to_string())
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()
    {
        section_map.insert(key.to_string(), value);
    }
}
