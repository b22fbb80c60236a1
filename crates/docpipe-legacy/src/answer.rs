// SPDX-License-Identifier: MIT OR Apache-2.0
//! The `answer_prompt` operation: the per-prompt retrieval and answering
//! loop.
//!
//! Prompts run sequentially in payload order; each prompt's output is
//! visible to later prompts through `%name%` back-references. Every
//! vector-DB handle opened for a prompt is closed before that prompt's
//! metrics are finalized, on success and failure alike.

use crate::error::LegacyExecutorError;
use crate::indexing::{IndexKeyInputs, generate_index_key};
use crate::params::Params;
use crate::prompt::AnswerPromptService;
use crate::retrieval::{DEFAULT_TOP_K, RetrievalService, RetrievalStrategy};
use crate::variables::VariableReplacementService;
use docpipe_adapters::{LlmAdapter, UsageReason, VectorDbAdapter};
use docpipe_core::{ExecutionContext, ExecutionResult, ExecutionSource};
use docpipe_executor::{ExecutorEnv, ExecutorToolShim};
use docpipe_storage::LocalFileStore;
use serde_json::{Map, Value, json};
use std::path::Path;

pub(crate) async fn handle_answer_prompt(
    context: &ExecutionContext,
    env: &ExecutorEnv,
) -> Result<ExecutionResult, LegacyExecutorError> {
    let params = Params(&context.executor_params);

    let tool_settings = params.object("tool_settings");
    let outputs = params.array("outputs").to_vec();
    let tool_id = params.string_or_empty("tool_id");
    let file_hash = params.str("file_hash").map(str::to_string);
    let file_path = params.string_or_empty("file_path");
    let file_name = params.string_or_empty("file_name");
    let custom_data = params.object("custom_data");
    let platform_api_key = params.string_or_empty("platform_api_key");

    let source_name = params
        .str("execution_source")
        .unwrap_or(&context.execution_source);
    let source: ExecutionSource = match source_name.parse() {
        Ok(source) => source,
        Err(err) => return Ok(ExecutionResult::failure(err.to_string())),
    };
    let store = env.storage.open(source);

    let mut structured_output: Map<String, Value> = Map::new();
    let mut metadata: Map<String, Value> = Map::new();
    metadata.insert("run_id".into(), json!(context.run_id));
    metadata.insert("file_name".into(), json!(file_name));
    metadata.insert("context".into(), json!({}));
    metadata.insert("required_fields".into(), json!({}));
    let mut metrics: Map<String, Value> = Map::new();
    let mut retrieval_metrics: Map<String, Value> = Map::new();

    // First pass: collect variable names and required-field markers.
    let variable_names: Vec<String> = outputs
        .iter()
        .filter_map(|output| output.get("name").and_then(Value::as_str))
        .map(str::to_string)
        .collect();
    if let Some(required_fields) = metadata
        .get_mut("required_fields")
        .and_then(Value::as_object_mut)
    {
        for output in &outputs {
            if let Some(name) = output.get("name").and_then(Value::as_str) {
                required_fields.insert(
                    name.to_string(),
                    output.get("required").cloned().unwrap_or(Value::Null),
                );
            }
        }
    }

    for output in &outputs {
        let spec = output
            .as_object()
            .ok_or_else(|| LegacyExecutorError::Payload("prompt spec must be an object".into()))?;
        let prompt_name = require_str(spec, "name")?;
        let prompt_text = require_str(spec, "prompt")?;
        let chunk_size = spec
            .get("chunk_size")
            .and_then(Value::as_u64)
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| {
                LegacyExecutorError::Payload(format!(
                    "prompt '{prompt_name}' is missing 'chunk_size'"
                ))
            })?;
        let chunk_overlap = spec
            .get("chunk_overlap")
            .and_then(Value::as_u64)
            .and_then(|v| u32::try_from(v).ok())
            .unwrap_or(0);

        tracing::info!("[{tool_id}] chunk size: {chunk_size}");
        let shim = ExecutorToolShim::new(&platform_api_key);

        // {{variable}} template replacement.
        let mut prompt_text = prompt_text.to_string();
        if VariableReplacementService::is_variables_present(&prompt_text) {
            prompt_text = VariableReplacementService::replace_variables_in_prompt(
                &prompt_text,
                &structured_output,
                &custom_data,
            )?;
        }

        tracing::info!("[{tool_id}] Executing prompt: '{prompt_name}'");

        // %variable% back-references.
        let promptx =
            AnswerPromptService::extract_variable(&structured_output, &variable_names, &prompt_text)?;

        let llm_id = require_str(spec, "llm")?;
        let embedding_id = require_str(spec, "embedding")?;
        let vector_db_id = require_str(spec, "vector_db")?;
        let x2text_id = require_str(spec, "x2text_adapter")?;

        // Doc-id regeneration with this prompt's adapter and chunking
        // identifiers — same formula the index operation uses.
        let doc_id = generate_index_key(
            IndexKeyInputs {
                vector_db: vector_db_id,
                embedding: embedding_id,
                x2text: x2text_id,
                chunk_size,
                chunk_overlap,
            },
            Path::new(&file_path),
            file_hash.as_deref(),
            &store,
        )
        .await?;

        let llm = env
            .adapters
            .llm(llm_id, &shim, UsageReason::Extraction)
            .map_err(|e| LegacyExecutorError::AdapterFetch(e.to_string()))?;
        let vector_db = if chunk_size > 0 {
            let embedding = env
                .adapters
                .embedding(embedding_id, &shim)
                .map_err(|e| LegacyExecutorError::AdapterFetch(e.to_string()))?;
            Some(
                env.adapters
                    .vector_db(vector_db_id, embedding, &shim)
                    .map_err(|e| LegacyExecutorError::AdapterFetch(e.to_string()))?,
            )
        } else {
            None
        };

        let run = PromptRun {
            spec,
            prompt_name,
            promptx: &promptx,
            chunk_size,
            doc_id: &doc_id,
            tool_settings: &tool_settings,
            file_path: &file_path,
            store: &store,
            llm: llm.as_ref(),
            vector_db: vector_db.as_deref(),
        };
        let prompt_outcome = run
            .process(&mut structured_output, &mut metadata, &mut retrieval_metrics)
            .await;

        // Metrics and handle release happen on every path.
        let mut prompt_metrics = Map::new();
        prompt_metrics.insert(
            "context_retrieval".into(),
            retrieval_metrics
                .get(prompt_name)
                .cloned()
                .unwrap_or_else(|| json!({})),
        );
        prompt_metrics.insert(
            format!("{}_llm", llm.usage_reason()),
            serde_json::to_value(llm.metrics()).unwrap_or(Value::Null),
        );
        metrics.insert(prompt_name.to_string(), Value::Object(prompt_metrics));
        if let Some(db) = &vector_db {
            db.close().await;
        }
        prompt_outcome?;
    }

    let mut output_value = Value::Object(structured_output);
    sanitize_null_values(&mut output_value);

    let mut data = Map::new();
    data.insert("output".into(), output_value);
    data.insert("metadata".into(), Value::Object(metadata));
    data.insert("metrics".into(), Value::Object(metrics));
    Ok(ExecutionResult::ok(data))
}

fn require_str<'a>(
    spec: &'a Map<String, Value>,
    key: &str,
) -> Result<&'a str, LegacyExecutorError> {
    spec.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| LegacyExecutorError::Payload(format!("prompt spec is missing '{key}'")))
}

struct PromptRun<'a> {
    spec: &'a Map<String, Value>,
    prompt_name: &'a str,
    promptx: &'a str,
    chunk_size: u32,
    doc_id: &'a str,
    tool_settings: &'a Map<String, Value>,
    file_path: &'a str,
    store: &'a LocalFileStore,
    llm: &'a dyn LlmAdapter,
    vector_db: Option<&'a dyn VectorDbAdapter>,
}

impl PromptRun<'_> {
    async fn process(
        &self,
        structured_output: &mut Map<String, Value>,
        metadata: &mut Map<String, Value>,
        retrieval_metrics: &mut Map<String, Value>,
    ) -> Result<(), LegacyExecutorError> {
        let output_type = self
            .spec
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("text");

        // TABLE and LINE_ITEM need extraction plugins that are not bundled.
        if output_type == "table" {
            return Err(LegacyExecutorError::PluginMissing(
                "TABLE extraction requires plugins not yet available in the executor worker."
                    .into(),
            ));
        }
        if output_type == "line-item" {
            return Err(LegacyExecutorError::PluginMissing(
                "LINE_ITEM extraction requires plugins not yet available in the executor worker."
                    .into(),
            ));
        }

        let mut answer = "NA".to_string();
        let strategy_name = self
            .spec
            .get("retrieval_strategy")
            .and_then(Value::as_str)
            .unwrap_or("");

        if let Ok(strategy) = strategy_name.parse::<RetrievalStrategy>() {
            tracing::info!("Performing retrieval for: {}", self.file_path);
            let context_list = if self.chunk_size == 0 {
                RetrievalService::retrieve_complete_context(
                    self.store,
                    Path::new(self.file_path),
                    retrieval_metrics,
                    self.prompt_name,
                )
                .await?
            } else {
                let top_k = self
                    .spec
                    .get("similarity_top_k")
                    .and_then(Value::as_u64)
                    .map(|v| v as usize)
                    .unwrap_or(DEFAULT_TOP_K);
                let vector_db = self.vector_db.ok_or_else(|| {
                    LegacyExecutorError::Payload(
                        "chunked retrieval requires a vector DB".into(),
                    )
                })?;
                RetrievalService::run_retrieval(
                    self.promptx,
                    self.doc_id,
                    self.llm,
                    vector_db,
                    strategy,
                    top_k,
                    retrieval_metrics,
                    self.prompt_name,
                )
                .await?
            };

            if let Some(context_map) = metadata.get_mut("context").and_then(Value::as_object_mut)
            {
                context_map.insert(self.prompt_name.to_string(), json!(context_list));
            }

            let settings = Params(self.tool_settings);
            let enable_highlight = settings.bool_or("enable_highlight", false);
            let enable_word_confidence = settings.bool_or("enable_word_confidence", false);
            let summarize_as_source = settings.bool_or("summarize_as_source", false);
            let platform_postamble = if enable_highlight && !summarize_as_source {
                settings.string_or_empty("platform_postamble")
            } else {
                String::new()
            };
            let word_confidence_postamble = if enable_word_confidence {
                settings.string_or_empty("word_confidence_postamble")
            } else {
                String::new()
            };

            let full_prompt = AnswerPromptService::construct_prompt(
                &settings.string_or_empty("preamble"),
                self.promptx,
                &settings.string_or_empty("postamble"),
                settings.array("grammar"),
                &context_list.join("\n"),
                &platform_postamble,
                &word_confidence_postamble,
            );
            answer = AnswerPromptService::run_completion(
                self.llm,
                &full_prompt,
                Some(metadata),
                Some(self.prompt_name),
            )
            .await?;
        } else {
            tracing::info!("Invalid retrieval strategy: {strategy_name}");
        }

        self.apply_type_conversion(output_type, &answer, structured_output)
            .await?;

        // Strip trailing newlines from string answers.
        if let Some(Value::String(current)) = structured_output.get(self.prompt_name) {
            let trimmed = current.trim_end_matches('\n');
            if trimmed.len() != current.len() {
                let trimmed = trimmed.to_string();
                structured_output.insert(self.prompt_name.to_string(), Value::String(trimmed));
            }
        }
        Ok(())
    }

    async fn apply_type_conversion(
        &self,
        output_type: &str,
        answer: &str,
        structured_output: &mut Map<String, Value>,
    ) -> Result<(), LegacyExecutorError> {
        let key = self.prompt_name.to_string();
        match output_type {
            "number" => {
                if answer.eq_ignore_ascii_case("na") {
                    structured_output.insert(key, Value::Null);
                    return Ok(());
                }
                let prompt = format!(
                    "Extract the number from the following text:\n{answer}\n\n\
                     Output just the number. If the number is expressed in millions \
                     or thousands, expand the number to its numeric value. \
                     The number should be directly assignable to a numeric variable. \
                     It should not have any commas, percentages or other grouping \
                     characters. No explanation is required. \
                     If you cannot extract the number, output 0."
                );
                let extracted =
                    AnswerPromptService::run_completion(self.llm, &prompt, None, None).await?;
                let parsed = extracted
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .and_then(|n| serde_json::Number::from_f64(n))
                    .map(Value::Number)
                    .unwrap_or(Value::Null);
                structured_output.insert(key, parsed);
            }
            "email" => {
                if answer.eq_ignore_ascii_case("na") {
                    structured_output.insert(key, Value::Null);
                    return Ok(());
                }
                let prompt = format!(
                    "Extract the email from the following text:\n{answer}\n\n\
                     Output just the email. The email should be directly assignable \
                     to a string variable. No explanation is required. \
                     If you cannot extract the email, output \"NA\"."
                );
                let extracted =
                    AnswerPromptService::run_completion(self.llm, &prompt, None, None).await?;
                structured_output.insert(key, Value::String(extracted));
            }
            "date" => {
                if answer.eq_ignore_ascii_case("na") {
                    structured_output.insert(key, Value::Null);
                    return Ok(());
                }
                let prompt = format!(
                    "Extract the date from the following text:\n{answer}\n\n\
                     Output just the date. The date should be in ISO date time \
                     format. No explanation is required. The date should be \
                     directly assignable to a date variable. \
                     If you cannot convert the string into a date, output \"NA\"."
                );
                let extracted =
                    AnswerPromptService::run_completion(self.llm, &prompt, None, None).await?;
                structured_output.insert(key, Value::String(extracted));
            }
            "boolean" => {
                if answer.eq_ignore_ascii_case("na") {
                    structured_output.insert(key, Value::Null);
                    return Ok(());
                }
                let prompt = format!(
                    "Extract yes/no from the following text:\n{answer}\n\n\
                     Output in single word. If the context is trying to convey \
                     that the answer is true, then return \"yes\", else return \"no\"."
                );
                let extracted =
                    AnswerPromptService::run_completion(self.llm, &prompt, None, None).await?;
                structured_output.insert(key, Value::Bool(extracted.trim().eq_ignore_ascii_case("yes")));
            }
            "json" => {
                AnswerPromptService::handle_json(answer, structured_output, self.prompt_name);
            }
            // TEXT or anything else: store the raw answer.
            _ => {
                structured_output.insert(key, Value::String(answer.to_string()));
            }
        }
        Ok(())
    }
}

/// Replace every `"NA"` string (case-insensitive), at any nesting depth,
/// with null. Idempotent.
pub fn sanitize_null_values(value: &mut Value) {
    match value {
        Value::String(s) if s.eq_ignore_ascii_case("na") => *value = Value::Null,
        Value::Array(items) => {
            for item in items {
                sanitize_null_values(item);
            }
        }
        Value::Object(map) => {
            for (_, item) in map.iter_mut() {
                sanitize_null_values(item);
            }
        }
        _ => {}
    }
}
