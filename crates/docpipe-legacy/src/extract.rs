// SPDX-License-Identifier: MIT OR Apache-2.0
//! The `extract` operation: text extraction via an x2text adapter.

use crate::error::LegacyExecutorError;
use crate::params::{Params, missing_params_error};
use docpipe_adapters::{ExtractRequest, ToolContext};
use docpipe_core::{ExecutionContext, ExecutionResult, ExecutionSource};
use docpipe_executor::{ExecutorEnv, ExecutorToolShim};
use docpipe_storage::ExecutionPaths;
use serde_json::{Map, Value, json};
use std::path::PathBuf;

pub(crate) async fn handle_extract(
    context: &ExecutionContext,
    env: &ExecutorEnv,
) -> Result<ExecutionResult, LegacyExecutorError> {
    let params = Params(&context.executor_params);

    let missing = params.missing(&["x2text_instance_id", "file_path"]);
    if !missing.is_empty() {
        return Ok(ExecutionResult::failure(missing_params_error(&missing)));
    }
    let x2text_instance_id = params.str("x2text_instance_id").unwrap_or_default();
    let file_path = PathBuf::from(params.str("file_path").unwrap_or_default());

    let source: ExecutionSource = match context.execution_source.parse() {
        Ok(source) => source,
        Err(err) => return Ok(ExecutionResult::failure(err.to_string())),
    };

    let output_file_path = params.str("output_file_path").map(PathBuf::from);
    let enable_highlight = params.bool_or("enable_highlight", false);
    let tags: Vec<String> = params
        .array("tags")
        .iter()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect();
    let execution_data_dir = params.str("execution_data_dir").map(PathBuf::from);

    let shim = ExecutorToolShim::new(params.string_or_empty("platform_api_key"));
    let x2text = env
        .adapters
        .x2text(x2text_instance_id, &shim)
        .map_err(|e| LegacyExecutorError::AdapterFetch(e.to_string()))?;
    let store = env.storage.open(source);

    let highlight_run = enable_highlight && x2text.supports_highlight();
    let request = ExtractRequest {
        input_file_path: file_path,
        output_file_path,
        enable_highlight: highlight_run,
        tags,
    };

    shim.stream_log(
        &format!("Extracting text via adapter '{x2text_instance_id}'"),
        docpipe_telemetry::LogLevel::Info,
    );

    let extraction = match x2text.extract(request).await {
        Ok(extraction) => extraction,
        Err(err) => {
            return Err(LegacyExecutorError::Extraction {
                adapter: x2text.name().to_string(),
                message: err.to_string(),
            });
        }
    };

    // The whisper hash is only persisted for tool-sourced executions, into
    // the execution data directory the structure worker reads back.
    if highlight_run && source == ExecutionSource::Tool {
        if let (Some(dir), Some(whisper_hash)) =
            (execution_data_dir, extraction.whisper_hash.clone())
        {
            let paths = ExecutionPaths::from_dir(dir);
            let mut patch = Map::new();
            patch.insert("whisper_hash".into(), json!(whisper_hash));
            docpipe_storage::merge_metadata(&store, &paths, patch).await?;
        }
    }

    Ok(ExecutionResult::ok_entry(
        "extracted_text",
        Value::String(extraction.extracted_text),
    ))
}
