// SPDX-License-Identifier: MIT OR Apache-2.0
//! The `summarize` operation.

use crate::error::LegacyExecutorError;
use crate::params::Params;
use crate::prompt::AnswerPromptService;
use docpipe_adapters::UsageReason;
use docpipe_core::{ExecutionContext, ExecutionResult};
use docpipe_executor::{ExecutorEnv, ExecutorToolShim};
use serde_json::Value;

pub(crate) async fn handle_summarize(
    context: &ExecutionContext,
    env: &ExecutorEnv,
) -> Result<ExecutionResult, LegacyExecutorError> {
    let params = Params(&context.executor_params);

    let Some(llm_adapter_id) = params.str("llm_adapter_instance_id") else {
        return Ok(ExecutionResult::failure(
            "Missing required param: llm_adapter_instance_id",
        ));
    };
    let Some(doc_context) = params.str("context") else {
        return Ok(ExecutionResult::failure("Missing required param: context"));
    };
    let summarize_prompt = params.string_or_empty("summarize_prompt");
    let prompt_keys: Vec<&str> = params
        .array("prompt_keys")
        .iter()
        .filter_map(Value::as_str)
        .collect();

    let mut prompt = format!("{summarize_prompt}\n\n");
    if !prompt_keys.is_empty() {
        prompt.push_str(&format!(
            "Focus on these fields: {}\n\n",
            prompt_keys.join(", ")
        ));
    }
    prompt.push_str(&format!(
        "Context:\n---------------\n{doc_context}\n-----------------\n\nSummary:"
    ));

    let shim = ExecutorToolShim::new(params.string_or_empty("platform_api_key"));
    let llm = env
        .adapters
        .llm(llm_adapter_id, &shim, UsageReason::Summarize)
        .map_err(|e| LegacyExecutorError::Summarize(e.to_string()))?;

    let summary = AnswerPromptService::run_completion(&*llm, &prompt, None, None)
        .await
        .map_err(|e| LegacyExecutorError::Summarize(e.to_string()))?;

    Ok(ExecutionResult::ok_entry("data", Value::String(summary)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests_support::{env_with, tool_context};
    use serde_json::json;

    #[tokio::test]
    async fn summarizes_with_focus_fields() {
        let (env, factory, _dir) = env_with();
        factory.llm.respond_when("Summary:", "A short summary.");

        let ctx = tool_context(
            "summarize",
            json!({
                "llm_adapter_instance_id": "llm-1",
                "summarize_prompt": "Summarize this filing",
                "context": "Long extracted text",
                "prompt_keys": ["revenue", "profit"],
            }),
        );
        let result = handle_summarize(&ctx, &env).await.unwrap();
        assert!(result.success);
        assert_eq!(result.data["data"], "A short summary.");

        let prompt = factory.llm.prompts().pop().unwrap();
        assert!(prompt.contains("Summarize this filing"));
        assert!(prompt.contains("Focus on these fields: revenue, profit"));
        assert!(prompt.contains("Long extracted text"));
        assert!(prompt.ends_with("Summary:"));
    }

    #[tokio::test]
    async fn missing_llm_fails() {
        let (env, _factory, _dir) = env_with();
        let ctx = tool_context("summarize", json!({"context": "text"}));
        let result = handle_summarize(&ctx, &env).await.unwrap();
        assert!(!result.success);
        assert!(result.error.unwrap().contains("llm_adapter_instance_id"));
    }

    #[tokio::test]
    async fn missing_context_fails() {
        let (env, _factory, _dir) = env_with();
        let ctx = tool_context(
            "summarize",
            json!({"llm_adapter_instance_id": "llm-1"}),
        );
        let result = handle_summarize(&ctx, &env).await.unwrap();
        assert!(!result.success);
        assert!(result.error.unwrap().contains("context"));
    }
}
