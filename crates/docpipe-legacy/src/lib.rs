// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! docpipe-legacy
#![deny(unsafe_code)]
#![warn(missing_docs)]

/// The answer-prompt loop.
pub mod answer;
/// Typed failure envelope.
pub mod error;
mod extract;
mod index;
/// Deterministic doc-id generation.
pub mod indexing;
mod params;
/// Prompt construction and completion helpers.
pub mod prompt;
/// Strategy-selected retrieval.
pub mod retrieval;
mod summarize;
/// `{{variable}}` replacement.
pub mod variables;

pub use answer::sanitize_null_values;
pub use error::LegacyExecutorError;
pub use prompt::AnswerPromptService;
pub use retrieval::{RetrievalService, RetrievalStrategy};
pub use variables::VariableReplacementService;

use async_trait::async_trait;
use docpipe_core::{ExecutionContext, ExecutionResult, Operation};
use docpipe_executor::{Executor, ExecutorEnv, ExecutorRegistry, RegistryError};

/// Executor wrapping the full prompt-service extraction pipeline.
///
/// Routes incoming contexts to per-operation handlers. Expected failures
/// ([`LegacyExecutorError`]) are caught and mapped to failure results so
/// callers always get an envelope.
#[derive(Debug, Default)]
pub struct LegacyExecutor;

/// Register the legacy executor with the process-global registry.
///
/// The worker binary calls this once at startup; it is the explicit
/// analogue of an import-time registration side effect.
///
/// # Errors
///
/// Returns [`RegistryError::Duplicate`] when already registered.
pub fn register() -> Result<(), RegistryError> {
    ExecutorRegistry::register::<LegacyExecutor>()
}

#[async_trait]
impl Executor for LegacyExecutor {
    fn name(&self) -> &'static str {
        "legacy"
    }

    async fn execute(&mut self, context: &ExecutionContext, env: &ExecutorEnv) -> ExecutionResult {
        let Ok(operation) = context.operation.parse::<Operation>() else {
            return ExecutionResult::failure(format!(
                "LegacyExecutor does not support operation '{}'",
                context.operation
            ));
        };

        tracing::info!(
            operation = %operation,
            run_id = %context.run_id,
            request_id = %context.request_id,
            "LegacyExecutor routing operation"
        );

        let outcome = match operation {
            Operation::Extract => extract::handle_extract(context, env).await,
            Operation::Index => index::handle_index(context, env).await,
            Operation::AnswerPrompt => answer::handle_answer_prompt(context, env).await,
            // Wire-identical to answer_prompt; the single-pass vs multi-pass
            // distinction lives in the caller's payload shape.
            Operation::SinglePassExtraction => {
                tracing::info!(
                    run_id = %context.run_id,
                    "single_pass_extraction delegating to answer_prompt"
                );
                answer::handle_answer_prompt(context, env).await
            }
            Operation::Summarize => summarize::handle_summarize(context, env).await,
            Operation::AgenticExtraction => Err(LegacyExecutorError::PluginMissing(
                "Agentic extraction requires the agentic extraction plugin which is \
                 not yet available in the executor worker."
                    .into(),
            )),
        };

        match outcome {
            Ok(result) => result,
            Err(err) => {
                tracing::warn!(
                    operation = %operation,
                    code = err.status_code(),
                    "handler failed: {err}"
                );
                ExecutionResult::failure(err.to_string())
            }
        }
    }
}
