// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! docpipe-core
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! The stable contract for docpipe.
//!
//! If you only take one dependency, take this one.

/// Request envelope crossing the queue boundary.
pub mod context;
/// Chunked content hashing.
pub mod hash;
/// Lenient JSON recovery for model answers.
pub mod json_repair;
/// Response envelope crossing the queue boundary.
pub mod result;

pub use context::ExecutionContext;
pub use hash::{ContentHasher, HASH_CHUNK_SIZE, sha256_hex};
pub use result::ExecutionResult;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Current contract version string embedded in wire envelopes where callers
/// opt in to versioning.
///
/// # Examples
///
/// ```
/// assert_eq!(docpipe_core::CONTRACT_VERSION, "docpipe/v1");
/// ```
pub const CONTRACT_VERSION: &str = "docpipe/v1";

/// A unit of work the executor state machine understands.
///
/// These are stable wire constants — the alphabet of the executor state
/// machine. They must not be rewritten when crossing the queue boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Text extraction from a source document (x2text).
    Extract,
    /// Vector-DB indexing of extracted text.
    Index,
    /// Multi-prompt LLM retrieval and answering.
    AnswerPrompt,
    /// All prompts answered in a single LLM round; wire-identical to
    /// [`Operation::AnswerPrompt`], the difference is the caller's payload.
    SinglePassExtraction,
    /// Document summarization used as an alternate answering source.
    Summarize,
    /// Agent-driven extraction (plugin-provided).
    AgenticExtraction,
}

impl Operation {
    /// Every operation, in wire order. Useful for task registration loops.
    pub const ALL: [Operation; 6] = [
        Operation::Extract,
        Operation::Index,
        Operation::AnswerPrompt,
        Operation::SinglePassExtraction,
        Operation::Summarize,
        Operation::AgenticExtraction,
    ];

    /// The canonical lower-snake wire value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Extract => "extract",
            Operation::Index => "index",
            Operation::AnswerPrompt => "answer_prompt",
            Operation::SinglePassExtraction => "single_pass_extraction",
            Operation::Summarize => "summarize",
            Operation::AgenticExtraction => "agentic_extraction",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = ContractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operation::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| ContractError::UnknownOperation(s.to_string()))
    }
}

impl From<Operation> for String {
    fn from(op: Operation) -> Self {
        op.as_str().to_owned()
    }
}

/// Where an execution was triggered from.
///
/// Selects file-storage roots and log routing downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionSource {
    /// Prompt-studio IDE sessions; persistent remote storage.
    Ide,
    /// Workflow tool runs; shared temporary storage.
    Tool,
    /// API deployments; local API staging storage.
    Api,
}

impl ExecutionSource {
    /// The canonical lower-snake wire value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionSource::Ide => "ide",
            ExecutionSource::Tool => "tool",
            ExecutionSource::Api => "api",
        }
    }
}

impl fmt::Display for ExecutionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionSource {
    type Err = ContractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ide" => Ok(ExecutionSource::Ide),
            "tool" => Ok(ExecutionSource::Tool),
            "api" => Ok(ExecutionSource::Api),
            other => Err(ContractError::UnknownSource(other.to_string())),
        }
    }
}

impl From<ExecutionSource> for String {
    fn from(source: ExecutionSource) -> Self {
        source.as_str().to_owned()
    }
}

/// Errors from contract-level operations (validation, serialization).
#[derive(Debug, thiserror::Error)]
pub enum ContractError {
    /// A required envelope field was empty or missing.
    #[error("{field} is required")]
    MissingField {
        /// Name of the offending field.
        field: &'static str,
    },

    /// A failed result arrived without an error message.
    #[error("error message is required when success is false")]
    FailureWithoutError,

    /// The operation string is not one of the canonical wire constants.
    #[error("unknown operation '{0}'")]
    UnknownOperation(String),

    /// The execution source string is not one of the canonical wire constants.
    #[error("unknown execution source '{0}'")]
    UnknownSource(String),

    /// JSON serialization or deserialization failed.
    #[error("failed to serialize JSON: {0}")]
    Json(#[from] serde_json::Error),
}
