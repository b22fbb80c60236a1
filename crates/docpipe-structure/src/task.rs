// SPDX-License-Identifier: MIT OR Apache-2.0
//! The per-file pipeline driver.

use crate::overrides::{apply_profile_overrides, merge_metrics, should_skip_for_smart_table};
use crate::platform::{PlatformClient, PlatformError};
use docpipe_core::{ExecutionContext, Operation};
use docpipe_dispatch::{DispatchError, ExecutionDispatcher};
use docpipe_storage::{ExecutionPaths, FileStore, LocalFileStore, StorageError};
use docpipe_telemetry::{LogPublisher, LogStage, LogState, WorkflowLogger};
use docpipe_workflow::{ExecutionStatus, StoreError, WorkflowExecutionStore};
use serde_json::{Map, Value, json};
use std::path::PathBuf;
use std::sync::Arc;

/// Errors that abort the per-file pipeline.
#[derive(Debug, thiserror::Error)]
pub enum StructureToolError {
    /// Neither registry resolved the project.
    #[error("Error fetching project for registry id '{registry_id}': {detail}")]
    ProjectResolution {
        /// The registry id that failed to resolve.
        registry_id: String,
        /// Why.
        detail: String,
    },

    /// A dispatched operation returned a failure result; the error is
    /// propagated verbatim.
    #[error("{operation} failed: {message}")]
    Dispatch {
        /// The failed operation.
        operation: String,
        /// The failure message, verbatim.
        message: String,
    },

    /// The tool metadata is missing a required member.
    #[error("malformed tool metadata: {0}")]
    Metadata(String),

    /// The workflow execution was cooperatively stopped.
    #[error("workflow execution {execution_id} was stopped")]
    Stopped {
        /// The stopped execution.
        execution_id: String,
    },

    /// Platform RPC failure.
    #[error(transparent)]
    Platform(#[from] PlatformError),

    /// Execution storage failure.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Workflow store failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The dispatcher itself is unusable (no backend bound).
    #[error(transparent)]
    DispatchLayer(#[from] DispatchError),
}

/// Inputs for one task invocation (one file).
#[derive(Debug, Clone)]
pub struct StructureToolRequest {
    /// Tenant scope.
    pub organization_id: Option<String>,
    /// Workflow being executed.
    pub workflow_id: String,
    /// Parent workflow execution.
    pub execution_id: String,
    /// This file's execution row; doubles as the run and request id.
    pub file_execution_id: String,
    /// Tool-instance settings: `prompt_registry_id` plus feature flags.
    pub tool_instance_metadata: Map<String, Value>,
    /// Platform key threaded into every adapter call.
    pub platform_api_key: String,
    /// The staged input file.
    pub input_file_path: PathBuf,
    /// Where the output artifact lands.
    pub output_dir_path: PathBuf,
    /// Original name of the source file.
    pub source_file_name: String,
    /// This file execution's data directory.
    pub execution_data_dir: PathBuf,
    /// Telemetry channel identity.
    pub messaging_channel: String,
    /// Content hash of the source, when known.
    pub file_hash: Option<String>,
    /// Execution metadata (`llm_profile_id`, `custom_data`, tags).
    pub exec_metadata: Map<String, Value>,
}

/// The structure-tool driver bound to a worker's seams.
pub struct StructureToolTask {
    dispatcher: Arc<ExecutionDispatcher>,
    platform: Arc<dyn PlatformClient>,
    store: LocalFileStore,
    executions: Arc<dyn WorkflowExecutionStore>,
    publisher: Arc<dyn LogPublisher>,
}

impl StructureToolTask {
    /// A driver over the given seams.
    pub fn new(
        dispatcher: Arc<ExecutionDispatcher>,
        platform: Arc<dyn PlatformClient>,
        store: LocalFileStore,
        executions: Arc<dyn WorkflowExecutionStore>,
        publisher: Arc<dyn LogPublisher>,
    ) -> Self {
        Self {
            dispatcher,
            platform,
            store,
            executions,
            publisher,
        }
    }

    /// Run the full per-file pipeline and return the structured output.
    ///
    /// # Errors
    ///
    /// The first failed dispatch short-circuits with its error verbatim;
    /// the artifact is written exactly once on success and never on
    /// failure.
    pub async fn run(&self, request: StructureToolRequest) -> Result<Value, StructureToolError> {
        let logger = WorkflowLogger::new(
            self.publisher.clone(),
            request.messaging_channel.clone(),
            LogStage::Run,
            request.execution_id.clone(),
            request.organization_id.clone(),
        );
        tracing::info!(
            file_execution_id = %request.file_execution_id,
            source = %request.source_file_name,
            "starting structure extraction"
        );

        // 1. Resolve the prompt-studio project (agentic registry fallback).
        let registry_id = request
            .tool_instance_metadata
            .get("prompt_registry_id")
            .and_then(Value::as_str)
            .ok_or_else(|| StructureToolError::Metadata("missing prompt_registry_id".into()))?
            .to_string();
        let (mut tool_metadata, is_agentic) = self.resolve_project(&registry_id).await?;
        tool_metadata.insert("is_agentic".into(), Value::Bool(is_agentic));

        if is_agentic {
            return self.run_agentic(&request, &tool_metadata, &logger).await;
        }

        // 2. Apply LLM-profile overrides.
        if let Some(profile_id) = request
            .exec_metadata
            .get("llm_profile_id")
            .and_then(Value::as_str)
        {
            let profile = self.platform.get_llm_profile(profile_id).await?;
            let profile_name = profile
                .get("profile_name")
                .and_then(Value::as_str)
                .unwrap_or(profile_id);
            tracing::info!("Applying profile overrides from profile: {profile_name}");
            let changes = apply_profile_overrides(&mut tool_metadata, &profile);
            for change in &changes {
                logger.publish_log(format!("Profile override: {change}"));
            }
        }

        // 3. Merge tool-instance feature flags into tool_settings.
        let instance = &request.tool_instance_metadata;
        let enable_challenge = flag(instance, "enable_challenge");
        let summarize_as_source = flag(instance, "summarize_as_source");
        let single_pass = flag(instance, "single_pass_extraction_mode");
        let enable_highlight = flag(instance, "enable_highlight");
        let challenge_llm = instance
            .get("challenge_llm_adapter_id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let project_name = tool_metadata
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or(&registry_id)
            .to_string();
        let tool_id = tool_metadata
            .get("tool_id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let outputs = tool_metadata
            .get("outputs")
            .and_then(Value::as_array)
            .cloned()
            .ok_or_else(|| StructureToolError::Metadata("missing outputs".into()))?;
        let mut tool_settings = tool_metadata
            .get("tool_settings")
            .and_then(Value::as_object)
            .cloned()
            .ok_or_else(|| StructureToolError::Metadata("missing tool_settings".into()))?;
        tool_settings.insert("challenge_llm".into(), json!(challenge_llm));
        tool_settings.insert("enable_challenge".into(), json!(enable_challenge));
        tool_settings.insert(
            "enable_single_pass_extraction".into(),
            json!(single_pass),
        );
        tool_settings.insert("summarize_as_source".into(), json!(summarize_as_source));
        tool_settings.insert("enable_highlight".into(), json!(enable_highlight));

        // 4. Streaming updates for the UI.
        let active_prompts = outputs
            .iter()
            .filter(|o| o.get("active").and_then(Value::as_bool) == Some(true))
            .count();
        logger.publish_update_log(
            LogState::InputUpdate,
            format!(
                "## Loaded '{project_name}'\n```json\n{}\n```\n",
                serde_json::to_string_pretty(&tool_metadata).unwrap_or_default()
            ),
            None,
        );
        logger.publish_update_log(
            LogState::OutputUpdate,
            format!(
                "## Processing '{}'\nThis might take a while and involve...\n\
                 - Extracting text\n- Indexing\n- Retrieving answers for \
                 '{active_prompts}' prompts",
                request.source_file_name
            ),
            None,
        );

        let paths = ExecutionPaths::from_dir(&request.execution_data_dir);
        let extract_file = paths.extract();

        // 5. Smart-table shortcut.
        let skip_extraction_and_indexing = should_skip_for_smart_table(&outputs);

        let mut payload = Map::new();
        payload.insert("run_id".into(), json!(request.file_execution_id));
        payload.insert("execution_id".into(), json!(request.execution_id));
        payload.insert("tool_settings".into(), Value::Object(tool_settings.clone()));
        payload.insert("outputs".into(), Value::Array(outputs.clone()));
        payload.insert("tool_id".into(), json!(tool_id));
        payload.insert("file_hash".into(), json!(request.file_hash));
        payload.insert(
            "file_name".into(),
            json!(if summarize_as_source {
                "SUMMARIZE".to_string()
            } else {
                request.source_file_name.clone()
            }),
        );
        payload.insert(
            "file_path".into(),
            json!(extract_file.to_string_lossy()),
        );
        payload.insert("execution_source".into(), json!("tool"));
        payload.insert(
            "custom_data".into(),
            request
                .exec_metadata
                .get("custom_data")
                .cloned()
                .unwrap_or_else(|| json!({})),
        );
        payload.insert("platform_api_key".into(), json!(request.platform_api_key));

        // 6. Extract (cached in the EXTRACT file; dispatched at most once).
        let mut extracted_text = String::new();
        if skip_extraction_and_indexing {
            tracing::info!(
                "Skipping extraction and indexing for table output with a JSON schema prompt"
            );
            payload.insert(
                "file_path".into(),
                json!(request.input_file_path.to_string_lossy()),
            );
        } else {
            self.check_stop(&request.execution_id).await?;
            if self.store.exists(&extract_file).await? {
                extracted_text = self.store.read_to_string(&extract_file).await?;
                tracing::info!("Using cached extracted text from EXTRACT");
            } else {
                logger.publish_log(format!(
                    "Extracting document '{}'",
                    request.source_file_name
                ));
                let mut extract_params = Map::new();
                extract_params.insert(
                    "x2text_instance_id".into(),
                    tool_settings
                        .get("x2text_adapter")
                        .cloned()
                        .unwrap_or_default(),
                );
                extract_params.insert(
                    "file_path".into(),
                    json!(request.input_file_path.to_string_lossy()),
                );
                extract_params.insert(
                    "output_file_path".into(),
                    json!(extract_file.to_string_lossy()),
                );
                extract_params.insert("enable_highlight".into(), json!(enable_highlight));
                extract_params.insert(
                    "execution_data_dir".into(),
                    json!(request.execution_data_dir.to_string_lossy()),
                );
                extract_params
                    .insert("platform_api_key".into(), json!(request.platform_api_key));

                let data = self
                    .dispatch(&request, Operation::Extract, extract_params)
                    .await?;
                extracted_text = data
                    .get("extracted_text")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                self.store
                    .write(&extract_file, extracted_text.as_bytes())
                    .await?;
            }
        }

        // 7. Summarization branch.
        let mut index_metrics: Map<String, Value> = Map::new();
        if summarize_as_source {
            let (summarize_path, summarize_hash) = self
                .summarize(&request, &tool_settings, &outputs, &paths, &extracted_text)
                .await?;
            payload.insert("file_hash".into(), json!(summarize_hash));
            payload.insert("file_path".into(), json!(summarize_path.to_string_lossy()));
            // Outputs answer against the summary in full-context mode.
            if let Some(outputs) = payload.get_mut("outputs").and_then(Value::as_array_mut) {
                for output in outputs {
                    if let Some(spec) = output.as_object_mut() {
                        spec.insert("chunk_size".into(), json!(0));
                        spec.insert("chunk_overlap".into(), json!(0));
                        for key in ["embedding", "vector_db", "x2text_adapter"] {
                            if let Some(value) = tool_settings.get(key) {
                                spec.insert(key.to_string(), value.clone());
                            }
                        }
                    }
                }
            }
        } else if !skip_extraction_and_indexing && !single_pass {
            // 8. Indexing pass, deduplicated on the chunking tuple.
            let mut seen_params: Vec<String> = Vec::new();
            for output in &outputs {
                let name = output.get("name").and_then(Value::as_str).unwrap_or("");
                let chunk_size = output.get("chunk_size").and_then(Value::as_u64).unwrap_or(0);
                let chunk_overlap = output
                    .get("chunk_overlap")
                    .and_then(Value::as_u64)
                    .unwrap_or(0);
                let vector_db = setting_str(&tool_settings, "vector_db");
                let embedding = setting_str(&tool_settings, "embedding");
                let x2text = setting_str(&tool_settings, "x2text_adapter");

                let param_key = format!(
                    "chunk_size={chunk_size}_chunk_overlap={chunk_overlap}_\
                     vector_db={vector_db}_embedding={embedding}_x2text={x2text}"
                );
                if chunk_size == 0 || seen_params.contains(&param_key) {
                    continue;
                }
                seen_params.push(param_key);

                self.check_stop(&request.execution_id).await?;
                tracing::info!(
                    "Indexing document with: chunk_size={chunk_size}, \
                     chunk_overlap={chunk_overlap}, vector_db={vector_db}, \
                     embedding={embedding}, x2text={x2text}"
                );
                let started = chrono::Utc::now();
                let mut index_params = Map::new();
                index_params.insert("embedding_instance_id".into(), json!(embedding));
                index_params.insert("vector_db_instance_id".into(), json!(vector_db));
                index_params.insert("x2text_instance_id".into(), json!(x2text));
                index_params.insert("file_path".into(), json!(extract_file.to_string_lossy()));
                index_params.insert("extracted_text".into(), json!(extracted_text));
                index_params.insert("chunk_size".into(), json!(chunk_size));
                index_params.insert("chunk_overlap".into(), json!(chunk_overlap));
                index_params.insert("reindex".into(), json!(true));
                index_params.insert("file_hash".into(), json!(request.file_hash));
                index_params.insert("enable_highlight".into(), json!(enable_highlight));
                index_params.insert("platform_api_key".into(), json!(request.platform_api_key));

                self.dispatch(&request, Operation::Index, index_params).await?;

                let elapsed = (chrono::Utc::now() - started).num_milliseconds() as f64 / 1000.0;
                index_metrics.insert(
                    name.to_string(),
                    json!({"indexing": {"time_taken(s)": elapsed}}),
                );
            }
        }

        // 9. Answer pass.
        self.check_stop(&request.execution_id).await?;
        let mut structured_output = if single_pass {
            logger.publish_log("Fetching response for single pass extraction...");
            self.dispatch(
                &request,
                Operation::SinglePassExtraction,
                payload.clone(),
            )
            .await?
        } else {
            if let Some(outputs) = payload.get_mut("outputs").and_then(Value::as_array_mut) {
                for output in outputs {
                    let Some(spec) = output.as_object_mut() else {
                        continue;
                    };
                    if let Some(Value::Object(table_settings)) = spec.get_mut("table_settings")
                    {
                        let input_file = if skip_extraction_and_indexing {
                            request.input_file_path.to_string_lossy().into_owned()
                        } else {
                            extract_file.to_string_lossy().into_owned()
                        };
                        table_settings.insert("input_file".into(), json!(input_file));
                        let is_directory_mode = table_settings
                            .get("is_directory_mode")
                            .and_then(Value::as_bool)
                            .unwrap_or(false);
                        table_settings
                            .insert("is_directory_mode".into(), json!(is_directory_mode));
                        tracing::info!(
                            "Performing table extraction with: {table_settings:?}"
                        );
                    }
                }
            }
            logger.publish_log(format!(
                "Fetching responses for '{}' prompt(s)...",
                outputs.len()
            ));
            self.dispatch(&request, Operation::AnswerPrompt, payload.clone())
                .await?
        };

        // 10. Post-processing.
        let metadata = structured_output
            .entry("metadata".to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if let Some(metadata) = metadata.as_object_mut() {
            metadata.insert("file_name".into(), json!(request.source_file_name));
            if !extracted_text.is_empty() {
                metadata.insert("extracted_text".into(), json!(extracted_text));
                tracing::info!(
                    "Added text extracted from the document to metadata \
                     (length: {} characters)",
                    extracted_text.len()
                );
            }
        }
        let answer_metrics = structured_output
            .get("metrics")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        let merged = merge_metrics(&answer_metrics, &index_metrics);
        if !merged.is_empty() {
            structured_output.insert("metrics".into(), Value::Object(merged));
        }

        // 11. Output artifact: once, on success only.
        let result = Value::Object(structured_output);
        self.write_artifacts(&request, &paths, &result).await?;

        tracing::info!(
            "Structure extraction completed successfully for {}",
            request.source_file_name
        );
        Ok(result)
    }

    async fn resolve_project(
        &self,
        registry_id: &str,
    ) -> Result<(Map<String, Value>, bool), StructureToolError> {
        tracing::info!("Fetching exported tool with UUID '{registry_id}'");
        if let Some(doc) = self.platform.get_prompt_studio_tool(registry_id).await? {
            if let Some(tool_metadata) = doc.get("tool_metadata").and_then(Value::as_object) {
                return Ok((tool_metadata.clone(), false));
            }
        }
        tracing::info!("Not found as prompt studio project, trying agentic registry");
        if let Some(doc) = self.platform.get_agentic_studio_tool(registry_id).await? {
            if let Some(tool_metadata) = doc.get("tool_metadata").and_then(Value::as_object) {
                return Ok((tool_metadata.clone(), true));
            }
        }
        Err(StructureToolError::ProjectResolution {
            registry_id: registry_id.to_string(),
            detail: "registry returned empty response from both registries".to_string(),
        })
    }

    async fn run_agentic(
        &self,
        request: &StructureToolRequest,
        tool_metadata: &Map<String, Value>,
        logger: &WorkflowLogger,
    ) -> Result<Value, StructureToolError> {
        logger.publish_log(format!(
            "Executing agentic extraction for project '{}'",
            tool_metadata
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
        ));
        let mut params = Map::new();
        params.insert("tool_metadata".into(), Value::Object(tool_metadata.clone()));
        params.insert(
            "file_path".into(),
            json!(request.input_file_path.to_string_lossy()),
        );
        params.insert("platform_api_key".into(), json!(request.platform_api_key));

        let structured_output = self
            .dispatch(request, Operation::AgenticExtraction, params)
            .await?;

        let paths = ExecutionPaths::from_dir(&request.execution_data_dir);
        let result = Value::Object(structured_output);
        self.write_artifacts(request, &paths, &result).await?;
        Ok(result)
    }

    async fn summarize(
        &self,
        request: &StructureToolRequest,
        tool_settings: &Map<String, Value>,
        outputs: &[Value],
        paths: &ExecutionPaths,
        extracted_text: &str,
    ) -> Result<(PathBuf, String), StructureToolError> {
        let summarize_path = paths.summarize();
        tracing::info!(
            "Checking if summarized context exists at '{}'...",
            summarize_path.display()
        );
        if !self.store.exists(&summarize_path).await? {
            tracing::info!("Summarized context not found, summarizing...");
            let prompt_keys: Vec<String> = outputs
                .iter()
                .filter_map(|o| o.get("name").and_then(Value::as_str))
                .map(str::to_string)
                .collect();
            let mut params = Map::new();
            params.insert(
                "llm_adapter_instance_id".into(),
                tool_settings.get("llm").cloned().unwrap_or_default(),
            );
            params.insert(
                "summarize_prompt".into(),
                tool_settings
                    .get("summarize_prompt")
                    .cloned()
                    .unwrap_or_default(),
            );
            params.insert("context".into(), json!(extracted_text));
            params.insert("prompt_keys".into(), json!(prompt_keys));
            params.insert("platform_api_key".into(), json!(request.platform_api_key));

            let data = self.dispatch(request, Operation::Summarize, params).await?;
            let summary = data
                .get("data")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            tracing::info!(
                "Writing summarized context to '{}'",
                summarize_path.display()
            );
            self.store
                .write(&summarize_path, summary.as_bytes())
                .await?;
        }
        let summarize_hash = self.store.hash_file(&summarize_path).await?;
        Ok((summarize_path, summarize_hash))
    }

    async fn dispatch(
        &self,
        request: &StructureToolRequest,
        operation: Operation,
        params: Map<String, Value>,
    ) -> Result<Map<String, Value>, StructureToolError> {
        let mut context = ExecutionContext::new(
            "legacy",
            operation,
            request.file_execution_id.clone(),
            "tool",
        )
        .map_err(|e| StructureToolError::Metadata(e.to_string()))?
        .with_params(params)
        .with_request_id(request.file_execution_id.clone());
        if let Some(org) = &request.organization_id {
            context = context.with_organization(org.clone());
        }

        let result = self.dispatcher.dispatch(&context, None).await?;
        if !result.success {
            let message = result
                .error
                .unwrap_or_else(|| "unknown failure".to_string());
            return Err(StructureToolError::Dispatch {
                operation: operation.as_str().to_string(),
                message,
            });
        }
        Ok(result.data)
    }

    async fn check_stop(&self, execution_id: &str) -> Result<(), StructureToolError> {
        if let Some(execution) = self.executions.get(execution_id).await? {
            if execution.status == ExecutionStatus::Stopped {
                tracing::info!("execution {execution_id} stopped; exiting pipeline");
                return Err(StructureToolError::Stopped {
                    execution_id: execution_id.to_string(),
                });
            }
        }
        Ok(())
    }

    async fn write_artifacts(
        &self,
        request: &StructureToolRequest,
        paths: &ExecutionPaths,
        result: &Value,
    ) -> Result<(), StructureToolError> {
        tracing::info!("Writing prompt studio project's output to workflow's storage");
        let artifact = request.output_dir_path.join(artifact_name(&request.source_file_name));
        self.store.json_dump(&artifact, result).await?;

        // INFILE feeds the next tool in a multi-tool chain.
        tracing::info!("Writing result to INFILE for next tool in workflow");
        self.store.json_dump(&paths.infile(), result).await?;
        Ok(())
    }
}

fn artifact_name(source_file_name: &str) -> String {
    let stem = std::path::Path::new(source_file_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| source_file_name.to_string());
    format!("{stem}.json")
}

fn flag(settings: &Map<String, Value>, key: &str) -> bool {
    settings.get(key).and_then(Value::as_bool).unwrap_or(false)
}

fn setting_str(settings: &Map<String, Value>, key: &str) -> String {
    settings
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}
