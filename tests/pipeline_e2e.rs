// SPDX-License-Identifier: MIT OR Apache-2.0
//! End-to-end pipeline scenarios: a worker-shaped task backend running the
//! real orchestrator and legacy executor against mock adapters, driven by
//! the structure tool.

use docpipe_adapters::MockAdapterFactory;
use docpipe_backend::{BackendError, MemoryBackend, TaskBackend, TaskHandler};
use docpipe_core::{ExecutionContext, ExecutionResult, Operation};
use docpipe_dispatch::ExecutionDispatcher;
use docpipe_executor::{ExecutionOrchestrator, ExecutorEnv};
use docpipe_storage::{LocalFileStore, StorageRoots};
use docpipe_structure::{MockPlatformClient, StructureToolError, StructureToolRequest, StructureToolTask};
use docpipe_telemetry::NoopPublisher;
use docpipe_workflow::MemoryWorkflowStore;
use serde_json::{Value, json};
use std::sync::Arc;

/// Wire a worker: register every `execute_<operation>` task as a
/// wire-in → orchestrator → wire-out wrapper, exactly like the worker
/// binary does.
fn wire_worker(backend: &MemoryBackend, env: ExecutorEnv) {
    let _ = docpipe_legacy::register();
    let orchestrator = Arc::new(ExecutionOrchestrator::new(env));
    for operation in Operation::ALL {
        let orchestrator = Arc::clone(&orchestrator);
        let handler: TaskHandler = Arc::new(move |payload| {
            let orchestrator = Arc::clone(&orchestrator);
            Box::pin(async move {
                let context = ExecutionContext::from_wire(payload)
                    .map_err(|e| BackendError::MalformedMessage(e.to_string()))?;
                let result = orchestrator.execute(&context).await;
                result
                    .to_wire()
                    .map_err(|e| BackendError::MalformedMessage(e.to_string()))
            })
        });
        backend.register_task(&docpipe_dispatch::task_name(operation.as_str()), handler);
    }
}

struct Pipeline {
    backend: Arc<MemoryBackend>,
    adapters: MockAdapterFactory,
    platform: Arc<MockPlatformClient>,
    workflow_store: Arc<MemoryWorkflowStore>,
    root: tempfile::TempDir,
}

impl Pipeline {
    fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        let adapters = MockAdapterFactory::new();
        let env = ExecutorEnv {
            adapters: Arc::new(adapters.clone()),
            storage: Arc::new(StorageRoots {
                permanent: root.path().to_path_buf(),
                shared_temporary: root.path().to_path_buf(),
                api: root.path().to_path_buf(),
            }),
            publisher: Arc::new(NoopPublisher),
        };
        let backend = Arc::new(MemoryBackend::new());
        wire_worker(&backend, env);

        Self {
            backend,
            adapters,
            platform: Arc::new(MockPlatformClient::new()),
            workflow_store: Arc::new(MemoryWorkflowStore::new()),
            root,
        }
    }

    fn task(&self) -> StructureToolTask {
        StructureToolTask::new(
            Arc::new(ExecutionDispatcher::new(self.backend.clone())),
            self.platform.clone(),
            LocalFileStore::new(self.root.path()),
            self.workflow_store.clone(),
            Arc::new(NoopPublisher),
        )
    }

    fn request(&self) -> StructureToolRequest {
        let mut instance = serde_json::Map::new();
        instance.insert("prompt_registry_id".into(), json!("reg-1"));
        StructureToolRequest {
            organization_id: Some("org-1".into()),
            workflow_id: "wf-1".into(),
            execution_id: "exec-1".into(),
            file_execution_id: "fe-1".into(),
            tool_instance_metadata: instance,
            platform_api_key: "sk-1".into(),
            input_file_path: self.root.path().join("fe-1/SOURCE"),
            output_dir_path: self.root.path().join("out"),
            source_file_name: "a.pdf".into(),
            execution_data_dir: self.root.path().join("fe-1"),
            messaging_channel: "exec-1".into(),
            file_hash: Some("hash-1".into()),
            exec_metadata: serde_json::Map::new(),
        }
    }

    fn sent_task_names(&self) -> Vec<String> {
        self.backend
            .sent_tasks()
            .into_iter()
            .map(|t| t.name)
            .collect()
    }
}

fn prompt_spec(name: &str, prompt: &str, output_type: &str) -> Value {
    json!({
        "name": name,
        "prompt": prompt,
        "type": output_type,
        "active": true,
        "chunk_size": 512,
        "chunk_overlap": 128,
        "llm": "llm-1",
        "embedding": "emb-1",
        "vector_db": "vdb-1",
        "x2text_adapter": "x2t-1",
        "retrieval_strategy": "simple",
        "similarity_top_k": 3,
    })
}

fn tool_metadata(outputs: Vec<Value>) -> Value {
    json!({
        "tool_id": "tool-1",
        "name": "Financials extractor",
        "tool_settings": {
            "llm": "llm-1",
            "embedding": "emb-1",
            "vector_db": "vdb-1",
            "x2text_adapter": "x2t-1",
            "preamble": "Answer strictly from the context.",
            "postamble": "Reply with the value only.",
        },
        "outputs": outputs,
    })
}

// Scenario: happy path, one text prompt, full extract → index → answer run.
#[tokio::test]
async fn happy_path_single_text_prompt() {
    let pipeline = Pipeline::new();
    pipeline.adapters.x2text.extracts("Revenue is $1M");
    pipeline
        .adapters
        .vector_db
        .search_returns(vec!["Revenue is $1M".to_string()]);
    pipeline.adapters.llm.respond_when("What is the revenue?", "$1M");
    pipeline.platform.add_prompt_tool(
        "reg-1",
        tool_metadata(vec![prompt_spec("revenue", "What is the revenue?", "text")]),
    );

    let result = pipeline.task().run(pipeline.request()).await.unwrap();

    assert_eq!(
        pipeline.sent_task_names(),
        vec!["execute_extract", "execute_index", "execute_answer_prompt"]
    );
    assert_eq!(result["output"]["revenue"], "$1M");
    assert_eq!(result["metadata"]["context"]["revenue"], json!(["Revenue is $1M"]));
    assert_eq!(result["metadata"]["required_fields"]["revenue"], Value::Null);
    assert_eq!(result["metadata"]["file_name"], "a.pdf");
    assert_eq!(result["metadata"]["extracted_text"], "Revenue is $1M");
    assert!(result["metrics"]["revenue"]["extraction_llm"].is_object());
    assert!(result["metrics"]["revenue"]["context_retrieval"].is_object());
    assert!(result["metrics"]["revenue"]["indexing"]["time_taken(s)"].is_number());

    // The artifact on disk is the same document.
    let artifact: Value = serde_json::from_str(
        &std::fs::read_to_string(pipeline.root.path().join("out/a.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(artifact, result);

    // No vector handle leaked anywhere in the run.
    assert_eq!(pipeline.adapters.open_vector_handles(), 0);
}

// Scenario: number type with an NA answer — null output, no second
// completion for the number coercion.
#[tokio::test]
async fn number_prompt_with_na_answer() {
    let pipeline = Pipeline::new();
    pipeline.adapters.x2text.extracts("No financials here");
    pipeline.adapters.llm.respond_default("NA");
    pipeline.platform.add_prompt_tool(
        "reg-1",
        tool_metadata(vec![prompt_spec("revenue", "What is the revenue?", "number")]),
    );

    let result = pipeline.task().run(pipeline.request()).await.unwrap();

    assert_eq!(result["output"]["revenue"], Value::Null);
    // One completion total: the number-extraction call never ran.
    assert_eq!(pipeline.adapters.llm.call_count(), 1);
}

// Scenario: multi-prompt with a %a% back-reference — prompt b's text seen
// by the LLM contains prompt a's resolved value.
#[tokio::test]
async fn variable_back_reference_across_prompts() {
    let pipeline = Pipeline::new();
    pipeline.adapters.x2text.extracts("X is 42");
    pipeline.adapters.llm.respond_when("Find X", "42");
    pipeline.adapters.llm.respond_when("Given 42", "84");
    pipeline.platform.add_prompt_tool(
        "reg-1",
        tool_metadata(vec![
            prompt_spec("a", "Find X", "text"),
            prompt_spec("b", "Given %a%, compute Y", "text"),
        ]),
    );

    let result = pipeline.task().run(pipeline.request()).await.unwrap();

    assert_eq!(result["output"]["a"], "42");
    assert_eq!(result["output"]["b"], "84");
    assert!(
        pipeline
            .adapters
            .llm
            .prompts()
            .iter()
            .any(|p| p.contains("Given 42, compute Y"))
    );
}

// Scenario: two prompts with identical chunking tuples — exactly one index
// dispatch for the file.
#[tokio::test]
async fn indexing_dedup_across_prompts() {
    let pipeline = Pipeline::new();
    pipeline.adapters.x2text.extracts("content");
    pipeline.platform.add_prompt_tool(
        "reg-1",
        tool_metadata(vec![
            prompt_spec("p1", "First question", "text"),
            prompt_spec("p2", "Second question", "text"),
        ]),
    );

    pipeline.task().run(pipeline.request()).await.unwrap();

    let index_count = pipeline
        .sent_task_names()
        .iter()
        .filter(|n| *n == "execute_index")
        .count();
    assert_eq!(index_count, 1);
}

// Scenario: smart-table shortcut — a table output whose prompt is a JSON
// schema skips extract and index entirely.
#[tokio::test]
async fn smart_table_skips_extract_and_index() {
    let pipeline = Pipeline::new();
    pipeline
        .adapters
        .llm
        .respond_default("{\"col1\": \"a\", \"col2\": \"b\"}");

    let mut table_prompt = prompt_spec("rows", "{\"col1\": \"string\"}", "json");
    table_prompt["table_settings"] = json!({});
    pipeline
        .platform
        .add_prompt_tool("reg-1", tool_metadata(vec![table_prompt]));

    let result = pipeline.task().run(pipeline.request()).await.unwrap();

    assert_eq!(pipeline.sent_task_names(), vec!["execute_answer_prompt"]);
    assert_eq!(result["output"]["rows"], json!({"col1": "a", "col2": "b"}));
}

// A failed operation propagates its error verbatim and leaves no artifact.
#[tokio::test]
async fn adapter_failure_stops_the_pipeline() {
    let pipeline = Pipeline::new();
    pipeline.adapters.x2text.fail_with("scanner unplugged");
    pipeline.platform.add_prompt_tool(
        "reg-1",
        tool_metadata(vec![prompt_spec("revenue", "What is the revenue?", "text")]),
    );

    let err = pipeline.task().run(pipeline.request()).await.unwrap_err();
    match err {
        StructureToolError::Dispatch { operation, message } => {
            assert_eq!(operation, "extract");
            assert!(message.contains("scanner unplugged"));
        }
        other => panic!("expected dispatch error, got {other}"),
    }
    assert!(!pipeline.root.path().join("out/a.json").exists());
}

// The queue wire contract: envelopes survive the round-trip intact.
#[tokio::test]
async fn contexts_round_trip_through_the_queue() {
    let pipeline = Pipeline::new();
    pipeline.adapters.x2text.extracts("text");
    pipeline.platform.add_prompt_tool(
        "reg-1",
        tool_metadata(vec![prompt_spec("f", "Question", "text")]),
    );

    pipeline.task().run(pipeline.request()).await.unwrap();

    for sent in pipeline.backend.sent_tasks() {
        let restored = ExecutionContext::from_wire(sent.payload.clone()).unwrap();
        assert_eq!(restored.executor_name, "legacy");
        assert_eq!(restored.run_id, "fe-1");
        assert_eq!(sent.name, format!("execute_{}", restored.operation));
        // And the result side validates as an envelope.
        let result = ExecutionResult::ok(serde_json::Map::new());
        assert!(ExecutionResult::from_wire(result.to_wire().unwrap()).is_ok());
    }
}
