// SPDX-License-Identifier: MIT OR Apache-2.0
//! Listing dedup scenario: a sub-folder file sharing a top-level file's
//! name is suppressed, with a "duplicate" log line published.

use docpipe_source::{LocalSourceFs, SourceConfig, SourceConnector};
use docpipe_telemetry::{LogStage, MemoryPublisher, WorkflowLogger};
use docpipe_workflow::MemoryWorkflowStore;
use std::collections::BTreeMap;
use std::sync::Arc;

#[tokio::test]
async fn duplicate_file_name_in_subfolder_is_listed_once() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.pdf"), b"top-level bytes").unwrap();
    std::fs::create_dir(dir.path().join("archive")).unwrap();
    std::fs::write(dir.path().join("archive/a.pdf"), b"nested bytes").unwrap();
    std::fs::write(dir.path().join("b.pdf"), b"other file").unwrap();

    let store = Arc::new(MemoryWorkflowStore::new());
    let publisher = Arc::new(MemoryPublisher::new());
    let logger = WorkflowLogger::new(publisher.clone(), "exec-1", LogStage::Build, "exec-1", None);

    let connector = SourceConnector::filesystem(
        "wf-1",
        None,
        SourceConfig {
            folders_to_process: vec![dir.path().to_string_lossy().into_owned()],
            process_sub_directories: true,
            ..SourceConfig::default()
        },
        Arc::new(LocalSourceFs::new()),
        store.clone(),
        store.clone(),
        store,
        logger,
    );

    let (files, count) = connector
        .list_files_from_source(BTreeMap::new())
        .await
        .unwrap();

    assert_eq!(count, 2);
    let names: Vec<&str> = files.values().map(|f| f.file_name.as_str()).collect();
    assert_eq!(names.iter().filter(|n| **n == "a.pdf").count(), 1);

    // File numbers are 1-based and dense.
    let mut numbers: Vec<u32> = files.values().filter_map(|f| f.file_number).collect();
    numbers.sort_unstable();
    assert_eq!(numbers, vec![1, 2]);

    assert!(
        publisher
            .messages()
            .iter()
            .any(|m| m.to_lowercase().contains("duplicate")),
        "expected a duplicate log line"
    );
}
