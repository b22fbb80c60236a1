// SPDX-License-Identifier: MIT OR Apache-2.0
//! The platform RPC surface the driver consumes.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Mutex;

/// Errors from platform RPCs.
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    /// The RPC transport failed.
    #[error("platform RPC failed: {0}")]
    Rpc(String),
}

/// The platform-helper RPCs used by the structure tool.
///
/// Every call carries the platform key for authentication; a missing key is
/// a startup failure in the binding, not here.
#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// Fetch the exported prompt-studio tool document, if the registry id
    /// resolves there.
    async fn get_prompt_studio_tool(
        &self,
        prompt_registry_id: &str,
    ) -> Result<Option<Value>, PlatformError>;

    /// Fallback lookup in the agentic registry.
    async fn get_agentic_studio_tool(
        &self,
        agentic_registry_id: &str,
    ) -> Result<Option<Value>, PlatformError>;

    /// Fetch an LLM profile for overrides.
    async fn get_llm_profile(&self, profile_id: &str) -> Result<Value, PlatformError>;

    /// Fetch adapter configuration (credential decryption happens upstream).
    async fn get_adapter_config(
        &self,
        adapter_instance_id: &str,
    ) -> Result<Value, PlatformError>;
}

/// In-memory platform client for tests and local development.
#[derive(Default)]
pub struct MockPlatformClient {
    prompt_tools: Mutex<BTreeMap<String, Value>>,
    agentic_tools: Mutex<BTreeMap<String, Value>>,
    profiles: Mutex<BTreeMap<String, Value>>,
    adapter_configs: Mutex<BTreeMap<String, Value>>,
}

impl MockPlatformClient {
    /// An empty client; every lookup misses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an exported prompt-studio tool document.
    pub fn add_prompt_tool(&self, registry_id: impl Into<String>, tool_metadata: Value) {
        let mut doc = Map::new();
        doc.insert("tool_metadata".into(), tool_metadata);
        self.prompt_tools
            .lock()
            .unwrap()
            .insert(registry_id.into(), Value::Object(doc));
    }

    /// Register an agentic project document.
    pub fn add_agentic_tool(&self, registry_id: impl Into<String>, tool_metadata: Value) {
        let mut doc = Map::new();
        doc.insert("tool_metadata".into(), tool_metadata);
        self.agentic_tools
            .lock()
            .unwrap()
            .insert(registry_id.into(), Value::Object(doc));
    }

    /// Register an LLM profile.
    pub fn add_llm_profile(&self, profile_id: impl Into<String>, profile: Value) {
        self.profiles.lock().unwrap().insert(profile_id.into(), profile);
    }
}

#[async_trait]
impl PlatformClient for MockPlatformClient {
    async fn get_prompt_studio_tool(
        &self,
        prompt_registry_id: &str,
    ) -> Result<Option<Value>, PlatformError> {
        Ok(self.prompt_tools.lock().unwrap().get(prompt_registry_id).cloned())
    }

    async fn get_agentic_studio_tool(
        &self,
        agentic_registry_id: &str,
    ) -> Result<Option<Value>, PlatformError> {
        Ok(self
            .agentic_tools
            .lock()
            .unwrap()
            .get(agentic_registry_id)
            .cloned())
    }

    async fn get_llm_profile(&self, profile_id: &str) -> Result<Value, PlatformError> {
        self.profiles
            .lock()
            .unwrap()
            .get(profile_id)
            .cloned()
            .ok_or_else(|| PlatformError::Rpc(format!("no such profile: {profile_id}")))
    }

    async fn get_adapter_config(
        &self,
        adapter_instance_id: &str,
    ) -> Result<Value, PlatformError> {
        self.adapter_configs
            .lock()
            .unwrap()
            .get(adapter_instance_id)
            .cloned()
            .ok_or_else(|| {
                PlatformError::Rpc(format!("no such adapter instance: {adapter_instance_id}"))
            })
    }
}
