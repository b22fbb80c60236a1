// SPDX-License-Identifier: MIT OR Apache-2.0
//! Process-global name → executor mapping.
//!
//! Populated once at worker startup (each executor crate exposes a
//! `register()` the binary calls); read-mostly afterwards. `clear` exists
//! for tests only.

use crate::Executor;
use std::collections::BTreeMap;
use std::sync::{LazyLock, Mutex};

type ExecutorFactory = Box<dyn Fn() -> Box<dyn Executor> + Send + Sync>;

static REGISTRY: LazyLock<Mutex<BTreeMap<String, ExecutorFactory>>> =
    LazyLock::new(|| Mutex::new(BTreeMap::new()));

/// Errors from registry operations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// An executor with this name is already registered.
    #[error("executor '{name}' is already registered")]
    Duplicate {
        /// The colliding name.
        name: String,
    },

    /// No executor is registered under the requested name.
    ///
    /// The message lists what *is* registered — the usual cause is a worker
    /// deployment that forgot to register an executor crate.
    #[error("no executor registered under '{name}' (registered: {})", registered.join(", "))]
    Unknown {
        /// The unresolved name.
        name: String,
        /// Currently registered names, sorted.
        registered: Vec<String>,
    },
}

/// The process-wide executor registry.
pub struct ExecutorRegistry;

impl ExecutorRegistry {
    /// Register an executor type constructible via [`Default`].
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Duplicate`] when the name is taken.
    pub fn register<E>() -> Result<(), RegistryError>
    where
        E: Executor + Default + 'static,
    {
        Self::register_factory(|| Box::new(E::default()))
    }

    /// Register an explicit constructor.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Duplicate`] when the name is taken.
    pub fn register_factory<F>(factory: F) -> Result<(), RegistryError>
    where
        F: Fn() -> Box<dyn Executor> + Send + Sync + 'static,
    {
        let name = factory().name().to_string();
        let mut registry = REGISTRY.lock().expect("executor registry poisoned");
        if registry.contains_key(&name) {
            return Err(RegistryError::Duplicate { name });
        }
        tracing::debug!("registered executor '{name}'");
        registry.insert(name, Box::new(factory));
        Ok(())
    }

    /// Build a fresh instance of the named executor.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Unknown`] listing the registered names.
    pub fn get(name: &str) -> Result<Box<dyn Executor>, RegistryError> {
        let registry = REGISTRY.lock().expect("executor registry poisoned");
        match registry.get(name) {
            Some(factory) => Ok(factory()),
            None => Err(RegistryError::Unknown {
                name: name.to_string(),
                registered: registry.keys().cloned().collect(),
            }),
        }
    }

    /// Sorted names of all registered executors.
    #[must_use]
    pub fn list() -> Vec<String> {
        let registry = REGISTRY.lock().expect("executor registry poisoned");
        registry.keys().cloned().collect()
    }

    /// Remove every registration. Test support — never called in production
    /// paths.
    pub fn clear() {
        REGISTRY
            .lock()
            .expect("executor registry poisoned")
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ExecutorEnv;
    use async_trait::async_trait;
    use docpipe_core::{ExecutionContext, ExecutionResult};
    use serial_test::serial;

    struct EchoExecutor {
        name: &'static str,
    }

    #[async_trait]
    impl Executor for EchoExecutor {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn execute(
            &mut self,
            context: &ExecutionContext,
            _env: &ExecutorEnv,
        ) -> ExecutionResult {
            ExecutionResult::ok_entry("echo", context.operation.clone().into())
        }
    }

    fn register_echo(name: &'static str) {
        ExecutorRegistry::register_factory(move || Box::new(EchoExecutor { name })).unwrap();
    }

    #[test]
    #[serial(executor_registry)]
    fn register_and_get_fresh_instances() {
        ExecutorRegistry::clear();
        register_echo("alpha");

        let a = ExecutorRegistry::get("alpha").unwrap();
        let b = ExecutorRegistry::get("alpha").unwrap();
        assert_eq!(a.name(), "alpha");
        // Distinct boxes: instances are per-call.
        assert!(!std::ptr::eq(a.as_ref(), b.as_ref()));
    }

    #[test]
    #[serial(executor_registry)]
    fn duplicate_names_fail_loudly() {
        ExecutorRegistry::clear();
        register_echo("dup");
        let err =
            ExecutorRegistry::register_factory(|| Box::new(EchoExecutor { name: "dup" }))
                .unwrap_err();
        assert!(err.to_string().contains("already registered"));
    }

    #[test]
    #[serial(executor_registry)]
    fn unknown_name_lists_registered() {
        ExecutorRegistry::clear();
        register_echo("one");
        register_echo("two");

        let err = match ExecutorRegistry::get("missing") {
            Err(err) => err,
            Ok(_) => panic!("expected an error"),
        };
        let message = err.to_string();
        assert!(message.contains("missing"));
        assert!(message.contains("one"));
        assert!(message.contains("two"));
    }

    #[test]
    #[serial(executor_registry)]
    fn list_is_sorted_and_clear_empties() {
        ExecutorRegistry::clear();
        register_echo("charlie");
        register_echo("alpha");
        register_echo("bravo");

        assert_eq!(ExecutorRegistry::list(), vec!["alpha", "bravo", "charlie"]);
        ExecutorRegistry::clear();
        assert!(ExecutorRegistry::list().is_empty());
    }
}
