// SPDX-License-Identifier: MIT OR Apache-2.0
//! Worker startup configuration.

use docpipe_adapters::{AdapterFactory, MockAdapterFactory};
use docpipe_telemetry::{LogPublisher, NoopPublisher, RedisPublisher};
use std::sync::Arc;

/// Default worker concurrency.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Worker configuration errors, surfaced at startup.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum WorkerConfigError {
    /// No queues were provided anywhere.
    #[error(
        "no queues specified: pass --queues, or set TASK_QUEUES in development \
         environments"
    )]
    NoQueues,

    /// Production deployments must be explicit about their queues.
    #[error("ENVIRONMENT=prod requires an explicit --queues argument")]
    ProdRequiresQueues,

    /// A numeric variable failed to parse.
    #[error("invalid value for '{var}': {message}")]
    InvalidValue {
        /// The offending variable.
        var: &'static str,
        /// What went wrong.
        message: String,
    },

    /// The requested adapter bundle is not compiled into this worker.
    #[error("adapter bundle '{0}' is not bundled with this worker")]
    UnknownAdapterBundle(String),
}

/// Resolved worker settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSettings {
    /// Queues to consume.
    pub queues: Vec<String>,
    /// Worker instance name.
    pub worker_name: String,
    /// Concurrent task slots.
    pub concurrency: usize,
}

impl WorkerSettings {
    /// Resolve settings from CLI arguments and the process environment.
    ///
    /// # Errors
    ///
    /// See [`WorkerSettings::resolve`].
    pub fn from_env(
        cli_queues: Vec<String>,
        cli_concurrency: Option<usize>,
    ) -> Result<Self, WorkerConfigError> {
        Self::resolve(cli_queues, cli_concurrency, |var| {
            std::env::var(var).ok().filter(|v| !v.is_empty())
        })
    }

    /// Pure form of [`WorkerSettings::from_env`].
    ///
    /// Queue resolution priority: CLI → `TASK_QUEUES` (development only) →
    /// error. `ENVIRONMENT=prod` accepts only the CLI form.
    ///
    /// # Errors
    ///
    /// [`WorkerConfigError::NoQueues`], [`WorkerConfigError::ProdRequiresQueues`],
    /// or [`WorkerConfigError::InvalidValue`] for a bad concurrency value.
    pub fn resolve<F>(
        cli_queues: Vec<String>,
        cli_concurrency: Option<usize>,
        lookup: F,
    ) -> Result<Self, WorkerConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let is_prod = lookup("ENVIRONMENT").as_deref() == Some("prod");

        let queues: Vec<String> = if !cli_queues.is_empty() {
            cli_queues
        } else if is_prod {
            return Err(WorkerConfigError::ProdRequiresQueues);
        } else if let Some(raw) = lookup("TASK_QUEUES") {
            raw.split(',')
                .map(str::trim)
                .filter(|q| !q.is_empty())
                .map(str::to_string)
                .collect()
        } else {
            return Err(WorkerConfigError::NoQueues);
        };
        if queues.is_empty() {
            return Err(WorkerConfigError::NoQueues);
        }

        let concurrency = match cli_concurrency {
            Some(concurrency) => concurrency,
            None => match lookup("TASK_WORKER_CONCURRENCY") {
                Some(raw) => raw.parse::<usize>().map_err(|e| {
                    WorkerConfigError::InvalidValue {
                        var: "TASK_WORKER_CONCURRENCY",
                        message: e.to_string(),
                    }
                })?,
                None => DEFAULT_CONCURRENCY,
            },
        };

        let worker_name = match lookup("TASK_WORKER_NAME") {
            Some(name) => name,
            None => {
                let hostname =
                    lookup("HOSTNAME").unwrap_or_else(|| "local".to_string());
                let mut sorted = queues.clone();
                sorted.sort();
                format!("worker-{hostname}-{}", sorted.join("-"))
            }
        };

        Ok(Self {
            queues,
            worker_name,
            concurrency,
        })
    }
}

/// Resolve the adapter bundle the worker binds.
///
/// Vendor adapter implementations live outside this workspace; the bundled
/// development factory is selected with `ADAPTER_BUNDLE=mock` (the
/// default). Anything else is a startup error, the same doctrine applied
/// to missing plugins.
///
/// # Errors
///
/// [`WorkerConfigError::UnknownAdapterBundle`].
pub fn adapter_factory_from_env() -> Result<Arc<dyn AdapterFactory>, WorkerConfigError> {
    let bundle = std::env::var("ADAPTER_BUNDLE").unwrap_or_else(|_| "mock".to_string());
    match bundle.as_str() {
        "mock" => Ok(Arc::new(MockAdapterFactory::new())),
        other => Err(WorkerConfigError::UnknownAdapterBundle(other.to_string())),
    }
}

/// Build the telemetry publisher: redis pub/sub when `REDIS_HOST` is set,
/// no-op otherwise.
#[must_use]
pub fn publisher_from_env() -> Arc<dyn LogPublisher> {
    let Some(host) = std::env::var("REDIS_HOST").ok().filter(|v| !v.is_empty()) else {
        return Arc::new(NoopPublisher);
    };
    let port = std::env::var("REDIS_PORT").unwrap_or_else(|_| "6379".to_string());
    let user = std::env::var("REDIS_USER").unwrap_or_default();
    let password = std::env::var("REDIS_PASSWORD").unwrap_or_default();
    let auth = if user.is_empty() && password.is_empty() {
        String::new()
    } else {
        format!("{user}:{password}@")
    };
    let url = format!("redis://{auth}{host}:{port}/0");
    match redis::Client::open(url) {
        Ok(client) => Arc::new(RedisPublisher::new(client)),
        Err(err) => {
            tracing::warn!("telemetry redis client failed to build: {err}");
            Arc::new(NoopPublisher)
        }
    }
}
