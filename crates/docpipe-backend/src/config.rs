// SPDX-License-Identifier: MIT OR Apache-2.0
//! Backend selection and per-backend configuration.
//!
//! Each backend surfaces only the fields it needs; configuration set for a
//! backend that is not selected is rejected at construction time.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Environment variable selecting the backend.
pub const BACKEND_TYPE_ENV: &str = "TASK_BACKEND_TYPE";

/// Configuration errors, surfaced at startup and never wrapped in results.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    /// `TASK_BACKEND_TYPE` holds an unknown value.
    #[error("unsupported backend type '{0}' (expected celery, hatchet, or temporal)")]
    UnsupportedType(String),

    /// A required variable is missing or empty.
    #[error("environment variable '{var}' is required for the {backend} backend")]
    MissingVar {
        /// Name of the missing variable.
        var: String,
        /// Backend requiring it.
        backend: BackendType,
    },

    /// A variable belonging to a different backend was set.
    #[error("'{var}' does not apply to the {selected} backend")]
    ForeignVar {
        /// The out-of-place variable.
        var: String,
        /// The selected backend.
        selected: BackendType,
    },

    /// A variable holds a value that fails to parse.
    #[error("invalid value for '{var}': {message}")]
    InvalidValue {
        /// The offending variable.
        var: String,
        /// What went wrong.
        message: String,
    },
}

/// Supported queue brokers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendType {
    /// Celery protocol over a Redis broker.
    Celery,
    /// Hatchet workflow engine.
    Hatchet,
    /// Temporal workflow engine.
    Temporal,
}

impl BackendType {
    /// The lower-snake wire value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendType::Celery => "celery",
            BackendType::Hatchet => "hatchet",
            BackendType::Temporal => "temporal",
        }
    }
}

impl fmt::Display for BackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "celery" => Ok(BackendType::Celery),
            "hatchet" => Ok(BackendType::Hatchet),
            "temporal" => Ok(BackendType::Temporal),
            other => Err(ConfigError::UnsupportedType(other.to_string())),
        }
    }
}

/// Celery backend settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CeleryConfig {
    /// Broker connection URL (`redis://…`).
    pub broker_url: String,
    /// Result backend connection URL.
    pub result_backend: String,
}

/// Hatchet backend settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HatchetConfig {
    /// Client token.
    pub token: String,
    /// Server URL.
    pub server_url: String,
    /// TLS strategy (`tls`, `mtls`, `none`).
    pub tls_strategy: String,
}

/// Temporal backend settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemporalConfig {
    /// Server host.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Namespace to bind to.
    pub namespace: String,
    /// Task queue name.
    pub task_queue: String,
}

/// Validated backend configuration, one variant per broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackendConfig {
    /// Celery over Redis.
    Celery(CeleryConfig),
    /// Hatchet.
    Hatchet(HatchetConfig),
    /// Temporal.
    Temporal(TemporalConfig),
}

const CELERY_VARS: [&str; 2] = ["TASK_CELERY_BROKER_URL", "TASK_CELERY_RESULT_BACKEND"];
const HATCHET_VARS: [&str; 3] = [
    "TASK_HATCHET_TOKEN",
    "TASK_HATCHET_SERVER_URL",
    "TASK_HATCHET_TLS_STRATEGY",
];
const TEMPORAL_VARS: [&str; 4] = [
    "TASK_TEMPORAL_HOST",
    "TASK_TEMPORAL_PORT",
    "TASK_TEMPORAL_NAMESPACE",
    "TASK_TEMPORAL_TASK_QUEUE",
];

impl BackendConfig {
    /// The backend this configuration selects.
    #[must_use]
    pub fn backend_type(&self) -> BackendType {
        match self {
            BackendConfig::Celery(_) => BackendType::Celery,
            BackendConfig::Hatchet(_) => BackendType::Hatchet,
            BackendConfig::Temporal(_) => BackendType::Temporal,
        }
    }

    /// Load from the process environment (`TASK_*` variables).
    ///
    /// # Errors
    ///
    /// Propagates every [`ConfigError`] the strict validation produces.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok().filter(|v| !v.is_empty()))
    }

    /// Load through an arbitrary variable lookup (testable form of
    /// [`BackendConfig::from_env`]).
    ///
    /// # Errors
    ///
    /// - [`ConfigError::UnsupportedType`] for an unknown `TASK_BACKEND_TYPE`
    /// - [`ConfigError::MissingVar`] for absent required fields
    /// - [`ConfigError::ForeignVar`] when a variable of a non-selected
    ///   backend is set
    /// - [`ConfigError::InvalidValue`] for unparseable values
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let backend: BackendType = lookup(BACKEND_TYPE_ENV)
            .unwrap_or_else(|| "celery".to_string())
            .parse()?;

        reject_foreign_vars(backend, &lookup)?;

        let require = |var: &str| -> Result<String, ConfigError> {
            lookup(var).ok_or_else(|| ConfigError::MissingVar {
                var: var.to_string(),
                backend,
            })
        };

        match backend {
            BackendType::Celery => Ok(BackendConfig::Celery(CeleryConfig {
                broker_url: require("TASK_CELERY_BROKER_URL")?,
                result_backend: require("TASK_CELERY_RESULT_BACKEND")?,
            })),
            BackendType::Hatchet => Ok(BackendConfig::Hatchet(HatchetConfig {
                token: require("TASK_HATCHET_TOKEN")?,
                server_url: lookup("TASK_HATCHET_SERVER_URL")
                    .unwrap_or_else(|| "https://app.hatchet.run".to_string()),
                tls_strategy: lookup("TASK_HATCHET_TLS_STRATEGY")
                    .unwrap_or_else(|| "tls".to_string()),
            })),
            BackendType::Temporal => {
                let port_raw = require("TASK_TEMPORAL_PORT")?;
                let port = port_raw.parse::<u16>().map_err(|e| ConfigError::InvalidValue {
                    var: "TASK_TEMPORAL_PORT".to_string(),
                    message: e.to_string(),
                })?;
                Ok(BackendConfig::Temporal(TemporalConfig {
                    host: require("TASK_TEMPORAL_HOST")?,
                    port,
                    namespace: require("TASK_TEMPORAL_NAMESPACE")?,
                    task_queue: lookup("TASK_TEMPORAL_TASK_QUEUE")
                        .unwrap_or_else(|| "task-queue".to_string()),
                }))
            }
        }
    }
}

fn reject_foreign_vars<F>(selected: BackendType, lookup: &F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let foreign: Vec<&str> = match selected {
        BackendType::Celery => [HATCHET_VARS.as_slice(), TEMPORAL_VARS.as_slice()].concat(),
        BackendType::Hatchet => [CELERY_VARS.as_slice(), TEMPORAL_VARS.as_slice()].concat(),
        BackendType::Temporal => [CELERY_VARS.as_slice(), HATCHET_VARS.as_slice()].concat(),
    };
    for var in foreign {
        if lookup(var).is_some() {
            return Err(ConfigError::ForeignVar {
                var: var.to_string(),
                selected,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn lookup_from<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        let map: BTreeMap<&str, &str> = pairs.iter().copied().collect();
        move |var| map.get(var).map(|v| (*v).to_string())
    }

    #[test]
    fn celery_config_loads() {
        let config = BackendConfig::from_lookup(lookup_from(&[
            ("TASK_BACKEND_TYPE", "celery"),
            ("TASK_CELERY_BROKER_URL", "redis://localhost:6379/0"),
            ("TASK_CELERY_RESULT_BACKEND", "redis://localhost:6379/1"),
        ]))
        .unwrap();
        assert_eq!(config.backend_type(), BackendType::Celery);
    }

    #[test]
    fn backend_type_defaults_to_celery() {
        let config = BackendConfig::from_lookup(lookup_from(&[
            ("TASK_CELERY_BROKER_URL", "redis://localhost:6379/0"),
            ("TASK_CELERY_RESULT_BACKEND", "redis://localhost:6379/1"),
        ]))
        .unwrap();
        assert_eq!(config.backend_type(), BackendType::Celery);
    }

    #[test]
    fn missing_required_var_names_it() {
        let err = BackendConfig::from_lookup(lookup_from(&[
            ("TASK_BACKEND_TYPE", "celery"),
            ("TASK_CELERY_BROKER_URL", "redis://localhost:6379/0"),
        ]))
        .unwrap_err();
        assert_eq!(
            err,
            ConfigError::MissingVar {
                var: "TASK_CELERY_RESULT_BACKEND".to_string(),
                backend: BackendType::Celery,
            }
        );
    }

    #[test]
    fn unknown_backend_type_rejected() {
        let err =
            BackendConfig::from_lookup(lookup_from(&[("TASK_BACKEND_TYPE", "rabbitmq")]))
                .unwrap_err();
        assert_eq!(err, ConfigError::UnsupportedType("rabbitmq".to_string()));
    }

    #[test]
    fn foreign_vars_rejected_not_silently_accepted() {
        let err = BackendConfig::from_lookup(lookup_from(&[
            ("TASK_BACKEND_TYPE", "celery"),
            ("TASK_CELERY_BROKER_URL", "redis://localhost:6379/0"),
            ("TASK_CELERY_RESULT_BACKEND", "redis://localhost:6379/1"),
            ("TASK_HATCHET_TOKEN", "tok"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::ForeignVar { .. }));
    }

    #[test]
    fn hatchet_defaults_apply() {
        let config = BackendConfig::from_lookup(lookup_from(&[
            ("TASK_BACKEND_TYPE", "hatchet"),
            ("TASK_HATCHET_TOKEN", "tok-1"),
        ]))
        .unwrap();
        match config {
            BackendConfig::Hatchet(hatchet) => {
                assert_eq!(hatchet.server_url, "https://app.hatchet.run");
                assert_eq!(hatchet.tls_strategy, "tls");
            }
            other => panic!("expected hatchet config, got {other:?}"),
        }
    }

    #[test]
    fn temporal_requires_host_port_namespace() {
        let err = BackendConfig::from_lookup(lookup_from(&[
            ("TASK_BACKEND_TYPE", "temporal"),
            ("TASK_TEMPORAL_HOST", "localhost"),
            ("TASK_TEMPORAL_PORT", "7233"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar { ref var, .. } if var == "TASK_TEMPORAL_NAMESPACE"));
    }

    #[test]
    fn temporal_port_must_parse() {
        let err = BackendConfig::from_lookup(lookup_from(&[
            ("TASK_BACKEND_TYPE", "temporal"),
            ("TASK_TEMPORAL_HOST", "localhost"),
            ("TASK_TEMPORAL_PORT", "not-a-port"),
            ("TASK_TEMPORAL_NAMESPACE", "default"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref var, .. } if var == "TASK_TEMPORAL_PORT"));
    }
}
