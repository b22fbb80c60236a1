// SPDX-License-Identifier: MIT OR Apache-2.0
//! Startup health probes.
//!
//! Three independent probes run in order — configuration, dependencies,
//! backend connection — each timed and verdicted; one unhealthy probe fails
//! the aggregate.

use crate::config::{BackendConfig, BackendType};
use crate::{TaskBackend, build_backend};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Instant;

/// Verdict of one probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeStatus {
    /// The probe passed.
    Healthy,
    /// The probe failed.
    Unhealthy,
}

/// Result of one probe.
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheck {
    /// Probe name (`configuration`, `dependencies`, `backend_connection`).
    pub name: &'static str,
    /// Verdict.
    pub status: ProbeStatus,
    /// Human-readable detail.
    pub message: String,
    /// Probe duration in milliseconds.
    pub duration_ms: f64,
}

impl HealthCheck {
    /// Whether the probe passed.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.status == ProbeStatus::Healthy
    }
}

/// Aggregate of all probes.
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    /// True only when every probe passed.
    pub is_healthy: bool,
    /// Individual probe results, in execution order.
    pub checks: Vec<HealthCheck>,
    /// When the probes ran.
    pub timestamp: DateTime<Utc>,
}

/// Runs the three startup probes for a backend configuration.
pub struct HealthChecker {
    config: BackendConfig,
}

impl HealthChecker {
    /// A checker for `config`.
    #[must_use]
    pub fn new(config: BackendConfig) -> Self {
        Self { config }
    }

    /// Probe 1: is the configuration internally valid?
    #[must_use]
    pub fn check_configuration(&self) -> HealthCheck {
        let started = Instant::now();
        let backend = self.config.backend_type();
        let problem = match &self.config {
            BackendConfig::Celery(celery) => {
                if let Err(err) = redis::Client::open(celery.broker_url.as_str()) {
                    Some(format!("broker_url is not a valid redis URL: {err}"))
                } else if let Err(err) = redis::Client::open(celery.result_backend.as_str()) {
                    Some(format!("result_backend is not a valid redis URL: {err}"))
                } else {
                    None
                }
            }
            BackendConfig::Hatchet(hatchet) => {
                (!["tls", "mtls", "none"].contains(&hatchet.tls_strategy.as_str()))
                    .then(|| format!("unknown tls_strategy '{}'", hatchet.tls_strategy))
            }
            BackendConfig::Temporal(temporal) => (temporal.port == 0)
                .then(|| "port 0 is not a reachable temporal endpoint".to_string()),
        };

        match problem {
            None => HealthCheck {
                name: "configuration",
                status: ProbeStatus::Healthy,
                message: format!("{backend} configuration is valid"),
                duration_ms: millis_since(started),
            },
            Some(message) => HealthCheck {
                name: "configuration",
                status: ProbeStatus::Unhealthy,
                message,
                duration_ms: millis_since(started),
            },
        }
    }

    /// Probe 2: is the selected backend's transport bundled?
    #[must_use]
    pub fn check_dependencies(&self) -> HealthCheck {
        let started = Instant::now();
        let backend = self.config.backend_type();
        let (status, message) = match backend {
            BackendType::Celery => (
                ProbeStatus::Healthy,
                "celery transport (redis) is bundled".to_string(),
            ),
            BackendType::Hatchet | BackendType::Temporal => (
                ProbeStatus::Unhealthy,
                format!("the {backend} transport is not bundled with this worker"),
            ),
        };
        HealthCheck {
            name: "dependencies",
            status,
            message,
            duration_ms: millis_since(started),
        }
    }

    /// Probe 3: does the broker answer?
    pub async fn check_backend_connection(&self) -> HealthCheck {
        let started = Instant::now();
        let backend = self.config.backend_type();
        match build_backend(&self.config) {
            Ok(transport) => {
                if transport.is_connected().await {
                    HealthCheck {
                        name: "backend_connection",
                        status: ProbeStatus::Healthy,
                        message: format!("{backend} backend is reachable"),
                        duration_ms: millis_since(started),
                    }
                } else {
                    HealthCheck {
                        name: "backend_connection",
                        status: ProbeStatus::Unhealthy,
                        message: format!("{backend} backend is not reachable"),
                        duration_ms: millis_since(started),
                    }
                }
            }
            Err(err) => HealthCheck {
                name: "backend_connection",
                status: ProbeStatus::Unhealthy,
                message: format!("backend construction failed: {err}"),
                duration_ms: millis_since(started),
            },
        }
    }

    /// Run all probes in order and aggregate.
    pub async fn check_all(&self) -> HealthStatus {
        tracing::info!(
            backend = %self.config.backend_type(),
            "running backend health checks"
        );
        let checks = vec![
            self.check_configuration(),
            self.check_dependencies(),
            self.check_backend_connection().await,
        ];
        HealthStatus {
            is_healthy: checks.iter().all(HealthCheck::is_healthy),
            checks,
            timestamp: Utc::now(),
        }
    }
}

fn millis_since(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CeleryConfig, HatchetConfig};

    fn celery_config() -> BackendConfig {
        BackendConfig::Celery(CeleryConfig {
            broker_url: "redis://localhost:6379/0".into(),
            result_backend: "redis://localhost:6379/1".into(),
        })
    }

    #[test]
    fn configuration_probe_validates_urls() {
        let healthy = HealthChecker::new(celery_config()).check_configuration();
        assert!(healthy.is_healthy());
        assert!(healthy.duration_ms >= 0.0);

        let broken = HealthChecker::new(BackendConfig::Celery(CeleryConfig {
            broker_url: "definitely not a url".into(),
            result_backend: "redis://localhost:6379/1".into(),
        }))
        .check_configuration();
        assert!(!broken.is_healthy());
        assert!(broken.message.contains("broker_url"));
    }

    #[test]
    fn dependency_probe_reports_unbundled_transports() {
        let checker = HealthChecker::new(BackendConfig::Hatchet(HatchetConfig {
            token: "tok".into(),
            server_url: "https://app.hatchet.run".into(),
            tls_strategy: "tls".into(),
        }));
        let check = checker.check_dependencies();
        assert!(!check.is_healthy());
        assert!(check.message.contains("hatchet"));
    }

    #[tokio::test]
    async fn one_unhealthy_probe_fails_the_aggregate() {
        let checker = HealthChecker::new(BackendConfig::Hatchet(HatchetConfig {
            token: "tok".into(),
            server_url: "https://app.hatchet.run".into(),
            tls_strategy: "tls".into(),
        }));
        let status = checker.check_all().await;
        assert!(!status.is_healthy);
        assert_eq!(status.checks.len(), 3);
        assert_eq!(status.checks[0].name, "configuration");
        assert_eq!(status.checks[1].name, "dependencies");
        assert_eq!(status.checks[2].name, "backend_connection");
    }
}
