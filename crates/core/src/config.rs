// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed configuration for both services.
//!
//! Loaded from a TOML file; every section and field has the documented
//! default so a missing file yields a fully working local setup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Worker lease polling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub interval_ms: u64,
    pub max_concurrent_jobs: u32,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: 5_000,
            max_concurrent_jobs: 1,
        }
    }
}

/// Lease lifetime and reap policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LeaseConfig {
    pub initial_minutes: f64,
    pub renew_minutes: f64,
    pub max_retries: u32,
}

impl LeaseConfig {
    pub fn initial_ms(&self) -> u64 {
        (self.initial_minutes * 60_000.0) as u64
    }

    pub fn renew_ms(&self) -> u64 {
        (self.renew_minutes * 60_000.0) as u64
    }
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            initial_minutes: 120.0,
            renew_minutes: 10.0,
            max_retries: 3,
        }
    }
}

/// DAG executor knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Concurrent node evaluations inside one run.
    pub parallelism: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self { parallelism: 4 }
    }
}

/// Circuit breaker in front of the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub cooldown_seconds: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown_seconds: 60,
        }
    }
}

/// IAM token cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IamConfig {
    pub ttl_minutes: u64,
    pub refresh_window_minutes: u64,
}

impl IamConfig {
    pub fn ttl_ms(&self) -> u64 {
        self.ttl_minutes * 60_000
    }

    pub fn refresh_window_ms(&self) -> u64 {
        self.refresh_window_minutes * 60_000
    }
}

impl Default for IamConfig {
    fn default() -> Self {
        Self {
            ttl_minutes: 720,
            refresh_window_minutes: 30,
        }
    }
}

/// Webhook delivery backoff.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    pub backoff_ms: u64,
    pub backoff_cap_ms: u64,
    pub max_attempts: u32,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            backoff_ms: 1_000,
            backoff_cap_ms: 16_000,
            max_attempts: 5,
        }
    }
}

/// Per-run progress log directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressConfig {
    pub log_dir: PathBuf,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("logs"),
        }
    }
}

/// Dispatcher HTTP service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// Shared secret required on state-changing endpoints.
    pub backend_secret: String,
    /// Front-end inbound webhook; empty disables forwarding.
    pub ui_webhook_url: Option<String>,
    /// Reaper sweep interval.
    pub reap_interval_ms: u64,
    /// Base directory for batch output folders.
    pub batch_output_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8700".to_string(),
            backend_secret: String::new(),
            ui_webhook_url: None,
            reap_interval_ms: 30_000,
            batch_output_dir: PathBuf::from("batches"),
        }
    }
}

/// Relational store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://pipeworks.db".to_string(),
        }
    }
}

/// External chat-completion provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub base_url: String,
    /// Short-lived API key; used as the bearer directly.
    pub api_key: Option<String>,
    /// Long-lived OAuth token exchanged for IAM bearers.
    pub oauth_token: Option<String>,
    /// Token exchange endpoint for OAuth credentials.
    pub iam_url: String,
    pub default_model: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://llm.api.cloud.yandex.net/v1".to_string(),
            api_key: None,
            oauth_token: None,
            iam_url: "https://iam.api.cloud.yandex.net/iam/v1/tokens".to_string(),
            default_model: "default".to_string(),
        }
    }
}

/// Full service configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub polling: PollingConfig,
    pub lease: LeaseConfig,
    pub executor: ExecutorConfig,
    pub breaker: BreakerConfig,
    pub iam: IamConfig,
    pub webhook: WebhookConfig,
    pub progress: ProgressConfig,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub provider: ProviderConfig,
}

impl Config {
    /// Load from a TOML file; a missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        };
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
