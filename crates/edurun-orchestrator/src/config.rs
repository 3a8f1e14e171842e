//! Configuration types for the EduRun orchestrator.
//!
//! This module provides the configuration structures that point the
//! orchestrator at its two backends and tune the timeouts and debounce
//! window used by the request coordinator.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{EduRunError, Result};

/// The default config file name.
const CONFIG_FILE_NAME: &str = "edurun.json";

/// Default base URL of the execution backend API.
fn default_execution_backend_url() -> String {
    "http://localhost:5000/api".to_string()
}

/// Default language for runs that do not name one.
fn default_language() -> String {
    "javascript".to_string()
}

/// Default timeout in seconds for a full run.
const fn default_run_timeout() -> u64 {
    30
}

/// Default timeout in seconds for a syntax-only check.
const fn default_syntax_timeout() -> u64 {
    10
}

/// Extra seconds the HTTP call waits beyond the execution timeout.
const fn default_request_grace() -> u64 {
    5
}

/// Default base URL of the generative backend.
fn default_feedback_backend_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

/// Default generative model.
fn default_model() -> String {
    "gemini-2.0-flash".to_string()
}

/// Default environment variable holding the generative backend credential.
fn default_api_key_env() -> String {
    "EDURUN_GENERATIVE_API_KEY".to_string()
}

/// Default timeout in seconds for a generative backend call.
const fn default_feedback_timeout() -> u64 {
    30
}

/// Default quiet period before a feedback analysis is dispatched.
const fn default_debounce_ms() -> u64 {
    500
}

/// Default event buffer per subscriber.
const fn default_event_capacity() -> usize {
    100
}

/// Main configuration for EduRun.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Base URL of the execution backend API (including the `/api` prefix).
    #[serde(default = "default_execution_backend_url")]
    pub execution_backend_url: String,

    /// Language used when a run does not name one.
    #[serde(default = "default_language")]
    pub default_language: String,

    /// Execution request settings.
    #[serde(default)]
    pub execution: ExecutionConfig,

    /// Generative feedback settings.
    #[serde(default)]
    pub feedback: FeedbackConfig,

    /// Request coordinator settings.
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            execution_backend_url: default_execution_backend_url(),
            default_language: default_language(),
            execution: ExecutionConfig::default(),
            feedback: FeedbackConfig::default(),
            coordinator: CoordinatorConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration from the current working directory.
    ///
    /// Looks for `edurun.json` in the current directory. If found, loads and
    /// validates the configuration. If not found, returns default configuration.
    pub fn load() -> Result<Self> {
        let current_dir = std::env::current_dir().map_err(|e| {
            EduRunError::config_parse(
                "<current directory>",
                format!("cannot determine current directory: {e}"),
            )
        })?;
        Self::load_from_dir(&current_dir)
    }

    /// Loads configuration from a specific directory.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        let config_path = dir.join(CONFIG_FILE_NAME);
        Self::load_from_file(&config_path)
    }

    /// Loads configuration from a specific file path.
    ///
    /// If the file does not exist, returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns `EduRunError::ConfigParseError` if the file exists but contains
    /// invalid JSON, and `EduRunError::ConfigValidationError` if the values
    /// are out of range.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                config.validate()?;
                return Ok(config);
            }
            Err(e) => {
                return Err(EduRunError::config_parse(
                    path,
                    format!("failed to read file: {e}"),
                ));
            }
        };

        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| EduRunError::config_parse(path, e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `EduRunError::ConfigValidationError` if any validation check fails.
    pub fn validate(&self) -> Result<()> {
        if self.execution_backend_url.trim().is_empty() {
            return Err(EduRunError::config_validation(
                "executionBackendUrl must not be empty",
                "Set executionBackendUrl to the execution backend API, e.g. http://localhost:5000/api",
            ));
        }

        if self.default_language.trim().is_empty() {
            return Err(EduRunError::config_validation(
                "defaultLanguage must not be empty",
                "Set defaultLanguage to a language id such as 'javascript' in your edurun.json",
            ));
        }

        if self.execution.run_timeout_seconds == 0 {
            return Err(EduRunError::config_validation(
                "execution.runTimeoutSeconds must be greater than 0",
                "Set execution.runTimeoutSeconds to at least 1 second in your edurun.json",
            ));
        }

        if self.execution.syntax_timeout_seconds == 0 {
            return Err(EduRunError::config_validation(
                "execution.syntaxTimeoutSeconds must be greater than 0",
                "Set execution.syntaxTimeoutSeconds to at least 1 second in your edurun.json",
            ));
        }

        if self.feedback.backend_url.trim().is_empty() {
            return Err(EduRunError::config_validation(
                "feedback.backendUrl must not be empty",
                "Set feedback.backendUrl to the generative backend or your proxy in edurun.json",
            ));
        }

        if self.feedback.model.trim().is_empty() {
            return Err(EduRunError::config_validation(
                "feedback.model must not be empty",
                "Set feedback.model to a model name such as 'gemini-2.0-flash'",
            ));
        }

        if self.feedback.request_timeout_seconds == 0 {
            return Err(EduRunError::config_validation(
                "feedback.requestTimeoutSeconds must be greater than 0",
                "Set feedback.requestTimeoutSeconds to at least 1 second in your edurun.json",
            ));
        }

        if self.coordinator.debounce_ms == 0 {
            return Err(EduRunError::config_validation(
                "coordinator.debounceMs must be greater than 0",
                "Set coordinator.debounceMs to a quiet period such as 500 in your edurun.json",
            ));
        }

        if self.coordinator.event_capacity == 0 {
            return Err(EduRunError::config_validation(
                "coordinator.eventCapacity must be greater than 0",
                "Set coordinator.eventCapacity to at least 1 in your edurun.json",
            ));
        }

        Ok(())
    }
}

/// Execution request settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionConfig {
    /// Timeout sent with full runs, in seconds.
    #[serde(default = "default_run_timeout")]
    pub run_timeout_seconds: u64,

    /// Timeout sent with syntax-only checks, in seconds.
    #[serde(default = "default_syntax_timeout")]
    pub syntax_timeout_seconds: u64,

    /// Seconds the HTTP call waits beyond the execution timeout.
    #[serde(default = "default_request_grace")]
    pub request_grace_seconds: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            run_timeout_seconds: default_run_timeout(),
            syntax_timeout_seconds: default_syntax_timeout(),
            request_grace_seconds: default_request_grace(),
        }
    }
}

/// Generative feedback settings.
///
/// The credential itself never lives in the config file; only the name of
/// the environment variable that holds it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackConfig {
    /// Base URL of the generative backend, or of a proxy in front of it.
    #[serde(default = "default_feedback_backend_url")]
    pub backend_url: String,

    /// Model name used in the `generateContent` path.
    #[serde(default = "default_model")]
    pub model: String,

    /// Environment variable holding the credential.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Timeout for one generative call, in seconds.
    #[serde(default = "default_feedback_timeout")]
    pub request_timeout_seconds: u64,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            backend_url: default_feedback_backend_url(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            request_timeout_seconds: default_feedback_timeout(),
        }
    }
}

impl FeedbackConfig {
    /// Reads the credential from the configured environment variable.
    ///
    /// Returns `None` when the variable is unset or empty, which is the
    /// expected setup when `backend_url` points at a credential-holding proxy.
    #[must_use]
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }
}

/// Request coordinator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoordinatorConfig {
    /// Quiet period before a feedback analysis is dispatched, in milliseconds.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Buffered events per subscriber before slow subscribers lag.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl CoordinatorConfig {
    /// Returns the debounce window as a `Duration`.
    #[must_use]
    pub const fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}
