//! Execution backend client.
//!
//! Sends learner code to the execution backend and normalizes whatever comes
//! back (a well-formed response, an error status, a garbled body, or nothing
//! at all) into one [`ExecutionResult`] shape. [`ExecutionClient::submit`]
//! never fails: transport and protocol problems become diagnostic lines in
//! the result's `errors`, because for the learner an unreachable runner is
//! just another thing that went wrong with the run.
//!
//! # Endpoints
//!
//! - `POST {base}/compile` - compile and run, or syntax-check
//! - `GET {base}/languages` - languages the backend has enabled
//! - `GET {base}/health` - liveness probe

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{Backend, EduRunError, Result};
use crate::language::LanguageRegistry;

/// Default timeout for a full run, in seconds.
pub const DEFAULT_RUN_TIMEOUT_SECS: u64 = 30;

/// Default timeout for a syntax-only check, in seconds.
pub const DEFAULT_SYNTAX_TIMEOUT_SECS: u64 = 10;

/// Output line emitted by a clean syntax check.
pub const SYNTAX_OK_LINE: &str = "✅ Syntax is valid";

/// Timeout for the liveness probe.
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Request / Result
// ============================================================================

/// One execution request. Built per run and never mutated after dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRequest {
    /// Learner source code.
    pub code: String,
    /// Editor language identifier (resolved through the registry on submit).
    pub language_id: String,
    /// Execution timeout forwarded to the backend.
    pub timeout_seconds: u64,
    /// Only check syntax, do not run.
    pub syntax_only: bool,
}

impl ExecutionRequest {
    /// A full run with the default 30s timeout.
    #[must_use]
    pub fn run(code: impl Into<String>, language_id: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            language_id: language_id.into(),
            timeout_seconds: DEFAULT_RUN_TIMEOUT_SECS,
            syntax_only: false,
        }
    }

    /// A syntax-only check with the default 10s timeout.
    #[must_use]
    pub fn syntax_check(code: impl Into<String>, language_id: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            language_id: language_id.into(),
            timeout_seconds: DEFAULT_SYNTAX_TIMEOUT_SECS,
            syntax_only: true,
        }
    }

    /// Overrides the execution timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }
}

/// Normalized outcome of an execution request.
///
/// `output` and `errors` are always present, possibly empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    /// Standard output, one entry per line.
    pub output: Vec<String>,
    /// Error output or diagnostics, one entry per line.
    pub errors: Vec<String>,
    /// Execution time in seconds; the backend's figure when it reports one.
    pub execution_time_seconds: f64,
    /// When the result was produced on this side.
    pub timestamp: DateTime<Utc>,
}

impl ExecutionResult {
    /// Builds a result from a decoded backend response.
    ///
    /// Absent arrays become empty; the backend-reported time wins over the
    /// locally measured one. The two clocks are not synchronized, so the
    /// figure may disagree with what the caller measured around the call.
    #[must_use]
    pub fn from_response(response: CompileResponse, local_elapsed_secs: f64) -> Self {
        let execution_time_seconds = response.reported_time().unwrap_or(local_elapsed_secs);
        Self {
            output: response.output.unwrap_or_default(),
            errors: response.errors.unwrap_or_default(),
            execution_time_seconds,
            timestamp: Utc::now(),
        }
    }

    /// Builds a syntax-check result from a decoded backend response.
    ///
    /// A clean check yields the single affirmative line instead of whatever
    /// the backend printed.
    #[must_use]
    pub fn from_syntax_check(response: CompileResponse, local_elapsed_secs: f64) -> Self {
        let execution_time_seconds = response.reported_time().unwrap_or(local_elapsed_secs);
        let errors = response.errors.unwrap_or_default();
        let output = if response.success && errors.is_empty() {
            vec![SYNTAX_OK_LINE.to_string()]
        } else {
            Vec::new()
        };
        Self {
            output,
            errors,
            execution_time_seconds,
            timestamp: Utc::now(),
        }
    }

    /// Builds the result reported when the backend could not be used.
    #[must_use]
    pub fn failure(err: &EduRunError, base_url: &str, local_elapsed_secs: f64) -> Self {
        Self {
            output: Vec::new(),
            errors: vec![format!(
                "Execution failed ({}): {err}. Verify the execution backend is reachable at {base_url}",
                err.class()
            )],
            execution_time_seconds: local_elapsed_secs.max(0.0),
            timestamp: Utc::now(),
        }
    }

    /// Returns `true` if the run produced no error lines.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

// ============================================================================
// Wire Types
// ============================================================================

/// Body of `POST /compile`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompileRequest {
    /// Source code.
    pub code: String,
    /// Backend language identifier.
    pub language: String,
    /// Execution timeout in seconds.
    pub timeout: u64,
    /// Only check syntax.
    pub syntax_only: bool,
}

/// Body returned by `POST /compile`. Every field is optional on the wire.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompileResponse {
    /// Whether compilation and execution succeeded.
    #[serde(default)]
    pub success: bool,
    /// Output lines.
    #[serde(default)]
    pub output: Option<Vec<String>>,
    /// Error lines.
    #[serde(default)]
    pub errors: Option<Vec<String>>,
    /// Process exit code.
    #[serde(default)]
    pub exit_code: Option<i64>,
    /// Execution time measured by the backend, in seconds.
    #[serde(default)]
    pub execution_time: Option<f64>,
    /// Language the backend actually used.
    #[serde(default)]
    pub language: Option<String>,
    /// Pre-rendered human-readable summary.
    #[serde(default)]
    pub formatted_output: Option<String>,
}

impl CompileResponse {
    /// The backend-reported execution time, when it is a usable figure.
    fn reported_time(&self) -> Option<f64> {
        self.execution_time.filter(|t| t.is_finite() && *t > 0.0)
    }
}

/// One entry of `GET /languages`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendLanguage {
    /// Backend language identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Short description of the toolchain.
    #[serde(default)]
    pub description: String,
    /// Minimal example program.
    #[serde(default)]
    pub example: String,
}

impl BackendLanguage {
    /// Entry reported when the backend cannot list its languages.
    #[must_use]
    pub fn fallback() -> Self {
        Self {
            id: "javascript".to_string(),
            name: "JavaScript".to_string(),
            description: "JavaScript (fallback - backend not available)".to_string(),
            example: "console.log(\"Hello, World!\");".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct LanguagesResponse {
    #[serde(default)]
    languages: Vec<BackendLanguage>,
}

#[derive(Debug, Deserialize)]
struct HealthResponse {
    #[serde(default)]
    status: String,
}

// ============================================================================
// Backend Seam
// ============================================================================

/// Anything that can execute a request.
///
/// Implementations must always resolve to a result, never fail.
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    /// Executes the request.
    async fn submit(&self, request: &ExecutionRequest) -> ExecutionResult;
}

// ============================================================================
// HTTP Client
// ============================================================================

/// HTTP client for the execution backend.
#[derive(Debug, Clone)]
pub struct ExecutionClient {
    http: reqwest::Client,
    base_url: String,
    registry: LanguageRegistry,
    run_timeout_seconds: u64,
    syntax_timeout_seconds: u64,
    grace_seconds: u64,
}

impl ExecutionClient {
    /// Creates a client from the loaded configuration.
    pub fn new(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| EduRunError::network(Backend::Execution, e.to_string()))?;

        Ok(Self {
            http,
            base_url: config.execution_backend_url.trim_end_matches('/').to_string(),
            registry: LanguageRegistry::builtin().clone(),
            run_timeout_seconds: config.execution.run_timeout_seconds,
            syntax_timeout_seconds: config.execution.syntax_timeout_seconds,
            grace_seconds: config.execution.request_grace_seconds,
        })
    }

    /// Replaces the language registry used to resolve backend identifiers.
    #[must_use]
    pub fn with_registry(mut self, registry: LanguageRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Base URL this client talks to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Runs code with the configured run timeout.
    pub async fn execute(&self, code: &str, language_id: &str) -> ExecutionResult {
        let request =
            ExecutionRequest::run(code, language_id).with_timeout(self.run_timeout_seconds);
        self.submit(&request).await
    }

    /// Checks syntax with the configured syntax timeout.
    pub async fn check_syntax(&self, code: &str, language_id: &str) -> ExecutionResult {
        let request = ExecutionRequest::syntax_check(code, language_id)
            .with_timeout(self.syntax_timeout_seconds);
        self.submit(&request).await
    }

    /// Submits a request. Never fails.
    pub async fn submit(&self, request: &ExecutionRequest) -> ExecutionResult {
        let started = Instant::now();
        let backend_id = self.registry.resolve(&request.language_id).backend_id;

        let outcome = self.post_compile(request, &backend_id).await;
        let elapsed_duration = started.elapsed();
        let elapsed = elapsed_duration.as_secs_f64();
        let elapsed_ms = u64::try_from(elapsed_duration.as_millis()).unwrap_or(u64::MAX);

        match outcome {
            Ok(response) => {
                let result = if request.syntax_only {
                    ExecutionResult::from_syntax_check(response, elapsed)
                } else {
                    ExecutionResult::from_response(response, elapsed)
                };
                debug!(
                    language = %backend_id,
                    syntax_only = request.syntax_only,
                    output_lines = result.output.len(),
                    error_lines = result.errors.len(),
                    execution_time = result.execution_time_seconds,
                    elapsed_ms,
                    "Execution completed"
                );
                result
            }
            Err(err) => {
                warn!(
                    language = %backend_id,
                    class = %err.class(),
                    transient = err.is_transient(),
                    elapsed_ms,
                    error = %err,
                    "Execution request failed"
                );
                ExecutionResult::failure(&err, &self.base_url, elapsed)
            }
        }
    }

    async fn post_compile(
        &self,
        request: &ExecutionRequest,
        backend_id: &str,
    ) -> Result<CompileResponse> {
        let url = format!("{}/compile", self.base_url);
        // The backend enforces `timeout` itself; leave it room to answer.
        let http_timeout = request.timeout_seconds.saturating_add(self.grace_seconds);
        let body = CompileRequest {
            code: request.code.clone(),
            language: backend_id.to_string(),
            timeout: request.timeout_seconds,
            syntax_only: request.syntax_only,
        };

        let response = self
            .http
            .post(&url)
            .timeout(Duration::from_secs(http_timeout))
            .json(&body)
            .send()
            .await
            .map_err(|e| EduRunError::from_reqwest(Backend::Execution, http_timeout, &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(EduRunError::protocol(
                Backend::Execution,
                Some(status.as_u16()),
                format!("HTTP {status}"),
            ));
        }

        response
            .json::<CompileResponse>()
            .await
            .map_err(|e| EduRunError::from_reqwest(Backend::Execution, http_timeout, &e))
    }

    /// Lists the backend's enabled languages.
    ///
    /// Falls back to a single JavaScript entry when the backend cannot answer.
    pub async fn supported_languages(&self) -> Vec<BackendLanguage> {
        match self.fetch_languages().await {
            Ok(languages) => languages,
            Err(err) => {
                warn!(error = %err, "Failed to fetch supported languages");
                vec![BackendLanguage::fallback()]
            }
        }
    }

    async fn fetch_languages(&self) -> Result<Vec<BackendLanguage>> {
        let url = format!("{}/languages", self.base_url);
        let timeout_secs = HEALTH_TIMEOUT.as_secs();
        let response = self
            .http
            .get(&url)
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
            .map_err(|e| EduRunError::from_reqwest(Backend::Execution, timeout_secs, &e))?
            .error_for_status()
            .map_err(|e| EduRunError::from_reqwest(Backend::Execution, timeout_secs, &e))?;

        let body: LanguagesResponse = response
            .json()
            .await
            .map_err(|e| EduRunError::from_reqwest(Backend::Execution, timeout_secs, &e))?;
        Ok(body.languages)
    }

    /// Liveness probe: `true` only when the backend reports itself healthy.
    pub async fn health(&self) -> bool {
        let url = format!("{}/health", self.base_url);
        let response = match self.http.get(&url).timeout(HEALTH_TIMEOUT).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Execution backend unreachable");
                return false;
            }
        };

        match response.json::<HealthResponse>().await {
            Ok(body) if body.status == "healthy" => {
                info!(url = %url, "Execution backend healthy");
                true
            }
            Ok(body) => {
                warn!(status = %body.status, "Execution backend reports unhealthy status");
                false
            }
            Err(e) => {
                warn!(error = %e, "Execution backend health response unreadable");
                false
            }
        }
    }
}

#[async_trait]
impl ExecutionBackend for ExecutionClient {
    async fn submit(&self, request: &ExecutionRequest) -> ExecutionResult {
        Self::submit(self, request).await
    }
}
