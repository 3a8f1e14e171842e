//! Gemini `generateContent` client.
//!
//! Implements [`GenerativeBackend`] over the Generative Language REST API, or
//! over any proxy exposing the same contract at `feedback.backendUrl`. The
//! credential is read from the environment and sent as a header. It never
//! appears in the request URL.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::FeedbackConfig;
use crate::error::{Backend, EduRunError, Result};
use crate::feedback::GenerativeBackend;
use crate::prompt::{GenerationRequest, SamplingParams};

/// Header carrying the API key.
pub const API_KEY_HEADER: &str = "x-goog-api-key";

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: SamplingParams,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

impl GenerateContentResponse {
    /// Text of the first part of the first candidate.
    fn first_text(self) -> Option<String> {
        self.candidates
            .into_iter()
            .next()?
            .content?
            .parts
            .into_iter()
            .next()?
            .text
    }
}

// ============================================================================
// Client
// ============================================================================

/// HTTP client for the generative feedback backend.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    timeout_secs: u64,
}

impl GeminiClient {
    /// Creates a client from the feedback configuration.
    pub fn new(config: &FeedbackConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()
            .map_err(|e| EduRunError::network(Backend::Generative, e.to_string()))?;

        let api_key = config.api_key();
        if api_key.is_none() {
            warn!(
                env = %config.api_key_env,
                "No generative API key configured; requests go out unauthenticated"
            );
        }

        Ok(Self {
            http,
            endpoint: format!(
                "{}/models/{}:generateContent",
                config.backend_url.trim_end_matches('/'),
                config.model
            ),
            api_key,
            timeout_secs: config.request_timeout_seconds,
        })
    }

    /// Full `generateContent` URL.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl GenerativeBackend for GeminiClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let body = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: &request.prompt,
                }],
            }],
            generation_config: request.sampling,
        };

        let mut builder = self.http.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.header(API_KEY_HEADER, key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| EduRunError::from_reqwest(Backend::Generative, self.timeout_secs, &e))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| EduRunError::from_reqwest(Backend::Generative, self.timeout_secs, &e))?;

        let text = read_envelope(status, &body)?;
        debug!(len = text.len(), "Generative backend answered");
        Ok(text)
    }
}

/// Extracts the candidate text from a `generateContent` reply.
///
/// A body that is not a JSON envelope is a `Protocol` error. A decodable
/// body without candidate text is `ModelParse` whatever the status; 4xx/5xx
/// error envelopes carry an `error` object instead of candidates.
fn read_envelope(status: reqwest::StatusCode, body: &[u8]) -> Result<String> {
    let envelope: GenerateContentResponse = serde_json::from_slice(body).map_err(|e| {
        EduRunError::protocol(
            Backend::Generative,
            Some(status.as_u16()),
            format!("HTTP {status}: {e}"),
        )
    })?;

    if !status.is_success() {
        warn!(
            status = status.as_u16(),
            "Generative backend answered with an error envelope"
        );
        return Err(EduRunError::model_parse(format!(
            "HTTP {status} reply has no candidate text"
        )));
    }

    envelope
        .first_text()
        .ok_or_else(|| EduRunError::model_parse("response has no candidate text"))
}
