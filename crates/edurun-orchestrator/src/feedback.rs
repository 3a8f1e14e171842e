//! Feedback pipeline.
//!
//! Turns code and the errors of the last run into pedagogical hints. The
//! generative backend answers in free text that is expected to embed one
//! JSON object; the pipeline mines that object out, validates it and, when
//! anything goes wrong, degrades through a fixed ladder:
//!
//! | Tier | Condition | Bundle |
//! |------|-----------|--------|
//! | 0 | object decoded, both fields present | the backend's, at most 4 suggestions |
//! | 1 | response received but unusable | [`FeedbackBundle::exploring`] |
//! | 2 | no response | [`FeedbackBundle::encouragement`] |
//!
//! Nothing in this module ever reports a failure to the learner. Tier 2 in
//! particular never mentions networks, outages or errors.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{EduRunError, Result};
use crate::language::LanguageRegistry;
use crate::prompt::{self, GenerationRequest};

/// Maximum number of suggestions kept from a well-formed response.
pub const MAX_SUGGESTIONS: usize = 4;

// ============================================================================
// Data Model
// ============================================================================

/// What a suggestion is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SuggestionKind {
    /// Points at an error and where to look.
    ErrorFix,
    /// Suggests a better way to write working code.
    Improvement,
    /// Points at a concept worth studying.
    Learning,
}

impl SuggestionKind {
    /// Wire name of the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ErrorFix => "error-fix",
            Self::Improvement => "improvement",
            Self::Learning => "learning",
        }
    }
}

impl std::fmt::Display for SuggestionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One pedagogical hint.
///
/// Never meant to contain a complete working solution. That is enforced by
/// the prompt contract, not checked here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    /// Suggestion category (`type` on the wire).
    #[serde(rename = "type")]
    pub kind: SuggestionKind,
    /// Short title.
    pub title: String,
    /// Guidance text.
    pub description: String,
    /// Partial example or hint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_example: Option<String>,
}

impl Suggestion {
    fn canned(kind: SuggestionKind, title: &str, description: &str, code_example: &str) -> Self {
        Self {
            kind,
            title: title.to_string(),
            description: description.to_string(),
            code_example: Some(code_example.to_string()),
        }
    }
}

/// Feedback shown to the learner. Fields are never absent, only empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackBundle {
    /// At most [`MAX_SUGGESTIONS`] suggestions.
    pub suggestions: Vec<Suggestion>,
    /// Markdown learning section, possibly empty.
    pub learning_content: String,
}

impl FeedbackBundle {
    /// Tier 1: a response arrived but could not be used.
    #[must_use]
    pub fn exploring() -> Self {
        Self {
            suggestions: vec![Suggestion::canned(
                SuggestionKind::Learning,
                "Keep Exploring!",
                "Your mentor is here to guide your learning journey. Try running your code and see what happens!",
                "1. Change one small thing\n2. Run the program\n3. Compare the output with what you expected",
            )],
            learning_content: "Practice makes perfect! Keep experimenting with different code patterns and see what works.".to_string(),
        }
    }

    /// Tier 2: no response at all.
    #[must_use]
    pub fn encouragement() -> Self {
        Self {
            suggestions: vec![
                Suggestion::canned(
                    SuggestionKind::Learning,
                    "Code Analysis",
                    "I've looked over your code. Try experimenting with different approaches to deepen your understanding.",
                    "Try a value you already know the answer for,\nthen print what your code produces with it.",
                ),
                Suggestion::canned(
                    SuggestionKind::Improvement,
                    "Coding Tips",
                    "Breaking a problem into smaller parts makes it easier to solve. Consider what each part of your code is trying to accomplish.",
                    "Step 1: print the first intermediate result\nStep 2: print the next one\nStep 3: find where it differs from your expectation",
                ),
            ],
            learning_content: "Programming is a journey of continuous learning. When you face a challenge, break the problem down, test each part separately, and build your solution up step by step. This methodical approach will make you a stronger programmer.".to_string(),
        }
    }
}

/// Which rung of the fallback ladder produced a bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackTier {
    /// Tier 0: the backend's own structured answer.
    Structured,
    /// Tier 1: a response arrived but was not usable.
    Malformed,
    /// Tier 2: the backend did not answer.
    Unavailable,
}

impl FeedbackTier {
    /// Ladder position, 0 to 2.
    #[must_use]
    pub const fn level(self) -> u8 {
        match self {
            Self::Structured => 0,
            Self::Malformed => 1,
            Self::Unavailable => 2,
        }
    }

    /// Tier selected by a failed attempt.
    #[must_use]
    pub const fn for_error(err: &EduRunError) -> Self {
        if err.is_malformed_output() {
            Self::Malformed
        } else {
            Self::Unavailable
        }
    }
}

impl std::fmt::Display for FeedbackTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tier {}", self.level())
    }
}

/// A bundle together with the tier that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackReport {
    /// Ladder position.
    pub tier: FeedbackTier,
    /// What the learner sees.
    pub bundle: FeedbackBundle,
}

impl FeedbackReport {
    /// The fallback report for a failed attempt.
    #[must_use]
    pub fn fallback(err: &EduRunError) -> Self {
        let tier = FeedbackTier::for_error(err);
        let bundle = match tier {
            FeedbackTier::Malformed => FeedbackBundle::exploring(),
            FeedbackTier::Structured | FeedbackTier::Unavailable => FeedbackBundle::encouragement(),
        };
        Self { tier, bundle }
    }
}

// ============================================================================
// Parsing
// ============================================================================

/// Returns the first balanced `{...}` substring of `text`.
///
/// Braces inside JSON string literals (including escaped quotes) do not
/// count. Returns `None` when there is no opening brace or it never closes.
#[must_use]
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }

    None
}

/// Decodes a free-text generative response into a bundle.
///
/// # Errors
///
/// Returns `EduRunError::ModelParse` when no object can be found or decoded,
/// and `EduRunError::Validation` when a required field is missing.
pub fn parse_feedback(raw: &str) -> Result<FeedbackBundle> {
    let candidate = extract_json_object(raw)
        .ok_or_else(|| EduRunError::model_parse("no brace-delimited object in response"))?;

    let value: Value =
        serde_json::from_str(candidate).map_err(|e| EduRunError::model_parse(e.to_string()))?;

    let suggestions = match value.get("suggestions") {
        Some(list @ Value::Array(_)) => list.clone(),
        _ => return Err(EduRunError::missing_field("suggestions")),
    };
    let learning_content = match value.get("learningContent") {
        Some(Value::String(text)) => text.clone(),
        _ => return Err(EduRunError::missing_field("learningContent")),
    };

    let mut suggestions: Vec<Suggestion> = serde_json::from_value(suggestions)
        .map_err(|e| EduRunError::model_parse(format!("suggestions: {e}")))?;
    suggestions.truncate(MAX_SUGGESTIONS);

    Ok(FeedbackBundle {
        suggestions,
        learning_content,
    })
}

// ============================================================================
// Seams
// ============================================================================

/// A generative text backend.
#[async_trait]
pub trait GenerativeBackend: Send + Sync {
    /// Sends the request and returns the raw response text.
    ///
    /// Transport, timeout and status failures must map to `Network`,
    /// `Timeout` and `Protocol`; a response without text maps to
    /// `ModelParse`.
    async fn generate(&self, request: &GenerationRequest) -> Result<String>;
}

/// Anything the coordinator can ask for feedback. Never fails.
#[async_trait]
pub trait FeedbackSource: Send + Sync {
    /// Analyzes code in the given language.
    async fn analyze(&self, language_id: &str, code: &str, prior_errors: &[String])
        -> FeedbackReport;
}

// ============================================================================
// Pipeline
// ============================================================================

/// Builds prompts, calls the generative backend and applies the fallback ladder.
#[derive(Clone)]
pub struct FeedbackPipeline {
    backend: Arc<dyn GenerativeBackend>,
    registry: LanguageRegistry,
    default_language: String,
}

impl std::fmt::Debug for FeedbackPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedbackPipeline")
            .field("default_language", &self.default_language)
            .finish_non_exhaustive()
    }
}

impl FeedbackPipeline {
    /// Creates a pipeline over the given backend.
    pub fn new(backend: Arc<dyn GenerativeBackend>, default_language: impl Into<String>) -> Self {
        Self {
            backend,
            registry: LanguageRegistry::builtin().clone(),
            default_language: default_language.into(),
        }
    }

    /// Analyzes code in the default language and returns only the bundle.
    pub async fn analyze(&self, code: &str, prior_errors: &[String]) -> FeedbackBundle {
        self.analyze_in(&self.default_language, code, prior_errors)
            .await
            .bundle
    }

    /// Analyzes code in a specific language.
    pub async fn analyze_in(
        &self,
        language_id: &str,
        code: &str,
        prior_errors: &[String],
    ) -> FeedbackReport {
        let language = self.registry.resolve(language_id);
        let request = prompt::build_request(&language, code, prior_errors);

        let outcome = match self.backend.generate(&request).await {
            Ok(raw) => {
                debug!(language = %language.id, response_len = raw.len(), "Generative response received");
                parse_feedback(&raw)
            }
            Err(err) => Err(err),
        };

        match outcome {
            Ok(bundle) => {
                info!(
                    language = %language.id,
                    tier = 0,
                    suggestions = bundle.suggestions.len(),
                    "Feedback ready"
                );
                FeedbackReport {
                    tier: FeedbackTier::Structured,
                    bundle,
                }
            }
            Err(err) => {
                let report = FeedbackReport::fallback(&err);
                warn!(
                    language = %language.id,
                    tier = report.tier.level(),
                    class = %err.class(),
                    transient = err.is_transient(),
                    error = %err,
                    "Feedback degraded to fallback"
                );
                report
            }
        }
    }
}

#[async_trait]
impl FeedbackSource for FeedbackPipeline {
    async fn analyze(
        &self,
        language_id: &str,
        code: &str,
        prior_errors: &[String],
    ) -> FeedbackReport {
        self.analyze_in(language_id, code, prior_errors).await
    }
}
