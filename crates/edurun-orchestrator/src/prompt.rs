//! Prompt construction for the generative feedback backend.
//!
//! The mentoring contract is fixed: callers supply the language, the code and
//! the errors from the last run, never the instructions themselves.

use serde::{Deserialize, Serialize};

use crate::language::LanguageDescriptor;

/// Sampling parameters sent with every feedback request.
///
/// These bound response size. They do not make the output structurally valid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SamplingParams {
    /// Sampling temperature.
    pub temperature: f32,
    /// Top-k cutoff.
    pub top_k: u32,
    /// Nucleus sampling bound.
    pub top_p: f32,
    /// Output length cap in tokens.
    pub max_output_tokens: u32,
}

impl SamplingParams {
    /// The parameters used for every feedback call.
    pub const FIXED: Self = Self {
        temperature: 0.7,
        top_k: 40,
        top_p: 0.95,
        max_output_tokens: 1000,
    };
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self::FIXED
    }
}

/// A fully built request for the generative backend.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    /// Contract followed by the learner's code and errors.
    pub prompt: String,
    /// Sampling parameters.
    pub sampling: SamplingParams,
}

/// The mentoring contract for a given language.
#[must_use]
pub fn system_contract(language_name: &str) -> String {
    format!(
        r#"You are an encouraging {language_name} coding mentor. Your goal is to guide students toward solutions without handing them complete answers.

RULES:
- NEVER provide a complete working solution
- Give hints, point out where to look, and name the concepts worth exploring
- Ask leading questions that help the student reason about the problem
- Encourage experimentation and learning from mistakes
- Focus on WHY something works, not only HOW
- Celebrate small wins and keep learning achievable and fun

When analyzing code and errors:
1. Say WHAT KIND of error it is and WHERE to look
2. Suggest WHICH concepts to review or practice
3. Give small hints about the RIGHT DIRECTION
4. Encourage trying different approaches
5. Explain the THINKING PROCESS behind solving it

Respond with a single JSON object with two properties:
1. "suggestions": an array of 3-5 items, each with
   - "type": "error-fix" | "improvement" | "learning"
   - "title": a short, clear title
   - "description": encouraging guidance without the full solution
   - "codeExample": a small hint or partial example (never a complete solution)
2. "learningContent": a markdown learning section with examples and explanations of the concepts in the code (at most 400 words)

Keep descriptions conversational and supportive: "you can try", "consider exploring", "what if you"."#
    )
}

/// The learner-specific part of the prompt.
#[must_use]
pub fn user_prompt(language: &LanguageDescriptor, code: &str, prior_errors: &[String]) -> String {
    let errors = if prior_errors.is_empty() {
        "No errors detected.".to_string()
    } else {
        format!("Errors encountered:\n{}", prior_errors.join("\n"))
    };

    format!(
        "Analyze this {name} code and any errors. Provide encouraging guidance that helps the student learn, not complete solutions.\n\n\
         Code:\n```{fence}\n{code}\n```\n\n\
         {errors}\n\n\
         Remember: guide them toward solutions with hints and questions, do not solve it for them. Include both suggestions and learning content.",
        name = language.display_name,
        fence = language.id,
    )
}

/// Builds the complete request for one analysis.
#[must_use]
pub fn build_request(
    language: &LanguageDescriptor,
    code: &str,
    prior_errors: &[String],
) -> GenerationRequest {
    GenerationRequest {
        prompt: format!(
            "{}\n\n{}",
            system_contract(&language.display_name),
            user_prompt(language, code, prior_errors)
        ),
        sampling: SamplingParams::FIXED,
    }
}
