//! Integration tests for the feedback pipeline over HTTP.
//!
//! A stub generative backend answers every path with a canned envelope so
//! the whole ladder (structured, malformed, unavailable) runs end to end.

use std::sync::{Arc, Mutex};

use axum::http::{HeaderMap, StatusCode, Uri};
use axum::{Json, Router};
use edurun_orchestrator::{
    FeedbackBundle, FeedbackConfig, FeedbackPipeline, FeedbackTier, GeminiClient, SuggestionKind,
    MAX_SUGGESTIONS,
};
use serde_json::{json, Value};

/// One request as seen by the stub backend.
#[derive(Debug, Clone)]
struct SeenRequest {
    path: String,
    query: Option<String>,
    api_key: Option<String>,
    body: Value,
}

type Seen = Arc<Mutex<Vec<SeenRequest>>>;

async fn spawn_backend(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    let addr = listener.local_addr().expect("Failed to get local addr");

    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("Server failed");
    });

    format!("http://{addr}")
}

/// Returns a base URL nothing is listening on.
fn unreachable_base_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("Failed to bind to port");
    let port = listener.local_addr().expect("Failed to get local addr").port();
    drop(listener);
    format!("http://127.0.0.1:{port}")
}

/// A generative backend answering every request with `status` and `reply`.
fn generative_backend(status: StatusCode, reply: Value) -> (Router, Seen) {
    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    let captured = Arc::clone(&seen);

    let router = Router::new().fallback(
        move |uri: Uri, headers: HeaderMap, Json(body): Json<Value>| {
            let captured = Arc::clone(&captured);
            let reply = reply.clone();
            async move {
                captured.lock().unwrap().push(SeenRequest {
                    path: uri.path().to_string(),
                    query: uri.query().map(str::to_string),
                    api_key: headers
                        .get("x-goog-api-key")
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string),
                    body,
                });
                (status, Json(reply))
            }
        },
    );

    (router, seen)
}

/// Wraps model text in a `generateContent` envelope.
fn candidate(text: &str) -> Value {
    json!({
        "candidates": [
            {"content": {"parts": [{"text": text}], "role": "model"}, "finishReason": "STOP"}
        ]
    })
}

fn feedback_config(base: &str, api_key_env: &str) -> FeedbackConfig {
    FeedbackConfig {
        backend_url: format!("{base}/v1beta"),
        model: "gemini-test".to_string(),
        api_key_env: api_key_env.to_string(),
        request_timeout_seconds: 5,
    }
}

fn pipeline_for(base: &str) -> FeedbackPipeline {
    let client = GeminiClient::new(&feedback_config(base, "EDURUN_IT_KEY_UNSET"))
        .expect("Failed to build client");
    FeedbackPipeline::new(Arc::new(client), "javascript")
}

const STRUCTURED: &str = r###"{
  "suggestions": [
    {
      "type": "error-fix",
      "title": "Check the variable name",
      "description": "Which name did you declare, and which one are you printing?",
      "codeExample": "let total = 0;\n// console.log(???)"
    },
    {
      "type": "learning",
      "title": "Scope",
      "description": "Variables only exist where they are declared."
    }
  ],
  "learningContent": "## Scope\nA variable is visible inside the block that declares it."
}"###;

// ============================================================================
// Tier 0
// ============================================================================

#[tokio::test]
async fn test_structured_response_is_tier_zero() {
    let (router, _seen) = generative_backend(StatusCode::OK, candidate(STRUCTURED));
    let base = spawn_backend(router).await;

    let report = pipeline_for(&base)
        .analyze_in(
            "javascript",
            "let total = 0; console.log(totl);",
            &["ReferenceError: totl is not defined".to_string()],
        )
        .await;

    assert_eq!(report.tier, FeedbackTier::Structured);
    assert_eq!(report.bundle.suggestions.len(), 2);

    let first = &report.bundle.suggestions[0];
    assert_eq!(first.kind, SuggestionKind::ErrorFix);
    assert_eq!(first.title, "Check the variable name");
    assert!(first.code_example.is_some());
    assert_eq!(report.bundle.suggestions[1].code_example, None);
    assert!(report.bundle.learning_content.starts_with("## Scope"));
}

#[tokio::test]
async fn test_prose_wrapped_object_is_still_tier_zero() {
    let text = format!("Here is my analysis:\n```json\n{STRUCTURED}\n```\nGood luck!");
    let (router, _seen) = generative_backend(StatusCode::OK, candidate(&text));
    let base = spawn_backend(router).await;

    let report = pipeline_for(&base)
        .analyze_in("javascript", "console.log(1)", &[])
        .await;

    assert_eq!(report.tier, FeedbackTier::Structured);
    assert_eq!(report.bundle.suggestions.len(), 2);
}

#[tokio::test]
async fn test_extra_suggestions_are_truncated() {
    let suggestions: Vec<Value> = (0..7)
        .map(|i| json!({"type": "improvement", "title": format!("Tip {i}"), "description": "Think about it."}))
        .collect();
    let text = json!({"suggestions": suggestions, "learningContent": ""}).to_string();
    let (router, _seen) = generative_backend(StatusCode::OK, candidate(&text));
    let base = spawn_backend(router).await;

    let report = pipeline_for(&base)
        .analyze_in("python", "print(1)", &[])
        .await;

    assert_eq!(report.tier, FeedbackTier::Structured);
    assert_eq!(report.bundle.suggestions.len(), MAX_SUGGESTIONS);
    assert_eq!(report.bundle.suggestions[0].title, "Tip 0");
    assert!(report.bundle.learning_content.is_empty());
}

// ============================================================================
// Tier 1
// ============================================================================

#[tokio::test]
async fn test_plain_text_response_is_tier_one() {
    let (router, _seen) = generative_backend(
        StatusCode::OK,
        candidate("Your code looks great, keep going!"),
    );
    let base = spawn_backend(router).await;

    let report = pipeline_for(&base)
        .analyze_in("javascript", "console.log(1)", &[])
        .await;

    assert_eq!(report.tier, FeedbackTier::Malformed);
    assert_eq!(report.bundle, FeedbackBundle::exploring());
}

#[tokio::test]
async fn test_missing_learning_content_is_tier_one() {
    let text = r#"{"suggestions": []}"#;
    let (router, _seen) = generative_backend(StatusCode::OK, candidate(text));
    let base = spawn_backend(router).await;

    let report = pipeline_for(&base)
        .analyze_in("javascript", "console.log(1)", &[])
        .await;

    assert_eq!(report.tier, FeedbackTier::Malformed);
}

#[tokio::test]
async fn test_no_candidates_is_tier_one() {
    let (router, _seen) = generative_backend(StatusCode::OK, json!({"candidates": []}));
    let base = spawn_backend(router).await;

    let report = pipeline_for(&base)
        .analyze_in("javascript", "console.log(1)", &[])
        .await;

    assert_eq!(report.tier, FeedbackTier::Malformed);
    assert_eq!(report.bundle, FeedbackBundle::exploring());
}

#[tokio::test]
async fn test_error_envelope_is_tier_one() {
    for (status, reply) in [
        (
            StatusCode::TOO_MANY_REQUESTS,
            json!({"error": {"code": 429, "message": "Quota exceeded", "status": "RESOURCE_EXHAUSTED"}}),
        ),
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({"error": {"code": 500, "message": "internal", "status": "INTERNAL"}}),
        ),
    ] {
        let (router, seen) = generative_backend(status, reply);
        let base = spawn_backend(router).await;

        let report = pipeline_for(&base)
            .analyze_in("javascript", "console.log(1)", &[])
            .await;

        assert_eq!(seen.lock().unwrap().len(), 1);
        assert_eq!(report.tier, FeedbackTier::Malformed, "status {status}");
        assert_eq!(report.bundle, FeedbackBundle::exploring());
    }
}

// ============================================================================
// Tier 2
// ============================================================================

#[tokio::test]
async fn test_undecodable_error_page_is_tier_two() {
    let router = Router::new().fallback(|| async {
        (StatusCode::BAD_GATEWAY, "<html><body>502 Bad Gateway</body></html>")
    });
    let base = spawn_backend(router).await;

    let report = pipeline_for(&base)
        .analyze_in("javascript", "console.log(1)", &[])
        .await;

    assert_eq!(report.tier, FeedbackTier::Unavailable);
    assert_eq!(report.bundle, FeedbackBundle::encouragement());
}

#[tokio::test]
async fn test_unreachable_backend_is_tier_two() {
    let report = pipeline_for(&unreachable_base_url())
        .analyze_in("javascript", "console.log(1)", &[])
        .await;

    assert_eq!(report.tier, FeedbackTier::Unavailable);
    assert_eq!(report.bundle.suggestions.len(), 2);
}

#[tokio::test]
async fn test_fallback_tiers_differ() {
    let (malformed, _) = generative_backend(StatusCode::OK, candidate("no json here"));
    let malformed_base = spawn_backend(malformed).await;
    let down_base = unreachable_base_url();

    let tier_one = pipeline_for(&malformed_base).analyze("x", &[]).await;
    let tier_two = pipeline_for(&down_base).analyze("x", &[]).await;

    assert_ne!(tier_one, tier_two);
    for bundle in [&tier_one, &tier_two] {
        let text = serde_json::to_string(bundle).unwrap().to_lowercase();
        assert!(!text.contains("failed"));
        assert!(!text.contains("error:"));
    }
}

// ============================================================================
// Request Shape
// ============================================================================

#[tokio::test]
async fn test_request_carries_prompt_sampling_and_key_header() {
    let key_env = "EDURUN_IT_GENERATIVE_KEY";
    std::env::set_var(key_env, "secret-test-key");

    let (router, seen) = generative_backend(StatusCode::OK, candidate(STRUCTURED));
    let base = spawn_backend(router).await;
    let client =
        GeminiClient::new(&feedback_config(&base, key_env)).expect("Failed to build client");
    let pipeline = FeedbackPipeline::new(Arc::new(client), "javascript");

    let report = pipeline
        .analyze_in(
            "python",
            "print(undefined_name)",
            &["NameError: name 'undefined_name' is not defined".to_string()],
        )
        .await;
    assert_eq!(report.tier, FeedbackTier::Structured);

    let requests = seen.lock().unwrap().clone();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];

    assert_eq!(request.path, "/v1beta/models/gemini-test:generateContent");
    assert_eq!(request.query, None);
    assert_eq!(request.api_key.as_deref(), Some("secret-test-key"));

    let prompt = request.body["contents"][0]["parts"][0]["text"]
        .as_str()
        .expect("prompt text");
    assert!(prompt.contains("print(undefined_name)"));
    assert!(prompt.contains("```python"));
    assert!(prompt.contains("Errors encountered:\nNameError"));

    let sampling = &request.body["generationConfig"];
    assert_eq!(sampling["temperature"], 0.7);
    assert_eq!(sampling["topK"], 40);
    assert_eq!(sampling["topP"], 0.95);
    assert_eq!(sampling["maxOutputTokens"], 1000);
}

#[tokio::test]
async fn test_request_without_key_sends_no_header() {
    let (router, seen) = generative_backend(StatusCode::OK, candidate(STRUCTURED));
    let base = spawn_backend(router).await;

    pipeline_for(&base).analyze("console.log(1)", &[]).await;

    let requests = seen.lock().unwrap().clone();
    assert_eq!(requests[0].api_key, None);
    let prompt = requests[0].body["contents"][0]["parts"][0]["text"]
        .as_str()
        .expect("prompt text");
    assert!(prompt.contains("No errors detected."));
}

#[tokio::test]
async fn test_same_answer_gives_same_bundle() {
    let (router, seen) = generative_backend(StatusCode::OK, candidate(STRUCTURED));
    let base = spawn_backend(router).await;
    let pipeline = pipeline_for(&base);

    let first = pipeline.analyze("console.log(1)", &[]).await;
    let second = pipeline.analyze("console.log(1)", &[]).await;

    assert_eq!(first, second);
    assert_eq!(seen.lock().unwrap().len(), 2);
}
