//! Integration tests for the execution client against a stub backend.
//!
//! Each test serves a tiny axum app on an ephemeral port that plays the
//! execution backend, then drives `ExecutionClient` over real HTTP.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use edurun_orchestrator::{
    BackendLanguage, Config, ExecutionClient, ExecutionRequest, LanguageDescriptor,
    LanguageRegistry, SYNTAX_OK_LINE,
};
use serde_json::{json, Value};

/// Request bodies seen by a stub backend.
type Seen = Arc<Mutex<Vec<Value>>>;

/// Serves the router on an ephemeral port and returns its base URL.
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

/// A backend whose `/api/compile` always answers `reply` and records bodies.
fn compile_backend(reply: Value) -> (Router, Seen) {
    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    let captured = Arc::clone(&seen);

    let router = Router::new().route(
        "/api/compile",
        post(move |Json(body): Json<Value>| {
            let captured = Arc::clone(&captured);
            let reply = reply.clone();
            async move {
                captured.lock().unwrap().push(body);
                Json(reply)
            }
        }),
    );

    (router, seen)
}

fn client_for(base: &str) -> ExecutionClient {
    let config = Config {
        execution_backend_url: format!("{base}/api"),
        ..Default::default()
    };
    ExecutionClient::new(&config).expect("Failed to build client")
}

fn assert_single_diagnostic(errors: &[String], class: &str, base_url: &str) {
    assert_eq!(errors.len(), 1, "Expected one diagnostic line, got: {errors:?}");
    let line = &errors[0];
    assert!(
        line.starts_with(&format!("Execution failed ({class})")),
        "Unexpected diagnostic: {line}"
    );
    assert!(line.contains("Verify the execution backend is reachable"));
    assert!(line.contains(base_url), "Diagnostic should name {base_url}: {line}");
}

// ============================================================================
// Run Tests
// ============================================================================

/// The canonical round trip: a JavaScript one-liner printing `1`.
#[tokio::test]
async fn test_submit_returns_backend_output_and_time() {
    let (router, seen) = compile_backend(json!({
        "success": true,
        "output": ["1"],
        "errors": [],
        "execution_time": 0.01
    }));
    let base = spawn_backend(router).await;
    let client = client_for(&base);

    let request = ExecutionRequest::run("console.log(1)", "javascript").with_timeout(30);
    let result = client.submit(&request).await;

    assert_eq!(result.output, vec!["1".to_string()]);
    assert!(result.errors.is_empty());
    assert!((result.execution_time_seconds - 0.01).abs() < f64::EPSILON);
    assert!(result.is_success());

    let age = chrono::Utc::now() - result.timestamp;
    assert!(age < chrono::Duration::seconds(5));

    let bodies = seen.lock().unwrap().clone();
    assert_eq!(bodies.len(), 1);
    assert_eq!(
        bodies[0],
        json!({
            "code": "console.log(1)",
            "language": "javascript",
            "timeout": 30,
            "syntax_only": false
        })
    );
}

/// Aliases are resolved to the backend identifier before sending.
#[tokio::test]
async fn test_execute_sends_backend_language_id() {
    let (router, seen) = compile_backend(json!({"success": true, "output": ["hi"]}));
    let base = spawn_backend(router).await;
    let client = client_for(&base);

    let result = client.execute("print('hi')", "Python").await;

    assert_eq!(result.output, vec!["hi".to_string()]);
    let bodies = seen.lock().unwrap().clone();
    assert_eq!(bodies[0]["language"], "python");
    assert_eq!(bodies[0]["timeout"], 30);
}

/// A custom registry maps editor ids to its own backend ids; unknown ids
/// still pass through unchanged.
#[tokio::test]
async fn test_custom_registry_and_passthrough() {
    let (router, seen) = compile_backend(json!({"success": true}));
    let base = spawn_backend(router).await;
    let registry = LanguageRegistry::new(vec![LanguageDescriptor {
        id: "typescript".to_string(),
        display_name: "TypeScript".to_string(),
        file_extension: "ts".to_string(),
        starter_template: String::new(),
        backend_id: "ts-node".to_string(),
    }]);
    let client = client_for(&base).with_registry(registry);

    client.execute("let x: number = 1;", "TypeScript").await;
    client.execute("puts 1", "ruby").await;

    let bodies = seen.lock().unwrap().clone();
    assert_eq!(bodies[0]["language"], "ts-node");
    assert_eq!(bodies[1]["language"], "ruby");
}

/// Missing arrays become empty; a missing time falls back to local time.
#[tokio::test]
async fn test_sparse_response_is_normalized() {
    let (router, _seen) = compile_backend(json!({"success": false}));
    let base = spawn_backend(router).await;
    let client = client_for(&base);

    let result = client.execute("", "javascript").await;

    assert!(result.output.is_empty());
    assert!(result.errors.is_empty());
    assert!(result.execution_time_seconds >= 0.0);
    assert!(result.execution_time_seconds < 5.0);
}

/// A zero backend time is not trusted.
#[tokio::test]
async fn test_zero_backend_time_uses_local_measurement() {
    let (router, _seen) = compile_backend(json!({
        "success": true,
        "output": [],
        "errors": [],
        "execution_time": 0.0
    }));
    let base = spawn_backend(router).await;
    let client = client_for(&base);

    let result = client.execute("1", "javascript").await;

    assert!(result.execution_time_seconds > 0.0);
    assert!(result.execution_time_seconds < 5.0);
}

/// Runtime errors reported by the backend are passed through verbatim.
#[tokio::test]
async fn test_backend_errors_pass_through() {
    let (router, _seen) = compile_backend(json!({
        "success": false,
        "output": ["before crash"],
        "errors": ["ReferenceError: x is not defined", "    at line 2"],
        "exit_code": 1,
        "execution_time": 0.2
    }));
    let base = spawn_backend(router).await;
    let client = client_for(&base);

    let result = client.execute("console.log('before crash'); x", "javascript").await;

    assert_eq!(result.output, vec!["before crash".to_string()]);
    assert_eq!(
        result.errors,
        vec![
            "ReferenceError: x is not defined".to_string(),
            "    at line 2".to_string()
        ]
    );
    assert!(!result.is_success());
}

// ============================================================================
// Failure Tests
// ============================================================================

#[tokio::test]
async fn test_server_error_becomes_single_diagnostic() {
    let router = Router::new().route(
        "/api/compile",
        post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
    );
    let base = spawn_backend(router).await;
    let client = client_for(&base);

    let result = client.execute("console.log(1)", "javascript").await;

    assert!(result.output.is_empty());
    assert_single_diagnostic(&result.errors, "protocol error", client.base_url());
}

#[tokio::test]
async fn test_malformed_body_becomes_single_diagnostic() {
    let router = Router::new().route("/api/compile", post(|| async { "definitely not json" }));
    let base = spawn_backend(router).await;
    let client = client_for(&base);

    let result = client.execute("console.log(1)", "javascript").await;

    assert!(result.output.is_empty());
    assert_single_diagnostic(&result.errors, "protocol error", client.base_url());
}

#[tokio::test]
async fn test_unreachable_backend_becomes_single_diagnostic() {
    let base = unreachable_base_url();
    let client = client_for(&base);

    let result = client.execute("console.log(1)", "javascript").await;

    assert!(result.output.is_empty());
    assert_single_diagnostic(&result.errors, "network error", client.base_url());
    assert!(result.execution_time_seconds >= 0.0);
}

#[tokio::test]
async fn test_slow_backend_times_out() {
    let router = Router::new().route(
        "/api/compile",
        post(|| async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Json(json!({"success": true}))
        }),
    );
    let base = spawn_backend(router).await;

    let mut config = Config {
        execution_backend_url: format!("{base}/api"),
        ..Default::default()
    };
    config.execution.run_timeout_seconds = 1;
    config.execution.request_grace_seconds = 0;
    let client = ExecutionClient::new(&config).expect("Failed to build client");

    let result = client.execute("while (true) {}", "javascript").await;

    assert!(result.output.is_empty());
    assert_single_diagnostic(&result.errors, "timeout", client.base_url());
    assert!(result.execution_time_seconds >= 0.9);
    assert!(result.execution_time_seconds < 5.0);
}

// ============================================================================
// Syntax Check Tests
// ============================================================================

#[tokio::test]
async fn test_clean_syntax_check_yields_affirmative_line() {
    let (router, seen) = compile_backend(json!({
        "success": true,
        "output": ["raw compiler chatter"],
        "errors": []
    }));
    let base = spawn_backend(router).await;
    let client = client_for(&base);

    let result = client.check_syntax("x = 1", "python").await;

    assert_eq!(result.output, vec![SYNTAX_OK_LINE.to_string()]);
    assert!(result.errors.is_empty());

    let bodies = seen.lock().unwrap().clone();
    assert_eq!(bodies[0]["syntax_only"], true);
    assert_eq!(bodies[0]["timeout"], 10);
}

#[tokio::test]
async fn test_failed_syntax_check_reports_errors_only() {
    let (router, _seen) = compile_backend(json!({
        "success": false,
        "output": ["ignored"],
        "errors": ["SyntaxError: invalid syntax (line 1)"]
    }));
    let base = spawn_backend(router).await;
    let client = client_for(&base);

    let result = client.check_syntax("x = = 1", "python").await;

    assert!(result.output.is_empty());
    assert_eq!(
        result.errors,
        vec!["SyntaxError: invalid syntax (line 1)".to_string()]
    );
}

// ============================================================================
// Health and Languages Tests
// ============================================================================

#[tokio::test]
async fn test_health_reports_healthy_backend() {
    let router = Router::new().route(
        "/api/health",
        get(|| async { Json(json!({"status": "healthy", "message": "ok"})) }),
    );
    let base = spawn_backend(router).await;

    assert!(client_for(&base).health().await);
}

#[tokio::test]
async fn test_health_rejects_other_status() {
    let router = Router::new().route(
        "/api/health",
        get(|| async { Json(json!({"status": "degraded"})) }),
    );
    let base = spawn_backend(router).await;

    assert!(!client_for(&base).health().await);
}

#[tokio::test]
async fn test_health_false_when_unreachable() {
    assert!(!client_for(&unreachable_base_url()).health().await);
}

#[tokio::test]
async fn test_supported_languages_from_backend() {
    let router = Router::new().route(
        "/api/languages",
        get(|| async {
            Json(json!({
                "languages": [
                    {"id": "python", "name": "Python", "description": "CPython 3.12", "example": "print(1)"},
                    {"id": "cpp", "name": "C++", "description": "g++ 13"}
                ]
            }))
        }),
    );
    let base = spawn_backend(router).await;

    let languages = client_for(&base).supported_languages().await;

    assert_eq!(languages.len(), 2);
    assert_eq!(languages[0].id, "python");
    assert_eq!(languages[0].example, "print(1)");
    assert_eq!(languages[1].name, "C++");
    assert!(languages[1].example.is_empty());
}

#[tokio::test]
async fn test_supported_languages_fall_back_when_backend_fails() {
    let router = Router::new().route(
        "/api/languages",
        get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "down") }),
    );
    let base = spawn_backend(router).await;

    let languages = client_for(&base).supported_languages().await;

    assert_eq!(languages, vec![BackendLanguage::fallback()]);
}
