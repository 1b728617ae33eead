use super::*;
use crate::GenerationPolicy;
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use std::sync::Arc;
use tokio::{net::TcpListener, sync::Mutex};

#[derive(Clone)]
struct FakeGemini {
    status: StatusCode,
    reply: serde_json::Value,
    seen: Arc<Mutex<Vec<(Option<String>, serde_json::Value)>>>,
}

async fn generate(
    State(state): State<FakeGemini>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> (StatusCode, Json<serde_json::Value>) {
    let key = headers
        .get("x-goog-api-key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    state.seen.lock().await.push((key, body));
    (state.status, Json(state.reply.clone()))
}

async fn spawn_fake(status: StatusCode, reply: serde_json::Value) -> (String, FakeGemini) {
    let fake = FakeGemini {
        status,
        reply,
        seen: Arc::new(Mutex::new(Vec::new())),
    };
    let app = Router::new()
        .route("/models/:call", post(generate))
        .with_state(fake.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    (format!("http://{addr}/models"), fake)
}

fn client_for(api_base: String) -> GeminiClient {
    GeminiClient::new(GeminiConfig {
        api_base,
        ..GeminiConfig::new("test-key")
    })
    .expect("client")
}

fn request(prompt: &str) -> CompletionRequest {
    CompletionRequest {
        prompt: prompt.to_string(),
        policy: GenerationPolicy {
            temperature: 0.2,
            top_p: 0.8,
            max_output_tokens: 256,
        },
    }
}

#[test]
fn endpoint_includes_model_and_method() {
    let client = GeminiClient::new(GeminiConfig {
        api_base: "https://example.test/v1beta/models/".into(),
        model: "gemini-1.5-flash".into(),
        ..GeminiConfig::new("k")
    })
    .expect("client");
    assert_eq!(
        client.endpoint().as_str(),
        "https://example.test/v1beta/models/gemini-1.5-flash:generateContent"
    );
    assert_eq!(client.model(), "gemini-1.5-flash");
}

#[test]
fn empty_api_key_is_a_config_error() {
    let err = GeminiClient::new(GeminiConfig::new("  ")).err().expect("error");
    assert!(matches!(err, CompletionError::Config(_)));
}

#[test]
fn debug_output_redacts_api_key() {
    let rendered = format!("{:?}", GeminiConfig::new("super-secret"));
    assert!(!rendered.contains("super-secret"));
}

#[tokio::test]
async fn sends_prompt_and_policy_and_joins_parts() {
    let (base, fake) = spawn_fake(
        StatusCode::OK,
        serde_json::json!({
            "candidates": [{
                "content": { "role": "model", "parts": [{ "text": "Hello" }, { "text": ", world" }] },
                "finishReason": "STOP"
            }]
        }),
    )
    .await;
    let client = client_for(base);

    let completion = client.complete(request("hi there")).await.expect("completion");
    assert_eq!(completion.text, "Hello, world");

    let seen = fake.seen.lock().await;
    assert_eq!(seen.len(), 1);
    let (key, body) = &seen[0];
    assert_eq!(key.as_deref(), Some("test-key"));
    assert_eq!(body["contents"][0]["role"], "user");
    assert_eq!(body["contents"][0]["parts"][0]["text"], "hi there");
    assert_eq!(body["generationConfig"]["maxOutputTokens"], 256);
    assert!(body["generationConfig"]["topP"].is_number());
}

#[tokio::test]
async fn non_success_status_maps_to_api_error() {
    let (base, _fake) = spawn_fake(
        StatusCode::FORBIDDEN,
        serde_json::json!({ "error": { "message": "API key not valid" } }),
    )
    .await;
    let err = client_for(base)
        .complete(request("hi"))
        .await
        .expect_err("should fail");
    match err {
        CompletionError::Api { status, body } => {
            assert_eq!(status, 403);
            assert!(body.contains("API key not valid"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn blocked_prompt_is_reported_as_empty() {
    let (base, _fake) = spawn_fake(
        StatusCode::OK,
        serde_json::json!({ "promptFeedback": { "blockReason": "SAFETY" } }),
    )
    .await;
    let err = client_for(base)
        .complete(request("hi"))
        .await
        .expect_err("should fail");
    match err {
        CompletionError::Empty { reason } => assert!(reason.contains("SAFETY")),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn unreachable_endpoint_is_a_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let err = client_for(format!("http://{addr}/models"))
        .complete(request("hi"))
        .await
        .expect_err("should fail");
    assert!(matches!(err, CompletionError::Transport(_)));
}
