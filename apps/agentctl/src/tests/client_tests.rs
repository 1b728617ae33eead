use super::*;
use axum::{
    extract::{Multipart, Path as UrlPath},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use shared::error::ErrorCode;
use tokio::net::TcpListener;
use uuid::Uuid;

async fn spawn_stub() -> SessionClient {
    let session_id = SessionId(Uuid::nil());
    let app = Router::new()
        .route(
            "/sessions",
            post(move || async move {
                (
                    StatusCode::CREATED,
                    Json(SessionSummary {
                        session_id,
                        files: 0,
                        agents: 0,
                        messages: 0,
                    }),
                )
            }),
        )
        .route(
            "/sessions/:id/chat",
            post(|Json(req): Json<ChatRequest>| async move {
                if req.prompt.is_empty() {
                    StatusCode::NO_CONTENT
                } else {
                    StatusCode::BAD_GATEWAY
                }
            }),
        )
        .route(
            "/sessions/:id/agents",
            post(|UrlPath(_id): UrlPath<String>| async move {
                (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    Json(ApiError::new(
                        ErrorCode::Validation,
                        "Please provide both an agent name and an agent url",
                    )),
                )
            }),
        )
        .route(
            "/sessions/:id/files",
            post(|mut multipart: Multipart| async move {
                let mut notices = Vec::new();
                while let Some(field) = multipart.next_field().await.expect("field") {
                    let name = field.file_name().unwrap_or_default().to_string();
                    notices.push(shared::protocol::Notice::success(format!("✅ {name}")));
                }
                Json(UploadReport {
                    notices,
                    ..UploadReport::default()
                })
            }),
        );

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    SessionClient::new(format!("http://{addr}/"))
}

#[tokio::test]
async fn open_decodes_summary() {
    let client = spawn_stub().await;
    let summary = client.open().await.expect("open");
    assert_eq!(summary.session_id, SessionId(Uuid::nil()));
}

#[tokio::test]
async fn blank_prompt_maps_to_none() {
    let client = spawn_stub().await;
    let outcome = client.chat(SessionId(Uuid::nil()), "").await.expect("chat");
    assert!(outcome.is_none());
}

#[tokio::test]
async fn structured_error_becomes_api_exception() {
    let client = spawn_stub().await;
    let err = client
        .register(SessionId(Uuid::nil()), "", "https://y.test", AgentCapability::General)
        .await
        .expect_err("should fail");
    let exception = err.downcast_ref::<ApiException>().expect("api exception");
    assert_eq!(exception.code, ErrorCode::Validation);
}

#[tokio::test]
async fn unstructured_error_keeps_status() {
    let client = spawn_stub().await;
    let err = client
        .chat(SessionId(Uuid::nil()), "hello")
        .await
        .expect_err("should fail");
    assert!(err.to_string().contains("502"));
}

#[tokio::test]
async fn upload_sends_file_names() {
    let dir = std::env::temp_dir().join(format!("agentctl_upload_{}", Uuid::new_v4()));
    tokio::fs::create_dir_all(&dir).await.expect("dir");
    let pdf = dir.join("a.pdf");
    let txt = dir.join("b.txt");
    tokio::fs::write(&pdf, b"%PDF").await.expect("pdf");
    tokio::fs::write(&txt, b"notes").await.expect("txt");

    let client = spawn_stub().await;
    let report = client
        .upload(SessionId(Uuid::nil()), &[pdf, txt])
        .await
        .expect("upload");
    let messages: Vec<_> = report.notices.into_iter().map(|n| n.message).collect();
    assert_eq!(messages, ["✅ a.pdf", "✅ b.txt"]);

    tokio::fs::remove_dir_all(dir).await.expect("cleanup");
}
