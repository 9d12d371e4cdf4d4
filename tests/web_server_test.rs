use async_trait::async_trait;
use axum_test::multipart::{MultipartForm, Part};
use axum_test::TestServer;
use director::collaborators::{Retriever, TextGenerator};
use director::controller::{ControllerSettings, InterviewController};
use director::error::CollaboratorError;
use director::session::{SessionManager, SessionSettings};
use director::web_server::{build_router, AppState};
use director::ChatMessage;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

struct EchoGenerator;

#[async_trait]
impl TextGenerator for EchoGenerator {
    async fn generate(
        &self,
        system_prompt: &str,
        _history: &[ChatMessage],
    ) -> Result<String, CollaboratorError> {
        if system_prompt.contains("SYSTEM ANALYST") {
            if system_prompt.contains("music video") {
                return Ok(r#"```json
{"updated_selections": {"project_type": "Music video"}}
```"#
                    .to_string());
            }
            return Ok("{}".to_string());
        }
        Ok("Which output depth do you want?".to_string())
    }
}

struct EmptyRetriever;

#[async_trait]
impl Retriever for EmptyRetriever {
    async fn search(&self, _: &str, _: &str, _: usize) -> Result<String, CollaboratorError> {
        Ok(String::new())
    }
}

fn server_with_uploads(upload_dir: &Path) -> TestServer {
    let controller = InterviewController::new(
        Arc::new(EchoGenerator),
        Vec::new(),
        Arc::new(EmptyRetriever),
        ControllerSettings::default(),
    );
    let sessions = Arc::new(SessionManager::new(
        Arc::new(controller),
        SessionSettings {
            idle_ttl: Duration::from_secs(3600),
            upload_dir: upload_dir.to_path_buf(),
        },
    ));
    TestServer::new(build_router(AppState::new(sessions))).unwrap()
}

fn test_server() -> TestServer {
    server_with_uploads(&std::env::temp_dir().join("director-web-tests"))
}

async fn create_session(server: &TestServer) -> String {
    let created: Value = server.post("/api/sessions").await.json();
    created["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_schema_lists_categories_in_order() {
    let server = test_server();
    let response = server.get("/api/schema").await;
    response.assert_status_ok();

    let body: Value = response.json();
    let categories = body["categories"].as_array().unwrap();
    assert_eq!(categories.len(), 9);
    assert_eq!(categories[0]["id"], "project_context");
    assert_eq!(categories[8]["id"], "delivery");
    assert_eq!(categories[8]["fields"][0]["name"], "platform");
}

#[tokio::test]
async fn test_session_lifecycle() {
    let server = test_server();

    let created = server.post("/api/sessions").await;
    created.assert_status(axum::http::StatusCode::CREATED);
    let created: Value = created.json();
    assert_eq!(created["status"], "CLARIFYING");
    assert_eq!(created["current"], "project_context");
    let id = created["id"].as_str().unwrap().to_string();

    let turn = server
        .post(&format!("/api/sessions/{}/turn", id))
        .json(&json!({"message": "It's a music video"}))
        .await;
    turn.assert_status_ok();
    let turn: Value = turn.json();
    assert_eq!(turn["selections"]["project_type"], "Music video");
    assert_eq!(turn["current"], "project_context");
    assert_eq!(turn["phase"], "ask");
    assert_eq!(turn["reply"], "Which output depth do you want?");

    let snapshot: Value = server.get(&format!("/api/sessions/{}", id)).await.json();
    assert_eq!(snapshot["history"].as_array().unwrap().len(), 2);
    assert_eq!(snapshot["history"][0]["role"], "user");

    let reset = server.post(&format!("/api/sessions/{}/reset", id)).await;
    reset.assert_status_ok();
    let reset: Value = reset.json();
    assert_eq!(reset["selections"], json!({}));
    assert_eq!(reset["history"], json!([]));
}

#[tokio::test]
async fn test_unknown_session_is_404() {
    let server = test_server();
    let id = uuid::Uuid::new_v4();

    let response = server.get(&format!("/api/sessions/{}", id)).await;
    response.assert_status_not_found();
    let body: Value = response.json();
    assert!(body["error"].as_str().unwrap().contains(&id.to_string()));

    server
        .post(&format!("/api/sessions/{}/turn", id))
        .json(&json!({"message": "hi"}))
        .await
        .assert_status_not_found();
}

#[tokio::test]
async fn test_index_renders_categories() {
    let server = test_server();
    let response = server.get("/").await;
    response.assert_status_ok();
    let html = response.text();
    assert!(html.contains("JHONNY Director&#x27;s Studio") || html.contains("JHONNY Director's Studio"));
    assert!(html.contains("Emotion &amp; Story") || html.contains("Emotion & Story"));
}

#[tokio::test]
async fn test_missing_static_file_is_404() {
    let server = test_server();
    server.get("/static/nope.css").await.assert_status_not_found();
}

#[tokio::test]
async fn test_client_image_path_is_rejected() {
    let server = test_server();
    let id = create_session(&server).await;

    let response = server
        .post(&format!("/api/sessions/{}/turn", id))
        .json(&json!({"message": "Use this reference", "image_path": "/etc/passwd"}))
        .await;
    response.assert_status(axum::http::StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert!(body["error"].as_str().unwrap().contains("uploaded"));

    let snapshot: Value = server.get(&format!("/api/sessions/{}", id)).await.json();
    assert_eq!(snapshot["image_path"], Value::Null);
    assert_eq!(snapshot["history"], json!([]));
}

#[tokio::test]
async fn test_image_upload_is_stored_under_upload_dir() {
    let uploads = tempfile::tempdir().unwrap();
    let server = server_with_uploads(uploads.path());
    let id = create_session(&server).await;

    let form = MultipartForm::new().add_part(
        "image",
        Part::bytes(b"\x89PNG fake".to_vec())
            .file_name("/etc/scene.png")
            .mime_type("image/png"),
    );
    let response = server
        .post(&format!("/api/sessions/{}/image", id))
        .multipart(form)
        .await;
    response.assert_status_ok();

    let body: Value = response.json();
    let stored = std::path::PathBuf::from(body["image_path"].as_str().unwrap());
    assert!(stored.starts_with(uploads.path()));
    assert_eq!(std::fs::read(&stored).unwrap(), b"\x89PNG fake");
}

#[tokio::test]
async fn test_image_upload_rejects_non_images() {
    let uploads = tempfile::tempdir().unwrap();
    let server = server_with_uploads(uploads.path());
    let id = create_session(&server).await;

    let form = MultipartForm::new().add_part(
        "image",
        Part::bytes(b"root:x:0:0".to_vec()).file_name("passwd"),
    );
    server
        .post(&format!("/api/sessions/{}/image", id))
        .multipart(form)
        .await
        .assert_status(axum::http::StatusCode::BAD_REQUEST);

    let form = MultipartForm::new().add_text("caption", "no file here");
    server
        .post(&format!("/api/sessions/{}/image", id))
        .multipart(form)
        .await
        .assert_status(axum::http::StatusCode::BAD_REQUEST);

    assert_eq!(std::fs::read_dir(uploads.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_delete_session() {
    let server = test_server();
    let id = create_session(&server).await;

    server
        .delete(&format!("/api/sessions/{}", id))
        .await
        .assert_status(axum::http::StatusCode::NO_CONTENT);
    server
        .get(&format!("/api/sessions/{}", id))
        .await
        .assert_status_not_found();
    server
        .delete(&format!("/api/sessions/{}", id))
        .await
        .assert_status_not_found();
}
