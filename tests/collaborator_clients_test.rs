use director::collaborators::{
    Captioner, EmbeddingIndexRetriever, HuggingFaceCaptioner, OllamaEmbedder, OllamaGenerator,
    OllamaVisionCaptioner, Retriever, TextGenerator,
};
use director::error::CollaboratorError;
use director::ChatMessage;
use serde_json::json;
use std::io::Write;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn image_file() -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"\x89PNG fake bytes").unwrap();
    file
}

#[tokio::test]
async fn test_ollama_generator_sends_system_prompt_first() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_partial_json(json!({
            "model": "llama3.1:8b",
            "stream": false,
            "options": {"temperature": 0.2},
            "messages": [
                {"role": "system", "content": "SYSTEM"},
                {"role": "user", "content": "An ad please"}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": {"role": "assistant", "content": "  What output depth?  "},
            "done": true
        })))
        .expect(1)
        .mount(&server)
        .await;

    let generator = OllamaGenerator::new(server.uri(), "llama3.1:8b", 0.2);
    let reply = generator
        .generate("SYSTEM", &[ChatMessage::user("An ad please")])
        .await
        .unwrap();
    assert_eq!(reply, "What output depth?");
}

#[tokio::test]
async fn test_ollama_generator_maps_server_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(503).set_body_string("loading model"))
        .mount(&server)
        .await;

    let generator = OllamaGenerator::new(format!("{}/", server.uri()), "m", 0.2);
    let err = generator.generate("SYSTEM", &[]).await.unwrap_err();
    match &err {
        CollaboratorError::Status { status, body, .. } => {
            assert_eq!(*status, 503);
            assert_eq!(body, "loading model");
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_ollama_generator_rejects_malformed_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let generator = OllamaGenerator::new(server.uri(), "m", 0.2);
    let err = generator.generate("SYSTEM", &[]).await.unwrap_err();
    assert!(matches!(err, CollaboratorError::Parse { .. }));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn test_vision_captioner_posts_base64_image() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_partial_json(json!({"model": "llava", "stream": false})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"response": " A neon alley at night. "})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let image = image_file();
    let captioner = OllamaVisionCaptioner::new(server.uri(), "llava");
    let caption = captioner.caption(image.path()).await.unwrap();
    assert_eq!(caption.as_deref(), Some("A neon alley at night."));
    assert_eq!(captioner.name(), "ollama-vision");
}

#[tokio::test]
async fn test_vision_captioner_empty_response_is_none() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"response": "   "})))
        .mount(&server)
        .await;

    let image = image_file();
    let caption = OllamaVisionCaptioner::new(server.uri(), "llava")
        .caption(image.path())
        .await
        .unwrap();
    assert!(caption.is_none());
}

#[tokio::test]
async fn test_huggingface_captioner_without_token_skips_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let image = image_file();
    let caption = HuggingFaceCaptioner::new(server.uri(), None)
        .caption(image.path())
        .await
        .unwrap();
    assert!(caption.is_none());
}

#[tokio::test]
async fn test_huggingface_captioner_reads_generated_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/blip"))
        .and(header("authorization", "Bearer hf_test"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([{"generated_text": "a man standing on a beach"}])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let image = image_file();
    let captioner =
        HuggingFaceCaptioner::new(format!("{}/blip", server.uri()), Some("hf_test".to_string()));
    let caption = captioner.caption(image.path()).await.unwrap();
    assert_eq!(caption.as_deref(), Some("a man standing on a beach"));
}

#[tokio::test]
async fn test_huggingface_captioner_unexpected_payload() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"error": "Model is loading"})))
        .mount(&server)
        .await;

    let image = image_file();
    let err = HuggingFaceCaptioner::new(server.uri(), Some("t".to_string()))
        .caption(image.path())
        .await
        .unwrap_err();
    assert!(matches!(err, CollaboratorError::Parse { .. }));
}

async fn mount_embedding(server: &MockServer, prompt: &str, embedding: serde_json::Value) {
    Mock::given(method("POST"))
        .and(path("/api/embeddings"))
        .and(body_partial_json(json!({"model": "all-minilm", "prompt": prompt})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"embedding": embedding})))
        .mount(server)
        .await;
}

fn write_index(dir: &std::path::Path, corpus: &str) {
    let chunks = json!([
        {"text": "Neon lighting pairs with anamorphic lenses.", "embedding": [0.0, 1.0]},
        {"text": "Soft light suits calm emotion.", "embedding": [1.0, 0.0]},
        {"text": "Dusk scenes favour warm tones.", "embedding": [0.6, 0.8]}
    ]);
    std::fs::write(dir.join(format!("{}.json", corpus)), chunks.to_string()).unwrap();
}

#[tokio::test]
async fn test_retriever_returns_top_k_best_first() {
    let server = MockServer::start().await;
    mount_embedding(&server, "neon night", json!([0.1, 1.0])).await;

    let dir = tempfile::tempdir().unwrap();
    write_index(dir.path(), "engine_rules");

    let retriever = EmbeddingIndexRetriever::new(
        dir.path(),
        OllamaEmbedder::new(server.uri(), "all-minilm"),
    );
    let context = retriever
        .search("engine_rules", "neon night", 2)
        .await
        .unwrap();
    assert_eq!(
        context,
        "Neon lighting pairs with anamorphic lenses.\nDusk scenes favour warm tones."
    );

    // Second query hits the cached corpus even after the file is gone.
    std::fs::remove_file(dir.path().join("engine_rules.json")).unwrap();
    let again = retriever.search("engine_rules", "neon night", 1).await.unwrap();
    assert_eq!(again, "Neon lighting pairs with anamorphic lenses.");
}

#[tokio::test]
async fn test_retriever_missing_corpus_is_unavailable() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let retriever = EmbeddingIndexRetriever::new(
        dir.path(),
        OllamaEmbedder::new(server.uri(), "all-minilm"),
    );

    let err = retriever.search("image_master", "a car", 3).await.unwrap_err();
    assert!(matches!(err, CollaboratorError::Unavailable { .. }));

    let err = retriever.search("../secrets", "a car", 3).await.unwrap_err();
    assert!(matches!(err, CollaboratorError::Unavailable { .. }));
}

#[tokio::test]
async fn test_retriever_blank_query_skips_everything() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let retriever = EmbeddingIndexRetriever::new(
        "/nonexistent",
        OllamaEmbedder::new(server.uri(), "all-minilm"),
    );
    assert_eq!(retriever.search("engine_rules", "  ", 3).await.unwrap(), "");
}
