//! Integration tests for the HTTP collaborators against a local mock server.

use futures::StreamExt;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use forge_session::{
    BuildSession, ChatBackend, ChatMessage, ChatRequest, GenerateRequest, HttpChatBackend,
    HttpProjectGenerator, Phase, ProjectGenerator, SessionConfig, SessionError,
};

fn sse_body(fragments: &[&str]) -> String {
    let mut body = String::from(": keep-alive\n\n");
    for fragment in fragments {
        body.push_str(&format!("data: {}\n\n", json!({ "text": fragment })));
    }
    body.push_str("data: [DONE]\n\n");
    body
}

fn sse_response(fragments: &[&str]) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(sse_body(fragments), "text/event-stream")
}

fn chat_request(prompt: &str) -> ChatRequest {
    ChatRequest {
        messages: vec![ChatMessage::user(prompt)],
        context: String::new(),
    }
}

#[tokio::test]
async fn test_chat_stream_decodes_fragments() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(header("authorization", "Bearer secret"))
        .and(body_partial_json(json!({
            "messages": [{ "role": "user", "content": "hi" }]
        })))
        .respond_with(sse_response(&["Hel", "lo ", "there"]))
        .expect(1)
        .mount(&server)
        .await;

    let backend = HttpChatBackend::new(
        format!("{}/api/chat", server.uri()),
        Some("secret".to_string()),
    );
    let stream = backend.stream_chat(chat_request("hi")).await.unwrap();
    let fragments: Vec<String> = stream.map(|r| r.unwrap()).collect().await;

    assert_eq!(fragments.concat(), "Hello there");
}

#[tokio::test]
async fn test_chat_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let backend = HttpChatBackend::new(format!("{}/api/chat", server.uri()), None);
    let result = backend.stream_chat(chat_request("hi")).await;

    match result {
        Err(SessionError::Http { status, body }) => {
            assert_eq!(status, 503);
            assert_eq!(body, "overloaded");
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("expected an error status"),
    }
}

#[tokio::test]
async fn test_chat_stream_error_event() {
    let server = MockServer::start().await;
    let body = "data: {\"text\":\"Par\"}\n\ndata: {\"error\":\"model overloaded\"}\n\n";
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let backend = HttpChatBackend::new(server.uri(), None);
    let items: Vec<_> = backend
        .stream_chat(chat_request("hi"))
        .await
        .unwrap()
        .collect()
        .await;

    assert_eq!(items.len(), 2);
    assert_eq!(items[0].as_deref().unwrap(), "Par");
    assert!(matches!(&items[1], Err(SessionError::Stream(m)) if m == "model overloaded"));
}

#[tokio::test]
async fn test_generate_posts_confirmed_plan() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate-project"))
        .and(body_partial_json(json!({ "prompt": "todo app", "confirmed": true })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "files": [
                { "name": "index.html", "language": "html", "content": "<ul></ul>" }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let generator =
        HttpProjectGenerator::new(format!("{}/api/generate-project", server.uri()), None);
    let response = generator
        .generate(GenerateRequest {
            prompt: "todo app".to_string(),
            existing_files: None,
            confirmed: true,
        })
        .await
        .unwrap();

    assert_eq!(response.files.len(), 1);
    assert_eq!(response.files[0].name, "index.html");
}

#[tokio::test]
async fn test_generate_malformed_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
        .mount(&server)
        .await;

    let generator = HttpProjectGenerator::new(server.uri(), None);
    let result = generator
        .generate(GenerateRequest {
            prompt: "todo app".to_string(),
            existing_files: None,
            confirmed: true,
        })
        .await;

    assert!(matches!(result, Err(SessionError::MalformedResponse(_))));
}

/// Whole lifecycle over HTTP: streamed plan, confirmation, generation.
#[tokio::test]
async fn test_session_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(sse_response(&[
            "**Here's my plan:**\n",
            "1. Landing page\n2. Contact form\n",
            "Shall I proceed?",
        ]))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/generate-project"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "files": [
                { "name": "index.html", "language": "html", "content": "<h1>Bakery</h1>" },
                { "name": "contact.html", "language": "html", "content": "<form></form>" }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let config = SessionConfig {
        chat_url: format!("{}/api/chat", server.uri()),
        generate_url: format!("{}/api/generate-project", server.uri()),
        ..SessionConfig::default()
    }
    .without_pacing();
    let session = BuildSession::from_config(config);

    assert!(session.chat("A bakery site", "", &[]).await);
    let proposal = session.pending_proposal().expect("plan should be proposed");
    assert!(proposal.build_directive.is_none());

    session
        .confirm_and_build(&proposal.id, None)
        .unwrap()
        .await
        .unwrap();

    assert_eq!(session.phase(), Phase::Done);
    let files = session.consume_results().unwrap();
    assert_eq!(files.len(), 2);
}
