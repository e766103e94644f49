use campus_chat_core::{ChatBackend, ChatClient, ChatError, ChatRequest};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn request(query: &str, follow_up_to: Option<&str>) -> ChatRequest {
    ChatRequest {
        chat_id: "default".into(),
        query: query.into(),
        follow_up_to: follow_up_to.map(str::to_string),
        original_question: None,
    }
}

#[tokio::test]
async fn test_posts_json_and_decodes_answer() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(header("content-type", "application/json"))
        .and(body_json(json!({ "chat_id": "default", "query": "Hello" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "answer": "Hi there",
            "sources": ["http://a", "http://b"],
            "follow_up": "Did that help?",
            "follow_up_id": "f1"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = ChatClient::new(&format!("{}/api", server.uri()));
    let response = client.chat(&request("Hello", None)).await.unwrap();

    assert_eq!(response.answer, "Hi there");
    assert_eq!(
        response.sources,
        Some(vec!["http://a".to_string(), "http://b".to_string()])
    );
    assert_eq!(response.follow_up.as_deref(), Some("Did that help?"));
    assert_eq!(response.follow_up_id.as_deref(), Some("f1"));
}

#[tokio::test]
async fn test_follow_up_to_is_serialized() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_json(json!({
            "chat_id": "default",
            "query": "yes",
            "follow_up_to": "f1"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "answer": "Great" })))
        .expect(1)
        .mount(&server)
        .await;

    let client = ChatClient::new(&format!("{}/api", server.uri()));
    let response = client.chat(&request("yes", Some("f1"))).await.unwrap();
    assert_eq!(response.answer, "Great");
}

#[tokio::test]
async fn test_non_success_status_is_error_with_detail() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(
            ResponseTemplate::new(503).set_body_json(json!({ "error": "model overloaded" })),
        )
        .mount(&server)
        .await;

    let client = ChatClient::new(&format!("{}/api", server.uri()));
    let err = client.chat(&request("Hello", None)).await.unwrap_err();

    match err {
        ChatError::Status { status, detail } => {
            assert_eq!(status, 503);
            assert_eq!(detail.as_deref(), Some("model overloaded"));
        }
        other => panic!("expected status error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_status_error_without_json_body() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("Internal Server Error"))
        .mount(&server)
        .await;

    let client = ChatClient::new(&format!("{}/api", server.uri()));
    let err = client.chat(&request("Hello", None)).await.unwrap_err();
    assert!(matches!(err, ChatError::Status { status: 500, detail: None }));
}

#[tokio::test]
async fn test_malformed_body_is_decode_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let client = ChatClient::new(&format!("{}/api", server.uri()));
    let err = client.chat(&request("Hello", None)).await.unwrap_err();
    assert!(matches!(err, ChatError::Decode(_)));
}

#[tokio::test]
async fn test_unreachable_server_is_transport_error() {
    let server = MockServer::start().await;
    let uri = server.uri();
    drop(server);

    let client = ChatClient::new(&format!("{uri}/api"));
    let err = client.chat(&request("Hello", None)).await.unwrap_err();
    assert!(matches!(err, ChatError::Transport(_)));
}
