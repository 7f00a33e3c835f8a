//! Backend wire formats and retry behavior against a canned local server.

use std::sync::Arc;

use affinity_core::behavior::Behavior;
use affinity_core::config::LlmConfig;
use affinity_core::{ChatMessage, Classifier, Generator, PromptEngine};
use affinity_llm::{LlmClassifier, LlmClient, LlmError, LlmRequest};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Serve each `(status, body)` to one connection, in order. The handle
/// yields the raw requests received.
async fn serve(responses: Vec<(u16, &'static str)>) -> (String, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let handle = tokio::spawn(async move {
        let mut requests = Vec::new();
        for (status, body) in responses {
            let (mut socket, _) = listener.accept().await.expect("accept");
            requests.push(read_request(&mut socket).await);
            let reply = format!(
                "HTTP/1.1 {status} X\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(reply.as_bytes()).await.expect("write");
            socket.shutdown().await.ok();
        }
        requests
    });
    (format!("http://{addr}"), handle)
}

async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0_u8; 4096];
    loop {
        let n = socket.read(&mut chunk).await.expect("read");
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        let text = String::from_utf8_lossy(&buf).to_string();
        if let Some(head_end) = text.find("\r\n\r\n") {
            let length = text[..head_end]
                .lines()
                .find_map(|l| {
                    let lower = l.to_ascii_lowercase();
                    lower.strip_prefix("content-length:").map(|v| v.trim().parse::<usize>().unwrap_or(0))
                })
                .unwrap_or(0);
            if buf.len() >= head_end + 4 + length {
                return text;
            }
        }
    }
    String::from_utf8_lossy(&buf).to_string()
}

fn config(provider: &str, base_url: &str, retries: u32) -> LlmConfig {
    LlmConfig {
        provider: provider.into(),
        base_url: base_url.into(),
        api_key: Some("sk-test".into()),
        max_retries: retries,
        request_timeout_ms: 2_000,
        ..LlmConfig::default()
    }
}

#[tokio::test]
async fn ollama_chat_round_trip() {
    let (url, server) = serve(vec![(200, r#"{"message": {"content": "  hey you  "}, "eval_count": 5}"#)]).await;
    let client = LlmClient::from_config(&config("ollama", &url, 0)).expect("client");

    let response = client
        .chat(&LlmRequest::new("be brief", vec![ChatMessage::user("hi")]).json())
        .await
        .expect("chat");
    assert_eq!(response.text, "hey you");
    assert_eq!(response.tokens_generated, 5);

    let requests = server.await.expect("server");
    assert!(requests[0].starts_with("POST /api/chat"));
    assert!(requests[0].contains(r#""format":"json""#));
    assert!(requests[0].contains(r#""stream":false"#));
}

#[tokio::test]
async fn server_errors_are_retried() {
    let (url, server) = serve(vec![
        (500, r#"{"error": "loading model"}"#),
        (200, r#"{"message": {"content": "ok"}}"#),
    ])
    .await;
    let client = LlmClient::from_config(&config("ollama", &url, 2)).expect("client");
    let text = client.generate("", &[ChatMessage::user("ping")]).await.expect("generate");
    assert_eq!(text, "ok");
    assert_eq!(server.await.expect("server").len(), 2);
}

#[tokio::test]
async fn retries_are_bounded() {
    let (url, _server) = serve(vec![(503, "{}"), (503, "{}")]).await;
    let client = LlmClient::from_config(&config("ollama", &url, 1)).expect("client");
    let err = client
        .chat(&LlmRequest::new("", vec![ChatMessage::user("ping")]))
        .await
        .expect_err("exhausted");
    assert!(matches!(err, LlmError::RetriesExhausted { attempts: 2, .. }));
}

#[tokio::test]
async fn openai_embeddings_use_bearer_auth() {
    let (url, server) = serve(vec![(200, r#"{"data": [{"embedding": [0.5, -0.25, 1.0]}]}"#)]).await;
    let client = LlmClient::from_config(&config("openai", &url, 0)).expect("client");
    let embedding = client.embed_text("cats").await.expect("embed");
    assert_eq!(embedding, vec![0.5, -0.25, 1.0]);

    let request = server.await.expect("server").remove(0);
    assert!(request.starts_with("POST /v1/embeddings"));
    assert!(request.to_ascii_lowercase().contains("authorization: bearer sk-test"));
    assert!(request.contains(r#""input":"cats""#));
}

#[tokio::test]
async fn classifier_reads_json_label() {
    let (url, server) = serve(vec![
        (200, r#"{"message": {"content": "{\"sentiment\": \"grateful\"}"}}"#),
        (200, r#"{"message": {"content": "i think it's nice"}}"#),
    ])
    .await;
    let client = Arc::new(LlmClient::from_config(&config("ollama", &url, 0)).expect("client"));
    let classifier = LlmClassifier::new(client, Arc::new(PromptEngine::builtin()), "Marin");

    assert_eq!(classifier.classify("thank you so much!").await.expect("classify"), Behavior::Grateful);
    assert_eq!(classifier.classify("whatever you say").await.expect("classify"), Behavior::Neutral);

    let requests = server.await.expect("server");
    assert!(requests[0].contains("thank you so much!"));
}
