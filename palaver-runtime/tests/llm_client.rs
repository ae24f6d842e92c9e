#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! HTTP model client against a mock chat-completions server.

use palaver_runtime::*;
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn tools() -> Vec<serde_json::Value> {
    vec![json!({
        "type": "function",
        "function": {"name": "read_file", "description": "Read", "parameters": {"type": "object"}}
    })]
}

#[tokio::test]
async fn test_text_reply() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(json!({
            "model": "test-model",
            "messages": [
                {"role": "system", "content": "be nice"},
                {"role": "user", "content": "hi"}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "hello!"}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = OpenAiCompatibleClient::new(server.uri(), "test-model").with_api_key("test-key");
    let reply = client
        .complete("be nice", &[Message::user("hi")], &tools())
        .await
        .unwrap();

    assert_eq!(reply, ModelResponse::Text("hello!".into()));
}

#[tokio::test]
async fn test_tool_call_reply_decodes_arguments() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{
                "finish_reason": "tool_calls",
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [
                        {"id": "call_a", "type": "function",
                         "function": {"name": "read_file",
                                      "arguments": "{\"path\": \"notes.md\"}"}},
                        {"id": "call_b", "type": "function",
                         "function": {"name": "read_file", "arguments": "{broken"}}
                    ]
                }
            }]
        })))
        .mount(&server)
        .await;

    let client = OpenAiCompatibleClient::new(server.uri(), "test-model");
    let reply = client.complete("", &[Message::user("read it")], &tools()).await.unwrap();

    match reply {
        ModelResponse::ToolCalls { content, calls } => {
            assert!(content.is_none());
            assert_eq!(calls.len(), 2);
            assert_eq!(calls[0], ToolCall::new("call_a", "read_file", json!({"path": "notes.md"})));
            assert_eq!(calls[1].arguments, json!({}));
        }
        other => panic!("expected tool calls, got {:?}", other),
    }
}

#[tokio::test]
async fn test_history_sent_in_wire_shape() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({
            "messages": [
                {"role": "user", "content": "list"},
                {"role": "assistant", "tool_calls": [
                    {"id": "c1", "type": "function",
                     "function": {"name": "list_directory", "arguments": "{}"}}
                ]},
                {"role": "tool", "tool_call_id": "c1", "content": "a.txt"}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"content": "one file"}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let history = vec![
        Message::user("list"),
        Message::assistant_tool_calls(
            None,
            vec![ToolCall::new("c1", "list_directory", json!({}))],
        ),
        Message::tool_result("c1", "a.txt"),
    ];

    let client = OpenAiCompatibleClient::new(server.uri(), "m");
    let reply = client.complete("", &history, &[]).await.unwrap();
    assert_eq!(reply, ModelResponse::Text("one file".into()));
}

#[tokio::test]
async fn test_unauthorized_is_llm_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
        .mount(&server)
        .await;

    let client = OpenAiCompatibleClient::new(server.uri(), "m").with_api_key("wrong");
    match client.complete("", &[Message::user("hi")], &[]).await {
        Err(RuntimeError::LLMError(msg)) => {
            assert!(msg.contains("401"));
            assert!(msg.contains("bad key"));
        }
        other => panic!("expected LLMError, got {:?}", other),
    }
}

#[tokio::test]
async fn test_empty_choices_is_llm_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
        .mount(&server)
        .await;

    let client = OpenAiCompatibleClient::new(server.uri(), "m");
    let result = client.complete("", &[Message::user("hi")], &[]).await;
    assert!(matches!(result, Err(RuntimeError::LLMError(msg)) if msg.contains("No choices")));
}

#[tokio::test]
async fn test_summarizer_uses_summary_system_prompt() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({
            "max_tokens": 2048,
            "messages": [
                {"role": "system", "content": "You are a precise conversation summarizer."},
                {"role": "user", "content": "Summarize this"}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"content": "- short"}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let summarizer = ChatSummarizer::new(Arc::new(OpenAiCompatibleClient::new(server.uri(), "m")));
    assert_eq!(summarizer.summarize("Summarize this").await.unwrap(), "- short");
}

#[tokio::test]
async fn test_summarizer_failure_is_summary_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let summarizer = ChatSummarizer::new(Arc::new(OpenAiCompatibleClient::new(server.uri(), "m")));
    assert!(matches!(
        summarizer.summarize("x").await,
        Err(RuntimeError::SummaryError(_))
    ));
}
