//! Ollama backend against a mock server.

use elysia::config::LlmConfig;
use elysia::llm::{LanguageModel, ModelRequest, OllamaModel, ResponseStream};
use elysia::tools::registry::schemas_for_api;
use futures_util::StreamExt;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn model_for(server: &MockServer) -> OllamaModel {
    OllamaModel::new(&LlmConfig {
        api_url: server.uri(),
        model: "test-model".to_owned(),
        ..LlmConfig::default()
    })
    .unwrap()
}

fn ndjson(lines: &[serde_json::Value]) -> String {
    lines
        .iter()
        .map(|l| format!("{l}\n"))
        .collect::<String>()
}

/// Concatenate every fragment of every response.
async fn collect_text(mut responses: ResponseStream) -> elysia::Result<String> {
    let mut text = String::new();
    while let Some(mut fragments) = responses.next().await {
        while let Some(fragment) = fragments.next().await {
            text.push_str(&fragment?);
        }
    }
    Ok(text)
}

#[tokio::test]
async fn streams_content_without_reasoning() {
    let server = MockServer::start().await;
    let body = ndjson(&[
        json!({"message": {"role": "assistant", "content": "<think>plan"}, "done": false}),
        json!({"message": {"role": "assistant", "content": " it</think>Hello"}, "done": false}),
        json!({"message": {"role": "assistant", "content": " there."}, "done": false}),
        json!({"message": {"role": "assistant", "content": ""}, "done": true}),
    ]);
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_partial_json(json!({"model": "test-model", "stream": true})))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .expect(1)
        .mount(&server)
        .await;

    let model = model_for(&server);
    let responses = model
        .respond(&ModelRequest::new("be brief", "User: hi"))
        .await
        .unwrap();
    assert_eq!(collect_text(responses).await.unwrap(), "Hello there.");
}

#[tokio::test]
async fn http_error_carries_server_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(json!({"error": "model 'x' not found"})),
        )
        .mount(&server)
        .await;

    let model = model_for(&server);
    let err = match model.respond(&ModelRequest::new("", "User: hi")).await {
        Ok(_) => panic!("expected an error"),
        Err(e) => e.to_string(),
    };
    assert!(err.contains("404"), "{err}");
    assert!(err.contains("model 'x' not found"), "{err}");
}

#[tokio::test]
async fn native_tool_calls_become_tool_code() {
    let server = MockServer::start().await;
    let body = ndjson(&[
        json!({"message": {"role": "assistant", "content": "Listing. "}, "done": false}),
        json!({
            "message": {
                "role": "assistant",
                "content": "",
                "tool_calls": [
                    {"function": {"name": "list_dir", "arguments": {"path": "workspace"}}}
                ]
            },
            "done": false
        }),
        json!({"done": true}),
    ]);
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_partial_json(json!({
            "tools": [{"type": "function", "function": {"name": "create_file"}}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .expect(1)
        .mount(&server)
        .await;

    let model = model_for(&server);
    let request = ModelRequest::new("", "User: list it").with_tools(schemas_for_api());
    let text = collect_text(model.respond(&request).await.unwrap())
        .await
        .unwrap();
    assert_eq!(
        text,
        "Listing. \n```tool_code\nlist_dir(path='workspace')\n```\n"
    );
}

#[tokio::test]
async fn error_chunk_ends_the_stream() {
    let server = MockServer::start().await;
    let body = ndjson(&[
        json!({"message": {"role": "assistant", "content": "Partial"}, "done": false}),
        json!({"error": "out of memory"}),
        json!({"message": {"role": "assistant", "content": " never"}, "done": false}),
    ]);
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(&server)
        .await;

    let model = model_for(&server);
    let mut responses = model.respond(&ModelRequest::new("", "User: hi")).await.unwrap();
    let mut fragments = responses.next().await.unwrap();
    assert_eq!(fragments.next().await.unwrap().unwrap(), "Partial");
    let err = fragments.next().await.unwrap().unwrap_err();
    assert!(err.to_string().contains("out of memory"));
    assert!(fragments.next().await.is_none());
    assert!(responses.next().await.is_none());
}
