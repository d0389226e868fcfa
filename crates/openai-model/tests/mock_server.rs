use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use pipe_agent_model::{
    ErrorKind, ModelFinishReason, ModelMessage, ModelProvider, ModelProviderError,
    ModelRequest, ModelTool, ToolChoice,
};
use pipe_agent_openai_model::{OpenAIConfigBuilder, OpenAIProvider};
use serde_json::{Value, json};
use tokio::net::TcpListener;

#[derive(Clone, Default)]
struct Recorded {
    requests: Arc<Mutex<Vec<(Option<String>, Value)>>>,
}

async fn completions(
    State(recorded): State<Recorded>,
    Path(mode): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let auth = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(ToOwned::to_owned);
    recorded.requests.lock().unwrap().push((auth, body));

    match mode.as_str() {
        "ok" => Json(json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {
                            "name": "evaluate_expression",
                            "arguments": "{\"code\":\"2+40\"}"
                        }
                    }]
                },
                "finish_reason": "tool_calls"
            }]
        }))
        .into_response(),
        "rate_limited" => (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({ "error": { "message": "Rate limit reached" } })),
        )
            .into_response(),
        "unauthorized" => (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": { "message": "Incorrect API key provided" } })),
        )
            .into_response(),
        "server_error" => {
            (StatusCode::BAD_GATEWAY, "upstream unavailable").into_response()
        }
        "html" => (
            [(header::CONTENT_TYPE, "text/html")],
            "<html>login</html>",
        )
            .into_response(),
        "slow" => {
            tokio::time::sleep(Duration::from_secs(5)).await;
            StatusCode::OK.into_response()
        }
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn start_server() -> (String, Recorded) {
    let recorded = Recorded::default();
    let app = Router::new()
        .route("/:mode/chat/completions", post(completions))
        .with_state(recorded.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), recorded)
}

fn provider(base: &str, mode: &str) -> OpenAIProvider {
    OpenAIProvider::new(
        OpenAIConfigBuilder::with_api_key("test-key")
            .with_model("test-model")
            .with_base_url(format!("{base}/{mode}"))
            .with_timeout(Duration::from_millis(500))
            .build(),
    )
}

fn request() -> ModelRequest {
    ModelRequest {
        messages: vec![
            ModelMessage::system("Answer briefly."),
            ModelMessage::user("What is 2+40?"),
        ],
        tools: vec![ModelTool {
            name: "evaluate_expression".to_owned(),
            description: "Evaluates an expression.".to_owned(),
            parameters: json!({
                "type": "object",
                "properties": { "code": { "type": "string" } },
                "required": ["code"]
            }),
        }],
        tool_choice: ToolChoice::Auto,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_completion_with_tool_call() {
    let (base, recorded) = start_server().await;

    let resp = provider(&base, "ok").send_request(&request()).await.unwrap();
    assert_eq!(resp.finish_reason, Some(ModelFinishReason::ToolCalls));
    assert_eq!(resp.message.tool_calls.len(), 1);
    assert_eq!(resp.message.tool_calls[0].name, "evaluate_expression");
    assert_eq!(resp.message.tool_calls[0].arguments, json!({ "code": "2+40" }));

    let requests = recorded.requests.lock().unwrap();
    let (auth, body) = &requests[0];
    assert_eq!(auth.as_deref(), Some("Bearer test-key"));
    assert_eq!(body["model"], "test-model");
    assert_eq!(body["tool_choice"], "auto");
    assert_eq!(body["messages"][1]["content"], "What is 2+40?");
    assert!(body.get("stream").is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_status_errors() {
    let (base, _) = start_server().await;

    let err = provider(&base, "rate_limited")
        .send_request(&request())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RateLimitExceeded);
    assert_eq!(err.status(), Some(429));
    assert!(err.message().contains("Rate limit reached"));

    let err = provider(&base, "unauthorized")
        .send_request(&request())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);
    assert!(!err.to_string().contains("test-key"));

    let err = provider(&base, "server_error")
        .send_request(&request())
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(502));
    assert!(err.message().contains("upstream unavailable"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_invalid_content_type() {
    let (base, _) = start_server().await;
    let err = provider(&base, "html")
        .send_request(&request())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidResponse);
    assert_eq!(err.status(), None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_transport_errors() {
    let (base, _) = start_server().await;
    let err = provider(&base, "slow")
        .send_request(&request())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transport);
    assert!(err.kind().is_transient());

    // Nothing listens on port 9 of the loopback interface.
    let err = provider("http://127.0.0.1:9", "ok")
        .send_request(&request())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transport);
}
