use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use pipe_agent::core::AgentEvent;
use pipe_agent::sandbox::{EvalCapability, SandboxLimits};
use pipe_agent::service::ServiceConfig;
use pipe_agent::{DEFAULT_SYSTEM_PROMPT, SessionBuilder};
use pipe_agent_model::{ModelMessage, ToolCallRequest, ToolCallResult};
use pipe_agent_test_model::{PresetEvent, PresetResponse, TestModelProvider};
use serde_json::{Value, json};
use tokio::net::TcpListener;

const TOKEN: &str = "test-token";

#[derive(Clone, Default)]
struct Recorded {
    requests: Arc<Mutex<Vec<(String, Option<String>, Value)>>>,
}

impl Recorded {
    fn record(&self, path: String, headers: &HeaderMap, body: &Value) -> bool {
        let auth = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(ToOwned::to_owned);
        let authorized = auth.as_deref() == Some(format!("Bearer {TOKEN}").as_str());
        self.requests.lock().unwrap().push((path, auth, body.clone()));
        authorized
    }

    fn requests(&self) -> Vec<(String, Option<String>, Value)> {
        self.requests.lock().unwrap().clone()
    }
}

async fn google_search(
    State(recorded): State<Recorded>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !recorded.record("proxy/google_search".to_owned(), &headers, &body) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    match body["query"].as_str() {
        Some("nothing") => Json(json!({ "kind": "customsearch#search" })).into_response(),
        Some("broken") => {
            (StatusCode::INTERNAL_SERVER_ERROR, "search backend down").into_response()
        }
        Some(query) => {
            let items: Vec<_> = (1..=7)
                .map(|i| {
                    json!({
                        "title": format!("{query} result {i}"),
                        "snippet": format!("About {query}, part {i}."),
                        "link": format!("https://example.com/{i}"),
                    })
                })
                .collect();
            Json(json!({ "items": items })).into_response()
        }
        None => StatusCode::BAD_REQUEST.into_response(),
    }
}

async fn run_pipe(
    State(recorded): State<Recorded>,
    Path(pipe_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !recorded.record(format!("pipe/{pipe_id}/run"), &headers, &body) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let words = body["text"].as_str().unwrap_or_default().split_whitespace().count();
    Json(json!({ "pipe_id": pipe_id, "words": words })).into_response()
}

async fn start_service() -> (ServiceConfig, Recorded) {
    let recorded = Recorded::default();
    let app = Router::new()
        .route("/api/v1/proxy/google_search", post(google_search))
        .route("/api/v1/pipe/:pipe_id/run", post(run_pipe))
        .with_state(recorded.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    let config = ServiceConfig::with_token(TOKEN).with_base_url(format!("http://{addr}/api/v1"));
    (config, recorded)
}

fn tool_call(id: &str, name: &str, arguments: Value) -> PresetEvent {
    PresetEvent::ToolCall(ToolCallRequest {
        id: id.to_owned(),
        name: name.to_owned(),
        arguments,
    })
}

/// Returns the content of the tool message answering `id`.
fn tool_result(messages: &[ModelMessage], id: &str) -> String {
    messages
        .iter()
        .find_map(|msg| match msg {
            ModelMessage::Tool(result) if result.id == id => Some(result.content.clone()),
            _ => None,
        })
        .unwrap_or_else(|| panic!("no result for {id}"))
}

fn tool_error(messages: &[ModelMessage], id: &str) -> Value {
    let content: Value = serde_json::from_str(&tool_result(messages, id)).unwrap();
    content["error"].clone()
}

#[tokio::test]
async fn test_evaluate_expression() {
    let mut provider = TestModelProvider::default();
    provider.add_response(PresetResponse::with_events([tool_call(
        "call_1",
        "evaluate_expression",
        json!({ "code": "2+40" }),
    )]));
    provider.add_response(PresetResponse::text("2 + 40 = 42."));

    let events = Arc::new(Mutex::new(vec![]));
    let session = SessionBuilder::with_model_provider(provider.clone())
        .with_eval_capability(EvalCapability::SandboxedInterpreter(
            SandboxLimits::default(),
        ))
        .on_event({
            let events = Arc::clone(&events);
            move |event| events.lock().unwrap().push(event)
        })
        .build();

    let outcome = session.send_message("What is 2+40?").await.unwrap();
    assert!(outcome.reply.contains("42"));

    let requests = provider.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(
        requests[0].messages,
        [
            ModelMessage::system(DEFAULT_SYSTEM_PROMPT),
            ModelMessage::user("What is 2+40?"),
        ]
    );
    let tools: Vec<_> = requests[0].tools.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(tools, ["evaluate_expression"]);
    assert_eq!(
        requests[1].messages.last(),
        Some(&ModelMessage::Tool(ToolCallResult {
            id: "call_1".to_owned(),
            content: "42".to_owned(),
        }))
    );

    assert_eq!(session.history().await.len(), 5);
    assert!(events.lock().unwrap().contains(&AgentEvent::ToolCallCompleted {
        id: "call_1".to_owned(),
        name: "evaluate_expression".to_owned(),
        result: Ok("42".to_owned()),
    }));
}

#[tokio::test]
async fn test_undeclared_tools() {
    let mut provider = TestModelProvider::default();
    provider.add_response(PresetResponse::with_events([tool_call(
        "call_1",
        "evaluate_expression",
        json!({ "code": "1" }),
    )]));
    provider.add_response(PresetResponse::text("I cannot evaluate code here."));

    // No evaluation and no service token: nothing to declare.
    let session = SessionBuilder::with_model_provider(provider.clone())
        .with_system_prompt("Be brief.")
        .build();
    session.send_message("What is 1?").await.unwrap();

    let requests = provider.requests();
    assert!(requests[0].tools.is_empty());
    assert_eq!(tool_error(&requests[1].messages, "call_1")["kind"], "not_found");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_web_search() {
    let (config, recorded) = start_service().await;

    let mut provider = TestModelProvider::default();
    provider.add_response(PresetResponse::with_events([
        tool_call("s1", "web_search", json!({ "query": "rust" })),
        tool_call("s2", "web_search", json!({ "query": "nothing" })),
        tool_call("s3", "web_search", json!({ "query": "broken" })),
    ]));
    provider.add_response(PresetResponse::text("Rust is a language."));

    let session = SessionBuilder::with_model_provider(provider.clone())
        .with_service(config)
        .build();
    let outcome = session.send_message("What is rust?").await.unwrap();
    assert_eq!(outcome.reply, "Rust is a language.");

    let requests = provider.requests();
    let tools: Vec<_> = requests[0].tools.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(tools, ["run_pipe", "web_search"]);

    let messages = &requests[1].messages;
    let results: Value = serde_json::from_str(&tool_result(messages, "s1")).unwrap();
    assert_eq!(results.as_array().unwrap().len(), 5);
    assert_eq!(
        results[0],
        json!({ "title": "rust result 1", "snippet": "About rust, part 1." })
    );
    assert_eq!(tool_result(messages, "s2"), "No results found.");
    let err = tool_error(messages, "s3");
    assert_eq!(err["kind"], "backend");
    assert!(err["message"].as_str().unwrap().contains("status 500"));

    let service_requests = recorded.requests();
    assert_eq!(service_requests.len(), 3);
    for (path, auth, _) in &service_requests {
        assert_eq!(path, "proxy/google_search");
        assert_eq!(auth.as_deref(), Some("Bearer test-token"));
    }
    assert!(
        service_requests
            .iter()
            .any(|(_, _, body)| *body == json!({ "query": "rust" }))
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_run_pipe() {
    let (config, recorded) = start_service().await;

    let mut provider = TestModelProvider::default();
    provider.add_response(PresetResponse::with_events([
        tool_call(
            "p1",
            "run_pipe",
            json!({
                "pipe_id": "Pn38L1q",
                "input_data": { "text": "Hello, pipe world!", "lang": "en" }
            }),
        ),
        tool_call(
            "p2",
            "run_pipe",
            json!({ "pipe_id": "../admin", "input_data": { "text": "x" } }),
        ),
        tool_call("p3", "run_pipe", json!({ "pipe_id": "Pn38L1q" })),
    ]));
    provider.add_response(PresetResponse::text("The pipe counted 3 words."));

    let session = SessionBuilder::with_model_provider(provider.clone())
        .with_service(config)
        .build();
    session.send_message("Run pipe Pn38L1q").await.unwrap();

    let requests = provider.requests();
    let messages = &requests[1].messages;
    let output: Value = serde_json::from_str(&tool_result(messages, "p1")).unwrap();
    assert_eq!(output, json!({ "pipe_id": "Pn38L1q", "words": 3 }));
    assert_eq!(tool_error(messages, "p2")["kind"], "invalid_input");
    assert_eq!(tool_error(messages, "p3")["kind"], "invalid_input");

    // Only the valid call reached the service, with `input_data` as the body.
    let service_requests = recorded.requests();
    assert_eq!(service_requests.len(), 1);
    let (path, _, body) = &service_requests[0];
    assert_eq!(path, "pipe/Pn38L1q/run");
    assert_eq!(*body, json!({ "text": "Hello, pipe world!", "lang": "en" }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unauthorized_service() {
    let (config, _) = start_service().await;
    let config = ServiceConfig::with_token("wrong-token").with_base_url(config.base_url());

    let mut provider = TestModelProvider::default();
    provider.add_response(PresetResponse::with_events([tool_call(
        "s1",
        "web_search",
        json!({ "query": "rust" }),
    )]));
    provider.add_response(PresetResponse::text("Search is unavailable."));

    let session = SessionBuilder::with_model_provider(provider.clone())
        .with_service(config)
        .build();
    session.send_message("What is rust?").await.unwrap();

    let requests = provider.requests();
    let err = tool_error(&requests[1].messages, "s1");
    assert_eq!(err["kind"], "backend");
    assert!(err["message"].as_str().unwrap().contains("status 401"));
    assert!(!err["message"].as_str().unwrap().contains("wrong-token"));
}
