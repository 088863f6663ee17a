//! Chat Completions client against a throwaway in-process server.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use futures_util::StreamExt;
use narrator_core::{
    CancellationToken, ChatMessage, GenerationError, LanguageModel, ModelEvent, ModelRequest,
    ToolChoice,
};
use narrator_llm::{OpenAiCompatModel, OpenAiConfig};
use serde_json::Value;

const SSE_BODY: &str = concat!(
    "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\",\"content\":\"\"}}]}\n\n",
    "data: {\"choices\":[{\"delta\":{\"content\":\"こんにちは。\"}}]}\n\n",
    "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"id\":\"call_1\",\"function\":{\"name\":\"setAvatar\",\"arguments\":\"{\\\"name\\\":\"}}]}}]}\n\n",
    "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"arguments\":\"\\\"default\\\"}\"}}]}}]}\n\n",
    "data: [DONE]\n\n",
);

#[derive(Clone, Default)]
struct Captured {
    body: Arc<Mutex<Option<Value>>>,
    auth: Arc<Mutex<Option<String>>>,
}

async fn completions(
    State(captured): State<Captured>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    *captured.auth.lock().unwrap() = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let model = body["model"].as_str().unwrap_or_default().to_string();
    *captured.body.lock().unwrap() = Some(body);

    match model.as_str() {
        "forbidden" => (
            StatusCode::UNAUTHORIZED,
            [(header::CONTENT_TYPE, "application/json")],
            "{\"error\":{\"message\":\"bad key\"}}",
        )
            .into_response(),
        // Error status whose body never arrives.
        "stalled" => (
            StatusCode::SERVICE_UNAVAILABLE,
            Body::from_stream(futures_util::stream::pending::<Result<bytes::Bytes, std::io::Error>>()),
        )
            .into_response(),
        _ => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/event-stream")],
            SSE_BODY,
        )
            .into_response(),
    }
}

async fn spawn_server() -> (SocketAddr, Captured) {
    let captured = Captured::default();
    let app = Router::new()
        .route("/v1/chat/completions", post(completions))
        .with_state(captured.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, captured)
}

fn request(model: &str) -> ModelRequest {
    ModelRequest {
        model: model.to_string(),
        messages: vec![
            ChatMessage::system("You narrate."),
            ChatMessage::user("実況して", None),
        ],
        tools: Vec::new(),
        tool_choice: ToolChoice::Auto,
        temperature: 0.5,
    }
}

fn client(addr: SocketAddr) -> OpenAiCompatModel {
    let config =
        OpenAiConfig::new(format!("http://{addr}/v1")).with_api_key(Some("sk-test".to_string()));
    OpenAiCompatModel::new(&config).unwrap()
}

#[tokio::test]
async fn test_streams_text_and_tool_calls() {
    let (addr, captured) = spawn_server().await;
    let model = client(addr);

    let stream = model
        .stream(request("gpt-4o-mini"), &CancellationToken::new())
        .await
        .unwrap();
    let events: Vec<ModelEvent> = stream.map(Result::unwrap).collect().await;

    assert_eq!(events.len(), 3);
    assert_eq!(events[0], ModelEvent::TextDelta("こんにちは。".to_string()));
    match &events[1] {
        ModelEvent::ToolCall(call) => {
            assert_eq!(call.id, "call_1");
            assert_eq!(call.name, "setAvatar");
            assert_eq!(call.arguments["name"], "default");
        }
        other => panic!("expected tool call, got {other:?}"),
    }
    assert_eq!(events[2], ModelEvent::Done);

    let body = captured.body.lock().unwrap().clone().unwrap();
    assert_eq!(body["stream"], Value::Bool(true));
    assert_eq!(body["model"], "gpt-4o-mini");
    assert_eq!(body["messages"][1]["role"], "user");
    assert_eq!(
        captured.auth.lock().unwrap().as_deref(),
        Some("Bearer sk-test")
    );
}

#[tokio::test]
async fn test_http_error_carries_status_and_body() {
    let (addr, _captured) = spawn_server().await;
    let model = client(addr);

    let err = model
        .stream(request("forbidden"), &CancellationToken::new())
        .await
        .err()
        .unwrap();

    match err {
        GenerationError::Http { status, body } => {
            assert_eq!(status, 401);
            assert!(body.contains("bad key"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_cancelled_before_send() {
    let (addr, captured) = spawn_server().await;
    let model = client(addr);
    let token = CancellationToken::new();
    token.cancel();

    let err = model.stream(request("gpt-4o-mini"), &token).await.err().unwrap();
    assert!(matches!(err, GenerationError::Cancelled));
    assert!(captured.body.lock().unwrap().is_none());
}

#[tokio::test]
async fn test_cancel_while_reading_error_body() {
    let (addr, _captured) = spawn_server().await;
    let model = client(addr);
    let token = CancellationToken::new();

    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        canceller.cancel();
    });

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        model.stream(request("stalled"), &token),
    )
    .await
    .expect("cancellation should end the request");
    assert!(matches!(result.err().unwrap(), GenerationError::Cancelled));
}
