//! Mock Ollama and VOICEVOX endpoints for integration tests
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::{
    body::Body,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};

/// Chat-style NDJSON records for the pieces, cut into tiny chunks.
pub fn ndjson_chunks(pieces: &[&str]) -> Vec<Vec<u8>> {
    let mut payload = Vec::new();
    for piece in pieces {
        payload.extend_from_slice(json!({"message": {"content": piece}, "done": false}).to_string().as_bytes());
        payload.push(b'\n');
    }
    payload.extend_from_slice(b"{\"done\":true}");

    // Three-byte chunks split every multi-byte character across reads.
    payload.chunks(3).map(<[u8]>::to_vec).collect()
}

#[derive(Clone, Default)]
pub struct Recorded {
    pub chat_requests: Arc<Mutex<Vec<Value>>>,
    pub queries: Arc<Mutex<Vec<HashMap<String, String>>>>,
    pub recipes: Arc<Mutex<Vec<Value>>>,
}

#[derive(Clone)]
struct MockState {
    recorded: Recorded,
    chunks: Arc<Vec<Vec<u8>>>,
}

async fn chat(State(state): State<MockState>, Json(body): Json<Value>) -> Response {
    state.recorded.chat_requests.lock().unwrap().push(body);
    let chunks: Vec<Result<Vec<u8>, std::io::Error>> =
        state.chunks.iter().cloned().map(Ok).collect();
    Body::from_stream(futures_util::stream::iter(chunks)).into_response()
}

async fn tags() -> Json<Value> {
    Json(json!({"models": [{"name": "gpt-oss:20b"}, {"name": "llama3.2:latest"}]}))
}

async fn speakers() -> Json<Value> {
    Json(json!([
        {"name": "四国めたん", "styles": [{"id": 2, "name": "ノーマル"}, {"id": 0, "name": "あまあま"}]},
        {"name": "ずんだもん", "styles": [{"id": 3, "name": "ノーマル"}]}
    ]))
}

async fn audio_query(
    State(state): State<MockState>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Value> {
    let text = params.get("text").cloned().unwrap_or_default();
    state.recorded.queries.lock().unwrap().push(params);
    Json(json!({"accent_phrases": [], "speedScale": 1.0, "volumeScale": 1.0, "kana": text}))
}

async fn synthesis(State(state): State<MockState>, Json(recipe): Json<Value>) -> Vec<u8> {
    let kana = recipe["kana"].as_str().unwrap_or_default().to_string();
    state.recorded.recipes.lock().unwrap().push(recipe);
    // Echo the text so the player can tell fragments apart.
    kana.into_bytes()
}

/// Serves both engines on one ephemeral port and returns its base URL.
pub async fn spawn_mock(chunks: Vec<Vec<u8>>) -> (String, Recorded) {
    let recorded = Recorded::default();
    let state = MockState { recorded: recorded.clone(), chunks: Arc::new(chunks) };

    let app = Router::new()
        .route("/api/chat", post(chat))
        .route("/api/tags", get(tags))
        .route("/speakers", get(speakers))
        .route("/audio_query", post(audio_query))
        .route("/synthesis", post(synthesis))
        .with_state(state);

    (serve(app).await, recorded)
}

/// Answers every request with the given status.
pub async fn spawn_failing(status: StatusCode, body: &'static str) -> String {
    let app = Router::new().fallback(move || async move { (status, body) });
    serve(app).await
}

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}
