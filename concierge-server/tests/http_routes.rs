//! HTTP integration tests for the Concierge REST API
//!
//! Uses both the inner function approach and the Axum `oneshot` approach for
//! full end-to-end handler dispatch. Backends are in-memory doubles.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use concierge_core::models::ContactEntry;
use concierge_core::{
    ConciergeConfig, EmbeddingBackend, EmbeddingError, GenerationBackend, GenerationError,
    GenerationRequest, MemoryBookingStore, MemoryVectorIndex, StaticContacts,
};
use concierge_server::http::{build_router, chat_inner, health_inner, ChatRequest, HttpState};
use concierge_server::subsystems::orchestrator::{Backends, Concierge, ConciergeSettings};
use concierge_server::subsystems::sessions::MemorySessionStore;
use serde_json::json;
use tower::ServiceExt;

const CONFIG: &str = r#"
[service]
socket_path = "/tmp/concierge-http-test.sock"
log_level = "info"
max_message_chars = 50

[storage]
backend = "memory"

[embedding]
model = "gemini-embedding-001"
dimensions = 2
max_retries = 1
retry_delay_ms = 10
timeout_seconds = 5

[generation]
model = "gemini-2.5-flash"
temperature = 0.3
max_output_tokens = 256
max_retries = 1
retry_delay_ms = 10
timeout_seconds = 5
system_prompt = "You are the support assistant."

[support]
company_name = "Adeona Technologies"
phone = "(+94) 117 433 3333"
email = "info@adeonatech.net"
website = "https://adeonatech.net/"

[catalog]
services = ["Tailored Software Development", "Lead Manager", "Digital Bill"]
"#;

struct EchoGenerator;

#[async_trait]
impl GenerationBackend for EchoGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        Ok(format!("echo: {}", request.message))
    }
    fn name(&self) -> &str {
        "echo"
    }
}

struct UnitEmbedder;

#[async_trait]
impl EmbeddingBackend for UnitEmbedder {
    async fn embed(&self, _: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(vec![1.0, 0.0])
    }
    fn dimensions(&self) -> usize {
        2
    }
    fn name(&self) -> &str {
        "unit"
    }
}

fn make_state() -> Arc<HttpState> {
    let config = ConciergeConfig::from_toml_str(CONFIG).expect("test config parses");
    let backends = Backends {
        sessions: Arc::new(MemorySessionStore::new()),
        bookings: Arc::new(MemoryBookingStore::new()),
        index: Arc::new(MemoryVectorIndex::new()),
        embedder: Arc::new(UnitEmbedder),
        generator: Arc::new(EchoGenerator),
        contacts: Arc::new(StaticContacts::new(vec![
            ContactEntry::new("Email", "info@adeonatech.net"),
            ContactEntry::new("LinkedIn", "https://www.linkedin.com/company/adeona-technologies"),
        ])),
        web_search: None,
    };
    let concierge = Arc::new(Concierge::new(backends, ConciergeSettings::from(&config)));
    Arc::new(HttpState { concierge, config })
}

async fn send(state: Arc<HttpState>, req: Request<Body>) -> (StatusCode, serde_json::Value) {
    let resp = build_router(state).oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, body)
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

// ===========================================================================
// TEST 1: POST /chat — new session gets an id, follow-up keeps it
// ===========================================================================
#[tokio::test]
async fn test_chat_creates_and_reuses_session() {
    let state = make_state();

    let (status, body) = send(state.clone(), post_json("/chat", json!({ "message": "tell me about the CRM" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["response"], "echo: tell me about the CRM");
    assert_eq!(body["stage"], "idle");
    assert!(body["audio_url"].is_null());
    assert!(body["took_ms"].is_number());
    let session_id = body["session_id"].as_str().unwrap().to_string();
    assert!(!session_id.is_empty());

    let (_, body) = send(
        state.clone(),
        post_json("/chat", json!({ "message": "book a service", "session_id": session_id })),
    )
    .await;
    assert_eq!(body["session_id"], session_id.as_str());
    assert_eq!(body["stage"], "await_name");
}

// ===========================================================================
// TEST 2: POST /chat — missing, blank and oversized messages are 400
// ===========================================================================
#[tokio::test]
async fn test_chat_rejects_bad_messages() {
    let state = make_state();

    let (status, body) = send(state.clone(), post_json("/chat", json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");
    assert_eq!(body["error"], "message field is required");

    let (status, _) = send(state.clone(), post_json("/chat", json!({ "message": "   " }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let long = "x".repeat(51);
    let (status, body) = send(state.clone(), post_json("/chat", json!({ "message": long }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("50"));

    // Session store untouched by rejected requests
    let (_, stats) = send(state, get("/stats")).await;
    assert_eq!(stats["active_sessions"], 0);
}

// ===========================================================================
// TEST 3: chat_inner directly — same validation as the route
// ===========================================================================
#[tokio::test]
async fn test_chat_inner_direct() {
    let state = make_state();
    let (status, _) = chat_inner(&state.concierge, 10, ChatRequest::default()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = chat_inner(
        &state.concierge,
        10,
        ChatRequest {
            message: Some("hi".to_string()),
            session_id: Some("inner".to_string()),
        },
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["session_id"], "inner");
}

// ===========================================================================
// TEST 4: GET /health — every component reported
// ===========================================================================
#[tokio::test]
async fn test_health_endpoint() {
    let state = make_state();
    let (status, body) = send(state.clone(), get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert!(body["version"].is_string());
    for component in ["generation", "embedding", "vector_index", "record_store", "contacts"] {
        assert_eq!(body["services"][component]["ok"], true, "{} should be ok", component);
    }

    let (status, body) = health_inner(&state.concierge, "/tmp/x.sock").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["socket"], "/tmp/x.sock");
}

// ===========================================================================
// TEST 5: GET /version
// ===========================================================================
#[tokio::test]
async fn test_version_endpoint() {
    let (status, body) = send(make_state(), get("/version")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["protocol"], "concierge/1");
}

// ===========================================================================
// TEST 6: GET /contact and GET /services
// ===========================================================================
#[tokio::test]
async fn test_contact_and_services() {
    let state = make_state();

    let (status, body) = send(state.clone(), get("/contact")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["contact_info"]["Email"], "info@adeonatech.net");
    assert!(body["contact_info"]["LinkedIn"].is_string());

    let (status, body) = send(state, get("/services")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 3);
    assert_eq!(body["services"][1], "Lead Manager");
    assert_eq!(body["phone"], "(+94) 117 433 3333");
}

// ===========================================================================
// TEST 7: POST /admin/cleanup and GET /stats
// ===========================================================================
#[tokio::test]
async fn test_cleanup_and_stats() {
    let state = make_state();
    send(state.clone(), post_json("/chat", json!({ "message": "hi" }))).await;

    let (_, stats) = send(state.clone(), get("/stats")).await;
    assert_eq!(stats["active_sessions"], 1);
    assert_eq!(stats["services_available"], 3);

    // Fresh sessions survive a purge
    let (status, body) = send(state.clone(), post_json("/admin/cleanup", json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["purged"], 0);
}

// ===========================================================================
// TEST 8: POST /admin/reindex — chunks become retrievable context
// ===========================================================================
#[tokio::test]
async fn test_reindex_endpoint() {
    let state = make_state();

    let (status, body) = send(state.clone(), post_json("/admin/reindex", json!({ "chunks": [] }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");

    let (status, body) = send(
        state.clone(),
        post_json(
            "/admin/reindex",
            json!({ "chunks": [
                { "source_url": "https://adeonatech.net/services", "category": "SERVICES", "content": "We build CRMs." },
                { "source_url": "https://adeonatech.net/about", "content": "" }
            ]}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["indexed"], 1);
    assert_eq!(body["failed"], 1);

    let (_, body) = send(state, post_json("/chat", json!({ "message": "do you make CRMs?" }))).await;
    assert_eq!(body["sources"][0], "https://adeonatech.net/services");
}

// ===========================================================================
// TEST 9: unknown route is 404
// ===========================================================================
#[tokio::test]
async fn test_unknown_route() {
    let (status, _) = send(make_state(), get("/nope")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
