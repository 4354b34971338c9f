use serde::{Deserialize, Serialize};

/// Requests accepted over the local socket and, via the router, by the HTTP API.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ConciergeRequest {
    Ping,
    Health,
    Chat {
        message: String,
        #[serde(default)]
        session_id: Option<String>,
    },
    Contacts,
    Services,
    Stats,
    PurgeSessions,
    Reindex {
        chunks: Vec<ChunkInput>,
    },
}

/// A chunk as submitted for indexing, before embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkInput {
    pub source_url: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub chunk_index: i32,
    pub content: String,
}

fn default_category() -> String {
    "GENERAL".to_string()
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ConciergeResponse {
    pub status: String,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub version: String,
}

impl ConciergeResponse {
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            status: "ok".to_string(),
            data: Some(data),
            error: None,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            data: None,
            error: Some(msg.into()),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn pong() -> Self {
        Self::ok(serde_json::json!({"pong": true}))
    }

    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_request_tagging() {
        let req: ConciergeRequest =
            serde_json::from_str(r#"{"action":"chat","message":"hi"}"#).unwrap();
        match req {
            ConciergeRequest::Chat { message, session_id } => {
                assert_eq!(message, "hi");
                assert!(session_id.is_none());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_msgpack_round_trip_of_unit_variant() {
        let bytes = rmp_serde::to_vec_named(&ConciergeRequest::PurgeSessions).unwrap();
        let back: ConciergeRequest = rmp_serde::from_slice(&bytes).unwrap();
        assert!(matches!(back, ConciergeRequest::PurgeSessions));
    }

    #[test]
    fn test_chunk_input_defaults() {
        let chunk: ChunkInput =
            serde_json::from_str(r#"{"source_url":"https://x","content":"text"}"#).unwrap();
        assert_eq!(chunk.category, "GENERAL");
        assert_eq!(chunk.chunk_index, 0);
    }

    #[test]
    fn test_response_envelopes() {
        assert!(ConciergeResponse::pong().is_ok());
        let err = ConciergeResponse::err("boom");
        assert!(!err.is_ok());
        assert_eq!(err.error.as_deref(), Some("boom"));
    }
}
