use crate::subsystems::orchestrator::Concierge;
use concierge_core::ipc::{ConciergeRequest, ConciergeResponse};

/// Reject blank messages and messages longer than `max_chars` characters.
pub fn validate_message(message: &str, max_chars: usize) -> Result<(), String> {
    if message.trim().is_empty() {
        return Err("message field is required".to_string());
    }
    if message.chars().count() > max_chars {
        return Err(format!("message exceeds {} characters", max_chars));
    }
    Ok(())
}

/// Dispatch one request to the orchestrator. Shared by the IPC socket and the HTTP API.
pub async fn handle_request(request: ConciergeRequest, concierge: &Concierge) -> ConciergeResponse {
    match request {
        ConciergeRequest::Ping => ConciergeResponse::pong(),
        ConciergeRequest::Health => {
            let report = concierge.health().await;
            match serde_json::to_value(&report) {
                Ok(data) => ConciergeResponse::ok(data),
                Err(e) => ConciergeResponse::err(e.to_string()),
            }
        }
        ConciergeRequest::Chat {
            message,
            session_id,
        } => {
            if let Err(e) = validate_message(&message, concierge.settings().max_message_chars) {
                return ConciergeResponse::err(e);
            }
            let reply = concierge.handle_message(session_id, &message).await;
            match serde_json::to_value(&reply) {
                Ok(data) => ConciergeResponse::ok(data),
                Err(e) => ConciergeResponse::err(e.to_string()),
            }
        }
        ConciergeRequest::Contacts => {
            let entries = concierge.contact_info().await;
            let contact_info: serde_json::Map<String, serde_json::Value> = entries
                .into_iter()
                .map(|e| (e.label, serde_json::Value::String(e.value)))
                .collect();
            ConciergeResponse::ok(serde_json::json!({ "contact_info": contact_info }))
        }
        ConciergeRequest::Services => {
            let settings = concierge.settings();
            ConciergeResponse::ok(serde_json::json!({
                "services": concierge.services(),
                "count": concierge.services().len(),
                "website": settings.support.website,
                "phone": settings.support.phone,
                "email": settings.support.email,
            }))
        }
        ConciergeRequest::Stats => match concierge.stats().await {
            Ok(stats) => ConciergeResponse::ok(serde_json::json!(stats)),
            Err(e) => ConciergeResponse::err(e.to_string()),
        },
        ConciergeRequest::PurgeSessions => match concierge.purge_expired_sessions().await {
            Ok(purged) => ConciergeResponse::ok(serde_json::json!({ "purged": purged })),
            Err(e) => ConciergeResponse::err(e.to_string()),
        },
        ConciergeRequest::Reindex { chunks } => match concierge.reindex(chunks).await {
            Ok(report) => ConciergeResponse::ok(serde_json::json!(report)),
            Err(e) => ConciergeResponse::err(e.to_string()),
        },
    }
}
