//! Cancellation flow
//!
//! A booking may be cancelled while `now - created_at < window`. Exactly at
//! the window boundary it is refused. A `created_at` in the future counts as
//! zero elapsed time.

use chrono::{DateTime, Duration, Utc};
use concierge_core::config::SupportConfig;
use concierge_core::models::{BookingId, BookingStatus};
use concierge_core::BookingStore;

use super::bounded;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancellationDecision {
    Allowed,
    WindowExpired,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancellationOutcome {
    Cancelled(BookingId),
    NotFound(BookingId),
    AlreadyCancelled(BookingId),
    WindowExpired(BookingId),
    StoreUnavailable(BookingId),
}

pub fn decide(created_at: DateTime<Utc>, now: DateTime<Utc>, window: Duration) -> CancellationDecision {
    let elapsed = (now - created_at).max(Duration::zero());
    if elapsed < window {
        CancellationDecision::Allowed
    } else {
        CancellationDecision::WindowExpired
    }
}

/// Look up `id` and delete it when the window allows. Never panics on store errors.
pub async fn process(
    store: &dyn BookingStore,
    id: &BookingId,
    now: DateTime<Utc>,
    window: Duration,
    timeout_seconds: u64,
) -> CancellationOutcome {
    let record = match bounded(timeout_seconds, store.find(id)).await {
        Ok(Some(record)) => record,
        Ok(None) => {
            tracing::info!(booking_id = %id, "Cancellation: booking not found");
            return CancellationOutcome::NotFound(id.clone());
        }
        Err(e) => {
            tracing::error!(booking_id = %id, error = %e, "Cancellation lookup failed");
            return CancellationOutcome::StoreUnavailable(id.clone());
        }
    };

    if record.status == BookingStatus::Cancelled {
        return CancellationOutcome::AlreadyCancelled(id.clone());
    }

    if decide(record.created_at, now, window) == CancellationDecision::WindowExpired {
        tracing::info!(booking_id = %id, created_at = %record.created_at, "Cancellation refused: window expired");
        return CancellationOutcome::WindowExpired(id.clone());
    }

    match bounded(timeout_seconds, store.delete(id)).await {
        Ok(true) => {
            tracing::info!(booking_id = %id, "Booking cancelled");
            CancellationOutcome::Cancelled(id.clone())
        }
        // Removed between lookup and delete.
        Ok(false) => CancellationOutcome::NotFound(id.clone()),
        Err(e) => {
            tracing::error!(booking_id = %id, error = %e, "Cancellation delete failed");
            CancellationOutcome::StoreUnavailable(id.clone())
        }
    }
}

pub fn reply(outcome: &CancellationOutcome, support: &SupportConfig, window_hours: u32) -> String {
    match outcome {
        CancellationOutcome::Cancelled(id) => format!(
            "**Service Cancellation Confirmed**\n\n\
             Your service request with User ID **{}** has been successfully cancelled.\n\n\
             If you change your mind, feel free to book our services again anytime.",
            id
        ),
        CancellationOutcome::NotFound(id) => format!(
            "**User ID Not Found**\n\n\
             I couldn't find a service request with User ID **{}**. Please check that it matches \
             your booking confirmation.\n\n\
             Need help? Phone: {} | Email: {}",
            id, support.phone, support.email
        ),
        CancellationOutcome::AlreadyCancelled(id) => format!(
            "The service request with User ID **{}** has already been cancelled. No further action is needed.",
            id
        ),
        CancellationOutcome::WindowExpired(id) => format!(
            "**Cancellation Not Possible**\n\n\
             Your service request (User ID: **{}**) cannot be cancelled because it is past the \
             **{}-hour cancellation window**.\n\n\
             Please contact our support team directly:\n\
             Phone: {}\n\
             Email: {}",
            id, window_hours, support.phone, support.email
        ),
        CancellationOutcome::StoreUnavailable(_) => format!(
            "I apologize, I couldn't process the cancellation right now. Please contact our support team at **{}** for cancellation assistance.",
            support.phone
        ),
    }
}

pub fn ask_for_id(window_hours: u32) -> String {
    format!(
        "To cancel your service, I need your **User ID**.\n\n\
         Please provide your **8-character User ID** (e.g., ABC12345). You can find it in your \
         booking confirmation.\n\n\
         Services can be cancelled within {} hours of booking.",
        window_hours
    )
}

pub fn invalid_id(support_phone: &str) -> String {
    format!(
        "**Invalid User ID Format**\n\n\
         A User ID is 3 letters followed by 5 digits, for example ABC12345 or XYZ98765.\n\n\
         Or contact our support team at **{}** for assistance.",
        support_phone
    )
}

pub const DRAFT_DISCARDED: &str =
    "Okay, I've cancelled the booking you were filling in. Nothing was submitted. \
     Is there anything else I can help you with?";
