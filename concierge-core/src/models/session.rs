use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::booking::{BookingDetails, BookingDraft};

/// Booking field currently being collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Name,
    Email,
    Phone,
    Address,
    Service,
}

impl Field {
    /// The field collected after this one, `None` after the last.
    pub fn next(self) -> Option<Field> {
        match self {
            Field::Name => Some(Field::Email),
            Field::Email => Some(Field::Phone),
            Field::Phone => Some(Field::Address),
            Field::Address => Some(Field::Service),
            Field::Service => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Field::Name => "name",
            Field::Email => "email",
            Field::Phone => "phone",
            Field::Address => "address",
            Field::Service => "service",
        }
    }
}

/// Conversation stage. Data needed by a stage lives inside its variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum Stage {
    #[default]
    Idle,
    Collecting {
        field: Field,
        draft: BookingDraft,
    },
    AwaitConfirmation {
        details: BookingDetails,
    },
    AwaitCancellationId,
}

impl Stage {
    pub fn label(&self) -> &'static str {
        match self {
            Stage::Idle => "idle",
            Stage::Collecting { field, .. } => match field {
                Field::Name => "await_name",
                Field::Email => "await_email",
                Field::Phone => "await_phone",
                Field::Address => "await_address",
                Field::Service => "await_service",
            },
            Stage::AwaitConfirmation { .. } => "await_confirmation",
            Stage::AwaitCancellationId => "await_cancellation_id",
        }
    }

    /// True while a booking is being collected or awaits confirmation.
    pub fn is_booking(&self) -> bool {
        matches!(self, Stage::Collecting { .. } | Stage::AwaitConfirmation { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub stage: Stage,
    pub history: Vec<Turn>,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
}

impl Session {
    pub fn new(id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            stage: Stage::Idle,
            history: Vec::new(),
            created_at: now,
            last_active_at: now,
        }
    }

    /// Append a turn, keeping only the most recent `max_turns` entries.
    pub fn push_turn(&mut self, role: Role, content: impl Into<String>, max_turns: usize) {
        self.history.push(Turn {
            role,
            content: content.into(),
        });
        if self.history.len() > max_turns {
            let excess = self.history.len() - max_turns;
            self.history.drain(..excess);
        }
    }

    pub fn is_expired(&self, cutoff: DateTime<Utc>) -> bool {
        self.last_active_at < cutoff
    }
}
