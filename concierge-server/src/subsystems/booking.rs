//! Booking collection flow
//!
//! The conversation walks `idle → await_name → await_email → await_phone →
//! await_address → await_service → await_confirmation` and then either
//! persists (affirmative reply) or discards (negative reply).
//!
//! `transition` is pure: it never touches the record store. Persisting is an
//! `Effect` the orchestrator carries out, and the stage only returns to `Idle`
//! once that write succeeds.

use concierge_core::config::BookingConfig;
use concierge_core::models::{BookingDetails, BookingDraft, BookingRecord, Field, Stage};

/// Validation limits applied to collected fields.
#[derive(Debug, Clone, Copy)]
pub struct BookingRules {
    pub min_phone_digits: usize,
    pub max_field_chars: usize,
}

impl Default for BookingRules {
    fn default() -> Self {
        Self::from(&BookingConfig::default())
    }
}

impl From<&BookingConfig> for BookingRules {
    fn from(config: &BookingConfig) -> Self {
        Self {
            min_phone_digits: config.min_phone_digits,
            max_field_chars: config.max_field_chars,
        }
    }
}

/// Parsed reply to the confirmation summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Affirmative,
    Negative,
    Unclear,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookingEvent {
    Start,
    Answer(String),
    Confirm(Confirmation),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    Empty,
    TooLong { max: usize },
    InvalidEmail,
    InvalidPhone { min_digits: usize },
}

/// What the orchestrator must do after a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Prompt(Field),
    Reprompt(Field, ValidationError),
    Summarize(BookingDetails),
    Persist(BookingDetails),
    Discard,
    ClarifyConfirmation,
    Ignored,
}

const AFFIRMATIVE: &[&str] = &[
    "yes", "y", "confirm", "confirmed", "ok", "okay", "sure", "yep", "correct",
];
const NEGATIVE: &[&str] = &["no", "n", "nope", "edit", "change", "discard", "start over"];

/// Case-insensitive; surrounding whitespace and trailing punctuation are ignored.
pub fn parse_confirmation(message: &str) -> Confirmation {
    let normalized = message
        .trim()
        .trim_end_matches(|c: char| c.is_ascii_punctuation())
        .trim()
        .to_lowercase();

    if AFFIRMATIVE.contains(&normalized.as_str()) {
        Confirmation::Affirmative
    } else if NEGATIVE.contains(&normalized.as_str()) {
        Confirmation::Negative
    } else {
        Confirmation::Unclear
    }
}

fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let mut parts = email.split('@');
    let (Some(local), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };
    !local.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}

fn is_valid_phone(phone: &str, min_digits: usize) -> bool {
    let allowed = |c: char| c.is_ascii_digit() || matches!(c, '+' | '-' | '(' | ')' | '.' | ' ');
    phone.chars().all(allowed) && phone.chars().filter(char::is_ascii_digit).count() >= min_digits
}

/// Validate one answer. Returns the trimmed value to store.
pub fn validate(field: Field, raw: &str, rules: &BookingRules) -> Result<String, ValidationError> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(ValidationError::Empty);
    }
    if value.chars().count() > rules.max_field_chars {
        return Err(ValidationError::TooLong {
            max: rules.max_field_chars,
        });
    }
    match field {
        Field::Email if !is_valid_email(value) => Err(ValidationError::InvalidEmail),
        Field::Phone if !is_valid_phone(value, rules.min_phone_digits) => {
            Err(ValidationError::InvalidPhone {
                min_digits: rules.min_phone_digits,
            })
        }
        _ => Ok(value.to_string()),
    }
}

fn set_field(draft: &mut BookingDraft, field: Field, value: String) {
    let slot = match field {
        Field::Name => &mut draft.name,
        Field::Email => &mut draft.email,
        Field::Phone => &mut draft.phone,
        Field::Address => &mut draft.address,
        Field::Service => &mut draft.service,
    };
    *slot = Some(value);
}

fn first_missing(draft: &BookingDraft) -> Field {
    if draft.name.is_none() {
        Field::Name
    } else if draft.email.is_none() {
        Field::Email
    } else if draft.phone.is_none() {
        Field::Phone
    } else if draft.address.is_none() {
        Field::Address
    } else {
        Field::Service
    }
}

/// The booking state machine.
pub fn transition(stage: Stage, event: BookingEvent, rules: &BookingRules) -> (Stage, Effect) {
    match (stage, event) {
        (Stage::Idle | Stage::AwaitCancellationId, BookingEvent::Start) => (
            Stage::Collecting {
                field: Field::Name,
                draft: BookingDraft::default(),
            },
            Effect::Prompt(Field::Name),
        ),

        // Already collecting: repeat the pending question.
        (Stage::Collecting { field, draft }, BookingEvent::Start) => {
            (Stage::Collecting { field, draft }, Effect::Prompt(field))
        }

        (Stage::Collecting { field, mut draft }, BookingEvent::Answer(text)) => {
            match validate(field, &text, rules) {
                Err(err) => (Stage::Collecting { field, draft }, Effect::Reprompt(field, err)),
                Ok(value) => {
                    set_field(&mut draft, field, value);
                    match field.next() {
                        Some(next) => (
                            Stage::Collecting { field: next, draft },
                            Effect::Prompt(next),
                        ),
                        None => match draft.complete() {
                            Some(details) => (
                                Stage::AwaitConfirmation {
                                    details: details.clone(),
                                },
                                Effect::Summarize(details),
                            ),
                            None => {
                                let missing = first_missing(&draft);
                                (
                                    Stage::Collecting {
                                        field: missing,
                                        draft,
                                    },
                                    Effect::Prompt(missing),
                                )
                            }
                        },
                    }
                }
            }
        }

        (Stage::AwaitConfirmation { details }, BookingEvent::Answer(text)) => transition(
            Stage::AwaitConfirmation { details },
            BookingEvent::Confirm(parse_confirmation(&text)),
            rules,
        ),

        (Stage::AwaitConfirmation { details }, BookingEvent::Confirm(reply)) => match reply {
            Confirmation::Affirmative => (
                Stage::AwaitConfirmation {
                    details: details.clone(),
                },
                Effect::Persist(details),
            ),
            Confirmation::Negative => (Stage::Idle, Effect::Discard),
            Confirmation::Unclear => (
                Stage::AwaitConfirmation { details },
                Effect::ClarifyConfirmation,
            ),
        },

        (stage, _) => (stage, Effect::Ignored),
    }
}

// ============================================================================
// Reply text
// ============================================================================

pub fn prompt(field: Field) -> &'static str {
    match field {
        Field::Name => "I'd be happy to help you book our services! Please provide your full name.",
        Field::Email => "Thank you! Please provide your email address.",
        Field::Phone => "Great! Now please provide your phone number.",
        Field::Address => "Perfect! Please provide your complete address.",
        Field::Service => {
            "Thank you! Now please describe the specific service you're interested in and any requirements."
        }
    }
}

pub fn reprompt(field: Field, error: &ValidationError) -> String {
    match error {
        ValidationError::Empty => format!("Please provide your {}.", field.label()),
        ValidationError::TooLong { max } => format!(
            "That {} is too long. Please keep it under {} characters.",
            field.label(),
            max
        ),
        ValidationError::InvalidEmail => {
            "Please provide a valid email address (for example, name@example.com).".to_string()
        }
        ValidationError::InvalidPhone { min_digits } => format!(
            "Please provide a valid phone number with at least {} digits.",
            min_digits
        ),
    }
}

pub fn summary(details: &BookingDetails) -> String {
    format!(
        "Please confirm your details:\n\n\
         **Name:** {}\n\
         **Email:** {}\n\
         **Phone:** {}\n\
         **Address:** {}\n\
         **Service Details:** {}\n\n\
         Type 'confirm' to submit your service request, or 'edit' to start over.",
        details.name, details.email, details.phone, details.address, details.service
    )
}

pub const CLARIFY_CONFIRMATION: &str =
    "Please type 'confirm' to submit your request or 'edit' to make changes.";

pub const DISCARDED: &str =
    "No problem! I've discarded those details. Say \"book a service\" whenever you'd like to start again.";

pub fn cancellation_policy(window_hours: u32, support_phone: &str) -> String {
    format!(
        "Cancellation Policy: You can cancel your service request within {} hours. After that, please contact us at {}.",
        window_hours, support_phone
    )
}

pub fn confirmed(record: &BookingRecord, window_hours: u32, support_phone: &str) -> String {
    format!(
        "Your service request has been submitted successfully!\n\n\
         **User ID:** {id}\n\
         **Name:** {name}\n\
         **Email:** {email}\n\
         **Phone:** {phone}\n\
         **Address:** {address}\n\
         **Service Details:** {service}\n\n\
         IMPORTANT: Please keep your User ID ({id}) safe. You'll need it if you want to cancel or inquire about your service.\n\n\
         {policy}",
        id = record.booking_id,
        name = record.name,
        email = record.email,
        phone = record.phone,
        address = record.address,
        service = record.service,
        policy = cancellation_policy(window_hours, support_phone),
    )
}

pub fn persist_failed(support_phone: &str) -> String {
    format!(
        "Sorry, I couldn't save your request just now. Your details are still here: reply \"yes\" to try again, or contact us at {}.",
        support_phone
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> BookingRules {
        BookingRules {
            min_phone_digits: 7,
            max_field_chars: 500,
        }
    }

    fn answer(stage: Stage, text: &str) -> (Stage, Effect) {
        transition(stage, BookingEvent::Answer(text.to_string()), &rules())
    }

    fn details() -> BookingDetails {
        BookingDetails {
            name: "Jane Doe".into(),
            email: "jane@example.com".into(),
            phone: "+94 77 123 4567".into(),
            address: "14 Main Street, Colombo".into(),
            service: "CRM setup for 20 users".into(),
        }
    }

    #[test]
    fn test_full_walk_reaches_confirmation() {
        let (mut stage, effect) = transition(Stage::Idle, BookingEvent::Start, &rules());
        assert_eq!(effect, Effect::Prompt(Field::Name));

        let d = details();
        for (text, expected) in [
            (&d.name, Effect::Prompt(Field::Email)),
            (&d.email, Effect::Prompt(Field::Phone)),
            (&d.phone, Effect::Prompt(Field::Address)),
            (&d.address, Effect::Prompt(Field::Service)),
        ] {
            let (next, effect) = answer(stage, text);
            assert_eq!(effect, expected);
            stage = next;
        }

        let (stage, effect) = answer(stage, &d.service);
        assert_eq!(effect, Effect::Summarize(d.clone()));
        assert_eq!(stage, Stage::AwaitConfirmation { details: d });
    }

    #[test]
    fn test_invalid_email_reprompts_without_touching_draft() {
        let draft = BookingDraft {
            name: Some("Jane".into()),
            ..BookingDraft::default()
        };
        let stage = Stage::Collecting {
            field: Field::Email,
            draft: draft.clone(),
        };
        let (next, effect) = answer(stage, "jane.example.com");
        assert_eq!(effect, Effect::Reprompt(Field::Email, ValidationError::InvalidEmail));
        assert_eq!(
            next,
            Stage::Collecting {
                field: Field::Email,
                draft
            }
        );
    }

    #[test]
    fn test_email_rules() {
        assert!(is_valid_email("a@b.co"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("@b.co"));
        assert!(!is_valid_email("a@@b.co"));
        assert!(!is_valid_email("a@.co"));
        assert!(!is_valid_email("a@b.co."));
        assert!(!is_valid_email("a b@c.co"));
    }

    #[test]
    fn test_phone_rules() {
        assert!(is_valid_phone("(+94) 117 433 3333", 7));
        assert!(is_valid_phone("077-123.4567", 7));
        assert!(!is_valid_phone("12345", 7));
        assert!(!is_valid_phone("call me 0771234567", 7));
    }

    #[test]
    fn test_values_are_trimmed_and_bounded() {
        assert_eq!(validate(Field::Name, "  Jane  ", &rules()).unwrap(), "Jane");
        assert_eq!(validate(Field::Address, "   ", &rules()), Err(ValidationError::Empty));
        let long = "x".repeat(501);
        assert_eq!(
            validate(Field::Service, &long, &rules()),
            Err(ValidationError::TooLong { max: 500 })
        );
    }

    #[test]
    fn test_confirmation_parsing() {
        assert_eq!(parse_confirmation("Yes!"), Confirmation::Affirmative);
        assert_eq!(parse_confirmation(" CONFIRM "), Confirmation::Affirmative);
        assert_eq!(parse_confirmation("okay."), Confirmation::Affirmative);
        assert_eq!(parse_confirmation("no"), Confirmation::Negative);
        assert_eq!(parse_confirmation("Start over"), Confirmation::Negative);
        assert_eq!(parse_confirmation("yes but change the phone"), Confirmation::Unclear);
    }

    #[test]
    fn test_affirmative_persists_but_keeps_stage() {
        let stage = Stage::AwaitConfirmation { details: details() };
        let (next, effect) = transition(
            stage.clone(),
            BookingEvent::Confirm(Confirmation::Affirmative),
            &rules(),
        );
        assert_eq!(effect, Effect::Persist(details()));
        assert_eq!(next, stage);
    }

    #[test]
    fn test_negative_discards() {
        let stage = Stage::AwaitConfirmation { details: details() };
        let (next, effect) = answer(stage, "edit");
        assert_eq!(effect, Effect::Discard);
        assert_eq!(next, Stage::Idle);
    }

    #[test]
    fn test_unclear_reply_asks_again() {
        let stage = Stage::AwaitConfirmation { details: details() };
        let (next, effect) = answer(stage.clone(), "maybe later");
        assert_eq!(effect, Effect::ClarifyConfirmation);
        assert_eq!(next, stage);
    }

    #[test]
    fn test_start_while_collecting_repeats_prompt() {
        let stage = Stage::Collecting {
            field: Field::Phone,
            draft: BookingDraft::default(),
        };
        let (next, effect) = transition(stage.clone(), BookingEvent::Start, &rules());
        assert_eq!(effect, Effect::Prompt(Field::Phone));
        assert_eq!(next, stage);
    }

    #[test]
    fn test_answer_while_idle_is_ignored() {
        let (next, effect) = answer(Stage::Idle, "hello");
        assert_eq!(effect, Effect::Ignored);
        assert_eq!(next, Stage::Idle);
    }

    #[test]
    fn test_confirmation_text_carries_id_and_policy() {
        let record = BookingRecord::new(
            concierge_core::models::BookingId::generate(),
            details(),
            chrono::Utc::now(),
        );
        let text = confirmed(&record, 24, "(+94) 117 433 3333");
        assert!(text.contains(record.booking_id.as_str()));
        assert!(text.contains("within 24 hours"));
        assert!(text.contains("(+94) 117 433 3333"));
    }
}
