//! Intent routing — decides which flow handles a message.
//!
//! Purely lexical; no model call and no confidence score. The current stage
//! participates in the decision so that, e.g., "yes" means something only
//! while a booking awaits confirmation.

use std::sync::LazyLock;

use concierge_core::models::{BookingId, Stage};
use regex::Regex;

use super::booking::{parse_confirmation, Confirmation};

/// Company facts answered from configuration without a model call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfoTopic {
    Identity,
    Founded,
    Address,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Greeting,
    BasicInfo(InfoTopic),
    GeneralQuestion,
    StartBooking,
    ContinueBooking,
    ConfirmBooking(Confirmation),
    CancelBooking { booking_id: Option<BookingId> },
    ContactRequest,
    ServiceListRequest,
    ServiceInquiry,
}

impl Intent {
    pub fn label(&self) -> &'static str {
        match self {
            Intent::Greeting => "greeting",
            Intent::BasicInfo(_) => "basic_info",
            Intent::GeneralQuestion => "general_question",
            Intent::StartBooking => "start_booking",
            Intent::ContinueBooking => "continue_booking",
            Intent::ConfirmBooking(_) => "confirm_booking",
            Intent::CancelBooking { .. } => "cancel_booking",
            Intent::ContactRequest => "contact_request",
            Intent::ServiceListRequest => "service_list_request",
            Intent::ServiceInquiry => "service_inquiry",
        }
    }
}

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|p| match Regex::new(p) {
            Ok(re) => Some(re),
            Err(e) => {
                tracing::error!(pattern = %p, error = %e, "Invalid intent pattern");
                None
            }
        })
        .collect()
}

static CANCEL: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[r"\bcancel\w*\b", r"\bcall\s+(it\s+)?off\b"])
});

// Only consulted outside an active booking, where "remove" or "delete" may be a field value.
static CANCEL_BROAD: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"\b(delete|remove|withdraw|revoke|stop)\b.*\b(booking|order|request|reservation|appointment|service)s?\b",
    ])
});

static SERVICE_LIST: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"\b(list|catalog(ue)?) of (your |all )?services\b",
        r"\bservices? list\b",
        r"\b(all|your) services\b",
        r"\bshow (me )?(the |your )?services\b",
    ])
});

// Descriptive questions about what the company does; answered from website content.
static SERVICE_INQUIRY: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"\b(what|which) (kind of |kinds of |type of |types of )?(services|solutions|products)\b",
        r"\bservices (do )?you (offer|provide|have)\b",
        r"\bwhat (do|can) you (offer|do|build|provide)\b",
        r"\b(available|offered) services\b",
        r"\bservices offered\b",
    ])
});

static GREETING: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[r"\b(hello|hi|hey|hiya|greetings|good (morning|afternoon|evening))\b"])
});

const GREETING_MAX_WORDS: usize = 3;

static IDENTITY: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"\bwho are you\b",
        r"\bwhat('s| is) your name\b",
        r"\bbot name\b",
        r"\bare you (a |an )?(bot|robot|human|ai)\b",
    ])
});

static FOUNDED: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"\bfounded\b",
        r"\bestablished\b",
        r"\bwhen did (you|the company|\w+) (start|begin)\b",
        r"\bhow long have you been (around|in business|operating)\b",
    ])
});

static ADDRESS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"\b(office|company|physical|postal|head ?office) address\b",
        r"\bwhere (is|are) (your|the) (office|offices|headquarters|hq)\b",
        r"\bwhere are you (located|based)\b",
        r"\bwhere is (the company|\w+ technologies) located\b",
    ])
});

static BOOKING: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"\bbook(ing)?\b",
        r"\breserve\b",
        r"\bhire\b",
        r"\bplace an order\b",
        r"\border (a|the|your) \w+",
        r"\brequest (a )?service\b",
        r"\b(need|want|get) (a |your |the )?service\b",
        r"\bsign (me )?up\b",
    ])
});

static CONTACT: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"\b(phone|telephone|hotline|mobile)\b",
        r"\be-?mail\b",
        r"\bcontact\b",
        r"\baddress\b",
        r"\blocation\b",
        r"\bwhere are you\b",
        r"\breach you\b",
        r"\bget in touch\b",
        r"\bcall you\b",
        r"\b(facebook|linkedin|twitter|instagram|social media)\b",
    ])
});

static BOOKING_ID: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\b[A-Za-z]{3}[0-9]{5}\b").ok());

// A single token that resembles an identifier attempt, e.g. "ABC1234" or "abc-12345".
static ID_ATTEMPT: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9-]{4,12}$").ok());

fn matches_any(patterns: &[Regex], text: &str) -> bool {
    patterns.iter().any(|re| re.is_match(text))
}

/// First `AAA00000`-shaped token on word boundaries, uppercased.
pub fn extract_booking_id(message: &str) -> Option<BookingId> {
    let re = BOOKING_ID.as_ref()?;
    re.find(message).and_then(|m| BookingId::parse(m.as_str()))
}

fn basic_info_topic(text: &str) -> Option<InfoTopic> {
    if matches_any(&IDENTITY, text) {
        Some(InfoTopic::Identity)
    } else if matches_any(&FOUNDED, text) {
        Some(InfoTopic::Founded)
    } else if matches_any(&ADDRESS, text) {
        Some(InfoTopic::Address)
    } else {
        None
    }
}

fn is_greeting(text: &str) -> bool {
    text.split_whitespace().count() <= GREETING_MAX_WORDS && matches_any(&GREETING, text)
}

fn looks_like_id_attempt(message: &str) -> bool {
    let token = message.trim();
    ID_ATTEMPT
        .as_ref()
        .is_some_and(|re| re.is_match(token) && token.chars().any(|c| c.is_ascii_digit()))
}

/// Classify a message given the session's current stage. First match wins.
pub fn classify(message: &str, stage: &Stage) -> Intent {
    let text = message.trim().to_lowercase();

    let cancel_requested = matches_any(&CANCEL, &text)
        || (!stage.is_booking() && matches_any(&CANCEL_BROAD, &text));
    if cancel_requested {
        return Intent::CancelBooking {
            booking_id: extract_booking_id(message),
        };
    }

    match stage {
        Stage::AwaitCancellationId => {
            if let Some(id) = extract_booking_id(message) {
                return Intent::CancelBooking {
                    booking_id: Some(id),
                };
            }
            if looks_like_id_attempt(message) {
                return Intent::CancelBooking { booking_id: None };
            }
        }
        Stage::AwaitConfirmation { .. } => {
            return Intent::ConfirmBooking(parse_confirmation(message));
        }
        Stage::Collecting { .. } => return Intent::ContinueBooking,
        Stage::Idle => {}
    }

    if let Some(topic) = basic_info_topic(&text) {
        Intent::BasicInfo(topic)
    } else if is_greeting(&text) {
        Intent::Greeting
    } else if matches_any(&SERVICE_LIST, &text) {
        Intent::ServiceListRequest
    } else if matches_any(&BOOKING, &text) {
        Intent::StartBooking
    } else if matches_any(&CONTACT, &text) {
        Intent::ContactRequest
    } else if matches_any(&SERVICE_INQUIRY, &text) {
        Intent::ServiceInquiry
    } else {
        Intent::GeneralQuestion
    }
}
