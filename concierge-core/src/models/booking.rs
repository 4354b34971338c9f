use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// Identifier space: three letters followed by five digits ("KQZ04817").
const LETTER_SPACE: u64 = 26 * 26 * 26;
const DIGIT_SPACE: u64 = 100_000;
const ID_SPACE: u64 = LETTER_SPACE * DIGIT_SPACE; // 2^8 * 5^5 * 13^3

// Prime and smaller than ID_SPACE, hence coprime with it: n -> n * STRIDE is a bijection.
const STRIDE: u64 = 982_451_653;

static SEQUENCE: LazyLock<AtomicU64> = LazyLock::new(|| AtomicU64::new(random_seed() % ID_SPACE));
static OFFSET: LazyLock<u64> = LazyLock::new(|| random_seed() % ID_SPACE);

fn random_seed() -> u64 {
    (uuid::Uuid::new_v4().as_u128() >> 64) as u64
}

/// Customer-facing booking identifier, always 8 characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BookingId(String);

impl BookingId {
    pub const LEN: usize = 8;

    /// Issue a new identifier.
    ///
    /// Walks a randomly seeded process-wide counter through a permutation of
    /// the identifier space, so concurrent callers within one process never
    /// receive the same value.
    pub fn generate() -> Self {
        let n = SEQUENCE.fetch_add(1, Ordering::Relaxed) % ID_SPACE;
        let index = ((n as u128 * STRIDE as u128 + *OFFSET as u128) % ID_SPACE as u128) as u64;
        Self::from_index(index)
    }

    fn from_index(index: u64) -> Self {
        let letters = index / DIGIT_SPACE;
        let digits = index % DIGIT_SPACE;
        let letter = |n: u64| (b'A' + n as u8) as char;
        Self(format!(
            "{}{}{}{:05}",
            letter(letters / 676),
            letter((letters / 26) % 26),
            letter(letters % 26),
            digits
        ))
    }

    /// Accepts any casing and surrounding whitespace; returns the canonical uppercase form.
    pub fn parse(raw: &str) -> Option<Self> {
        let candidate = raw.trim().to_ascii_uppercase();
        let bytes = candidate.as_bytes();
        if bytes.len() != Self::LEN {
            return None;
        }
        let (letters, digits) = bytes.split_at(3);
        if letters.iter().all(u8::is_ascii_uppercase) && digits.iter().all(u8::is_ascii_digit) {
            Some(Self(candidate))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BookingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for BookingId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("invalid booking id: {value}"))
    }
}

impl From<BookingId> for String {
    fn from(id: BookingId) -> Self {
        id.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Active,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Active => "active",
            BookingStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(BookingStatus::Active),
            "cancelled" | "canceled" => Ok(BookingStatus::Cancelled),
            other => Err(format!("unknown booking status: {other}")),
        }
    }
}

/// Booking fields collected so far; any of them may still be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingDraft {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub service: Option<String>,
}

impl BookingDraft {
    /// Promote to `BookingDetails` once every field is present.
    pub fn complete(&self) -> Option<BookingDetails> {
        Some(BookingDetails {
            name: self.name.clone()?,
            email: self.email.clone()?,
            phone: self.phone.clone()?,
            address: self.address.clone()?,
            service: self.service.clone()?,
        })
    }
}

/// A fully collected booking awaiting confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingDetails {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub service: String,
}

/// A persisted booking as stored in the record store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingRecord {
    pub booking_id: BookingId,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub service: String,
    pub created_at: DateTime<Utc>,
    pub status: BookingStatus,
}

impl BookingRecord {
    pub fn new(booking_id: BookingId, details: BookingDetails, created_at: DateTime<Utc>) -> Self {
        Self {
            booking_id,
            name: details.name.trim().to_string(),
            email: details.email.trim().to_lowercase(),
            phone: details.phone.trim().to_string(),
            address: details.address.trim().to_string(),
            service: details.service.trim().to_string(),
            created_at,
            status: BookingStatus::Active,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generated_id_shape() {
        for _ in 0..1000 {
            let id = BookingId::generate();
            assert_eq!(id.as_str().len(), BookingId::LEN);
            assert!(BookingId::parse(id.as_str()).is_some(), "{id} should parse back");
        }
    }

    #[test]
    fn test_permutation_is_injective_on_a_window() {
        let ids: HashSet<BookingId> = (0..50_000u64)
            .map(|n| BookingId::from_index((n * STRIDE) % ID_SPACE))
            .collect();
        assert_eq!(ids.len(), 50_000);
    }

    #[test]
    fn test_from_index_bounds() {
        assert_eq!(BookingId::from_index(0).as_str(), "AAA00000");
        assert_eq!(BookingId::from_index(ID_SPACE - 1).as_str(), "ZZZ99999");
    }

    #[test]
    fn test_parse_normalizes_case_and_rejects_bad_shapes() {
        assert_eq!(BookingId::parse(" abc12345 ").unwrap().as_str(), "ABC12345");
        assert!(BookingId::parse("ABC1234").is_none());
        assert!(BookingId::parse("AB123456").is_none());
        assert!(BookingId::parse("SERVICES").is_none());
        assert!(BookingId::parse("ABC1234X").is_none());
    }

    #[test]
    fn test_booking_id_serde_validates() {
        let ok: BookingId = serde_json::from_str("\"xyz98765\"").unwrap();
        assert_eq!(ok.as_str(), "XYZ98765");
        assert!(serde_json::from_str::<BookingId>("\"nope\"").is_err());
    }

    #[test]
    fn test_status_from_str() {
        assert_eq!("Active".parse::<BookingStatus>().unwrap(), BookingStatus::Active);
        assert_eq!("canceled".parse::<BookingStatus>().unwrap(), BookingStatus::Cancelled);
        assert!("pending".parse::<BookingStatus>().is_err());
    }

    #[test]
    fn test_draft_completes_only_when_full() {
        let mut draft = BookingDraft {
            name: Some("Jane Doe".into()),
            email: Some("jane@x.com".into()),
            phone: Some("0771234567".into()),
            address: Some("1 Main St".into()),
            service: None,
        };
        assert!(draft.complete().is_none());
        draft.service = Some("CRM setup".into());
        assert_eq!(draft.complete().unwrap().service, "CRM setup");
    }

    #[test]
    fn test_record_normalizes_email() {
        let details = BookingDetails {
            name: " Jane Doe ".into(),
            email: "Jane@X.com".into(),
            phone: "0771234567".into(),
            address: "1 Main St".into(),
            service: "CRM setup".into(),
        };
        let record = BookingRecord::new(BookingId::generate(), details, Utc::now());
        assert_eq!(record.email, "jane@x.com");
        assert_eq!(record.name, "Jane Doe");
        assert_eq!(record.status, BookingStatus::Active);
    }
}
