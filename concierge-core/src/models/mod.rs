pub mod booking;
pub mod chunk;
pub mod contact;
pub mod session;

pub use booking::{BookingDetails, BookingDraft, BookingId, BookingRecord, BookingStatus};
pub use chunk::{ContentChunk, ScoredChunk};
pub use contact::ContactEntry;
pub use session::{Field, Role, Session, Stage, Turn};
