pub mod config;
pub mod contacts;
pub mod db;
pub mod embeddings;
pub mod error;
pub mod generation;
pub mod ipc;
pub mod models;
pub mod store;
pub mod vector;
pub mod websearch;

pub use config::ConciergeConfig;
pub use contacts::{ContactError, ContactSource, GoogleSheetContacts, StaticContacts};
pub use embeddings::{
    EmbeddingBackend, EmbeddingError, GeminiEmbeddingClient, GeminiEmbeddingConfig,
    GEMINI_DIMENSIONS,
};
pub use error::{ConciergeError, StoreError};
pub use generation::{
    GeminiGenerationClient, GeminiGenerationConfig, GenerationBackend, GenerationError,
    GenerationRequest,
};
pub use store::{BookingStore, MemoryBookingStore, PgBookingStore};
pub use vector::{MemoryVectorIndex, PgVectorIndex, VectorIndex};
pub use websearch::{SerpApiSearch, WebResult, WebSearch, WebSearchError};
