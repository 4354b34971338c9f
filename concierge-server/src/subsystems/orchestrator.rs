//! Orchestrator — one conversational turn, end to end.
//!
//! `Concierge::handle_message` takes the per-session lock, loads (or creates)
//! the session, classifies the message, runs the matching flow and writes the
//! session back. Every path produces reply text; failures of external services
//! degrade the reply instead of failing the turn.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use concierge_core::config::{RetrievalConfig, SupportConfig};
use concierge_core::ipc::ChunkInput;
use concierge_core::models::{
    BookingDetails, BookingId, BookingRecord, ContactEntry, Field, Role, Session, Stage, Turn,
};
use concierge_core::{
    BookingStore, ConciergeConfig, ContactSource, EmbeddingBackend, GenerationBackend, StoreError,
    VectorIndex, WebSearch,
};
use serde::Serialize;

use super::booking::{self, BookingEvent, BookingRules, Effect};
use super::cancellation;
use super::info;
use super::ingest::{self, ReindexReport};
use super::intent::{classify, Intent};
use super::retrieve::{self, Catalog, Sources};
use super::sessions::{purge_expired, SessionLocks, SessionStore};
use super::bounded;

/// External collaborators, injected so tests can substitute doubles.
#[derive(Clone)]
pub struct Backends {
    pub sessions: Arc<dyn SessionStore>,
    pub bookings: Arc<dyn BookingStore>,
    pub index: Arc<dyn VectorIndex>,
    pub embedder: Arc<dyn EmbeddingBackend>,
    pub generator: Arc<dyn GenerationBackend>,
    pub contacts: Arc<dyn ContactSource>,
    /// Consulted only when the index has no relevant content.
    pub web_search: Option<Arc<dyn WebSearch>>,
}

#[derive(Debug, Clone)]
pub struct ConciergeSettings {
    pub rules: BookingRules,
    pub cancellation_window_hours: u32,
    pub retrieval: RetrievalConfig,
    pub system_prompt: String,
    pub support: SupportConfig,
    pub services: Vec<String>,
    pub contacts_fallback: Vec<ContactEntry>,
    pub contacts_timeout_seconds: u64,
    pub store_timeout_seconds: u64,
    pub history_turns: usize,
    pub idle_timeout_minutes: u64,
    pub max_message_chars: usize,
}

impl From<&ConciergeConfig> for ConciergeSettings {
    fn from(config: &ConciergeConfig) -> Self {
        Self {
            rules: BookingRules::from(&config.booking),
            cancellation_window_hours: config.booking.cancellation_window_hours,
            retrieval: config.retrieval.clone(),
            system_prompt: config.generation.system_prompt.clone(),
            support: config.support.clone(),
            services: config.catalog.services.clone(),
            contacts_fallback: config.contacts.fallback.clone(),
            contacts_timeout_seconds: config.contacts.timeout_seconds,
            store_timeout_seconds: config.storage.timeout_seconds,
            history_turns: config.sessions.history_turns,
            idle_timeout_minutes: config.sessions.idle_timeout_minutes,
            max_message_chars: config.service.max_message_chars,
        }
    }
}

/// Reply to one chat turn.
#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    pub response: String,
    pub session_id: String,
    pub stage: String,
    pub audio_url: Option<String>,
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub ok: bool,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: String,
    pub services: BTreeMap<String, ComponentHealth>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Stats {
    pub active_sessions: usize,
    pub services_available: usize,
}

struct TurnOutcome {
    stage: Stage,
    response: String,
    sources: Vec<String>,
}

impl TurnOutcome {
    fn reply(stage: Stage, response: impl Into<String>) -> Self {
        Self {
            stage,
            response: response.into(),
            sources: Vec::new(),
        }
    }
}

pub struct Concierge {
    backends: Backends,
    settings: ConciergeSettings,
    locks: Arc<SessionLocks>,
}

impl Concierge {
    pub fn new(backends: Backends, settings: ConciergeSettings) -> Self {
        Self {
            backends,
            settings,
            locks: Arc::new(SessionLocks::new()),
        }
    }

    pub fn settings(&self) -> &ConciergeSettings {
        &self.settings
    }

    pub fn session_store(&self) -> Arc<dyn SessionStore> {
        self.backends.sessions.clone()
    }

    pub fn session_locks(&self) -> Arc<SessionLocks> {
        self.locks.clone()
    }

    fn window(&self) -> Duration {
        Duration::hours(self.settings.cancellation_window_hours as i64)
    }

    fn idle_timeout(&self) -> Duration {
        Duration::minutes(self.settings.idle_timeout_minutes as i64)
    }

    fn sources(&self) -> Sources<'_> {
        Sources {
            embedder: self.backends.embedder.as_ref(),
            index: self.backends.index.as_ref(),
            web: self.backends.web_search.as_deref(),
            store_timeout_seconds: self.settings.store_timeout_seconds,
        }
    }

    /// Process one user message. A missing or blank `session_id` starts a new session.
    pub async fn handle_message(&self, session_id: Option<String>, message: &str) -> ChatReply {
        let session_id = session_id
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let _guard = self.locks.acquire(&session_id).await;
        let now = Utc::now();

        let mut session = match self.backends.sessions.get(&session_id).await {
            Ok(Some(existing)) if !existing.is_expired(now - self.idle_timeout()) => existing,
            Ok(Some(_)) => {
                tracing::info!(session_id = %session_id, "Session expired; starting fresh");
                Session::new(session_id.clone(), now)
            }
            Ok(None) => Session::new(session_id.clone(), now),
            Err(e) => {
                tracing::warn!(session_id = %session_id, error = %e, "Session load failed; starting fresh");
                Session::new(session_id.clone(), now)
            }
        };

        let intent = classify(message, &session.stage);
        tracing::info!(
            session_id = %session_id,
            stage = session.stage.label(),
            intent = intent.label(),
            "Handling message"
        );

        let outcome = self
            .dispatch(intent, session.stage.clone(), message, &session.history)
            .await;

        if outcome.stage.label() != session.stage.label() {
            tracing::debug!(
                session_id = %session_id,
                from = session.stage.label(),
                to = outcome.stage.label(),
                "Stage transition"
            );
        }

        session.stage = outcome.stage;
        session.push_turn(Role::User, message, self.settings.history_turns);
        session.push_turn(Role::Assistant, outcome.response.clone(), self.settings.history_turns);
        session.last_active_at = now;

        let stage_label = session.stage.label().to_string();
        if let Err(e) = self.backends.sessions.put(session).await {
            tracing::warn!(session_id = %session_id, error = %e, "Session save failed");
        }

        ChatReply {
            response: outcome.response,
            session_id,
            stage: stage_label,
            audio_url: None,
            sources: outcome.sources,
        }
    }

    async fn dispatch(
        &self,
        intent: Intent,
        stage: Stage,
        message: &str,
        history: &[Turn],
    ) -> TurnOutcome {
        match intent {
            Intent::CancelBooking {
                booking_id: Some(id),
            } => {
                if stage.is_booking() {
                    tracing::info!(booking_id = %id, "Discarding in-progress draft for cancellation");
                }
                let outcome = cancellation::process(
                    self.backends.bookings.as_ref(),
                    &id,
                    Utc::now(),
                    self.window(),
                    self.settings.store_timeout_seconds,
                )
                .await;
                TurnOutcome::reply(
                    Stage::Idle,
                    cancellation::reply(
                        &outcome,
                        &self.settings.support,
                        self.settings.cancellation_window_hours,
                    ),
                )
            }
            Intent::CancelBooking { booking_id: None } => match stage {
                s if s.is_booking() => TurnOutcome::reply(Stage::Idle, cancellation::DRAFT_DISCARDED),
                Stage::AwaitCancellationId => TurnOutcome::reply(
                    Stage::AwaitCancellationId,
                    cancellation::invalid_id(&self.settings.support.phone),
                ),
                _ => TurnOutcome::reply(
                    Stage::AwaitCancellationId,
                    cancellation::ask_for_id(self.settings.cancellation_window_hours),
                ),
            },
            Intent::ConfirmBooking(reply) => {
                self.advance_booking(stage, BookingEvent::Confirm(reply)).await
            }
            Intent::ContinueBooking => {
                self.advance_booking(stage, BookingEvent::Answer(message.to_string()))
                    .await
            }
            Intent::StartBooking => self.advance_booking(stage, BookingEvent::Start).await,
            Intent::Greeting => TurnOutcome::reply(
                Stage::Idle,
                info::greeting(&self.settings.support, self.settings.services.len()),
            ),
            Intent::BasicInfo(topic) => match info::basic_info(topic, &self.settings.support) {
                Some(text) => TurnOutcome::reply(Stage::Idle, text),
                None => self.general_answer(message, history).await,
            },
            Intent::ServiceInquiry => self.service_answer(message, history).await,
            Intent::ServiceListRequest => TurnOutcome::reply(
                Stage::Idle,
                info::format_services(&self.settings.services, &self.settings.support.company_name),
            ),
            Intent::ContactRequest => {
                let entries = info::select_for_message(message, self.contact_info().await);
                TurnOutcome::reply(
                    Stage::Idle,
                    info::format_contacts(&entries, &self.settings.support.phone),
                )
            }
            Intent::GeneralQuestion => self.general_answer(message, history).await,
        }
    }

    async fn general_answer(&self, message: &str, history: &[Turn]) -> TurnOutcome {
        let question =
            retrieve::resolve_company_references(message, &self.settings.support.company_name);
        let answer = retrieve::answer(
            &question,
            history,
            &self.sources(),
            self.backends.generator.as_ref(),
            &self.settings.retrieval,
            &self.settings.system_prompt,
            &self.settings.support.phone,
        )
        .await;
        TurnOutcome {
            stage: Stage::Idle,
            response: answer.text,
            sources: answer.sources,
        }
    }

    /// Grounded service answer, or the full catalogue when nothing relevant is indexed.
    async fn service_answer(&self, message: &str, history: &[Turn]) -> TurnOutcome {
        let support = &self.settings.support;
        let question = retrieve::resolve_company_references(message, &support.company_name);
        let catalog = Catalog {
            company_name: &support.company_name,
            services: &self.settings.services,
            website: &support.website,
        };
        let answer = retrieve::answer_service_inquiry(
            &question,
            history,
            &self.sources(),
            self.backends.generator.as_ref(),
            &self.settings.retrieval,
            &self.settings.system_prompt,
            &catalog,
        )
        .await;

        match answer {
            Some(answer) => TurnOutcome {
                stage: Stage::Idle,
                response: answer.text,
                sources: answer.sources,
            },
            None => {
                tracing::info!("No service content retrieved; listing the catalogue");
                TurnOutcome::reply(
                    Stage::Idle,
                    info::format_services(&self.settings.services, &support.company_name),
                )
            }
        }
    }

    async fn advance_booking(&self, stage: Stage, event: BookingEvent) -> TurnOutcome {
        let (next, effect) = booking::transition(stage, event, &self.settings.rules);
        match effect {
            Effect::Prompt(field) => TurnOutcome::reply(next, booking::prompt(field)),
            Effect::Reprompt(field, err) => {
                tracing::debug!(field = field.label(), error = ?err, "Booking answer rejected");
                TurnOutcome::reply(next, booking::reprompt(field, &err))
            }
            Effect::Summarize(details) => TurnOutcome::reply(next, booking::summary(&details)),
            Effect::Persist(details) => self.persist(next, details).await,
            Effect::Discard => TurnOutcome::reply(next, booking::DISCARDED),
            Effect::ClarifyConfirmation => {
                TurnOutcome::reply(next, booking::CLARIFY_CONFIRMATION)
            }
            Effect::Ignored => {
                let text = match &next {
                    Stage::Collecting { field, .. } => booking::prompt(*field).to_string(),
                    Stage::AwaitConfirmation { details } => booking::summary(details),
                    _ => booking::prompt(Field::Name).to_string(),
                };
                TurnOutcome::reply(next, text)
            }
        }
    }

    /// Write the confirmed booking. On failure the stage is left as-is so "yes" can be retried.
    async fn persist(&self, stage: Stage, details: BookingDetails) -> TurnOutcome {
        let record = BookingRecord::new(BookingId::generate(), details, Utc::now());
        let result = bounded(
            self.settings.store_timeout_seconds,
            self.backends.bookings.insert(&record),
        )
        .await;

        match result {
            Ok(()) => {
                tracing::info!(booking_id = %record.booking_id, "Booking confirmed");
                TurnOutcome::reply(
                    Stage::Idle,
                    booking::confirmed(
                        &record,
                        self.settings.cancellation_window_hours,
                        &self.settings.support.phone,
                    ),
                )
            }
            Err(e) => {
                tracing::error!(booking_id = %record.booking_id, error = %e, "Booking persistence failed");
                TurnOutcome::reply(stage, booking::persist_failed(&self.settings.support.phone))
            }
        }
    }

    /// Contact entries from the live source, falling back to configuration.
    pub async fn contact_info(&self) -> Vec<ContactEntry> {
        let (entries, _) = info::contact_entries(
            self.backends.contacts.as_ref(),
            &self.settings.contacts_fallback,
            self.settings.contacts_timeout_seconds,
        )
        .await;
        entries
    }

    pub fn services(&self) -> &[String] {
        &self.settings.services
    }

    pub async fn purge_expired_sessions(&self) -> Result<usize, StoreError> {
        purge_expired(
            self.backends.sessions.as_ref(),
            &self.locks,
            Utc::now(),
            self.idle_timeout(),
        )
        .await
    }

    pub async fn stats(&self) -> Result<Stats, StoreError> {
        Ok(Stats {
            active_sessions: self.backends.sessions.count().await?,
            services_available: self.settings.services.len(),
        })
    }

    pub async fn reindex(&self, chunks: Vec<ChunkInput>) -> anyhow::Result<ReindexReport> {
        ingest::reindex(
            chunks,
            self.backends.embedder.as_ref(),
            self.backends.index.as_ref(),
            self.settings.store_timeout_seconds,
        )
        .await
    }

    /// Check every collaborator. Any failure marks the report `degraded`.
    pub async fn health(&self) -> HealthReport {
        let timeout = self.settings.store_timeout_seconds;
        let b = &self.backends;

        let (generation, embedding, vector_index, record_store, contacts) = tokio::join!(
            check(timeout, b.generator.health()),
            check(timeout, b.embedder.health()),
            check(timeout, b.index.health()),
            check(timeout, b.bookings.health()),
            check(timeout, async {
                b.contacts
                    .fetch()
                    .await
                    .map(|entries| format!("{} ({} entries)", b.contacts.name(), entries.len()))
            }),
        );

        let services = BTreeMap::from([
            ("generation".to_string(), generation),
            ("embedding".to_string(), embedding),
            ("vector_index".to_string(), vector_index),
            ("record_store".to_string(), record_store),
            ("contacts".to_string(), contacts),
        ]);
        let status = if services.values().all(|c| c.ok) {
            "healthy"
        } else {
            "degraded"
        };

        HealthReport {
            status: status.to_string(),
            services,
        }
    }
}

async fn check<F, E>(timeout_seconds: u64, fut: F) -> ComponentHealth
where
    F: Future<Output = Result<String, E>>,
    E: Display,
{
    match tokio::time::timeout(StdDuration::from_secs(timeout_seconds), fut).await {
        Ok(Ok(detail)) => ComponentHealth { ok: true, detail },
        Ok(Err(e)) => ComponentHealth {
            ok: false,
            detail: e.to_string(),
        },
        Err(_) => ComponentHealth {
            ok: false,
            detail: format!("timed out after {}s", timeout_seconds),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subsystems::sessions::MemorySessionStore;
    use async_trait::async_trait;
    use concierge_core::{
        GenerationError, GenerationRequest, MemoryBookingStore, MemoryVectorIndex, StaticContacts,
        EmbeddingError,
    };

    struct EchoGenerator;

    #[async_trait]
    impl GenerationBackend for EchoGenerator {
        async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
            Ok(format!("answer to: {}", request.message))
        }
        fn name(&self) -> &str {
            "echo"
        }
    }

    struct NoEmbedder;

    #[async_trait]
    impl EmbeddingBackend for NoEmbedder {
        async fn embed(&self, _: &str) -> Result<Vec<f32>, EmbeddingError> {
            Err(EmbeddingError::MissingApiKey)
        }
        fn dimensions(&self) -> usize {
            2
        }
        fn name(&self) -> &str {
            "none"
        }
    }

    fn settings() -> ConciergeSettings {
        ConciergeSettings {
            rules: BookingRules::default(),
            cancellation_window_hours: 24,
            retrieval: RetrievalConfig::default(),
            system_prompt: "prompt".into(),
            support: SupportConfig {
                company_name: "Adeona Technologies".into(),
                phone: "(+94) 117 433 3333".into(),
                email: "info@adeonatech.net".into(),
                website: "https://adeonatech.net/".into(),
                assistant_name: "AdeonaBot".into(),
                founded: "2017".into(),
                location: "Colombo, Sri Lanka".into(),
                address: String::new(),
            },
            services: vec!["Lead Manager".into(), "Digital Bill".into()],
            contacts_fallback: vec![ContactEntry::new("Email", "info@adeonatech.net")],
            contacts_timeout_seconds: 5,
            store_timeout_seconds: 5,
            history_turns: 10,
            idle_timeout_minutes: 60,
            max_message_chars: 2000,
        }
    }

    fn concierge() -> (Concierge, Arc<MemoryBookingStore>, Arc<MemorySessionStore>) {
        let bookings = Arc::new(MemoryBookingStore::new());
        let sessions = Arc::new(MemorySessionStore::new());
        let backends = Backends {
            sessions: sessions.clone(),
            bookings: bookings.clone(),
            index: Arc::new(MemoryVectorIndex::new()),
            embedder: Arc::new(NoEmbedder),
            generator: Arc::new(EchoGenerator),
            contacts: Arc::new(StaticContacts::default()),
            web_search: None,
        };
        (Concierge::new(backends, settings()), bookings, sessions)
    }

    #[tokio::test]
    async fn test_new_session_gets_an_id() {
        let (bot, _, sessions) = concierge();
        let reply = bot.handle_message(None, "is the CRM cloud hosted?").await;
        assert!(!reply.session_id.is_empty());
        assert_eq!(reply.stage, "idle");
        assert_eq!(reply.response, "answer to: is the CRM cloud hosted?");
        assert!(reply.audio_url.is_none());

        let stored = sessions.get(&reply.session_id).await.unwrap().unwrap();
        assert_eq!(stored.history.len(), 2);
    }

    #[tokio::test]
    async fn test_booking_then_cancel_with_id() {
        let (bot, bookings, _) = concierge();
        let sid = Some("s1".to_string());
        for msg in [
            "I want to book a service",
            "Jane Doe",
            "jane@example.com",
            "0771234567",
            "14 Main Street",
            "A CRM for my shop",
        ] {
            bot.handle_message(sid.clone(), msg).await;
        }
        let reply = bot.handle_message(sid.clone(), "yes").await;
        assert_eq!(reply.stage, "idle");
        assert_eq!(bookings.len().await, 1);

        let id = crate::subsystems::intent::extract_booking_id(&reply.response).unwrap();
        let reply = bot
            .handle_message(sid.clone(), &format!("cancel {}", id))
            .await;
        assert!(reply.response.contains("successfully cancelled"));
        assert!(bookings.is_empty().await);
    }

    #[tokio::test]
    async fn test_cancel_without_id_during_booking_discards_draft() {
        let (bot, bookings, _) = concierge();
        let sid = Some("s2".to_string());
        bot.handle_message(sid.clone(), "book a service").await;
        bot.handle_message(sid.clone(), "Jane").await;
        let reply = bot.handle_message(sid.clone(), "cancel").await;
        assert_eq!(reply.stage, "idle");
        assert!(bookings.is_empty().await);
    }

    #[tokio::test]
    async fn test_cancel_without_id_asks_for_it() {
        let (bot, _, _) = concierge();
        let sid = Some("s3".to_string());
        let reply = bot.handle_message(sid.clone(), "I want to cancel").await;
        assert_eq!(reply.stage, "await_cancellation_id");
        let reply = bot.handle_message(sid.clone(), "AB1234").await;
        assert_eq!(reply.stage, "await_cancellation_id");
        assert!(reply.response.contains("ABC12345"));
        let reply = bot.handle_message(sid.clone(), "ZZZ00000").await;
        assert_eq!(reply.stage, "idle");
        assert!(reply.response.contains("Not Found"));
    }

    #[tokio::test]
    async fn test_expired_session_restarts() {
        let (bot, _, sessions) = concierge();
        let mut old = Session::new("s4", Utc::now() - Duration::hours(5));
        old.stage = Stage::AwaitCancellationId;
        sessions.put(old).await.unwrap();

        let reply = bot.handle_message(Some("s4".into()), "what do you do?").await;
        assert_eq!(reply.stage, "idle");
        assert_eq!(sessions.get("s4").await.unwrap().unwrap().history.len(), 2);
    }

    #[tokio::test]
    async fn test_contacts_and_services() {
        let (bot, _, _) = concierge();
        let reply = bot.handle_message(None, "what is your email?").await;
        assert!(reply.response.contains("Email: info@adeonatech.net"));
        let reply = bot.handle_message(None, "list of services please").await;
        assert!(reply.response.contains("• Lead Manager"));
        assert_eq!(bot.services().len(), 2);
    }

    #[tokio::test]
    async fn test_greeting_and_company_facts_skip_the_model() {
        let (bot, _, _) = concierge();
        let reply = bot.handle_message(None, "Hello!").await;
        assert!(reply.response.starts_with("Hello! Welcome to Adeona Technologies."));
        assert!(reply.response.contains("our 2 services"));

        let reply = bot.handle_message(None, "When was the company founded?").await;
        assert_eq!(
            reply.response,
            "Adeona Technologies was founded in 2017 in Colombo, Sri Lanka."
        );

        // No address configured: answered by the model instead.
        let reply = bot.handle_message(None, "what is your office address?").await;
        assert!(reply.response.starts_with("answer to: "));
    }

    #[tokio::test]
    async fn test_company_references_rewritten_before_answering() {
        let (bot, _, sessions) = concierge();
        let reply = bot
            .handle_message(Some("s5".into()), "does your company work with banks?")
            .await;
        assert_eq!(
            reply.response,
            "answer to: does Adeona Technologies work with banks?"
        );
        let stored = sessions.get("s5").await.unwrap().unwrap();
        assert_eq!(stored.history[0].content, "does your company work with banks?");
    }

    #[tokio::test]
    async fn test_service_inquiry_without_content_lists_catalogue() {
        let (bot, _, _) = concierge();
        let reply = bot.handle_message(None, "What services do you offer?").await;
        assert!(reply.response.contains("• Lead Manager"));
        assert!(reply.response.contains("• Digital Bill"));
        assert!(reply.sources.is_empty());
    }

    #[tokio::test]
    async fn test_stats_and_purge() {
        let (bot, _, sessions) = concierge();
        bot.handle_message(Some("fresh".into()), "hi").await;
        sessions
            .put(Session::new("stale", Utc::now() - Duration::hours(3)))
            .await
            .unwrap();
        assert_eq!(bot.stats().await.unwrap().active_sessions, 2);
        assert_eq!(bot.purge_expired_sessions().await.unwrap(), 1);
        assert_eq!(bot.stats().await.unwrap().active_sessions, 1);
    }

    #[tokio::test]
    async fn test_health_reports_every_component() {
        let (bot, _, _) = concierge();
        let report = bot.health().await;
        assert_eq!(report.status, "healthy");
        assert_eq!(report.services.len(), 5);
        assert!(report.services["embedding"].ok);
    }
}
