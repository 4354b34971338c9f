//! Retrieval subsystem — grounded answers for general and service questions
//!
//! - Embeds the question with the `RETRIEVAL_QUERY` task type
//! - Queries the vector index for the top-K website chunks
//! - Keeps chunks scoring at least `min_score`, truncated and labelled by category
//! - Falls back to web search results when no chunk qualifies and a search backend is set
//! - Generates an answer from system prompt + context + history + question
//!
//! Embedding or index failures degrade to an ungrounded answer. A generation
//! failure degrades to a fixed apology quoting the support phone number.

use std::sync::LazyLock;

use concierge_core::config::RetrievalConfig;
use concierge_core::models::{ScoredChunk, Turn};
use concierge_core::{
    EmbeddingBackend, GenerationBackend, GenerationRequest, VectorIndex, WebResult, WebSearch,
};
use regex::{Captures, NoExpand, Regex};
use serde::Serialize;

use super::bounded;

/// Where context comes from for one question.
pub struct Sources<'a> {
    pub embedder: &'a dyn EmbeddingBackend,
    pub index: &'a dyn VectorIndex,
    pub web: Option<&'a dyn WebSearch>,
    pub store_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<String>,
    pub grounded: bool,
}

/// Retrieved context ready to hand to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct Context {
    pub block: String,
    pub sources: Vec<String>,
    pub from_web: bool,
}

/// The service catalogue quoted to the model for service questions.
pub struct Catalog<'a> {
    pub company_name: &'a str,
    pub services: &'a [String],
    pub website: &'a str,
}

static COMPANY_REFERENCE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(this company|the company|your company|you guys)\b").ok()
});

static OFFERING_REFERENCE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)\byour (services|solutions)\b").ok());

/// Replace "your company", "you guys" and the like with the company name so
/// the query embeds close to pages that name it.
pub fn resolve_company_references(message: &str, company: &str) -> String {
    if company.is_empty() {
        return message.to_string();
    }
    let mut text = message.to_string();
    if let Some(re) = COMPANY_REFERENCE.as_ref() {
        text = re.replace_all(&text, NoExpand(company)).into_owned();
    }
    if let Some(re) = OFFERING_REFERENCE.as_ref() {
        text = re
            .replace_all(&text, |caps: &Captures| format!("{} {}", company, &caps[1]))
            .into_owned();
    }
    if text != message {
        tracing::debug!(rewritten = %text, "Resolved company references");
    }
    text
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Truncate, label and concatenate chunks in order. `None` when nothing fits.
fn assemble<'c>(
    chunks: impl IntoIterator<Item = &'c ScoredChunk>,
    config: &RetrievalConfig,
) -> Option<Context> {
    let mut block = String::new();
    let mut sources: Vec<String> = Vec::new();

    for chunk in chunks {
        let entry = format!(
            "[{}] {}",
            chunk.category.to_uppercase(),
            truncate_chars(chunk.content.trim(), config.max_chunk_chars)
        );
        let separator = if block.is_empty() { 0 } else { 2 };
        if block.chars().count() + separator + entry.chars().count() > config.max_context_chars {
            break;
        }
        if !block.is_empty() {
            block.push_str("\n\n");
        }
        block.push_str(&entry);
        if !sources.contains(&chunk.source_url) {
            sources.push(chunk.source_url.clone());
        }
    }

    (!block.is_empty()).then_some(Context {
        block,
        sources,
        from_web: false,
    })
}

/// Filter by score, truncate, label and concatenate chunks. `None` when nothing qualifies.
pub fn build_context(chunks: &[ScoredChunk], config: &RetrievalConfig) -> Option<Context> {
    assemble(chunks.iter().filter(|c| c.score >= config.min_score), config)
}

const OFFERING_KEYWORDS: [&str; 4] = ["service", "solution", "development", "system"];
const MAX_SERVICE_CHUNKS: usize = 8;

/// Like `build_context`, restricted to chunks that talk about offerings.
pub fn build_service_context(chunks: &[ScoredChunk], config: &RetrievalConfig) -> Option<Context> {
    assemble(
        chunks
            .iter()
            .filter(|c| c.score >= config.min_score)
            .filter(|c| {
                let text = c.content.to_lowercase();
                OFFERING_KEYWORDS.iter().any(|k| text.contains(k))
            })
            .take(MAX_SERVICE_CHUNKS),
        config,
    )
}

/// Embed + query. Any failure is logged and yields no chunks.
async fn local_chunks(query: &str, sources: &Sources<'_>, top_k: u32) -> Vec<ScoredChunk> {
    let embedding = match sources.embedder.embed_query(query).await {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, backend = sources.embedder.name(), "Query embedding failed");
            return Vec::new();
        }
    };

    match bounded(sources.store_timeout_seconds, sources.index.query(&embedding, top_k)).await {
        Ok(chunks) => chunks,
        Err(e) => {
            tracing::warn!(error = %e, "Vector index query failed");
            Vec::new()
        }
    }
}

fn web_chunks(results: Vec<WebResult>) -> Vec<ScoredChunk> {
    results
        .into_iter()
        .enumerate()
        .map(|(i, r)| ScoredChunk {
            content: if r.title.is_empty() {
                r.snippet
            } else {
                format!("{}: {}", r.title, r.snippet)
            },
            source_url: r.link,
            category: "web".to_string(),
            chunk_index: i as i32,
            score: 1.0,
        })
        .collect()
}

async fn web_context(query: &str, web: &dyn WebSearch, config: &RetrievalConfig) -> Option<Context> {
    match web.search(query).await {
        Ok(results) => {
            let chunks = web_chunks(results);
            assemble(&chunks, config).map(|context| Context {
                from_web: true,
                ..context
            })
        }
        Err(e) => {
            tracing::warn!(error = %e, backend = web.name(), "Web search failed");
            None
        }
    }
}

/// Local context picked by `select`, else web results when search is configured.
async fn gather(
    query: &str,
    sources: &Sources<'_>,
    config: &RetrievalConfig,
    top_k: u32,
    select: fn(&[ScoredChunk], &RetrievalConfig) -> Option<Context>,
) -> Option<Context> {
    let chunks = local_chunks(query, sources, top_k).await;
    if let Some(context) = select(&chunks, config) {
        tracing::debug!(candidates = chunks.len(), "Retrieved local context");
        return Some(context);
    }

    let web = sources.web?;
    tracing::info!(
        candidates = chunks.len(),
        backend = web.name(),
        "No local context; trying web search"
    );
    web_context(query, web, config).await
}

pub async fn retrieve_context(
    question: &str,
    sources: &Sources<'_>,
    config: &RetrievalConfig,
) -> Option<Context> {
    gather(question, sources, config, config.top_k, build_context).await
}

pub fn apology(support_phone: &str) -> String {
    format!(
        "I apologize, but I'm experiencing technical difficulties. Please contact our support team at {} for immediate assistance.",
        support_phone
    )
}

pub async fn answer(
    question: &str,
    history: &[Turn],
    sources: &Sources<'_>,
    generator: &dyn GenerationBackend,
    config: &RetrievalConfig,
    system_prompt: &str,
    support_phone: &str,
) -> Answer {
    let (block, cited) = match retrieve_context(question, sources, config).await {
        Some(Context { block, sources, .. }) => (Some(block), sources),
        None => (None, Vec::new()),
    };
    let grounded = block.is_some();

    let request = GenerationRequest {
        system_prompt: system_prompt.to_string(),
        context: block,
        history: history.to_vec(),
        message: question.to_string(),
    };

    match generator.generate(&request).await {
        Ok(text) => Answer {
            text,
            sources: cited,
            grounded,
        },
        Err(e) => {
            tracing::error!(error = %e, backend = generator.name(), "Generation failed");
            Answer {
                text: apology(support_phone),
                sources: Vec::new(),
                grounded: false,
            }
        }
    }
}

fn service_prompt(question: &str, catalog: &Catalog<'_>) -> String {
    let total = catalog.services.len();
    format!(
        "{question}\n\n{company} offers {total} services in total: {list}.\n\
         Answer from the website content: name the services relevant to the question \
         with a short description of each, mention that there are {total} services in \
         total, and end with how to get in touch for details.",
        company = catalog.company_name,
        list = catalog.services.join(", "),
    )
}

/// Grounded answer about the company's services.
///
/// `None` when neither the index nor web search yields service content, or
/// when generation fails; the caller then lists the catalogue instead.
pub async fn answer_service_inquiry(
    question: &str,
    history: &[Turn],
    sources: &Sources<'_>,
    generator: &dyn GenerationBackend,
    config: &RetrievalConfig,
    system_prompt: &str,
    catalog: &Catalog<'_>,
) -> Option<Answer> {
    let query = format!("services solutions offerings {}", question);
    let context = gather(&query, sources, config, config.service_top_k, build_service_context).await?;

    let request = GenerationRequest {
        system_prompt: system_prompt.to_string(),
        context: Some(context.block),
        history: history.to_vec(),
        message: service_prompt(question, catalog),
    };

    match generator.generate(&request).await {
        Ok(mut text) => {
            if context.from_web {
                text.push_str(&format!(
                    "\n\nFor the most up-to-date service information, visit: {}",
                    catalog.website
                ));
            }
            Some(Answer {
                text,
                sources: context.sources,
                grounded: true,
            })
        }
        Err(e) => {
            tracing::error!(error = %e, backend = generator.name(), "Service answer generation failed");
            None
        }
    }
}
