//! concierge-cli — terminal client for the Concierge HTTP API
//!
//! # Subcommands
//! - `chat [--session <id>]`                 — interactive conversation on stdin
//! - `ask <message> [--session <id>] [--json]` — send one message
//! - `status`                                  — show per-component health
//! - `contacts`                                — print the contact directory
//! - `services`                                — print the service catalogue
//! - `purge`                                   — purge expired sessions

use std::io::{BufRead, Write};

use clap::{Parser, Subcommand};
use serde::Deserialize;

const DEFAULT_SERVER: &str = "http://127.0.0.1:8000";

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(name = "concierge-cli", version, about = "Customer support concierge — terminal client")]
struct Cli {
    /// Concierge HTTP server URL (overrides CONCIERGE_HTTP_URL env var)
    #[arg(long, env = "CONCIERGE_HTTP_URL", default_value = DEFAULT_SERVER)]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Start an interactive conversation (type `exit` to leave)
    Chat {
        /// Resume an existing session
        #[arg(long)]
        session: Option<String>,
    },

    /// Send a single message
    Ask {
        message: String,

        #[arg(long)]
        session: Option<String>,

        /// Print the raw JSON reply
        #[arg(long)]
        json: bool,
    },

    /// Show server health
    Status,

    /// Show contact details
    Contacts,

    /// List available services
    Services,

    /// Purge expired sessions
    Purge,
}

// ============================================================================
// API Response Types
// ============================================================================

/// Reply from POST /chat
#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    pub response: String,
    pub session_id: String,
    pub stage: String,
    #[serde(default)]
    pub sources: Vec<String>,
    pub took_ms: Option<u64>,
}

/// Human-readable rendering of a chat reply.
pub fn format_reply(reply: &ChatResponse) -> String {
    let mut out = reply.response.clone();
    if !reply.sources.is_empty() {
        out.push_str("\n\nSources:");
        for source in &reply.sources {
            out.push_str("\n  ");
            out.push_str(source);
        }
    }
    out
}

/// `label: value` lines from a `/contact` body, sorted by label.
pub fn format_contact_info(body: &serde_json::Value) -> Vec<String> {
    let mut lines: Vec<String> = body["contact_info"]
        .as_object()
        .map(|map| {
            map.iter()
                .map(|(label, value)| format!("{}: {}", label, value.as_str().unwrap_or_default()))
                .collect()
        })
        .unwrap_or_default();
    lines.sort();
    lines
}

/// One line per component from a `/health` body.
pub fn format_health(body: &serde_json::Value) -> Vec<String> {
    let mut lines = vec![
        format!("Concierge:  {}", body["status"].as_str().unwrap_or("unknown")),
        format!("Version:    {}", body["version"].as_str().unwrap_or("?")),
    ];
    if let Some(services) = body["services"].as_object() {
        for (name, component) in services {
            let mark = if component["ok"].as_bool().unwrap_or(false) {
                "ok"
            } else {
                "FAIL"
            };
            lines.push(format!(
                "  {:<13} {:<4} {}",
                name,
                mark,
                component["detail"].as_str().unwrap_or_default()
            ));
        }
    }
    lines
}

// ============================================================================
// HTTP Client Calls
// ============================================================================

struct Api {
    client: reqwest::blocking::Client,
    server: String,
}

impl Api {
    fn new(server: &str) -> anyhow::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()?;
        Ok(Self {
            client,
            server: server.trim_end_matches('/').to_string(),
        })
    }

    fn get(&self, path: &str) -> anyhow::Result<serde_json::Value> {
        let url = format!("{}{}", self.server, path);
        let resp = self
            .client
            .get(&url)
            .send()
            .map_err(|e| anyhow::anyhow!("cannot reach {}: {}", url, e))?;
        Self::decode(resp)
    }

    fn post(&self, path: &str, body: &serde_json::Value) -> anyhow::Result<serde_json::Value> {
        let url = format!("{}{}", self.server, path);
        let resp = self
            .client
            .post(&url)
            .json(body)
            .send()
            .map_err(|e| anyhow::anyhow!("cannot reach {}: {}", url, e))?;
        Self::decode(resp)
    }

    fn decode(resp: reqwest::blocking::Response) -> anyhow::Result<serde_json::Value> {
        let status = resp.status();
        let body: serde_json::Value = resp.json().unwrap_or_default();
        if !status.is_success() {
            let msg = body["error"].as_str().unwrap_or("request failed");
            anyhow::bail!("server returned {}: {}", status, msg);
        }
        Ok(body)
    }

    fn chat(&self, message: &str, session: Option<&str>) -> anyhow::Result<ChatResponse> {
        let body = self.post(
            "/chat",
            &serde_json::json!({ "message": message, "session_id": session }),
        )?;
        Ok(serde_json::from_value(body)?)
    }
}

fn do_chat(api: &Api, mut session: Option<String>) -> anyhow::Result<()> {
    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    println!("Connected to {} (type `exit` to leave)", api.server);

    loop {
        print!("you> ");
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let message = line.trim();
        if message.is_empty() {
            continue;
        }
        if matches!(message, "exit" | "quit") {
            break;
        }

        match api.chat(message, session.as_deref()) {
            Ok(reply) => {
                println!("bot> {}\n", format_reply(&reply));
                session = Some(reply.session_id);
            }
            Err(e) => eprintln!("concierge-cli: {}", e),
        }
    }

    if let Some(id) = session {
        println!("Session: {}", id);
    }
    Ok(())
}

fn do_ask(api: &Api, message: &str, session: Option<&str>, json: bool) -> anyhow::Result<()> {
    if json {
        let body = api.post(
            "/chat",
            &serde_json::json!({ "message": message, "session_id": session }),
        )?;
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }
    let reply = api.chat(message, session)?;
    println!("{}", format_reply(&reply));
    eprintln!(
        "[session {} | stage {} | {} ms]",
        reply.session_id,
        reply.stage,
        reply.took_ms.unwrap_or_default()
    );
    Ok(())
}

fn do_status(api: &Api) -> anyhow::Result<()> {
    let body = api.get("/health")?;
    for line in format_health(&body) {
        println!("{}", line);
    }
    if body["status"] != "healthy" {
        std::process::exit(1);
    }
    Ok(())
}

fn do_contacts(api: &Api) -> anyhow::Result<()> {
    for line in format_contact_info(&api.get("/contact")?) {
        println!("{}", line);
    }
    Ok(())
}

fn do_services(api: &Api) -> anyhow::Result<()> {
    let body = api.get("/services")?;
    if let Some(services) = body["services"].as_array() {
        for service in services {
            println!("• {}", service.as_str().unwrap_or_default());
        }
    }
    Ok(())
}

fn do_purge(api: &Api) -> anyhow::Result<()> {
    let body = api.post("/admin/cleanup", &serde_json::json!({}))?;
    println!("Purged {} expired session(s)", body["purged"].as_u64().unwrap_or(0));
    Ok(())
}

// ============================================================================
// Main
// ============================================================================

fn main() {
    let cli = Cli::parse();

    let result = Api::new(&cli.server).and_then(|api| match cli.command {
        Commands::Chat { session } => do_chat(&api, session),
        Commands::Ask {
            message,
            session,
            json,
        } => do_ask(&api, &message, session.as_deref(), json),
        Commands::Status => do_status(&api),
        Commands::Contacts => do_contacts(&api),
        Commands::Services => do_services(&api),
        Commands::Purge => do_purge(&api),
    });

    if let Err(e) = result {
        eprintln!("concierge-cli: {}", e);
        std::process::exit(1);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn reply(sources: &[&str]) -> ChatResponse {
        ChatResponse {
            response: "We build tailored software.".to_string(),
            session_id: "abc".to_string(),
            stage: "idle".to_string(),
            sources: sources.iter().map(|s| s.to_string()).collect(),
            took_ms: Some(12),
        }
    }

    // ========================================================================
    // TEST 1: reply without sources prints the text only
    // ========================================================================
    #[test]
    fn test_format_reply_plain() {
        assert_eq!(format_reply(&reply(&[])), "We build tailored software.");
    }

    // ========================================================================
    // TEST 2: sources are listed under the reply
    // ========================================================================
    #[test]
    fn test_format_reply_with_sources() {
        let text = format_reply(&reply(&["https://adeonatech.net/services"]));
        assert!(text.starts_with("We build tailored software."));
        assert!(text.ends_with("Sources:\n  https://adeonatech.net/services"));
    }

    // ========================================================================
    // TEST 3: chat response parses with missing optional fields
    // ========================================================================
    #[test]
    fn test_chat_response_parses_minimal_body() {
        let parsed: ChatResponse = serde_json::from_value(serde_json::json!({
            "response": "hi",
            "session_id": "s1",
            "stage": "idle",
            "audio_url": null
        }))
        .unwrap();
        assert!(parsed.sources.is_empty());
        assert!(parsed.took_ms.is_none());
    }

    // ========================================================================
    // TEST 4: contact lines are sorted by label
    // ========================================================================
    #[test]
    fn test_format_contact_info_sorted() {
        let body = serde_json::json!({
            "contact_info": { "Phone": "(+94) 117 433 3333", "Email": "info@adeonatech.net" }
        });
        assert_eq!(
            format_contact_info(&body),
            vec!["Email: info@adeonatech.net", "Phone: (+94) 117 433 3333"]
        );
        assert!(format_contact_info(&serde_json::json!({})).is_empty());
    }

    // ========================================================================
    // TEST 5: health lines mark failing components
    // ========================================================================
    #[test]
    fn test_format_health_marks_failures() {
        let body = serde_json::json!({
            "status": "degraded",
            "version": "0.1.0",
            "services": {
                "embedding": { "ok": true, "detail": "gemini" },
                "generation": { "ok": false, "detail": "timed out after 10s" }
            }
        });
        let lines = format_health(&body);
        assert_eq!(lines[0], "Concierge:  degraded");
        assert!(lines.iter().any(|l| l.contains("embedding") && l.contains("ok")));
        assert!(lines
            .iter()
            .any(|l| l.contains("generation") && l.contains("FAIL") && l.contains("timed out")));
    }
}
