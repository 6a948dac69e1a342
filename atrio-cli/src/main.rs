//! atrio-cli — operator frontend for the Atrio back-office HTTP API
//!
//! # Subcommands
//! - `status`                                  — show server health
//! - `conversations [--instance <id>]`         — inbox list
//! - `messages <session_id> [--older ...]`     — session history
//! - `send <instance> <session> <text>`        — send a message
//! - `leads [--stage <stage>]`                 — lead pipeline
//! - `lead-move <id> <stage>`                  — drag a lead to a stage
//! - `relay <endpoint-key> [--payload <json>]` — test the webhook relay
//! - `import <file.csv>`                       — parse and upload contacts

use clap::{Parser, Subcommand};
use serde::Deserialize;

const DEFAULT_SERVER: &str = "http://127.0.0.1:8780";
const DEFAULT_LIMIT: u32 = 20;

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(
    name = "atrio-cli",
    version,
    about = "Atrio back-office — operator CLI"
)]
struct Cli {
    /// Atrio HTTP server URL (overrides ATRIO_HTTP_URL env var)
    #[arg(long, env = "ATRIO_HTTP_URL", default_value = DEFAULT_SERVER)]
    server: String,

    /// Bearer token for the relay endpoint (overrides ATRIO_TOKEN env var)
    #[arg(long, env = "ATRIO_TOKEN")]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Show Atrio server status
    Status,

    /// List conversations, most recent activity first
    Conversations {
        /// Restrict to one channel instance
        #[arg(long)]
        instance: Option<String>,

        /// Maximum number of conversations to return
        #[arg(short = 'n', long, default_value_t = DEFAULT_LIMIT)]
        limit: u32,

        /// Output the raw JSON page
        #[arg(long)]
        json: bool,
    },

    /// Show a session's message history, oldest first
    Messages {
        /// Session to read
        session_id: String,

        /// Maximum number of messages to return
        #[arg(short = 'n', long, default_value_t = 50)]
        limit: u32,

        /// Load older history from a cursor: "<rfc3339-ts>,<message-id>"
        #[arg(long)]
        older: Option<String>,

        /// Output the raw JSON page
        #[arg(long)]
        json: bool,
    },

    /// Send a message on a session
    Send {
        /// Channel instance id
        instance: String,

        /// Session id
        session: String,

        /// Message text
        text: String,
    },

    /// List leads, most recently touched first
    Leads {
        /// Filter by pipeline stage
        #[arg(long)]
        stage: Option<String>,

        /// Maximum number of leads to return
        #[arg(short = 'n', long, default_value_t = 50)]
        limit: u32,

        /// Output the raw JSON page
        #[arg(long)]
        json: bool,
    },

    /// Move a lead to another pipeline stage
    LeadMove {
        /// Lead id
        id: String,

        /// Target stage (new, contacted, visiting, proposal, closed, lost)
        stage: String,
    },

    /// Fire a test call through the webhook relay
    Relay {
        /// Configured endpoint key
        endpoint_key: String,

        /// JSON payload to deliver (defaults to a test marker)
        #[arg(long)]
        payload: Option<String>,
    },

    /// Parse a contact CSV and upload it
    Import {
        /// Path to the CSV file
        file: String,
    },
}

// ============================================================================
// API Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct PageResponse<T> {
    rows: Vec<T>,
    next_cursor: Option<serde_json::Value>,
    has_more: bool,
}

#[derive(Debug, Deserialize)]
struct ConversationRow {
    session_id: String,
    instance_id: String,
    last_message: String,
    last_activity_at: String,
    message_count: i64,
}

#[derive(Debug, Deserialize)]
struct MessageRow {
    direction: String,
    content: String,
    created_at: String,
}

#[derive(Debug, Deserialize)]
struct LeadRow {
    id: String,
    name: String,
    phone: String,
    stage: String,
    assigned_agent: Option<String>,
    assigned_agent_name: Option<String>,
}

// ============================================================================
// Main
// ============================================================================

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let server = cli.server.trim_end_matches('/').to_string();

    match cli.command {
        Commands::Status => do_status(&server),
        Commands::Conversations {
            instance,
            limit,
            json,
        } => do_conversations(&server, instance.as_deref(), limit, json),
        Commands::Messages {
            session_id,
            limit,
            older,
            json,
        } => do_messages(&server, &session_id, limit, older.as_deref(), json),
        Commands::Send {
            instance,
            session,
            text,
        } => do_send(&server, &instance, &session, &text),
        Commands::Leads { stage, limit, json } => {
            do_leads(&server, stage.as_deref(), limit, json)
        }
        Commands::LeadMove { id, stage } => do_lead_move(&server, &id, &stage),
        Commands::Relay {
            endpoint_key,
            payload,
        } => do_relay(&server, cli.token.as_deref(), &endpoint_key, payload.as_deref()),
        Commands::Import { file } => do_import(&server, &file),
    }
}

fn client(timeout_secs: u64) -> anyhow::Result<reqwest::blocking::Client> {
    Ok(reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()?)
}

fn get_json(url: &str) -> serde_json::Value {
    let client = match client(30) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("atrio-cli: failed to build HTTP client: {}", e);
            std::process::exit(1);
        }
    };
    let resp = match client.get(url).send() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("atrio-cli: connection failed to {}: {}", url, e);
            std::process::exit(1);
        }
    };
    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().unwrap_or_default();
        eprintln!("atrio-cli: server returned {}: {}", status, body);
        std::process::exit(1);
    }
    resp.json().unwrap_or_else(|e| {
        eprintln!("atrio-cli: failed to parse response: {}", e);
        std::process::exit(1);
    })
}

fn post_json(url: &str, body: &serde_json::Value, token: Option<&str>) -> serde_json::Value {
    let client = match client(60) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("atrio-cli: failed to build HTTP client: {}", e);
            std::process::exit(1);
        }
    };
    let mut request = client.post(url).json(body);
    if let Some(token) = token {
        request = request.bearer_auth(token);
    }
    let resp = match request.send() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("atrio-cli: connection failed to {}: {}", url, e);
            std::process::exit(1);
        }
    };
    let status = resp.status();
    let body: serde_json::Value = resp.json().unwrap_or_else(|e| {
        eprintln!("atrio-cli: failed to parse response: {}", e);
        std::process::exit(1);
    });
    if !status.is_success() {
        let error = body["error"].as_str().unwrap_or("unknown error");
        eprintln!("atrio-cli: server returned {}: {}", status, error);
        std::process::exit(1);
    }
    body
}

// ============================================================================
// Subcommand implementations
// ============================================================================

fn do_status(server: &str) -> anyhow::Result<()> {
    let body = get_json(&format!("{}/health", server));
    println!("Atrio server: {}", body["status"].as_str().unwrap_or("unknown"));
    println!("Version:      {}", body["version"].as_str().unwrap_or("?"));
    println!("PostgreSQL:   {}", body["postgresql"].as_str().unwrap_or("?"));
    println!("Socket:       {}", body["socket"].as_str().unwrap_or("?"));
    Ok(())
}

fn do_conversations(
    server: &str,
    instance: Option<&str>,
    limit: u32,
    json: bool,
) -> anyhow::Result<()> {
    let mut url = format!("{}/conversations?limit={}", server, limit);
    if let Some(instance) = instance {
        url.push_str(&format!("&instance={}", instance));
    }
    let body = get_json(&url);

    if json {
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    let page: PageResponse<ConversationRow> = serde_json::from_value(body)?;
    if page.rows.is_empty() {
        eprintln!("No conversations.");
        return Ok(());
    }
    for convo in &page.rows {
        let preview: String = convo.last_message.chars().take(48).collect();
        println!(
            "{:<24} {:<10} {:>4} msgs  {}  {}",
            convo.session_id, convo.instance_id, convo.message_count, convo.last_activity_at,
            preview
        );
    }
    if page.has_more {
        if let Some(cursor) = &page.next_cursor {
            eprintln!("-- more: cursor {}", cursor);
        }
    }
    Ok(())
}

fn do_messages(
    server: &str,
    session_id: &str,
    limit: u32,
    older: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    let mut url = format!(
        "{}/messages?session_id={}&limit={}",
        server, session_id, limit
    );
    if let Some(older) = older {
        let Some((ts, id)) = older.split_once(',') else {
            eprintln!("atrio-cli: --older expects \"<rfc3339-ts>,<message-id>\"");
            std::process::exit(1);
        };
        url.push_str(&format!(
            "&cursor_ts={}&cursor_id={}&direction=backward",
            ts, id
        ));
    }
    let body = get_json(&url);

    if json {
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    let page: PageResponse<MessageRow> = serde_json::from_value(body)?;
    if page.rows.is_empty() {
        eprintln!("No messages for: {}", session_id);
        return Ok(());
    }
    for message in &page.rows {
        let who = match message.direction.as_str() {
            "human" => "<<",
            _ => ">>",
        };
        println!("{} [{}] {}", who, message.created_at, message.content);
    }
    Ok(())
}

fn do_send(server: &str, instance: &str, session: &str, text: &str) -> anyhow::Result<()> {
    let body = post_json(
        &format!("{}/messages", server),
        &serde_json::json!({
            "instance_id": instance,
            "session_id": session,
            "content": text,
        }),
        None,
    );
    println!("Sent {} on {}", body["id"].as_str().unwrap_or("?"), session);
    Ok(())
}

fn do_leads(server: &str, stage: Option<&str>, limit: u32, json: bool) -> anyhow::Result<()> {
    let mut url = format!("{}/leads?limit={}", server, limit);
    if let Some(stage) = stage {
        url.push_str(&format!("&stage={}", stage));
    }
    let body = get_json(&url);

    if json {
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    let page: PageResponse<LeadRow> = serde_json::from_value(body)?;
    if page.rows.is_empty() {
        eprintln!("No leads.");
        return Ok(());
    }
    for lead in &page.rows {
        let agent = lead
            .assigned_agent_name
            .as_deref()
            .or(lead.assigned_agent.as_deref())
            .unwrap_or("-");
        println!(
            "{}  {:<24} {:<16} {:<10} {}",
            lead.id, lead.name, lead.phone, lead.stage, agent
        );
    }
    Ok(())
}

fn do_lead_move(server: &str, id: &str, stage: &str) -> anyhow::Result<()> {
    let client = client(30)?;
    let url = format!("{}/leads/{}", server, id);
    let resp = client
        .patch(&url)
        .json(&serde_json::json!({"stage": stage}))
        .send();
    let resp = match resp {
        Ok(r) => r,
        Err(e) => {
            eprintln!("atrio-cli: connection failed to {}: {}", url, e);
            std::process::exit(1);
        }
    };
    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().unwrap_or_default();
        eprintln!("atrio-cli: server returned {}: {}", status, body);
        std::process::exit(1);
    }
    let body: serde_json::Value = resp.json().unwrap_or_default();
    println!(
        "Lead {} → {}",
        body["name"].as_str().unwrap_or(id),
        body["stage"].as_str().unwrap_or(stage)
    );
    Ok(())
}

fn do_relay(
    server: &str,
    token: Option<&str>,
    endpoint_key: &str,
    payload: Option<&str>,
) -> anyhow::Result<()> {
    let payload: serde_json::Value = match payload {
        Some(raw) => serde_json::from_str(raw).unwrap_or_else(|e| {
            eprintln!("atrio-cli: --payload is not valid JSON: {}", e);
            std::process::exit(1);
        }),
        None => serde_json::json!({"test": true}),
    };

    let body = post_json(
        &format!("{}/relay", server),
        &serde_json::json!({
            "endpointKey": endpoint_key,
            "payload": payload,
        }),
        token,
    );
    println!(
        "Relay {}: HTTP {} (success: {})",
        endpoint_key, body["status"], body["success"]
    );
    Ok(())
}

fn do_import(server: &str, file: &str) -> anyhow::Result<()> {
    let content = match std::fs::read_to_string(file) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("atrio-cli: cannot read {}: {}", file, e);
            std::process::exit(1);
        }
    };

    let client = client(60)?;
    let url = format!("{}/import/contacts", server);
    let resp = match client.post(&url).body(content).send() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("atrio-cli: connection failed to {}: {}", url, e);
            std::process::exit(1);
        }
    };
    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().unwrap_or_default();
        eprintln!("atrio-cli: server returned {}: {}", status, body);
        std::process::exit(1);
    }
    let body: serde_json::Value = resp.json().unwrap_or_default();

    println!("Imported {} contacts", body["imported"]);
    if let Some(errors) = body["errors"].as_array() {
        for error in errors {
            eprintln!(
                "  line {}: {}",
                error["line"],
                error["reason"].as_str().unwrap_or("?")
            );
        }
        if !errors.is_empty() {
            eprintln!("{} rows skipped", errors.len());
        }
    }
    Ok(())
}
