//! IMAP inbox: selects bank alert emails over TLS.
//!
//! The mailbox is opened with `EXAMINE` and bodies are fetched with
//! `BODY.PEEK[]`, so a run never changes flags on the server.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mail_parser::{MessageParser, MimeHeaders};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info};
use uuid::Uuid;

use crate::channels::inbox::{AlertEmail, InboxQuery, InboxSource};
use crate::config::{Lookup, parse_or, required};
use crate::error::{ChannelError, ConfigError};

const NAME: &str = "imap";

// ── Configuration ───────────────────────────────────────────────────

/// IMAP connection settings.
#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub imap_host: String,
    pub imap_port: u16,
    pub username: String,
    pub password: SecretString,
    pub mailbox: String,
    pub timeout: Duration,
}

impl EmailConfig {
    /// Build from `EMAIL_*` variables.
    pub fn from_lookup(lookup: Lookup<'_>) -> Result<Self, ConfigError> {
        Ok(Self {
            imap_host: required(lookup, "EMAIL_IMAP_HOST")?,
            imap_port: parse_or(lookup, "EMAIL_IMAP_PORT", 993)?,
            username: required(lookup, "EMAIL_USERNAME")?,
            password: SecretString::from(required(lookup, "EMAIL_PASSWORD")?),
            mailbox: lookup("EMAIL_MAILBOX").unwrap_or_else(|| "INBOX".to_string()),
            timeout: Duration::from_secs(parse_or(lookup, "EMAIL_TIMEOUT_SECS", 30)?),
        })
    }
}

// ── Inbox ───────────────────────────────────────────────────────────

/// Read-only IMAP inbox.
pub struct ImapInbox {
    config: EmailConfig,
}

impl ImapInbox {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl InboxSource for ImapInbox {
    fn name(&self) -> &str {
        NAME
    }

    async fn select(&self, query: &InboxQuery) -> Result<Vec<AlertEmail>, ChannelError> {
        let cfg = self.config.clone();
        let q = query.clone();
        let fetched = tokio::task::spawn_blocking(move || fetch_matching_imap(&cfg, &q))
            .await
            .map_err(|e| ChannelError::Task(format!("IMAP task panicked: {e}")))??;

        let selected = finalize_selection(fetched, query);
        info!(
            host = %self.config.imap_host,
            count = selected.len(),
            "Selected alert emails"
        );
        Ok(selected)
    }
}

// ── Helpers (public for testing) ────────────────────────────────────

/// Check if a sender email matches the configured alert senders.
///
/// - `*` in list → allow all
/// - `@domain.com` or `domain.com` → domain match
/// - `user@domain.com` → exact email match
pub fn is_sender_allowed(allowed: &[String], email: &str) -> bool {
    if allowed.iter().any(|a| a == "*") {
        return true;
    }
    let email_lower = email.to_lowercase();
    allowed.iter().any(|a| {
        if a.starts_with('@') {
            email_lower.ends_with(&a.to_lowercase())
        } else if a.contains('@') {
            a.eq_ignore_ascii_case(email)
        } else {
            email_lower.ends_with(&format!("@{}", a.to_lowercase()))
        }
    })
}

/// Strip HTML tags from content (basic).
pub fn strip_html(html: &str) -> String {
    let mut result = String::new();
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => {
                in_tag = false;
                result.push(' ');
            }
            _ if !in_tag => result.push(ch),
            _ => {}
        }
    }
    result.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// IMAP date (`DD-Mon-YYYY`) for `SINCE`.
pub fn imap_date(at: DateTime<Utc>) -> String {
    at.format("%d-%b-%Y").to_string()
}

/// Quote a string as an IMAP quoted-string.
fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

/// `OR key a OR key b key c`: any of `values` matches. Empty → `None`.
fn or_chain(key: &str, values: &[String]) -> Option<String> {
    match values {
        [] => None,
        [only] => Some(format!("{key} {}", quote(only))),
        [first, rest @ ..] => Some(format!(
            "OR {key} {} {}",
            quote(first),
            or_chain(key, rest)?
        )),
    }
}

/// Build the `SEARCH` command for a query.
///
/// `SINCE` has day resolution and is compared in the server's timezone, so
/// the date asked for is one day before `query.since`. The exact window is
/// applied after fetch.
pub fn build_search_command(query: &InboxQuery) -> String {
    let senders: Vec<String> = query
        .senders
        .iter()
        .filter(|s| s.as_str() != "*")
        .cloned()
        .collect();

    let since = query
        .since
        .checked_sub_signed(chrono::Duration::days(1))
        .unwrap_or(query.since);
    let mut command = format!("SEARCH SINCE {}", imap_date(since));
    for clause in [or_chain("FROM", &senders), or_chain("TEXT", &query.terms)]
        .into_iter()
        .flatten()
    {
        command.push(' ');
        command.push_str(&clause);
    }
    command
}

/// Message sequence numbers from untagged `* SEARCH` lines.
pub fn parse_search_ids(untagged: &[Vec<u8>]) -> Vec<u32> {
    untagged
        .iter()
        .map(|line| String::from_utf8_lossy(line))
        .filter(|line| line.starts_with("* SEARCH"))
        .flat_map(|line| {
            line.split_whitespace()
                .skip(2)
                .filter_map(|id| id.parse().ok())
                .collect::<Vec<u32>>()
        })
        .collect()
}

/// Apply the exact sender/window filter, sort oldest first and cap the count.
pub fn finalize_selection(mut emails: Vec<AlertEmail>, query: &InboxQuery) -> Vec<AlertEmail> {
    emails.retain(|e| {
        (query.senders.is_empty() || is_sender_allowed(&query.senders, &e.sender))
            && query.in_window(e.received_at)
    });
    emails.sort_by_key(|e| e.received_at);
    if emails.len() > query.max_messages {
        emails.drain(..emails.len() - query.max_messages);
    }
    emails
}

/// Extract the sender address from a parsed email.
fn extract_sender(parsed: &mail_parser::Message) -> String {
    parsed
        .from()
        .and_then(|addr| addr.first())
        .and_then(|a| a.address())
        .map(|s| s.to_string())
        .unwrap_or_else(|| "unknown".into())
}

/// Extract readable text from a parsed email.
fn extract_text(parsed: &mail_parser::Message) -> String {
    if let Some(text) = parsed.body_text(0) {
        return text.to_string();
    }
    if let Some(html) = parsed.body_html(0) {
        return strip_html(html.as_ref());
    }
    for part in parsed.attachments() {
        let part: &mail_parser::MessagePart = part;
        if let Some(ct) = MimeHeaders::content_type(part)
            && ct.ctype() == "text"
            && let Ok(text) = std::str::from_utf8(part.contents())
        {
            return text.to_string();
        }
    }
    String::new()
}

/// Parse a raw RFC 822 message into an `AlertEmail`.
pub fn parse_alert_email(raw: &[u8]) -> Option<AlertEmail> {
    let parsed = MessageParser::default().parse(raw)?;

    let received_at = parsed
        .date()
        .and_then(|d| DateTime::from_timestamp(d.to_timestamp(), 0))
        .unwrap_or_else(Utc::now);

    Some(AlertEmail {
        message_id: parsed
            .message_id()
            .map(|s| s.to_string())
            .unwrap_or_else(|| format!("gen-{}", Uuid::new_v4())),
        sender: extract_sender(&parsed),
        subject: parsed.subject().unwrap_or("(no subject)").to_string(),
        body: extract_text(&parsed),
        received_at,
    })
}

// ── IMAP session ────────────────────────────────────────────────────

fn protocol(reason: impl Into<String>) -> ChannelError {
    ChannelError::Protocol {
        name: NAME.into(),
        reason: reason.into(),
    }
}

/// Collected answer to one tagged command.
#[derive(Debug, Default)]
pub struct CommandResponse {
    /// Untagged lines (`* ...`), literals excluded.
    pub untagged: Vec<Vec<u8>>,
    /// Literal payloads in arrival order.
    pub literals: Vec<Vec<u8>>,
    /// Tagged completion line.
    pub status: String,
}

impl CommandResponse {
    pub fn is_ok(&self, tag: &str) -> bool {
        self.status
            .strip_prefix(tag)
            .is_some_and(|rest| rest.trim_start().starts_with("OK"))
    }
}

/// Minimal blocking IMAP client over any byte stream.
pub struct ImapSession<S> {
    stream: S,
    next_tag: u32,
}

impl<S: Read + Write> ImapSession<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            next_tag: 1,
        }
    }

    /// Read one CRLF-terminated line.
    pub fn read_line(&mut self) -> Result<Vec<u8>, ChannelError> {
        let mut buf = Vec::new();
        loop {
            let mut byte = [0u8; 1];
            match self.stream.read(&mut byte) {
                Ok(0) => return Err(protocol("connection closed")),
                Ok(_) => {
                    buf.push(byte[0]);
                    if buf.ends_with(b"\r\n") {
                        return Ok(buf);
                    }
                }
                Err(e) => return Err(protocol(format!("read failed: {e}"))),
            }
        }
    }

    /// Send a tagged command and collect everything up to its completion.
    pub fn command(&mut self, cmd: &str) -> Result<(String, CommandResponse), ChannelError> {
        let tag = format!("A{}", self.next_tag);
        self.next_tag += 1;

        self.stream
            .write_all(format!("{tag} {cmd}\r\n").as_bytes())
            .and_then(|_| self.stream.flush())
            .map_err(|e| protocol(format!("write failed: {e}")))?;

        let mut response = CommandResponse::default();
        loop {
            let line = self.read_line()?;
            if line.starts_with(tag.as_bytes()) && line.get(tag.len()) == Some(&b' ') {
                response.status = String::from_utf8_lossy(&line).trim_end().to_string();
                return Ok((tag, response));
            }
            if let Some(len) = literal_length(&line) {
                let mut literal = vec![0u8; len];
                self.stream
                    .read_exact(&mut literal)
                    .map_err(|e| protocol(format!("literal read failed: {e}")))?;
                response.literals.push(literal);
            }
            response.untagged.push(line);
        }
    }

    /// Send a command that must complete with `OK`.
    pub fn expect_ok(&mut self, cmd: &str, what: &str) -> Result<CommandResponse, ChannelError> {
        let (tag, response) = self.command(cmd)?;
        if response.is_ok(&tag) {
            Ok(response)
        } else {
            Err(protocol(format!("{what} failed: {}", response.status)))
        }
    }
}

/// `{123}\r\n` at the end of a line announces a 123-byte literal.
fn literal_length(line: &[u8]) -> Option<usize> {
    let line = line.strip_suffix(b"\r\n")?.strip_suffix(b"}")?;
    let open = line.iter().rposition(|&b| b == b'{')?;
    std::str::from_utf8(&line[open + 1..]).ok()?.parse().ok()
}

/// Select matching messages (blocking, run in spawn_blocking).
fn fetch_matching_imap(
    config: &EmailConfig,
    query: &InboxQuery,
) -> Result<Vec<AlertEmail>, ChannelError> {
    let unreachable = |reason: String| ChannelError::Unreachable {
        name: NAME.into(),
        reason,
    };

    let tcp = TcpStream::connect((&*config.imap_host, config.imap_port))
        .map_err(|e| unreachable(format!("{}:{}: {e}", config.imap_host, config.imap_port)))?;
    tcp.set_read_timeout(Some(config.timeout))
        .map_err(|e| unreachable(e.to_string()))?;

    let mut root_store = rustls::RootCertStore::empty();
    root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let tls_config = Arc::new(
        rustls::ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth(),
    );
    let server_name = rustls_pki_types::ServerName::try_from(config.imap_host.clone())
        .map_err(|e| unreachable(format!("invalid host name: {e}")))?;
    let conn = rustls::ClientConnection::new(tls_config, server_name)
        .map_err(|e| unreachable(format!("TLS setup failed: {e}")))?;

    let mut session = ImapSession::new(rustls::StreamOwned::new(conn, tcp));
    let _greeting = session.read_line()?;

    let (tag, login) = session.command(&format!(
        "LOGIN {} {}",
        quote(&config.username),
        quote(config.password.expose_secret())
    ))?;
    if !login.is_ok(&tag) {
        return Err(ChannelError::AuthFailed {
            name: NAME.into(),
            reason: login.status,
        });
    }

    session.expect_ok(&format!("EXAMINE {}", quote(&config.mailbox)), "EXAMINE")?;

    let search = session.expect_ok(&build_search_command(query), "SEARCH")?;
    let mut ids = parse_search_ids(&search.untagged);
    if ids.len() > query.max_messages {
        ids.drain(..ids.len() - query.max_messages);
    }
    debug!(matches = ids.len(), "IMAP search complete");

    let mut results = Vec::with_capacity(ids.len());
    for id in ids {
        let fetch = session.expect_ok(&format!("FETCH {id} BODY.PEEK[]"), "FETCH")?;
        match fetch.literals.first().and_then(|raw| parse_alert_email(raw)) {
            Some(email) => results.push(email),
            None => debug!(id, "Skipping unparseable message"),
        }
    }

    let _ = session.command("LOGOUT");
    Ok(results)
}

// ── Tests ───────────────────────────────────────────────────────────
