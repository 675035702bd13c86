//! Inbox abstraction: the message selector's contract.
//!
//! An `InboxSource` answers one question: which alert messages arrived in
//! this window from these senders? Bodies come back as plain text, untouched.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ChannelError;

/// One selected alert email.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertEmail {
    /// Message-ID header (or a generated id when missing).
    pub message_id: String,
    /// Sender address.
    pub sender: String,
    pub subject: String,
    /// Plain-text body.
    pub body: String,
    pub received_at: DateTime<Utc>,
}

/// What to select.
#[derive(Debug, Clone)]
pub struct InboxQuery {
    /// Sender addresses or `@domain` patterns; any one matches.
    pub senders: Vec<String>,
    /// Text terms; any one matches.
    pub terms: Vec<String>,
    /// Only messages received at or after this instant.
    pub since: DateTime<Utc>,
    /// Cap on returned messages, most recent kept.
    pub max_messages: usize,
}

impl InboxQuery {
    /// Query for the last `window`, ending now.
    pub fn recent(
        senders: Vec<String>,
        terms: Vec<String>,
        window: Duration,
        max_messages: usize,
    ) -> Self {
        // A window reaching past the earliest timestamp selects everything.
        let since = chrono::Duration::from_std(window)
            .ok()
            .and_then(|w| Utc::now().checked_sub_signed(w))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        Self {
            senders,
            terms,
            since,
            max_messages,
        }
    }

    /// Whether a received-at timestamp falls inside the window.
    pub fn in_window(&self, received_at: DateTime<Utc>) -> bool {
        received_at >= self.since
    }
}

/// Read-only source of alert emails.
#[async_trait]
pub trait InboxSource: Send + Sync {
    /// Inbox name, for logs.
    fn name(&self) -> &str;

    /// Return every message matching `query`, oldest first.
    async fn select(&self, query: &InboxQuery) -> Result<Vec<AlertEmail>, ChannelError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recent_window_ends_now() {
        let query = InboxQuery::recent(vec![], vec![], Duration::from_secs(3600), 10);
        let age = Utc::now() - query.since;
        assert!(age >= chrono::Duration::minutes(59));
        assert!(age <= chrono::Duration::minutes(61));
    }

    #[test]
    fn unrepresentable_window_widens_instead_of_shrinking() {
        let query = InboxQuery::recent(vec![], vec![], Duration::MAX, 10);
        assert_eq!(query.since, DateTime::<Utc>::MIN_UTC);
        assert!(query.in_window(Utc::now() - chrono::Duration::days(365 * 100)));
    }

    #[test]
    fn in_window_boundaries() {
        let query = InboxQuery::recent(vec![], vec![], Duration::from_secs(3600), 10);
        assert!(query.in_window(Utc::now()));
        assert!(query.in_window(query.since));
        assert!(!query.in_window(query.since - chrono::Duration::seconds(1)));
    }
}
