//! Pipeline driver: one ingest run from inbox to store.

use std::sync::Arc;

use tracing::{debug, info};

use crate::channels::inbox::{InboxQuery, InboxSource};
use crate::config::SelectorConfig;
use crate::error::PipelineError;
use crate::pipeline::parser::parse_alert;
use crate::pipeline::persister::Persister;
use crate::pipeline::types::RunSummary;

pub struct IngestPipeline {
    inbox: Arc<dyn InboxSource>,
    persister: Persister,
    selector: SelectorConfig,
}

impl IngestPipeline {
    pub fn new(inbox: Arc<dyn InboxSource>, persister: Persister, selector: SelectorConfig) -> Self {
        Self {
            inbox,
            persister,
            selector,
        }
    }

    /// Run one batch.
    ///
    /// Only a selection failure aborts the run. Every other failure is
    /// absorbed per message and shows up as `skipped`.
    pub async fn run(&self) -> Result<RunSummary, PipelineError> {
        let query = InboxQuery::recent(
            self.selector.senders.clone(),
            self.selector.terms.clone(),
            self.selector.window,
            self.selector.max_messages,
        );

        let emails = self.inbox.select(&query).await?;
        let mut summary = RunSummary {
            selected: emails.len(),
            ..RunSummary::default()
        };

        for email in &emails {
            let parsed = parse_alert(&email.body);
            if !parsed.is_importable() {
                debug!(
                    message_id = %email.message_id,
                    subject = %email.subject,
                    "Not an importable debit alert"
                );
                summary.ignored += 1;
                continue;
            }

            summary.parsed_expenses += 1;
            if self.persister.persist(&parsed).await {
                summary.saved += 1;
            } else {
                summary.skipped += 1;
            }
        }

        info!(
            inbox = self.inbox.name(),
            selected = summary.selected,
            saved = summary.saved,
            skipped = summary.skipped,
            ignored = summary.ignored,
            "Ingest run complete"
        );
        Ok(summary)
    }
}
