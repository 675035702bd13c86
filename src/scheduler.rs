//! Cron-driven ingest loop.
//!
//! Runs are awaited in the loop body, so a slow run delays the next one
//! instead of overlapping it. Ticks missed while a run was in flight are
//! dropped; the next fire time is always computed after the run ends.

use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::error::PipelineError;
use crate::pipeline::driver::IngestPipeline;

/// Parse a cron expression.
pub fn parse_schedule(schedule: &str) -> Result<cron::Schedule, PipelineError> {
    cron::Schedule::from_str(schedule)
        .map_err(|e| PipelineError::Schedule(format!("invalid cron {schedule:?}: {e}")))
}

/// Parse a cron expression and compute the next fire time from now.
pub fn next_fire(schedule: &str) -> Result<Option<DateTime<Utc>>, PipelineError> {
    Ok(parse_schedule(schedule)?.upcoming(Utc).next())
}

/// Spawn the scheduler. Set the returned flag to stop after the current wait.
pub fn spawn_ingest_scheduler(
    pipeline: Arc<IngestPipeline>,
    schedule: cron::Schedule,
) -> (JoinHandle<()>, Arc<AtomicBool>) {
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = Arc::clone(&shutdown);

    let handle = tokio::spawn(async move {
        info!(schedule = %schedule, "Ingest scheduler started");

        loop {
            let Some(next) = schedule.upcoming(Utc).next() else {
                warn!("Schedule has no future fire times, stopping");
                return;
            };
            let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            tokio::time::sleep(wait).await;

            if shutdown.load(Ordering::Relaxed) {
                info!("Ingest scheduler shutting down");
                return;
            }

            match pipeline.run().await {
                Ok(summary) => info!(
                    fired_at = %next,
                    saved = summary.saved,
                    "Scheduled run finished"
                ),
                Err(e) => error!(fired_at = %next, error = %e, "Scheduled run failed"),
            }
        }
    });

    (handle, shutdown_flag)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;

    use crate::channels::inbox::{AlertEmail, InboxQuery, InboxSource};
    use crate::config::SelectorConfig;
    use crate::error::{ChannelError, DatabaseError, LlmError};
    use crate::llm::provider::{CompletionRequest, CompletionResponse, LlmProvider};
    use crate::pipeline::categorizer::Categorizer;
    use crate::pipeline::persister::Persister;
    use crate::pipeline::types::StoredTransaction;
    use crate::store::traits::{InsertOutcome, TransactionStore};

    #[derive(Default)]
    struct CountingInbox {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl InboxSource for CountingInbox {
        fn name(&self) -> &str {
            "counting"
        }

        async fn select(&self, _query: &InboxQuery) -> Result<Vec<AlertEmail>, ChannelError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }
    }

    struct UnusedLlm;

    #[async_trait]
    impl LlmProvider for UnusedLlm {
        fn model_name(&self) -> &str {
            "unused"
        }

        async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
            Err(LlmError::RequestFailed {
                provider: "unused".into(),
                reason: "not expected".into(),
            })
        }
    }

    struct UnusedStore;

    #[async_trait]
    impl TransactionStore for UnusedStore {
        fn name(&self) -> &str {
            "unused"
        }

        async fn insert_transaction(
            &self,
            _transaction: &StoredTransaction,
        ) -> Result<InsertOutcome, DatabaseError> {
            Ok(InsertOutcome::Inserted)
        }
    }

    #[test]
    fn next_fire_valid() {
        let next = next_fire("0 0 * * * *").unwrap().unwrap();
        assert!(next > Utc::now());
        assert!(next - Utc::now() <= chrono::Duration::hours(1));
    }

    #[test]
    fn next_fire_invalid() {
        assert!(matches!(
            next_fire("not a cron"),
            Err(PipelineError::Schedule(_))
        ));
    }

    #[tokio::test]
    async fn scheduler_fires_and_stops() {
        let inbox = Arc::new(CountingInbox::default());
        let pipeline = Arc::new(IngestPipeline::new(
            inbox.clone(),
            Persister::new(Categorizer::new(Arc::new(UnusedLlm)), Arc::new(UnusedStore)),
            SelectorConfig {
                senders: vec![],
                terms: vec![],
                window: Duration::from_secs(3600),
                max_messages: 10,
            },
        ));

        let (handle, shutdown) =
            spawn_ingest_scheduler(pipeline, parse_schedule("* * * * * *").unwrap());
        tokio::time::sleep(Duration::from_millis(2500)).await;
        shutdown.store(true, Ordering::Relaxed);
        tokio::time::timeout(Duration::from_secs(3), handle)
            .await
            .expect("scheduler stops")
            .unwrap();

        assert!(inbox.calls.load(Ordering::SeqCst) >= 1);
    }
}
