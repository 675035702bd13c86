//! REST table backend (PostgREST-style, as exposed by Supabase).
//!
//! `POST {base}/rest/v1/{table}` with `apikey`, a bearer token and
//! `Prefer: return=minimal`. The status code is the only signal read back.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, warn};

use crate::auth::TokenSource;
use crate::error::DatabaseError;
use crate::pipeline::types::StoredTransaction;
use crate::store::traits::{InsertOutcome, TransactionStore};

pub struct RestStore {
    client: reqwest::Client,
    base_url: String,
    table: String,
    api_key: SecretString,
    tokens: Arc<dyn TokenSource>,
}

impl RestStore {
    pub fn new(
        base_url: impl Into<String>,
        table: impl Into<String>,
        api_key: SecretString,
        tokens: Arc<dyn TokenSource>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            table: table.into(),
            api_key,
            tokens,
        }
    }

    /// Table resource URL.
    pub fn endpoint(&self) -> String {
        format!("{}/rest/v1/{}", self.base_url, self.table)
    }
}

/// Map a storage response status to an outcome.
pub fn outcome_for_status(status: StatusCode, body: String) -> InsertOutcome {
    match status {
        StatusCode::CREATED => InsertOutcome::Inserted,
        StatusCode::CONFLICT => InsertOutcome::Conflict,
        other => InsertOutcome::Rejected {
            status: other.as_u16(),
            detail: body,
        },
    }
}

#[async_trait]
impl TransactionStore for RestStore {
    fn name(&self) -> &str {
        "rest"
    }

    async fn insert_transaction(
        &self,
        transaction: &StoredTransaction,
    ) -> Result<InsertOutcome, DatabaseError> {
        let endpoint = self.endpoint();
        let token = self.tokens.token(false).await?;

        let response = self
            .client
            .post(&endpoint)
            .header("apikey", self.api_key.expose_secret())
            .bearer_auth(token.expose_secret())
            .header("Prefer", "return=minimal")
            .json(transaction)
            .send()
            .await
            .map_err(|e| DatabaseError::Request {
                endpoint: endpoint.clone(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        let body = if status == StatusCode::CREATED {
            String::new()
        } else {
            response.text().await.unwrap_or_default()
        };

        if status == StatusCode::UNAUTHORIZED {
            warn!(endpoint = %endpoint, "Bearer token rejected, dropping cached token");
            self.tokens.invalidate().await;
        }

        debug!(status = status.as_u16(), "Insert answered");
        Ok(outcome_for_status(status, body))
    }
}
