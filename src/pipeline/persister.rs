//! Persister: validates a parsed alert, categorizes it and writes it.
//!
//! Returns `true` only when a new row was created. Conflicts, rejected
//! inserts and transport failures are logged and come back as `false`.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::pipeline::categorizer::Categorizer;
use crate::pipeline::types::{ParsedTransaction, StoredTransaction};
use crate::store::traits::{InsertOutcome, TransactionStore};

pub struct Persister {
    categorizer: Categorizer,
    store: Arc<dyn TransactionStore>,
}

impl Persister {
    pub fn new(categorizer: Categorizer, store: Arc<dyn TransactionStore>) -> Self {
        Self { categorizer, store }
    }

    /// Persist one parsed alert. `true` means a new row exists.
    pub async fn persist(&self, parsed: &ParsedTransaction) -> bool {
        let (Some(amount), Some(date)) = (parsed.amount, parsed.date.as_deref()) else {
            warn!(amount = ?parsed.amount, date = ?parsed.date, "Missing amount or date, not saving");
            return false;
        };
        let Some(iso_date) = to_iso_date(date) else {
            warn!(date, "Unrecognised date shape, not saving");
            return false;
        };

        let category = self
            .categorizer
            .categorize(parsed.merchant.as_deref(), amount)
            .await;

        let transaction = StoredTransaction {
            amount,
            merchant: parsed.merchant.clone(),
            date: iso_date,
            time: parsed.time.clone(),
            category,
            budget_type: category.map(|c| c.budget_type()),
        };

        match self.store.insert_transaction(&transaction).await {
            Ok(InsertOutcome::Inserted) => {
                info!(
                    amount = %transaction.amount,
                    merchant = transaction.merchant.as_deref().unwrap_or(""),
                    category = transaction.category.map(|c| c.label()).unwrap_or("none"),
                    "Saved {}",
                    transaction.describe()
                );
                true
            }
            Ok(InsertOutcome::Conflict) => {
                info!(
                    date = %transaction.date,
                    "Already imported {}, skipping",
                    transaction.describe()
                );
                false
            }
            Ok(InsertOutcome::Rejected { status, detail }) => {
                error!(
                    store = self.store.name(),
                    status,
                    detail = %detail,
                    "Store rejected {}",
                    transaction.describe()
                );
                false
            }
            Err(e) => {
                error!(
                    store = self.store.name(),
                    error = %e,
                    "Failed to save {}",
                    transaction.describe()
                );
                false
            }
        }
    }
}

/// `DD-MM-YYYY` / `DD-MM-YY` → `YYYY-MM-DD`.
///
/// Requires exactly three `-`-separated parts; two-digit years get a `20`
/// prefix.
pub fn to_iso_date(date: &str) -> Option<String> {
    let parts: Vec<&str> = date.split('-').collect();
    let [day, month, year] = parts.as_slice() else {
        return None;
    };
    let year = if year.len() == 2 {
        format!("20{year}")
    } else {
        year.to_string()
    };
    Some(format!("{year}-{month}-{day}"))
}
