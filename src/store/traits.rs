//! `TransactionStore` trait: the single write interface the persister uses.

use async_trait::async_trait;

use crate::error::DatabaseError;
use crate::pipeline::types::StoredTransaction;

/// What happened to an insert the store did answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    /// A new row was created (HTTP 201).
    Inserted,
    /// A uniqueness constraint rejected the row (HTTP 409): already imported.
    Conflict,
    /// Any other answer.
    Rejected { status: u16, detail: String },
}

/// Backend-agnostic transaction sink.
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    /// Insert one row. Transport failures are `Err`; every answer the
    /// backend gives is an `InsertOutcome`.
    async fn insert_transaction(
        &self,
        transaction: &StoredTransaction,
    ) -> Result<InsertOutcome, DatabaseError>;
}
