//! libSQL backend: local `TransactionStore` implementation.
//!
//! Same dedup contract as the REST table: a unique index on
//! `(date, amount, merchant)` turns a repeat insert into `Conflict`.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use libsql::{Connection, Database as LibSqlDatabase, params};
use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::error::DatabaseError;
use crate::pipeline::types::{BudgetType, Category, StoredTransaction};
use crate::store::migrations;
use crate::store::traits::{InsertOutcome, TransactionStore};

/// libSQL database backend.
///
/// Holds a single connection reused for all operations.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db).await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;
        Self::from_database(db).await
    }

    async fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        migrations::run_migrations(&conn).await?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    /// All stored transactions, oldest first.
    pub async fn list_transactions(&self) -> Result<Vec<StoredTransaction>, DatabaseError> {
        let mut rows = self
            .conn
            .query(
                "SELECT amount, merchant, date, time, category, budget_type
                 FROM transactions ORDER BY id",
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_transactions: {e}")))?;

        let mut out = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_transactions: {e}")))?
        {
            out.push(row_to_transaction(&row)?);
        }
        Ok(out)
    }
}

fn opt_text(value: Option<&str>) -> libsql::Value {
    match value {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

/// Map a row (column order of `list_transactions`) to a `StoredTransaction`.
fn row_to_transaction(row: &libsql::Row) -> Result<StoredTransaction, DatabaseError> {
    // NULL columns come back as a type error; treat them as absent.
    let text = |idx: i32| row.get::<String>(idx).ok();

    let amount_str: String = row
        .get(0)
        .map_err(|e| DatabaseError::Serialization(format!("amount column: {e}")))?;
    let amount: Decimal = amount_str
        .parse()
        .map_err(|e| DatabaseError::Serialization(format!("amount {amount_str:?}: {e}")))?;

    let category = text(4).as_deref().and_then(Category::from_label);
    let budget_type = match text(5).as_deref() {
        Some("need") => Some(BudgetType::Need),
        Some("want") => Some(BudgetType::Want),
        _ => None,
    };

    Ok(StoredTransaction {
        amount,
        merchant: text(1),
        date: text(2).unwrap_or_default(),
        time: text(3),
        category,
        budget_type,
    })
}

#[async_trait]
impl TransactionStore for LibSqlBackend {
    fn name(&self) -> &str {
        "libsql"
    }

    async fn insert_transaction(
        &self,
        transaction: &StoredTransaction,
    ) -> Result<InsertOutcome, DatabaseError> {
        // Normalised so 2500 and 2500.00 collide on the unique index.
        let amount = transaction.amount.normalize().to_string();
        let changed = self
            .conn
            .execute(
                "INSERT INTO transactions (amount, merchant, date, time, category, budget_type, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT DO NOTHING",
                params![
                    amount,
                    opt_text(transaction.merchant.as_deref()),
                    transaction.date.clone(),
                    opt_text(transaction.time.as_deref()),
                    opt_text(transaction.category.map(|c| c.label())),
                    opt_text(transaction.budget_type.map(|b| b.as_str())),
                    Utc::now().to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_transaction: {e}")))?;

        debug!(changed, date = %transaction.date, "Local insert");
        Ok(if changed == 0 {
            InsertOutcome::Conflict
        } else {
            InsertOutcome::Inserted
        })
    }
}
