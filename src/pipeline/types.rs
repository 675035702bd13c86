//! Shared types for the alert ingestion pipeline.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ── Categories ──────────────────────────────────────────────────────

/// Closed set of spending categories the classifier may return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Groceries,
    Health,
    Bills,
    Investments,
    Food,
    Shopping,
    Entertainment,
    Travel,
}

impl Category {
    /// Every category, in prompt order.
    pub const ALL: [Category; 8] = [
        Self::Groceries,
        Self::Health,
        Self::Bills,
        Self::Investments,
        Self::Food,
        Self::Shopping,
        Self::Entertainment,
        Self::Travel,
    ];

    /// Label as stored and as shown to the classifier.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Groceries => "Groceries",
            Self::Health => "Health",
            Self::Bills => "Bills",
            Self::Investments => "Investments",
            Self::Food => "Food",
            Self::Shopping => "Shopping",
            Self::Entertainment => "Entertainment",
            Self::Travel => "Travel",
        }
    }

    /// Case-insensitive lookup. Anything outside the set is `None`.
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.label().eq_ignore_ascii_case(label))
    }

    /// Static category → budget type table.
    pub fn budget_type(&self) -> BudgetType {
        match self {
            Self::Groceries | Self::Health | Self::Bills | Self::Investments => BudgetType::Need,
            Self::Food | Self::Shopping | Self::Entertainment | Self::Travel => BudgetType::Want,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Whether spending in a category is essential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetType {
    Need,
    Want,
}

impl BudgetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Need => "need",
            Self::Want => "want",
        }
    }
}

// ── Parsed transaction ──────────────────────────────────────────────

/// Fields pulled out of one alert email. Every field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedTransaction {
    pub amount: Option<Decimal>,
    pub merchant: Option<String>,
    /// `DD-MM-YYYY` or `DD-MM-YY`, exactly as found in the alert.
    pub date: Option<String>,
    /// `HH:MM:SS`.
    pub time: Option<String>,
    pub is_expense: bool,
}

impl ParsedTransaction {
    /// Whether the driver should hand this record to the persister.
    pub fn is_importable(&self) -> bool {
        self.amount.is_some() && self.is_expense
    }
}

// ── Stored transaction ──────────────────────────────────────────────

/// Row written to the transactions table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredTransaction {
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub merchant: Option<String>,
    /// ISO `YYYY-MM-DD`.
    pub date: String,
    pub time: Option<String>,
    pub category: Option<Category>,
    pub budget_type: Option<BudgetType>,
}

impl StoredTransaction {
    /// Short human description used in log lines, e.g. `2500.00 at SWIGGY`.
    pub fn describe(&self) -> String {
        format!(
            "{} at {}",
            self.amount,
            self.merchant.as_deref().unwrap_or("unknown merchant")
        )
    }
}

// ── Run summary ─────────────────────────────────────────────────────

/// Counters for one ingest run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Messages returned by the selector.
    pub selected: usize,
    /// Messages that parsed into an expense with an amount.
    pub parsed_expenses: usize,
    /// New rows written.
    pub saved: usize,
    /// Expenses not written (duplicate, invalid date, store failure).
    pub skipped: usize,
    /// Messages that were not importable expenses.
    pub ignored: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn category_labels_roundtrip_case_insensitive() {
        for category in Category::ALL {
            assert_eq!(Category::from_label(category.label()), Some(category));
            assert_eq!(
                Category::from_label(&category.label().to_uppercase()),
                Some(category)
            );
        }
    }

    #[test]
    fn unknown_label_is_none() {
        assert_eq!(Category::from_label("Fuel"), None);
        assert_eq!(Category::from_label(""), None);
    }

    #[test]
    fn budget_type_table() {
        assert_eq!(Category::Groceries.budget_type(), BudgetType::Need);
        assert_eq!(Category::Health.budget_type(), BudgetType::Need);
        assert_eq!(Category::Bills.budget_type(), BudgetType::Need);
        assert_eq!(Category::Investments.budget_type(), BudgetType::Need);
        assert_eq!(Category::Food.budget_type(), BudgetType::Want);
        assert_eq!(Category::Shopping.budget_type(), BudgetType::Want);
        assert_eq!(Category::Entertainment.budget_type(), BudgetType::Want);
        assert_eq!(Category::Travel.budget_type(), BudgetType::Want);
    }

    #[test]
    fn importable_requires_amount_and_debit() {
        let mut tx = ParsedTransaction {
            amount: Some(dec!(10)),
            is_expense: true,
            ..Default::default()
        };
        assert!(tx.is_importable());
        tx.is_expense = false;
        assert!(!tx.is_importable());
        tx.is_expense = true;
        tx.amount = None;
        assert!(!tx.is_importable());
    }

    #[test]
    fn stored_transaction_json_shape() {
        let tx = StoredTransaction {
            amount: dec!(2500.00),
            merchant: Some("SWIGGY".into()),
            date: "2024-03-15".into(),
            time: Some("14:30:00".into()),
            category: Some(Category::Food),
            budget_type: Some(BudgetType::Want),
        };
        let json = serde_json::to_value(&tx).unwrap();
        assert_eq!(json["amount"], serde_json::json!(2500.0));
        assert_eq!(json["merchant"], "SWIGGY");
        assert_eq!(json["date"], "2024-03-15");
        assert_eq!(json["category"], "Food");
        assert_eq!(json["budget_type"], "want");
    }

    #[test]
    fn stored_transaction_nulls_serialized() {
        let tx = StoredTransaction {
            amount: dec!(99.5),
            merchant: None,
            date: "2024-01-02".into(),
            time: None,
            category: None,
            budget_type: None,
        };
        let json = serde_json::to_value(&tx).unwrap();
        assert!(json["category"].is_null());
        assert!(json["budget_type"].is_null());
        assert!(json["merchant"].is_null());
    }

    #[test]
    fn describe_includes_amount_and_merchant() {
        let tx = StoredTransaction {
            amount: dec!(2500.00),
            merchant: Some("SWIGGY".into()),
            date: "2024-03-15".into(),
            time: None,
            category: None,
            budget_type: None,
        };
        assert_eq!(tx.describe(), "2500.00 at SWIGGY");
    }
}
