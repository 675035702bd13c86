//! Ingest pipeline.
//!
//! Each run flows through:
//! 1. `InboxSource::select()`: recent alert emails
//! 2. `parser::parse_alert()`: regex extraction (no LLM)
//! 3. `Persister::persist()`: categorize, then insert with dedup
//!
//! Messages are handled one at a time; one bad message never stops a run.

pub mod categorizer;
pub mod driver;
pub mod parser;
pub mod persister;
pub mod types;

pub use categorizer::Categorizer;
pub use driver::IngestPipeline;
pub use persister::Persister;
pub use types::{BudgetType, Category, ParsedTransaction, RunSummary, StoredTransaction};
