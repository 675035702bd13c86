//! Merchant categorizer: one-word LLM classification into the fixed set.
//!
//! Never fails: a missing merchant, a transport error, a malformed response
//! or an answer outside the set all come back as `None`.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::llm::provider::{ChatMessage, CompletionRequest, LlmProvider};
use crate::pipeline::types::Category;

/// Temperature for classification (deterministic-ish).
const CLASSIFY_TEMPERATURE: f32 = 0.0;

/// One word is all we read back.
const CLASSIFY_MAX_TOKENS: u32 = 10;

const CLASSIFY_INSTRUCTION: &str =
    "You categorize bank debit transactions. Answer with a single category name.";

pub struct Categorizer {
    llm: Arc<dyn LlmProvider>,
}

impl Categorizer {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    /// Classify a merchant. `None` merchant never reaches the provider.
    pub async fn categorize(&self, merchant: Option<&str>, amount: Decimal) -> Option<Category> {
        let merchant = merchant?;

        let request = CompletionRequest::new(vec![
            ChatMessage::system(CLASSIFY_INSTRUCTION),
            ChatMessage::user(build_prompt(merchant, amount)),
        ])
        .with_temperature(CLASSIFY_TEMPERATURE)
        .with_max_tokens(CLASSIFY_MAX_TOKENS);

        let response = match self.llm.complete(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(merchant, error = %e, "Categorization failed, storing without category");
                return None;
            }
        };
        debug!(
            model = self.llm.model_name(),
            input_tokens = response.input_tokens,
            output_tokens = response.output_tokens,
            finish_reason = ?response.finish_reason,
            "Categorization response"
        );

        let category = parse_category(&response.content);
        match category {
            Some(c) => debug!(merchant, category = %c, "Merchant categorized"),
            None => warn!(
                merchant,
                raw_response = %response.content,
                "Categorization answer outside category set"
            ),
        }
        category
    }
}

/// Build the classification prompt.
pub fn build_prompt(merchant: &str, amount: Decimal) -> String {
    let labels: Vec<&str> = Category::ALL.iter().map(|c| c.label()).collect();
    format!(
        "Categorize this transaction into exactly one of these categories: {}.\n\
         Merchant: {merchant}\n\
         Amount: INR {amount}\n\
         Respond with only the category name, one word, nothing else.",
        labels.join(", ")
    )
}

/// Trim a raw model answer and match it against the closed set.
pub fn parse_category(raw: &str) -> Option<Category> {
    let cleaned = raw
        .trim()
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '`' || c == '*' || c == '.')
        .trim();
    Category::from_label(cleaned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use rust_decimal_macros::dec;

    use crate::error::LlmError;
    use crate::llm::provider::{CompletionResponse, FinishReason, Role};

    /// Mock LLM that returns a fixed answer and records requests.
    struct MockClassifier {
        response: Result<String, ()>,
        requests: Mutex<Vec<CompletionRequest>>,
    }

    impl MockClassifier {
        fn answering(text: &str) -> Arc<Self> {
            Arc::new(Self {
                response: Ok(text.to_string()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                response: Err(()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        /// The user prompt of the first request.
        fn prompt(&self) -> String {
            let requests = self.requests.lock().unwrap();
            requests[0]
                .messages
                .iter()
                .find(|m| m.role == Role::User)
                .map(|m| m.content.clone())
                .unwrap_or_default()
        }
    }

    #[async_trait]
    impl LlmProvider for MockClassifier {
        fn model_name(&self) -> &str {
            "mock-classifier"
        }

        async fn complete(
            &self,
            request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            self.requests.lock().unwrap().push(request);
            match &self.response {
                Ok(text) => Ok(CompletionResponse {
                    content: text.clone(),
                    input_tokens: 42,
                    output_tokens: 1,
                    finish_reason: FinishReason::Stop,
                }),
                Err(()) => Err(LlmError::RequestFailed {
                    provider: "mock".into(),
                    reason: "connection refused".into(),
                }),
            }
        }
    }

    #[tokio::test]
    async fn no_merchant_skips_llm() {
        let llm = MockClassifier::answering("Food");
        let categorizer = Categorizer::new(llm.clone());
        assert_eq!(categorizer.categorize(None, dec!(100)).await, None);
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn valid_answer_maps_to_category() {
        let llm = MockClassifier::answering(" Food\n");
        let categorizer = Categorizer::new(llm.clone());
        assert_eq!(
            categorizer.categorize(Some("SWIGGY"), dec!(2500)).await,
            Some(Category::Food)
        );
        assert_eq!(llm.calls(), 1);
    }

    #[tokio::test]
    async fn out_of_set_answer_is_none() {
        let llm = MockClassifier::answering("Restaurants");
        let categorizer = Categorizer::new(llm);
        assert_eq!(categorizer.categorize(Some("SWIGGY"), dec!(2500)).await, None);
    }

    #[tokio::test]
    async fn empty_answer_is_none() {
        let categorizer = Categorizer::new(MockClassifier::answering("   "));
        assert_eq!(categorizer.categorize(Some("X"), dec!(1)).await, None);
    }

    #[tokio::test]
    async fn provider_error_is_swallowed() {
        let categorizer = Categorizer::new(MockClassifier::failing());
        assert_eq!(categorizer.categorize(Some("SWIGGY"), dec!(2500)).await, None);
    }

    #[tokio::test]
    async fn prompt_lists_categories_merchant_and_amount() {
        let llm = MockClassifier::answering("Travel");
        let categorizer = Categorizer::new(llm.clone());
        categorizer.categorize(Some("IRCTC"), dec!(845.50)).await;

        let prompt = llm.prompt();
        for category in Category::ALL {
            assert!(prompt.contains(category.label()), "missing {category}");
        }
        assert!(prompt.contains("IRCTC"));
        assert!(prompt.contains("845.50"));
    }

    #[tokio::test]
    async fn request_is_instruction_then_prompt() {
        let llm = MockClassifier::answering("Food");
        let categorizer = Categorizer::new(llm.clone());
        categorizer.categorize(Some("SWIGGY"), dec!(2500)).await;

        let requests = llm.requests.lock().unwrap();
        let roles: Vec<Role> = requests[0].messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User]);
        assert_eq!(requests[0].messages[0].content, CLASSIFY_INSTRUCTION);
        assert!(requests[0].messages[1].content.contains("SWIGGY"));
        assert_eq!(requests[0].temperature, Some(0.0));
        assert_eq!(requests[0].max_tokens, Some(10));
    }

    #[tokio::test]
    async fn usage_and_finish_reason_logged_at_debug() {
        #[derive(Clone, Default)]
        struct Captured(Arc<Mutex<Vec<u8>>>);

        impl std::io::Write for Captured {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                self.0.lock().unwrap().extend_from_slice(buf);
                Ok(buf.len())
            }

            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let logs = Captured::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let categorizer = Categorizer::new(MockClassifier::answering("Food"));
        categorizer.categorize(Some("SWIGGY"), dec!(2500)).await;

        let output = String::from_utf8_lossy(&logs.0.lock().unwrap()).into_owned();
        let line = output
            .lines()
            .find(|l| l.contains("Categorization response"))
            .expect("usage line logged");
        assert!(line.contains("input_tokens=42"), "line: {line}");
        assert!(line.contains("output_tokens=1"), "line: {line}");
        assert!(line.contains("finish_reason=Stop"), "line: {line}");
    }

    #[test]
    fn parse_category_tolerates_wrapping() {
        assert_eq!(parse_category("\"Groceries\""), Some(Category::Groceries));
        assert_eq!(parse_category("**Bills**"), Some(Category::Bills));
        assert_eq!(parse_category("health."), Some(Category::Health));
        assert_eq!(parse_category("Food and Drinks"), None);
        assert_eq!(parse_category("{\"category\": \"Food\"}"), None);
    }
}
