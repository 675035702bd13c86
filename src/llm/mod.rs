//! Text-generation integration.
//!
//! The categorizer talks to an `LlmProvider`. The only production backend is
//! Gemini's `generateContent` endpoint, reached with reqwest.

pub mod gemini;
pub mod provider;

pub use gemini::GeminiProvider;
pub use provider::*;

use std::sync::Arc;

use crate::error::ConfigError;

/// Configuration for creating an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: secrecy::SecretString,
    pub model: String,
}

impl LlmConfig {
    /// Build from `GEMINI_*` variables.
    pub fn from_lookup(lookup: crate::config::Lookup<'_>) -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: lookup("GEMINI_BASE_URL")
                .unwrap_or_else(|| gemini::DEFAULT_BASE_URL.to_string()),
            api_key: secrecy::SecretString::from(crate::config::required(lookup, "GEMINI_API_KEY")?),
            model: lookup("GEMINI_MODEL").unwrap_or_else(|| "gemini-1.5-flash".to_string()),
        })
    }
}

/// Create an LLM provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Arc<dyn LlmProvider> {
    tracing::info!("Using Gemini (model: {})", config.model);
    Arc::new(GeminiProvider::new(
        config.base_url.clone(),
        config.model.clone(),
        config.api_key.clone(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn config_requires_api_key() {
        let env: HashMap<&str, &str> = HashMap::new();
        let lookup = |k: &str| env.get(k).map(|v| v.to_string());
        assert!(matches!(
            LlmConfig::from_lookup(&lookup),
            Err(ConfigError::MissingEnvVar(var)) if var == "GEMINI_API_KEY"
        ));
    }

    #[test]
    fn config_defaults_model_and_url() {
        let env = HashMap::from([("GEMINI_API_KEY", "k")]);
        let lookup = |k: &str| env.get(k).map(|v| v.to_string());
        let config = LlmConfig::from_lookup(&lookup).unwrap();
        assert_eq!(config.model, "gemini-1.5-flash");
        assert_eq!(config.base_url, gemini::DEFAULT_BASE_URL);
    }

    #[test]
    fn create_provider_reports_model() {
        let env = HashMap::from([("GEMINI_API_KEY", "k"), ("GEMINI_MODEL", "gemini-2.0-flash")]);
        let lookup = |k: &str| env.get(k).map(|v| v.to_string());
        let provider = create_provider(&LlmConfig::from_lookup(&lookup).unwrap());
        assert_eq!(provider.model_name(), "gemini-2.0-flash");
    }
}
