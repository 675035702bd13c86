//! Persistence layer: where parsed transactions end up.
//!
//! `rest` writes to the hosted table; `libsql` keeps a local database with
//! the same dedup rule.

pub mod libsql_backend;
pub mod migrations;
pub mod rest;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use rest::RestStore;
pub use traits::{InsertOutcome, TransactionStore};

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;

use crate::auth::{CachedToken, PasswordGrant, StaticToken, TokenSource};
use crate::config::{Lookup, parse_or, required};
use crate::error::{ConfigError, DatabaseError};

/// Where transactions are written.
#[derive(Debug, Clone)]
pub enum StoreConfig {
    Rest(RestConfig),
    Local { path: PathBuf },
}

/// Hosted table settings.
#[derive(Debug, Clone)]
pub struct RestConfig {
    pub base_url: String,
    pub table: String,
    pub api_key: SecretString,
    /// Optional user sign-in; without it the API key doubles as bearer token.
    pub login: Option<(String, SecretString)>,
    pub token_ttl: Duration,
}

impl StoreConfig {
    pub fn from_lookup(lookup: Lookup<'_>) -> Result<Self, ConfigError> {
        match lookup("INGEST_STORE").as_deref().unwrap_or("rest") {
            "rest" => {
                let login = match (lookup("SUPABASE_USER_EMAIL"), lookup("SUPABASE_USER_PASSWORD")) {
                    (Some(email), Some(password)) => Some((email, SecretString::from(password))),
                    (None, None) => None,
                    (Some(_), None) => {
                        return Err(ConfigError::MissingEnvVar("SUPABASE_USER_PASSWORD".into()));
                    }
                    (None, Some(_)) => {
                        return Err(ConfigError::MissingEnvVar("SUPABASE_USER_EMAIL".into()));
                    }
                };
                Ok(Self::Rest(RestConfig {
                    base_url: required(lookup, "SUPABASE_URL")?,
                    table: lookup("SUPABASE_TABLE").unwrap_or_else(|| "transactions".into()),
                    api_key: SecretString::from(required(lookup, "SUPABASE_ANON_KEY")?),
                    login,
                    token_ttl: Duration::from_secs(parse_or(lookup, "SUPABASE_TOKEN_TTL_SECS", 3600)?),
                }))
            }
            "local" => Ok(Self::Local {
                path: lookup("INGEST_DB_PATH")
                    .unwrap_or_else(|| "./data/alert-ingest.db".into())
                    .into(),
            }),
            other => Err(ConfigError::InvalidValue {
                key: "INGEST_STORE".into(),
                message: format!("unknown store {other:?}, expected \"rest\" or \"local\""),
            }),
        }
    }
}

/// Build the configured store.
pub async fn create_store(config: &StoreConfig) -> Result<Arc<dyn TransactionStore>, DatabaseError> {
    match config {
        StoreConfig::Rest(rest) => {
            let tokens: Arc<dyn TokenSource> = match &rest.login {
                Some((email, password)) => Arc::new(CachedToken::new(
                    Arc::new(PasswordGrant::new(
                        rest.base_url.clone(),
                        rest.api_key.clone(),
                        email.clone(),
                        password.clone(),
                    )),
                    rest.token_ttl,
                )),
                None => Arc::new(StaticToken::new(rest.api_key.clone())),
            };
            tracing::info!(table = %rest.table, "Using REST transaction store");
            Ok(Arc::new(RestStore::new(
                rest.base_url.clone(),
                rest.table.clone(),
                rest.api_key.clone(),
                tokens,
            )))
        }
        StoreConfig::Local { path } => Ok(Arc::new(LibSqlBackend::new_local(path).await?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(env: HashMap<&'static str, &'static str>) -> impl Fn(&str) -> Option<String> {
        move |k: &str| env.get(k).map(|v| v.to_string())
    }

    #[test]
    fn rest_is_default() {
        let lookup = lookup_from(HashMap::from([
            ("SUPABASE_URL", "https://proj.supabase.co"),
            ("SUPABASE_ANON_KEY", "anon"),
        ]));
        match StoreConfig::from_lookup(&lookup).unwrap() {
            StoreConfig::Rest(rest) => {
                assert_eq!(rest.table, "transactions");
                assert!(rest.login.is_none());
                assert_eq!(rest.token_ttl, Duration::from_secs(3600));
            }
            other => panic!("expected rest store, got {other:?}"),
        }
    }

    #[test]
    fn local_store_needs_no_credentials() {
        let lookup = lookup_from(HashMap::from([("INGEST_STORE", "local")]));
        assert!(matches!(
            StoreConfig::from_lookup(&lookup).unwrap(),
            StoreConfig::Local { .. }
        ));
    }

    #[test]
    fn half_configured_login_rejected() {
        let lookup = lookup_from(HashMap::from([
            ("SUPABASE_URL", "https://proj.supabase.co"),
            ("SUPABASE_ANON_KEY", "anon"),
            ("SUPABASE_USER_EMAIL", "me@example.com"),
        ]));
        assert!(matches!(
            StoreConfig::from_lookup(&lookup),
            Err(ConfigError::MissingEnvVar(k)) if k == "SUPABASE_USER_PASSWORD"
        ));
    }

    #[test]
    fn unknown_store_rejected() {
        let lookup = lookup_from(HashMap::from([("INGEST_STORE", "postgres")]));
        assert!(StoreConfig::from_lookup(&lookup).is_err());
    }

    #[tokio::test]
    async fn create_local_store() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig::Local {
            path: dir.path().join("ingest.db"),
        };
        let store = create_store(&config).await.unwrap();
        assert_eq!(store.name(), "libsql");
    }
}
