//! Bearer-token sources for the storage endpoint.
//!
//! `StaticToken` hands out a fixed key. `CachedToken` wraps a fetcher and
//! keeps the last token until its expiry, with a forced-refresh path for
//! when the server rejects it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::AuthError;

/// Something that can produce a bearer token.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Current token. `force_refresh` bypasses any cache.
    async fn token(&self, force_refresh: bool) -> Result<SecretString, AuthError>;

    /// Drop any cached token so the next call fetches a fresh one.
    async fn invalidate(&self) {}
}

/// Fixed token, e.g. a project anon key.
pub struct StaticToken(SecretString);

impl StaticToken {
    pub fn new(token: SecretString) -> Self {
        Self(token)
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn token(&self, _force_refresh: bool) -> Result<SecretString, AuthError> {
        Ok(self.0.clone())
    }
}

/// A freshly issued token and how long the issuer says it lives.
pub struct IssuedToken {
    pub token: SecretString,
    pub expires_in: Option<Duration>,
}

/// Issues new tokens on demand.
#[async_trait]
pub trait TokenFetcher: Send + Sync {
    async fn fetch(&self) -> Result<IssuedToken, AuthError>;
}

struct CachedEntry {
    token: SecretString,
    expires_at: Instant,
}

/// Token cache with an explicit TTL.
///
/// The effective lifetime is the shorter of `ttl` and the issuer's
/// `expires_in`, less `skew`.
pub struct CachedToken {
    fetcher: Arc<dyn TokenFetcher>,
    ttl: Duration,
    skew: Duration,
    entry: Mutex<Option<CachedEntry>>,
}

impl CachedToken {
    pub fn new(fetcher: Arc<dyn TokenFetcher>, ttl: Duration) -> Self {
        Self {
            fetcher,
            ttl,
            skew: Duration::from_secs(30),
            entry: Mutex::new(None),
        }
    }

    pub fn with_skew(mut self, skew: Duration) -> Self {
        self.skew = skew;
        self
    }
}

#[async_trait]
impl TokenSource for CachedToken {
    async fn token(&self, force_refresh: bool) -> Result<SecretString, AuthError> {
        let mut entry = self.entry.lock().await;

        if !force_refresh
            && let Some(cached) = entry.as_ref()
            && Instant::now() < cached.expires_at
        {
            return Ok(cached.token.clone());
        }

        let issued = self.fetcher.fetch().await?;
        let lifetime = issued
            .expires_in
            .map_or(self.ttl, |issuer| issuer.min(self.ttl))
            .saturating_sub(self.skew);

        debug!(lifetime_secs = lifetime.as_secs(), force_refresh, "Fetched new bearer token");
        *entry = Some(CachedEntry {
            token: issued.token.clone(),
            expires_at: Instant::now() + lifetime,
        });
        Ok(issued.token)
    }

    async fn invalidate(&self) {
        *self.entry.lock().await = None;
    }
}

// ── Password grant ──────────────────────────────────────────────────

/// Signs in a user with email + password against the project's auth API
/// (`POST {base}/auth/v1/token?grant_type=password`).
pub struct PasswordGrant {
    client: reqwest::Client,
    base_url: String,
    api_key: SecretString,
    email: String,
    password: SecretString,
}

impl PasswordGrant {
    pub fn new(
        base_url: impl Into<String>,
        api_key: SecretString,
        email: impl Into<String>,
        password: SecretString,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            email: email.into(),
            password,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/auth/v1/token", self.base_url)
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[async_trait]
impl TokenFetcher for PasswordGrant {
    async fn fetch(&self) -> Result<IssuedToken, AuthError> {
        let endpoint = self.endpoint();
        let response = self
            .client
            .post(&endpoint)
            .query(&[("grant_type", "password")])
            .header("apikey", self.api_key.expose_secret())
            .json(&serde_json::json!({
                "email": self.email,
                "password": self.password.expose_secret(),
            }))
            .send()
            .await
            .map_err(|e| AuthError::RequestFailed {
                endpoint: endpoint.clone(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::Rejected {
                endpoint,
                status: status.as_u16(),
            });
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::InvalidResponse(e.to_string()))?;

        info!(email = %self.email, "Signed in to storage backend");
        Ok(IssuedToken {
            token: SecretString::from(body.access_token),
            expires_in: body.expires_in.map(Duration::from_secs),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingFetcher {
        calls: AtomicUsize,
        expires_in: Option<Duration>,
    }

    impl CountingFetcher {
        fn new(expires_in: Option<Duration>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                expires_in,
            })
        }
    }

    #[async_trait]
    impl TokenFetcher for CountingFetcher {
        async fn fetch(&self) -> Result<IssuedToken, AuthError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(IssuedToken {
                token: SecretString::from(format!("token-{n}")),
                expires_in: self.expires_in,
            })
        }
    }

    #[tokio::test]
    async fn static_token_is_constant() {
        let source = StaticToken::new(SecretString::from("anon"));
        assert_eq!(source.token(false).await.unwrap().expose_secret(), "anon");
        assert_eq!(source.token(true).await.unwrap().expose_secret(), "anon");
    }

    #[tokio::test]
    async fn cached_token_reused_within_ttl() {
        let fetcher = CountingFetcher::new(None);
        let source = CachedToken::new(fetcher.clone(), Duration::from_secs(3600));

        let first = source.token(false).await.unwrap();
        let second = source.token(false).await.unwrap();
        assert_eq!(first.expose_secret(), "token-1");
        assert_eq!(second.expose_secret(), "token-1");
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn forced_refresh_bypasses_cache() {
        let fetcher = CountingFetcher::new(None);
        let source = CachedToken::new(fetcher.clone(), Duration::from_secs(3600));

        source.token(false).await.unwrap();
        let refreshed = source.token(true).await.unwrap();
        assert_eq!(refreshed.expose_secret(), "token-2");
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn expired_token_is_refetched() {
        // Issuer lifetime shorter than skew → already expired on arrival.
        let fetcher = CountingFetcher::new(Some(Duration::from_secs(10)));
        let source = CachedToken::new(fetcher.clone(), Duration::from_secs(3600))
            .with_skew(Duration::from_secs(30));

        source.token(false).await.unwrap();
        let again = source.token(false).await.unwrap();
        assert_eq!(again.expose_secret(), "token-2");
    }

    #[tokio::test]
    async fn invalidate_clears_cache() {
        let fetcher = CountingFetcher::new(None);
        let source = CachedToken::new(fetcher.clone(), Duration::from_secs(3600));

        source.token(false).await.unwrap();
        source.invalidate().await;
        source.token(false).await.unwrap();
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn password_grant_endpoint() {
        let grant = PasswordGrant::new(
            "https://proj.supabase.co/",
            SecretString::from("anon"),
            "me@example.com",
            SecretString::from("pw"),
        );
        assert_eq!(grant.endpoint(), "https://proj.supabase.co/auth/v1/token");
    }
}
