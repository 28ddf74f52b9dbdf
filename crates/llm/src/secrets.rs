//! Credential providers for model backends.
//!
//! `DynamicSecretProvider` caches an OAuth2 client-credentials token and
//! refreshes it shortly before expiry. Readers take a shared lock on the
//! cache; a separate mutex guards refresh so concurrent expirations trigger a
//! single token request.

use crate::client::{Credentials, API_KEY};
use ragchat_core::settings::{SecretKind, SecretSettings};
use ragchat_core::{AppError, AppResult};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

/// Supplies credentials for one model backend.
#[async_trait::async_trait]
pub trait SecretProvider: Send + Sync {
    /// Key under which the credential is provided.
    fn provided_key(&self) -> &str;

    async fn provide_token(&self) -> AppResult<Credentials>;
}

/// Provides nothing; for backends without authentication.
#[derive(Debug, Default, Clone)]
pub struct NoSecretProvider;

#[async_trait::async_trait]
impl SecretProvider for NoSecretProvider {
    fn provided_key(&self) -> &str {
        ""
    }

    async fn provide_token(&self) -> AppResult<Credentials> {
        Ok(Credentials::new())
    }
}

/// Provides a fixed API key.
#[derive(Clone)]
pub struct StaticSecretProvider {
    api_key: String,
}

impl StaticSecretProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
        }
    }

    /// Read the key from an environment variable.
    pub fn from_env(var: &str) -> AppResult<Self> {
        std::env::var(var)
            .map(Self::new)
            .map_err(|_| AppError::Secret(format!("Environment variable {} is not set", var)))
    }
}

#[async_trait::async_trait]
impl SecretProvider for StaticSecretProvider {
    fn provided_key(&self) -> &str {
        API_KEY
    }

    async fn provide_token(&self) -> AppResult<Credentials> {
        let mut credentials = Credentials::new();
        credentials.insert(API_KEY, self.api_key.clone());
        Ok(credentials)
    }
}

/// A freshly issued access token.
#[derive(Debug, Clone, Deserialize)]
pub struct AccessToken {
    pub access_token: String,
    /// Lifetime in seconds
    #[serde(default = "default_expires_in")]
    pub expires_in: u64,
}

fn default_expires_in() -> u64 {
    300
}

/// Issues access tokens.
#[async_trait::async_trait]
pub trait TokenSource: Send + Sync {
    async fn fetch(&self) -> AppResult<AccessToken>;
}

/// OAuth2 client-credentials grant against a token endpoint.
pub struct ClientCredentials {
    token_url: String,
    client_id: String,
    client_secret: String,
    scope: Option<String>,
    client: reqwest::Client,
}

impl ClientCredentials {
    pub fn new(
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        scope: Option<String>,
    ) -> Self {
        Self {
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            scope,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait::async_trait]
impl TokenSource for ClientCredentials {
    async fn fetch(&self) -> AppResult<AccessToken> {
        if !self.token_url.starts_with("https://") && !self.token_url.starts_with("http://localhost")
        {
            return Err(AppError::Secret(
                "OAuth2 token url must use https".to_string(),
            ));
        }

        let mut form = vec![("grant_type", "client_credentials")];
        if let Some(scope) = &self.scope {
            form.push(("scope", scope.as_str()));
        }

        let response = self
            .client
            .post(&self.token_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&form)
            .send()
            .await
            .map_err(|e| {
                AppError::Secret(format!("No connection to authentication server: {}", e))
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::BAD_REQUEST
        {
            return Err(AppError::Secret(
                "OAuth2 credentials are not valid".to_string(),
            ));
        }
        if !status.is_success() {
            return Err(AppError::Secret(format!(
                "Token endpoint returned {}",
                status
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::Secret(format!("Malformed token response: {}", e)))
    }
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    refresh_at: Instant,
}

/// Caches tokens from a `TokenSource` until `expires_in - margin`.
pub struct DynamicSecretProvider {
    source: Arc<dyn TokenSource>,
    margin: Duration,
    cached: RwLock<Option<CachedToken>>,
    refresh: Mutex<()>,
}

impl DynamicSecretProvider {
    pub fn new(source: Arc<dyn TokenSource>, margin: Duration) -> Self {
        Self {
            source,
            margin,
            cached: RwLock::new(None),
            refresh: Mutex::new(()),
        }
    }

    async fn cached_token(&self) -> Option<String> {
        let cached = self.cached.read().await;
        cached
            .as_ref()
            .filter(|c| Instant::now() < c.refresh_at)
            .map(|c| c.token.clone())
    }

    fn credentials(token: String) -> Credentials {
        let mut credentials = Credentials::new();
        credentials.insert(API_KEY, token);
        credentials
    }
}

#[async_trait::async_trait]
impl SecretProvider for DynamicSecretProvider {
    fn provided_key(&self) -> &str {
        API_KEY
    }

    async fn provide_token(&self) -> AppResult<Credentials> {
        if let Some(token) = self.cached_token().await {
            tracing::trace!("Using cached bearer token");
            return Ok(Self::credentials(token));
        }

        let _guard = self.refresh.lock().await;

        // Another caller may have refreshed while we waited
        if let Some(token) = self.cached_token().await {
            return Ok(Self::credentials(token));
        }

        tracing::debug!("Requesting a new access token");
        let issued = self.source.fetch().await.inspect_err(|e| {
            tracing::error!(error = %e, "Failed to obtain bearer token");
        })?;

        let lifetime = Duration::from_secs(issued.expires_in).saturating_sub(self.margin);
        let refresh_at = Instant::now() + lifetime;
        *self.cached.write().await = Some(CachedToken {
            token: issued.access_token.clone(),
            refresh_at,
        });

        tracing::debug!(lifetime_secs = lifetime.as_secs(), "Acquired access token");
        Ok(Self::credentials(issued.access_token))
    }
}

/// Build the provider selected in `settings`.
pub fn create_secret_provider(settings: &SecretSettings) -> AppResult<Arc<dyn SecretProvider>> {
    match settings.kind {
        SecretKind::None => Ok(Arc::new(NoSecretProvider)),
        SecretKind::Static => {
            let var = settings.api_key_env.as_deref().ok_or_else(|| {
                AppError::Config("secrets.api_key_env is required for static secrets".to_string())
            })?;
            Ok(Arc::new(StaticSecretProvider::from_env(var)?))
        }
        SecretKind::Oauth2 => {
            let required = |value: &Option<String>, name: &str| {
                value.clone().ok_or_else(|| {
                    AppError::Config(format!("secrets.{} is required for oauth2 secrets", name))
                })
            };
            let token_url = required(&settings.token_url, "token_url")?;
            let client_id = required(&settings.client_id, "client_id")?;
            let secret_var = required(&settings.client_secret_env, "client_secret_env")?;
            let client_secret = std::env::var(&secret_var).map_err(|_| {
                AppError::Secret(format!("Environment variable {} is not set", secret_var))
            })?;

            let source = ClientCredentials::new(
                token_url,
                client_id,
                client_secret,
                settings.scope.clone(),
            );
            Ok(Arc::new(DynamicSecretProvider::new(
                Arc::new(source),
                Duration::from_secs(settings.refresh_margin_secs),
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        calls: AtomicUsize,
        expires_in: u64,
    }

    #[async_trait::async_trait]
    impl TokenSource for CountingSource {
        async fn fetch(&self) -> AppResult<AccessToken> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(AccessToken {
                access_token: format!("token-{}", n),
                expires_in: self.expires_in,
            })
        }
    }

    struct FailingSource;

    #[async_trait::async_trait]
    impl TokenSource for FailingSource {
        async fn fetch(&self) -> AppResult<AccessToken> {
            Err(AppError::Secret("OAuth2 credentials are not valid".to_string()))
        }
    }

    #[tokio::test]
    async fn test_no_secret_provider_is_empty() {
        let credentials = NoSecretProvider.provide_token().await.unwrap();
        assert!(credentials.is_empty());
    }

    #[tokio::test]
    async fn test_static_provider() {
        let provider = StaticSecretProvider::new("sk-static");
        let credentials = provider.provide_token().await.unwrap();
        assert_eq!(credentials.bearer(), Some("sk-static"));
        assert!(StaticSecretProvider::from_env("RAGCHAT_TEST_UNSET_VARIABLE_X").is_err());
    }

    #[tokio::test]
    async fn test_concurrent_expiry_refreshes_once() {
        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
            expires_in: 3600,
        });
        let provider = Arc::new(DynamicSecretProvider::new(
            source.clone(),
            Duration::from_secs(60),
        ));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let provider = provider.clone();
                tokio::spawn(async move { provider.provide_token().await })
            })
            .collect();

        for handle in handles {
            let credentials = handle.await.unwrap().unwrap();
            assert_eq!(credentials.bearer(), Some("token-1"));
        }
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_token_inside_margin_is_refreshed() {
        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
            expires_in: 30,
        });
        let provider = DynamicSecretProvider::new(source.clone(), Duration::from_secs(60));

        let first = provider.provide_token().await.unwrap();
        let second = provider.provide_token().await.unwrap();
        assert_eq!(first.bearer(), Some("token-1"));
        assert_eq!(second.bearer(), Some("token-2"));
    }

    #[tokio::test]
    async fn test_fetch_failure_propagates() {
        let provider = DynamicSecretProvider::new(Arc::new(FailingSource), Duration::ZERO);
        assert!(matches!(
            provider.provide_token().await,
            Err(AppError::Secret(_))
        ));
    }

    #[test]
    fn test_create_secret_provider() {
        let none = create_secret_provider(&SecretSettings::default()).unwrap();
        assert_eq!(none.provided_key(), NoSecretProvider.provided_key());

        let missing_var = SecretSettings {
            kind: SecretKind::Static,
            ..Default::default()
        };
        assert!(matches!(
            create_secret_provider(&missing_var),
            Err(AppError::Config(_))
        ));

        let incomplete_oauth = SecretSettings {
            kind: SecretKind::Oauth2,
            token_url: Some("http://127.0.0.1:1/token".to_string()),
            ..Default::default()
        };
        assert!(create_secret_provider(&incomplete_oauth).is_err());
    }
}
