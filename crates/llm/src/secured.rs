//! `LlmClient` decorator that injects credentials per request.

use crate::client::{LlmClient, LlmRequest, LlmResponse};
use crate::secrets::SecretProvider;
use ragchat_core::{AppError, AppResult};
use std::sync::Arc;

/// Wraps a client so every request carries fresh credentials.
pub struct SecuredLlmClient {
    inner: Arc<dyn LlmClient>,
    secrets: Arc<dyn SecretProvider>,
}

impl SecuredLlmClient {
    pub fn new(inner: Arc<dyn LlmClient>, secrets: Arc<dyn SecretProvider>) -> Self {
        Self { inner, secrets }
    }
}

#[async_trait::async_trait]
impl LlmClient for SecuredLlmClient {
    fn provider_name(&self) -> &str {
        self.inner.provider_name()
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        // Credential failures surface as backend failures to the caller
        let credentials = self
            .secrets
            .provide_token()
            .await
            .map_err(|e| AppError::Llm(format!("Could not obtain credentials: {}", e)))?;

        let request = request.clone().with_credentials(credentials);
        self.inner.complete(&request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ScriptedLlmClient;
    use crate::secrets::{NoSecretProvider, StaticSecretProvider};

    #[tokio::test]
    async fn test_injects_credentials() {
        let inner = Arc::new(ScriptedLlmClient::new().with_fallback("ok"));
        let client = SecuredLlmClient::new(
            inner.clone(),
            Arc::new(StaticSecretProvider::new("sk-injected")),
        );

        let response = client
            .complete(&LlmRequest::new("hi", "m").with_run_name("rephrasing"))
            .await
            .unwrap();
        assert_eq!(response.content, "ok");
        assert_eq!(client.provider_name(), "mock");

        let calls = inner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].credentials.bearer(), Some("sk-injected"));
        assert_eq!(calls[0].run_name.as_deref(), Some("rephrasing"));
    }

    #[tokio::test]
    async fn test_no_secret_leaves_request_unauthenticated() {
        let inner = Arc::new(ScriptedLlmClient::new().with_fallback("ok"));
        let client = SecuredLlmClient::new(inner.clone(), Arc::new(NoSecretProvider));

        client.complete(&LlmRequest::new("hi", "m")).await.unwrap();
        assert!(inner.calls()[0].credentials.is_empty());
    }
}
