//! Trace backends.
//!
//! Tracing is best-effort: callers bound every backend call and continue
//! untraced when it fails.

use async_trait::async_trait;
use ragchat_core::settings::{TraceBackendKind, TracingSettings};
use ragchat_core::{AppError, AppResult};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

#[async_trait]
pub trait TraceBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Open a trace for one turn of `session_id`.
    async fn start_span(&self, session_id: &str, input: &Value) -> AppResult<Box<dyn TraceSpan>>;
}

#[async_trait]
pub trait TraceSpan: Send {
    fn trace_id(&self) -> &str;

    async fn end(self: Box<Self>, output: &Value) -> AppResult<()>;
}

/// Build the backend selected in `settings`.
pub fn create_trace_backend(settings: &TracingSettings) -> AppResult<Arc<dyn TraceBackend>> {
    match settings.backend {
        TraceBackendKind::None => Ok(Arc::new(NoopTraceBackend)),
        TraceBackendKind::Log => Ok(Arc::new(LogTraceBackend)),
        TraceBackendKind::Http => {
            let host = settings.host.clone().ok_or_else(|| {
                AppError::Config("tracing.host is required for the http backend".to_string())
            })?;
            let read_env = |var: &Option<String>, what: &str| {
                var.as_deref()
                    .and_then(|v| std::env::var(v).ok())
                    .ok_or_else(|| AppError::Config(format!("tracing {} is not set", what)))
            };
            let public_key = read_env(&settings.public_key_env, "public key")?;
            let secret_key = read_env(&settings.secret_key_env, "secret key")?;
            Ok(Arc::new(HttpTraceBackend::new(
                host,
                public_key,
                secret_key,
                Duration::from_millis(settings.timeout_ms),
            )?))
        }
    }
}

#[derive(Debug, Default)]
pub struct NoopTraceBackend;

struct NoopSpan(String);

#[async_trait]
impl TraceSpan for NoopSpan {
    fn trace_id(&self) -> &str {
        &self.0
    }

    async fn end(self: Box<Self>, _output: &Value) -> AppResult<()> {
        Ok(())
    }
}

#[async_trait]
impl TraceBackend for NoopTraceBackend {
    fn name(&self) -> &str {
        "none"
    }

    async fn start_span(&self, session_id: &str, _input: &Value) -> AppResult<Box<dyn TraceSpan>> {
        Ok(Box::new(NoopSpan(session_id.to_string())))
    }
}

/// Emits turn start and end as `tracing` events.
#[derive(Debug, Default)]
pub struct LogTraceBackend;

struct LogSpan {
    trace_id: String,
    session_id: String,
}

#[async_trait]
impl TraceSpan for LogSpan {
    fn trace_id(&self) -> &str {
        &self.trace_id
    }

    async fn end(self: Box<Self>, output: &Value) -> AppResult<()> {
        tracing::info!(
            target: "ragchat::trace",
            trace_id = %self.trace_id,
            session_id = %self.session_id,
            output = %output,
            "Trace finished"
        );
        Ok(())
    }
}

#[async_trait]
impl TraceBackend for LogTraceBackend {
    fn name(&self) -> &str {
        "log"
    }

    async fn start_span(&self, session_id: &str, input: &Value) -> AppResult<Box<dyn TraceSpan>> {
        let trace_id = uuid::Uuid::new_v4().to_string();
        tracing::info!(
            target: "ragchat::trace",
            trace_id = %trace_id,
            session_id,
            input = %input,
            "Trace started"
        );
        Ok(Box::new(LogSpan {
            trace_id,
            session_id: session_id.to_string(),
        }))
    }
}

/// Langfuse-style ingestion API (`POST {host}/api/public/ingestion`, basic auth).
pub struct HttpTraceBackend {
    ingestion: Arc<Ingestion>,
}

struct Ingestion {
    client: reqwest::Client,
    endpoint: String,
    public_key: String,
    secret_key: String,
}

impl Ingestion {
    async fn send(&self, body: Value) -> AppResult<()> {
        let event = json!({
            "batch": [{
                "id": uuid::Uuid::new_v4().to_string(),
                "type": "trace-create",
                "timestamp": chrono::Utc::now().to_rfc3339(),
                "body": body,
            }]
        });
        let response = self
            .client
            .post(&self.endpoint)
            .basic_auth(&self.public_key, Some(&self.secret_key))
            .json(&event)
            .send()
            .await
            .map_err(|e| AppError::Other(format!("Trace ingestion failed: {}", e)))?;
        if !response.status().is_success() {
            return Err(AppError::Other(format!(
                "Trace ingestion returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

impl HttpTraceBackend {
    pub fn new(
        host: String,
        public_key: String,
        secret_key: String,
        timeout: Duration,
    ) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Config(format!("Failed to create trace client: {}", e)))?;
        Ok(Self {
            ingestion: Arc::new(Ingestion {
                client,
                endpoint: format!("{}/api/public/ingestion", host.trim_end_matches('/')),
                public_key,
                secret_key,
            }),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.ingestion.endpoint
    }
}

struct HttpSpan {
    ingestion: Arc<Ingestion>,
    trace_id: String,
    session_id: String,
}

#[async_trait]
impl TraceSpan for HttpSpan {
    fn trace_id(&self) -> &str {
        &self.trace_id
    }

    async fn end(self: Box<Self>, output: &Value) -> AppResult<()> {
        // Re-sending trace-create with the same id upserts the trace.
        self.ingestion
            .send(json!({
                "id": self.trace_id,
                "sessionId": self.session_id,
                "output": output,
            }))
            .await
    }
}

#[async_trait]
impl TraceBackend for HttpTraceBackend {
    fn name(&self) -> &str {
        "http"
    }

    async fn start_span(&self, session_id: &str, input: &Value) -> AppResult<Box<dyn TraceSpan>> {
        let trace_id = uuid::Uuid::new_v4().to_string();
        self.ingestion
            .send(json!({
                "id": trace_id,
                "name": "chat_turn",
                "sessionId": session_id,
                "input": input,
            }))
            .await?;
        Ok(Box::new(HttpSpan {
            ingestion: Arc::clone(&self.ingestion),
            trace_id,
            session_id: session_id.to_string(),
        }))
    }
}
