//! Deterministic scripted LLM client.
//!
//! Replies are routed by key: a rule matches when the request's `run_name`
//! equals the key or the prompt contains it. Each rule replays its replies in
//! order and keeps repeating the last one.

use crate::client::{LlmClient, LlmRequest, LlmResponse, LlmUsage};
use ragchat_core::{AppError, AppResult};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// One scripted outcome.
#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    /// Fail with `AppError::Llm`
    Fail(String),
    /// Answer after a delay
    Delayed(Duration, String),
    /// Never answer
    Hang,
}

#[derive(Debug)]
struct Rule {
    key: String,
    replies: VecDeque<Reply>,
}

impl Rule {
    fn next(&mut self) -> Option<Reply> {
        if self.replies.len() > 1 {
            self.replies.pop_front()
        } else {
            self.replies.front().cloned()
        }
    }

    fn matches(&self, request: &LlmRequest) -> bool {
        request.run_name.as_deref() == Some(self.key.as_str()) || request.prompt.contains(&self.key)
    }
}

/// LLM client that answers from a script, for tests and offline demos.
#[derive(Debug, Default)]
pub struct ScriptedLlmClient {
    rules: Mutex<Vec<Rule>>,
    fallback: Option<String>,
    calls: Mutex<Vec<LlmRequest>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ScriptedLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a text reply for `key`.
    pub fn on(self, key: impl Into<String>, text: impl Into<String>) -> Self {
        self.on_reply(key, Reply::Text(text.into()))
    }

    /// Queue an arbitrary reply for `key`.
    pub fn on_reply(self, key: impl Into<String>, reply: Reply) -> Self {
        let key = key.into();
        {
            let mut rules = lock(&self.rules);
            match rules.iter_mut().find(|rule| rule.key == key) {
                Some(rule) => rule.replies.push_back(reply),
                None => rules.push(Rule {
                    key,
                    replies: VecDeque::from([reply]),
                }),
            }
        }
        self
    }

    /// Reply used when no rule matches.
    pub fn with_fallback(mut self, text: impl Into<String>) -> Self {
        self.fallback = Some(text.into());
        self
    }

    /// All requests received so far, in order.
    pub fn calls(&self) -> Vec<LlmRequest> {
        lock(&self.calls).clone()
    }

    /// Number of requests whose run name equals `run_name`.
    pub fn call_count(&self, run_name: &str) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|req| req.run_name.as_deref() == Some(run_name))
            .count()
    }

    fn next_reply(&self, request: &LlmRequest) -> Option<Reply> {
        let mut rules = lock(&self.rules);
        rules
            .iter_mut()
            .find(|rule| rule.matches(request))
            .and_then(Rule::next)
            .or_else(|| self.fallback.clone().map(Reply::Text))
    }
}

#[async_trait::async_trait]
impl LlmClient for ScriptedLlmClient {
    fn provider_name(&self) -> &str {
        "mock"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        lock(&self.calls).push(request.clone());

        let reply = self.next_reply(request).ok_or_else(|| {
            AppError::Llm(format!(
                "No scripted reply for run {:?}",
                request.run_name.as_deref().unwrap_or("-")
            ))
        })?;

        let content = match reply {
            Reply::Text(text) => text,
            Reply::Fail(message) => return Err(AppError::Llm(message)),
            Reply::Delayed(delay, text) => {
                tokio::time::sleep(delay).await;
                text
            }
            Reply::Hang => {
                std::future::pending::<()>().await;
                String::new()
            }
        };

        Ok(LlmResponse {
            content,
            model: request.model.clone(),
            usage: LlmUsage::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_routes_by_run_name_and_prompt() {
        let client = ScriptedLlmClient::new()
            .on("language_detection", r#"{"language": "de"}"#)
            .on("capital", "Berlin");

        let by_name = LlmRequest::new("anything", "m").with_run_name("language_detection");
        assert_eq!(
            client.complete(&by_name).await.unwrap().content,
            r#"{"language": "de"}"#
        );

        let by_prompt = LlmRequest::new("What is the capital?", "m");
        assert_eq!(client.complete(&by_prompt).await.unwrap().content, "Berlin");
        assert_eq!(client.call_count("language_detection"), 1);
        assert_eq!(client.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_replays_in_order_then_repeats_last() {
        let client = ScriptedLlmClient::new()
            .on_reply("helpfulness", Reply::Fail("boom".into()))
            .on("helpfulness", "false")
            .on("helpfulness", "true");
        let request = LlmRequest::new("p", "m").with_run_name("helpfulness");

        assert!(client.complete(&request).await.is_err());
        assert_eq!(client.complete(&request).await.unwrap().content, "false");
        assert_eq!(client.complete(&request).await.unwrap().content, "true");
        assert_eq!(client.complete(&request).await.unwrap().content, "true");
    }

    #[tokio::test]
    async fn test_unmatched_without_fallback_fails() {
        let client = ScriptedLlmClient::new();
        let request = LlmRequest::new("p", "m");
        assert!(matches!(client.complete(&request).await, Err(AppError::Llm(_))));

        let client = ScriptedLlmClient::new().with_fallback("ok");
        assert_eq!(client.complete(&request).await.unwrap().content, "ok");
    }
}
