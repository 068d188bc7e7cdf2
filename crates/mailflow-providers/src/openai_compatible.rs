//! OpenAI-compatible summarization provider.
//!
//! One struct covers every endpoint speaking the `/chat/completions`
//! protocol; bearer auth is applied only when an API key is configured, so
//! local Ollama works with an empty key. Failures surface as descriptive
//! errors, never as silently empty summary text.

use async_trait::async_trait;
use mailflow_core::config::AiConfig;
use mailflow_core::error::{MailflowError, Result};
use mailflow_core::traits::Summarizer;
use mailflow_core::types::EmailMessage;
use serde_json::{Value, json};

/// Summarizer backed by an OpenAI-compatible chat API.
pub struct OpenAiCompatibleSummarizer {
    endpoint: String,
    model: String,
    api_key: String,
    temperature: f32,
    client: reqwest::Client,
}

impl OpenAiCompatibleSummarizer {
    pub fn new(config: &AiConfig) -> Self {
        Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            temperature: config.temperature,
            client: reqwest::Client::new(),
        }
    }

    /// Check the configured model against the endpoint's `/models` list and
    /// substitute the closest available one: exact match, else a
    /// case-insensitive substring match, else the first advertised model.
    /// An unreachable endpoint keeps the configured name.
    pub async fn resolve_model(&mut self) {
        let Some(available) = self.list_models().await else {
            tracing::debug!(
                "Model list unavailable at {}, keeping '{}'",
                self.endpoint,
                self.model
            );
            return;
        };
        let resolved = pick_model(&self.model, &available);
        if resolved != self.model {
            tracing::warn!(
                "⚠️ Model '{}' not available, using '{}' instead",
                self.model,
                resolved
            );
            self.model = resolved;
        }
    }

    /// The endpoint's advertised model ids, or `None` if unreachable.
    async fn list_models(&self) -> Option<Vec<String>> {
        let url = format!("{}/models", self.endpoint);
        let req = self.apply_auth(self.client.get(&url));
        let resp = req.send().await.ok()?;
        if !resp.status().is_success() {
            return None;
        }
        let body: Value = resp.json().await.ok()?;
        let models = body["data"]
            .as_array()?
            .iter()
            .filter_map(|m| m["id"].as_str().map(String::from))
            .collect::<Vec<_>>();
        Some(models)
    }

    fn apply_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.api_key.is_empty() {
            req
        } else {
            req.header("Authorization", format!("Bearer {}", self.api_key))
        }
    }
}

#[async_trait]
impl Summarizer for OpenAiCompatibleSummarizer {
    async fn summarize(&self, messages: &[EmailMessage], prompt: &str) -> Result<String> {
        if messages.is_empty() {
            return Err(MailflowError::Service(
                "nothing to summarize: no messages".into(),
            ));
        }

        let full_prompt = build_prompt(prompt, messages);
        let body = json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [{"role": "user", "content": full_prompt}],
        });

        let url = format!("{}/chat/completions", self.endpoint);
        let req = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&body);
        let req = self.apply_auth(req);

        let resp = req
            .send()
            .await
            .map_err(|e| MailflowError::Service(format!("connection failed ({url}): {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(MailflowError::Service(format!(
                "summarization API error {status}: {text}"
            )));
        }

        let json: Value = resp
            .json()
            .await
            .map_err(|e| MailflowError::Service(format!("malformed API response: {e}")))?;

        let content = json["choices"]
            .get(0)
            .and_then(|c| c["message"]["content"].as_str())
            .ok_or_else(|| MailflowError::Service("no content in API response".into()))?;

        tracing::debug!("🤖 Summarized {} message(s) with {}", messages.len(), self.model);
        Ok(content.trim().to_string())
    }
}

/// Pick the best model from the advertised list. Empty list keeps the
/// configured name.
fn pick_model(configured: &str, available: &[String]) -> String {
    if available.is_empty() || available.iter().any(|m| m == configured) {
        return configured.to_string();
    }
    let lowered = configured.to_lowercase();
    if let Some(close) = available.iter().find(|m| {
        let m = m.to_lowercase();
        m.contains(&lowered) || lowered.contains(&m)
    }) {
        return close.clone();
    }
    available[0].clone()
}

/// Join the instruction prompt with the numbered message block the model
/// sees: per message a `From`/`Subject`/`Date`/`Body` section followed by a
/// dashed separator.
fn build_prompt(prompt: &str, messages: &[EmailMessage]) -> String {
    let block = messages
        .iter()
        .enumerate()
        .map(|(i, m)| {
            format!(
                "EMAIL {}:\nFrom: {} <{}>\nSubject: {}\nDate: {}\nBody:\n{}\n{}",
                i + 1,
                m.sender_name,
                m.sender_email,
                m.subject,
                m.received_time.format("%Y-%m-%d %H:%M:%S"),
                m.body,
                "-".repeat(50)
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");
    format!("{prompt}\n\n{block}")
}
