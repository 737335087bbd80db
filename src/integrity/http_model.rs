//! HTTP-backed [`AnalysisModel`] calling an OpenAI-compatible chat
//! completions endpoint (spec §4.3: "a haiku-class model", prompt caching
//! left to the endpoint's own handling of a stable system prompt prefix).

use async_trait::async_trait;
use std::time::Duration;

use super::AnalysisModel;
use crate::error::IntegrityError;

/// Calls `{base_url}/chat/completions` with the configured model name,
/// bounded by `timeout` (spec §4.3's analysis timeout budget).
pub struct HttpAnalysisModel {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl HttpAnalysisModel {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Self {
        HttpAnalysisModel {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            timeout,
        }
    }
}

#[async_trait]
impl AnalysisModel for HttpAnalysisModel {
    async fn analyze(&self, system_prompt: &str, user_prompt: &str) -> Result<String, IntegrityError> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": user_prompt},
            ],
            "temperature": 0,
        });

        let request = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body);

        let response = match tokio::time::timeout(self.timeout, request.send()).await {
            Ok(Ok(resp)) => resp,
            Ok(Err(e)) => {
                if log::log_enabled!(log::Level::Warn) {
                    log::warn!("analysis model {} unreachable: {}", self.model, e);
                }
                return Err(IntegrityError::AnalysisUnreachable(e.to_string()));
            }
            Err(_) => {
                if log::log_enabled!(log::Level::Warn) {
                    log::warn!("analysis model {} call timed out after {:?}", self.model, self.timeout);
                }
                return Err(IntegrityError::AnalysisTimeout);
            }
        };

        if !response.status().is_success() {
            let status = response.status().as_u16();
            return Err(IntegrityError::AnalysisUnreachable(format!("non-2xx response: {}", status)));
        }

        let parsed: serde_json::Value = response
            .json()
            .await
            .map_err(|e| IntegrityError::AnalysisUnreachable(e.to_string()))?;

        parsed
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|arr| arr.first())
            .and_then(|choice| choice.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| IntegrityError::AnalysisUnreachable("reply carried no message content".to_string()))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
