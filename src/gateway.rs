//! Model gateway.
//!
//! Uniform interface over hosted chat-completion providers. The provider is
//! picked by a prefix convention on the model id ("gpt-" style ids go to the
//! OpenAI-compatible API, "gemini-" to the Gemini API, "vertex-" to a Vertex
//! OpenAI-compatible endpoint) and resolved once at construction, not
//! re-parsed per call. The gateway itself never retries; callers compose
//! `retry::with_retry` around it when they want that.

use crate::config::PilotConfig;
use crate::error::{PilotError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Message role in a chat completion request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
        }
    }
}

/// One message of an ordered chat transcript.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Abstract chat-completion capability.
///
/// The generator, reflection agent, and intent analyzer depend on this trait
/// so tests can inject deterministic stand-ins for the hosted providers.
#[async_trait]
pub trait ChatCompletion: Send + Sync {
    /// Model identifier used for cache keys and logging.
    fn model_id(&self) -> &str;

    /// Request a single aggregated text completion.
    async fn complete(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
        extra: &HashMap<String, serde_json::Value>,
    ) -> Result<String>;
}

/// Supported provider families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    OpenAi,
    Gemini,
    Vertex,
}

impl ProviderKind {
    /// Derive the provider from the model id prefix. Unrecognized prefixes
    /// fall back to the OpenAI-compatible provider with a warning.
    pub fn from_model_id(model: &str) -> Self {
        if model.starts_with("gpt-") || model.starts_with("o1") || model.starts_with("o3") {
            ProviderKind::OpenAi
        } else if model.starts_with("gemini-") {
            ProviderKind::Gemini
        } else if model.starts_with("vertex-") {
            ProviderKind::Vertex
        } else {
            warn!(
                "Unrecognized model prefix '{}', falling back to OpenAI-compatible provider",
                model
            );
            ProviderKind::OpenAi
        }
    }

    fn default_base_url(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "https://api.openai.com/v1",
            ProviderKind::Gemini => "https://generativelanguage.googleapis.com/v1beta",
            // OpenAI-compatible Vertex endpoint; regional deployments override
            // this via `base_url`.
            ProviderKind::Vertex => "https://us-central1-aiplatform.googleapis.com/v1beta1/openapi",
        }
    }
}

/// Gateway to one configured provider/model pair.
pub struct ModelGateway {
    model: String,
    kind: ProviderKind,
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl ModelGateway {
    pub fn new(config: &PilotConfig) -> Result<Self> {
        let kind = ProviderKind::from_model_id(&config.model);
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .map_err(|e| PilotError::Gateway(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            model: config.model.clone(),
            kind,
            api_key: config.api_key.clone(),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| kind.default_base_url().to_string()),
            client,
        })
    }

    pub fn provider_kind(&self) -> ProviderKind {
        self.kind
    }

    async fn complete_openai_style(
        &self,
        model: &str,
        messages: &[ChatMessage],
        temperature: f32,
        extra: &HashMap<String, serde_json::Value>,
    ) -> Result<String> {
        let api_messages: Vec<serde_json::Value> = messages
            .iter()
            .map(|m| serde_json::json!({"role": m.role.as_str(), "content": m.content}))
            .collect();

        let mut body = serde_json::json!({
            "model": model,
            "messages": api_messages,
            "temperature": temperature,
        });
        for (key, value) in extra {
            body[key.as_str()] = value.clone();
        }

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| PilotError::Gateway(format!("LLM API call failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(PilotError::Gateway(format!(
                "LLM API error ({}): {}",
                status, error_text
            )));
        }

        let response_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| PilotError::Gateway(format!("Failed to parse LLM response: {}", e)))?;

        if let Some(error) = response_json.get("error") {
            return Err(PilotError::Gateway(format!("LLM API error: {}", error)));
        }

        let choices = response_json
            .get("choices")
            .and_then(|c| c.as_array())
            .ok_or_else(|| {
                PilotError::Gateway(format!(
                    "No choices array in LLM response: {}",
                    response_json
                ))
            })?;

        let first = choices.first().ok_or_else(|| {
            PilotError::Gateway("Empty choices array in LLM response".to_string())
        })?;

        if let Some(finish_reason) = first.get("finish_reason").and_then(|r| r.as_str()) {
            if finish_reason == "length" {
                warn!("LLM response was truncated due to length limit");
            } else if finish_reason == "content_filter" {
                return Err(PilotError::Gateway(
                    "LLM response was filtered by content policy".to_string(),
                ));
            }
        }

        let content = first["message"]["content"].as_str().ok_or_else(|| {
            PilotError::Gateway(format!("No content in LLM response: {}", response_json))
        })?;

        if content.is_empty() {
            return Err(PilotError::Gateway(
                "Empty content in LLM response".to_string(),
            ));
        }

        Ok(content.to_string())
    }

    async fn complete_gemini(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
        extra: &HashMap<String, serde_json::Value>,
    ) -> Result<String> {
        // Gemini separates the system instruction from the user turns.
        let system_text: Vec<&str> = messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();
        let contents: Vec<serde_json::Value> = messages
            .iter()
            .filter(|m| m.role == Role::User)
            .map(|m| serde_json::json!({"role": "user", "parts": [{"text": m.content}]}))
            .collect();

        let mut generation_config = serde_json::json!({"temperature": temperature});
        for (key, value) in extra {
            generation_config[key.as_str()] = value.clone();
        }

        let mut body = serde_json::json!({
            "contents": contents,
            "generationConfig": generation_config,
        });
        if !system_text.is_empty() {
            body["systemInstruction"] =
                serde_json::json!({"parts": [{"text": system_text.join("\n\n")}]});
        }

        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );
        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| PilotError::Gateway(format!("Gemini API call failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(PilotError::Gateway(format!(
                "Gemini API error ({}): {}",
                status, error_text
            )));
        }

        let response_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| PilotError::Gateway(format!("Failed to parse Gemini response: {}", e)))?;

        let content = response_json["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .ok_or_else(|| {
                PilotError::Gateway(format!("No text in Gemini response: {}", response_json))
            })?;

        Ok(content.to_string())
    }
}

#[async_trait]
impl ChatCompletion for ModelGateway {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
        extra: &HashMap<String, serde_json::Value>,
    ) -> Result<String> {
        debug!(
            "Requesting completion from {:?} model '{}' ({} messages, temperature {})",
            self.kind,
            self.model,
            messages.len(),
            temperature
        );

        let result = match self.kind {
            ProviderKind::OpenAi => {
                self.complete_openai_style(&self.model, messages, temperature, extra)
                    .await
            }
            ProviderKind::Gemini => self.complete_gemini(messages, temperature, extra).await,
            ProviderKind::Vertex => {
                // Vertex exposes an OpenAI-compatible surface; the "vertex-"
                // routing prefix is not part of the upstream model name.
                let model = self.model.trim_start_matches("vertex-").to_string();
                self.complete_openai_style(&model, messages, temperature, extra)
                    .await
            }
        };

        result.map_err(|e| PilotError::Gateway(format!("model '{}': {}", self.model, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_from_prefix() {
        assert_eq!(ProviderKind::from_model_id("gpt-4o-mini"), ProviderKind::OpenAi);
        assert_eq!(ProviderKind::from_model_id("o1-preview"), ProviderKind::OpenAi);
        assert_eq!(
            ProviderKind::from_model_id("gemini-2.0-flash"),
            ProviderKind::Gemini
        );
        assert_eq!(
            ProviderKind::from_model_id("vertex-llama-3"),
            ProviderKind::Vertex
        );
    }

    #[test]
    fn test_unknown_prefix_falls_back_to_openai() {
        assert_eq!(
            ProviderKind::from_model_id("mystery-model"),
            ProviderKind::OpenAi
        );
    }

    #[test]
    fn test_provider_resolved_once_at_construction() {
        let config = PilotConfig {
            model: "gemini-2.0-flash".to_string(),
            ..PilotConfig::default()
        };
        let gateway = ModelGateway::new(&config).unwrap();
        assert_eq!(gateway.provider_kind(), ProviderKind::Gemini);
        assert_eq!(gateway.model_id(), "gemini-2.0-flash");
    }

    #[test]
    fn test_message_constructors() {
        let m = ChatMessage::system("be terse");
        assert_eq!(m.role.as_str(), "system");
        let m = ChatMessage::user("hello");
        assert_eq!(m.role.as_str(), "user");
    }
}
