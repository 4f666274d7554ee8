//! Pipeline configuration.
//!
//! All knobs for one end-to-end request: model selection, sampling temperatures,
//! cache TTL, improvement-cycle bound, retry policy, and execution limits.
//! Values come from explicit construction, environment variables, or CLI flags.

use crate::retry::RetryPolicy;

/// Configuration consumed by the orchestration pipeline.
#[derive(Debug, Clone)]
pub struct PilotConfig {
    /// Model identifier. The provider is derived from its prefix once, at
    /// gateway construction (e.g. "gpt-4o-mini", "gemini-2.0-flash").
    pub model: String,

    /// API key for the selected provider.
    pub api_key: String,

    /// Optional endpoint override. When unset the provider default is used.
    pub base_url: Option<String>,

    /// Sampling temperature for SQL generation. Near-deterministic by default.
    pub generation_temperature: f32,

    /// Sampling temperature for the reflection critique.
    pub reflection_temperature: f32,

    /// Response cache TTL in seconds.
    pub cache_ttl_seconds: u64,

    /// Maximum improvement cycles per request. With 1, at most two SQL
    /// candidates are produced: the original and one improved query.
    pub max_improvement_cycles: u32,

    /// Retry policy for model gateway calls.
    pub retry: RetryPolicy,

    /// Row cap passed to the SQL execution collaborator.
    pub row_limit: usize,

    /// When true, destructive statements are rejected before execution.
    pub safe_mode: bool,
}

impl Default for PilotConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            api_key: String::new(),
            base_url: None,
            generation_temperature: 0.1,
            reflection_temperature: 0.2,
            cache_ttl_seconds: 3600,
            max_improvement_cycles: 1,
            retry: RetryPolicy::default(),
            row_limit: 100,
            safe_mode: true,
        }
    }
}

impl PilotConfig {
    /// Build a config from environment variables, falling back to defaults.
    ///
    /// Recognized variables: `SQLPILOT_MODEL`, `LLM_API_KEY` (or
    /// `OPENAI_API_KEY`), `LLM_BASE_URL`, `SQLPILOT_CACHE_TTL`,
    /// `SQLPILOT_MAX_IMPROVEMENTS`, `SQLPILOT_ROW_LIMIT`.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(model) = std::env::var("SQLPILOT_MODEL") {
            config.model = model;
        }
        if let Ok(key) = std::env::var("LLM_API_KEY") {
            config.api_key = key;
        } else if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            config.api_key = key;
        }
        if let Ok(url) = std::env::var("LLM_BASE_URL") {
            config.base_url = Some(url);
        }
        if let Ok(ttl) = std::env::var("SQLPILOT_CACHE_TTL") {
            if let Ok(secs) = ttl.parse() {
                config.cache_ttl_seconds = secs;
            }
        }
        if let Ok(cycles) = std::env::var("SQLPILOT_MAX_IMPROVEMENTS") {
            if let Ok(n) = cycles.parse() {
                config.max_improvement_cycles = n;
            }
        }
        if let Ok(limit) = std::env::var("SQLPILOT_ROW_LIMIT") {
            if let Ok(n) = limit.parse() {
                config.row_limit = n;
            }
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PilotConfig::default();
        assert_eq!(config.cache_ttl_seconds, 3600);
        assert_eq!(config.max_improvement_cycles, 1);
        assert_eq!(config.row_limit, 100);
        assert!(config.safe_mode);
        assert!((config.generation_temperature - 0.1).abs() < f32::EPSILON);
    }
}
