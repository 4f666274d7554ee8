//! SQL generation.
//!
//! Turns a natural-language question into a candidate SQL string via the
//! model gateway. The returned text is not validated as SQL here; validation
//! happens downstream in reflection and execution. Completions are memoized
//! through the response cache so repeated questions do not bill twice.

use crate::cache::ResponseCache;
use crate::error::{PilotError, Result};
use crate::gateway::{ChatCompletion, ChatMessage};
use itertools::Itertools;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// One queryable source and the columns it exposes.
#[derive(Debug, Clone)]
pub struct SourceColumns {
    pub source: String,
    pub columns: Vec<String>,
}

/// Generates candidate SQL from natural language plus source metadata.
pub struct SqlGenerator {
    gateway: Arc<dyn ChatCompletion>,
    cache: Option<Arc<ResponseCache>>,
    temperature: f32,
}

impl SqlGenerator {
    pub fn new(gateway: Arc<dyn ChatCompletion>, temperature: f32) -> Self {
        Self {
            gateway,
            cache: None,
            temperature,
        }
    }

    /// Share a response cache across generators/requests.
    pub fn with_cache(mut self, cache: Arc<ResponseCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    fn build_system_prompt(sources: &[SourceColumns]) -> String {
        let source_list = sources
            .iter()
            .map(|s| format!("- {}: {}", s.source, s.columns.iter().join(", ")))
            .join("\n");

        format!(
            "You translate natural-language questions into a single SQL query.\n\
             Available sources and their columns:\n{}\n\
             Rules: return exactly one SQL statement, no explanations, no markdown.",
            source_list
        )
    }

    /// Produce a candidate SQL string for the question.
    pub async fn generate(
        &self,
        question: &str,
        sources: &[SourceColumns],
        context: Option<&str>,
    ) -> Result<String> {
        let system_prompt = Self::build_system_prompt(sources);
        let model = self.gateway.model_id().to_string();

        if let Some(cache) = &self.cache {
            if let Some(cached) = cache.get(question, &system_prompt, &model, context) {
                if let Some(sql) = cached.as_str() {
                    info!("Using cached SQL for question");
                    return Ok(sql.to_string());
                }
            }
        }

        let mut messages = vec![ChatMessage::system(system_prompt.clone())];
        if let Some(ctx) = context {
            messages.push(ChatMessage::user(format!("Conversation context:\n{}", ctx)));
        }
        messages.push(ChatMessage::user(question.to_string()));

        let response = self
            .gateway
            .complete(&messages, self.temperature, &HashMap::new())
            .await?;

        let sql = strip_markdown_fences(&response);
        if sql.is_empty() {
            return Err(PilotError::Generation(
                "model returned an empty SQL candidate".to_string(),
            ));
        }
        debug!("Generated SQL candidate: {}", sql);

        if let Some(cache) = &self.cache {
            cache.set(
                question,
                serde_json::Value::String(sql.clone()),
                &system_prompt,
                &model,
                context,
            );
        }

        Ok(sql)
    }
}

/// Remove surrounding ```sql / ```json fences a chat model may emit.
pub(crate) fn strip_markdown_fences(text: &str) -> String {
    text.trim()
        .trim_start_matches("```sql")
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
        .to_string()
}
