//! Intent analysis.
//!
//! Structured extraction of what a natural-language question actually asks
//! for: tables, columns, filter descriptions, and requested operations. The
//! analysis feeds both the SQL generator and the reflection critique.

use crate::error::Result;
use crate::gateway::{ChatCompletion, ChatMessage};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// Structured view of a natural-language request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntentAnalysis {
    #[serde(default)]
    pub tables: Vec<String>,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub filters: Vec<String>,
    #[serde(default)]
    pub operations: Vec<String>,
}

/// LLM-backed extractor producing an `IntentAnalysis` for a question.
pub struct IntentAnalyzer {
    gateway: Arc<dyn ChatCompletion>,
    temperature: f32,
}

impl IntentAnalyzer {
    pub fn new(gateway: Arc<dyn ChatCompletion>) -> Self {
        Self {
            gateway,
            temperature: 0.1,
        }
    }

    /// Extract intent fields from the question. Falls back to an empty
    /// analysis when the model response cannot be parsed; the pipeline can
    /// run with a weaker critique, so a malformed extraction is not fatal.
    pub async fn analyze(&self, question: &str, schema_summary: &str) -> Result<IntentAnalysis> {
        let prompt = format!(
            r#"Extract from the question and return JSON only:
Question: "{}"
Schema:
{}
Format: {{"tables":["t"],"columns":["c"],"filters":["description"],"operations":["aggregation"|"ordering"|"grouping"|"join"|"limit"]}}"#,
            question, schema_summary
        );

        let messages = vec![
            ChatMessage::system("Return JSON only, no text."),
            ChatMessage::user(prompt),
        ];

        let response = self
            .gateway
            .complete(&messages, self.temperature, &HashMap::new())
            .await?;

        let cleaned = response
            .trim()
            .trim_start_matches("```json")
            .trim_start_matches("```")
            .trim_end_matches("```")
            .trim();

        match serde_json::from_str::<IntentAnalysis>(cleaned) {
            Ok(intent) => Ok(intent),
            Err(e) => {
                warn!("Failed to parse intent analysis, using empty intent: {}", e);
                Ok(IntentAnalysis::default())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intent_deserializes_with_missing_fields() {
        let intent: IntentAnalysis = serde_json::from_str(r#"{"tables":["Customers"]}"#).unwrap();
        assert_eq!(intent.tables, vec!["Customers"]);
        assert!(intent.columns.is_empty());
        assert!(intent.filters.is_empty());
        assert!(intent.operations.is_empty());
    }
}
