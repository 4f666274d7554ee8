//! Reflection agent.
//!
//! Critiques a candidate SQL query against the original question, the schema,
//! and the extracted intent, returning a structured verdict. The agent is
//! fail-open: a malformed critique response or a failed model call produces a
//! default verdict instead of an error, so a misbehaving critique model can
//! never block the pipeline. The signature reflects that: `reflect` returns
//! a verdict, not a `Result`. Retry, if any, belongs to the orchestrator.

use crate::gateway::{ChatCompletion, ChatMessage};
use crate::intent::IntentAnalysis;
use crate::schema::{self, SchemaDescriptor};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Category of a reflection finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueType {
    Correctness,
    Tables,
    Joins,
    Columns,
    Filters,
    Aggregations,
    Ordering,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReflectionIssue {
    pub issue_type: IssueType,
    pub description: String,
    #[serde(default)]
    pub suggestion: String,
}

fn default_score() -> u8 {
    7
}

/// Structured critique of one SQL candidate. Produced once per reflection
/// call; immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReflectionVerdict {
    #[serde(default)]
    pub needs_improvement: bool,
    #[serde(default = "default_score")]
    pub correctness_score: u8,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub issues: Vec<ReflectionIssue>,
    #[serde(default)]
    pub feedback: String,
    #[serde(default)]
    pub improved_query: Option<String>,
    /// Populated only when the critique itself failed (fail-open path).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ReflectionVerdict {
    /// Default verdict used when the critique response is unparseable.
    fn fallback() -> Self {
        Self {
            needs_improvement: false,
            correctness_score: default_score(),
            strengths: vec!["Query appears consistent with the request.".to_string()],
            issues: Vec::new(),
            feedback: String::new(),
            improved_query: None,
            error: None,
        }
    }

    /// Verdict used when prompt construction or the model call failed.
    fn from_error(message: String) -> Self {
        Self {
            needs_improvement: false,
            correctness_score: default_score(),
            strengths: Vec::new(),
            issues: Vec::new(),
            feedback: "An error occurred during reflection.".to_string(),
            improved_query: None,
            error: Some(message),
        }
    }

    /// True when the orchestrator should adopt `improved_query`.
    pub fn has_improvement(&self) -> bool {
        self.needs_improvement
            && self
                .improved_query
                .as_deref()
                .map(|q| !q.trim().is_empty())
                .unwrap_or(false)
    }
}

/// Locate the JSON object between the first `{` and the last `}`.
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

/// LLM-backed critique of SQL candidates.
pub struct ReflectionAgent {
    gateway: Arc<dyn ChatCompletion>,
    temperature: f32,
}

impl ReflectionAgent {
    pub fn new(gateway: Arc<dyn ChatCompletion>, temperature: f32) -> Self {
        Self {
            gateway,
            temperature,
        }
    }

    fn build_prompt(
        question: &str,
        sql: &str,
        schema_summary: &str,
        intent: &IntentAnalysis,
    ) -> String {
        format!(
            r#"Review this SQL query against the user's request and return JSON only.

User question: "{}"

Candidate SQL:
{}

Schema:
{}

Extracted intent:
- tables: {}
- columns: {}
- filters: {}
- operations: {}

Return JSON in this exact format:
{{
  "needs_improvement": true|false,
  "correctness_score": 1-10,
  "strengths": ["..."],
  "issues": [
    {{"issue_type": "correctness"|"tables"|"joins"|"columns"|"filters"|"aggregations"|"ordering", "description": "...", "suggestion": "..."}}
  ],
  "feedback": "...",
  "improved_query": "SQL" | null
}}

Set improved_query only when needs_improvement is true."#,
            question,
            sql,
            schema_summary,
            intent.tables.join(", "),
            intent.columns.join(", "),
            intent.filters.join(", "),
            intent.operations.join(", ")
        )
    }

    /// Critique `sql`. This call cannot fail: every error path folds into a
    /// verdict variant.
    pub async fn reflect(
        &self,
        question: &str,
        sql: &str,
        schema: &SchemaDescriptor,
        intent: &IntentAnalysis,
    ) -> ReflectionVerdict {
        let schema_summary = schema::summarize(schema);
        let prompt = Self::build_prompt(question, sql, &schema_summary, intent);
        let messages = vec![
            ChatMessage::system("You are a meticulous SQL reviewer. Return JSON only, no text."),
            ChatMessage::user(prompt),
        ];

        let response = match self
            .gateway
            .complete(&messages, self.temperature, &HashMap::new())
            .await
        {
            Ok(text) => text,
            Err(e) => {
                warn!("Reflection call failed, continuing without critique: {}", e);
                return ReflectionVerdict::from_error(e.to_string());
            }
        };

        Self::parse_verdict(&response)
    }

    /// Strict JSON decode of the `{...}` substring, with fail-open fallback.
    fn parse_verdict(response: &str) -> ReflectionVerdict {
        let Some(json_text) = extract_json_object(response) else {
            warn!("Reflection response contained no JSON object, using default verdict");
            return ReflectionVerdict::fallback();
        };

        match serde_json::from_str::<ReflectionVerdict>(json_text) {
            Ok(verdict) => {
                debug!(
                    "Reflection verdict: needs_improvement={}, score={}",
                    verdict.needs_improvement, verdict.correctness_score
                );
                verdict
            }
            Err(e) => {
                warn!("Failed to decode reflection verdict, using default: {}", e);
                let mut verdict = ReflectionVerdict::fallback();
                verdict.error = Some(format!("invalid verdict JSON: {}", e));
                verdict
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_object() {
        assert_eq!(extract_json_object(r#"text {"a": 1} tail"#), Some(r#"{"a": 1}"#));
        assert_eq!(extract_json_object("no braces here"), None);
        assert_eq!(extract_json_object("} inverted {"), None);
    }

    #[test]
    fn test_parse_verdict_happy_path() {
        let verdict = ReflectionAgent::parse_verdict(
            r#"Here you go:
{"needs_improvement": true, "correctness_score": 4,
 "strengths": ["uses the right table"],
 "issues": [{"issue_type": "filters", "description": "missing WHERE", "suggestion": "add one"}],
 "feedback": "close", "improved_query": "SELECT * FROM t WHERE x = 1;"}"#,
        );
        assert!(verdict.needs_improvement);
        assert_eq!(verdict.correctness_score, 4);
        assert_eq!(verdict.issues.len(), 1);
        assert_eq!(verdict.issues[0].issue_type, IssueType::Filters);
        assert!(verdict.has_improvement());
    }

    #[test]
    fn test_no_braces_falls_open() {
        let verdict = ReflectionAgent::parse_verdict("I cannot review this query, sorry.");
        assert!(!verdict.needs_improvement);
        assert_eq!(verdict.correctness_score, 7);
        assert!(!verdict.strengths.is_empty());
        assert!(verdict.error.is_none());
    }

    #[test]
    fn test_malformed_json_falls_open_with_error() {
        let verdict = ReflectionAgent::parse_verdict(r#"{"needs_improvement": tru"#);
        // No closing brace: treated as no JSON object at all.
        assert!(!verdict.needs_improvement);

        let verdict = ReflectionAgent::parse_verdict(r#"{"needs_improvement": tru}"#);
        assert!(!verdict.needs_improvement);
        assert_eq!(verdict.correctness_score, 7);
        assert!(verdict.error.is_some());
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let verdict = ReflectionAgent::parse_verdict(r#"{"needs_improvement": false}"#);
        assert_eq!(verdict.correctness_score, 7);
        assert!(verdict.issues.is_empty());
        assert!(verdict.improved_query.is_none());
    }

    #[test]
    fn test_empty_improved_query_is_not_an_improvement() {
        let verdict = ReflectionAgent::parse_verdict(
            r#"{"needs_improvement": true, "improved_query": "  "}"#,
        );
        assert!(!verdict.has_improvement());
    }
}
