pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod executor;
pub mod gateway;
pub mod generator;
pub mod guards;
pub mod history;
pub mod intent;
pub mod metrics;
pub mod orchestrator;
pub mod reflection;
pub mod retry;
pub mod schema;

pub use cache::ResponseCache;
pub use config::PilotConfig;
pub use error::{PilotError, Result};
pub use executor::{ExecutionAdapter, ExecutionResult, SqlExecutor};
pub use gateway::{ChatCompletion, ChatMessage, ModelGateway};
pub use generator::SqlGenerator;
pub use intent::{IntentAnalysis, IntentAnalyzer};
pub use orchestrator::{Orchestrator, PipelineResult, PipelineStatus, QueryRequest};
pub use reflection::{ReflectionAgent, ReflectionVerdict};
pub use retry::RetryPolicy;
pub use schema::SchemaDescriptor;
