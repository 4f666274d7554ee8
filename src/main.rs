use anyhow::{Context, Result};
use clap::Parser;
use sqlpilot::db;
use sqlpilot::executor::ExecutionAdapter;
use sqlpilot::gateway::{ChatCompletion, ModelGateway};
use sqlpilot::generator::SqlGenerator;
use sqlpilot::history::RunHistory;
use sqlpilot::intent::IntentAnalyzer;
use sqlpilot::orchestrator::{Orchestrator, PipelineStatus, QueryRequest};
use sqlpilot::reflection::ReflectionAgent;
use sqlpilot::{schema, PilotConfig, ResponseCache};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "sqlpilot")]
#[command(about = "Natural-language SQL assistant with reflective self-review")]
struct Args {
    /// The question in natural language
    question: String,

    /// PostgreSQL connection string (or set DATABASE_URL)
    #[arg(long)]
    database_url: Option<String>,

    /// Model identifier; the provider is derived from its prefix
    #[arg(long)]
    model: Option<String>,

    /// API key (or set LLM_API_KEY / OPENAI_API_KEY)
    #[arg(long)]
    api_key: Option<String>,

    /// Maximum rows returned by execution
    #[arg(long)]
    row_limit: Option<usize>,

    /// Allow destructive statements (disables safe mode)
    #[arg(long)]
    allow_writes: bool,

    /// Restrict generation to these tables (repeatable)
    #[arg(long)]
    source: Vec<String>,

    /// SQLite file for run history
    #[arg(long, default_value = "sqlpilot_history.db")]
    history_db: PathBuf,

    /// Skip run-history persistence
    #[arg(long)]
    no_history: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let mut config = PilotConfig::from_env();
    if let Some(model) = args.model {
        config.model = model;
    }
    if let Some(key) = args.api_key {
        config.api_key = key;
    }
    if let Some(limit) = args.row_limit {
        config.row_limit = limit;
    }
    if args.allow_writes {
        config.safe_mode = false;
    }

    info!("sqlpilot starting with model '{}'", config.model);

    let database_url = args
        .database_url
        .or_else(|| std::env::var("DATABASE_URL").ok())
        .context("DATABASE_URL is required (--database-url or env var)")?;

    let pool = db::init_pool(&database_url)
        .await
        .context("Failed to connect to database")?;

    let descriptor = db::PostgresIntrospector::new(pool.clone())
        .load_schema()
        .await?;
    let schema_summary = schema::summarize(&descriptor);

    let gateway: Arc<dyn ChatCompletion> = Arc::new(ModelGateway::new(&config)?);
    let cache = Arc::new(ResponseCache::new(config.cache_ttl_seconds));

    let intent = IntentAnalyzer::new(gateway.clone())
        .analyze(&args.question, &schema_summary)
        .await?;

    let generator =
        SqlGenerator::new(gateway.clone(), config.generation_temperature).with_cache(cache);
    let reflector = ReflectionAgent::new(gateway.clone(), config.reflection_temperature);
    let adapter = ExecutionAdapter::new(Arc::new(db::PostgresExecutor::new(pool)));
    let orchestrator = Orchestrator::new(generator, reflector, adapter, &config);

    let request = QueryRequest::new(args.question.clone()).with_sources(args.source.clone());
    let result = orchestrator.run(&request, &descriptor, &intent).await;

    if !args.no_history {
        let history = RunHistory::open(&args.history_db)?;
        history.record(&args.question, &result)?;
    }

    println!("\n=== sqlpilot ===");
    println!("Question: {}", args.question);
    if let Some(sql) = &result.sql {
        println!("SQL: {}", sql);
    }
    println!(
        "Candidates: {}, reflections: {}",
        result.audit.candidates.len(),
        result.audit.verdicts.len()
    );

    match result.status {
        PipelineStatus::Done => {
            if let Some(execution) = &result.execution {
                println!(
                    "Rows: {} ({:.3}s)",
                    execution.row_count, execution.execution_time
                );
                if let Some(rows) = &execution.rows {
                    println!("{}", serde_json::to_string_pretty(rows)?);
                }
            }
        }
        PipelineStatus::Failed => {
            println!(
                "Failed: {}",
                result.error.as_deref().unwrap_or("unknown error")
            );
            std::process::exit(1);
        }
    }

    Ok(())
}
