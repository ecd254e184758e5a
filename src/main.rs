use nl2sql::config::{PipelineConfig, StorageConfig};
use nl2sql::context_builder::ContextBuilder;
use nl2sql::db::SqliteStore;
use nl2sql::llm::LlmClient;
use nl2sql::observability::QueryLog;
use nl2sql::pipeline::SqlGenerator;
use nl2sql::service::QueryService;
use nl2sql::Nl2SqlError;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "nl2sql")]
#[command(about = "Ask natural-language questions about uploaded CSV/JSON tables")]
#[command(version)]
struct Args {
    /// SQLite file holding uploaded tables (or set NL2SQL_DATABASE)
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Append a JSON line per answered question (or set NL2SQL_QUERY_LOG)
    #[arg(long, global = true)]
    query_log: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a CSV file or JSON array of objects into a new table
    Upload {
        file: PathBuf,
    },

    /// List uploaded tables
    Tables,

    /// Drop an uploaded table
    Delete {
        table: String,
    },

    /// Print the context the model sees for a table
    Context {
        table: String,
    },

    /// Generate and validate SQL without running it
    Generate {
        table: String,
        question: String,
    },

    /// Generate SQL, run it and print the rows as JSON
    Query {
        table: String,
        question: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut storage = StorageConfig::from_env();
    if let Some(database) = args.database {
        storage.database = database;
    }
    if let Some(query_log) = args.query_log {
        storage.query_log = Some(query_log);
    }

    let store = Arc::new(
        SqliteStore::open(&storage.database)?.with_sample_limit(storage.sample_limit),
    );

    match args.command {
        Commands::Upload { file } => {
            let ctx = store.create_table_from_file(&file)?;
            info!("Uploaded {} as {}", file.display(), ctx.table_name);
            println!("{}", serde_json::to_string_pretty(&ctx)?);
        }
        Commands::Tables => {
            for table in store.list_tables()? {
                println!("{}", table);
            }
        }
        Commands::Delete { table } => {
            store.delete_table(&table)?;
            println!("Deleted {}", table);
        }
        Commands::Context { table } => {
            let pipeline = PipelineConfig::default();
            let ctx = store.get_table_context(&table)?;
            println!("{}", ContextBuilder::new(pipeline.context).build(&ctx));
        }
        Commands::Generate { table, question } => {
            let generator = build_generator()?;
            let ctx = store.get_table_context(&table)?;
            match generator.generate(&question, &ctx).await {
                Ok(query) => println!("{}", query),
                Err(e) => return Err(report(e)),
            }
        }
        Commands::Query { table, question } => {
            let generator = build_generator()?;
            let query_log = Arc::new(QueryLog::new(storage.query_log.clone(), 1000));
            if let Some(path) = query_log.log_file() {
                info!("Recording questions to {}", path.display());
            }
            let service = QueryService::new(store.clone(), store.clone(), generator, query_log);

            match service.answer(&table, &question).await {
                Ok(answer) => println!("{}", serde_json::to_string_pretty(&answer)?),
                Err(e) => return Err(report(e)),
            }
        }
    }

    Ok(())
}

fn build_generator() -> Result<SqlGenerator> {
    let client = LlmClient::from_env()?;
    debug!("Using model {} at {}", client.config().model, client.config().base_url);
    Ok(SqlGenerator::new(Arc::new(client), PipelineConfig::default()))
}

fn report(e: Nl2SqlError) -> anyhow::Error {
    error!("{}", e);
    anyhow::anyhow!(e.user_message())
}
