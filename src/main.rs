use anyhow::Result;
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

mod answer;
mod config;
mod content;
mod error;
mod ident;
mod init;
mod nlp;
mod reconcile;
mod serve;
mod store;
mod summaries;
mod sync;
mod telemetry;
mod util;

#[derive(Parser)]
#[command(name = "essayqa", about = "Essay summarization and QA pipeline CLI")]
struct Cli {
    #[arg(global = true, short, long)]
    dsn: Option<String>,
    /// Emit a single JSON envelope to stdout; logs go to stderr
    #[arg(global = true, long, default_value_t = false)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the schema and apply migrations
    Init(init::InitCmd),
    /// Ingest unseen essays: summarize, store, and index them
    Sync(sync::SyncCmd),
    /// Stage and submit corpus documents
    Documents(reconcile::DocumentsCmd),
    /// Stage and submit summary rows
    Summaries(summaries::SummariesCmd),
    /// Ask one question from the command line
    Ask(answer::AskCmd),
    /// Run the HTTP question-answering server
    Serve(serve::ServeCmd),
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let cli = Cli::parse();
    telemetry::config::set_json_mode(cli.json);
    telemetry::config::init_tracing();

    let config = config::AppConfig::from_env(cli.dsn)?;

    match cli.command {
        Commands::Init(args) => init::run(&config.database_url, args).await?,
        command => {
            let pool = PgPool::connect(&config.database_url).await?;

            // ctrl-c flips the token; long loops check it between steps
            let cancel = CancellationToken::new();
            let ctrlc = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    ctrlc.cancel();
                }
            });

            match command {
                Commands::Init(_) => unreachable!(),
                Commands::Sync(args) => sync::run(&pool, &config, &cancel, args).await?,
                Commands::Documents(args) => reconcile::run(&pool, &config, &cancel, args).await?,
                Commands::Summaries(args) => summaries::run(&pool, &config, &cancel, args).await?,
                Commands::Ask(args) => answer::run(&pool, &config, &cancel, args).await?,
                Commands::Serve(args) => serve::run(&pool, &config, &cancel, args).await?,
            }
        }
    }

    Ok(())
}
