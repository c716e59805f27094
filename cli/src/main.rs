mod commands;
mod config;
mod gemini;
mod server;

use std::process;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::commands::{cmd_family, cmd_history, cmd_ingredients, cmd_suggest};
use crate::config::Config;
use crate::gemini::GeminiClient;
use kondate_core::db::Database;
use kondate_core::service::RecipePlanner;

#[derive(Parser)]
#[command(
    name = "kondate",
    version,
    about = "Family meal planning with AI menu suggestions",
    long_about = "\n\n  献立 kondate\n  what's for dinner, sorted.\n"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the REST API server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
        /// Address to bind to (default: 127.0.0.1, use 0.0.0.0 to expose to network)
        #[arg(short, long, default_value = "127.0.0.1")]
        bind: String,
    },
    /// Ask the model for three menus using an account's family and ingredients
    Suggest {
        /// Account email
        #[arg(short, long)]
        email: String,
        /// Meal pattern: full_meal, one_bowl, one_plate, bento
        #[arg(short, long)]
        pattern: Option<String>,
        /// Free-text request (e.g. "時短で", "魚料理")
        request: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show past suggestions, newest first
    History {
        /// Account email
        #[arg(short, long)]
        email: String,
        /// Number of entries to show (default: all)
        #[arg(short, long)]
        limit: Option<usize>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List registered family members
    Family {
        /// Account email
        #[arg(short, long)]
        email: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List on-hand ingredients by category
    Ingredients {
        /// Account email
        #[arg(short, long)]
        email: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                EnvFilter::new("kondate=info,kondate_core=info,tower_http=warn")
            }),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn build_planner(config: &Config) -> Result<Option<RecipePlanner>> {
    let Some(api_key) = config.api_key.clone() else {
        return Ok(None);
    };
    let client = GeminiClient::new(api_key)?;
    Ok(Some(RecipePlanner::new(
        Arc::new(client),
        config.models.clone(),
    )))
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let db = Database::open(&config.db_path)?;
    tracing::debug!(db = %config.db_path.display(), "opened database");

    match cli.command {
        Commands::Serve { port, bind } => {
            let state = server::AppState {
                store: Arc::new(Mutex::new(db)),
                planner: build_planner(&config)?.map(Arc::new),
            };
            server::start_server(state, port, &bind).await
        }
        Commands::Suggest {
            email,
            pattern,
            request,
            json,
        } => {
            let planner = build_planner(&config)?
                .context("GOOGLE_API_KEY is not set; it is required for suggestions")?;
            let store = Mutex::new(db);
            cmd_suggest(
                &store,
                &planner,
                &email,
                pattern.as_deref(),
                request.as_deref(),
                json,
            )
            .await
        }
        Commands::History { email, limit, json } => cmd_history(&db, &email, limit, json),
        Commands::Family { email, json } => cmd_family(&db, &email, json),
        Commands::Ingredients { email, json } => cmd_ingredients(&db, &email, json),
    }
}
