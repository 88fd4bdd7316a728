mod import;
mod run;
mod status;
mod upload;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use server::config::{AppConfig, CONFIG_FILE, DEFAULT_DB_NAME, VYVE_DIR};
use server::{create_router, state::AppState};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "vyve")]
#[command(about = "Phase-based document analysis service", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create `.vyve/` with a config file and an empty database
    Init,
    /// Start the HTTP API
    Serve(ServeArgs),
    /// Load phase prompts and reference documents from a JSON file
    ImportPrompts { file: PathBuf },
    /// Run one phase in-process and follow its steps
    RunPhase {
        phase: i64,
        #[arg(short, long)]
        model: Option<String>,
    },
    /// Upload a document to a running server
    Upload {
        file: PathBuf,
        #[arg(short, long)]
        company: String,
        #[arg(long, default_value = "standard")]
        method: String,
        #[arg(long, default_value = "http://localhost:3001")]
        server: String,
    },
    /// Show the status of every phase
    Status,
}

/// Flags that override the loaded configuration.
#[derive(Args, Default)]
struct ServeArgs {
    #[arg(short, long)]
    port: Option<u16>,

    #[arg(long)]
    host: Option<String>,

    #[arg(long)]
    database_url: Option<String>,

    #[arg(long)]
    model: Option<String>,

    /// Directory with a built front-end to serve
    #[arg(long)]
    app_dir: Option<PathBuf>,
}

impl ServeArgs {
    fn apply(self, config: &mut AppConfig) {
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(host) = self.host {
            config.server.host = host;
        }
        if let Some(url) = self.database_url {
            config.database.url = url;
        }
        if let Some(model) = self.model {
            config.llm.default_model = model;
        }
        if let Some(dir) = self.app_dir {
            config.server.app_dir = Some(dir);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let cwd = std::env::current_dir()?;
    match cli.command {
        Some(Commands::Init) => init_project().await,
        Some(Commands::Serve(args)) => serve(load_config().await?, args).await,
        Some(Commands::ImportPrompts { file }) => {
            import::import_prompts(&load_config().await?, &file).await
        }
        Some(Commands::RunPhase { phase, model }) => {
            run::run_phase(&load_config().await?, phase, model).await
        }
        Some(Commands::Upload {
            file,
            company,
            method,
            server,
        }) => upload::upload(&server, &file, &company, &method).await,
        Some(Commands::Status) => status::status(&load_config().await?, &cwd).await,
        None => serve(load_config().await?, ServeArgs::default()).await,
    }
}

async fn load_config() -> Result<AppConfig> {
    let cwd = std::env::current_dir()?;
    AppConfig::load(&cwd)
        .await
        .context("Failed to load configuration")
}

async fn init_project() -> Result<()> {
    let cwd = std::env::current_dir()?;
    let vyve_dir = cwd.join(VYVE_DIR);
    let config_path = AppConfig::path(&cwd);

    if config_path.exists() {
        println!("Project already initialized at {}", vyve_dir.display());
        return Ok(());
    }

    println!("Initializing Vyve in {}", cwd.display());

    let config = AppConfig::default();
    config
        .write(&cwd)
        .await
        .context("Failed to write config")?;

    let db_path = vyve_dir.join(DEFAULT_DB_NAME);
    let database_url = format!("sqlite:{}", db_path.display());
    let pool = db::create_pool(&database_url)
        .await
        .context("Failed to create database")?;
    db::run_migrations(&pool).await?;

    println!();
    println!("Created:");
    println!("  {}/", VYVE_DIR);
    println!("  ├── {}", CONFIG_FILE);
    println!("  └── {}", DEFAULT_DB_NAME);
    println!();
    println!("Next steps:");
    println!("  1. Put OPENAI_API_KEY and VITE_SUPABASE_FUNCTIONS_URL in .env");
    println!("  2. Run 'vyve import-prompts prompts.json'");
    println!("  3. Run 'vyve serve'");

    Ok(())
}

async fn serve(mut config: AppConfig, args: ServeArgs) -> Result<()> {
    args.apply(&mut config);

    tracing::info!("Database: {}", config.database.url);
    tracing::info!("Default model: {}", config.llm.default_model);

    let state = AppState::from_config(&config).await?;
    let app = create_router(state);

    let address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;

    let port = config.server.port;
    println!();
    println!("Vyve");
    println!("════════════════════════════════════════");
    println!();
    println!("  API Server:  http://localhost:{}", port);
    println!("  Swagger UI:  http://localhost:{}/swagger-ui", port);
    println!("  Events:      http://localhost:{}/api/events", port);
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    axum::serve(listener, app).await?;

    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vyve=info,server=info,orchestrator=info,tower_http=info".into()),
        )
        .try_init();
}
