use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use clarita_pm::{api, config::Config, engine::HealthStatus, mcp};

#[derive(Parser)]
#[command(name = "clarita")]
#[command(about = "Turn feature requests into tickets through a short conversation")]
struct Cli {
    /// Skip the text-generation backend and use deterministic fallbacks
    #[arg(long, global = true)]
    offline: bool,

    /// Keep sessions in a SQLite database at this path
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API
    Serve {
        /// Port for HTTP API
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },
    /// Start MCP server via stdio (for IDE agent integration)
    Mcp,
    /// Probe the text-generation backend and exit
    Health,
}

/// Initialize tracing with output to stderr (for MCP mode) or stdout
fn init_tracing(use_stderr: bool) {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "clarita_pm=debug,tower_http=debug".into()),
    );

    if use_stderr {
        // MCP mode: log to stderr so stdout is clean for protocol
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

async fn serve(config: &Config, port: u16) -> anyhow::Result<()> {
    tracing::info!("Starting ClaritaPM server on port {}", port);

    let assistant = Arc::new(config.build_assistant()?);
    let app = api::create_router(assistant);

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    tracing::info!("ClaritaPM server listening on http://127.0.0.1:{}", port);

    axum::serve(listener, app).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // MCP mode needs stderr for logging since stdout is the protocol channel
    let use_stderr = matches!(cli.command, Some(Commands::Mcp));
    init_tracing(use_stderr);

    let mut config = Config::from_env();
    if cli.offline {
        config.offline = true;
    }
    if cli.db.is_some() {
        config.db_path = cli.db;
    }

    match cli.command {
        Some(Commands::Serve { port }) => serve(&config, port).await?,
        Some(Commands::Mcp) => {
            let assistant = Arc::new(config.build_assistant()?);
            mcp::run_stdio_server(assistant).await?;
        }
        Some(Commands::Health) => {
            let assistant = config.build_assistant()?;
            let report = assistant.health().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if report.status == HealthStatus::Degraded {
                std::process::exit(1);
            }
        }
        None => serve(&config, 3000).await?,
    }

    Ok(())
}
