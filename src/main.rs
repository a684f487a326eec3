//! Keepsake backend entry point

use clap::{Parser, Subcommand};
use keepsake::{web, AppConfig, AuthContext};
use tracing::{error, info};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the gallery backend (default)
    Serve {
        /// Port to listen on, overriding configuration
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("keepsake=debug,tower_http=info")
        .init();

    let cli = Cli::parse();
    let Commands::Serve { port } = cli.command.unwrap_or(Commands::Serve { port: None });

    let mut config = AppConfig::from_env().unwrap_or_else(|e| {
        error!("Failed to load config: {}. Using defaults.", e);
        AppConfig::default()
    });

    if let Some(port) = port {
        config.port = port;
    }

    info!(
        "Configuration loaded for relying party '{}'",
        config.webauthn.rp_name
    );

    let addr = format!("{}:{}", config.host, config.port);

    let ctx = AuthContext::new(config).await?;
    info!("Database initialized");

    let app = web::create_router(ctx);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Keepsake backend running at http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
