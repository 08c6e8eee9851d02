//! imagegen-plugin - Serve the image generation chat plugin.

use clap::{Parser, Subcommand};
use imagegen_plugin::api::{create_router_with_state, AppState};
use imagegen_plugin::config::Config;
use std::path::PathBuf;
use tokio::signal;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "imagegen-plugin")]
#[command(about = "Chat plugin that turns text-to-image API calls into Markdown")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the plugin server
    Serve {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Config file path
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Emit logs as JSON lines
        #[arg(long)]
        json_logs: bool,
    },

    /// Show current configuration
    Config {
        /// Show config file path
        #[arg(long)]
        path: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Serve { port, config, json_logs }) => {
            run_server(port, config, json_logs).await?;
        }
        Some(Commands::Config { path }) => {
            show_config(path)?;
        }
        None => {
            run_server(None, None, false).await?;
        }
    }

    Ok(())
}

fn init_tracing(debug: bool, json_logs: bool) {
    let default_level = if debug { tracing::Level::DEBUG } else { tracing::Level::INFO };
    let filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();

    if json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false))
            .init();
    }
}

async fn run_server(
    port_override: Option<u16>,
    config_path: Option<PathBuf>,
    json_logs: bool,
) -> anyhow::Result<()> {
    let config = match config_path {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let mut config = config.with_env_overrides();
    if let Some(port) = port_override {
        config.server.port = port;
    }

    init_tracing(config.runtime.debug, json_logs);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!(
        environment = ?config.runtime.environment,
        variant = ?config.generation.variant,
        base_url = ?config.public.base_url,
        "starting plugin server"
    );

    let state = AppState::new(config)?;
    let app = create_router_with_state(state);

    println!("→ imagegen-plugin listening on http://{}", addr);
    println!("→ Manifest: http://{}/manifest.json", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Plugin listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    println!("\nPlugin server stopped.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

fn show_config(show_path: bool) -> anyhow::Result<()> {
    if show_path {
        println!("{}", Config::default_path().display());
        return Ok(());
    }

    let config = Config::load()?.with_env_overrides();
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}
