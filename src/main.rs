use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use sqlx::sqlite::SqlitePoolOptions;
use tokio::signal;

use crate::config::Config;
use utils::cli::Args;
use utils::state::AppState;

mod api;
mod config;
mod domain;
mod error;
mod service;
mod utils;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("delivery_ws=info,tower_http=info")
            }),
        )
        .init();

    let args = Args::parse();
    let config = validate_config(&args).await;

    let pool = SqlitePoolOptions::new()
        .max_connections(12)
        .connect(args.database_url.as_str())
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let state = Arc::new(AppState::new(config, Arc::new(pool))?);

    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(format!("{}:{}", args.host, args.port)).await?;
    println!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    println!("Shutting down...");
}

async fn validate_config(args: &Args) -> Config {
    let mut validation_errors = Vec::new();

    for (name, dir) in [
        ("DELIVERY_MONITORED_DIR", &args.monitored_directory),
        ("DELIVERY_PROJECTS_DIR", &args.projects_directory),
        ("DELIVERY_STAGING_DIR", &args.staging_directory),
    ] {
        match tokio::fs::metadata(dir).await {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => validation_errors.push(format!("{name} `{dir}` exists but is not a directory")),
            Err(_) => validation_errors.push(format!("{name} `{dir}` does not exist")),
        }
    }

    let db_path = args.database_url.trim_start_matches("sqlite://");
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            validation_errors.push(format!(
                "The directory for the database `{}` does not exist",
                parent.display(),
            ));
        }
    }

    let staging_command = split_command("DELIVERY_STAGING_COMMAND", &args.staging_command)
        .unwrap_or_else(|e| {
            validation_errors.push(e);
            Vec::new()
        });
    let mover_command =
        split_command("DELIVERY_MOVER_COMMAND", &args.mover_command).unwrap_or_else(|e| {
            validation_errors.push(e);
            Vec::new()
        });

    if !validation_errors.is_empty() {
        eprintln!("{}", validation_errors.join("\n"));
        std::process::exit(1);
    }

    Config {
        host: args.host.clone(),
        port: args.port,
        db_url: args.database_url.clone(),
        monitored_dir: args.monitored_directory.clone(),
        projects_dir: args.projects_directory.clone(),
        staging_dir: args.staging_directory.clone(),
        base_url: args.base_url.clone(),
        staging_command,
        mover_command,
        dds_base_url: args.dds_base_url.clone(),
        dds_timeout_secs: args.dds_timeout_secs,
    }
}

fn split_command(name: &str, command: &str) -> Result<Vec<String>, String> {
    let parts: Vec<String> = command.split_whitespace().map(str::to_string).collect();
    if parts.is_empty() {
        return Err(format!("{name} must not be empty"));
    }
    Ok(parts)
}
