mod config;
mod error;
mod handlers;
mod state;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use hashdrop_core::commands::sweep::run_periodic;
use hashdrop_core::config::{parse_human_duration, RetentionConfig};
use hashdrop_core::Vault;
use tokio::net::TcpListener;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::config::ServerSection;
use crate::state::AppState;

#[derive(Parser)]
#[command(name = "hashdrop-server", version, about = "hashdrop deduplicating file drop")]
struct Cli {
    /// Address to listen on
    #[arg(short, long, default_value = "127.0.0.1:3000")]
    listen: String,

    /// Root directory for stored blobs and the hash index
    #[arg(short, long, default_value = "uploads")]
    data_dir: String,

    /// Serve uploads and listings without a login
    #[arg(long, default_value_t = false)]
    no_auth: bool,

    /// Periodically delete files older than --retention-max-age
    #[arg(long, default_value_t = false)]
    retention: bool,

    /// Maximum age of a stored file (e.g. "30m", "4h", "2d")
    #[arg(long, default_value = "1h", value_parser = parse_duration_arg)]
    retention_max_age: String,

    /// Interval between retention sweeps; defaults to the max age
    #[arg(long, value_parser = parse_duration_arg)]
    sweep_every: Option<String>,

    /// Session lifetime after login
    #[arg(long, default_value = "24h", value_parser = parse_duration_arg)]
    session_ttl: String,

    /// Log output format: "json" or "pretty"
    #[arg(long, default_value = "pretty")]
    log_format: String,

    /// Maximum number of blocking threads for file I/O (minimum 1)
    #[arg(long, default_value_t = 6, value_parser = parse_min_one)]
    max_blocking_threads: usize,

    /// Number of tokio worker threads (minimum 1)
    #[arg(long, default_value_t = 4, value_parser = parse_min_one)]
    worker_threads: usize,
}

fn parse_min_one(s: &str) -> Result<usize, String> {
    let n: usize = s.parse().map_err(|e| format!("{e}"))?;
    if n == 0 {
        return Err("value must be at least 1".into());
    }
    Ok(n)
}

fn parse_duration_arg(s: &str) -> Result<String, String> {
    parse_human_duration(s).map_err(|e| e.to_string())?;
    Ok(s.to_string())
}

fn main() {
    let cli = Cli::parse();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(cli.worker_threads)
        .max_blocking_threads(cli.max_blocking_threads)
        .enable_all()
        .build()
        .unwrap_or_else(|e| {
            eprintln!("Error: failed to build tokio runtime: {e}");
            std::process::exit(1);
        });

    runtime.block_on(async_main(cli));
}

async fn async_main(cli: Cli) {
    let password = std::env::var("HASHDROP_PASSWORD").unwrap_or_default();
    if password.is_empty() && !cli.no_auth {
        eprintln!("Error: HASHDROP_PASSWORD environment variable must be set (or pass --no-auth)");
        std::process::exit(1);
    }

    let session_ttl = parse_human_duration(&cli.session_ttl).unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        std::process::exit(1);
    });

    let config = ServerSection {
        listen: cli.listen,
        data_dir: cli.data_dir,
        auth_enabled: !cli.no_auth,
        password,
        session_ttl_seconds: session_ttl.as_secs(),
        log_format: cli.log_format,
        retention: RetentionConfig {
            enabled: cli.retention,
            max_age: cli.retention_max_age,
            every: cli.sweep_every,
        },
    };

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match config.log_format.as_str() {
        "json" => {
            tracing_subscriber::fmt().json().with_env_filter(filter).init();
        }
        _ => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }

    let vault = Vault::open(&config.storage_config())
        .await
        .unwrap_or_else(|e| {
            eprintln!(
                "Error: cannot open data directory '{}': {e}",
                config.data_dir
            );
            std::process::exit(1);
        });

    if !config.auth_enabled {
        info!("authentication disabled; uploads and listings are open");
    }

    let listen_addr = config.listen.clone();
    let state = AppState::new(config, vault);

    // Spawn session cleanup background task
    let cleanup_state = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            let reaped = cleanup_state.reap_sessions();
            if reaped > 0 {
                debug!(reaped, "expired sessions removed");
            }
        }
    });

    spawn_retention(&state);

    let app = handlers::router(state);

    info!("hashdrop-server listening on {listen_addr}");
    let listener = TcpListener::bind(&listen_addr).await.unwrap_or_else(|e| {
        eprintln!("Error: cannot bind to {listen_addr}: {e}");
        std::process::exit(1);
    });
    if let Err(e) = axum::serve(listener, app).await {
        eprintln!("Error: server failed: {e}");
        std::process::exit(1);
    }
}

fn spawn_retention(state: &AppState) {
    let retention = &state.inner.config.retention;
    if !retention.enabled {
        return;
    }
    let (max_age, every) = match (retention.max_age_duration(), retention.sweep_interval()) {
        (Ok(max_age), Ok(every)) => (max_age, every),
        (Err(e), _) | (_, Err(e)) => {
            eprintln!("Error: invalid retention settings: {e}");
            std::process::exit(1);
        }
    };
    info!(?max_age, ?every, "retention sweeper enabled");
    tokio::spawn(run_periodic(Arc::clone(&state.inner.vault), every, max_age));
}
