use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use streamflow::config::{Config, Overrides};
use streamflow::uploads::UploadStore;
use streamflow::AppState;

/// How often expired sessions and reset tokens are purged
const TOKEN_PURGE_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[derive(Parser, Debug)]
#[command(name = "streamflow")]
#[command(author, version, about = "Backend for the StreamFlow book and video library", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "streamflow.toml")]
    config: PathBuf,

    /// Override log level
    #[arg(short, long)]
    log_level: Option<String>,

    /// Address to bind
    #[arg(long, env = "HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "PORT")]
    port: Option<u16>,

    /// Directory for the database file
    #[arg(long, env = "DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Directory for uploaded files
    #[arg(long, env = "UPLOAD_DIR")]
    upload_dir: Option<PathBuf>,

    /// Full sqlx connection URL
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Secret used to sign access tokens
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    jwt_secret: Option<String>,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            host: self.host.clone(),
            port: self.port,
            data_dir: self.data_dir.clone(),
            upload_dir: self.upload_dir.clone(),
            database_url: self.database_url.clone(),
            jwt_secret: self.jwt_secret.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(&cli.config)?;
    config.apply_overrides(cli.overrides());

    let log_level = cli
        .log_level
        .as_ref()
        .unwrap_or(&config.logging.level)
        .clone();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting StreamFlow v{}", env!("CARGO_PKG_VERSION"));
    config.check();

    std::fs::create_dir_all(&config.server.data_dir).with_context(|| {
        format!(
            "Failed to create data directory: {}",
            config.server.data_dir.display()
        )
    })?;

    let db = streamflow::db::init(&config).await?;

    if let (Some(email), Some(password)) = (&config.auth.admin_email, &config.auth.admin_password) {
        streamflow::api::auth::ensure_admin_user(&db, email, password).await?;
    }

    let uploads = UploadStore::new(&config.uploads.dir, config.uploads.max_file_size);
    uploads.ensure_dirs().await.with_context(|| {
        format!(
            "Failed to create upload directory: {}",
            config.uploads.dir.display()
        )
    })?;

    let mut state = AppState::new(config.clone(), db.clone(), uploads);
    match streamflow::api::metrics::init_metrics() {
        Ok(handle) => state = state.with_metrics(handle),
        Err(e) => tracing::warn!(error = %e, "Metrics recorder not installed"),
    }
    let state = Arc::new(state);

    if config.rate_limit.enabled {
        streamflow::api::rate_limit::spawn_cleanup_task(
            state.rate_limiter.clone(),
            config.rate_limit.cleanup_interval,
        );
    }

    let purge_db = db.clone();
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(TOKEN_PURGE_INTERVAL).await;
            match streamflow::db::purge_expired_tokens(&purge_db).await {
                Ok(0) => {}
                Ok(n) => tracing::debug!(purged = n, "Purged expired tokens"),
                Err(e) => tracing::warn!(error = %e, "Failed to purge expired tokens"),
            }
        }
    });

    let app = streamflow::api::create_router(state.clone());

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!("API server listening on http://{}", addr);
    tracing::info!("Serving uploads from {}", config.uploads.dir.display());

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    db.close().await;
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
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
