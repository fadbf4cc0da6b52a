use std::sync::Arc;

use anyhow::Context;

use intake_bot::channels::{ChannelManager, CliChannel, TelegramChannel};
use intake_bot::config::BotConfig;
use intake_bot::dispatcher::Dispatcher;
use intake_bot::forms::{FormFlowController, SessionStore};
use intake_bot::routes::{StatusRouteState, status_routes};
use intake_bot::store::{LibSqlBackend, RecordRepository};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = BotConfig::from_env()?;

    eprintln!("📋 {} v{}", config.name, env!("CARGO_PKG_VERSION"));

    // ── Database ─────────────────────────────────────────────────────────
    let repo: Arc<dyn RecordRepository> = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .with_context(|| format!("failed to open database at {}", config.db_path.display()))?,
    );
    eprintln!("   Database: {}", config.db_path.display());

    let sessions = Arc::new(SessionStore::new());
    let flow = Arc::new(FormFlowController::new(
        Arc::clone(&repo),
        Arc::clone(&sessions),
    ));

    // ── Status server ────────────────────────────────────────────────────
    if let Some(port) = config.http_port {
        let app = status_routes(StatusRouteState {
            repo: Arc::clone(&repo),
            sessions: Arc::clone(&sessions),
        });
        let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
            .await
            .with_context(|| format!("failed to bind status server port {port}"))?;
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!("Status server stopped: {e}");
            }
        });
        tracing::info!(port, "Status server started");
        eprintln!("   Status API: http://0.0.0.0:{port}/api/status");
    }

    // ── Channels ─────────────────────────────────────────────────────────
    let mut channels = ChannelManager::new();

    if config.cli_enabled {
        channels.add(Box::new(CliChannel::new()));
    }

    if let Some(token) = config.telegram_token.clone() {
        eprintln!(
            "   Telegram: enabled (allowed: {})",
            if config.telegram_open_to_all() {
                "everyone".to_string()
            } else {
                config.telegram_allowed_users.join(", ")
            }
        );
        channels.add(Box::new(TelegramChannel::new(
            token,
            config.telegram_allowed_users.clone(),
        )));
    }

    if channels.is_empty() {
        anyhow::bail!("no channels enabled: set TELEGRAM_BOT_TOKEN or INTAKE_CLI=true");
    }
    eprintln!("   Channels: {}\n", channels.names().join(", "));

    tracing::info!(bot = %config.name, "Starting dispatcher");
    Dispatcher::new(
        flow,
        channels,
        config.lane_idle_timeout,
        config.session_idle_timeout,
    )
    .run()
    .await?;

    Ok(())
}
