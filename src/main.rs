use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use outreach::config::AppConfig;
use outreach::dispatch::{Dispatcher, SmtpMailer};
use outreach::llm::ConfiguredProviderFactory;
use outreach::session::{AppState, Pipeline, SessionManager, WorkflowDeps, session_routes};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    let config = AppConfig::from_env().context("Invalid configuration")?;
    let _log_guard = init_tracing(config.log_dir.as_deref());

    if config.telemetry_api_key.is_some() {
        tracing::info!("Tracing-service key present; trace export is disabled");
    }
    if !config.dispatch_enabled {
        tracing::warn!("Email dispatch is disabled; confirmations will not send mail");
    } else if !config.smtp.has_credentials() {
        tracing::warn!("Email dispatch is enabled but SMTP credentials are missing");
    }

    let providers = ConfiguredProviderFactory::new(
        config.backend,
        config.model.clone(),
        config.retry.clone(),
    );
    let dispatcher = Dispatcher::new(Arc::new(SmtpMailer::new(config.smtp.clone())));

    let deps = Arc::new(WorkflowDeps {
        providers: Arc::new(providers),
        dispatcher: Arc::new(dispatcher),
        generation: config.generation.clone(),
        dispatch_enabled: config.dispatch_enabled,
        server_key: config.api_key.clone(),
        pipeline: Pipeline::with_history(),
    });
    let sessions = Arc::new(SessionManager::new(deps));
    let _pruner = sessions.clone().spawn_pruner(config.session_idle);
    let state = AppState { sessions };

    eprintln!("✉️  Outreach v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Backend: {} ({})", config.backend.display_name(), config.model);
    eprintln!("   API: http://0.0.0.0:{}/api/sessions", config.port);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port))
        .await
        .with_context(|| format!("Failed to bind port {}", config.port))?;
    tracing::info!(port = config.port, "Outreach server started");
    axum::serve(listener, session_routes(state))
        .await
        .context("Server error")?;

    Ok(())
}

/// Log to stderr, plus a daily-rolling file when `log_dir` is set.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "outreach.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(file_layer)
        .init();

    guard
}
