use std::sync::Arc;

use site_digest::api;
use site_digest::channels::{DeliverySink, LogSink, TelegramSink};
use site_digest::config::AppConfig;
use site_digest::engine::SchedulerService;
use site_digest::fetch::HttpFetcher;
use site_digest::llm::OllamaSummarizer;
use site_digest::store::{LibSqlTaskStore, TaskStore};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;

    // Initialize tracing; the guard keeps the file writer flushing until exit.
    let (file_layer, _log_guard) = match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "site-digest.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .init();

    eprintln!("📰 Site Digest v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Ollama: {} ({})", config.ollama_host, config.ollama_model);
    eprintln!("   API: http://0.0.0.0:{}/api/tasks", config.api_port);

    // ── Database ─────────────────────────────────────────────────────────
    let store: Arc<dyn TaskStore> = Arc::new(LibSqlTaskStore::new_local(&config.db_path).await?);
    eprintln!("   Database: {}", config.db_path.display());

    // ── Collaborators ────────────────────────────────────────────────────
    let fetcher = Arc::new(HttpFetcher::new()?);
    let summarizer = Arc::new(OllamaSummarizer::new(
        config.ollama_host.clone(),
        config.ollama_model.clone(),
    ));
    let sink: Arc<dyn DeliverySink> = match config.telegram_token.clone() {
        Some(token) => Arc::new(TelegramSink::new(token)),
        None => {
            eprintln!("   Telegram: disabled (TELEGRAM_BOT_TOKEN not set), logging results");
            Arc::new(LogSink)
        }
    };
    eprintln!("   Delivery: {}", sink.name());

    // ── Scheduler ────────────────────────────────────────────────────────
    let service = Arc::new(SchedulerService::new(
        store,
        fetcher,
        summarizer,
        sink,
        config.engine.clone(),
    ));
    let armed = service.start().await?;
    eprintln!(
        "   Schedules: {} armed (max {} running, queue {})\n",
        armed, config.engine.max_running_tasks, config.engine.max_queue_size
    );

    // ── API ──────────────────────────────────────────────────────────────
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.api_port)).await?;
    tracing::info!(port = config.api_port, "API server started");
    axum::serve(listener, api::routes(Arc::clone(&service)))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for ctrl-c: {}", e);
            }
            tracing::info!("Shutdown requested");
        })
        .await?;

    service.shutdown().await;
    Ok(())
}
