use std::sync::Arc;
use std::sync::atomic::Ordering;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use alert_ingest::channels::{ImapInbox, InboxSource};
use alert_ingest::config::IngestConfig;
use alert_ingest::llm::create_provider;
use alert_ingest::pipeline::{Categorizer, IngestPipeline, Persister};
use alert_ingest::scheduler::{parse_schedule, spawn_ingest_scheduler};
use alert_ingest::store::{StoreConfig, create_store};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| "Failed to install rustls crypto provider")?;

    let config = IngestConfig::from_env().inspect_err(|e| {
        eprintln!("Error: {e}");
        eprintln!("  required: EMAIL_IMAP_HOST, EMAIL_USERNAME, EMAIL_PASSWORD, GEMINI_API_KEY,");
        eprintln!("            SUPABASE_URL, SUPABASE_ANON_KEY (or INGEST_STORE=local)");
    })?;

    // Stderr always; a daily rolling file when INGEST_LOG_DIR is set.
    let (file_layer, _log_guard) = match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "alert-ingest.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .with(file_layer)
        .init();

    eprintln!("📬 Alert Ingest v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Inbox: {}:{}", config.email.imap_host, config.email.imap_port);
    eprintln!("   Senders: {}", config.selector.senders.join(", "));
    eprintln!("   Model: {}", config.llm.model);
    match &config.store {
        StoreConfig::Rest(rest) => eprintln!("   Store: {} ({})", rest.base_url, rest.table),
        StoreConfig::Local { path } => eprintln!("   Store: {}", path.display()),
    }

    run(config).await?;
    Ok(())
}

async fn run(config: IngestConfig) -> alert_ingest::error::Result<()> {
    // ── Wiring ───────────────────────────────────────────────────────────
    let llm = create_provider(&config.llm);
    let store = create_store(&config.store).await?;
    let inbox: Arc<dyn InboxSource> = Arc::new(ImapInbox::new(config.email.clone()));
    let persister = Persister::new(Categorizer::new(llm), store);
    let pipeline = Arc::new(IngestPipeline::new(
        inbox,
        persister,
        config.selector.clone(),
    ));

    if config.schedule.run_once {
        eprintln!("   Mode: single run\n");
        let summary = pipeline.run().await?;
        eprintln!(
            "Done: {} selected, {} saved, {} skipped, {} ignored",
            summary.selected, summary.saved, summary.skipped, summary.ignored
        );
        return Ok(());
    }

    eprintln!("   Schedule: {}\n", config.schedule.cron);
    let schedule = parse_schedule(&config.schedule.cron)?;
    let (handle, shutdown) = spawn_ingest_scheduler(pipeline, schedule);

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");
    shutdown.store(true, Ordering::Relaxed);
    handle.abort();
    Ok(())
}
