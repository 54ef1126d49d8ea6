//! Elysia host binary.
//!
//! Serves the observer WebSocket and runs a conversation session whenever a
//! client sends `{"action": "start"}`. Utterances are read from stdin, one
//! per line; replies are broadcast as text to observers.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use elysia::config::{ElysiaConfig, LoggingConfig};
use elysia::llm::{LanguageModel, OllamaModel};
use elysia::memory::{ConversationMemory, NoMemory, SqliteMemory};
use elysia::stt::StdinCapture;
use elysia::tools::ToolDispatcher;
use elysia::tts::{SilentSynthesizer, SpeechSynthesizer};
use elysia::{ObserverHub, ResponseProcessor, SpeechQueue, Transport, TurnLoop};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Elysia: local voice assistant turn core.
#[derive(Parser)]
#[command(name = "elysia", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Start a session immediately instead of waiting for a client.
    #[arg(long)]
    autostart: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.unwrap_or_else(ElysiaConfig::default_config_path);
    let mut config = ElysiaConfig::load_or_default(&config_path)?;
    config.apply_env_overrides();

    let _log_guard = init_tracing(&config.logging);
    info!("elysia v{} starting", env!("CARGO_PKG_VERSION"));

    let cancel = CancellationToken::new();
    let observers = Arc::new(ObserverHub::new());

    let tts: Arc<dyn SpeechSynthesizer> = Arc::new(SilentSynthesizer::default());
    let warm = Arc::clone(&tts);
    if let Err(e) = tokio::task::spawn_blocking(move || warm.warm_up()).await? {
        warn!("speech synthesizer warm-up failed: {e}");
    }
    info!(sample_rate = tts.sample_rate(), "speech synthesizer ready");
    let (speech, speech_worker) =
        SpeechQueue::spawn(Arc::clone(&tts), Arc::clone(&observers), cancel.child_token());

    let memory: Arc<dyn ConversationMemory> =
        match SqliteMemory::open(&config.memory.db_path, config.memory.recall_max_results) {
            Ok(store) => {
                info!("memory: {}", store.path().display());
                Arc::new(store)
            }
            Err(e) => {
                warn!("memory unavailable, continuing without it: {e}");
                Arc::new(NoMemory)
            }
        };

    let tools = Arc::new(ToolDispatcher::from_config(&config.sandbox)?);
    info!(
        root = %tools.sandbox().root().display(),
        workdir = %tools.sandbox().workdir().display(),
        "file tools sandboxed"
    );

    let model: Arc<dyn LanguageModel> = Arc::new(OllamaModel::new(&config.llm)?);
    let processor = Arc::new(ResponseProcessor::new(
        model,
        memory,
        tools,
        speech.clone(),
        &config.llm,
    ));
    let turns = Arc::new(TurnLoop::new(
        Arc::new(StdinCapture::with_prompt("you> ")),
        Arc::clone(&observers),
        processor,
        config.conversation.clone(),
    ));

    let listener = Transport::bind(&config.transport.bind_addr).await?;
    let transport = Transport::new(Arc::clone(&observers), turns, cancel.child_token());
    if cli.autostart {
        transport.start_session();
    }
    let server = tokio::spawn(Arc::clone(&transport).serve(listener));

    tokio::signal::ctrl_c().await?;
    info!("interrupt received, shutting down");

    speech.shutdown();
    cancel.cancel();
    if let Err(e) = speech_worker.await {
        error!("speech worker panicked: {e}");
    }
    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("transport failed: {e}"),
        Err(e) => error!("transport task panicked: {e}"),
    }

    info!("elysia shut down cleanly");
    Ok(())
}

/// Log to stderr, and to a daily rolling file when enabled.
///
/// The returned guard must live until exit so buffered lines are flushed.
fn init_tracing(logging: &LoggingConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("elysia=info,warn"))
    };
    let stderr = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    if logging.file_logging && std::fs::create_dir_all(&logging.log_dir).is_ok() {
        let appender = tracing_appender::rolling::daily(&logging.log_dir, "elysia.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        tracing_subscriber::registry()
            .with(filter())
            .with(stderr)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(writer),
            )
            .init();
        Some(guard)
    } else {
        tracing_subscriber::registry()
            .with(filter())
            .with(stderr)
            .init();
        None
    }
}
