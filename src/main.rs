//! Still Music - pause the music player while other audio plays

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use still_music::cli::{self, Console};
use still_music::config::{AppConfig, ConfigWatcher, DetectorKind, PlayerKind};
use still_music::detector::{AggregateDetector, Detector, ManagedIdentity, NowPlayingDetector};
use still_music::engine::EngineHandle;
use still_music::paths::AppPaths;
use still_music::player::{CommandPlayer, ConsolePlayer, PlayerController};

/// Still Music - pause the music player while other audio plays
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (detected automatically when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Drive a simulated player instead of the configured one
    #[arg(long)]
    dry_run: bool,

    /// Print the effective configuration as YAML and exit
    #[arg(long)]
    print_config: bool,

    /// Disable the interactive console
    #[arg(long)]
    no_console: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    init_logging(&args.log_level)?;

    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => {
            let paths = AppPaths::detect();
            paths.ensure_config().await?;
            paths.config
        }
    };

    if args.print_config {
        let config = AppConfig::load(&config_path).await?;
        print!("{}", config.to_yaml()?);
        return Ok(());
    }

    info!("Starting Still Music v{}...", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", config_path.display());

    let (config_watcher, config) = ConfigWatcher::new(&config_path).await?;
    info!("Configuration loaded successfully with hot-reload enabled");

    run_app(
        config,
        config_watcher,
        args.dry_run,
        !args.no_console,
        shutdown_signal(),
    )
    .await?;

    info!("Still Music shutdown complete");
    Ok(())
}

async fn run_app(
    config: AppConfig,
    mut config_watcher: ConfigWatcher,
    dry_run: bool,
    console_enabled: bool,
    shutdown: impl std::future::Future<Output = ()>,
) -> Result<()> {
    // Managed player
    let console_player = (dry_run || config.player.kind == PlayerKind::Console)
        .then(|| Arc::new(ConsolePlayer::new(config.player.name.clone())));
    let controller: Arc<dyn PlayerController> = match &console_player {
        Some(player) => {
            info!("Using simulated player '{}'", config.player.name);
            player.clone()
        }
        None => {
            info!("Using command player '{}'", config.player.name);
            Arc::new(CommandPlayer::new(
                config.player.name.clone(),
                config.player.commands.clone(),
            ))
        }
    };

    let engine = EngineHandle::spawn(config.engine.to_settings(), controller);
    engine.start().await;

    // Detector
    let identity = if config.player.identifiers.is_empty() {
        ManagedIdentity::new([&config.player.name])
    } else {
        ManagedIdentity::new(&config.player.identifiers)
    };
    let mut aggregate = None;
    let detector: Arc<dyn Detector> = match config.detector.kind {
        DetectorKind::NowPlaying => Arc::new(NowPlayingDetector::new(
            config.detector.command.clone(),
            std::time::Duration::from_millis(config.detector.interval_ms),
            identity,
        )),
        DetectorKind::Manual => {
            let manual = Arc::new(AggregateDetector::new("manual", identity));
            aggregate = Some(manual.clone());
            manual
        }
    };
    if let Err(e) = detector.start_monitoring(engine.signal_sink()) {
        warn!("⚠️  Detector '{}' failed to start: {}", detector.name(), e);
    }

    // Operator console
    let (console_tx, mut console_rx) = mpsc::unbounded_channel();
    if console_enabled {
        cli::spawn_console(console_tx)?;
    } else {
        drop(console_tx);
    }
    let mut console = Console::new(engine.clone(), aggregate, console_player);

    info!("✅ Monitoring for other audio");

    tokio::pin!(shutdown);
    let mut current_config = config;

    loop {
        tokio::select! {
            Some(command) = console_rx.recv() => {
                if !console.apply(command).await {
                    info!("Quit requested from console");
                    break;
                }
            }

            Some(new_config) = config_watcher.next_config() => {
                info!("📝 Configuration file changed, reloading...");
                if current_config.restart_required(&new_config) {
                    warn!("⚠️  Player or detector settings changed; restart required to apply them");
                }
                engine.update_settings(new_config.engine.to_settings()).await;
                current_config = new_config;
                info!("✅ Engine settings reloaded");
            }

            _ = &mut shutdown => {
                info!("Shutdown signal received, stopping event loop");
                break;
            }
        }
    }

    info!("Shutting down...");
    detector.stop_monitoring();
    engine.stop().await;
    engine.shutdown();

    Ok(())
}

fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .init();

    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C signal handler");
}
