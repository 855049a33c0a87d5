use chain_wallet_watcher::config::AppConfig;
use chain_wallet_watcher::logging::init_logging;
use chain_wallet_watcher::notifications::{LogNotifier, NotificationSink, TelegramNotifier};
use chain_wallet_watcher::orchestrator::Watcher;
use clap::Parser;
use log::{error, info};
use std::sync::Arc;

/// Watches wallets across chains and reports every balance-changing transaction
#[derive(Parser, Debug)]
#[command(name = "watcher", version, about)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Log notifications instead of sending them to Telegram
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    let args = Args::parse();

    if let Err(e) = run(args).await {
        error!("Fatal error: {}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load(args.config.as_deref())?;
    init_logging(&config.logging)?;

    info!("Chain wallet watcher starting");
    info!("Loaded configuration with {} wallet(s)", config.wallets.len());

    let sink: Arc<dyn NotificationSink> = if args.dry_run {
        info!("Dry run, notifications are only logged");
        Arc::new(LogNotifier)
    } else {
        config.validate_notifications()?;
        Arc::new(TelegramNotifier::new(&config.telegram)?)
    };

    let mut watcher = Watcher::from_config(&config, sink)?;
    if watcher.monitor_count() == 0 {
        return Err("No monitors initialized, check the enabled chains and wallets".into());
    }

    watcher.start().await;
    info!("Polling interval: {} seconds", config.monitoring.poll_interval_seconds);

    let signal = shutdown_signal().await?;
    info!("Received {}, shutting down", signal);
    watcher.shutdown().await;
    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.map(|_| "SIGINT"),
        _ = terminate.recv() => Ok("SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await.map(|_| "Ctrl-C")
}
