use chain_wallet_watcher::config::AppConfig;
use chain_wallet_watcher::error::ConfigError;
use chain_wallet_watcher::models::ChainKind;
use chain_wallet_watcher::monitor::MonitorVariant;
use chain_wallet_watcher::orchestrator::group_wallets;
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "watcher-cli", version, about = "Inspect wallet watcher configuration and balances")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the current native balance of an address
    Balance {
        /// ethereum, bsc, polygon, solana or bitcoin
        #[arg(long)]
        chain: ChainKind,
        #[arg(long)]
        address: String,
    },
    /// Load and validate the configuration, then summarize it
    CheckConfig,
    /// Print a documented sample configuration
    SampleConfig,
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    // less verbose than the watcher itself
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    if let Err(e) = execute(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn execute(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Command::Balance { chain, address } => {
            let path = AppConfig::resolve_path(cli.config.as_deref());
            let mut config = AppConfig::load_from_file(&path)?;
            config.apply_env_overrides()?;

            let chain_config = config.chains.get(&chain).ok_or_else(|| ConfigError::MissingField(
                format!("chains.{}", chain),
            ))?;
            let variant = MonitorVariant::from_config(chain, chain_config, &config.monitoring)?;
            let balance = variant.balance(&address).await?;
            println!(
                "{} {} ({})",
                variant.context().format_amount(balance),
                variant.context().symbol(),
                chain.display_name()
            );
        }
        Command::CheckConfig => {
            let config = AppConfig::load(cli.config.as_deref())?;
            println!("Configuration OK");

            let grouped = group_wallets(&config.wallets);
            for (chain, chain_config) in config.enabled_chains() {
                let wallets = grouped.get(&chain).map(Vec::len).unwrap_or(0);
                println!(
                    "  {:<10} {:<5} {} wallet(s)  {}",
                    chain.as_str(),
                    chain_config.native_currency,
                    wallets,
                    chain_config.endpoint(chain).unwrap_or("-")
                );
            }

            match config.validate_notifications() {
                Ok(()) => println!("Telegram: configured ({:?})", config.telegram.message_format),
                Err(e) => println!("Telegram: {} (only --dry-run will work)", e),
            }
            println!(
                "Polling every {}s, {} retries, lookback {:?}",
                config.monitoring.poll_interval_seconds,
                config.monitoring.max_retries,
                config.monitoring.solana_lookback
            );
        }
        Command::SampleConfig => {
            print!("{}", AppConfig::sample());
        }
    }
    Ok(())
}
