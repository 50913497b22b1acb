// ============================================================================
// weather-access - CLI front-end for Weather Access subscriptions
// ============================================================================
// Usage:
//   weather-access status <ADDRESS>             Resolve subscription status
//                                               (--cross-check adds checkAccess)
//   weather-access watch                        Track wallet changes from stdin
//                                               (address | disconnect | retry)
//   weather-access price                        Show the current access price
//   weather-access stats                        Show contract payment statistics
//   weather-access subscribe --from <ADDRESS>   Pay for access
//   weather-access weather <CITY> --address A   Fetch weather (subscribers only)
// ============================================================================

use access_core::chain::{chain_by_id, RpcContract, POLYGON_AMOY};
use access_core::{
    format_native, short_address, short_hash, spawn_address_watcher, AccessConfig, AccessError,
    AccessResolver, AccessState, ChannelWallet, PaymentInitiator, WalletSource, WeatherClient,
};
use alloy::primitives::Address;
use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

/// Weather Access subscription tool
#[derive(Parser)]
#[command(name = "weather-access", version, about = "Check and purchase Weather Access subscriptions")]
struct Cli {
    /// Backend base URL (overrides API_BASE)
    #[arg(long, global = true)]
    api_base: Option<String>,

    /// Payment contract address (overrides CONTRACT_ADDRESS)
    #[arg(long, global = true)]
    contract: Option<String>,

    /// Chain JSON-RPC endpoint (overrides RPC_URL)
    #[arg(long, global = true)]
    rpc_url: Option<String>,

    /// Wallet-backed signing endpoint (overrides SIGNER_URL)
    #[arg(long, global = true)]
    signer_url: Option<String>,

    /// Per-check timeout in seconds (overrides ACCESS_CHECK_TIMEOUT_SECS)
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve the subscription status of a wallet
    Status {
        /// Wallet address (omit to show the disconnected state)
        address: Option<String>,

        /// Also read the contract's checkAccess() view for comparison
        #[arg(long)]
        cross_check: bool,
    },

    /// Read wallet addresses (or "disconnect") from stdin and track access
    Watch,

    /// Show the current access price
    Price,

    /// Show total payments and payment count from the contract
    Stats,

    /// Pay for access from the given wallet
    Subscribe {
        /// Paying wallet address
        #[arg(long)]
        from: String,
    },

    /// Fetch current weather for a subscribed wallet
    Weather {
        /// City name
        city: String,

        /// Subscribed wallet address
        #[arg(long)]
        address: String,
    },
}

fn parse_address(raw: &str) -> Result<Address> {
    raw.trim()
        .parse::<Address>()
        .map_err(|e| anyhow!("Invalid address '{}': {}", raw, e))
}

/// Environment config with CLI flags layered on top
fn load_config(cli: &Cli) -> Result<AccessConfig> {
    let mut vars: HashMap<String, String> = std::env::vars().collect();

    let overrides = [
        ("API_BASE", cli.api_base.clone()),
        ("CONTRACT_ADDRESS", cli.contract.clone()),
        ("RPC_URL", cli.rpc_url.clone()),
        ("SIGNER_URL", cli.signer_url.clone()),
        ("ACCESS_CHECK_TIMEOUT_SECS", cli.timeout.map(|t| t.to_string())),
    ];
    for (key, value) in overrides {
        if let Some(value) = value {
            vars.insert(key.to_string(), value);
        }
    }

    AccessConfig::from_map(&vars).context("Failed to load configuration")
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("Warning: Could not load .env file: {}", e);
    }

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("weather_access=info".parse()?)
                .add_directive("access_core=debug".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    info!(
        "Backend {} | chain {} ({}) | contract {}",
        config.api_base,
        config.chain_id,
        chain_by_id(config.chain_id).map(|c| c.name).unwrap_or("unknown"),
        config
            .contract_address
            .map(|a| a.to_string())
            .unwrap_or_else(|| "(none)".into())
    );

    let resolver = AccessResolver::from_config(&config)?;

    match &cli.command {
        Commands::Status {
            address,
            cross_check,
        } => cmd_status(&cli, &config, &resolver, address.as_deref(), *cross_check).await,
        Commands::Watch => cmd_watch(cli.json, &resolver).await,
        Commands::Price => cmd_price(&cli, &resolver).await,
        Commands::Stats => cmd_stats(&cli, &resolver).await,
        Commands::Subscribe { from } => cmd_subscribe(&cli, &config, &resolver, from).await,
        Commands::Weather { city, address } => {
            cmd_weather(&cli, &config, &resolver, city, address).await
        }
    }
}

fn print_state(json: bool, state: &AccessState) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(state)?);
        return Ok(());
    }

    let who = state
        .address
        .as_ref()
        .map(short_address)
        .unwrap_or_else(|| "-".into());
    let source = state
        .source
        .map(|s| format!(" via {:?}", s).to_lowercase())
        .unwrap_or_default();

    println!(
        "[{}] {:<14} {}{}",
        state.checked_at.format("%H:%M:%S"),
        who,
        state.status.display_name(),
        source
    );

    if let Some(since) = state.detail.active_since {
        println!("    active since: {}", since.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    if let Some(tx) = &state.detail.tx_hash {
        println!("    payment tx:   {}", short_hash(tx));
    }
    if let Some(amount) = &state.detail.payment_amount {
        println!("    amount:       {}", amount);
    }
    if let Some(reason) = &state.detail.reason {
        println!("    detail:       {}", reason);
    }
    if state.can_retry() && state.error.as_ref().is_some_and(AccessError::is_retryable) {
        println!("    (retry to check again)");
    }

    Ok(())
}

async fn cmd_status(
    cli: &Cli,
    config: &AccessConfig,
    resolver: &AccessResolver,
    address: Option<&str>,
    cross_check: bool,
) -> Result<()> {
    let address = address.map(parse_address).transpose()?;

    if !cli.json {
        if let Some(client_id) = &config.wallet_client_id {
            println!("Wallet client: {}", client_id);
        }
    }

    let state = resolver
        .resolve(address)
        .await
        .unwrap_or_else(|| resolver.state());
    print_state(cli.json, &state)?;

    if cross_check {
        let address = address.ok_or_else(|| anyhow!("--cross-check needs a wallet address"))?;
        let contract = config
            .contract_address
            .ok_or_else(|| anyhow!("No contract configured (set CONTRACT_ADDRESS or --contract)"))?;

        let checked = RpcContract::new(&config.rpc_url, contract)?
            .check_access(address)
            .await?;

        if cli.json {
            println!("{}", serde_json::json!({ "check_access": checked }));
        } else {
            println!("    checkAccess:  {}", checked);
        }
    }

    Ok(())
}

async fn cmd_watch(json: bool, resolver: &AccessResolver) -> Result<()> {
    let wallet = Arc::new(ChannelWallet::default());
    let mut states = resolver.subscribe();
    let watcher = spawn_address_watcher(wallet.clone() as Arc<dyn WalletSource>, resolver.clone());

    if !json {
        println!("Enter a wallet address, \"disconnect\", \"retry\", or Ctrl-D to quit.");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match line.trim() {
                    "" => {}
                    "disconnect" => wallet.disconnect(),
                    "retry" => {
                        let resolver = resolver.clone();
                        tokio::spawn(async move { resolver.retry().await });
                    }
                    raw => match parse_address(raw) {
                        Ok(address) => wallet.switch(address),
                        Err(e) => eprintln!("{}", e),
                    },
                }
            }
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = states.borrow_and_update().clone();
                if json || state.status.is_settled() {
                    print_state(json, &state)?;
                }
            }
        }
    }

    drop(wallet);
    watcher.await?;

    // Drain until the last requested resolution settles
    loop {
        if states.has_changed().unwrap_or(false) {
            let state = states.borrow_and_update().clone();
            if json || state.status.is_settled() {
                print_state(json, &state)?;
            }
        }
        if states.borrow().status.is_settled() || states.changed().await.is_err() {
            break;
        }
    }

    Ok(())
}

async fn cmd_price(cli: &Cli, resolver: &AccessResolver) -> Result<()> {
    let contract = resolver
        .contract()
        .ok_or_else(|| anyhow!("No contract configured (set CONTRACT_ADDRESS or --contract)"))?;

    let price = contract.access_price().await?;

    if cli.json {
        println!("{}", serde_json::json!({ "price_wei": price.to_string(), "price": format_native(price) }));
    } else {
        println!("Access price: {} {}", format_native(price), POLYGON_AMOY.native_symbol);
    }
    Ok(())
}

async fn cmd_stats(cli: &Cli, resolver: &AccessResolver) -> Result<()> {
    let contract = resolver
        .contract()
        .ok_or_else(|| anyhow!("No contract configured (set CONTRACT_ADDRESS or --contract)"))?;

    let stats = contract.stats().await?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        println!("=== Weather Access Contract Stats ===");
        println!("Contract:       {}", contract.contract_address());
        println!(
            "Total payments: {} {}",
            format_native(stats.total_payments),
            POLYGON_AMOY.native_symbol
        );
        println!("Payment count:  {}", stats.payment_count);
    }
    Ok(())
}

async fn cmd_subscribe(
    cli: &Cli,
    config: &AccessConfig,
    resolver: &AccessResolver,
    from: &str,
) -> Result<()> {
    let payer = parse_address(from)?;
    let initiator = PaymentInitiator::from_config(config, resolver.clone())?;

    // The post-payment refresh only applies to the current address
    resolver.resolve(Some(payer)).await;

    let receipt = match initiator.subscribe(Some(payer)).await {
        Ok(receipt) => receipt,
        Err(e) if !e.is_user_facing_error() => {
            println!("{}", e);
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&receipt)?);
    } else {
        let tx = receipt.tx_hash.to_string();
        println!("Payment confirmed!");
        println!("  paid:  {} {}", receipt.price_formatted(), POLYGON_AMOY.native_symbol);
        println!("  tx:    {}", short_hash(&tx));
        if let Some(block) = receipt.block_number {
            println!("  block: {}", block);
        }
        if let Some(chain) = chain_by_id(config.chain_id) {
            println!("  view:  {}", chain.tx_url(&tx));
        }
    }

    print_state(cli.json, &resolver.state())
}

async fn cmd_weather(
    cli: &Cli,
    config: &AccessConfig,
    resolver: &AccessResolver,
    city: &str,
    address: &str,
) -> Result<()> {
    let address = parse_address(address)?;
    let access = resolver
        .resolve(Some(address))
        .await
        .unwrap_or_else(|| resolver.state());

    if !access.is_active() {
        print_state(cli.json, &access)?;
    }

    let client = WeatherClient::from_config(config);
    let weather = client.current(&access, city).await?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&weather)?);
        return Ok(());
    }

    let now = &weather.current;
    println!("{}, {}", weather.location.name, weather.location.country);
    println!("  {}", now.condition.text);
    println!("  temperature: {:.1}°C (feels like {:.1}°C)", now.temp_c, now.feelslike_c);
    println!("  humidity:    {}%", now.humidity);
    println!("  pressure:    {} mb", now.pressure_mb);
    println!("  wind:        {} km/h", now.wind_kph);
    println!("  icon:        {}", now.condition.icon_url());
    Ok(())
}
