//! chainfeed CLI — run the feed service or talk to a running one.
//!
//! Usage:
//! ```bash
//! chainfeed serve
//! chainfeed feed-info  --url http://localhost:10592
//! chainfeed feed       --url http://localhost:10592 --limit 10
//! chainfeed update-rpc --url http://localhost:10592 --rpc http://node:9650 --token ADMIN_TOKEN
//! ```

mod config;
mod logging;

use std::env;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use chainfeed_core::{FeedManager, FeedService};
use chainfeed_rpc::{FeedClient, JsonRpcConnector};
use chainfeed_storage::open_store_with_retry;

use crate::config::{AppConfig, DEFAULT_PORT};
use crate::logging::init_tracing;

const STORE_ATTEMPTS: u32 = 10;
const STORE_RETRY_DELAY: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    let result = match args[1].as_str() {
        "serve" => cmd_serve().await,
        "info" => {
            cmd_info();
            Ok(())
        }
        "feed-info" => cmd_feed_info(&args[2..]).await,
        "feed" => cmd_feed(&args[2..]).await,
        "update-rpc" => cmd_update_rpc(&args[2..]).await,
        "version" | "--version" | "-V" => {
            println!("chainfeed {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}");
            print_usage();
            process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn print_usage() {
    println!("chainfeed {}", env!("CARGO_PKG_VERSION"));
    println!("Paid on-chain message feed\n");
    println!("USAGE:");
    println!("    chainfeed <COMMAND>\n");
    println!("COMMANDS:");
    println!("    serve       Run the listener, fee controller and JSON-RPC server");
    println!("    info        Show configuration defaults");
    println!("    feed-info   Query recipient address and current fee");
    println!("    feed        Query recent feed entries");
    println!("    update-rpc  Point a running server at a different node");
    println!("    version     Print version");
    println!("    help        Print this help\n");
    println!("CLIENT FLAGS:");
    println!("    --url <URL>      Feed server URL  [default: http://localhost:{DEFAULT_PORT}]");
    println!("    --limit <N>      Entries to fetch (feed)  [default: 10]");
    println!("    --subnet <ID>    Subnet ID (feed, informational)");
    println!("    --chain <ID>     Chain ID (feed, informational)");
    println!("    --rpc <URL>      New node URL (update-rpc)  [required]");
    println!("    --token <TOKEN>  Admin token (update-rpc)  [required]\n");
    println!("`serve` reads its settings from the environment; see `chainfeed info`.");
}

fn cmd_info() {
    println!("ChainFeed v{}", env!("CARGO_PKG_VERSION"));
    println!("  Listen port:        {DEFAULT_PORT} (HOST, PORT)");
    println!("  Node RPC:           NUKLAI_RPC  [required]");
    println!("  Fee floor / step:   1000000 / 100000 (MIN_FEE, FEE_DELTA, INITIAL_FEE)");
    println!("  Epoch length:       300s (TARGET_DURATION_PER_EPOCH)");
    println!("  Max feed page:      100 (FEEDSIZE)");
    println!("  Storage backends:   postgres (default), sqlite, memory (STORAGE_BACKEND)");
    println!("  Logging:            LOG_LEVEL, LOG_JSON, RUST_LOG");
}

async fn cmd_serve() -> anyhow::Result<()> {
    // A missing .env is fine; the real environment still applies.
    let _ = dotenvy::dotenv();
    let config = AppConfig::from_env()?;
    init_tracing(&config.log);

    let store = open_store_with_retry(&config.storage, STORE_ATTEMPTS, STORE_RETRY_DELAY)
        .await
        .context("failed to open feed store")?;
    let manager = FeedManager::new(
        config.feed.clone(),
        Arc::new(JsonRpcConnector::default()),
        store,
    )
    .await
    .context("failed to start feed manager")?;
    let manager = Arc::new(manager);

    let cancel = CancellationToken::new();
    let service = FeedService::start(Arc::clone(&manager), cancel.clone());

    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        chainfeed_server::shutdown_signal().await;
        signal_cancel.cancel();
    });

    let shutdown = cancel.clone();
    let served = chainfeed_server::serve(manager, config.listen_addr().await?, async move {
        shutdown.cancelled().await
    })
    .await;
    if let Err(e) = &served {
        error!(error = %e, "server stopped with error");
    }

    let stopped = service.shutdown().await;
    info!("chainfeed stopped");
    served?;
    stopped.context("listener stopped with error")?;
    Ok(())
}

fn parse_flag(args: &[String], flag: &str) -> Option<String> {
    let pos = args.iter().position(|a| a == flag)?;
    args.get(pos + 1).cloned()
}

fn client_for(args: &[String]) -> anyhow::Result<FeedClient> {
    let url = parse_flag(args, "--url").unwrap_or_else(|| format!("http://localhost:{DEFAULT_PORT}"));
    FeedClient::new(&url).context("failed to build client")
}

async fn cmd_feed_info(args: &[String]) -> anyhow::Result<()> {
    let client = client_for(args)?;
    let info = client.feed_info().await?;
    println!("Recipient: {}", info.address);
    println!("Fee:       {}", info.fee);
    Ok(())
}

async fn cmd_feed(args: &[String]) -> anyhow::Result<()> {
    let client = client_for(args)?;
    let limit: i64 = match parse_flag(args, "--limit") {
        Some(raw) => raw.parse().with_context(|| format!("--limit {raw:?}"))?,
        None => 10,
    };
    let subnet = parse_flag(args, "--subnet").unwrap_or_default();
    let chain = parse_flag(args, "--chain").unwrap_or_default();

    let feed = client.feed(&subnet, &chain, limit).await?;
    println!("{}", serde_json::to_string_pretty(&feed)?);
    Ok(())
}

async fn cmd_update_rpc(args: &[String]) -> anyhow::Result<()> {
    let client = client_for(args)?;
    let rpc = parse_flag(args, "--rpc").context("--rpc is required")?;
    let token = parse_flag(args, "--token").context("--token is required")?;

    let success = client.update_nuklai_rpc(&rpc, &token).await?;
    println!("Updated node RPC to {rpc}: {success}");
    Ok(())
}
