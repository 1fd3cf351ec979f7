//! ledgerctl - Command line client for a ledger node's native RPC interface
//!
//! Usage:
//!   ledgerctl <host:port> addpeer <host:port>           - Introduce a peer to the node
//!   ledgerctl <host:port> discover <n>                  - Introduce n peers from the discovery service
//!   ledgerctl <host:port> newtransaction <aux> <file>   - Submit a transaction
//!   ledgerctl <host:port> fetch <hex-key>               - Fetch a stored value

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ledger_rpc::config::ClientConfig;
use ledger_rpc::network::{discover_peers, HttpHostSource, NodeClient};
use ledger_rpc::protocol::PeerAddress;
use ledger_rpc::transaction::TransactionBuilder;

/// Ledger node RPC client
#[derive(Parser)]
#[command(name = "ledgerctl")]
#[command(author, version, about = "Talk to a ledger node over its native RPC interface", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long)]
    log_level: Option<String>,

    /// RPC address of the node
    #[arg(value_name = "HOST:PORT")]
    node: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask the node to connect to a peer
    #[command(name = "addpeer")]
    AddPeer {
        /// Peer address (a.b.c.d:port)
        peer: String,
    },

    /// Pick peers from the discovery service and add them
    Discover {
        /// Number of hosts to sample (with replacement)
        count: usize,

        /// Discovery service URL (overrides config)
        #[arg(long)]
        url: Option<String>,

        /// Port to use for discovered hosts (overrides config)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Submit a transaction
    #[command(name = "newtransaction")]
    NewTransaction {
        /// Aux data, sent as its UTF-8 bytes
        aux: String,

        /// File holding the transaction binary
        binary: PathBuf,

        /// Timestamp in milliseconds since the epoch (defaults to now)
        #[arg(long)]
        timestamp: Option<u64>,
    },

    /// Fetch the value stored under a key
    Fetch {
        /// Key, hex encoded
        key: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = match &cli.config {
        Some(path) => ClientConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ClientConfig::default(),
    };

    let level = cli.log_level.as_deref().unwrap_or(&config.logging.level);
    init_logging(level);

    match cli.command {
        Commands::AddPeer { peer } => run_add_peer(&cli.node, &config, &peer).await,
        Commands::Discover { count, url, port } => {
            run_discover(&cli.node, &config, count, url, port).await
        }
        Commands::NewTransaction {
            aux,
            binary,
            timestamp,
        } => run_new_transaction(&cli.node, &config, aux, binary, timestamp).await,
        Commands::Fetch { key } => run_fetch(&cli.node, &config, &key).await,
    }
}

/// Initialize logging
fn init_logging(level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn connect(node: &str, config: &ClientConfig) -> anyhow::Result<NodeClient> {
    NodeClient::connect(node, config.client_timeouts())
        .await
        .with_context(|| format!("connecting to {}", node))
}

async fn run_add_peer(node: &str, config: &ClientConfig, peer: &str) -> anyhow::Result<()> {
    let peer: PeerAddress = peer.parse()?;

    let mut client = connect(node, config).await?;
    client.add_peer(peer).await?;
    client.close().await?;

    println!("Added peer {}", peer);
    Ok(())
}

async fn run_discover(
    node: &str,
    config: &ClientConfig,
    count: usize,
    url: Option<String>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let url = url.unwrap_or_else(|| config.discovery.url.clone());
    let port = port.unwrap_or(config.discovery.peer_port);

    let source = HttpHostSource::new(url.as_str(), config.read_timeout())?;
    let mut client = connect(node, config).await?;

    let outcomes = discover_peers(&mut client, &source, count, port)
        .await
        .with_context(|| format!("discovering peers from {}", url))?;
    client.close().await?;

    for outcome in &outcomes {
        match &outcome.result {
            Ok(()) => println!("Added peer {}", outcome.peer),
            Err(e) => println!("Rejected peer {}: {}", outcome.peer, e),
        }
    }

    let added = outcomes.iter().filter(|o| o.is_ok()).count();
    println!("{}/{} peers added", added, outcomes.len());
    Ok(())
}

async fn run_new_transaction(
    node: &str,
    config: &ClientConfig,
    aux: String,
    binary: PathBuf,
    timestamp: Option<u64>,
) -> anyhow::Result<()> {
    let mut builder = TransactionBuilder::new()
        .aux(aux.into_bytes())
        .binary_path(&binary);
    if let Some(ts) = timestamp {
        builder = builder.timestamp(ts);
    }
    let tx = builder
        .build()
        .with_context(|| format!("building transaction from {}", binary.display()))?;

    let mut client = connect(node, config).await?;
    client.add_transaction(&tx).await?;
    client.close().await?;

    println!(
        "Submitted transaction ({} bytes, timestamp {})",
        tx.encoded_len(),
        tx.timestamp()
    );
    Ok(())
}

async fn run_fetch(node: &str, config: &ClientConfig, key: &str) -> anyhow::Result<()> {
    let key = hex::decode(key).context("key must be hex encoded")?;

    let mut client = connect(node, config).await?;
    let value = client.fetch_value(key).await?;
    client.close().await?;

    println!("{}", hex::encode(&value));
    Ok(())
}
