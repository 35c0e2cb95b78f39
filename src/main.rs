//! warlink - Warcraft III LAN Discovery Bridge
//!
//! Bridges the classic WC3 LAN discovery protocol across a mesh VPN
//! overlay so remote games show up as local ones.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::net::UdpSocket;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use warlink::config::{self, Config};
use warlink::protocol::{self, GameInfo, GameVersion, Packet, Product, SearchGame, LAN_PORT};
use warlink::{daemon, version, Error, Result};

/// warlink - Warcraft III LAN Discovery Bridge
#[derive(Parser)]
#[command(name = "warlink")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the LAN bridge daemon (the default)
    Run {
        /// Game version (e.g. 26, 1.26, 27, 1.27, 28, 1.28)
        #[arg(long)]
        version: Option<String>,

        /// Path to configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Probe hosts for WC3 games
    Probe {
        /// Response timeout in seconds
        #[arg(long, default_value_t = 5)]
        timeout: u64,

        /// Game version (e.g. 26, 1.26, 27, 1.27, 28, 1.28)
        #[arg(long, default_value = "26")]
        version: String,

        /// Product code (W3XP for TFT, WAR3 for ROC)
        #[arg(long, default_value = "W3XP")]
        product: String,

        /// Hosts to probe
        hosts: Vec<String>,
    },

    /// Print version information
    Version,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_logging(&cli.log_level);

    // No subcommand means run the daemon.
    let command = cli.command.unwrap_or(Commands::Run {
        version: None,
        config: None,
    });

    let result = match command {
        Commands::Run { version, config } => run_daemon(version, config).await,
        Commands::Probe {
            timeout,
            version,
            product,
            hosts,
        } => run_probe(timeout, &version, &product, &hosts).await,
        Commands::Version => run_version(),
    };

    if let Err(e) = result {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

/// Initialize logging
fn init_logging(level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Run the bridge daemon
async fn run_daemon(version: Option<String>, config_path: Option<PathBuf>) -> Result<()> {
    let mut config = match &config_path {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    if let Some(v) = version {
        config.game.version = config::parse_version(&v)?;
    }

    if config.game.version != 0 && !config::supported_versions().contains(&config.game.version) {
        tracing::warn!(
            "game version {} is untested; discovery may not interoperate",
            config::format_version(config.game.version)
        );
    }

    tracing::info!(
        "starting warlink (version {}, product {})",
        config::format_version(config.game.version),
        config.game.product
    );

    daemon::run(config).await
}

/// Send SearchGame queries to the given hosts and print every reply.
async fn run_probe(
    timeout_secs: u64,
    version_str: &str,
    product_str: &str,
    hosts: &[String],
) -> Result<()> {
    if hosts.is_empty() {
        return Err(Error::Config("at least one host required".into()));
    }

    let version = config::parse_version(version_str)?;
    let product = Product::parse(product_str)?;

    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;

    let query = SearchGame {
        game_version: GameVersion { product, version },
        host_counter: 1,
    }
    .encode();

    println!("Probing with: Product={} Version=1.{}\n", product, version);

    for host in hosts {
        let Some(addr) = resolve_host(host).await else {
            continue;
        };

        println!("Sending SearchGame to {}...", addr);

        if let Err(e) = socket.send_to(&query, addr).await {
            println!("  Error: {}", e);
        }
    }

    receive_responses(&socket, Duration::from_secs(timeout_secs)).await
}

async fn resolve_host(host: &str) -> Option<SocketAddr> {
    if let Ok(ip) = host.parse::<Ipv4Addr>() {
        return Some(SocketAddr::from((ip, LAN_PORT)));
    }

    match tokio::net::lookup_host((host, LAN_PORT)).await {
        Ok(mut addrs) => match addrs.find(|a| a.is_ipv4()) {
            Some(addr) => Some(addr),
            None => {
                println!("No IPv4 address for {}", host);
                None
            }
        },
        Err(e) => {
            println!("Cannot resolve {}: {}", host, e);
            None
        }
    }
}

async fn receive_responses(socket: &UdpSocket, window: Duration) -> Result<()> {
    println!("\nWaiting for responses (timeout: {}s)...\n", window.as_secs());

    let deadline = tokio::time::Instant::now() + window;
    let mut games_found = 0;
    let mut buf = vec![0u8; 4096];

    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            break;
        }

        match tokio::time::timeout(remaining, socket.recv_from(&mut buf)).await {
            Ok(Ok((n, from))) => games_found += report_packet(&buf[..n], from),
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => break,
        }
    }

    if games_found == 0 {
        println!("No games found.");
    } else {
        println!("Found {} game(s).", games_found);
    }

    Ok(())
}

fn report_packet(data: &[u8], from: SocketAddr) -> usize {
    if data.len() < protocol::HEADER_LEN || data[0] != protocol::SIGNATURE {
        println!("Received non-W3GS data from {} ({} bytes)", from, data.len());
        return 0;
    }

    let packet_id = data[1];
    println!(
        "Received W3GS packet 0x{:02X} from {} ({} bytes)",
        packet_id,
        from,
        data.len()
    );

    if packet_id != protocol::id::GAME_INFO {
        return 0;
    }

    match protocol::decode(data) {
        Ok(Packet::GameInfo(info)) => {
            print_game_info(&info, from);
            1
        }
        Ok(_) => 0,
        Err(e) => {
            println!("  Failed to parse: {}", e);
            println!("  Raw: {:02x?}", data);
            0
        }
    }
}

fn print_game_info(info: &GameInfo, from: SocketAddr) {
    println!();
    println!("=== Game Found ===");
    println!("  From:     {}", from);
    println!("  Name:     {}", info.name);
    if let Ok(map) = info.map_info() {
        println!("  Map:      {}", map.map_path);
        println!("  Host:     {}", map.host_name);
    }
    println!("  Players:  {}/{}", info.slots_used, info.slots_total);
    println!("  Port:     {}", info.game_port);
    println!("  Version:  {}", info.game_version);
    println!("  HostCtr:  {}", info.host_counter);
    println!();
}

/// Print version information
fn run_version() -> Result<()> {
    println!("warlink {}", version::get());
    Ok(())
}
