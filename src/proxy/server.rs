//! TCP proxy server
//!
//! Accepts join connections from the local game client, resolves the
//! host counter in the leading `Join` packet to a remote game, dials the
//! origin over the overlay, and splices the two streams.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::time::timeout;

use crate::game::Registry;
use crate::protocol::{self, Packet};
use crate::Result;

/// Timeout for reading the initial Join packet.
const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Timeout for connecting to remote hosts.
const DIAL_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum expected size of a Join packet.
const MAX_JOIN_PACKET_SIZE: usize = 512;

/// Proxies game join connections to remote hosts.
pub struct TcpProxy {
    listener: TcpListener,
    registry: Arc<Registry>,
    port: u16,
    shutdown: watch::Sender<bool>,
}

impl TcpProxy {
    /// Create a proxy listening on all interfaces with an OS-assigned
    /// port.
    ///
    /// Wildcard is required: the game client connects to the source
    /// address of the UDP broadcast it saw, which is the LAN interface,
    /// not loopback.
    pub async fn new(registry: Arc<Registry>) -> Result<Self> {
        let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
        let port = listener.local_addr()?.port();
        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            listener,
            registry,
            port,
            shutdown,
        })
    }

    /// The port the proxy is listening on. The broadcaster writes this
    /// into every re-announced game.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Accept and proxy connections until stopped.
    pub async fn run(&self) -> Result<()> {
        let mut shutdown_rx = self.shutdown.subscribe();

        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((client, addr)) => {
                            let registry = Arc::clone(&self.registry);
                            tokio::spawn(async move {
                                handle_connection(registry, client, addr).await;
                            });
                        }
                        Err(e) => {
                            tracing::error!("failed to accept connection: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        Ok(())
    }

    /// Stop accepting connections.
    pub fn stop(&self) {
        let _ = self.shutdown.send(true);
    }
}

/// Handle one client connection end to end.
async fn handle_connection(registry: Arc<Registry>, mut client: TcpStream, addr: SocketAddr) {
    tracing::info!("received TCP connection from {}", addr);

    let Some((join, initial)) = read_join_packet(&mut client, addr).await else {
        return;
    };

    tracing::info!(
        "join request from {}: host_counter={} player={:?}",
        addr,
        join.host_counter,
        join.player_name
    );

    let Some(game) = registry.find_by_host_counter(join.host_counter) else {
        for g in registry.games() {
            tracing::info!(
                "registry game {:?}: host_counter={} source={} peer={}",
                g.info.name,
                g.info.host_counter,
                g.source,
                g.peer_ip
            );
        }

        tracing::warn!(
            "no remote game found for host counter {} (client {})",
            join.host_counter,
            addr
        );

        return;
    };

    let origin_addr = SocketAddr::from((game.peer_ip, game.info.game_port));

    tracing::info!(
        "proxying {:?} (host_counter={}) for {} to {}",
        game.info.name,
        game.info.host_counter,
        addr,
        origin_addr
    );

    let mut origin = match timeout(DIAL_TIMEOUT, TcpStream::connect(origin_addr)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            tracing::error!("failed to connect to origin {}: {}", origin_addr, e);
            return;
        }
        Err(_) => {
            tracing::error!("timed out connecting to origin {}", origin_addr);
            return;
        }
    };

    // The origin must see the join request byte-for-byte as the client
    // sent it.
    if let Err(e) = origin.write_all(&initial).await {
        tracing::error!("failed to forward join request: {}", e);
        return;
    }

    relay(client, origin).await;
}

/// Read and decode the leading Join packet, returning it with the exact
/// bytes read. Failures close the client.
async fn read_join_packet(
    client: &mut TcpStream,
    addr: SocketAddr,
) -> Option<(protocol::Join, Vec<u8>)> {
    let mut buf = vec![0u8; MAX_JOIN_PACKET_SIZE];

    let n = match timeout(READ_TIMEOUT, client.read(&mut buf)).await {
        Ok(Ok(0)) => {
            tracing::debug!("client {} closed before sending a join request", addr);
            return None;
        }
        Ok(Ok(n)) => n,
        Ok(Err(e)) => {
            tracing::debug!("failed to read join request from {}: {}", addr, e);
            return None;
        }
        Err(_) => {
            tracing::debug!("timed out waiting for join request from {}", addr);
            return None;
        }
    };

    buf.truncate(n);

    match protocol::decode(&buf) {
        Ok(Packet::Join(join)) => Some((join, buf)),
        Ok(other) => {
            tracing::debug!(
                "first packet from {} was 0x{:02X}, not a join request",
                addr,
                other.id()
            );
            None
        }
        Err(e) => {
            tracing::debug!("failed to decode first packet from {}: {}", addr, e);
            None
        }
    }
}

/// Copy data bidirectionally until both directions finish.
///
/// A finished direction half-closes the opposite write side so the game
/// protocol's shutdown handshake survives; the other direction keeps
/// draining until its own EOF.
async fn relay(mut client: TcpStream, mut origin: TcpStream) {
    let (mut client_read, mut client_write) = client.split();
    let (mut origin_read, mut origin_write) = origin.split();

    let client_to_origin = async {
        if let Err(e) = tokio::io::copy(&mut client_read, &mut origin_write).await {
            tracing::debug!("relay error (client -> origin): {}", e);
        }
        let _ = origin_write.shutdown().await;
    };

    let origin_to_client = async {
        if let Err(e) = tokio::io::copy(&mut origin_read, &mut client_write).await {
            tracing::debug!("relay error (origin -> client): {}", e);
        }
        let _ = client_write.shutdown().await;
    };

    tokio::join!(client_to_origin, origin_to_client);
}
