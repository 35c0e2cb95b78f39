//! Peer probe engine
//!
//! Owns one UDP socket: queries go out of it, every `GameInfo` reply
//! comes back in on it. A single loop multiplexes the probe ticker, the
//! immediate-probe kick, and the ingest reader.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::{watch, Notify};

use crate::game::{Game, Registry, Source};
use crate::overlay::Peer;
use crate::protocol::{self, GameVersion, Packet, SearchGame, LAN_PORT};
use crate::Result;

/// Probe cadence when none is configured.
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(5);

/// Receive buffer size; announcements comfortably fit.
const UDP_BUFFER_SIZE: usize = 512;

struct ProbeState {
    peers: Vec<Peer>,
    version: GameVersion,
}

/// Probes overlay peers for hosted games and feeds replies into the
/// registry.
pub struct ProbeEngine {
    socket: UdpSocket,
    registry: Arc<Registry>,
    state: RwLock<ProbeState>,
    kick: Notify,
    probe_interval: Duration,
    game_timeout: Duration,
    shutdown: watch::Sender<bool>,
}

impl ProbeEngine {
    /// Create a new probe engine on an ephemeral UDP port.
    pub async fn new(
        registry: Arc<Registry>,
        probe_interval: Duration,
        game_timeout: Duration,
    ) -> Result<Self> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            socket,
            registry,
            state: RwLock::new(ProbeState {
                peers: Vec::new(),
                // Version zero until the supervisor provides one.
                version: GameVersion::default(),
            }),
            kick: Notify::new(),
            probe_interval,
            game_timeout,
            shutdown,
        })
    }

    /// Set the game version carried in outgoing queries.
    /// A version of zero disables probing until a real one is set.
    pub fn set_version(&self, version: GameVersion) {
        self.state.write().unwrap().version = version;
    }

    /// Replace the peer list and probe the new peers immediately.
    pub fn on_peers_changed(&self, peers: &[Peer]) {
        self.state.write().unwrap().peers = peers.to_vec();
        self.kick.notify_one();
    }

    /// Trigger an immediate probe without waiting for the ticker.
    pub fn refresh(&self) {
        self.kick.notify_one();
    }

    /// Run the probe ticker and the ingest reader until stopped.
    ///
    /// The staleness sweep rides on the same ticker.
    pub async fn run(&self) -> Result<()> {
        let mut interval = tokio::time::interval(self.probe_interval);
        let mut shutdown_rx = self.shutdown.subscribe();
        let mut buf = vec![0u8; UDP_BUFFER_SIZE];

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.probe_all().await;
                    self.sweep();
                }
                _ = self.kick.notified() => {
                    self.probe_all().await;
                }
                result = self.socket.recv_from(&mut buf) => {
                    match result {
                        Ok((n, addr)) => self.ingest(&buf[..n], addr),
                        Err(e) => tracing::debug!("probe socket read failed: {}", e),
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

    /// Stop the probe loop.
    pub fn stop(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Send a `SearchGame` to loopback and every online peer.
    /// Returns the number of queries sent.
    async fn probe_all(&self) -> usize {
        let (peers, version) = {
            let state = self.state.read().unwrap();
            (state.peers.clone(), state.version)
        };

        // No version yet means nothing sensible to put in the query.
        if version.version == 0 {
            return 0;
        }

        let query = SearchGame {
            game_version: version,
            host_counter: 0,
        }
        .encode();

        let mut sent = 0;

        // Loopback first, to pick up games hosted on this machine.
        match self
            .socket
            .send_to(&query, (Ipv4Addr::LOCALHOST, LAN_PORT))
            .await
        {
            Ok(_) => sent += 1,
            Err(e) => tracing::debug!("failed to probe localhost: {}", e),
        }

        for peer in peers.iter().filter(|p| p.online) {
            match self.socket.send_to(&query, (peer.ip, LAN_PORT)).await {
                Ok(_) => sent += 1,
                Err(e) => tracing::debug!("failed to probe peer {}: {}", peer.ip, e),
            }
        }

        sent
    }

    /// Ingest one datagram: keep the raw bytes, decode, classify, store.
    fn ingest(&self, data: &[u8], addr: SocketAddr) {
        // Copy before any processing; the registry keeps these bytes.
        let raw = data.to_vec();

        let IpAddr::V4(peer_ip) = addr.ip() else {
            return;
        };

        // Anything that is not a well-formed GameInfo is dropped.
        let info = match protocol::decode(&raw) {
            Ok(Packet::GameInfo(info)) => info,
            Ok(_) | Err(_) => return,
        };

        let (source, peer_name) = if peer_ip.is_loopback() {
            (Source::Local, "local".to_string())
        } else {
            (Source::Remote, self.find_peer_name(peer_ip))
        };

        tracing::debug!(
            "discovered {} game {:?} from {} (host_counter={}, slots {}/{})",
            source,
            info.name,
            peer_ip,
            info.host_counter,
            info.slots_used,
            info.slots_total
        );

        self.registry
            .add(Game::new(info, raw, source, peer_ip, peer_name));
    }

    /// Resolve a peer's hostname from the current peer list.
    fn find_peer_name(&self, ip: Ipv4Addr) -> String {
        let state = self.state.read().unwrap();
        state
            .peers
            .iter()
            .find(|p| p.ip == ip)
            .map(|p| p.name.clone())
            .unwrap_or_default()
    }

    fn sweep(&self) {
        let removed = self.registry.expire(self.game_timeout);
        if removed > 0 {
            tracing::debug!("expired {} stale game(s)", removed);
        }
    }
}
