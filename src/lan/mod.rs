//! LAN re-broadcaster
//!
//! Periodically re-announces remote games on the local broadcast segment
//! so an unmodified game client lists them. Announcements are the raw
//! received bytes with only the trailing port field rewritten to point at
//! our TCP proxy; between announcements the client's player counts are
//! kept current with `RefreshGame`, and disappeared games are withdrawn
//! with `DecreateGame`.

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Mutex;
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::watch;

use crate::game::{Game, Source};
use crate::protocol::{self, LAN_PORT};
use crate::Result;

/// Broadcast cadence when none is configured.
pub const DEFAULT_BROADCAST_INTERVAL: Duration = Duration::from_secs(3);

/// UDP send buffer size; a burst re-announces every game in one tick.
const SEND_BUFFER_SIZE: usize = 64 * 1024;

/// Announcements shorter than this cannot carry a port field.
const MIN_PACKET_SIZE: usize = 4;

/// Re-broadcasts remote games to the local LAN.
pub struct Broadcaster {
    socket: UdpSocket,
    games: Mutex<Vec<Game>>,
    proxy_port: u16,
    target: SocketAddr,
    interval: Duration,
    shutdown: watch::Sender<bool>,
}

impl Broadcaster {
    /// Create a broadcaster that redirects joins to `proxy_port`.
    pub fn new(proxy_port: u16, interval: Duration) -> Result<Self> {
        Self::with_target(
            proxy_port,
            interval,
            SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::BROADCAST, LAN_PORT)),
        )
    }

    fn with_target(proxy_port: u16, interval: Duration, target: SocketAddr) -> Result<Self> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_nonblocking(true)?;
        socket.set_broadcast(true)?;
        socket.set_send_buffer_size(SEND_BUFFER_SIZE)?;
        socket.bind(&SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)).into())?;

        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            socket: UdpSocket::from_std(socket.into())?,
            games: Mutex::new(Vec::new()),
            proxy_port,
            target,
            interval,
            shutdown,
        })
    }

    /// Update the set of games to advertise. Takes effect on the next
    /// tick so the broadcast cadence stays steady.
    pub fn on_games_changed(&self, games: &[Game]) {
        *self.games.lock().unwrap() = games.to_vec();
    }

    /// Run the broadcast loop until stopped.
    pub async fn run(&self) -> Result<()> {
        let mut interval = tokio::time::interval(self.interval);
        let mut shutdown_rx = self.shutdown.subscribe();
        let mut previous: HashMap<String, u32> = HashMap::new();

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.broadcast_games(&mut previous).await;
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

    /// Stop the broadcast loop.
    pub fn stop(&self) {
        let _ = self.shutdown.send(true);
    }

    /// One tick: announce and refresh every remote game, then cancel the
    /// games that were advertised last tick but are gone now.
    async fn broadcast_games(&self, previous: &mut HashMap<String, u32>) {
        let games = self.games.lock().unwrap().clone();

        let mut current: HashMap<String, u32> = HashMap::new();

        for game in games.iter().filter(|g| g.source == Source::Remote) {
            current.insert(game.key(), game.info.host_counter);

            self.send_game_info(game).await;
            self.send_refresh(game).await;
        }

        for (key, host_counter) in previous.iter() {
            if !current.contains_key(key) {
                self.send_decreate(*host_counter).await;
                tracing::debug!("sent cancellation for {} (host_counter={})", key, host_counter);
            }
        }

        *previous = current;
    }

    /// Forward the raw announcement with the port field rewritten.
    async fn send_game_info(&self, game: &Game) {
        let Some(data) = rewrite_port(&game.raw, self.proxy_port) else {
            tracing::debug!("skipping game {:?} with no raw data", game.info.name);
            return;
        };

        if let Err(e) = self.socket.send_to(&data, self.target).await {
            tracing::debug!("failed to broadcast game {:?}: {}", game.info.name, e);
            return;
        }

        tracing::debug!(
            "broadcast game {:?} (host_counter={}, proxy_port={})",
            game.info.name,
            game.info.host_counter,
            self.proxy_port
        );
    }

    async fn send_refresh(&self, game: &Game) {
        let packet = protocol::refresh_game(
            game.info.host_counter,
            game.info.slots_used,
            game.info.slots_available,
        );

        if let Err(e) = self.socket.send_to(&packet, self.target).await {
            tracing::debug!("failed to send refresh: {}", e);
        }
    }

    async fn send_decreate(&self, host_counter: u32) {
        let packet = protocol::decreate_game(host_counter);

        if let Err(e) = self.socket.send_to(&packet, self.target).await {
            tracing::debug!("failed to send cancellation: {}", e);
        }
    }
}

/// Copy an announcement and overwrite its trailing port field.
///
/// Everything before the final two bytes stays untouched; the game client
/// correlates discovery with the later TCP join through those bytes.
fn rewrite_port(raw: &[u8], port: u16) -> Option<Vec<u8>> {
    if raw.len() < MIN_PACKET_SIZE {
        return None;
    }

    let mut data = raw.to_vec();
    let port_idx = data.len() - 2;
    data[port_idx..].copy_from_slice(&port.to_le_bytes());
    Some(data)
}
