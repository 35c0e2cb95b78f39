//! Query responder
//!
//! Listens on the overlay address for `SearchGame` queries from remote
//! peers and answers with the raw announcement bytes of every locally
//! hosted game. Binding the overlay address specifically (never
//! wildcard) keeps the local game client's own port 6112 traffic out of
//! our hands.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::watch;

use crate::game::Registry;
use crate::protocol::{self, LAN_PORT};
use crate::Result;

const UDP_BUFFER_SIZE: usize = 512;

/// Answers discovery queries from remote overlay peers.
pub struct Responder {
    socket: UdpSocket,
    registry: Arc<Registry>,
    shutdown: watch::Sender<bool>,
}

impl Responder {
    /// Create a responder bound to the overlay address on the game port.
    pub async fn new(registry: Arc<Registry>, overlay_ip: Ipv4Addr) -> Result<Self> {
        Self::bind(registry, overlay_ip, LAN_PORT).await
    }

    async fn bind(registry: Arc<Registry>, ip: Ipv4Addr, port: u16) -> Result<Self> {
        let socket = UdpSocket::bind((ip, port)).await?;
        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            socket,
            registry,
            shutdown,
        })
    }

    /// The bound address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Answer queries until stopped.
    pub async fn run(&self) -> Result<()> {
        let mut shutdown_rx = self.shutdown.subscribe();
        let mut buf = vec![0u8; UDP_BUFFER_SIZE];

        loop {
            tokio::select! {
                result = self.socket.recv_from(&mut buf) => {
                    match result {
                        Ok((n, addr)) => self.handle(&buf[..n], addr).await,
                        Err(e) => tracing::debug!("responder socket read failed: {}", e),
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

    /// Stop the responder.
    pub fn stop(&self) {
        let _ = self.shutdown.send(true);
    }

    async fn handle(&self, data: &[u8], addr: SocketAddr) {
        match protocol::peek_header(data) {
            Ok((protocol::id::SEARCH_GAME, _)) => {}
            // Anything else on this socket is not for us.
            Ok(_) | Err(_) => return,
        }

        let games = self.registry.local_games();

        tracing::debug!("received game query from {} ({} local games)", addr, games.len());

        for game in &games {
            // Answer with the exact bytes we observed; re-encoding could
            // change the host counter the querier will later join by.
            if game.raw.is_empty() {
                tracing::warn!("game {:?} has no raw announcement, skipping", game.info.name);
                continue;
            }

            if let Err(e) = self.socket.send_to(&game.raw, addr).await {
                tracing::debug!(
                    "failed to send announcement for {:?} to {}: {}",
                    game.info.name,
                    addr,
                    e
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{Game, Source};
    use crate::protocol::{GameInfo, GameVersion, Product, SearchGame};
    use std::time::Duration;

    fn local_game(name: &str, host_counter: u32) -> Game {
        let info = GameInfo {
            game_version: GameVersion {
                product: Product::TFT,
                version: 26,
            },
            host_counter,
            entry_key: 0,
            name: name.to_string(),
            stat_string: Vec::new(),
            slots_total: 8,
            flags: 0,
            slots_used: 1,
            slots_available: 8,
            uptime_sec: 0,
            game_port: 6112,
        };
        let raw = info.encode();
        Game::new(info, raw, Source::Local, Ipv4Addr::LOCALHOST, "local".to_string())
    }

    #[tokio::test]
    async fn test_replies_with_raw_local_games() {
        let registry = Arc::new(Registry::new(None));
        let game = local_game("mine", 3);
        let expected_raw = game.raw.clone();
        registry.add(game);

        let responder = Responder::bind(registry, Ipv4Addr::LOCALHOST, 0)
            .await
            .unwrap();
        let responder_addr = responder.local_addr().unwrap();

        let responder = Arc::new(responder);
        let running = Arc::clone(&responder);
        let task = tokio::spawn(async move { running.run().await });

        let querier = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let query = SearchGame {
            game_version: GameVersion {
                product: Product::TFT,
                version: 26,
            },
            host_counter: 0,
        }
        .encode();
        querier.send_to(&query, responder_addr).await.unwrap();

        let mut buf = vec![0u8; 512];
        let (n, from) = tokio::time::timeout(Duration::from_secs(2), querier.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(from, responder_addr);
        assert_eq!(&buf[..n], &expected_raw[..]);

        responder.stop();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_ignores_non_queries() {
        let registry = Arc::new(Registry::new(None));
        registry.add(local_game("mine", 3));

        let responder = Responder::bind(registry, Ipv4Addr::LOCALHOST, 0)
            .await
            .unwrap();
        let responder_addr = responder.local_addr().unwrap();

        let responder = Arc::new(responder);
        let running = Arc::clone(&responder);
        let task = tokio::spawn(async move { running.run().await });

        let querier = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        querier.send_to(b"not a w3gs packet", responder_addr).await.unwrap();

        let mut buf = vec![0u8; 512];
        let reply = tokio::time::timeout(Duration::from_millis(200), querier.recv_from(&mut buf)).await;
        assert!(reply.is_err(), "expected no reply to garbage");

        responder.stop();
        task.await.unwrap().unwrap();
    }
}
