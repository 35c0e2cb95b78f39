//! Game state management
//!
//! A [`Game`] is one observed announcement, local or remote; the
//! [`Registry`] is the shared table every other subsystem reads from.

mod registry;

pub use registry::{OnGamesChanged, Registry};

use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

use crate::protocol::GameInfo;

/// Where a game was discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// Hosted on this machine, learned via loopback.
    Local,
    /// Learned from an overlay peer.
    Remote,
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Source::Local => write!(f, "local"),
            Source::Remote => write!(f, "remote"),
        }
    }
}

/// A discovered game.
#[derive(Debug, Clone)]
pub struct Game {
    /// Decoded announcement, for display and join routing.
    pub info: GameInfo,

    /// Original packet bytes, for forwarding. Re-emission must preserve
    /// the exact host counter bytes, which re-encoding would not guarantee.
    pub raw: Vec<u8>,

    /// Where this game was discovered.
    pub source: Source,

    /// Address of the announcing host (loopback for local games).
    pub peer_ip: Ipv4Addr,

    /// Hostname of the announcing overlay peer; "local" for local games,
    /// empty when the peer list could not resolve the address.
    pub peer_name: String,

    /// When this game was first discovered.
    pub first_seen: Instant,

    /// When this game was last seen or refreshed.
    pub last_seen: Instant,
}

impl Game {
    /// Create a record for a freshly observed announcement.
    pub fn new(
        info: GameInfo,
        raw: Vec<u8>,
        source: Source,
        peer_ip: Ipv4Addr,
        peer_name: String,
    ) -> Self {
        let now = Instant::now();

        Self {
            info,
            raw,
            source,
            peer_ip,
            peer_name,
            first_seen: now,
            last_seen: now,
        }
    }

    /// Unique registry key for this game.
    ///
    /// Local games collapse on name alone; remote games are scoped by the
    /// origin address. Two same-named games from one origin collapse to
    /// the most recent, a limitation inherited from the wire protocol.
    pub fn key(&self) -> String {
        match self.source {
            Source::Local => format!("local:{}", self.info.name),
            Source::Remote => format!("{}:{}", self.peer_ip, self.info.name),
        }
    }

    /// Whether the game has gone unrefreshed for longer than `timeout`.
    pub fn is_stale(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{GameVersion, Product};

    pub(crate) fn test_info(name: &str, host_counter: u32) -> GameInfo {
        GameInfo {
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
        }
    }

    #[test]
    fn test_key_scoping() {
        let local = Game::new(
            test_info("g1", 1),
            vec![0xF7],
            Source::Local,
            Ipv4Addr::LOCALHOST,
            "local".to_string(),
        );
        assert_eq!(local.key(), "local:g1");

        let remote = Game::new(
            test_info("g1", 1),
            vec![0xF7],
            Source::Remote,
            Ipv4Addr::new(100, 64, 0, 2),
            "peer-a".to_string(),
        );
        assert_eq!(remote.key(), "100.64.0.2:g1");
    }

    #[test]
    fn test_staleness() {
        let game = Game::new(
            test_info("g1", 1),
            Vec::new(),
            Source::Local,
            Ipv4Addr::LOCALHOST,
            "local".to_string(),
        );
        assert!(!game.is_stale(Duration::from_secs(10)));

        std::thread::sleep(Duration::from_millis(2));
        assert!(game.is_stale(Duration::from_millis(1)));
    }
}
