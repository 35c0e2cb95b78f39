//! warlink - Warcraft III LAN Discovery Bridge
//!
//! Bridges the classic Warcraft III (1.26-1.29) LAN discovery protocol
//! across a mesh VPN overlay so that games hosted on remote peers show up
//! in the local LAN game list of an unmodified game client.
//!
//! # Architecture
//!
//! Every node runs the same daemon; together they form a symmetric
//! peer-to-peer fabric. Each daemon probes overlay peers for hosted games,
//! answers probes with its own locally hosted games, re-broadcasts remote
//! games onto the local broadcast segment, and proxies the resulting TCP
//! join connection back to the real host over the overlay.
//!
//! # Features
//!
//! - Periodic UDP game discovery across all online overlay peers
//! - Byte-exact re-broadcast of remote game announcements on the local LAN
//! - Player-count refresh and cancellation packets between announcements
//! - Transparent TCP join proxying with half-close propagation
//! - Standalone probe tool for diagnosing discovery problems

pub mod config;
pub mod daemon;
pub mod discovery;
pub mod error;
pub mod game;
pub mod lan;
pub mod overlay;
pub mod protocol;
pub mod proxy;
pub mod version;

pub use config::Config;
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::game::{Game, Registry, Source};
    pub use crate::overlay::Peer;
    pub use crate::protocol::{GameInfo, GameVersion, Product};
}
