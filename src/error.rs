//! warlink error types

use thiserror::Error;

/// Result type alias for warlink operations
pub type Result<T> = std::result::Result<T, Error>;

/// warlink error types
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Invalid game version {0:?}")]
    InvalidVersion(String),

    #[error("Unknown product {0:?} (use W3XP or WAR3)")]
    UnknownProduct(String),

    // Wire protocol errors
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Packet truncated: need {need} bytes, have {have}")]
    Truncated { need: usize, have: usize },

    // Overlay errors
    #[error("Overlay API request failed: {0}")]
    OverlayHttp(#[from] reqwest::Error),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Operation cancelled")]
    Cancelled,
}
