//! TCP join proxying
//!
//! The game client joins whatever address announced the game on the LAN,
//! which is us; the [`TcpProxy`] turns that into a connection to the real
//! host over the overlay.

mod server;

pub use server::TcpProxy;
