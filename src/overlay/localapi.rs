//! Overlay daemon local-API client
//!
//! Polls the mesh daemon's status endpoint and pushes filtered peer
//! lists to the rest of the daemon whenever they change.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::watch;

use super::{first_ipv4, peer_from_node, OnPeersChanged, Peer};
use crate::Result;

/// One node in the overlay status report.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Node {
    #[serde(rename = "HostName", default)]
    pub host_name: String,

    #[serde(rename = "TailscaleIPs", default)]
    pub addresses: Vec<IpAddr>,

    #[serde(rename = "Online", default)]
    pub online: bool,

    #[serde(rename = "OS", default)]
    pub os: String,

    #[serde(rename = "Tags", default)]
    pub tags: Vec<String>,
}

/// The overlay daemon's status report.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Status {
    #[serde(rename = "Self")]
    pub self_node: Option<Node>,

    #[serde(rename = "Peer", default)]
    pub peers: HashMap<String, Node>,
}

impl Status {
    /// The probeable peers, filtered and in stable (name) order.
    pub fn probeable_peers(&self) -> Vec<Peer> {
        let mut peers: Vec<Peer> = self.peers.values().filter_map(peer_from_node).collect();
        peers.sort_by(|a, b| a.name.cmp(&b.name));
        peers
    }

    /// This node's overlay IPv4 address, if the daemon reports one.
    pub fn self_ipv4(&self) -> Option<Ipv4Addr> {
        self.self_node
            .as_ref()
            .and_then(|n| first_ipv4(&n.addresses))
    }
}

/// Client for the overlay daemon's local status API.
pub struct LocalApi {
    client: reqwest::Client,
    status_url: String,
    poll_interval: Duration,
    on_change: Option<OnPeersChanged>,
    shutdown: watch::Sender<bool>,
}

impl LocalApi {
    /// Create a new client against the given base URL.
    pub fn new(
        base_url: &str,
        poll_interval: Duration,
        on_change: Option<OnPeersChanged>,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);

        Self {
            client: reqwest::Client::new(),
            status_url: format!("{}/localapi/v0/status", base_url.trim_end_matches('/')),
            poll_interval,
            on_change,
            shutdown,
        }
    }

    /// Fetch the current status report.
    pub async fn fetch_status(&self) -> Result<Status> {
        let status = self
            .client
            .get(&self.status_url)
            .send()
            .await?
            .error_for_status()?
            .json::<Status>()
            .await?;

        Ok(status)
    }

    /// Fetch this node's overlay IPv4 address.
    ///
    /// Called synchronously at startup; the query responder cannot bind
    /// without it.
    pub async fn fetch_self_ip(&self) -> Result<Option<Ipv4Addr>> {
        Ok(self.fetch_status().await?.self_ipv4())
    }

    /// Poll for peer changes until stopped.
    ///
    /// The change callback fires on the first successful poll and on
    /// every poll whose filtered peer list differs from the previous one.
    /// A failed poll is logged at debug and retried on the next tick.
    pub async fn run(&self) -> Result<()> {
        let mut interval = tokio::time::interval(self.poll_interval);
        let mut shutdown_rx = self.shutdown.subscribe();
        let mut last: Option<Vec<Peer>> = None;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.fetch_status().await {
                        Ok(status) => {
                            let peers = status.probeable_peers();
                            if last.as_ref() != Some(&peers) {
                                tracing::debug!("overlay peer list changed ({} peers)", peers.len());
                                if let Some(on_change) = &self.on_change {
                                    on_change(&peers);
                                }
                                last = Some(peers);
                            }
                        }
                        Err(e) => {
                            tracing::debug!("overlay status poll failed: {}", e);
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

    /// Stop the poll loop.
    pub fn stop(&self) {
        let _ = self.shutdown.send(true);
    }
}
