//! Mesh overlay adapter
//!
//! The overlay (the mesh VPN daemon running on this machine) is treated
//! as an opaque collaborator: all the bridge needs from it is the local
//! overlay IPv4 address and a stream of peer-list changes. Peers that
//! cannot possibly host or join a game are filtered out here so the rest
//! of the daemon never sees them.

mod localapi;

pub use localapi::{LocalApi, Node, Status};

use std::net::{IpAddr, Ipv4Addr};

/// Tag carried by Mullvad exit nodes; they are relays, not real endpoints.
const MULLVAD_EXIT_NODE_TAG: &str = "tag:mullvad-exit-node";

/// An overlay peer that may be hosting games.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    /// The peer's hostname.
    pub name: String,

    /// The peer's overlay IPv4 address.
    pub ip: Ipv4Addr,

    /// Whether the peer is currently connected.
    pub online: bool,

    /// The peer's operating system label (e.g. "windows", "linux").
    pub os: String,
}

/// Called with the full peer list whenever it changes.
pub type OnPeersChanged = Box<dyn Fn(&[Peer]) + Send + Sync>;

/// Extract a probeable peer from a status node, applying the filter
/// rules: online only, no exit-node relays, no mobile devices (they
/// cannot run the game client), IPv4 overlay address required.
pub(crate) fn peer_from_node(node: &Node) -> Option<Peer> {
    if !node.online {
        return None;
    }

    if node.tags.iter().any(|t| t == MULLVAD_EXIT_NODE_TAG) {
        return None;
    }

    let os = node.os.to_lowercase();
    if os == "ios" || os == "android" {
        return None;
    }

    let ip = first_ipv4(&node.addresses)?;

    Some(Peer {
        name: node.host_name.clone(),
        ip,
        online: node.online,
        os: node.os.clone(),
    })
}

pub(crate) fn first_ipv4(addrs: &[IpAddr]) -> Option<Ipv4Addr> {
    addrs.iter().find_map(|a| match a {
        IpAddr::V4(v4) => Some(*v4),
        IpAddr::V6(_) => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn online_node() -> Node {
        Node {
            host_name: "peer-a".to_string(),
            addresses: vec![
                "fd7a:115c:a1e0::2".parse().unwrap(),
                "100.64.0.2".parse().unwrap(),
            ],
            online: true,
            os: "windows".to_string(),
            tags: Vec::new(),
        }
    }

    #[test]
    fn test_accepts_online_desktop_peer() {
        let peer = peer_from_node(&online_node()).unwrap();
        assert_eq!(peer.name, "peer-a");
        assert_eq!(peer.ip, Ipv4Addr::new(100, 64, 0, 2));
        assert_eq!(peer.os, "windows");
    }

    #[test]
    fn test_rejects_offline_peer() {
        let mut node = online_node();
        node.online = false;
        assert!(peer_from_node(&node).is_none());
    }

    #[test]
    fn test_rejects_mobile_peers() {
        for os in ["iOS", "android", "Android"] {
            let mut node = online_node();
            node.os = os.to_string();
            assert!(peer_from_node(&node).is_none(), "os {}", os);
        }
    }

    #[test]
    fn test_rejects_exit_node_relays() {
        let mut node = online_node();
        node.tags = vec![MULLVAD_EXIT_NODE_TAG.to_string()];
        assert!(peer_from_node(&node).is_none());
    }

    #[test]
    fn test_rejects_peer_without_ipv4() {
        let mut node = online_node();
        node.addresses = vec!["fd7a:115c:a1e0::2".parse().unwrap()];
        assert!(peer_from_node(&node).is_none());
    }
}
