//! Shared game registry with change fan-out.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use super::{Game, Source};

/// Called with a snapshot of all games after every mutation.
///
/// Invoked while the registry's write lock is held, so consumers observe
/// changes in exactly the order they were applied. Callbacks must not
/// block and must not call back into the registry.
pub type OnGamesChanged = Box<dyn Fn(&[Game]) + Send + Sync>;

/// Thread-safe collection of discovered games.
pub struct Registry {
    games: RwLock<HashMap<String, Game>>,
    on_change: Option<OnGamesChanged>,
}

impl Registry {
    /// Create a new registry.
    pub fn new(on_change: Option<OnGamesChanged>) -> Self {
        Self {
            games: RwLock::new(HashMap::new()),
            on_change,
        }
    }

    /// Add or refresh a game. Returns true if the game was newly added.
    ///
    /// A refresh keeps the original `first_seen` and replaces everything
    /// else, including the raw packet bytes.
    pub fn add(&self, mut game: Game) -> bool {
        let mut games = self.games.write().unwrap();

        let key = game.key();
        let inserted = match games.get(&key) {
            Some(existing) => {
                game.first_seen = existing.first_seen;
                false
            }
            None => {
                tracing::debug!(
                    "adding new game to registry: {} (host_counter={}, source={}, {} total)",
                    key,
                    game.info.host_counter,
                    game.source,
                    games.len() + 1
                );
                true
            }
        };

        game.last_seen = Instant::now();
        games.insert(key, game);

        self.notify(&games);

        inserted
    }

    /// Remove a game. Returns true if it existed.
    pub fn remove(&self, key: &str) -> bool {
        let mut games = self.games.write().unwrap();

        if games.remove(key).is_none() {
            return false;
        }

        self.notify(&games);

        true
    }

    /// A copy of all games, independent of internal storage.
    pub fn games(&self) -> Vec<Game> {
        let games = self.games.read().unwrap();
        games.values().cloned().collect()
    }

    /// Games hosted on this machine.
    pub fn local_games(&self) -> Vec<Game> {
        self.filtered(Source::Local)
    }

    /// Games learned from overlay peers.
    pub fn remote_games(&self) -> Vec<Game> {
        self.filtered(Source::Remote)
    }

    fn filtered(&self, source: Source) -> Vec<Game> {
        let games = self.games.read().unwrap();
        games
            .values()
            .filter(|g| g.source == source)
            .cloned()
            .collect()
    }

    /// Find a remote game by its host counter, the identifier a joining
    /// client presents over TCP. Returns a copy.
    pub fn find_by_host_counter(&self, host_counter: u32) -> Option<Game> {
        let games = self.games.read().unwrap();

        let mut matches = games
            .values()
            .filter(|g| g.source == Source::Remote && g.info.host_counter == host_counter);

        let found = matches.next().cloned();
        if found.is_some() && matches.next().is_some() {
            tracing::debug!("multiple remote games share host counter {}", host_counter);
        }

        found
    }

    /// Remove games that have gone unrefreshed for longer than `timeout`.
    /// Returns the number of games removed.
    pub fn expire(&self, timeout: Duration) -> usize {
        let mut games = self.games.write().unwrap();

        let before = games.len();
        games.retain(|_, g| !g.is_stale(timeout));
        let removed = before - games.len();

        if removed > 0 {
            self.notify(&games);
        }

        removed
    }

    fn notify(&self, games: &HashMap<String, Game>) {
        if let Some(on_change) = &self.on_change {
            let snapshot: Vec<Game> = games.values().cloned().collect();
            on_change(&snapshot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::tests::test_info;
    use std::net::Ipv4Addr;
    use std::sync::{Arc, Mutex};

    fn local(name: &str) -> Game {
        Game::new(
            test_info(name, 0),
            vec![0xF7, 0x30],
            Source::Local,
            Ipv4Addr::LOCALHOST,
            "local".to_string(),
        )
    }

    fn remote(name: &str, host_counter: u32) -> Game {
        Game::new(
            test_info(name, host_counter),
            vec![0xF7, 0x30, 0x08, 0x00],
            Source::Remote,
            Ipv4Addr::new(100, 64, 0, 2),
            "peer-a".to_string(),
        )
    }

    #[test]
    fn test_add_then_refresh() {
        let registry = Registry::new(None);

        assert!(registry.add(remote("g1", 7)));
        assert!(!registry.add(remote("g1", 7)));
        assert_eq!(registry.games().len(), 1);
    }

    #[test]
    fn test_refresh_preserves_first_seen() {
        let registry = Registry::new(None);

        registry.add(remote("g1", 7));
        let first = registry.games()[0].first_seen;

        std::thread::sleep(Duration::from_millis(5));
        registry.add(remote("g1", 7));

        let game = &registry.games()[0];
        assert_eq!(game.first_seen, first);
        assert!(game.last_seen > first);
    }

    #[test]
    fn test_refresh_replaces_raw() {
        let registry = Registry::new(None);

        registry.add(remote("g1", 7));

        let mut updated = remote("g1", 7);
        updated.raw = vec![0xF7, 0x30, 0x0A, 0x00, 0x01, 0x02];
        registry.add(updated);

        assert_eq!(registry.games()[0].raw, vec![0xF7, 0x30, 0x0A, 0x00, 0x01, 0x02]);
    }

    #[test]
    fn test_remove() {
        let registry = Registry::new(None);

        registry.add(remote("g1", 7));
        assert!(registry.remove("100.64.0.2:g1"));
        assert!(!registry.remove("100.64.0.2:g1"));
        assert!(registry.games().is_empty());
    }

    #[test]
    fn test_source_filters() {
        let registry = Registry::new(None);

        registry.add(local("mine"));
        registry.add(remote("theirs", 7));

        assert_eq!(registry.local_games().len(), 1);
        assert_eq!(registry.local_games()[0].info.name, "mine");
        assert_eq!(registry.remote_games().len(), 1);
        assert_eq!(registry.remote_games()[0].info.name, "theirs");
    }

    #[test]
    fn test_find_by_host_counter() {
        let registry = Registry::new(None);

        registry.add(remote("g1", 7));

        let found = registry.find_by_host_counter(7).unwrap();
        assert_eq!(found.info.name, "g1");

        assert!(registry.find_by_host_counter(99).is_none());
        assert!(registry.find_by_host_counter(0).is_none());
    }

    #[test]
    fn test_find_by_host_counter_ignores_local() {
        let registry = Registry::new(None);

        let mut game = local("mine");
        game.info.host_counter = 7;
        registry.add(game);

        assert!(registry.find_by_host_counter(7).is_none());
    }

    #[test]
    fn test_expire() {
        let registry = Registry::new(None);

        registry.add(remote("g1", 7));
        registry.add(remote("g2", 8));

        assert_eq!(registry.expire(Duration::from_secs(10)), 0);
        assert_eq!(registry.games().len(), 2);

        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(registry.expire(Duration::from_millis(1)), 2);
        assert!(registry.games().is_empty());
    }

    #[test]
    fn test_change_notifications_in_mutation_order() {
        let seen: Arc<Mutex<Vec<Vec<String>>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        let registry = Registry::new(Some(Box::new(move |games: &[Game]| {
            let mut names: Vec<String> =
                games.iter().map(|g| g.info.name.clone()).collect();
            names.sort();
            sink.lock().unwrap().push(names);
        })));

        registry.add(remote("g1", 7));
        registry.add(remote("g2", 8));
        registry.remove("100.64.0.2:g1");
        // Removing something absent must not notify.
        registry.remove("100.64.0.2:gone");

        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![
                vec!["g1".to_string()],
                vec!["g1".to_string(), "g2".to_string()],
                vec!["g2".to_string()],
            ]
        );
    }

    #[test]
    fn test_expire_notifies_once() {
        let count = Arc::new(Mutex::new(0usize));
        let sink = Arc::clone(&count);

        let registry = Registry::new(Some(Box::new(move |_: &[Game]| {
            *sink.lock().unwrap() += 1;
        })));

        registry.add(remote("g1", 7));
        registry.add(remote("g2", 8));
        std::thread::sleep(Duration::from_millis(10));

        let before = *count.lock().unwrap();
        registry.expire(Duration::from_millis(1));
        assert_eq!(*count.lock().unwrap(), before + 1);

        // Nothing left to expire; no further notification.
        registry.expire(Duration::from_millis(1));
        assert_eq!(*count.lock().unwrap(), before + 1);
    }

    #[test]
    fn test_snapshot_is_independent() {
        let registry = Registry::new(None);
        registry.add(remote("g1", 7));

        let mut snapshot = registry.games();
        snapshot[0].info.name = "mutated".to_string();
        snapshot[0].raw.clear();

        let fresh = registry.games();
        assert_eq!(fresh[0].info.name, "g1");
        assert!(!fresh[0].raw.is_empty());
    }
}
