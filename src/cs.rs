//! Content Store: a TTL-bounded cache of named data (§4.3 data model).
//!
//! Writes are last-writer-wins and idempotent — storing the same name twice
//! just refreshes the insert time. Eviction policy is configurable
//! (`CsSweepMode`): the default sweeps each entry's own TTL independently;
//! `GlobalClear` reproduces the original implementation's behaviour of
//! wiping the whole store on every sweep tick.

use crate::config::CsSweepMode;
use std::collections::HashMap;
use std::time::{Duration, Instant};

struct Entry {
    payload: Vec<u8>,
    inserted_at: Instant,
}

pub struct ContentStore {
    entries: HashMap<String, Entry>,
    ttl: Duration,
    sweep_mode: CsSweepMode,
}

impl ContentStore {
    pub fn new(ttl: Duration, sweep_mode: CsSweepMode) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
            sweep_mode,
        }
    }

    /// Store or refresh `name`. Idempotent: re-storing the same content just
    /// resets the TTL clock.
    pub fn put(&mut self, name: &str, payload: Vec<u8>) {
        self.entries.insert(
            name.to_string(),
            Entry {
                payload,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Fetch `name` if present and not expired. A stale hit is treated as a
    /// miss but is not evicted here; `sweep` owns eviction.
    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.entries.get(name).and_then(|e| {
            if e.inserted_at.elapsed() <= self.ttl {
                Some(e.payload.as_slice())
            } else {
                None
            }
        })
    }

    pub fn contains_fresh(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Evict expired entries per the configured sweep mode. Returns the
    /// number of entries removed.
    pub fn sweep(&mut self) -> usize {
        match self.sweep_mode {
            CsSweepMode::PerEntry => {
                let before = self.entries.len();
                let ttl = self.ttl;
                self.entries.retain(|_, e| e.inserted_at.elapsed() <= ttl);
                before - self.entries.len()
            }
            CsSweepMode::GlobalClear => {
                let before = self.entries.len();
                self.entries.clear();
                before
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn put_then_get_round_trips() {
        let mut cs = ContentStore::new(Duration::from_secs(60), CsSweepMode::PerEntry);
        cs.put("/house1/room1/temp", b"21.5".to_vec());
        assert_eq!(cs.get("/house1/room1/temp"), Some(b"21.5".as_slice()));
    }

    #[test]
    fn re_store_is_idempotent_and_refreshes_ttl() {
        let mut cs = ContentStore::new(Duration::from_millis(30), CsSweepMode::PerEntry);
        cs.put("/house1/room1/temp", b"21.5".to_vec());
        sleep(Duration::from_millis(20));
        cs.put("/house1/room1/temp", b"21.5".to_vec());
        sleep(Duration::from_millis(20));
        assert_eq!(cs.get("/house1/room1/temp"), Some(b"21.5".as_slice()));
    }

    #[test]
    fn expired_entry_is_a_miss() {
        let mut cs = ContentStore::new(Duration::from_millis(10), CsSweepMode::PerEntry);
        cs.put("/house1/room1/temp", b"21.5".to_vec());
        sleep(Duration::from_millis(20));
        assert_eq!(cs.get("/house1/room1/temp"), None);
    }

    #[test]
    fn per_entry_sweep_only_removes_expired() {
        let mut cs = ContentStore::new(Duration::from_millis(15), CsSweepMode::PerEntry);
        cs.put("/stale", b"x".to_vec());
        sleep(Duration::from_millis(20));
        cs.put("/fresh", b"y".to_vec());
        let removed = cs.sweep();
        assert_eq!(removed, 1);
        assert!(cs.contains_fresh("/fresh"));
        assert!(!cs.contains_fresh("/stale"));
    }

    #[test]
    fn global_clear_sweep_wipes_everything() {
        let mut cs = ContentStore::new(Duration::from_secs(60), CsSweepMode::GlobalClear);
        cs.put("/a", b"1".to_vec());
        cs.put("/b", b"2".to_vec());
        let removed = cs.sweep();
        assert_eq!(removed, 2);
        assert!(cs.is_empty());
    }
}
