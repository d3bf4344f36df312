//! Forwarding Information Base and distance-vector routing (component C).
//!
//! Routes are learned by hierarchical name prefix, not host address. Each
//! known peer advertises a distance vector (`name prefix -> hop count`); this
//! node's own vector is `{local_prefixes: 0} union {peer prefixes: peer_cost + 1}`,
//! capped at `max_hops`. Longest-prefix match picks the route for a given
//! name, ties broken by lowest cost then peer name.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Everything known about one peer reachable over the broadcast segment.
#[derive(Debug, Clone)]
pub struct PeerRecord {
    pub name: String,
    pub address: SocketAddr,
    pub public_key_pem: String,
    pub last_seen: Instant,
}

/// One entry in the Forwarding Information Base: the next hop and cost for
/// reaching a name prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FibEntry {
    pub next_hop: String,
    pub cost: u32,
}

#[derive(Default)]
pub struct Fib {
    peers: HashMap<String, PeerRecord>,
    /// Distance vectors as advertised by each peer: peer name -> (prefix -> cost).
    peer_vectors: HashMap<String, HashMap<String, u32>>,
    max_hops: u32,
}

impl Fib {
    pub fn new(max_hops: u32) -> Self {
        Self {
            peers: HashMap::new(),
            peer_vectors: HashMap::new(),
            max_hops,
        }
    }

    pub fn add_peer(&mut self, record: PeerRecord) {
        self.peers.insert(record.name.clone(), record);
    }

    pub fn remove_peer(&mut self, name: &str) {
        self.peers.remove(name);
        self.peer_vectors.remove(name);
    }

    pub fn peer(&self, name: &str) -> Option<&PeerRecord> {
        self.peers.get(name)
    }

    pub fn touch_peer(&mut self, name: &str) {
        if let Some(peer) = self.peers.get_mut(name) {
            peer.last_seen = Instant::now();
        }
    }

    /// Peers not heard from within `window` (§4.4, §9 stale-peer watchdog).
    pub fn stale_peers(&self, window: Duration) -> Vec<String> {
        let now = Instant::now();
        self.peers
            .iter()
            .filter(|(_, p)| now.duration_since(p.last_seen) > window)
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn peer_names(&self) -> Vec<String> {
        self.peers.keys().cloned().collect()
    }

    /// Record a peer's advertised distance vector. Returns `true` if this
    /// changed any prefix's reachability, signalling the caller should
    /// re-broadcast its own vector.
    pub fn update_distance_vector(&mut self, peer_name: &str, vector: HashMap<String, u32>) -> bool {
        let before = self.compute_own_vector(&[]);
        self.peer_vectors.insert(peer_name.to_string(), vector);
        let after = self.compute_own_vector(&[]);
        before != after
    }

    /// This node's own vector: local prefixes at cost 0, plus every peer's
    /// advertised prefix at `peer_cost + 1`, keeping the minimum cost per
    /// prefix and dropping anything that would exceed `max_hops`.
    pub fn compute_own_vector(&self, local_prefixes: &[String]) -> HashMap<String, u32> {
        let mut vector: HashMap<String, u32> = HashMap::new();
        for prefix in local_prefixes {
            vector.insert(prefix.clone(), 0);
        }
        for costs in self.peer_vectors.values() {
            for (prefix, cost) in costs {
                let next_cost = cost.saturating_add(1);
                if next_cost > self.max_hops {
                    continue;
                }
                vector
                    .entry(prefix.clone())
                    .and_modify(|c| *c = (*c).min(next_cost))
                    .or_insert(next_cost);
            }
        }
        vector
    }

    /// Longest-prefix match across every peer's advertised vector entries
    /// that cover `name`. Returns every peer tied for the longest matching
    /// prefix, sorted ascending by cost then peer name, so a caller can fall
    /// through to the next candidate if the best one's send fails.
    pub fn route_for(&self, name: &str) -> Vec<FibEntry> {
        let mut longest: Option<usize> = None;
        let mut candidates: Vec<(usize, u32, &str)> = Vec::new();
        for (peer_name, vector) in &self.peer_vectors {
            for (prefix, cost) in vector {
                if !is_prefix_of(prefix, name) {
                    continue;
                }
                let prefix_len = prefix.len();
                match longest {
                    Some(best) if prefix_len < best => continue,
                    Some(best) if prefix_len > best => {
                        longest = Some(prefix_len);
                        candidates.clear();
                    }
                    None => longest = Some(prefix_len),
                    _ => {}
                }
                candidates.push((prefix_len, *cost, peer_name.as_str()));
            }
        }
        candidates.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.2.cmp(b.2)));
        candidates
            .into_iter()
            .map(|(_, cost, peer_name)| FibEntry { next_hop: peer_name.to_string(), cost })
            .collect()
    }
}

fn is_prefix_of(prefix: &str, name: &str) -> bool {
    name == prefix || name.starts_with(&format!("{prefix}/"))
}
