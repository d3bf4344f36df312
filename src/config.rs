//! Node configuration.
//!
//! Collects every construction input the node needs, with defaults matching
//! the wire protocol's stated cadences and timeouts.

use std::net::{IpAddr, SocketAddr};

/// How the Content Store sweeps expired entries.
///
/// `PerEntry` is the recommended default; `GlobalClear` reproduces the
/// original implementation's behaviour of wiping the whole store on every
/// sweep tick, kept as a configurable fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CsSweepMode {
    #[default]
    PerEntry,
    GlobalClear,
}

#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Hierarchical node name, e.g. `/group21/house1/room1`. No trailing slash.
    pub node_name: String,
    pub host: IpAddr,
    pub port: u16,
    pub broadcast_port: u16,
    /// Short sensor names this node answers interests for, e.g. `["temp", "light"]`.
    pub sensor_types: Vec<String>,
    pub presence_broadcast_interval_secs: u64,
    pub response_timeout_secs: u64,
    pub cs_ttl_secs: u64,
    pub max_hops: u32,
    pub cs_sweep_mode: CsSweepMode,
    /// Known peer addresses to unicast discovery/DV datagrams to in
    /// addition to the subnet broadcast address — the broadcast segment a
    /// real deployment relies on isn't reachable from every test or
    /// container network, so this is the escape hatch. Empty by default.
    pub seed_peers: Vec<SocketAddr>,
}

pub const DEFAULT_PRESENCE_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_RESPONSE_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_CS_TTL_SECS: u64 = 10;
pub const DEFAULT_MAX_HOPS: u32 = 16;

/// Poll timeout on accept/recv sockets so shutdown is checked promptly (§5).
pub const SOCKET_POLL_TIMEOUT_SECS: u64 = 1;

/// Fixed-size receive buffer the wire framing guarantees compatibility with (§4.1).
pub const MAX_PACKET_BYTES: usize = 1024;

impl NodeConfig {
    pub fn new(node_name: impl Into<String>, host: IpAddr, port: u16, broadcast_port: u16) -> Self {
        Self {
            node_name: node_name.into(),
            host,
            port,
            broadcast_port,
            sensor_types: Vec::new(),
            presence_broadcast_interval_secs: DEFAULT_PRESENCE_INTERVAL_SECS,
            response_timeout_secs: DEFAULT_RESPONSE_TIMEOUT_SECS,
            cs_ttl_secs: DEFAULT_CS_TTL_SECS,
            max_hops: DEFAULT_MAX_HOPS,
            cs_sweep_mode: CsSweepMode::PerEntry,
            seed_peers: Vec::new(),
        }
    }

    pub fn with_sensors(mut self, sensors: Vec<String>) -> Self {
        self.sensor_types = sensors;
        self
    }

    pub fn with_seed_peers(mut self, seed_peers: Vec<SocketAddr>) -> Self {
        self.seed_peers = seed_peers;
        self
    }

    /// Stale-peer watchdog window (§4.4, §9): `3 × presence_broadcast_interval`.
    pub fn stale_peer_window_secs(&self) -> u64 {
        3 * self.presence_broadcast_interval_secs
    }

    /// Names this node answers interests for directly: `<node_name>/<sensor>`.
    pub fn local_prefixes(&self) -> Vec<String> {
        self.sensor_types
            .iter()
            .map(|s| format!("{}/{}", self.node_name, s))
            .collect()
    }
}
