//! Public API and lifecycle (component G).
//!
//! `Node` owns every shared table behind its own lock and hands narrow
//! references to the tasks it spawns in `start()`. `Shared` is the state
//! those tasks (and the forwarder's free functions) actually operate on;
//! `Node` itself is just the handle a caller holds.

use crate::config::NodeConfig;
use crate::crypto::{Keypair, SharedSecretStore};
use crate::cs::ContentStore;
use crate::fib::Fib;
use crate::payload::{PayloadInterpreter, RegexPayloadInterpreter};
use crate::pit::PendingInterestTable;
use crate::sensor::{ActuationSink, SensorReader};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::{oneshot, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Dropped-malformed / NACK-sent / aggregation-hit counters.
#[derive(Default)]
pub struct Metrics {
    pub dropped_malformed: AtomicU64,
    pub nack_sent: AtomicU64,
    pub aggregation_hits: AtomicU64,
}

/// Everything the forwarder, server, and discovery tasks share.
pub struct Shared {
    pub config: NodeConfig,
    pub keypair: Keypair,
    pub fib: Mutex<Fib>,
    pub cs: Mutex<ContentStore>,
    pub pit: Mutex<PendingInterestTable>,
    pub secrets: Mutex<SharedSecretStore>,
    pub payload_interpreter: Box<dyn PayloadInterpreter>,
    pub sensor_reader: Arc<dyn SensorReader>,
    pub actuation_sink: Arc<dyn ActuationSink>,
    pub metrics: Metrics,
    pub waiters: Mutex<HashMap<String, Vec<oneshot::Sender<Vec<u8>>>>>,
    pub dv_notify: Notify,
}

struct Running {
    shutdown: CancellationToken,
    udp_socket: Arc<UdpSocket>,
    tasks: Vec<JoinHandle<()>>,
}

pub struct Node {
    shared: Arc<Shared>,
    running: Mutex<Option<Running>>,
}

impl Node {
    pub fn new(config: NodeConfig, sensor_reader: Arc<dyn SensorReader>, actuation_sink: Arc<dyn ActuationSink>) -> Self {
        Self::with_interpreter(config, sensor_reader, actuation_sink, Box::new(RegexPayloadInterpreter::new()))
    }

    pub fn with_interpreter(
        config: NodeConfig,
        sensor_reader: Arc<dyn SensorReader>,
        actuation_sink: Arc<dyn ActuationSink>,
        payload_interpreter: Box<dyn PayloadInterpreter>,
    ) -> Self {
        let cs_ttl = std::time::Duration::from_secs(config.cs_ttl_secs);
        let max_hops = config.max_hops;
        let sweep_mode = config.cs_sweep_mode;
        let shared = Shared {
            config,
            keypair: Keypair::generate(),
            fib: Mutex::new(Fib::new(max_hops)),
            cs: Mutex::new(ContentStore::new(cs_ttl, sweep_mode)),
            pit: Mutex::new(PendingInterestTable::new()),
            secrets: Mutex::new(SharedSecretStore::new()),
            payload_interpreter,
            sensor_reader,
            actuation_sink,
            metrics: Metrics::default(),
            waiters: Mutex::new(HashMap::new()),
            dv_notify: Notify::new(),
        };
        Self { shared: Arc::new(shared), running: Mutex::new(None) }
    }

    pub fn config(&self) -> &NodeConfig {
        &self.shared.config
    }

    pub fn public_key_pem(&self) -> &str {
        self.shared.keypair.public_key_pem()
    }

    pub fn metrics(&self) -> &Metrics {
        &self.shared.metrics
    }

    /// Spin up the connection server, discovery tasks, and housekeeping
    /// loop. Idempotent-unsafe: calling twice without `stop()` leaks tasks.
    pub async fn start(&self) -> std::io::Result<()> {
        let tcp_listener = TcpListener::bind((self.shared.config.host, self.shared.config.port)).await?;
        let udp_socket = Arc::new(crate::discovery::bind_broadcast_socket(self.shared.config.broadcast_port)?);
        let shutdown = CancellationToken::new();

        let tasks = vec![
            tokio::spawn(crate::server::accept_loop(tcp_listener, self.shared.clone(), shutdown.clone())),
            tokio::spawn(crate::discovery::presence_emitter_loop(udp_socket.clone(), self.shared.clone(), shutdown.clone())),
            tokio::spawn(crate::discovery::dv_emitter_loop(udp_socket.clone(), self.shared.clone(), shutdown.clone())),
            tokio::spawn(crate::discovery::listener_loop(udp_socket.clone(), self.shared.clone(), shutdown.clone())),
            tokio::spawn(crate::discovery::housekeeping_loop(self.shared.clone(), shutdown.clone())),
        ];

        info!("node {} started on {}:{} (broadcast {})", self.shared.config.node_name, self.shared.config.host, self.shared.config.port, self.shared.config.broadcast_port);

        *self.running.lock().await = Some(Running { shutdown, udp_socket, tasks });
        Ok(())
    }

    /// Broadcast offline, signal every task to stop, and join them. Safe to
    /// call on a node that was never started.
    pub async fn stop(&self) {
        let running = self.running.lock().await.take();
        let Some(running) = running else {
            return;
        };
        crate::discovery::broadcast_offline(&running.udp_socket, &self.shared).await;
        running.shutdown.cancel();
        for task in running.tasks {
            let _ = task.await;
        }
        info!("node {} stopped", self.shared.config.node_name);
    }

    /// Build a data packet named `<node_name>/<sensor_name>`, satisfy any
    /// pending PIT requesters, and store in CS. Never fails.
    pub async fn set(&self, sensor_name: &str, value: &str) {
        crate::forwarder::publish(&self.shared, sensor_name, value).await;
    }

    /// Return `name`'s value from CS, or emit an interest and block up to
    /// `response_timeout`, returning `None` on miss, NACK, or timeout.
    pub async fn get(&self, name: &str) -> Option<Vec<u8>> {
        crate::forwarder::request(&self.shared, name).await
    }

    /// Create a PIT entry with this node as requester and dispatch the
    /// interest directly to `destination`, bypassing FIB lookup.
    pub async fn send_interest(&self, name: &str, destination: SocketAddr) -> Option<Vec<u8>> {
        crate::forwarder::send_interest_direct(&self.shared, name, destination).await
    }

    /// Local TCP listen address once `start()` has bound the socket — used
    /// by tests wiring peers to each other directly.
    pub fn address(&self) -> SocketAddr {
        SocketAddr::new(self.shared.config.host, self.shared.config.port)
    }
}
