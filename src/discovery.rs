//! Peer discovery and liveness (component D).
//!
//! Three scheduled tasks plus a listener, all driven off one `SO_REUSEPORT`
//! UDP socket: the presence emitter, the on-demand distance-vector emitter,
//! and the broadcast listener that feeds the FIB. `broadcast_offline` is
//! called once from `Node::stop`, not on a schedule.

use crate::codec::{Packet, PeerStatus};
use crate::fib::PeerRecord;
use crate::node::Shared;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Bind a UDP socket for broadcast discovery: `SO_REUSEPORT`/`SO_REUSEADDR`
/// so multiple nodes can share `broadcast_port` on one host, `SO_BROADCAST`
/// so sends to the subnet broadcast address succeed.
pub fn bind_broadcast_socket(port: u16) -> std::io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;
    socket.set_broadcast(true)?;
    socket.set_nonblocking(true)?;
    let addr: SocketAddr = (Ipv4Addr::UNSPECIFIED, port).into();
    socket.bind(&addr.into())?;
    UdpSocket::from_std(socket.into())
}

/// Every datagram is sent to the subnet broadcast address plus any
/// explicitly configured seed peers (§9 open question: real broadcast
/// segments aren't always reachable in a test or container network).
fn send_targets(shared: &Shared) -> Vec<SocketAddr> {
    let mut targets = vec![SocketAddr::from((Ipv4Addr::BROADCAST, shared.config.broadcast_port))];
    targets.extend(shared.config.seed_peers.iter().copied());
    targets
}

async fn send_to_all(socket: &UdpSocket, shared: &Shared, bytes: &[u8]) {
    for target in send_targets(shared) {
        if let Err(e) = socket.send_to(bytes, target).await {
            debug!("broadcast send to {} failed: {}", target, e);
        }
    }
}

fn discovery_packet(shared: &Shared, status: PeerStatus) -> Packet {
    Packet::new_discovery(
        &shared.config.node_name,
        shared.config.port,
        status,
        shared.keypair.public_key_pem().to_string(),
        &shared.config.sensor_types,
    )
}

pub async fn presence_emitter_loop(socket: Arc<UdpSocket>, shared: Arc<Shared>, shutdown: CancellationToken) {
    let interval = Duration::from_secs(shared.config.presence_broadcast_interval_secs);
    loop {
        let packet = discovery_packet(&shared, PeerStatus::Online);
        send_to_all(&socket, &shared, &packet.encode()).await;
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }
    debug!("presence emitter stopped");
}

pub async fn broadcast_offline(socket: &UdpSocket, shared: &Shared) {
    let packet = discovery_packet(shared, PeerStatus::Offline);
    send_to_all(socket, shared, &packet.encode()).await;
    info!("broadcast offline notice");
}

/// Sent on-demand whenever FIB state changes; this loop just waits on the
/// shared notify handle and re-broadcasts the node's own distance vector.
pub async fn dv_emitter_loop(socket: Arc<UdpSocket>, shared: Arc<Shared>, shutdown: CancellationToken) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = shared.dv_notify.notified() => {
                broadcast_own_dv(&socket, &shared).await;
            }
        }
    }
    debug!("dv emitter stopped");
}

pub async fn broadcast_own_dv(socket: &UdpSocket, shared: &Shared) {
    let vector = {
        let fib = shared.fib.lock().await;
        fib.compute_own_vector(&shared.config.local_prefixes())
    };
    let packet = Packet::new_routing(&shared.config.node_name, shared.config.port, vector);
    send_to_all(socket, shared, &packet.encode()).await;
}

/// A node's own broadcasts loop back whenever the send and receive socket
/// share a host (a multi-homed `0.0.0.0` bind, or two nodes sharing a test
/// network). Source address comparison is unreliable in both of those
/// cases, but the packet already carries the one identifier that matters:
/// the sender's name.
fn is_self(shared: &Shared, sender_name: &str) -> bool {
    sender_name == shared.config.node_name
}

pub async fn listener_loop(socket: Arc<UdpSocket>, shared: Arc<Shared>, shutdown: CancellationToken) {
    let mut buf = vec![0u8; crate::config::MAX_PACKET_BYTES];
    loop {
        if shutdown.is_cancelled() {
            break;
        }
        let recv = tokio::time::timeout(Duration::from_secs(1), socket.recv_from(&mut buf)).await;
        let (len, from) = match recv {
            Ok(Ok(pair)) => pair,
            Ok(Err(e)) => {
                warn!("broadcast recv failed: {}", e);
                continue;
            }
            Err(_) => continue, // 1s poll timeout
        };

        let packet = match Packet::decode(&buf[..len]) {
            Ok(p) => p,
            Err(e) => {
                debug!("dropping malformed broadcast packet from {}: {}", from, e);
                shared.metrics.dropped_malformed.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                continue;
            }
        };

        match packet {
            Packet::Discovery { name, port, status, pub_key_pem, .. } => {
                if is_self(&shared, &name) {
                    continue;
                }
                handle_discovery(&shared, name, SocketAddr::new(from.ip(), port), status, pub_key_pem).await;
            }
            Packet::Routing { name, vector, .. } => {
                if is_self(&shared, &name) {
                    continue;
                }
                let changed = shared.fib.lock().await.update_distance_vector(&name, vector);
                if changed {
                    shared.dv_notify.notify_one();
                }
            }
            other => debug!("dropping unexpected packet type {} on broadcast socket", other.packet_type()),
        }
    }
    debug!("broadcast listener stopped");
}

async fn handle_discovery(shared: &Shared, name: String, address: SocketAddr, status: PeerStatus, pub_key_pem: String) {
    match status {
        PeerStatus::Online => {
            let key = match shared.keypair.derive_shared_key(&pub_key_pem) {
                Ok(k) => k,
                Err(e) => {
                    warn!("key agreement with {} failed: {}", name, e);
                    return;
                }
            };
            shared.secrets.lock().await.insert(&name, key);
            shared.fib.lock().await.add_peer(PeerRecord {
                name: name.clone(),
                address,
                public_key_pem: pub_key_pem,
                last_seen: Instant::now(),
            });
            info!("peer online: {} at {}", name, address);
            shared.dv_notify.notify_one();
        }
        PeerStatus::Offline => {
            shared.fib.lock().await.remove_peer(&name);
            shared.secrets.lock().await.remove(&name);
            info!("peer offline: {}", name);
            shared.dv_notify.notify_one();
        }
    }
}

pub async fn housekeeping_loop(shared: Arc<Shared>, shutdown: CancellationToken) {
    let mut tick = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tick.tick() => {}
        }
        shared.cs.lock().await.sweep();
        shared.pit.lock().await.expire();

        let window = Duration::from_secs(shared.config.stale_peer_window_secs());
        let stale = shared.fib.lock().await.stale_peers(window);
        if !stale.is_empty() {
            let mut fib = shared.fib.lock().await;
            let mut secrets = shared.secrets.lock().await;
            for name in &stale {
                fib.remove_peer(name);
                secrets.remove(name);
                info!("evicted stale peer: {}", name);
            }
            drop(fib);
            drop(secrets);
            shared.dv_notify.notify_one();
        }
    }
    debug!("housekeeping loop stopped");
}
