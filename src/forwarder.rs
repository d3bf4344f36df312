//! The CS/PIT/FIB state machine (component F) — the heart of the design.
//!
//! Free functions operating on the node's `Shared` state rather than a
//! dedicated struct: the server's per-connection handlers, the discovery
//! listener, and the public API all dispatch into these from their own
//! tokio tasks, so there is one table-locking discipline instead of three.

use crate::codec::Packet;
use crate::node::Shared;
use crate::payload::PayloadKind;
use crate::pit::{InsertOutcome, Requester};
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, warn};

pub fn nack_payload(name: &str) -> String {
    format!("No data {name} available")
}

fn is_nack(payload: &[u8]) -> bool {
    payload.starts_with(b"No data ")
}

/// `name`'s prefix is everything before the last `/` segment.
fn name_prefix(name: &str) -> &str {
    name.rsplit_once('/').map(|(prefix, _)| prefix).unwrap_or(name)
}

fn sensor_type(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

/// Open a fresh TCP connection to `addr`, write one packet, close.
/// Returns `false` on any I/O failure so the caller can try the next route.
async fn send_tcp_packet(addr: SocketAddr, packet: &Packet) -> bool {
    match TcpStream::connect(addr).await {
        Ok(mut stream) => {
            let bytes = packet.encode();
            stream.write_all(&bytes).await.is_ok() && stream.shutdown().await.is_ok()
        }
        Err(e) => {
            debug!("connect to {} failed: {}", addr, e);
            false
        }
    }
}

/// Encrypt `plaintext` under the shared secret for `peer_name`, if one exists.
async fn seal_for(shared: &Shared, peer_name: &str, plaintext: &[u8]) -> Option<String> {
    let secrets = shared.secrets.lock().await;
    secrets.get(peer_name).map(|key| crate::crypto::encrypt_record(key, plaintext))
}

/// Decrypt `record_b64` using the shared secret for `peer_name`.
async fn open_from(shared: &Shared, peer_name: &str, record_b64: &str) -> Option<Vec<u8>> {
    let key = {
        let secrets = shared.secrets.lock().await;
        *secrets.get(peer_name)?
    };
    crate::crypto::decrypt_record(&key, record_b64).ok()
}

/// Send a data packet carrying `plaintext` to `requester` at `addr`, sealed
/// under the shared secret of the peer we're sending *to*. `None` address
/// means the requester is this node's own API — callers handle that case
/// before reaching here.
async fn send_data_to(shared: &Shared, dest_name: &str, addr: SocketAddr, name: &str, plaintext: &[u8]) -> bool {
    let Some(sealed) = seal_for(shared, dest_name, plaintext).await else {
        warn!("no shared secret for {}, dropping outbound data for {}", dest_name, name);
        return false;
    };
    let packet = Packet::new_data(&shared.config.node_name, dest_name, name, sealed);
    send_tcp_packet(addr, &packet).await
}

async fn send_interest_to(shared: &Shared, dest_name: &str, addr: SocketAddr, name: &str) -> bool {
    let packet = Packet::new_interest(&shared.config.node_name, dest_name, name, String::new());
    send_tcp_packet(addr, &packet).await
}

/// Every peer tied for the best route to `name`, ascending by cost then
/// peer name, resolved to a live address. A candidate whose FIB entry no
/// longer has a peer record (evicted between `route_for` and now) is
/// dropped rather than breaking the ordering of the ones that remain.
async fn candidates_for(shared: &Shared, name: &str) -> Vec<(String, SocketAddr)> {
    let fib = shared.fib.lock().await;
    fib.route_for(name)
        .into_iter()
        .filter_map(|entry| fib.peer(&entry.next_hop).map(|p| (entry.next_hop, p.address)))
        .collect()
}

/// Handle an inbound interest packet per §4.6.
///
/// The reply address is the sender's FIB-registered listening address, not
/// the ephemeral source port of the inbound connection: the transport opens
/// a fresh TCP connection per packet, so the only address worth remembering
/// is the one discovery already gave us. A sender we have no shared secret
/// for is, by construction, a sender we've never discovered — unknown peer,
/// dropped (§7).
pub async fn on_interest(shared: &Shared, packet: Packet, from_address: SocketAddr) {
    let Packet::Interest { sender, name, .. } = packet else {
        return;
    };
    let Some(reply_addr) = shared.fib.lock().await.peer(&sender).map(|p| p.address) else {
        debug!("interest for {} from unknown peer {} ({}), dropping", name, sender, from_address);
        return;
    };
    let requester = Requester { name: sender.clone(), address: Some(reply_addr) };

    // 1. Source check: do we own this name's prefix? A value already
    // published via `Node::set` lives in the CS; fall back to the live
    // reader for a name that was never explicitly published.
    if name_prefix(&name) == shared.config.node_name {
        let stype = sensor_type(&name);
        let value = match shared.cs.lock().await.get(&name) {
            Some(cached) => Some(cached.to_vec()),
            None => shared.sensor_reader.read(stype).map(|v| v.into_bytes()),
        };
        let is_miss = value.is_none();
        let payload = value.unwrap_or_else(|| nack_payload(&name).into_bytes());
        if is_miss {
            shared.metrics.nack_sent.fetch_add(1, Ordering::Relaxed);
        } else {
            shared.cs.lock().await.put(&name, payload.clone());
        }
        send_data_to(shared, &sender, reply_addr, &name, &payload).await;
        return;
    }

    // 2. Cache check.
    let cached = shared.cs.lock().await.get(&name).map(|p| p.to_vec());
    if let Some(payload) = cached {
        send_data_to(shared, &sender, reply_addr, &name, &payload).await;
        return;
    }

    // 3. Aggregate & forward.
    let candidates = candidates_for(shared, &name).await;

    if candidates.is_empty() {
        shared.metrics.nack_sent.fetch_add(1, Ordering::Relaxed);
        send_data_to(shared, &sender, reply_addr, &name, nack_payload(&name).as_bytes()).await;
        return;
    }

    let outcome = {
        let mut pit = shared.pit.lock().await;
        pit.insert(&name, requester, std::time::Duration::from_secs(shared.config.response_timeout_secs))
    };

    match outcome {
        InsertOutcome::Aggregated => {
            shared.metrics.aggregation_hits.fetch_add(1, Ordering::Relaxed);
        }
        InsertOutcome::NewRequest => {
            let mut forwarded = false;
            for (peer_name, addr) in &candidates {
                if send_interest_to(shared, peer_name, *addr, &name).await {
                    forwarded = true;
                    break;
                }
            }
            if !forwarded {
                shared.pit.lock().await.take_requesters(&name);
                shared.metrics.nack_sent.fetch_add(1, Ordering::Relaxed);
                send_data_to(shared, &sender, reply_addr, &name, nack_payload(&name).as_bytes()).await;
            }
        }
    }
}

/// Handle an inbound data packet per §4.6.
pub async fn on_data(shared: &Shared, packet: Packet) {
    let Packet::Data { sender, name, data, .. } = packet else {
        return;
    };

    let plaintext = if data.is_empty() {
        Vec::new()
    } else {
        match open_from(shared, &sender, &data).await {
            Some(p) => p,
            None => {
                warn!("decrypt failure from {} for {}, dropping", sender, name);
                shared.metrics.dropped_malformed.fetch_add(1, Ordering::Relaxed);
                return;
            }
        }
    };

    if !is_nack(&plaintext) {
        shared.cs.lock().await.put(&name, plaintext.clone());
    }

    let requesters = shared.pit.lock().await.take_requesters(&name);
    let Some(requesters) = requesters else {
        debug!("stray data for {} from {}, dropping", name, sender);
        return;
    };

    for requester in requesters {
        match requester.address {
            Some(addr) => {
                send_data_to(shared, &requester.name, addr, &name, &plaintext).await;
            }
            None => {
                let mut waiters = shared.waiters.lock().await;
                if let Some(senders) = waiters.remove(&name) {
                    for tx in senders {
                        let _ = tx.send(plaintext.clone());
                    }
                }
            }
        }
    }

    if !is_nack(&plaintext) && let Ok(text) = std::str::from_utf8(&plaintext) {
        match shared.payload_interpreter.classify(&name, text) {
            PayloadKind::Command { actuator, command } => {
                shared.actuation_sink.actuate(&actuator, &command);
            }
            PayloadKind::Alert => {
                if crate::payload::is_phone(&shared.config.node_name) {
                    tracing::info!("alert received for {}: {}", name, text);
                }
            }
            PayloadKind::Plain => {}
        }
    }
}

/// Local-originated publish: a CS write plus opportunistic PIT satisfaction.
/// Never fails.
pub async fn publish(shared: &Shared, sensor_name: &str, value: &str) {
    let name = format!("{}/{}", shared.config.node_name, sensor_name);
    let payload = value.as_bytes().to_vec();
    shared.cs.lock().await.put(&name, payload.clone());

    if shared.payload_interpreter.is_alertable(&name, value) {
        if crate::payload::is_phone(&shared.config.node_name) {
            tracing::info!("alert set off for {}: {}", name, value);
        } else {
            let has_phone_peer = shared.fib.lock().await.peer_names().iter().any(|p| crate::payload::is_phone(p));
            if has_phone_peer {
                tracing::info!("alerting phone peers for {}: {}", name, value);
            } else {
                tracing::warn!("alert for {} discarded: no phone peer available", name);
            }
        }
    }

    if let Some(requesters) = shared.pit.lock().await.take_requesters(&name) {
        for requester in requesters {
            match requester.address {
                Some(addr) => {
                    send_data_to(shared, &requester.name, addr, &name, &payload).await;
                }
                None => {
                    let mut waiters = shared.waiters.lock().await;
                    if let Some(senders) = waiters.remove(&name) {
                        for tx in senders {
                            let _ = tx.send(payload.clone());
                        }
                    }
                }
            }
        }
    }
}

/// Local-originated request: emit an interest toward the best route,
/// blocking up to `response_timeout`. Returns `None` on miss, timeout, or
/// a received NACK.
pub async fn request(shared: &Shared, name: &str) -> Option<Vec<u8>> {
    if let Some(cached) = shared.cs.lock().await.get(name) {
        return Some(cached.to_vec());
    }

    let candidates = candidates_for(shared, name).await;
    if candidates.is_empty() {
        return None;
    }

    let (tx, rx) = tokio::sync::oneshot::channel();
    let requester = Requester { name: shared.config.node_name.clone(), address: None };
    let outcome = {
        let mut pit = shared.pit.lock().await;
        pit.insert(name, requester, std::time::Duration::from_secs(shared.config.response_timeout_secs))
    };
    {
        let mut waiters = shared.waiters.lock().await;
        waiters.entry(name.to_string()).or_default().push(tx);
    }

    if matches!(outcome, InsertOutcome::NewRequest) {
        let mut forwarded = false;
        for (peer_name, addr) in &candidates {
            if send_interest_to(shared, peer_name, *addr, name).await {
                forwarded = true;
                break;
            }
        }
        if !forwarded {
            shared.pit.lock().await.take_requesters(name);
            shared.waiters.lock().await.remove(name);
            return None;
        }
    } else {
        shared.metrics.aggregation_hits.fetch_add(1, Ordering::Relaxed);
    }

    let timeout = std::time::Duration::from_secs(shared.config.response_timeout_secs);
    match tokio::time::timeout(timeout, rx).await {
        Ok(Ok(payload)) if !is_nack(&payload) => Some(payload),
        _ => {
            shared.pit.lock().await.take_requesters(name);
            shared.waiters.lock().await.remove(name);
            None
        }
    }
}

/// Send an interest directly to `destination`, bypassing FIB lookup
/// (operator-driven routing, §4.7).
pub async fn send_interest_direct(shared: &Shared, name: &str, destination_addr: SocketAddr) -> Option<Vec<u8>> {
    let (tx, rx) = tokio::sync::oneshot::channel();
    let requester = Requester { name: shared.config.node_name.clone(), address: None };
    shared
        .pit
        .lock()
        .await
        .insert(name, requester, std::time::Duration::from_secs(shared.config.response_timeout_secs));
    shared.waiters.lock().await.entry(name.to_string()).or_default().push(tx);

    let packet = Packet::new_interest(&shared.config.node_name, "", name, String::new());
    if !send_tcp_packet(destination_addr, &packet).await {
        shared.pit.lock().await.take_requesters(name);
        shared.waiters.lock().await.remove(name);
        return None;
    }

    let timeout = std::time::Duration::from_secs(shared.config.response_timeout_secs);
    match tokio::time::timeout(timeout, rx).await {
        Ok(Ok(payload)) if !is_nack(&payload) => Some(payload),
        _ => {
            shared.pit.lock().await.take_requesters(name);
            shared.waiters.lock().await.remove(name);
            None
        }
    }
}
