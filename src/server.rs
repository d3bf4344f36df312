//! TCP connection server (component E).
//!
//! One handler task per accepted connection: read one packet, dispatch to
//! the forwarder, close. A handler error never tears down the accept loop;
//! the accept call itself is wrapped in a 1-second timeout so shutdown is
//! checked promptly (§5).

use crate::codec::Packet;
use crate::node::Shared;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Generous enough for a `data` packet carrying a full sensor payload while
/// still bounding a misbehaving or malicious peer's connection.
const MAX_TCP_PACKET_BYTES: usize = 64 * 1024;

pub async fn accept_loop(listener: TcpListener, shared: Arc<Shared>, shutdown: CancellationToken) {
    info!("connection server listening on {}", listener.local_addr().map(|a| a.to_string()).unwrap_or_default());
    loop {
        if shutdown.is_cancelled() {
            break;
        }
        match tokio::time::timeout(Duration::from_secs(1), listener.accept()).await {
            Ok(Ok((stream, addr))) => {
                let shared = shared.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, addr, shared).await {
                        warn!("connection handler for {} failed: {}", addr, e);
                    }
                });
            }
            Ok(Err(e)) => {
                warn!("accept failed: {}", e);
            }
            Err(_) => {} // 1s poll timeout, loop back to check shutdown
        }
    }
    debug!("connection server stopped");
}

async fn handle_connection(
    stream: tokio::net::TcpStream,
    addr: std::net::SocketAddr,
    shared: Arc<Shared>,
) -> std::io::Result<()> {
    let mut buf = Vec::new();
    stream.take(MAX_TCP_PACKET_BYTES as u64).read_to_end(&mut buf).await?;

    let packet = match Packet::decode(&buf) {
        Ok(p) => p,
        Err(e) => {
            debug!("dropping malformed packet from {}: {}", addr, e);
            shared.metrics.dropped_malformed.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        }
    };

    match packet {
        Packet::Interest { .. } => crate::forwarder::on_interest(&shared, packet, addr).await,
        Packet::Data { .. } => crate::forwarder::on_data(&shared, packet).await,
        other => debug!("dropping unexpected packet type {} from TCP", other.packet_type()),
    }

    Ok(())
}
