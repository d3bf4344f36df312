//! End-to-end scenarios from §8: real nodes, real UDP/TCP sockets on
//! loopback, wired together with `seed_peers` since a genuine subnet
//! broadcast segment isn't reachable from this sandbox.

use ndn_home::{CsSweepMode, Node, NodeConfig, Packet, StaticSensors};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

fn addr(port: u16) -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
}

/// A fast-converging config for two nodes that know about each other's
/// broadcast port up front. Every test node answers for `temp`.
fn node_config(name: &str, port: u16, broadcast_port: u16, seed_broadcast_ports: &[u16]) -> NodeConfig {
    let mut config = NodeConfig::new(name, IpAddr::V4(Ipv4Addr::LOCALHOST), port, broadcast_port)
        .with_sensors(vec!["temp".to_string()]);
    config.presence_broadcast_interval_secs = 1;
    config.response_timeout_secs = 5;
    config.cs_ttl_secs = 30;
    config.cs_sweep_mode = CsSweepMode::PerEntry;
    config.seed_peers = seed_broadcast_ports.iter().map(|p| addr(*p)).collect();
    config
}

async fn spawn(config: NodeConfig) -> Node {
    let sensors = Arc::new(StaticSensors::new());
    let node = Node::new(config, sensors.clone(), sensors);
    node.start().await.expect("node starts");
    node
}

/// Give two mutually-seeded nodes time to exchange discovery + distance
/// vectors over their presence emitters.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(2500)).await;
}

#[tokio::test]
async fn direct_fetch_succeeds_and_second_call_hits_cache() {
    let a = spawn(node_config("/h/r1", 19101, 19201, &[19202])).await;
    let b = spawn(node_config("/h/r2", 19102, 19202, &[19201])).await;

    a.set("temp", "21.5").await;
    settle().await;

    let first = b.get("/h/r1/temp").await;
    assert_eq!(first.as_deref(), Some(b"21.5".as_slice()));

    // second call is a cache hit: still correct, and doesn't depend on A at all.
    a.stop().await;
    let second = b.get("/h/r1/temp").await;
    assert_eq!(second.as_deref(), Some(b"21.5".as_slice()));

    b.stop().await;
}

#[tokio::test]
async fn concurrent_requests_for_same_name_aggregate() {
    let a = spawn(node_config("/h/r3", 19103, 19203, &[19204])).await;
    let b = spawn(node_config("/h/r4", 19104, 19204, &[19203])).await;

    a.set("temp", "19.0").await;
    settle().await;

    let (r1, r2, r3) = tokio::join!(
        b.get("/h/r3/temp"),
        b.get("/h/r3/temp"),
        b.get("/h/r3/temp"),
    );
    assert_eq!(r1.as_deref(), Some(b"19.0".as_slice()));
    assert_eq!(r2.as_deref(), Some(b"19.0".as_slice()));
    assert_eq!(r3.as_deref(), Some(b"19.0".as_slice()));

    // the first request is a CS miss and the other two are satisfied by
    // PIT aggregation rather than a second and third outbound interest.
    assert_eq!(b.metrics().aggregation_hits.load(std::sync::atomic::Ordering::Relaxed), 2);

    a.stop().await;
    b.stop().await;
}

#[tokio::test]
async fn transit_forwarding_through_middle_node() {
    // A only knows M; B only knows M; M knows both.
    let a = spawn(node_config("/h/a", 19105, 19205, &[19207])).await;
    let m = spawn(node_config("/h/m", 19107, 19207, &[19205, 19209])).await;
    let b = spawn(node_config("/h/b", 19109, 19209, &[19207])).await;

    a.set("temp", "30.0").await;
    settle().await;

    let value = b.get("/h/a/temp").await;
    assert_eq!(value.as_deref(), Some(b"30.0".as_slice()));

    a.stop().await;
    m.stop().await;
    b.stop().await;
}

#[tokio::test]
async fn offline_notice_removes_peer_from_fib() {
    let a = spawn(node_config("/h/r5", 19111, 19211, &[19212])).await;
    let b = spawn(node_config("/h/r6", 19112, 19212, &[19211])).await;
    a.set("temp", "18.0").await;
    settle().await;

    // confirm the route exists before tearing A down.
    assert_eq!(b.get("/h/r5/temp").await.as_deref(), Some(b"18.0".as_slice()));

    a.stop().await;
    tokio::time::sleep(Duration::from_millis(300)).await;

    // A is gone: a direct fetch for an un-cached name now has no route and
    // must come back empty rather than hang.
    let value = b.get("/h/r5/other_sensor").await;
    assert_eq!(value, None);

    b.stop().await;
}

#[tokio::test]
async fn no_route_returns_none_without_hanging() {
    let b = spawn(node_config("/h/r7", 19113, 19213, &[])).await;
    let start = std::time::Instant::now();
    let value = b.get("/nowhere/at/all").await;
    assert_eq!(value, None);
    assert!(start.elapsed() < Duration::from_secs(5), "no-route miss should fail fast, not wait for the full timeout");
    b.stop().await;
}

#[tokio::test]
async fn offline_sensor_reply_is_a_nack_and_surfaces_as_a_miss() {
    let a = spawn(node_config("/h/r8", 19115, 19215, &[19216])).await;
    let b = spawn(node_config("/h/r9", 19116, 19216, &[19215])).await;
    settle().await;

    // A answers for "temp" but never had a value set for it.
    let value = b.get("/h/r8/temp").await;
    assert_eq!(value, None);

    a.stop().await;
    b.stop().await;
}

/// §8 scenario 6: a corrupted data packet is dropped without corrupting the
/// FIB or shared-secret state, and a later valid packet from the same peer
/// is still processed normally.
#[tokio::test]
async fn corrupted_data_packet_is_dropped_without_breaking_later_traffic() {
    let mut ca = node_config("/h/r10", 19117, 19217, &[19218]);
    ca.sensor_types = vec!["temp".to_string(), "humidity".to_string()];
    let a = spawn(ca).await;
    let b = spawn(node_config("/h/r11", 19118, 19218, &[19217])).await;
    settle().await;

    a.set("temp", "22.0").await;
    assert_eq!(b.get("/h/r10/temp").await.as_deref(), Some(b"22.0".as_slice()));

    let dropped_before = b.metrics().dropped_malformed.load(Ordering::Relaxed);

    // A well-formed envelope from a known peer, but the payload is not
    // valid base64 so it can never decrypt — exercises the forwarder's
    // decrypt-failure drop path directly, independent of crypto.rs's
    // primitive-level tests.
    let bogus = Packet::new_data("/h/r10", "/h/r11", "/h/r10/temp", "not valid base64 !!!".to_string());
    let mut stream = TcpStream::connect(addr(19118)).await.expect("connect to B");
    stream.write_all(&bogus.encode()).await.expect("write bogus packet");
    stream.shutdown().await.ok();
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(
        b.metrics().dropped_malformed.load(Ordering::Relaxed) > dropped_before,
        "corrupted data packet should be counted as dropped"
    );

    // FIB and the shared secret with A must still be intact: a fresh
    // sensor value from A (bypassing the CS, which already holds temp)
    // round-trips normally.
    a.set("humidity", "50.0").await;
    assert_eq!(b.get("/h/r10/humidity").await.as_deref(), Some(b"50.0".as_slice()));

    a.stop().await;
    b.stop().await;
}
