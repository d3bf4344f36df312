//! ndn-home — NDN overlay peer node for smart-home device networks.

use clap::Parser;
use ndn_home::{Node, NodeConfig, StaticSensors};
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "ndn-home", version, about = "NDN overlay peer node for smart-home device networks")]
struct Args {
    /// Hierarchical node name, e.g. /group21/house1/room1
    #[arg(long)]
    node_name: String,

    /// Address to listen on for interest/data TCP connections
    #[arg(long, default_value = "0.0.0.0")]
    host: IpAddr,

    /// TCP port for interest/data exchange
    #[arg(long, default_value = "9000")]
    port: u16,

    /// UDP port for discovery/routing broadcasts
    #[arg(long, default_value = "9001")]
    broadcast_port: u16,

    /// Comma-separated sensor types this node answers interests for
    #[arg(long, value_delimiter = ',')]
    sensors: Vec<String>,

    /// Presence broadcast interval in seconds
    #[arg(long, default_value_t = ndn_home::config::DEFAULT_PRESENCE_INTERVAL_SECS)]
    presence_interval: u64,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("ndn_home={}", args.log_level).parse().unwrap()),
        )
        .init();

    let mut config = NodeConfig::new(args.node_name.clone(), args.host, args.port, args.broadcast_port)
        .with_sensors(args.sensors);
    config.presence_broadcast_interval_secs = args.presence_interval;

    info!("ndn-home node {} starting on {}:{} (broadcast {})", args.node_name, args.host, args.port, args.broadcast_port);

    let sensors = Arc::new(StaticSensors::new());
    let node = Node::new(config, sensors.clone(), sensors);

    if let Err(e) = node.start().await {
        error!("failed to start node: {}", e);
        return;
    }

    info!("node running, public key: {}", node.public_key_pem().lines().next().unwrap_or(""));

    tokio::signal::ctrl_c().await.ok();
    info!("shutting down...");
    node.stop().await;
}
