//! NDN overlay peer node for smart-home device networks.
//!
//! Nodes publish and retrieve named data — sensor readings, actuator
//! commands, alerts — over a LAN broadcast segment rather than addressing
//! each other by host. See [`node::Node`] for the public entry point.

pub mod codec;
pub mod config;
pub mod crypto;
pub mod cs;
pub mod discovery;
pub mod error;
pub mod fib;
pub mod forwarder;
pub mod node;
pub mod payload;
pub mod pit;
pub mod sensor;
pub mod server;

pub use codec::{Packet, PeerStatus};
pub use config::{CsSweepMode, NodeConfig};
pub use error::{NodeError, Result};
pub use fib::{Fib, FibEntry, PeerRecord};
pub use node::{Metrics, Node};
pub use payload::{PayloadInterpreter, PayloadKind, RegexPayloadInterpreter};
pub use sensor::{ActuationSink, SensorReader, StaticSensors};
