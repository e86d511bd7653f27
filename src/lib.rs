//! NAT hole-punching client.
//!
//! Two processes behind NATs establish a direct TCP connection without a
//! relay. Each client discovers its public endpoint over STUN, publishes it
//! to a small rendezvous HTTP registry, keeps its NAT binding warm with UDP
//! heartbeats to every known peer, and — once the designated peer is heard
//! from — tears down the UDP socket and reuses its local port for a
//! deterministic, tie-broken TCP simultaneous open.
//!
//! # Example
//!
//! ```rust,no_run
//! use holepunch::{Node, NodeConfig};
//!
//! # async fn run() -> holepunch::Result<()> {
//! let config = NodeConfig::new("alice", "http://rendezvous.example:3000")
//!     .set_friend("bob");
//! let node = Node::start(config).await?;
//! // the node advances on its own; `node.phase()` observes progress
//! # Ok(())
//! # }
//! ```
//!
//! Without `set_friend` the node only discovers its address and broadcasts
//! heartbeats — the UDP-only variant is the same component with the TCP
//! phases unreachable.

pub mod config;
pub mod error;
pub mod node;
pub mod peer;
pub mod punch;
pub mod rendezvous;
pub mod session;
mod socket;
pub mod state;
pub mod stun;

pub use config::NodeConfig;
pub use error::{Error, ProtocolError, Result, StateError};
pub use node::Node;
pub use state::ConnectionPhase;
