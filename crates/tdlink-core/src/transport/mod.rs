//! Byte transport between the client core and the engine.
//!
//! The core needs two things from a transport: a way to hand over one
//! serialized request at a time ([`Transport::send_bytes`]) and an inbound
//! stream of raw messages ([`Inbound`]). How the bytes move is up to the
//! implementation:
//!
//! - **memory**: in-process channel pair, for embedding and tests
//! - **framed**: length-prefixed JSON over TCP
//!
//! Engine diagnostics travel next to the messages. A transport that carries
//! them in-band splits them out into a [`Diagnostics`] queue, which the client
//! hands to its admission limiter.

use crate::admission::LogMessage;
use crate::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

pub mod framed;
pub mod memory;

pub use framed::TcpTransport;
pub use memory::{EngineEndpoint, MemoryTransport};

/// Inbound raw messages, one JSON document per item.
pub type Inbound = mpsc::Receiver<Vec<u8>>;

/// Engine diagnostics lines, in arrival order.
pub type Diagnostics = mpsc::Receiver<LogMessage>;

/// Outbound half of a duplex connection to the engine.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Hand one serialized request to the engine.
    async fn send_bytes(&self, payload: Vec<u8>) -> Result<()>;
}
