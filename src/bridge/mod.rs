//! Serial bridge between bridge objects and a Firmata board.
//!
//! # Architecture
//!
//! ```text
//!             ┌──────────────── runtime thread ────────────────┐
//! [board] ──► reader thread ──► SerialChunk ──► BridgeSession::ingest ──► engine.apply
//! [board] ◄── Transport::write_all ◄── BridgeSession::refresh_outputs ◄── settled store
//!             └────────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod memory;
pub mod session;
pub mod transport;

pub use error::{BridgeError, BridgeResult};
pub use memory::{MemoryFactory, MemoryPeer, MemoryTransport};
pub use session::{BridgeHub, BridgeSession, ConnectOptions, ReadEvent};
pub use transport::{
    list_ports, ByteSource, SerialFactory, Transport, TransportFactory, UnsupportedFactory,
};
