//! Thread-owning runtime for the object graph.
//!
//! # Architecture
//!
//! ```text
//! caller ──RuntimeCommand──► [runtime thread] ──RuntimeMessage──► caller
//!                              │  PropagationEngine
//!                              │  SequencedBlockExecutor
//!                              │  BridgeHub ◄── SerialChunk ── reader threads
//!                              │  Scheduler<RuntimeTimer>
//! ```

pub mod actor;
pub mod handle;

pub use actor::Runtime;
pub use handle::{RuntimeCommand, RuntimeHandle, RuntimeMessage, Snapshot};

use crate::bridge::TransportFactory;
use crate::config::{AppConfig, Document};
use crate::error::{Result, ResultExt};
use std::thread::{self, JoinHandle};
use std::time::Instant;

/// Start a runtime thread with `document` loaded.
///
/// The thread exits after a `Shutdown` command or once every handle is dropped.
pub fn spawn(
    config: AppConfig,
    factory: Option<Box<dyn TransportFactory>>,
    document: Document,
) -> Result<(RuntimeHandle, JoinHandle<()>)> {
    let (handle, cmd_rx, msg_tx) = RuntimeHandle::new();
    let join = thread::Builder::new()
        .name("wirecanvas-runtime".to_string())
        .spawn(move || {
            let mut runtime = Runtime::new(config, factory, cmd_rx, msg_tx);
            runtime.load_document(document, Instant::now());
            runtime.run();
        })
        .context("Failed to spawn runtime thread")?;
    Ok((handle, join))
}
