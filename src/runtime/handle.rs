//! Thread boundary between the runtime and its callers (UI, CLI, tests).
//!
//! Commands flow in over a bounded channel; messages flow back over another.
//! The runtime thread owns `cmd_rx` and `msg_tx`.

use crate::bridge::BridgeError;
use crate::config::Document;
use crate::error::{Result, WireCanvasError};
use crate::graph::{InputMapping, Instruction, Object, OutputMapping, PropagationError};
use crate::types::{ConnectionStatus, ObjectId, PropertyMap, Theme};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// State handed to the renderer after every settled change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub objects: Vec<Object>,
    /// Current 1-based cursor of every block that has stepped at least once.
    pub cursors: BTreeMap<ObjectId, u32>,
    pub theme: Theme,
}

/// Messages sent from the runtime thread to its callers.
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeMessage {
    /// The graph, cursors or theme changed.
    Snapshot(Snapshot),

    /// A bridge's connection status changed.
    ConnectionStatus {
        bridge: ObjectId,
        status: ConnectionStatus,
    },

    /// Something the user should hear about that is not tied to one object.
    Notice(String),

    /// A command was rejected or a traversal was abandoned.
    PropagationFailed {
        root: ObjectId,
        error: PropagationError,
    },

    /// The document was written to disk.
    DocumentSaved(PathBuf),

    /// Runtime is shutting down.
    Shutdown,
}

/// Commands sent to the runtime thread.
#[derive(Debug, Clone)]
pub enum RuntimeCommand {
    /// Add or replace an object.
    Insert(Object),

    /// Merge a partial property map into one object and propagate.
    Apply { id: ObjectId, props: PropertyMap },

    /// Remove an object and every piece of runtime state held for it.
    Delete(ObjectId),

    /// Bind a slider or switch to a numeric property of another object.
    Bind {
        source: ObjectId,
        target: ObjectId,
        property: String,
    },

    /// Clear a slider's or switch's binding.
    Unbind(ObjectId),

    /// Make a slider follow another (or stop with `None`).
    SetInheritedSlider {
        slave: ObjectId,
        master: Option<ObjectId>,
    },

    AddInstruction {
        block: ObjectId,
        instruction: Instruction,
    },

    RemoveInstruction { block: ObjectId, index: usize },

    MoveInstruction {
        block: ObjectId,
        from: usize,
        to: usize,
    },

    /// Replace a bridge's pin mappings.
    SetMappings {
        bridge: ObjectId,
        inputs: Vec<InputMapping>,
        outputs: Vec<OutputMapping>,
    },

    /// Open the serial connection of a bridge.
    Connect(ObjectId),

    /// Close the serial connection of a bridge.
    Disconnect(ObjectId),

    SetTheme(Theme),

    /// Replace the whole canvas.
    LoadDocument(Document),

    /// Write the current canvas to disk.
    SaveDocument(PathBuf),

    /// Publish a snapshot even if nothing changed.
    RequestSnapshot,

    /// Raw bytes read by a bridge's reader thread.
    SerialChunk {
        bridge: ObjectId,
        generation: u64,
        bytes: Vec<u8>,
    },

    /// A bridge's reader thread failed.
    SerialFailure {
        bridge: ObjectId,
        generation: u64,
        error: BridgeError,
    },

    /// Shut down the runtime thread.
    Shutdown,
}

/// Channel capacity for commands (caller → runtime).
const CMD_CHANNEL_CAPACITY: usize = 256;

/// Channel capacity for messages (runtime → caller).
const MSG_CHANNEL_CAPACITY: usize = 10_000;

/// Caller-side handle for communicating with the runtime thread.
pub struct RuntimeHandle {
    pub cmd_tx: Sender<RuntimeCommand>,
    pub msg_rx: Receiver<RuntimeMessage>,
}

impl RuntimeHandle {
    /// Create a new handle: `(handle, cmd_rx, msg_tx)`.
    ///
    /// The runtime thread owns `cmd_rx` and `msg_tx`.
    pub fn new() -> (Self, Receiver<RuntimeCommand>, Sender<RuntimeMessage>) {
        let (cmd_tx, cmd_rx) = bounded(CMD_CHANNEL_CAPACITY);
        let (msg_tx, msg_rx) = bounded(MSG_CHANNEL_CAPACITY);
        (Self { cmd_tx, msg_rx }, cmd_rx, msg_tx)
    }

    // --- Messages ---

    /// Drain all pending messages.
    pub fn drain(&self) -> Vec<RuntimeMessage> {
        let mut msgs = Vec::new();
        while let Ok(msg) = self.msg_rx.try_recv() {
            msgs.push(msg);
        }
        msgs
    }

    /// Try to receive a single message without blocking.
    pub fn try_recv(&self) -> Option<RuntimeMessage> {
        self.msg_rx.try_recv().ok()
    }

    /// Wait up to `timeout` for the next message.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<RuntimeMessage> {
        match self.msg_rx.recv_timeout(timeout) {
            Ok(msg) => Some(msg),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    // --- Commands ---

    pub fn send_command(&self, cmd: RuntimeCommand) -> Result<()> {
        self.cmd_tx
            .send(cmd)
            .map_err(|_| WireCanvasError::Channel("runtime thread has stopped".to_string()))
    }

    pub fn insert(&self, object: Object) {
        let _ = self.cmd_tx.send(RuntimeCommand::Insert(object));
    }

    pub fn apply(&self, id: impl Into<ObjectId>, props: PropertyMap) {
        let _ = self.cmd_tx.send(RuntimeCommand::Apply {
            id: id.into(),
            props,
        });
    }

    pub fn delete(&self, id: impl Into<ObjectId>) {
        let _ = self.cmd_tx.send(RuntimeCommand::Delete(id.into()));
    }

    pub fn bind(&self, source: impl Into<ObjectId>, target: impl Into<ObjectId>, property: &str) {
        let _ = self.cmd_tx.send(RuntimeCommand::Bind {
            source: source.into(),
            target: target.into(),
            property: property.to_string(),
        });
    }

    pub fn connect(&self, bridge: impl Into<ObjectId>) {
        let _ = self.cmd_tx.send(RuntimeCommand::Connect(bridge.into()));
    }

    pub fn disconnect(&self, bridge: impl Into<ObjectId>) {
        let _ = self.cmd_tx.send(RuntimeCommand::Disconnect(bridge.into()));
    }

    pub fn save_document(&self, path: impl Into<PathBuf>) {
        let _ = self.cmd_tx.send(RuntimeCommand::SaveDocument(path.into()));
    }

    pub fn request_snapshot(&self) {
        let _ = self.cmd_tx.send(RuntimeCommand::RequestSnapshot);
    }

    pub fn shutdown(&self) {
        let _ = self.cmd_tx.send(RuntimeCommand::Shutdown);
    }
}
