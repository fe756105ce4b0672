//! In-memory loopback transport.
//!
//! Stands in for a board in tests and in `--dry-run` mode. Every opened
//! transport is paired with a [`MemoryPeer`] that sees what the host wrote and
//! can inject inbound bytes or a read failure.

use crate::bridge::error::{BridgeError, BridgeResult};
use crate::bridge::transport::{ByteSource, Transport, TransportFactory, DEFAULT_READ_TIMEOUT};
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Writes kept for the peer to inspect; older ones are dropped first.
pub const WRITE_HISTORY_CAPACITY: usize = 4096;

#[derive(Debug)]
enum Inbound {
    Data(Vec<u8>),
    Fail(String),
}

/// Board side of a memory transport.
#[derive(Debug, Clone)]
pub struct MemoryPeer {
    port: String,
    baud_rate: u32,
    inbound: Sender<Inbound>,
    written: Receiver<Vec<u8>>,
    closed: Arc<AtomicBool>,
}

impl MemoryPeer {
    pub fn port(&self) -> &str {
        &self.port
    }

    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    /// Deliver bytes to the host's reader.
    pub fn send(&self, bytes: &[u8]) {
        let _ = self.inbound.send(Inbound::Data(bytes.to_vec()));
    }

    /// Make the host's next read fail.
    pub fn fail_reads(&self, reason: &str) {
        let _ = self.inbound.send(Inbound::Fail(reason.to_string()));
    }

    /// The most recent writes the host issued since the last call, one entry
    /// per write, at most [`WRITE_HISTORY_CAPACITY`].
    pub fn take_writes(&self) -> Vec<Vec<u8>> {
        self.written.try_iter().collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Host side of a memory transport.
pub struct MemoryTransport {
    written: Sender<Vec<u8>>,
    /// Host-side handle on the write history, used to evict the oldest entry.
    history: Receiver<Vec<u8>>,
    inbound: Receiver<Inbound>,
    closed: Arc<AtomicBool>,
    read_timeout: Duration,
}

impl MemoryTransport {
    /// A connected host/board pair.
    pub fn pair(port: &str, baud_rate: u32) -> (Self, MemoryPeer) {
        let (written_tx, written_rx) = bounded(WRITE_HISTORY_CAPACITY);
        let (inbound_tx, inbound_rx) = unbounded();
        let closed = Arc::new(AtomicBool::new(false));
        (
            Self {
                written: written_tx,
                history: written_rx.clone(),
                inbound: inbound_rx,
                closed: closed.clone(),
                read_timeout: DEFAULT_READ_TIMEOUT,
            },
            MemoryPeer {
                port: port.to_string(),
                baud_rate,
                inbound: inbound_tx,
                written: written_rx,
                closed,
            },
        )
    }
}

impl Transport for MemoryTransport {
    fn write_all(&mut self, bytes: &[u8]) -> BridgeResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BridgeError::Write("transport closed".to_string()));
        }
        let mut entry = bytes.to_vec();
        loop {
            match self.written.try_send(entry) {
                Ok(()) => return Ok(()),
                Err(TrySendError::Full(back)) => {
                    // Nobody is reading (dry run): forget the oldest write
                    let _ = self.history.try_recv();
                    entry = back;
                }
                Err(TrySendError::Disconnected(_)) => {
                    return Err(BridgeError::Write("peer dropped".to_string()))
                }
            }
        }
    }

    fn reader(&mut self) -> BridgeResult<Box<dyn ByteSource>> {
        Ok(Box::new(MemoryReader {
            inbound: self.inbound.clone(),
            closed: self.closed.clone(),
            pending: Vec::new(),
            read_timeout: self.read_timeout,
        }))
    }

    fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

struct MemoryReader {
    inbound: Receiver<Inbound>,
    closed: Arc<AtomicBool>,
    /// Tail of a chunk larger than the caller's buffer.
    pending: Vec<u8>,
    read_timeout: Duration,
}

impl ByteSource for MemoryReader {
    fn read_chunk(&mut self, buf: &mut [u8]) -> BridgeResult<usize> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BridgeError::Read("transport closed".to_string()));
        }
        if self.pending.is_empty() {
            match self.inbound.recv_timeout(self.read_timeout) {
                Ok(Inbound::Data(bytes)) => self.pending = bytes,
                Ok(Inbound::Fail(reason)) => return Err(BridgeError::Read(reason)),
                Err(RecvTimeoutError::Timeout) => return Ok(0),
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(BridgeError::Read("peer dropped".to_string()))
                }
            }
        }
        let n = self.pending.len().min(buf.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }
}

/// Opens memory transports and keeps their peers reachable by port name.
#[derive(Debug, Clone, Default)]
pub struct MemoryFactory {
    peers: Arc<Mutex<HashMap<String, MemoryPeer>>>,
    refuse: Option<String>,
}

impl MemoryFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// A factory whose every `open` is rejected with `reason`.
    pub fn refusing(reason: &str) -> Self {
        Self {
            peers: Arc::default(),
            refuse: Some(reason.to_string()),
        }
    }

    /// Peer of the most recent transport opened on `port`.
    pub fn peer(&self, port: &str) -> Option<MemoryPeer> {
        self.peers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(port)
            .cloned()
    }
}

impl TransportFactory for MemoryFactory {
    fn open(&self, port: &str, baud_rate: u32) -> BridgeResult<Box<dyn Transport>> {
        if let Some(reason) = &self.refuse {
            return Err(BridgeError::Open {
                port: port.to_string(),
                reason: reason.clone(),
            });
        }
        let (transport, peer) = MemoryTransport::pair(port, baud_rate);
        self.peers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(port.to_string(), peer);
        tracing::debug!("Opened memory transport on {}", port);
        Ok(Box::new(transport))
    }
}
