//! Runtime construction helpers backed by the in-memory transport

use std::time::{Duration, Instant};
use wirecanvas::bridge::{MemoryFactory, TransportFactory};
use wirecanvas::config::AppConfig;
use wirecanvas::runtime::{Runtime, RuntimeHandle, RuntimeMessage, Snapshot};
use wirecanvas::types::ConnectionStatus;

/// A runtime driven synchronously, its handle, and the factory its bridges open through.
pub fn create_test_runtime() -> (Runtime, RuntimeHandle, MemoryFactory) {
    create_test_runtime_with(AppConfig::default(), MemoryFactory::new())
}

pub fn create_test_runtime_with(
    config: AppConfig,
    factory: MemoryFactory,
) -> (Runtime, RuntimeHandle, MemoryFactory) {
    let (handle, cmd_rx, msg_tx) = RuntimeHandle::new();
    let boxed: Box<dyn TransportFactory> = Box::new(factory.clone());
    (Runtime::new(config, Some(boxed), cmd_rx, msg_tx), handle, factory)
}

/// Connection statuses among the pending messages, in order.
pub fn drain_statuses(handle: &RuntimeHandle) -> Vec<ConnectionStatus> {
    handle
        .drain()
        .into_iter()
        .filter_map(|msg| match msg {
            RuntimeMessage::ConnectionStatus { status, .. } => Some(status),
            _ => None,
        })
        .collect()
}

/// Wait for a snapshot that satisfies `pred`, discarding everything else.
pub fn wait_for_snapshot(
    handle: &RuntimeHandle,
    timeout: Duration,
    mut pred: impl FnMut(&Snapshot) -> bool,
) -> Option<Snapshot> {
    let deadline = Instant::now() + timeout;
    while let Some(remaining) = deadline.checked_duration_since(Instant::now()) {
        match handle.recv_timeout(remaining) {
            Some(RuntimeMessage::Snapshot(snapshot)) if pred(&snapshot) => return Some(snapshot),
            Some(_) => continue,
            None => return None,
        }
    }
    None
}
