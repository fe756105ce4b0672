//! The runtime actor.
//!
//! A [`Runtime`] is the single owner of the object graph. It holds the
//! propagation engine, the block executor, every open bridge session and the
//! runtime timers, and it is the only thing that ever calls
//! [`PropagationEngine::apply`]. Callers talk to it through a
//! [`RuntimeHandle`](crate::runtime::RuntimeHandle); bridge reader threads talk
//! to it through an internal unbounded channel.
//!
//! Every operation is also a public method taking an explicit `now`, so the
//! whole actor can be driven deterministically without its thread.
//!
//! Each loop iteration:
//! 1. drain commands and reader events;
//! 2. [`Runtime::tick`]: apply the instruction writes queued by earlier steps,
//!    fire due timers (block ticks, error reverts, output refresh), publish a
//!    snapshot if anything changed.

use crate::bridge::{
    BridgeError, BridgeHub, BridgeResult, BridgeSession, ConnectOptions, ReadEvent, TransportFactory,
    UnsupportedFactory,
};
use crate::config::{AppConfig, Document};
use crate::error::Result;
use crate::graph::{
    keys, Bridge, InputMapping, Instruction, Object, OutputMapping, PropagationEngine,
    PropagationResult, Settled,
};
use crate::runtime::handle::{RuntimeCommand, RuntimeMessage, Snapshot};
use crate::sequencer::{Scheduler, SequencedBlockExecutor, StepOutcome, TimerHandle};
use crate::types::{ConnectionStatus, ObjectId, PropertyMap, Theme};
use crossbeam_channel::{select, unbounded, Receiver, Sender, TrySendError};
use std::collections::VecDeque;
use std::path::Path;
use std::time::{Duration, Instant};

/// Longest the loop waits for a command when no timer is pending.
const IDLE_WAIT: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, PartialEq)]
enum RuntimeTimer {
    /// Move a bridge from `error` back to `disconnected`.
    RevertStatus(ObjectId),
    /// Re-encode changed outputs of every open session.
    RefreshOutputs,
}

/// Single owner of the object graph and everything attached to it.
pub struct Runtime {
    config: AppConfig,
    engine: PropagationEngine,
    executor: SequencedBlockExecutor,
    hub: BridgeHub,
    /// `None` when no serial transport exists on this platform; sessions then
    /// open through [`UnsupportedFactory`].
    factory: Option<Box<dyn TransportFactory>>,
    timers: Scheduler<RuntimeTimer>,
    refresh_timer: Option<TimerHandle>,
    theme: Theme,
    /// Instruction writes produced by block steps, applied on the next tick.
    deferred: VecDeque<(ObjectId, PropertyMap)>,
    dirty: bool,
    running: bool,
    cmd_rx: Receiver<RuntimeCommand>,
    msg_tx: Sender<RuntimeMessage>,
    io_tx: Sender<RuntimeCommand>,
    io_rx: Receiver<RuntimeCommand>,
}

impl Runtime {
    pub fn new(
        config: AppConfig,
        factory: Option<Box<dyn TransportFactory>>,
        cmd_rx: Receiver<RuntimeCommand>,
        msg_tx: Sender<RuntimeMessage>,
    ) -> Self {
        let engine = PropagationEngine::default().with_max_steps(config.propagation.max_steps);
        let executor = SequencedBlockExecutor::new(
            config.sequencer.cooldown(),
            config.sequencer.min_interval(),
        );
        let (io_tx, io_rx) = unbounded();
        Self {
            config,
            engine,
            executor,
            hub: BridgeHub::new(),
            factory,
            timers: Scheduler::new(),
            refresh_timer: None,
            theme: Theme::default(),
            deferred: VecDeque::new(),
            dirty: false,
            running: true,
            cmd_rx,
            msg_tx,
            io_tx,
            io_rx,
        }
    }

    // ── Inspection ──

    pub fn engine(&self) -> &PropagationEngine {
        &self.engine
    }

    pub fn executor(&self) -> &SequencedBlockExecutor {
        &self.executor
    }

    pub fn get(&self, id: &ObjectId) -> Option<&Object> {
        self.engine.get(id)
    }

    pub fn cursor(&self, block: &ObjectId) -> u32 {
        self.executor.cursor(block)
    }

    pub fn status(&self, bridge: &ObjectId) -> Option<ConnectionStatus> {
        self.engine.store().bridge(bridge).map(|b| b.connection_status)
    }

    /// Whether `bridge` has an open session.
    pub fn is_connected(&self, bridge: &ObjectId) -> bool {
        self.hub.contains(bridge)
    }

    /// Generation of the open session of `bridge`.
    pub fn generation(&self, bridge: &ObjectId) -> Option<u64> {
        self.hub.get(bridge).map(BridgeSession::generation)
    }

    pub fn pending_writes(&self) -> usize {
        self.deferred.len()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn theme(&self) -> &Theme {
        &self.theme
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            objects: self.engine.store().to_vec(),
            cursors: self.executor.cursors(),
            theme: self.theme.clone(),
        }
    }

    pub fn document(&self) -> Document {
        Document::new(self.theme.clone(), self.engine.store().to_vec())
    }

    /// Earliest instant at which [`Runtime::tick`] has timer work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.executor.next_deadline(), self.timers.next_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn publish(&self, msg: RuntimeMessage) {
        if let Err(TrySendError::Full(_)) = self.msg_tx.try_send(msg) {
            tracing::warn!("Runtime message channel full; dropping message");
        }
    }

    fn publish_snapshot(&mut self) {
        self.dirty = false;
        self.publish(RuntimeMessage::Snapshot(self.snapshot()));
    }

    // ── Graph operations ──

    /// Add or replace an object. Replacing drops all runtime state held for the old one.
    pub fn insert(&mut self, mut object: Object, now: Instant) {
        let id = object.id().clone();
        self.forget(&id);
        if let Some(bridge) = object.as_bridge_mut() {
            bridge.connection_status = ConnectionStatus::Disconnected;
        }
        self.engine.insert(object);
        self.executor.sync_timers(self.engine.store(), now);
        self.dirty = true;
    }

    /// Merge `props` into `id` and settle every implied write.
    pub fn apply(
        &mut self,
        id: &ObjectId,
        props: PropertyMap,
        now: Instant,
    ) -> PropagationResult<Settled> {
        let result = self.engine.apply(id, props);
        self.after_propagation(id, &result, now);
        result
    }

    /// Remove an object, its block timer and cursor, and its connection.
    pub fn delete(&mut self, id: &ObjectId, now: Instant) -> bool {
        self.forget(id);
        self.deferred.retain(|(target, _)| target != id);
        let removed = self.engine.remove(id).is_some();
        if removed {
            tracing::debug!("Deleted {}", id);
            self.executor.sync_timers(self.engine.store(), now);
            self.dirty = true;
        }
        removed
    }

    pub fn bind(
        &mut self,
        source: &ObjectId,
        target: &ObjectId,
        property: &str,
        now: Instant,
    ) -> PropagationResult<Settled> {
        let result = self.engine.bind(source, target, property);
        self.after_propagation(source, &result, now);
        result
    }

    pub fn unbind(&mut self, source: &ObjectId, now: Instant) -> PropagationResult<Settled> {
        let result = self.engine.unbind(source);
        self.after_propagation(source, &result, now);
        result
    }

    pub fn set_inherited_slider(
        &mut self,
        slave: &ObjectId,
        master: Option<&ObjectId>,
        now: Instant,
    ) -> PropagationResult<Settled> {
        let result = self.engine.set_inherited_slider(slave, master);
        self.after_propagation(slave, &result, now);
        result
    }

    pub fn add_instruction(
        &mut self,
        block: &ObjectId,
        instruction: Instruction,
        now: Instant,
    ) -> PropagationResult<u32> {
        let result = self.engine.add_instruction(block, instruction);
        self.after_edit(block, result, now)
    }

    pub fn remove_instruction(
        &mut self,
        block: &ObjectId,
        index: usize,
        now: Instant,
    ) -> PropagationResult<Instruction> {
        let result = self.engine.remove_instruction(block, index);
        self.after_edit(block, result, now)
    }

    pub fn move_instruction(
        &mut self,
        block: &ObjectId,
        from: usize,
        to: usize,
        now: Instant,
    ) -> PropagationResult<()> {
        let result = self.engine.move_instruction(block, from, to);
        self.after_edit(block, result, now)
    }

    /// Replace a bridge's pin mappings; an open session is reconfigured in place.
    pub fn set_mappings(
        &mut self,
        bridge_id: &ObjectId,
        inputs: Vec<InputMapping>,
        outputs: Vec<OutputMapping>,
        now: Instant,
    ) -> PropagationResult<()> {
        let result = self.engine.set_mappings(bridge_id, inputs, outputs);
        let result = self.after_edit(bridge_id, result, now);
        if result.is_ok() {
            let reconfigured = match (self.engine.store().bridge(bridge_id), self.hub.get_mut(bridge_id)) {
                (Some(bridge), Some(session)) => {
                    session.invalidate_outputs();
                    Some(session.handshake(bridge))
                }
                _ => None,
            };
            match reconfigured {
                Some(Ok(())) => self.refresh_outputs(now),
                Some(Err(error)) => self.fail_connection(bridge_id, error, now),
                None => {}
            }
        }
        result
    }

    pub fn set_theme(&mut self, theme: Theme) {
        self.theme = theme;
        self.dirty = true;
    }

    /// Replace the whole canvas. Every open connection is closed.
    pub fn load_document(&mut self, document: Document, now: Instant) {
        let document = Document::new(document.theme, document.objects);
        self.hub.close_all();
        self.update_refresh_timer();
        self.timers.clear();
        self.executor.clear();
        self.deferred.clear();

        tracing::info!("Loaded document with {} objects", document.objects.len());
        self.theme = document.theme;
        self.engine.replace_all(document.objects);
        self.executor.sync_timers(self.engine.store(), now);
        self.dirty = true;
    }

    pub fn save_document(&mut self, path: &Path) -> Result<()> {
        self.document().save(path)?;
        tracing::info!("Saved document to {:?}", path);
        self.publish(RuntimeMessage::DocumentSaved(path.to_path_buf()));
        Ok(())
    }

    fn after_propagation(
        &mut self,
        root: &ObjectId,
        result: &PropagationResult<Settled>,
        now: Instant,
    ) {
        match result {
            Ok(settled) => self.settled(settled, now),
            Err(error) => self.publish(RuntimeMessage::PropagationFailed {
                root: root.clone(),
                error: error.clone(),
            }),
        }
    }

    fn after_edit<T>(
        &mut self,
        root: &ObjectId,
        result: PropagationResult<T>,
        now: Instant,
    ) -> PropagationResult<T> {
        match &result {
            Ok(_) => {
                self.executor.sync_timers(self.engine.store(), now);
                self.dirty = true;
            }
            Err(error) => self.publish(RuntimeMessage::PropagationFailed {
                root: root.clone(),
                error: error.clone(),
            }),
        }
        result
    }

    fn settled(&mut self, settled: &Settled, now: Instant) {
        for block in &settled.triggers {
            self.step_block(block, now);
        }
        if settled.is_noop() {
            return;
        }
        self.dirty = true;
        self.executor.sync_timers(self.engine.store(), now);
        self.refresh_outputs(now);
    }

    fn step_block(&mut self, block: &ObjectId, now: Instant) {
        if let StepOutcome::Advanced { order, write } = self.executor.step(self.engine.store(), block, now) {
            tracing::trace!("Block {} at instruction {}", block, order);
            self.dirty = true;
            if let Some(write) = write {
                self.deferred.push_back(write);
            }
        }
    }

    /// Drop executor, timer and connection state held for `id`.
    fn forget(&mut self, id: &ObjectId) {
        self.executor.remove(id);
        self.cancel_revert(id);
        if self.hub.remove(id) {
            self.update_refresh_timer();
        }
    }

    // ── Connections ──

    /// Open, configure and start reading the serial connection of `bridge_id`.
    ///
    /// Status goes `connecting → connected`, or `connecting → error` followed by
    /// `disconnected` once the revert delay has passed.
    pub fn connect(&mut self, bridge_id: &ObjectId, now: Instant) -> BridgeResult<()> {
        let Some(bridge) = self.engine.store().bridge(bridge_id).cloned() else {
            let error = BridgeError::NotABridge(bridge_id.clone());
            self.publish(RuntimeMessage::Notice(error.to_string()));
            return Err(error);
        };

        if self.hub.remove(bridge_id) {
            self.update_refresh_timer();
        }
        self.cancel_revert(bridge_id);
        self.set_status(bridge_id, ConnectionStatus::Connecting, now);

        let generation = self.hub.next_generation();
        match self.open_session(&bridge, generation) {
            Ok(session) => {
                tracing::info!("Bridge {} connected on {}", bridge_id, session.port());
                self.hub.insert(session);
                self.ensure_refresh_timer(now);
                self.set_status(bridge_id, ConnectionStatus::Connected, now);
                Ok(())
            }
            Err(error) => {
                self.fail_connection(bridge_id, error.clone(), now);
                Err(error)
            }
        }
    }

    fn open_session(&self, bridge: &Bridge, generation: u64) -> BridgeResult<BridgeSession> {
        let factory: &dyn TransportFactory = match self.factory.as_deref() {
            Some(factory) => factory,
            None => &UnsupportedFactory,
        };
        let options = ConnectOptions {
            default_port: self.config.serial.port.clone(),
            default_baud: self.config.serial.baud_rate,
            analog_offset: self.config.bridge.analog_pin_offset,
        };
        let mut session = BridgeSession::open(factory, bridge, &options, generation)?;
        session.handshake(bridge)?;

        let io_tx = self.io_tx.clone();
        let id = bridge.id.clone();
        session.start_reader(move |event| {
            let cmd = match event {
                ReadEvent::Data(bytes) => RuntimeCommand::SerialChunk {
                    bridge: id.clone(),
                    generation,
                    bytes,
                },
                ReadEvent::Failed(error) => RuntimeCommand::SerialFailure {
                    bridge: id.clone(),
                    generation,
                    error,
                },
            };
            io_tx.send(cmd).is_ok()
        })?;
        Ok(session)
    }

    /// Close the connection of `bridge_id` and mark it `disconnected`.
    pub fn disconnect(&mut self, bridge_id: &ObjectId, now: Instant) {
        self.cancel_revert(bridge_id);
        if self.hub.remove(bridge_id) {
            self.update_refresh_timer();
        }
        if self.engine.store().bridge(bridge_id).is_some() {
            self.set_status(bridge_id, ConnectionStatus::Disconnected, now);
        }
    }

    fn fail_connection(&mut self, bridge_id: &ObjectId, error: BridgeError, now: Instant) {
        tracing::warn!("Bridge {} failed: {}", bridge_id, error);
        if self.hub.remove(bridge_id) {
            self.update_refresh_timer();
        }
        if matches!(error, BridgeError::Unsupported(_)) {
            self.publish(RuntimeMessage::Notice(error.to_string()));
        }
        self.set_status(bridge_id, ConnectionStatus::Error, now);

        self.cancel_revert(bridge_id);
        self.timers.schedule_once(
            RuntimeTimer::RevertStatus(bridge_id.clone()),
            self.config.bridge.error_revert(),
            now,
        );
    }

    fn set_status(&mut self, bridge_id: &ObjectId, status: ConnectionStatus, now: Instant) {
        let _ = self.apply(
            bridge_id,
            PropertyMap::single(keys::CONNECTION_STATUS, status.as_str()),
            now,
        );
        self.publish(RuntimeMessage::ConnectionStatus {
            bridge: bridge_id.clone(),
            status,
        });
    }

    fn cancel_revert(&mut self, bridge_id: &ObjectId) {
        self.timers
            .cancel_where(|timer| matches!(timer, RuntimeTimer::RevertStatus(id) if id == bridge_id));
    }

    fn ensure_refresh_timer(&mut self, now: Instant) {
        if self.refresh_timer.is_none() {
            let handle = self.timers.schedule_repeating(
                RuntimeTimer::RefreshOutputs,
                self.config.bridge.output_refresh(),
                now,
            );
            self.refresh_timer = Some(handle);
        }
    }

    fn update_refresh_timer(&mut self) {
        if self.hub.is_empty() {
            if let Some(handle) = self.refresh_timer.take() {
                self.timers.cancel(handle);
            }
        }
    }

    /// Write every changed output of every open session.
    fn refresh_outputs(&mut self, now: Instant) {
        let mut failed = Vec::new();
        for id in self.hub.ids() {
            let (Some(bridge), Some(session)) = (self.engine.store().bridge(&id), self.hub.get_mut(&id)) else {
                continue;
            };
            if let Err(error) = session.refresh_outputs(self.engine.store(), bridge) {
                failed.push((id, error));
            }
        }
        for (id, error) in failed {
            self.fail_connection(&id, error, now);
        }
    }

    /// Decode a chunk read by `bridge_id`'s reader and apply the reported inputs.
    pub fn ingest_serial(&mut self, bridge_id: &ObjectId, generation: u64, bytes: &[u8], now: Instant) {
        if !self.hub.is_current(bridge_id, generation) {
            tracing::trace!(
                "Dropping {} bytes from stale connection {} of {}",
                bytes.len(),
                generation,
                bridge_id
            );
            return;
        }
        let writes = match (self.engine.store().bridge(bridge_id), self.hub.get_mut(bridge_id)) {
            (Some(bridge), Some(session)) => session.ingest(bytes, bridge),
            _ => return,
        };
        for (target, props) in writes {
            let _ = self.apply(&target, props, now);
        }
    }

    /// A reader thread gave up; fails the connection if it is still the live one.
    pub fn serial_failure(
        &mut self,
        bridge_id: &ObjectId,
        generation: u64,
        error: BridgeError,
        now: Instant,
    ) {
        if !self.hub.is_current(bridge_id, generation) {
            tracing::debug!("Ignoring failure of stale connection {} of {}", generation, bridge_id);
            return;
        }
        self.fail_connection(bridge_id, error, now);
    }

    // ── Loop ──

    /// Apply queued instruction writes, fire due timers, publish if changed.
    pub fn tick(&mut self, now: Instant) {
        let ready: Vec<(ObjectId, PropertyMap)> = self.deferred.drain(..).collect();
        for (target, props) in ready {
            let _ = self.apply(&target, props, now);
        }

        for block in self.executor.due(now) {
            self.step_block(&block, now);
        }

        for timer in self.timers.due(now) {
            match timer {
                RuntimeTimer::RevertStatus(bridge) => {
                    if self.status(&bridge) == Some(ConnectionStatus::Error) && !self.hub.contains(&bridge) {
                        self.set_status(&bridge, ConnectionStatus::Disconnected, now);
                    }
                }
                RuntimeTimer::RefreshOutputs => self.refresh_outputs(now),
            }
        }

        if self.dirty {
            self.publish_snapshot();
        }
    }

    /// Execute one command.
    pub fn handle(&mut self, cmd: RuntimeCommand, now: Instant) {
        match cmd {
            RuntimeCommand::Insert(object) => self.insert(object, now),
            RuntimeCommand::Apply { id, props } => {
                let _ = self.apply(&id, props, now);
            }
            RuntimeCommand::Delete(id) => {
                self.delete(&id, now);
            }
            RuntimeCommand::Bind {
                source,
                target,
                property,
            } => {
                let _ = self.bind(&source, &target, &property, now);
            }
            RuntimeCommand::Unbind(source) => {
                let _ = self.unbind(&source, now);
            }
            RuntimeCommand::SetInheritedSlider { slave, master } => {
                let _ = self.set_inherited_slider(&slave, master.as_ref(), now);
            }
            RuntimeCommand::AddInstruction { block, instruction } => {
                let _ = self.add_instruction(&block, instruction, now);
            }
            RuntimeCommand::RemoveInstruction { block, index } => {
                let _ = self.remove_instruction(&block, index, now);
            }
            RuntimeCommand::MoveInstruction { block, from, to } => {
                let _ = self.move_instruction(&block, from, to, now);
            }
            RuntimeCommand::SetMappings {
                bridge,
                inputs,
                outputs,
            } => {
                let _ = self.set_mappings(&bridge, inputs, outputs, now);
            }
            RuntimeCommand::Connect(bridge) => {
                let _ = self.connect(&bridge, now);
            }
            RuntimeCommand::Disconnect(bridge) => self.disconnect(&bridge, now),
            RuntimeCommand::SetTheme(theme) => self.set_theme(theme),
            RuntimeCommand::LoadDocument(document) => self.load_document(document, now),
            RuntimeCommand::SaveDocument(path) => {
                if let Err(e) = self.save_document(&path) {
                    tracing::error!("Failed to save document: {}", e);
                    self.publish(RuntimeMessage::Notice(format!("Failed to save document: {}", e)));
                }
            }
            RuntimeCommand::RequestSnapshot => self.publish_snapshot(),
            RuntimeCommand::SerialChunk {
                bridge,
                generation,
                bytes,
            } => self.ingest_serial(&bridge, generation, &bytes, now),
            RuntimeCommand::SerialFailure {
                bridge,
                generation,
                error,
            } => self.serial_failure(&bridge, generation, error, now),
            RuntimeCommand::Shutdown => {
                tracing::info!("Runtime shutdown requested");
                self.running = false;
            }
        }
    }

    /// Handle every queued command and reader event without blocking.
    pub fn process_commands(&mut self, now: Instant) -> usize {
        let mut handled = 0;
        while let Ok(cmd) = self.cmd_rx.try_recv() {
            self.handle(cmd, now);
            handled += 1;
        }
        handled + self.process_serial_events(Duration::ZERO, now)
    }

    /// Wait up to `wait` for the first reader event, then handle all queued ones.
    pub fn process_serial_events(&mut self, wait: Duration, now: Instant) -> usize {
        let first = if wait.is_zero() {
            self.io_rx.try_recv().ok()
        } else {
            self.io_rx.recv_timeout(wait).ok()
        };
        let Some(first) = first else {
            return 0;
        };
        self.handle(first, now);
        let mut handled = 1;
        while let Ok(cmd) = self.io_rx.try_recv() {
            self.handle(cmd, now);
            handled += 1;
        }
        handled
    }

    fn wait_budget(&self, now: Instant) -> Duration {
        if self.dirty || !self.deferred.is_empty() {
            return Duration::ZERO;
        }
        match self.next_deadline() {
            Some(deadline) => deadline.saturating_duration_since(now).min(IDLE_WAIT),
            None => IDLE_WAIT,
        }
    }

    /// Run until a `Shutdown` command arrives or every handle is dropped.
    pub fn run(&mut self) {
        tracing::info!("Runtime thread started");
        let cmd_rx = self.cmd_rx.clone();
        let io_rx = self.io_rx.clone();

        while self.running {
            let wait = self.wait_budget(Instant::now());
            select! {
                recv(cmd_rx) -> cmd => match cmd {
                    Ok(cmd) => self.handle(cmd, Instant::now()),
                    Err(_) => {
                        tracing::info!("All runtime handles dropped");
                        self.running = false;
                    }
                },
                recv(io_rx) -> cmd => {
                    if let Ok(cmd) = cmd {
                        self.handle(cmd, Instant::now());
                    }
                },
                default(wait) => {}
            }
            self.process_commands(Instant::now());
            self.tick(Instant::now());
        }

        self.hub.close_all();
        let _ = self.msg_tx.send(RuntimeMessage::Shutdown);
        tracing::info!("Runtime thread exiting");
    }
}
