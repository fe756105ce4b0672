//! Bridge sessions.
//!
//! A [`BridgeSession`] owns one open connection: the transport's write half,
//! the inbound [`Decoder`], the per-mapping last-sent cache and the digital
//! output shadow registers. It never touches the object store directly:
//! inbound reports are turned into property writes for the caller to apply,
//! and outbound refreshes only read the store.
//!
//! The transport's read half runs on its own thread and forwards raw chunks
//! through a callback tagged with the session's generation, so events from a
//! connection that has since been closed can be recognised and dropped.

use crate::bridge::error::{BridgeError, BridgeResult};
use crate::bridge::transport::{Transport, TransportFactory};
use crate::firmata::codec::{self, Decoder, Message, PinMode};
use crate::firmata::scaling;
use crate::graph::object::DEFAULT_BAUD_RATE;
use crate::graph::{Bridge, InputMode, ObjectStore, OutputMode};
use crate::types::{ObjectId, PropertyMap};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

/// Size of the reader thread's chunk buffer.
const READ_BUFFER_SIZE: usize = 256;

/// Defaults applied when a bridge object leaves its connection settings unset.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectOptions {
    pub default_port: Option<String>,
    pub default_baud: u32,
    /// Logical pin of analog channel 0
    pub analog_offset: u8,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            default_port: None,
            default_baud: DEFAULT_BAUD_RATE,
            analog_offset: codec::ANALOG_PIN_OFFSET,
        }
    }
}

/// Event produced by a session's reader thread.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadEvent {
    Data(Vec<u8>),
    Failed(BridgeError),
}

/// What was last written for one output mapping.
#[derive(Debug, Clone, Copy, PartialEq)]
struct SentOutput {
    pin: u8,
    mode: OutputMode,
    value: f64,
}

/// One live serial connection of a bridge object.
pub struct BridgeSession {
    bridge_id: ObjectId,
    generation: u64,
    port: String,
    transport: Box<dyn Transport>,
    decoder: Decoder,
    analog_offset: u8,
    /// Last value written per output-mapping index.
    last_sent: HashMap<usize, SentOutput>,
    /// Shadow register per digital output port.
    port_registers: HashMap<u8, u8>,
    cancel: Arc<AtomicBool>,
    reader: Option<thread::JoinHandle<()>>,
}

impl std::fmt::Debug for BridgeSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeSession")
            .field("bridge_id", &self.bridge_id)
            .field("generation", &self.generation)
            .field("port", &self.port)
            .finish()
    }
}

impl BridgeSession {
    /// Open the transport for `bridge`.
    ///
    /// The bridge's own `portName` and `baudRate` win over `options`.
    pub fn open(
        factory: &dyn TransportFactory,
        bridge: &Bridge,
        options: &ConnectOptions,
        generation: u64,
    ) -> BridgeResult<Self> {
        let port = bridge
            .port_name
            .as_deref()
            .or(options.default_port.as_deref())
            .ok_or_else(|| BridgeError::NoPort(bridge.id.clone()))?;
        let baud = bridge.baud_rate.unwrap_or(options.default_baud);
        tracing::info!("Opening {} at {} baud for bridge {}", port, baud, bridge.id);
        let transport = factory.open(port, baud)?;
        Ok(Self::with_transport(
            bridge.id.clone(),
            port,
            transport,
            generation,
            options.analog_offset,
        ))
    }

    /// Wrap an already-open transport.
    pub fn with_transport(
        bridge_id: ObjectId,
        port: &str,
        transport: Box<dyn Transport>,
        generation: u64,
        analog_offset: u8,
    ) -> Self {
        Self {
            bridge_id,
            generation,
            port: port.to_string(),
            transport,
            decoder: Decoder::new(),
            analog_offset,
            last_sent: HashMap::new(),
            port_registers: HashMap::new(),
            cancel: Arc::new(AtomicBool::new(false)),
            reader: None,
        }
    }

    pub fn bridge_id(&self) -> &ObjectId {
        &self.bridge_id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    fn send(&mut self, bytes: &[u8]) -> BridgeResult<()> {
        tracing::trace!("{} -> {:02X?}", self.port, bytes);
        self.transport.write_all(bytes)
    }

    // ── Connect-time configuration ──

    /// Configure every mapped pin and enable reporting for the inputs.
    pub fn handshake(&mut self, bridge: &Bridge) -> BridgeResult<()> {
        for mapping in &bridge.output_mappings {
            let mode = match mapping.mode {
                OutputMode::Pwm => PinMode::Pwm,
                OutputMode::Digital => PinMode::Output,
            };
            self.send(&codec::set_pin_mode(mapping.pin, mode))?;
        }
        for mapping in &bridge.input_mappings {
            match mapping.mode {
                InputMode::Analog => {
                    self.send(&codec::set_pin_mode(mapping.pin, PinMode::Analog))?;
                    match codec::analog_channel(mapping.pin, self.analog_offset) {
                        Some(channel) => self.send(&codec::report_analog(channel, true))?,
                        None => tracing::warn!(
                            "Analog input on pin {} is below the analog pin offset {}; not reporting",
                            mapping.pin,
                            self.analog_offset
                        ),
                    }
                }
                InputMode::Digital => {
                    self.send(&codec::set_pin_mode(mapping.pin, PinMode::Input))?;
                    self.send(&codec::report_digital(codec::port_of(mapping.pin), true))?;
                }
            }
        }
        tracing::debug!(
            "Configured {} outputs and {} inputs on {}",
            bridge.output_mappings.len(),
            bridge.input_mappings.len(),
            self.port
        );
        Ok(())
    }

    /// Start the reader thread. `sink` receives every chunk and the final
    /// failure; returning `false` from it stops the reader.
    pub fn start_reader<F>(&mut self, mut sink: F) -> BridgeResult<()>
    where
        F: FnMut(ReadEvent) -> bool + Send + 'static,
    {
        let mut source = self.transport.reader()?;
        let cancel = self.cancel.clone();
        let name = format!("bridge-reader-{}", self.bridge_id);
        let handle = thread::Builder::new()
            .name(name)
            .spawn(move || {
                let mut buf = [0u8; READ_BUFFER_SIZE];
                while !cancel.load(Ordering::SeqCst) {
                    match source.read_chunk(&mut buf) {
                        Ok(0) => continue,
                        Ok(n) => {
                            if !sink(ReadEvent::Data(buf[..n].to_vec())) {
                                break;
                            }
                        }
                        Err(e) => {
                            if !cancel.load(Ordering::SeqCst) {
                                let _ = sink(ReadEvent::Failed(e));
                            }
                            break;
                        }
                    }
                }
            })
            .map_err(|e| BridgeError::Read(e.to_string()))?;
        self.reader = Some(handle);
        Ok(())
    }

    // ── Inbound ──

    /// Decode a chunk and translate every completed report into property writes.
    pub fn ingest(&mut self, bytes: &[u8], bridge: &Bridge) -> Vec<(ObjectId, PropertyMap)> {
        let mut writes = Vec::new();
        for message in self.decoder.feed(bytes) {
            tracing::debug!("{} <- {:?}", self.port, message);
            match message {
                Message::Analog { channel, value } => {
                    let pin = channel.saturating_add(self.analog_offset);
                    for mapping in bridge
                        .input_mappings
                        .iter()
                        .filter(|m| m.mode == InputMode::Analog && m.pin == pin)
                    {
                        if let (Some(target), Some(property)) = (&mapping.target_id, &mapping.property) {
                            let scaled = scaling::scale_adc(value, mapping.adc_bits, mapping.min, mapping.max);
                            writes.push((target.clone(), PropertyMap::single(property.clone(), scaled)));
                        }
                    }
                }
                Message::Digital { port, value } => {
                    for bit in 0..codec::PINS_PER_PORT {
                        let pin = port * codec::PINS_PER_PORT + bit;
                        let high = value & (1 << bit) != 0;
                        for mapping in bridge
                            .input_mappings
                            .iter()
                            .filter(|m| m.mode == InputMode::Digital && m.pin == pin)
                        {
                            if let (Some(target), Some(property)) = (&mapping.target_id, &mapping.property) {
                                let level = scaling::digital_level(high, mapping.min, mapping.max);
                                writes.push((target.clone(), PropertyMap::single(property.clone(), level)));
                            }
                        }
                    }
                }
            }
        }
        writes
    }

    // ── Outbound ──

    /// Re-encode every output mapping whose source value changed since it was
    /// last sent. Returns the number of messages written.
    pub fn refresh_outputs(&mut self, store: &ObjectStore, bridge: &Bridge) -> BridgeResult<usize> {
        let mut sent = 0;
        for (index, mapping) in bridge.output_mappings.iter().enumerate() {
            let (Some(source_id), Some(property)) = (&mapping.source_id, &mapping.property) else {
                continue;
            };
            let Some(source) = store.get(source_id) else {
                continue;
            };
            let Some(value) = source.numeric(property) else {
                continue;
            };
            let current = SentOutput {
                pin: mapping.pin,
                mode: mapping.mode,
                value,
            };
            if self.last_sent.get(&index) == Some(&current) {
                continue;
            }

            let bytes = match mapping.mode {
                OutputMode::Pwm => {
                    let (default_min, default_max) = scaling::DEFAULT_SOURCE_RANGE;
                    let min = source.numeric("min").unwrap_or(default_min);
                    let max = source.numeric("max").unwrap_or(default_max);
                    let duty = scaling::to_pwm(value, min, max);
                    codec::analog_message(mapping.pin, u16::from(duty))
                }
                OutputMode::Digital => {
                    let port = codec::port_of(mapping.pin);
                    let register = self.port_registers.entry(port).or_insert(0);
                    *register = scaling::with_bit(*register, codec::bit_of(mapping.pin), scaling::is_high(value));
                    codec::digital_message(port, *register)
                }
            };
            self.send(&bytes)?;
            self.last_sent.insert(index, current);
            sent += 1;
        }
        Ok(sent)
    }

    /// Forget what was sent so the next refresh rewrites every output.
    pub fn invalidate_outputs(&mut self) {
        self.last_sent.clear();
    }

    /// Stop the reader and release the transport.
    pub fn close(&mut self) {
        self.cancel.store(true, Ordering::SeqCst);
        self.transport.close();
        // The reader exits within one read timeout; it is not joined because it
        // may be blocked handing a chunk to the thread calling `close`.
        self.reader.take();
        self.last_sent.clear();
        self.port_registers.clear();
        self.decoder.reset();
    }
}

impl Drop for BridgeSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// Every open session, keyed by bridge id.
#[derive(Debug, Default)]
pub struct BridgeHub {
    sessions: HashMap<ObjectId, BridgeSession>,
    next_generation: u64,
}

impl BridgeHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a generation number for a new connection attempt.
    pub fn next_generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    /// Register an open session, closing any previous one for the same bridge.
    pub fn insert(&mut self, session: BridgeSession) {
        if let Some(mut old) = self.sessions.insert(session.bridge_id().clone(), session) {
            old.close();
        }
    }

    /// Close and forget the session of `bridge`.
    pub fn remove(&mut self, bridge: &ObjectId) -> bool {
        match self.sessions.remove(bridge) {
            Some(mut session) => {
                session.close();
                tracing::info!("Closed connection of bridge {}", bridge);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, bridge: &ObjectId) -> Option<&BridgeSession> {
        self.sessions.get(bridge)
    }

    pub fn get_mut(&mut self, bridge: &ObjectId) -> Option<&mut BridgeSession> {
        self.sessions.get_mut(bridge)
    }

    pub fn contains(&self, bridge: &ObjectId) -> bool {
        self.sessions.contains_key(bridge)
    }

    /// Whether `generation` is the live connection of `bridge`.
    pub fn is_current(&self, bridge: &ObjectId, generation: u64) -> bool {
        self.sessions
            .get(bridge)
            .is_some_and(|s| s.generation() == generation)
    }

    pub fn ids(&self) -> Vec<ObjectId> {
        self.sessions.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn close_all(&mut self) {
        for (id, mut session) in self.sessions.drain() {
            session.close();
            tracing::info!("Closed connection of bridge {}", id);
        }
    }
}
