//! Firmata wire codec.
//!
//! Wire format (one command byte, high bit set, followed by 7-bit data bytes):
//! ```text
//! ┌──────────────────────┬───────────────────────────────┐
//! │ 0xF4                 │ pin, mode                     │  set pin mode
//! │ 0xC0 | analogChannel │ enable                        │  analog reporting
//! │ 0xD0 | port          │ enable                        │  digital-port reporting
//! │ 0xE0 | pin           │ lsb(7), msb(7)                │  analog value (14 bit)
//! │ 0x90 | port          │ lsb(7), msb(7)                │  digital port (8 bit)
//! └──────────────────────┴───────────────────────────────┘
//! ```
//!
//! Encoders are pure functions returning the exact bytes to write. The
//! [`Decoder`] is the only stateful piece: a two-state parser that accumulates
//! the two data bytes of analog and digital reports across chunk boundaries.

/// Set pin mode command byte.
pub const SET_PIN_MODE: u8 = 0xF4;
/// Enable/disable analog reporting (low nibble = analog channel).
pub const REPORT_ANALOG: u8 = 0xC0;
/// Enable/disable digital-port reporting (low nibble = port).
pub const REPORT_DIGITAL: u8 = 0xD0;
/// Analog value message (low nibble = pin / channel).
pub const ANALOG_MESSAGE: u8 = 0xE0;
/// Digital port message (low nibble = port).
pub const DIGITAL_MESSAGE: u8 = 0x90;

/// Logical pin of analog channel 0 on the reference board.
pub const ANALOG_PIN_OFFSET: u8 = 14;

/// Pins per digital port.
pub const PINS_PER_PORT: u8 = 8;

/// Largest value a 14-bit two-byte payload can carry.
pub const MAX_14BIT: u16 = 0x3FFF;

const COMMAND_MASK: u8 = 0xF0;
const CHANNEL_MASK: u8 = 0x0F;
const DATA_MASK: u8 = 0x7F;

/// Pin modes understood by `SET_PIN_MODE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PinMode {
    Input = 0,
    Output = 1,
    Analog = 2,
    Pwm = 3,
}

// ==================== Encoders ====================

pub fn set_pin_mode(pin: u8, mode: PinMode) -> [u8; 3] {
    [SET_PIN_MODE, pin & DATA_MASK, mode as u8]
}

pub fn report_analog(channel: u8, enable: bool) -> [u8; 2] {
    [REPORT_ANALOG | (channel & CHANNEL_MASK), u8::from(enable)]
}

pub fn report_digital(port: u8, enable: bool) -> [u8; 2] {
    [REPORT_DIGITAL | (port & CHANNEL_MASK), u8::from(enable)]
}

/// Analog message carrying `value` (truncated to 14 bits).
pub fn analog_message(pin: u8, value: u16) -> [u8; 3] {
    let value = value & MAX_14BIT;
    [
        ANALOG_MESSAGE | (pin & CHANNEL_MASK),
        (value as u8) & DATA_MASK,
        ((value >> 7) as u8) & DATA_MASK,
    ]
}

/// Digital message carrying the full 8-bit register of `port`.
pub fn digital_message(port: u8, bits: u8) -> [u8; 3] {
    [
        DIGITAL_MESSAGE | (port & CHANNEL_MASK),
        bits & DATA_MASK,
        (bits >> 7) & DATA_MASK,
    ]
}

/// Port containing `pin`.
pub fn port_of(pin: u8) -> u8 {
    pin / PINS_PER_PORT
}

/// Bit index of `pin` within its port.
pub fn bit_of(pin: u8) -> u8 {
    pin % PINS_PER_PORT
}

/// Analog channel of a logical pin, if it lies at or above `offset`.
pub fn analog_channel(pin: u8, offset: u8) -> Option<u8> {
    pin.checked_sub(offset)
}

// ==================== Decoder ====================

/// A fully decoded inbound report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Message {
    /// Analog value for analog channel `channel`.
    Analog { channel: u8, value: u16 },
    /// Digital state of the 8 pins of `port`.
    Digital { port: u8, value: u16 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecoderState {
    /// Waiting for a command byte.
    Idle,
    /// Command received, accumulating its two data bytes.
    Collecting {
        command: u8,
        channel: u8,
        lsb: Option<u8>,
    },
}

/// Streaming decoder for analog and digital reports.
///
/// Data bytes seen while idle and unsupported commands are skipped. A command
/// byte arriving mid-message abandons the partial message and starts over at
/// that byte.
#[derive(Debug, Clone)]
pub struct Decoder {
    state: DecoderState,
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder {
    pub fn new() -> Self {
        Self {
            state: DecoderState::Idle,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.state == DecoderState::Idle
    }

    /// Feed one byte. Returns a message when this byte completes one.
    pub fn push(&mut self, byte: u8) -> Option<Message> {
        if byte & 0x80 != 0 {
            if !self.is_idle() {
                tracing::trace!("Decoder resync on command byte {:#04x}", byte);
            }
            self.state = match byte & COMMAND_MASK {
                ANALOG_MESSAGE | DIGITAL_MESSAGE => DecoderState::Collecting {
                    command: byte & COMMAND_MASK,
                    channel: byte & CHANNEL_MASK,
                    lsb: None,
                },
                _ => DecoderState::Idle,
            };
            return None;
        }

        match self.state {
            DecoderState::Idle => None,
            DecoderState::Collecting {
                command,
                channel,
                lsb: None,
            } => {
                self.state = DecoderState::Collecting {
                    command,
                    channel,
                    lsb: Some(byte),
                };
                None
            }
            DecoderState::Collecting {
                command,
                channel,
                lsb: Some(lsb),
            } => {
                self.state = DecoderState::Idle;
                let value = u16::from(lsb) | (u16::from(byte) << 7);
                match command {
                    ANALOG_MESSAGE => Some(Message::Analog { channel, value }),
                    _ => Some(Message::Digital {
                        port: channel,
                        value,
                    }),
                }
            }
        }
    }

    /// Feed a chunk, collecting every message it completes.
    pub fn feed(&mut self, data: &[u8]) -> Vec<Message> {
        data.iter().filter_map(|&b| self.push(b)).collect()
    }

    /// Reset decoder state (e.g. after a transport reconnect).
    pub fn reset(&mut self) {
        self.state = DecoderState::Idle;
    }
}
