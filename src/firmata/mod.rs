//! Firmata subset: pin modes, reporting, and analog/digital value messages.

pub mod codec;
pub mod scaling;

pub use codec::{
    analog_message, digital_message, report_analog, report_digital, set_pin_mode, Decoder,
    Message, PinMode, ANALOG_PIN_OFFSET,
};
