//! Value scaling between object properties and pin values.

/// Full-scale PWM duty value.
pub const PWM_MAX: u8 = 255;

/// Source range assumed for an output whose source declares no `min`/`max`.
pub const DEFAULT_SOURCE_RANGE: (f64, f64) = (0.0, 1023.0);

/// Largest raw reading for an ADC of `bits` resolution (clamped to 1..=14).
pub fn adc_full_scale(bits: u8) -> f64 {
    let bits = bits.clamp(1, 14);
    f64::from((1u16 << bits) - 1)
}

/// Rescale a raw ADC reading into `[min, max]`. Readings above full scale saturate.
pub fn scale_adc(raw: u16, bits: u8, min: f64, max: f64) -> f64 {
    let full = adc_full_scale(bits);
    let fraction = (f64::from(raw) / full).min(1.0);
    min + fraction * (max - min)
}

/// Map a digital input bit onto `{min, max}`.
pub fn digital_level(high: bool, min: f64, max: f64) -> f64 {
    if high {
        max
    } else {
        min
    }
}

/// Rescale `value` from `[src_min, src_max]` into a PWM duty in `0..=255`.
///
/// An empty source range yields 0.
pub fn to_pwm(value: f64, src_min: f64, src_max: f64) -> u8 {
    let range = src_max - src_min;
    if range == 0.0 || !value.is_finite() {
        return 0;
    }
    let duty = ((value - src_min) / range) * f64::from(PWM_MAX);
    duty.round().clamp(0.0, f64::from(PWM_MAX)) as u8
}

/// Digital output level of a property value.
pub fn is_high(value: f64) -> bool {
    value > 0.0
}

/// Set or clear bit `bit` of a port register.
pub fn with_bit(register: u8, bit: u8, high: bool) -> u8 {
    let mask = 1u8 << (bit & 0x07);
    if high {
        register | mask
    } else {
        register & !mask
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firmata::codec::{analog_message, Decoder, Message};
    use proptest::prelude::*;

    #[test]
    fn test_scale_adc_endpoints() {
        assert_eq!(scale_adc(0, 10, 0.0, 100.0), 0.0);
        assert_eq!(scale_adc(1023, 10, 0.0, 100.0), 100.0);
        assert_eq!(scale_adc(4095, 10, -1.0, 1.0), 1.0);
        assert_eq!(scale_adc(2047, 12, 0.0, 4095.0), 2047.0);
    }

    #[test]
    fn test_to_pwm_clamps() {
        assert_eq!(to_pwm(0.0, 0.0, 1023.0), 0);
        assert_eq!(to_pwm(1023.0, 0.0, 1023.0), 255);
        assert_eq!(to_pwm(2000.0, 0.0, 1023.0), 255);
        assert_eq!(to_pwm(-5.0, 0.0, 100.0), 0);
        assert_eq!(to_pwm(50.0, 0.0, 100.0), 128);
        assert_eq!(to_pwm(5.0, 5.0, 5.0), 0);
    }

    #[test]
    fn test_register_bits() {
        let reg = with_bit(0, 0, true);
        let reg = with_bit(reg, 2, true);
        assert_eq!(reg, 0b101);
        assert_eq!(with_bit(reg, 0, false), 0b100);
        assert!(is_high(0.1));
        assert!(!is_high(0.0));
        assert!(!is_high(-3.0));
    }

    proptest! {
        #[test]
        fn test_pwm_round_trip_within_one_unit(
            lo in -1000.0f64..1000.0,
            span in 1.0f64..5000.0,
            t in 0.0f64..=1.0,
        ) {
            let hi = lo + span;
            let x = lo + t * span;
            let duty = to_pwm(x, lo, hi);

            let mut decoder = Decoder::new();
            let msgs = decoder.feed(&analog_message(3, u16::from(duty)));
            let Some(Message::Analog { value, .. }) = msgs.first().copied() else {
                return Err(TestCaseError::fail("no analog message decoded"));
            };
            let back = scale_adc(value, 8, lo, hi);
            let unit = span / f64::from(PWM_MAX);
            prop_assert!((back - x).abs() <= unit, "x={} back={} unit={}", x, back, unit);
        }
    }
}
