//! Power saving mode timer encoding (3GPP TS 24.008).
//!
//! Both timer information elements are one octet: bits 8..6 select the unit,
//! bits 5..1 carry the binary coded number of units.
//!
//! GPRS Timer 3 (table 10.5.163a), used for the periodic TAU/RAU timer:
//!
//! | bits 8 7 6 | unit       |
//! |------------|------------|
//! | 0 0 0      | 10 minutes |
//! | 0 0 1      | 1 hour     |
//! | 0 1 0      | 10 hours   |
//! | 0 1 1      | 2 seconds  |
//! | 1 0 0      | 30 seconds |
//! | 1 0 1      | 1 minute   |
//! | 1 1 0      | 320 hours  |
//! | 1 1 1      | deactivated|
//!
//! GPRS Timer (table 10.5.172), used for the active time:
//!
//! | bits 8 7 6 | unit       |
//! |------------|------------|
//! | 0 0 0      | 2 seconds  |
//! | 0 0 1      | 1 minute   |
//! | 0 1 0      | decihours  |
//! | 1 1 1      | deactivated|

use core::fmt::{self, Write};
use static_assertions::const_assert;

/// Largest number of units the 5-bit value field can hold.
pub const TIMER_VALUE_MAX: u32 = 0x1f;
pub const TIMER_VALUE_BITS: u32 = 5;

const_assert!(TIMER_VALUE_MAX == (1 << TIMER_VALUE_BITS) - 1);

const MINUTE: u32 = 60;
const HOUR: u32 = 60 * MINUTE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerUnit {
    pub code: u8,
    pub seconds: u32,
}

impl TimerUnit {
    const fn new(code: u8, seconds: u32) -> Self {
        Self { code, seconds }
    }

    /// Longest duration representable without clamping.
    pub const fn capacity(self) -> u32 {
        self.seconds.saturating_mul(TIMER_VALUE_MAX)
    }
}

/// GPRS Timer 3 units, finest first.
pub const GPRS_TIMER_3_UNITS: [TimerUnit; 7] = [
    TimerUnit::new(0b011, 2),
    TimerUnit::new(0b100, 30),
    TimerUnit::new(0b101, MINUTE),
    TimerUnit::new(0b000, 10 * MINUTE),
    TimerUnit::new(0b001, HOUR),
    TimerUnit::new(0b010, 10 * HOUR),
    TimerUnit::new(0b110, 320 * HOUR),
];

/// GPRS Timer units, finest first.
pub const GPRS_TIMER_UNITS: [TimerUnit; 3] = [
    TimerUnit::new(0b000, 2),
    TimerUnit::new(0b001, MINUTE),
    TimerUnit::new(0b010, 6 * MINUTE),
];

/// An encoded timer information element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerValue(u8);

impl TimerValue {
    pub const DEACTIVATED: TimerValue = TimerValue(0b111 << TIMER_VALUE_BITS);

    pub const fn new(unit_code: u8, ticks: u8) -> Self {
        Self(((unit_code & 0b111) << TIMER_VALUE_BITS) | (ticks & TIMER_VALUE_MAX as u8))
    }

    pub const fn from_raw(raw: u8) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u8 {
        self.0
    }

    pub const fn unit_code(self) -> u8 {
        self.0 >> TIMER_VALUE_BITS
    }

    pub const fn ticks(self) -> u8 {
        self.0 & TIMER_VALUE_MAX as u8
    }

    /// The octet as eight `'0'`/`'1'` characters, most significant bit first.
    pub fn bits(self) -> heapless::String<8> {
        let mut bits = heapless::String::new();
        let _ = write!(bits, "{:08b}", self.0);
        bits
    }
}

impl fmt::Display for TimerValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08b}", self.0)
    }
}

fn ticks(seconds: u32, unit: TimerUnit) -> u32 {
    seconds.checked_div(unit.seconds).unwrap_or(0)
}

/// Encode `seconds` with the finest unit in `units` whose capacity covers it.
///
/// Durations beyond the coarsest unit's capacity are clamped to its maximum.
pub fn encode(seconds: u32, units: &[TimerUnit]) -> TimerValue {
    if let Some(unit) = units.iter().find(|unit| seconds <= unit.capacity()) {
        return TimerValue::new(unit.code, ticks(seconds, *unit) as u8);
    }
    match units.last() {
        Some(unit) => TimerValue::new(unit.code, ticks(seconds, *unit).min(TIMER_VALUE_MAX) as u8),
        None => TimerValue::DEACTIVATED,
    }
}

/// Periodic (T3412 extended) timer as a GPRS Timer 3 element.
pub fn encode_periodic(seconds: u32) -> TimerValue {
    encode(seconds, &GPRS_TIMER_3_UNITS)
}

/// Active (T3324) timer as a GPRS Timer element.
pub fn encode_active(seconds: u32) -> TimerValue {
    encode(seconds, &GPRS_TIMER_UNITS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_periodic_uses_two_second_unit_for_short_durations() {
        let value = encode_periodic(5);
        assert_eq!(value.unit_code(), 0b011);
        assert_eq!(value.ticks(), 2);
        assert_eq!(value.bits().as_str(), "01100010");
    }

    #[test]
    fn test_periodic_zero_is_zero_two_second_ticks() {
        assert_eq!(encode_periodic(0).bits().as_str(), "01100000");
    }

    #[test]
    fn test_periodic_unit_boundaries() {
        // 62 s is the last value in 2 s units, 63 s moves to 30 s units
        assert_eq!(encode_periodic(62), TimerValue::new(0b011, 31));
        assert_eq!(encode_periodic(63), TimerValue::new(0b100, 2));
        assert_eq!(encode_periodic(930), TimerValue::new(0b100, 31));
        assert_eq!(encode_periodic(931), TimerValue::new(0b101, 15));
        assert_eq!(encode_periodic(1860), TimerValue::new(0b101, 31));
    }

    #[test]
    fn test_periodic_3000_seconds_uses_ten_minute_unit() {
        let value = encode_periodic(3000);
        assert_eq!(value.unit_code(), 0b000);
        assert_eq!(value.ticks(), 5);
        assert_eq!(value.bits().as_str(), "00000101");
    }

    #[test]
    fn test_periodic_truncates_partial_units() {
        // Just past the 10 minute capacity
        let value = encode_periodic(18_601);
        assert_eq!(value.unit_code(), 0b001);
        assert_eq!(value.ticks(), 5);

        let value = encode_periodic(31 * 10 * HOUR + 1);
        assert_eq!(value.unit_code(), 0b110);
        assert_eq!(value.ticks(), 0);
    }

    #[test]
    fn test_periodic_clamps_coarsest_unit() {
        let value = encode_periodic(u32::MAX);
        assert_eq!(value.unit_code(), 0b110);
        assert_eq!(value.ticks(), 31);
        assert_eq!(value.bits().as_str(), "11011111");
    }

    #[test]
    fn test_active_units() {
        assert_eq!(encode_active(10).bits().as_str(), "00000101");
        assert_eq!(encode_active(120).bits().as_str(), "00100010");
    }

    #[test]
    fn test_active_decihours() {
        let value = encode_active(10_000);
        assert_eq!(value.unit_code(), 0b010);
        assert_eq!(value.ticks(), 27);
        assert_eq!(value.bits().as_str(), "01011011");
    }

    #[test]
    fn test_active_clamps_to_31_decihours() {
        let value = encode_active(50_000);
        assert_eq!(value.unit_code(), 0b010);
        assert_eq!(value.ticks(), 31);
    }

    #[test]
    fn test_empty_table_is_deactivated() {
        assert_eq!(encode(100, &[]), TimerValue::DEACTIVATED);
        assert_eq!(TimerValue::DEACTIVATED.to_string(), "11100000");
    }
}
