//! Vehicle time code (VTC) handling.
//!
//! On the wire a VTC occupies 5 bytes: a 4 byte big-endian whole second counter followed by
//! one byte counting 4.096 ms fractions of a second. Stream positioning always compares the
//! quantized [Vtc], never the floating point seconds it was created from, so converting in
//! either direction goes through the same rounding rule.
use crate::ByteConversionError;
use core::fmt::{Display, Formatter};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Length of the raw VTC field.
pub const VTC_LEN: usize = 5;
/// Duration of one fractional VTC unit in seconds.
pub const VTC_FRACTION_SECS: f64 = 0.004096;
/// Largest fractional count below one second.
pub const MAX_VTC_FRACTION: u8 = 244;

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Vtc {
    seconds: u32,
    fraction: u8,
}

impl Vtc {
    pub const ZERO: Vtc = Vtc {
        seconds: 0,
        fraction: 0,
    };

    /// Returns [None] if the fractional count exceeds [MAX_VTC_FRACTION].
    pub const fn new(seconds: u32, fraction: u8) -> Option<Self> {
        if fraction > MAX_VTC_FRACTION {
            return None;
        }
        Some(Self { seconds, fraction })
    }

    /// Quantize floating point seconds to the nearest fractional unit. Negative and NaN input
    /// yields [Vtc::ZERO], input beyond the 32-bit second counter saturates.
    pub fn from_secs_f64(secs: f64) -> Self {
        if secs.is_nan() || secs <= 0.0 {
            return Self::ZERO;
        }
        if secs >= u32::MAX as f64 + 1.0 {
            return Self {
                seconds: u32::MAX,
                fraction: MAX_VTC_FRACTION,
            };
        }
        let whole = secs.floor();
        let fraction =
            (((secs - whole) / VTC_FRACTION_SECS).round() as u8).min(MAX_VTC_FRACTION);
        if fraction == MAX_VTC_FRACTION && whole < u32::MAX as f64 {
            // The next whole second may be closer than the last fractional unit.
            let to_next = whole + 1.0 - secs;
            let to_last = secs - (whole + MAX_VTC_FRACTION as f64 * VTC_FRACTION_SECS);
            if to_next < to_last {
                return Self {
                    seconds: whole as u32 + 1,
                    fraction: 0,
                };
            }
        }
        Self {
            seconds: whole as u32,
            fraction,
        }
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.seconds as f64 + self.fraction as f64 * VTC_FRACTION_SECS
    }

    #[inline]
    pub const fn seconds(&self) -> u32 {
        self.seconds
    }

    #[inline]
    pub const fn fraction(&self) -> u8 {
        self.fraction
    }

    /// Shift by whole seconds, saturating at the ends of the second counter.
    pub fn offset_secs(&self, delta: i64) -> Self {
        let shifted = (self.seconds as i64 + delta).clamp(0, u32::MAX as i64);
        Self {
            seconds: shifted as u32,
            fraction: self.fraction,
        }
    }

    pub fn to_bytes(&self) -> [u8; VTC_LEN] {
        let mut raw = [0; VTC_LEN];
        raw[0..4].copy_from_slice(&self.seconds.to_be_bytes());
        raw[4] = self.fraction;
        raw
    }

    pub fn write_to_bytes(&self, buf: &mut [u8]) -> Result<usize, ByteConversionError> {
        if buf.len() < VTC_LEN {
            return Err(ByteConversionError::ToSliceTooSmall {
                found: buf.len(),
                expected: VTC_LEN,
            });
        }
        buf[0..VTC_LEN].copy_from_slice(&self.to_bytes());
        Ok(VTC_LEN)
    }

    /// Parse a raw VTC. Fractional counts above [MAX_VTC_FRACTION] are kept as found so that
    /// comparisons on corrupted input stay monotonic in the raw bytes.
    pub fn from_bytes(buf: &[u8]) -> Result<Self, ByteConversionError> {
        if buf.len() < VTC_LEN {
            return Err(ByteConversionError::FromSliceTooSmall {
                found: buf.len(),
                expected: VTC_LEN,
            });
        }
        Ok(Self {
            seconds: u32::from_be_bytes(buf[0..4].try_into().unwrap()),
            fraction: buf[4],
        })
    }
}

impl From<f64> for Vtc {
    fn from(secs: f64) -> Self {
        Self::from_secs_f64(secs)
    }
}

impl Display for Vtc {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:.6}", self.as_secs_f64())
    }
}
