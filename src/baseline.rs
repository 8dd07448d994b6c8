//! Baselines and baseline differencing.
//!
//! A difference is shifted by [DIFF_BIAS] so that every possible value of
//! `sample - baseline` for two 16-bit quantization indices lands in `0..=131070`, which is the
//! key range of a [crate::huffman::HuffmanTable].

/// Bias added to every difference.
pub const DIFF_BIAS: u32 = 65535;

/// A cadence did not have the pixel count the baseline was established with.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cadence has {found} pixels, baseline has {expected}")]
pub struct SizeMismatchError {
    pub found: usize,
    pub expected: usize,
}

#[inline]
pub const fn diff(sample: u16, baseline: u16) -> u32 {
    sample as u32 + DIFF_BIAS - baseline as u32
}

/// Inverse of [diff]. Returns [None] for keys which no pair of 16-bit values produces.
#[inline]
pub fn undiff(diffed: u32, baseline: u16) -> Option<u16> {
    (diffed + baseline as u32)
        .checked_sub(DIFF_BIAS)
        .and_then(|v| u16::try_from(v).ok())
}

/// Quantization indices of the last baseline cadence, one per pixel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Baseline {
    values: Vec<u16>,
}

impl Baseline {
    pub fn new(values: Vec<u16>) -> Self {
        Self { values }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[inline]
    pub fn values(&self) -> &[u16] {
        &self.values
    }

    pub fn check_len(&self, samples: &[u16]) -> Result<(), SizeMismatchError> {
        if samples.len() != self.values.len() {
            return Err(SizeMismatchError {
                found: samples.len(),
                expected: self.values.len(),
            });
        }
        Ok(())
    }

    pub fn diff_all(&self, samples: &[u16]) -> Result<Vec<u32>, SizeMismatchError> {
        self.check_len(samples)?;
        Ok(samples
            .iter()
            .zip(&self.values)
            .map(|(s, b)| diff(*s, *b))
            .collect())
    }

    /// Replace the baseline values with a new cadence of identical length.
    pub fn replace(&mut self, samples: &[u16]) -> Result<(), SizeMismatchError> {
        self.check_len(samples)?;
        self.values.copy_from_slice(samples);
        Ok(())
    }
}
