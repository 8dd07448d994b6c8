//! Run parameters supplied by the surrounding pipeline.
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Spacecraft id of the photometer mission.
pub const DEFAULT_SPACECRAFT_ID: u8 = 227;

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("number of long cadences per baseline must be at least 1")]
    ZeroBaselineInterval,
    #[error("number of short cadences per long cadence must be at least 1")]
    ZeroShortCadencesPerLongCadence,
    #[error("virtual channel id {0} exceeds 6 bits")]
    InvalidVirtualChannelId(u8),
}

/// Parameters of one [crate::packer::DatasetPacker] run.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PackerConfig {
    pub photometer_config_id: u64,
    /// Id resolved by a [crate::huffman::CompressionTableStore].
    pub compression_table_id: u32,
    /// A new baseline is taken every this many long cadences.
    pub num_long_cadences_per_baseline: u32,
    pub num_short_cadences_per_long_cadence: u32,
    /// VTC of the first long and first short cadence in seconds.
    pub vtc_start: f64,
    pub long_cadence_vtc_increment: f64,
    pub short_cadence_vtc_increment: f64,
    /// SSR offset of the first dataset in 16 byte units.
    pub ssr_start_offset: u32,
    /// Mirror the raw cadence bytes of every data type into this directory.
    pub debug_dir: Option<PathBuf>,
}

impl Default for PackerConfig {
    fn default() -> Self {
        Self {
            photometer_config_id: 0,
            compression_table_id: 0,
            num_long_cadences_per_baseline: 48,
            num_short_cadences_per_long_cadence: 30,
            vtc_start: 0.0,
            long_cadence_vtc_increment: 1765.5,
            short_cadence_vtc_increment: 58.85,
            ssr_start_offset: 0,
            debug_dir: None,
        }
    }
}

impl PackerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_long_cadences_per_baseline == 0 {
            return Err(ConfigError::ZeroBaselineInterval);
        }
        if self.num_short_cadences_per_long_cadence == 0 {
            return Err(ConfigError::ZeroShortCadencesPerLongCadence);
        }
        Ok(())
    }

    /// Number of short cadences between two short cadence baselines.
    pub fn short_cadences_per_baseline(&self) -> u64 {
        self.num_long_cadences_per_baseline as u64 * self.num_short_cadences_per_long_cadence as u64
    }
}

/// Parameters of one [crate::vcdu::VcduFramer] run.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct VcduConfig {
    pub spacecraft_id: u8,
    /// 6 bit virtual channel id.
    pub virtual_channel_id: u8,
}

impl Default for VcduConfig {
    fn default() -> Self {
        Self {
            spacecraft_id: DEFAULT_SPACECRAFT_ID,
            virtual_channel_id: 0,
        }
    }
}

impl VcduConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.virtual_channel_id > 0x3F {
            return Err(ConfigError::InvalidVirtualChannelId(self.virtual_channel_id));
        }
        Ok(())
    }
}

/// Cadence files of one packer run in processing order. Each file holds one cadence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CadenceInputs {
    pub long_cadence: Vec<PathBuf>,
    pub short_cadence: Vec<PathBuf>,
    pub ffi: Vec<PathBuf>,
}
