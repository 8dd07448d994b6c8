//! Storage Correlation Table (SCT) log.
//!
//! For every dataset the packer writes, one fixed 24 byte record tells the ground system where
//! on the solid state recorder (SSR) the dataset starts and how long it is, both in
//! [SSR_UNIT_LEN] byte units. Offsets grow strictly within one log; joining the logs of several
//! runs and renumbering their offsets is done by an external tool.
use crate::ccsds::{PacketClass, SSR_UNIT_LEN};
use crate::vtc::Vtc;
use crate::ByteConversionError;
use std::io::{Read, Write};
use zerocopy::AsBytes;

pub const SCT_RECORD_LEN: usize = core::mem::size_of::<zc::SctRecord>();

#[derive(Debug, thiserror::Error)]
pub enum SctError {
    #[error("sct log ends with a truncated record of {found} bytes")]
    TruncatedRecord { found: usize },
    #[error("byte conversion error: {0}")]
    ByteConversion(#[from] ByteConversionError),
    #[error("sct log i/o error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SctEntry {
    pub log_vtc: Vtc,
    pub ssr_vtc: Vtc,
    pub app_id: u32,
    pub packet_kind: u8,
    /// Start of the dataset on the SSR in [SSR_UNIT_LEN] byte units.
    pub ssr_offset: u32,
    /// Length of the dataset including sync words in [SSR_UNIT_LEN] byte units.
    pub dataset_len: u32,
}

impl SctEntry {
    /// Byte offset of the dataset on the SSR.
    pub fn ssr_byte_offset(&self) -> u64 {
        self.ssr_offset as u64 * SSR_UNIT_LEN as u64
    }

    pub fn write_to_bytes(&self, buf: &mut [u8]) -> Result<usize, ByteConversionError> {
        if buf.len() < SCT_RECORD_LEN {
            return Err(ByteConversionError::ToSliceTooSmall {
                found: buf.len(),
                expected: SCT_RECORD_LEN,
            });
        }
        zc::SctRecord::from(*self)
            .write_to(&mut buf[0..SCT_RECORD_LEN])
            .ok_or(ByteConversionError::ZeroCopyToError)?;
        Ok(SCT_RECORD_LEN)
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self, ByteConversionError> {
        if buf.len() < SCT_RECORD_LEN {
            return Err(ByteConversionError::FromSliceTooSmall {
                found: buf.len(),
                expected: SCT_RECORD_LEN,
            });
        }
        let raw = zc::SctRecord::from_bytes(&buf[0..SCT_RECORD_LEN])
            .ok_or(ByteConversionError::ZeroCopyFromError)?;
        Ok(Self {
            log_vtc: Vtc::from_bytes(&raw.log_vtc)?,
            ssr_vtc: Vtc::from_bytes(&raw.ssr_vtc)?,
            app_id: raw.app_id.get(),
            packet_kind: raw.packet_kind,
            ssr_offset: raw.ssr_offset.get(),
            dataset_len: raw.dataset_len.get(),
        })
    }
}

/// Appends one record per dataset and keeps the running SSR offset.
pub struct SctLog<W: Write> {
    out: W,
    next_offset: u32,
    entries_written: u64,
}

impl<W: Write> SctLog<W> {
    /// `start_offset` is the SSR offset of the first dataset, in [SSR_UNIT_LEN] byte units.
    pub fn new(out: W, start_offset: u32) -> Self {
        Self {
            out,
            next_offset: start_offset,
            entries_written: 0,
        }
    }

    /// Record a dataset of `units` SSR units, starting at the current offset.
    pub fn append(
        &mut self,
        vtc: Vtc,
        class: PacketClass,
        units: u32,
    ) -> Result<SctEntry, SctError> {
        let entry = SctEntry {
            log_vtc: vtc,
            ssr_vtc: vtc,
            app_id: class.apid() as u32,
            packet_kind: class.kind().into(),
            ssr_offset: self.next_offset,
            dataset_len: units,
        };
        let mut raw = [0; SCT_RECORD_LEN];
        entry.write_to_bytes(&mut raw)?;
        self.out.write_all(&raw)?;
        self.next_offset = self.next_offset.wrapping_add(units);
        self.entries_written += 1;
        Ok(entry)
    }

    /// Offset the next dataset will be recorded at.
    pub fn next_offset(&self) -> u32 {
        self.next_offset
    }

    pub fn entries_written(&self) -> u64 {
        self.entries_written
    }

    pub fn flush(&mut self) -> Result<(), SctError> {
        self.out.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    /// Parse a complete log.
    pub fn read_all(mut input: impl Read) -> Result<Vec<SctEntry>, SctError> {
        let mut raw = Vec::new();
        input.read_to_end(&mut raw)?;
        let trailing = raw.len() % SCT_RECORD_LEN;
        if trailing != 0 {
            return Err(SctError::TruncatedRecord { found: trailing });
        }
        raw.chunks_exact(SCT_RECORD_LEN)
            .map(|record| SctEntry::from_bytes(record).map_err(SctError::from))
            .collect()
    }
}

pub mod zc {
    use crate::vtc::VTC_LEN;
    use zerocopy::byteorder::NetworkEndian;
    use zerocopy::{AsBytes, FromBytes, FromZeroes, Unaligned, U32};

    #[derive(FromZeroes, FromBytes, AsBytes, Unaligned, Debug)]
    #[repr(C)]
    pub struct SctRecord {
        pub(super) log_vtc: [u8; VTC_LEN],
        pub(super) ssr_vtc: [u8; VTC_LEN],
        pub(super) app_id: U32<NetworkEndian>,
        pub(super) packet_kind: u8,
        pub(super) ssr_offset: U32<NetworkEndian>,
        pub(super) dataset_len: U32<NetworkEndian>,
        pad: u8,
    }

    impl SctRecord {
        pub fn from_bytes(slice: &[u8]) -> Option<Self> {
            Self::read_from(slice)
        }
    }

    impl From<super::SctEntry> for SctRecord {
        fn from(entry: super::SctEntry) -> Self {
            SctRecord {
                log_vtc: entry.log_vtc.to_bytes(),
                ssr_vtc: entry.ssr_vtc.to_bytes(),
                app_id: U32::from(entry.app_id),
                packet_kind: entry.packet_kind,
                ssr_offset: U32::from(entry.ssr_offset),
                dataset_len: U32::from(entry.dataset_len),
                pad: 0,
            }
        }
    }
}

const _: () = assert!(SCT_RECORD_LEN == 24);
