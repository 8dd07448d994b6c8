//! Virtual Channel Data Unit (VCDU) framing.
//!
//! A packet stream is cut into constant size frames of [VCDU_FRAME_LEN] bytes:
//!
//!  1. 2 bytes: version number `01`, 8 bit spacecraft id and 6 bit virtual channel id,
//!  2. 3 bytes: frame counter, wrapping at 2^24,
//!  3. 1 byte: signalling field, always 0,
//!  4. 2 bytes: M_PDU header, 5 spare bits followed by the 11 bit [FirstHeaderPointer],
//!  5. [VCDU_DATA_LEN] bytes of packet data.
//!
//! The stream is closed by padding the last partial frame with an idle packet and appending
//! one frame of idle fill. The synchronization marker is added further downstream.
use crate::ccsds::{idle_packet_header, IDLE_FILL, PRIMARY_HEADER_LEN};
use crate::config::{ConfigError, VcduConfig};
use crate::persist::{self, PersistError};
use crate::reader::{CcsdsReader, Positioning, ReaderError};
use crate::seq_count::{SequenceCountProvider, VcduFrameCounter, MAX_VCDU_COUNT};
use crate::source::{Chunk, ChunkReader, PacketSource};
use crate::ByteConversionError;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use zerocopy::AsBytes;

pub const VCDU_VERSION: u8 = 0b01;
pub const VCDU_HEADER_LEN: usize = core::mem::size_of::<zc::VcduHeader>();
pub const VCDU_DATA_LEN: usize = 1107;
pub const VCDU_FRAME_LEN: usize = VCDU_HEADER_LEN + VCDU_DATA_LEN;
pub const MAX_VIRTUAL_CHANNEL_ID: u8 = 0x3F;
pub const FHP_NO_HEADER: u16 = 0x7FF;
pub const FHP_IDLE: u16 = 0x7FE;

#[derive(Debug, thiserror::Error)]
pub enum VcduError {
    #[error("invalid vcdu version number {0}")]
    InvalidVersion(u8),
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("packet source error: {0}")]
    Reader(#[from] ReaderError),
    #[error("persisted state error: {0}")]
    Persist(#[from] PersistError),
    #[error("byte conversion error: {0}")]
    ByteConversion(#[from] ByteConversionError),
    #[error("vcdu output error: {0}")]
    Io(#[from] std::io::Error),
}

/// Location of the first packet header inside the frame data.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum FirstHeaderPointer {
    Offset(u16),
    /// The frame continues a packet which began in an earlier frame.
    NoHeader,
    /// The frame holds idle data only.
    Idle,
}

impl FirstHeaderPointer {
    pub fn raw(&self) -> u16 {
        match self {
            FirstHeaderPointer::Offset(offset) => *offset,
            FirstHeaderPointer::NoHeader => FHP_NO_HEADER,
            FirstHeaderPointer::Idle => FHP_IDLE,
        }
    }

    pub fn from_raw(raw: u16) -> Self {
        match raw & FHP_NO_HEADER {
            FHP_NO_HEADER => FirstHeaderPointer::NoHeader,
            FHP_IDLE => FirstHeaderPointer::Idle,
            offset => FirstHeaderPointer::Offset(offset),
        }
    }
}

impl From<Chunk> for FirstHeaderPointer {
    fn from(chunk: Chunk) -> Self {
        chunk
            .first_header
            .map_or(FirstHeaderPointer::NoHeader, |offset| {
                FirstHeaderPointer::Offset(offset as u16)
            })
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct VcduHeader {
    pub spacecraft_id: u8,
    virtual_channel_id: u8,
    frame_count: u32,
    pub first_header: FirstHeaderPointer,
}

impl VcduHeader {
    /// Returns [None] if the virtual channel id exceeds 6 bits or the frame count 24 bits.
    pub fn new(
        spacecraft_id: u8,
        virtual_channel_id: u8,
        frame_count: u32,
        first_header: FirstHeaderPointer,
    ) -> Option<Self> {
        if virtual_channel_id > MAX_VIRTUAL_CHANNEL_ID || frame_count > MAX_VCDU_COUNT {
            return None;
        }
        Some(Self {
            spacecraft_id,
            virtual_channel_id,
            frame_count,
            first_header,
        })
    }

    #[inline]
    pub fn virtual_channel_id(&self) -> u8 {
        self.virtual_channel_id
    }

    #[inline]
    pub fn frame_count(&self) -> u32 {
        self.frame_count
    }

    pub fn write_to_bytes(&self, buf: &mut [u8]) -> Result<usize, ByteConversionError> {
        if buf.len() < VCDU_HEADER_LEN {
            return Err(ByteConversionError::ToSliceTooSmall {
                found: buf.len(),
                expected: VCDU_HEADER_LEN,
            });
        }
        zc::VcduHeader::from(*self)
            .write_to(&mut buf[0..VCDU_HEADER_LEN])
            .ok_or(ByteConversionError::ZeroCopyToError)?;
        Ok(VCDU_HEADER_LEN)
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self, VcduError> {
        if buf.len() < VCDU_HEADER_LEN {
            return Err(ByteConversionError::FromSliceTooSmall {
                found: buf.len(),
                expected: VCDU_HEADER_LEN,
            }
            .into());
        }
        let raw = zc::VcduHeader::from_bytes(&buf[0..VCDU_HEADER_LEN])
            .ok_or(ByteConversionError::ZeroCopyFromError)?;
        if raw.version() != VCDU_VERSION {
            return Err(VcduError::InvalidVersion(raw.version()));
        }
        Ok(Self {
            spacecraft_id: raw.spacecraft_id(),
            virtual_channel_id: raw.virtual_channel_id(),
            frame_count: raw.frame_count(),
            first_header: FirstHeaderPointer::from_raw(raw.fhp()),
        })
    }
}

/// Frame counter carried between runs, tagged with the channel it belongs to.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FrameCounterState {
    pub next_frame: u32,
    pub channel_id: u8,
}

/// Cuts packet streams into frames of one virtual channel.
pub struct VcduFramer<W: Write> {
    config: VcduConfig,
    out: W,
    counter: VcduFrameCounter,
    frame: [u8; VCDU_FRAME_LEN],
    frames_written: u64,
}

impl<W: Write> VcduFramer<W> {
    /// Continue the counter of `prior` if it belongs to the configured channel, otherwise start
    /// at 0.
    pub fn new(
        config: VcduConfig,
        prior: Option<FrameCounterState>,
        out: W,
    ) -> Result<Self, VcduError> {
        config.validate()?;
        let counter = match prior {
            Some(state) if state.channel_id == config.virtual_channel_id => {
                VcduFrameCounter::resume(state.next_frame)
            }
            Some(state) => {
                tracing::warn!(
                    persisted = state.channel_id,
                    requested = config.virtual_channel_id,
                    "virtual channel changed, frame counter restarts at 0"
                );
                VcduFrameCounter::default()
            }
            None => VcduFrameCounter::default(),
        };
        Ok(Self {
            config,
            out,
            counter,
            frame: [0; VCDU_FRAME_LEN],
            frames_written: 0,
        })
    }

    /// Counter state to persist for the next run.
    pub fn state(&self) -> FrameCounterState {
        FrameCounterState {
            next_frame: self.counter.get(),
            channel_id: self.config.virtual_channel_id,
        }
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    /// Frame all packets of `source`, then close the stream with idle padding.
    pub fn pack<S: PacketSource>(&mut self, source: S) -> Result<FrameCounterState, VcduError> {
        let mut chunks = ChunkReader::new(source);
        let start_frames = self.frames_written;
        loop {
            let chunk = chunks.read_bytes(&mut self.frame[VCDU_HEADER_LEN..])?;
            if chunk.len == VCDU_DATA_LEN {
                self.write_frame(chunk.into())?;
                continue;
            }
            if !chunk.is_empty() {
                self.pad_last_frame(chunk)?;
            }
            break;
        }
        self.frame[VCDU_HEADER_LEN..].fill(IDLE_FILL);
        self.write_frame(FirstHeaderPointer::Idle)?;
        self.out.flush()?;
        tracing::info!(
            packets = chunks.packets(),
            frames = self.frames_written - start_frames,
            next_frame = self.counter.get(),
            "vcdu framing finished"
        );
        Ok(self.state())
    }

    /// Fill the rest of a partial frame with an idle packet. If not even the idle packet
    /// header fits, the idle packet extends over the whole next frame.
    fn pad_last_frame(&mut self, chunk: Chunk) -> Result<(), VcduError> {
        let remaining = VCDU_DATA_LEN - chunk.len;
        let fhp = chunk
            .first_header
            .map_or(FirstHeaderPointer::Offset(chunk.len as u16), |offset| {
                FirstHeaderPointer::Offset(offset as u16)
            });
        let data = &mut self.frame[VCDU_HEADER_LEN..];
        if remaining > PRIMARY_HEADER_LEN {
            let header = idle_packet_header(remaining);
            data[chunk.len..chunk.len + PRIMARY_HEADER_LEN].copy_from_slice(&header);
            data[chunk.len + PRIMARY_HEADER_LEN..].fill(IDLE_FILL);
            return self.write_frame(fhp);
        }
        let header = idle_packet_header(remaining + VCDU_DATA_LEN);
        data[chunk.len..].copy_from_slice(&header[..remaining]);
        self.write_frame(fhp)?;
        let data = &mut self.frame[VCDU_HEADER_LEN..];
        data[..PRIMARY_HEADER_LEN - remaining].copy_from_slice(&header[remaining..]);
        data[PRIMARY_HEADER_LEN - remaining..].fill(IDLE_FILL);
        self.write_frame(FirstHeaderPointer::NoHeader)
    }

    /// Write the frame buffer with a fresh header.
    fn write_frame(&mut self, first_header: FirstHeaderPointer) -> Result<(), VcduError> {
        let header = VcduHeader {
            spacecraft_id: self.config.spacecraft_id,
            virtual_channel_id: self.config.virtual_channel_id,
            frame_count: self.counter.get_and_increment(),
            first_header,
        };
        header.write_to_bytes(&mut self.frame)?;
        self.out.write_all(&self.frame)?;
        self.frames_written += 1;
        tracing::trace!(
            frame_count = header.frame_count,
            fhp = header.first_header.raw(),
            "wrote vcdu frame"
        );
        Ok(())
    }
}

/// Frame the selected packets of CCSDS files into a VCDU file. The frame counter is resumed
/// from and saved to the next-id file.
pub fn frame_files(
    config: VcduConfig,
    ccsds_files: Vec<PathBuf>,
    positioning: Positioning,
    vcdu_path: &Path,
    next_id_path: &Path,
) -> Result<FrameCounterState, VcduError> {
    let prior = persist::read_frame_counter_state(next_id_path)?;
    let reader = CcsdsReader::new(ccsds_files, positioning)?;
    let out = BufWriter::new(File::create(vcdu_path)?);
    let mut framer = VcduFramer::new(config, prior, out)?;
    let state = framer.pack(reader)?;
    persist::write_frame_counter_state(next_id_path, &state)?;
    Ok(state)
}

pub mod zc {
    use zerocopy::byteorder::NetworkEndian;
    use zerocopy::{AsBytes, FromBytes, FromZeroes, Unaligned, U16};

    #[derive(FromZeroes, FromBytes, AsBytes, Unaligned, Debug)]
    #[repr(C)]
    pub struct VcduHeader {
        id: U16<NetworkEndian>,
        frame_count: [u8; 3],
        signalling: u8,
        mpdu_header: U16<NetworkEndian>,
    }

    impl VcduHeader {
        pub fn from_bytes(slice: &[u8]) -> Option<Self> {
            Self::read_from(slice)
        }

        pub fn version(&self) -> u8 {
            (self.id.get() >> 14) as u8
        }

        pub fn spacecraft_id(&self) -> u8 {
            (self.id.get() >> 6) as u8
        }

        pub fn virtual_channel_id(&self) -> u8 {
            (self.id.get() & 0x3F) as u8
        }

        pub fn frame_count(&self) -> u32 {
            u32::from_be_bytes([0, self.frame_count[0], self.frame_count[1], self.frame_count[2]])
        }

        pub fn fhp(&self) -> u16 {
            self.mpdu_header.get() & super::FHP_NO_HEADER
        }
    }

    impl From<super::VcduHeader> for VcduHeader {
        fn from(header: super::VcduHeader) -> Self {
            let id = ((super::VCDU_VERSION as u16) << 14)
                | ((header.spacecraft_id as u16) << 6)
                | header.virtual_channel_id as u16;
            let count = header.frame_count.to_be_bytes();
            VcduHeader {
                id: U16::from(id),
                frame_count: [count[1], count[2], count[3]],
                signalling: 0,
                mpdu_header: U16::from(header.first_header.raw()),
            }
        }
    }
}

const _: () = assert!(VCDU_HEADER_LEN == 8);
const _: () = assert!(VCDU_FRAME_LEN == 1115);
