//! # Photometer cadence downlink packetization
//!
//! This crate turns quantized photometer cadence data into the byte streams a downlink-replay
//! simulator consumes, and walks those streams back again. It contains the following
//! components:
//!
//!  - Bit-exact Huffman compression of baseline differences, see the [bits], [huffman] and
//!    [baseline] modules.
//!  - Science packets following the CCSDS Space Packet layout of
//!    [CCSDS Blue Book 133.0-B-2](https://public.ccsds.org/Pubs/133x0b2e1.pdf) with a 5-byte
//!    vehicle time code (VTC) secondary header, see the [ccsds], [vtc] and [writer] modules.
//!  - The [packer::DatasetPacker] which drives the baseline/residual/encoded cycle over long
//!    cadence, short cadence and FFI files, emitting a packet stream and a Storage Correlation
//!    Table (SCT) log, see [sct].
//!  - Fixed-size VCDU transfer frames with first header pointer bookkeeping and idle-packet
//!    padding, see [vcdu].
//!  - Readers which locate packets inside one or more CCSDS files by long cadence period or by
//!    VTC range, see [reader].
//!  - Decoding of packed datasets back into pixel values, see [decode].
//!
//! ## Features
//!
//! The run parameter structs in [config] and several plain data types optionally implement
//! [`serde`](https://serde.rs/) `Serialize` and `Deserialize` when the `serde` feature is
//! enabled.
//!
//! ## Example
//!
//! ```rust
//! use cadencepackets::ccsds::{PacketClass, PrimaryHeader};
//! use cadencepackets::ccsds::SequenceFlags;
//!
//! let apid = PacketClass::LongCadenceEncoded.apid();
//! let header = PrimaryHeader::new(apid, SequenceFlags::Unsegmented, 12, 41)
//!     .expect("Error creating primary header");
//! println!("{:?}", header);
//! ```

pub mod baseline;
pub mod bits;
pub mod ccsds;
pub mod config;
pub mod decode;
pub mod huffman;
pub mod packer;
pub mod persist;
pub mod reader;
pub mod sct;
pub mod seq_count;
pub mod source;
pub mod vcdu;
pub mod vtc;
pub mod writer;

pub use crate::ccsds::{PacketClass, PacketKind, SequenceFlags};
pub use crate::vtc::Vtc;

/// Generic error type when converting to and from raw byte slices.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ByteConversionError {
    /// The passed slice is too small. Returns the passed slice length and expected minimum size
    #[error("target slice with size {found} is too small, expected size of at least {expected}")]
    ToSliceTooSmall { found: usize, expected: usize },
    /// The provider buffer is too small. Returns the passed slice length and expected minimum size
    #[error("source slice with size {found} too small, expected at least {expected} bytes")]
    FromSliceTooSmall { found: usize, expected: usize },
    /// The [zerocopy] library failed to write to bytes
    #[error("zerocopy serialization error")]
    ZeroCopyToError,
    /// The [zerocopy] library failed to read from bytes
    #[error("zerocopy deserialization error")]
    ZeroCopyFromError,
}
