//! Science packet headers.
//!
//! Every science packet consists of
//!
//!  1. a 6 byte CCSDS primary header according to
//!     [CCSDS 133.0-B-2](https://public.ccsds.org/Pubs/133x0b2e1.pdf),
//!  2. an 8 byte secondary header holding the 5 byte [Vtc], the [PacketKind] id and two spare
//!     bytes,
//!  3. a 16 byte science data header with the photometer configuration id, the id of the first
//!     pixel in the packet and the pixel count,
//!  4. the payload.
//!
//! The first two parts form the 14 byte header the readers parse. On the solid state recorder
//! (SSR) each packet is preceded by a 4 byte sync word, and packets are sized so that sync word
//! plus packet is a multiple of 16 bytes.
use crate::vtc::{Vtc, VTC_LEN};
use crate::ByteConversionError;
use num_enum::{IntoPrimitive, TryFromPrimitive};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use zerocopy::AsBytes;

pub const MAX_APID: u16 = 2u16.pow(11) - 1;
pub const MAX_SEQ_COUNT: u16 = 2u16.pow(14) - 1;
/// Version number of all supported packets.
pub const CCSDS_VERSION: u8 = 0b000;

pub const PRIMARY_HEADER_LEN: usize = core::mem::size_of::<zc::PrimaryHeader>();
pub const SECONDARY_HEADER_LEN: usize = core::mem::size_of::<zc::SecondaryHeader>();
/// Primary plus secondary header.
pub const CCSDS_HEADER_LEN: usize = PRIMARY_HEADER_LEN + SECONDARY_HEADER_LEN;
pub const SCIENCE_DATA_HEADER_LEN: usize = core::mem::size_of::<zc::ScienceDataHeader>();
/// All headers in front of the payload.
pub const TOTAL_HEADER_LEN: usize = CCSDS_HEADER_LEN + SCIENCE_DATA_HEADER_LEN;
/// Sync word preceding every packet on the SSR.
pub const SYNC_WORD_LEN: usize = 4;
/// Alignment of sync word plus packet.
pub const SSR_UNIT_LEN: usize = 16;
/// Largest packet, excluding the sync word.
pub const MAX_PACKET_LEN: usize = 16380;
pub const MAX_PAYLOAD_LEN: usize = MAX_PACKET_LEN - TOTAL_HEADER_LEN;
pub const MIN_PAYLOAD_LEN: usize = 14;
/// The packet length field holds the serialized length minus this value.
pub const PACKET_LEN_FIELD_OFFSET: usize = PRIMARY_HEADER_LEN + 1;

pub const APID_LONG_CADENCE: u16 = 40;
pub const APID_SHORT_CADENCE: u16 = 41;
pub const APID_FFI: u16 = 42;
pub const APID_IDLE: u16 = MAX_APID;

/// First four bytes of an idle packet: idle APID, unsegmented, sequence count 0.
pub const IDLE_HEADER_PREFIX: [u8; 4] = [0x07, 0xFF, 0xC0, 0x00];
/// Fill byte of idle packets and idle frames.
pub const IDLE_FILL: u8 = 0x5A;

#[derive(Debug, Copy, Clone, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[repr(u8)]
pub enum SequenceFlags {
    ContinuationSegment = 0b00,
    FirstSegment = 0b01,
    LastSegment = 0b10,
    Unsegmented = 0b11,
}

/// Cadence stream a packet belongs to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DataSetType {
    LongCadence,
    ShortCadence,
    Ffi,
}

impl DataSetType {
    pub const fn apid(&self) -> u16 {
        match self {
            DataSetType::LongCadence => APID_LONG_CADENCE,
            DataSetType::ShortCadence => APID_SHORT_CADENCE,
            DataSetType::Ffi => APID_FFI,
        }
    }

    pub fn from_apid(apid: u16) -> Option<Self> {
        match apid {
            APID_LONG_CADENCE => Some(DataSetType::LongCadence),
            APID_SHORT_CADENCE => Some(DataSetType::ShortCadence),
            APID_FFI => Some(DataSetType::Ffi),
            _ => None,
        }
    }

    pub const fn name(&self) -> &'static str {
        match self {
            DataSetType::LongCadence => "long-cadence",
            DataSetType::ShortCadence => "short-cadence",
            DataSetType::Ffi => "ffi",
        }
    }
}

/// Packet kind id carried in the secondary header.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[repr(u8)]
pub enum PacketKind {
    /// Uncompressed 16-bit quantization indices which become the new baseline.
    Baseline = 100,
    /// Compressed difference of a new baseline cadence against the previous baseline.
    ResidualBaseline = 101,
    /// Compressed difference of a cadence against the current baseline.
    Encoded = 102,
    /// Uncompressed 32-bit full frame image values.
    RawFfi = 103,
}

/// Combination of application id and packet kind. Each class has its own sequence counter.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum PacketClass {
    LongCadenceBaseline,
    LongCadenceResidual,
    LongCadenceEncoded,
    ShortCadenceBaseline,
    ShortCadenceResidual,
    ShortCadenceEncoded,
    FfiRaw,
}

impl PacketClass {
    /// All classes in the order used by the sequence counts file.
    pub const ALL: [PacketClass; 7] = [
        PacketClass::LongCadenceBaseline,
        PacketClass::LongCadenceResidual,
        PacketClass::LongCadenceEncoded,
        PacketClass::ShortCadenceBaseline,
        PacketClass::ShortCadenceResidual,
        PacketClass::ShortCadenceEncoded,
        PacketClass::FfiRaw,
    ];

    pub fn new(data_set_type: DataSetType, kind: PacketKind) -> Option<Self> {
        use DataSetType::*;
        use PacketKind::*;
        match (data_set_type, kind) {
            (LongCadence, Baseline) => Some(PacketClass::LongCadenceBaseline),
            (LongCadence, ResidualBaseline) => Some(PacketClass::LongCadenceResidual),
            (LongCadence, Encoded) => Some(PacketClass::LongCadenceEncoded),
            (ShortCadence, Baseline) => Some(PacketClass::ShortCadenceBaseline),
            (ShortCadence, ResidualBaseline) => Some(PacketClass::ShortCadenceResidual),
            (ShortCadence, Encoded) => Some(PacketClass::ShortCadenceEncoded),
            (Ffi, RawFfi) => Some(PacketClass::FfiRaw),
            _ => None,
        }
    }

    pub fn index(&self) -> usize {
        *self as usize
    }

    pub const fn data_set_type(&self) -> DataSetType {
        match self {
            PacketClass::LongCadenceBaseline
            | PacketClass::LongCadenceResidual
            | PacketClass::LongCadenceEncoded => DataSetType::LongCadence,
            PacketClass::ShortCadenceBaseline
            | PacketClass::ShortCadenceResidual
            | PacketClass::ShortCadenceEncoded => DataSetType::ShortCadence,
            PacketClass::FfiRaw => DataSetType::Ffi,
        }
    }

    pub const fn kind(&self) -> PacketKind {
        match self {
            PacketClass::LongCadenceBaseline | PacketClass::ShortCadenceBaseline => {
                PacketKind::Baseline
            }
            PacketClass::LongCadenceResidual | PacketClass::ShortCadenceResidual => {
                PacketKind::ResidualBaseline
            }
            PacketClass::LongCadenceEncoded | PacketClass::ShortCadenceEncoded => {
                PacketKind::Encoded
            }
            PacketClass::FfiRaw => PacketKind::RawFfi,
        }
    }

    #[inline]
    pub const fn apid(&self) -> u16 {
        self.data_set_type().apid()
    }
}

/// Errors when parsing the 14 byte science packet header.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HeaderError {
    #[error("unsupported ccsds version {0}")]
    UnsupportedVersion(u8),
    #[error("packet with apid {0} is not a telemetry packet")]
    NotTelemetry(u16),
    #[error("byte conversion error: {0}")]
    ByteConversion(#[from] ByteConversionError),
}

/// Generic trait to access fields of a primary header.
pub trait CcsdsPacket {
    fn ccsds_version(&self) -> u8;
    fn apid(&self) -> u16;
    fn sec_header_flag(&self) -> bool;
    fn seq_flags(&self) -> SequenceFlags;
    fn seq_count(&self) -> u16;
    /// Retrieve data length field
    fn data_len(&self) -> u16;

    /// Retrieve the total packet size based on the data length field
    #[inline]
    fn total_len(&self) -> usize {
        usize::from(self.data_len()) + PACKET_LEN_FIELD_OFFSET
    }

    #[inline]
    fn is_idle(&self) -> bool {
        self.apid() == APID_IDLE
    }
}

/// Primary header of a telemetry packet.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PrimaryHeader {
    /// CCSDS version field, occupies the first 3 bits of the raw header.
    pub version: u8,
    pub sec_header_flag: bool,
    apid: u16,
    pub seq_flags: SequenceFlags,
    seq_count: u16,
    pub data_len: u16,
}

impl PrimaryHeader {
    /// Returns [None] if the APID or sequence count exceed [MAX_APID] or [MAX_SEQ_COUNT].
    /// The secondary header flag is set.
    pub fn new(apid: u16, seq_flags: SequenceFlags, seq_count: u16, data_len: u16) -> Option<Self> {
        if apid > MAX_APID || seq_count > MAX_SEQ_COUNT {
            return None;
        }
        Some(Self {
            version: CCSDS_VERSION,
            sec_header_flag: true,
            apid,
            seq_flags,
            seq_count,
            data_len,
        })
    }

    /// Header of an idle packet spanning `total_len` bytes.
    pub fn idle(total_len: usize) -> Self {
        Self {
            version: CCSDS_VERSION,
            sec_header_flag: false,
            apid: APID_IDLE,
            seq_flags: SequenceFlags::Unsegmented,
            seq_count: 0,
            data_len: total_len.saturating_sub(PACKET_LEN_FIELD_OFFSET) as u16,
        }
    }

    /// Set the packet length field from the serialized packet length.
    pub fn set_total_len(&mut self, total_len: usize) {
        self.data_len = (total_len - PACKET_LEN_FIELD_OFFSET) as u16;
    }

    pub fn write_to_bytes(&self, buf: &mut [u8]) -> Result<usize, ByteConversionError> {
        if buf.len() < PRIMARY_HEADER_LEN {
            return Err(ByteConversionError::ToSliceTooSmall {
                found: buf.len(),
                expected: PRIMARY_HEADER_LEN,
            });
        }
        zc::PrimaryHeader::from(*self)
            .write_to(&mut buf[0..PRIMARY_HEADER_LEN])
            .ok_or(ByteConversionError::ZeroCopyToError)?;
        Ok(PRIMARY_HEADER_LEN)
    }

    pub fn to_bytes(&self) -> [u8; PRIMARY_HEADER_LEN] {
        let mut raw = [0; PRIMARY_HEADER_LEN];
        raw.copy_from_slice(zc::PrimaryHeader::from(*self).as_bytes());
        raw
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self, ByteConversionError> {
        if buf.len() < PRIMARY_HEADER_LEN {
            return Err(ByteConversionError::FromSliceTooSmall {
                found: buf.len(),
                expected: PRIMARY_HEADER_LEN,
            });
        }
        let zc_header = zc::PrimaryHeader::from_bytes(&buf[0..PRIMARY_HEADER_LEN])
            .ok_or(ByteConversionError::ZeroCopyFromError)?;
        Ok(Self::from(zc_header))
    }
}

impl CcsdsPacket for PrimaryHeader {
    #[inline]
    fn ccsds_version(&self) -> u8 {
        self.version
    }

    #[inline]
    fn apid(&self) -> u16 {
        self.apid
    }

    #[inline]
    fn sec_header_flag(&self) -> bool {
        self.sec_header_flag
    }

    #[inline]
    fn seq_flags(&self) -> SequenceFlags {
        self.seq_flags
    }

    #[inline]
    fn seq_count(&self) -> u16 {
        self.seq_count
    }

    #[inline]
    fn data_len(&self) -> u16 {
        self.data_len
    }
}

impl From<zc::PrimaryHeader> for PrimaryHeader {
    fn from(raw: zc::PrimaryHeader) -> Self {
        Self {
            version: raw.ccsds_version(),
            sec_header_flag: raw.sec_header_flag(),
            apid: raw.apid(),
            seq_flags: raw.seq_flags(),
            seq_count: raw.seq_count(),
            data_len: raw.data_len(),
        }
    }
}

/// Secondary header: time stamp and packet kind.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SecondaryHeader {
    pub vtc: Vtc,
    /// Raw packet kind id. Readers accept ids outside of [PacketKind].
    pub packet_kind: u8,
}

impl SecondaryHeader {
    pub fn new(vtc: Vtc, kind: PacketKind) -> Self {
        Self {
            vtc,
            packet_kind: kind.into(),
        }
    }

    pub fn kind(&self) -> Option<PacketKind> {
        PacketKind::try_from(self.packet_kind).ok()
    }

    pub fn write_to_bytes(&self, buf: &mut [u8]) -> Result<usize, ByteConversionError> {
        if buf.len() < SECONDARY_HEADER_LEN {
            return Err(ByteConversionError::ToSliceTooSmall {
                found: buf.len(),
                expected: SECONDARY_HEADER_LEN,
            });
        }
        zc::SecondaryHeader::from(*self)
            .write_to(&mut buf[0..SECONDARY_HEADER_LEN])
            .ok_or(ByteConversionError::ZeroCopyToError)?;
        Ok(SECONDARY_HEADER_LEN)
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self, ByteConversionError> {
        if buf.len() < SECONDARY_HEADER_LEN {
            return Err(ByteConversionError::FromSliceTooSmall {
                found: buf.len(),
                expected: SECONDARY_HEADER_LEN,
            });
        }
        let raw = zc::SecondaryHeader::from_bytes(&buf[0..SECONDARY_HEADER_LEN])
            .ok_or(ByteConversionError::ZeroCopyFromError)?;
        Ok(Self {
            vtc: Vtc::from_bytes(&raw.vtc)?,
            packet_kind: raw.packet_kind,
        })
    }
}

/// Science data header in front of the payload.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ScienceDataHeader {
    pub photometer_config_id: u64,
    pub first_pixel_id: u32,
    pub pixel_count: u32,
}

impl ScienceDataHeader {
    pub fn write_to_bytes(&self, buf: &mut [u8]) -> Result<usize, ByteConversionError> {
        if buf.len() < SCIENCE_DATA_HEADER_LEN {
            return Err(ByteConversionError::ToSliceTooSmall {
                found: buf.len(),
                expected: SCIENCE_DATA_HEADER_LEN,
            });
        }
        zc::ScienceDataHeader::from(*self)
            .write_to(&mut buf[0..SCIENCE_DATA_HEADER_LEN])
            .ok_or(ByteConversionError::ZeroCopyToError)?;
        Ok(SCIENCE_DATA_HEADER_LEN)
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self, ByteConversionError> {
        if buf.len() < SCIENCE_DATA_HEADER_LEN {
            return Err(ByteConversionError::FromSliceTooSmall {
                found: buf.len(),
                expected: SCIENCE_DATA_HEADER_LEN,
            });
        }
        let raw = zc::ScienceDataHeader::from_bytes(&buf[0..SCIENCE_DATA_HEADER_LEN])
            .ok_or(ByteConversionError::ZeroCopyFromError)?;
        Ok(Self {
            photometer_config_id: ((raw.config_id_upper.get() as u64) << 32)
                | raw.config_id_lower.get() as u64,
            first_pixel_id: raw.first_pixel_id.get(),
            pixel_count: raw.pixel_count.get(),
        })
    }
}

/// The 14 byte header read back from packet streams.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CcsdsHeader {
    pub primary: PrimaryHeader,
    pub secondary: SecondaryHeader,
}

impl CcsdsHeader {
    /// Parse the primary and secondary header. Only version 0 telemetry packets are accepted.
    pub fn from_bytes(buf: &[u8]) -> Result<Self, HeaderError> {
        if buf.len() < CCSDS_HEADER_LEN {
            return Err(ByteConversionError::FromSliceTooSmall {
                found: buf.len(),
                expected: CCSDS_HEADER_LEN,
            }
            .into());
        }
        let raw = zc::PrimaryHeader::from_bytes(&buf[0..PRIMARY_HEADER_LEN])
            .ok_or(ByteConversionError::ZeroCopyFromError)?;
        if raw.ccsds_version() != CCSDS_VERSION {
            return Err(HeaderError::UnsupportedVersion(raw.ccsds_version()));
        }
        if raw.is_telecommand() {
            return Err(HeaderError::NotTelemetry(raw.apid()));
        }
        Ok(Self {
            primary: PrimaryHeader::from(raw),
            secondary: SecondaryHeader::from_bytes(&buf[PRIMARY_HEADER_LEN..CCSDS_HEADER_LEN])?,
        })
    }

    #[inline]
    pub fn apid(&self) -> u16 {
        self.primary.apid()
    }

    #[inline]
    pub fn vtc(&self) -> Vtc {
        self.secondary.vtc
    }

    /// Serialized length of the whole packet, which is the length field plus 7.
    #[inline]
    pub fn packet_len(&self) -> usize {
        self.primary.total_len()
    }
}

pub mod zc {
    use super::SequenceFlags;
    use crate::vtc::VTC_LEN;
    use zerocopy::byteorder::NetworkEndian;
    use zerocopy::{AsBytes, FromBytes, FromZeroes, Unaligned, U16, U32};

    #[derive(FromZeroes, FromBytes, AsBytes, Unaligned, Debug)]
    #[repr(C)]
    pub struct PrimaryHeader {
        version_packet_id: U16<NetworkEndian>,
        psc: U16<NetworkEndian>,
        data_len: U16<NetworkEndian>,
    }

    impl PrimaryHeader {
        pub fn from_bytes(slice: &[u8]) -> Option<Self> {
            Self::read_from(slice)
        }

        pub fn ccsds_version(&self) -> u8 {
            ((self.version_packet_id.get() >> 13) as u8) & 0b111
        }

        pub fn is_telecommand(&self) -> bool {
            (self.version_packet_id.get() >> 12) & 0b1 == 1
        }

        pub fn sec_header_flag(&self) -> bool {
            (self.version_packet_id.get() >> 11) & 0b1 == 1
        }

        pub fn apid(&self) -> u16 {
            self.version_packet_id.get() & super::MAX_APID
        }

        pub fn seq_flags(&self) -> SequenceFlags {
            // Two bits always map to a variant.
            SequenceFlags::try_from((self.psc.get() >> 14) as u8).unwrap()
        }

        pub fn seq_count(&self) -> u16 {
            self.psc.get() & super::MAX_SEQ_COUNT
        }

        pub fn data_len(&self) -> u16 {
            self.data_len.get()
        }
    }

    impl From<super::PrimaryHeader> for PrimaryHeader {
        fn from(header: super::PrimaryHeader) -> Self {
            let packet_id = (((header.version & 0b111) as u16) << 13)
                | ((header.sec_header_flag as u16) << 11)
                | header.apid;
            PrimaryHeader {
                version_packet_id: U16::from(packet_id),
                psc: U16::from(((header.seq_flags as u16) << 14) | header.seq_count),
                data_len: U16::from(header.data_len),
            }
        }
    }

    #[derive(FromZeroes, FromBytes, AsBytes, Unaligned, Debug)]
    #[repr(C)]
    pub struct SecondaryHeader {
        pub(super) vtc: [u8; VTC_LEN],
        pub(super) packet_kind: u8,
        spare: U16<NetworkEndian>,
    }

    impl SecondaryHeader {
        pub fn from_bytes(slice: &[u8]) -> Option<Self> {
            Self::read_from(slice)
        }
    }

    impl From<super::SecondaryHeader> for SecondaryHeader {
        fn from(header: super::SecondaryHeader) -> Self {
            SecondaryHeader {
                vtc: header.vtc.to_bytes(),
                packet_kind: header.packet_kind,
                spare: U16::new(0),
            }
        }
    }

    #[derive(FromZeroes, FromBytes, AsBytes, Unaligned, Debug)]
    #[repr(C)]
    pub struct ScienceDataHeader {
        pub(super) config_id_upper: U32<NetworkEndian>,
        pub(super) config_id_lower: U32<NetworkEndian>,
        pub(super) first_pixel_id: U32<NetworkEndian>,
        pub(super) pixel_count: U32<NetworkEndian>,
    }

    impl ScienceDataHeader {
        pub fn from_bytes(slice: &[u8]) -> Option<Self> {
            Self::read_from(slice)
        }
    }

    impl From<super::ScienceDataHeader> for ScienceDataHeader {
        fn from(header: super::ScienceDataHeader) -> Self {
            ScienceDataHeader {
                config_id_upper: U32::from((header.photometer_config_id >> 32) as u32),
                config_id_lower: U32::from(header.photometer_config_id as u32),
                first_pixel_id: U32::from(header.first_pixel_id),
                pixel_count: U32::from(header.pixel_count),
            }
        }
    }
}

/// Raw header of an idle packet spanning `total_len` bytes.
pub fn idle_packet_header(total_len: usize) -> [u8; PRIMARY_HEADER_LEN] {
    PrimaryHeader::idle(total_len).to_bytes()
}

const _: () = assert!(PRIMARY_HEADER_LEN == 6);
const _: () = assert!(SECONDARY_HEADER_LEN == 3 + VTC_LEN);
const _: () = assert!(SCIENCE_DATA_HEADER_LEN == 16);
const _: () = assert!(MAX_PAYLOAD_LEN == 16350);
const _: () = assert!((SYNC_WORD_LEN + MAX_PACKET_LEN) % SSR_UNIT_LEN == 0);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seq_flag_helpers() {
        assert_eq!(
            SequenceFlags::try_from(0b00).expect("SEQ flag creation failed"),
            SequenceFlags::ContinuationSegment
        );
        assert_eq!(
            SequenceFlags::try_from(0b11).expect("SEQ flag creation failed"),
            SequenceFlags::Unsegmented
        );
        assert!(SequenceFlags::try_from(0b100).is_err());
    }

    #[test]
    fn test_packet_class_order_and_parts() {
        for (idx, class) in PacketClass::ALL.iter().enumerate() {
            assert_eq!(class.index(), idx);
            assert_eq!(
                PacketClass::new(class.data_set_type(), class.kind()),
                Some(*class)
            );
        }
        assert_eq!(PacketClass::FfiRaw.apid(), APID_FFI);
        assert_eq!(PacketClass::ShortCadenceEncoded.apid(), APID_SHORT_CADENCE);
        assert!(PacketClass::new(DataSetType::Ffi, PacketKind::Baseline).is_none());
        assert_eq!(DataSetType::from_apid(40), Some(DataSetType::LongCadence));
        assert_eq!(DataSetType::from_apid(7), None);
    }

    #[test]
    fn test_primary_header_layout() {
        let header =
            PrimaryHeader::new(APID_LONG_CADENCE, SequenceFlags::FirstSegment, 0x123, 16373)
                .unwrap();
        let raw = header.to_bytes();
        assert_eq!(raw, [0x08, 0x28, 0x41, 0x23, 0x3F, 0xF5]);
        let parsed = PrimaryHeader::from_bytes(&raw).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(parsed.total_len(), 16380);
        assert_eq!(parsed.seq_flags(), SequenceFlags::FirstSegment);
        assert_eq!(parsed.seq_count(), 0x123);
        assert!(parsed.sec_header_flag());
    }

    #[test]
    fn test_version_and_packet_type_are_checked() {
        let mut buf = [0u8; CCSDS_HEADER_LEN];
        let mut primary =
            PrimaryHeader::new(APID_LONG_CADENCE, SequenceFlags::Unsegmented, 1, 41).unwrap();
        primary.write_to_bytes(&mut buf).unwrap();
        assert_eq!(
            CcsdsHeader::from_bytes(&buf).unwrap().primary.ccsds_version(),
            0
        );

        primary.version = 0b001;
        primary.write_to_bytes(&mut buf).unwrap();
        assert_eq!(buf[0] >> 5, 0b001);
        assert_eq!(PrimaryHeader::from_bytes(&buf).unwrap().ccsds_version(), 1);
        assert_eq!(
            CcsdsHeader::from_bytes(&buf),
            Err(HeaderError::UnsupportedVersion(1))
        );

        primary.version = CCSDS_VERSION;
        primary.write_to_bytes(&mut buf).unwrap();
        // Packet type bit set: telecommand.
        buf[0] |= 0x10;
        assert_eq!(
            CcsdsHeader::from_bytes(&buf),
            Err(HeaderError::NotTelemetry(APID_LONG_CADENCE))
        );
    }

    #[test]
    fn test_invalid_primary_header() {
        assert!(PrimaryHeader::new(0x800, SequenceFlags::Unsegmented, 0, 0).is_none());
        assert!(PrimaryHeader::new(40, SequenceFlags::Unsegmented, 0x4000, 0).is_none());
    }

    #[test]
    fn test_idle_header() {
        let raw = idle_packet_header(100);
        assert_eq!(&raw[0..4], &IDLE_HEADER_PREFIX);
        assert_eq!(u16::from_be_bytes([raw[4], raw[5]]), 93);
        let parsed = PrimaryHeader::from_bytes(&raw).unwrap();
        assert!(parsed.is_idle());
        assert_eq!(parsed.total_len(), 100);
    }

    #[test]
    fn test_ccsds_header_round_trip() {
        let mut buf = [0u8; TOTAL_HEADER_LEN];
        let primary =
            PrimaryHeader::new(APID_SHORT_CADENCE, SequenceFlags::Unsegmented, 9, 41).unwrap();
        let secondary = SecondaryHeader::new(Vtc::new(1000, 5).unwrap(), PacketKind::Encoded);
        let sdh = ScienceDataHeader {
            photometer_config_id: 0x0102_0304_0506_0708,
            first_pixel_id: 17,
            pixel_count: 3,
        };
        let mut idx = primary.write_to_bytes(&mut buf).unwrap();
        idx += secondary.write_to_bytes(&mut buf[idx..]).unwrap();
        assert_eq!(idx, CCSDS_HEADER_LEN);
        idx += sdh.write_to_bytes(&mut buf[idx..]).unwrap();
        assert_eq!(idx, TOTAL_HEADER_LEN);
        assert_eq!(&buf[6..14], &[0, 0, 0x03, 0xE8, 5, 102, 0, 0]);
        assert_eq!(&buf[14..22], &[1, 2, 3, 4, 5, 6, 7, 8]);

        let header = CcsdsHeader::from_bytes(&buf).unwrap();
        assert_eq!(header.apid(), APID_SHORT_CADENCE);
        assert_eq!(header.vtc(), Vtc::new(1000, 5).unwrap());
        assert_eq!(header.secondary.kind(), Some(PacketKind::Encoded));
        assert_eq!(header.packet_len(), 48);
        assert_eq!(
            ScienceDataHeader::from_bytes(&buf[CCSDS_HEADER_LEN..]).unwrap(),
            sdh
        );
    }

    #[test]
    fn test_header_from_short_slice() {
        assert_eq!(
            CcsdsHeader::from_bytes(&[0; 13]),
            Err(HeaderError::ByteConversion(
                ByteConversionError::FromSliceTooSmall {
                    found: 13,
                    expected: 14
                }
            ))
        );
        let mut small = [0; 4];
        assert!(matches!(
            ScienceDataHeader {
                photometer_config_id: 0,
                first_pixel_id: 0,
                pixel_count: 0
            }
            .write_to_bytes(&mut small),
            Err(ByteConversionError::ToSliceTooSmall { .. })
        ));
    }
}
