//! Unpacking of datasets from a packet stream.
//!
//! This inverts [crate::packer::DatasetPacker]: the packets of one dataset are collected by
//! their sequence flags, the payload of every packet is read back with a [BitReader] and
//! compressed values are restored against the baseline they were differenced with.
use crate::baseline::undiff;
use crate::bits::BitReader;
use crate::ccsds::{
    CcsdsHeader, CcsdsPacket, DataSetType, HeaderError, PacketClass, PacketKind,
    ScienceDataHeader, SequenceFlags, CCSDS_HEADER_LEN, TOTAL_HEADER_LEN,
};
use crate::huffman::{HuffmanDecoder, HuffmanError};
use crate::vtc::Vtc;
use crate::ByteConversionError;

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("packet header error: {0}")]
    PacketHeader(#[from] HeaderError),
    #[error("science data header error: {0}")]
    ScienceHeader(#[from] ByteConversionError),
    #[error("apid {apid} with packet kind {kind} is not a science packet")]
    UnknownClass { apid: u16, kind: u8 },
    #[error("packet at offset {offset} has {found} bytes, header announces {expected}")]
    Truncated {
        offset: usize,
        expected: usize,
        found: usize,
    },
    #[error("unexpected sequence flags {flags:?} at offset {offset}")]
    UnexpectedSegment {
        offset: usize,
        flags: SequenceFlags,
    },
    #[error("packet at offset {offset} belongs to {found:?}, dataset is {expected:?}")]
    MixedPackets {
        offset: usize,
        expected: PacketClass,
        found: PacketClass,
    },
    #[error("payload of packet at offset {offset} ends before pixel {pixel}")]
    ShortPayload { offset: usize, pixel: u32 },
    #[error("compressed dataset without baseline")]
    MissingBaseline,
    #[error("pixel {pixel} is outside of the {len} pixel baseline")]
    BaselineMismatch { pixel: u32, len: usize },
    #[error("difference key {key} of pixel {pixel} yields no 16-bit value")]
    InvalidDifference { pixel: u32, key: u32 },
    #[error("huffman error: {0}")]
    Huffman(#[from] HuffmanError),
}

/// Values of a decoded dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedValues {
    /// Quantization indices of long or short cadence data.
    Quantized(Vec<u16>),
    Ffi(Vec<u32>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedDataset {
    pub class: PacketClass,
    pub vtc: Vtc,
    pub photometer_config_id: u64,
    /// Number of packets the dataset spanned.
    pub packets: usize,
    pub values: DecodedValues,
}

fn packet_class(header: &CcsdsHeader) -> Result<PacketClass, DecodeError> {
    let unknown = DecodeError::UnknownClass {
        apid: header.apid(),
        kind: header.secondary.packet_kind,
    };
    let Some(data_set_type) = DataSetType::from_apid(header.apid()) else {
        return Err(unknown);
    };
    header
        .secondary
        .kind()
        .and_then(|kind| PacketClass::new(data_set_type, kind))
        .ok_or(unknown)
}

/// Decode the dataset at the start of `stream`. `baseline` is required for residual and
/// encoded datasets. Returns the dataset and the number of bytes consumed.
pub fn unpack_dataset(
    stream: &[u8],
    decoder: &HuffmanDecoder,
    baseline: Option<&[u16]>,
) -> Result<(DecodedDataset, usize), DecodeError> {
    let mut offset = 0;
    let mut dataset: Option<DecodedDataset> = None;
    loop {
        let header = CcsdsHeader::from_bytes(&stream[offset.min(stream.len())..])?;
        let len = header.packet_len();
        let found = stream.len() - offset;
        if found < len || len < TOTAL_HEADER_LEN {
            return Err(DecodeError::Truncated {
                offset,
                expected: len,
                found,
            });
        }
        let packet = &stream[offset..offset + len];
        let class = packet_class(&header)?;
        let flags = header.primary.seq_flags();
        let starts = matches!(
            flags,
            SequenceFlags::FirstSegment | SequenceFlags::Unsegmented
        );
        if starts != dataset.is_none() {
            return Err(DecodeError::UnexpectedSegment { offset, flags });
        }
        let science = ScienceDataHeader::from_bytes(&packet[CCSDS_HEADER_LEN..])?;
        let dataset = dataset.get_or_insert_with(|| DecodedDataset {
            class,
            vtc: header.vtc(),
            photometer_config_id: science.photometer_config_id,
            packets: 0,
            values: match class.kind() {
                PacketKind::RawFfi => DecodedValues::Ffi(Vec::new()),
                _ => DecodedValues::Quantized(Vec::new()),
            },
        });
        if dataset.class != class {
            return Err(DecodeError::MixedPackets {
                offset,
                expected: dataset.class,
                found: class,
            });
        }
        let mut reader = BitReader::new(&packet[TOTAL_HEADER_LEN..]);
        let pixels = science.first_pixel_id..science.first_pixel_id + science.pixel_count;
        let short = |pixel| DecodeError::ShortPayload { offset, pixel };
        match (&mut dataset.values, class.kind()) {
            (DecodedValues::Ffi(values), _) => {
                for pixel in pixels {
                    values.push(reader.read_bits(32).ok_or_else(|| short(pixel))?);
                }
            }
            (DecodedValues::Quantized(values), PacketKind::Baseline) => {
                for pixel in pixels {
                    values.push(reader.read_bits(16).ok_or_else(|| short(pixel))? as u16);
                }
            }
            (DecodedValues::Quantized(values), _) => {
                let baseline = baseline.ok_or(DecodeError::MissingBaseline)?;
                for pixel in pixels {
                    let base = *baseline.get(pixel as usize).ok_or(
                        DecodeError::BaselineMismatch {
                            pixel,
                            len: baseline.len(),
                        },
                    )?;
                    let key = decoder.decode(&mut reader)?;
                    let value =
                        undiff(key, base).ok_or(DecodeError::InvalidDifference { pixel, key })?;
                    values.push(value);
                }
            }
        }
        dataset.packets += 1;
        offset += len;
        if matches!(flags, SequenceFlags::LastSegment | SequenceFlags::Unsegmented) {
            break;
        }
    }
    let dataset = dataset.ok_or(DecodeError::Truncated {
        offset,
        expected: TOTAL_HEADER_LEN,
        found: 0,
    })?;
    Ok((dataset, offset))
}

/// Decodes a whole packet stream, tracking the long and short cadence baselines.
#[derive(Debug, Clone)]
pub struct DatasetDecoder {
    decoder: HuffmanDecoder,
    long_cadence: Option<Vec<u16>>,
    short_cadence: Option<Vec<u16>>,
}

impl DatasetDecoder {
    pub fn new(decoder: HuffmanDecoder) -> Self {
        Self {
            decoder,
            long_cadence: None,
            short_cadence: None,
        }
    }

    pub fn baseline(&self, data_set_type: DataSetType) -> Option<&[u16]> {
        match data_set_type {
            DataSetType::LongCadence => self.long_cadence.as_deref(),
            DataSetType::ShortCadence => self.short_cadence.as_deref(),
            DataSetType::Ffi => None,
        }
    }

    /// Decode the next dataset of `stream`, or [None] if it is empty. Baseline datasets
    /// replace the baseline of their stream.
    pub fn next_dataset(
        &mut self,
        stream: &[u8],
    ) -> Result<Option<(DecodedDataset, usize)>, DecodeError> {
        if stream.is_empty() {
            return Ok(None);
        }
        let class = packet_class(&CcsdsHeader::from_bytes(stream)?)?;
        let data_set_type = class.data_set_type();
        let (dataset, consumed) =
            unpack_dataset(stream, &self.decoder, self.baseline(data_set_type))?;
        if let (PacketKind::Baseline, DecodedValues::Quantized(values)) =
            (class.kind(), &dataset.values)
        {
            let slot = match data_set_type {
                DataSetType::LongCadence => &mut self.long_cadence,
                _ => &mut self.short_cadence,
            };
            *slot = Some(values.clone());
        }
        tracing::trace!(class = ?dataset.class, vtc = %dataset.vtc, consumed, "decoded dataset");
        Ok(Some((dataset, consumed)))
    }

    /// Decode every dataset of `stream`.
    pub fn decode_all(&mut self, mut stream: &[u8]) -> Result<Vec<DecodedDataset>, DecodeError> {
        let mut datasets = Vec::new();
        while let Some((dataset, consumed)) = self.next_dataset(stream)? {
            datasets.push(dataset);
            stream = &stream[consumed..];
        }
        Ok(datasets)
    }
}
