//! Assembly of science packets from filled payload buffers.
//!
//! A dataset is written as a run of maximal packets followed by one final packet. Maximal
//! packets always carry [MAX_PAYLOAD_LEN] payload bytes. The final packet is padded to at least
//! [MIN_PAYLOAD_LEN] bytes and then further, until sync word plus packet is a multiple of
//! [SSR_UNIT_LEN] bytes.
use crate::ccsds::{
    CcsdsPacket, PacketClass, PrimaryHeader, ScienceDataHeader, SecondaryHeader, SequenceFlags,
    MAX_PAYLOAD_LEN, MIN_PAYLOAD_LEN, PACKET_LEN_FIELD_OFFSET, PRIMARY_HEADER_LEN, SSR_UNIT_LEN,
    SYNC_WORD_LEN, TOTAL_HEADER_LEN,
};
use crate::seq_count::{CcsdsSimpleSeqCountProvider, SequenceCountProvider};
use crate::vtc::Vtc;
use crate::ByteConversionError;
use delegate::delegate;
use std::io::Write;

#[derive(Debug, thiserror::Error)]
pub enum PacketError {
    #[error("non-final packet payload has {found} bytes, expected exactly 16350")]
    NonMaximalPayload { found: usize },
    #[error("payload of {found} bytes exceeds the maximum of 16350")]
    PayloadTooLarge { found: usize },
    #[error("packet length field {field} does not match serialized length, expected {expected}")]
    LengthFieldMismatch { field: usize, expected: usize },
    #[error("invalid primary header fields apid {apid} sequence count {seq_count}")]
    InvalidHeader { apid: u16, seq_count: u16 },
    #[error("byte conversion error: {0}")]
    ByteConversion(#[from] ByteConversionError),
    #[error("packet output error: {0}")]
    Io(#[from] std::io::Error),
}

/// One wrapping 14-bit counter per [PacketClass].
#[derive(Debug, Clone, Default)]
pub struct PacketCounters {
    counters: [CcsdsSimpleSeqCountProvider; PacketClass::ALL.len()],
}

impl PacketCounters {
    /// Continue from persisted counts, given in [PacketClass::ALL] order.
    pub fn from_counts(counts: [u16; PacketClass::ALL.len()]) -> Self {
        Self {
            counters: counts.map(CcsdsSimpleSeqCountProvider::resume),
        }
    }

    pub fn get(&self, class: PacketClass) -> u16 {
        self.counters[class.index()].get()
    }

    /// Return the current count of `class` and advance it.
    pub fn next(&self, class: PacketClass) -> u16 {
        self.counters[class.index()].get_and_increment()
    }

    /// Current counts in [PacketClass::ALL] order.
    pub fn counts(&self) -> [u16; PacketClass::ALL.len()] {
        let mut counts = [0; PacketClass::ALL.len()];
        for (count, counter) in counts.iter_mut().zip(&self.counters) {
            *count = counter.get();
        }
        counts
    }
}

/// Fields which vary per packet besides the payload.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PacketParams {
    pub class: PacketClass,
    pub vtc: Vtc,
    pub photometer_config_id: u64,
    pub first_pixel_id: u32,
    pub pixel_count: u32,
}

/// Summary of a written packet.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct WrittenPacket {
    pub seq_flags: SequenceFlags,
    pub seq_count: u16,
    /// Serialized length without the sync word.
    pub len: usize,
    /// Sync word plus packet in [SSR_UNIT_LEN] byte units.
    pub ssr_units: u32,
}

/// Payload length of a final packet holding `len` payload bytes.
pub fn padded_final_payload_len(len: usize) -> usize {
    let payload = len.max(MIN_PAYLOAD_LEN);
    let total = SYNC_WORD_LEN + TOTAL_HEADER_LEN + payload;
    payload + (SSR_UNIT_LEN - total % SSR_UNIT_LEN) % SSR_UNIT_LEN
}

/// Serializes packets of consecutive datasets into one output stream.
pub struct CcsdsPacketWriter<W: Write> {
    out: W,
    counters: PacketCounters,
    packet: Vec<u8>,
    segment_idx: usize,
    packets_written: u64,
    bytes_written: u64,
}

impl<W: Write> CcsdsPacketWriter<W> {
    pub fn new(out: W, counters: PacketCounters) -> Self {
        Self {
            out,
            counters,
            packet: Vec::with_capacity(TOTAL_HEADER_LEN + MAX_PAYLOAD_LEN),
            segment_idx: 0,
            packets_written: 0,
            bytes_written: 0,
        }
    }

    delegate! {
        to self.counters {
            /// Sequence count the next packet of `class` will carry.
            #[call(get)]
            pub fn seq_count(&self, class: PacketClass) -> u16;
            pub fn counts(&self) -> [u16; PacketClass::ALL.len()];
        }
    }

    pub fn counters(&self) -> &PacketCounters {
        &self.counters
    }

    /// Restart segmentation. The next packet will be the first of a new dataset.
    pub fn begin_dataset(&mut self) {
        self.segment_idx = 0;
    }

    /// Write a packet which is followed by more packets of the same dataset. The payload must
    /// be exactly [MAX_PAYLOAD_LEN] bytes long.
    pub fn emit_middle(
        &mut self,
        params: &PacketParams,
        payload: &[u8],
    ) -> Result<WrittenPacket, PacketError> {
        if payload.len() != MAX_PAYLOAD_LEN {
            return Err(PacketError::NonMaximalPayload {
                found: payload.len(),
            });
        }
        let seq_flags = if self.segment_idx == 0 {
            SequenceFlags::FirstSegment
        } else {
            SequenceFlags::ContinuationSegment
        };
        self.emit(params, seq_flags, payload, MAX_PAYLOAD_LEN)
    }

    /// Write the last packet of a dataset, padding the payload as required.
    pub fn emit_final(
        &mut self,
        params: &PacketParams,
        payload: &[u8],
    ) -> Result<WrittenPacket, PacketError> {
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(PacketError::PayloadTooLarge {
                found: payload.len(),
            });
        }
        let seq_flags = if self.segment_idx == 0 {
            SequenceFlags::Unsegmented
        } else {
            SequenceFlags::LastSegment
        };
        let written = self.emit(
            params,
            seq_flags,
            payload,
            padded_final_payload_len(payload.len()),
        )?;
        self.segment_idx = 0;
        Ok(written)
    }

    /// Bytes of the packet written last.
    pub fn last_packet(&self) -> &[u8] {
        &self.packet
    }

    pub fn packets_written(&self) -> u64 {
        self.packets_written
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn flush(&mut self) -> Result<(), PacketError> {
        self.out.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn emit(
        &mut self,
        params: &PacketParams,
        seq_flags: SequenceFlags,
        payload: &[u8],
        payload_len: usize,
    ) -> Result<WrittenPacket, PacketError> {
        let total_len = TOTAL_HEADER_LEN + payload_len;
        let seq_count = self.counters.get(params.class);
        let apid = params.class.apid();
        let mut primary = PrimaryHeader::new(apid, seq_flags, seq_count, 0)
            .ok_or(PacketError::InvalidHeader { apid, seq_count })?;
        primary.set_total_len(total_len);

        self.packet.clear();
        self.packet.resize(total_len, 0);
        let mut idx = primary.write_to_bytes(&mut self.packet)?;
        idx += SecondaryHeader::new(params.vtc, params.class.kind())
            .write_to_bytes(&mut self.packet[idx..])?;
        idx += ScienceDataHeader {
            photometer_config_id: params.photometer_config_id,
            first_pixel_id: params.first_pixel_id,
            pixel_count: params.pixel_count,
        }
        .write_to_bytes(&mut self.packet[idx..])?;
        self.packet[idx..idx + payload.len()].copy_from_slice(payload);

        let field = PrimaryHeader::from_bytes(&self.packet[0..PRIMARY_HEADER_LEN])?.data_len();
        let expected = self.packet.len() - PACKET_LEN_FIELD_OFFSET;
        if field as usize != expected {
            return Err(PacketError::LengthFieldMismatch {
                field: field as usize,
                expected,
            });
        }

        self.out.write_all(&self.packet)?;
        self.counters.next(params.class);
        self.segment_idx += 1;
        self.packets_written += 1;
        self.bytes_written += total_len as u64;
        tracing::trace!(
            class = ?params.class,
            seq_count,
            ?seq_flags,
            len = total_len,
            "wrote packet"
        );
        Ok(WrittenPacket {
            seq_flags,
            seq_count,
            len: total_len,
            ssr_units: ((SYNC_WORD_LEN + total_len) / SSR_UNIT_LEN) as u32,
        })
    }
}
