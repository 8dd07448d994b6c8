//! Packet sources and byte level chunking.
//!
//! A [PacketSource] yields whole CCSDS packets. [ChunkReader] turns any source into a byte
//! stream read in fixed size chunks, reporting for every chunk where the first packet header
//! inside it begins. This is the bookkeeping the VCDU framer needs for its first header
//! pointer.
use crate::ccsds::{CcsdsPacket, PrimaryHeader, PRIMARY_HEADER_LEN};
use crate::reader::ReaderError;
use std::io::{self, Read};

/// Anything that yields CCSDS packets in order.
pub trait PacketSource {
    /// Return the next packet, or [None] at the end of the stream.
    fn next_packet(&mut self) -> Result<Option<&[u8]>, ReaderError>;
}

impl<S: PacketSource + ?Sized> PacketSource for &mut S {
    fn next_packet(&mut self) -> Result<Option<&[u8]>, ReaderError> {
        (**self).next_packet()
    }
}

/// Result of [ChunkReader::read_bytes].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct Chunk {
    /// Bytes written to the buffer. Less than the buffer length only at the end of the stream.
    pub len: usize,
    /// Offset of the first packet header which begins inside the chunk.
    pub first_header: Option<usize>,
}

impl Chunk {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Reads the packets of a [PacketSource] as a continuous byte stream.
pub struct ChunkReader<S> {
    source: S,
    packet: Vec<u8>,
    pos: usize,
    packets: u64,
}

impl<S: PacketSource> ChunkReader<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            packet: Vec::new(),
            pos: 0,
            packets: 0,
        }
    }

    /// Fill `buf`, crossing packet boundaries as needed.
    pub fn read_bytes(&mut self, buf: &mut [u8]) -> Result<Chunk, ReaderError> {
        let mut chunk = Chunk::default();
        while chunk.len < buf.len() {
            if self.pos == self.packet.len() {
                let Some(packet) = self.source.next_packet()? else {
                    break;
                };
                self.packet.clear();
                self.packet.extend_from_slice(packet);
                self.pos = 0;
                self.packets += 1;
                if self.packet.is_empty() {
                    continue;
                }
                chunk.first_header.get_or_insert(chunk.len);
            }
            let n = (buf.len() - chunk.len).min(self.packet.len() - self.pos);
            buf[chunk.len..chunk.len + n].copy_from_slice(&self.packet[self.pos..self.pos + n]);
            chunk.len += n;
            self.pos += n;
        }
        Ok(chunk)
    }

    /// Packets started so far.
    pub fn packets(&self) -> u64 {
        self.packets
    }

    pub fn into_inner(self) -> S {
        self.source
    }
}

/// Read until `buf` is full or the input ends. Returns the number of bytes read.
pub(crate) fn read_full(input: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match input.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Unpositioned packet source over a plain CCSDS byte stream.
pub struct PacketStream<R: Read> {
    input: R,
    packet: Vec<u8>,
    offset: u64,
}

impl<R: Read> PacketStream<R> {
    pub fn new(input: R) -> Self {
        Self {
            input,
            packet: Vec::new(),
            offset: 0,
        }
    }

    /// Stream offset of the next packet.
    pub fn offset(&self) -> u64 {
        self.offset
    }
}

impl<R: Read> PacketSource for PacketStream<R> {
    fn next_packet(&mut self) -> Result<Option<&[u8]>, ReaderError> {
        let mut raw = [0; PRIMARY_HEADER_LEN];
        let found = read_full(&mut self.input, &mut raw)?;
        if found == 0 {
            return Ok(None);
        }
        if found < PRIMARY_HEADER_LEN {
            return Err(ReaderError::TruncatedPacket {
                offset: self.offset,
                expected: PRIMARY_HEADER_LEN,
                found,
            });
        }
        let total_len = PrimaryHeader::from_bytes(&raw)?.total_len();
        self.packet.clear();
        self.packet.resize(total_len, 0);
        self.packet[0..PRIMARY_HEADER_LEN].copy_from_slice(&raw);
        let found = PRIMARY_HEADER_LEN
            + read_full(&mut self.input, &mut self.packet[PRIMARY_HEADER_LEN..])?;
        if found < total_len {
            return Err(ReaderError::TruncatedPacket {
                offset: self.offset,
                expected: total_len,
                found,
            });
        }
        self.offset += total_len as u64;
        Ok(Some(&self.packet))
    }
}
