//! Huffman code tables for quantized pixel values and baseline differences.
//!
//! A table maps every key in `0..131072` to a variable length code. Keys are either raw
//! quantization indices or differences shifted into the non-negative range by
//! [crate::baseline::DIFF_BIAS]. Tables are resolved by id through a
//! [CompressionTableStore] and never change after loading.
use crate::bits::BitReader;
use core::fmt::{Display, Formatter};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Number of entries in every table.
pub const HUFFMAN_TABLE_LEN: usize = 131072;
/// Longest supported code.
pub const MAX_CODE_LEN: u8 = 32;

#[derive(Debug, thiserror::Error)]
pub enum HuffmanError {
    #[error("no huffman code for index {0}")]
    MissingCode(usize),
    #[error("huffman table {table_id} has no entry for index {index}")]
    TableGap { table_id: u32, index: usize },
    #[error("huffman table {table_id} has a duplicate entry for index {index}")]
    DuplicateEntry { table_id: u32, index: usize },
    #[error("invalid huffman code string {0:?}")]
    InvalidCodeString(String),
    #[error("huffman code length {0} not in 1..=32")]
    InvalidCodeLength(usize),
    #[error("malformed line {line} in table file {path:?}")]
    MalformedLine { path: PathBuf, line: usize },
    #[error("no code matches the bit sequence starting at bit {0}")]
    Undecodable(usize),
    #[error("table store i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Immutable code, stored as the bit pattern right-aligned in a [u32] plus its length.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct HuffmanCode {
    bits: u32,
    len: u8,
}

impl HuffmanCode {
    pub fn new(bits: u32, len: u8) -> Result<Self, HuffmanError> {
        if len == 0 || len > MAX_CODE_LEN {
            return Err(HuffmanError::InvalidCodeLength(len as usize));
        }
        if len < MAX_CODE_LEN && bits >> len != 0 {
            return Err(HuffmanError::InvalidCodeLength(
                (u32::BITS - bits.leading_zeros()) as usize,
            ));
        }
        Ok(Self { bits, len })
    }

    /// Parse an ASCII code string such as `"01101"`.
    pub fn parse(code: &str) -> Result<Self, HuffmanError> {
        if code.is_empty() || code.len() > MAX_CODE_LEN as usize {
            return Err(HuffmanError::InvalidCodeLength(code.len()));
        }
        let mut bits = 0u32;
        for c in code.bytes() {
            bits = match c {
                b'0' => bits << 1,
                b'1' => (bits << 1) | 1,
                _ => return Err(HuffmanError::InvalidCodeString(code.to_string())),
            };
        }
        Ok(Self {
            bits,
            len: code.len() as u8,
        })
    }

    #[inline]
    pub fn bits(&self) -> u32 {
        self.bits
    }

    #[inline]
    pub fn len(&self) -> u8 {
        self.len
    }
}

impl Display for HuffmanCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:0width$b}", self.bits, width = self.len as usize)
    }
}

/// External source of code tables.
pub trait CompressionTableStore {
    /// Return `(index, code string)` pairs for the table with the given id.
    fn load_codes(&self, table_id: u32) -> Result<Vec<(usize, String)>, HuffmanError>;
}

/// Store backed by a directory of `huffman-<id>.txt` files. Each non-empty line not starting
/// with `#` holds a decimal index and its code string separated by whitespace.
#[derive(Debug, Clone)]
pub struct DirectoryTableStore {
    dir: PathBuf,
}

impl DirectoryTableStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn table_path(&self, table_id: u32) -> PathBuf {
        self.dir.join(format!("huffman-{table_id}.txt"))
    }

    fn parse_file(path: &Path) -> Result<Vec<(usize, String)>, HuffmanError> {
        let text = fs::read_to_string(path)?;
        let mut entries = Vec::with_capacity(HUFFMAN_TABLE_LEN);
        for (line_idx, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let malformed = || HuffmanError::MalformedLine {
                path: path.to_path_buf(),
                line: line_idx + 1,
            };
            let mut fields = line.split_whitespace();
            let index = fields
                .next()
                .and_then(|f| f.parse::<usize>().ok())
                .ok_or_else(malformed)?;
            let code = fields.next().ok_or_else(malformed)?;
            if fields.next().is_some() {
                return Err(malformed());
            }
            entries.push((index, code.to_string()));
        }
        Ok(entries)
    }
}

impl CompressionTableStore for DirectoryTableStore {
    fn load_codes(&self, table_id: u32) -> Result<Vec<(usize, String)>, HuffmanError> {
        Self::parse_file(&self.table_path(table_id))
    }
}

#[derive(Debug, Clone)]
pub struct HuffmanTable {
    table_id: u32,
    codes: Vec<HuffmanCode>,
    lookups: u64,
    mean_code_len: f64,
}

impl HuffmanTable {
    /// Build a table from indexed codes. Every index in `0..HUFFMAN_TABLE_LEN` must be present
    /// exactly once.
    pub fn from_codes(
        table_id: u32,
        codes: impl IntoIterator<Item = (usize, HuffmanCode)>,
    ) -> Result<Self, HuffmanError> {
        let mut slots: Vec<Option<HuffmanCode>> = vec![None; HUFFMAN_TABLE_LEN];
        for (index, code) in codes {
            let slot = slots
                .get_mut(index)
                .ok_or(HuffmanError::MissingCode(index))?;
            if slot.is_some() {
                return Err(HuffmanError::DuplicateEntry { table_id, index });
            }
            *slot = Some(code);
        }
        let mut dense = Vec::with_capacity(HUFFMAN_TABLE_LEN);
        for (index, slot) in slots.into_iter().enumerate() {
            dense.push(slot.ok_or(HuffmanError::TableGap { table_id, index })?);
        }
        Ok(Self {
            table_id,
            codes: dense,
            lookups: 0,
            mean_code_len: 0.0,
        })
    }

    /// Resolve and parse the table with the given id.
    pub fn load(table_id: u32, store: &impl CompressionTableStore) -> Result<Self, HuffmanError> {
        let raw = store.load_codes(table_id)?;
        let mut parsed = Vec::with_capacity(raw.len());
        for (index, code) in raw {
            parsed.push((index, HuffmanCode::parse(&code)?));
        }
        let table = Self::from_codes(table_id, parsed)?;
        tracing::debug!(table_id, "loaded huffman table");
        Ok(table)
    }

    #[inline]
    pub fn table_id(&self) -> u32 {
        self.table_id
    }

    /// Look up the code for `index` and fold its length into the running mean.
    pub fn code(&mut self, index: usize) -> Result<HuffmanCode, HuffmanError> {
        let code = *self
            .codes
            .get(index)
            .ok_or(HuffmanError::MissingCode(index))?;
        self.lookups += 1;
        self.mean_code_len += (code.len() as f64 - self.mean_code_len) / self.lookups as f64;
        Ok(code)
    }

    /// Look up a code without touching the statistics.
    pub fn peek(&self, index: usize) -> Option<HuffmanCode> {
        self.codes.get(index).copied()
    }

    /// Mean length of all codes returned by [Self::code] so far.
    pub fn average_code_length(&self) -> f64 {
        self.mean_code_len
    }

    pub fn lookups(&self) -> u64 {
        self.lookups
    }

    pub fn decoder(&self) -> HuffmanDecoder {
        HuffmanDecoder {
            by_code: self
                .codes
                .iter()
                .enumerate()
                .map(|(index, code)| (*code, index as u32))
                .collect(),
        }
    }
}

/// Inverse lookup from codes to table indices.
#[derive(Debug, Clone)]
pub struct HuffmanDecoder {
    by_code: HashMap<HuffmanCode, u32>,
}

impl HuffmanDecoder {
    /// Decode the next index. Reading bit by bit, the shortest matching prefix wins.
    pub fn decode(&self, reader: &mut BitReader) -> Result<u32, HuffmanError> {
        let start = reader.bit_pos();
        let mut bits = 0u32;
        for len in 1..=MAX_CODE_LEN {
            let bit = reader.read_bit().ok_or(HuffmanError::Undecodable(start))?;
            bits = (bits << 1) | bit as u32;
            if let Some(index) = self.by_code.get(&HuffmanCode { bits, len }) {
                return Ok(*index);
            }
        }
        Err(HuffmanError::Undecodable(start))
    }
}


#[cfg(test)]
mod tests {
    use super::testutil::*;
    use super::*;
    use crate::bits::{BitPacker, PackStatus};
    use std::io::Write;

    #[test]
    fn test_parse_code() {
        let code = HuffmanCode::parse("01101").unwrap();
        assert_eq!(code.len(), 5);
        assert_eq!(code.bits(), 0b01101);
        assert_eq!(code.to_string(), "01101");
        assert!(matches!(
            HuffmanCode::parse("0120"),
            Err(HuffmanError::InvalidCodeString(_))
        ));
        assert!(matches!(
            HuffmanCode::parse(""),
            Err(HuffmanError::InvalidCodeLength(0))
        ));
        assert!(HuffmanCode::parse(&"1".repeat(33)).is_err());
    }

    #[test]
    fn test_new_rejects_oversized_pattern() {
        assert!(HuffmanCode::new(0b100, 2).is_err());
        assert!(HuffmanCode::new(0xFFFF_FFFF, 32).is_ok());
    }

    #[test]
    fn test_gap_is_load_error() {
        let mut codes = small_diff_codes();
        codes.remove(1000);
        let err = HuffmanTable::from_codes(3, codes).unwrap_err();
        assert!(matches!(
            err,
            HuffmanError::TableGap {
                table_id: 3,
                index: 1000
            }
        ));
    }

    #[test]
    fn test_duplicate_is_load_error() {
        let mut codes = small_diff_codes();
        codes.push((5, HuffmanCode::new(1, 1).unwrap()));
        assert!(matches!(
            HuffmanTable::from_codes(3, codes),
            Err(HuffmanError::DuplicateEntry { index: 5, .. })
        ));
    }

    #[test]
    fn test_out_of_range_lookup() {
        let mut table = small_diff_table();
        assert!(matches!(
            table.code(HUFFMAN_TABLE_LEN),
            Err(HuffmanError::MissingCode(131072))
        ));
    }

    #[test]
    fn test_running_average() {
        let mut table = small_diff_table();
        assert_eq!(table.average_code_length(), 0.0);
        table.code(65535).unwrap();
        assert_eq!(table.average_code_length(), 5.0);
        table.code(0).unwrap();
        assert!((table.average_code_length() - 11.5).abs() < 1e-12);
        table.code(65536).unwrap();
        assert!((table.average_code_length() - 28.0 / 3.0).abs() < 1e-12);
        assert_eq!(table.lookups(), 3);
    }

    #[test]
    fn test_decode_round_trip_all_keys() {
        let table = small_diff_table();
        let decoder = table.decoder();
        // No code is longer than 18 bits, so 3 bytes per key always suffice.
        let mut packer = BitPacker::new(HUFFMAN_TABLE_LEN * 3);
        for key in 0..HUFFMAN_TABLE_LEN {
            let code = table.peek(key).unwrap();
            assert_eq!(packer.add_bits(code.bits(), code.len()), PackStatus::Packed);
        }
        let flushed = packer.flush();
        let mut reader = BitReader::new(flushed.packed());
        for key in 0..HUFFMAN_TABLE_LEN {
            assert_eq!(decoder.decode(&mut reader).unwrap(), key as u32);
        }
        assert!(reader.remaining_bits() < 8);
    }

    #[test]
    fn test_directory_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryTableStore::new(dir.path());
        let mut file = std::fs::File::create(store.table_path(11)).unwrap();
        writeln!(file, "# generated").unwrap();
        for (index, code) in small_diff_codes() {
            writeln!(file, "{index} {code}").unwrap();
        }
        drop(file);
        let mut table = HuffmanTable::load(11, &store).unwrap();
        assert_eq!(table.table_id(), 11);
        assert_eq!(table.code(65535).unwrap(), HuffmanCode::new(8, 5).unwrap());
        assert!(matches!(
            HuffmanTable::load(12, &store),
            Err(HuffmanError::Io(_))
        ));
    }

    #[test]
    fn test_malformed_table_line() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryTableStore::new(dir.path());
        std::fs::write(store.table_path(1), "0 0101\nnot-a-number 11\n").unwrap();
        assert!(matches!(
            HuffmanTable::load(1, &store),
            Err(HuffmanError::MalformedLine { line: 2, .. })
        ));
    }
}
