//! Positioned reading of packets from one or more CCSDS files.
//!
//! The [CcsdsReader] walks a list of files as one continuous packet stream. Which packets it
//! hands out is decided by its [Positioning]:
//!
//!  - [Positioning::All] hands out every packet.
//!  - [Positioning::ByPeriod] counts long cadence periods. A period begins whenever a short
//!    cadence packet directly follows a long cadence packet. Packets are handed out from the
//!    start period up to, but excluding, the end period.
//!  - [Positioning::ByVtc] walks a list of VTC ranges. For each range the reader seeks to the
//!    first packet at or after the range start and hands out packets until one is at or after
//!    the range end. If a range starts before the end of the previous one, the reader rewinds
//!    to the last file whose first packet is not after the new start.
//!
//! Running out of files is only an error if a bounded end was requested but not reached, or if
//! a start was never found.
//!
//! Compressed datasets can only be restored against the baseline dataset they were differenced
//! with, which may lie in an earlier file or before the window. The reader therefore keeps a
//! [DatasetMark] of the latest long and short cadence baseline dataset across file switches, and
//! snapshots them when a window starts. [CcsdsReader::read_dataset_at] reads a marked dataset
//! back.
use crate::ccsds::{
    CcsdsHeader, CcsdsPacket, DataSetType, HeaderError, PacketKind, PrimaryHeader, SequenceFlags,
    APID_LONG_CADENCE, APID_SHORT_CADENCE, CCSDS_HEADER_LEN,
};
use crate::source::{read_full, PacketSource, PacketStream};
use crate::vtc::Vtc;
use crate::ByteConversionError;
use std::fs::File;
use std::io::{BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Shift applied to bounded VTC range limits before seeking. Packet time stamps were observed
/// to run 16 seconds ahead of the requested times. The value is carried as found and has not
/// been verified against the flight timing.
pub const VTC_RANGE_ADJUSTMENT_SECS: i64 = -16;

#[derive(Debug, thiserror::Error)]
pub enum ReaderError {
    #[error("no input files given")]
    NoInputFiles,
    #[error("cannot open {path:?}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("truncated packet at offset {offset}: expected {expected} bytes, found {found}")]
    TruncatedPacket {
        offset: u64,
        expected: usize,
        found: usize,
    },
    #[error(
        "{path:?}: truncated packet at offset {offset}: expected {expected} bytes, found {found}"
    )]
    TruncatedFile {
        path: PathBuf,
        offset: u64,
        expected: usize,
        found: usize,
    },
    #[error("packet length {0} is shorter than the header")]
    PacketTooShort(usize),
    #[error("no packets between {start} and {end}")]
    EmptyTimespan { start: Bound, end: Bound },
    #[error("input ended before reaching {end}")]
    EndNotReached { end: Bound },
    #[error("input ended before reaching start {start}")]
    StartNotFound { start: Bound },
    #[error("dataset starting at offset {offset} of {path:?} has no last segment")]
    IncompleteDataset { path: PathBuf, offset: u64 },
    #[error("packet header error: {0}")]
    Header(#[from] HeaderError),
    #[error("byte conversion error: {0}")]
    ByteConversion(#[from] ByteConversionError),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// A range limit as reported in errors.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Bound {
    AnyTime,
    Vtc(Vtc),
    Period(u64),
    LastPeriod,
}

impl core::fmt::Display for Bound {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Bound::AnyTime => write!(f, "any time"),
            Bound::Vtc(vtc) => write!(f, "VTC {vtc}"),
            Bound::Period(period) => write!(f, "period {period}"),
            Bound::LastPeriod => write!(f, "last period"),
        }
    }
}

impl From<Option<Vtc>> for Bound {
    fn from(vtc: Option<Vtc>) -> Self {
        vtc.map_or(Bound::AnyTime, Bound::Vtc)
    }
}

/// End of a period window.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PeriodEnd {
    /// Read to the end of the last file.
    Last,
    /// Stop before the first packet of this period.
    Period(u64),
}

/// A VTC window. [None] means any time.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct VtcRange {
    pub start: Option<Vtc>,
    pub end: Option<Vtc>,
}

impl VtcRange {
    pub fn new(start: Option<Vtc>, end: Option<Vtc>) -> Self {
        Self { start, end }
    }

    /// Range between two times in seconds.
    pub fn from_secs(start: f64, end: f64) -> Self {
        Self {
            start: Some(Vtc::from_secs_f64(start)),
            end: Some(Vtc::from_secs_f64(end)),
        }
    }

    fn adjusted(&self) -> Self {
        Self {
            start: self
                .start
                .map(|vtc| vtc.offset_secs(VTC_RANGE_ADJUSTMENT_SECS)),
            end: self.end.map(|vtc| vtc.offset_secs(VTC_RANGE_ADJUSTMENT_SECS)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Positioning {
    All,
    ByPeriod { start: u64, end: PeriodEnd },
    ByVtc { ranges: Vec<VtcRange> },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Phase {
    Seeking,
    Emitting,
    Done,
}

/// The active window, copied out of [Positioning].
#[derive(Debug, Copy, Clone)]
enum Window {
    All,
    Period { start: u64, end: PeriodEnd },
    Vtc { range: Option<VtcRange>, num_ranges: usize },
}

/// Location of the first packet of a dataset.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DatasetMark {
    /// Index into the file list of the reader.
    pub file_idx: usize,
    /// Byte offset of the packet inside its file.
    pub offset: u64,
    pub vtc: Vtc,
}

/// Slot of the baseline marks of a data set type. FFI data has no baselines.
fn baseline_slot(data_set_type: DataSetType) -> Option<usize> {
    match data_set_type {
        DataSetType::LongCadence => Some(0),
        DataSetType::ShortCadence => Some(1),
        DataSetType::Ffi => None,
    }
}

/// A packet read from the current file.
#[derive(Debug, Copy, Clone)]
struct PacketInfo {
    header: CcsdsHeader,
    period: u64,
}

pub struct CcsdsReader {
    files: Vec<PathBuf>,
    file_idx: Option<usize>,
    input: Option<BufReader<File>>,
    file_offset: u64,
    first_vtcs: Vec<Option<Vtc>>,
    opened: Vec<usize>,
    positioning: Positioning,
    packet: Vec<u8>,
    /// Packet in `packet` which was read but not handed out.
    pending: Option<PacketInfo>,
    period: u64,
    last_apid: Option<u16>,
    phase: Phase,
    range_idx: usize,
    /// Adjusted end of the range before the current one, if a range ended.
    prev_end: Option<Option<Vtc>>,
    packets_in_span: u64,
    packets_read: u64,
    /// Latest long and short cadence baseline datasets read.
    baselines: [Option<DatasetMark>; 2],
    /// Baselines in effect at the start of the current window.
    window_baselines: [Option<DatasetMark>; 2],
}

impl CcsdsReader {
    pub fn new(files: Vec<PathBuf>, positioning: Positioning) -> Result<Self, ReaderError> {
        if files.is_empty() {
            return Err(ReaderError::NoInputFiles);
        }
        let phase = match &positioning {
            Positioning::ByVtc { ranges } if ranges.is_empty() => Phase::Done,
            _ => Phase::Seeking,
        };
        Ok(Self {
            first_vtcs: vec![None; files.len()],
            files,
            file_idx: None,
            input: None,
            file_offset: 0,
            opened: Vec::new(),
            positioning,
            packet: Vec::new(),
            pending: None,
            period: 0,
            last_apid: None,
            phase,
            range_idx: 0,
            prev_end: None,
            packets_in_span: 0,
            packets_read: 0,
            baselines: [None; 2],
            window_baselines: [None; 2],
        })
    }

    pub fn positioning(&self) -> &Positioning {
        &self.positioning
    }

    /// Indices of the files opened so far, in opening order.
    pub fn opened_files(&self) -> &[usize] {
        &self.opened
    }

    /// Long cadence period of the packet read last.
    pub fn period(&self) -> u64 {
        self.period
    }

    /// Packets read from the files, handed out or not.
    pub fn packets_read(&self) -> u64 {
        self.packets_read
    }

    /// Cached VTC of the first packet of each file opened so far.
    pub fn first_vtcs(&self) -> &[Option<Vtc>] {
        &self.first_vtcs
    }

    /// Latest baseline dataset read so far, in any file.
    pub fn last_baseline(&self, data_set_type: DataSetType) -> Option<DatasetMark> {
        baseline_slot(data_set_type).and_then(|slot| self.baselines[slot])
    }

    /// Latest baseline dataset starting at or before the first packet of the current window.
    pub fn window_baseline(&self, data_set_type: DataSetType) -> Option<DatasetMark> {
        baseline_slot(data_set_type).and_then(|slot| self.window_baselines[slot])
    }

    /// Read all packets of the dataset starting at `mark`, continuing into later files if the
    /// dataset crosses a file boundary.
    pub fn read_dataset_at(&self, mark: &DatasetMark) -> Result<Vec<u8>, ReaderError> {
        let mut dataset = Vec::new();
        for (idx, path) in self.files.iter().enumerate().skip(mark.file_idx) {
            let mut file = File::open(path).map_err(|source| ReaderError::Open {
                path: path.clone(),
                source,
            })?;
            if idx == mark.file_idx {
                file.seek(SeekFrom::Start(mark.offset))?;
            }
            let mut stream = PacketStream::new(BufReader::new(file));
            while let Some(packet) = stream.next_packet()? {
                dataset.extend_from_slice(packet);
                let flags = PrimaryHeader::from_bytes(packet)?.seq_flags();
                if matches!(flags, SequenceFlags::LastSegment | SequenceFlags::Unsegmented) {
                    return Ok(dataset);
                }
            }
        }
        Err(ReaderError::IncompleteDataset {
            path: self.files[mark.file_idx].clone(),
            offset: mark.offset,
        })
    }

    fn current_path(&self) -> &Path {
        self.file_idx
            .and_then(|idx| self.files.get(idx))
            .map_or(Path::new(""), |path| path.as_path())
    }

    /// Open the file after the current one. Returns false when all files are exhausted.
    fn open_next_file(&mut self) -> Result<bool, ReaderError> {
        self.input = None;
        let idx = self.file_idx.map_or(0, |idx| idx + 1);
        let Some(path) = self.files.get(idx) else {
            return Ok(false);
        };
        let file = File::open(path).map_err(|source| ReaderError::Open {
            path: path.clone(),
            source,
        })?;
        tracing::debug!(
            ?path,
            idx,
            long_cadence_baseline = ?self.baselines[0],
            short_cadence_baseline = ?self.baselines[1],
            "opened ccsds file"
        );
        self.input = Some(BufReader::new(file));
        self.file_idx = Some(idx);
        self.file_offset = 0;
        self.opened.push(idx);
        Ok(true)
    }

    /// Read the next 14 byte header into the packet buffer, moving on to the next file at the
    /// end of the current one. Updates the period counter and the first VTC cache.
    pub fn read_header(&mut self) -> Result<Option<CcsdsHeader>, ReaderError> {
        loop {
            let Some(input) = self.input.as_mut() else {
                if !self.open_next_file()? {
                    return Ok(None);
                }
                continue;
            };
            self.packet.resize(CCSDS_HEADER_LEN, 0);
            let found = read_full(input, &mut self.packet)?;
            if found == 0 {
                self.input = None;
                if !self.open_next_file()? {
                    return Ok(None);
                }
                continue;
            }
            if found < CCSDS_HEADER_LEN {
                return Err(self.truncated(CCSDS_HEADER_LEN, found));
            }
            let header = CcsdsHeader::from_bytes(&self.packet)?;
            if self.file_offset == 0 {
                if let Some(idx) = self.file_idx {
                    self.first_vtcs[idx] = Some(header.vtc());
                }
            }
            if self.last_apid == Some(APID_LONG_CADENCE) && header.apid() == APID_SHORT_CADENCE {
                self.period += 1;
            }
            self.last_apid = Some(header.apid());
            return Ok(Some(header));
        }
    }

    fn truncated(&self, expected: usize, found: usize) -> ReaderError {
        ReaderError::TruncatedFile {
            path: self.current_path().to_path_buf(),
            offset: self.file_offset,
            expected,
            found,
        }
    }

    /// Read the next complete packet into the packet buffer.
    pub fn read_packet(&mut self) -> Result<Option<CcsdsHeader>, ReaderError> {
        let Some(header) = self.read_header()? else {
            return Ok(None);
        };
        let len = header.packet_len();
        if len < CCSDS_HEADER_LEN {
            return Err(ReaderError::PacketTooShort(len));
        }
        self.packet.resize(len, 0);
        let found = match self.input.as_mut() {
            Some(input) => {
                CCSDS_HEADER_LEN + read_full(input, &mut self.packet[CCSDS_HEADER_LEN..])?
            }
            None => CCSDS_HEADER_LEN,
        };
        if found < len {
            return Err(self.truncated(len, found));
        }
        self.note_baseline(&header);
        self.file_offset += len as u64;
        self.packets_read += 1;
        tracing::trace!(apid = header.apid(), vtc = %header.vtc(), len, "read packet");
        Ok(Some(header))
    }

    /// Remember `header` if it starts a baseline dataset. Must run before the file offset
    /// moves past the packet.
    fn note_baseline(&mut self, header: &CcsdsHeader) {
        let starts_dataset = matches!(
            header.primary.seq_flags(),
            SequenceFlags::FirstSegment | SequenceFlags::Unsegmented
        );
        if !starts_dataset || header.secondary.kind() != Some(PacketKind::Baseline) {
            return;
        }
        let slot = DataSetType::from_apid(header.apid()).and_then(baseline_slot);
        if let (Some(slot), Some(file_idx)) = (slot, self.file_idx) {
            self.baselines[slot] = Some(DatasetMark {
                file_idx,
                offset: self.file_offset,
                vtc: header.vtc(),
            });
        }
    }

    fn window(&self) -> Window {
        match &self.positioning {
            Positioning::All => Window::All,
            Positioning::ByPeriod { start, end } => Window::Period {
                start: *start,
                end: *end,
            },
            Positioning::ByVtc { ranges } => Window::Vtc {
                range: ranges.get(self.range_idx).map(VtcRange::adjusted),
                num_ranges: ranges.len(),
            },
        }
    }

    fn fetch(&mut self) -> Result<Option<PacketInfo>, ReaderError> {
        if let Some(info) = self.pending.take() {
            return Ok(Some(info));
        }
        Ok(self.read_packet()?.map(|header| PacketInfo {
            header,
            period: self.period,
        }))
    }

    /// Seek forward to the first packet of the current window. The packet is left pending.
    pub fn find_start(&mut self) -> Result<bool, ReaderError> {
        match self.window() {
            Window::All => {}
            Window::Period { start, .. } => loop {
                let Some(info) = self.fetch()? else {
                    return Err(ReaderError::StartNotFound {
                        start: Bound::Period(start),
                    });
                };
                if info.period >= start {
                    self.pending = Some(info);
                    break;
                }
            },
            Window::Vtc { range, .. } => {
                let Some(range) = range else {
                    self.phase = Phase::Done;
                    return Ok(false);
                };
                if let Some(prev_end) = self.prev_end {
                    let rewind = match (range.start, prev_end) {
                        (Some(start), Some(end)) => start < end,
                        _ => true,
                    };
                    if rewind {
                        self.rewind(range.start);
                    }
                }
                loop {
                    let Some(info) = self.fetch()? else {
                        return Err(ReaderError::StartNotFound {
                            start: range.start.into(),
                        });
                    };
                    if range.start.map_or(true, |start| info.header.vtc() >= start) {
                        self.pending = Some(info);
                        break;
                    }
                }
                tracing::debug!(
                    range = self.range_idx,
                    start = %Bound::from(range.start),
                    end = %Bound::from(range.end),
                    "found range start"
                );
            }
        }
        self.window_baselines = self.baselines;
        self.phase = Phase::Emitting;
        self.packets_in_span = 0;
        Ok(true)
    }

    /// Reopen the last file whose first packet is at or before `start`, then continue reading
    /// from its beginning.
    fn rewind(&mut self, start: Option<Vtc>) {
        let current = self.file_idx.unwrap_or(0).min(self.files.len() - 1);
        let target = (0..=current)
            .rev()
            .find(|idx| match (start, self.first_vtcs[*idx]) {
                (Some(start), Some(first)) => first <= start,
                _ => false,
            })
            .unwrap_or(0);
        tracing::debug!(from = current, to = target, "rewinding ccsds files");
        self.pending = None;
        self.input = None;
        self.last_apid = None;
        // Marks in reopened files are found again while reading.
        for mark in self.baselines.iter_mut() {
            if matches!(mark, Some(m) if m.file_idx >= target) {
                *mark = None;
            }
        }
        // The next open advances by one file.
        self.file_idx = target.checked_sub(1);
    }

    /// Hand out the next packet of the configured windows.
    pub fn next_packet_info(&mut self) -> Result<Option<CcsdsHeader>, ReaderError> {
        loop {
            match self.phase {
                Phase::Done => return Ok(None),
                Phase::Seeking => {
                    if !self.find_start()? {
                        return Ok(None);
                    }
                }
                Phase::Emitting => {
                    if let Some(header) = self.emit_next()? {
                        return Ok(Some(header));
                    }
                }
            }
        }
    }

    /// Next packet inside the current window. Returns [None] when the window ended, after
    /// moving to the next phase.
    fn emit_next(&mut self) -> Result<Option<CcsdsHeader>, ReaderError> {
        let info = self.fetch()?;
        match self.window() {
            Window::All => match info {
                Some(info) => return Ok(Some(self.emitted(info))),
                None => self.phase = Phase::Done,
            },
            Window::Period { start, end } => match (info, end) {
                (Some(info), PeriodEnd::Period(end)) if info.period >= end => {
                    self.pending = Some(info);
                    self.end_span(Bound::Period(start), Bound::Period(end))?;
                }
                (Some(info), _) => return Ok(Some(self.emitted(info))),
                (None, PeriodEnd::Period(end)) => {
                    return Err(ReaderError::EndNotReached {
                        end: Bound::Period(end),
                    })
                }
                (None, PeriodEnd::Last) => {
                    self.end_span(Bound::Period(start), Bound::LastPeriod)?;
                }
            },
            Window::Vtc { range, num_ranges } => {
                let range = range.unwrap_or_default();
                match (info, range.end) {
                    (Some(info), Some(end)) if info.header.vtc() >= end => {
                        self.pending = Some(info);
                        self.end_span(range.start.into(), range.end.into())?;
                        self.next_range(num_ranges, range.end);
                    }
                    (Some(info), _) => return Ok(Some(self.emitted(info))),
                    (None, Some(end)) => {
                        return Err(ReaderError::EndNotReached {
                            end: Bound::Vtc(end),
                        })
                    }
                    (None, None) => {
                        self.end_span(range.start.into(), Bound::AnyTime)?;
                        self.next_range(num_ranges, None);
                    }
                }
            }
        }
        Ok(None)
    }

    fn emitted(&mut self, info: PacketInfo) -> CcsdsHeader {
        self.packets_in_span += 1;
        info.header
    }

    fn end_span(&mut self, start: Bound, end: Bound) -> Result<(), ReaderError> {
        if self.packets_in_span == 0 {
            return Err(ReaderError::EmptyTimespan { start, end });
        }
        tracing::debug!(packets = self.packets_in_span, %start, %end, "window complete");
        self.phase = Phase::Done;
        Ok(())
    }

    fn next_range(&mut self, num_ranges: usize, end: Option<Vtc>) {
        self.range_idx += 1;
        self.prev_end = Some(end);
        if self.range_idx < num_ranges {
            self.phase = Phase::Seeking;
        }
    }
}

impl PacketSource for CcsdsReader {
    fn next_packet(&mut self) -> Result<Option<&[u8]>, ReaderError> {
        Ok(self.next_packet_info()?.map(|_| self.packet.as_slice()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ccsds::{
        PacketKind, PrimaryHeader, SecondaryHeader, SequenceFlags, APID_FFI, PRIMARY_HEADER_LEN,
    };
    use crate::config::PackerConfig;
    use crate::decode::{unpack_dataset, DecodedValues};
    use crate::huffman::testutil::small_diff_table;
    use crate::packer::DatasetPacker;
    use crate::source::ChunkReader;
    use crate::writer::PacketCounters;
    use std::io::Write;

    fn packet(apid: u16, vtc: Vtc) -> Vec<u8> {
        let mut raw = vec![0xEE; 48];
        let mut primary = PrimaryHeader::new(apid, SequenceFlags::Unsegmented, 0, 0).unwrap();
        primary.set_total_len(raw.len());
        primary.write_to_bytes(&mut raw).unwrap();
        SecondaryHeader::new(vtc, PacketKind::Encoded)
            .write_to_bytes(&mut raw[PRIMARY_HEADER_LEN..])
            .unwrap();
        raw
    }

    fn write_file(dir: &Path, name: &str, packets: &[(u16, u32)]) -> PathBuf {
        let path = dir.join(name);
        let mut file = File::create(&path).unwrap();
        for (apid, secs) in packets {
            file.write_all(&packet(*apid, Vtc::new(*secs, 0).unwrap()))
                .unwrap();
        }
        path
    }

    /// Three files with one packet per second: 984..990, 990..996, 996..1010.
    fn vtc_files(dir: &Path) -> Vec<PathBuf> {
        let lc = |range: core::ops::Range<u32>| -> Vec<(u16, u32)> {
            range.map(|secs| (APID_LONG_CADENCE, secs)).collect()
        };
        vec![
            write_file(dir, "a.dat", &lc(984..990)),
            write_file(dir, "b.dat", &lc(990..996)),
            write_file(dir, "c.dat", &lc(996..1010)),
        ]
    }

    fn collect_vtcs(reader: &mut CcsdsReader) -> Result<Vec<u32>, ReaderError> {
        let mut vtcs = Vec::new();
        while let Some(header) = reader.next_packet_info()? {
            vtcs.push(header.vtc().seconds());
        }
        Ok(vtcs)
    }

    #[test]
    fn test_read_all_across_files() {
        let dir = tempfile::tempdir().unwrap();
        let files = vtc_files(dir.path());
        let mut reader = CcsdsReader::new(files, Positioning::All).unwrap();
        let vtcs = collect_vtcs(&mut reader).unwrap();
        assert_eq!(vtcs, (984..1010).collect::<Vec<_>>());
        assert_eq!(reader.opened_files(), &[0, 1, 2]);
        assert_eq!(
            reader.first_vtcs(),
            &[
                Some(Vtc::new(984, 0).unwrap()),
                Some(Vtc::new(990, 0).unwrap()),
                Some(Vtc::new(996, 0).unwrap())
            ]
        );
    }

    #[test]
    fn test_overlapping_ranges_rewind() {
        let dir = tempfile::tempdir().unwrap();
        let files = vtc_files(dir.path());
        // Requested (1000, 1010) and (1005, 1020), shifted by the range adjustment to
        // (984, 994) and (989, 1004).
        let ranges = vec![
            VtcRange::from_secs(1000.0, 1010.0),
            VtcRange::from_secs(1005.0, 1020.0),
        ];
        let mut reader = CcsdsReader::new(files, Positioning::ByVtc { ranges }).unwrap();
        let vtcs = collect_vtcs(&mut reader).unwrap();
        let expected: Vec<u32> = (984..994).chain(989..1004).collect();
        assert_eq!(vtcs, expected);
        // File b starts after 989, so file a is reopened.
        assert_eq!(reader.opened_files(), &[0, 1, 0, 1, 2]);
    }

    #[test]
    fn test_baseline_carried_across_files() {
        let config = PackerConfig {
            num_long_cadences_per_baseline: 4,
            num_short_cadences_per_long_cadence: 1,
            ..Default::default()
        };
        let cadences: Vec<Vec<u16>> = (0..4u16)
            .map(|c| (0..200u16).map(|p| p * 5 + c * 2).collect())
            .collect();
        let mut packer = DatasetPacker::new(
            config,
            small_diff_table(),
            PacketCounters::default(),
            Vec::new(),
            Vec::new(),
        )
        .unwrap();
        for cadence in &cadences {
            packer.process_long_cadence(cadence).unwrap();
        }
        let (packets, _, _, _) = packer.finish().unwrap();

        // Baseline and first encoded cadence in file a, the rest in file b.
        let mut split = 0;
        for _ in 0..2 {
            split += CcsdsHeader::from_bytes(&packets[split..]).unwrap().packet_len();
        }
        let dir = tempfile::tempdir().unwrap();
        let files = vec![dir.path().join("a.dat"), dir.path().join("b.dat")];
        std::fs::write(&files[0], &packets[..split]).unwrap();
        std::fs::write(&files[1], &packets[split..]).unwrap();

        // Cadences are 1765.5 s apart. The adjusted start 2984 s falls before cadence 2.
        let ranges = vec![VtcRange::new(Some(Vtc::new(3000, 0).unwrap()), None)];
        let mut reader = CcsdsReader::new(files, Positioning::ByVtc { ranges }).unwrap();
        let first = reader.next_packet().unwrap().unwrap().to_vec();

        let mark = reader.window_baseline(DataSetType::LongCadence).unwrap();
        assert_eq!(
            mark,
            DatasetMark {
                file_idx: 0,
                offset: 0,
                vtc: Vtc::new(0, 0).unwrap(),
            }
        );
        assert_eq!(reader.last_baseline(DataSetType::LongCadence), Some(mark));
        assert_eq!(reader.window_baseline(DataSetType::ShortCadence), None);
        assert_eq!(reader.window_baseline(DataSetType::Ffi), None);

        let decoder = small_diff_table().decoder();
        let baseline = reader.read_dataset_at(&mark).unwrap();
        let (baseline, _) = unpack_dataset(&baseline, &decoder, None).unwrap();
        let DecodedValues::Quantized(baseline) = baseline.values else {
            panic!("unexpected ffi dataset");
        };
        assert_eq!(baseline, cadences[0]);
        let (dataset, _) = unpack_dataset(&first, &decoder, Some(baseline.as_slice())).unwrap();
        assert_eq!(dataset.values, DecodedValues::Quantized(cadences[2].clone()));
    }

    #[test]
    fn test_read_dataset_at_without_last_segment() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.dat");
        let mut raw = packet(APID_LONG_CADENCE, Vtc::new(5, 0).unwrap());
        let mut primary = PrimaryHeader::new(APID_LONG_CADENCE, SequenceFlags::FirstSegment, 0, 0)
            .unwrap();
        primary.set_total_len(raw.len());
        primary.write_to_bytes(&mut raw).unwrap();
        std::fs::write(&path, &raw).unwrap();
        let reader = CcsdsReader::new(vec![path.clone()], Positioning::All).unwrap();
        let mark = DatasetMark {
            file_idx: 0,
            offset: 0,
            vtc: Vtc::new(5, 0).unwrap(),
        };
        let err = reader.read_dataset_at(&mark).unwrap_err();
        assert!(matches!(
            err,
            ReaderError::IncompleteDataset { path: p, offset: 0 } if p == path
        ));
    }

    #[test]
    fn test_rewind_scans_back_to_matching_file() {
        let dir = tempfile::tempdir().unwrap();
        let files = vtc_files(dir.path());
        // Adjusted (984, 1006) and (995, 1009).
        let ranges = vec![
            VtcRange::from_secs(1000.0, 1022.0),
            VtcRange::from_secs(1011.0, 1025.0),
        ];
        let mut reader = CcsdsReader::new(files, Positioning::ByVtc { ranges }).unwrap();
        let vtcs = collect_vtcs(&mut reader).unwrap();
        let expected: Vec<u32> = (984..1006).chain(995..1009).collect();
        assert_eq!(vtcs, expected);
        assert_eq!(reader.opened_files(), &[0, 1, 2, 1, 2]);
    }

    #[test]
    fn test_disjoint_ranges_do_not_rewind() {
        let dir = tempfile::tempdir().unwrap();
        let files = vtc_files(dir.path());
        let ranges = vec![
            VtcRange::from_secs(1001.0, 1003.0),
            VtcRange::new(Some(Vtc::new(1013, 0).unwrap()), None),
        ];
        let mut reader = CcsdsReader::new(files, Positioning::ByVtc { ranges }).unwrap();
        let vtcs = collect_vtcs(&mut reader).unwrap();
        let expected: Vec<u32> = (985..987).chain(997..1010).collect();
        assert_eq!(vtcs, expected);
        assert_eq!(reader.opened_files(), &[0, 1, 2]);
    }

    #[test]
    fn test_empty_timespan_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let files = vtc_files(dir.path());
        // Adjusted (986.5, 986.6): no packet in between.
        let ranges = vec![VtcRange::from_secs(1002.5, 1002.6)];
        let mut reader = CcsdsReader::new(files, Positioning::ByVtc { ranges }).unwrap();
        assert!(matches!(
            collect_vtcs(&mut reader),
            Err(ReaderError::EmptyTimespan { .. })
        ));
    }

    #[test]
    fn test_unreached_end_and_start() {
        let dir = tempfile::tempdir().unwrap();
        let files = vtc_files(dir.path());
        let ranges = vec![VtcRange::from_secs(1020.0, 1100.0)];
        let mut reader = CcsdsReader::new(files.clone(), Positioning::ByVtc { ranges }).unwrap();
        assert!(matches!(
            collect_vtcs(&mut reader),
            Err(ReaderError::EndNotReached { .. })
        ));
        let ranges = vec![VtcRange::from_secs(1100.0, 1200.0)];
        let mut reader = CcsdsReader::new(files, Positioning::ByVtc { ranges }).unwrap();
        assert!(matches!(
            collect_vtcs(&mut reader),
            Err(ReaderError::StartNotFound { .. })
        ));
    }

    /// Period layout: SC SC LC | SC SC LC | SC LC, split over two files.
    fn period_files(dir: &Path) -> Vec<PathBuf> {
        let (lc, sc) = (APID_LONG_CADENCE, APID_SHORT_CADENCE);
        vec![
            write_file(dir, "p0.dat", &[(sc, 1), (sc, 2), (lc, 3), (sc, 4)]),
            write_file(dir, "p1.dat", &[(sc, 5), (lc, 6), (sc, 7), (lc, 8), (APID_FFI, 9)]),
        ]
    }

    #[test]
    fn test_period_window() {
        let dir = tempfile::tempdir().unwrap();
        let positioning = Positioning::ByPeriod {
            start: 1,
            end: PeriodEnd::Period(2),
        };
        let mut reader = CcsdsReader::new(period_files(dir.path()), positioning).unwrap();
        assert_eq!(collect_vtcs(&mut reader).unwrap(), [4, 5, 6]);
        assert_eq!(reader.period(), 2);
    }

    #[test]
    fn test_period_window_to_last() {
        let dir = tempfile::tempdir().unwrap();
        let positioning = Positioning::ByPeriod {
            start: 2,
            end: PeriodEnd::Last,
        };
        let mut reader = CcsdsReader::new(period_files(dir.path()), positioning).unwrap();
        assert_eq!(collect_vtcs(&mut reader).unwrap(), [7, 8, 9]);
    }

    #[test]
    fn test_period_errors() {
        let dir = tempfile::tempdir().unwrap();
        let files = period_files(dir.path());
        let positioning = Positioning::ByPeriod {
            start: 0,
            end: PeriodEnd::Period(5),
        };
        let mut reader = CcsdsReader::new(files.clone(), positioning).unwrap();
        assert!(matches!(
            collect_vtcs(&mut reader),
            Err(ReaderError::EndNotReached {
                end: Bound::Period(5)
            })
        ));
        let positioning = Positioning::ByPeriod {
            start: 1,
            end: PeriodEnd::Period(1),
        };
        let mut reader = CcsdsReader::new(files.clone(), positioning).unwrap();
        assert!(matches!(
            collect_vtcs(&mut reader),
            Err(ReaderError::EmptyTimespan { .. })
        ));
        let positioning = Positioning::ByPeriod {
            start: 3,
            end: PeriodEnd::Last,
        };
        let mut reader = CcsdsReader::new(files, positioning).unwrap();
        assert!(matches!(
            collect_vtcs(&mut reader),
            Err(ReaderError::StartNotFound { .. })
        ));
    }

    #[test]
    fn test_chunks_from_reader() {
        let dir = tempfile::tempdir().unwrap();
        let positioning = Positioning::ByPeriod {
            start: 1,
            end: PeriodEnd::Period(2),
        };
        let reader = CcsdsReader::new(period_files(dir.path()), positioning).unwrap();
        let mut chunks = ChunkReader::new(reader);
        let mut buf = [0; 100];
        let chunk = chunks.read_bytes(&mut buf).unwrap();
        assert_eq!(chunk.len, 100);
        assert_eq!(chunk.first_header, Some(0));
        let chunk = chunks.read_bytes(&mut buf).unwrap();
        assert_eq!(chunk.len, 44);
        assert_eq!(chunk.first_header, None);
        assert!(chunks.read_bytes(&mut buf).unwrap().is_empty());
    }

    #[test]
    fn test_truncated_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.dat");
        std::fs::write(&path, &packet(APID_LONG_CADENCE, Vtc::ZERO)[0..30]).unwrap();
        let mut reader = CcsdsReader::new(vec![path], Positioning::All).unwrap();
        assert!(matches!(
            reader.next_packet_info(),
            Err(ReaderError::TruncatedFile {
                expected: 48,
                found: 30,
                ..
            })
        ));
        assert!(matches!(
            CcsdsReader::new(Vec::new(), Positioning::All),
            Err(ReaderError::NoInputFiles)
        ));
    }
}
