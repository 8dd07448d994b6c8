//! Baseline/difference orchestration over cadence streams.
//!
//! Long cadence and short cadence data each keep one live [Baseline]. The first cadence of a
//! stream is stored raw and becomes the baseline. Every `K` long cadences, where `K` is
//! [PackerConfig::num_long_cadences_per_baseline], the baseline is refreshed: the cadence is
//! first emitted as a residual dataset, compressed against the old baseline, and then emitted
//! raw as the new baseline. Short cadences refresh at the same wall clock interval, which is
//! `K` times the number of short cadences per long cadence. All other cadences are compressed
//! against the current baseline. FFI values are packed raw.
//!
//! Every dataset yields one [SctEntry](crate::sct::SctEntry).
use crate::baseline::{Baseline, SizeMismatchError};
use crate::bits::{BitPacker, PackStatus};
use crate::ccsds::{DataSetType, PacketClass, MAX_PAYLOAD_LEN};
use crate::config::{CadenceInputs, ConfigError, PackerConfig};
use crate::huffman::{CompressionTableStore, HuffmanError, HuffmanTable};
use crate::persist::{self, PersistError};
use crate::sct::{SctError, SctLog};
use crate::vtc::Vtc;
use crate::writer::{CcsdsPacketWriter, PacketCounters, PacketError, PacketParams};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum PackerError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("{data_set_type:?} cadence {cadence}: {source}")]
    SizeMismatch {
        data_set_type: DataSetType,
        cadence: u64,
        #[source]
        source: SizeMismatchError,
    },
    #[error("cannot read input {path:?}: {source}")]
    Input {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("input {path:?} has {len} bytes, not a multiple of {word_len}")]
    MalformedInput {
        path: PathBuf,
        len: usize,
        word_len: usize,
    },
    #[error("a single {len} bit code exceeds the payload capacity")]
    CodeExceedsCapacity { len: u8 },
    #[error("huffman error: {0}")]
    Huffman(#[from] HuffmanError),
    #[error("packet error: {0}")]
    Packet(#[from] PacketError),
    #[error("sct log error: {0}")]
    Sct(#[from] SctError),
    #[error("persisted state error: {0}")]
    Persist(#[from] PersistError),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Totals of one packer run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PackerSummary {
    pub long_cadences: u64,
    pub short_cadences: u64,
    pub ffis: u64,
    pub datasets: u64,
    pub packets: u64,
    pub bytes: u64,
    /// Mean length of all Huffman codes emitted.
    pub average_code_length: f64,
}

/// Packet classes of one cadence stream.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
struct StreamClasses {
    baseline: PacketClass,
    residual: PacketClass,
    encoded: PacketClass,
}

impl StreamClasses {
    const LONG_CADENCE: Self = Self {
        baseline: PacketClass::LongCadenceBaseline,
        residual: PacketClass::LongCadenceResidual,
        encoded: PacketClass::LongCadenceEncoded,
    };
    const SHORT_CADENCE: Self = Self {
        baseline: PacketClass::ShortCadenceBaseline,
        residual: PacketClass::ShortCadenceResidual,
        encoded: PacketClass::ShortCadenceEncoded,
    };
}

/// Baseline state of one cadence stream.
#[derive(Debug)]
struct StreamState {
    data_set_type: DataSetType,
    classes: StreamClasses,
    baseline: Option<Baseline>,
    cadences_seen: u64,
    /// Cadences between baseline refreshes.
    interval: u64,
}

impl StreamState {
    fn long_cadence(interval: u64) -> Self {
        Self::new(DataSetType::LongCadence, StreamClasses::LONG_CADENCE, interval)
    }

    fn short_cadence(interval: u64) -> Self {
        Self::new(DataSetType::ShortCadence, StreamClasses::SHORT_CADENCE, interval)
    }

    fn new(data_set_type: DataSetType, classes: StreamClasses, interval: u64) -> Self {
        Self {
            data_set_type,
            classes,
            baseline: None,
            cadences_seen: 0,
            interval,
        }
    }
}

/// Values of one dataset, before packing.
enum DatasetValues<'a> {
    Raw16(&'a [u16]),
    Raw32(&'a [u32]),
    Diffs(&'a [u32]),
}

impl DatasetValues<'_> {
    fn len(&self) -> usize {
        match self {
            DatasetValues::Raw16(v) => v.len(),
            DatasetValues::Raw32(v) | DatasetValues::Diffs(v) => v.len(),
        }
    }
}

/// Mirrors raw cadence bytes into one file per data type.
#[derive(Debug, Default)]
struct DebugMirror {
    dir: Option<PathBuf>,
    files: HashMap<DataSetType, BufWriter<File>>,
}

impl DebugMirror {
    fn new(dir: Option<PathBuf>) -> Result<Self, PackerError> {
        if let Some(dir) = &dir {
            fs::create_dir_all(dir)?;
        }
        Ok(Self {
            dir,
            files: HashMap::new(),
        })
    }

    fn path(dir: &Path, data_set_type: DataSetType) -> PathBuf {
        dir.join(format!("{}-debug.dat", data_set_type.name()))
    }

    fn write(&mut self, data_set_type: DataSetType, raw: &[u8]) -> Result<(), PackerError> {
        let Some(dir) = &self.dir else {
            return Ok(());
        };
        if !self.files.contains_key(&data_set_type) {
            let file = File::create(Self::path(dir, data_set_type))?;
            self.files.insert(data_set_type, BufWriter::new(file));
        }
        if let Some(file) = self.files.get_mut(&data_set_type) {
            file.write_all(raw)?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), PackerError> {
        for file in self.files.values_mut() {
            file.flush()?;
        }
        Ok(())
    }
}

/// Output locations of [pack_files].
#[derive(Debug, Clone)]
pub struct PackerPaths {
    pub packets: PathBuf,
    pub sct: PathBuf,
    /// Sequence counts of a previous run, if any.
    pub counts_in: Option<PathBuf>,
    /// Sequence counts after this run. Always written.
    pub counts_out: PathBuf,
}

/// Packs cadences into one packet stream plus its SCT log.
pub struct DatasetPacker<W: Write, S: Write> {
    config: PackerConfig,
    table: HuffmanTable,
    writer: CcsdsPacketWriter<W>,
    sct: SctLog<S>,
    bits: BitPacker,
    long_cadence: StreamState,
    short_cadence: StreamState,
    ffis: u64,
    datasets: u64,
    debug: DebugMirror,
}

impl<W: Write, S: Write> DatasetPacker<W, S> {
    pub fn new(
        config: PackerConfig,
        table: HuffmanTable,
        counters: PacketCounters,
        packets_out: W,
        sct_out: S,
    ) -> Result<Self, PackerError> {
        config.validate()?;
        let debug = DebugMirror::new(config.debug_dir.clone())?;
        Ok(Self {
            long_cadence: StreamState::long_cadence(config.num_long_cadences_per_baseline as u64),
            short_cadence: StreamState::short_cadence(config.short_cadences_per_baseline()),
            writer: CcsdsPacketWriter::new(packets_out, counters),
            sct: SctLog::new(sct_out, config.ssr_start_offset),
            bits: BitPacker::new(MAX_PAYLOAD_LEN),
            ffis: 0,
            datasets: 0,
            debug,
            table,
            config,
        })
    }

    pub fn config(&self) -> &PackerConfig {
        &self.config
    }

    pub fn counters(&self) -> &PacketCounters {
        self.writer.counters()
    }

    /// Pack the next long cadence of the stream.
    pub fn process_long_cadence(&mut self, samples: &[u16]) -> Result<(), PackerError> {
        let vtc = Vtc::from_secs_f64(
            self.config.vtc_start
                + self.long_cadence.cadences_seen as f64 * self.config.long_cadence_vtc_increment,
        );
        self.debug
            .write(DataSetType::LongCadence, &samples_to_bytes(samples))?;
        let mut stream = core::mem::replace(&mut self.long_cadence, StreamState::long_cadence(0));
        let result = self.process_cadence(&mut stream, samples, vtc);
        self.long_cadence = stream;
        result
    }

    /// Pack the next short cadence of the stream.
    pub fn process_short_cadence(&mut self, samples: &[u16]) -> Result<(), PackerError> {
        let vtc = Vtc::from_secs_f64(
            self.config.vtc_start
                + self.short_cadence.cadences_seen as f64
                    * self.config.short_cadence_vtc_increment,
        );
        self.debug
            .write(DataSetType::ShortCadence, &samples_to_bytes(samples))?;
        let mut stream =
            core::mem::replace(&mut self.short_cadence, StreamState::short_cadence(0));
        let result = self.process_cadence(&mut stream, samples, vtc);
        self.short_cadence = stream;
        result
    }

    /// Pack one full frame image. FFIs are never differenced.
    pub fn process_ffi(&mut self, values: &[u32]) -> Result<(), PackerError> {
        let vtc = Vtc::from_secs_f64(
            self.config.vtc_start + self.ffis as f64 * self.config.long_cadence_vtc_increment,
        );
        let raw: Vec<u8> = values.iter().flat_map(|v| v.to_be_bytes()).collect();
        self.debug.write(DataSetType::Ffi, &raw)?;
        self.emit_dataset(PacketClass::FfiRaw, vtc, DatasetValues::Raw32(values))?;
        self.ffis += 1;
        Ok(())
    }

    fn process_cadence(
        &mut self,
        stream: &mut StreamState,
        samples: &[u16],
        vtc: Vtc,
    ) -> Result<(), PackerError> {
        let cadence = stream.cadences_seen;
        let Some(baseline) = stream.baseline.as_mut() else {
            self.emit_dataset(
                stream.classes.baseline,
                vtc,
                DatasetValues::Raw16(samples),
            )?;
            stream.baseline = Some(Baseline::new(samples.to_vec()));
            stream.cadences_seen += 1;
            return Ok(());
        };
        let diffs = baseline
            .diff_all(samples)
            .map_err(|source| PackerError::SizeMismatch {
                data_set_type: stream.data_set_type,
                cadence,
                source,
            })?;
        if cadence % stream.interval == 0 {
            tracing::debug!(
                data_set_type = stream.data_set_type.name(),
                cadence,
                "refreshing baseline"
            );
            // Length was checked by the difference above.
            baseline
                .replace(samples)
                .map_err(|source| PackerError::SizeMismatch {
                    data_set_type: stream.data_set_type,
                    cadence,
                    source,
                })?;
            self.emit_dataset(
                stream.classes.residual,
                vtc,
                DatasetValues::Diffs(&diffs),
            )?;
            self.emit_dataset(
                stream.classes.baseline,
                vtc,
                DatasetValues::Raw16(samples),
            )?;
        } else {
            self.emit_dataset(
                stream.classes.encoded,
                vtc,
                DatasetValues::Diffs(&diffs),
            )?;
        }
        stream.cadences_seen += 1;
        Ok(())
    }

    /// Pack the values of one dataset into packets and log it. Whenever the payload buffer is
    /// full it is written as a maximal packet and the value that did not fit is retried on the
    /// empty buffer.
    fn emit_dataset(
        &mut self,
        class: PacketClass,
        vtc: Vtc,
        values: DatasetValues,
    ) -> Result<(), PackerError> {
        let mut params = PacketParams {
            class,
            vtc,
            photometer_config_id: self.config.photometer_config_id,
            first_pixel_id: 0,
            pixel_count: 0,
        };
        let mut units = 0u32;
        let mut packets = 0u32;
        self.bits.reset();
        self.writer.begin_dataset();
        for idx in 0..values.len() {
            let (bits, len) = match &values {
                DatasetValues::Raw16(v) => (v[idx] as u32, 16),
                DatasetValues::Raw32(v) => (v[idx], 32),
                DatasetValues::Diffs(v) => {
                    let code = self.table.code(v[idx] as usize)?;
                    (code.bits(), code.len())
                }
            };
            if self.bits.add_bits(bits, len) == PackStatus::Full {
                let flushed = self.bits.flush();
                let written = self.writer.emit_middle(&params, &flushed.data)?;
                units += written.ssr_units;
                packets += 1;
                params.first_pixel_id += params.pixel_count;
                params.pixel_count = 0;
                if self.bits.add_bits(bits, len) == PackStatus::Full {
                    return Err(PackerError::CodeExceedsCapacity { len });
                }
            }
            params.pixel_count += 1;
        }
        let flushed = self.bits.flush();
        let written = self.writer.emit_final(&params, flushed.packed())?;
        units += written.ssr_units;
        packets += 1;
        let entry = self.sct.append(vtc, class, units)?;
        self.datasets += 1;
        tracing::debug!(
            ?class,
            %vtc,
            values = values.len(),
            packets,
            ssr_offset = entry.ssr_offset,
            "packed dataset"
        );
        Ok(())
    }

    /// Pack all cadence files. Short cadences are nested inside long cadences: before each
    /// long cadence the short cadences covering it are processed. Remaining short cadences and
    /// then all FFIs follow.
    pub fn process_inputs(&mut self, inputs: &CadenceInputs) -> Result<(), PackerError> {
        let per_long = self.config.num_short_cadences_per_long_cadence as usize;
        let mut short_cadences = inputs.short_cadence.iter();
        for long_path in &inputs.long_cadence {
            for short_path in short_cadences.by_ref().take(per_long) {
                self.process_short_cadence(&read_cadence_file(short_path)?)?;
            }
            self.process_long_cadence(&read_cadence_file(long_path)?)?;
        }
        for short_path in short_cadences {
            self.process_short_cadence(&read_cadence_file(short_path)?)?;
        }
        for ffi_path in &inputs.ffi {
            self.process_ffi(&read_ffi_file(ffi_path)?)?;
        }
        Ok(())
    }

    pub fn summary(&self) -> PackerSummary {
        PackerSummary {
            long_cadences: self.long_cadence.cadences_seen,
            short_cadences: self.short_cadence.cadences_seen,
            ffis: self.ffis,
            datasets: self.datasets,
            packets: self.writer.packets_written(),
            bytes: self.writer.bytes_written(),
            average_code_length: self.table.average_code_length(),
        }
    }

    /// Flush all outputs and hand them back together with the final sequence counters.
    pub fn finish(mut self) -> Result<(W, S, PacketCounters, PackerSummary), PackerError> {
        self.writer.flush()?;
        self.sct.flush()?;
        self.debug.flush()?;
        let summary = self.summary();
        tracing::info!(
            datasets = summary.datasets,
            packets = summary.packets,
            bytes = summary.bytes,
            average_code_length = summary.average_code_length,
            "packing finished"
        );
        let counters = self.writer.counters().clone();
        Ok((self.writer.into_inner(), self.sct.into_inner(), counters, summary))
    }
}

fn samples_to_bytes(samples: &[u16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_be_bytes()).collect()
}

fn read_input(path: &Path, word_len: usize) -> Result<Vec<u8>, PackerError> {
    let raw = fs::read(path).map_err(|source| PackerError::Input {
        path: path.to_path_buf(),
        source,
    })?;
    if raw.len() % word_len != 0 {
        return Err(PackerError::MalformedInput {
            path: path.to_path_buf(),
            len: raw.len(),
            word_len,
        });
    }
    Ok(raw)
}

/// Read a cadence file of big-endian 16-bit quantization indices.
pub fn read_cadence_file(path: &Path) -> Result<Vec<u16>, PackerError> {
    let raw = read_input(path, 2)?;
    Ok(raw
        .chunks_exact(2)
        .map(|w| u16::from_be_bytes([w[0], w[1]]))
        .collect())
}

/// Read an FFI file of big-endian 32-bit values.
pub fn read_ffi_file(path: &Path) -> Result<Vec<u32>, PackerError> {
    let raw = read_input(path, 4)?;
    Ok(raw
        .chunks_exact(4)
        .map(|w| u32::from_be_bytes([w[0], w[1], w[2], w[3]]))
        .collect())
}

/// Run a complete packer invocation against files: load the compression table, resume the
/// sequence counters, pack all inputs and persist the counters for the next run.
pub fn pack_files(
    config: PackerConfig,
    inputs: &CadenceInputs,
    store: &impl CompressionTableStore,
    paths: &PackerPaths,
) -> Result<PackerSummary, PackerError> {
    tracing::info!(
        long_cadences = inputs.long_cadence.len(),
        short_cadences = inputs.short_cadence.len(),
        ffis = inputs.ffi.len(),
        compression_table_id = config.compression_table_id,
        "packing cadence data"
    );
    let table = HuffmanTable::load(config.compression_table_id, store)?;
    let counters = persist::read_sequence_counts(paths.counts_in.as_deref())?;
    let packets = BufWriter::new(File::create(&paths.packets)?);
    let sct = BufWriter::new(File::create(&paths.sct)?);
    let mut packer = DatasetPacker::new(config, table, counters, packets, sct)?;
    packer.process_inputs(inputs)?;
    let (_, _, counters, summary) = packer.finish()?;
    persist::write_sequence_counts(&paths.counts_out, &counters)?;
    Ok(summary)
}
