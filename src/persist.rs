//! Counter state carried from one run to the next.
//!
//! Two small text files allow a logical stream to be split over several sequential runs:
//!
//!  - the packet sequence counts file, one decimal count per line in [PacketClass::ALL] order,
//!  - the VCDU next-id file, holding the next frame counter and the virtual channel id it
//!    belongs to on two lines.
//!
//! A missing file means "start from zero". Content which does not parse is fatal.
use crate::ccsds::{PacketClass, MAX_SEQ_COUNT};
use crate::seq_count::MAX_VCDU_COUNT;
use crate::vcdu::FrameCounterState;
use crate::writer::PacketCounters;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("i/o error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{path:?} line {line}: {content:?} is not a valid value")]
    InvalidValue {
        path: PathBuf,
        line: usize,
        content: String,
    },
    #[error("{path:?} holds {found} values, expected {expected}")]
    WrongLineCount {
        path: PathBuf,
        found: usize,
        expected: usize,
    },
}

/// Read the file, mapping a missing file to [None].
fn read_optional(path: &Path) -> Result<Option<String>, PersistError> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(PersistError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn parse_values(path: &Path, text: &str, max: u64) -> Result<Vec<u64>, PersistError> {
    let mut values = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let value = trimmed
            .parse::<u64>()
            .ok()
            .filter(|v| *v <= max)
            .ok_or_else(|| PersistError::InvalidValue {
                path: path.to_path_buf(),
                line: idx + 1,
                content: trimmed.to_string(),
            })?;
        values.push(value);
    }
    Ok(values)
}

fn write_text(path: &Path, text: &str) -> Result<(), PersistError> {
    fs::write(path, text).map_err(|source| PersistError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Load persisted packet sequence counts. Without a path or without a file all counters start
/// at zero.
pub fn read_sequence_counts(path: Option<&Path>) -> Result<PacketCounters, PersistError> {
    let Some(path) = path else {
        return Ok(PacketCounters::default());
    };
    let Some(text) = read_optional(path)? else {
        tracing::warn!(?path, "no sequence counts file, counters start at 0");
        return Ok(PacketCounters::default());
    };
    let values = parse_values(path, &text, MAX_SEQ_COUNT as u64)?;
    if values.len() != PacketClass::ALL.len() {
        return Err(PersistError::WrongLineCount {
            path: path.to_path_buf(),
            found: values.len(),
            expected: PacketClass::ALL.len(),
        });
    }
    let mut counts = [0u16; PacketClass::ALL.len()];
    for (count, value) in counts.iter_mut().zip(values) {
        *count = value as u16;
    }
    tracing::debug!(?path, ?counts, "resuming sequence counts");
    Ok(PacketCounters::from_counts(counts))
}

pub fn write_sequence_counts(path: &Path, counters: &PacketCounters) -> Result<(), PersistError> {
    let mut text = String::new();
    for count in counters.counts() {
        text.push_str(&count.to_string());
        text.push('\n');
    }
    write_text(path, &text)
}

/// Load the VCDU next-id file. A missing file yields [None].
pub fn read_frame_counter_state(path: &Path) -> Result<Option<FrameCounterState>, PersistError> {
    let Some(text) = read_optional(path)? else {
        return Ok(None);
    };
    let values = parse_values(path, &text, MAX_VCDU_COUNT as u64)?;
    if values.len() != 2 {
        return Err(PersistError::WrongLineCount {
            path: path.to_path_buf(),
            found: values.len(),
            expected: 2,
        });
    }
    let channel_id = u8::try_from(values[1]).map_err(|_| PersistError::InvalidValue {
        path: path.to_path_buf(),
        line: 2,
        content: values[1].to_string(),
    })?;
    Ok(Some(FrameCounterState {
        next_frame: values[0] as u32,
        channel_id,
    }))
}

pub fn write_frame_counter_state(
    path: &Path,
    state: &FrameCounterState,
) -> Result<(), PersistError> {
    write_text(path, &format!("{}\n{}\n", state.next_frame, state.channel_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("counts.txt");
        let counters = PacketCounters::from_counts([1, 2, 3, 16383, 0, 9, 100]);
        write_sequence_counts(&path, &counters).unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "1\n2\n3\n16383\n0\n9\n100\n"
        );
        let restored = read_sequence_counts(Some(&path)).unwrap();
        assert_eq!(restored.counts(), [1, 2, 3, 16383, 0, 9, 100]);
    }

    #[test]
    fn test_missing_counts_file_starts_at_zero() {
        let dir = tempfile::tempdir().unwrap();
        let counters = read_sequence_counts(Some(&dir.path().join("absent"))).unwrap();
        assert_eq!(counters.counts(), [0; 7]);
        assert_eq!(read_sequence_counts(None).unwrap().counts(), [0; 7]);
    }

    #[test]
    fn test_non_numeric_counts_are_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("counts.txt");
        std::fs::write(&path, "1\n2\nthree\n4\n5\n6\n7\n").unwrap();
        assert!(matches!(
            read_sequence_counts(Some(&path)),
            Err(PersistError::InvalidValue { line: 3, .. })
        ));
        std::fs::write(&path, "1\n2\n16384\n4\n5\n6\n7\n").unwrap();
        assert!(matches!(
            read_sequence_counts(Some(&path)),
            Err(PersistError::InvalidValue { line: 3, .. })
        ));
        std::fs::write(&path, "1\n2\n").unwrap();
        assert!(matches!(
            read_sequence_counts(Some(&path)),
            Err(PersistError::WrongLineCount {
                found: 2,
                expected: 7,
                ..
            })
        ));
    }

    #[test]
    fn test_frame_counter_state_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vcdu-next-id.txt");
        assert_eq!(read_frame_counter_state(&path).unwrap(), None);
        let state = FrameCounterState {
            next_frame: 16_777_215,
            channel_id: 3,
        };
        write_frame_counter_state(&path, &state).unwrap();
        assert_eq!(read_frame_counter_state(&path).unwrap(), Some(state));
        std::fs::write(&path, "12\n300\n").unwrap();
        assert!(matches!(
            read_frame_counter_state(&path),
            Err(PersistError::InvalidValue { line: 2, .. })
        ));
    }
}
