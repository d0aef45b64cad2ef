//! Corruption detection tests
//!
//! These tests verify how replay treats damaged logs:
//! - A record cut short at end of file is dropped silently
//! - A final record with a bad CRC ending exactly at EOF is a torn write
//! - A bad CRC anywhere earlier stops recovery with the record's position
//! - The writer truncates the torn tail and keeps appending after it

use std::fs::{self, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;
use stratadoc_core::{Command, CommandOp, Error, RowId};
use stratadoc_durability::format::{decode_frame, encode_frame, FILE_HEADER_SIZE};
use stratadoc_durability::{replay, CommandLog, LogConfig, LogTail};
use tempfile::TempDir;

fn remove(row: u64) -> Command {
    Command::new(CommandOp::Remove { row: RowId(row) })
}

/// Write `count` records through the real pipeline and close the log.
fn write_log(path: &Path, count: u64) {
    let log = CommandLog::open(path, LogConfig::default(), LogTail::default()).unwrap();
    for row in 1..=count {
        log.persist(remove(row)).unwrap();
    }
    log.close().unwrap();
}

/// (start, end) byte range of every record in the file.
fn record_ranges(path: &Path) -> Vec<(usize, usize)> {
    let bytes = fs::read(path).unwrap();
    let mut ranges = Vec::new();
    let mut pos = FILE_HEADER_SIZE;
    while pos < bytes.len() {
        let frame = decode_frame(&bytes[pos..]).unwrap();
        ranges.push((pos, pos + frame.consumed));
        pos += frame.consumed;
    }
    ranges
}

fn flip_byte(path: &Path, offset: usize) {
    let mut bytes = fs::read(path).unwrap();
    bytes[offset] ^= 0xFF;
    fs::write(path, bytes).unwrap();
}

fn truncate(path: &Path, len: usize) {
    let file = OpenOptions::new().write(true).open(path).unwrap();
    file.set_len(len as u64).unwrap();
}

fn replay_rows(path: &Path) -> (Vec<u64>, Option<Error>) {
    let mut rows = Vec::new();
    for item in replay(path, &LogConfig::default()).unwrap() {
        match item {
            Ok(command) => rows.push(command.row().unwrap().0),
            Err(e) => return (rows, Some(e)),
        }
    }
    (rows, None)
}

#[test]
fn test_truncated_final_record_is_dropped() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("c.log");
    write_log(&path, 5);
    let ranges = record_ranges(&path);

    // Cut the last record in half
    let (start, end) = ranges[4];
    truncate(&path, start + (end - start) / 2);

    let (rows, err) = replay_rows(&path);
    assert!(err.is_none(), "{:?}", err);
    assert_eq!(rows, vec![1, 2, 3, 4]);

    let summary = replay(&path, &LogConfig::default()).unwrap().finish().unwrap();
    assert_eq!(summary.tail.valid_end, ranges[3].1 as u64);
    assert_eq!(summary.tail.last_seq, 4);
    assert!(summary.torn_bytes > 0);
}

#[test]
fn test_truncated_inside_length_field() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("c.log");
    write_log(&path, 3);
    let ranges = record_ranges(&path);
    truncate(&path, ranges[2].0 + 2);

    let (rows, err) = replay_rows(&path);
    assert!(err.is_none());
    assert_eq!(rows, vec![1, 2]);
}

#[test]
fn test_torn_final_record_with_bad_crc() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("c.log");
    write_log(&path, 4);
    let ranges = record_ranges(&path);

    // Damage the last byte of the file (its CRC)
    flip_byte(&path, ranges[3].1 - 1);

    let (rows, err) = replay_rows(&path);
    assert!(err.is_none(), "{:?}", err);
    assert_eq!(rows, vec![1, 2, 3]);
}

#[test]
fn test_mid_file_corruption_is_fatal() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("c.log");
    write_log(&path, 5);
    let ranges = record_ranges(&path);

    // Flip a payload byte of the third record
    let (start, _) = ranges[2];
    flip_byte(&path, start + 15);

    let (rows, err) = replay_rows(&path);
    assert_eq!(rows, vec![1, 2]);
    match err {
        Some(Error::Corruption { record, offset, .. }) => {
            assert_eq!(record, 2);
            assert_eq!(offset, start as u64);
        }
        other => panic!("expected corruption, got {:?}", other),
    }
}

#[test]
fn test_damaged_length_mid_file_is_fatal() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("c.log");
    write_log(&path, 5);
    let ranges = record_ranges(&path);

    // High byte of the third record's length: it now claims to run past EOF
    let (start, _) = ranges[2];
    flip_byte(&path, start + 3);

    let (rows, err) = replay_rows(&path);
    assert_eq!(rows, vec![1, 2]);
    match err {
        Some(Error::Corruption { record, offset, .. }) => {
            assert_eq!(record, 2);
            assert_eq!(offset, start as u64);
        }
        other => panic!("expected corruption, got {:?}", other),
    }

    // Reopening for append must not truncate the records after the damage
    assert!(replay(&path, &LogConfig::default()).unwrap().finish().is_err());
    assert_eq!(fs::metadata(&path).unwrap().len() as usize, ranges[4].1);
}

#[test]
fn test_tail_from_finish_keeps_every_record() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("c.log");
    let count = LogConfig::default().replay_batch as u64 * 2 + 88;
    write_log(&path, count);

    let summary = replay(&path, &LogConfig::default()).unwrap().finish().unwrap();
    assert_eq!(summary.records, count);
    assert_eq!(summary.tail.last_seq, count);

    let log = CommandLog::open(&path, LogConfig::default(), summary.tail).unwrap();
    log.persist(remove(count + 1)).unwrap();
    log.close().unwrap();

    let (rows, err) = replay_rows(&path);
    assert!(err.is_none(), "{:?}", err);
    assert_eq!(rows, (1..=count + 1).collect::<Vec<_>>());
}

#[test]
fn test_sequence_gap_is_fatal() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("c.log");
    write_log(&path, 2);

    // Append a well-formed record that skips seq 3
    let mut file = OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(&encode_frame(4, b"")).unwrap();
    file.write_all(&encode_frame(5, b"")).unwrap();

    let (rows, err) = replay_rows(&path);
    assert_eq!(rows, vec![1, 2]);
    let err = err.expect("gap must be reported");
    assert!(err.to_string().contains("sequence gap"), "{}", err);
}

#[test]
fn test_writer_truncates_torn_tail_and_appends() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("c.log");
    write_log(&path, 3);

    // Garbage after the last good record, as left by a crash mid-write
    let mut file = OpenOptions::new().write(true).open(&path).unwrap();
    file.seek(SeekFrom::End(0)).unwrap();
    file.write_all(&[0x40, 0, 0, 0, 1, 2, 3]).unwrap();
    drop(file);

    let mut replayed = replay(&path, &LogConfig::default()).unwrap();
    assert_eq!((&mut replayed).count(), 3);
    let summary = replayed.finish().unwrap();
    assert_eq!(summary.torn_bytes, 7);

    let log = CommandLog::open(&path, LogConfig::default(), summary.tail).unwrap();
    log.persist(remove(4)).unwrap();
    log.close().unwrap();

    let (rows, err) = replay_rows(&path);
    assert!(err.is_none(), "{:?}", err);
    assert_eq!(rows, vec![1, 2, 3, 4]);
}

mod truncation {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        /// Cutting the file anywhere after the header replays exactly the
        /// records that are still whole.
        #[test]
        fn any_truncation_replays_whole_prefix(cut in 0.0f64..=1.0) {
            let dir = TempDir::new().unwrap();
            let path = dir.path().join("c.log");
            write_log(&path, 6);
            let ranges = record_ranges(&path);
            let full = ranges.last().unwrap().1;
            let len = FILE_HEADER_SIZE + ((full - FILE_HEADER_SIZE) as f64 * cut) as usize;
            truncate(&path, len);

            let whole = ranges.iter().filter(|(_, end)| *end <= len).count() as u64;
            let (rows, err) = replay_rows(&path);
            prop_assert!(err.is_none(), "{:?}", err);
            prop_assert_eq!(rows, (1..=whole).collect::<Vec<_>>());
        }
    }
}
