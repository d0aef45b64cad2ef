//! Log replay.
//!
//! A reader thread validates frames sequentially, decodes them in batches on
//! the rayon pool, and streams the commands over a bounded channel in log
//! order. Collecting a parallel iterator preserves input order, so the batch
//! never needs resequencing after decode.
//!
//! # Torn tails
//!
//! A crash can leave the last record half-written. A record cut short at end
//! of file, or a final record whose checksum fails and which ends exactly at
//! end of file, is treated as absent: replay stops there without error and
//! reports where the valid prefix ends so the writer can truncate it. The same
//! damage anywhere before the last record is corruption: a damaged length
//! field that seems to run past end of file is only a torn tail if no
//! well-formed successor record follows it.

use crate::codec::decode_command;
use crate::config::LogConfig;
use crate::format::{
    decode_frame, peek_len, FileHeader, RecordError, FILE_HEADER_SIZE, MAX_RECORD_SIZE,
    MIN_RECORD_LEN,
};
use rayon::prelude::*;
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::thread::{self, JoinHandle};
use stratadoc_core::{Command, Error, Result};
use tracing::{debug, warn};

/// Where a log's valid content ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogTail {
    /// Byte offset just past the last valid record (0 for a missing or
    /// headerless file)
    pub valid_end: u64,
    /// Sequence number of the last valid record (0 if none)
    pub last_seq: u64,
}

/// Outcome of a completed replay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    /// Records replayed
    pub records: u64,
    /// End of the valid prefix
    pub tail: LogTail,
    /// Bytes past the valid prefix that were ignored
    pub torn_bytes: u64,
}

/// Stream of replayed commands, in log order.
///
/// The iterator yields `Ok` commands until the log ends; if the log is
/// corrupt, the last item is the error. Call [`Replay::finish`] afterwards for
/// the [`ReplaySummary`].
pub struct Replay {
    commands: Option<Receiver<Command>>,
    reader: Option<JoinHandle<Result<ReplaySummary>>>,
    summary: Option<ReplaySummary>,
    failed: bool,
}

impl Replay {
    /// Wait for the reader and return the summary.
    ///
    /// Stopping early is allowed: once the channel is dropped the reader
    /// keeps validating without delivering, so the summary always describes
    /// the whole file.
    pub fn finish(mut self) -> Result<ReplaySummary> {
        self.commands = None;
        if let Some(outcome) = self.join() {
            outcome?;
        }
        if self.failed {
            return Err(Error::Durability("replay stopped on an earlier error".into()));
        }
        Ok(self.summary.unwrap_or_default())
    }

    fn join(&mut self) -> Option<Result<()>> {
        let handle = self.reader.take()?;
        let outcome = match handle.join() {
            Ok(Ok(summary)) => {
                self.summary = Some(summary);
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(Error::Durability("replay reader thread panicked".into())),
        };
        Some(outcome)
    }
}

impl Iterator for Replay {
    type Item = Result<Command>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(rx) = &self.commands {
            if let Ok(command) = rx.recv() {
                return Some(Ok(command));
            }
        }
        self.commands = None;
        match self.join()? {
            Ok(()) => None,
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

impl Drop for Replay {
    fn drop(&mut self) {
        self.commands = None;
        let _ = self.join();
    }
}

/// Replay the log at `path`. A missing file replays as empty.
pub fn replay(path: &Path, config: &LogConfig) -> Result<Replay> {
    let batch = config.replay_batch.max(1);
    let (tx, rx) = sync_channel(batch);
    let path = path.to_path_buf();

    let reader = thread::Builder::new()
        .name("stratadoc-replay".into())
        .spawn(move || read_log(&path, batch, &tx))?;

    Ok(Replay {
        commands: Some(rx),
        reader: Some(reader),
        summary: None,
        failed: false,
    })
}

struct Pending {
    record: u64,
    offset: u64,
    payload: Vec<u8>,
}

/// Decode a batch in parallel and send it in order. Once a send fails the
/// consumer is gone and later batches are only decoded.
fn flush_batch(batch: &mut Vec<Pending>, tx: &mut Option<&SyncSender<Command>>) -> Result<()> {
    let decoded: Vec<Result<Command>> = batch
        .par_iter()
        .map(|p| decode_command(&p.payload))
        .collect();

    for (pending, command) in batch.drain(..).zip(decoded) {
        let command = command.map_err(|e| Error::Corruption {
            record: pending.record,
            offset: pending.offset,
            reason: format!("undecodable payload: {}", e),
        })?;
        if let Some(sender) = *tx {
            if sender.send(command).is_err() {
                *tx = None;
            }
        }
    }
    Ok(())
}

/// True if a well-formed record numbered `seq` starts anywhere in `rest`.
fn successor_follows(rest: &[u8], seq: u64) -> bool {
    let wanted = seq.to_le_bytes();
    (1..rest.len()).any(|at| {
        rest.get(at + 5..at + 13) == Some(&wanted[..])
            && decode_frame(&rest[at..]).map_or(false, |frame| frame.seq == seq)
    })
}

/// Classify damage at `offset` that appears to run past end of file.
fn torn_or_corrupt(path: &Path, offset: u64, seq: u64, corrupt: Error) -> Result<Option<Error>> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(offset))?;
    let mut rest = Vec::new();
    file.read_to_end(&mut rest)?;
    Ok(successor_follows(&rest, seq).then_some(corrupt))
}

/// Read as many bytes as are available, up to `buf.len()`.
fn read_full(input: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match input.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

fn read_log(path: &Path, batch_size: usize, tx: &SyncSender<Command>) -> Result<ReplaySummary> {
    let mut tx = Some(tx);
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(ReplaySummary::default()),
        Err(e) => return Err(e.into()),
    };
    let file_len = file.metadata()?.len();
    let mut input = BufReader::new(file);

    if file_len < FILE_HEADER_SIZE as u64 {
        if file_len > 0 {
            warn!(target: "stratadoc::durability", path = %path.display(), bytes = file_len,
                "Ignoring log with torn header");
        }
        return Ok(ReplaySummary {
            torn_bytes: file_len,
            ..ReplaySummary::default()
        });
    }

    let header = FileHeader::read_from(&mut input)?;
    if !header.is_valid() {
        return Err(Error::Corruption {
            record: 0,
            offset: 0,
            reason: format!(
                "unrecognised file header (magic {:?}, version {})",
                header.magic, header.format_version
            ),
        });
    }

    let mut offset = FILE_HEADER_SIZE as u64;
    let mut summary = ReplaySummary {
        tail: LogTail {
            valid_end: offset,
            last_seq: 0,
        },
        ..ReplaySummary::default()
    };
    let mut batch = Vec::with_capacity(batch_size);
    let mut buf = Vec::new();
    let mut fatal = None;

    loop {
        let record = summary.records;
        let corrupt = |reason: String| Error::Corruption {
            record,
            offset,
            reason,
        };

        buf.resize(4, 0);
        let got = read_full(&mut input, &mut buf[..4])?;
        if got < 4 {
            // Clean end of file, or a length field cut short
            break;
        }

        let length = peek_len(&buf).unwrap_or_default();
        let end = offset + 4 + length as u64;
        let next_seq = summary.tail.last_seq + 2;
        if !(MIN_RECORD_LEN..=MAX_RECORD_SIZE).contains(&length) {
            let reason = RecordError::InvalidLength(length).to_string();
            fatal = if end > file_len {
                // Garbage length on the final bytes of the file, unless a
                // later record proves otherwise
                torn_or_corrupt(path, offset, next_seq, corrupt(reason))?
            } else {
                Some(corrupt(reason))
            };
            break;
        }

        buf.resize(4 + length, 0);
        let got = read_full(&mut input, &mut buf[4..])?;
        if got < length {
            let reason = format!("record length {} runs past end of file", length);
            fatal = torn_or_corrupt(path, offset, next_seq, corrupt(reason))?;
            break;
        }

        let frame = match decode_frame(&buf) {
            Ok(frame) => frame,
            Err(RecordError::ChecksumMismatch { .. }) if end == file_len => {
                warn!(target: "stratadoc::durability", record, offset,
                    "Final record failed its checksum, treating as torn write");
                break;
            }
            Err(e) => {
                fatal = Some(corrupt(e.to_string()));
                break;
            }
        };

        let expected = summary.tail.last_seq + 1;
        if frame.seq != expected {
            fatal = Some(corrupt(format!(
                "sequence gap: expected {}, found {}",
                expected, frame.seq
            )));
            break;
        }

        batch.push(Pending {
            record,
            offset,
            payload: frame.payload.to_vec(),
        });
        summary.records += 1;
        summary.tail.last_seq = frame.seq;
        offset = end;
        summary.tail.valid_end = offset;

        if batch.len() >= batch_size {
            flush_batch(&mut batch, &mut tx)?;
        }
    }

    // Records before a damaged one are still delivered
    flush_batch(&mut batch, &mut tx)?;
    if let Some(e) = fatal {
        return Err(e);
    }

    summary.torn_bytes = file_len - summary.tail.valid_end;
    if summary.torn_bytes > 0 {
        warn!(target: "stratadoc::durability", path = %path.display(),
            valid_end = summary.tail.valid_end, torn_bytes = summary.torn_bytes,
            "Log ends with a partial record");
    }
    debug!(target: "stratadoc::durability", path = %path.display(),
        records = summary.records, "Replay complete");

    Ok(summary)
}
