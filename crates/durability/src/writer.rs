//! Write-behind command log.
//!
//! `persist` assigns a sequence number and hands the command to a bounded
//! queue; it returns as soon as the queue accepts it. Encoder threads pull
//! from the shared queue and serialize in parallel into pooled buffers. A
//! single writer thread puts the encoded records back in sequence order and
//! appends them through a buffered file writer.
//!
//! ```text
//! persist ──► [jobs: bounded] ──► encoder 1..N ──► [encoded] ──► writer ──► BufWriter<File>
//!                                                               (reorder by seq)
//! ```
//!
//! # Thread Lifecycle
//!
//! Dropping the job sender is the shutdown signal: encoders exit once the
//! queue is drained, which disconnects the writer, which writes what is left,
//! flushes, fsyncs and exits. `close` joins all of them.
//!
//! # Failures
//!
//! The first write or encode failure is sticky. The writer stops appending,
//! keeps draining so producers never block, and every later `persist`, `sync`
//! or `close` reports the failure as [`Error::Durability`].

use crate::codec::{encode_record, BufferPool};
use crate::config::LogConfig;
use crate::format::{FileHeader, FILE_HEADER_SIZE};
use crate::mode::DurabilityMode;
use crate::reader::LogTail;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, RecvTimeoutError, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use stratadoc_core::{now_micros, Command, Error, Result};
use tracing::{debug, error, info, warn};

/// Cumulative command log counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogStats {
    /// Records appended to the file
    pub records_written: u64,
    /// Bytes appended to the file (framing included)
    pub bytes_written: u64,
    /// fsync calls
    pub syncs: u64,
}

/// State shared between the log handle and its threads.
struct Shared {
    failure: Mutex<Option<String>>,
    records_written: AtomicU64,
    bytes_written: AtomicU64,
    syncs: AtomicU64,
    pool: BufferPool,
}

impl Shared {
    fn new(pool_size: usize) -> Self {
        Shared {
            failure: Mutex::new(None),
            records_written: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
            syncs: AtomicU64::new(0),
            pool: BufferPool::new(pool_size),
        }
    }

    fn check(&self) -> Result<()> {
        match &*self.failure.lock() {
            Some(msg) => Err(Error::Durability(msg.clone())),
            None => Ok(()),
        }
    }

    fn fail(&self, msg: String) {
        let mut failure = self.failure.lock();
        if failure.is_none() {
            error!(target: "stratadoc::durability", error = %msg, "Command log failed");
            *failure = Some(msg);
        }
    }
}

enum Job {
    Record { seq: u64, command: Command },
    Sync { after: u64, ack: SyncSender<Result<()>> },
}

enum Encoded {
    Record { seq: u64, frame: Vec<u8> },
    Failed { seq: u64, error: String },
    Sync { after: u64, ack: SyncSender<Result<()>> },
}

/// Running encoder and writer threads for one open file.
struct Pipeline {
    jobs: SyncSender<Job>,
    next_seq: AtomicU64,
    encoders: Vec<JoinHandle<()>>,
    writer: JoinHandle<()>,
}

impl Pipeline {
    fn start(file: File, next_seq: u64, config: &LogConfig, shared: &Arc<Shared>) -> Result<Self> {
        let (jobs, job_rx) = sync_channel::<Job>(config.queue_capacity);
        let (encoded_tx, encoded_rx) = sync_channel::<Encoded>(config.queue_capacity);
        let job_rx = Arc::new(Mutex::new(job_rx));

        let mut encoders = Vec::with_capacity(config.encoder_threads);
        for i in 0..config.encoder_threads {
            let rx = Arc::clone(&job_rx);
            let tx = encoded_tx.clone();
            let shared = Arc::clone(shared);
            encoders.push(
                thread::Builder::new()
                    .name(format!("stratadoc-encode-{}", i))
                    .spawn(move || encode_loop(&rx, &tx, &shared))?,
            );
        }
        drop(encoded_tx);

        let writer = LogWriter {
            out: BufWriter::new(file),
            mode: config.mode,
            next_seq,
            pending: BTreeMap::new(),
            waiting: Vec::new(),
            dirty: false,
            last_sync: Instant::now(),
            failed: false,
            shared: Arc::clone(shared),
        };
        let writer = thread::Builder::new()
            .name("stratadoc-writer".into())
            .spawn(move || writer.run(encoded_rx))?;

        Ok(Pipeline {
            jobs,
            next_seq: AtomicU64::new(next_seq),
            encoders,
            writer,
        })
    }

    /// Drain, flush, fsync and join. Returns the last issued sequence number.
    fn shutdown(self) -> Result<u64> {
        let last_seq = self.next_seq.load(Ordering::SeqCst) - 1;
        drop(self.jobs);

        let mut panicked = false;
        for handle in self.encoders {
            panicked |= handle.join().is_err();
        }
        panicked |= self.writer.join().is_err();

        if panicked {
            return Err(Error::Durability("command log thread panicked".into()));
        }
        Ok(last_seq)
    }
}

fn encode_loop(jobs: &Mutex<Receiver<Job>>, out: &SyncSender<Encoded>, shared: &Shared) {
    loop {
        // The guard is released before encoding so other encoders can pull
        let job = jobs.lock().recv();
        let encoded = match job {
            Ok(Job::Record { seq, command }) => {
                let mut frame = shared.pool.take();
                match encode_record(&mut frame, seq, &command) {
                    Ok(()) => Encoded::Record { seq, frame },
                    Err(e) => {
                        shared.pool.give(frame);
                        Encoded::Failed {
                            seq,
                            error: e.to_string(),
                        }
                    }
                }
            }
            Ok(Job::Sync { after, ack }) => Encoded::Sync { after, ack },
            Err(_) => return,
        };
        if out.send(encoded).is_err() {
            return;
        }
    }
}

struct LogWriter {
    out: BufWriter<File>,
    mode: DurabilityMode,
    next_seq: u64,
    pending: BTreeMap<u64, std::result::Result<Vec<u8>, String>>,
    waiting: Vec<(u64, SyncSender<Result<()>>)>,
    dirty: bool,
    last_sync: Instant,
    failed: bool,
    shared: Arc<Shared>,
}

impl LogWriter {
    fn run(mut self, encoded: Receiver<Encoded>) {
        let tick = self.mode.tick();
        loop {
            match encoded.recv_timeout(tick) {
                Ok(Encoded::Record { seq, frame }) => {
                    self.pending.insert(seq, Ok(frame));
                    self.drain_ready();
                }
                Ok(Encoded::Failed { seq, error }) => {
                    self.pending.insert(seq, Err(error));
                    self.drain_ready();
                }
                Ok(Encoded::Sync { after, ack }) => self.waiting.push((after, ack)),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }

            if matches!(self.mode, DurabilityMode::Standard { .. })
                && self.dirty
                && self.last_sync.elapsed() >= tick
            {
                self.sync();
            }
            self.answer_syncs();
        }

        self.drain_ready();
        if !self.pending.is_empty() {
            self.fail(format!(
                "log closed with {} records waiting behind missing sequence {}",
                self.pending.len(),
                self.next_seq
            ));
        }
        if self.dirty {
            self.sync();
        }
        self.answer_syncs();
        for (_, ack) in self.waiting.drain(..) {
            let _ = ack.send(Err(Error::Closed));
        }
    }

    fn drain_ready(&mut self) {
        while let Some(entry) = self.pending.remove(&self.next_seq) {
            self.next_seq += 1;
            match entry {
                Ok(frame) => self.append(frame),
                Err(e) => self.fail(e),
            }
        }
    }

    fn append(&mut self, frame: Vec<u8>) {
        if !self.failed {
            match self.out.write_all(&frame) {
                Ok(()) => {
                    self.dirty = true;
                    self.shared.records_written.fetch_add(1, Ordering::Relaxed);
                    self.shared
                        .bytes_written
                        .fetch_add(frame.len() as u64, Ordering::Relaxed);
                    if self.mode.requires_immediate_fsync() {
                        self.sync();
                    }
                }
                Err(e) => self.fail(format!("write failed: {}", e)),
            }
        }
        self.shared.pool.give(frame);
    }

    fn sync(&mut self) {
        if self.failed {
            return;
        }
        let result = self
            .out
            .flush()
            .and_then(|()| self.out.get_ref().sync_data());
        match result {
            Ok(()) => {
                self.dirty = false;
                self.last_sync = Instant::now();
                self.shared.syncs.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => self.fail(format!("sync failed: {}", e)),
        }
    }

    /// Acknowledge sync requests whose records have all been written.
    fn answer_syncs(&mut self) {
        let written = self.next_seq - 1;
        if !self.waiting.iter().any(|(after, _)| *after <= written) {
            return;
        }
        if self.dirty {
            self.sync();
        }
        let shared = &self.shared;
        self.waiting.retain(|(after, ack)| {
            if *after <= written {
                let _ = ack.send(shared.check());
                false
            } else {
                true
            }
        });
    }

    fn fail(&mut self, msg: String) {
        self.failed = true;
        self.shared.fail(msg);
    }
}

/// Open `path` for appending at `tail`, creating it with a fresh header when
/// the tail holds no header.
fn open_for_append(path: &Path, tail: LogTail) -> Result<File> {
    if tail.valid_end < FILE_HEADER_SIZE as u64 {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        FileHeader::new(now_micros()).write_to(&mut file)?;
        file.sync_all()?;
        return Ok(file);
    }

    let mut file = OpenOptions::new().write(true).open(path)?;
    let len = file.metadata()?.len();
    if len < tail.valid_end {
        return Err(Error::Durability(format!(
            "{} is {} bytes, shorter than its replayed end {}",
            path.display(),
            len,
            tail.valid_end
        )));
    }
    if len > tail.valid_end {
        warn!(target: "stratadoc::durability", path = %path.display(),
            from = len, to = tail.valid_end, "Truncating partial record");
        file.set_len(tail.valid_end)?;
        file.sync_all()?;
    }
    file.seek(SeekFrom::Start(tail.valid_end))?;
    Ok(file)
}

/// Write `commands` to a new log file at `path`, numbered from 1, and fsync
/// it. Returns the number of records written.
pub fn write_log_file<I>(path: &Path, commands: I) -> Result<u64>
where
    I: IntoIterator<Item = Command>,
{
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)?;
    let mut out = BufWriter::new(file);
    FileHeader::new(now_micros()).write_to(&mut out)?;

    let mut buf = Vec::new();
    let mut seq = 0;
    for command in commands {
        seq += 1;
        encode_record(&mut buf, seq, &command)?;
        out.write_all(&buf)?;
    }

    out.flush()?;
    out.get_ref().sync_all()?;
    Ok(seq)
}

fn sync_parent_dir(path: &Path) {
    let Some(dir) = path.parent() else { return };
    // Directory fsync is not supported everywhere
    if let Ok(dir) = File::open(dir) {
        let _ = dir.sync_all();
    }
}

/// Append-only command log for one collection.
pub struct CommandLog {
    path: PathBuf,
    config: LogConfig,
    pipeline: RwLock<Option<Pipeline>>,
    shared: Arc<Shared>,
    closed: AtomicBool,
}

impl CommandLog {
    /// Open the log at `path` for appending after `tail`.
    ///
    /// `tail` normally comes from replaying the same file
    /// ([`ReplaySummary::tail`]); anything past it is truncated.
    /// `LogTail::default()` starts a new, empty log. In Cache mode no file is
    /// touched.
    ///
    /// [`ReplaySummary::tail`]: crate::ReplaySummary
    pub fn open(path: impl Into<PathBuf>, config: LogConfig, tail: LogTail) -> Result<Self> {
        config.validate()?;
        let path = path.into();
        let shared = Arc::new(Shared::new(config.buffer_pool_size));

        let pipeline = if config.mode.requires_log() {
            let file = open_for_append(&path, tail)?;
            Some(Pipeline::start(file, tail.last_seq + 1, &config, &shared)?)
        } else {
            None
        };

        debug!(target: "stratadoc::durability", path = %path.display(),
            mode = config.mode.description(), next_seq = tail.last_seq + 1, "Command log opened");

        Ok(CommandLog {
            path,
            config,
            pipeline: RwLock::new(pipeline),
            shared,
            closed: AtomicBool::new(false),
        })
    }

    /// Log file location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Durability mode.
    pub fn mode(&self) -> DurabilityMode {
        self.config.mode
    }

    /// Counters since open.
    pub fn stats(&self) -> LogStats {
        LogStats {
            records_written: self.shared.records_written.load(Ordering::Relaxed),
            bytes_written: self.shared.bytes_written.load(Ordering::Relaxed),
            syncs: self.shared.syncs.load(Ordering::Relaxed),
        }
    }

    /// True once `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Queue `command` for writing.
    ///
    /// Returns once the queue has accepted it (blocking while the queue is
    /// full), not once it is on disk. Reports an earlier background failure
    /// as [`Error::Durability`].
    pub fn persist(&self, command: Command) -> Result<()> {
        if self.is_closed() {
            return Err(Error::Closed);
        }
        self.shared.check()?;

        let pipeline = self.pipeline.read();
        let Some(pipeline) = pipeline.as_ref() else {
            return if self.config.mode.requires_log() {
                Err(Error::Closed)
            } else {
                Ok(())
            };
        };

        let seq = pipeline.next_seq.fetch_add(1, Ordering::SeqCst);
        pipeline
            .jobs
            .send(Job::Record { seq, command })
            .map_err(|_| Error::Closed)
    }

    /// Block until everything persisted so far is written and fsynced.
    pub fn sync(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::Closed);
        }
        let pipeline = self.pipeline.read();
        let Some(pipeline) = pipeline.as_ref() else {
            return self.shared.check();
        };

        let after = pipeline.next_seq.load(Ordering::SeqCst) - 1;
        let (ack, done) = sync_channel(1);
        pipeline
            .jobs
            .send(Job::Sync { after, ack })
            .map_err(|_| Error::Closed)?;
        done.recv().map_err(|_| Error::Closed)?
    }

    /// Replace the file with `commands`, numbered from 1.
    ///
    /// Everything queued is drained first. The new content goes to a
    /// temporary file that is fsynced and renamed over the log; appending
    /// resumes on the new file. The caller must keep new commands from being
    /// persisted meanwhile. Returns the number of records written.
    pub fn compact<I>(&self, commands: I) -> Result<u64>
    where
        I: IntoIterator<Item = Command>,
    {
        if self.is_closed() {
            return Err(Error::Closed);
        }
        if !self.config.mode.requires_log() {
            return Ok(0);
        }

        let mut guard = self.pipeline.write();
        let last_seq = match guard.take() {
            Some(pipeline) => pipeline.shutdown()?,
            None => return Err(Error::Closed),
        };
        self.shared.check()?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".compact");
        let tmp = PathBuf::from(tmp);

        let rewritten = write_log_file(&tmp, commands).and_then(|count| {
            fs::rename(&tmp, &self.path)?;
            sync_parent_dir(&self.path);
            Ok(count)
        });

        let (tail, outcome) = match rewritten {
            Ok(count) => {
                let valid_end = fs::metadata(&self.path)?.len();
                (
                    LogTail {
                        valid_end,
                        last_seq: count,
                    },
                    Ok(count),
                )
            }
            Err(e) => {
                let _ = fs::remove_file(&tmp);
                warn!(target: "stratadoc::durability", path = %self.path.display(), error = %e,
                    "Compaction failed, resuming on the existing log");
                let valid_end = fs::metadata(&self.path)?.len();
                (LogTail { valid_end, last_seq }, Err(e))
            }
        };

        let file = open_for_append(&self.path, tail)?;
        *guard = Some(Pipeline::start(file, tail.last_seq + 1, &self.config, &self.shared)?);

        if let Ok(count) = &outcome {
            info!(target: "stratadoc::durability", path = %self.path.display(),
                records = count, bytes = tail.valid_end, "Command log compacted");
        }
        outcome
    }

    /// Drain the queue, flush, fsync and close the file.
    ///
    /// Safe to call more than once; later calls do nothing.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if let Some(pipeline) = self.pipeline.write().take() {
            pipeline.shutdown()?;
        }
        debug!(target: "stratadoc::durability", path = %self.path.display(),
            records = self.shared.records_written.load(Ordering::Relaxed), "Command log closed");
        self.shared.check()
    }
}

impl Drop for CommandLog {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            error!(target: "stratadoc::durability", error = %e, "Command log close failed on drop");
        }
    }
}

impl std::fmt::Debug for CommandLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandLog")
            .field("path", &self.path)
            .field("mode", &self.config.mode)
            .field("closed", &self.is_closed())
            .finish()
    }
}
