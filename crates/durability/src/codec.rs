//! Command payload encoding.
//!
//! Commands are MessagePack-encoded (`rmp-serde`, named fields) straight into
//! a framed buffer taken from a [`BufferPool`].

use crate::format::{begin_frame, finish_frame};
use parking_lot::Mutex;
use stratadoc_core::{Command, Error, Result};

/// Buffers larger than this are dropped instead of returned to the pool.
const MAX_POOLED_CAPACITY: usize = 1024 * 1024;

/// Reusable encode buffers shared by the encoder threads and the writer.
#[derive(Debug)]
pub struct BufferPool {
    buffers: Mutex<Vec<Vec<u8>>>,
    limit: usize,
}

impl BufferPool {
    /// Pool keeping at most `limit` idle buffers.
    pub fn new(limit: usize) -> Self {
        BufferPool {
            buffers: Mutex::new(Vec::with_capacity(limit)),
            limit,
        }
    }

    /// An empty buffer, reused when one is available.
    pub fn take(&self) -> Vec<u8> {
        self.buffers.lock().pop().unwrap_or_default()
    }

    /// Return a buffer for reuse.
    pub fn give(&self, mut buf: Vec<u8>) {
        if buf.capacity() > MAX_POOLED_CAPACITY {
            return;
        }
        buf.clear();
        let mut buffers = self.buffers.lock();
        if buffers.len() < self.limit {
            buffers.push(buf);
        }
    }

    /// Idle buffers currently held.
    pub fn idle(&self) -> usize {
        self.buffers.lock().len()
    }
}

/// Encode `command` as a complete framed record into `buf`.
pub fn encode_record(buf: &mut Vec<u8>, seq: u64, command: &Command) -> Result<()> {
    begin_frame(buf, seq);
    rmp_serde::encode::write_named(buf, command)
        .map_err(|e| Error::Serialization(format!("encode {}: {}", command.name(), e)))?;
    finish_frame(buf);
    Ok(())
}

/// Decode a record payload back into a command.
pub fn decode_command(payload: &[u8]) -> Result<Command> {
    rmp_serde::from_slice(payload).map_err(|e| Error::Serialization(e.to_string()))
}
