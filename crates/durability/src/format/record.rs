//! Record framing.
//!
//! ```text
//! ┌─────────────────┬────────────┬───────────┬─────────────────────┬──────────┐
//! │ Length (4 bytes)│ Version (1)│ Seq (8)   │ Payload (variable)  │ CRC32 (4)│
//! └─────────────────┴────────────┴───────────┴─────────────────────┴──────────┘
//! ```
//!
//! The length counts everything after itself (version + seq + payload + crc).
//! The CRC covers version, seq and payload.

use crc32fast::Hasher;

/// Current record format version
pub const RECORD_FORMAT_VERSION: u8 = 1;

/// Smallest valid length field: version + seq + crc with an empty payload
pub const MIN_RECORD_LEN: usize = 1 + 8 + 4;

/// Largest accepted length field (64MB)
pub const MAX_RECORD_SIZE: usize = 64 * 1024 * 1024;

const LEN_SIZE: usize = 4;
const CRC_SIZE: usize = 4;

/// Framing errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    /// Not enough bytes for a complete record
    #[error("Insufficient data for record")]
    InsufficientData,

    /// Length field outside the accepted range
    #[error("Invalid record length {0}")]
    InvalidLength(usize),

    /// Stored checksum does not match the content
    #[error("Checksum mismatch: expected {expected:#010x}, computed {computed:#010x}")]
    ChecksumMismatch {
        /// CRC stored in the record
        expected: u32,
        /// CRC computed over the record content
        computed: u32,
    },

    /// Record written by an unknown format version
    #[error("Unsupported record format version {0}")]
    UnsupportedVersion(u8),
}

/// A validated record borrowed from a byte buffer.
#[derive(Debug, PartialEq, Eq)]
pub struct Frame<'a> {
    /// Log sequence number
    pub seq: u64,
    /// Encoded command
    pub payload: &'a [u8],
    /// Total bytes the record occupies, length field included
    pub consumed: usize,
}

/// Start a frame in `buf`: reserve the length field, then version and seq.
///
/// The caller appends the payload and finishes with [`finish_frame`].
pub fn begin_frame(buf: &mut Vec<u8>, seq: u64) {
    buf.clear();
    buf.extend_from_slice(&[0u8; LEN_SIZE]);
    buf.push(RECORD_FORMAT_VERSION);
    buf.extend_from_slice(&seq.to_le_bytes());
}

/// Append the checksum and patch the length field.
pub fn finish_frame(buf: &mut Vec<u8>) {
    let crc = compute_crc(&buf[LEN_SIZE..]);
    buf.extend_from_slice(&crc.to_le_bytes());
    let len = (buf.len() - LEN_SIZE) as u32;
    buf[..LEN_SIZE].copy_from_slice(&len.to_le_bytes());
}

/// Frame `payload` into a fresh buffer.
pub fn encode_frame(seq: u64, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(LEN_SIZE + MIN_RECORD_LEN + payload.len());
    begin_frame(&mut buf, seq);
    buf.extend_from_slice(payload);
    finish_frame(&mut buf);
    buf
}

/// Length field of the record starting at `bytes`, if at least four bytes
/// are present.
pub fn peek_len(bytes: &[u8]) -> Option<usize> {
    let field: [u8; LEN_SIZE] = bytes.get(..LEN_SIZE)?.try_into().ok()?;
    Some(u32::from_le_bytes(field) as usize)
}

/// Validate and split the record at the start of `bytes`.
pub fn decode_frame(bytes: &[u8]) -> Result<Frame<'_>, RecordError> {
    let length = peek_len(bytes).ok_or(RecordError::InsufficientData)?;

    if bytes.len() < LEN_SIZE + length {
        return Err(RecordError::InsufficientData);
    }
    if !(MIN_RECORD_LEN..=MAX_RECORD_SIZE).contains(&length) {
        return Err(RecordError::InvalidLength(length));
    }

    let body = &bytes[LEN_SIZE..LEN_SIZE + length];
    let (content, crc_bytes) = body.split_at(length - CRC_SIZE);

    let mut stored = [0u8; CRC_SIZE];
    stored.copy_from_slice(crc_bytes);
    let expected = u32::from_le_bytes(stored);
    let computed = compute_crc(content);
    if expected != computed {
        return Err(RecordError::ChecksumMismatch { expected, computed });
    }

    let version = content[0];
    if version != RECORD_FORMAT_VERSION {
        return Err(RecordError::UnsupportedVersion(version));
    }

    let mut seq = [0u8; 8];
    seq.copy_from_slice(&content[1..9]);

    Ok(Frame {
        seq: u64::from_le_bytes(seq),
        payload: &content[9..],
        consumed: LEN_SIZE + length,
    })
}

fn compute_crc(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}
