//! On-disk log format.
//!
//! ```text
//! ┌────────────────────────────────────┐
//! │ File Header (16 bytes)             │
//! ├────────────────────────────────────┤
//! │ Record 1                           │
//! ├────────────────────────────────────┤
//! │ Record 2                           │
//! ├────────────────────────────────────┤
//! │ ...                                │
//! └────────────────────────────────────┘
//! ```

pub mod header;
pub mod record;

pub use header::{FileHeader, FILE_HEADER_SIZE, FILE_MAGIC, FILE_FORMAT_VERSION};
pub use record::{
    begin_frame, decode_frame, encode_frame, finish_frame, peek_len, Frame, RecordError, MAX_RECORD_SIZE, MIN_RECORD_LEN, RECORD_FORMAT_VERSION,
};
