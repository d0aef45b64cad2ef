//! Log file header.

use std::io::{self, Read, Write};

/// Magic bytes identifying a StrataDoc log file: "SDOC"
pub const FILE_MAGIC: [u8; 4] = *b"SDOC";

/// Current file format version
pub const FILE_FORMAT_VERSION: u32 = 1;

/// Size of the file header in bytes
pub const FILE_HEADER_SIZE: usize = 16;

/// Log file header (16 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    /// Magic bytes: "SDOC"
    pub magic: [u8; 4],
    /// Format version
    pub format_version: u32,
    /// Creation time, microseconds since the Unix epoch
    pub created_micros: u64,
}

impl FileHeader {
    /// Header for a file created now.
    pub fn new(created_micros: u64) -> Self {
        FileHeader {
            magic: FILE_MAGIC,
            format_version: FILE_FORMAT_VERSION,
            created_micros,
        }
    }

    /// Serialize to bytes.
    pub fn to_bytes(&self) -> [u8; FILE_HEADER_SIZE] {
        let mut bytes = [0u8; FILE_HEADER_SIZE];
        bytes[0..4].copy_from_slice(&self.magic);
        bytes[4..8].copy_from_slice(&self.format_version.to_le_bytes());
        bytes[8..16].copy_from_slice(&self.created_micros.to_le_bytes());
        bytes
    }

    /// Deserialize from bytes.
    pub fn from_bytes(bytes: &[u8; FILE_HEADER_SIZE]) -> Self {
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[0..4]);
        let mut version = [0u8; 4];
        version.copy_from_slice(&bytes[4..8]);
        let mut created = [0u8; 8];
        created.copy_from_slice(&bytes[8..16]);
        FileHeader {
            magic,
            format_version: u32::from_le_bytes(version),
            created_micros: u64::from_le_bytes(created),
        }
    }

    /// Magic and version are both recognised.
    pub fn is_valid(&self) -> bool {
        self.magic == FILE_MAGIC && self.format_version == FILE_FORMAT_VERSION
    }

    /// Write the header to `out`.
    pub fn write_to(&self, out: &mut impl Write) -> io::Result<()> {
        out.write_all(&self.to_bytes())
    }

    /// Read a header from `input`.
    pub fn read_from(input: &mut impl Read) -> io::Result<Self> {
        let mut bytes = [0u8; FILE_HEADER_SIZE];
        input.read_exact(&mut bytes)?;
        Ok(Self::from_bytes(&bytes))
    }
}
