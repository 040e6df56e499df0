use crate::error::{LzssError, Result};

/// Magic bytes for PLZ1 files.
/// 6 bytes: "PLZ1\n" followed by one null byte.
pub const MAGIC: &[u8; 6] = b"PLZ1\n\x00";

/// Only container version written and accepted.
pub const FORMAT_VERSION: u16 = 1;

/// Fixed size of the PLZ1 file header in bytes.
///   magic[6] + version:u16 + flags:u16 + block_size:u32
///   + block_count:u32 + raw_size:u64 + reserved[6]
///   = 6 + 2 + 2 + 4 + 4 + 8 + 6 = 32
pub const HEADER_SIZE: u64 = 32;

/// Size of the fixed part of a block record, in bytes.
///   raw_len:u32 + encoded_len:u32 = 8
pub const RECORD_HEADER_SIZE: u64 = 8;

/// Size of the optional per-record checksum, in bytes.
pub const CHECKSUM_SIZE: u64 = 8;

/// Default block size: 1 MiB.
pub const DEFAULT_BLOCK_SIZE: u32 = 1024 * 1024;

/// Largest block size written or accepted: 64 MiB. Bounds the buffers a
/// header can make the reader allocate.
pub const MAX_BLOCK_SIZE: u32 = 64 * 1024 * 1024;

/// Inputs below this size skip the parallel backend.
pub const DEFAULT_PARALLEL_THRESHOLD: u64 = 1024 * 1024;

// ── Flags ──────────────────────────────────────────────────────────────────

/// Each record carries an xxhash3-64 checksum of its encoded payload.
pub const FLAG_HAS_CHECKSUM: u16 = 1 << 0;

const KNOWN_FLAGS: u16 = FLAG_HAS_CHECKSUM;

// ── Header ─────────────────────────────────────────────────────────────────

/// Decoded representation of the 32-byte PLZ1 file header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plz1Header {
    pub version: u16,
    pub flags: u16,
    /// Nominal raw bytes per block (the last block may be smaller).
    pub block_size: u32,
    pub block_count: u32,
    /// Sum of the raw lengths of all blocks.
    pub raw_size: u64,
}

impl Plz1Header {
    /// Serialize to exactly `HEADER_SIZE` bytes.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE as usize] {
        let mut buf = [0u8; HEADER_SIZE as usize];
        buf[..6].copy_from_slice(MAGIC);
        buf[6..8].copy_from_slice(&self.version.to_le_bytes());
        buf[8..10].copy_from_slice(&self.flags.to_le_bytes());
        buf[10..14].copy_from_slice(&self.block_size.to_le_bytes());
        buf[14..18].copy_from_slice(&self.block_count.to_le_bytes());
        buf[18..26].copy_from_slice(&self.raw_size.to_le_bytes());
        // reserved[6] stays zero
        buf
    }

    /// Deserialize from `HEADER_SIZE` bytes, checking magic, version and flags.
    pub fn from_bytes(buf: &[u8; HEADER_SIZE as usize]) -> Result<Self> {
        if &buf[..6] != MAGIC {
            return Err(LzssError::Framing(
                "invalid magic bytes, not a PLZ1 file".into(),
            ));
        }
        let header = Self {
            version: u16::from_le_bytes([buf[6], buf[7]]),
            flags: u16::from_le_bytes([buf[8], buf[9]]),
            block_size: u32::from_le_bytes([buf[10], buf[11], buf[12], buf[13]]),
            block_count: u32::from_le_bytes([buf[14], buf[15], buf[16], buf[17]]),
            raw_size: u64::from_le_bytes([
                buf[18], buf[19], buf[20], buf[21], buf[22], buf[23], buf[24], buf[25],
            ]),
        };
        if header.version != FORMAT_VERSION {
            return Err(LzssError::Framing(format!(
                "unsupported PLZ1 version {} (only version {} is supported)",
                header.version, FORMAT_VERSION
            )));
        }
        if header.flags & !KNOWN_FLAGS != 0 {
            return Err(LzssError::Framing(format!(
                "unknown header flags 0x{:04x}",
                header.flags & !KNOWN_FLAGS
            )));
        }
        if (header.block_size as usize) < crate::lzss::MIN_MATCH {
            return Err(LzssError::Framing(format!(
                "block size {} is below the minimum match length",
                header.block_size
            )));
        }
        if header.block_size > MAX_BLOCK_SIZE {
            return Err(LzssError::Framing(format!(
                "block size {} exceeds the {} byte maximum",
                header.block_size, MAX_BLOCK_SIZE
            )));
        }
        Ok(header)
    }

    pub fn has_flag(&self, flag: u16) -> bool {
        self.flags & flag != 0
    }
}

// ── Block record ────────────────────────────────────────────────────────────

/// Fixed fields in front of every block payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordHeader {
    /// Length of the original uncompressed block in bytes.
    pub raw_len: u32,
    /// Length of the encoded payload that follows, in bytes.
    pub encoded_len: u32,
}

impl RecordHeader {
    pub fn to_bytes(&self) -> [u8; RECORD_HEADER_SIZE as usize] {
        let mut buf = [0u8; RECORD_HEADER_SIZE as usize];
        buf[0..4].copy_from_slice(&self.raw_len.to_le_bytes());
        buf[4..8].copy_from_slice(&self.encoded_len.to_le_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8; RECORD_HEADER_SIZE as usize]) -> Self {
        Self {
            raw_len: u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]),
            encoded_len: u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]),
        }
    }
}

/// Location and size of one record, as reported by [`crate::Reader::scan`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordInfo {
    pub id: u32,
    /// Byte offset of the record's fixed fields from the start of the file.
    pub offset: u64,
    pub raw_len: u32,
    pub encoded_len: u32,
    /// Zero when the file carries no checksums.
    pub checksum: u64,
}
