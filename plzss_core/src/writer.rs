use std::io::{Seek, SeekFrom, Write};

use tracing::debug;
use xxhash_rust::xxh3::xxh3_64;

use crate::block::{max_encoded_len, EncodedBlock};
use crate::error::{LzssError, Result};
use crate::format::{
    Plz1Header, RecordHeader, CHECKSUM_SIZE, FLAG_HAS_CHECKSUM, FORMAT_VERSION, HEADER_SIZE,
    RECORD_HEADER_SIZE,
};

/// Container writer for PLZ1 files.
///
/// # Write contract
/// Call [`write_block`](Self::write_block) (or
/// [`write_batch`](Self::write_batch)) with encoded blocks in ascending id
/// order, starting at 0. Call [`finish`](Self::finish) to write back the
/// final header.
///
/// # Format layout written
/// ```text
/// [HEADER: 32 bytes placeholder]
/// [RECORD 0] [RECORD 1] ... [RECORD N-1]
///   record = raw_len:u32 encoded_len:u32 [checksum:u64] payload[encoded_len]
/// ← seek back to the header, overwrite it with real values
/// ```
pub struct Writer<W: Write + Seek> {
    inner: W,
    block_size: u32,
    flags: u16,
    /// Stream position of the header.
    start: u64,
    next_id: u32,
    raw_size: u64,
    /// Bytes written from the header start (mirrors the stream cursor).
    current_offset: u64,
}

impl<W: Write + Seek> Writer<W> {
    /// Start a container at the current position of `inner`.
    pub fn new(mut inner: W, block_size: u32, checksums: bool) -> Result<Self> {
        let start = inner.stream_position()?;
        // Write placeholder header (will be overwritten in finish())
        inner.write_all(&[0u8; HEADER_SIZE as usize])?;
        Ok(Self {
            inner,
            block_size,
            flags: if checksums { FLAG_HAS_CHECKSUM } else { 0 },
            start,
            next_id: 0,
            raw_size: 0,
            current_offset: HEADER_SIZE,
        })
    }

    /// Append one record. Lengths are checked against the block size before
    /// anything is written.
    pub fn write_block(&mut self, block: &EncodedBlock) -> Result<()> {
        if block.id() != self.next_id {
            return Err(LzssError::Framing(format!(
                "block {} written out of order, expected block {}",
                block.id(),
                self.next_id
            )));
        }
        if block.raw_len() > self.block_size {
            return Err(LzssError::CapacityExceeded {
                block: block.id(),
                needed: block.raw_len() as usize,
                capacity: self.block_size as usize,
            });
        }
        let encoded_capacity = max_encoded_len(self.block_size as usize);
        if block.len() > encoded_capacity {
            return Err(LzssError::CapacityExceeded {
                block: block.id(),
                needed: block.len(),
                capacity: encoded_capacity,
            });
        }

        let payload = block.as_bytes();
        let record = RecordHeader {
            raw_len: block.raw_len(),
            encoded_len: payload.len() as u32,
        };
        self.inner.write_all(&record.to_bytes())?;
        self.current_offset += RECORD_HEADER_SIZE;

        if self.flags & FLAG_HAS_CHECKSUM != 0 {
            self.inner.write_all(&xxh3_64(payload).to_le_bytes())?;
            self.current_offset += CHECKSUM_SIZE;
        }

        self.inner.write_all(payload)?;
        self.current_offset += payload.len() as u64;
        self.raw_size += block.raw_len() as u64;
        self.next_id = self.next_id.checked_add(1).ok_or_else(|| {
            LzssError::Framing(format!("more than {} blocks in one container", u32::MAX))
        })?;
        Ok(())
    }

    pub fn write_batch(&mut self, blocks: &[EncodedBlock]) -> Result<()> {
        for block in blocks {
            self.write_block(block)?;
        }
        Ok(())
    }

    /// Bytes of header and records written so far.
    pub fn bytes_written(&self) -> u64 {
        self.current_offset
    }

    /// Seal the container by writing the final header. The stream is left
    /// positioned after the last record.
    ///
    /// Returns the header that was written.
    pub fn finish(mut self) -> Result<Plz1Header> {
        let header = Plz1Header {
            version: FORMAT_VERSION,
            flags: self.flags,
            block_size: self.block_size,
            block_count: self.next_id,
            raw_size: self.raw_size,
        };

        // ── Seek back and write the real header ─────────────────────────────
        self.inner.seek(SeekFrom::Start(self.start))?;
        self.inner.write_all(&header.to_bytes())?;
        self.inner
            .seek(SeekFrom::Start(self.start + self.current_offset))?;
        self.inner.flush()?;

        debug!(
            blocks = header.block_count,
            raw_size = header.raw_size,
            container_size = self.current_offset,
            "container sealed"
        );
        Ok(header)
    }
}
