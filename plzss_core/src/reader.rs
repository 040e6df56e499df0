use std::io::{self, ErrorKind, Read};

use xxhash_rust::xxh3::xxh3_64;

use crate::block::{max_encoded_len, EncodedBlock};
use crate::error::{LzssError, Result};
use crate::format::{
    Plz1Header, RecordHeader, RecordInfo, CHECKSUM_SIZE, FLAG_HAS_CHECKSUM, HEADER_SIZE,
    RECORD_HEADER_SIZE,
};

/// Sequential reader for PLZ1 files.
///
/// # Open sequence
/// 1. Read the 32-byte header (magic, version, block size, block count,
///    raw size).
/// 2. Hand out records in id order with [`read_block`](Self::read_block) /
///    [`read_batch`](Self::read_batch), checking lengths before allocating
///    and verifying checksums when the file carries them.
/// 3. [`finish`](Self::finish) confirms the container held exactly the
///    declared number of records and nothing after them.
pub struct Reader<R: Read> {
    inner: R,
    pub header: Plz1Header,
    next_id: u32,
    raw_seen: u64,
    /// Bytes consumed from the header start.
    offset: u64,
}

impl<R: Read> Reader<R> {
    /// Read and validate the header at the current position of `inner`.
    pub fn open(mut inner: R) -> Result<Self> {
        let mut header_buf = [0u8; HEADER_SIZE as usize];
        read_exact_or(&mut inner, &mut header_buf, || {
            "input is too short for a PLZ1 header".to_string()
        })?;
        let header = Plz1Header::from_bytes(&header_buf)?;
        Ok(Self {
            inner,
            header,
            next_id: 0,
            raw_seen: 0,
            offset: HEADER_SIZE,
        })
    }

    /// Total number of blocks declared in the header.
    #[inline]
    pub fn block_count(&self) -> u32 {
        self.header.block_count
    }

    /// Nominal raw bytes per block (the last block may be smaller).
    #[inline]
    pub fn block_size(&self) -> u32 {
        self.header.block_size
    }

    /// Total uncompressed size declared in the header.
    #[inline]
    pub fn raw_size(&self) -> u64 {
        self.header.raw_size
    }

    /// Records handed out so far.
    pub fn blocks_read(&self) -> u32 {
        self.next_id
    }

    /// Next record, or `None` once the declared count has been read.
    pub fn read_block(&mut self) -> Result<Option<EncodedBlock>> {
        let Some(info) = self.read_record_prefix()? else {
            return Ok(None);
        };
        let id = info.id;

        // Grows with the bytes actually present, not the declared length.
        let mut payload = Vec::new();
        (&mut self.inner)
            .take(info.encoded_len as u64)
            .read_to_end(&mut payload)?;
        if payload.len() != info.encoded_len as usize {
            return Err(LzssError::Framing(format!(
                "record {} is cut short, expected {} payload bytes",
                id, info.encoded_len
            )));
        }
        self.offset += payload.len() as u64;

        if self.header.has_flag(FLAG_HAS_CHECKSUM) {
            let computed = xxh3_64(&payload);
            if computed != info.checksum {
                return Err(LzssError::ChecksumMismatch {
                    block: id,
                    expected: info.checksum,
                    actual: computed,
                });
            }
        }

        let capacity = max_encoded_len(self.header.block_size as usize);
        Ok(Some(EncodedBlock::new(id, info.raw_len, payload, capacity)?))
    }

    /// Up to `max_blocks` records; empty once the declared count is reached.
    pub fn read_batch(&mut self, max_blocks: usize) -> Result<Vec<EncodedBlock>> {
        let mut batch = Vec::new();
        while batch.len() < max_blocks {
            match self.read_block()? {
                Some(block) => batch.push(block),
                None => break,
            }
        }
        Ok(batch)
    }

    /// Walk every remaining record without decoding or verifying payloads,
    /// then run the same end-of-container checks as [`finish`](Self::finish).
    pub fn scan(mut self) -> Result<Vec<RecordInfo>> {
        let mut infos = Vec::new();
        while let Some(info) = self.read_record_prefix()? {
            let skipped = io::copy(
                &mut (&mut self.inner).take(info.encoded_len as u64),
                &mut io::sink(),
            )?;
            if skipped != info.encoded_len as u64 {
                return Err(LzssError::Framing(format!(
                    "record {} is cut short, expected {} payload bytes",
                    info.id, info.encoded_len
                )));
            }
            self.offset += skipped;
            infos.push(info);
        }
        self.finish()?;
        Ok(infos)
    }

    /// Check that the container ended exactly where the header said it would.
    pub fn finish(mut self) -> Result<()> {
        if self.next_id != self.header.block_count {
            return Err(LzssError::Framing(format!(
                "only {} of {} declared blocks were read",
                self.next_id, self.header.block_count
            )));
        }
        let mut probe = [0u8; 1];
        loop {
            match self.inner.read(&mut probe) {
                Ok(0) => break,
                Ok(_) => {
                    return Err(LzssError::Framing(format!(
                        "trailing bytes after the {} declared blocks",
                        self.header.block_count
                    )))
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        if self.raw_seen != self.header.raw_size {
            return Err(LzssError::Framing(format!(
                "records hold {} raw bytes but the header declares {}",
                self.raw_seen, self.header.raw_size
            )));
        }
        Ok(())
    }

    /// Read and validate the fixed fields of the next record.
    fn read_record_prefix(&mut self) -> Result<Option<RecordInfo>> {
        if self.next_id == self.header.block_count {
            return Ok(None);
        }
        let id = self.next_id;
        let declared = self.header.block_count;
        let record_offset = self.offset;

        let mut prefix = [0u8; RECORD_HEADER_SIZE as usize];
        read_exact_or(&mut self.inner, &mut prefix, || {
            format!("header declares {declared} blocks but only {id} records were found")
        })?;
        let record = RecordHeader::from_bytes(&prefix);
        self.offset += RECORD_HEADER_SIZE;

        if record.raw_len > self.header.block_size {
            return Err(LzssError::CapacityExceeded {
                block: id,
                needed: record.raw_len as usize,
                capacity: self.header.block_size as usize,
            });
        }
        let encoded_capacity = max_encoded_len(self.header.block_size as usize);
        if record.encoded_len as usize > encoded_capacity {
            return Err(LzssError::CapacityExceeded {
                block: id,
                needed: record.encoded_len as usize,
                capacity: encoded_capacity,
            });
        }

        let checksum = if self.header.has_flag(FLAG_HAS_CHECKSUM) {
            let mut buf = [0u8; CHECKSUM_SIZE as usize];
            read_exact_or(&mut self.inner, &mut buf, || {
                format!("record {id} is cut short inside its checksum")
            })?;
            self.offset += CHECKSUM_SIZE;
            u64::from_le_bytes(buf)
        } else {
            0
        };

        self.next_id += 1;
        self.raw_seen += record.raw_len as u64;
        Ok(Some(RecordInfo {
            id,
            offset: record_offset,
            raw_len: record.raw_len,
            encoded_len: record.encoded_len,
            checksum,
        }))
    }
}

/// `read_exact` that reports a short read as a framing error.
fn read_exact_or<R: Read>(
    inner: &mut R,
    buf: &mut [u8],
    describe: impl FnOnce() -> String,
) -> Result<()> {
    match inner.read_exact(buf) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => Err(LzssError::Framing(describe())),
        Err(e) => Err(e.into()),
    }
}
