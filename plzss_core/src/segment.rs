use std::io::{ErrorKind, Read};

use crate::block::RawBlock;
use crate::error::{LzssError, Result};

/// Cut `input` into `block_size` blocks with dense ids from 0. Only the last
/// block may be short; nothing is padded.
pub fn split(input: &[u8], block_size: u32) -> Result<Vec<RawBlock>> {
    let size = block_size as usize;
    if size == 0 {
        return Err(LzssError::Config("block size must be non-zero".into()));
    }
    input
        .chunks(size)
        .enumerate()
        .map(|(i, chunk)| {
            let id = u32::try_from(i)
                .map_err(|_| LzssError::Config(format!("more than {} blocks", u32::MAX)))?;
            RawBlock::new(id, chunk.to_vec(), size)
        })
        .collect()
}

/// Streaming segmenter: reads `block_size` blocks from any reader, a batch at
/// a time, numbering them continuously across batches.
pub struct BlockReader<R> {
    inner: R,
    block_size: u32,
    next_id: u32,
    bytes_read: u64,
    eof: bool,
}

impl<R: Read> BlockReader<R> {
    pub fn new(inner: R, block_size: u32) -> Self {
        Self {
            inner,
            block_size,
            next_id: 0,
            bytes_read: 0,
            eof: false,
        }
    }

    /// True once the underlying reader has returned end of input.
    pub fn is_eof(&self) -> bool {
        self.eof
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Read up to `max_blocks` blocks. Returns an empty batch at end of input.
    pub fn next_batch(&mut self, max_blocks: usize) -> Result<Vec<RawBlock>> {
        let size = self.block_size as usize;
        let mut batch = Vec::new();
        while batch.len() < max_blocks && !self.eof {
            let mut buf = vec![0u8; size];
            let filled = self.fill(&mut buf)?;
            if filled == 0 {
                break;
            }
            buf.truncate(filled);
            batch.push(RawBlock::new(self.next_id, buf, size)?);
            self.bytes_read += filled as u64;
            self.next_id = self.next_id.checked_add(1).ok_or_else(|| {
                LzssError::Config(format!("input needs more than {} blocks", u32::MAX))
            })?;
        }
        Ok(batch)
    }

    /// Read until `buf` is full or the input ends.
    fn fill(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => {
                    self.eof = true;
                    break;
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(filled)
    }
}
