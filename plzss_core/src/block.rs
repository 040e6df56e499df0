use crate::error::{LzssError, Result};
use crate::lzss::LITERAL_BITS;

/// Worst-case encoded size of a `raw_len`-byte block: every byte a literal.
pub fn max_encoded_len(raw_len: usize) -> usize {
    (raw_len * LITERAL_BITS as usize).div_ceil(8)
}

/// One segment of uncompressed input, at most `capacity` bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBlock {
    id: u32,
    bytes: Vec<u8>,
    capacity: usize,
}

impl RawBlock {
    /// Fails with `CapacityExceeded` if `bytes` does not fit.
    pub fn new(id: u32, bytes: Vec<u8>, capacity: usize) -> Result<Self> {
        if bytes.len() > capacity {
            return Err(LzssError::CapacityExceeded {
                block: id,
                needed: bytes.len(),
                capacity,
            });
        }
        Ok(Self {
            id,
            bytes,
            capacity,
        })
    }

    #[inline]
    pub fn id(&self) -> u32 {
        self.id
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Packed LZSS symbols for one block.
///
/// `raw_len` is the exact decoded size and bounds the decoder: symbols are
/// read until that many bytes have been produced, so the zero padding in the
/// final byte is never mistaken for a symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedBlock {
    id: u32,
    raw_len: u32,
    bytes: Vec<u8>,
    capacity: usize,
}

impl EncodedBlock {
    /// Fails with `CapacityExceeded` if `bytes` does not fit.
    pub fn new(id: u32, raw_len: u32, bytes: Vec<u8>, capacity: usize) -> Result<Self> {
        if bytes.len() > capacity {
            return Err(LzssError::CapacityExceeded {
                block: id,
                needed: bytes.len(),
                capacity,
            });
        }
        Ok(Self {
            id,
            raw_len,
            bytes,
            capacity,
        })
    }

    #[inline]
    pub fn id(&self) -> u32 {
        self.id
    }

    #[inline]
    pub fn raw_len(&self) -> u32 {
        self.raw_len
    }

    /// Bytes of packed payload actually used.
    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Anything the dispatch layer can key by block id.
pub trait BlockId {
    fn block_id(&self) -> u32;
}

impl BlockId for RawBlock {
    fn block_id(&self) -> u32 {
        self.id
    }
}

impl BlockId for EncodedBlock {
    fn block_id(&self) -> u32 {
        self.id
    }
}
