//! The per-block LZSS codec: the unit of parallel work.
//!
//! Both directions start from a fresh [`SlidingWindow`] filled with
//! [`WINDOW_FILLER`](crate::lzss::WINDOW_FILLER) and touch no state outside
//! their own block, so any number of invocations may run concurrently.

use crate::block::{max_encoded_len, EncodedBlock, RawBlock};
use crate::error::{LzssError, Result};
use crate::lzss::{pack, Matcher, PackError, SlidingWindow, Symbol, Unpacker, MAX_MATCH};

/// Greedy LZSS tokenizer over one block.
///
/// Yields a `Match` whenever the window holds at least `MIN_MATCH` bytes of
/// the upcoming input, otherwise a `Literal`. Never looks past the end of
/// `data`.
pub struct Tokenizer<'a> {
    data: &'a [u8],
    pos: usize,
    matcher: Matcher,
}

impl<'a> Tokenizer<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            matcher: Matcher::new(),
        }
    }
}

impl Iterator for Tokenizer<'_> {
    type Item = Symbol;

    fn next(&mut self) -> Option<Symbol> {
        if self.pos >= self.data.len() {
            return None;
        }
        let end = (self.pos + MAX_MATCH).min(self.data.len());
        let symbol = match self.matcher.find_match(&self.data[self.pos..end]) {
            Some(m) => Symbol::Match(m),
            None => Symbol::Literal(self.data[self.pos]),
        };
        let consumed = symbol.raw_len();
        for &b in &self.data[self.pos..self.pos + consumed] {
            self.matcher.push(b);
        }
        self.pos += consumed;
        Some(symbol)
    }
}

/// Lazy symbol sequence for `data`, as `encode_block` would pack it.
pub fn symbols(data: &[u8]) -> Tokenizer<'_> {
    Tokenizer::new(data)
}

fn pack_error(block: u32, err: PackError) -> LzssError {
    match err {
        PackError::CapacityExceeded { needed, capacity } => LzssError::CapacityExceeded {
            block,
            needed,
            capacity,
        },
        PackError::Truncated { needed, remaining } => LzssError::TruncatedStream {
            block,
            needed_bits: needed,
            remaining_bits: remaining,
        },
    }
}

/// Encode one block. The output capacity is the all-literal worst case for
/// the block's capacity, and the packer checks it before every byte.
pub fn encode_block(raw: &RawBlock) -> Result<EncodedBlock> {
    let id = raw.id();
    let raw_len = u32::try_from(raw.len()).map_err(|_| LzssError::CapacityExceeded {
        block: id,
        needed: raw.len(),
        capacity: u32::MAX as usize,
    })?;
    let capacity = max_encoded_len(raw.capacity());
    let packed = pack(symbols(raw.as_bytes()), capacity).map_err(|e| pack_error(id, e))?;
    EncodedBlock::new(id, raw_len, packed, capacity)
}

/// Decode one block into a buffer of `raw_capacity` bytes.
///
/// Symbols are consumed until exactly `enc.raw_len()` bytes are produced.
/// A match is copied out of the window into a scratch buffer before any of
/// its bytes are written back, since source and destination slots overlap
/// when the match is longer than its distance.
pub fn decode_block(enc: &EncodedBlock, raw_capacity: usize) -> Result<RawBlock> {
    let id = enc.id();
    let raw_len = enc.raw_len() as usize;
    if raw_len > raw_capacity {
        return Err(LzssError::CapacityExceeded {
            block: id,
            needed: raw_len,
            capacity: raw_capacity,
        });
    }

    let mut out = Vec::with_capacity(raw_len);
    let mut window = SlidingWindow::new();
    let mut unpacker = Unpacker::new(enc.as_bytes());
    let mut scratch = [0u8; MAX_MATCH];

    while out.len() < raw_len {
        match unpacker.next_symbol().map_err(|e| pack_error(id, e))? {
            Symbol::Literal(b) => {
                out.push(b);
                window.push(b);
            }
            Symbol::Match(m) => {
                let len = m.length as usize;
                if out.len() + len > raw_len {
                    return Err(LzssError::CorruptBlock {
                        block: id,
                        reason: format!(
                            "match of {} bytes at output offset {} overruns block length {}",
                            len,
                            out.len(),
                            raw_len
                        ),
                    });
                }
                let copied = &mut scratch[..len];
                window.copy_out(m.offset as usize, copied);
                out.extend_from_slice(copied);
                for &b in copied.iter() {
                    window.push(b);
                }
            }
        }
    }

    let left = unpacker.remaining_bits();
    if left >= 8 {
        return Err(LzssError::CorruptBlock {
            block: id,
            reason: format!("{} unused bytes after the last symbol", left / 8),
        });
    }

    RawBlock::new(id, out, raw_capacity)
}
