//! LZSS primitives: the symbol alphabet, the per-block sliding window with its
//! matcher, and the MSB-first bit packer.
//!
//! Symbol wire layout (no byte alignment between symbols):
//!
//! ```text
//! literal: 0 bbbbbbbb                       9 bits
//! match:   1 oooooooooooo llll             17 bits
//!            offset (absolute window slot)   length - MIN_MATCH
//! ```

pub mod bitio;
pub mod window;

pub use bitio::{pack, BitReader, BitWriter, PackError, Unpacker};
pub use window::{Matcher, SlidingWindow};

/// Bytes of history a match may reference.
pub const WINDOW_SIZE: usize = 4096;
/// Shortest run worth encoding as a match.
pub const MIN_MATCH: usize = 3;
/// Longest run a 4-bit length field can carry.
pub const MAX_MATCH: usize = MIN_MATCH + (1 << LENGTH_BITS) - 1;
/// Every window starts filled with this byte.
pub const WINDOW_FILLER: u8 = 0x20;

pub const OFFSET_BITS: u32 = 12;
pub const LENGTH_BITS: u32 = 4;
pub const LITERAL_BITS: u32 = 1 + 8;
pub const MATCH_BITS: u32 = 1 + OFFSET_BITS + LENGTH_BITS;

/// Back-reference into the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Match {
    /// Absolute window slot of the first byte, `0..WINDOW_SIZE`.
    pub offset: u16,
    /// Number of bytes, `MIN_MATCH..=MAX_MATCH`.
    pub length: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Symbol {
    Literal(u8),
    Match(Match),
}

impl Symbol {
    /// Number of raw bytes this symbol stands for.
    pub fn raw_len(&self) -> usize {
        match self {
            Symbol::Literal(_) => 1,
            Symbol::Match(m) => m.length as usize,
        }
    }
}
