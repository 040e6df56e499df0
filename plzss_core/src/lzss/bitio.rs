use thiserror::Error;

use super::{Match, Symbol, LENGTH_BITS, LITERAL_BITS, MATCH_BITS, MIN_MATCH, OFFSET_BITS};

/// Failure inside the packer itself; the block codec attaches the block id.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackError {
    #[error("packed output needs {needed} bytes but capacity is {capacity}")]
    CapacityExceeded { needed: usize, capacity: usize },

    #[error("symbol needs {needed} bits but {remaining} remain")]
    Truncated { needed: usize, remaining: usize },
}

/// MSB-first bit sink with a hard byte capacity.
///
/// Bits are staged in a small accumulator; each completed byte is checked
/// against the capacity before it is appended.
#[derive(Debug)]
pub struct BitWriter {
    bytes: Vec<u8>,
    capacity: usize,
    acc: u32,
    acc_bits: u32,
}

impl BitWriter {
    pub fn new(capacity: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity.min(64 * 1024)),
            capacity,
            acc: 0,
            acc_bits: 0,
        }
    }

    /// Append the low `count` bits of `value`, most significant first.
    pub fn write_bits(&mut self, value: u32, count: u32) -> Result<(), PackError> {
        debug_assert!(count <= 16);
        self.acc = (self.acc << count) | (value & ((1 << count) - 1));
        self.acc_bits += count;
        while self.acc_bits >= 8 {
            self.acc_bits -= 8;
            self.push_byte((self.acc >> self.acc_bits) as u8)?;
        }
        self.acc &= (1 << self.acc_bits) - 1;
        Ok(())
    }

    pub fn write_symbol(&mut self, symbol: Symbol) -> Result<(), PackError> {
        match symbol {
            Symbol::Literal(byte) => {
                self.write_bits(0, 1)?;
                self.write_bits(byte as u32, 8)
            }
            Symbol::Match(m) => {
                self.write_bits(1, 1)?;
                self.write_bits(m.offset as u32, OFFSET_BITS)?;
                self.write_bits((m.length as usize - MIN_MATCH) as u32, LENGTH_BITS)
            }
        }
    }

    /// Bytes written so far, counting a partially filled final byte.
    pub fn len(&self) -> usize {
        self.bytes.len() + usize::from(self.acc_bits > 0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flush the partial byte (zero padded) and return the packed bytes.
    pub fn finish(mut self) -> Result<Vec<u8>, PackError> {
        if self.acc_bits > 0 {
            let last = (self.acc << (8 - self.acc_bits)) as u8;
            self.acc_bits = 0;
            self.push_byte(last)?;
        }
        Ok(self.bytes)
    }

    fn push_byte(&mut self, byte: u8) -> Result<(), PackError> {
        if self.bytes.len() >= self.capacity {
            return Err(PackError::CapacityExceeded {
                needed: self.bytes.len() + 1,
                capacity: self.capacity,
            });
        }
        self.bytes.push(byte);
        Ok(())
    }
}

/// Pack a symbol sequence into at most `capacity` bytes.
pub fn pack<I>(symbols: I, capacity: usize) -> Result<Vec<u8>, PackError>
where
    I: IntoIterator<Item = Symbol>,
{
    let mut writer = BitWriter::new(capacity);
    for symbol in symbols {
        writer.write_symbol(symbol)?;
    }
    writer.finish()
}

/// MSB-first bit source over a byte slice.
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    bytes: &'a [u8],
    bit_pos: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, bit_pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() * 8 - self.bit_pos
    }

    fn peek_bit(&self) -> bool {
        self.bytes[self.bit_pos / 8] & (0x80 >> (self.bit_pos % 8)) != 0
    }

    /// Read `count` bits. Callers check [`remaining`](Self::remaining) first.
    fn read_bits(&mut self, count: u32) -> u32 {
        let mut value = 0u32;
        for _ in 0..count {
            let byte = self.bytes[self.bit_pos / 8];
            let bit = (byte >> (7 - (self.bit_pos % 8))) & 1;
            value = (value << 1) | bit as u32;
            self.bit_pos += 1;
        }
        value
    }
}

/// Pulls symbols back out of a packed stream, one at a time.
#[derive(Debug, Clone)]
pub struct Unpacker<'a> {
    reader: BitReader<'a>,
}

impl<'a> Unpacker<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            reader: BitReader::new(bytes),
        }
    }

    pub fn remaining_bits(&self) -> usize {
        self.reader.remaining()
    }

    /// Decode the next symbol, failing if the stream ends inside it.
    pub fn next_symbol(&mut self) -> Result<Symbol, PackError> {
        let remaining = self.reader.remaining();
        if remaining == 0 {
            return Err(PackError::Truncated {
                needed: 1,
                remaining,
            });
        }
        let is_match = self.reader.peek_bit();
        let needed = (if is_match { MATCH_BITS } else { LITERAL_BITS }) as usize;
        if remaining < needed {
            return Err(PackError::Truncated { needed, remaining });
        }

        self.reader.read_bits(1);
        if is_match {
            let offset = self.reader.read_bits(OFFSET_BITS) as u16;
            let length = (self.reader.read_bits(LENGTH_BITS) as usize + MIN_MATCH) as u8;
            Ok(Symbol::Match(Match { offset, length }))
        } else {
            Ok(Symbol::Literal(self.reader.read_bits(8) as u8))
        }
    }
}
