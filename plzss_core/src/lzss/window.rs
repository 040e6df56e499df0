use super::{Match, MAX_MATCH, MIN_MATCH, WINDOW_FILLER, WINDOW_SIZE};

const WINDOW_MASK: usize = WINDOW_SIZE - 1;
const NIL: u16 = u16::MAX;

/// Circular history buffer owned by a single block codec invocation.
///
/// Slots are overwritten oldest first: the write cursor always points at the
/// slot that was written longest ago.
#[derive(Clone)]
pub struct SlidingWindow {
    buf: Box<[u8; WINDOW_SIZE]>,
    cursor: usize,
}

impl SlidingWindow {
    /// A window filled with [`WINDOW_FILLER`], cursor at slot 0.
    pub fn new() -> Self {
        Self {
            buf: Box::new([WINDOW_FILLER; WINDOW_SIZE]),
            cursor: 0,
        }
    }

    /// Slot the next byte will be written to.
    #[inline]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    #[inline]
    pub fn get(&self, slot: usize) -> u8 {
        self.buf[slot & WINDOW_MASK]
    }

    /// Write `byte` at the cursor and advance it. Returns the byte it replaced.
    #[inline]
    pub fn push(&mut self, byte: u8) -> u8 {
        let old = std::mem::replace(&mut self.buf[self.cursor], byte);
        self.cursor = (self.cursor + 1) & WINDOW_MASK;
        old
    }

    /// Copy `out.len()` bytes starting at slot `offset` out of the window as it
    /// is now. Slots wrap; the window is not modified.
    pub fn copy_out(&self, offset: usize, out: &mut [u8]) {
        for (i, b) in out.iter_mut().enumerate() {
            *b = self.buf[(offset + i) & WINDOW_MASK];
        }
    }

    /// Backward distance of `slot` from the cursor, in `1..=WINDOW_SIZE`.
    #[inline]
    pub fn distance(&self, slot: usize) -> usize {
        match (self.cursor + WINDOW_SIZE - (slot & WINDOW_MASK)) & WINDOW_MASK {
            0 => WINDOW_SIZE,
            d => d,
        }
    }
}

impl Default for SlidingWindow {
    fn default() -> Self {
        Self::new()
    }
}

/// Greedy longest-match search over a [`SlidingWindow`].
///
/// Every slot sits on a chain keyed by the byte it holds, newest first, so a
/// search only visits slots whose first byte already matches and visits them
/// in order of increasing backward distance. Because the cursor always
/// overwrites the globally oldest slot, that slot is also the tail of its
/// chain and unlinking it is O(1).
pub struct Matcher {
    window: SlidingWindow,
    head: [u16; 256],
    older: Box<[u16; WINDOW_SIZE]>,
    newer: Box<[u16; WINDOW_SIZE]>,
}

impl Matcher {
    pub fn new() -> Self {
        let mut matcher = Self {
            window: SlidingWindow::new(),
            head: [NIL; 256],
            older: Box::new([NIL; WINDOW_SIZE]),
            newer: Box::new([NIL; WINDOW_SIZE]),
        };
        // The filler counts as written in slot order 0..WINDOW_SIZE, which
        // makes slot 0 the oldest, matching the cursor.
        for slot in 0..WINDOW_SIZE {
            matcher.link(slot, WINDOW_FILLER);
        }
        matcher
    }

    pub fn window(&self) -> &SlidingWindow {
        &self.window
    }

    /// Longest match for `lookahead` (at most [`MAX_MATCH`] bytes are
    /// considered). Ties go to the smallest backward distance.
    pub fn find_match(&self, lookahead: &[u8]) -> Option<Match> {
        let lookahead = &lookahead[..lookahead.len().min(MAX_MATCH)];
        if lookahead.len() < MIN_MATCH {
            return None;
        }

        let mut best_len = 0usize;
        let mut best_slot = 0usize;
        let mut slot = self.head[lookahead[0] as usize];
        while slot != NIL {
            let start = slot as usize;
            let mut len = 1;
            while len < lookahead.len() && self.window.get(start + len) == lookahead[len] {
                len += 1;
            }
            if len > best_len {
                best_len = len;
                best_slot = start;
                if len == lookahead.len() {
                    break;
                }
            }
            slot = self.older[start];
        }

        (best_len >= MIN_MATCH).then(|| Match {
            offset: best_slot as u16,
            length: best_len as u8,
        })
    }

    /// Append `byte` to the window, keeping the chains in step.
    pub fn push(&mut self, byte: u8) {
        let slot = self.window.cursor();
        let evicted = self.window.get(slot);
        self.unlink_oldest(slot, evicted);
        self.window.push(byte);
        self.link(slot, byte);
    }

    fn link(&mut self, slot: usize, byte: u8) {
        let prev_head = self.head[byte as usize];
        self.older[slot] = prev_head;
        self.newer[slot] = NIL;
        if prev_head != NIL {
            self.newer[prev_head as usize] = slot as u16;
        }
        self.head[byte as usize] = slot as u16;
    }

    fn unlink_oldest(&mut self, slot: usize, byte: u8) {
        debug_assert_eq!(self.older[slot], NIL, "evicted slot must be its chain's tail");
        match self.newer[slot] {
            NIL => self.head[byte as usize] = NIL,
            newer => self.older[newer as usize] = NIL,
        }
        self.newer[slot] = NIL;
    }
}

impl Default for Matcher {
    fn default() -> Self {
        Self::new()
    }
}
