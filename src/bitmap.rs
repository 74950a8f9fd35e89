//! The compressed bitmap container.

use crate::{
    cursor::ClauseIter,
    iter::Iter,
    rlw::{self, FULL_WORD, MAX_LITERALS, MAX_RUN_LEN, WORD_BITS},
    sink::Sink,
};
use bytes::{Buf, BufMut};
use commonware_codec::{
    EncodeSize, Error as CodecError, FixedSize, RangeCfg, Read, ReadExt, Write,
};
use core::{
    fmt::{self, Formatter},
    ops::RangeBounds,
    str::FromStr,
};

/// Words reserved when a bitmap is created without a capacity hint.
const DEFAULT_CAPACITY: usize = 4;

/// Errors arising from bitmap construction.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Bit strings may contain only `'0'` and `'1'`.
    #[error("invalid character {0:?} in bit string")]
    InvalidBitChar(char),
}

/// A word-aligned run-length-encoded compressed bitmap.
///
/// The bitmap owns one growable buffer of 64-bit words holding a gapless
/// sequence of clauses. Each clause starts with a header word (layout in
/// the crate docs) encoding a run of uniform words followed by a count of
/// verbatim literal words. `rlw_pos` indexes the header of the last clause,
/// which stays open for appends.
///
/// Bits are indexed by `u32`; the largest settable index is
/// `u32::MAX - 1`. Appending in non-decreasing index order
/// ([Self::append_set]) is amortized O(1); setting in arbitrary order
/// ([Self::set]) may split or merge clauses and shift the buffer.
///
/// Equality and hashing are *structural*: two bitmaps holding the same set
/// of bits but built through different operation sequences may compare
/// unequal because their compressed layouts differ. Byte-identical encoded
/// streams always decode to equal bitmaps.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct EwahBitmap {
    /// The compressed words. Always holds at least one clause header.
    buffer: Vec<u64>,
    /// Declared uncompressed length in bits.
    bit_len: u32,
    /// Buffer index of the last (open) clause's header.
    rlw_pos: usize,
}

impl EwahBitmap {
    /// Creates an empty bitmap (no bit set, zero declared length).
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Creates an empty bitmap with room for `words` compressed words.
    ///
    /// For large poorly-compressible bitmaps a generous hint avoids
    /// repeated buffer doubling.
    pub fn with_capacity(words: usize) -> Self {
        let mut buffer = Vec::with_capacity(words.max(1));
        buffer.push(0);
        Self {
            buffer,
            bit_len: 0,
            rlw_pos: 0,
        }
    }

    /// Declared length of the uncompressed bitmap, in bits.
    #[inline]
    pub fn bit_len(&self) -> u32 {
        self.bit_len
    }

    /// Number of compressed words in use.
    #[inline]
    pub fn word_len(&self) -> usize {
        self.buffer.len()
    }

    /// Compressed footprint in bytes.
    #[inline]
    pub fn size_in_bytes(&self) -> usize {
        self.buffer.len() * (WORD_BITS as usize / 8)
    }

    /// Returns true if no bit is set.
    pub fn is_empty(&self) -> bool {
        self.count_ones() == 0
    }

    /// Number of set bits. Runs in time proportional to the compressed size.
    pub fn count_ones(&self) -> u64 {
        let mut ones = 0u64;
        for clause in ClauseIter::new(&self.buffer) {
            if clause.running_bit() {
                ones += clause.running_len() * WORD_BITS as u64;
            }
            let start = clause.literal_start();
            for &word in &self.buffer[start..start + clause.literal_count() as usize] {
                ones += word.count_ones() as u64;
            }
        }
        ones
    }

    /// Returns the bit at `index`. Indices at or beyond [Self::bit_len] read
    /// as false.
    pub fn get(&self, index: u32) -> bool {
        if index >= self.bit_len {
            return false;
        }
        let target = (index / WORD_BITS) as u64;
        let mut base = 0u64;
        for clause in ClauseIter::new(&self.buffer) {
            let run = clause.running_len();
            if target < base + run {
                return clause.running_bit();
            }
            if target < base + clause.size() {
                let word = self.buffer[clause.literal_start() + (target - base - run) as usize];
                return word & (1u64 << (index % WORD_BITS)) != 0;
            }
            base += clause.size();
        }
        false
    }

    /// Sets the bit at `index`, in any order.
    ///
    /// Appending in non-decreasing order takes the amortized-O(1) path;
    /// anything else walks the buffer and may split or merge clauses, which
    /// is the expensive path.
    pub fn set(&mut self, index: u32) {
        if !self.append_set(index) {
            self.set_in_place(index);
        }
    }

    /// Sets the bit at `index` when `index` is at or beyond the current
    /// declared length, extending the bitmap. Returns false (leaving the
    /// bitmap untouched) when `index` falls below the declared length.
    pub fn append_set(&mut self, index: u32) -> bool {
        if index < self.bit_len {
            return false;
        }
        assert!(index < u32::MAX, "bit index {index} out of range");
        let target = index / WORD_BITS;
        let covered = self.bit_len.div_ceil(WORD_BITS);
        if target >= covered {
            // Beyond the covered words: round the length up to the word
            // boundary, pad with a zero run, and open a fresh literal word.
            self.bit_len = covered * WORD_BITS;
            self.append_run(false, (target - covered) as u64);
            self.add_literal_word(1u64 << (index % WORD_BITS));
        } else {
            // The index lands in the final, partially significant word.
            let header = self.rlw();
            let literals = rlw::literal_count(header);
            if literals > 0 {
                // That word is the open clause's last literal.
                let last = self.buffer.len() - 1;
                self.buffer[last] |= 1u64 << (index % WORD_BITS);
                if self.buffer[last] == FULL_WORD {
                    // The literal filled up: fold it into a run of ones.
                    self.buffer.pop();
                    self.set_rlw(rlw::with_literal_count(self.rlw(), literals - 1));
                    self.add_empty_word(true);
                }
            } else if rlw::running_len(header) > 0 {
                if !rlw::running_bit(header) {
                    // That word sits in the open clause's zero run: peel it
                    // off into a literal.
                    self.set_rlw(rlw::with_running_len(header, rlw::running_len(header) - 1));
                    self.add_literal_word(1u64 << (index % WORD_BITS));
                }
                // A run of ones already holds the bit.
            } else {
                // The open clause is empty, so the final word belongs to an
                // earlier clause. Only reachable through decoded input.
                self.set_in_place(index);
            }
        }
        self.bit_len = index + 1;
        true
    }

    /// Extends the declared length to `new_len` bits, filling with `value`.
    /// Returns false (without mutating) when `new_len` is below the current
    /// length; shrinking is not supported.
    pub fn resize(&mut self, new_len: u32, value: bool) -> bool {
        if new_len < self.bit_len {
            return false;
        }
        if value {
            // Finish the partial word bit by bit, then extend with runs.
            while self.bit_len % WORD_BITS != 0 && self.bit_len < new_len {
                let index = self.bit_len;
                self.append_set(index);
            }
            if self.bit_len < new_len {
                let full_words = ((new_len - self.bit_len) / WORD_BITS) as u64;
                self.append_run(true, full_words);
                let tail = new_len % WORD_BITS;
                if tail != 0 {
                    self.add_literal_word((1u64 << tail) - 1);
                }
                self.bit_len = new_len;
            }
        } else {
            let covered = self.bit_len.div_ceil(WORD_BITS) as u64;
            let needed = (new_len.div_ceil(WORD_BITS) as u64).saturating_sub(covered);
            self.append_run(false, needed);
            self.bit_len = new_len;
        }
        true
    }

    /// Negates the bitmap in place: every clause's running bit flips and
    /// every literal word is complemented. Stored bits at or beyond the
    /// declared length stay unobservable.
    pub fn invert(&mut self) {
        let mut pos = 0usize;
        loop {
            let header = self.buffer[pos];
            let literals = rlw::literal_count(header) as usize;
            self.buffer[pos] = rlw::with_running_bit(header, !rlw::running_bit(header));
            for word in &mut self.buffer[pos + 1..pos + 1 + literals] {
                *word = !*word;
            }
            let next = pos + 1 + literals;
            if next >= self.buffer.len() {
                break;
            }
            pos = next;
        }

        let tail_bits = self.bit_len % WORD_BITS;
        if tail_bits == 0 {
            return;
        }
        let mask = (1u64 << tail_bits) - 1;
        let header = self.buffer[pos];
        if rlw::literal_count(header) > 0 {
            let last = self.buffer.len() - 1;
            self.buffer[last] &= mask;
        } else if rlw::running_bit(header) && rlw::running_len(header) > 0 {
            // The flip turned the tail into a run of ones that claims bits
            // past the declared length: peel its last word off into a
            // masked literal.
            let h = rlw::with_running_len(header, rlw::running_len(header) - 1);
            self.buffer[pos] = rlw::with_literal_count(h, 1);
            self.buffer.push(mask);
        }
    }

    /// Resets to the empty bitmap. Allocated capacity is retained.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.buffer.push(0);
        self.bit_len = 0;
        self.rlw_pos = 0;
    }

    /// Iterator over the positions of set bits, ascending.
    pub fn iter(&self) -> Iter<'_> {
        Iter::new(self, 0, self.bit_len)
    }

    /// Iterator over the positions of set bits within `range`, ascending.
    pub fn iter_range(&self, range: impl RangeBounds<u32>) -> Iter<'_> {
        use core::ops::Bound;
        let start = match range.start_bound() {
            Bound::Included(&s) => s,
            Bound::Excluded(&s) => s.saturating_add(1),
            Bound::Unbounded => 0,
        };
        let end = match range.end_bound() {
            Bound::Included(&e) => e.saturating_add(1),
            Bound::Excluded(&e) => e,
            Bound::Unbounded => self.bit_len,
        };
        Iter::new(self, start, end.min(self.bit_len))
    }

    /// The positions of all set bits, ascending.
    pub fn positions(&self) -> Vec<u32> {
        self.iter().collect()
    }

    /// The compressed words.
    #[inline]
    pub(crate) fn words(&self) -> &[u64] {
        &self.buffer
    }

    /// Current header word of the open clause.
    #[inline]
    fn rlw(&self) -> u64 {
        self.buffer[self.rlw_pos]
    }

    #[inline]
    fn set_rlw(&mut self, header: u64) {
        self.buffer[self.rlw_pos] = header;
    }

    /// Opens a fresh clause at the end of the buffer.
    fn open_clause(&mut self) {
        self.buffer.push(0);
        self.rlw_pos = self.buffer.len() - 1;
    }

    /// Extends the declared length by `words` full words, saturating at the
    /// index ceiling.
    fn extend_bit_len(&mut self, words: u64) {
        let bits = (self.bit_len as u64).saturating_add(words.saturating_mul(WORD_BITS as u64));
        self.bit_len = bits.min(u32::MAX as u64) as u32;
    }

    /// Appends one word entirely equal to `bit` without touching the
    /// declared length.
    fn add_empty_word(&mut self, bit: bool) {
        let mut header = self.rlw();
        let absorbable = rlw::literal_count(header) == 0
            && (rlw::running_len(header) == 0 || rlw::running_bit(header) == bit)
            && rlw::running_len(header) < MAX_RUN_LEN;
        if !absorbable {
            self.open_clause();
            header = 0;
        }
        header = rlw::with_running_bit(header, bit);
        self.set_rlw(rlw::with_running_len(header, rlw::running_len(header) + 1));
    }

    /// Appends one literal word without touching the declared length,
    /// opening a new clause when the literal field is saturated.
    fn add_literal_word(&mut self, word: u64) {
        let header = self.rlw();
        let literals = rlw::literal_count(header);
        if literals == MAX_LITERALS {
            self.open_clause();
            self.set_rlw(rlw::with_literal_count(0, 1));
        } else {
            self.set_rlw(rlw::with_literal_count(header, literals + 1));
        }
        self.buffer.push(word);
    }

    /// Sets a bit strictly below the covered words: locates the clause
    /// holding it and rewrites the buffer as needed.
    fn set_in_place(&mut self, index: u32) {
        let target = (index / WORD_BITS) as u64;
        let bit = 1u64 << (index % WORD_BITS);

        // Locate the clause covering `target`, tracking the previous clause
        // and the first uncompressed word index the found clause covers.
        let mut prev: Option<usize> = None;
        let mut pos = 0usize;
        let mut word_base = 0u64;
        loop {
            let header = self.buffer[pos];
            if target < word_base + rlw::size(header) {
                break;
            }
            word_base += rlw::size(header);
            prev = Some(pos);
            pos += 1 + rlw::literal_count(header) as usize;
            debug_assert!(pos < self.buffer.len(), "bit {index} beyond covered words");
        }

        let header = self.buffer[pos];
        let run = rlw::running_len(header);
        let offset = target - word_base;
        let next_pos = pos + 1 + rlw::literal_count(header) as usize;
        let next = (next_pos < self.buffer.len()).then_some(next_pos);

        if offset >= run {
            // The bit lands in a literal word: flip it directly.
            let j = (offset - run) as usize;
            let word_pos = pos + 1 + j;
            self.buffer[word_pos] |= bit;
            if self.buffer[word_pos] == FULL_WORD {
                self.fold_full_literal(pos, j, next);
            }
        } else if !rlw::running_bit(header) {
            self.split_zero_run(prev, pos, offset, bit, next);
        }
        // Inside a run of ones the bit is already set.
    }

    /// A literal word at index `j` of the clause at `pos` just became all
    /// ones: fold it into an adjacent run of ones when legal, otherwise
    /// split the clause around it.
    fn fold_full_literal(&mut self, pos: usize, j: usize, next: Option<usize>) {
        let header = self.buffer[pos];
        let run = rlw::running_len(header);
        let literals = rlw::literal_count(header);
        let word_pos = pos + 1 + j;

        if j == 0 && (rlw::running_bit(header) || run == 0) && run < MAX_RUN_LEN {
            // First literal: it extends the clause's own run of ones.
            let mut h = rlw::with_running_bit(header, true);
            h = rlw::with_running_len(h, run + 1);
            self.buffer[pos] = rlw::with_literal_count(h, literals - 1);
            self.shift_words_left(word_pos + 1, 1);
            return;
        }

        if j as u64 == literals - 1 {
            if let Some(n) = next {
                let nh = self.buffer[n];
                if rlw::running_len(nh) < MAX_RUN_LEN
                    && (rlw::running_len(nh) == 0 || rlw::running_bit(nh))
                {
                    // Last literal: it joins the next clause's run of ones.
                    let mut h = rlw::with_running_bit(nh, true);
                    h = rlw::with_running_len(h, rlw::running_len(nh) + 1);
                    self.buffer[n] = h;
                    self.buffer[pos] = rlw::with_literal_count(header, literals - 1);
                    self.shift_words_left(n, 1);
                    return;
                }
            }
        }

        // No adjacent run can take it: the full word becomes the header of a
        // new clause carrying a one-word run of ones plus the literals that
        // followed it.
        let mut h = rlw::with_running_bit(0, true);
        h = rlw::with_running_len(h, 1);
        self.buffer[word_pos] = rlw::with_literal_count(h, literals - 1 - j as u64);
        self.buffer[pos] = rlw::with_literal_count(header, j as u64);
        if self.rlw_pos == pos {
            self.rlw_pos = word_pos;
        }
    }

    /// A bit lands at word `offset` inside the zero run of the clause at
    /// `pos`: split the run around a fresh literal word, merging into a
    /// neighbor when that avoids growing the buffer.
    fn split_zero_run(
        &mut self,
        prev: Option<usize>,
        pos: usize,
        offset: u64,
        bit: u64,
        next: Option<usize>,
    ) {
        let header = self.buffer[pos];
        let run = rlw::running_len(header);
        let literals = rlw::literal_count(header);
        let before = offset;
        let after = run - offset - 1;

        if before == 0 && after == 0 {
            // The run is exactly one word. Its header slot can become the
            // new literal if a neighbor absorbs the clause.
            if let Some(p) = prev {
                let ph = self.buffer[p];
                let pl = rlw::literal_count(ph);
                if pl + literals + 1 <= MAX_LITERALS {
                    self.buffer[p] = rlw::with_literal_count(ph, pl + literals + 1);
                    self.buffer[pos] = bit;
                    if self.rlw_pos == pos {
                        self.rlw_pos = p;
                    }
                    return;
                }
            }
            if let Some(n) = next {
                let nh = self.buffer[n];
                if rlw::running_len(nh) == 0
                    && rlw::literal_count(nh) + literals + 1 <= MAX_LITERALS
                {
                    // The next clause's header moves into this clause's
                    // slot; the new literal goes first, existing literals
                    // keep their order.
                    self.buffer[pos] =
                        rlw::with_literal_count(nh, rlw::literal_count(nh) + literals + 1);
                    self.buffer
                        .copy_within(pos + 1..pos + 1 + literals as usize, pos + 2);
                    self.buffer[pos + 1] = bit;
                    if self.rlw_pos == n {
                        self.rlw_pos = pos;
                    }
                    return;
                }
            }
        }

        if before == 0 && literals == 0 {
            if let Some(p) = prev {
                let ph = self.buffer[p];
                let pl = rlw::literal_count(ph);
                if pl < MAX_LITERALS {
                    // Donate the first run word to the previous clause as
                    // its new last literal.
                    self.buffer[p] = rlw::with_literal_count(ph, pl + 1);
                    self.shift_words_right(pos, 1);
                    self.buffer[pos] = bit;
                    self.buffer[pos + 1] = rlw::with_running_len(self.buffer[pos + 1], run - 1);
                    return;
                }
            }
        }

        if after == 0 && literals < MAX_LITERALS {
            // The bit sits in the run's last word: shorten the run and make
            // the word the clause's new first literal.
            let mut h = rlw::with_running_len(header, before);
            h = rlw::with_literal_count(h, literals + 1);
            self.shift_words_right(pos + 1, 1);
            self.buffer[pos] = h;
            self.buffer[pos + 1] = bit;
            return;
        }

        // Full split: zeros before, the new literal, then a tail clause
        // holding the zeros after plus the original literals.
        self.shift_words_right(pos + 1, 2);
        let mut tail = rlw::with_running_len(0, after);
        tail = rlw::with_literal_count(tail, literals);
        self.buffer[pos + 2] = tail;
        self.buffer[pos + 1] = bit;
        let mut h = rlw::with_running_len(header, before);
        h = rlw::with_literal_count(h, 1);
        self.buffer[pos] = h;
        if self.rlw_pos == pos {
            self.rlw_pos = pos + 2;
        }
    }

    /// Moves `[start..]` left by `shift` words, shrinking the buffer and
    /// re-pointing the open-clause cursor.
    fn shift_words_left(&mut self, start: usize, shift: usize) {
        self.buffer.copy_within(start.., start - shift);
        let len = self.buffer.len();
        self.buffer.truncate(len - shift);
        if self.rlw_pos >= start {
            self.rlw_pos -= shift;
        }
    }

    /// Moves `[start..]` right by `shift` words, growing the buffer, zeroing
    /// the vacated words and re-pointing the open-clause cursor.
    fn shift_words_right(&mut self, start: usize, shift: usize) {
        let old_len = self.buffer.len();
        self.buffer.resize(old_len + shift, 0);
        self.buffer.copy_within(start..old_len, start + shift);
        self.buffer[start..start + shift].fill(0);
        if self.rlw_pos >= start {
            self.rlw_pos += shift;
        }
    }

    /// Checks every structural invariant; test builds only.
    #[cfg(test)]
    pub(crate) fn assert_valid(&self) {
        let mut covered = 0u64;
        let mut last = 0usize;
        let mut pos = 0usize;
        while pos < self.buffer.len() {
            last = pos;
            let header = self.buffer[pos];
            covered += rlw::size(header);
            pos += 1 + rlw::literal_count(header) as usize;
        }
        assert_eq!(pos, self.buffer.len(), "clause chain leaves a gap");
        assert_eq!(last, self.rlw_pos, "cursor does not name the final clause");
        assert_eq!(
            covered,
            (self.bit_len as u64).div_ceil(WORD_BITS as u64),
            "covered words out of step with the declared length"
        );
    }
}

impl Sink for EwahBitmap {
    fn append_word(&mut self, word: u64) {
        self.extend_bit_len(1);
        if word == 0 {
            self.add_empty_word(false);
        } else if word == FULL_WORD {
            self.add_empty_word(true);
        } else {
            self.add_literal_word(word);
        }
    }

    fn append_run(&mut self, bit: bool, mut count: u64) {
        self.extend_bit_len(count);
        while count > 0 {
            let mut header = self.rlw();
            let absorbable = rlw::literal_count(header) == 0
                && (rlw::running_len(header) == 0 || rlw::running_bit(header) == bit)
                && rlw::running_len(header) < MAX_RUN_LEN;
            if !absorbable {
                self.open_clause();
                header = 0;
            }
            header = rlw::with_running_bit(header, bit);
            let run = rlw::running_len(header);
            let take = count.min(MAX_RUN_LEN - run);
            self.set_rlw(rlw::with_running_len(header, run + take));
            count -= take;
        }
    }

    fn append_literals(&mut self, words: &[u64]) {
        self.extend_bit_len(words.len() as u64);
        let mut words = words;
        while !words.is_empty() {
            let header = self.rlw();
            let literals = rlw::literal_count(header);
            if literals == MAX_LITERALS {
                self.open_clause();
                continue;
            }
            let take = words.len().min((MAX_LITERALS - literals) as usize);
            self.set_rlw(rlw::with_literal_count(header, literals + take as u64));
            self.buffer.extend_from_slice(&words[..take]);
            words = &words[take..];
        }
    }

    fn append_negated_literals(&mut self, words: &[u64]) {
        self.extend_bit_len(words.len() as u64);
        let mut words = words;
        while !words.is_empty() {
            let header = self.rlw();
            let literals = rlw::literal_count(header);
            if literals == MAX_LITERALS {
                self.open_clause();
                continue;
            }
            let take = words.len().min((MAX_LITERALS - literals) as usize);
            self.set_rlw(rlw::with_literal_count(header, literals + take as u64));
            self.buffer.extend(words[..take].iter().map(|word| !word));
            words = &words[take..];
        }
    }

    fn set_bit_len(&mut self, bits: u32) {
        self.bit_len = bits;
    }
}

impl Default for EwahBitmap {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EwahBitmap {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "EwahBitmap {{ bits: {}, words: {} }}",
            self.bit_len,
            self.buffer.len()
        )
    }
}

impl FromStr for EwahBitmap {
    type Err = Error;

    /// Parses a string of `'0'` and `'1'` characters, most significant
    /// position last. The declared length is the full string length,
    /// trailing zeros included.
    fn from_str(s: &str) -> Result<Self, Error> {
        let mut bitmap = Self::new();
        let mut pos = 0u32;
        for c in s.chars() {
            match c {
                '0' => pos += 1,
                '1' => {
                    bitmap.append_set(pos);
                    pos += 1;
                }
                _ => return Err(Error::InvalidBitChar(c)),
            }
        }
        if pos > bitmap.bit_len {
            bitmap.resize(pos, false);
        }
        Ok(bitmap)
    }
}

impl FromIterator<u32> for EwahBitmap {
    fn from_iter<I: IntoIterator<Item = u32>>(iter: I) -> Self {
        let mut bitmap = Self::new();
        bitmap.extend(iter);
        bitmap
    }
}

impl Extend<u32> for EwahBitmap {
    fn extend<I: IntoIterator<Item = u32>>(&mut self, iter: I) {
        for index in iter {
            self.set(index);
        }
    }
}

impl<'a> IntoIterator for &'a EwahBitmap {
    type Item = u32;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

// ---------- Codec ----------

impl Write for EwahBitmap {
    fn write(&self, buf: &mut impl BufMut) {
        self.bit_len.write(buf);
        (self.buffer.len() as u32).write(buf);
        for &word in &self.buffer {
            word.write(buf);
        }
        (self.rlw_pos as u32).write(buf);
    }
}

impl Read for EwahBitmap {
    /// Bounds the number of compressed words a decoded bitmap may hold.
    /// Use `RangeCfg::new(..=max_words)` to limit memory allocation.
    type Cfg = RangeCfg;

    fn read_cfg(buf: &mut impl Buf, cfg: &Self::Cfg) -> Result<Self, CodecError> {
        let bit_len = u32::read(buf)?;
        let words = u32::read(buf)? as usize;
        if !cfg.contains(&words) {
            return Err(CodecError::InvalidLength(words));
        }
        // Check the remaining payload before allocating for it.
        if buf.remaining() < words * u64::SIZE + u32::SIZE {
            return Err(CodecError::EndOfBuffer);
        }
        let mut buffer = Vec::with_capacity(words);
        for _ in 0..words {
            buffer.push(u64::read(buf)?);
        }
        let rlw_pos = u32::read(buf)? as usize;
        if rlw_pos >= words {
            return Err(CodecError::Invalid("EwahBitmap", "cursor out of range"));
        }

        // The headers must concatenate gaplessly to exactly `words` words,
        // with the cursor naming the final header.
        let mut pos = 0usize;
        let mut last = 0usize;
        let mut covered = 0u64;
        while pos < words {
            last = pos;
            covered += rlw::size(buffer[pos]);
            pos += 1 + rlw::literal_count(buffer[pos]) as usize;
        }
        if pos != words || last != rlw_pos {
            return Err(CodecError::Invalid("EwahBitmap", "malformed clause chain"));
        }
        // The covered extent must round-trip with the declared length, and
        // the final clause must carry content whenever anything does.
        if covered != (bit_len as u64).div_ceil(WORD_BITS as u64) {
            return Err(CodecError::Invalid(
                "EwahBitmap",
                "covered words out of step with bit length",
            ));
        }
        if words > 1 && rlw::size(buffer[rlw_pos]) == 0 {
            return Err(CodecError::Invalid("EwahBitmap", "empty trailing clause"));
        }
        // Bits at or beyond the declared length must read as zero.
        let tail_bits = bit_len % WORD_BITS;
        if tail_bits != 0 {
            let header = buffer[rlw_pos];
            let trailing = if rlw::literal_count(header) > 0 {
                buffer[words - 1] >> tail_bits != 0
            } else {
                rlw::running_bit(header)
            };
            if trailing {
                return Err(CodecError::Invalid("EwahBitmap", "trailing bits"));
            }
        }

        Ok(Self {
            buffer,
            bit_len,
            rlw_pos,
        })
    }
}

impl EncodeSize for EwahBitmap {
    fn encode_size(&self) -> usize {
        3 * u32::SIZE + self.buffer.len() * u64::SIZE
    }
}

#[cfg(feature = "arbitrary")]
impl arbitrary::Arbitrary<'_> for EwahBitmap {
    fn arbitrary(u: &mut arbitrary::Unstructured<'_>) -> arbitrary::Result<Self> {
        let size = u.int_in_range(0..=1024)?;
        let mut bitmap = Self::new();
        for _ in 0..size {
            bitmap.set(u.int_in_range(0..=1u32 << 20)?);
        }
        Ok(bitmap)
    }
}
