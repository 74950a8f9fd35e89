//! Ascending iteration over set-bit positions.

use crate::{
    bitmap::EwahBitmap,
    cursor::ClauseIter,
    rlw::{FULL_WORD, WORD_BITS},
};

/// Iterator over the positions of set bits in an [EwahBitmap], ascending.
///
/// Runs of zeros are skipped at clause granularity; literal words and runs
/// of ones are drained one word at a time, peeling set bits off with
/// `trailing_zeros`.
pub struct Iter<'a> {
    buffer: &'a [u64],
    clauses: ClauseIter<'a>,
    /// Words left in the current clause's run.
    run_words: u64,
    run_bit: bool,
    /// Buffer range of the current clause's unread literal words.
    lit_pos: usize,
    lit_end: usize,
    /// Remaining set bits of the word being drained.
    word: u64,
    /// Bit position of the current word's bit zero.
    base: u64,
    /// Bit position where the next loaded word starts.
    next_base: u64,
    /// Inclusive lower and exclusive upper position bounds.
    start: u64,
    end: u64,
    done: bool,
}

impl<'a> Iter<'a> {
    pub(crate) fn new(bitmap: &'a EwahBitmap, start: u32, end: u32) -> Self {
        let buffer = bitmap.words();
        let mut iter = Self {
            buffer,
            clauses: ClauseIter::new(buffer),
            run_words: 0,
            run_bit: false,
            lit_pos: 0,
            lit_end: 0,
            word: 0,
            base: 0,
            next_base: 0,
            start: start as u64,
            end: end as u64,
            done: start >= end,
        };
        if !iter.done {
            iter.skip_clauses_below_start();
        }
        iter
    }

    /// Fast-forwards whole clauses (and whole words within the first
    /// overlapping clause) that end at or before the lower bound.
    fn skip_clauses_below_start(&mut self) {
        let word_bits = WORD_BITS as u64;
        loop {
            let Some(clause) = self.clauses.next() else {
                self.done = true;
                return;
            };
            let clause_bits = clause.size() * word_bits;
            if self.next_base + clause_bits <= self.start {
                self.next_base += clause_bits;
                continue;
            }
            self.run_words = clause.running_len();
            self.run_bit = clause.running_bit();
            self.lit_pos = clause.literal_start();
            self.lit_end = self.lit_pos + clause.literal_count() as usize;

            // Drop run words wholly below the bound.
            let run_bits = self.run_words * word_bits;
            if self.next_base + run_bits <= self.start {
                self.next_base += run_bits;
                self.run_words = 0;
                // Then drop literal words wholly below it.
                let skip = ((self.start - self.next_base) / word_bits) as usize;
                let skip = skip.min(self.lit_end - self.lit_pos);
                self.lit_pos += skip;
                self.next_base += skip as u64 * word_bits;
            } else {
                let skip = (self.start - self.next_base) / word_bits;
                self.run_words -= skip;
                self.next_base += skip * word_bits;
            }
            return;
        }
    }

    /// Loads `word` as the next word of content, masking positions below the
    /// lower bound. Returns false when the bitmap is exhausted.
    fn load_word(&mut self) -> bool {
        loop {
            if self.run_words > 0 {
                if !self.run_bit {
                    self.next_base += self.run_words * WORD_BITS as u64;
                    self.run_words = 0;
                    continue;
                }
                self.word = FULL_WORD;
                self.run_words -= 1;
            } else if self.lit_pos < self.lit_end {
                self.word = self.buffer[self.lit_pos];
                self.lit_pos += 1;
            } else {
                let Some(clause) = self.clauses.next() else {
                    return false;
                };
                self.run_words = clause.running_len();
                self.run_bit = clause.running_bit();
                self.lit_pos = clause.literal_start();
                self.lit_end = self.lit_pos + clause.literal_count() as usize;
                continue;
            }

            self.base = self.next_base;
            self.next_base += WORD_BITS as u64;
            if self.base >= self.end {
                return false;
            }
            if self.base < self.start {
                let shift = self.start - self.base;
                self.word = if shift < WORD_BITS as u64 {
                    self.word & (FULL_WORD << shift)
                } else {
                    0
                };
            }
            if self.word != 0 {
                return true;
            }
        }
    }
}

impl Iterator for Iter<'_> {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        if self.done {
            return None;
        }
        loop {
            if self.word != 0 {
                let bit = self.word.trailing_zeros();
                self.word &= self.word - 1;
                let pos = self.base + bit as u64;
                if pos >= self.end {
                    self.done = true;
                    return None;
                }
                return Some(pos as u32);
            }
            if !self.load_word() {
                self.done = true;
                return None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    #[test]
    fn test_iter_empty() {
        let bitmap = EwahBitmap::new();
        assert_eq!(bitmap.iter().count(), 0);
        assert_eq!(bitmap.iter_range(0..100).count(), 0);
    }

    #[test]
    fn test_iter_mixed_content() {
        let mut bitmap = EwahBitmap::new();
        bitmap.set(3);
        bitmap.set(64);
        bitmap.resize(300, true);
        bitmap.set(5000);

        let mut expected = vec![3u32, 64];
        expected.extend(65..300);
        expected.push(5000);
        assert_eq!(bitmap.positions(), expected);
    }

    #[test]
    fn test_iter_range_bounds() {
        let bitmap: EwahBitmap = [2u32, 5, 9, 70, 200].into_iter().collect();
        assert_eq!(bitmap.iter_range(5..200).collect::<Vec<_>>(), vec![5, 9, 70]);
        assert_eq!(
            bitmap.iter_range(5..=200).collect::<Vec<_>>(),
            vec![5, 9, 70, 200]
        );
        assert_eq!(bitmap.iter_range(6..9).count(), 0);
        assert_eq!(bitmap.iter_range(..).collect::<Vec<_>>(), bitmap.positions());
        assert_eq!(bitmap.iter_range(201..).count(), 0);
        assert_eq!(bitmap.iter_range(10..10).count(), 0);
    }

    #[test]
    fn test_iter_range_skips_runs() {
        let mut bitmap = EwahBitmap::new();
        bitmap.resize(1 << 20, true);
        // A bound landing mid-run starts exactly there.
        let positions: Vec<u32> = bitmap.iter_range(1_000_000..1_000_004).collect();
        assert_eq!(positions, vec![1_000_000, 1_000_001, 1_000_002, 1_000_003]);
    }

    #[test]
    fn test_iter_stops_at_declared_length() {
        // The final literal word is only partially significant.
        let mut bitmap = EwahBitmap::new();
        bitmap.append_set(69);
        assert_eq!(bitmap.bit_len(), 70);
        assert_eq!(bitmap.iter_range(..1000).collect::<Vec<_>>(), vec![69]);
    }

    #[test]
    fn test_iter_matches_get_randomized() {
        let mut rng = StdRng::seed_from_u64(99);
        for _ in 0..20 {
            let mut bitmap = EwahBitmap::new();
            for _ in 0..rng.gen_range(0..300) {
                bitmap.set(rng.gen_range(0..10_000u32));
            }
            let from_iter: Vec<u32> = bitmap.iter().collect();
            let from_get: Vec<u32> =
                (0..10_000u32).filter(|&index| bitmap.get(index)).collect();
            assert_eq!(from_iter, from_get);

            let start = rng.gen_range(0..10_000u32);
            let end = rng.gen_range(start..10_000u32);
            let ranged: Vec<u32> = bitmap.iter_range(start..end).collect();
            let expected: Vec<u32> = from_get
                .iter()
                .copied()
                .filter(|&p| p >= start && p < end)
                .collect();
            assert_eq!(ranged, expected);
        }
    }
}
