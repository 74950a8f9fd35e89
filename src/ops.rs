//! Streaming set algebra over compressed operands.
//!
//! Every pairwise operator follows one merge pattern: both operands' first
//! clauses are wrapped in consumable cursors, and at each step the cursor
//! with the smaller remaining extent (the prey) is fully resolved against
//! the other (the predator) before either advances. Runs combine in O(1);
//! only the regions where an operand holds literal words touch word data.
//! Once one operand drains, the other's tail is flushed in a single pass.
//!
//! The loops write through [Sink], so the same code materializes a result
//! bitmap or, via [BitCounter], answers a cardinality query without
//! allocating one.

use crate::{
    bitmap::EwahBitmap,
    cursor::{BufferedClause, Clause, ClauseCursor, ClauseIter},
    sink::{BitCounter, Sink},
};
use core::ops::{BitAnd, BitOr, BitXor};

/// Arms a merge: returns each operand's clause iterator and a cursor over
/// its first clause.
fn arm(bitmap: &EwahBitmap) -> (ClauseIter<'_>, BufferedClause) {
    let mut clauses = ClauseIter::new(bitmap.words());
    let first = clauses.next().expect("compressed buffer holds no clause");
    (clauses, BufferedClause::new(&first))
}

/// A clause snapshot with the running bit flipped, used to scan an operand
/// as its complement without materializing one.
fn negated(clause: &Clause) -> BufferedClause {
    let mut buffered = BufferedClause::new(clause);
    buffered.running_bit = !buffered.running_bit;
    buffered
}

/// Flushes a partially consumed operand verbatim.
fn discharge<S: Sink>(
    mut cur: BufferedClause,
    buffer: &[u64],
    clauses: &mut ClauseIter,
    sink: &mut S,
) {
    loop {
        sink.append_run(cur.running_bit, cur.running_len);
        sink.append_literals(cur.literals(buffer));
        match clauses.next() {
            Some(clause) => cur.reset(&clause),
            None => return,
        }
    }
}

/// Flushes a partially consumed operand as a run of zeros of equal extent.
fn discharge_as_zeros<S: Sink>(mut cur: BufferedClause, clauses: &mut ClauseIter, sink: &mut S) {
    loop {
        sink.append_run(false, cur.size());
        match clauses.next() {
            Some(clause) => cur.reset(&clause),
            None => return,
        }
    }
}

/// Streams `a AND b` into `sink`.
fn and_into<S: Sink>(a: &EwahBitmap, b: &EwahBitmap, sink: &mut S) {
    let (a_words, b_words) = (a.words(), b.words());
    let (mut a_clauses, mut rlw_a) = arm(a);
    let (mut b_clauses, mut rlw_b) = arm(b);
    let mut a_done = false;

    loop {
        let a_is_prey = rlw_a.size() < rlw_b.size();
        let (prey, predator, pred_words) = if a_is_prey {
            (&mut rlw_a, &mut rlw_b, b_words)
        } else {
            (&mut rlw_b, &mut rlw_a, a_words)
        };

        if !prey.running_bit {
            // The prey's zero run wipes out everything it overlaps.
            sink.append_run(false, prey.running_len);
            predator.discard_first_words(prey.running_len);
            prey.running_len = 0;
        } else {
            // The prey's run of ones passes the predator through.
            let runs = prey.running_len.min(predator.running_len);
            sink.append_run(predator.running_bit, runs);
            let copy = prey.running_len - runs;
            let start = predator.literal_start;
            sink.append_literals(&pred_words[start..start + copy as usize]);
            predator.discard_first_words(prey.running_len);
            prey.running_len = 0;
        }

        if predator.running_len > 0 {
            let words = predator.running_len.min(prey.literal_count);
            if predator.running_bit {
                let prey_words = if a_is_prey { a_words } else { b_words };
                let start = prey.literal_start;
                sink.append_literals(&prey_words[start..start + words as usize]);
            } else {
                sink.append_run(false, words);
            }
            predator.discard_first_words(words);
            prey.discard_first_words(words);
        }

        // Both cursors now hold only literals over the prey's remainder.
        let literals = prey.literal_count;
        if literals > 0 {
            for k in 0..literals as usize {
                sink.append_word(
                    a_words[rlw_a.literal_start + k] & b_words[rlw_b.literal_start + k],
                );
            }
            if a_is_prey {
                rlw_b.discard_first_words(literals);
            } else {
                rlw_a.discard_first_words(literals);
            }
        }

        if a_is_prey {
            match a_clauses.next() {
                Some(clause) => rlw_a.reset(&clause),
                None => {
                    a_done = true;
                    break;
                }
            }
        } else {
            match b_clauses.next() {
                Some(clause) => rlw_b.reset(&clause),
                None => break,
            }
        }
    }

    // The drained operand contributes nothing further.
    if a_done {
        discharge_as_zeros(rlw_b, &mut b_clauses, sink);
    } else {
        discharge_as_zeros(rlw_a, &mut a_clauses, sink);
    }
    sink.set_bit_len(a.bit_len().max(b.bit_len()));
}

/// Streams `a OR b` into `sink`.
fn or_into<S: Sink>(a: &EwahBitmap, b: &EwahBitmap, sink: &mut S) {
    let (a_words, b_words) = (a.words(), b.words());
    let (mut a_clauses, mut rlw_a) = arm(a);
    let (mut b_clauses, mut rlw_b) = arm(b);
    let mut a_done = false;

    loop {
        let a_is_prey = rlw_a.size() < rlw_b.size();
        let (prey, predator, pred_words) = if a_is_prey {
            (&mut rlw_a, &mut rlw_b, b_words)
        } else {
            (&mut rlw_b, &mut rlw_a, a_words)
        };

        if !prey.running_bit {
            // The prey's zero run passes the predator through.
            let runs = prey.running_len.min(predator.running_len);
            sink.append_run(predator.running_bit, runs);
            let copy = prey.running_len - runs;
            let start = predator.literal_start;
            sink.append_literals(&pred_words[start..start + copy as usize]);
            predator.discard_first_words(prey.running_len);
            prey.running_len = 0;
        } else {
            // The prey's run of ones dominates everything it overlaps.
            sink.append_run(true, prey.running_len);
            predator.discard_first_words(prey.running_len);
            prey.running_len = 0;
        }

        if predator.running_len > 0 {
            let words = predator.running_len.min(prey.literal_count);
            if predator.running_bit {
                sink.append_run(true, words);
            } else {
                let start = prey.literal_start;
                let prey_words = if a_is_prey { a_words } else { b_words };
                sink.append_literals(&prey_words[start..start + words as usize]);
            }
            predator.discard_first_words(words);
            prey.discard_first_words(words);
        }

        let literals = prey.literal_count;
        if literals > 0 {
            for k in 0..literals as usize {
                sink.append_word(
                    a_words[rlw_a.literal_start + k] | b_words[rlw_b.literal_start + k],
                );
            }
            if a_is_prey {
                rlw_b.discard_first_words(literals);
            } else {
                rlw_a.discard_first_words(literals);
            }
        }

        if a_is_prey {
            match a_clauses.next() {
                Some(clause) => rlw_a.reset(&clause),
                None => {
                    a_done = true;
                    break;
                }
            }
        } else {
            match b_clauses.next() {
                Some(clause) => rlw_b.reset(&clause),
                None => break,
            }
        }
    }

    if a_done {
        discharge(rlw_b, b_words, &mut b_clauses, sink);
    } else {
        discharge(rlw_a, a_words, &mut a_clauses, sink);
    }
    sink.set_bit_len(a.bit_len().max(b.bit_len()));
}

/// Streams `a XOR b` into `sink`.
fn xor_into<S: Sink>(a: &EwahBitmap, b: &EwahBitmap, sink: &mut S) {
    let (a_words, b_words) = (a.words(), b.words());
    let (mut a_clauses, mut rlw_a) = arm(a);
    let (mut b_clauses, mut rlw_b) = arm(b);
    let mut a_done = false;

    loop {
        let a_is_prey = rlw_a.size() < rlw_b.size();
        let (prey, predator, pred_words) = if a_is_prey {
            (&mut rlw_a, &mut rlw_b, b_words)
        } else {
            (&mut rlw_b, &mut rlw_a, a_words)
        };

        let runs = prey.running_len.min(predator.running_len);
        let copy = prey.running_len - runs;
        let start = predator.literal_start;
        if !prey.running_bit {
            // XOR with zeros: the predator passes through.
            sink.append_run(predator.running_bit, runs);
            sink.append_literals(&pred_words[start..start + copy as usize]);
        } else {
            // XOR with ones: the predator passes through complemented.
            sink.append_run(!predator.running_bit, runs);
            sink.append_negated_literals(&pred_words[start..start + copy as usize]);
        }
        let prey_run = prey.running_len;
        predator.discard_first_words(prey_run);
        prey.discard_first_words(prey_run);

        if predator.running_len > 0 {
            let words = predator.running_len.min(prey.literal_count);
            let start = prey.literal_start;
            let prey_words = if a_is_prey { a_words } else { b_words };
            if predator.running_bit {
                sink.append_negated_literals(&prey_words[start..start + words as usize]);
            } else {
                sink.append_literals(&prey_words[start..start + words as usize]);
            }
            predator.discard_first_words(words);
            prey.discard_first_words(words);
        }

        let literals = prey.literal_count;
        if literals > 0 {
            for k in 0..literals as usize {
                sink.append_word(
                    a_words[rlw_a.literal_start + k] ^ b_words[rlw_b.literal_start + k],
                );
            }
            if a_is_prey {
                rlw_b.discard_first_words(literals);
            } else {
                rlw_a.discard_first_words(literals);
            }
        }

        if a_is_prey {
            match a_clauses.next() {
                Some(clause) => rlw_a.reset(&clause),
                None => {
                    a_done = true;
                    break;
                }
            }
        } else {
            match b_clauses.next() {
                Some(clause) => rlw_b.reset(&clause),
                None => break,
            }
        }
    }

    if a_done {
        discharge(rlw_b, b_words, &mut b_clauses, sink);
    } else {
        discharge(rlw_a, a_words, &mut a_clauses, sink);
    }
    sink.set_bit_len(a.bit_len().max(b.bit_len()));
}

/// Streams `a AND NOT b` into `sink`.
///
/// `b` is scanned with its running bits flipped and its literal words
/// complemented on emission; `NOT b` is never materialized. Once `a`
/// drains, `b`'s tail flushes as zeros (`0 AND NOT b = 0`); once `b`
/// drains, `a`'s tail flushes verbatim (`a AND NOT 0 = a`).
fn and_not_into<S: Sink>(a: &EwahBitmap, b: &EwahBitmap, sink: &mut S) {
    let (a_words, b_words) = (a.words(), b.words());
    let (mut a_clauses, mut rlw_a) = arm(a);
    let mut b_clauses = ClauseIter::new(b_words);
    let mut rlw_b = negated(&b_clauses.next().expect("compressed buffer holds no clause"));
    let mut a_done = false;

    loop {
        let a_is_prey = rlw_a.size() < rlw_b.size();
        let (prey, predator) = if a_is_prey {
            (&mut rlw_a, &mut rlw_b)
        } else {
            (&mut rlw_b, &mut rlw_a)
        };

        if !prey.running_bit {
            // A zero run on either side zeroes the result.
            sink.append_run(false, prey.running_len);
            predator.discard_first_words(prey.running_len);
            prey.running_len = 0;
        } else {
            // A run of ones passes the predator through; literals from the
            // complemented operand emit negated.
            let runs = prey.running_len.min(predator.running_len);
            sink.append_run(predator.running_bit, runs);
            let copy = prey.running_len - runs;
            let start = predator.literal_start;
            if a_is_prey {
                sink.append_negated_literals(&b_words[start..start + copy as usize]);
            } else {
                sink.append_literals(&a_words[start..start + copy as usize]);
            }
            predator.discard_first_words(prey.running_len);
            prey.running_len = 0;
        }

        if predator.running_len > 0 {
            let words = predator.running_len.min(prey.literal_count);
            if predator.running_bit {
                let start = prey.literal_start;
                if a_is_prey {
                    sink.append_literals(&a_words[start..start + words as usize]);
                } else {
                    sink.append_negated_literals(&b_words[start..start + words as usize]);
                }
            } else {
                sink.append_run(false, words);
            }
            predator.discard_first_words(words);
            prey.discard_first_words(words);
        }

        let literals = prey.literal_count;
        if literals > 0 {
            for k in 0..literals as usize {
                sink.append_word(
                    a_words[rlw_a.literal_start + k] & !b_words[rlw_b.literal_start + k],
                );
            }
            if a_is_prey {
                rlw_b.discard_first_words(literals);
            } else {
                rlw_a.discard_first_words(literals);
            }
        }

        if a_is_prey {
            match a_clauses.next() {
                Some(clause) => rlw_a.reset(&clause),
                None => {
                    a_done = true;
                    break;
                }
            }
        } else {
            match b_clauses.next() {
                Some(clause) => rlw_b = negated(&clause),
                None => break,
            }
        }
    }

    if a_done {
        discharge_as_zeros(rlw_b, &mut b_clauses, sink);
    } else {
        discharge(rlw_a, a_words, &mut a_clauses, sink);
    }
    sink.set_bit_len(a.bit_len().max(b.bit_len()));
}

/// Returns true at the first position set in both operands, without
/// building a result.
fn intersects(a: &EwahBitmap, b: &EwahBitmap) -> bool {
    let (a_words, b_words) = (a.words(), b.words());
    let (mut a_clauses, mut rlw_a) = arm(a);
    let (mut b_clauses, mut rlw_b) = arm(b);

    loop {
        let a_is_prey = rlw_a.size() < rlw_b.size();
        let (prey, predator, pred_words) = if a_is_prey {
            (&mut rlw_a, &mut rlw_b, b_words)
        } else {
            (&mut rlw_b, &mut rlw_a, a_words)
        };

        if !prey.running_bit {
            predator.discard_first_words(prey.running_len);
            prey.running_len = 0;
        } else {
            let runs = prey.running_len.min(predator.running_len);
            if runs > 0 && predator.running_bit {
                return true;
            }
            // The rest of the prey's ones overlap predator literals.
            let copy = prey.running_len - runs;
            let start = predator.literal_start;
            if pred_words[start..start + copy as usize]
                .iter()
                .any(|&word| word != 0)
            {
                return true;
            }
            predator.discard_first_words(prey.running_len);
            prey.running_len = 0;
        }

        if predator.running_len > 0 {
            let words = predator.running_len.min(prey.literal_count);
            if predator.running_bit {
                let start = prey.literal_start;
                let prey_words = if a_is_prey { a_words } else { b_words };
                if prey_words[start..start + words as usize]
                    .iter()
                    .any(|&word| word != 0)
                {
                    return true;
                }
            }
            predator.discard_first_words(words);
            prey.discard_first_words(words);
        }

        let literals = prey.literal_count;
        if literals > 0 {
            for k in 0..literals as usize {
                if a_words[rlw_a.literal_start + k] & b_words[rlw_b.literal_start + k] != 0 {
                    return true;
                }
            }
            if a_is_prey {
                rlw_b.discard_first_words(literals);
            } else {
                rlw_a.discard_first_words(literals);
            }
        }

        if a_is_prey {
            match a_clauses.next() {
                Some(clause) => rlw_a.reset(&clause),
                None => return false,
            }
        } else {
            match b_clauses.next() {
                Some(clause) => rlw_b.reset(&clause),
                None => return false,
            }
        }
    }
}

/// Streams the OR of any number of operands into `sink` without pairwise
/// intermediates.
///
/// Operands are scanned in descending declared-length order. At each step a
/// run of ones on any operand dominates its whole extent, a run of zeros
/// common to all operands is skipped for all of them at once, and only the
/// residual regions fall back to word-at-a-time OR across literals.
fn or_all_into<S: Sink>(bitmaps: &[&EwahBitmap], sink: &mut S) {
    match bitmaps {
        [] => {
            sink.set_bit_len(0);
            return;
        }
        [only] => {
            ClauseCursor::new(only.words()).discharge(sink);
            sink.set_bit_len(only.bit_len());
            return;
        }
        [a, b] => {
            or_into(*a, *b, sink);
            return;
        }
        _ => {}
    }

    let mut sorted = bitmaps.to_vec();
    sorted.sort_by(|x, y| y.bit_len().cmp(&x.bit_len()));
    let max_bits = sorted[0].bit_len();

    let mut cursors: Vec<ClauseCursor> = sorted
        .iter()
        .map(|bitmap| ClauseCursor::new(bitmap.words()))
        .collect();
    let mut active = cursors.len();

    loop {
        let mut max_one_run = 0u64;
        let mut min_zero_run = u64::MAX;
        let mut min_size = u64::MAX;
        let mut bare_literal_cursors = 0usize;
        for (i, cursor) in cursors[..active].iter().enumerate() {
            let size = cursor.size();
            if size == 0 {
                // Operands drain in sorted order: everything past the first
                // exhausted cursor is exhausted too.
                active = i;
                break;
            }
            min_size = min_size.min(size);
            let run = cursor.running_len();
            if cursor.running_bit() {
                max_one_run = max_one_run.max(run);
                min_zero_run = 0;
            } else {
                min_zero_run = min_zero_run.min(run);
            }
            if run == 0 {
                bare_literal_cursors += 1;
            }
        }

        if active == 0 {
            break;
        }
        if active == 1 {
            cursors[0].discharge(sink);
            break;
        }

        if max_one_run > 0 {
            // A universal run of ones dominates every operand beneath it.
            sink.append_run(true, max_one_run);
            for cursor in &mut cursors[..active] {
                cursor.discard_first_words(max_one_run);
            }
        } else if min_zero_run > 0 {
            // All operands agree on a run of zeros: skip it everywhere.
            sink.append_run(false, min_zero_run);
            for cursor in &mut cursors[..active] {
                cursor.discard_first_words(min_zero_run);
            }
        } else {
            let mut index = 0u64;
            if bare_literal_cursors == 1 {
                // One operand holds literals while the rest still sit in
                // zero runs: those literals pass through verbatim.
                let mut min_run = u64::MAX;
                let mut bare = None;
                for (i, cursor) in cursors[..active].iter().enumerate() {
                    let run = cursor.running_len();
                    if run == 0 {
                        bare = Some(i);
                    } else {
                        min_run = min_run.min(run);
                    }
                }
                let words = min_run.min(min_size);
                if let Some(i) = bare {
                    cursors[i].write_literals(words, sink);
                }
                index = words;
            }
            while index < min_size {
                let mut word = 0u64;
                for cursor in cursors[..active].iter() {
                    if cursor.running_len() <= index {
                        word |= cursor.literal_word_at(index - cursor.running_len());
                    }
                }
                sink.append_word(word);
                index += 1;
            }
            for cursor in &mut cursors[..active] {
                cursor.discard_first_words(min_size);
            }
        }
    }

    sink.set_bit_len(max_bits);
}

impl EwahBitmap {
    /// Returns a new bitmap holding the intersection of `self` and `other`.
    ///
    /// Runs in time proportional to the sum of the compressed sizes.
    pub fn and(&self, other: &Self) -> Self {
        let mut out = Self::with_capacity(self.word_len().max(other.word_len()));
        and_into(self, other, &mut out);
        out
    }

    /// The cardinality of `self AND other`, computed without materializing
    /// the result.
    pub fn and_count(&self, other: &Self) -> u64 {
        let mut counter = BitCounter::new();
        and_into(self, other, &mut counter);
        counter.count()
    }

    /// Returns a new bitmap holding the union of `self` and `other`.
    pub fn or(&self, other: &Self) -> Self {
        let mut out = Self::with_capacity(self.word_len() + other.word_len());
        or_into(self, other, &mut out);
        out
    }

    /// The cardinality of `self OR other`.
    pub fn or_count(&self, other: &Self) -> u64 {
        let mut counter = BitCounter::new();
        or_into(self, other, &mut counter);
        counter.count()
    }

    /// Returns a new bitmap holding the symmetric difference of `self` and
    /// `other`.
    pub fn xor(&self, other: &Self) -> Self {
        let mut out = Self::with_capacity(self.word_len() + other.word_len());
        xor_into(self, other, &mut out);
        out
    }

    /// The cardinality of `self XOR other`.
    pub fn xor_count(&self, other: &Self) -> u64 {
        let mut counter = BitCounter::new();
        xor_into(self, other, &mut counter);
        counter.count()
    }

    /// Returns a new bitmap holding `self AND NOT other`.
    pub fn and_not(&self, other: &Self) -> Self {
        let mut out = Self::with_capacity(self.word_len().max(other.word_len()));
        and_not_into(self, other, &mut out);
        out
    }

    /// The cardinality of `self AND NOT other`.
    pub fn and_not_count(&self, other: &Self) -> u64 {
        let mut counter = BitCounter::new();
        and_not_into(self, other, &mut counter);
        counter.count()
    }

    /// Returns true if `self` and `other` share a set bit. Faster than
    /// checking the intersection when the result itself is not needed.
    pub fn intersects(&self, other: &Self) -> bool {
        intersects(self, other)
    }

    /// Returns a new bitmap holding the union of all `bitmaps`, merged in
    /// one pass without pairwise intermediates.
    pub fn or_all(bitmaps: &[&Self]) -> Self {
        let largest = bitmaps.iter().map(|b| b.word_len()).max().unwrap_or(0);
        let mut out = Self::with_capacity(largest + largest / 2);
        or_all_into(bitmaps, &mut out);
        out
    }

    /// The cardinality of the union of all `bitmaps`.
    pub fn or_all_count(bitmaps: &[&Self]) -> u64 {
        let mut counter = BitCounter::new();
        or_all_into(bitmaps, &mut counter);
        counter.count()
    }
}

impl BitAnd for &EwahBitmap {
    type Output = EwahBitmap;

    fn bitand(self, rhs: Self) -> EwahBitmap {
        self.and(rhs)
    }
}

impl BitOr for &EwahBitmap {
    type Output = EwahBitmap;

    fn bitor(self, rhs: Self) -> EwahBitmap {
        self.or(rhs)
    }
}

impl BitXor for &EwahBitmap {
    type Output = EwahBitmap;

    fn bitxor(self, rhs: Self) -> EwahBitmap {
        self.xor(rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn bitmap_from(positions: &[u32]) -> EwahBitmap {
        positions.iter().copied().collect()
    }

    /// Builds a random bitmap alongside a plain boolean reference model,
    /// mixing sparse bits, dense ranges and an occasional declared tail.
    fn random_bitmap(rng: &mut StdRng, max_bits: u32) -> (EwahBitmap, Vec<bool>) {
        let len = rng.gen_range(1..max_bits) as usize;
        let mut reference = vec![false; len];
        let mut bitmap = EwahBitmap::new();
        for _ in 0..rng.gen_range(0..4) {
            let start = rng.gen_range(0..len);
            let span = rng.gen_range(1..200).min(len - start);
            for index in start..start + span {
                bitmap.set(index as u32);
                reference[index] = true;
            }
        }
        for _ in 0..rng.gen_range(0..100) {
            let index = rng.gen_range(0..len);
            bitmap.set(index as u32);
            reference[index] = true;
        }
        if rng.gen_bool(0.5) {
            bitmap.resize(len as u32, false);
        } else {
            reference.truncate(bitmap.bit_len() as usize);
        }
        (bitmap, reference)
    }

    fn reference_op(a: &[bool], b: &[bool], op: impl Fn(bool, bool) -> bool) -> Vec<u32> {
        let len = a.len().max(b.len());
        (0..len)
            .filter(|&i| {
                op(
                    a.get(i).copied().unwrap_or(false),
                    b.get(i).copied().unwrap_or(false),
                )
            })
            .map(|i| i as u32)
            .collect()
    }

    #[test]
    fn test_and_basic() {
        let mut a = bitmap_from(&[1, 2, 3]);
        a.resize(1000, false);
        let b = bitmap_from(&[2, 3, 4]);

        let result = a.and(&b);
        result.assert_valid();
        assert_eq!(result.positions(), vec![2, 3]);
        assert_eq!(result.bit_len(), 1000);
        assert_eq!(a.and_count(&b), 2);
    }

    #[test]
    fn test_and_not_basic() {
        let mut a = bitmap_from(&[1, 2, 3]);
        a.resize(1000, false);
        let b = bitmap_from(&[2, 3, 4]);

        let result = a.and_not(&b);
        result.assert_valid();
        assert_eq!(result.positions(), vec![1]);
        assert_eq!(a.and_not_count(&b), 1);

        let reverse = b.and_not(&a);
        reverse.assert_valid();
        assert_eq!(reverse.positions(), vec![4]);
    }

    #[test]
    fn test_or_basic() {
        let a = bitmap_from(&[1, 2, 3]);
        let b = bitmap_from(&[2, 3, 4]);
        let result = a.or(&b);
        result.assert_valid();
        assert_eq!(result.positions(), vec![1, 2, 3, 4]);
        assert_eq!(a.or_count(&b), 4);
    }

    #[test]
    fn test_xor_basic() {
        let a = bitmap_from(&[1, 2, 3]);
        let b = bitmap_from(&[2, 3, 4]);
        let result = a.xor(&b);
        result.assert_valid();
        assert_eq!(result.positions(), vec![1, 4]);
        assert_eq!(a.xor_count(&b), 2);
    }

    #[test]
    fn test_operator_sugar() {
        let a = bitmap_from(&[1, 2]);
        let b = bitmap_from(&[2, 3]);
        assert_eq!((&a & &b).positions(), vec![2]);
        assert_eq!((&a | &b).positions(), vec![1, 2, 3]);
        assert_eq!((&a ^ &b).positions(), vec![1, 3]);
    }

    #[test]
    fn test_ops_with_empty_operand() {
        let empty = EwahBitmap::new();
        let some = bitmap_from(&[5, 700]);

        assert!(some.and(&empty).is_empty());
        assert!(empty.and(&some).is_empty());
        assert_eq!(some.or(&empty).positions(), vec![5, 700]);
        assert_eq!(empty.or(&some).positions(), vec![5, 700]);
        assert_eq!(some.xor(&empty).positions(), vec![5, 700]);
        assert_eq!(some.and_not(&empty).positions(), vec![5, 700]);
        assert!(empty.and_not(&some).is_empty());
        assert!(!some.intersects(&empty));
    }

    #[test]
    fn test_ops_against_run_of_ones() {
        let mut ones = EwahBitmap::new();
        ones.resize(512, true);
        let sparse = bitmap_from(&[3, 100, 300, 511]);

        assert_eq!(ones.and(&sparse).positions(), sparse.positions());
        assert_eq!(ones.or(&sparse).count_ones(), 512);
        assert_eq!(ones.xor(&sparse).count_ones(), 512 - 4);
        assert_eq!(ones.and_not(&sparse).count_ones(), 512 - 4);
        assert!(ones.intersects(&sparse));
    }

    #[test]
    fn test_self_operations() {
        let (a, _) = random_bitmap(&mut StdRng::seed_from_u64(1), 5000);
        assert!(a.xor(&a).is_empty());
        assert!(a.and_not(&a).is_empty());
        assert_eq!(a.or(&a).positions(), a.positions());
        assert_eq!(a.and(&a).positions(), a.positions());
    }

    #[test]
    fn test_or_commutes() {
        let mut rng = StdRng::seed_from_u64(2);
        for _ in 0..20 {
            let (a, _) = random_bitmap(&mut rng, 4000);
            let (b, _) = random_bitmap(&mut rng, 4000);
            assert_eq!(a.or(&b).positions(), b.or(&a).positions());
            assert_eq!(a.and(&b).positions(), b.and(&a).positions());
            assert_eq!(a.xor(&b).positions(), b.xor(&a).positions());
        }
    }

    #[test]
    fn test_and_associates() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..10 {
            let (a, _) = random_bitmap(&mut rng, 4000);
            let (b, _) = random_bitmap(&mut rng, 4000);
            let (c, _) = random_bitmap(&mut rng, 4000);
            assert_eq!(
                a.and(&b).and(&c).positions(),
                a.and(&b.and(&c)).positions()
            );
        }
    }

    #[test]
    fn test_cardinality_laws() {
        let mut rng = StdRng::seed_from_u64(4);
        for _ in 0..25 {
            let (a, _) = random_bitmap(&mut rng, 6000);
            let (b, _) = random_bitmap(&mut rng, 6000);

            let and = a.and(&b).count_ones();
            let or = a.or(&b).count_ones();
            let xor = a.xor(&b).count_ones();
            let and_not = a.and_not(&b).count_ones();

            assert_eq!(a.and_count(&b), and);
            assert_eq!(a.or_count(&b), or);
            assert_eq!(a.xor_count(&b), xor);
            assert_eq!(a.and_not_count(&b), and_not);

            assert_eq!(or, a.count_ones() + b.count_ones() - and);
            assert_eq!(xor, or - and);
            assert_eq!(and_not, a.count_ones() - and);
            assert_eq!(a.intersects(&b), and > 0);
        }
    }

    #[test]
    fn test_ops_match_reference() {
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..25 {
            let (a, a_ref) = random_bitmap(&mut rng, 4000);
            let (b, b_ref) = random_bitmap(&mut rng, 4000);

            let and = a.and(&b);
            let or = a.or(&b);
            let xor = a.xor(&b);
            let and_not = a.and_not(&b);
            for result in [&and, &or, &xor, &and_not] {
                result.assert_valid();
                assert_eq!(result.bit_len(), a.bit_len().max(b.bit_len()));
            }

            assert_eq!(and.positions(), reference_op(&a_ref, &b_ref, |x, y| x & y));
            assert_eq!(or.positions(), reference_op(&a_ref, &b_ref, |x, y| x | y));
            assert_eq!(xor.positions(), reference_op(&a_ref, &b_ref, |x, y| x ^ y));
            assert_eq!(
                and_not.positions(),
                reference_op(&a_ref, &b_ref, |x, y| x & !y)
            );
        }
    }

    #[test]
    fn test_or_all_basic() {
        let a = bitmap_from(&[1]);
        let b = bitmap_from(&[2]);
        let c = bitmap_from(&[1, 3]);

        let result = EwahBitmap::or_all(&[&a, &b, &c]);
        result.assert_valid();
        assert_eq!(result.positions(), vec![1, 2, 3]);
        assert_eq!(result.positions(), a.or(&b).or(&c).positions());
        assert_eq!(EwahBitmap::or_all_count(&[&a, &b, &c]), 3);
    }

    #[test]
    fn test_or_all_degenerate_arities() {
        assert!(EwahBitmap::or_all(&[]).is_empty());

        let a = bitmap_from(&[7, 90]);
        assert_eq!(EwahBitmap::or_all(&[&a]).positions(), vec![7, 90]);

        let b = bitmap_from(&[8]);
        assert_eq!(EwahBitmap::or_all(&[&a, &b]).positions(), vec![7, 8, 90]);
    }

    #[test]
    fn test_or_all_matches_chained() {
        let mut rng = StdRng::seed_from_u64(6);
        for _ in 0..15 {
            let count = rng.gen_range(3..7);
            let operands: Vec<(EwahBitmap, Vec<bool>)> = (0..count)
                .map(|_| random_bitmap(&mut rng, 5000))
                .collect();
            let refs: Vec<&EwahBitmap> = operands.iter().map(|(b, _)| b).collect();

            let merged = EwahBitmap::or_all(&refs);
            merged.assert_valid();

            let mut chained = operands[0].0.clone();
            for operand in &refs[1..] {
                chained = chained.or(operand);
            }
            assert_eq!(merged.positions(), chained.positions());
            assert_eq!(merged.bit_len(), chained.bit_len());
            assert_eq!(EwahBitmap::or_all_count(&refs), chained.count_ones());
        }
    }

    #[test]
    fn test_or_all_with_runs_of_ones() {
        let mut dense = EwahBitmap::new();
        dense.resize(1000, true);
        let sparse = bitmap_from(&[5, 2000]);
        let mid = bitmap_from(&[1500]);

        let result = EwahBitmap::or_all(&[&sparse, &dense, &mid]);
        result.assert_valid();
        assert_eq!(result.count_ones(), 1000 + 2);
        assert!(result.get(999));
        assert!(result.get(1500));
        assert!(result.get(2000));
    }

    #[test]
    fn test_intersects_short_circuit_cases() {
        // Disjoint literals.
        assert!(!bitmap_from(&[1, 2]).intersects(&bitmap_from(&[3, 4])));

        // Overlap inside runs of ones.
        let mut a = EwahBitmap::new();
        a.resize(300, true);
        let mut b = EwahBitmap::new();
        b.resize(100, false);
        b.resize(400, true);
        assert!(a.intersects(&b));

        // A run of ones against a literal.
        assert!(a.intersects(&bitmap_from(&[250])));
        // The same literal beyond the run.
        let mut short = EwahBitmap::new();
        short.resize(64, true);
        assert!(!short.intersects(&bitmap_from(&[250])));
    }

    #[test]
    fn test_mismatched_lengths() {
        let mut long = EwahBitmap::new();
        long.resize(100_000, false);
        long.set(99_999);
        let short = bitmap_from(&[0, 99_999 % 64]);

        let or = long.or(&short);
        or.assert_valid();
        assert_eq!(or.bit_len(), 100_000);
        assert_eq!(or.count_ones(), 3);

        let and = long.and(&short);
        assert_eq!(and.bit_len(), 100_000);
        assert!(and.is_empty());
    }
}
