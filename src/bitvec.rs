//! Growable bit vector used for free-space tracking.
//!
//! Every allocator in this crate (mesh spans, primitive slots, staging
//! scratch blocks) is built on [`BitVec`]: a sequence of fixed-width
//! words where an unset bit marks a free block. The word width is
//! chosen per use so that one word addresses one comfortable GPU
//! allocation.

use std::ops::{BitAnd, BitAndAssign, BitOrAssign, Not, Shl};

/// Word granularity of a [`BitVec`].
///
/// Implemented for the unsigned integer types. Sealed in practice by
/// the required constants; callers pick the width per instantiation.
pub trait Word:
    Copy
    + Eq
    + Not<Output = Self>
    + Shl<usize, Output = Self>
    + BitAnd<Output = Self>
    + BitAndAssign
    + BitOrAssign
    + Send
    + Sync
    + 'static
{
    /// Number of bits in the word.
    const BITS: usize;
    /// The all-zeros word.
    const ZERO: Self;
    /// The word with only the lowest bit set.
    const ONE: Self;
    /// The all-ones word.
    const MAX: Self;

    /// Count of zero bits in the word.
    fn count_zeros(self) -> usize;
    /// Count of trailing one bits in the word.
    fn trailing_ones(self) -> usize;
}

macro_rules! impl_word {
    ($($t:ty),*) => {$(
        impl Word for $t {
            const BITS: usize = <$t>::BITS as usize;
            const ZERO: Self = 0;
            const ONE: Self = 1;
            const MAX: Self = <$t>::MAX;

            #[inline]
            fn count_zeros(self) -> usize {
                <$t>::count_zeros(self) as usize
            }

            #[inline]
            fn trailing_ones(self) -> usize {
                <$t>::trailing_ones(self) as usize
            }
        }
    )*};
}

impl_word!(u8, u16, u32, u64);

/// A growable bit vector with custom word granularity.
///
/// Invariant: `rem() == len() - <number of set bits>` after every
/// mutation. Growth appends all-zero words; shrink truncates from the
/// tail, recomputing `rem` only for the removed words.
#[derive(Debug, Clone, Default)]
pub struct BitVec<W: Word> {
    words: Vec<W>,
    rem: usize,
}

impl<W: Word> BitVec<W> {
    /// Create an empty bit vector.
    pub fn new() -> Self {
        Self {
            words: Vec::new(),
            rem: 0,
        }
    }

    /// Number of bits in the vector.
    pub fn len(&self) -> usize {
        self.words.len() * W::BITS
    }

    /// Whether the vector contains no bits.
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Number of unset bits in the vector.
    pub fn rem(&self) -> usize {
        self.rem
    }

    /// Resize the vector to contain `nplus` additional words.
    ///
    /// The new extent is appended as a contiguous range of unset bits,
    /// so a subsequent `search_range(nplus * W::BITS)` is guaranteed to
    /// succeed. Returns the value of `len()` prior to appending, which
    /// is the index of the first new bit.
    pub fn grow(&mut self, nplus: usize) -> usize {
        let index = self.len();
        if nplus > 0 {
            self.rem += nplus * W::BITS;
            self.words.resize(self.words.len() + nplus, W::ZERO);
        }
        index
    }

    /// Resize the vector to contain `nminus` fewer words.
    ///
    /// This truncates the tail; `rem` is adjusted only for the words
    /// removed. Shrinking by more words than exist empties the vector.
    pub fn shrink(&mut self, nminus: usize) {
        if nminus == 0 {
            return;
        }
        if nminus >= self.words.len() {
            self.words.clear();
            self.rem = 0;
            return;
        }
        let n = self.words.len() - nminus;
        for w in &self.words[n..] {
            self.rem -= w.count_zeros();
        }
        self.words.truncate(n);
    }

    /// Set a given bit.
    ///
    /// Setting an already-set bit does not change `rem`.
    pub fn set(&mut self, index: usize) {
        let i = index / W::BITS;
        let b = W::ONE << (index % W::BITS);
        if self.words[i] & b == W::ZERO {
            self.words[i] |= b;
            self.rem -= 1;
        }
    }

    /// Unset a given bit.
    ///
    /// Unsetting an already-unset bit does not change `rem`.
    pub fn unset(&mut self, index: usize) {
        let i = index / W::BITS;
        let b = W::ONE << (index % W::BITS);
        if self.words[i] & b != W::ZERO {
            self.words[i] &= !b;
            self.rem += 1;
        }
    }

    /// Check whether a given bit is set.
    pub fn is_set(&self, index: usize) -> bool {
        let i = index / W::BITS;
        let b = W::ONE << (index % W::BITS);
        self.words[i] & b != W::ZERO
    }

    /// Locate an unset bit in the vector.
    ///
    /// The returned index is suitable for a call to [`set`]. Fails only
    /// when `rem() == 0`. All-ones words are skipped whole.
    ///
    /// [`set`]: Self::set
    pub fn search(&self) -> Option<usize> {
        if self.rem == 0 {
            return None;
        }
        for (i, &w) in self.words.iter().enumerate() {
            if w != W::MAX {
                return Some(i * W::BITS + w.trailing_ones());
            }
        }
        None
    }

    /// Locate a contiguous range of `n` unset bits.
    ///
    /// On success, every index in `[index, index + n)` is suitable for
    /// a call to [`set`]. Degenerates to [`search`] when `n <= 1`.
    /// Fails fast when `rem() < n`. Ranges may straddle any number of
    /// word boundaries, including ranges larger than one word.
    ///
    /// [`set`]: Self::set
    /// [`search`]: Self::search
    pub fn search_range(&self, n: usize) -> Option<usize> {
        if n <= 1 {
            return self.search();
        }
        if self.rem < n {
            return None;
        }
        let nb = W::BITS;
        let len = self.words.len();
        // Running count of contiguous zero bits, and the word/bit pair
        // where the current candidate run starts.
        let mut cnt = 0usize;
        let mut idx = 0usize;
        let mut bit = 0usize;
        let mut i = 0usize;
        while i < len {
            if self.words[i] == W::MAX {
                // Skip words that have no unset bits.
                cnt = 0;
                bit = 0;
                i += 1;
                while i < len && self.words[i] == W::MAX {
                    i += 1;
                }
                idx = i;
                if i == len {
                    return None;
                }
            }
            // Give up if there are not enough bits left.
            if cnt + nb * (len - i) < n {
                return None;
            }
            let w = self.words[i];
            if w == W::ZERO {
                cnt += nb;
                if cnt >= n {
                    return Some(idx * nb + bit);
                }
                i += 1;
                continue;
            }
            // Mixed word: either it completes the run, contains a full
            // run of its own, or leaves a tail that may yet form a run
            // with subsequent words.
            for j in 0..nb {
                if w & (W::ONE << j) == W::ZERO {
                    cnt += 1;
                    if cnt >= n {
                        return Some(idx * nb + bit);
                    }
                } else {
                    cnt = 0;
                    if j < nb - 1 {
                        idx = i;
                        bit = j + 1;
                    } else {
                        idx = i + 1;
                        bit = 0;
                    }
                }
            }
            i += 1;
        }
        None
    }

    /// Unset every bit in the vector.
    pub fn clear(&mut self) {
        let n = self.len();
        if n == self.rem {
            return;
        }
        self.words.fill(W::ZERO);
        self.rem = n;
    }

    /// Iterate over all bits as `(index, is_set)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (usize, bool)> + '_ {
        self.words.iter().enumerate().flat_map(|(i, &w)| {
            (0..W::BITS).map(move |b| (i * W::BITS + b, w & (W::ONE << b) != W::ZERO))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn check_invariant<W: Word>(v: &BitVec<W>) {
        let set = v.iter().filter(|&(_, s)| s).count();
        assert_eq!(v.rem(), v.len() - set, "rem invariant violated");
    }

    #[test]
    fn test_empty() {
        let v: BitVec<u32> = BitVec::new();
        assert_eq!(v.len(), 0);
        assert_eq!(v.rem(), 0);
        assert!(v.search().is_none());
        assert!(v.search_range(4).is_none());
    }

    #[test]
    fn test_grow_returns_prior_len() {
        let mut v: BitVec<u16> = BitVec::new();
        assert_eq!(v.grow(2), 0);
        assert_eq!(v.len(), 32);
        assert_eq!(v.rem(), 32);
        assert_eq!(v.grow(1), 32);
        assert_eq!(v.len(), 48);
        assert_eq!(v.rem(), 48);
        check_invariant(&v);
    }

    #[test]
    fn test_set_unset_idempotent() {
        let mut v: BitVec<u8> = BitVec::new();
        v.grow(2);
        v.set(3);
        assert_eq!(v.rem(), 15);
        v.set(3);
        assert_eq!(v.rem(), 15);
        assert!(v.is_set(3));
        v.unset(3);
        assert_eq!(v.rem(), 16);
        v.unset(3);
        assert_eq!(v.rem(), 16);
        assert!(!v.is_set(3));
        check_invariant(&v);
    }

    #[test]
    fn test_search_skips_full_words() {
        let mut v: BitVec<u8> = BitVec::new();
        v.grow(3);
        for i in 0..8 {
            v.set(i);
        }
        v.set(8);
        assert_eq!(v.search(), Some(9));
        for i in 9..16 {
            v.set(i);
        }
        assert_eq!(v.search(), Some(16));
        check_invariant(&v);
    }

    #[test]
    fn test_search_exhausted() {
        let mut v: BitVec<u8> = BitVec::new();
        v.grow(1);
        for i in 0..8 {
            v.set(i);
        }
        assert_eq!(v.rem(), 0);
        assert!(v.search().is_none());
    }

    #[rstest]
    #[case(2)]
    #[case(7)]
    #[case(8)]
    #[case(9)]
    #[case(16)]
    #[case(20)]
    fn test_search_range_straddles_words(#[case] n: usize) {
        // 3 words of u8, bits 0..4 set: the only run of >= 20 zero bits
        // starts at bit 4 and crosses both word boundaries.
        let mut v: BitVec<u8> = BitVec::new();
        v.grow(3);
        for i in 0..4 {
            v.set(i);
        }
        let idx = v.search_range(n).unwrap();
        assert_eq!(idx, 4);
        for i in idx..idx + n {
            assert!(!v.is_set(i));
        }
    }

    #[test]
    fn test_search_range_rejects_fragmented() {
        let mut v: BitVec<u8> = BitVec::new();
        v.grow(2);
        // Free bits: 0..4 and 8..12, but no run of 5.
        for i in 4..8 {
            v.set(i);
        }
        for i in 12..16 {
            v.set(i);
        }
        assert_eq!(v.rem(), 8);
        assert_eq!(v.search_range(4), Some(0));
        assert!(v.search_range(5).is_none());
    }

    #[test]
    fn test_search_range_fails_fast() {
        let mut v: BitVec<u32> = BitVec::new();
        v.grow(1);
        assert!(v.search_range(33).is_none());
    }

    #[test]
    fn test_search_range_after_full_word_reset() {
        let mut v: BitVec<u8> = BitVec::new();
        v.grow(3);
        // Word 1 fully set: a run started in word 0 must restart after it.
        for i in 8..16 {
            v.set(i);
        }
        assert_eq!(v.search_range(8), Some(0));
        assert_eq!(v.search_range(9), None);
        v.unset(8);
        assert_eq!(v.search_range(9), Some(0));
        check_invariant(&v);
    }

    #[test]
    fn test_search_range_degenerates_to_search() {
        let mut v: BitVec<u8> = BitVec::new();
        v.grow(1);
        v.set(0);
        assert_eq!(v.search_range(0), Some(1));
        assert_eq!(v.search_range(1), Some(1));
    }

    #[test]
    fn test_grow_then_search_range_succeeds() {
        let mut v: BitVec<u32> = BitVec::new();
        v.grow(1);
        for i in 0..32 {
            v.set(i);
        }
        assert!(v.search_range(64).is_none());
        let idx = v.grow(2);
        assert_eq!(v.search_range(64), Some(idx));
    }

    #[test]
    fn test_shrink_recomputes_rem() {
        let mut v: BitVec<u8> = BitVec::new();
        v.grow(4);
        for i in 0..8 {
            v.set(i);
        }
        v.set(24);
        assert_eq!(v.rem(), 23);
        // Remove last word (7 unset bits).
        v.shrink(1);
        assert_eq!(v.len(), 24);
        assert_eq!(v.rem(), 16);
        check_invariant(&v);
        // Shrinking past the start empties the vector.
        v.shrink(10);
        assert_eq!(v.len(), 0);
        assert_eq!(v.rem(), 0);
    }

    #[test]
    fn test_clear_idempotent() {
        let mut v: BitVec<u16> = BitVec::new();
        v.grow(2);
        v.set(5);
        v.set(17);
        v.clear();
        assert_eq!(v.rem(), v.len());
        v.clear();
        assert_eq!(v.rem(), v.len());
        assert!(v.iter().all(|(_, s)| !s));
    }

    #[test]
    fn test_rem_invariant_under_random_ops() {
        let mut v: BitVec<u32> = BitVec::new();
        v.grow(4);
        // Deterministic pseudo-random walk.
        let mut x = 0x2545f491u32;
        for _ in 0..4096 {
            x ^= x << 13;
            x ^= x >> 17;
            x ^= x << 5;
            let i = (x as usize >> 8) % v.len();
            if x & 1 == 0 {
                v.set(i);
            } else {
                v.unset(i);
            }
            check_invariant(&v);
        }
        // search_range result always starts a run of exactly n unset bits.
        for n in [1usize, 3, 9, 33, 70] {
            if let Some(idx) = v.search_range(n) {
                for i in idx..idx + n {
                    assert!(!v.is_set(i), "bit {i} in claimed run is set");
                }
            } else {
                // Verify there really is no run of n by brute force.
                let mut run = 0;
                let mut best = 0;
                for (_, s) in v.iter() {
                    if s {
                        run = 0;
                    } else {
                        run += 1;
                        best = best.max(run);
                    }
                }
                assert!(best < n, "search_range missed a run of {n}");
            }
        }
    }
}
