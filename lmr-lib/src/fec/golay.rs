//! Golay(23,12) and its extended and shortened variants.
//!
//! Codewords are handled as integers laid out `[data][11 parity][1 overall parity]`,
//! MSB first. Shortened codes drop leading data bits, which are treated as zero.
use std::sync::LazyLock;

use super::Integrity;
use crate::bits::{BitBuffer, Field};
use crate::Result;

const GENERATOR: u32 = 0xC75;
const NO_LEADER: u32 = u32::MAX;

/// Syndrome to minimum weight error pattern. Golay(23,12) is perfect so every syndrome
/// has a leader of weight 3 or less.
static COSET_LEADERS: LazyLock<Vec<u32>> = LazyLock::new(|| {
    let mut table = vec![NO_LEADER; 2048];
    table[0] = 0;
    for a in 0..23 {
        let ea = 1u32 << a;
        table[syndrome(ea) as usize] = ea;
        for b in (a + 1)..23 {
            let eb = ea | 1 << b;
            table[syndrome(eb) as usize] = eb;
            for c in (b + 1)..23 {
                let ec = eb | 1 << c;
                table[syndrome(ec) as usize] = ec;
            }
        }
    }
    table
});

fn syndrome(word: u32) -> u32 {
    let mut v = word & 0x7F_FFFF;
    for i in (11..23).rev() {
        if v & (1 << i) != 0 {
            v ^= GENERATOR << (i - 11);
        }
    }
    v
}

/// Systematic Golay(23,12) codeword for the low 12 bits of `data`.
#[must_use]
pub fn encode23(data: u32) -> u32 {
    let shifted = (data & 0xFFF) << 11;
    shifted | syndrome(shifted)
}

/// Extended Golay(24,12) codeword.
#[must_use]
pub fn encode24(data: u32) -> u32 {
    let word = encode23(data);
    (word << 1) | (word.count_ones() & 1)
}

/// Decode an extended 24-bit word, returning the corrected word and the number of bits
/// changed, or `None` when the error pattern is beyond the code.
#[must_use]
pub fn decode24(word: u32) -> Option<(u32, u32)> {
    let inner = (word >> 1) & 0x7F_FFFF;
    let parity = word & 1;
    let leader = COSET_LEADERS[syndrome(inner) as usize];
    if leader == NO_LEADER {
        return None;
    }
    let fixed = inner ^ leader;
    let mut errors = leader.count_ones();
    let mut fixed_parity = parity;
    if fixed.count_ones() & 1 != parity {
        // A weight-3 leader plus a parity mismatch means at least 4 errors
        if errors == 3 {
            return None;
        }
        fixed_parity ^= 1;
        errors += 1;
    }
    Some(((fixed << 1) | fixed_parity, errors))
}

/// An extended Golay code shortened to `data_bits` data bits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GolayCode {
    data_bits: usize,
}

/// Extended Golay(24,12).
pub const GOLAY_24_12: GolayCode = GolayCode { data_bits: 12 };
/// Shortened Golay(20,8), as used by the DMR slot type.
pub const GOLAY_20_8: GolayCode = GolayCode { data_bits: 8 };
/// Shortened Golay(18,6), as used by the P25 header data unit.
pub const GOLAY_18_6: GolayCode = GolayCode { data_bits: 6 };

impl GolayCode {
    #[must_use]
    pub const fn len(&self) -> usize {
        self.data_bits + 12
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        false
    }

    #[must_use]
    pub const fn data_bits(&self) -> usize {
        self.data_bits
    }

    #[must_use]
    pub fn encode(&self, data: u32) -> u32 {
        encode24(data & ((1 << self.data_bits) - 1))
    }

    /// Data portion of a codeword.
    #[must_use]
    pub fn data(&self, word: u32) -> u32 {
        word >> 12
    }

    /// Correct a `len()` bit word. Errors that land in the implied zero bits of a
    /// shortened code are reported as uncorrectable.
    #[must_use]
    pub fn decode(&self, word: u32) -> Option<(u32, u32)> {
        let (fixed, errors) = decode24(word)?;
        if fixed >> self.len() != 0 {
            return None;
        }
        Some((fixed, errors))
    }

    /// Correct the words starting at each of `offsets` in place.
    ///
    /// Uncorrectable words are left as received and make the result
    /// [Integrity::Failed].
    ///
    /// # Errors
    /// [crate::Error::IndexOutOfRange] if a word does not fit in `buf`.
    pub fn correct_words(&self, buf: &mut BitBuffer, offsets: &[usize]) -> Result<Integrity> {
        let n = self.len();
        let mut integrity = Integrity::Passed;
        for offset in offsets {
            let field = Field::bits(*offset, n);
            let word = buf.int(field)?;
            match self.decode(word) {
                None => integrity = Integrity::Failed,
                Some((_, 0)) => {}
                Some((fixed, _)) => {
                    let diff = word ^ fixed;
                    for i in 0..n {
                        if diff >> (n - 1 - i) & 1 == 1 {
                            buf.flip(offset + i)?;
                        }
                    }
                    integrity = integrity.merge(Integrity::Corrected);
                }
            }
        }
        Ok(integrity)
    }
}
