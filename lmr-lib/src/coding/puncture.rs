use crate::bits::BitBuffer;
use crate::{Error, Result};

/// Periodic puncturing pattern.
///
/// Within every `period` coded bits the positions in `removed` are not transmitted. The
/// decoder side reinserts them as erasures.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Puncture {
    period: usize,
    removed: &'static [usize],
}

/// No puncturing.
pub const NO_PUNCTURE: Puncture = Puncture::new(1, &[]);
/// NXDN SACCH, 72 coded bits to 60.
pub const SACCH_PUNCTURE: Puncture = Puncture::new(12, &[1, 7]);
/// NXDN FACCH1, 192 coded bits to 144.
pub const FACCH1_PUNCTURE: Puncture = Puncture::new(4, &[1]);
/// NXDN CAC and FACCH2.
pub const CAC_PUNCTURE: Puncture = Puncture::new(14, &[1, 7]);
/// NXDN long CAC, 312 coded bits to 252.
pub const LONG_CAC_PUNCTURE: Puncture = Puncture::new(26, &[1, 5, 9, 15, 21]);

impl Puncture {
    #[must_use]
    pub const fn new(period: usize, removed: &'static [usize]) -> Self {
        Puncture { period, removed }
    }

    fn kept(&self, index: usize) -> bool {
        !self.removed.contains(&(index % self.period))
    }

    /// Transmitted length of `coded_len` coded bits.
    #[must_use]
    pub fn punctured_len(&self, coded_len: usize) -> usize {
        (0..coded_len).filter(|i| self.kept(*i)).count()
    }

    /// Smallest coded length whose punctured form is `tx_len` bits.
    #[must_use]
    pub fn coded_len(&self, tx_len: usize) -> usize {
        let mut kept = 0;
        let mut index = 0;
        while kept < tx_len {
            if self.kept(index) {
                kept += 1;
            }
            index += 1;
        }
        index
    }

    /// Drop the punctured positions.
    #[must_use]
    pub fn puncture(&self, coded: &BitBuffer) -> BitBuffer {
        let bits: Vec<bool> = coded
            .iter()
            .enumerate()
            .filter_map(|(i, bit)| self.kept(i).then_some(bit))
            .collect();
        BitBuffer::from_bits(&bits)
    }

    /// Expand transmitted bits back to `coded_len` soft positions, `None` marking an
    /// erasure the Viterbi decoder must not count against any path.
    ///
    /// # Errors
    /// [Error::InvalidLength] if `tx` does not hold exactly the kept bits of
    /// `coded_len` coded bits.
    pub fn depuncture(&self, tx: &BitBuffer, coded_len: usize) -> Result<Vec<Option<bool>>> {
        let expected = self.punctured_len(coded_len);
        if tx.len() != expected {
            return Err(Error::InvalidLength {
                expected,
                actual: tx.len(),
            });
        }
        let mut bits = tx.iter();
        Ok((0..coded_len)
            .map(|i| if self.kept(i) { bits.next() } else { None })
            .collect())
    }
}
