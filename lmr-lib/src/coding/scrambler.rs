use crate::bits::BitBuffer;
use crate::Result;

/// Removes a transmitter side scrambling sequence.
pub trait Derandomizer: Send + Sync {
    /// # Errors
    /// If the sequence is longer than `buf`.
    fn derandomize(&self, buf: &mut BitBuffer) -> Result<()>;
}

const PN9_SEED: u16 = 0x0E4;

/// First `len` bits of the PN9 sequence, generator `x^9 + x^4 + 1`.
#[must_use]
pub fn pn9(len: usize) -> BitBuffer {
    let mut state = PN9_SEED;
    let bits: Vec<bool> = (0..len)
        .map(|_| {
            let bit = state & 1 == 1;
            let feedback = (state ^ (state >> 4)) & 1;
            state = (state >> 1) | (feedback << 8);
            bit
        })
        .collect();
    BitBuffer::from_bits(&bits)
}

/// A fixed XOR sequence applied from bit 0 of a buffer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScrambleSequence(BitBuffer);

impl ScrambleSequence {
    #[must_use]
    pub fn new(sequence: BitBuffer) -> Self {
        ScrambleSequence(sequence)
    }

    /// PN9 sequence of `len` bits.
    #[must_use]
    pub fn pn9(len: usize) -> Self {
        ScrambleSequence(pn9(len))
    }

    /// Sequence with `prefix` XORed out of its leading bits, for channels where part of
    /// the scrambled region has already been descrambled on its own. Prefix bits beyond
    /// the end of the sequence are ignored.
    #[must_use]
    pub fn excluding(self, prefix: &BitBuffer) -> Self {
        let bits: Vec<bool> = self
            .0
            .iter()
            .zip(prefix.iter().chain(std::iter::repeat(false)))
            .map(|(a, b)| a ^ b)
            .collect();
        ScrambleSequence(BitBuffer::from_bits(&bits))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn bits(&self) -> &BitBuffer {
        &self.0
    }
}

impl Derandomizer for ScrambleSequence {
    fn derandomize(&self, buf: &mut BitBuffer) -> Result<()> {
        buf.xor(&self.0)
    }
}
