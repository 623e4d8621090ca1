use ndarray::Array2;

use crate::bits::BitBuffer;
use crate::Result;

/// Block interleaver.
///
/// The coded stream is written column by column into a `rows x columns` matrix and
/// transmitted row by row, so coded bit `c * rows + r` is sent at position
/// `r * columns + c`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Interleaver {
    rows: usize,
    columns: usize,
    /// Coded index of each transmitted position.
    coded: Vec<usize>,
}

impl Interleaver {
    #[must_use]
    pub fn new(rows: usize, columns: usize) -> Self {
        let matrix = Array2::from_shape_fn((rows, columns), |(r, c)| c * rows + r);
        Interleaver {
            rows,
            columns,
            coded: matrix.iter().copied().collect(),
        }
    }

    #[must_use]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[must_use]
    pub fn columns(&self) -> usize {
        self.columns
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.coded.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.coded.is_empty()
    }

    /// Recover the coded order from the `len()` transmitted bits starting at `offset`.
    ///
    /// # Errors
    /// [crate::Error::IndexOutOfRange] if the block does not fit in `buf`.
    pub fn deinterleave(&self, buf: &BitBuffer, offset: usize) -> Result<BitBuffer> {
        let mut out = BitBuffer::new(self.len());
        for (tx, coded) in self.coded.iter().enumerate() {
            if buf.get(offset + tx)? {
                out.set(*coded)?;
            }
        }
        Ok(out)
    }

    /// Transmission order for the `len()` coded bits starting at `offset`.
    ///
    /// # Errors
    /// [crate::Error::IndexOutOfRange] if the block does not fit in `buf`.
    pub fn interleave(&self, buf: &BitBuffer, offset: usize) -> Result<BitBuffer> {
        let mut out = BitBuffer::new(self.len());
        for (tx, coded) in self.coded.iter().enumerate() {
            if buf.get(offset + coded)? {
                out.set(tx)?;
            }
        }
        Ok(out)
    }
}
