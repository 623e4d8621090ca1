//! Single-bit error correction for linear checksums.
//!
//! Any checksum that is linear over GF(2), possibly offset by a constant preset, can be
//! described by the checksum contribution of each individual bit. A received word whose
//! calculated and transmitted checksums differ by exactly one of those contributions has
//! a single bit error at that position.
use tracing::trace;

use super::{Crc, Integrity, IntegrityAlgorithm};
use crate::bits::{BitBuffer, Field};
use crate::{Error, Result};

/// Expected value of `calculated ^ transmitted` for an error free word.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Residual {
    /// Transmitted checksum equals the calculated one.
    Null,
    /// Transmitted checksum is the one's complement of the calculated one.
    Inverted,
    /// Either convention is accepted. Corrections try the null convention first.
    NullOrInverted,
}

/// Per-bit checksum contributions for a code with `data_bits` data bits followed by
/// `check_bits` checksum bits.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyndromeTable {
    entries: Vec<u64>,
    data_bits: usize,
    check_bits: usize,
    preset: u64,
}

impl SyndromeTable {
    /// Derive the table for a CRC protecting `data_bits` bits.
    ///
    /// The CRC preset becomes the table preset, i.e., the checksum of all-zero data.
    #[must_use]
    pub fn from_crc(crc: &Crc, data_bits: usize) -> Self {
        let linear = crc.linear();
        let mut entries = Vec::with_capacity(data_bits + usize::from(crc.width));
        for i in 0..data_bits {
            entries.push(linear.compute_bits((0..data_bits).map(|j| j == i)));
        }
        let preset = crc.compute_bits(std::iter::repeat(false).take(data_bits));
        let mut table = SyndromeTable {
            entries,
            data_bits,
            check_bits: usize::from(crc.width),
            preset,
        };
        table.push_checksum_entries();
        table
    }

    /// Table from published data-bit signatures, e.g., the columns of a Hamming parity
    /// check matrix.
    #[must_use]
    pub fn from_signatures(signatures: &[u64], check_bits: usize, preset: u64) -> Self {
        let mut table = SyndromeTable {
            entries: signatures.to_vec(),
            data_bits: signatures.len(),
            check_bits,
            preset,
        };
        table.push_checksum_entries();
        table
    }

    /// Table for any affine encoder by feeding it one-hot data words.
    ///
    /// `encoder` receives a buffer of `data_bits` bits and returns the checksum it would
    /// transmit. `mask` is XORed onto every checksum, e.g. a protocol specific parity
    /// mask.
    pub fn from_linear<F>(data_bits: usize, check_bits: usize, mask: u64, encoder: F) -> Self
    where
        F: Fn(&BitBuffer) -> u64,
    {
        let zero = encoder(&BitBuffer::new(data_bits));
        let entries = (0..data_bits)
            .map(|i| {
                let one_hot: Vec<bool> = (0..data_bits).map(|j| j == i).collect();
                encoder(&BitBuffer::from_bits(&one_hot)) ^ zero
            })
            .collect();
        let mut table = SyndromeTable {
            entries,
            data_bits,
            check_bits,
            preset: zero ^ mask,
        };
        table.push_checksum_entries();
        table
    }

    fn push_checksum_entries(&mut self) {
        for j in 0..self.check_bits {
            self.entries.push(1u64 << (self.check_bits - 1 - j));
        }
    }

    /// Total protected bits, data then checksum.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn data_bits(&self) -> usize {
        self.data_bits
    }

    #[must_use]
    pub fn check_bits(&self) -> usize {
        self.check_bits
    }

    #[must_use]
    pub fn preset(&self) -> u64 {
        self.preset
    }

    #[must_use]
    pub fn entries(&self) -> &[u64] {
        &self.entries
    }

    fn all_ones(&self) -> u64 {
        if self.check_bits >= 64 {
            u64::MAX
        } else {
            (1u64 << self.check_bits) - 1
        }
    }

    fn position_of(&self, signature: u64) -> Option<usize> {
        self.entries.iter().position(|e| *e == signature)
    }

    /// Checksum of the data bits read from `positions`.
    fn calculate(&self, buf: &BitBuffer, positions: &[usize]) -> Result<u64> {
        let mut value = self.preset;
        for (entry, pos) in self.entries.iter().zip(positions) {
            if buf.get(*pos)? {
                value ^= entry;
            }
        }
        Ok(value)
    }
}

/// Where a residual points, without changing the buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Located {
    Clean,
    /// Absolute buffer position of the single bad bit.
    At(usize),
    /// More errors than the code can place.
    Unknown,
}

/// Checks and corrects single bit errors in one protected field.
#[derive(Clone, Debug)]
pub struct SyndromeCorrector {
    table: SyndromeTable,
    residual: Residual,
}

impl SyndromeCorrector {
    #[must_use]
    pub fn new(table: SyndromeTable, residual: Residual) -> Self {
        SyndromeCorrector { table, residual }
    }

    #[must_use]
    pub fn table(&self) -> &SyndromeTable {
        &self.table
    }

    fn residual(&self, buf: &BitBuffer, positions: &[usize]) -> Result<u64> {
        if positions.len() != self.table.len() {
            return Err(Error::InvalidLength {
                expected: self.table.len(),
                actual: positions.len(),
            });
        }
        let calculated = self.table.calculate(buf, &positions[..self.table.data_bits])?;
        let transmitted = buf.long_at(&positions[self.table.data_bits..])?;
        Ok(calculated ^ transmitted)
    }

    fn passes(&self, residual: u64) -> bool {
        let ones = self.table.all_ones();
        match self.residual {
            Residual::Null => residual == 0,
            Residual::Inverted => residual == ones,
            Residual::NullOrInverted => residual == 0 || residual == ones,
        }
    }

    /// Verify without modifying the buffer.
    ///
    /// `positions` lists the data bits followed by the checksum bits, each MSB first.
    ///
    /// # Errors
    /// [Error::InvalidLength] if `positions` does not match the table, or
    /// [Error::IndexOutOfRange].
    pub fn check(&self, buf: &BitBuffer, positions: &[usize]) -> Result<Integrity> {
        let residual = self.residual(buf, positions)?;
        Ok(if self.passes(residual) {
            Integrity::Passed
        } else {
            Integrity::Failed
        })
    }

    /// Find the single bad bit, if any, without correcting it.
    ///
    /// # Errors
    /// See [SyndromeCorrector::check].
    pub fn locate(&self, buf: &BitBuffer, positions: &[usize]) -> Result<Located> {
        let residual = self.residual(buf, positions)?;
        if self.passes(residual) {
            return Ok(Located::Clean);
        }
        let ones = self.table.all_ones();
        let found = match self.residual {
            Residual::Null => self.table.position_of(residual),
            Residual::Inverted => self.table.position_of(residual ^ ones),
            Residual::NullOrInverted => self
                .table
                .position_of(residual)
                .or_else(|| self.table.position_of(residual ^ ones)),
        };
        Ok(found.map_or(Located::Unknown, |i| Located::At(positions[i])))
    }

    /// Verify and flip a single bad bit if the residual identifies one.
    ///
    /// # Errors
    /// See [SyndromeCorrector::check].
    pub fn correct(&self, buf: &mut BitBuffer, positions: &[usize]) -> Result<Integrity> {
        match self.locate(buf, positions)? {
            Located::Clean => Ok(Integrity::Passed),
            Located::At(pos) => {
                trace!(position = pos, "corrected single bit error");
                buf.flip(pos)?;
                Ok(Integrity::Corrected)
            }
            Located::Unknown => Ok(Integrity::Failed),
        }
    }

    /// [SyndromeCorrector::check] over a [Field].
    ///
    /// # Errors
    /// See [SyndromeCorrector::check].
    pub fn check_field(&self, buf: &BitBuffer, field: Field) -> Result<Integrity> {
        self.check(buf, &field.to_vec())
    }

    /// [SyndromeCorrector::correct] over a [Field].
    ///
    /// # Errors
    /// See [SyndromeCorrector::check].
    pub fn correct_field(&self, buf: &mut BitBuffer, field: Field) -> Result<Integrity> {
        self.correct(buf, &field.to_vec())
    }

    /// Write the checksum for the data bits into the checksum positions, using the
    /// convention this corrector expects.
    ///
    /// # Errors
    /// See [SyndromeCorrector::check].
    pub fn encode(&self, buf: &mut BitBuffer, field: Field) -> Result<()> {
        self.encode_at(buf, &field.to_vec())
    }

    /// [SyndromeCorrector::encode] over an explicit position list.
    ///
    /// # Errors
    /// See [SyndromeCorrector::check].
    pub fn encode_at(&self, buf: &mut BitBuffer, positions: &[usize]) -> Result<()> {
        if positions.len() != self.table.len() {
            return Err(Error::InvalidLength {
                expected: self.table.len(),
                actual: positions.len(),
            });
        }
        let data = self.table.data_bits;
        let mut value = self.table.calculate(buf, &positions[..data])?;
        if self.residual != Residual::Null {
            value ^= self.table.all_ones();
        }
        let width = self.table.check_bits;
        for (i, pos) in positions[data..].iter().enumerate() {
            buf.put(*pos, (value >> (width - 1 - i)) & 1 == 1)?;
        }
        Ok(())
    }
}

/// A corrector bound to the field it protects in a particular frame layout.
#[derive(Clone, Copy, Debug)]
pub struct ProtectedField {
    pub corrector: &'static SyndromeCorrector,
    pub field: Field,
    /// Only verify, never flip bits. Used for short checksums where a single bit
    /// correction is too likely to be wrong.
    pub check_only: bool,
}

impl ProtectedField {
    #[must_use]
    pub const fn new(corrector: &'static SyndromeCorrector, field: Field) -> Self {
        ProtectedField {
            corrector,
            field,
            check_only: false,
        }
    }

    #[must_use]
    pub const fn check_only(corrector: &'static SyndromeCorrector, field: Field) -> Self {
        ProtectedField {
            corrector,
            field,
            check_only: true,
        }
    }
}

impl IntegrityAlgorithm for ProtectedField {
    fn perform(&self, buf: &mut BitBuffer) -> Result<Integrity> {
        if self.check_only {
            self.corrector.check_field(buf, self.field)
        } else {
            self.corrector.correct_field(buf, self.field)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fec::{CCITT, NXDN_CRC6};

    const PREFIX: &str = "001001100000011110101011111100111110000111101001";

    fn ccitt_64() -> SyndromeCorrector {
        SyndromeCorrector::new(SyndromeTable::from_crc(&CCITT, 48), Residual::Null)
    }

    fn protected_message(corrector: &SyndromeCorrector) -> BitBuffer {
        let prefix: BitBuffer = PREFIX.parse().unwrap();
        let mut buf = BitBuffer::new(64);
        buf.copy_from(0, &prefix).unwrap();
        corrector.encode(&mut buf, Field::range(0, 64)).unwrap();
        buf
    }

    #[test]
    fn table_has_data_and_checksum_entries() {
        let corrector = ccitt_64();
        let table = corrector.table();
        assert_eq!(table.len(), 64);
        assert_eq!(table.entries()[48], 0x8000);
        assert_eq!(table.entries()[63], 0x0001);
        // last data bit contributes the polynomial itself
        assert_eq!(table.entries()[47], 0x1021);
    }

    #[test]
    fn clean_message_passes() {
        let corrector = ccitt_64();
        let mut buf = protected_message(&corrector);
        let positions = Field::range(0, 64).to_vec();
        assert_eq!(corrector.check(&buf, &positions).unwrap(), Integrity::Passed);
        assert_eq!(corrector.correct(&mut buf, &positions).unwrap(), Integrity::Passed);
        assert_eq!(buf.corrected_bits(), 0);
    }

    #[test]
    fn every_single_bit_error_is_corrected() {
        let corrector = ccitt_64();
        let clean = protected_message(&corrector);
        for bad in 0..64 {
            let mut buf = clean.clone();
            buf.put(bad, !buf.get(bad).unwrap()).unwrap();
            let result = corrector.correct_field(&mut buf, Field::range(0, 64)).unwrap();
            assert_eq!(result, Integrity::Corrected, "bit {bad}");
            assert_eq!(buf, clean, "bit {bad}");
            assert_eq!(buf.corrected_bits(), 1);
        }
    }

    #[test]
    fn double_error_is_not_silently_accepted() {
        let corrector = ccitt_64();
        let mut buf = protected_message(&corrector);
        buf.put(3, !buf.get(3).unwrap()).unwrap();
        buf.put(4, !buf.get(4).unwrap()).unwrap();
        assert_eq!(
            corrector.check_field(&buf, Field::range(0, 64)).unwrap(),
            Integrity::Failed
        );
    }

    #[test]
    fn inverted_residual() {
        let corrector =
            SyndromeCorrector::new(SyndromeTable::from_crc(&CCITT, 48), Residual::Inverted);
        let clean = protected_message(&corrector);
        let field = Field::range(0, 64);
        assert_eq!(corrector.check_field(&clean, field).unwrap(), Integrity::Passed);

        let mut buf = clean.clone();
        buf.put(10, !buf.get(10).unwrap()).unwrap();
        assert_eq!(corrector.correct_field(&mut buf, field).unwrap(), Integrity::Corrected);
        assert_eq!(buf, clean);
    }

    #[test]
    fn null_or_inverted_accepts_both() {
        let null = ccitt_64();
        let either =
            SyndromeCorrector::new(SyndromeTable::from_crc(&CCITT, 48), Residual::NullOrInverted);
        let field = Field::range(0, 64);
        let plain = protected_message(&null);
        let inverted = protected_message(&either);
        assert_ne!(plain, inverted);
        assert_eq!(either.check_field(&plain, field).unwrap(), Integrity::Passed);
        assert_eq!(either.check_field(&inverted, field).unwrap(), Integrity::Passed);
    }

    #[test]
    fn null_or_inverted_corrects_both() {
        let either =
            SyndromeCorrector::new(SyndromeTable::from_crc(&CCITT, 48), Residual::NullOrInverted);
        let field = Field::range(0, 64);
        for clean in [protected_message(&ccitt_64()), protected_message(&either)] {
            for bad in 0..64 {
                let mut buf = clean.clone();
                buf.flip(bad).unwrap();
                assert_eq!(either.correct_field(&mut buf, field).unwrap(), Integrity::Corrected);
                assert_eq!(buf, clean, "bit {bad}");
            }
        }
    }

    #[test]
    fn preset_only_word_is_self_consistent() {
        // All-zero data carries the preset as its checksum
        let table = SyndromeTable::from_crc(&NXDN_CRC6, 26);
        let corrector = SyndromeCorrector::new(table, Residual::Null);
        let mut buf = BitBuffer::new(32);
        corrector.encode(&mut buf, Field::range(0, 32)).unwrap();
        assert_eq!(buf.long(Field::range(26, 32)).unwrap(), corrector.table().preset());
    }

    #[test]
    fn wrong_position_count() {
        let corrector = ccitt_64();
        let buf = BitBuffer::new(64);
        assert!(matches!(
            corrector.check(&buf, &[0, 1, 2]),
            Err(Error::InvalidLength { expected: 64, actual: 3 })
        ));
    }

    #[test]
    fn hamming_signatures() {
        // Hamming(7,4): data signatures then identity for the parity bits
        let table = SyndromeTable::from_signatures(&[5, 7, 6, 3], 3, 0);
        let corrector = SyndromeCorrector::new(table, Residual::Null);
        let mut buf: BitBuffer = "1011000".parse().unwrap();
        corrector.encode(&mut buf, Field::range(0, 7)).unwrap();
        let clean = buf.clone();
        buf.flip(5).unwrap();
        assert_eq!(
            corrector.correct_field(&mut buf, Field::range(0, 7)).unwrap(),
            Integrity::Corrected
        );
        assert_eq!(buf, clean);
    }

    #[test]
    fn one_hot_linear_encoder_matches_crc_table() {
        let from_crc = SyndromeTable::from_crc(&CCITT, 20);
        let one_hot = SyndromeTable::from_linear(20, 16, 0, |data| {
            CCITT.compute(data, Field::range(0, 20)).unwrap()
        });
        assert_eq!(from_crc, one_hot);
    }
}
