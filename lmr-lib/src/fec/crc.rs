use crate::bits::{BitBuffer, Field};
use crate::Result;

/// Bit-serial, MSB first, non-reflected CRC over arbitrary bit fields.
///
/// Protocol checksums cover fields that are rarely whole bytes, so this works one bit at
/// a time over any [Field] rather than over byte slices.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Crc {
    pub width: u8,
    pub poly: u64,
    /// Register preset.
    pub init: u64,
}

/// NXDN SACCH CRC-6.
pub const NXDN_CRC6: Crc = Crc::new(6, 0x27, 0x3F);
/// NXDN FACCH1 CRC-12.
pub const NXDN_CRC12: Crc = Crc::new(12, 0x80F, 0xFFF);
/// NXDN FACCH2/UDCH CRC-15.
pub const NXDN_CRC15: Crc = Crc::new(15, 0x4CC5, 0x7FFF);
/// NXDN CAC CRC-16.
pub const NXDN_CRC16: Crc = Crc::new(16, 0x1021, 0xFFFF);
/// CRC-CCITT with a zero preset, as used by the CCITT-80 checksum.
pub const CCITT: Crc = Crc::new(16, 0x1021, 0);

impl Crc {
    #[must_use]
    pub const fn new(width: u8, poly: u64, init: u64) -> Self {
        Crc { width, poly, init }
    }

    /// All ones in the low `width` bits.
    #[must_use]
    pub const fn mask(&self) -> u64 {
        if self.width >= 64 {
            u64::MAX
        } else {
            (1u64 << self.width) - 1
        }
    }

    /// Same polynomial with a zero preset, i.e., the purely linear part of the checksum.
    #[must_use]
    pub const fn linear(&self) -> Crc {
        Crc::new(self.width, self.poly, 0)
    }

    #[must_use]
    pub fn compute_bits<I>(&self, bits: I) -> u64
    where
        I: IntoIterator<Item = bool>,
    {
        let top = 1u64 << (self.width - 1);
        let mask = self.mask();
        let mut reg = self.init & mask;
        for bit in bits {
            let feedback = (reg & top != 0) ^ bit;
            reg = (reg << 1) & mask;
            if feedback {
                reg ^= self.poly;
            }
        }
        reg & mask
    }

    /// Checksum of the bits of `field`.
    ///
    /// # Errors
    /// [crate::Error::IndexOutOfRange] if the field does not fit in `buf`.
    pub fn compute(&self, buf: &BitBuffer, field: Field) -> Result<u64> {
        let bits = field
            .positions()
            .map(|pos| buf.get(pos))
            .collect::<Result<Vec<bool>>>()?;
        Ok(self.compute_bits(bits))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    const CHECK: &[u8] = b"123456789";

    #[test]
    fn ccitt_check_value() {
        let buf = BitBuffer::from_bytes(CHECK);
        assert_eq!(CCITT.compute(&buf, Field::range(0, 72)).unwrap(), 0x31C3);
        assert_eq!(NXDN_CRC16.compute(&buf, Field::range(0, 72)).unwrap(), 0x29B1);
    }

    #[test]
    fn matches_catalog_crc_for_random_bytes() {
        let xmodem = crc::Crc::<u16>::new(&crc::CRC_16_XMODEM);
        let ibm3740 = crc::Crc::<u16>::new(&crc::CRC_16_IBM_3740);
        let mut rng = StdRng::seed_from_u64(7);
        for len in [1usize, 2, 10, 33] {
            let bytes: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
            let buf = BitBuffer::from_bytes(&bytes);
            let field = Field::range(0, len * 8);
            assert_eq!(
                CCITT.compute(&buf, field).unwrap(),
                u64::from(xmodem.checksum(&bytes))
            );
            assert_eq!(
                NXDN_CRC16.compute(&buf, field).unwrap(),
                u64::from(ibm3740.checksum(&bytes))
            );
        }
    }

    #[test]
    fn preset_is_affine_constant() {
        // crc(a) == linear(a) ^ crc(zeros) for any data
        let buf: BitBuffer = "10110011101000111010110110".parse().unwrap();
        let zeros = BitBuffer::new(26);
        let field = Field::range(0, 26);
        let expected = NXDN_CRC6.linear().compute(&buf, field).unwrap()
            ^ NXDN_CRC6.compute(&zeros, field).unwrap();
        assert_eq!(NXDN_CRC6.compute(&buf, field).unwrap(), expected);
    }

    #[test]
    fn sparse_field_is_supported() {
        const F: Field = Field::sparse(&[0, 2, 4, 6]);
        let buf: BitBuffer = "1x0x1x1".replace('x', "0").parse().unwrap();
        let contiguous: BitBuffer = "1011".parse().unwrap();
        assert_eq!(
            CCITT.compute(&buf, F).unwrap(),
            CCITT.compute(&contiguous, Field::range(0, 4)).unwrap()
        );
    }
}
