//! Bit addressable message buffers.
//!
//! A [BitBuffer] holds one frame, or one logical piece of a frame, as an ordered sequence
//! of bits indexed from 0. Multi-bit values are read MSB first in the order given by a
//! [Field]. The buffer also keeps a count of the bits flipped by error correction.
mod field;

pub use field::*;

use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

const WORD_BITS: usize = 64;

/// Fixed length bit vector with field accessors and a corrected-bit counter.
///
/// All accessors check positions against the buffer length and fail with
/// [Error::IndexOutOfRange] rather than wrapping or truncating.
///
/// Equality compares the bits only, not the corrected-bit count.
#[derive(Clone, Default)]
pub struct BitBuffer {
    words: Vec<u64>,
    len: usize,
    corrected: u32,
}

impl BitBuffer {
    /// All-zero buffer of `len` bits.
    #[must_use]
    pub fn new(len: usize) -> Self {
        BitBuffer {
            words: vec![0; len.div_ceil(WORD_BITS)],
            len,
            corrected: 0,
        }
    }

    #[must_use]
    pub fn from_bits(bits: &[bool]) -> Self {
        let mut buf = BitBuffer::new(bits.len());
        for (i, bit) in bits.iter().enumerate() {
            if *bit {
                buf.words[i / WORD_BITS] |= mask(i);
            }
        }
        buf
    }

    /// Buffer holding every bit of `bytes`, MSB first.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut buf = BitBuffer::new(bytes.len() * 8);
        for (i, byte) in bytes.iter().enumerate() {
            let word = i / 8;
            let shift = 56 - (i % 8) * 8;
            buf.words[word] |= u64::from(*byte) << shift;
        }
        buf
    }

    /// Parse hex digits, 4 bits per digit. Whitespace is ignored.
    ///
    /// # Errors
    /// [Error::InvalidHex] if a character is not a hex digit.
    pub fn from_hex(hex: &str) -> Result<Self> {
        let digits: Vec<u32> = hex
            .chars()
            .filter(|c| !c.is_whitespace())
            .map(|c| c.to_digit(16).ok_or_else(|| Error::InvalidHex(hex.to_string())))
            .collect::<Result<_>>()?;
        let mut buf = BitBuffer::new(digits.len() * 4);
        for (i, digit) in digits.iter().enumerate() {
            buf.load(Field::bits(i * 4, 4), u64::from(*digit))?;
        }
        Ok(buf)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of bits flipped by error correction over the life of this buffer.
    #[must_use]
    pub fn corrected_bits(&self) -> u32 {
        self.corrected
    }

    /// Adds `count` to the corrected-bit counter. The counter never decreases.
    pub fn add_corrected(&mut self, count: u32) {
        self.corrected = self.corrected.saturating_add(count);
    }

    fn check(&self, pos: usize) -> Result<()> {
        if pos >= self.len {
            return Err(Error::IndexOutOfRange {
                index: pos,
                len: self.len,
            });
        }
        Ok(())
    }

    fn check_range(&self, start: usize, end: usize) -> Result<()> {
        if start > end || end > self.len {
            return Err(Error::IndexOutOfRange {
                index: start.max(end),
                len: self.len,
            });
        }
        Ok(())
    }

    /// Value of the bit at `pos`.
    ///
    /// # Errors
    /// [Error::IndexOutOfRange]
    pub fn get(&self, pos: usize) -> Result<bool> {
        self.check(pos)?;
        Ok(self.words[pos / WORD_BITS] & mask(pos) != 0)
    }

    /// # Errors
    /// [Error::IndexOutOfRange]
    pub fn set(&mut self, pos: usize) -> Result<()> {
        self.check(pos)?;
        self.words[pos / WORD_BITS] |= mask(pos);
        Ok(())
    }

    /// # Errors
    /// [Error::IndexOutOfRange]
    pub fn clear(&mut self, pos: usize) -> Result<()> {
        self.check(pos)?;
        self.words[pos / WORD_BITS] &= !mask(pos);
        Ok(())
    }

    /// # Errors
    /// [Error::IndexOutOfRange]
    pub fn put(&mut self, pos: usize, value: bool) -> Result<()> {
        if value {
            self.set(pos)
        } else {
            self.clear(pos)
        }
    }

    /// Flip the bit at `pos` as an error correction, counting it as a corrected bit.
    ///
    /// # Errors
    /// [Error::IndexOutOfRange]
    pub fn flip(&mut self, pos: usize) -> Result<()> {
        self.check(pos)?;
        self.words[pos / WORD_BITS] ^= mask(pos);
        self.add_corrected(1);
        Ok(())
    }

    /// Pack the bits at `positions` MSB first.
    ///
    /// # Errors
    /// [Error::FieldTooWide] for more than 64 positions, [Error::IndexOutOfRange] for any
    /// position outside the buffer.
    pub fn long_at(&self, positions: &[usize]) -> Result<u64> {
        if positions.len() > 64 {
            return Err(Error::FieldTooWide {
                width: positions.len(),
                max: 64,
            });
        }
        let mut value = 0u64;
        for pos in positions {
            value = (value << 1) | u64::from(self.get(*pos)?);
        }
        Ok(value)
    }

    /// Value of a field of at most 32 bits.
    ///
    /// # Errors
    /// [Error::FieldTooWide] or [Error::IndexOutOfRange]
    pub fn int(&self, field: Field) -> Result<u32> {
        if field.width() > 32 {
            return Err(Error::FieldTooWide {
                width: field.width(),
                max: 32,
            });
        }
        // Width was checked above so the packed value fits
        self.long(field).map(|v| v as u32)
    }

    /// Value of a field of at most 64 bits.
    ///
    /// # Errors
    /// [Error::FieldTooWide] or [Error::IndexOutOfRange]
    pub fn long(&self, field: Field) -> Result<u64> {
        if field.width() > 64 {
            return Err(Error::FieldTooWide {
                width: field.width(),
                max: 64,
            });
        }
        let mut value = 0u64;
        for pos in field.positions() {
            value = (value << 1) | u64::from(self.get(pos)?);
        }
        Ok(value)
    }

    /// Upper-case hex rendering of a field of any width, left padded with zero bits to a
    /// whole number of digits.
    ///
    /// # Errors
    /// [Error::IndexOutOfRange]
    pub fn hex(&self, field: Field) -> Result<String> {
        let width = field.width();
        let pad = (4 - width % 4) % 4;
        let mut out = String::with_capacity(width.div_ceil(4));
        let mut nibble = 0u32;
        let mut count = pad;
        for pos in field.positions() {
            nibble = (nibble << 1) | u32::from(self.get(pos)?);
            count += 1;
            if count == 4 {
                out.push(hex_digit(nibble));
                nibble = 0;
                count = 0;
            }
        }
        Ok(out)
    }

    /// Write the low `field.width()` bits of `value` into the field, MSB first.
    ///
    /// # Errors
    /// [Error::FieldTooWide] or [Error::IndexOutOfRange]
    pub fn load(&mut self, field: Field, value: u64) -> Result<()> {
        let width = field.width();
        if width > 64 {
            return Err(Error::FieldTooWide { width, max: 64 });
        }
        for (i, pos) in field.positions().enumerate() {
            self.put(pos, (value >> (width - 1 - i)) & 1 == 1)?;
        }
        Ok(())
    }

    /// XOR `mask` into this buffer starting at bit 0. The mask may be shorter than the
    /// buffer, in which case the remaining bits are untouched.
    ///
    /// # Errors
    /// [Error::MaskTooLong] if the mask is longer than this buffer.
    pub fn xor(&mut self, mask: &BitBuffer) -> Result<()> {
        if mask.len > self.len {
            return Err(Error::MaskTooLong {
                mask: mask.len,
                len: self.len,
            });
        }
        for (word, m) in self.words.iter_mut().zip(mask.words.iter()) {
            *word ^= m;
        }
        Ok(())
    }

    /// Independent copy of the bits in `[start, end)`. The copy starts with a zero
    /// corrected-bit count.
    ///
    /// # Errors
    /// [Error::IndexOutOfRange]
    pub fn sub_range(&self, start: usize, end: usize) -> Result<BitBuffer> {
        self.check_range(start, end)?;
        let mut out = BitBuffer::new(end - start);
        for (i, pos) in (start..end).enumerate() {
            if self.words[pos / WORD_BITS] & mask(pos) != 0 {
                out.words[i / WORD_BITS] |= mask(i);
            }
        }
        Ok(out)
    }

    /// Copy of the bits at `positions`, in that order.
    ///
    /// # Errors
    /// [Error::IndexOutOfRange]
    pub fn gather(&self, positions: &[usize]) -> Result<BitBuffer> {
        let mut out = BitBuffer::new(positions.len());
        for (i, pos) in positions.iter().enumerate() {
            if self.get(*pos)? {
                out.words[i / WORD_BITS] |= mask(i);
            }
        }
        Ok(out)
    }

    /// Overwrite the bits starting at `offset` with the contents of `other`.
    ///
    /// # Errors
    /// [Error::IndexOutOfRange] if `other` does not fit.
    pub fn copy_from(&mut self, offset: usize, other: &BitBuffer) -> Result<()> {
        self.check_range(offset, offset + other.len)?;
        for (i, bit) in other.iter().enumerate() {
            self.put(offset + i, bit)?;
        }
        Ok(())
    }

    /// Concatenation of `self` and `other`.
    #[must_use]
    pub fn concat(&self, other: &BitBuffer) -> BitBuffer {
        let bits: Vec<bool> = self.iter().chain(other.iter()).collect();
        BitBuffer::from_bits(&bits)
    }

    #[must_use]
    pub fn count_ones(&self) -> u32 {
        self.words.iter().map(|w| w.count_ones()).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        (0..self.len).map(move |i| self.words[i / WORD_BITS] & mask(i) != 0)
    }

    /// Packed bytes, MSB first. A trailing partial byte is zero padded.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        (0..self.len.div_ceil(8))
            .map(|i| {
                let word = self.words[i / 8];
                (word >> (56 - (i % 8) * 8)) as u8
            })
            .collect()
    }

    /// Hex rendering of the whole buffer.
    #[must_use]
    pub fn to_hex(&self) -> String {
        self.hex(Field::range(0, self.len))
            .unwrap_or_default()
    }
}

fn mask(pos: usize) -> u64 {
    1u64 << (WORD_BITS - 1 - pos % WORD_BITS)
}

fn hex_digit(nibble: u32) -> char {
    char::from_digit(nibble, 16)
        .unwrap_or('0')
        .to_ascii_uppercase()
}

impl PartialEq for BitBuffer {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len && self.words == other.words
    }
}

impl Eq for BitBuffer {}

impl fmt::Display for BitBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for bit in self.iter() {
            f.write_str(if bit { "1" } else { "0" })?;
        }
        Ok(())
    }
}

impl fmt::Debug for BitBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "BitBuffer(len={}, corrected={}, {})",
            self.len, self.corrected, self
        )
    }
}

impl FromStr for BitBuffer {
    type Err = Error;

    /// Parse a string of `0` and `1` characters. Whitespace and `_` separators are
    /// ignored.
    fn from_str(s: &str) -> Result<Self> {
        let bits: Vec<bool> = s
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '_')
            .map(|c| match c {
                '0' => Ok(false),
                '1' => Ok(true),
                other => Err(Error::InvalidBitCharacter(other)),
            })
            .collect::<Result<_>>()?;
        Ok(BitBuffer::from_bits(&bits))
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for BitBuffer {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display() {
        let buf: BitBuffer = "1011 0001_1".parse().unwrap();
        assert_eq!(buf.len(), 9);
        assert_eq!(buf.to_string(), "101100011");
    }

    #[test]
    fn parse_rejects_other_characters() {
        let zult = "10x1".parse::<BitBuffer>();
        assert!(matches!(zult, Err(Error::InvalidBitCharacter('x'))));
    }

    #[test]
    fn out_of_range_access_fails() {
        let mut buf = BitBuffer::new(10);
        assert!(matches!(
            buf.get(10),
            Err(Error::IndexOutOfRange { index: 10, len: 10 })
        ));
        assert!(buf.set(11).is_err());
        assert!(buf.flip(100).is_err());
        assert!(buf.int(Field::range(8, 12)).is_err());
        assert!(buf.sub_range(5, 11).is_err());
        assert_eq!(buf.corrected_bits(), 0);
    }

    #[test]
    fn int_contiguous_and_sparse() {
        let buf: BitBuffer = "0110100101".parse().unwrap();
        assert_eq!(buf.int(Field::range(0, 4)).unwrap(), 0b0110);
        assert_eq!(buf.int(Field::range(4, 10)).unwrap(), 0b100101);
        const SPARSE: Field = Field::sparse(&[9, 0, 1]);
        assert_eq!(buf.int(SPARSE).unwrap(), 0b101);
    }

    #[test]
    fn long_across_word_boundary() {
        let mut buf = BitBuffer::new(130);
        buf.load(Field::range(60, 124), 0xDEAD_BEEF_0123_4567).unwrap();
        assert_eq!(buf.long(Field::range(60, 124)).unwrap(), 0xDEAD_BEEF_0123_4567);
        assert_eq!(buf.int(Field::range(60, 92)).unwrap(), 0xDEAD_BEEF);
    }

    #[test]
    fn int_rejects_wide_fields() {
        let buf = BitBuffer::new(64);
        assert!(matches!(
            buf.int(Field::range(0, 33)),
            Err(Error::FieldTooWide { width: 33, max: 32 })
        ));
        assert!(buf.long(Field::range(0, 64)).is_ok());
    }

    #[test]
    fn hex_pads_partial_digits() {
        let buf: BitBuffer = "101011110".parse().unwrap();
        assert_eq!(buf.hex(Field::range(0, 8)).unwrap(), "AF");
        assert_eq!(buf.hex(Field::range(0, 9)).unwrap(), "15E");
        assert_eq!(BitBuffer::from_hex("c3 5a").unwrap().to_hex(), "C35A");
    }

    #[test]
    fn bytes_roundtrip() {
        let bytes = [0x12u8, 0x34, 0xAB, 0xCD, 0xEF, 0x01, 0x02, 0x03, 0x99];
        let buf = BitBuffer::from_bytes(&bytes);
        assert_eq!(buf.len(), 72);
        assert_eq!(buf.int(Field::range(0, 8)).unwrap(), 0x12);
        assert_eq!(buf.int(Field::range(64, 72)).unwrap(), 0x99);
        assert_eq!(buf.to_bytes(), bytes.to_vec());
    }

    #[test]
    fn hex_matches_byte_encoding() {
        let bytes = [0x0Cu8, 0xDF, 0x59, 0x00, 0xA5];
        let buf = BitBuffer::from_bytes(&bytes);
        assert_eq!(buf.to_hex(), hex::encode(bytes));
        assert_eq!(BitBuffer::from_hex(&hex::encode_upper(bytes)).unwrap(), buf);
    }

    #[test]
    fn flip_counts_corrections_but_mutators_do_not() {
        let mut buf = BitBuffer::new(16);
        buf.set(3).unwrap();
        buf.clear(3).unwrap();
        buf.put(4, true).unwrap();
        assert_eq!(buf.corrected_bits(), 0);

        buf.flip(4).unwrap();
        assert!(!buf.get(4).unwrap());
        buf.flip(5).unwrap();
        assert_eq!(buf.corrected_bits(), 2);
    }

    #[test]
    fn xor_with_shorter_mask_is_self_inverse() {
        let original: BitBuffer = "1100101011110000101".parse().unwrap();
        let mask: BitBuffer = "0110110".parse().unwrap();
        let mut buf = original.clone();
        buf.xor(&mask).unwrap();
        assert_eq!(buf.to_string(), "1010011011110000101");
        buf.xor(&mask).unwrap();
        assert_eq!(buf, original);
    }

    #[test]
    fn xor_rejects_long_mask() {
        let mut buf = BitBuffer::new(4);
        assert!(matches!(
            buf.xor(&BitBuffer::new(5)),
            Err(Error::MaskTooLong { mask: 5, len: 4 })
        ));
    }

    #[test]
    fn sub_range_is_independent_copy() {
        let mut buf: BitBuffer = "0001111000".parse().unwrap();
        buf.flip(0).unwrap();
        let mut sub = buf.sub_range(2, 8).unwrap();
        assert_eq!(sub.to_string(), "011110");
        assert_eq!(sub.corrected_bits(), 0);
        sub.clear(1).unwrap();
        assert!(buf.get(3).unwrap());
    }

    #[test]
    fn gather_copy_from_concat() {
        let buf: BitBuffer = "10110".parse().unwrap();
        assert_eq!(buf.gather(&[4, 0, 2]).unwrap().to_string(), "011");

        let mut target = BitBuffer::new(8);
        target.copy_from(3, &buf).unwrap();
        assert_eq!(target.to_string(), "00010110");
        assert!(target.copy_from(4, &buf).is_err());

        assert_eq!(buf.concat(&buf).to_string(), "1011010110");
    }

    #[test]
    fn equality_ignores_corrected_count() {
        let a: BitBuffer = "1010".parse().unwrap();
        let mut b: BitBuffer = "1011".parse().unwrap();
        b.flip(3).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.count_ones(), 2);
    }
}
