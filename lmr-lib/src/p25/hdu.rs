//! Header data unit: encryption parameters and talkgroup of a voice call.
//!
//! The 120 header bits travel as 20 hex symbols protected by a shortened RS(36,20,17),
//! and each of the 36 code symbols is in turn a Golay(18,6,8) word.
use tracing::{debug, trace};

use crate::bits::{BitBuffer, Field};
use crate::fec::{Integrity, GOLAY_18_6, RS_63_47_17};
use crate::message::{Identifier, Role};
use crate::{Error, Result};

pub const HDU_BITS: usize = 648;
const SYMBOLS: usize = 36;
const DATA_SYMBOLS: usize = 20;
const SYMBOL_BITS: usize = 6;
const WORD_BITS: usize = 18;

const MESSAGE_INDICATOR: Field = Field::range(0, 72);
const MFID: Field = Field::range(72, 80);
const ALGORITHM: Field = Field::range(80, 88);
const KEY: Field = Field::range(88, 104);
const TALKGROUP: Field = Field::range(104, 120);

/// Algorithm identifier for clear voice.
pub const ALGORITHM_UNENCRYPTED: u8 = 0x80;

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct HeaderDataUnit {
    /// Message indicator, 72 bits as hex.
    pub message_indicator: String,
    pub mfid: u8,
    pub algorithm: u8,
    pub key: u16,
    pub talkgroup: u32,
}

/// Codeword index of the `j`th transmitted symbol.
fn codeword_index(j: usize) -> usize {
    SYMBOLS - 1 - j
}

impl HeaderDataUnit {
    #[must_use]
    pub fn is_encrypted(&self) -> bool {
        self.algorithm != ALGORITHM_UNENCRYPTED
    }

    /// Correct and parse 648 header bits.
    ///
    /// Returns the header, its integrity and the number of corrected bits.
    ///
    /// # Errors
    /// [Error::InvalidLength] if `bits` is not 648 bits.
    pub fn decode(bits: &BitBuffer) -> Result<(HeaderDataUnit, Integrity, u32)> {
        if bits.len() != HDU_BITS {
            return Err(Error::InvalidLength {
                expected: HDU_BITS,
                actual: bits.len(),
            });
        }
        let mut words = bits.clone();
        let offsets: Vec<usize> = (0..SYMBOLS).map(|j| j * WORD_BITS).collect();
        let golay = GOLAY_18_6.correct_words(&mut words, &offsets)?;

        let mut codeword = vec![0u8; RS_63_47_17.n()];
        for (j, offset) in offsets.iter().enumerate() {
            codeword[codeword_index(j)] = words.int(Field::bits(*offset, SYMBOL_BITS))? as u8;
        }
        let received = codeword.clone();
        let outcome = RS_63_47_17.decode(&mut codeword)?;
        // corrections in the zero padding mean the shortened word was not recoverable
        let padded = codeword[SYMBOLS..].iter().any(|s| *s != 0);
        let irrecoverable = outcome.irrecoverable || padded;
        if irrecoverable {
            debug!(?golay, "header data unit beyond correction");
        }
        let symbols = if irrecoverable { &received } else { &codeword };

        let mut header = BitBuffer::new(DATA_SYMBOLS * SYMBOL_BITS);
        let mut symbol_bits = 0u32;
        for j in 0..DATA_SYMBOLS {
            let index = codeword_index(j);
            symbol_bits += (symbols[index] ^ received[index]).count_ones();
            header.load(Field::bits(j * SYMBOL_BITS, SYMBOL_BITS), u64::from(symbols[index]))?;
        }
        let corrected = words.corrected_bits() + symbol_bits;
        trace!(corrected, rs = outcome.corrected, "header data unit");

        let integrity = if irrecoverable {
            Integrity::Failed
        } else if corrected > 0 || outcome.corrected > 0 {
            Integrity::Corrected
        } else {
            Integrity::Passed
        };
        let hdu = HeaderDataUnit {
            message_indicator: header.hex(MESSAGE_INDICATOR)?,
            mfid: header.int(MFID)? as u8,
            algorithm: header.int(ALGORITHM)? as u8,
            key: header.int(KEY)? as u16,
            talkgroup: header.int(TALKGROUP)?,
        };
        Ok((hdu, integrity, corrected))
    }

    /// Encode 120 header bits into the 648 transmitted bits.
    ///
    /// # Errors
    /// [Error::InvalidLength] if `header` is not 120 bits.
    pub fn encode(header: &BitBuffer) -> Result<BitBuffer> {
        if header.len() != DATA_SYMBOLS * SYMBOL_BITS {
            return Err(Error::InvalidLength {
                expected: DATA_SYMBOLS * SYMBOL_BITS,
                actual: header.len(),
            });
        }
        let parity = SYMBOLS - DATA_SYMBOLS;
        let mut data = vec![0u8; RS_63_47_17.k()];
        for j in 0..DATA_SYMBOLS {
            data[codeword_index(j) - parity] =
                header.int(Field::bits(j * SYMBOL_BITS, SYMBOL_BITS))? as u8;
        }
        let codeword = RS_63_47_17.encode(&data)?;
        let mut out = BitBuffer::new(HDU_BITS);
        for j in 0..SYMBOLS {
            let word = GOLAY_18_6.encode(u32::from(codeword[codeword_index(j)]));
            out.load(Field::bits(j * WORD_BITS, WORD_BITS), u64::from(word))?;
        }
        Ok(out)
    }

    #[must_use]
    pub fn identifiers(&self) -> Vec<Identifier> {
        vec![Identifier::talkgroup(self.talkgroup, Role::To)]
    }
}
