//! Common announcement channel: the 24 bits preceding every outbound burst.
use std::sync::LazyLock;

use tracing::trace;

use crate::bits::{BitBuffer, Field};
use crate::fec::{Integrity, Residual, SyndromeCorrector, SyndromeTable};
use crate::{Error, Result};

pub const CACH_BITS: usize = 24;

/// TACT bits in transmission order: AT, TC, LCSS1, LCSS0 then three Hamming parity bits.
pub const TACT: Field = Field::sparse(&[0, 4, 8, 12, 14, 18, 22]);
/// Short link control payload, the bits not used by the TACT.
pub const CACH_PAYLOAD: Field = Field::sparse(&[
    1, 2, 3, 5, 6, 7, 9, 10, 11, 13, 15, 16, 17, 19, 20, 21, 23,
]);

static TACT_HAMMING: LazyLock<SyndromeCorrector> = LazyLock::new(|| {
    SyndromeCorrector::new(
        SyndromeTable::from_signatures(&[5, 7, 6, 3], 3, 0),
        Residual::Null,
    )
});

/// Decoded CACH.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Cach {
    /// Access type: the inbound channel of the next slot is busy.
    pub busy: bool,
    /// Timeslot channel, 0 or 1.
    pub timeslot: u8,
    /// Link control start/stop of the short LC fragment in the payload.
    pub lcss: u8,
    pub integrity: Integrity,
    pub payload: BitBuffer,
}

impl Cach {
    /// Decode 24 CACH bits, correcting a single TACT bit error.
    ///
    /// # Errors
    /// [Error::InvalidLength] if `bits` is not 24 bits long.
    pub fn decode(bits: &BitBuffer) -> Result<Cach> {
        if bits.len() != CACH_BITS {
            return Err(Error::InvalidLength {
                expected: CACH_BITS,
                actual: bits.len(),
            });
        }
        let mut bits = bits.clone();
        let integrity = TACT_HAMMING.correct_field(&mut bits, TACT)?;
        let tact = bits.int(TACT)?;
        trace!(tact, ?integrity, "cach");
        Ok(Cach {
            busy: tact >> 6 & 1 == 1,
            timeslot: (tact >> 5 & 1) as u8,
            lcss: (tact >> 3 & 0b11) as u8,
            integrity,
            payload: bits.gather(&CACH_PAYLOAD.to_vec())?,
        })
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.integrity.is_valid()
    }

    /// Build the 24 CACH bits for the given TACT values and 17 bit payload.
    ///
    /// # Errors
    /// [Error::InvalidLength] if `payload` is not 17 bits.
    pub fn encode(busy: bool, timeslot: u8, lcss: u8, payload: &BitBuffer) -> Result<BitBuffer> {
        if payload.len() != CACH_PAYLOAD.width() {
            return Err(Error::InvalidLength {
                expected: CACH_PAYLOAD.width(),
                actual: payload.len(),
            });
        }
        let mut bits = BitBuffer::new(CACH_BITS);
        let data = u64::from(busy) << 3 | u64::from(timeslot & 1) << 2 | u64::from(lcss & 0b11);
        let tact = TACT.to_vec();
        bits.load(Field::sparse(&[0, 4, 8, 12]), data)?;
        TACT_HAMMING.encode_at(&mut bits, &tact)?;
        for (pos, bit) in CACH_PAYLOAD.positions().zip(payload.iter()) {
            bits.put(pos, bit)?;
        }
        Ok(bits)
    }
}
