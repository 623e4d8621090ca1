//! P25 phase 1 control and header decoding.
//!
//! Only the layers above the trellis and frame sync are handled here: callers hand over
//! 96 bit trellis decoded TSBKs or the 648 bit body of a header data unit.
mod hdu;
mod tsbk;

pub use hdu::*;
pub use tsbk::*;

use tracing::{span, Level};

use crate::bits::BitBuffer;
use crate::message::{Decoded, Identifier};
use crate::Result;

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum P25Message {
    Tsbk(TsbkMessage),
    Header(HeaderDataUnit),
}

impl P25Message {
    #[must_use]
    pub fn identifiers(&self) -> Vec<Identifier> {
        match self {
            P25Message::Tsbk(msg) => msg.tsbk.identifiers(),
            P25Message::Header(hdu) => hdu.identifiers(),
        }
    }
}

/// Which P25 data unit a frame carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum DataUnit {
    Tsbk,
    Header,
}

/// Decode one data unit.
///
/// # Errors
/// [crate::Error::InvalidLength] if `bits` has the wrong size for `unit`.
pub fn decode(unit: DataUnit, bits: &BitBuffer) -> Result<Decoded> {
    let span = span!(Level::TRACE, "p25", ?unit);
    let _guard = span.enter();
    Ok(match unit {
        DataUnit::Tsbk => {
            let (msg, integrity, corrected) = TsbkMessage::decode(bits)?;
            Decoded::new(P25Message::Tsbk(msg), integrity, corrected)
        }
        DataUnit::Header => {
            let (hdu, integrity, corrected) = HeaderDataUnit::decode(bits)?;
            Decoded::new(P25Message::Header(hdu), integrity, corrected)
        }
    })
}
