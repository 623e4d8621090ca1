//! Full link control carried in voice LC header and terminator bursts.
use std::sync::LazyLock;

use tracing::debug;

use crate::bits::{BitBuffer, Field};
use crate::fec::{Integrity, Residual, SyndromeCorrector, SyndromeTable, RS_12_9_4};
use crate::message::{Identifier, Role};
use crate::{Error, Result};

pub const LC_BITS: usize = 72;
const LC_PARITY_BITS: usize = 24;
pub const VOICE_HEADER_MASK: u64 = 0x96_9696;
pub const TERMINATOR_MASK: u64 = 0x99_9999;

const FLCO: Field = Field::range(2, 8);
const FID: Field = Field::range(8, 16);
const SERVICE_OPTIONS: Field = Field::range(16, 24);
const TARGET: Field = Field::range(24, 48);
const SOURCE: Field = Field::range(48, 72);
const ALIAS_DATA: (usize, usize) = (16, 72);

pub const FID_STANDARD: u8 = 0x00;
pub const FID_MOTOROLA: u8 = 0x10;

pub const ALIAS_FRAGMENTS: usize = 4;

/// RS(12,9) parity of the 9 LC bytes, packed as transmitted.
fn rs_parity(lc: &BitBuffer) -> u64 {
    // Data symbols are stored highest degree first on air
    let mut data = lc.to_bytes();
    data.reverse();
    match RS_12_9_4.encode(&data) {
        Ok(cw) => u64::from(cw[2]) << 16 | u64::from(cw[1]) << 8 | u64::from(cw[0]),
        Err(_) => 0,
    }
}

fn lc_corrector(mask: u64) -> SyndromeCorrector {
    SyndromeCorrector::new(
        SyndromeTable::from_linear(LC_BITS, LC_PARITY_BITS, mask, rs_parity),
        Residual::Null,
    )
}

static HEADER_LC: LazyLock<SyndromeCorrector> = LazyLock::new(|| lc_corrector(VOICE_HEADER_MASK));
static TERMINATOR_LC: LazyLock<SyndromeCorrector> = LazyLock::new(|| lc_corrector(TERMINATOR_MASK));

/// Which burst an LC arrived in; selects the parity mask.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum LcBurst {
    VoiceHeader,
    Terminator,
}

impl LcBurst {
    fn corrector(self) -> &'static SyndromeCorrector {
        match self {
            LcBurst::VoiceHeader => &HEADER_LC,
            LcBurst::Terminator => &TERMINATOR_LC,
        }
    }
}

/// Check and correct the 96 BPTC data bits of an LC burst, returning the 72 LC bits.
///
/// # Errors
/// [Error::InvalidLength] if `bits` is not 96 bits long.
pub fn check(bits: &BitBuffer, burst: LcBurst) -> Result<(BitBuffer, Integrity)> {
    if bits.len() != LC_BITS + LC_PARITY_BITS {
        return Err(Error::InvalidLength {
            expected: LC_BITS + LC_PARITY_BITS,
            actual: bits.len(),
        });
    }
    let mut bits = bits.clone();
    let integrity = burst
        .corrector()
        .correct_field(&mut bits, Field::range(0, LC_BITS + LC_PARITY_BITS))?;
    let mut lc = bits.sub_range(0, LC_BITS)?;
    lc.add_corrected(bits.corrected_bits());
    Ok((lc, integrity))
}

/// Append the masked RS parity to 72 LC bits.
///
/// # Errors
/// [Error::InvalidLength] if `lc` is not 72 bits long.
pub fn encode(lc: &BitBuffer, burst: LcBurst) -> Result<BitBuffer> {
    if lc.len() != LC_BITS {
        return Err(Error::InvalidLength {
            expected: LC_BITS,
            actual: lc.len(),
        });
    }
    let mut bits = lc.concat(&BitBuffer::new(LC_PARITY_BITS));
    burst
        .corrector()
        .encode(&mut bits, Field::range(0, LC_BITS + LC_PARITY_BITS))?;
    Ok(bits)
}

/// Talker alias text encodings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum AliasFormat {
    SevenBit,
    Iso8,
    Utf8,
    Utf16,
}

impl AliasFormat {
    fn from_code(code: u32) -> Self {
        match code {
            0 => AliasFormat::SevenBit,
            1 => AliasFormat::Iso8,
            2 => AliasFormat::Utf8,
            _ => AliasFormat::Utf16,
        }
    }
}

/// Full link control opcodes by `(FID, FLCO)`.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[non_exhaustive]
pub enum FullLinkControl {
    GroupVoice {
        service_options: u8,
        group: u32,
        source: u32,
    },
    UnitToUnitVoice {
        service_options: u8,
        target: u32,
        source: u32,
    },
    TalkerAliasHeader {
        format: AliasFormat,
        length: u8,
    },
    /// Talker alias continuation block 1 to 3.
    TalkerAliasBlock { block: u8 },
    /// Motorola Capacity Plus wide area voice channel user.
    CapacityPlusVoice {
        service_options: u8,
        group: u32,
        source: u32,
    },
    Unknown { fid: u8, flco: u8, bits: BitBuffer },
}

impl FullLinkControl {
    /// Dispatch on `(FID, FLCO)`. Never fails for a 72 bit LC; unrecognized opcodes
    /// become [FullLinkControl::Unknown].
    ///
    /// # Errors
    /// [Error::IndexOutOfRange] if `lc` is shorter than 72 bits.
    pub fn parse(lc: &BitBuffer) -> Result<Self> {
        let flco = lc.int(FLCO)? as u8;
        let fid = lc.int(FID)? as u8;
        let service_options = lc.int(SERVICE_OPTIONS)? as u8;
        Ok(match (fid, flco) {
            (FID_STANDARD, 0x00) => FullLinkControl::GroupVoice {
                service_options,
                group: lc.int(TARGET)?,
                source: lc.int(SOURCE)?,
            },
            (FID_STANDARD, 0x03) => FullLinkControl::UnitToUnitVoice {
                service_options,
                target: lc.int(TARGET)?,
                source: lc.int(SOURCE)?,
            },
            (FID_STANDARD, 0x04) => FullLinkControl::TalkerAliasHeader {
                format: AliasFormat::from_code(lc.int(Field::range(16, 18))?),
                length: lc.int(Field::range(18, 23))? as u8,
            },
            (FID_STANDARD, 0x05..=0x07) => FullLinkControl::TalkerAliasBlock { block: flco - 4 },
            (FID_MOTOROLA, 0x04) => FullLinkControl::CapacityPlusVoice {
                service_options,
                group: lc.int(TARGET)?,
                source: lc.int(SOURCE)?,
            },
            _ => {
                debug!(fid, flco, "unknown link control");
                FullLinkControl::Unknown {
                    fid,
                    flco,
                    bits: lc.clone(),
                }
            }
        })
    }

    /// Assembler fragment number for talker alias opcodes.
    #[must_use]
    pub fn alias_fragment(&self) -> Option<usize> {
        match self {
            FullLinkControl::TalkerAliasHeader { .. } => Some(1),
            FullLinkControl::TalkerAliasBlock { block } => Some(usize::from(*block) + 1),
            _ => None,
        }
    }

    #[must_use]
    pub fn identifiers(&self) -> Vec<Identifier> {
        match self {
            FullLinkControl::GroupVoice { group, source, .. }
            | FullLinkControl::CapacityPlusVoice { group, source, .. } => vec![
                Identifier::talkgroup(*group, Role::To),
                Identifier::radio(*source, Role::From),
            ],
            FullLinkControl::UnitToUnitVoice { target, source, .. } => vec![
                Identifier::radio(*target, Role::To),
                Identifier::radio(*source, Role::From),
            ],
            _ => Vec::new(),
        }
    }
}

/// Bits of an LC that belong in the alias fragment: the header's format and length
/// followed by its data, or a block's data.
///
/// # Errors
/// [Error::IndexOutOfRange] if `lc` is shorter than 72 bits.
pub fn alias_fragment_bits(lc: &BitBuffer) -> Result<BitBuffer> {
    lc.sub_range(ALIAS_DATA.0, ALIAS_DATA.1)
}

/// Decode the text of a complete alias: the four fragments joined.
///
/// # Errors
/// [Error::IndexOutOfRange] only if `bits` is shorter than the 7 header bits.
pub fn decode_alias(bits: &BitBuffer) -> Result<String> {
    let format = AliasFormat::from_code(bits.int(Field::range(0, 2))?);
    let length = bits.int(Field::range(2, 7))? as usize;
    let start = if format == AliasFormat::SevenBit { 7 } else { 8 };
    let available = bits.len().saturating_sub(start);

    let bytes = |width: usize| -> Result<Vec<u32>> {
        (0..available / width)
            .map(|i| bits.int(Field::bits(start + i * width, width)))
            .collect()
    };

    let text: String = match format {
        AliasFormat::SevenBit => bytes(7)?
            .into_iter()
            .take(length)
            .filter_map(char::from_u32)
            .collect(),
        AliasFormat::Iso8 => bytes(8)?
            .into_iter()
            .take(length)
            .filter_map(char::from_u32)
            .collect(),
        AliasFormat::Utf8 => {
            let raw: Vec<u8> = bytes(8)?.into_iter().map(|b| b as u8).collect();
            String::from_utf8_lossy(&raw).chars().take(length).collect()
        }
        AliasFormat::Utf16 => {
            let units: Vec<u16> = bytes(16)?.into_iter().map(|u| u as u16).collect();
            char::decode_utf16(units)
                .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
                .take(length)
                .collect()
        }
    };
    Ok(text.trim_end_matches('\0').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn group_voice(group: u32, source: u32) -> BitBuffer {
        let mut lc = BitBuffer::new(LC_BITS);
        lc.load(TARGET, u64::from(group)).unwrap();
        lc.load(SOURCE, u64::from(source)).unwrap();
        lc
    }

    #[test]
    fn parity_matches_reed_solomon_decoder() {
        let lc = group_voice(1234, 5678);
        let mut data = lc.to_bytes();
        data.reverse();
        let mut cw = RS_12_9_4.encode(&data).unwrap();
        let outcome = RS_12_9_4.decode(&mut cw).unwrap();
        assert!(!outcome.irrecoverable);
        assert_eq!(outcome.corrected, 0);
        let parity = rs_parity(&lc) ^ VOICE_HEADER_MASK;
        let coded = encode(&lc, LcBurst::VoiceHeader).unwrap();
        assert_eq!(coded.long(Field::range(72, 96)).unwrap(), parity);
    }

    #[test_case(LcBurst::VoiceHeader)]
    #[test_case(LcBurst::Terminator)]
    fn single_errors_are_corrected(burst: LcBurst) {
        let lc = group_voice(9, 3_100_001);
        let coded = encode(&lc, burst).unwrap();
        for pos in [0, 30, 71, 72, 95] {
            let mut noisy = coded.clone();
            noisy.flip(pos).unwrap();
            let (fixed, integrity) = check(&noisy, burst).unwrap();
            assert_eq!(integrity, Integrity::Corrected);
            assert_eq!(fixed, lc);
            assert_eq!(fixed.corrected_bits(), 1);
        }
    }

    #[test]
    fn wrong_mask_fails() {
        let coded = encode(&group_voice(1, 2), LcBurst::VoiceHeader).unwrap();
        let (_, integrity) = check(&coded, LcBurst::Terminator).unwrap();
        assert_eq!(integrity, Integrity::Failed);
    }

    #[test_case(0x00, 0x00 ; "group voice")]
    #[test_case(0x00, 0x03 ; "unit to unit")]
    #[test_case(0x10, 0x04 ; "capacity plus")]
    fn voice_users_have_identifiers(fid: u64, flco: u64) {
        let mut lc = group_voice(77, 88);
        lc.load(FLCO, flco).unwrap();
        lc.load(FID, fid).unwrap();
        let parsed = FullLinkControl::parse(&lc).unwrap();
        assert_eq!(parsed.identifiers().len(), 2);
        assert!(parsed.identifiers().contains(&Identifier::radio(88, Role::From)));
    }

    #[test]
    fn unknown_opcodes_are_kept() {
        let mut lc = BitBuffer::new(LC_BITS);
        lc.load(FLCO, 0x30).unwrap();
        lc.load(FID, 0x68).unwrap();
        assert!(matches!(
            FullLinkControl::parse(&lc).unwrap(),
            FullLinkControl::Unknown { fid: 0x68, flco: 0x30, .. }
        ));
    }

    #[test]
    fn seven_bit_alias() {
        let text = "ENGINE 7";
        let mut bits = BitBuffer::new(224);
        bits.load(Field::range(2, 7), text.len() as u64).unwrap();
        for (i, c) in text.bytes().enumerate() {
            bits.load(Field::bits(7 + i * 7, 7), u64::from(c)).unwrap();
        }
        assert_eq!(decode_alias(&bits).unwrap(), text);
    }

    #[test]
    fn utf16_alias() {
        let text = "Zürich";
        let mut bits = BitBuffer::new(224);
        bits.load(Field::range(0, 2), 3).unwrap();
        bits.load(Field::range(2, 7), 6).unwrap();
        for (i, u) in text.encode_utf16().enumerate() {
            bits.load(Field::bits(8 + i * 16, 16), u64::from(u)).unwrap();
        }
        assert_eq!(decode_alias(&bits).unwrap(), text);
    }
}
