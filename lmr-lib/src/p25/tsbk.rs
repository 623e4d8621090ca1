//! Trunking signalling blocks of the P25 control channel.
use std::collections::HashMap;
use std::sync::LazyLock;

use tracing::{debug, trace};

use crate::bits::{BitBuffer, Field};
use crate::fec::{Integrity, Residual, SyndromeCorrector, SyndromeTable, CCITT};
use crate::message::{Channel, Identifier, Role};
use crate::{Error, Result};

pub const TSBK_BITS: usize = 96;
const DATA_BITS: usize = 80;

const LAST_BLOCK: usize = 0;
const ENCRYPTED: usize = 1;
const OPCODE: Field = Field::range(2, 8);
const MFID: Field = Field::range(8, 16);

pub const MFID_STANDARD: u8 = 0x00;
pub const MFID_MOTOROLA: u8 = 0x90;

static TSBK_CRC: LazyLock<SyndromeCorrector> = LazyLock::new(|| {
    SyndromeCorrector::new(
        SyndromeTable::from_crc(&CCITT, DATA_BITS),
        Residual::NullOrInverted,
    )
});

/// Channel reference: 4 bit band identifier and 12 bit channel number.
fn channel(bits: &BitBuffer, start: usize) -> Result<Channel> {
    Ok(Channel::new(
        bits.int(Field::bits(start, 4))? as u8,
        bits.int(Field::bits(start + 4, 12))? as u16,
    ))
}

/// Opcodes of the control channel, by `(MFID, opcode)`.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[non_exhaustive]
pub enum Tsbk {
    GroupVoiceGrant {
        service_options: u8,
        channel: Channel,
        group: u32,
        source: u32,
    },
    GroupVoiceGrantUpdate {
        channel_a: Channel,
        group_a: u32,
        channel_b: Channel,
        group_b: u32,
    },
    UnitToUnitVoiceGrant {
        channel: Channel,
        target: u32,
        source: u32,
    },
    RfssStatus {
        location_area: u8,
        active: bool,
        system: u16,
        rfss: u8,
        site: u8,
        channel: Channel,
        service_class: u8,
    },
    NetworkStatus {
        location_area: u8,
        wacn: u32,
        system: u16,
        channel: Channel,
        service_class: u8,
    },
    /// Motorola patch of up to three groups into a super group.
    PatchGroupAdd { patch_group: u32, groups: Vec<u32> },
    Unknown {
        mfid: u8,
        opcode: u8,
        bits: BitBuffer,
    },
}

type Parser = fn(&BitBuffer) -> Result<Tsbk>;

fn group_voice_grant(bits: &BitBuffer) -> Result<Tsbk> {
    Ok(Tsbk::GroupVoiceGrant {
        service_options: bits.int(Field::range(16, 24))? as u8,
        channel: channel(bits, 24)?,
        group: bits.int(Field::range(40, 56))?,
        source: bits.int(Field::range(56, 80))?,
    })
}

fn group_voice_grant_update(bits: &BitBuffer) -> Result<Tsbk> {
    Ok(Tsbk::GroupVoiceGrantUpdate {
        channel_a: channel(bits, 16)?,
        group_a: bits.int(Field::range(32, 48))?,
        channel_b: channel(bits, 48)?,
        group_b: bits.int(Field::range(64, 80))?,
    })
}

fn unit_to_unit_voice_grant(bits: &BitBuffer) -> Result<Tsbk> {
    Ok(Tsbk::UnitToUnitVoiceGrant {
        channel: channel(bits, 16)?,
        target: bits.int(Field::range(32, 56))?,
        source: bits.int(Field::range(56, 80))?,
    })
}

fn rfss_status(bits: &BitBuffer) -> Result<Tsbk> {
    Ok(Tsbk::RfssStatus {
        location_area: bits.int(Field::range(16, 24))? as u8,
        active: bits.get(27)?,
        system: bits.int(Field::range(28, 40))? as u16,
        rfss: bits.int(Field::range(40, 48))? as u8,
        site: bits.int(Field::range(48, 56))? as u8,
        channel: channel(bits, 56)?,
        service_class: bits.int(Field::range(72, 80))? as u8,
    })
}

fn network_status(bits: &BitBuffer) -> Result<Tsbk> {
    Ok(Tsbk::NetworkStatus {
        location_area: bits.int(Field::range(16, 24))? as u8,
        wacn: bits.int(Field::range(24, 44))?,
        system: bits.int(Field::range(44, 56))? as u16,
        channel: channel(bits, 56)?,
        service_class: bits.int(Field::range(72, 80))? as u8,
    })
}

fn patch_group_add(bits: &BitBuffer) -> Result<Tsbk> {
    let mut groups = Vec::with_capacity(3);
    for start in [32, 48, 64] {
        let group = bits.int(Field::bits(start, 16))?;
        // unused slots repeat the patch group or are zero
        if group != 0 && !groups.contains(&group) {
            groups.push(group);
        }
    }
    Ok(Tsbk::PatchGroupAdd {
        patch_group: bits.int(Field::range(16, 32))?,
        groups,
    })
}

static PARSERS: LazyLock<HashMap<(u8, u8), Parser>> = LazyLock::new(|| {
    let table: [((u8, u8), Parser); 6] = [
        ((MFID_STANDARD, 0x00), group_voice_grant),
        ((MFID_STANDARD, 0x02), group_voice_grant_update),
        ((MFID_STANDARD, 0x04), unit_to_unit_voice_grant),
        ((MFID_STANDARD, 0x3A), rfss_status),
        ((MFID_STANDARD, 0x3B), network_status),
        ((MFID_MOTOROLA, 0x00), patch_group_add),
    ];
    table.into_iter().collect()
});

impl Tsbk {
    /// Dispatch on `(MFID, opcode)`. Unrecognized pairs become [Tsbk::Unknown].
    ///
    /// # Errors
    /// [Error::IndexOutOfRange] if `bits` is shorter than 80 bits.
    pub fn parse(bits: &BitBuffer) -> Result<Tsbk> {
        let opcode = bits.int(OPCODE)? as u8;
        let mfid = bits.int(MFID)? as u8;
        match PARSERS.get(&(mfid, opcode)) {
            Some(parser) => parser(bits),
            None => {
                debug!(mfid, opcode, "unknown tsbk");
                Ok(Tsbk::Unknown {
                    mfid,
                    opcode,
                    bits: bits.sub_range(0, DATA_BITS)?,
                })
            }
        }
    }

    #[must_use]
    pub fn identifiers(&self) -> Vec<Identifier> {
        match self {
            Tsbk::GroupVoiceGrant {
                channel,
                group,
                source,
                ..
            } => vec![
                Identifier::Channel(*channel),
                Identifier::talkgroup(*group, Role::To),
                Identifier::radio(*source, Role::From),
            ],
            Tsbk::GroupVoiceGrantUpdate {
                channel_a,
                group_a,
                channel_b,
                group_b,
            } => vec![
                Identifier::Channel(*channel_a),
                Identifier::talkgroup(*group_a, Role::To),
                Identifier::Channel(*channel_b),
                Identifier::talkgroup(*group_b, Role::To),
            ],
            Tsbk::UnitToUnitVoiceGrant {
                channel,
                target,
                source,
            } => vec![
                Identifier::Channel(*channel),
                Identifier::radio(*target, Role::To),
                Identifier::radio(*source, Role::From),
            ],
            Tsbk::RfssStatus {
                location_area,
                channel,
                ..
            } => vec![
                Identifier::Location(u32::from(*location_area)),
                Identifier::Channel(*channel),
            ],
            Tsbk::NetworkStatus {
                wacn,
                system,
                channel,
                ..
            } => vec![
                Identifier::System {
                    wacn: *wacn,
                    system: *system,
                },
                Identifier::Channel(*channel),
            ],
            Tsbk::PatchGroupAdd {
                patch_group,
                groups,
            } => std::iter::once(Identifier::talkgroup(*patch_group, Role::Any))
                .chain(groups.iter().map(|g| Identifier::talkgroup(*g, Role::Any)))
                .collect(),
            Tsbk::Unknown { .. } => Vec::new(),
        }
    }
}

/// One checked trunking signalling block.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct TsbkMessage {
    pub last_block: bool,
    pub encrypted: bool,
    pub tsbk: Tsbk,
}

impl TsbkMessage {
    /// Check the CRC, correcting a single bit error, and parse the block.
    ///
    /// Returns the message, its integrity and the number of corrected bits.
    ///
    /// # Errors
    /// [Error::InvalidLength] if `bits` is not 96 bits.
    pub fn decode(bits: &BitBuffer) -> Result<(TsbkMessage, Integrity, u32)> {
        if bits.len() != TSBK_BITS {
            return Err(Error::InvalidLength {
                expected: TSBK_BITS,
                actual: bits.len(),
            });
        }
        let mut bits = bits.clone();
        let integrity = TSBK_CRC.correct_field(&mut bits, Field::range(0, TSBK_BITS))?;
        trace!(?integrity, "tsbk crc");
        let message = TsbkMessage {
            last_block: bits.get(LAST_BLOCK)?,
            encrypted: bits.get(ENCRYPTED)?,
            tsbk: Tsbk::parse(&bits)?,
        };
        Ok((message, integrity, bits.corrected_bits()))
    }

    /// Append the CRC to 80 data bits.
    ///
    /// # Errors
    /// [Error::InvalidLength] if `data` is not 80 bits.
    pub fn encode(data: &BitBuffer) -> Result<BitBuffer> {
        if data.len() != DATA_BITS {
            return Err(Error::InvalidLength {
                expected: DATA_BITS,
                actual: data.len(),
            });
        }
        let mut bits = data.concat(&BitBuffer::new(TSBK_BITS - DATA_BITS));
        TSBK_CRC.encode(&mut bits, Field::range(0, TSBK_BITS))?;
        Ok(bits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn block(mfid: u8, opcode: u8) -> BitBuffer {
        let mut bits = BitBuffer::new(DATA_BITS);
        bits.set(LAST_BLOCK).unwrap();
        bits.load(OPCODE, u64::from(opcode)).unwrap();
        bits.load(MFID, u64::from(mfid)).unwrap();
        bits
    }

    #[test]
    fn group_voice_grant_with_bit_error() {
        let mut data = block(MFID_STANDARD, 0x00);
        data.load(Field::range(24, 28), 1).unwrap();
        data.load(Field::range(28, 40), 0x123).unwrap();
        data.load(Field::range(40, 56), 4501).unwrap();
        data.load(Field::range(56, 80), 1_234_567).unwrap();
        let mut coded = TsbkMessage::encode(&data).unwrap();
        coded.flip(45).unwrap();

        let (msg, integrity, corrected) = TsbkMessage::decode(&coded).unwrap();
        assert_eq!(integrity, Integrity::Corrected);
        assert_eq!(corrected, 1);
        assert!(msg.last_block);
        assert_eq!(
            msg.tsbk,
            Tsbk::GroupVoiceGrant {
                service_options: 0,
                channel: Channel::new(1, 0x123),
                group: 4501,
                source: 1_234_567,
            }
        );
    }

    #[test]
    fn both_checksum_conventions_pass() {
        let data = block(MFID_STANDARD, 0x3B);
        let inverted = TsbkMessage::encode(&data).unwrap();
        let mut plain = inverted.clone();
        for pos in DATA_BITS..TSBK_BITS {
            plain.flip(pos).unwrap();
        }
        for bits in [inverted, plain] {
            let (_, integrity, _) = TsbkMessage::decode(&bits).unwrap();
            assert_eq!(integrity, Integrity::Passed);
        }
    }

    #[test]
    fn single_bit_errors_corrected_in_either_convention() {
        let data = block(MFID_STANDARD, 0x3B);
        let inverted = TsbkMessage::encode(&data).unwrap();
        let mut plain = inverted.clone();
        for pos in DATA_BITS..TSBK_BITS {
            plain.flip(pos).unwrap();
        }
        for clean in [inverted, plain] {
            let (expected, _, _) = TsbkMessage::decode(&clean).unwrap();
            for bad in 0..TSBK_BITS {
                let mut bits = clean.clone();
                bits.flip(bad).unwrap();
                let (msg, integrity, corrected) = TsbkMessage::decode(&bits).unwrap();
                assert_eq!(integrity, Integrity::Corrected, "bit {bad}");
                assert_eq!(corrected, 1, "bit {bad}");
                assert_eq!(msg, expected, "bit {bad}");
            }
        }
    }

    #[test_case(MFID_STANDARD, 0x02 ; "grant update")]
    #[test_case(MFID_STANDARD, 0x04 ; "unit to unit")]
    #[test_case(MFID_STANDARD, 0x3A ; "rfss status")]
    #[test_case(MFID_STANDARD, 0x3B ; "network status")]
    #[test_case(MFID_MOTOROLA, 0x00 ; "patch group add")]
    fn known_opcodes_are_not_unknown(mfid: u8, opcode: u8) {
        let tsbk = Tsbk::parse(&block(mfid, opcode)).unwrap();
        assert!(!matches!(tsbk, Tsbk::Unknown { .. }), "{tsbk:?}");
    }

    #[test]
    fn every_opcode_parses() {
        for mfid in [MFID_STANDARD, MFID_MOTOROLA, 0xA4] {
            for opcode in 0..64 {
                assert!(Tsbk::parse(&block(mfid, opcode)).is_ok());
            }
        }
    }

    #[test]
    fn patch_groups_skip_repeats() {
        let mut data = block(MFID_MOTOROLA, 0x00);
        data.load(Field::range(16, 32), 900).unwrap();
        data.load(Field::range(32, 48), 10).unwrap();
        data.load(Field::range(48, 64), 11).unwrap();
        data.load(Field::range(64, 80), 11).unwrap();
        let Tsbk::PatchGroupAdd {
            patch_group,
            groups,
        } = Tsbk::parse(&data).unwrap()
        else {
            panic!("expected patch");
        };
        assert_eq!(patch_group, 900);
        assert_eq!(groups, vec![10, 11]);
    }
}
