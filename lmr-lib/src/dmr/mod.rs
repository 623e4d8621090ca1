//! DMR tier II/III burst decoding.
//!
//! An outbound burst is 288 bits: the 24 bit CACH followed by a 264 bit burst. The
//! centre 48 bits of the burst hold either a sync pattern or embedded signalling; the
//! rest is two halves of the info field, split around the slot type in data bursts.
pub mod bptc;
mod cach;
pub mod link_control;

pub use bptc::{BPTC_BITS, BPTC_DATA_BITS};
pub use cach::*;
pub use link_control::{AliasFormat, FullLinkControl, LcBurst, LC_BITS};

use std::sync::LazyLock;

use tracing::{debug, span, trace, Level};

use crate::assembler::{assembled_integrity, join, Assembler};
use crate::bits::{BitBuffer, Field};
use crate::fec::{Integrity, GOLAY_20_8};
use crate::message::{Decoded, Identifier};
use crate::{Error, Result};

pub const BURST_BITS: usize = 264;
pub const FRAME_BITS: usize = CACH_BITS + BURST_BITS;

const SYNC: Field = Field::range(108, 156);
static SLOT_TYPE_POSITIONS: LazyLock<Vec<usize>> =
    LazyLock::new(|| (98..108).chain(156..166).collect());
static INFO_POSITIONS: LazyLock<Vec<usize>> =
    LazyLock::new(|| (0..98).chain(166..264).collect());
static VOICE_FRAMES: LazyLock<[Vec<usize>; 3]> = LazyLock::new(|| {
    [
        (0..72).collect(),
        (72..108).chain(156..192).collect(),
        (192..264).collect(),
    ]
});

/// Sync bit errors tolerated when matching a pattern.
const SYNC_TOLERANCE: u32 = 4;

pub const BS_VOICE_SYNC: u64 = 0x755F_D7DF_75F7;
pub const BS_DATA_SYNC: u64 = 0xDFF5_7D75_DF5D;
pub const MS_VOICE_SYNC: u64 = 0x7F7D_5DD5_7DFD;
pub const MS_DATA_SYNC: u64 = 0xD5D7_F77F_D757;

pub const DATA_TYPE_VOICE_HEADER: u8 = 1;
pub const DATA_TYPE_TERMINATOR: u8 = 2;
pub const DATA_TYPE_IDLE: u8 = 9;

/// What the centre of a burst holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BurstKind {
    Voice,
    Data,
}

/// Match the sync field against the voice and data patterns.
#[must_use]
pub fn classify_sync(sync: u64) -> Option<BurstKind> {
    let close = |pattern: u64| (sync ^ pattern).count_ones() <= SYNC_TOLERANCE;
    if close(BS_VOICE_SYNC) || close(MS_VOICE_SYNC) {
        Some(BurstKind::Voice)
    } else if close(BS_DATA_SYNC) || close(MS_DATA_SYNC) {
        Some(BurstKind::Data)
    } else {
        None
    }
}

/// Color code and data type of a data burst.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SlotType {
    pub color_code: u8,
    pub data_type: u8,
    pub integrity: Integrity,
}

impl SlotType {
    /// Decode the Golay(20,8) slot type from a 264 bit burst.
    ///
    /// # Errors
    /// [Error::IndexOutOfRange] if `burst` is too short.
    pub fn decode(burst: &BitBuffer) -> Result<SlotType> {
        let mut word = burst.gather(&SLOT_TYPE_POSITIONS)?;
        let integrity = GOLAY_20_8.correct_words(&mut word, &[0])?;
        let value = word.int(Field::range(0, 8))?;
        Ok(SlotType {
            color_code: (value >> 4) as u8,
            data_type: (value & 0xF) as u8,
            integrity,
        })
    }

    /// Write the slot type into a 264 bit burst.
    ///
    /// # Errors
    /// [Error::IndexOutOfRange] if `burst` is too short.
    pub fn encode(color_code: u8, data_type: u8, burst: &mut BitBuffer) -> Result<()> {
        let data = u32::from(color_code & 0xF) << 4 | u32::from(data_type & 0xF);
        let word = GOLAY_20_8.encode(data);
        for (i, pos) in SLOT_TYPE_POSITIONS.iter().enumerate() {
            burst.put(*pos, (word >> (19 - i)) & 1 == 1)?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum DmrMessage {
    LinkControl {
        timeslot: u8,
        color_code: u8,
        burst: LcBurst,
        lc: FullLinkControl,
    },
    /// A completed talker alias.
    TalkerAlias { timeslot: u8, alias: String },
    /// Three codec frames, forwarded without any checksum of their own.
    Voice { timeslot: u8, frames: Vec<Vec<u8>> },
    Idle { timeslot: u8, color_code: u8 },
    DataBurst {
        timeslot: u8,
        color_code: u8,
        data_type: u8,
        bits: BitBuffer,
    },
}

impl DmrMessage {
    #[must_use]
    pub fn timeslot(&self) -> u8 {
        match self {
            DmrMessage::LinkControl { timeslot, .. }
            | DmrMessage::TalkerAlias { timeslot, .. }
            | DmrMessage::Voice { timeslot, .. }
            | DmrMessage::Idle { timeslot, .. }
            | DmrMessage::DataBurst { timeslot, .. } => *timeslot,
        }
    }

    #[must_use]
    pub fn identifiers(&self) -> Vec<Identifier> {
        let mut ids = vec![Identifier::Timeslot(self.timeslot())];
        match self {
            DmrMessage::LinkControl { color_code, lc, .. } => {
                ids.push(Identifier::ColorCode(*color_code));
                ids.extend(lc.identifiers());
            }
            DmrMessage::TalkerAlias { alias, .. } => ids.push(Identifier::Alias(alias.clone())),
            DmrMessage::Idle { color_code, .. } | DmrMessage::DataBurst { color_code, .. } => {
                ids.push(Identifier::ColorCode(*color_code));
            }
            DmrMessage::Voice { .. } => {}
        }
        ids
    }
}

/// Decodes the bursts of one DMR channel, in order.
#[derive(Debug, Clone)]
pub struct BurstDecoder {
    aliases: Assembler<u8>,
}

impl Default for BurstDecoder {
    fn default() -> Self {
        BurstDecoder::new()
    }
}

impl BurstDecoder {
    #[must_use]
    pub fn new() -> Self {
        BurstDecoder {
            aliases: Assembler::new(link_control::ALIAS_FRAGMENTS),
        }
    }

    /// Decode one 288 bit CACH and burst. `hint` names the burst kind when the sync field
    /// holds embedded signalling; bursts without a recognizable sync and without a hint
    /// are treated as voice.
    ///
    /// The timeslot of every message is taken from the CACH TC bit, numbered 1 or 2.
    ///
    /// # Errors
    /// [Error::InvalidLength] for a burst of the wrong size.
    pub fn decode(&mut self, frame: &BitBuffer, hint: Option<BurstKind>) -> Result<Vec<Decoded>> {
        if frame.len() != FRAME_BITS {
            return Err(Error::InvalidLength {
                expected: FRAME_BITS,
                actual: frame.len(),
            });
        }
        let span = span!(Level::TRACE, "dmr_burst");
        let _guard = span.enter();

        let cach = Cach::decode(&frame.sub_range(0, CACH_BITS)?)?;
        let timeslot = cach.timeslot + 1;
        let burst = frame.sub_range(CACH_BITS, FRAME_BITS)?;
        let kind = classify_sync(burst.long(SYNC)?)
            .or(hint)
            .unwrap_or(BurstKind::Voice);
        trace!(timeslot, ?kind, cach = ?cach.integrity, "burst");

        match kind {
            BurstKind::Voice => {
                let frames = VOICE_FRAMES
                    .iter()
                    .map(|positions| burst.gather(positions).map(|b| b.to_bytes()))
                    .collect::<Result<Vec<_>>>()?;
                Ok(vec![Decoded::new(
                    DmrMessage::Voice { timeslot, frames },
                    Integrity::Passed,
                    0,
                )])
            }
            BurstKind::Data => self.decode_data(&burst, timeslot),
        }
    }

    fn decode_data(&mut self, burst: &BitBuffer, timeslot: u8) -> Result<Vec<Decoded>> {
        let slot = SlotType::decode(burst)?;
        let (data, bptc_integrity) = bptc::decode(&burst.gather(&INFO_POSITIONS)?)?;
        let color_code = slot.color_code;
        let integrity = slot.integrity.merge(bptc_integrity);

        let lc_burst = match slot.data_type {
            DATA_TYPE_VOICE_HEADER => LcBurst::VoiceHeader,
            DATA_TYPE_TERMINATOR => LcBurst::Terminator,
            DATA_TYPE_IDLE => {
                return Ok(vec![Decoded::new(
                    DmrMessage::Idle {
                        timeslot,
                        color_code,
                    },
                    integrity,
                    data.corrected_bits(),
                )])
            }
            data_type => {
                return Ok(vec![Decoded::new(
                    DmrMessage::DataBurst {
                        timeslot,
                        color_code,
                        data_type,
                        bits: data.clone(),
                    },
                    integrity,
                    data.corrected_bits(),
                )])
            }
        };

        let (lc, lc_integrity) = link_control::check(&data, lc_burst)?;
        let integrity = integrity.merge(lc_integrity);
        let corrected = data.corrected_bits() + lc.corrected_bits();
        let parsed = FullLinkControl::parse(&lc)?;
        debug!(timeslot, color_code, lc = ?parsed, ?integrity, "link control");

        let mut out = Vec::with_capacity(2);
        if let (Some(number), true) = (parsed.alias_fragment(), integrity.is_valid()) {
            let mut fragment = link_control::alias_fragment_bits(&lc)?;
            fragment.add_corrected(corrected);
            if let Some(fragments) = self.aliases.push(timeslot, number, fragment) {
                out.push(talker_alias(timeslot, &fragments)?);
            }
        }
        out.insert(
            0,
            Decoded::new(
                DmrMessage::LinkControl {
                    timeslot,
                    color_code,
                    burst: lc_burst,
                    lc: parsed,
                },
                integrity,
                corrected,
            ),
        );
        Ok(out)
    }

    /// Push an already decoded alias fragment, e.g. one received in embedded signalling.
    /// Returns the [DmrMessage::TalkerAlias] once all four fragments have arrived, tagged
    /// with the corrections carried by `bits` and its siblings.
    ///
    /// # Errors
    /// [Error::IndexOutOfRange] if the joined fragments are too short to hold the header.
    pub fn push_alias_fragment(
        &mut self,
        timeslot: u8,
        number: usize,
        bits: BitBuffer,
    ) -> Result<Option<Decoded>> {
        match self.aliases.push(timeslot, number, bits) {
            Some(fragments) => talker_alias(timeslot, &fragments).map(Some),
            None => Ok(None),
        }
    }

    /// Forget partial aliases.
    pub fn reset(&mut self) {
        self.aliases.clear();
    }
}

fn talker_alias(timeslot: u8, fragments: &[BitBuffer]) -> Result<Decoded> {
    let alias = link_control::decode_alias(&join(fragments))?;
    let (integrity, corrected) = assembled_integrity(fragments);
    debug!(timeslot, alias, ?integrity, "talker alias");
    Ok(Decoded::new(
        DmrMessage::TalkerAlias { timeslot, alias },
        integrity,
        corrected,
    ))
}

/// Build a 288 bit data burst, for test vectors and loopback.
///
/// # Errors
/// [Error::InvalidLength] if `data` is not 96 bits or `cach` not 24 bits.
pub fn build_data_burst(
    cach: &BitBuffer,
    color_code: u8,
    data_type: u8,
    data: &BitBuffer,
) -> Result<BitBuffer> {
    if cach.len() != CACH_BITS {
        return Err(Error::InvalidLength {
            expected: CACH_BITS,
            actual: cach.len(),
        });
    }
    let info = bptc::encode(data)?;
    let mut burst = BitBuffer::new(BURST_BITS);
    for (pos, bit) in INFO_POSITIONS.iter().zip(info.iter()) {
        burst.put(*pos, bit)?;
    }
    SlotType::encode(color_code, data_type, &mut burst)?;
    burst.load(SYNC, BS_DATA_SYNC)?;
    Ok(cach.concat(&burst))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{MessageBody, Role};

    fn cach(timeslot: u8) -> BitBuffer {
        Cach::encode(false, timeslot, 0, &BitBuffer::new(17)).unwrap()
    }

    fn dmr(decoded: &Decoded) -> &DmrMessage {
        match &decoded.body {
            MessageBody::Dmr(msg) => msg,
            other => panic!("not dmr: {other:?}"),
        }
    }

    fn lc_burst(timeslot: u8, data_type: u8, lc: &BitBuffer) -> BitBuffer {
        let burst = if data_type == DATA_TYPE_TERMINATOR {
            LcBurst::Terminator
        } else {
            LcBurst::VoiceHeader
        };
        let data = link_control::encode(lc, burst).unwrap();
        build_data_burst(&cach(timeslot), 1, data_type, &data).unwrap()
    }

    #[test]
    fn sync_tolerates_a_few_errors() {
        assert_eq!(classify_sync(BS_VOICE_SYNC ^ 0b1011), Some(BurstKind::Voice));
        assert_eq!(classify_sync(MS_DATA_SYNC), Some(BurstKind::Data));
        assert_eq!(classify_sync(0), None);
    }

    #[test]
    fn group_voice_header() {
        let mut lc = BitBuffer::new(LC_BITS);
        lc.load(Field::range(24, 48), 100).unwrap();
        lc.load(Field::range(48, 72), 3_120_001).unwrap();
        let frame = lc_burst(1, DATA_TYPE_VOICE_HEADER, &lc);

        let out = BurstDecoder::new().decode(&frame, None).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].integrity, Integrity::Passed);
        assert!(matches!(
            dmr(&out[0]),
            DmrMessage::LinkControl {
                timeslot: 2,
                color_code: 1,
                burst: LcBurst::VoiceHeader,
                lc: FullLinkControl::GroupVoice { group: 100, source: 3_120_001, .. },
            }
        ));
        assert!(out[0]
            .body
            .identifiers()
            .contains(&Identifier::talkgroup(100, Role::To)));
    }

    #[test]
    fn damaged_burst_is_corrected() {
        let lc = BitBuffer::new(LC_BITS);
        let clean = lc_burst(0, DATA_TYPE_TERMINATOR, &lc);
        let mut noisy = clean.clone();
        // one in the slot type, two in the info field
        for pos in [CACH_BITS + 100, CACH_BITS + 5, CACH_BITS + 200] {
            noisy.flip(pos).unwrap();
        }
        let out = BurstDecoder::new().decode(&noisy, None).unwrap();
        assert_eq!(out[0].integrity, Integrity::Corrected);
        assert!(out[0].corrected_bits >= 2);
        assert_eq!(
            dmr(&out[0]),
            dmr(&BurstDecoder::new().decode(&clean, None).unwrap()[0])
        );
    }

    #[test]
    fn idle_and_other_data_types() {
        let data = BitBuffer::new(BPTC_DATA_BITS);
        let idle = build_data_burst(&cach(0), 3, DATA_TYPE_IDLE, &data).unwrap();
        let csbk = build_data_burst(&cach(0), 3, 3, &data).unwrap();
        let mut decoder = BurstDecoder::new();
        assert!(matches!(
            dmr(&decoder.decode(&idle, None).unwrap()[0]),
            DmrMessage::Idle { color_code: 3, .. }
        ));
        assert!(matches!(
            dmr(&decoder.decode(&csbk, None).unwrap()[0]),
            DmrMessage::DataBurst { data_type: 3, .. }
        ));
    }

    #[test]
    fn voice_burst_frames() {
        let mut burst = BitBuffer::new(BURST_BITS);
        burst.load(SYNC, BS_VOICE_SYNC).unwrap();
        burst.set(0).unwrap();
        burst.set(263).unwrap();
        let frame = cach(1).concat(&burst);
        let out = BurstDecoder::new().decode(&frame, Some(BurstKind::Data)).unwrap();
        let DmrMessage::Voice { frames, timeslot } = dmr(&out[0]) else {
            panic!("expected voice");
        };
        assert_eq!(*timeslot, 2);
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0][0], 0x80);
        assert_eq!(frames[2][8], 0x01);
    }

    #[test]
    fn alias_over_link_control() {
        let text = "UNIT 12";
        let mut alias = BitBuffer::new(224);
        alias.load(Field::range(2, 7), text.len() as u64).unwrap();
        for (i, c) in text.bytes().enumerate() {
            alias.load(Field::bits(7 + i * 7, 7), u64::from(c)).unwrap();
        }
        let mut decoder = BurstDecoder::new();
        let mut found = Vec::new();
        for flco in 4..8u64 {
            let mut lc = BitBuffer::new(LC_BITS);
            lc.load(Field::range(2, 8), flco).unwrap();
            let offset = (flco as usize - 4) * 56;
            lc.copy_from(16, &alias.sub_range(offset, offset + 56).unwrap())
                .unwrap();
            let frame = lc_burst(0, DATA_TYPE_TERMINATOR, &lc);
            found.extend(decoder.decode(&frame, None).unwrap());
        }
        let aliases: Vec<_> = found
            .iter()
            .filter_map(|d| match dmr(d) {
                DmrMessage::TalkerAlias { alias, timeslot } => Some((alias.clone(), *timeslot)),
                _ => None,
            })
            .collect();
        assert_eq!(aliases, vec![(text.to_string(), 1)]);
    }

    #[test]
    fn pushed_alias_fragments_keep_corrections() {
        let text = "CAR 9";
        let mut alias = BitBuffer::new(224);
        alias.load(Field::range(2, 7), text.len() as u64).unwrap();
        for (i, c) in text.bytes().enumerate() {
            alias.load(Field::bits(7 + i * 7, 7), u64::from(c)).unwrap();
        }
        let mut decoder = BurstDecoder::new();
        let mut completed = None;
        for number in 1..=4 {
            let offset = (number - 1) * 56;
            let mut fragment = alias.sub_range(offset, offset + 56).unwrap();
            if number == 3 {
                fragment.add_corrected(2);
            }
            completed = decoder.push_alias_fragment(2, number, fragment).unwrap();
        }
        let decoded = completed.expect("alias after four fragments");
        assert_eq!(decoded.integrity, Integrity::Corrected);
        assert_eq!(decoded.corrected_bits, 2);
        assert!(matches!(
            dmr(&decoded),
            DmrMessage::TalkerAlias { timeslot: 2, alias } if alias == text
        ));
    }

    #[test]
    fn wrong_length_is_fatal() {
        assert!(matches!(
            BurstDecoder::new().decode(&BitBuffer::new(264), None),
            Err(Error::InvalidLength { expected: 288, actual: 264 })
        ));
    }
}
