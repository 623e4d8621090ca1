//! NXDN frame decoding.
//!
//! A frame is 384 bits: a 20 bit frame sync word followed by a 364 bit body. The body
//! starts with the LICH, which selects how the rest of the body is descrambled and which
//! signalling and voice fields it carries.
mod encode;
mod frame;
mod layer3;
mod lich;

pub use encode::*;
pub use frame::*;
pub use layer3::*;
pub use lich::*;

use std::sync::LazyLock;

use crate::bits::BitBuffer;
use crate::coding::ScrambleSequence;
use crate::message::Identifier;

pub const SYNC_BITS: usize = 20;
pub const BODY_BITS: usize = 364;
pub const FRAME_BITS: usize = SYNC_BITS + BODY_BITS;
/// Frame sync word.
pub const FRAME_SYNC: u64 = 0xC_DF59;

static LICH_SEQUENCE: LazyLock<ScrambleSequence> = LazyLock::new(|| ScrambleSequence::pn9(16));
static FULL_SEQUENCE: LazyLock<ScrambleSequence> = LazyLock::new(|| body_sequence(BODY_BITS));
static CONTROL_OUTBOUND_SEQUENCE: LazyLock<ScrambleSequence> =
    LazyLock::new(|| body_sequence(340));
static CONTROL_INBOUND_SEQUENCE: LazyLock<ScrambleSequence> =
    LazyLock::new(|| body_sequence(268));

// The LICH is descrambled on its own before classification
fn body_sequence(len: usize) -> ScrambleSequence {
    ScrambleSequence::pn9(len).excluding(LICH_SEQUENCE.bits())
}

fn sequence_for(lich: &Lich) -> &'static ScrambleSequence {
    match (lich.rf_channel, lich.direction) {
        (RfChannel::Rcch, Direction::Outbound) => &CONTROL_OUTBOUND_SEQUENCE,
        (RfChannel::Rcch, Direction::Inbound) => &CONTROL_INBOUND_SEQUENCE,
        _ => &FULL_SEQUENCE,
    }
}

/// Signalling field a layer 3 message was carried in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum ControlChannel {
    /// Outbound common access channel.
    Cac,
    /// Inbound long CAC.
    LongCac,
    /// Inbound short CAC.
    ShortCac,
    Sacch,
    Facch1,
    /// FACCH2 or UDCH.
    Facch2,
    /// Four SACCH fragments of a super frame.
    SacchSuperFrame,
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum NxdnMessage {
    Layer3 {
        channel: ControlChannel,
        lich: Lich,
        ran: u8,
        message: Layer3,
    },
    /// One quarter of a SACCH super frame, or a complete non super frame SACCH.
    SacchFragment {
        lich: Lich,
        ran: u8,
        structure: u8,
        bits: BitBuffer,
    },
    /// Codec frames, forwarded without any checksum of their own.
    Audio {
        lich: Lich,
        ran: u8,
        frames: Vec<Vec<u8>>,
    },
}

impl NxdnMessage {
    #[must_use]
    pub fn lich(&self) -> &Lich {
        match self {
            NxdnMessage::Layer3 { lich, .. }
            | NxdnMessage::SacchFragment { lich, .. }
            | NxdnMessage::Audio { lich, .. } => lich,
        }
    }

    #[must_use]
    pub fn identifiers(&self) -> Vec<Identifier> {
        match self {
            NxdnMessage::Layer3 { ran, message, .. } => {
                let mut ids = vec![Identifier::Ran(*ran)];
                ids.extend(message.identifiers());
                ids
            }
            NxdnMessage::SacchFragment { ran, .. } | NxdnMessage::Audio { ran, .. } => {
                vec![Identifier::Ran(*ran)]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_sequences_skip_lich() {
        for seq in [&*FULL_SEQUENCE, &*CONTROL_INBOUND_SEQUENCE, &*CONTROL_OUTBOUND_SEQUENCE] {
            assert_eq!(seq.bits().sub_range(0, 16).unwrap().count_ones(), 0);
        }
        assert_eq!(
            FULL_SEQUENCE.bits().sub_range(16, 268).unwrap(),
            CONTROL_INBOUND_SEQUENCE.bits().sub_range(16, 268).unwrap()
        );
    }
}
