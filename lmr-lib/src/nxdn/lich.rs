//! Link information channel: the short classifier at the start of every NXDN frame.
use std::collections::VecDeque;

use tracing::trace;

use crate::bits::{BitBuffer, Field};
use crate::Result;

/// Value bits of the LICH within the frame body.
pub const LICH_FIELD: Field = Field::sparse(&[0, 2, 4, 6, 8, 10, 12]);
/// Parity over the first four value bits.
pub const LICH_PARITY: usize = 14;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RfChannel {
    /// Trunked control channel.
    Rcch,
    /// Trunked traffic channel.
    Rtch,
    /// Composite control and traffic channel.
    RtchComposite,
    /// Conventional repeater or direct channel.
    Rdch,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Direction {
    Inbound,
    Outbound,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum FunctionalChannel {
    Cac,
    CacLong,
    CacShort,
    SacchSuperFrame,
    SacchNonSuperFrame,
    SacchSuperFrameIdle,
    Udch,
    Unknown,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum LichOption {
    DataNormal,
    DataIdle,
    DataCommon,
    VoiceOnly,
    Facch1First,
    Facch1Second,
    Facch1Both,
    Udch,
    Facch2,
    Unknown,
}

/// Fallback classification used when the LICH cannot be resolved.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChannelHint {
    pub channel: RfChannel,
    pub direction: Direction,
}

impl ChannelHint {
    #[must_use]
    pub const fn new(channel: RfChannel, direction: Direction) -> Self {
        ChannelHint { channel, direction }
    }
}

impl Default for ChannelHint {
    fn default() -> Self {
        ChannelHint::new(RfChannel::Rcch, Direction::Outbound)
    }
}

/// Frame shape described by a LICH value.
///
/// `value` is `None` for the unknown entries chosen by fallback.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Lich {
    pub value: Option<u8>,
    pub rf_channel: RfChannel,
    pub functional_channel: FunctionalChannel,
    pub option: LichOption,
    pub direction: Direction,
}

const fn lich(
    value: u8,
    rf_channel: RfChannel,
    functional_channel: FunctionalChannel,
    option: LichOption,
    direction: Direction,
) -> Lich {
    Lich {
        value: Some(value),
        rf_channel,
        functional_channel,
        option,
        direction,
    }
}

use Direction::{Inbound, Outbound};
use FunctionalChannel as Fc;
use LichOption as Opt;
use RfChannel::{Rcch, Rdch, Rtch, RtchComposite};

#[rustfmt::skip]
const DEFINED: [Lich; 45] = [
    lich(0x18, Rcch, Fc::CacShort, Opt::DataCommon, Inbound),
    lich(0x08, Rcch, Fc::CacLong, Opt::DataCommon, Inbound),
    lich(0x01, Rcch, Fc::Cac, Opt::DataNormal, Outbound),
    lich(0x03, Rcch, Fc::Cac, Opt::DataIdle, Outbound),
    lich(0x05, Rcch, Fc::Cac, Opt::DataCommon, Outbound),

    lich(0x36, Rtch, Fc::SacchSuperFrame, Opt::VoiceOnly, Inbound),
    lich(0x34, Rtch, Fc::SacchSuperFrame, Opt::Facch1Second, Inbound),
    lich(0x32, Rtch, Fc::SacchSuperFrame, Opt::Facch1First, Inbound),
    lich(0x30, Rtch, Fc::SacchSuperFrame, Opt::Facch1Both, Inbound),
    lich(0x20, Rtch, Fc::SacchNonSuperFrame, Opt::Facch1Both, Inbound),
    lich(0x38, Rtch, Fc::SacchSuperFrame, Opt::Facch1Both, Inbound),
    lich(0x2E, Rtch, Fc::Udch, Opt::Udch, Inbound),
    lich(0x28, Rtch, Fc::Udch, Opt::Facch2, Inbound),

    lich(0x37, Rtch, Fc::SacchSuperFrame, Opt::VoiceOnly, Outbound),
    lich(0x35, Rtch, Fc::SacchSuperFrame, Opt::Facch1Second, Outbound),
    lich(0x33, Rtch, Fc::SacchSuperFrame, Opt::Facch1First, Outbound),
    lich(0x31, Rtch, Fc::SacchSuperFrame, Opt::Facch1Both, Outbound),
    lich(0x21, Rtch, Fc::SacchNonSuperFrame, Opt::Facch1Both, Outbound),
    lich(0x39, Rtch, Fc::SacchSuperFrameIdle, Opt::Facch1Both, Outbound),
    lich(0x2F, Rtch, Fc::Udch, Opt::Udch, Outbound),
    lich(0x29, Rtch, Fc::Udch, Opt::Facch2, Outbound),

    lich(0x77, RtchComposite, Fc::SacchSuperFrame, Opt::VoiceOnly, Outbound),
    lich(0x75, RtchComposite, Fc::SacchSuperFrame, Opt::Facch1Second, Outbound),
    lich(0x73, RtchComposite, Fc::SacchSuperFrame, Opt::Facch1First, Outbound),
    lich(0x71, RtchComposite, Fc::SacchSuperFrame, Opt::Facch1Both, Outbound),
    lich(0x61, RtchComposite, Fc::SacchNonSuperFrame, Opt::Facch1Both, Outbound),
    lich(0x79, RtchComposite, Fc::SacchSuperFrameIdle, Opt::Facch1Both, Outbound),
    lich(0x6F, RtchComposite, Fc::Udch, Opt::Udch, Outbound),
    lich(0x69, RtchComposite, Fc::Udch, Opt::Facch2, Outbound),

    lich(0x56, Rdch, Fc::SacchSuperFrame, Opt::VoiceOnly, Inbound),
    lich(0x54, Rdch, Fc::SacchSuperFrame, Opt::Facch1Second, Inbound),
    lich(0x52, Rdch, Fc::SacchSuperFrame, Opt::Facch1First, Inbound),
    lich(0x50, Rdch, Fc::SacchSuperFrame, Opt::Facch1Both, Inbound),
    lich(0x40, Rdch, Fc::SacchNonSuperFrame, Opt::Facch1Both, Inbound),
    lich(0x58, Rdch, Fc::SacchSuperFrame, Opt::Facch1Both, Inbound),
    lich(0x4E, Rdch, Fc::Udch, Opt::Udch, Inbound),
    lich(0x48, Rdch, Fc::Udch, Opt::Facch2, Inbound),

    lich(0x57, Rdch, Fc::SacchSuperFrame, Opt::VoiceOnly, Outbound),
    lich(0x55, Rdch, Fc::SacchSuperFrame, Opt::Facch1Second, Outbound),
    lich(0x53, Rdch, Fc::SacchSuperFrame, Opt::Facch1First, Outbound),
    lich(0x51, Rdch, Fc::SacchSuperFrame, Opt::Facch1Both, Outbound),
    lich(0x41, Rdch, Fc::SacchNonSuperFrame, Opt::Facch1Both, Outbound),
    lich(0x59, Rdch, Fc::SacchSuperFrameIdle, Opt::Facch1Both, Outbound),
    lich(0x4F, Rdch, Fc::Udch, Opt::Udch, Outbound),
    lich(0x49, Rdch, Fc::Udch, Opt::Facch2, Outbound),
];

impl Lich {
    /// The defined LICH with this 7-bit value.
    #[must_use]
    pub fn from_value(value: u8) -> Option<Lich> {
        DEFINED
            .iter()
            .find(|l| l.value == Some(value))
            .copied()
    }

    /// Catch-all entry for a channel and direction whose exact shape is unknown.
    #[must_use]
    pub fn unknown(hint: ChannelHint) -> Lich {
        let functional_channel = match (hint.channel, hint.direction) {
            (Rcch, Outbound) => Fc::Cac,
            _ => Fc::Unknown,
        };
        let direction = match hint.channel {
            RtchComposite => Outbound,
            _ => hint.direction,
        };
        Lich {
            value: None,
            rf_channel: hint.channel,
            functional_channel,
            option: Opt::Unknown,
            direction,
        }
    }

    /// Read the LICH from the first 16 bits of a descrambled frame body. Values that are
    /// undefined or fail parity are replaced by [Lich::unknown] for `fallback`.
    ///
    /// # Errors
    /// If `body` is shorter than the LICH.
    pub fn decode(body: &BitBuffer, fallback: ChannelHint) -> Result<Lich> {
        let value = body.int(LICH_FIELD)? as u8;
        let parity = body.get(LICH_PARITY)?;
        if parity != Lich::parity(value) {
            trace!(value, "LICH parity mismatch");
            return Ok(Lich::unknown(fallback));
        }
        Ok(Lich::from_value(value).unwrap_or_else(|| {
            trace!(value, "undefined LICH value");
            Lich::unknown(fallback)
        }))
    }

    /// Write `value` and its parity into the first 16 bits of `body`.
    ///
    /// # Errors
    /// If `body` is shorter than the LICH.
    pub fn encode(value: u8, body: &mut BitBuffer) -> Result<()> {
        body.load(LICH_FIELD, u64::from(value))?;
        body.put(LICH_PARITY, Lich::parity(value))
    }

    fn parity(value: u8) -> bool {
        (value >> 3).count_ones() % 2 == 1
    }

    /// Decoded from a defined value rather than chosen by fallback.
    #[must_use]
    pub fn is_exact(&self) -> bool {
        self.value.is_some()
    }

    #[must_use]
    pub fn hint(&self) -> ChannelHint {
        ChannelHint::new(self.rf_channel, self.direction)
    }

    #[must_use]
    pub fn is_outbound(&self) -> bool {
        self.direction == Outbound
    }

    #[must_use]
    pub fn is_long_cac(&self) -> bool {
        self.functional_channel == Fc::CacLong
    }

    #[must_use]
    pub fn is_facch1_first(&self) -> bool {
        matches!(self.option, Opt::Facch1First | Opt::Facch1Both)
    }

    #[must_use]
    pub fn is_facch1_second(&self) -> bool {
        matches!(self.option, Opt::Facch1Second | Opt::Facch1Both)
    }

    #[must_use]
    pub fn has_audio(&self) -> bool {
        matches!(
            self.option,
            Opt::VoiceOnly | Opt::Facch1First | Opt::Facch1Second
        )
    }

    /// Voice in the first half of the frame.
    #[must_use]
    pub fn is_voice_first(&self) -> bool {
        matches!(self.option, Opt::VoiceOnly | Opt::Facch1Second)
    }

    /// Voice in the second half of the frame.
    #[must_use]
    pub fn is_voice_second(&self) -> bool {
        matches!(self.option, Opt::VoiceOnly | Opt::Facch1First)
    }

    #[must_use]
    pub fn has_sacch(&self) -> bool {
        !matches!(self.option, Opt::Udch | Opt::Facch2)
    }

    #[must_use]
    pub fn is_sacch_super_frame(&self) -> bool {
        self.functional_channel == Fc::SacchSuperFrame
    }
}

const HISTORY: usize = 3;

/// Remembers the channel type of the last few exactly classified frames.
#[derive(Debug, Clone, Default)]
pub struct ChannelTracker {
    recent: VecDeque<ChannelHint>,
}

impl ChannelTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a classification. Fallback classifications are ignored.
    pub fn record(&mut self, lich: &Lich) {
        if !lich.is_exact() {
            return;
        }
        if self.recent.len() == HISTORY {
            self.recent.pop_front();
        }
        self.recent.push_back(lich.hint());
    }

    /// Most common recent channel type, newest winning ties; otherwise `hint`; otherwise
    /// an outbound control channel.
    #[must_use]
    pub fn fallback(&self, hint: Option<ChannelHint>) -> ChannelHint {
        let mut best: Option<(ChannelHint, usize)> = None;
        for candidate in self.recent.iter().rev() {
            let count = self.recent.iter().filter(|h| *h == candidate).count();
            if best.map_or(true, |(_, c)| count > c) {
                best = Some((*candidate, count));
            }
        }
        best.map(|(h, _)| h).or(hint).unwrap_or_default()
    }

    pub fn clear(&mut self) {
        self.recent.clear();
    }
}
