//! Protocol independent message envelope and identifiers.
use derive_more::From;

use crate::dmr::DmrMessage;
use crate::fec::Integrity;
use crate::nxdn::NxdnMessage;
use crate::p25::P25Message;

/// Which side of a call an identifier refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Role {
    From,
    To,
    Any,
}

/// A radio channel reference. Protocols without channel bands use band 0.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Channel {
    pub band: u8,
    pub number: u16,
}

impl Channel {
    #[must_use]
    pub const fn new(band: u8, number: u16) -> Self {
        Channel { band, number }
    }
}

/// Normalized identifiers extracted from a decoded message.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Identifier {
    Talkgroup { id: u32, role: Role },
    Radio { id: u32, role: Role },
    Channel(Channel),
    /// NXDN radio access number.
    Ran(u8),
    Location(u32),
    System { wacn: u32, system: u16 },
    Alias(String),
    ColorCode(u8),
    Timeslot(u8),
}

impl Identifier {
    #[must_use]
    pub fn talkgroup(id: u32, role: Role) -> Self {
        Identifier::Talkgroup { id, role }
    }

    #[must_use]
    pub fn radio(id: u32, role: Role) -> Self {
        Identifier::Radio { id, role }
    }
}

/// Closed set of protocol message families.
#[derive(Clone, Debug, PartialEq, From)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum MessageBody {
    Nxdn(NxdnMessage),
    Dmr(DmrMessage),
    P25(P25Message),
}

impl MessageBody {
    #[must_use]
    pub fn identifiers(&self) -> Vec<Identifier> {
        match self {
            MessageBody::Nxdn(msg) => msg.identifiers(),
            MessageBody::Dmr(msg) => msg.identifiers(),
            MessageBody::P25(msg) => msg.identifiers(),
        }
    }
}

/// A message as produced by a protocol frame decoder, before it is stamped with the
/// channel and time it was received on.
#[derive(Clone, Debug, PartialEq)]
pub struct Decoded {
    pub body: MessageBody,
    pub integrity: Integrity,
    pub corrected_bits: u32,
}

impl Decoded {
    pub fn new(body: impl Into<MessageBody>, integrity: Integrity, corrected_bits: u32) -> Self {
        Decoded {
            body: body.into(),
            integrity,
            corrected_bits,
        }
    }
}

/// A decoded message delivered to consumers.
///
/// Identifiers are computed when the message is created and never change afterwards.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Message {
    /// Receive time in milliseconds, as supplied with the frame.
    pub timestamp: u64,
    pub channel: String,
    pub integrity: Integrity,
    pub corrected_bits: u32,
    pub body: MessageBody,
    pub identifiers: Vec<Identifier>,
}

impl Message {
    #[must_use]
    pub fn new(timestamp: u64, channel: impl Into<String>, decoded: Decoded) -> Self {
        let identifiers = decoded.body.identifiers();
        Message {
            timestamp,
            channel: channel.into(),
            integrity: decoded.integrity,
            corrected_bits: decoded.corrected_bits,
            body: decoded.body,
            identifiers,
        }
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.integrity.is_valid()
    }
}
