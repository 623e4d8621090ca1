//! NXDN layer 3 messages.
//!
//! A type code names different messages on the control and traffic channels and in
//! each direction, so decoding needs the channel and direction from the LICH.
use crate::bits::{BitBuffer, Field};
use crate::message::{Channel, Identifier, Role};
use crate::Result;

use super::{Direction, RfChannel};

const MESSAGE_TYPE: Field = Field::range(2, 8);
const CALL_TYPE: Field = Field::range(8, 11);
const EMERGENCY: usize = 11;
const PRIORITY: Field = Field::range(12, 14);
const SOURCE: Field = Field::range(16, 32);
const DESTINATION: Field = Field::range(32, 48);
const CIPHER: Field = Field::range(48, 50);
const KEY: Field = Field::range(50, 56);
const CALL_TIMER: Field = Field::range(56, 62);
const CHANNEL: Field = Field::range(62, 72);
const PACKETS: Field = Field::range(56, 60);
const CAUSE: Field = Field::range(48, 56);
const LOCATION: Field = Field::range(8, 32);
const SERVICE: Field = Field::range(32, 48);
const CONTROL_CHANNEL: Field = Field::range(48, 58);
const RESTRICTION: Field = Field::range(48, 72);
const CONTROL_FLAGS: Field = Field::range(32, 38);
const CONTROL_CHANNEL_1: Field = Field::range(38, 48);
const CONTROL_CHANNEL_2: Field = Field::range(54, 64);
const FAILURE_STATUS: Field = Field::range(32, 48);
const REGISTRATION_LOCATION: Field = Field::range(16, 40);
const REGISTRATION_UNIT: Field = Field::range(40, 56);
const REGISTRATION_GROUP: Field = Field::range(56, 72);
const REGISTRATION_CAUSE: Field = Field::range(72, 80);

/// Adjacent sites are five octet entries starting after the type octet.
const ADJACENT_SITE_BITS: usize = 40;
const ADJACENT_SITES: usize = 4;

const INDIVIDUAL_CALL: u8 = 4;

pub const VOICE_CALL: u8 = 0x01;
pub const VOICE_CALL_ASSIGNMENT: u8 = 0x04;
pub const TRANSMISSION_RELEASE: u8 = 0x08;
pub const DATA_CALL: u8 = 0x09;
pub const IDLE: u8 = 0x10;
pub const DISCONNECT: u8 = 0x11;
pub const SITE_INFORMATION: u8 = 0x18;
pub const SERVICE_INFORMATION: u8 = 0x19;
pub const CONTROL_CHANNEL_INFORMATION: u8 = 0x1A;
pub const ADJACENT_SITE_INFORMATION: u8 = 0x1B;
pub const FAILURE_STATUS_INFORMATION: u8 = 0x1C;
pub const REGISTRATION: u8 = 0x20;
pub const REGISTRATION_CLEAR: u8 = 0x22;
pub const GROUP_REGISTRATION: u8 = 0x24;

/// Fields shared by the call related messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct CallHeader {
    pub call_type: u8,
    pub emergency: bool,
    pub priority: u8,
    pub source: u16,
    pub destination: u16,
    pub cipher: u8,
    pub key: u8,
}

impl CallHeader {
    fn decode(bits: &BitBuffer) -> Result<Self> {
        Ok(CallHeader {
            call_type: bits.int(CALL_TYPE)? as u8,
            emergency: bits.get(EMERGENCY)?,
            priority: bits.int(PRIORITY)? as u8,
            source: bits.int(SOURCE)? as u16,
            destination: bits.int(DESTINATION)? as u16,
            cipher: bits.int(CIPHER)? as u8,
            key: bits.int(KEY)? as u8,
        })
    }

    #[must_use]
    pub fn is_group(&self) -> bool {
        self.call_type != INDIVIDUAL_CALL
    }

    #[must_use]
    pub fn is_encrypted(&self) -> bool {
        self.cipher != 0
    }

    fn identifiers(&self) -> Vec<Identifier> {
        let to = if self.is_group() {
            Identifier::talkgroup(u32::from(self.destination), Role::To)
        } else {
            Identifier::radio(u32::from(self.destination), Role::To)
        };
        vec![Identifier::radio(u32::from(self.source), Role::From), to]
    }
}

/// Unit and group of a registration exchange.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Registration {
    pub location: u32,
    pub unit: u16,
    pub group: u16,
}

impl Registration {
    fn decode(bits: &BitBuffer) -> Result<Self> {
        Ok(Registration {
            location: bits.int(REGISTRATION_LOCATION)?,
            unit: bits.int(REGISTRATION_UNIT)? as u16,
            group: bits.int(REGISTRATION_GROUP)? as u16,
        })
    }

    fn identifiers(&self) -> Vec<Identifier> {
        vec![
            Identifier::Location(self.location),
            Identifier::radio(u32::from(self.unit), Role::From),
            Identifier::talkgroup(u32::from(self.group), Role::To),
        ]
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct AdjacentSite {
    pub neighbor: u8,
    pub location: u32,
    pub channel: u16,
}

/// The listed sites, stopping at the first empty neighbor slot after the first or
/// at the end of the payload.
fn adjacent_sites(bits: &BitBuffer) -> Result<Vec<AdjacentSite>> {
    let mut sites = Vec::with_capacity(ADJACENT_SITES);
    for i in 0..ADJACENT_SITES {
        let base = 8 + i * ADJACENT_SITE_BITS;
        if i > 0 && base + ADJACENT_SITE_BITS > bits.len() {
            break;
        }
        let neighbor = bits.int(Field::range(base + 26, base + 30))? as u8;
        if i > 0 && neighbor == 0 {
            break;
        }
        sites.push(AdjacentSite {
            neighbor,
            location: bits.int(Field::range(base, base + 24))?,
            channel: bits.int(Field::range(base + 30, base + 40))? as u16,
        });
    }
    Ok(sites)
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Layer3 {
    /// Voice call on a traffic channel, either direction.
    VoiceCall(CallHeader),
    VoiceCallRequest(CallHeader),
    VoiceCallResponse {
        call: CallHeader,
        cause: u8,
    },
    VoiceCallAssignment {
        call: CallHeader,
        call_timer: u8,
        channel: u16,
    },
    TransmissionRelease(CallHeader),
    /// Data call on a traffic channel, either direction.
    DataCallHeader {
        call: CallHeader,
        packets: u8,
    },
    DataCallRequest(CallHeader),
    DataCallResponse {
        call: CallHeader,
        cause: u8,
    },
    Idle,
    Disconnect {
        call: CallHeader,
        cause: u8,
    },
    DisconnectRequest {
        call: CallHeader,
        cause: u8,
    },
    SiteInformation {
        location: u32,
        service: u16,
        control_channel: u16,
    },
    ServiceInformation {
        location: u32,
        service: u16,
        restriction: u32,
    },
    ControlChannelInformation {
        location: u32,
        flags: u8,
        primary: u16,
        secondary: u16,
    },
    AdjacentSiteInformation {
        sites: Vec<AdjacentSite>,
    },
    FailureStatus {
        location: u32,
        status: u16,
    },
    RegistrationRequest(Registration),
    RegistrationResponse {
        registration: Registration,
        cause: u8,
    },
    RegistrationClearRequest(Registration),
    RegistrationClearResponse {
        registration: Registration,
        cause: u8,
    },
    GroupRegistrationRequest(CallHeader),
    GroupRegistrationResponse {
        call: CallHeader,
        cause: u8,
    },
    /// Unsupported type for the channel and direction, or a supported type whose
    /// fields do not fit the payload.
    Unknown {
        type_code: u8,
        bits: BitBuffer,
    },
}

/// Message type code of a layer 3 payload.
///
/// # Errors
/// If the payload is shorter than the type field.
pub fn message_type(bits: &BitBuffer) -> Result<u8> {
    Ok(bits.int(MESSAGE_TYPE)? as u8)
}

impl Layer3 {
    /// Decode any payload carried on `channel` in `direction`. Never fails: anything
    /// that cannot be decoded is [Layer3::Unknown].
    #[must_use]
    pub fn parse(bits: &BitBuffer, channel: RfChannel, direction: Direction) -> Layer3 {
        let type_code = message_type(bits).unwrap_or(0);
        let control = channel == RfChannel::Rcch;
        let outbound = direction == Direction::Outbound;
        Layer3::decode(type_code, control, outbound, bits).unwrap_or_else(|_| Layer3::Unknown {
            type_code,
            bits: bits.clone(),
        })
    }

    fn decode(type_code: u8, control: bool, outbound: bool, bits: &BitBuffer) -> Result<Layer3> {
        let with_cause = |bits: &BitBuffer| -> Result<(CallHeader, u8)> {
            Ok((CallHeader::decode(bits)?, bits.int(CAUSE)? as u8))
        };
        Ok(match (type_code, control, outbound) {
            (VOICE_CALL, false, _) => Layer3::VoiceCall(CallHeader::decode(bits)?),
            (VOICE_CALL, true, false) => Layer3::VoiceCallRequest(CallHeader::decode(bits)?),
            (VOICE_CALL, true, true) => {
                let (call, cause) = with_cause(bits)?;
                Layer3::VoiceCallResponse { call, cause }
            }
            (VOICE_CALL_ASSIGNMENT, _, true) => Layer3::VoiceCallAssignment {
                call: CallHeader::decode(bits)?,
                call_timer: bits.int(CALL_TIMER)? as u8,
                channel: bits.int(CHANNEL)? as u16,
            },
            (TRANSMISSION_RELEASE, false, _) => {
                Layer3::TransmissionRelease(CallHeader::decode(bits)?)
            }
            (DATA_CALL, false, _) => Layer3::DataCallHeader {
                call: CallHeader::decode(bits)?,
                packets: bits.int(PACKETS)? as u8,
            },
            (DATA_CALL, true, false) => Layer3::DataCallRequest(CallHeader::decode(bits)?),
            (DATA_CALL, true, true) => {
                let (call, cause) = with_cause(bits)?;
                Layer3::DataCallResponse { call, cause }
            }
            (IDLE, _, true) => Layer3::Idle,
            (DISCONNECT, _, true) => {
                let (call, cause) = with_cause(bits)?;
                Layer3::Disconnect { call, cause }
            }
            (DISCONNECT, _, false) => {
                let (call, cause) = with_cause(bits)?;
                Layer3::DisconnectRequest { call, cause }
            }
            (SITE_INFORMATION, _, true) => Layer3::SiteInformation {
                location: bits.int(LOCATION)?,
                service: bits.int(SERVICE)? as u16,
                control_channel: bits.int(CONTROL_CHANNEL)? as u16,
            },
            (SERVICE_INFORMATION, _, true) => Layer3::ServiceInformation {
                location: bits.int(LOCATION)?,
                service: bits.int(SERVICE)? as u16,
                restriction: bits.int(RESTRICTION)?,
            },
            (CONTROL_CHANNEL_INFORMATION, _, true) => Layer3::ControlChannelInformation {
                location: bits.int(LOCATION)?,
                flags: bits.int(CONTROL_FLAGS)? as u8,
                primary: bits.int(CONTROL_CHANNEL_1)? as u16,
                secondary: bits.int(CONTROL_CHANNEL_2)? as u16,
            },
            (ADJACENT_SITE_INFORMATION, _, true) => Layer3::AdjacentSiteInformation {
                sites: adjacent_sites(bits)?,
            },
            (FAILURE_STATUS_INFORMATION, _, true) => Layer3::FailureStatus {
                location: bits.int(LOCATION)?,
                status: bits.int(FAILURE_STATUS)? as u16,
            },
            (REGISTRATION, true, false) => Layer3::RegistrationRequest(Registration::decode(bits)?),
            (REGISTRATION, true, true) => Layer3::RegistrationResponse {
                registration: Registration::decode(bits)?,
                cause: bits.int(REGISTRATION_CAUSE)? as u8,
            },
            (REGISTRATION_CLEAR, true, false) => {
                Layer3::RegistrationClearRequest(Registration::decode(bits)?)
            }
            (REGISTRATION_CLEAR, true, true) => Layer3::RegistrationClearResponse {
                registration: Registration::decode(bits)?,
                cause: bits.int(REGISTRATION_CAUSE)? as u8,
            },
            (GROUP_REGISTRATION, true, false) => {
                Layer3::GroupRegistrationRequest(CallHeader::decode(bits)?)
            }
            (GROUP_REGISTRATION, true, true) => {
                let (call, cause) = with_cause(bits)?;
                Layer3::GroupRegistrationResponse { call, cause }
            }
            _ => Layer3::Unknown {
                type_code,
                bits: bits.clone(),
            },
        })
    }

    #[must_use]
    pub fn type_code(&self) -> u8 {
        match self {
            Layer3::VoiceCall(_)
            | Layer3::VoiceCallRequest(_)
            | Layer3::VoiceCallResponse { .. } => VOICE_CALL,
            Layer3::VoiceCallAssignment { .. } => VOICE_CALL_ASSIGNMENT,
            Layer3::TransmissionRelease(_) => TRANSMISSION_RELEASE,
            Layer3::DataCallHeader { .. }
            | Layer3::DataCallRequest(_)
            | Layer3::DataCallResponse { .. } => DATA_CALL,
            Layer3::Idle => IDLE,
            Layer3::Disconnect { .. } | Layer3::DisconnectRequest { .. } => DISCONNECT,
            Layer3::SiteInformation { .. } => SITE_INFORMATION,
            Layer3::ServiceInformation { .. } => SERVICE_INFORMATION,
            Layer3::ControlChannelInformation { .. } => CONTROL_CHANNEL_INFORMATION,
            Layer3::AdjacentSiteInformation { .. } => ADJACENT_SITE_INFORMATION,
            Layer3::FailureStatus { .. } => FAILURE_STATUS_INFORMATION,
            Layer3::RegistrationRequest(_) | Layer3::RegistrationResponse { .. } => REGISTRATION,
            Layer3::RegistrationClearRequest(_) | Layer3::RegistrationClearResponse { .. } => {
                REGISTRATION_CLEAR
            }
            Layer3::GroupRegistrationRequest(_) | Layer3::GroupRegistrationResponse { .. } => {
                GROUP_REGISTRATION
            }
            Layer3::Unknown { type_code, .. } => *type_code,
        }
    }

    #[must_use]
    pub fn identifiers(&self) -> Vec<Identifier> {
        match self {
            Layer3::VoiceCall(call)
            | Layer3::VoiceCallRequest(call)
            | Layer3::VoiceCallResponse { call, .. }
            | Layer3::TransmissionRelease(call)
            | Layer3::DataCallHeader { call, .. }
            | Layer3::DataCallRequest(call)
            | Layer3::DataCallResponse { call, .. }
            | Layer3::Disconnect { call, .. }
            | Layer3::DisconnectRequest { call, .. }
            | Layer3::GroupRegistrationRequest(call)
            | Layer3::GroupRegistrationResponse { call, .. } => call.identifiers(),
            Layer3::VoiceCallAssignment { call, channel, .. } => {
                let mut ids = call.identifiers();
                ids.push(Identifier::Channel(Channel::new(0, *channel)));
                ids
            }
            Layer3::SiteInformation {
                location,
                control_channel,
                ..
            } => vec![
                Identifier::Location(*location),
                Identifier::Channel(Channel::new(0, *control_channel)),
            ],
            Layer3::ServiceInformation { location, .. }
            | Layer3::FailureStatus { location, .. } => vec![Identifier::Location(*location)],
            Layer3::ControlChannelInformation {
                location,
                primary,
                secondary,
                ..
            } => {
                let mut ids = vec![
                    Identifier::Location(*location),
                    Identifier::Channel(Channel::new(0, *primary)),
                ];
                if *secondary != 0 {
                    ids.push(Identifier::Channel(Channel::new(0, *secondary)));
                }
                ids
            }
            Layer3::AdjacentSiteInformation { sites } => sites
                .iter()
                .flat_map(|site| {
                    [
                        Identifier::Location(site.location),
                        Identifier::Channel(Channel::new(0, site.channel)),
                    ]
                })
                .collect(),
            Layer3::RegistrationRequest(registration)
            | Layer3::RegistrationResponse { registration, .. }
            | Layer3::RegistrationClearRequest(registration)
            | Layer3::RegistrationClearResponse { registration, .. } => {
                registration.identifiers()
            }
            Layer3::Idle | Layer3::Unknown { .. } => Vec::new(),
        }
    }
}
