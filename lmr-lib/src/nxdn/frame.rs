//! Frame decode stages.
//!
//! Decoding moves through [Received] → [Classified] → [Descrambled] → [FecDecoded], each
//! stage consuming the previous one, before the decoded fields are dispatched into
//! messages. [FrameDecoder] runs all stages for one channel and keeps the state that
//! carries over from frame to frame.
use std::sync::LazyLock;

use tracing::{debug, span, trace, Level};

use super::{
    sequence_for, ChannelHint, ChannelTracker, ControlChannel, Direction, Lich, Layer3,
    NxdnMessage, RfChannel, FRAME_BITS, LICH_SEQUENCE, SYNC_BITS,
};
use crate::assembler::{assembled_integrity, join, Assembler};
use crate::bits::{BitBuffer, Field};
use crate::coding::{
    viterbi_decode, Derandomizer, Interleaver, Puncture, CAC_PUNCTURE, FACCH1_PUNCTURE,
    LONG_CAC_PUNCTURE, NO_PUNCTURE, SACCH_PUNCTURE,
};
use crate::fec::{
    Crc, Integrity, IntegrityAlgorithm, ProtectedField, Residual, SyndromeCorrector,
    SyndromeTable, NXDN_CRC12, NXDN_CRC15, NXDN_CRC16, NXDN_CRC6,
};
use crate::message::Decoded;
use crate::{Error, Result};

const STRUCTURE: Field = Field::range(0, 2);
const RAN: Field = Field::range(2, 8);
const SACCH_DATA: (usize, usize) = (8, 26);
const SUPER_FRAME_FRAGMENTS: usize = 4;

const FIELD_OFFSET: usize = 16;
const FACCH1_FIRST_OFFSET: usize = 76;
const FACCH1_SECOND_OFFSET: usize = 220;
const VOICE_FIRST: [(usize, usize); 2] = [(76, 148), (148, 220)];
const VOICE_SECOND: [(usize, usize); 2] = [(220, 292), (292, 364)];

fn crc_corrector(crc: &Crc, data_bits: usize) -> SyndromeCorrector {
    SyndromeCorrector::new(SyndromeTable::from_crc(crc, data_bits), Residual::Null)
}

static CAC_INTERLEAVER: LazyLock<Interleaver> = LazyLock::new(|| Interleaver::new(12, 25));
static INBOUND_CAC_INTERLEAVER: LazyLock<Interleaver> =
    LazyLock::new(|| Interleaver::new(12, 21));
static SACCH_INTERLEAVER: LazyLock<Interleaver> = LazyLock::new(|| Interleaver::new(12, 5));
static FACCH1_INTERLEAVER: LazyLock<Interleaver> = LazyLock::new(|| Interleaver::new(16, 9));
static FACCH2_INTERLEAVER: LazyLock<Interleaver> = LazyLock::new(|| Interleaver::new(12, 29));

static CAC_CRC: LazyLock<SyndromeCorrector> = LazyLock::new(|| crc_corrector(&NXDN_CRC16, 155));
static LONG_CAC_CRC: LazyLock<SyndromeCorrector> =
    LazyLock::new(|| crc_corrector(&NXDN_CRC16, 136));
static SHORT_CAC_CRC: LazyLock<SyndromeCorrector> =
    LazyLock::new(|| crc_corrector(&NXDN_CRC16, 106));
static SACCH_CRC: LazyLock<SyndromeCorrector> = LazyLock::new(|| crc_corrector(&NXDN_CRC6, 26));
static FACCH1_CRC: LazyLock<SyndromeCorrector> =
    LazyLock::new(|| crc_corrector(&NXDN_CRC12, 80));
static FACCH2_CRC: LazyLock<SyndromeCorrector> =
    LazyLock::new(|| crc_corrector(&NXDN_CRC15, 184));

/// How one convolutionally coded signalling field is laid out.
pub(super) struct Layout {
    pub channel: ControlChannel,
    pub interleaver: &'static LazyLock<Interleaver>,
    pub puncture: Puncture,
    pub crc: &'static LazyLock<SyndromeCorrector>,
    /// Data and CRC bits of the decoded payload.
    pub protected: Field,
    /// CRC-6 is only checked; a single bit "correction" is too often wrong.
    pub check_only: bool,
    /// Bits that hold the structure/RAN header followed by layer 3.
    pub layer3: Option<Field>,
    pub has_header: bool,
}

pub(super) static CAC: Layout = Layout {
    channel: ControlChannel::Cac,
    interleaver: &CAC_INTERLEAVER,
    puncture: CAC_PUNCTURE,
    crc: &CAC_CRC,
    protected: Field::range(0, 171),
    check_only: false,
    layer3: Some(Field::range(8, 152)),
    has_header: true,
};

pub(super) static LONG_CAC: Layout = Layout {
    channel: ControlChannel::LongCac,
    interleaver: &INBOUND_CAC_INTERLEAVER,
    puncture: LONG_CAC_PUNCTURE,
    crc: &LONG_CAC_CRC,
    protected: Field::range(0, 152),
    check_only: false,
    layer3: Some(Field::range(8, 136)),
    has_header: true,
};

pub(super) static SHORT_CAC: Layout = Layout {
    channel: ControlChannel::ShortCac,
    interleaver: &INBOUND_CAC_INTERLEAVER,
    puncture: NO_PUNCTURE,
    crc: &SHORT_CAC_CRC,
    protected: Field::range(0, 122),
    check_only: false,
    layer3: Some(Field::range(8, 104)),
    has_header: true,
};

pub(super) static SACCH: Layout = Layout {
    channel: ControlChannel::Sacch,
    interleaver: &SACCH_INTERLEAVER,
    puncture: SACCH_PUNCTURE,
    crc: &SACCH_CRC,
    protected: Field::range(0, 32),
    check_only: true,
    layer3: None,
    has_header: true,
};

pub(super) static FACCH1: Layout = Layout {
    channel: ControlChannel::Facch1,
    interleaver: &FACCH1_INTERLEAVER,
    puncture: FACCH1_PUNCTURE,
    crc: &FACCH1_CRC,
    protected: Field::range(0, 92),
    check_only: false,
    layer3: Some(Field::range(0, 80)),
    has_header: false,
};

pub(super) static FACCH2: Layout = Layout {
    channel: ControlChannel::Facch2,
    interleaver: &FACCH2_INTERLEAVER,
    puncture: CAC_PUNCTURE,
    crc: &FACCH2_CRC,
    protected: Field::range(0, 199),
    check_only: false,
    layer3: Some(Field::range(8, 184)),
    has_header: true,
};

/// Layout for the control channel field of `lich`.
pub(super) fn cac_layout(lich: &Lich) -> &'static Layout {
    if lich.is_outbound() {
        &CAC
    } else if lich.is_long_cac() {
        &LONG_CAC
    } else {
        &SHORT_CAC
    }
}

impl Layout {
    fn corrector(&self) -> ProtectedField {
        let corrector = LazyLock::force(self.crc);
        if self.check_only {
            ProtectedField::check_only(corrector, self.protected)
        } else {
            ProtectedField::new(corrector, self.protected)
        }
    }

    /// Deinterleave, depuncture, Viterbi decode and CRC check the field at `offset`.
    fn decode(&self, body: &BitBuffer, offset: usize) -> Result<(BitBuffer, Integrity)> {
        let tx = self.interleaver.deinterleave(body, offset)?;
        let coded_len = self.puncture.coded_len(tx.len());
        let soft = self.puncture.depuncture(&tx, coded_len)?;
        let mut payload = viterbi_decode(&soft)?;
        let viterbi = if payload.corrected_bits() > 0 {
            Integrity::Corrected
        } else {
            Integrity::Passed
        };
        let crc = self.corrector().perform(&mut payload)?;
        trace!(channel = ?self.channel, ?crc, corrected = payload.corrected_bits(), "decoded field");
        Ok((payload, crc.merge(viterbi)))
    }
}

/// A frame of the expected length, sync word removed.
#[derive(Debug, Clone)]
pub struct Received {
    body: BitBuffer,
}

impl Received {
    /// # Errors
    /// [Error::InvalidLength] unless `frame` is exactly one frame including sync.
    pub fn new(frame: &BitBuffer) -> Result<Self> {
        if frame.len() != FRAME_BITS {
            return Err(Error::InvalidLength {
                expected: FRAME_BITS,
                actual: frame.len(),
            });
        }
        Ok(Received {
            body: frame.sub_range(SYNC_BITS, FRAME_BITS)?,
        })
    }

    /// Descramble and read the LICH, substituting `fallback` when it cannot be resolved.
    ///
    /// # Errors
    /// Structural errors only.
    pub fn classify(mut self, fallback: ChannelHint) -> Result<Classified> {
        LICH_SEQUENCE.derandomize(&mut self.body)?;
        let lich = Lich::decode(&self.body, fallback)?;
        debug!(?lich, "classified frame");
        Ok(Classified {
            body: self.body,
            lich,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Classified {
    body: BitBuffer,
    lich: Lich,
}

impl Classified {
    #[must_use]
    pub fn lich(&self) -> &Lich {
        &self.lich
    }

    /// Remove the scrambling selected by the LICH.
    ///
    /// # Errors
    /// Structural errors only.
    pub fn descramble(mut self) -> Result<Descrambled> {
        sequence_for(&self.lich).derandomize(&mut self.body)?;
        Ok(Descrambled {
            body: self.body,
            lich: self.lich,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Descrambled {
    body: BitBuffer,
    lich: Lich,
}

/// One field of a frame after FEC.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedField {
    Signalling {
        channel: ControlChannel,
        /// Viterbi output including header and CRC.
        payload: BitBuffer,
        integrity: Integrity,
    },
    Voice {
        frames: Vec<BitBuffer>,
    },
}

impl Descrambled {
    #[must_use]
    pub fn lich(&self) -> &Lich {
        &self.lich
    }

    #[must_use]
    pub fn body(&self) -> &BitBuffer {
        &self.body
    }

    /// Run FEC on every field the LICH says the frame carries.
    ///
    /// # Errors
    /// Structural errors only; CRC failures are reported per field.
    pub fn decode_fields(self) -> Result<FecDecoded> {
        let lich = self.lich;
        let body = &self.body;
        let mut fields = Vec::new();

        let signalling = |layout: &Layout, offset: usize| -> Result<DecodedField> {
            let (payload, integrity) = layout.decode(body, offset)?;
            Ok(DecodedField::Signalling {
                channel: layout.channel,
                payload,
                integrity,
            })
        };

        if lich.rf_channel == RfChannel::Rcch {
            fields.push(signalling(cac_layout(&lich), FIELD_OFFSET)?);
        } else if lich.has_sacch() {
            fields.push(signalling(&SACCH, FIELD_OFFSET)?);
            if lich.has_audio() {
                let mut frames = Vec::new();
                if lich.is_voice_first() {
                    for (start, end) in VOICE_FIRST {
                        frames.push(body.sub_range(start, end)?);
                    }
                }
                if lich.is_voice_second() {
                    for (start, end) in VOICE_SECOND {
                        frames.push(body.sub_range(start, end)?);
                    }
                }
                fields.push(DecodedField::Voice { frames });
            }
            if lich.is_facch1_first() {
                fields.push(signalling(&FACCH1, FACCH1_FIRST_OFFSET)?);
            }
            if lich.is_facch1_second() {
                fields.push(signalling(&FACCH1, FACCH1_SECOND_OFFSET)?);
            }
        } else {
            fields.push(signalling(&FACCH2, FIELD_OFFSET)?);
        }
        Ok(FecDecoded { lich, fields })
    }
}

/// All fields of a frame after FEC, each with its own integrity.
#[derive(Debug, Clone)]
pub struct FecDecoded {
    lich: Lich,
    fields: Vec<DecodedField>,
}

impl FecDecoded {
    #[must_use]
    pub fn lich(&self) -> &Lich {
        &self.lich
    }

    #[must_use]
    pub fn fields(&self) -> &[DecodedField] {
        &self.fields
    }

    /// Turn the fields into messages, in frame order. SACCH super frame fragments are
    /// fed to `super_frames` and the assembled layer 3 message follows the fragment that
    /// completed it.
    pub fn dispatch(
        self,
        super_frames: &mut Assembler<Direction>,
        forward_voice_on_failure: bool,
    ) -> Vec<Decoded> {
        let lich = self.lich;
        let mut out = Vec::with_capacity(self.fields.len() + 1);
        let mut ran = 0u8;
        let mut sacch_integrity = Integrity::Passed;

        for field in self.fields {
            match field {
                DecodedField::Signalling {
                    channel: ControlChannel::Sacch,
                    payload,
                    integrity,
                } => {
                    ran = payload.int(RAN).unwrap_or_default() as u8;
                    sacch_integrity = integrity;
                    let structure = payload.int(STRUCTURE).unwrap_or_default() as u8;
                    let mut data = payload
                        .sub_range(SACCH_DATA.0, SACCH_DATA.1)
                        .unwrap_or_default();
                    let corrected = payload.corrected_bits();
                    data.add_corrected(corrected);
                    out.push(Decoded::new(
                        NxdnMessage::SacchFragment {
                            lich,
                            ran,
                            structure,
                            bits: data.clone(),
                        },
                        integrity,
                        corrected,
                    ));
                    if lich.is_sacch_super_frame() && integrity.is_valid() {
                        let number = SUPER_FRAME_FRAGMENTS - usize::from(structure);
                        if let Some(fragments) = super_frames.push(lich.direction, number, data) {
                            let message = Layer3::parse(
                                &join(&fragments),
                                lich.rf_channel,
                                lich.direction,
                            );
                            let (integrity, corrected) = assembled_integrity(&fragments);
                            debug!(?message, ?integrity, "assembled SACCH super frame");
                            out.push(Decoded::new(
                                NxdnMessage::Layer3 {
                                    channel: ControlChannel::SacchSuperFrame,
                                    lich,
                                    ran,
                                    message,
                                },
                                integrity,
                                corrected,
                            ));
                        }
                    }
                }
                DecodedField::Signalling {
                    channel,
                    payload,
                    integrity,
                } => {
                    let layout = match channel {
                        ControlChannel::Facch1 => &FACCH1,
                        ControlChannel::Facch2 => &FACCH2,
                        _ => cac_layout(&lich),
                    };
                    if layout.has_header {
                        ran = payload.int(RAN).unwrap_or_default() as u8;
                    }
                    let l3 = layout
                        .layer3
                        .and_then(|f| payload.gather(&f.to_vec()).ok())
                        .unwrap_or_default();
                    out.push(Decoded::new(
                        NxdnMessage::Layer3 {
                            channel,
                            lich,
                            ran,
                            message: Layer3::parse(&l3, lich.rf_channel, lich.direction),
                        },
                        integrity,
                        payload.corrected_bits(),
                    ));
                }
                DecodedField::Voice { frames } => {
                    if !forward_voice_on_failure && !sacch_integrity.is_valid() {
                        debug!("dropping voice after SACCH failure");
                        continue;
                    }
                    out.push(Decoded::new(
                        NxdnMessage::Audio {
                            lich,
                            ran,
                            frames: frames.iter().map(BitBuffer::to_bytes).collect(),
                        },
                        Integrity::Passed,
                        0,
                    ));
                }
            }
        }
        out
    }
}

/// Decodes the frames of one NXDN channel, in order.
#[derive(Debug, Clone)]
pub struct FrameDecoder {
    tracker: ChannelTracker,
    super_frames: Assembler<Direction>,
    forward_voice_on_failure: bool,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        FrameDecoder::new(true)
    }
}

impl FrameDecoder {
    #[must_use]
    pub fn new(forward_voice_on_failure: bool) -> Self {
        FrameDecoder {
            tracker: ChannelTracker::new(),
            super_frames: Assembler::new(SUPER_FRAME_FRAGMENTS),
            forward_voice_on_failure,
        }
    }

    /// Decode one 384 bit frame. `hint` is used only when the LICH cannot be resolved
    /// and there is no recent history to fall back on.
    ///
    /// # Errors
    /// [Error::InvalidLength] for a frame of the wrong size.
    pub fn decode(&mut self, frame: &BitBuffer, hint: Option<ChannelHint>) -> Result<Vec<Decoded>> {
        let span = span!(Level::TRACE, "nxdn_frame");
        let _guard = span.enter();

        let classified = Received::new(frame)?.classify(self.tracker.fallback(hint))?;
        self.tracker.record(classified.lich());
        let decoded = classified.descramble()?.decode_fields()?;
        Ok(decoded.dispatch(&mut self.super_frames, self.forward_voice_on_failure))
    }

    /// Forget channel history and partial super frames.
    pub fn reset(&mut self) {
        self.tracker.clear();
        self.super_frames.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageBody;
    use crate::nxdn::{FrameEncoder, VOICE_CALL, VOICE_CALL_ASSIGNMENT};

    fn layer3(type_code: u8, len: usize, source: u16, destination: u16) -> BitBuffer {
        let mut bits = BitBuffer::new(len);
        bits.load(Field::range(2, 8), u64::from(type_code)).unwrap();
        bits.load(Field::range(8, 11), 1).unwrap();
        bits.load(Field::range(16, 32), u64::from(source)).unwrap();
        bits.load(Field::range(32, 48), u64::from(destination)).unwrap();
        bits
    }

    fn nxdn(decoded: &Decoded) -> &NxdnMessage {
        match &decoded.body {
            MessageBody::Nxdn(msg) => msg,
            other => panic!("not nxdn: {other:?}"),
        }
    }

    #[test]
    fn outbound_cac_round_trip() {
        let mut l3 = layer3(VOICE_CALL_ASSIGNMENT, 144, 100, 200);
        l3.load(Field::range(62, 72), 321).unwrap();
        let frame = FrameEncoder::new(0x01).unwrap().cac(5, &l3).unwrap().build().unwrap();

        let out = FrameDecoder::default().decode(&frame, None).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].integrity, Integrity::Passed);
        assert_eq!(out[0].corrected_bits, 0);
        let NxdnMessage::Layer3 {
            channel,
            ran,
            message,
            lich,
        } = nxdn(&out[0])
        else {
            panic!("expected layer 3");
        };
        assert_eq!(*channel, ControlChannel::Cac);
        assert_eq!(*ran, 5);
        assert!(lich.is_exact());
        assert!(matches!(
            message,
            Layer3::VoiceCallAssignment { channel: 321, call, .. } if call.source == 100
        ));
    }

    #[test]
    fn channel_bit_errors_are_corrected() {
        let l3 = layer3(VOICE_CALL, 144, 7, 8);
        let clean = FrameEncoder::new(0x01).unwrap().cac(1, &l3).unwrap().build().unwrap();
        let expected = FrameDecoder::default().decode(&clean, None).unwrap();

        let mut noisy = clean.clone();
        for pos in [40, 121, 250, 280] {
            noisy.put(pos, !noisy.get(pos).unwrap()).unwrap();
        }
        let out = FrameDecoder::default().decode(&noisy, None).unwrap();
        assert_eq!(out[0].integrity, Integrity::Corrected);
        assert!(out[0].corrected_bits > 0);
        assert_eq!(out[0].body, expected[0].body);
    }

    #[test]
    fn wrong_frame_length_is_fatal() {
        let err = FrameDecoder::default().decode(&BitBuffer::new(383), None);
        assert!(matches!(
            err,
            Err(Error::InvalidLength {
                expected: 384,
                actual: 383
            })
        ));
    }

    #[test]
    fn inbound_cac_forms() {
        let l3 = layer3(VOICE_CALL, 96, 1, 2);
        for (lich, channel) in [(0x08, ControlChannel::LongCac), (0x18, ControlChannel::ShortCac)] {
            let frame = FrameEncoder::new(lich).unwrap().cac(9, &l3).unwrap().build().unwrap();
            let out = FrameDecoder::default().decode(&frame, None).unwrap();
            assert_eq!(out.len(), 1);
            assert!(out[0].integrity.is_valid());
            assert!(matches!(
                nxdn(&out[0]),
                NxdnMessage::Layer3 { channel: c, ran: 9, message: Layer3::VoiceCallRequest(_), .. } if *c == channel
            ));
        }
    }

    #[test]
    fn voice_frame_with_sacch() {
        let voice: Vec<BitBuffer> = (0..4u8)
            .map(|i| BitBuffer::from_bytes(&[i; 9]))
            .collect();
        let frame = FrameEncoder::new(0x37)
            .unwrap()
            .sacch(0, 12, 0x2_AAAA)
            .unwrap()
            .voice(false, [&voice[0], &voice[1]])
            .unwrap()
            .voice(true, [&voice[2], &voice[3]])
            .unwrap()
            .build()
            .unwrap();

        let out = FrameDecoder::default().decode(&frame, None).unwrap();
        assert_eq!(out.len(), 2);
        assert!(matches!(
            nxdn(&out[0]),
            NxdnMessage::SacchFragment { ran: 12, structure: 0, .. }
        ));
        let NxdnMessage::Audio { frames, ran, .. } = nxdn(&out[1]) else {
            panic!("expected audio");
        };
        assert_eq!(*ran, 12);
        assert_eq!(frames.len(), 4);
        assert_eq!(frames[3], vec![3u8; 9]);
    }

    /// Feed the four SACCH fragments of `l3`, flipping `damage` frame bits in the given
    /// fragment, and collect the assembled layer 3 messages.
    fn super_frame(l3: &BitBuffer, damage: Option<(usize, &[usize])>) -> Vec<Decoded> {
        let mut decoder = FrameDecoder::default();
        let mut assembled = Vec::new();
        for (i, structure) in [3u8, 2, 1, 0].into_iter().enumerate() {
            let payload = l3.int(Field::range(i * 18, i * 18 + 18)).unwrap();
            let mut frame = FrameEncoder::new(0x37)
                .unwrap()
                .sacch(structure, 3, payload)
                .unwrap()
                .build()
                .unwrap();
            if let Some((fragment, positions)) = damage {
                if fragment == i {
                    for pos in positions {
                        frame.flip(*pos).unwrap();
                    }
                }
            }
            assembled.extend(
                decoder
                    .decode(&frame, None)
                    .unwrap()
                    .into_iter()
                    .filter(|d| matches!(nxdn(d), NxdnMessage::Layer3 { .. })),
            );
        }
        assembled
    }

    #[test]
    fn sacch_super_frame_assembly() {
        let l3 = layer3(VOICE_CALL, 72, 0x1234, 0x0042);
        let assembled = super_frame(&l3, None);
        assert_eq!(assembled.len(), 1);
        assert_eq!(assembled[0].integrity, Integrity::Passed);
        assert_eq!(assembled[0].corrected_bits, 0);
        let NxdnMessage::Layer3 {
            channel, message, ..
        } = nxdn(&assembled[0])
        else {
            unreachable!();
        };
        assert_eq!(*channel, ControlChannel::SacchSuperFrame);
        let Layer3::VoiceCall(call) = message else {
            panic!("unexpected {message:?}");
        };
        assert_eq!(call.source, 0x1234);
        assert_eq!(call.destination, 0x0042);
    }

    #[test]
    fn super_frame_keeps_fragment_corrections() {
        let l3 = layer3(VOICE_CALL, 72, 0x1234, 0x0042);
        let clean = super_frame(&l3, None);
        // one channel bit inside the second fragment's SACCH
        let damaged = super_frame(&l3, Some((1, &[SYNC_BITS + FIELD_OFFSET + 30][..])));
        assert_eq!(damaged.len(), 1);
        assert_eq!(damaged[0].integrity, Integrity::Corrected);
        assert!(damaged[0].corrected_bits > 0);
        assert_eq!(damaged[0].body, clean[0].body);
    }

    #[test]
    fn facch1_both_halves_share_sacch_ran() {
        let first = layer3(VOICE_CALL, 80, 1, 2);
        let second = layer3(VOICE_CALL, 80, 3, 4);
        let frame = FrameEncoder::new(0x31)
            .unwrap()
            .sacch(0, 21, 0)
            .unwrap()
            .facch1(false, &first)
            .unwrap()
            .facch1(true, &second)
            .unwrap()
            .build()
            .unwrap();
        let out = FrameDecoder::default().decode(&frame, None).unwrap();
        assert_eq!(out.len(), 3);
        let sources: Vec<u16> = out[1..]
            .iter()
            .map(|d| match nxdn(d) {
                NxdnMessage::Layer3 {
                    channel: ControlChannel::Facch1,
                    ran: 21,
                    message: Layer3::VoiceCall(call),
                    ..
                } => call.source,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(sources, vec![1, 3]);
    }

    #[test]
    fn facch2_frame() {
        let l3 = layer3(VOICE_CALL, 176, 5, 6);
        let frame = FrameEncoder::new(0x29).unwrap().facch2(2, &l3).unwrap().build().unwrap();
        let out = FrameDecoder::default().decode(&frame, None).unwrap();
        assert_eq!(out.len(), 1);
        assert!(matches!(
            nxdn(&out[0]),
            NxdnMessage::Layer3 { channel: ControlChannel::Facch2, ran: 2, .. }
        ));
    }

    #[test]
    fn damaged_lich_uses_recent_history() {
        let mut decoder = FrameDecoder::default();
        let frame = FrameEncoder::new(0x37)
            .unwrap()
            .sacch(0, 4, 0)
            .unwrap()
            .build()
            .unwrap();
        decoder.decode(&frame, None).unwrap();

        let mut damaged = frame.clone();
        // LICH parity bit
        damaged.flip(SYNC_BITS + 14).unwrap();
        let out = decoder
            .decode(&damaged, Some(ChannelHint::new(RfChannel::Rcch, Direction::Inbound)))
            .unwrap();
        let lich = nxdn(&out[0]).lich();
        assert!(!lich.is_exact());
        assert_eq!(lich.rf_channel, RfChannel::Rtch);
        assert!(matches!(
            nxdn(&out[0]),
            NxdnMessage::SacchFragment { ran: 4, .. }
        ));
    }

    #[test]
    fn stages_expose_intermediate_state() {
        let frame = FrameEncoder::new(0x05)
            .unwrap()
            .cac(0, &BitBuffer::new(8))
            .unwrap()
            .build()
            .unwrap();
        let classified = Received::new(&frame)
            .unwrap()
            .classify(ChannelHint::default())
            .unwrap();
        assert_eq!(classified.lich().value, Some(0x05));
        let decoded = classified.descramble().unwrap().decode_fields().unwrap();
        assert_eq!(decoded.fields().len(), 1);
        assert!(matches!(
            decoded.fields()[0],
            DecodedField::Signalling {
                channel: ControlChannel::Cac,
                integrity: Integrity::Passed,
                ..
            }
        ));
    }
}
