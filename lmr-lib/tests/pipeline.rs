mod common;

use lmr::bits::BitBuffer;
use lmr::dmr::{BurstKind, DmrMessage};
use lmr::fec::Integrity;
use lmr::message::{Identifier, MessageBody, Role};
use lmr::nxdn::{ControlChannel, Layer3, NxdnMessage, VOICE_CALL};
use lmr::p25::{P25Message, Tsbk};
use lmr::pipeline::{
    decode_channels, ChannelPipeline, FrameHint, PipelineConfig, Protocol, RawFrame,
};
use lmr::Error;

use common::{alias_fragments, dmr_alias_burst, flip_random, layer3, nxdn, nxdn_cac, tsbk_grant};

fn pipeline(channel: &str, protocol: Protocol) -> ChannelPipeline {
    ChannelPipeline::new(
        PipelineConfig::builder()
            .channel(channel)
            .protocol(protocol)
            .build(),
    )
}

#[test]
fn nxdn_control_channel_with_bit_errors() {
    let mut frames = Vec::new();
    for (i, source) in [100u16, 101, 102].into_iter().enumerate() {
        let mut bits = nxdn_cac(4, &layer3(VOICE_CALL, 144, source, 900));
        // errors spread over the convolutionally coded CAC body
        flip_random(&mut bits, 40, 340, 3, i as u64);
        frames.push(RawFrame::new(bits, 1_000 + i as u64 * 40));
    }

    let mut pipeline = pipeline("nxdn-cc", Protocol::Nxdn);
    let mut messages = Vec::new();
    for frame in &frames {
        messages.extend(pipeline.decode(frame).unwrap());
    }

    assert_eq!(messages.len(), 3);
    for (message, source) in messages.iter().zip([100, 101, 102]) {
        assert!(message.is_valid(), "{message:?}");
        assert_eq!(message.channel, "nxdn-cc");
        assert!(message.identifiers.contains(&Identifier::radio(source, Role::From)));
        assert!(message.identifiers.contains(&Identifier::Ran(4)));
        assert!(matches!(
            nxdn(message),
            NxdnMessage::Layer3 {
                channel: ControlChannel::Cac,
                message: Layer3::VoiceCallResponse { .. },
                ..
            }
        ));
    }
    assert_eq!(messages[2].timestamp, 1_080);

    let stats = pipeline.stats();
    assert_eq!(stats.frames, 3);
    assert_eq!(stats.messages, 3);
    assert_eq!(stats.failed, 0);
}

#[test]
fn rejected_frame_does_not_stop_the_channel() {
    let mut pipeline = pipeline("nxdn-cc", Protocol::Nxdn);
    let short = RawFrame::new(BitBuffer::new(100), 0);
    assert!(matches!(
        pipeline.decode(&short),
        Err(Error::InvalidLength { actual: 100, .. })
    ));

    let good = RawFrame::new(nxdn_cac(1, &layer3(VOICE_CALL, 144, 5, 6)), 1);
    assert_eq!(pipeline.decode(&good).unwrap().len(), 1);
    assert_eq!(pipeline.stats().rejected, 1);
    assert_eq!(pipeline.stats().frames, 2);
}

#[test]
fn failed_checksum_is_delivered_not_dropped() {
    let mut bits = tsbk_grant(4501, 1_234_567);
    bits.flip(3).unwrap();
    bits.flip(50).unwrap();
    bits.flip(90).unwrap();

    let mut pipeline = pipeline("p25-cc", Protocol::P25Tsbk);
    let messages = pipeline.decode(&RawFrame::new(bits, 0)).unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].integrity, Integrity::Failed);
    assert!(!messages[0].is_valid());
    assert_eq!(pipeline.stats().failed, 1);
}

#[test]
fn p25_grant_identifiers() {
    let mut pipeline = pipeline("p25-cc", Protocol::P25Tsbk);
    let messages = pipeline
        .decode(&RawFrame::new(tsbk_grant(4501, 1_234_567), 10))
        .unwrap();
    let message = &messages[0];
    assert_eq!(message.integrity, Integrity::Passed);
    let MessageBody::P25(P25Message::Tsbk(tsbk)) = &message.body else {
        panic!("expected tsbk: {message:?}");
    };
    assert!(matches!(tsbk.tsbk, Tsbk::GroupVoiceGrant { group: 4501, .. }));
    assert!(message.identifiers.contains(&Identifier::talkgroup(4501, Role::To)));
    assert!(message.identifiers.contains(&Identifier::radio(1_234_567, Role::From)));
}

#[test]
fn dmr_alias_through_pipeline() {
    let fragments = alias_fragments("CAR 54");
    let frames: Vec<RawFrame> = fragments
        .iter()
        .enumerate()
        .map(|(i, f)| RawFrame::new(dmr_alias_burst(0, i + 1, f), i as u64 * 60))
        .collect();

    let mut pipeline = pipeline("dmr-1", Protocol::Dmr);
    let mut messages = Vec::new();
    for frame in &frames {
        messages.extend(pipeline.decode(frame).unwrap());
    }
    // one link control per burst and the alias after the last
    assert_eq!(messages.len(), 5);
    let last = &messages[4];
    assert_eq!(last.timestamp, 180);
    assert!(matches!(
        &last.body,
        MessageBody::Dmr(DmrMessage::TalkerAlias { timeslot: 1, alias }) if alias == "CAR 54"
    ));
    assert!(last.identifiers.contains(&Identifier::Alias("CAR 54".into())));
}

#[test]
fn dmr_hint_selects_voice() {
    // no sync pattern in the burst, so the hint decides
    let frame = RawFrame::new(BitBuffer::new(288), 0).with_hint(FrameHint::Dmr(BurstKind::Voice));
    let mut pipeline = pipeline("dmr-1", Protocol::Dmr);
    let messages = pipeline.decode(&frame).unwrap();
    assert_eq!(messages.len(), 1);
    assert!(matches!(
        &messages[0].body,
        MessageBody::Dmr(DmrMessage::Voice { frames, .. }) if frames.len() == 3
    ));
}

#[test]
fn channels_decode_in_parallel() {
    let nxdn_frames: Vec<RawFrame> = (0..8u16)
        .map(|i| RawFrame::new(nxdn_cac(2, &layer3(VOICE_CALL, 144, i, 77)), u64::from(i)))
        .collect();
    let p25_frames: Vec<RawFrame> = (0..5u32)
        .map(|i| RawFrame::new(tsbk_grant(10, i), u64::from(i)))
        .collect();
    let channels = vec![
        (pipeline("a", Protocol::Nxdn), nxdn_frames.clone()),
        (pipeline("b", Protocol::P25Tsbk), p25_frames),
        (pipeline("c", Protocol::Nxdn), nxdn_frames),
    ];

    let out = decode_channels(channels);
    assert_eq!(out.len(), 3);
    assert_eq!(out[0].len(), 8);
    assert_eq!(out[1].len(), 5);
    assert!(out[0].iter().all(|m| m.channel == "a"));
    assert!(out[1].iter().all(|m| m.channel == "b"));
    // frame order is kept within a channel
    let times: Vec<u64> = out[2].iter().map(|m| m.timestamp).collect();
    assert_eq!(times, (0..8).collect::<Vec<_>>());
    for (a, c) in out[0].iter().zip(&out[2]) {
        assert_eq!(a.body, c.body);
        assert_eq!(a.identifiers, c.identifiers);
    }
}

#[test]
fn stream_delivers_in_order() {
    let mut frames: Vec<RawFrame> = (0..20u16)
        .map(|i| RawFrame::new(nxdn_cac(1, &layer3(VOICE_CALL, 144, i, 1)), u64::from(i)))
        .collect();
    frames.insert(5, RawFrame::new(BitBuffer::new(10), 99));

    let config = PipelineConfig::builder()
        .channel("streamed")
        .buffer_size(2)
        .build();
    let mut stream = ChannelPipeline::new(config).stream(frames).unwrap();

    let mut timestamps = Vec::new();
    let mut errors = 0;
    for item in stream.by_ref() {
        match item {
            Ok(message) => timestamps.push(message.timestamp),
            Err(_) => errors += 1,
        }
    }
    assert_eq!(errors, 1);
    assert_eq!(timestamps, (0..20).collect::<Vec<_>>());

    let stats = stream.finish();
    assert_eq!(stats.frames, 21);
    assert_eq!(stats.rejected, 1);
    assert_eq!(stats.messages, 20);
}
