#![allow(dead_code)]

use lmr::bits::{BitBuffer, Field};
use lmr::dmr::{self, link_control, Cach, LcBurst, DATA_TYPE_TERMINATOR};
use lmr::message::{Message, MessageBody};
use lmr::nxdn::{FrameEncoder, NxdnMessage};
use lmr::p25::TsbkMessage;
use rand::{rngs::StdRng, seq::index::sample, SeedableRng};

/// Layer 3 voice call payload of `len` bits.
pub fn layer3(type_code: u8, len: usize, source: u16, destination: u16) -> BitBuffer {
    let mut bits = BitBuffer::new(len);
    bits.load(Field::range(2, 8), u64::from(type_code)).unwrap();
    bits.load(Field::range(16, 32), u64::from(source)).unwrap();
    bits.load(Field::range(32, 48), u64::from(destination)).unwrap();
    bits
}

/// Outbound NXDN CAC frame.
pub fn nxdn_cac(ran: u8, layer3: &BitBuffer) -> BitBuffer {
    FrameEncoder::new(0x01)
        .unwrap()
        .cac(ran, layer3)
        .unwrap()
        .build()
        .unwrap()
}

/// Flip `count` distinct bits of `bits` within `start..end`, chosen by `seed`.
pub fn flip_random(bits: &mut BitBuffer, start: usize, end: usize, count: usize, seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    for offset in sample(&mut rng, end - start, count) {
        bits.flip(start + offset).unwrap();
    }
}

/// 7 bit talker alias header and text, split into the four 56 bit fragments.
pub fn alias_fragments(text: &str) -> Vec<BitBuffer> {
    let mut alias = BitBuffer::new(224);
    alias.load(Field::range(2, 7), text.len() as u64).unwrap();
    for (i, c) in text.bytes().enumerate() {
        alias
            .load(Field::bits(7 + i * 7, 7), u64::from(c))
            .unwrap();
    }
    (0..4)
        .map(|i| alias.sub_range(i * 56, i * 56 + 56).unwrap())
        .collect()
}

/// DMR terminator burst on `timeslot` (0 or 1 on air) carrying `lc`.
pub fn dmr_lc_burst(timeslot: u8, color_code: u8, lc: &BitBuffer) -> BitBuffer {
    let cach = Cach::encode(false, timeslot, 0, &BitBuffer::new(17)).unwrap();
    let data = link_control::encode(lc, LcBurst::Terminator).unwrap();
    dmr::build_data_burst(&cach, color_code, DATA_TYPE_TERMINATOR, &data).unwrap()
}

/// Terminator burst carrying talker alias fragment `number` (1 to 4).
pub fn dmr_alias_burst(timeslot: u8, number: usize, fragment: &BitBuffer) -> BitBuffer {
    let mut lc = BitBuffer::new(link_control::LC_BITS);
    lc.load(Field::range(2, 8), 3 + number as u64).unwrap();
    lc.copy_from(16, fragment).unwrap();
    dmr_lc_burst(timeslot, 1, &lc)
}

/// Standard group voice channel grant TSBK.
pub fn tsbk_grant(group: u16, source: u32) -> BitBuffer {
    let mut data = BitBuffer::new(80);
    data.set(0).unwrap();
    data.load(Field::range(24, 28), 1).unwrap();
    data.load(Field::range(28, 40), 0x0A0).unwrap();
    data.load(Field::range(40, 56), u64::from(group)).unwrap();
    data.load(Field::range(56, 80), u64::from(source)).unwrap();
    TsbkMessage::encode(&data).unwrap()
}

pub fn nxdn(message: &Message) -> &NxdnMessage {
    match &message.body {
        MessageBody::Nxdn(msg) => msg,
        other => panic!("not nxdn: {other:?}"),
    }
}
