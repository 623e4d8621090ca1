//! Rate 1/2, constraint length 5 convolutional code with a hard decision Viterbi decoder.
use crate::bits::BitBuffer;
use crate::{Error, Result};

const G1: u8 = 0x19;
const G2: u8 = 0x17;
const STATES: usize = 16;
/// Zero bits appended to flush the encoder back to state 0.
pub const TAIL_BITS: usize = 4;

fn outputs(register: u8) -> (bool, bool) {
    (
        (register & G1).count_ones() & 1 == 1,
        (register & G2).count_ones() & 1 == 1,
    )
}

/// Encode `info` followed by the tail, two coded bits per input bit.
#[must_use]
pub fn conv_encode(info: &BitBuffer) -> BitBuffer {
    let mut register = 0u8;
    let mut coded = Vec::with_capacity(2 * (info.len() + TAIL_BITS));
    for bit in info.iter().chain(std::iter::repeat(false).take(TAIL_BITS)) {
        register = ((register << 1) | u8::from(bit)) & 0x1F;
        let (a, b) = outputs(register);
        coded.push(a);
        coded.push(b);
    }
    BitBuffer::from_bits(&coded)
}

/// Most likely information bits for `coded`, which includes the tail.
///
/// Erased positions (`None`) add nothing to any path metric. The returned buffer excludes
/// the tail and its corrected-bit count is the metric of the surviving path, i.e., the
/// number of received bits that disagree with the decoded sequence.
///
/// # Errors
/// [Error::InvalidLength] if `coded` is odd or too short to hold the tail.
pub fn viterbi_decode(coded: &[Option<bool>]) -> Result<BitBuffer> {
    if coded.len() % 2 != 0 || coded.len() < 2 * TAIL_BITS {
        return Err(Error::InvalidLength {
            expected: coded.len().max(2 * TAIL_BITS).next_multiple_of(2),
            actual: coded.len(),
        });
    }
    let steps = coded.len() / 2;
    let mut metrics = [u32::MAX; STATES];
    metrics[0] = 0;
    let mut history: Vec<[u8; STATES]> = Vec::with_capacity(steps);

    for pair in coded.chunks_exact(2) {
        let mut next = [u32::MAX; STATES];
        let mut from = [0u8; STATES];
        for (state, metric) in metrics.iter().enumerate() {
            if *metric == u32::MAX {
                continue;
            }
            for bit in 0..2u8 {
                let register = (((state as u8) << 1) | bit) & 0x1F;
                let (a, b) = outputs(register);
                let cost = branch_cost(pair[0], a) + branch_cost(pair[1], b);
                let target = (register & 0x0F) as usize;
                let candidate = metric + cost;
                if candidate < next[target] {
                    next[target] = candidate;
                    from[target] = state as u8;
                }
            }
        }
        metrics = next;
        history.push(from);
    }

    let mut bits = vec![false; steps];
    let mut state = 0usize;
    for (t, from) in history.iter().enumerate().rev() {
        bits[t] = state & 1 == 1;
        state = from[state] as usize;
    }
    let mut out = BitBuffer::from_bits(&bits[..steps - TAIL_BITS]);
    out.add_corrected(metrics[0]);
    Ok(out)
}

fn branch_cost(received: Option<bool>, expected: bool) -> u32 {
    match received {
        Some(bit) => u32::from(bit != expected),
        None => 0,
    }
}

/// Decode hard bits with no erasures.
///
/// # Errors
/// See [viterbi_decode].
pub fn viterbi_decode_bits(coded: &BitBuffer) -> Result<BitBuffer> {
    let soft: Vec<Option<bool>> = coded.iter().map(Some).collect();
    viterbi_decode(&soft)
}
