//! Reassembly of messages carried in several numbered fragments.
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

use tracing::{debug, trace};

use crate::bits::BitBuffer;
use crate::fec::Integrity;

/// Collects fragments `1..=N` per key, e.g., per timeslot or per direction.
///
/// Fragment 1 always starts a new sequence, discarding whatever was pending for that key.
/// Other fragments are only accepted while a sequence is pending, so fragments that
/// arrive before any fragment 1 are dropped.
#[derive(Debug, Clone)]
pub struct Assembler<K> {
    fragments: usize,
    pending: HashMap<K, Vec<Option<BitBuffer>>>,
}

impl<K> Assembler<K>
where
    K: Eq + Hash + Copy + Debug,
{
    #[must_use]
    pub fn new(fragments: usize) -> Self {
        Assembler {
            fragments,
            pending: HashMap::new(),
        }
    }

    /// Number of fragments in a complete sequence.
    #[must_use]
    pub fn fragments(&self) -> usize {
        self.fragments
    }

    /// Add fragment `number` (1-based) for `key`. Returns the fragments in order once all
    /// of them have arrived, clearing the sequence.
    pub fn push(&mut self, key: K, number: usize, bits: BitBuffer) -> Option<Vec<BitBuffer>> {
        if number == 0 || number > self.fragments {
            debug!(?key, number, "fragment number out of range");
            return None;
        }
        if number == 1 {
            if self.pending.contains_key(&key) {
                trace!(?key, "restarting incomplete sequence");
            }
            let mut slots = vec![None; self.fragments];
            slots[0] = Some(bits);
            self.pending.insert(key, slots);
        } else {
            let Some(slots) = self.pending.get_mut(&key) else {
                trace!(?key, number, "no sequence started; dropping fragment");
                return None;
            };
            slots[number - 1] = Some(bits);
        }

        let complete = self
            .pending
            .get(&key)
            .is_some_and(|slots| slots.iter().all(Option::is_some));
        if !complete {
            return None;
        }
        self.pending
            .remove(&key)
            .map(|slots| slots.into_iter().flatten().collect())
    }

    /// Number of fragments received for the pending sequence of `key`.
    #[must_use]
    pub fn received(&self, key: &K) -> usize {
        self.pending
            .get(key)
            .map_or(0, |slots| slots.iter().filter(|s| s.is_some()).count())
    }

    /// Drop the pending sequence for `key`.
    pub fn reset(&mut self, key: &K) {
        self.pending.remove(key);
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

/// Concatenate fragments into one buffer.
#[must_use]
pub fn join(fragments: &[BitBuffer]) -> BitBuffer {
    let bits: Vec<bool> = fragments.iter().flat_map(BitBuffer::iter).collect();
    BitBuffer::from_bits(&bits)
}

/// Integrity and corrected bit count of a message assembled from fragments that each
/// passed their own check. Corrections made to any fragment carry over.
#[must_use]
pub fn assembled_integrity(fragments: &[BitBuffer]) -> (Integrity, u32) {
    let corrected: u32 = fragments.iter().map(BitBuffer::corrected_bits).sum();
    let integrity = if corrected > 0 {
        Integrity::Corrected
    } else {
        Integrity::Passed
    };
    (integrity, corrected)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frag(s: &str) -> BitBuffer {
        s.parse().unwrap()
    }

    #[test]
    fn in_order_sequence_completes() {
        let mut asm = Assembler::new(3);
        assert!(asm.push(0u8, 1, frag("10")).is_none());
        assert!(asm.push(0u8, 2, frag("01")).is_none());
        let done = asm.push(0u8, 3, frag("11")).unwrap();
        assert_eq!(join(&done), frag("100111"));
        assert_eq!(asm.received(&0), 0);
    }

    #[test]
    fn fragments_before_start_are_dropped() {
        let mut asm = Assembler::new(2);
        assert!(asm.push(1u8, 2, frag("1")).is_none());
        assert_eq!(asm.received(&1), 0);
    }

    #[test]
    fn restart_discards_partial() {
        let mut asm = Assembler::new(3);
        asm.push('a', 1, frag("000"));
        asm.push('a', 2, frag("000"));
        asm.push('a', 1, frag("111"));
        assert_eq!(asm.received(&'a'), 1);
        assert!(asm.push('a', 3, frag("101")).is_none());
        let done = asm.push('a', 2, frag("010")).unwrap();
        assert_eq!(join(&done), frag("111010101"));
    }

    #[test]
    fn keys_are_independent() {
        let mut asm = Assembler::new(2);
        asm.push(1u8, 1, frag("1"));
        asm.push(2u8, 1, frag("0"));
        assert_eq!(join(&asm.push(2u8, 2, frag("0")).unwrap()), frag("00"));
        assert_eq!(asm.received(&1), 1);
    }

    #[test]
    fn out_of_range_number() {
        let mut asm = Assembler::new(2);
        assert!(asm.push(0u8, 0, frag("1")).is_none());
        assert!(asm.push(0u8, 3, frag("1")).is_none());
    }

    #[test]
    fn assembled_integrity_sums_corrections() {
        let clean = [frag("10"), frag("01")];
        assert_eq!(assembled_integrity(&clean), (Integrity::Passed, 0));

        let mut fixed = frag("11");
        fixed.add_corrected(2);
        assert_eq!(
            assembled_integrity(&[frag("10"), fixed]),
            (Integrity::Corrected, 2)
        );
    }
}
