//! pi/4 DQPSK symbol decisions.
use std::f32::consts::FRAC_PI_2;

/// Map a phase change to its dibit: +pi/4 is 0b00, +3pi/4 0b01, -pi/4 0b10 and -3pi/4
/// 0b11.
#[must_use]
pub fn dibit(phase: f32) -> u8 {
    match (phase >= 0.0, phase.abs() < FRAC_PI_2) {
        (true, true) => 0b00,
        (true, false) => 0b01,
        (false, true) => 0b10,
        (false, false) => 0b11,
    }
}

/// Decide every phase in `phases`.
#[must_use]
pub fn slice(phases: &[f32]) -> Vec<u8> {
    phases.iter().map(|p| dibit(*p)).collect()
}

/// Unpack dibits into bits, most significant first.
#[must_use]
pub fn to_bits(dibits: &[u8]) -> Vec<bool> {
    dibits
        .iter()
        .flat_map(|d| [d & 0b10 != 0, d & 0b01 != 0])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_4;

    #[test]
    fn constellation() {
        assert_eq!(
            slice(&[FRAC_PI_4, 3.0 * FRAC_PI_4, -FRAC_PI_4, -3.0 * FRAC_PI_4]),
            vec![0, 1, 2, 3]
        );
        assert_eq!(to_bits(&[0b01, 0b10]), vec![false, true, true, false]);
    }
}
