//! Sample level kernels feeding the bit decoders.
//!
//! Each kernel has a scalar implementation and chunked implementations that process a
//! fixed number of lanes per step so the compiler can keep a whole chunk in one vector
//! register. All implementations perform the same floating point operations in the same
//! order and so produce bit identical output.
pub mod dqpsk;

use std::fmt;

/// Interchangeable implementations of a kernel, by vector register width.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Implementation {
    Scalar,
    Vector64,
    Vector128,
    Vector256,
    Vector512,
}

impl Implementation {
    pub const ALL: [Implementation; 5] = [
        Implementation::Scalar,
        Implementation::Vector64,
        Implementation::Vector128,
        Implementation::Vector256,
        Implementation::Vector512,
    ];

    /// `f32` values per step.
    #[must_use]
    pub const fn lanes(self) -> usize {
        match self {
            Implementation::Scalar => 1,
            Implementation::Vector64 => 2,
            Implementation::Vector128 => 4,
            Implementation::Vector256 => 8,
            Implementation::Vector512 => 16,
        }
    }

    /// Whether the running CPU has registers of this width.
    #[must_use]
    pub fn is_supported(self) -> bool {
        match self {
            Implementation::Scalar | Implementation::Vector64 => true,
            Implementation::Vector128 => cfg!(any(target_arch = "x86_64", target_arch = "aarch64")),
            Implementation::Vector256 => avx2(),
            Implementation::Vector512 => avx512(),
        }
    }
}

impl fmt::Display for Implementation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Implementation::Scalar => write!(f, "scalar"),
            _ => write!(f, "vector{}", self.lanes() * 32),
        }
    }
}

#[cfg(target_arch = "x86_64")]
fn avx2() -> bool {
    is_x86_feature_detected!("avx2")
}

#[cfg(not(target_arch = "x86_64"))]
fn avx2() -> bool {
    false
}

#[cfg(target_arch = "x86_64")]
fn avx512() -> bool {
    is_x86_feature_detected!("avx512f")
}

#[cfg(not(target_arch = "x86_64"))]
fn avx512() -> bool {
    false
}

#[inline]
fn differential(prev: (f32, f32), cur: (f32, f32)) -> f32 {
    // cur * conj(prev)
    let re = cur.0 * prev.0 + cur.1 * prev.1;
    let im = cur.1 * prev.0 - cur.0 * prev.1;
    im.atan2(re)
}

fn differential_scalar(mut prev: (f32, f32), iq: &[f32], out: &mut [f32]) -> (f32, f32) {
    for (pair, phase) in iq.chunks_exact(2).zip(out.iter_mut()) {
        let cur = (pair[0], pair[1]);
        *phase = differential(prev, cur);
        prev = cur;
    }
    prev
}

fn differential_lanes<const LANES: usize>(
    mut prev: (f32, f32),
    iq: &[f32],
    out: &mut [f32],
) -> (f32, f32) {
    let samples = out.len().min(iq.len() / 2);
    let whole = samples / LANES * LANES;
    for (chunk, phases) in iq[..whole * 2]
        .chunks_exact(LANES * 2)
        .zip(out[..whole].chunks_exact_mut(LANES))
    {
        let mut cur_i = [0f32; LANES];
        let mut cur_q = [0f32; LANES];
        let mut prev_i = [0f32; LANES];
        let mut prev_q = [0f32; LANES];
        for lane in 0..LANES {
            cur_i[lane] = chunk[lane * 2];
            cur_q[lane] = chunk[lane * 2 + 1];
        }
        prev_i[0] = prev.0;
        prev_q[0] = prev.1;
        prev_i[1..].copy_from_slice(&cur_i[..LANES - 1]);
        prev_q[1..].copy_from_slice(&cur_q[..LANES - 1]);

        let mut re = [0f32; LANES];
        let mut im = [0f32; LANES];
        for lane in 0..LANES {
            re[lane] = cur_i[lane] * prev_i[lane] + cur_q[lane] * prev_q[lane];
            im[lane] = cur_q[lane] * prev_i[lane] - cur_i[lane] * prev_q[lane];
        }
        for lane in 0..LANES {
            phases[lane] = im[lane].atan2(re[lane]);
        }
        prev = (cur_i[LANES - 1], cur_q[LANES - 1]);
    }
    differential_scalar(prev, &iq[whole * 2..samples * 2], &mut out[whole..samples])
}

/// Phase difference between consecutive complex samples.
///
/// Input is interleaved I/Q. Output sample `n` is the phase of `s[n] * conj(s[n-1])`, with
/// the last sample of the previous call standing in for `s[-1]`.
#[derive(Clone, Debug)]
pub struct DifferentialDemodulator {
    implementation: Implementation,
    prev: (f32, f32),
}

impl DifferentialDemodulator {
    #[must_use]
    pub fn new(implementation: Implementation) -> Self {
        DifferentialDemodulator {
            implementation,
            prev: (1.0, 0.0),
        }
    }

    #[must_use]
    pub fn implementation(&self) -> Implementation {
        self.implementation
    }

    /// Demodulate `iq`, writing one phase per complex sample into `out`. Returns the
    /// number of phases written, the smaller of the samples available and `out.len()`.
    pub fn process(&mut self, iq: &[f32], out: &mut [f32]) -> usize {
        let samples = out.len().min(iq.len() / 2);
        let (iq, out) = (&iq[..samples * 2], &mut out[..samples]);
        self.prev = match self.implementation {
            Implementation::Scalar => differential_scalar(self.prev, iq, out),
            Implementation::Vector64 => differential_lanes::<2>(self.prev, iq, out),
            Implementation::Vector128 => differential_lanes::<4>(self.prev, iq, out),
            Implementation::Vector256 => differential_lanes::<8>(self.prev, iq, out),
            Implementation::Vector512 => differential_lanes::<16>(self.prev, iq, out),
        };
        samples
    }

    pub fn reset(&mut self) {
        self.prev = (1.0, 0.0);
    }
}

fn magnitude_scalar(iq: &[f32], out: &mut [f32]) {
    for (pair, m) in iq.chunks_exact(2).zip(out.iter_mut()) {
        *m = (pair[0] * pair[0] + pair[1] * pair[1]).sqrt();
    }
}

fn magnitude_lanes<const LANES: usize>(iq: &[f32], out: &mut [f32]) {
    let whole = out.len() / LANES * LANES;
    for (chunk, mags) in iq[..whole * 2]
        .chunks_exact(LANES * 2)
        .zip(out[..whole].chunks_exact_mut(LANES))
    {
        let mut power = [0f32; LANES];
        for lane in 0..LANES {
            let (i, q) = (chunk[lane * 2], chunk[lane * 2 + 1]);
            power[lane] = i * i + q * q;
        }
        for lane in 0..LANES {
            mags[lane] = power[lane].sqrt();
        }
    }
    magnitude_scalar(&iq[whole * 2..], &mut out[whole..]);
}

/// Magnitude of each interleaved I/Q sample. Returns the number of values written.
pub fn magnitude(implementation: Implementation, iq: &[f32], out: &mut [f32]) -> usize {
    let samples = out.len().min(iq.len() / 2);
    let (iq, out) = (&iq[..samples * 2], &mut out[..samples]);
    match implementation {
        Implementation::Scalar => magnitude_scalar(iq, out),
        Implementation::Vector64 => magnitude_lanes::<2>(iq, out),
        Implementation::Vector128 => magnitude_lanes::<4>(iq, out),
        Implementation::Vector256 => magnitude_lanes::<8>(iq, out),
        Implementation::Vector512 => magnitude_lanes::<16>(iq, out),
    }
    samples
}

/// Deterministic pi/4 DQPSK samples with a slow amplitude ripple, for benchmarks and
/// calibration.
#[must_use]
pub fn synthetic_iq(samples: usize) -> Vec<f32> {
    let mut phase = 0f32;
    let mut state = 0x2545_F491u32;
    let mut iq = Vec::with_capacity(samples * 2);
    for n in 0..samples {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        let symbol = (state & 3) as f32;
        phase += std::f32::consts::FRAC_PI_4 * (2.0 * symbol + 1.0);
        let amplitude = 1.0 + 0.1 * (n as f32 * 0.01).sin();
        iq.push(amplitude * phase.cos());
        iq.push(amplitude * phase.sin());
    }
    iq
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn bits(values: &[f32]) -> Vec<u32> {
        values.iter().map(|v| v.to_bits()).collect()
    }

    #[test_case(Implementation::Vector64)]
    #[test_case(Implementation::Vector128)]
    #[test_case(Implementation::Vector256)]
    #[test_case(Implementation::Vector512)]
    fn differential_matches_scalar(implementation: Implementation) {
        // odd length leaves a scalar tail in every lane width
        let iq = synthetic_iq(1001);
        let mut expected = vec![0f32; 1001];
        let mut actual = vec![0f32; 1001];
        let mut scalar = DifferentialDemodulator::new(Implementation::Scalar);
        let mut vector = DifferentialDemodulator::new(implementation);
        // two calls to carry state across the boundary
        scalar.process(&iq[..600], &mut expected[..300]);
        scalar.process(&iq[600..], &mut expected[300..]);
        vector.process(&iq[..600], &mut actual[..300]);
        vector.process(&iq[600..], &mut actual[300..]);
        assert_eq!(bits(&expected), bits(&actual));
    }

    #[test_case(Implementation::Vector128)]
    #[test_case(Implementation::Vector512)]
    fn magnitude_matches_scalar(implementation: Implementation) {
        let iq = synthetic_iq(77);
        let mut expected = vec![0f32; 77];
        let mut actual = vec![0f32; 77];
        magnitude(Implementation::Scalar, &iq, &mut expected);
        magnitude(implementation, &iq, &mut actual);
        assert_eq!(bits(&expected), bits(&actual));
    }

    #[test]
    fn recovers_phase_steps() {
        let step = 3.0 * std::f32::consts::FRAC_PI_4;
        let iq: Vec<f32> = (0..8)
            .flat_map(|n| {
                let p = step * n as f32;
                [p.cos(), p.sin()]
            })
            .collect();
        let mut out = vec![0f32; 8];
        assert_eq!(DifferentialDemodulator::new(Implementation::Scalar).process(&iq, &mut out), 8);
        for phase in &out[1..] {
            assert!((phase - step).abs() < 1e-4, "{phase}");
        }
    }

    #[test]
    fn display_names() {
        assert_eq!(Implementation::Scalar.to_string(), "scalar");
        assert_eq!(Implementation::Vector256.to_string(), "vector256");
    }
}
