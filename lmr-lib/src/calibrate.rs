//! One shot selection of the fastest kernel implementations.
//!
//! A [CalibrationManager] is created once at startup and passed to whatever constructs
//! kernels. [CalibrationManager::calibrate] benchmarks every candidate implementation of
//! every kernel on synthetic input and records the winner. Until a kernel is calibrated,
//! [CalibrationManager::implementation] answers [Implementation::Scalar], so results
//! never depend on whether calibration has run.
use std::hint::black_box;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};
use typed_builder::TypedBuilder;

use crate::demod::{magnitude, synthetic_iq, DifferentialDemodulator, Implementation};
use crate::{Error, Result};

/// Kernels with more than one implementation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum KernelType {
    DifferentialDemodulator,
    Magnitude,
}

impl KernelType {
    pub const ALL: [KernelType; 2] = [KernelType::DifferentialDemodulator, KernelType::Magnitude];

    const fn index(self) -> usize {
        match self {
            KernelType::DifferentialDemodulator => 0,
            KernelType::Magnitude => 1,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, TypedBuilder)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CalibrationConfig {
    /// Time each candidate runs before it is measured.
    #[builder(default = 50)]
    pub warmup_ms: u64,
    /// Time each candidate is measured for.
    #[builder(default = 200)]
    pub measurement_ms: u64,
    /// Complex samples per kernel call.
    #[builder(default = 8192)]
    pub input_len: usize,
    /// When false only the scalar implementation is considered.
    #[builder(default = true)]
    pub vector_enabled: bool,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        CalibrationConfig::builder().build()
    }
}

/// Measured throughput of one candidate.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Score {
    pub implementation: Implementation,
    /// Complex samples per second.
    pub samples_per_second: f64,
}

/// Selection recorded for one kernel.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct CalibrationResult {
    pub kernel: KernelType,
    pub implementation: Implementation,
    pub scores: Vec<Score>,
}

#[derive(Debug)]
pub struct CalibrationManager {
    config: CalibrationConfig,
    selections: [OnceLock<CalibrationResult>; 2],
}

impl Default for CalibrationManager {
    fn default() -> Self {
        CalibrationManager::new(CalibrationConfig::default())
    }
}

impl CalibrationManager {
    #[must_use]
    pub fn new(config: CalibrationConfig) -> Self {
        CalibrationManager {
            config,
            selections: [OnceLock::new(), OnceLock::new()],
        }
    }

    #[must_use]
    pub fn config(&self) -> &CalibrationConfig {
        &self.config
    }

    /// Implementations that will be measured, scalar first.
    #[must_use]
    pub fn candidates(&self) -> Vec<Implementation> {
        Implementation::ALL
            .into_iter()
            .filter(|imp| {
                *imp == Implementation::Scalar || (self.config.vector_enabled && imp.is_supported())
            })
            .collect()
    }

    /// Measure every kernel that has no selection yet.
    ///
    /// # Errors
    /// [Error::Calibration] if the configured input is too short to exercise a kernel.
    pub fn calibrate(&self) -> Result<()> {
        if self.config.input_len < 2 {
            return Err(Error::Calibration(format!(
                "input length {} is too short",
                self.config.input_len
            )));
        }
        let input = synthetic_iq(self.config.input_len);
        for kernel in KernelType::ALL {
            let slot = &self.selections[kernel.index()];
            if slot.get().is_some() {
                continue;
            }
            let result = self.measure(kernel, &input);
            info!(
                ?kernel,
                implementation = %result.implementation,
                "calibrated"
            );
            if slot.set(result).is_err() {
                debug!(?kernel, "kept selection made by a concurrent calibration");
            }
        }
        Ok(())
    }

    fn measure(&self, kernel: KernelType, input: &[f32]) -> CalibrationResult {
        let warmup = Duration::from_millis(self.config.warmup_ms);
        let measurement = Duration::from_millis(self.config.measurement_ms);
        let reference = run(kernel, Implementation::Scalar, input);

        let mut scores = Vec::new();
        for implementation in self.candidates() {
            if implementation != Implementation::Scalar
                && !bit_identical(&reference, &run(kernel, implementation, input))
            {
                warn!(?kernel, %implementation, "output differs from scalar; skipping");
                continue;
            }
            let start = Instant::now();
            while start.elapsed() < warmup {
                black_box(run(kernel, implementation, black_box(input)));
            }
            let start = Instant::now();
            let mut iterations = 0u64;
            loop {
                black_box(run(kernel, implementation, black_box(input)));
                iterations += 1;
                if start.elapsed() >= measurement {
                    break;
                }
            }
            let seconds = start.elapsed().as_secs_f64().max(f64::EPSILON);
            let samples_per_second = iterations as f64 * (input.len() / 2) as f64 / seconds;
            debug!(?kernel, %implementation, samples_per_second, "measured");
            scores.push(Score {
                implementation,
                samples_per_second,
            });
        }

        let implementation = scores
            .iter()
            .max_by(|a, b| a.samples_per_second.total_cmp(&b.samples_per_second))
            .map_or(Implementation::Scalar, |s| s.implementation);
        CalibrationResult {
            kernel,
            implementation,
            scores,
        }
    }

    /// Selected implementation, or [Implementation::Scalar] if `kernel` is not
    /// calibrated.
    #[must_use]
    pub fn implementation(&self, kernel: KernelType) -> Implementation {
        self.selections[kernel.index()]
            .get()
            .map_or(Implementation::Scalar, |r| r.implementation)
    }

    /// Forget the selection for `kernel` so the next [CalibrationManager::calibrate]
    /// measures it again.
    pub fn reset(&mut self, kernel: KernelType) {
        self.selections[kernel.index()].take();
    }

    #[must_use]
    pub fn is_calibrated(&self) -> bool {
        self.selections.iter().all(|s| s.get().is_some())
    }

    /// Selections made so far.
    #[must_use]
    pub fn results(&self) -> Vec<CalibrationResult> {
        self.selections
            .iter()
            .filter_map(|s| s.get().cloned())
            .collect()
    }

    /// A demodulator using the selected implementation.
    #[must_use]
    pub fn differential_demodulator(&self) -> DifferentialDemodulator {
        DifferentialDemodulator::new(self.implementation(KernelType::DifferentialDemodulator))
    }
}

fn run(kernel: KernelType, implementation: Implementation, input: &[f32]) -> Vec<f32> {
    let mut out = vec![0f32; input.len() / 2];
    match kernel {
        KernelType::DifferentialDemodulator => {
            DifferentialDemodulator::new(implementation).process(input, &mut out);
        }
        KernelType::Magnitude => {
            magnitude(implementation, input, &mut out);
        }
    }
    out
}

fn bit_identical(a: &[f32], b: &[f32]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.to_bits() == y.to_bits())
}
