//! Forward error correction.
//!
//! Checksums and block codes applied to fields of a [BitBuffer]. Every algorithm reports
//! an [Integrity] rather than an error when the data cannot be corrected; errors are
//! reserved for structural problems such as positions outside the buffer.
mod crc;
mod galois;
mod golay;
mod reed_solomon;
mod syndrome;

pub use crc::*;
pub use galois::*;
pub use golay::*;
pub use reed_solomon::*;
pub use syndrome::*;

use crate::bits::BitBuffer;
use crate::Result;

/// Outcome of checking, and possibly correcting, one protected field.
///
/// Ordered from best to worst so the worst of several outcomes is their maximum.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Integrity {
    /// Checksum verified, no correction needed.
    Passed,
    /// Errors were found and corrected.
    Corrected,
    /// Errors were found that could not be corrected. The payload is still available
    /// but should not be trusted.
    Failed,
}

impl Integrity {
    /// Payload can be trusted.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !matches!(self, Integrity::Failed)
    }

    /// The worse of the two outcomes.
    #[must_use]
    pub fn merge(self, other: Integrity) -> Integrity {
        self.max(other)
    }
}

pub trait IntegrityAlgorithm: Send + Sync {
    /// Check, and where the algorithm supports it correct, `buf` in place.
    ///
    /// # Errors
    /// Only for structural problems, e.g., the protected field does not fit in `buf`.
    fn perform(&self, buf: &mut BitBuffer) -> Result<Integrity>;
}
