//! Channel coding transforms applied between the wire and the FEC decoders.
mod convolution;
mod interleaver;
mod puncture;
mod scrambler;

pub use convolution::*;
pub use interleaver::*;
pub use puncture::*;
pub use scrambler::*;
