#![doc = include_str!("../README.md")]

mod error;

pub mod assembler;
pub mod bits;
pub mod calibrate;
pub mod coding;
pub mod demod;
pub mod dmr;
pub mod fec;
pub mod message;
pub mod nxdn;
pub mod p25;
pub mod pipeline;

pub use error::{Error, Result};
