#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("bit index {index} out of range for buffer of {len} bits")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("field width {width} exceeds the {max} bits available")]
    FieldTooWide { width: usize, max: usize },

    #[error("mask of {mask} bits is longer than the {len} bit buffer")]
    MaskTooLong { mask: usize, len: usize },

    #[error("expected {expected} bits, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("symbol {symbol:#x} is outside the field, max {max:#x}")]
    SymbolOutOfRange { symbol: u8, max: usize },

    #[error("invalid bit character {0:?}")]
    InvalidBitCharacter(char),

    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    /// A classifier value that cannot be mapped to a frame shape even with fallbacks.
    #[error("unsupported classifier value {0:#x}")]
    UnsupportedClassifier(u32),

    #[error("calibration failed: {0}")]
    Calibration(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[cfg(feature = "serde")]
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
