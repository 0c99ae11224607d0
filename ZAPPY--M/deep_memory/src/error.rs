use std::error::Error as StdError;

use thiserror::Error;

/// Boxed low-level failure carried inside [`DeepMemoryError::Integrity`].
pub type IntegritySource = Box<dyn StdError + Send + Sync + 'static>;

/// Errors emitted by the codec, the strategy selector, and the engine.
#[derive(Debug, Error)]
pub enum DeepMemoryError {
    /// Input was neither a structured record nor a plain map.
    #[error("invalid input type: expected a structured record or a plain map, got {0}")]
    InvalidInputType(String),
    /// A record failed validation or could not be rebuilt from a map.
    #[error("invalid record: {0}")]
    InvalidRecord(String),
    /// The requested compression strategy is not one of the supported ones.
    #[error("unsupported compression algorithm: {0}")]
    UnsupportedAlgorithm(String),
    /// A configured compression level is outside the compressor's range.
    #[error("{strategy} level {level} is outside {min}-{max}")]
    InvalidLevel {
        /// Strategy the level was configured for.
        strategy: String,
        /// Rejected level.
        level: u32,
        /// Lowest accepted level.
        min: u32,
        /// Highest accepted level.
        max: u32,
    },
    /// A tagged payload carried a tag byte no strategy claims.
    #[error("unknown strategy tag: {0:#04x}")]
    UnknownStrategyTag(u8),
    /// Compressed or encoded bytes could not be turned back into a map.
    #[error("integrity error during {context}: {source}")]
    Integrity {
        /// Stage that failed, e.g. `lzma decompress`.
        context: String,
        /// Underlying codec or compressor error, untouched.
        #[source]
        source: IntegritySource,
    },
    /// MessagePack encoding failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] rmp_serde::encode::Error),
}

impl DeepMemoryError {
    /// Wraps a low-level failure as an integrity error.
    pub fn integrity(context: impl Into<String>, source: impl Into<IntegritySource>) -> Self {
        Self::Integrity {
            context: context.into(),
            source: source.into(),
        }
    }

    /// Returns true for [`DeepMemoryError::Integrity`].
    #[must_use]
    pub const fn is_integrity(&self) -> bool {
        matches!(self, Self::Integrity { .. })
    }
}
