use std::{
    fmt,
    io::{self, Read, Write},
    str::FromStr,
};

use anyhow::Result;
use bzip2::{read::BzDecoder, write::BzEncoder};
use flate2::{read::ZlibDecoder, write::ZlibEncoder};
use serde::{Deserialize, Serialize};
use xz2::{read::XzDecoder, write::XzEncoder};

use crate::error::DeepMemoryError;

/// General-purpose lossless compressor applied after serialization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum CompressionStrategy {
    /// Raw MessagePack bytes, no compression.
    None,
    /// zlib-wrapped DEFLATE.
    #[default]
    Deflate,
    /// bzip2.
    Bzip2,
    /// LZMA in the xz container.
    Lzma,
}

impl CompressionStrategy {
    /// Every supported strategy, in tag order.
    pub const ALL: [Self; 4] = [Self::None, Self::Deflate, Self::Bzip2, Self::Lzma];

    /// Canonical lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Deflate => "deflate",
            Self::Bzip2 => "bzip2",
            Self::Lzma => "lzma",
        }
    }

    /// One-byte tag used by the self-describing framing.
    #[must_use]
    pub const fn tag(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Deflate => 1,
            Self::Bzip2 => 2,
            Self::Lzma => 3,
        }
    }

    /// Inverse of [`Self::tag`].
    #[must_use]
    pub const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::None),
            1 => Some(Self::Deflate),
            2 => Some(Self::Bzip2),
            3 => Some(Self::Lzma),
            _ => None,
        }
    }

    /// Compresses `data` at the configured level for this strategy.
    ///
    /// A level outside the compressor's range is rejected before any encoder
    /// is built.
    pub fn compress(
        self,
        data: &[u8],
        levels: &CompressionLevels,
    ) -> Result<Vec<u8>, DeepMemoryError> {
        let level = levels.level_for(self)?;
        let compressed = match self {
            Self::None => Ok(data.to_vec()),
            Self::Deflate => deflate(data, level),
            Self::Bzip2 => bzip(data, level),
            Self::Lzma => xz(data, level),
        };
        compressed.map_err(|err| DeepMemoryError::integrity(format!("{self} compress"), err))
    }

    /// Reverses [`Self::compress`]; malformed input is an integrity error.
    pub fn decompress(self, data: &[u8]) -> Result<Vec<u8>, DeepMemoryError> {
        let mut out = Vec::with_capacity(data.len().saturating_mul(2));
        let read = match self {
            Self::None => {
                out.extend_from_slice(data);
                Ok(data.len())
            }
            Self::Deflate => ZlibDecoder::new(data).read_to_end(&mut out),
            Self::Bzip2 => BzDecoder::new(data).read_to_end(&mut out),
            Self::Lzma => XzDecoder::new(data).read_to_end(&mut out),
        };
        read.map_err(|err| DeepMemoryError::integrity(format!("{self} decompress"), err))?;
        Ok(out)
    }
}

impl fmt::Display for CompressionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompressionStrategy {
    type Err = DeepMemoryError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "none" | "raw" | "msgpack_only" => Ok(Self::None),
            "deflate" | "zlib" => Ok(Self::Deflate),
            "bzip2" | "bz2" | "bzip" => Ok(Self::Bzip2),
            "lzma" | "xz" => Ok(Self::Lzma),
            _ => Err(DeepMemoryError::UnsupportedAlgorithm(raw.to_string())),
        }
    }
}

impl TryFrom<String> for CompressionStrategy {
    type Error = DeepMemoryError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        raw.parse()
    }
}

impl From<CompressionStrategy> for String {
    fn from(strategy: CompressionStrategy) -> Self {
        strategy.as_str().to_string()
    }
}

/// Per-strategy compression levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressionLevels {
    /// zlib level, 0-9.
    #[serde(default = "default_deflate_level")]
    pub deflate: u32,
    /// bzip2 block size, 1-9.
    #[serde(default = "default_bzip2_level")]
    pub bzip2: u32,
    /// xz preset, 0-9.
    #[serde(default = "default_lzma_preset")]
    pub lzma: u32,
}

impl CompressionLevels {
    /// Level configured for `strategy`, checked against what its compressor accepts.
    pub fn level_for(&self, strategy: CompressionStrategy) -> Result<u32, DeepMemoryError> {
        let (level, min, max) = match strategy {
            CompressionStrategy::None => return Ok(0),
            CompressionStrategy::Deflate => (self.deflate, 0, 9),
            CompressionStrategy::Bzip2 => (self.bzip2, 1, 9),
            CompressionStrategy::Lzma => (self.lzma, 0, 9),
        };
        if (min..=max).contains(&level) {
            Ok(level)
        } else {
            Err(DeepMemoryError::InvalidLevel {
                strategy: strategy.to_string(),
                level,
                min,
                max,
            })
        }
    }

    /// Rejects levels the underlying compressors do not accept.
    pub fn validate(&self) -> Result<()> {
        for strategy in CompressionStrategy::ALL {
            self.level_for(strategy)?;
        }
        Ok(())
    }
}

impl Default for CompressionLevels {
    fn default() -> Self {
        Self {
            deflate: default_deflate_level(),
            bzip2: default_bzip2_level(),
            lzma: default_lzma_preset(),
        }
    }
}

const fn default_deflate_level() -> u32 {
    6
}

const fn default_bzip2_level() -> u32 {
    9
}

const fn default_lzma_preset() -> u32 {
    6
}

fn deflate(data: &[u8], level: u32) -> io::Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), flate2::Compression::new(level));
    encoder.write_all(data)?;
    encoder.finish()
}

fn bzip(data: &[u8], level: u32) -> io::Result<Vec<u8>> {
    let mut encoder = BzEncoder::new(Vec::new(), bzip2::Compression::new(level));
    encoder.write_all(data)?;
    encoder.finish()
}

fn xz(data: &[u8], preset: u32) -> io::Result<Vec<u8>> {
    let mut encoder = XzEncoder::new(Vec::new(), preset);
    encoder.write_all(data)?;
    encoder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<u8> {
        b"weather weather weather forecast temperature "
            .iter()
            .copied()
            .cycle()
            .take(4096)
            .collect()
    }

    #[test]
    fn every_strategy_round_trips() {
        let levels = CompressionLevels::default();
        let data = sample();
        for strategy in CompressionStrategy::ALL {
            let packed = strategy.compress(&data, &levels).unwrap();
            assert_eq!(strategy.decompress(&packed).unwrap(), data, "{strategy}");
            if strategy != CompressionStrategy::None {
                assert!(packed.len() < data.len(), "{strategy} did not shrink input");
            }
        }
    }

    #[test]
    fn empty_input_round_trips() {
        let levels = CompressionLevels::default();
        for strategy in CompressionStrategy::ALL {
            let packed = strategy.compress(&[], &levels).unwrap();
            assert!(strategy.decompress(&packed).unwrap().is_empty());
        }
    }

    #[test]
    fn corrupted_input_is_integrity_error() {
        let garbage = b"definitely not a compressed stream";
        for strategy in [
            CompressionStrategy::Deflate,
            CompressionStrategy::Bzip2,
            CompressionStrategy::Lzma,
        ] {
            let err = strategy.decompress(garbage).unwrap_err();
            assert!(err.is_integrity(), "{strategy}: {err}");
            assert!(err.to_string().contains(strategy.as_str()));
        }
    }

    #[test]
    fn parses_names_and_aliases() {
        assert_eq!("zlib".parse::<CompressionStrategy>().unwrap(), CompressionStrategy::Deflate);
        assert_eq!("BZ2".parse::<CompressionStrategy>().unwrap(), CompressionStrategy::Bzip2);
        assert_eq!("msgpack_only".parse::<CompressionStrategy>().unwrap(), CompressionStrategy::None);
        assert_eq!(CompressionStrategy::default(), CompressionStrategy::Deflate);
        let err = "ROT13".parse::<CompressionStrategy>().unwrap_err();
        assert!(matches!(err, DeepMemoryError::UnsupportedAlgorithm(ref name) if name == "ROT13"));
        assert!(err.to_string().contains("ROT13"));
    }

    #[test]
    fn tags_are_stable() {
        for strategy in CompressionStrategy::ALL {
            assert_eq!(CompressionStrategy::from_tag(strategy.tag()), Some(strategy));
        }
        assert_eq!(CompressionStrategy::from_tag(9), None);
    }

    #[test]
    fn level_bounds() {
        assert!(CompressionLevels::default().validate().is_ok());
        let levels = CompressionLevels {
            bzip2: 0,
            ..CompressionLevels::default()
        };
        assert!(levels.validate().is_err());
    }

    #[test]
    fn out_of_range_levels_error_instead_of_panicking() {
        let data = sample();
        let with = |deflate, bzip2, lzma| CompressionLevels {
            deflate,
            bzip2,
            lzma,
        };
        let cases = [
            (CompressionStrategy::Deflate, with(15, 9, 6), 15),
            (CompressionStrategy::Bzip2, with(6, 0, 6), 0),
            (CompressionStrategy::Bzip2, with(6, 10, 6), 10),
            (CompressionStrategy::Lzma, with(6, 9, 12), 12),
        ];
        for (strategy, levels, bad) in cases {
            let err = strategy.compress(&data, &levels).unwrap_err();
            assert!(
                matches!(err, DeepMemoryError::InvalidLevel { level, .. } if level == bad),
                "{strategy}: {err}"
            );
            assert!(err.to_string().contains(strategy.as_str()));
        }
        assert!(CompressionStrategy::None
            .compress(&data, &with(99, 0, 42))
            .is_ok());
    }
}
