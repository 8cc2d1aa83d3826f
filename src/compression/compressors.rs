use serde::Serialize;
use std::str::FromStr;

use crate::error::{Error, Result};

/// A compressor the client offers during the handshake. Each variant requires enabling its
/// feature flag.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[non_exhaustive]
pub enum Compressor {
    /// `zstd` compression. See [the `zstd` manual](http://facebook.github.io/zstd/zstd_manual.html)
    /// for more information.
    #[cfg(feature = "zstd-compression")]
    Zstd {
        /// The compression level to use. It is an error to specify a value outside of the
        /// supported compression levels returned by [zstd::compression_level_range]. If no value
        /// is specified, the default value ([zstd::DEFAULT_COMPRESSION_LEVEL]) will be used.
        /// Higher levels correlate to smaller compression but slower performance.
        level: Option<i32>,
    },
    /// `zlib` compression. See [the `zlib` documentation](https://zlib.net/) for more information.
    #[cfg(feature = "zlib-compression")]
    Zlib {
        /// The compression level to use. If no value is specified, the default value
        /// ([flate2::Compression::default]) will be used. Higher levels correlate to smaller
        /// compression but slower performance.
        level: Option<u32>,
    },
    /// `snappy` compression. See [the `snappy` documentation](http://google.github.io/snappy/)
    /// for more information.
    #[cfg(feature = "snappy-compression")]
    Snappy,
}

impl Compressor {
    pub(crate) fn name(&self) -> &'static str {
        match *self {
            #[cfg(feature = "zstd-compression")]
            Compressor::Zstd { .. } => "zstd",
            #[cfg(feature = "zlib-compression")]
            Compressor::Zlib { .. } => "zlib",
            #[cfg(feature = "snappy-compression")]
            Compressor::Snappy => "snappy",
        }
    }

    pub(crate) fn id(&self) -> u8 {
        match *self {
            #[cfg(feature = "zstd-compression")]
            Self::Zstd { .. } => super::ZSTD_COMPRESSOR_ID,
            #[cfg(feature = "zlib-compression")]
            Self::Zlib { .. } => super::ZLIB_COMPRESSOR_ID,
            #[cfg(feature = "snappy-compression")]
            Self::Snappy => super::SNAPPY_COMPRESSOR_ID,
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        #[cfg(feature = "zstd-compression")]
        if let Self::Zstd { level: Some(level) } = self {
            let valid_levels = zstd::compression_level_range();
            if !valid_levels.contains(level) {
                return Err(Error::invalid_argument(format!(
                    "invalid zstd compression level {level}: must be within {valid_levels:?}"
                )));
            }
        }

        #[cfg(feature = "zlib-compression")]
        if let Self::Zlib { level: Some(level) } = self {
            if *level > 9 {
                return Err(Error::invalid_argument(format!(
                    "invalid zlib compression level {level}: must be between 0 and 9"
                )));
            }
        }

        Ok(())
    }
}

impl FromStr for Compressor {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            #[cfg(feature = "zstd-compression")]
            "zstd" => Ok(Self::Zstd { level: None }),
            #[cfg(feature = "zlib-compression")]
            "zlib" => Ok(Self::Zlib { level: None }),
            #[cfg(feature = "snappy-compression")]
            "snappy" => Ok(Self::Snappy),
            other @ ("zstd" | "zlib" | "snappy") => Err(Error::invalid_argument(format!(
                "enable the {other}-compression feature flag to use {other} compression"
            ))),
            other => Err(Error::invalid_argument(format!(
                "unsupported compressor: {other}"
            ))),
        }
    }
}
