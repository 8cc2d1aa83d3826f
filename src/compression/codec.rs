//! The byte-level work behind OP_COMPRESSED. Every codec sits behind its own feature flag; with
//! none enabled only the noop id can be read.

use super::{Compressor, NOOP_COMPRESSOR_ID};
use crate::error::{Error, Result};

impl Compressor {
    /// Compresses the concatenation of `parts`.
    // With no codec enabled the enum has no variants and this body cannot run.
    #[cfg_attr(
        not(any(
            feature = "zstd-compression",
            feature = "zlib-compression",
            feature = "snappy-compression"
        )),
        allow(unreachable_code, unused_variables)
    )]
    pub(crate) fn compress(&self, parts: &[&[u8]]) -> Result<Vec<u8>> {
        let encoded: std::io::Result<Vec<u8>> = match *self {
            #[cfg(feature = "zstd-compression")]
            Self::Zstd { level } => zstd_encode(level, parts),
            #[cfg(feature = "zlib-compression")]
            Self::Zlib { level } => zlib_encode(level, parts),
            #[cfg(feature = "snappy-compression")]
            Self::Snappy => snappy_encode(parts),
        };
        encoded.map_err(|error| {
            Error::internal(format!("{} compression failed: {error}", self.name()))
        })
    }
}

/// Reverses [`Compressor::compress`] for the codec the server named by `compressor_id`.
pub(crate) fn decompress(compressor_id: u8, bytes: &[u8]) -> Result<Vec<u8>> {
    let decoded: std::io::Result<Vec<u8>> = match compressor_id {
        NOOP_COMPRESSOR_ID => Ok(bytes.to_vec()),
        #[cfg(feature = "snappy-compression")]
        super::SNAPPY_COMPRESSOR_ID => snap::raw::Decoder::new()
            .decompress_vec(bytes)
            .map_err(std::io::Error::other),
        #[cfg(feature = "zlib-compression")]
        super::ZLIB_COMPRESSOR_ID => zlib_decode(bytes),
        #[cfg(feature = "zstd-compression")]
        super::ZSTD_COMPRESSOR_ID => zstd::stream::decode_all(bytes),
        other => {
            return Err(Error::invalid_response(format!(
                "the server used compressor id {other}, which this client cannot decode"
            )))
        }
    };
    decoded.map_err(|error| {
        Error::invalid_response(format!(
            "could not decompress a message compressed with id {compressor_id}: {error}"
        ))
    })
}

#[cfg(feature = "zstd-compression")]
fn zstd_encode(level: Option<i32>, parts: &[&[u8]]) -> std::io::Result<Vec<u8>> {
    use std::io::Write;

    let mut encoder = zstd::Encoder::new(
        Vec::new(),
        level.unwrap_or(zstd::DEFAULT_COMPRESSION_LEVEL),
    )?;
    for part in parts {
        encoder.write_all(part)?;
    }
    encoder.finish()
}

#[cfg(feature = "zlib-compression")]
fn zlib_encode(level: Option<u32>, parts: &[&[u8]]) -> std::io::Result<Vec<u8>> {
    use std::io::Write;

    use flate2::{write::ZlibEncoder, Compression};

    let level = level.map(Compression::new).unwrap_or_default();
    let mut encoder = ZlibEncoder::new(Vec::new(), level);
    for part in parts {
        encoder.write_all(part)?;
    }
    encoder.finish()
}

#[cfg(feature = "zlib-compression")]
fn zlib_decode(bytes: &[u8]) -> std::io::Result<Vec<u8>> {
    use std::io::Read;

    let mut decoded = Vec::new();
    flate2::read::ZlibDecoder::new(bytes).read_to_end(&mut decoded)?;
    Ok(decoded)
}

// snap has no streaming raw encoder, so the parts are joined first.
#[cfg(feature = "snappy-compression")]
fn snappy_encode(parts: &[&[u8]]) -> std::io::Result<Vec<u8>> {
    snap::raw::Encoder::new()
        .compress_vec(&parts.concat())
        .map_err(std::io::Error::other)
}
