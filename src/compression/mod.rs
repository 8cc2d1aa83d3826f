//! Wire compression for OP_COMPRESSED frames.

mod codec;
mod compressors;
#[cfg(test)]
mod test;

pub use self::compressors::Compressor;
pub(crate) use self::codec::decompress;

pub(crate) const NOOP_COMPRESSOR_ID: u8 = 0;
#[cfg(feature = "snappy-compression")]
pub(crate) const SNAPPY_COMPRESSOR_ID: u8 = 1;
#[cfg(feature = "zlib-compression")]
pub(crate) const ZLIB_COMPRESSOR_ID: u8 = 2;
#[cfg(feature = "zstd-compression")]
pub(crate) const ZSTD_COMPRESSOR_ID: u8 = 3;

/// Picks the first client compressor that the server also listed in its handshake reply.
pub(crate) fn negotiate(client: &[Compressor], server: &[String]) -> Option<Compressor> {
    client
        .iter()
        .find(|compressor| {
            server
                .iter()
                .any(|name| name.eq_ignore_ascii_case(compressor.name()))
        })
        .cloned()
}
