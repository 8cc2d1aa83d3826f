//! CRC-32C (Castagnoli), the checksum carried by OP_MSG frames with `checksumPresent` set.

pub(crate) fn crc32c(bytes: &[u8]) -> u32 {
    ::crc32c::crc32c(bytes)
}
