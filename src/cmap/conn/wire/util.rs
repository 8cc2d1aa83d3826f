use std::{
    io::Read,
    sync::atomic::{AtomicI32, Ordering},
};

use crate::error::{Error, Result};

static REQUEST_ID: AtomicI32 = AtomicI32::new(0);

/// Obtain a new, process-wide unique request ID.
pub(crate) fn next_request_id() -> i32 {
    REQUEST_ID.fetch_add(1, Ordering::SeqCst)
}

pub(super) fn write_cstring(buffer: &mut Vec<u8>, string: &str) -> Result<()> {
    if string.as_bytes().contains(&0) {
        return Err(Error::invalid_argument(format!(
            "wire protocol strings cannot contain null bytes: {string:?}"
        )));
    }
    buffer.extend_from_slice(string.as_bytes());
    buffer.push(0);
    Ok(())
}

pub(super) fn len_to_i32(length: usize) -> Result<i32> {
    i32::try_from(length)
        .map_err(|_| Error::invalid_argument(format!("message length {length} exceeds i32::MAX")))
}

pub(super) fn i32_to_len(length: i32) -> Result<usize> {
    usize::try_from(length)
        .map_err(|_| Error::invalid_response(format!("negative length on the wire: {length}")))
}

pub(super) struct SyncCountReader<R> {
    reader: R,
    bytes_read: usize,
}

impl<R: Read> SyncCountReader<R> {
    /// Constructs a new CountReader that wraps `reader`.
    pub(super) fn new(reader: R) -> Self {
        SyncCountReader {
            reader,
            bytes_read: 0,
        }
    }

    /// Gets the number of bytes read so far.
    pub(super) fn bytes_read(&self) -> usize {
        self.bytes_read
    }
}

impl<R: Read> Read for SyncCountReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let bytes = self.reader.read(buf)?;
        self.bytes_read += bytes;
        Ok(bytes)
    }
}
