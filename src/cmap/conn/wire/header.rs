use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{Error, Result};

/// The wire protocol op codes.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum OpCode {
    Reply = 1,
    Query = 2004,
    Compressed = 2012,
    Message = 2013,
}

impl OpCode {
    /// Attempt to infer the op code based on the numeric value.
    pub(crate) fn from_i32(i: i32) -> Result<Self> {
        match i {
            1 => Ok(OpCode::Reply),
            2004 => Ok(OpCode::Query),
            2012 => Ok(OpCode::Compressed),
            2013 => Ok(OpCode::Message),
            other => Err(Error::invalid_response(format!(
                "invalid wire protocol opcode: {other}"
            ))),
        }
    }
}

/// The header for any wire protocol message.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Header {
    pub(crate) length: i32,
    pub(crate) request_id: i32,
    pub(crate) response_to: i32,
    pub(crate) op_code: OpCode,
}

impl Header {
    pub(crate) const LENGTH: usize = 4 * std::mem::size_of::<i32>();

    /// Appends the little-endian encoding of this header to `buffer`.
    pub(crate) fn write_into(&self, buffer: &mut Vec<u8>) {
        buffer.extend_from_slice(&self.length.to_le_bytes());
        buffer.extend_from_slice(&self.request_id.to_le_bytes());
        buffer.extend_from_slice(&self.response_to.to_le_bytes());
        buffer.extend_from_slice(&(self.op_code as i32).to_le_bytes());
    }

    pub(crate) fn to_bytes(self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(Self::LENGTH);
        self.write_into(&mut bytes);
        bytes
    }

    /// Reads bytes from `reader` and deserializes them into a header.
    pub(crate) async fn read_from<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Self> {
        let length = reader.read_i32_le().await?;
        let request_id = reader.read_i32_le().await?;
        let response_to = reader.read_i32_le().await?;
        let op_code = OpCode::from_i32(reader.read_i32_le().await?)?;
        Ok(Self {
            length,
            request_id,
            response_to,
            op_code,
        })
    }
}
