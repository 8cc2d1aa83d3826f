//! The legacy OP_QUERY / OP_REPLY pair, used only to send `isMaster` to servers that have not
//! yet told us they understand `hello`.

use bitflags::bitflags;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::{
    header::{Header, OpCode},
    message::Message,
    next_request_id,
    util::{len_to_i32, write_cstring},
    MessageFlags,
};
use crate::{
    bson::{doc, Bson, RawDocumentBuf},
    bson_util,
    cmap::Command,
    error::{Error, Result},
};

bitflags! {
    /// Flags for an OP_QUERY.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) struct QueryFlags: i32 {
        const TAILABLE_CURSOR   = 0b_0000_0010;
        const SECONDARY_OK      = 0b_0000_0100;
        const NO_CURSOR_TIMEOUT = 0b_0001_0000;
        const AWAIT_DATA        = 0b_0010_0000;
        const EXHAUST           = 0b_0100_0000;
        const PARTIAL           = 0b_1000_0000;
    }
}

bitflags! {
    /// Response flags of an OP_REPLY.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) struct ReplyFlags: i32 {
        const CURSOR_NOT_FOUND   = 0b_0001;
        const QUERY_FAILURE      = 0b_0010;
        const SHARD_CONFIG_STALE = 0b_0100;
        const AWAIT_CAPABLE      = 0b_1000;
    }
}

/// An OP_QUERY against the `$cmd` pseudo-collection.
#[derive(Clone, Debug)]
pub(crate) struct Query {
    pub(crate) flags: QueryFlags,
    pub(crate) full_collection_name: String,
    pub(crate) query: RawDocumentBuf,
    pub(crate) request_id: Option<i32>,
}

impl Query {
    pub(crate) fn from_command(command: &Command, request_id: Option<i32>) -> Result<Self> {
        Ok(Self {
            // Secondaries must answer the handshake too.
            flags: QueryFlags::SECONDARY_OK,
            full_collection_name: format!("{}.$cmd", command.target_db),
            query: RawDocumentBuf::from_document(&command.to_legacy_document()?)?,
            request_id,
        })
    }

    pub(crate) fn encode(&self) -> Result<Vec<u8>> {
        let mut body = Vec::new();
        body.extend_from_slice(&self.flags.bits().to_le_bytes());
        write_cstring(&mut body, &self.full_collection_name)?;
        // numberToSkip
        body.extend_from_slice(&0i32.to_le_bytes());
        // numberToReturn: a single batch, closing the cursor
        body.extend_from_slice(&(-1i32).to_le_bytes());
        body.extend_from_slice(self.query.as_bytes());

        let header = Header {
            length: len_to_i32(Header::LENGTH + body.len())?,
            request_id: self.request_id.unwrap_or_else(next_request_id),
            response_to: 0,
            op_code: OpCode::Query,
        };
        let mut bytes = header.to_bytes();
        bytes.extend(body);
        Ok(bytes)
    }

    pub(crate) async fn write_to<T: AsyncWrite + Send + Unpin>(&self, mut writer: T) -> Result<()> {
        writer.write_all(&self.encode()?).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Decodes the body of an OP_QUERY frame, as a server would.
    #[cfg(test)]
    pub(crate) fn parse(header: &Header, mut body: &[u8]) -> Result<Self> {
        let flags = QueryFlags::from_bits_truncate(bson_util::read_i32(&mut body)?);
        let (full_collection_name, _) = bson_util::read_cstring(&mut body)?;
        let _skip = bson_util::read_i32(&mut body)?;
        let _return = bson_util::read_i32(&mut body)?;
        let query = RawDocumentBuf::from_bytes(bson_util::read_document_bytes(&mut body)?)?;
        Ok(Self {
            flags,
            full_collection_name,
            query,
            request_id: Some(header.request_id),
        })
    }
}

/// An OP_REPLY frame.
#[derive(Clone, Debug)]
pub(crate) struct Reply {
    pub(crate) response_to: i32,
    pub(crate) flags: ReplyFlags,
    pub(crate) documents: Vec<RawDocumentBuf>,
}

impl Reply {
    pub(crate) fn parse(header: &Header, mut body: &[u8]) -> Result<Self> {
        let flags = ReplyFlags::from_bits_truncate(bson_util::read_i32(&mut body)?);
        // A command reply never opens a cursor, so cursorID and startingFrom are skipped.
        bson_util::read_i64(&mut body)?;
        bson_util::read_i32(&mut body)?;
        let number_returned = bson_util::read_i32(&mut body)?;

        let mut documents = Vec::new();
        while !body.is_empty() {
            let bytes = bson_util::read_document_bytes(&mut body)?;
            documents.push(RawDocumentBuf::from_bytes(bytes)?);
        }
        if usize::try_from(number_returned).ok() != Some(documents.len()) {
            return Err(Error::invalid_response(format!(
                "OP_REPLY declared {} documents but carried {}",
                number_returned,
                documents.len()
            )));
        }

        Ok(Self {
            response_to: header.response_to,
            flags,
            documents,
        })
    }

    /// Converts this reply into the single-document shape the rest of the pipeline consumes. A
    /// `QueryFailure` reply carries `{$err, code}`, which is rewritten into a command failure.
    pub(crate) fn into_message(self) -> Result<Message> {
        let first = self
            .documents
            .into_iter()
            .next()
            .ok_or_else(|| Error::invalid_response("OP_REPLY carried no documents"))?;

        let document_payload = if self.flags.contains(ReplyFlags::QUERY_FAILURE) {
            let failure = first.to_document()?;
            let mut body = doc! {
                "ok": 0,
                "errmsg": failure.get_str("$err").unwrap_or("query failure").to_string(),
            };
            if let Some(code) = failure.get("code").and_then(bson_util::get_int) {
                body.insert("code", Bson::Int64(code));
            }
            RawDocumentBuf::from_document(&body)?
        } else {
            first
        };

        Ok(Message {
            document_payload,
            document_sequences: Vec::new(),
            response_to: self.response_to,
            flags: MessageFlags::empty(),
            request_id: None,
        })
    }

    /// Serializes this reply, as a server would.
    #[cfg(test)]
    pub(crate) fn encode(&self, request_id: i32) -> Result<Vec<u8>> {
        let mut body = Vec::new();
        body.extend_from_slice(&self.flags.bits().to_le_bytes());
        body.extend_from_slice(&0_i64.to_le_bytes());
        body.extend_from_slice(&0_i32.to_le_bytes());
        body.extend_from_slice(&len_to_i32(self.documents.len())?.to_le_bytes());
        for document in &self.documents {
            body.extend_from_slice(document.as_bytes());
        }

        let header = Header {
            length: len_to_i32(Header::LENGTH + body.len())?,
            request_id,
            response_to: self.response_to,
            op_code: OpCode::Reply,
        };
        let mut bytes = header.to_bytes();
        bytes.extend(body);
        Ok(bytes)
    }
}
