use std::io::Read;

use bitflags::bitflags;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::{
    checksum::crc32c,
    header::{Header, OpCode},
    next_request_id,
    query::Reply,
    util::{i32_to_len, len_to_i32, write_cstring, SyncCountReader},
};
use crate::{
    bson::{doc, Array, Document, RawDocumentBuf},
    bson_util,
    cmap::{conn::stream_description::DEFAULT_MAX_MESSAGE_SIZE_BYTES, Command},
    compression::{decompress, Compressor},
    error::{Error, Result},
};

/// Represents an OP_MSG wire protocol operation.
#[derive(Clone, Debug)]
pub(crate) struct Message {
    // OP_MSG payload type 0
    pub(crate) document_payload: RawDocumentBuf,
    // OP_MSG payload type 1
    pub(crate) document_sequences: Vec<DocumentSequence>,
    pub(crate) response_to: i32,
    pub(crate) flags: MessageFlags,
    pub(crate) request_id: Option<i32>,
}

/// A payload type 1 section: a named run of documents sent outside the command body.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct DocumentSequence {
    pub(crate) identifier: String,
    pub(crate) documents: Vec<RawDocumentBuf>,
}

impl Message {
    /// Creates a `Message` from a given `Command`. The `response_to` field is zero for requests.
    pub(crate) fn from_command(command: &Command, request_id: Option<i32>) -> Result<Self> {
        let document_payload = RawDocumentBuf::from_document(&command.to_wire_document()?)?;

        let mut flags = MessageFlags::empty();
        if command.exhaust_allowed {
            flags |= MessageFlags::EXHAUST_ALLOWED;
        }

        Ok(Self {
            document_payload,
            document_sequences: command.document_sequences.clone(),
            response_to: 0,
            flags,
            request_id,
        })
    }

    /// Gets this message's command as a Document, folding every document sequence back into an
    /// array under its identifier. If deserialization fails, returns a document describing the
    /// error.
    pub(crate) fn get_command_document(&self) -> Document {
        let mut command = match self.document_payload.to_document() {
            Ok(document) => document,
            Err(error) => return doc! { "serialization error": error.to_string() },
        };

        for document_sequence in &self.document_sequences {
            let mut documents = Array::new();
            for document in &document_sequence.documents {
                match document.to_document() {
                    Ok(document) => documents.push(document.into()),
                    Err(error) => return doc! { "serialization error": error.to_string() },
                }
            }
            command.insert(document_sequence.identifier.clone(), documents);
        }

        command
    }

    /// Reads one complete frame from `reader`, returning its header and the bytes that follow it.
    pub(crate) async fn read_frame<T: AsyncRead + Unpin + Send>(
        reader: &mut T,
        max_message_size_bytes: Option<i32>,
    ) -> Result<(Header, Vec<u8>)> {
        let header = Header::read_from(reader).await?;
        let max_len = max_message_size_bytes.unwrap_or(DEFAULT_MAX_MESSAGE_SIZE_BYTES);
        if header.length > max_len {
            return Err(Error::invalid_response(format!(
                "message length {} over maximum {}",
                header.length, max_len
            )));
        }
        let length = i32_to_len(header.length)?;
        let remaining = length.checked_sub(Header::LENGTH).ok_or_else(|| {
            Error::invalid_response(format!("message length {length} shorter than its header"))
        })?;

        let mut body = vec![0u8; remaining];
        reader.read_exact(&mut body).await?;
        Ok((header, body))
    }

    /// Reads bytes from `reader` and deserializes them into a Message. OP_REPLY frames (and
    /// OP_COMPRESSED frames wrapping either form) are converted so callers see a single shape.
    pub(crate) async fn read_from<T: AsyncRead + Unpin + Send>(
        mut reader: T,
        max_message_size_bytes: Option<i32>,
    ) -> Result<Self> {
        let (header, body) = Self::read_frame(&mut reader, max_message_size_bytes).await?;
        Self::from_frame(&header, &body)
    }

    pub(crate) fn from_frame(header: &Header, body: &[u8]) -> Result<Self> {
        match header.op_code {
            OpCode::Message => Self::read_op_msg(body, header, true),
            OpCode::Reply => Reply::parse(header, body)?.into_message(),
            OpCode::Compressed => Self::read_op_compressed(body, header),
            OpCode::Query => Err(Error::invalid_response(format!(
                "invalid op code, expected {}, {} or {} and got {}",
                OpCode::Message as i32,
                OpCode::Compressed as i32,
                OpCode::Reply as i32,
                header.op_code as i32
            ))),
        }
    }

    fn read_op_compressed(mut reader: &[u8], header: &Header) -> Result<Self> {
        let original_opcode = OpCode::from_i32(bson_util::read_i32(&mut reader)?)?;
        let uncompressed_size = i32_to_len(bson_util::read_i32(&mut reader)?)?;
        let compressor_id = bson_util::read_u8(&mut reader)?;

        let decompressed = decompress(compressor_id, reader)?;
        if decompressed.len() != uncompressed_size {
            return Err(Error::invalid_response(format!(
                "the server's message claims that the uncompressed length is {}, but was \
                 computed to be {}",
                uncompressed_size,
                decompressed.len(),
            )));
        }

        let original_header = Header {
            length: len_to_i32(Header::LENGTH + decompressed.len())?,
            op_code: original_opcode,
            ..*header
        };
        match original_opcode {
            OpCode::Message => Self::read_op_msg(&decompressed, &original_header, false),
            OpCode::Reply => Reply::parse(&original_header, &decompressed)?.into_message(),
            other => Err(Error::invalid_response(format!(
                "the original opcode of a compressed reply must be {} or {}, but was {}",
                OpCode::Message as i32,
                OpCode::Reply as i32,
                other as i32,
            ))),
        }
    }

    fn read_op_msg(body: &[u8], header: &Header, verify_checksum: bool) -> Result<Self> {
        let mut reader = body;
        let flags = MessageFlags::from_bits_truncate(bson_util::read_u32(&mut reader)?);

        let checksum_len = if flags.contains(MessageFlags::CHECKSUM_PRESENT) {
            4
        } else {
            0
        };
        let sections_len = body
            .len()
            .checked_sub(4 + checksum_len)
            .ok_or_else(|| Error::invalid_response("OP_MSG frame too short"))?;

        let mut sections = &reader[..sections_len];
        let mut count_reader = SyncCountReader::new(&mut sections);
        let mut document_payload = None;
        let mut document_sequences = Vec::new();
        while count_reader.bytes_read() < sections_len {
            match MessageSection::read(&mut count_reader)? {
                MessageSection::Document(document) => {
                    if document_payload.is_some() {
                        return Err(Error::invalid_response(
                            "an OP_MSG must contain exactly one payload type 0 section",
                        ));
                    }
                    document_payload = Some(document);
                }
                MessageSection::Sequence(document_sequence) => {
                    document_sequences.push(document_sequence)
                }
            }
        }
        if count_reader.bytes_read() != sections_len {
            return Err(Error::invalid_response(format!(
                "the server indicated that the reply would be {} bytes long, but it instead was {}",
                header.length,
                Header::LENGTH + 4 + count_reader.bytes_read() + checksum_len,
            )));
        }

        if checksum_len > 0 && verify_checksum {
            let mut trailer = &reader[sections_len..];
            let expected = bson_util::read_u32(&mut trailer)?;
            let mut covered = header.to_bytes();
            covered.extend_from_slice(&body[..body.len() - 4]);
            let actual = crc32c(&covered);
            if actual != expected {
                return Err(Error::invalid_response(format!(
                    "OP_MSG checksum mismatch: frame carried {expected:#010x}, computed \
                     {actual:#010x}"
                )));
            }
        }

        Ok(Self {
            response_to: header.response_to,
            flags,
            document_payload: document_payload.ok_or_else(|| {
                Error::invalid_response("an OP_MSG must contain exactly one payload type 0 section")
            })?,
            document_sequences,
            request_id: Some(header.request_id),
        })
    }

    /// Serializes the Message to its complete wire form. When `CHECKSUM_PRESENT` is set, the
    /// CRC-32C of every preceding byte is appended.
    pub(crate) fn encode(&self) -> Result<Vec<u8>> {
        let sections = self.get_sections_bytes()?;
        let checksum_len = if self.flags.contains(MessageFlags::CHECKSUM_PRESENT) {
            4
        } else {
            0
        };

        let total_length = Header::LENGTH + std::mem::size_of::<u32>() + sections.len() + checksum_len;
        let header = Header {
            length: len_to_i32(total_length)?,
            request_id: self.request_id.unwrap_or_else(next_request_id),
            response_to: self.response_to,
            op_code: OpCode::Message,
        };

        let mut bytes = Vec::with_capacity(total_length);
        header.write_into(&mut bytes);
        bytes.extend_from_slice(&self.flags.bits().to_le_bytes());
        bytes.extend_from_slice(&sections);
        if checksum_len > 0 {
            let checksum = crc32c(&bytes);
            bytes.extend_from_slice(&checksum.to_le_bytes());
        }

        Ok(bytes)
    }

    /// Serializes the Message and wraps the flags and sections in an OP_COMPRESSED frame.
    /// Compressed frames never carry a checksum.
    pub(crate) fn encode_compressed(&self, compressor: &Compressor) -> Result<Vec<u8>> {
        let flags = self.flags - MessageFlags::CHECKSUM_PRESENT;
        let flag_bytes = flags.bits().to_le_bytes();
        let sections = self.get_sections_bytes()?;
        let uncompressed_len = flag_bytes.len() + sections.len();
        let compressed_bytes = compressor.compress(&[&flag_bytes, &sections])?;

        let total_length = Header::LENGTH
            + std::mem::size_of::<i32>()
            + std::mem::size_of::<i32>()
            + std::mem::size_of::<u8>()
            + compressed_bytes.len();
        let header = Header {
            length: len_to_i32(total_length)?,
            request_id: self.request_id.unwrap_or_else(next_request_id),
            response_to: self.response_to,
            op_code: OpCode::Compressed,
        };

        let mut bytes = Vec::with_capacity(total_length);
        header.write_into(&mut bytes);
        bytes.extend_from_slice(&(OpCode::Message as i32).to_le_bytes());
        bytes.extend_from_slice(&len_to_i32(uncompressed_len)?.to_le_bytes());
        bytes.push(compressor.id());
        bytes.extend_from_slice(&compressed_bytes);
        Ok(bytes)
    }

    /// Serializes the Message to bytes and writes them to `writer`.
    pub(crate) async fn write_to<T: AsyncWrite + Send + Unpin>(&self, mut writer: T) -> Result<()> {
        let bytes = self.encode()?;
        writer.write_all(&bytes).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Serializes message to bytes, compresses those bytes, and writes the bytes.
    pub(crate) async fn write_compressed_to<T: AsyncWrite + Unpin + Send>(
        &self,
        mut writer: T,
        compressor: &Compressor,
    ) -> Result<()> {
        let bytes = self.encode_compressed(compressor)?;
        writer.write_all(&bytes).await?;
        writer.flush().await?;
        Ok(())
    }

    fn get_sections_bytes(&self) -> Result<Vec<u8>> {
        let mut sections = Vec::new();

        // Payload type 0
        sections.push(0);
        sections.extend(self.document_payload.as_bytes());

        for document_sequence in &self.document_sequences {
            // Payload type 1
            sections.push(1);

            let mut payload = Vec::new();
            write_cstring(&mut payload, &document_sequence.identifier)?;
            for document in &document_sequence.documents {
                payload.extend(document.as_bytes());
            }

            // The size covers itself, the identifier and the documents.
            let size = len_to_i32(4 + payload.len())?;
            sections.extend(size.to_le_bytes());
            sections.extend(payload);
        }

        Ok(sections)
    }
}

bitflags! {
    /// Represents the bitwise flags for an OP_MSG.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) struct MessageFlags: u32 {
        const CHECKSUM_PRESENT = 0b_0000_0000_0000_0000_0000_0000_0000_0001;
        const MORE_TO_COME     = 0b_0000_0000_0000_0000_0000_0000_0000_0010;
        const EXHAUST_ALLOWED  = 0b_0000_0000_0000_0001_0000_0000_0000_0000;
    }
}

/// Represents a section of an OP_MSG.
#[derive(Debug)]
enum MessageSection {
    Document(RawDocumentBuf),
    Sequence(DocumentSequence),
}

impl MessageSection {
    /// Reads bytes from `reader` and deserializes them into a MessageSection.
    fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let payload_type = bson_util::read_u8(reader)?;

        match payload_type {
            0 => {
                let bytes = bson_util::read_document_bytes(reader)?;
                return Ok(MessageSection::Document(RawDocumentBuf::from_bytes(bytes)?));
            }
            1 => {}
            other => {
                return Err(Error::invalid_response(format!(
                    "invalid OP_MSG section payload type: {other}"
                )))
            }
        }

        let size = i32_to_len(bson_util::read_i32(reader)?)?;
        let (identifier, identifier_len) = bson_util::read_cstring(reader)?;
        let mut length_remaining = size
            .checked_sub(4 + identifier_len)
            .ok_or_else(|| Error::invalid_response(format!("invalid section size {size}")))?;

        let mut documents = Vec::new();
        let mut count_reader = SyncCountReader::new(reader.take(length_remaining as u64));
        while count_reader.bytes_read() < length_remaining {
            let bytes = bson_util::read_document_bytes(&mut count_reader)?;
            documents.push(RawDocumentBuf::from_bytes(bytes)?);
        }
        length_remaining -= count_reader.bytes_read();

        if length_remaining != 0 {
            return Err(Error::invalid_response(format!(
                "document sequence {identifier} declared {size} bytes but its documents overran it"
            )));
        }

        Ok(MessageSection::Sequence(DocumentSequence {
            identifier,
            documents,
        }))
    }
}
