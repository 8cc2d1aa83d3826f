//! Splitting of write statements into frames that fit the server's limits.


use std::collections::BTreeMap;

use crate::{
    bson::RawDocumentBuf,
    cmap::StreamDescription,
    error::{
        BulkWriteFailure,
        Error,
        ErrorKind,
        IndexedWriteError,
        PartialWriteResult,
        Result,
        WriteConcernError,
    },
};

use super::COMMAND_OVERHEAD_SIZE;

/// How far past `maxBsonObjectSize` a single statement may go. The server allows this much for
/// the fields a write statement wraps around the user's document.
const MAX_DOCUMENT_OVERHEAD: usize = 16 * 1024;

/// The statements of a batched write and the window of them sent in the current frame.
#[derive(Debug, Clone)]
pub(crate) struct Batches {
    identifier: &'static str,
    documents: Vec<RawDocumentBuf>,
    ordered: bool,
    offset: usize,
    len: usize,
    checked: bool,
}

impl Batches {
    pub(crate) fn new(
        identifier: &'static str,
        documents: Vec<RawDocumentBuf>,
        ordered: bool,
    ) -> Self {
        Self {
            identifier,
            documents,
            ordered,
            offset: 0,
            len: 0,
            checked: false,
        }
    }

    pub(crate) fn identifier(&self) -> &'static str {
        self.identifier
    }

    pub(crate) fn ordered(&self) -> bool {
        self.ordered
    }

    /// Picks the statements for the next frame. A frame that is already current (because it is
    /// being retried) is kept as is.
    ///
    /// Statements are added until the next one would exceed `max_count` statements or
    /// `max_payload_size` bytes. A frame always holds at least one statement.
    pub(crate) fn advance(
        &mut self,
        max_count: usize,
        max_document_size: usize,
        max_payload_size: usize,
    ) -> Result<()> {
        if !self.checked {
            let limit = max_document_size + MAX_DOCUMENT_OVERHEAD;
            if let Some((index, document)) = self
                .documents
                .iter()
                .enumerate()
                .find(|(_, document)| document.as_bytes().len() > limit)
            {
                return Err(Error::invalid_argument(format!(
                    "document at index {index} is {} bytes, which exceeds the maximum of {limit}",
                    document.as_bytes().len()
                )));
            }
            self.checked = true;
        }

        if self.len > 0 {
            return Ok(());
        }

        let mut size = 0;
        let mut count = 0;
        for document in &self.documents[self.offset..] {
            let document_size = document.as_bytes().len();
            if count == max_count.max(1) || (count > 0 && size + document_size > max_payload_size)
            {
                break;
            }
            size += document_size;
            count += 1;
        }
        self.len = count;
        Ok(())
    }

    /// Calls [`Batches::advance`] with the limits the server advertised.
    pub(crate) fn advance_for(&mut self, description: &StreamDescription) -> Result<()> {
        let max_payload_size =
            (description.max_message_size_bytes.max(0) as usize).saturating_sub(COMMAND_OVERHEAD_SIZE);
        self.advance(
            description.max_write_batch_size.max(1) as usize,
            description.max_bson_object_size.max(0) as usize,
            max_payload_size,
        )
    }

    /// The statements of the current frame.
    pub(crate) fn current(&self) -> &[RawDocumentBuf] {
        &self.documents[self.offset..self.offset + self.len]
    }

    /// The position of the current frame's first statement in the whole operation.
    pub(crate) fn current_index(&self) -> usize {
        self.offset
    }

    /// Moves past the current frame.
    pub(crate) fn clear(&mut self) {
        self.offset += self.len;
        self.len = 0;
    }

    pub(crate) fn is_exhausted(&self) -> bool {
        self.offset >= self.documents.len()
    }
}

/// What the server reported for each frame of a batched write, keyed by the position of the
/// frame's first statement. A retried frame overwrites its earlier entry.
#[derive(Debug)]
pub(crate) struct FrameResults<T> {
    frames: BTreeMap<usize, FrameResult<T>>,
    labels: Option<Vec<String>>,
}

#[derive(Debug)]
struct FrameResult<T> {
    summary: T,
    write_errors: Vec<IndexedWriteError>,
    write_concern_error: Option<WriteConcernError>,
}

impl<T> Default for FrameResults<T> {
    fn default() -> Self {
        Self {
            frames: BTreeMap::new(),
            labels: None,
        }
    }
}

impl<T> FrameResults<T> {
    /// Records one frame's reply. `write_errors` must already carry operation-wide indexes.
    pub(crate) fn record(
        &mut self,
        offset: usize,
        summary: T,
        write_errors: Option<Vec<IndexedWriteError>>,
        write_concern_error: Option<WriteConcernError>,
        labels: Option<Vec<String>>,
    ) {
        self.frames.insert(
            offset,
            FrameResult {
                summary,
                write_errors: write_errors.unwrap_or_default(),
                write_concern_error,
            },
        );
        self.labels = labels;
    }

    /// The per-frame summaries in statement order.
    pub(crate) fn summaries(&self) -> impl Iterator<Item = &T> {
        self.frames.values().map(|frame| &frame.summary)
    }

    /// Returns `result` if no frame reported an error, or a `BulkWrite` error carrying every write
    /// error so far, the latest write concern error and `result` as the partial result.
    pub(crate) fn into_result<R>(
        &self,
        result: R,
        partial: impl FnOnce(R) -> PartialWriteResult,
    ) -> Result<R> {
        let write_errors: Vec<IndexedWriteError> = self
            .frames
            .values()
            .flat_map(|frame| frame.write_errors.iter().cloned())
            .collect();
        let write_concern_error = self
            .frames
            .values()
            .rev()
            .find_map(|frame| frame.write_concern_error.clone());

        if write_errors.is_empty() && write_concern_error.is_none() {
            return Ok(result);
        }

        let mut failure = BulkWriteFailure::new();
        failure.write_errors = (!write_errors.is_empty()).then_some(write_errors);
        failure.write_concern_error = write_concern_error;
        failure.partial_result = Some(partial(result));
        Err(Error::new(ErrorKind::BulkWrite(failure), self.labels.clone()))
    }
}
