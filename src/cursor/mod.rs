//! Server-side cursors returned by `find`, `aggregate` and the listing commands.


use std::{collections::VecDeque, time::Duration};

use crate::{
    bson::{Bson, Document, RawDocumentBuf},
    coll::Namespace,
    error::{Error, Result},
    operation::{CursorBody, GetMore},
    options::ServerAddress,
    results::GetMoreResult,
    Client,
    ClientSession,
};

/// What a `getMore` needs to know about a cursor: where it lives and how batches are requested.
#[derive(Debug, Clone)]
pub(crate) struct CursorInformation {
    pub(crate) ns: Namespace,
    pub(crate) address: ServerAddress,
    pub(crate) id: i64,
    pub(crate) batch_size: Option<u32>,
    pub(crate) max_time: Option<Duration>,
    pub(crate) comment: Option<Bson>,
    pub(crate) await_data: bool,
}

/// The parsed reply of a cursor-producing command.
#[derive(Debug, Clone)]
pub(crate) struct CursorSpecification {
    pub(crate) info: CursorInformation,
    pub(crate) initial_buffer: VecDeque<RawDocumentBuf>,
    pub(crate) post_batch_resume_token: Option<RawDocumentBuf>,
}

impl CursorSpecification {
    pub(crate) fn new(
        body: CursorBody,
        address: ServerAddress,
        batch_size: impl Into<Option<u32>>,
        max_time: impl Into<Option<Duration>>,
        comment: impl Into<Option<Bson>>,
        await_data: bool,
    ) -> Result<Self> {
        let ns = Namespace::from_str(&body.cursor.ns).ok_or_else(|| {
            Error::invalid_response(format!("invalid cursor namespace: {}", body.cursor.ns))
        })?;
        Ok(Self {
            info: CursorInformation {
                ns,
                address,
                id: body.cursor.id,
                batch_size: batch_size.into(),
                max_time: max_time.into(),
                comment: comment.into(),
                await_data,
            },
            initial_buffer: body.cursor.first_batch.into(),
            post_batch_resume_token: body.cursor.post_batch_resume_token,
        })
    }

    pub(crate) fn id(&self) -> i64 {
        self.info.id
    }
}

/// A cursor over the results of a query.
///
/// The first batch arrives with the command that created the cursor. Each call to
/// [`Cursor::next_batch`] hands out whatever is buffered and, once the buffer is empty, asks the
/// server that owns the cursor for more with `getMore`. A cursor id of `0` means the server has
/// nothing left; no `getMore` is sent after that.
///
/// A cursor created under an implicit session keeps that session until it is exhausted, so every
/// `getMore` carries the same `lsid`. Cursors created under an explicit session must be advanced
/// with [`Cursor::next_batch_with_session`].
#[derive(Debug)]
pub struct Cursor {
    client: Client,
    info: CursorInformation,
    buffer: VecDeque<RawDocumentBuf>,
    post_batch_resume_token: Option<RawDocumentBuf>,
    implicit_session: Option<ClientSession>,
}

impl Cursor {
    pub(crate) fn new(
        client: Client,
        spec: CursorSpecification,
        implicit_session: Option<ClientSession>,
    ) -> Self {
        let exhausted = spec.id() == 0;
        Self {
            client,
            info: spec.info,
            buffer: spec.initial_buffer,
            post_batch_resume_token: spec.post_batch_resume_token,
            // The session goes back to the pool as soon as the server has nothing left.
            implicit_session: if exhausted { None } else { implicit_session },
        }
    }

    /// The server-side id of this cursor, or `0` once it is exhausted.
    pub fn id(&self) -> i64 {
        self.info.id
    }

    /// The server this cursor lives on. Every `getMore` is routed here.
    pub fn address(&self) -> &ServerAddress {
        &self.info.address
    }

    /// The namespace the server reported for this cursor.
    pub fn namespace(&self) -> &Namespace {
        &self.info.ns
    }

    /// Whether the server has reported that no more results remain.
    pub fn is_exhausted(&self) -> bool {
        self.info.id == 0
    }

    /// The resume token reported with the latest batch, if any.
    pub fn post_batch_resume_token(&self) -> Option<&RawDocumentBuf> {
        self.post_batch_resume_token.as_ref()
    }

    /// Returns the next batch of results, or `None` once the buffer is drained and the cursor is
    /// exhausted. A live tailable cursor can yield an empty batch.
    pub async fn next_batch(&mut self) -> Result<Option<Vec<Document>>> {
        if let Some(batch) = self.take_buffer()? {
            return Ok(Some(batch));
        }
        if self.is_exhausted() {
            return Ok(None);
        }

        let get_more = GetMore::new(&self.info);
        let client = self.client.clone();
        let result = client
            .execute_operation(get_more, self.implicit_session.as_mut())
            .await;
        self.absorb(result)
    }

    /// Like [`Cursor::next_batch`], for cursors created with an explicit session. The session
    /// must be the one the cursor was created with.
    pub async fn next_batch_with_session(
        &mut self,
        session: &mut ClientSession,
    ) -> Result<Option<Vec<Document>>> {
        if let Some(batch) = self.take_buffer()? {
            return Ok(Some(batch));
        }
        if self.is_exhausted() {
            return Ok(None);
        }

        let get_more = GetMore::new(&self.info);
        let result = self
            .client
            .clone()
            .execute_operation(get_more, session)
            .await;
        self.absorb(result)
    }

    fn take_buffer(&mut self) -> Result<Option<Vec<Document>>> {
        if self.buffer.is_empty() {
            return Ok(None);
        }
        self.buffer
            .drain(..)
            .map(|raw| raw.to_document().map_err(Error::from))
            .collect::<Result<Vec<_>>>()
            .map(Some)
    }

    fn absorb(&mut self, result: Result<GetMoreResult>) -> Result<Option<Vec<Document>>> {
        let result = match result {
            Ok(result) => result,
            Err(error) => {
                // The server has discarded the cursor; nothing further can be fetched.
                if error.is_network_error() || error.code() == Some(CURSOR_NOT_FOUND) {
                    self.mark_exhausted();
                }
                return Err(error);
            }
        };

        self.info.id = result.id;
        if result.post_batch_resume_token.is_some() {
            self.post_batch_resume_token = result.post_batch_resume_token;
        }
        if result.exhausted {
            self.mark_exhausted();
        }
        self.buffer = result.batch;
        Ok(Some(self.take_buffer()?.unwrap_or_default()))
    }

    fn mark_exhausted(&mut self) {
        self.info.id = 0;
        self.implicit_session = None;
    }
}

const CURSOR_NOT_FOUND: i32 = 43;
