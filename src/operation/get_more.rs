use std::{collections::VecDeque, time::Duration};

use serde::Deserialize;

use crate::{
    bson::{doc, Bson, RawDocumentBuf},
    cmap::{Command, RawCommandResponse, StreamDescription},
    coll::Namespace,
    cursor::CursorInformation,
    error::{Error, Result},
    operation::{ExecutionContext, Feature, Operation},
    results::GetMoreResult,
    selection_criteria::SelectionCriteria,
};

#[derive(Debug)]
pub(crate) struct GetMore {
    ns: Namespace,
    cursor_id: i64,
    selection_criteria: SelectionCriteria,
    batch_size: Option<u32>,
    max_await_time: Option<Duration>,
    comment: Option<Bson>,
    await_data: bool,
}

impl GetMore {
    pub(crate) fn new(info: &CursorInformation) -> Self {
        Self {
            ns: info.ns.clone(),
            cursor_id: info.id,
            selection_criteria: SelectionCriteria::from_address(info.address.clone()),
            batch_size: info.batch_size,
            max_await_time: info.max_time,
            comment: info.comment.clone(),
            await_data: info.await_data,
        }
    }
}

impl Operation for GetMore {
    type O = GetMoreResult;

    const NAME: &'static str = "getMore";

    fn build(&mut self, _description: &StreamDescription) -> Result<Command> {
        let mut body = doc! {
            Self::NAME: self.cursor_id,
            "collection": self.ns.coll.clone(),
        };

        if let Some(batch_size) = self.batch_size {
            let batch_size = i32::try_from(batch_size).map_err(|_| {
                Error::invalid_argument("the batch size must fit into a signed 32-bit integer")
            })?;
            if batch_size != 0 {
                body.insert("batchSize", batch_size);
            }
        }

        // Only a tailable awaitData cursor is told how long to block.
        if self.await_data {
            if let Some(max_await_time) = self.max_await_time {
                body.insert(
                    "maxTimeMS",
                    i64::try_from(max_await_time.as_millis()).unwrap_or(i64::MAX),
                );
            }
        }

        if let Some(ref comment) = self.comment {
            body.insert("comment", comment.clone());
        }

        Ok(Command::new(Self::NAME, self.ns.db.clone(), body))
    }

    fn handle_response(
        &mut self,
        response: RawCommandResponse,
        _context: ExecutionContext<'_>,
    ) -> Result<Self::O> {
        let response: GetMoreResponseBody = response.body()?;
        Ok(GetMoreResult {
            batch: response.cursor.next_batch,
            exhausted: response.cursor.id == 0,
            id: response.cursor.id,
            post_batch_resume_token: response.cursor.post_batch_resume_token,
        })
    }

    fn selection_criteria(&self) -> Feature<&SelectionCriteria> {
        Feature::Set(&self.selection_criteria)
    }

    fn omit_csot_max_time_ms(&self) -> bool {
        self.await_data
    }
}

#[derive(Debug, Deserialize)]
struct GetMoreResponseBody {
    cursor: NextBatchBody,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NextBatchBody {
    id: i64,
    next_batch: VecDeque<RawDocumentBuf>,
    post_batch_resume_token: Option<RawDocumentBuf>,
}
