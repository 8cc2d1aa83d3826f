#[cfg(test)]
mod test;

use crate::{
    bson::{doc, oid::ObjectId, Document},
    cmap::{Command, RawCommandResponse, StreamDescription},
    coll::Namespace,
    concern::WriteConcern,
    error::{Error, PartialWriteResult, Result},
    operation::{
        append_options,
        batch::FrameResults,
        Batches,
        ExecutionContext,
        Feature,
        Operation,
        Retryability,
        WriteResponseBody,
    },
    options::InsertOptions,
    results::InsertResult,
};

#[derive(Debug)]
pub(crate) struct Insert {
    ns: Namespace,
    batches: Batches,
    options: Option<InsertOptions>,
    results: FrameResults<i64>,
}

impl Insert {
    pub(crate) fn new(
        ns: Namespace,
        documents: Vec<Document>,
        options: Option<InsertOptions>,
    ) -> Result<Self> {
        if documents.is_empty() {
            return Err(Error::invalid_argument("no documents provided to insert"));
        }

        let documents = documents
            .into_iter()
            .map(|document| crate::bson::to_raw_document_buf(&with_id(document)))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let ordered = options.as_ref().and_then(|o| o.ordered).unwrap_or(true);

        Ok(Self {
            ns,
            batches: Batches::new("documents", documents, ordered),
            options,
            results: FrameResults::default(),
        })
    }
}

/// Generates an `_id` for a document that lacks one so that a retried frame inserts the same
/// documents.
fn with_id(document: Document) -> Document {
    if document.contains_key("_id") {
        return document;
    }
    let mut with_id = doc! { "_id": ObjectId::new() };
    with_id.extend(document);
    with_id
}

impl Operation for Insert {
    type O = InsertResult;

    const NAME: &'static str = "insert";

    fn build(&mut self, description: &StreamDescription) -> Result<Command> {
        self.batches.advance_for(description)?;

        let mut body = doc! {
            Self::NAME: self.ns.coll.clone(),
            "ordered": self.batches.ordered(),
        };
        append_options(&mut body, self.options.as_ref())?;

        let mut command = Command::new(Self::NAME, &self.ns.db, body);
        command.add_document_sequence(self.batches.identifier(), self.batches.current().to_vec());
        Ok(command)
    }

    fn handle_response(
        &mut self,
        response: RawCommandResponse,
        _context: ExecutionContext<'_>,
    ) -> Result<Self::O> {
        let response: WriteResponseBody = response.body()?;
        let offset = self.batches.current_index();
        self.results.record(
            offset,
            response.n,
            response.offset_write_errors(offset),
            response.write_concern_error.clone(),
            response.labels.clone(),
        );

        let n = self.results.summaries().sum();
        self.results
            .into_result(InsertResult { n }, PartialWriteResult::Insert)
    }

    fn write_concern(&self) -> Feature<&WriteConcern> {
        self.options
            .as_ref()
            .and_then(|opts| opts.write_concern.as_ref())
            .into()
    }

    fn retryability(&self) -> Retryability {
        Retryability::Write
    }

    fn batches(&mut self) -> Option<&mut Batches> {
        Some(&mut self.batches)
    }
}
