use crate::{
    bson::{doc, Document},
    cmap::{Command, RawCommandResponse, StreamDescription},
    cursor::CursorSpecification,
    error::Result,
    operation::{append_options, CursorBody, ExecutionContext, Operation, Retryability},
    options::ListCollectionsOptions,
};

#[derive(Debug)]
pub(crate) struct ListCollections {
    db: String,
    filter: Option<Document>,
    name_only: bool,
    options: Option<ListCollectionsOptions>,
}

impl ListCollections {
    pub(crate) fn new(
        db: String,
        name_only: bool,
        options: Option<ListCollectionsOptions>,
    ) -> Self {
        let filter = options.as_ref().and_then(|opts| opts.filter.clone());
        Self {
            db,
            filter,
            name_only,
            options,
        }
    }
}

impl Operation for ListCollections {
    type O = CursorSpecification;

    const NAME: &'static str = "listCollections";

    fn build(&mut self, _description: &StreamDescription) -> Result<Command> {
        let mut body = doc! {
            Self::NAME: 1,
        };

        // Filtering on anything but the name would need the full collection info.
        let mut name_only = self.name_only;
        if let Some(ref filter) = self.filter {
            body.insert("filter", filter.clone());
            if filter.keys().any(|k| k != "name") {
                name_only = false;
            }
        }
        body.insert("nameOnly", name_only);

        append_options(&mut body, self.options.as_ref())?;
        if !body.contains_key("cursor") {
            body.insert("cursor", Document::new());
        }

        Ok(Command::new(Self::NAME, &self.db, body))
    }

    fn handle_response(
        &mut self,
        response: RawCommandResponse,
        _context: ExecutionContext<'_>,
    ) -> Result<Self::O> {
        let body = CursorBody::extract(&response)?;
        CursorSpecification::new(
            body,
            response.source.clone(),
            self.options.as_ref().and_then(|opts| opts.batch_size),
            None,
            self.options.as_ref().and_then(|opts| opts.comment.clone()),
            false,
        )
    }

    fn retryability(&self) -> Retryability {
        Retryability::Read
    }
}
