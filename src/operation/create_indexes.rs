use std::time::Duration;

use crate::{
    bson::{doc, Bson},
    cmap::{Command, RawCommandResponse, StreamDescription},
    coll::Namespace,
    concern::WriteConcern,
    error::{Error, Result},
    index::IndexModel,
    operation::{
        append_options,
        ExecutionContext,
        Feature,
        Operation,
        WriteConcernOnlyBody,
        SERVER_4_4_0_WIRE_VERSION,
    },
    options::CreateIndexOptions,
    results::CreateIndexesResult,
};

#[derive(Debug)]
pub(crate) struct CreateIndexes {
    ns: Namespace,
    indexes: Vec<IndexModel>,
    options: Option<CreateIndexOptions>,
}

impl CreateIndexes {
    pub(crate) fn new(
        ns: Namespace,
        mut indexes: Vec<IndexModel>,
        options: Option<CreateIndexOptions>,
    ) -> Self {
        indexes.iter_mut().for_each(IndexModel::update_name);
        Self {
            ns,
            indexes,
            options,
        }
    }
}

impl Operation for CreateIndexes {
    type O = CreateIndexesResult;

    const NAME: &'static str = "createIndexes";

    fn build(&mut self, description: &StreamDescription) -> Result<Command> {
        if self
            .options
            .as_ref()
            .is_some_and(|options| options.commit_quorum.is_some())
            && description.max_wire_version.unwrap_or(0) < SERVER_4_4_0_WIRE_VERSION
        {
            return Err(Error::invalid_argument(
                "specifying a commit quorum to create_index(es) is not supported on server \
                 versions < 4.4",
            ));
        }
        if self.indexes.is_empty() {
            return Err(Error::invalid_argument("no indexes provided to create"));
        }

        let indexes = self
            .indexes
            .iter()
            .map(crate::bson::to_bson)
            .collect::<std::result::Result<Vec<Bson>, _>>()?;
        let mut body = doc! {
            Self::NAME: self.ns.coll.clone(),
            "indexes": indexes,
        };
        append_options(&mut body, self.options.as_ref())?;

        Ok(Command::new(Self::NAME, &self.ns.db, body))
    }

    fn handle_response(
        &mut self,
        response: RawCommandResponse,
        _context: ExecutionContext<'_>,
    ) -> Result<Self::O> {
        let response: WriteConcernOnlyBody = response.body()?;
        response.validate()?;
        let index_names = self.indexes.iter().filter_map(IndexModel::get_name).collect();
        Ok(CreateIndexesResult { index_names })
    }

    fn write_concern(&self) -> Feature<&WriteConcern> {
        self.options
            .as_ref()
            .and_then(|opts| opts.write_concern.as_ref())
            .into()
    }

    fn max_time(&self) -> Option<Duration> {
        self.options.as_ref().and_then(|opts| opts.max_time)
    }
}
