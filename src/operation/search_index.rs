use std::time::Duration;

use serde::Deserialize;

use crate::{
    bson::{doc, Document},
    cmap::{Command, RawCommandResponse, StreamDescription},
    coll::Namespace,
    error::{Error, Result},
    index::SearchIndexModel,
    operation::{ExecutionContext, Operation},
    options::SearchIndexOptions,
};

#[derive(Debug)]
pub(crate) struct CreateSearchIndexes {
    ns: Namespace,
    indexes: Vec<SearchIndexModel>,
    options: Option<SearchIndexOptions>,
}

impl CreateSearchIndexes {
    pub(crate) fn new(
        ns: Namespace,
        indexes: Vec<SearchIndexModel>,
        options: Option<SearchIndexOptions>,
    ) -> Self {
        Self {
            ns,
            indexes,
            options,
        }
    }
}

impl Operation for CreateSearchIndexes {
    type O = Vec<String>;

    const NAME: &'static str = "createSearchIndexes";

    fn build(&mut self, _description: &StreamDescription) -> Result<Command> {
        Ok(Command::new(
            Self::NAME,
            &self.ns.db,
            doc! {
                Self::NAME: self.ns.coll.clone(),
                "indexes": crate::bson::to_bson(&self.indexes)?,
            },
        ))
    }

    fn handle_response(
        &mut self,
        response: RawCommandResponse,
        _context: ExecutionContext<'_>,
    ) -> Result<Self::O> {
        #[derive(Debug, Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Response {
            indexes_created: Vec<CreatedIndex>,
        }

        #[derive(Debug, Deserialize)]
        struct CreatedIndex {
            name: String,
        }

        let response: Response = response.body()?;
        Ok(response
            .indexes_created
            .into_iter()
            .map(|index| index.name)
            .collect())
    }

    fn supports_sessions(&self) -> bool {
        false
    }

    fn max_time(&self) -> Option<Duration> {
        self.options.as_ref().and_then(|opts| opts.max_time)
    }
}

#[derive(Debug)]
pub(crate) struct UpdateSearchIndex {
    ns: Namespace,
    name: String,
    definition: Document,
    options: Option<SearchIndexOptions>,
}

impl UpdateSearchIndex {
    pub(crate) fn new(
        ns: Namespace,
        name: String,
        definition: Document,
        options: Option<SearchIndexOptions>,
    ) -> Self {
        Self {
            ns,
            name,
            definition,
            options,
        }
    }
}

impl Operation for UpdateSearchIndex {
    type O = ();

    const NAME: &'static str = "updateSearchIndex";

    fn build(&mut self, _description: &StreamDescription) -> Result<Command> {
        Ok(Command::new(
            Self::NAME,
            &self.ns.db,
            doc! {
                Self::NAME: self.ns.coll.clone(),
                "name": &self.name,
                "definition": self.definition.clone(),
            },
        ))
    }

    fn handle_response(
        &mut self,
        _response: RawCommandResponse,
        _context: ExecutionContext<'_>,
    ) -> Result<Self::O> {
        Ok(())
    }

    fn supports_sessions(&self) -> bool {
        false
    }

    fn max_time(&self) -> Option<Duration> {
        self.options.as_ref().and_then(|opts| opts.max_time)
    }
}

#[derive(Debug)]
pub(crate) struct DropSearchIndex {
    ns: Namespace,
    name: String,
    options: Option<SearchIndexOptions>,
}

impl DropSearchIndex {
    pub(crate) fn new(ns: Namespace, name: String, options: Option<SearchIndexOptions>) -> Self {
        Self { ns, name, options }
    }
}

impl Operation for DropSearchIndex {
    type O = ();

    const NAME: &'static str = "dropSearchIndex";

    fn build(&mut self, _description: &StreamDescription) -> Result<Command> {
        Ok(Command::new(
            Self::NAME,
            &self.ns.db,
            doc! {
                Self::NAME: self.ns.coll.clone(),
                "name": &self.name,
            },
        ))
    }

    fn handle_response(
        &mut self,
        _response: RawCommandResponse,
        _context: ExecutionContext<'_>,
    ) -> Result<Self::O> {
        Ok(())
    }

    fn handle_error(&self, error: Error) -> Result<Self::O> {
        if error.is_ns_not_found() {
            Ok(())
        } else {
            Err(error)
        }
    }

    fn supports_sessions(&self) -> bool {
        false
    }

    fn max_time(&self) -> Option<Duration> {
        self.options.as_ref().and_then(|opts| opts.max_time)
    }
}
