mod options;

use std::time::Duration;

use serde::Deserialize;

use self::options::FindAndModifyOptions;
use crate::{
    bson::{doc, Document},
    bson_util,
    cmap::{Command, RawCommandResponse, StreamDescription},
    coll::Namespace,
    concern::WriteConcern,
    error::{Error, Result},
    operation::{
        append_options,
        check_collation_support,
        check_hint_acknowledged,
        ExecutionContext,
        Feature,
        Operation,
        Retryability,
        WriteConcernOnlyBody,
        SERVER_4_2_0_WIRE_VERSION,
    },
    options::{FindOneAndDeleteOptions, FindOneAndUpdateOptions, UpdateModifications},
    results::{FindAndModifyResult, LastErrorObject},
};

/// What a `findAndModify` does to the matched document.
#[derive(Clone, Debug)]
pub(crate) enum Modification {
    Delete,
    Update(UpdateModifications),
    Replace(Document),
}

#[derive(Debug)]
pub(crate) struct FindAndModify {
    ns: Namespace,
    query: Document,
    modification: Modification,
    options: FindAndModifyOptions,
}

impl FindAndModify {
    pub(crate) fn with_delete(
        ns: Namespace,
        query: Document,
        options: Option<FindOneAndDeleteOptions>,
    ) -> Self {
        Self {
            ns,
            query,
            modification: Modification::Delete,
            options: options.map(Into::into).unwrap_or_default(),
        }
    }

    pub(crate) fn with_update(
        ns: Namespace,
        query: Document,
        modification: Modification,
        options: Option<FindOneAndUpdateOptions>,
    ) -> Result<Self> {
        match modification {
            Modification::Update(UpdateModifications::Document(ref d)) => {
                bson_util::update_document_check(d)?
            }
            Modification::Replace(ref d) => bson_util::replacement_document_check(d)?,
            _ => {}
        }
        Ok(Self {
            ns,
            query,
            modification,
            options: options.map(Into::into).unwrap_or_default(),
        })
    }
}

impl Operation for FindAndModify {
    type O = FindAndModifyResult;

    const NAME: &'static str = "findAndModify";

    fn build(&mut self, description: &StreamDescription) -> Result<Command> {
        check_collation_support(description, self.options.collation.is_some())?;
        check_hint_acknowledged(self.options.write_concern.as_ref(), self.options.hint.is_some())?;

        let mut body = doc! {
            Self::NAME: self.ns.coll.clone(),
            "query": self.query.clone(),
        };

        match self.modification {
            Modification::Delete => {
                body.insert("remove", true);
            }
            Modification::Update(ref update) => {
                if matches!(update, UpdateModifications::Pipeline(_))
                    && description.max_wire_version.unwrap_or(0) < SERVER_4_2_0_WIRE_VERSION
                {
                    return Err(Error::invalid_argument(
                        "pipeline updates are not supported by the selected server",
                    ));
                }
                body.insert("update", update.to_bson());
            }
            Modification::Replace(ref replacement) => {
                body.insert("update", replacement.clone());
            }
        }

        append_options(&mut body, Some(&self.options))?;

        Ok(Command::new(Self::NAME, &self.ns.db, body))
    }

    fn handle_response(
        &mut self,
        response: RawCommandResponse,
        _context: ExecutionContext<'_>,
    ) -> Result<Self::O> {
        let write_concern_info: WriteConcernOnlyBody = response.body()?;
        write_concern_info.validate()?;

        let body: FindAndModifyBody = response.body()?;
        Ok(FindAndModifyResult {
            value: body.value,
            last_error_object: body.last_error_object.unwrap_or_default(),
        })
    }

    fn write_concern(&self) -> Feature<&WriteConcern> {
        self.options.write_concern.as_ref().into()
    }

    fn retryability(&self) -> Retryability {
        Retryability::Write
    }

    fn max_time(&self) -> Option<Duration> {
        self.options.max_time
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FindAndModifyBody {
    #[serde(default)]
    value: Option<Document>,
    last_error_object: Option<LastErrorObject>,
}
