use std::{collections::HashMap, sync::Arc, time::Duration};

use derive_where::derive_where;
use serde::{de::Error as SerdeError, Deserialize, Deserializer, Serialize};
use typed_builder::TypedBuilder;

use crate::{
    error::{Error, Result},
    options::ServerAddress,
    sdam::ServerDescription,
    serde_util,
};

/// Describes which servers are suitable for a given operation.
#[derive(Clone, derive_more::Display)]
#[derive_where(Debug)]
#[non_exhaustive]
pub enum SelectionCriteria {
    /// A read preference that describes the suitable servers based on the server type, max
    /// staleness, and server tags.
    #[display("ReadPreference {_0}")]
    ReadPreference(ReadPreference),

    /// A predicate used to filter servers that are considered suitable.
    #[display("Custom predicate")]
    Predicate(#[derive_where(skip)] Predicate),
}

impl PartialEq for SelectionCriteria {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::ReadPreference(r1), Self::ReadPreference(r2)) => r1 == r2,
            _ => false,
        }
    }
}

impl From<ReadPreference> for SelectionCriteria {
    fn from(read_pref: ReadPreference) -> Self {
        Self::ReadPreference(read_pref)
    }
}

impl SelectionCriteria {
    pub(crate) fn as_read_pref(&self) -> Option<&ReadPreference> {
        match self {
            Self::ReadPreference(ref read_pref) => Some(read_pref),
            Self::Predicate(..) => None,
        }
    }

    /// Criteria matching only the server at `address`, used to send `getMore` to the server that
    /// owns a cursor.
    pub(crate) fn from_address(address: ServerAddress) -> Self {
        SelectionCriteria::Predicate(Arc::new(move |server| server.address == address))
    }
}

impl<'de> Deserialize<'de> for SelectionCriteria {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(SelectionCriteria::ReadPreference(
            ReadPreference::deserialize(deserializer)?,
        ))
    }
}

/// A predicate used to filter servers that are considered suitable.
pub type Predicate = Arc<dyn Send + Sync + Fn(&ServerDescription) -> bool>;

/// Specifies how a read operation is routed to the members of a replica set.
///
/// `tag_sets` target specific members, and `max_staleness` bounds how far a secondary may lag
/// behind the primary to remain eligible. The staleness bound is sent to the server as
/// `maxStalenessSeconds`.
#[allow(missing_docs)]
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum ReadPreference {
    /// Only route this operation to the primary.
    Primary,

    /// Only route this operation to a secondary.
    Secondary {
        options: Option<ReadPreferenceOptions>,
    },

    /// Route this operation to the primary if it's available, falling back to the secondaries.
    PrimaryPreferred {
        options: Option<ReadPreferenceOptions>,
    },

    /// Route this operation to a secondary if one is available, falling back to the primary.
    SecondaryPreferred {
        options: Option<ReadPreferenceOptions>,
    },

    /// Route this operation to the lowest-latency member regardless of its role.
    Nearest {
        options: Option<ReadPreferenceOptions>,
    },
}

impl std::fmt::Display for ReadPreference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{ Mode: {}", self.mode())?;

        if let Some(options) = self.options() {
            if let Some(ref tag_sets) = options.tag_sets {
                write!(f, ", Tag Sets: {tag_sets:?}")?;
            }
            if let Some(ref max_staleness) = options.max_staleness {
                write!(f, ", Max Staleness: {max_staleness:?}")?;
            }
        }

        write!(f, " }}")
    }
}

impl<'de> Deserialize<'de> for ReadPreference {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct ReadPreferenceHelper {
            mode: String,
            #[serde(flatten)]
            options: ReadPreferenceOptions,
        }
        let helper = ReadPreferenceHelper::deserialize(deserializer)?;
        let options = Some(helper.options);
        match helper.mode.to_ascii_lowercase().as_str() {
            "primary" => {
                if options.as_ref().is_some_and(|o| !o.is_default()) {
                    return Err(D::Error::custom(
                        "cannot specify options for primary read preference",
                    ));
                }
                Ok(ReadPreference::Primary)
            }
            "secondary" => Ok(ReadPreference::Secondary { options }),
            "primarypreferred" => Ok(ReadPreference::PrimaryPreferred { options }),
            "secondarypreferred" => Ok(ReadPreference::SecondaryPreferred { options }),
            "nearest" => Ok(ReadPreference::Nearest { options }),
            other => Err(D::Error::custom(format!(
                "unknown read preference mode: {other}"
            ))),
        }
    }
}

impl Serialize for ReadPreference {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        #[serde_with::skip_serializing_none]
        #[derive(Serialize)]
        struct ReadPreferenceHelper<'a> {
            mode: &'static str,
            #[serde(flatten)]
            options: Option<&'a ReadPreferenceOptions>,
        }

        ReadPreferenceHelper {
            mode: self.mode(),
            options: self.options(),
        }
        .serialize(serializer)
    }
}

/// Options for the non-primary read preference modes.
#[serde_with::skip_serializing_none]
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, TypedBuilder)]
#[builder(field_defaults(default, setter(into)))]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct ReadPreferenceOptions {
    /// Tag sets checked in order; the first one matching at least one server wins.
    pub tag_sets: Option<Vec<TagSet>>,

    /// The maximum replication lag a secondary may have to remain eligible. Must be at least 90
    /// seconds.
    #[serde(
        rename = "maxStalenessSeconds",
        default,
        with = "serde_util::duration_option_as_int_seconds"
    )]
    pub max_staleness: Option<Duration>,
}

impl ReadPreferenceOptions {
    pub(crate) fn is_default(&self) -> bool {
        self.max_staleness.is_none()
            && self
                .tag_sets
                .as_ref()
                .is_none_or(|ts| ts.is_empty() || ts[..] == [HashMap::default()])
    }
}

impl ReadPreference {
    pub(crate) fn mode(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Secondary { .. } => "secondary",
            Self::PrimaryPreferred { .. } => "primaryPreferred",
            Self::SecondaryPreferred { .. } => "secondaryPreferred",
            Self::Nearest { .. } => "nearest",
        }
    }

    pub(crate) fn options(&self) -> Option<&ReadPreferenceOptions> {
        match self {
            Self::Primary => None,
            Self::Secondary { options }
            | Self::PrimaryPreferred { options }
            | Self::SecondaryPreferred { options }
            | Self::Nearest { options } => options.as_ref(),
        }
    }

    pub(crate) fn max_staleness(&self) -> Option<Duration> {
        self.options().and_then(|options| options.max_staleness)
    }

    pub(crate) fn tag_sets(&self) -> Option<&Vec<TagSet>> {
        self.options().and_then(|options| options.tag_sets.as_ref())
    }

    fn options_mut(&mut self, what: &str) -> Result<&mut ReadPreferenceOptions> {
        let options = match self {
            Self::Primary => {
                return Err(Error::invalid_argument(format!(
                    "{what} can only be specified when a non-primary mode is specified"
                )));
            }
            Self::Secondary { ref mut options }
            | Self::PrimaryPreferred { ref mut options }
            | Self::SecondaryPreferred { ref mut options }
            | Self::Nearest { ref mut options } => options,
        };
        Ok(options.get_or_insert_with(Default::default))
    }

    /// Returns this read preference with the given tag sets. Fails for `Primary`.
    pub fn with_tags(mut self, tag_sets: Vec<TagSet>) -> Result<Self> {
        self.options_mut("read preference tags")?.tag_sets = Some(tag_sets);
        Ok(self)
    }

    /// Returns this read preference with the given max staleness. Fails for `Primary`.
    pub fn with_max_staleness(mut self, max_staleness: Duration) -> Result<Self> {
        self.options_mut("max staleness")?.max_staleness = Some(max_staleness);
        Ok(self)
    }
}

/// A read preference tag set.
pub type TagSet = HashMap<String, String>;

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::bson::doc;

    #[test]
    fn read_preference_document() {
        let read_pref = ReadPreference::Secondary { options: None }
            .with_max_staleness(Duration::from_secs(120))
            .unwrap();
        assert_eq!(
            crate::bson::to_document(&read_pref).unwrap(),
            doc! { "mode": "secondary", "maxStalenessSeconds": 120 }
        );

        assert_eq!(
            crate::bson::to_document(&ReadPreference::Primary).unwrap(),
            doc! { "mode": "primary" }
        );
    }

    #[test]
    fn primary_rejects_options() {
        assert!(ReadPreference::Primary
            .with_tags(vec![TagSet::new()])
            .is_err());
        let parsed: std::result::Result<ReadPreference, _> = crate::bson::from_document(
            doc! { "mode": "primary", "maxStalenessSeconds": 100 },
        );
        assert!(parsed.is_err());
    }
}
