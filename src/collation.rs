use serde::{Deserialize, Deserializer, Serialize, Serializer};
use typed_builder::TypedBuilder;

/// Language-specific rules for string comparison, forwarded verbatim to the server.
#[serde_with::skip_serializing_none]
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
#[builder(field_defaults(default, setter(into)))]
#[non_exhaustive]
pub struct Collation {
    /// The ICU locale.
    #[builder(!default)]
    pub locale: String,

    /// The level of comparison to perform.
    pub strength: Option<CollationStrength>,

    /// Whether to include a separate level for case differences.
    pub case_level: Option<bool>,

    /// The sort order of case differences during tertiary level comparisons.
    pub case_first: Option<CollationCaseFirst>,

    /// Whether to compare numeric strings as numbers or strings.
    pub numeric_ordering: Option<bool>,

    /// Whether whitespace and punctuation are considered base characters.
    pub alternate: Option<CollationAlternate>,

    /// Which characters are ignorable when `alternate` is "shifted".
    pub max_variable: Option<CollationMaxVariable>,

    /// Whether text is normalized to Unicode NFD before comparison.
    pub normalization: Option<bool>,

    /// Whether strings with diacritics sort from the back of the string.
    pub backwards: Option<bool>,
}

/// ICU comparison level, sent as the integers 1 through 5.
#[derive(Debug, Clone, Copy, PartialEq)]
#[non_exhaustive]
pub enum CollationStrength {
    /// Base characters only.
    Primary,

    /// Base characters and diacritics.
    Secondary,

    /// Base characters, diacritics and case. The server's default.
    Tertiary,

    /// Also distinguishes punctuation when `alternate` is "shifted".
    Quaternary,

    /// Tie-breaks on code point values.
    Identical,
}

impl CollationStrength {
    fn level(self) -> u32 {
        match self {
            CollationStrength::Primary => 1,
            CollationStrength::Secondary => 2,
            CollationStrength::Tertiary => 3,
            CollationStrength::Quaternary => 4,
            CollationStrength::Identical => 5,
        }
    }
}

impl Serialize for CollationStrength {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_i32(self.level() as i32)
    }
}

impl<'de> Deserialize<'de> for CollationStrength {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        match u32::deserialize(deserializer)? {
            1 => Ok(CollationStrength::Primary),
            2 => Ok(CollationStrength::Secondary),
            3 => Ok(CollationStrength::Tertiary),
            4 => Ok(CollationStrength::Quaternary),
            5 => Ok(CollationStrength::Identical),
            other => Err(serde::de::Error::custom(format!(
                "invalid collation strength: {other}"
            ))),
        }
    }
}

/// Sort order of case differences.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum CollationCaseFirst {
    /// Uppercase sorts before lowercase.
    Upper,

    /// Lowercase sorts before uppercase.
    Lower,

    /// Like `Lower`, with slight differences.
    Off,
}

/// Whether whitespace and punctuation count as base characters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[non_exhaustive]
pub enum CollationAlternate {
    /// They are compared as base characters.
    NonIgnorable,

    /// They are ignored, up to the strength's level.
    Shifted,
}

/// Which characters are ignorable under [`CollationAlternate::Shifted`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum CollationMaxVariable {
    /// Whitespace and punctuation.
    Punct,

    /// Whitespace only.
    Space,
}
