//! Collection names and language pairs.

use crate::error::{ProtocolError, ProtocolResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A synchronizable collection.
///
/// The wire name of each kind is its lowercase variant name, which is also
/// the payload published on change channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    /// Flashcards.
    Cards,
    /// User word lists.
    WordLists,
    /// Imported documents.
    Imports,
    /// Processed content.
    Contents,
    /// Survey answers.
    Surveys,
    /// The persons roster.
    Persons,
    /// Per-word learning counters, correlated with definition ids.
    WordModelStats,
    /// Per-day learning counters.
    DayModelStats,
    /// Provider-backed dictionary definitions.
    Definitions,
}

impl EntityKind {
    /// Every entity kind, in declaration order.
    pub const ALL: [EntityKind; 9] = [
        EntityKind::Cards,
        EntityKind::WordLists,
        EntityKind::Imports,
        EntityKind::Contents,
        EntityKind::Surveys,
        EntityKind::Persons,
        EntityKind::WordModelStats,
        EntityKind::DayModelStats,
        EntityKind::Definitions,
    ];

    /// Returns the wire name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Cards => "cards",
            EntityKind::WordLists => "wordlists",
            EntityKind::Imports => "imports",
            EntityKind::Contents => "contents",
            EntityKind::Surveys => "surveys",
            EntityKind::Persons => "persons",
            EntityKind::WordModelStats => "wordmodelstats",
            EntityKind::DayModelStats => "daymodelstats",
            EntityKind::Definitions => "definitions",
        }
    }

    /// Returns true if rows of this kind are computed server-side and can
    /// not be written by clients.
    pub fn is_derived(&self) -> bool {
        matches!(
            self,
            EntityKind::WordModelStats | EntityKind::DayModelStats | EntityKind::Definitions
        )
    }

    /// Returns true if pulls of this kind depend on the user's language pair
    /// being backed by a definition provider.
    pub fn requires_language_pair(&self) -> bool {
        matches!(self, EntityKind::WordModelStats | EntityKind::Definitions)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = ProtocolError;

    fn from_str(s: &str) -> ProtocolResult<Self> {
        EntityKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ProtocolError::UnknownEntityKind(s.to_string()))
    }
}

/// The `(source, target)` language combination a user is learning.
///
/// This is the primary partition key of the definition cache. Its text
/// form is `from:to`, e.g. `zh-Hans:en`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LanguagePair {
    /// Source language (the language being learned).
    pub from: String,
    /// Target language (the language definitions are written in).
    pub to: String,
}

impl LanguagePair {
    /// Creates a language pair.
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

impl fmt::Display for LanguagePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.from, self.to)
    }
}

impl FromStr for LanguagePair {
    type Err = ProtocolError;

    fn from_str(s: &str) -> ProtocolResult<Self> {
        match s.split_once(':') {
            Some((from, to)) if !from.is_empty() && !to.is_empty() && !to.contains(':') => {
                Ok(Self::new(from, to))
            }
            _ => Err(ProtocolError::InvalidLanguagePair(s.to_string())),
        }
    }
}
