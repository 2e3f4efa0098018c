// ── Entity identity ──
//
// Every hub entity is addressed as `<domain>.<object_id>`, e.g.
// `light.kitchen`. The domain groups entities and actions of one kind.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Validated `<domain>.<object_id>` identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityId {
    raw: String,
    dot: usize,
}

impl EntityId {
    /// Parse an id; fails on empty input, a missing `.`, or an empty part.
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        let raw = raw.trim();
        match raw.find('.') {
            Some(dot) if dot > 0 && dot + 1 < raw.len() => Ok(Self {
                raw: raw.to_owned(),
                dot,
            }),
            _ => Err(CoreError::InvalidEntityId {
                entity_id: raw.to_owned(),
            }),
        }
    }

    pub fn domain(&self) -> &str {
        &self.raw[..self.dot]
    }

    pub fn object_id(&self) -> &str {
        &self.raw[self.dot + 1..]
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for EntityId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for EntityId {
    type Error = CoreError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<EntityId> for String {
    fn from(id: EntityId) -> Self {
        id.raw
    }
}

impl AsRef<str> for EntityId {
    fn as_ref(&self) -> &str {
        &self.raw
    }
}
