//! Shared domain enumerations aligned with persisted column values.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of publishable unit. Custom kinds carry their registered name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Post,
    Page,
    Custom(String),
}

impl ContentKind {
    pub fn as_str(&self) -> &str {
        match self {
            ContentKind::Post => "post",
            ContentKind::Page => "page",
            ContentKind::Custom(name) => name.as_str(),
        }
    }

    pub fn is_builtin(&self) -> bool {
        matches!(self, ContentKind::Post | ContentKind::Page)
    }
}

impl From<&str> for ContentKind {
    fn from(value: &str) -> Self {
        match value {
            "post" => ContentKind::Post,
            "page" => ContentKind::Page,
            other => ContentKind::Custom(other.to_string()),
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Taxonomy {
    Category,
    Tag,
}

impl Taxonomy {
    pub fn as_str(self) -> &'static str {
        match self {
            Taxonomy::Category => "category",
            Taxonomy::Tag => "tag",
        }
    }
}

impl TryFrom<&str> for Taxonomy {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "category" => Ok(Taxonomy::Category),
            "tag" => Ok(Taxonomy::Tag),
            _ => Err(()),
        }
    }
}
