use crate::core::entity::{text_column, Entity};
use rusqlite::{Row, ToSql};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A primary source: an archive file, a letter, a register.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    pub id: i64,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_info: Option<String>,
}

impl Source {
    pub const TITLE: &'static str = "Title";
    pub const EXTRA_INFO: &'static str = "ExtraInfo";

    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: 0,
            title: title.into(),
            extra_info: None,
        }
    }

    pub fn with_extra_info(mut self, extra_info: impl Into<String>) -> Self {
        self.extra_info = Some(extra_info.into());
        self
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.title)
    }
}

impl Entity for Source {
    const ENTITY_NAME: &'static str = "Source";
    const TABLE_NAME: &'static str = "Sources";
    const TABLE_ALIAS: &'static str = "SRC";
    const COLUMNS: &'static [&'static str] = &[Source::TITLE, Source::EXTRA_INFO];
    const ORDER_BY: &'static [&'static str] = &[Source::TITLE];

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn from_columns(row: &Row, offset: usize) -> rusqlite::Result<Self> {
        Ok(Self {
            id: 0,
            title: text_column(row, offset)?.unwrap_or_default(),
            extra_info: text_column(row, offset + 1)?.filter(|info| !info.is_empty()),
        })
    }

    fn column_values(&self) -> Vec<&dyn ToSql> {
        vec![&self.title, &self.extra_info]
    }
}
