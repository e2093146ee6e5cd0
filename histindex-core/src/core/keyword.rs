use crate::core::entity::{text_column, Entity};
use rusqlite::{Row, ToSql};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Keyword {
    pub id: i64,
    pub name: String,
}

impl Keyword {
    pub const NAME: &'static str = "Name";

    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: 0,
            name: name.into(),
        }
    }
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl Entity for Keyword {
    const ENTITY_NAME: &'static str = "Keyword";
    const TABLE_NAME: &'static str = "Keywords";
    const TABLE_ALIAS: &'static str = "KWD";
    const COLUMNS: &'static [&'static str] = &[Keyword::NAME];
    const ORDER_BY: &'static [&'static str] = &[Keyword::NAME];

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn from_columns(row: &Row, offset: usize) -> rusqlite::Result<Self> {
        Ok(Self::new(text_column(row, offset)?.unwrap_or_default()))
    }

    fn column_values(&self) -> Vec<&dyn ToSql> {
        vec![&self.name]
    }
}
