use crate::core::entity::{text_column, Entity};
use rusqlite::{Row, ToSql};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Author {
    pub id: i64,
    pub name: String,
    pub last_name: String,
}

impl Author {
    pub const NAME: &'static str = "Name";
    pub const LAST_NAME: &'static str = "LastName";

    pub fn new(name: impl Into<String>, last_name: impl Into<String>) -> Self {
        Self {
            id: 0,
            name: name.into(),
            last_name: last_name.into(),
        }
    }

    /// `"LastName, Name"`, the form used in every listing.
    pub fn full_name(&self) -> String {
        format!("{}, {}", self.last_name, self.name)
    }
}

impl fmt::Display for Author {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name())
    }
}

impl Entity for Author {
    const ENTITY_NAME: &'static str = "Author";
    const TABLE_NAME: &'static str = "Authors";
    const TABLE_ALIAS: &'static str = "ATH";
    const COLUMNS: &'static [&'static str] = &[Author::NAME, Author::LAST_NAME];
    const ORDER_BY: &'static [&'static str] = &[Author::LAST_NAME, Author::NAME];

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn from_columns(row: &Row, offset: usize) -> rusqlite::Result<Self> {
        Ok(Self {
            id: 0,
            name: text_column(row, offset)?.unwrap_or_default(),
            last_name: text_column(row, offset + 1)?.unwrap_or_default(),
        })
    }

    fn column_values(&self) -> Vec<&dyn ToSql> {
        vec![&self.name, &self.last_name]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_name_puts_last_name_first() {
        let author = Author::new("Marc", "Bloch");
        assert_eq!(author.full_name(), "Bloch, Marc");
        assert_eq!(author.to_string(), "Bloch, Marc");
    }

    #[test]
    fn test_serializes_camel_case() {
        let json = serde_json::to_value(Author::new("Lucien", "Febvre")).unwrap();
        assert_eq!(json["lastName"], "Febvre");
        assert_eq!(json["id"], 0);
    }
}
