use crate::core::entity::{text_column, Entity};
use crate::Author;
use rusqlite::{Row, ToSql};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A book or article. Authors live in the `BookAuthor` join table and are
/// only present after population.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub authors: Vec<Author>,
}

impl Book {
    pub const TITLE: &'static str = "Title";

    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: 0,
            title: title.into(),
            authors: Vec::new(),
        }
    }

    /// Appends `author` unless a stored author with the same id is already listed.
    pub fn add_author(&mut self, author: Author) {
        if author.id != 0 && self.authors.iter().any(|a| a.id == author.id) {
            return;
        }
        self.authors.push(author);
    }

    /// Removes the author with `author_id`, returning whether one was listed.
    pub fn remove_author(&mut self, author_id: i64) -> bool {
        let before = self.authors.len();
        self.authors.retain(|a| a.id != author_id);
        self.authors.len() != before
    }

    pub fn clear_authors(&mut self) {
        self.authors.clear();
    }

    pub fn authors_display(&self) -> String {
        self.authors
            .iter()
            .map(Author::full_name)
            .collect::<Vec<_>>()
            .join(";")
    }

    /// `"<authors>. <title>"`
    pub fn description(&self) -> String {
        format!("{}. {}", self.authors_display(), self.title)
    }
}

impl fmt::Display for Book {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description())
    }
}

impl Entity for Book {
    const ENTITY_NAME: &'static str = "Book";
    const TABLE_NAME: &'static str = "Books";
    const TABLE_ALIAS: &'static str = "BOK";
    const COLUMNS: &'static [&'static str] = &[Book::TITLE];
    const ORDER_BY: &'static [&'static str] = &[Book::TITLE];

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
        vec![&self.title]
    }
}
