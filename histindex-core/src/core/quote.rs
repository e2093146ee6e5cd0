use crate::core::entity::{reference_column, text_column, Entity, EntityManager};
use crate::{Book, Keyword, Result, Source};
use rusqlite::{Connection, Row, ToSql};
use serde::{Deserialize, Serialize};

/// An excerpt taken either from a book or from a source.
///
/// The referenced book/source is stored by id; the full objects are only
/// attached by [`EntityManager::populate_related_info`]. Setting a reference
/// keeps the id and the attached object consistent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub id: i64,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default)]
    pub page: String,
    #[serde(default)]
    book_id: Option<i64>,
    #[serde(default)]
    source_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    book: Option<Book>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source: Option<Source>,
    #[serde(default)]
    pub keywords: Vec<Keyword>,
}

impl Quote {
    pub const TEXT: &'static str = "Text";
    pub const BOOK_ID: &'static str = "BookId";
    pub const SOURCE_ID: &'static str = "SourceId";
    pub const PAGE: &'static str = "Page";
    pub const COMMENT: &'static str = "Comment";

    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn book_id(&self) -> Option<i64> {
        self.book_id
    }

    pub fn book(&self) -> Option<&Book> {
        self.book.as_ref()
    }

    /// Attaches `book` and takes its id as the quote's book reference.
    pub fn set_book(&mut self, book: Option<Book>) {
        self.book_id = book.as_ref().map(|b| b.id).filter(|id| *id != 0);
        self.book = book;
    }

    /// Changes the book reference; an attached book with another id is dropped.
    pub fn set_book_id(&mut self, book_id: Option<i64>) {
        self.book_id = book_id.filter(|id| *id != 0);
        if self.book.as_ref().map(|b| b.id) != self.book_id {
            self.book = None;
        }
    }

    pub fn source_id(&self) -> Option<i64> {
        self.source_id
    }

    pub fn source(&self) -> Option<&Source> {
        self.source.as_ref()
    }

    pub fn set_source(&mut self, source: Option<Source>) {
        self.source_id = source.as_ref().map(|s| s.id).filter(|id| *id != 0);
        self.source = source;
    }

    pub fn set_source_id(&mut self, source_id: Option<i64>) {
        self.source_id = source_id.filter(|id| *id != 0);
        if self.source.as_ref().map(|s| s.id) != self.source_id {
            self.source = None;
        }
    }

    /// Numeric value of the leading digits of the page ("12-14" is 12, "iv" is 0).
    pub fn page_as_number(&self) -> i64 {
        let page = self.page.trim_start();
        let end = page
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(page.len());
        let digits = &page[..end];
        if digits.is_empty() {
            return 0;
        }
        digits.parse().unwrap_or(i64::MAX)
    }

    /// Where the quote was found: the book description, else the source title.
    pub fn where_description(&self) -> String {
        match (&self.book, &self.source) {
            (Some(book), _) => book.description(),
            (None, Some(source)) => source.title.clone(),
            (None, None) => "?".to_string(),
        }
    }

    pub fn keywords_display(&self) -> String {
        self.keywords
            .iter()
            .map(|k| k.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// The comment, if it holds anything besides whitespace.
    pub fn comment_text(&self) -> Option<&str> {
        self.comment
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }
}

impl Entity for Quote {
    const ENTITY_NAME: &'static str = "Quote";
    const TABLE_NAME: &'static str = "Quotes";
    const TABLE_ALIAS: &'static str = "QUO";
    const COLUMNS: &'static [&'static str] = &[
        Quote::TEXT,
        Quote::BOOK_ID,
        Quote::SOURCE_ID,
        Quote::PAGE,
        Quote::COMMENT,
    ];
    const ORDER_BY: &'static [&'static str] = &[Quote::BOOK_ID, Quote::SOURCE_ID, Quote::PAGE];

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn from_columns(row: &Row, offset: usize) -> rusqlite::Result<Self> {
        Ok(Self {
            text: text_column(row, offset)?.unwrap_or_default(),
            book_id: reference_column(row, offset + 1)?,
            source_id: reference_column(row, offset + 2)?,
            page: text_column(row, offset + 3)?.unwrap_or_default(),
            comment: text_column(row, offset + 4)?.filter(|c| !c.is_empty()),
            ..Self::default()
        })
    }

    fn column_values(&self) -> Vec<&dyn ToSql> {
        vec![
            &self.text,
            &self.book_id,
            &self.source_id,
            &self.page,
            &self.comment,
        ]
    }
}

impl EntityManager<Quote> {
    pub fn delete_all_quotes_from_book(&self, conn: &Connection, book_id: i64) -> Result<usize> {
        self.delete_by_reference(conn, Quote::BOOK_ID, book_id)
    }

    pub fn delete_all_quotes_from_source(&self, conn: &Connection, source_id: i64) -> Result<usize> {
        self.delete_by_reference(conn, Quote::SOURCE_ID, source_id)
    }

    pub fn quote_ids_for_book(&self, conn: &Connection, book_id: i64) -> Result<Vec<i64>> {
        self.ids_by_reference(conn, Quote::BOOK_ID, book_id)
    }

    pub fn quote_ids_for_source(&self, conn: &Connection, source_id: i64) -> Result<Vec<i64>> {
        self.ids_by_reference(conn, Quote::SOURCE_ID, source_id)
    }

    fn delete_by_reference(&self, conn: &Connection, column: &str, id: i64) -> Result<usize> {
        let sql = format!("DELETE FROM {} WHERE {} = ?", self.table_name(), column);
        log::debug!("{sql}");
        Ok(conn.execute(&sql, [id])?)
    }

    fn ids_by_reference(&self, conn: &Connection, column: &str, id: i64) -> Result<Vec<i64>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = ? ORDER BY {}",
            self.id_column(),
            self.table_name(),
            column,
            self.id_column()
        );
        let mut stmt = conn.prepare(&sql)?;
        let ids = stmt
            .query_map([id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i64>>>()?;
        Ok(ids)
    }
}
