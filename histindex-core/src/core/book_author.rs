//! The Book–Author relation.

use crate::core::composed::{ComposedEntity, ComposedEntityManager};
use crate::core::entity::{placeholders, Entity, MAX_WHERE_ELEMENTS};
use crate::{Author, Book, Result};
use rusqlite::{Connection, Row};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookAuthor {
    pub book_id: i64,
    pub author_id: i64,
}

impl BookAuthor {
    pub const BOOK_ID: &'static str = "BookId";
    pub const AUTHOR_ID: &'static str = "AuthorId";

    pub fn new(book_id: i64, author_id: i64) -> Self {
        Self { book_id, author_id }
    }

    pub fn of(book: &Book, author: &Author) -> Self {
        Self::new(book.id, author.id)
    }
}

impl ComposedEntity for BookAuthor {
    const ENTITY_NAME: &'static str = "BookAuthor";
    const TABLE_NAME: &'static str = "BookAuthor";
    const TABLE_ALIAS: &'static str = "boau";
    const FIRST_ID_COLUMN: &'static str = BookAuthor::BOOK_ID;
    const SECOND_ID_COLUMN: &'static str = BookAuthor::AUTHOR_ID;

    fn key(&self) -> (i64, i64) {
        (self.book_id, self.author_id)
    }

    fn from_row(key: (i64, i64), _row: &Row, _offset: usize) -> rusqlite::Result<Self> {
        Ok(Self::new(key.0, key.1))
    }
}

impl ComposedEntityManager<BookAuthor> {
    /// Replaces `book.authors` with the stored authors, in author order.
    pub fn populate_authors(&self, conn: &Connection, book: &mut Book) -> Result<()> {
        let authors = Author::manager();
        let sql = format!(
            "SELECT {} FROM {} {} INNER JOIN {} {} ON {}.{} = {}.{} WHERE {}.{} = ? ORDER BY {}",
            authors.columns_for_select(),
            authors.table_name(),
            authors.table_alias(),
            self.table_name(),
            self.table_alias(),
            self.table_alias(),
            BookAuthor::AUTHOR_ID,
            authors.table_alias(),
            authors.id_column(),
            self.table_alias(),
            BookAuthor::BOOK_ID,
            authors.order_by_for_select()
        );
        let loaded = authors.query_list(conn, &sql, [book.id])?;

        book.clear_authors();
        for author in loaded {
            book.add_author(author);
        }
        Ok(())
    }

    /// Populates the authors of every book in `books`, one query per
    /// [`MAX_WHERE_ELEMENTS`] books.
    pub fn populate_authors_many(&self, conn: &Connection, books: &mut [Book]) -> Result<()> {
        if books.is_empty() {
            return Ok(());
        }

        let authors = Author::manager();
        let mut positions: HashMap<i64, Vec<usize>> = HashMap::new();
        for (idx, book) in books.iter_mut().enumerate() {
            book.clear_authors();
            positions.entry(book.id).or_default().push(idx);
        }
        let mut ids: Vec<i64> = positions.keys().copied().collect();
        ids.sort_unstable();

        for chunk in ids.chunks(MAX_WHERE_ELEMENTS) {
            let sql = format!(
                "SELECT {}.{}, {} FROM {} {} INNER JOIN {} {} ON {}.{} = {}.{} WHERE {}.{} IN ({}) ORDER BY {}",
                self.table_alias(),
                BookAuthor::BOOK_ID,
                authors.columns_for_select(),
                authors.table_name(),
                authors.table_alias(),
                self.table_name(),
                self.table_alias(),
                self.table_alias(),
                BookAuthor::AUTHOR_ID,
                authors.table_alias(),
                authors.id_column(),
                self.table_alias(),
                BookAuthor::BOOK_ID,
                placeholders(chunk.len()),
                authors.order_by_for_select()
            );
            log::debug!("{sql}");

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(chunk), |row| {
                    Ok((row.get::<_, i64>(0)?, authors.read(row, 1)?))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            for (book_id, author) in rows {
                match positions.get(&book_id) {
                    Some(indices) => {
                        for &idx in indices {
                            books[idx].add_author(author.clone());
                        }
                    }
                    None => log::warn!("author {} linked to unexpected book {}", author.id, book_id),
                }
            }
        }
        Ok(())
    }

    pub fn delete_authors_from_book(&self, conn: &Connection, book_id: i64) -> Result<usize> {
        self.delete_by_first(conn, book_id)
    }

    pub fn delete_author_from_books(&self, conn: &Connection, author_id: i64) -> Result<usize> {
        self.delete_by_second(conn, author_id)
    }

    pub fn book_ids_for_author(&self, conn: &Connection, author_id: i64) -> Result<Vec<i64>> {
        self.first_ids_for_second(conn, author_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Storage;
    use tempfile::NamedTempFile;

    fn stored_author(conn: &Connection, name: &str, last_name: &str) -> Author {
        let mut author = Author::new(name, last_name);
        Author::manager().insert(conn, &mut author).unwrap();
        author
    }

    fn stored_book(conn: &Connection, title: &str, authors: &[&Author]) -> Book {
        let mut book = Book::new(title);
        Book::manager().insert(conn, &mut book).unwrap();
        for author in authors {
            BookAuthor::manager()
                .insert(conn, &BookAuthor::of(&book, author))
                .unwrap();
        }
        book
    }

    #[test]
    fn test_populate_authors_orders_by_last_name() {
        let temp = NamedTempFile::new().unwrap();
        let storage = Storage::create(temp.path()).unwrap();
        let conn = storage.connection();

        let febvre = stored_author(conn, "Lucien", "Febvre");
        let bloch = stored_author(conn, "Marc", "Bloch");
        let mut book = stored_book(conn, "Annales", &[&febvre, &bloch]);

        // Population replaces whatever was there before.
        book.add_author(Author::new("Stale", "Entry"));
        BookAuthor::manager().populate_authors(conn, &mut book).unwrap();

        assert_eq!(book.authors, vec![bloch, febvre]);
    }

    #[test]
    fn test_populate_authors_many() {
        let temp = NamedTempFile::new().unwrap();
        let storage = Storage::create(temp.path()).unwrap();
        let conn = storage.connection();

        let bloch = stored_author(conn, "Marc", "Bloch");
        let braudel = stored_author(conn, "Fernand", "Braudel");
        let annales = stored_book(conn, "Annales", &[&bloch]);
        let med = stored_book(conn, "La Méditerranée", &[&braudel]);
        let orphan = stored_book(conn, "Anonymous", &[]);

        let mut books = vec![annales, med, orphan];
        BookAuthor::manager()
            .populate_authors_many(conn, &mut books)
            .unwrap();

        assert_eq!(books[0].authors, vec![bloch]);
        assert_eq!(books[1].authors, vec![braudel]);
        assert!(books[2].authors.is_empty());
    }

    #[test]
    fn test_author_relation_deletes() {
        let temp = NamedTempFile::new().unwrap();
        let storage = Storage::create(temp.path()).unwrap();
        let conn = storage.connection();
        let manager = BookAuthor::manager();

        let bloch = stored_author(conn, "Marc", "Bloch");
        let febvre = stored_author(conn, "Lucien", "Febvre");
        let first = stored_book(conn, "Annales", &[&bloch, &febvre]);
        let second = stored_book(conn, "Métier d'historien", &[&bloch]);

        assert_eq!(
            manager.book_ids_for_author(conn, bloch.id).unwrap(),
            vec![first.id, second.id]
        );
        assert_eq!(manager.delete_author_from_books(conn, bloch.id).unwrap(), 2);
        assert!(manager.book_ids_for_author(conn, bloch.id).unwrap().is_empty());

        assert_eq!(manager.delete_authors_from_book(conn, first.id).unwrap(), 1);
        assert!(manager.load_by_first(conn, first.id).unwrap().is_empty());
    }
}
