//! High-level operations over a HistIndex database.

use crate::core::composed::ComposedEntity;
use crate::core::entity::Entity;
use crate::{
    Author, Book, BookAuthor, HistIndexError, Keyword, Quote, QuoteFilter, QuoteKeyword, Result,
    SearchSummary, Source, Storage,
};
use rusqlite::Connection;
use std::collections::HashSet;
use std::path::Path;

/// An open HistIndex library backed by a SQLite database.
///
/// `Library` is the entry point for every mutation. Each save or delete runs
/// in its own transaction, and deletes clean up the join tables and dependent
/// quotes themselves; foreign keys are left unenforced.
pub struct Library {
    storage: Storage,
}

impl Library {
    /// Creates a new, empty library at `path`. Existing HistIndex tables in
    /// that file are dropped.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self {
            storage: Storage::create(path)?,
        })
    }

    /// Opens an existing library, upgrading older schemas in place.
    ///
    /// # Errors
    ///
    /// Returns [`HistIndexError::InvalidDatabase`] if the file lacks the
    /// HistIndex tables.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self {
            storage: Storage::open(path)?,
        })
    }

    pub fn connection(&self) -> &Connection {
        self.storage.connection()
    }

    pub fn path(&self) -> &Path {
        self.storage.path()
    }

    /// File name of the database, as shown in export headers.
    pub fn filename(&self) -> String {
        self.path()
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Human-friendly name derived from the file stem (`"thesis-notes.db"` is
    /// `"Thesis Notes"`).
    pub fn title(&self) -> String {
        let stem = self
            .path()
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("Untitled");
        humanize(stem)
    }

    /// Runs `f` inside a transaction, committing only if it succeeds.
    fn in_transaction<T>(&mut self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let tx = self.storage.connection_mut().transaction()?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Runs a save in a transaction. A new entity whose save is rolled back
    /// gets its id reset to `0`.
    fn save_with<T: Entity>(
        &mut self,
        entity: &mut T,
        f: impl FnOnce(&Connection, &mut T) -> Result<()>,
    ) -> Result<()> {
        let was_new = entity.id() == 0;
        let result = self.in_transaction(|conn| f(conn, entity));
        if result.is_err() && was_new {
            entity.set_id(0);
        }
        result
    }

    // ── Authors ────────────────────────────────────────────────────

    pub fn save_author(&mut self, author: &mut Author) -> Result<()> {
        validate_author(author)?;
        self.save_with(author, store)
    }

    pub fn get_author(&self, id: i64) -> Result<Author> {
        Author::manager().get(self.connection(), id)
    }

    pub fn list_authors(&self) -> Result<Vec<Author>> {
        Author::manager().load_all(self.connection())
    }

    /// Deletes the author and unlinks it from every book.
    pub fn delete_author(&mut self, id: i64) -> Result<()> {
        self.in_transaction(|conn| {
            let unlinked = BookAuthor::manager().delete_author_from_books(conn, id)?;
            log::debug!("unlinked author {id} from {unlinked} book(s)");
            remove::<Author>(conn, id)
        })
    }

    // ── Books ──────────────────────────────────────────────────────

    /// Saves the book and replaces its author links with `book.authors`.
    pub fn save_book(&mut self, book: &mut Book) -> Result<()> {
        validate_book(book)?;
        self.save_with(book, |conn, book| {
            if book.id != 0 {
                BookAuthor::manager().delete_authors_from_book(conn, book.id)?;
            }
            store(conn, book)?;
            for author in &book.authors {
                Author::manager().get(conn, author.id)?;
                BookAuthor::manager().insert(conn, &BookAuthor::of(book, author))?;
            }
            Ok(())
        })
    }

    /// Loads a book with its authors.
    pub fn get_book(&self, id: i64) -> Result<Book> {
        let mut book = Book::manager().get(self.connection(), id)?;
        BookAuthor::manager().populate_authors(self.connection(), &mut book)?;
        Ok(book)
    }

    /// Every book with its authors, sorted by description.
    pub fn list_books(&self) -> Result<Vec<Book>> {
        let mut books = Book::manager().load_all(self.connection())?;
        BookAuthor::manager().populate_authors_many(self.connection(), &mut books)?;
        books.sort_by_cached_key(|book| (book.description(), book.id));
        Ok(books)
    }

    /// Deletes the book together with its author links and every quote taken from it.
    pub fn delete_book(&mut self, id: i64) -> Result<()> {
        self.in_transaction(|conn| {
            let quotes = Quote::manager();
            for quote_id in quotes.quote_ids_for_book(conn, id)? {
                QuoteKeyword::manager().delete_keywords_from_quote(conn, quote_id)?;
            }
            let removed = quotes.delete_all_quotes_from_book(conn, id)?;
            log::debug!("removed {removed} quote(s) of book {id}");
            BookAuthor::manager().delete_authors_from_book(conn, id)?;
            remove::<Book>(conn, id)
        })
    }

    // ── Sources ────────────────────────────────────────────────────

    pub fn save_source(&mut self, source: &mut Source) -> Result<()> {
        validate_source(source)?;
        self.save_with(source, store)
    }

    pub fn get_source(&self, id: i64) -> Result<Source> {
        Source::manager().get(self.connection(), id)
    }

    pub fn list_sources(&self) -> Result<Vec<Source>> {
        Source::manager().load_all(self.connection())
    }

    /// Deletes the source and every quote taken from it.
    pub fn delete_source(&mut self, id: i64) -> Result<()> {
        self.in_transaction(|conn| {
            let quotes = Quote::manager();
            for quote_id in quotes.quote_ids_for_source(conn, id)? {
                QuoteKeyword::manager().delete_keywords_from_quote(conn, quote_id)?;
            }
            let removed = quotes.delete_all_quotes_from_source(conn, id)?;
            log::debug!("removed {removed} quote(s) of source {id}");
            remove::<Source>(conn, id)
        })
    }

    // ── Keywords ───────────────────────────────────────────────────

    pub fn save_keyword(&mut self, keyword: &mut Keyword) -> Result<()> {
        validate_keyword(keyword)?;
        self.save_with(keyword, store)
    }

    pub fn get_keyword(&self, id: i64) -> Result<Keyword> {
        Keyword::manager().get(self.connection(), id)
    }

    pub fn list_keywords(&self) -> Result<Vec<Keyword>> {
        Keyword::manager().load_all(self.connection())
    }

    pub fn delete_keyword(&mut self, id: i64) -> Result<()> {
        self.in_transaction(|conn| {
            QuoteKeyword::manager().delete_keyword_from_quotes(conn, id)?;
            remove::<Keyword>(conn, id)
        })
    }

    // ── Quotes ─────────────────────────────────────────────────────

    /// Saves the quote and replaces its keyword links with `quote.keywords`.
    ///
    /// # Errors
    ///
    /// Returns [`HistIndexError::ValidationFailed`] if the quote has no text or
    /// does not name exactly one of book and source, and
    /// [`HistIndexError::EntityNotFound`] if the book, source or a keyword is
    /// not stored.
    pub fn save_quote(&mut self, quote: &mut Quote) -> Result<()> {
        validate_quote(quote)?;
        self.save_with(quote, |conn, quote| {
            if let Some(book_id) = quote.book_id() {
                Book::manager().get(conn, book_id)?;
            }
            if let Some(source_id) = quote.source_id() {
                Source::manager().get(conn, source_id)?;
            }
            if quote.id != 0 {
                QuoteKeyword::manager().delete_keywords_from_quote(conn, quote.id)?;
            }
            store(conn, quote)?;

            let mut linked = HashSet::new();
            for keyword in &quote.keywords {
                if !linked.insert(keyword.id) {
                    continue;
                }
                Keyword::manager().get(conn, keyword.id)?;
                QuoteKeyword::manager().insert(conn, &QuoteKeyword::of(quote, keyword))?;
            }
            Ok(())
        })
    }

    /// Loads a quote with its book, source and keywords attached.
    pub fn get_quote(&self, id: i64) -> Result<Quote> {
        let quote = Quote::manager().get(self.connection(), id)?;
        let mut quotes = vec![quote];
        Quote::manager().populate_related_info(self.connection(), &mut quotes)?;
        quotes
            .pop()
            .ok_or_else(|| HistIndexError::not_found(Quote::ENTITY_NAME, id))
    }

    pub fn list_quotes(&self) -> Result<Vec<Quote>> {
        let mut quotes = Quote::manager().load_all(self.connection())?;
        Quote::manager().populate_related_info(self.connection(), &mut quotes)?;
        Ok(quotes)
    }

    pub fn delete_quote(&mut self, id: i64) -> Result<()> {
        self.in_transaction(|conn| {
            QuoteKeyword::manager().delete_keywords_from_quote(conn, id)?;
            remove::<Quote>(conn, id)
        })
    }

    // ── Search ─────────────────────────────────────────────────────

    /// Quotes matching `filter`, populated and in display order.
    pub fn search_quotes(&self, filter: &QuoteFilter) -> Result<Vec<Quote>> {
        let mut quotes = Quote::manager().search(self.connection(), filter)?;
        log::debug!("search matched {} quote(s)", quotes.len());
        Quote::manager().populate_related_info(self.connection(), &mut quotes)?;
        Ok(quotes)
    }

    /// Resolves the ids in `filter` to display names. Ids that no longer
    /// exist are left out.
    pub fn describe_filter(&self, filter: &QuoteFilter) -> Result<SearchSummary> {
        let conn = self.connection();

        let mut books = Book::manager().load_many(conn, &filter.books)?;
        BookAuthor::manager().populate_authors_many(conn, &mut books)?;

        Ok(SearchSummary {
            text: filter.text_filter().map(str::to_string),
            keywords: names(Keyword::manager().load_many(conn, &filter.keywords)?),
            authors: names(Author::manager().load_many(conn, &filter.authors)?),
            books: names(books),
            sources: names(Source::manager().load_many(conn, &filter.sources)?),
        })
    }
}

fn names<T: ToString>(entities: Vec<T>) -> Vec<String> {
    entities.iter().map(ToString::to_string).collect()
}

/// Inserts unsaved entities, updates stored ones.
fn store<T: Entity>(conn: &Connection, entity: &mut T) -> Result<()> {
    let manager = T::manager();
    if entity.id() == 0 {
        manager.insert(conn, entity)
    } else {
        manager.update(conn, entity)
    }
}

fn remove<T: Entity>(conn: &Connection, id: i64) -> Result<()> {
    if T::manager().delete(conn, id)? {
        Ok(())
    } else {
        Err(HistIndexError::not_found(T::ENTITY_NAME, id))
    }
}

fn invalid(message: &str) -> HistIndexError {
    HistIndexError::ValidationFailed(message.to_string())
}

fn is_blank(s: &str) -> bool {
    s.trim().is_empty()
}

fn validate_author(author: &Author) -> Result<()> {
    if is_blank(&author.name) {
        return Err(invalid("An author must have a name."));
    }
    if is_blank(&author.last_name) {
        return Err(invalid("An author must have a last name."));
    }
    Ok(())
}

fn validate_book(book: &Book) -> Result<()> {
    if is_blank(&book.title) {
        return Err(invalid("A book must have a title."));
    }
    if book.authors.is_empty() {
        return Err(invalid("A book must have at least one author."));
    }
    if book.authors.iter().any(|a| a.id == 0) {
        return Err(invalid("Save the authors before adding them to a book."));
    }
    Ok(())
}

fn validate_source(source: &Source) -> Result<()> {
    if is_blank(&source.title) {
        return Err(invalid("A source must have a title."));
    }
    Ok(())
}

fn validate_keyword(keyword: &Keyword) -> Result<()> {
    if is_blank(&keyword.name) {
        return Err(invalid("A keyword must have a name."));
    }
    Ok(())
}

fn validate_quote(quote: &Quote) -> Result<()> {
    if is_blank(&quote.text) {
        return Err(invalid("A quote must have its own text."));
    }
    if quote.book_id().is_some() == quote.source_id().is_some() {
        return Err(invalid(
            "A quote should be either from a book/article or a source.",
        ));
    }
    if quote.keywords.iter().any(|k| k.id == 0) {
        return Err(invalid("Save the keywords before adding them to a quote."));
    }
    Ok(())
}

fn humanize(filename: &str) -> String {
    filename
        .replace(['-', '_'], " ")
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(c) => c.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
