//! Quote search: filter composition, related-info population and ordering.

use crate::core::composed::ComposedEntity;
use crate::core::entity::{placeholders, Entity, EntityManager};
use crate::{Book, BookAuthor, Quote, QuoteKeyword, Result, Source};
use rusqlite::types::Value;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;

/// Criteria for a quote search. Within one list any id matches; every
/// non-empty list (and the text, when set) must match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteFilter {
    #[serde(default)]
    pub keywords: Vec<i64>,
    #[serde(default)]
    pub books: Vec<i64>,
    #[serde(default)]
    pub authors: Vec<i64>,
    #[serde(default)]
    pub sources: Vec<i64>,
    #[serde(default)]
    pub text: Option<String>,
}

impl QuoteFilter {
    /// The text filter as entered, unless it is blank. Surrounding spaces
    /// are kept and take part in the match.
    pub fn text_filter(&self) -> Option<&str> {
        self.text.as_deref().filter(|t| !t.trim().is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
            && self.books.is_empty()
            && self.authors.is_empty()
            && self.sources.is_empty()
            && self.text_filter().is_none()
    }
}

/// A generated search statement and its positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub sql: String,
    pub params: Vec<Value>,
}

impl SearchQuery {
    pub fn build(filter: &QuoteFilter) -> Self {
        let quotes = Quote::manager();
        let keywords = QuoteKeyword::manager();
        let book_authors = BookAuthor::manager();
        let alias = quotes.table_alias();

        let mut sql = format!(
            "SELECT DISTINCT {} FROM {} {}",
            quotes.columns_for_select(),
            quotes.table_name(),
            alias
        );
        if !filter.keywords.is_empty() {
            sql.push_str(&format!(
                " INNER JOIN {} {} ON {}.{} = {}.{}",
                keywords.table_name(),
                keywords.table_alias(),
                keywords.table_alias(),
                QuoteKeyword::QUOTE_ID,
                alias,
                quotes.id_column()
            ));
        }
        if !filter.authors.is_empty() {
            sql.push_str(&format!(
                " INNER JOIN {} {} ON {}.{} = {}.{}",
                book_authors.table_name(),
                book_authors.table_alias(),
                book_authors.table_alias(),
                BookAuthor::BOOK_ID,
                alias,
                Quote::BOOK_ID
            ));
        }

        let mut conditions = Vec::new();
        let mut params = Vec::new();
        let mut id_condition = |table_alias: &str, column: &str, ids: &[i64]| {
            if ids.is_empty() {
                return;
            }
            conditions.push(format!(
                "{table_alias}.{column} IN ({})",
                placeholders(ids.len())
            ));
            params.extend(ids.iter().copied().map(Value::Integer));
        };
        id_condition(alias, Quote::BOOK_ID, &filter.books);
        id_condition(
            QuoteKeyword::TABLE_ALIAS,
            QuoteKeyword::KEYWORD_ID,
            &filter.keywords,
        );
        id_condition(
            BookAuthor::TABLE_ALIAS,
            BookAuthor::AUTHOR_ID,
            &filter.authors,
        );
        id_condition(alias, Quote::SOURCE_ID, &filter.sources);

        if let Some(text) = filter.text_filter() {
            conditions.push(format!("{alias}.{} LIKE ?", Quote::TEXT));
            params.push(Value::Text(format!("%{text}%")));
        }

        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        sql.push_str(" ORDER BY ");
        sql.push_str(&quotes.order_by_for_select());

        Self { sql, params }
    }
}

impl EntityManager<Quote> {
    /// Quotes matching `filter`, without related info.
    pub fn search(&self, conn: &Connection, filter: &QuoteFilter) -> Result<Vec<Quote>> {
        let query = SearchQuery::build(filter);
        self.query_list(
            conn,
            &query.sql,
            rusqlite::params_from_iter(query.params.iter()),
        )
    }

    /// Attaches books (with their authors), sources and keywords to `quotes`,
    /// then sorts them with [`compare_quotes`].
    pub fn populate_related_info(&self, conn: &Connection, quotes: &mut [Quote]) -> Result<()> {
        let book_ids: Vec<i64> = quotes
            .iter()
            .filter_map(Quote::book_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let source_ids: Vec<i64> = quotes
            .iter()
            .filter_map(Quote::source_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let mut books = Book::manager().load_many(conn, &book_ids)?;
        BookAuthor::manager().populate_authors_many(conn, &mut books)?;
        let books = Book::manager().index_by_id(books);
        let sources = Source::manager().index_by_id(Source::manager().load_many(conn, &source_ids)?);

        for quote in quotes.iter_mut() {
            if let Some(book_id) = quote.book_id() {
                match books.get(&book_id) {
                    Some(book) => quote.set_book(Some(book.clone())),
                    None => log::warn!("quote {} refers to missing book {}", quote.id, book_id),
                }
            }
            if let Some(source_id) = quote.source_id() {
                match sources.get(&source_id) {
                    Some(source) => quote.set_source(Some(source.clone())),
                    None => log::warn!("quote {} refers to missing source {}", quote.id, source_id),
                }
            }
        }

        QuoteKeyword::manager().populate_keywords_many(conn, quotes)?;
        quotes.sort_by(compare_quotes);
        Ok(())
    }
}

/// Display order for populated quotes: quotes from books first, by book
/// description; then by source title; then pages in numeric order with
/// unpaged quotes last; then by id.
pub fn compare_quotes(a: &Quote, b: &Quote) -> Ordering {
    let book_key = |q: &Quote| q.book().map(|book| (book.description(), book.id));
    let source_key = |q: &Quote| q.source().map(|source| (source.title.clone(), source.id));
    let page_key = |q: &Quote| (q.page.trim().is_empty(), q.page_as_number());

    match (book_key(a), book_key(b)) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| source_key(a).cmp(&source_key(b)))
    .then_with(|| page_key(a).cmp(&page_key(b)))
    .then_with(|| a.id.cmp(&b.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Author, Keyword, Storage};
    use tempfile::NamedTempFile;

    const SELECT: &str = "SELECT DISTINCT QUO.Id, QUO.Text, QUO.BookId, QUO.SourceId, QUO.Page, QUO.Comment FROM Quotes QUO";
    const ORDER: &str = " ORDER BY QUO.BookId, QUO.SourceId, QUO.Page, QUO.Id";

    #[test]
    fn test_empty_filter_selects_everything() {
        let query = SearchQuery::build(&QuoteFilter::default());
        assert_eq!(query.sql, format!("{SELECT}{ORDER}"));
        assert!(query.params.is_empty());
    }

    #[test]
    fn test_whitespace_text_is_ignored() {
        let filter = QuoteFilter {
            text: Some("   ".to_string()),
            ..QuoteFilter::default()
        };
        assert!(filter.is_empty());
        assert_eq!(SearchQuery::build(&filter).sql, format!("{SELECT}{ORDER}"));
    }

    #[test]
    fn test_text_is_bound_with_surrounding_spaces() {
        let filter = QuoteFilter {
            text: Some(" de ".to_string()),
            ..QuoteFilter::default()
        };
        let query = SearchQuery::build(&filter);
        assert_eq!(query.params, vec![Value::Text("% de %".to_string())]);
    }

    #[test]
    fn test_keyword_filter_joins_relation() {
        let filter = QuoteFilter {
            keywords: vec![4, 9],
            ..QuoteFilter::default()
        };
        let query = SearchQuery::build(&filter);
        assert_eq!(
            query.sql,
            format!(
                "{SELECT} INNER JOIN QuoteKeyword QKW ON QKW.QuoteId = QUO.Id WHERE QKW.KeywordId IN (?, ?){ORDER}"
            )
        );
        assert_eq!(query.params, vec![Value::Integer(4), Value::Integer(9)]);
    }

    #[test]
    fn test_all_filters_in_order() {
        let filter = QuoteFilter {
            keywords: vec![1],
            books: vec![2, 3],
            authors: vec![4],
            sources: vec![5],
            text: Some("grain".to_string()),
        };
        let query = SearchQuery::build(&filter);
        assert_eq!(
            query.sql,
            format!(
                "{SELECT} INNER JOIN QuoteKeyword QKW ON QKW.QuoteId = QUO.Id \
                 INNER JOIN BookAuthor boau ON boau.BookId = QUO.BookId \
                 WHERE QUO.BookId IN (?, ?) AND QKW.KeywordId IN (?) AND boau.AuthorId IN (?) \
                 AND QUO.SourceId IN (?) AND QUO.Text LIKE ?{ORDER}"
            )
        );
        assert_eq!(
            query.params,
            vec![
                Value::Integer(2),
                Value::Integer(3),
                Value::Integer(1),
                Value::Integer(4),
                Value::Integer(5),
                Value::Text("%grain%".to_string()),
            ]
        );
    }

    struct Fixture {
        _temp: NamedTempFile,
        storage: Storage,
        bloch: Author,
        annales: Book,
        register: Source,
        famine: Keyword,
        war: Keyword,
    }

    fn fixture() -> Fixture {
        let temp = NamedTempFile::new().unwrap();
        let storage = Storage::create(temp.path()).unwrap();
        let conn = storage.connection();

        let mut bloch = Author::new("Marc", "Bloch");
        Author::manager().insert(conn, &mut bloch).unwrap();
        let mut annales = Book::new("Annales");
        Book::manager().insert(conn, &mut annales).unwrap();
        BookAuthor::manager()
            .insert(conn, &BookAuthor::of(&annales, &bloch))
            .unwrap();
        annales.add_author(bloch.clone());

        let mut register = Source::new("Parish register");
        Source::manager().insert(conn, &mut register).unwrap();

        let mut famine = Keyword::new("Famine");
        let mut war = Keyword::new("War");
        Keyword::manager().insert(conn, &mut famine).unwrap();
        Keyword::manager().insert(conn, &mut war).unwrap();

        Fixture {
            _temp: temp,
            storage,
            bloch,
            annales,
            register,
            famine,
            war,
        }
    }

    fn insert_quote(
        conn: &Connection,
        text: &str,
        book: Option<&Book>,
        source: Option<&Source>,
        page: &str,
        keywords: &[&Keyword],
    ) -> Quote {
        let mut quote = Quote::new(text);
        quote.set_book_id(book.map(|b| b.id));
        quote.set_source_id(source.map(|s| s.id));
        quote.page = page.to_string();
        Quote::manager().insert(conn, &mut quote).unwrap();
        for keyword in keywords {
            QuoteKeyword::manager()
                .insert(conn, &QuoteKeyword::of(&quote, keyword))
                .unwrap();
        }
        quote
    }

    #[test]
    fn test_search_combines_filters() {
        let f = fixture();
        let conn = f.storage.connection();

        let bread = insert_quote(conn, "bread riots in spring", Some(&f.annales), None, "12", &[&f.famine, &f.war]);
        let _siege = insert_quote(conn, "the siege lasted", Some(&f.annales), None, "3", &[&f.war]);
        let _burial = insert_quote(conn, "bread given at burial", None, Some(&f.register), "", &[&f.famine]);

        let by_author_and_text = QuoteFilter {
            authors: vec![f.bloch.id],
            text: Some("bread".to_string()),
            ..QuoteFilter::default()
        };
        let found = Quote::manager().search(conn, &by_author_and_text).unwrap();
        assert_eq!(found.iter().map(|q| q.id).collect::<Vec<_>>(), vec![bread.id]);

        // A quote with two matching keywords is still listed once.
        let by_keywords = QuoteFilter {
            keywords: vec![f.famine.id, f.war.id],
            ..QuoteFilter::default()
        };
        assert_eq!(Quote::manager().search(conn, &by_keywords).unwrap().len(), 3);

        let by_source = QuoteFilter {
            sources: vec![f.register.id],
            ..QuoteFilter::default()
        };
        let found = Quote::manager().search(conn, &by_source).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].text, "bread given at burial");
    }

    #[test]
    fn test_text_search_respects_spaces() {
        let f = fixture();
        let conn = f.storage.connection();

        let peur = insert_quote(conn, "grande peur de 1789", Some(&f.annales), None, "1", &[]);
        let _degrade = insert_quote(conn, "degrade", Some(&f.annales), None, "2", &[]);

        let filter = QuoteFilter {
            text: Some(" de ".to_string()),
            ..QuoteFilter::default()
        };
        let found = Quote::manager().search(conn, &filter).unwrap();
        assert_eq!(found.iter().map(|q| q.id).collect::<Vec<_>>(), vec![peur.id]);
    }

    #[test]
    fn test_populate_related_info_attaches_and_sorts() {
        let f = fixture();
        let conn = f.storage.connection();

        let unpaged = insert_quote(conn, "undated", Some(&f.annales), None, "", &[]);
        let from_source = insert_quote(conn, "register entry", None, Some(&f.register), "2", &[&f.famine]);
        let page_ten = insert_quote(conn, "page ten", Some(&f.annales), None, "10", &[&f.war]);
        let page_nine = insert_quote(conn, "page nine", Some(&f.annales), None, "9", &[]);

        let mut quotes = Quote::manager().load_all(conn).unwrap();
        Quote::manager().populate_related_info(conn, &mut quotes).unwrap();

        let order: Vec<i64> = quotes.iter().map(|q| q.id).collect();
        assert_eq!(order, vec![page_nine.id, page_ten.id, unpaged.id, from_source.id]);

        assert_eq!(quotes[0].book(), Some(&f.annales));
        assert_eq!(quotes[1].keywords, vec![f.war.clone()]);
        assert_eq!(quotes[3].source(), Some(&f.register));
        assert_eq!(quotes[3].where_description(), "Parish register");
        assert_eq!(quotes[3].keywords_display(), "Famine");
    }

    #[test]
    fn test_populate_related_info_tolerates_dangling_references() {
        let f = fixture();
        let conn = f.storage.connection();

        let mut orphan = Quote::new("lost book");
        orphan.set_book_id(Some(999));
        Quote::manager().insert(conn, &mut orphan).unwrap();

        let mut quotes = vec![orphan];
        Quote::manager().populate_related_info(conn, &mut quotes).unwrap();
        assert!(quotes[0].book().is_none());
        assert_eq!(quotes[0].where_description(), "?");
    }
}
