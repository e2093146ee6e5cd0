//! The Quote–Keyword relation.

use crate::core::composed::{ComposedEntity, ComposedEntityManager};
use crate::core::entity::{placeholders, Entity, MAX_WHERE_ELEMENTS};
use crate::{Keyword, Quote, Result};
use rusqlite::{Connection, Row};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteKeyword {
    pub quote_id: i64,
    pub keyword_id: i64,
}

impl QuoteKeyword {
    pub const QUOTE_ID: &'static str = "QuoteId";
    pub const KEYWORD_ID: &'static str = "KeywordId";

    pub fn new(quote_id: i64, keyword_id: i64) -> Self {
        Self {
            quote_id,
            keyword_id,
        }
    }

    pub fn of(quote: &Quote, keyword: &Keyword) -> Self {
        Self::new(quote.id, keyword.id)
    }
}

impl ComposedEntity for QuoteKeyword {
    const ENTITY_NAME: &'static str = "QuoteKeyword";
    const TABLE_NAME: &'static str = "QuoteKeyword";
    const TABLE_ALIAS: &'static str = "QKW";
    const FIRST_ID_COLUMN: &'static str = QuoteKeyword::QUOTE_ID;
    const SECOND_ID_COLUMN: &'static str = QuoteKeyword::KEYWORD_ID;

    fn key(&self) -> (i64, i64) {
        (self.quote_id, self.keyword_id)
    }

    fn from_row(key: (i64, i64), _row: &Row, _offset: usize) -> rusqlite::Result<Self> {
        Ok(Self::new(key.0, key.1))
    }
}

impl ComposedEntityManager<QuoteKeyword> {
    fn keyword_join(&self) -> String {
        let keywords = Keyword::manager();
        format!(
            "FROM {} {} INNER JOIN {} {} ON {}.{} = {}.{}",
            keywords.table_name(),
            keywords.table_alias(),
            self.table_name(),
            self.table_alias(),
            self.table_alias(),
            QuoteKeyword::KEYWORD_ID,
            keywords.table_alias(),
            keywords.id_column()
        )
    }

    /// Replaces `quote.keywords` with the stored keywords, ordered by name.
    pub fn populate_keywords(&self, conn: &Connection, quote: &mut Quote) -> Result<()> {
        let keywords = Keyword::manager();
        let sql = format!(
            "SELECT DISTINCT {} {} WHERE {}.{} = ? ORDER BY {}",
            keywords.columns_for_select(),
            self.keyword_join(),
            self.table_alias(),
            QuoteKeyword::QUOTE_ID,
            keywords.order_by_for_select()
        );
        quote.keywords = keywords.query_list(conn, &sql, [quote.id])?;
        Ok(())
    }

    /// Populates the keywords of every quote in `quotes`, one query per
    /// [`MAX_WHERE_ELEMENTS`] quotes.
    pub fn populate_keywords_many(&self, conn: &Connection, quotes: &mut [Quote]) -> Result<()> {
        if quotes.is_empty() {
            return Ok(());
        }

        let keywords = Keyword::manager();
        let mut positions: HashMap<i64, Vec<usize>> = HashMap::new();
        for (idx, quote) in quotes.iter_mut().enumerate() {
            quote.keywords.clear();
            positions.entry(quote.id).or_default().push(idx);
        }
        let mut ids: Vec<i64> = positions.keys().copied().collect();
        ids.sort_unstable();

        for chunk in ids.chunks(MAX_WHERE_ELEMENTS) {
            let sql = format!(
                "SELECT DISTINCT {}.{}, {} {} WHERE {}.{} IN ({}) ORDER BY {}",
                self.table_alias(),
                QuoteKeyword::QUOTE_ID,
                keywords.columns_for_select(),
                self.keyword_join(),
                self.table_alias(),
                QuoteKeyword::QUOTE_ID,
                placeholders(chunk.len()),
                keywords.order_by_for_select()
            );
            log::debug!("{sql}");

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(chunk), |row| {
                    Ok((row.get::<_, i64>(0)?, keywords.read(row, 1)?))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            for (quote_id, keyword) in rows {
                match positions.get(&quote_id) {
                    Some(indices) => {
                        for &idx in indices {
                            quotes[idx].keywords.push(keyword.clone());
                        }
                    }
                    None => log::warn!("keyword {} linked to unexpected quote {}", keyword.id, quote_id),
                }
            }
        }
        Ok(())
    }

    pub fn delete_keywords_from_quote(&self, conn: &Connection, quote_id: i64) -> Result<usize> {
        self.delete_by_first(conn, quote_id)
    }

    pub fn delete_keyword_from_quotes(&self, conn: &Connection, keyword_id: i64) -> Result<usize> {
        self.delete_by_second(conn, keyword_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Storage;
    use tempfile::NamedTempFile;

    fn stored_keyword(conn: &Connection, name: &str) -> Keyword {
        let mut keyword = Keyword::new(name);
        Keyword::manager().insert(conn, &mut keyword).unwrap();
        keyword
    }

    fn stored_quote(conn: &Connection, keywords: &[&Keyword]) -> Quote {
        let mut quote = Quote::new("text");
        quote.set_source_id(Some(1));
        Quote::manager().insert(conn, &mut quote).unwrap();
        for keyword in keywords {
            QuoteKeyword::manager()
                .insert(conn, &QuoteKeyword::of(&quote, keyword))
                .unwrap();
        }
        quote
    }

    #[test]
    fn test_populate_keywords_sorted_by_name() {
        let temp = NamedTempFile::new().unwrap();
        let storage = Storage::create(temp.path()).unwrap();
        let conn = storage.connection();

        let war = stored_keyword(conn, "War");
        let famine = stored_keyword(conn, "Famine");
        let mut quote = stored_quote(conn, &[&war, &famine]);

        QuoteKeyword::manager().populate_keywords(conn, &mut quote).unwrap();
        assert_eq!(quote.keywords, vec![famine, war]);
    }

    #[test]
    fn test_populate_keywords_many() {
        let temp = NamedTempFile::new().unwrap();
        let storage = Storage::create(temp.path()).unwrap();
        let conn = storage.connection();

        let war = stored_keyword(conn, "War");
        let plague = stored_keyword(conn, "Plague");
        let first = stored_quote(conn, &[&war]);
        let second = stored_quote(conn, &[&plague, &war]);
        let bare = stored_quote(conn, &[]);

        let mut quotes = vec![first, second, bare];
        quotes[2].keywords.push(Keyword::new("stale"));
        QuoteKeyword::manager()
            .populate_keywords_many(conn, &mut quotes)
            .unwrap();

        assert_eq!(quotes[0].keywords, vec![war.clone()]);
        assert_eq!(quotes[1].keywords, vec![plague, war]);
        assert!(quotes[2].keywords.is_empty());
    }

    #[test]
    fn test_keyword_relation_deletes() {
        let temp = NamedTempFile::new().unwrap();
        let storage = Storage::create(temp.path()).unwrap();
        let conn = storage.connection();
        let manager = QuoteKeyword::manager();

        let war = stored_keyword(conn, "War");
        let famine = stored_keyword(conn, "Famine");
        let first = stored_quote(conn, &[&war, &famine]);
        let second = stored_quote(conn, &[&war]);

        assert_eq!(manager.delete_keyword_from_quotes(conn, war.id).unwrap(), 2);
        assert_eq!(manager.delete_keywords_from_quote(conn, first.id).unwrap(), 1);
        assert!(manager.load_by_first(conn, second.id).unwrap().is_empty());
    }
}
