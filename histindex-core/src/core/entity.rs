//! Generic table mapping for row-backed entities.
//!
//! An [`Entity`] describes its table (name, alias, columns, default order) and
//! how to move its fields in and out of a row. [`EntityManager`] turns that
//! description into parametrised `INSERT`/`UPDATE`/`DELETE`/`SELECT` SQL,
//! including batch loading by identifier list.
//!
//! Managers are zero-sized; `Author::manager()` and
//! `EntityManager::<Author>::new()` are the same value.

use crate::{HistIndexError, Result};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, Params, Row, ToSql};
use std::collections::HashMap;
use std::marker::PhantomData;

/// Largest number of identifiers bound into a single `IN (...)` clause.
/// Longer lists are split into several queries.
pub const MAX_WHERE_ELEMENTS: usize = 400;

/// A domain object stored as one row of its own table, keyed by an
/// `INTEGER PRIMARY KEY` column. An id of `0` marks an entity that has not
/// been inserted yet.
pub trait Entity: Sized {
    /// Human-readable type name, used in error messages.
    const ENTITY_NAME: &'static str;
    const TABLE_NAME: &'static str;
    const TABLE_ALIAS: &'static str;
    const ID_COLUMN: &'static str = "Id";
    /// Every stored column except the id, in binding order.
    const COLUMNS: &'static [&'static str];
    /// Default ordering; the id is always appended as the final tie-breaker.
    const ORDER_BY: &'static [&'static str];

    fn id(&self) -> i64;

    fn set_id(&mut self, id: i64);

    /// Builds an entity (with id `0`) from [`Self::COLUMNS`], the first of
    /// which is at `offset`.
    fn from_columns(row: &Row, offset: usize) -> rusqlite::Result<Self>;

    /// Values for [`Self::COLUMNS`], in the same order.
    fn column_values(&self) -> Vec<&dyn ToSql>;

    fn manager() -> EntityManager<Self> {
        EntityManager::new()
    }
}

/// CRUD and query helper for one [`Entity`] table.
pub struct EntityManager<T> {
    _entity: PhantomData<fn() -> T>,
}

impl<T> Clone for EntityManager<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for EntityManager<T> {}

impl<T: Entity> Default for EntityManager<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Entity> EntityManager<T> {
    pub const fn new() -> Self {
        Self {
            _entity: PhantomData,
        }
    }

    pub fn table_name(&self) -> &'static str {
        T::TABLE_NAME
    }

    pub fn table_alias(&self) -> &'static str {
        T::TABLE_ALIAS
    }

    pub fn id_column(&self) -> &'static str {
        T::ID_COLUMN
    }

    /// Number of columns [`Self::columns_for_select`] yields, id included.
    pub fn column_count(&self) -> usize {
        T::COLUMNS.len() + 1
    }

    /// `"alias.Id, alias.Col1, alias.Col2"`
    pub fn columns_for_select(&self) -> String {
        std::iter::once(T::ID_COLUMN)
            .chain(T::COLUMNS.iter().copied())
            .map(|col| format!("{}.{}", T::TABLE_ALIAS, col))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Default order-by columns prefixed with the alias, ending with the id.
    pub fn order_by_for_select(&self) -> String {
        T::ORDER_BY
            .iter()
            .copied()
            .chain(std::iter::once(T::ID_COLUMN))
            .map(|col| format!("{}.{}", T::TABLE_ALIAS, col))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Reads an entity laid out as by [`Self::columns_for_select`], starting at `offset`.
    pub fn read(&self, row: &Row, offset: usize) -> rusqlite::Result<T> {
        let id: i64 = row.get(offset)?;
        let mut entity = T::from_columns(row, offset + 1)?;
        entity.set_id(id);
        Ok(entity)
    }

    /// Inserts `entity` and stores the generated row id back into it.
    ///
    /// # Errors
    ///
    /// Returns [`HistIndexError::ValidationFailed`] if the entity already has
    /// an id, or [`HistIndexError::Database`] for any SQLite failure.
    pub fn insert(&self, conn: &Connection, entity: &mut T) -> Result<()> {
        if entity.id() != 0 {
            return Err(HistIndexError::ValidationFailed(format!(
                "{} {} is already stored",
                T::ENTITY_NAME,
                entity.id()
            )));
        }

        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            T::TABLE_NAME,
            T::COLUMNS.join(", "),
            placeholders(T::COLUMNS.len())
        );
        log::debug!("{sql}");

        let inserted = conn.execute(&sql, entity.column_values().as_slice())?;
        if inserted != 0 {
            entity.set_id(conn.last_insert_rowid());
        }
        Ok(())
    }

    /// Writes every column of an already stored entity.
    ///
    /// # Errors
    ///
    /// Returns [`HistIndexError::EntityNotFound`] if no row has the entity's id.
    pub fn update(&self, conn: &Connection, entity: &T) -> Result<()> {
        let id = entity.id();
        if id == 0 {
            return Err(HistIndexError::not_found(T::ENTITY_NAME, id));
        }

        let assignments = T::COLUMNS
            .iter()
            .map(|col| format!("{col} = ?"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE {} SET {} WHERE {} = ?",
            T::TABLE_NAME,
            assignments,
            T::ID_COLUMN
        );
        log::debug!("{sql}");

        let mut params = entity.column_values();
        params.push(&id);
        if conn.execute(&sql, params.as_slice())? == 0 {
            return Err(HistIndexError::not_found(T::ENTITY_NAME, id));
        }
        Ok(())
    }

    /// Deletes the row with `id`, returning whether it existed.
    pub fn delete(&self, conn: &Connection, id: i64) -> Result<bool> {
        let sql = format!("DELETE FROM {} WHERE {} = ?", T::TABLE_NAME, T::ID_COLUMN);
        Ok(conn.execute(&sql, [id])? == 1)
    }

    pub fn load(&self, conn: &Connection, id: i64) -> Result<Option<T>> {
        let sql = format!(
            "SELECT {} FROM {} {} WHERE {}.{} = ?",
            self.columns_for_select(),
            T::TABLE_NAME,
            T::TABLE_ALIAS,
            T::TABLE_ALIAS,
            T::ID_COLUMN
        );
        Ok(self.query_list(conn, &sql, [id])?.into_iter().next())
    }

    /// Like [`Self::load`], but a missing row is an error.
    pub fn get(&self, conn: &Connection, id: i64) -> Result<T> {
        self.load(conn, id)?
            .ok_or_else(|| HistIndexError::not_found(T::ENTITY_NAME, id))
    }

    /// Loads every row, in the default order.
    pub fn load_all(&self, conn: &Connection) -> Result<Vec<T>> {
        self.load_all_ordered(conn, &self.order_by_for_select())
    }

    /// Loads every row, ordered by id only.
    pub fn load_all_by_id(&self, conn: &Connection) -> Result<Vec<T>> {
        self.load_all_ordered(conn, &format!("{}.{}", T::TABLE_ALIAS, T::ID_COLUMN))
    }

    fn load_all_ordered(&self, conn: &Connection, order_by: &str) -> Result<Vec<T>> {
        let sql = format!(
            "SELECT {} FROM {} {} ORDER BY {}",
            self.columns_for_select(),
            T::TABLE_NAME,
            T::TABLE_ALIAS,
            order_by
        );
        self.query_list(conn, &sql, [])
    }

    /// Loads every entity whose id is in `ids`.
    ///
    /// Lists longer than [`MAX_WHERE_ELEMENTS`] are loaded in several queries;
    /// each query's rows are in the default order and the chunks are
    /// concatenated in input order. Unknown ids are skipped.
    pub fn load_many(&self, conn: &Connection, ids: &[i64]) -> Result<Vec<T>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        if ids.len() > MAX_WHERE_ELEMENTS {
            log::debug!(
                "loading {} {} rows in chunks of {}",
                ids.len(),
                T::TABLE_NAME,
                MAX_WHERE_ELEMENTS
            );
        }

        let mut loaded = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(MAX_WHERE_ELEMENTS) {
            let sql = format!(
                "SELECT {} FROM {} {} WHERE {}.{} IN ({}) ORDER BY {}",
                self.columns_for_select(),
                T::TABLE_NAME,
                T::TABLE_ALIAS,
                T::TABLE_ALIAS,
                T::ID_COLUMN,
                placeholders(chunk.len()),
                self.order_by_for_select()
            );
            loaded.extend(self.query_list(conn, &sql, rusqlite::params_from_iter(chunk))?);
        }
        Ok(loaded)
    }

    /// Indexes `entities` by id.
    pub fn index_by_id(&self, entities: Vec<T>) -> HashMap<i64, T> {
        entities.into_iter().map(|e| (e.id(), e)).collect()
    }

    /// Runs `sql`, whose result columns are exactly [`Self::columns_for_select`].
    pub(crate) fn query_list<P: Params>(
        &self,
        conn: &Connection,
        sql: &str,
        params: P,
    ) -> Result<Vec<T>> {
        log::debug!("{sql}");
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, |row| self.read(row, 0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

/// `"?, ?, ?"` with `count` placeholders.
pub(crate) fn placeholders(count: usize) -> String {
    (0..count).map(|_| "?").collect::<Vec<_>>().join(", ")
}

/// Reads a text column, tolerating the integer values older databases
/// stored in some of them.
pub(crate) fn text_column(row: &Row, idx: usize) -> rusqlite::Result<Option<String>> {
    Ok(match row.get_ref(idx)? {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(f.to_string()),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Some(String::from_utf8_lossy(bytes).into_owned())
        }
    })
}

/// Reads an optional foreign id; both `NULL` and `0` mean "none".
pub(crate) fn reference_column(row: &Row, idx: usize) -> rusqlite::Result<Option<i64>> {
    Ok(row.get::<_, Option<i64>>(idx)?.filter(|id| *id != 0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Keyword, Source, Storage};
    use tempfile::NamedTempFile;

    fn keyword(name: &str) -> Keyword {
        Keyword::new(name)
    }

    #[test]
    fn test_columns_for_select() {
        assert_eq!(
            Source::manager().columns_for_select(),
            "SRC.Id, SRC.Title, SRC.ExtraInfo"
        );
        assert_eq!(Source::manager().column_count(), 3);
    }

    #[test]
    fn test_order_by_always_ends_with_id() {
        assert_eq!(Source::manager().order_by_for_select(), "SRC.Title, SRC.Id");
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(placeholders(0), "");
        assert_eq!(placeholders(1), "?");
        assert_eq!(placeholders(3), "?, ?, ?");
    }

    #[test]
    fn test_insert_sets_id_and_load_round_trips() {
        let temp = NamedTempFile::new().unwrap();
        let storage = Storage::create(temp.path()).unwrap();
        let manager = Keyword::manager();

        let mut kw = keyword("Revolution");
        manager.insert(storage.connection(), &mut kw).unwrap();
        assert_ne!(kw.id, 0);

        let loaded = manager.load(storage.connection(), kw.id).unwrap().unwrap();
        assert_eq!(loaded, kw);
    }

    #[test]
    fn test_insert_rejects_stored_entity() {
        let temp = NamedTempFile::new().unwrap();
        let storage = Storage::create(temp.path()).unwrap();

        let mut kw = keyword("Revolution");
        kw.id = 7;
        let result = Keyword::manager().insert(storage.connection(), &mut kw);
        assert!(matches!(result, Err(HistIndexError::ValidationFailed(_))));
    }

    #[test]
    fn test_update_and_delete() {
        let temp = NamedTempFile::new().unwrap();
        let storage = Storage::create(temp.path()).unwrap();
        let conn = storage.connection();
        let manager = Keyword::manager();

        let mut kw = keyword("Revoltion");
        manager.insert(conn, &mut kw).unwrap();
        kw.name = "Revolution".to_string();
        manager.update(conn, &kw).unwrap();
        assert_eq!(manager.get(conn, kw.id).unwrap().name, "Revolution");

        assert!(manager.delete(conn, kw.id).unwrap());
        assert!(!manager.delete(conn, kw.id).unwrap());
        assert!(manager.load(conn, kw.id).unwrap().is_none());
    }

    #[test]
    fn test_update_missing_row_is_not_found() {
        let temp = NamedTempFile::new().unwrap();
        let storage = Storage::create(temp.path()).unwrap();

        let mut kw = keyword("Ghost");
        kw.id = 99;
        let result = Keyword::manager().update(storage.connection(), &kw);
        assert!(matches!(
            result,
            Err(HistIndexError::EntityNotFound { entity: "Keyword", id: 99 })
        ));
    }

    #[test]
    fn test_load_all_uses_default_order() {
        let temp = NamedTempFile::new().unwrap();
        let storage = Storage::create(temp.path()).unwrap();
        let conn = storage.connection();
        let manager = Keyword::manager();

        for name in ["War", "Church", "Land"] {
            manager.insert(conn, &mut keyword(name)).unwrap();
        }

        let names: Vec<String> = manager
            .load_all(conn)
            .unwrap()
            .into_iter()
            .map(|k| k.name)
            .collect();
        assert_eq!(names, vec!["Church", "Land", "War"]);

        let by_id: Vec<String> = manager
            .load_all_by_id(conn)
            .unwrap()
            .into_iter()
            .map(|k| k.name)
            .collect();
        assert_eq!(by_id, vec!["War", "Church", "Land"]);
    }

    #[test]
    fn test_load_many_empty_input() {
        let temp = NamedTempFile::new().unwrap();
        let storage = Storage::create(temp.path()).unwrap();
        assert!(Keyword::manager()
            .load_many(storage.connection(), &[])
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_load_many_covers_every_chunk() {
        let temp = NamedTempFile::new().unwrap();
        let mut storage = Storage::create(temp.path()).unwrap();
        let manager = Keyword::manager();

        let total = MAX_WHERE_ELEMENTS * 2 + 17;
        let mut ids = Vec::with_capacity(total);
        {
            let tx = storage.connection_mut().transaction().unwrap();
            for i in 0..total {
                let mut kw = keyword(&format!("kw-{i:04}"));
                manager.insert(&tx, &mut kw).unwrap();
                ids.push(kw.id);
            }
            tx.commit().unwrap();
        }

        let loaded = manager.load_many(storage.connection(), &ids).unwrap();
        assert_eq!(loaded.len(), total);

        let index = manager.index_by_id(loaded);
        assert!(ids.iter().all(|id| index.contains_key(id)));
    }

    #[test]
    fn test_load_many_skips_unknown_ids() {
        let temp = NamedTempFile::new().unwrap();
        let storage = Storage::create(temp.path()).unwrap();
        let conn = storage.connection();

        let mut kw = keyword("Famine");
        Keyword::manager().insert(conn, &mut kw).unwrap();

        let loaded = Keyword::manager().load_many(conn, &[kw.id, 12345]).unwrap();
        assert_eq!(loaded, vec![kw]);
    }
}
