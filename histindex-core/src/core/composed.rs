//! Join tables keyed by a pair of foreign ids.
//!
//! A [`ComposedEntity`] row is identified by `(first, second)` rather than by a
//! surrogate id. [`ComposedEntityManager`] provides the generic CRUD; the
//! relation-specific helpers live next to each relation type.

use crate::core::entity::placeholders;
use crate::{HistIndexError, Result};
use rusqlite::{Connection, Params, Row, ToSql};
use std::marker::PhantomData;

pub trait ComposedEntity: Sized {
    const ENTITY_NAME: &'static str;
    const TABLE_NAME: &'static str;
    const TABLE_ALIAS: &'static str;
    const FIRST_ID_COLUMN: &'static str;
    const SECOND_ID_COLUMN: &'static str;
    /// Payload columns beyond the key pair, in binding order.
    const COLUMNS: &'static [&'static str] = &[];

    fn key(&self) -> (i64, i64);

    /// Builds the relation from its key and any payload columns starting at `offset`.
    fn from_row(key: (i64, i64), row: &Row, offset: usize) -> rusqlite::Result<Self>;

    fn column_values(&self) -> Vec<&dyn ToSql> {
        Vec::new()
    }

    fn manager() -> ComposedEntityManager<Self> {
        ComposedEntityManager::new()
    }
}

pub struct ComposedEntityManager<T> {
    _entity: PhantomData<fn() -> T>,
}

impl<T> Clone for ComposedEntityManager<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ComposedEntityManager<T> {}

impl<T: ComposedEntity> Default for ComposedEntityManager<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ComposedEntity> ComposedEntityManager<T> {
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

    pub fn columns_for_select(&self) -> String {
        [T::FIRST_ID_COLUMN, T::SECOND_ID_COLUMN]
            .into_iter()
            .chain(T::COLUMNS.iter().copied())
            .map(|col| format!("{}.{}", T::TABLE_ALIAS, col))
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn read(&self, row: &Row, offset: usize) -> rusqlite::Result<T> {
        let key = (row.get(offset)?, row.get(offset + 1)?);
        T::from_row(key, row, offset + 2)
    }

    fn check_key(relation: &T) -> Result<(i64, i64)> {
        let (first, second) = relation.key();
        if first == 0 || second == 0 {
            return Err(HistIndexError::ValidationFailed(format!(
                "{} needs two stored ids, got ({first}, {second})",
                T::ENTITY_NAME
            )));
        }
        Ok((first, second))
    }

    pub fn insert(&self, conn: &Connection, relation: &T) -> Result<()> {
        let (first, second) = Self::check_key(relation)?;
        let columns = [T::FIRST_ID_COLUMN, T::SECOND_ID_COLUMN]
            .into_iter()
            .chain(T::COLUMNS.iter().copied())
            .collect::<Vec<_>>();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            T::TABLE_NAME,
            columns.join(", "),
            placeholders(columns.len())
        );
        log::debug!("{sql}");

        let mut params: Vec<&dyn ToSql> = vec![&first, &second];
        params.extend(relation.column_values());
        conn.execute(&sql, params.as_slice())?;
        Ok(())
    }

    /// Rewrites the payload columns of the row(s) matching the relation's key.
    /// Relations without payload columns have nothing to update.
    pub fn update(&self, conn: &Connection, relation: &T) -> Result<()> {
        let (first, second) = Self::check_key(relation)?;
        if T::COLUMNS.is_empty() {
            return Ok(());
        }

        let assignments = T::COLUMNS
            .iter()
            .map(|col| format!("{col} = ?"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE {} SET {} WHERE {} = ? AND {} = ?",
            T::TABLE_NAME,
            assignments,
            T::FIRST_ID_COLUMN,
            T::SECOND_ID_COLUMN
        );
        log::debug!("{sql}");

        let mut params = relation.column_values();
        params.push(&first);
        params.push(&second);
        if conn.execute(&sql, params.as_slice())? == 0 {
            return Err(HistIndexError::not_found(T::ENTITY_NAME, first));
        }
        Ok(())
    }

    /// Deletes every row with exactly this key pair, returning how many went.
    pub fn delete(&self, conn: &Connection, first: i64, second: i64) -> Result<usize> {
        let sql = format!(
            "DELETE FROM {} WHERE {} = ? AND {} = ?",
            T::TABLE_NAME,
            T::FIRST_ID_COLUMN,
            T::SECOND_ID_COLUMN
        );
        Ok(conn.execute(&sql, [first, second])?)
    }

    pub fn delete_by_first(&self, conn: &Connection, first: i64) -> Result<usize> {
        self.delete_by_column(conn, T::FIRST_ID_COLUMN, first)
    }

    pub fn delete_by_second(&self, conn: &Connection, second: i64) -> Result<usize> {
        self.delete_by_column(conn, T::SECOND_ID_COLUMN, second)
    }

    fn delete_by_column(&self, conn: &Connection, column: &str, id: i64) -> Result<usize> {
        let sql = format!("DELETE FROM {} WHERE {} = ?", T::TABLE_NAME, column);
        log::debug!("{sql}");
        Ok(conn.execute(&sql, [id])?)
    }

    pub fn load(&self, conn: &Connection, first: i64, second: i64) -> Result<Option<T>> {
        let sql = format!(
            "SELECT {} FROM {} {} WHERE {}.{} = ? AND {}.{} = ?",
            self.columns_for_select(),
            T::TABLE_NAME,
            T::TABLE_ALIAS,
            T::TABLE_ALIAS,
            T::FIRST_ID_COLUMN,
            T::TABLE_ALIAS,
            T::SECOND_ID_COLUMN
        );
        Ok(self.query_list(conn, &sql, [first, second])?.into_iter().next())
    }

    /// Every relation whose first id is `first`, ordered by the second id.
    pub fn load_by_first(&self, conn: &Connection, first: i64) -> Result<Vec<T>> {
        let sql = format!(
            "SELECT {} FROM {} {} WHERE {}.{} = ? ORDER BY {}.{}",
            self.columns_for_select(),
            T::TABLE_NAME,
            T::TABLE_ALIAS,
            T::TABLE_ALIAS,
            T::FIRST_ID_COLUMN,
            T::TABLE_ALIAS,
            T::SECOND_ID_COLUMN
        );
        self.query_list(conn, &sql, [first])
    }

    /// Distinct first ids paired with `second`, ascending.
    pub fn first_ids_for_second(&self, conn: &Connection, second: i64) -> Result<Vec<i64>> {
        let sql = format!(
            "SELECT DISTINCT {} FROM {} WHERE {} = ? ORDER BY {}",
            T::FIRST_ID_COLUMN,
            T::TABLE_NAME,
            T::SECOND_ID_COLUMN,
            T::FIRST_ID_COLUMN
        );
        let mut stmt = conn.prepare(&sql)?;
        let ids = stmt
            .query_map([second], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i64>>>()?;
        Ok(ids)
    }

    fn query_list<P: Params>(&self, conn: &Connection, sql: &str, params: P) -> Result<Vec<T>> {
        log::debug!("{sql}");
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, |row| self.read(row, 0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}
