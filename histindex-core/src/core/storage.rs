//! SQLite file handling: schema creation, validation and migration.

use crate::{HistIndexError, Result};
use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};

/// Tables every HistIndex database must contain.
const REQUIRED_TABLES: [&str; 7] = [
    "Authors",
    "Books",
    "Sources",
    "BookAuthor",
    "Keywords",
    "Quotes",
    "QuoteKeyword",
];

pub struct Storage {
    conn: Connection,
    path: PathBuf,
}

impl Storage {
    /// Creates the schema at `path`, dropping any HistIndex tables already there.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(&path)?;
        disable_foreign_keys(&conn)?;
        conn.execute_batch(include_str!("schema.sql"))?;
        log::info!("created HistIndex schema at {}", path.as_ref().display());
        Ok(Self {
            conn,
            path: path.as_ref().to_path_buf(),
        })
    }

    /// Opens an existing database. A missing file is an error, never created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        if !path.as_ref().is_file() {
            return Err(HistIndexError::InvalidDatabase(format!(
                "{} does not exist",
                path.as_ref().display()
            )));
        }
        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        disable_foreign_keys(&conn)?;

        // Validate database structure
        let placeholders = REQUIRED_TABLES.map(|_| "?").join(", ");
        let table_count: i64 = conn.query_row(
            &format!(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name IN ({placeholders})"
            ),
            rusqlite::params_from_iter(REQUIRED_TABLES.iter()),
            |row| row.get(0),
        )?;

        if table_count != REQUIRED_TABLES.len() as i64 {
            return Err(HistIndexError::InvalidDatabase(
                "Not a valid HistIndex database".to_string(),
            ));
        }

        // Migrate: the first schema generation had no quote comments
        let column_exists: bool = conn.query_row(
            "SELECT COUNT(*) FROM pragma_table_info('Quotes') WHERE name='Comment'",
            [],
            |row| row.get::<_, i64>(0).map(|count| count > 0),
        )?;

        if !column_exists {
            log::info!("migrating {}: adding Quotes.Comment", path.as_ref().display());
            conn.execute("ALTER TABLE Quotes ADD COLUMN Comment TEXT", [])?;
        }

        Ok(Self {
            conn,
            path: path.as_ref().to_path_buf(),
        })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Bundled SQLite enforces foreign keys by default. Link rows may dangle in
/// older files and deletes cascade in `Library`, so enforcement is off.
fn disable_foreign_keys(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "foreign_keys", false)?;
    Ok(())
}
