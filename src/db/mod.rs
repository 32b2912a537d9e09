//! # Database Module
//!
//! A thin table layer over an embedded SQLite connection.
//!
//! ## Overview
//!
//! Tables are declared with a [`TableSchema`] and created once; asking for a
//! table that already exists returns a handle to it without running DDL
//! again. Table handles generate parameterized statements from
//! [`SelectOpts`] and [`Where`] values, so user data is never spliced into
//! SQL text.
//!
//! Optional per-table features:
//! - `time_created` / `time_updated` columns (the latter kept current by a trigger)
//! - paranoid tables that soft-delete through `time_deleted`
//! - a full-text `<table>_fts` shadow table synced by triggers
//!
//! ## Example
//!
//! ```rust
//! use sitekit::db::{row, ColumnDef, Database, TableOpts, TableSchema, Where};
//!
//! let db = Database::memory().unwrap();
//! let users = db
//!     .table(
//!         "user",
//!         &TableSchema::new()
//!             .column("id", ColumnDef::integer().primary_key().auto_increment())
//!             .column("name", ColumnDef::text()),
//!         TableOpts::default(),
//!     )
//!     .unwrap();
//! users.insert(&row([("name", "fang".into())])).unwrap();
//! let found = users.find(&Where::new().eq("name", "fang")).unwrap();
//! assert!(found.is_some());
//! ```
//!
//! ## Concurrency
//!
//! One connection is shared by every clone of a [`Database`] and every
//! [`Table`]. Access is serialized by a reentrant lock, so a
//! [`Database::transaction`] body may freely call back into tables on the
//! same thread.

mod query;
mod schema;
mod table;

use parking_lot::ReentrantMutex;
use rusqlite::{Connection, OptionalExtension, ToSql};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub use query::{
    row, validate_ident, ColumnName, Columns, Cond, Join, JoinKind, Op, Order, Query, Row,
    SelectOpts, SqlKeyword, Value, Where,
};
pub use schema::{create_table_sql, ColumnDef, ColumnType, DefaultValue, Reference, TableOpts, TableSchema};
pub use table::Table;

/// Errors from the table layer.
///
/// Engine errors are carried unmodified in `Sqlite`.
#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    /// A schema that cannot be created as declared.
    Config(String),
    /// Insert or update without any column data.
    EmptyInsert,
    /// A table or column name that is not a plain identifier.
    InvalidIdentifier(String),
    Io(io::Error),
}

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DbError::Sqlite(e) => write!(f, "sqlite: {e}"),
            DbError::Config(msg) => write!(f, "invalid table config: {msg}"),
            DbError::EmptyInsert => write!(f, "cannot write a row without data"),
            DbError::InvalidIdentifier(name) => write!(f, "invalid identifier: {name:?}"),
            DbError::Io(e) => write!(f, "io: {e}"),
        }
    }
}

impl std::error::Error for DbError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DbError::Sqlite(e) => Some(e),
            DbError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(e: rusqlite::Error) -> Self {
        DbError::Sqlite(e)
    }
}

impl From<io::Error> for DbError {
    fn from(e: io::Error) -> Self {
        DbError::Io(e)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DatabaseOpts {
    /// Switch the journal to write-ahead logging.
    pub wal: bool,
}

const MEMORY: &str = ":memory:";

/// A shared handle to one SQLite database.
#[derive(Clone)]
pub struct Database {
    conn: Arc<ReentrantMutex<Connection>>,
    path: Option<PathBuf>,
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database").field("path", &self.path).finish()
    }
}

impl Database {
    /// Open (or create) a database file, creating parent directories.
    ///
    /// `":memory:"` opens a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or SQLite fails
    /// to open the file.
    pub fn open(path: impl AsRef<Path>, opts: DatabaseOpts) -> Result<Self, DbError> {
        let path = path.as_ref();
        let (conn, stored) = if path.as_os_str() == MEMORY {
            (Connection::open_in_memory()?, None)
        } else {
            if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                std::fs::create_dir_all(dir)?;
            }
            (Connection::open(path)?, Some(path.to_path_buf()))
        };
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        if opts.wal {
            conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        }
        info!(path = %path.display(), wal = opts.wal, "Database opened");
        Ok(Self {
            conn: Arc::new(ReentrantMutex::new(conn)),
            path: stored,
        })
    }

    /// A private in-memory database.
    pub fn memory() -> Result<Self, DbError> {
        Self::open(MEMORY, DatabaseOpts::default())
    }

    /// File backing this database, `None` for in-memory databases.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Whether a table named `name` exists.
    pub fn has_table(&self, name: &str) -> Result<bool, DbError> {
        let conn = self.conn.lock();
        let found: Option<String> = conn
            .prepare_cached("SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1")?
            .query_row([name], |r| r.get(0))
            .optional()?;
        Ok(found.is_some())
    }

    /// Return the table `name`, creating it from `schema` if it does not
    /// exist yet. An existing table is returned as-is.
    pub fn table(&self, name: &str, schema: &TableSchema, opts: TableOpts) -> Result<Table, DbError> {
        match self.get_table(name)? {
            Some(t) => Ok(t),
            None => self.create_table(name, schema, opts),
        }
    }

    /// Create a table, its indexes and triggers, then insert `init_data`.
    ///
    /// # Errors
    ///
    /// Configuration errors are reported before any DDL runs; engine errors
    /// (e.g. the table already exists) are returned as-is.
    pub fn create_table(&self, name: &str, schema: &TableSchema, opts: TableOpts) -> Result<Table, DbError> {
        let stmts = create_table_sql(name, schema, &opts)?;
        let table = self.transaction(|| {
            let conn = self.conn.lock();
            for sql in &stmts {
                conn.execute_batch(sql)?;
            }
            drop(conn);
            let table = Table::load(self.clone(), name)?;
            for row in &opts.init_data {
                table.insert(row)?;
            }
            Ok::<_, DbError>(table)
        })?;
        debug!(table = name, statements = stmts.len(), "Table created");
        Ok(table)
    }

    /// Handle to an existing table.
    pub fn get_table(&self, name: &str) -> Result<Option<Table>, DbError> {
        validate_ident(name)?;
        if !self.has_table(name)? {
            return Ok(None);
        }
        Table::load(self.clone(), name).map(Some)
    }

    /// Drop a table together with its full-text shadow table.
    pub fn drop_table(&self, name: &str) -> Result<(), DbError> {
        validate_ident(name)?;
        let conn = self.conn.lock();
        conn.execute_batch(&format!("DROP TABLE {name}; DROP TABLE IF EXISTS {name}_fts;"))?;
        Ok(())
    }

    /// Run `action` in a transaction (a savepoint when nested).
    ///
    /// Commits when `action` returns `Ok`, rolls back on `Err` or panic.
    pub fn transaction<T, E>(&self, action: impl FnOnce() -> Result<T, E>) -> Result<T, E>
    where
        E: From<DbError>,
    {
        let conn = self.conn.lock();
        conn.execute_batch("SAVEPOINT sitekit_tx")
            .map_err(|e| E::from(DbError::from(e)))?;
        let guard = Rollback { conn: &conn, armed: true };
        let out = action();
        let mut guard = guard;
        match out {
            Ok(v) => {
                guard.armed = false;
                conn.execute_batch("RELEASE sitekit_tx")
                    .map_err(|e| E::from(DbError::from(e)))?;
                Ok(v)
            }
            Err(e) => Err(e),
        }
    }

    /// Close the connection if this is the last handle.
    pub fn close(self) -> Result<(), DbError> {
        match Arc::try_unwrap(self.conn) {
            Ok(m) => m.into_inner().close().map_err(|(_, e)| DbError::Sqlite(e)),
            Err(_) => {
                warn!("Database still referenced by table handles; close deferred");
                Ok(())
            }
        }
    }

    /// Snapshot the whole database as SQLite file bytes.
    pub fn serialize(&self) -> Result<Vec<u8>, DbError> {
        let tmp = std::env::temp_dir().join(format!("sitekit-{}.db", ulid::Ulid::new()));
        let target = tmp.to_string_lossy().replace('\'', "''");
        {
            let conn = self.conn.lock();
            conn.execute_batch(&format!("VACUUM INTO '{target}'"))?;
        }
        let bytes = std::fs::read(&tmp);
        if let Err(e) = std::fs::remove_file(&tmp) {
            debug!(error = %e, path = %tmp.display(), "Failed to remove snapshot file");
        }
        Ok(bytes?)
    }

    /// Run a query and collect its rows.
    pub fn query(&self, q: &Query) -> Result<Vec<Row>, DbError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(&q.sql)?;
        let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let params: Vec<(&str, &dyn ToSql)> = q
            .params
            .iter()
            .map(|(k, v)| (k.as_str(), v as &dyn ToSql))
            .collect();
        let mut rows = stmt.query(params.as_slice())?;
        let mut out = Vec::new();
        while let Some(r) = rows.next()? {
            let mut row = Row::new();
            for (i, name) in names.iter().enumerate() {
                row.insert(name.clone(), Value::from(r.get_ref(i)?));
            }
            out.push(row);
        }
        Ok(out)
    }

    /// Run a statement, returning the number of changed rows.
    pub fn execute(&self, q: &Query) -> Result<usize, DbError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(&q.sql)?;
        let params: Vec<(&str, &dyn ToSql)> = q
            .params
            .iter()
            .map(|(k, v)| (k.as_str(), v as &dyn ToSql))
            .collect();
        Ok(stmt.execute(params.as_slice())?)
    }

    /// Run a statement and return the rowid of the last insert.
    pub(crate) fn execute_insert(&self, q: &Query) -> Result<i64, DbError> {
        let conn = self.conn.lock();
        self.execute(q)?;
        Ok(conn.last_insert_rowid())
    }

    pub(crate) fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> rusqlite::Result<T>) -> Result<T, DbError> {
        let conn = self.conn.lock();
        Ok(f(&conn)?)
    }
}

struct Rollback<'a> {
    conn: &'a Connection,
    armed: bool,
}

impl Drop for Rollback<'_> {
    fn drop(&mut self) {
        if self.armed {
            if let Err(e) = self
                .conn
                .execute_batch("ROLLBACK TO sitekit_tx; RELEASE sitekit_tx;")
            {
                warn!(error = %e, "Transaction rollback failed");
            }
        }
    }
}
