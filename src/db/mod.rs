//! The relational store holding files, genes, variants, annotations, gene sets, and tasks.
//!
//! All access goes through [`Store`], which guards the whole database with one
//! reader-writer lock: readers run concurrently with each other but never with
//! a writer, and writers are serialized.  Every operation is a scope that
//! takes the lock, obtains a pooled connection, runs, returns the connection,
//! and releases the lock, on error paths as well.

use std::{
    path::{Path, PathBuf},
    sync::RwLock,
    time::Duration,
};

use rusqlite::{Connection, Transaction};

use crate::err::StorageError;

pub mod analysis;
pub mod cli;
pub mod files;
pub mod filter;
pub mod gene_sets;
pub mod model;
pub mod schema;
pub mod variants;

/// Command line arguments for opening the store.
#[derive(Debug, Clone, clap::Args)]
pub struct StoreConfig {
    /// Path to the SQLite database file; created if missing.
    #[arg(long)]
    pub path_db: String,
    /// Maximal number of pooled connections.
    #[arg(long, default_value_t = 4)]
    pub pool_size: u32,
    /// Seconds to wait for a database lock held by another process.
    #[arg(long, default_value_t = 30)]
    pub busy_timeout_secs: u64,
}

impl StoreConfig {
    pub fn new<P: AsRef<Path>>(path_db: P) -> Self {
        Self {
            path_db: path_db.as_ref().display().to_string(),
            pool_size: 4,
            busy_timeout_secs: 30,
        }
    }
}

/// Opens SQLite connections for the `r2d2` pool.
#[derive(Debug)]
pub struct ConnectionManager {
    path: PathBuf,
    busy_timeout: Duration,
}

impl r2d2::ManageConnection for ConnectionManager {
    type Connection = Connection;
    type Error = rusqlite::Error;

    fn connect(&self) -> Result<Connection, rusqlite::Error> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(self.busy_timeout)?;
        let journal_mode: String =
            conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        tracing::trace!("journal mode of new connection: {}", journal_mode);
        conn.execute_batch(
            "
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            ",
        )?;
        Ok(conn)
    }

    fn is_valid(&self, conn: &mut Connection) -> Result<(), rusqlite::Error> {
        conn.query_row("SELECT 1", [], |_| Ok(()))
    }

    fn has_broken(&self, _conn: &mut Connection) -> bool {
        false
    }
}

/// Lock-guarded, connection-pooled access to the database.
pub struct Store {
    path: PathBuf,
    lock: RwLock<()>,
    pool: r2d2::Pool<ConnectionManager>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").field("path", &self.path).finish()
    }
}

impl Store {
    /// Open the store and create missing tables.
    pub fn open(config: &StoreConfig) -> Result<Self, StorageError> {
        let path = PathBuf::from(&config.path_db);
        tracing::debug!("opening database {}", path.display());
        let manager = ConnectionManager {
            path: path.clone(),
            busy_timeout: Duration::from_secs(config.busy_timeout_secs),
        };
        let pool = r2d2::Pool::builder()
            .max_size(config.pool_size.max(1))
            .min_idle(Some(1))
            .connection_timeout(Duration::from_secs(config.busy_timeout_secs.max(1)))
            .build(manager)?;

        let store = Self {
            path,
            lock: RwLock::new(()),
            pool,
        };
        store.write(|tx| schema::create_tables(tx))?;
        Ok(store)
    }

    /// Run `func` under the shared lock.
    pub fn read<T, F>(&self, func: F) -> Result<T, StorageError>
    where
        F: FnOnce(&Connection) -> Result<T, StorageError>,
    {
        let _guard = self.lock.read().map_err(|_| StorageError::LockPoisoned)?;
        let conn = self.pool.get()?;
        func(&conn)
    }

    /// Run `func` in one transaction under the exclusive lock.
    ///
    /// The transaction is committed if `func` succeeds and rolled back otherwise.
    pub fn write<T, F>(&self, func: F) -> Result<T, StorageError>
    where
        F: FnOnce(&Transaction) -> Result<T, StorageError>,
    {
        let _guard = self.lock.write().map_err(|_| StorageError::LockPoisoned)?;
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;
        let result = func(&tx)?;
        tx.commit()?;
        Ok(result)
    }
}

#[cfg(test)]
pub(crate) mod test {
    use pretty_assertions::assert_eq;

    use super::{Store, StoreConfig};
    use crate::err::StorageError;

    /// Open a fresh store in `tmp_dir`.
    pub fn open_store(tmp_dir: &temp_testdir::TempDir) -> Store {
        Store::open(&StoreConfig::new(tmp_dir.join("test.sqlite"))).expect("could not open store")
    }

    #[test]
    fn open_creates_tables() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let store = open_store(&tmp_dir);

        let tables = store.read(|conn| {
            let mut stmt = conn
                .prepare("SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name")?;
            let names = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(names)
        })?;

        assert_eq!(
            tables,
            vec![
                "annotations",
                "files",
                "gene_set_members",
                "gene_sets",
                "genes",
                "tasks",
                "variants"
            ]
        );

        Ok(())
    }

    #[test]
    fn reopen_keeps_data() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        {
            let store = open_store(&tmp_dir);
            store.write(|tx| {
                tx.execute("INSERT INTO gene_sets (name) VALUES ('panel')", [])?;
                Ok(())
            })?;
        }
        let store = open_store(&tmp_dir);

        let count = store.read(|conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM gene_sets", [], |row| {
                row.get::<_, i64>(0)
            })?)
        })?;
        assert_eq!(count, 1);

        Ok(())
    }

    #[test]
    fn failed_write_is_rolled_back() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let store = open_store(&tmp_dir);

        let result: Result<(), StorageError> = store.write(|tx| {
            tx.execute("INSERT INTO gene_sets (name) VALUES ('panel')", [])?;
            Err(StorageError::InvalidValue {
                column: "name",
                value: "panel".into(),
            })
        });
        assert!(result.is_err());

        let count = store.read(|conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM gene_sets", [], |row| {
                row.get::<_, i64>(0)
            })?)
        })?;
        assert_eq!(count, 0);

        Ok(())
    }

    #[test]
    fn foreign_keys_are_enforced() {
        let tmp_dir = temp_testdir::TempDir::default();
        let store = open_store(&tmp_dir);

        let result = store.write(|tx| {
            tx.execute(
                "INSERT INTO genes (file_hash, gene_hgnc) VALUES ('missing', 'IL9R')",
                [],
            )?;
            Ok(())
        });

        assert!(matches!(result, Err(StorageError::Sqlite(_))));
    }
}
