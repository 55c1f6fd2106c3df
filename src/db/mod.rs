// Database module

pub mod migrations;
pub mod schema;

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use rusqlite::Connection;

use crate::constants::{APP_DIR, DB_BUSY_TIMEOUT_MS, DB_FILENAME, PROPERTY_MEDIA_PATH};
use crate::error::{LibraryError, Result};

/// Open or create a database at the given path
pub fn open_db(db_path: &Path) -> anyhow::Result<Connection> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let conn = open_connection(db_path)?;

    // Run migrations
    migrations::run_migrations(&conn)?;

    Ok(conn)
}

/// Open a connection with the per-connection pragmas applied
pub fn open_connection(db_path: &Path) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;

    // Enable WAL mode so readers don't block the worker
    conn.execute_batch("PRAGMA journal_mode = WAL;")?;
    conn.busy_timeout(Duration::from_millis(DB_BUSY_TIMEOUT_MS))?;

    Ok(conn)
}

/// Default database location: ~/.reelvault/reelvault.db
pub fn default_db_path() -> Option<PathBuf> {
    directories::UserDirs::new().map(|dirs| dirs.home_dir().join(APP_DIR).join(DB_FILENAME))
}

struct StoreInner {
    db_path: PathBuf,
    media_root: PathBuf,
    // Guards catalog/ingest validate-then-mutate sequences within this process
    lock: RwLock<()>,
}

/// Shared library handle: database location, media root and the catalog lock.
/// Cheap to clone; every clone shares the same lock.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl Store {
    /// Create (or re-open) a library whose media lives under `media_root`.
    pub fn init(db_path: &Path, media_root: &Path) -> Result<Store> {
        std::fs::create_dir_all(media_root)?;
        let media_root = media_root.canonicalize()?;

        let conn = open_db(db_path)?;
        match schema::get_property(&conn, PROPERTY_MEDIA_PATH)? {
            Some(existing) if !existing.is_empty() && Path::new(&existing) != media_root.as_path() => {
                return Err(LibraryError::ValidationFailed(format!(
                    "library already initialized with media root {}",
                    existing
                )));
            }
            Some(existing) if !existing.is_empty() => {}
            _ => {
                schema::set_property(&conn, PROPERTY_MEDIA_PATH, &media_root.to_string_lossy())?;
                log::info!("Initialized library at {}", media_root.display());
            }
        }

        Ok(Store::from_parts(db_path, media_root))
    }

    /// Open an existing library. Fails if no media root was configured.
    pub fn open(db_path: &Path) -> Result<Store> {
        if !db_path.exists() {
            return Err(LibraryError::NotConfigured(format!(
                "no library database at {}",
                db_path.display()
            )));
        }

        let conn = open_db(db_path)?;
        let media_path = schema::get_property(&conn, PROPERTY_MEDIA_PATH)?
            .filter(|p| !p.is_empty())
            .ok_or_else(|| LibraryError::NotConfigured("media root is not set".to_string()))?;

        let media_root = PathBuf::from(&media_path);
        if !media_root.is_dir() {
            return Err(LibraryError::NotConfigured(format!(
                "media root {} does not exist",
                media_path
            )));
        }

        Ok(Store::from_parts(db_path, media_root))
    }

    fn from_parts(db_path: &Path, media_root: PathBuf) -> Store {
        Store {
            inner: Arc::new(StoreInner {
                db_path: db_path.to_path_buf(),
                media_root,
                lock: RwLock::new(()),
            }),
        }
    }

    pub fn db_path(&self) -> &Path {
        &self.inner.db_path
    }

    pub fn media_root(&self) -> &Path {
        &self.inner.media_root
    }

    /// Open a short-lived connection for a single operation
    pub fn connect(&self) -> Result<Connection> {
        Ok(open_connection(&self.inner.db_path)?)
    }

    /// Run `f` under the shared (read) guard
    pub fn with_read<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let _guard = self
            .inner
            .lock
            .read()
            .map_err(|_| LibraryError::Other("catalog lock poisoned".to_string()))?;
        let conn = self.connect()?;
        f(&conn)
    }

    /// Run `f` under the exclusive (write) guard
    pub fn with_write<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let _guard = self
            .inner
            .lock
            .write()
            .map_err(|_| LibraryError::Other("catalog lock poisoned".to_string()))?;
        let conn = self.connect()?;
        f(&conn)
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("db_path", &self.inner.db_path)
            .field("media_root", &self.inner.media_root)
            .finish()
    }
}
