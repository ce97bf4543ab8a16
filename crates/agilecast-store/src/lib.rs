//! Durable key-value store for agilecast, backed by `DuckDB`.
//!
//! [`DuckDbStore`] implements [`KeyValueStore`] over a single `kv_entries`
//! table so cached rates and the region preference survive restarts.

pub mod duckdb;
pub mod migrations;

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use ::duckdb::params;
use agilecast_core::{KeyValueStore, StoreError};
use thiserror::Error;

pub use duckdb::{DuckDbConnectionManager, PooledConnection};

#[derive(Debug, Error)]
pub enum DuckStoreError {
    #[error(transparent)]
    DuckDb(#[from] ::duckdb::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<DuckStoreError> for StoreError {
    fn from(error: DuckStoreError) -> Self {
        StoreError::Backend(error.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub agilecast_home: PathBuf,
    pub db_path: PathBuf,
    pub max_pool_size: usize,
    /// Maximum number of entries; inserting a new key beyond it fails with
    /// [`StoreError::QuotaExceeded`].
    pub max_entries: Option<usize>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::in_home(resolve_agilecast_home())
    }
}

impl StoreConfig {
    /// Default layout under `home`: `<home>/cache/rates.duckdb`.
    pub fn in_home(home: impl Into<PathBuf>) -> Self {
        let agilecast_home = home.into();
        let db_path = agilecast_home.join("cache").join("rates.duckdb");
        Self {
            agilecast_home,
            db_path,
            max_pool_size: 4,
            max_entries: None,
        }
    }
}

#[derive(Clone)]
pub struct DuckDbStore {
    config: StoreConfig,
    manager: DuckDbConnectionManager,
}

impl DuckDbStore {
    pub fn open_default() -> Result<Self, DuckStoreError> {
        Self::open(StoreConfig::default())
    }

    pub fn open(config: StoreConfig) -> Result<Self, DuckStoreError> {
        if let Some(parent) = config.db_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let manager = DuckDbConnectionManager::open(config.db_path.clone(), config.max_pool_size)?;
        let store = Self { config, manager };
        store.initialize()?;
        tracing::debug!(path = %store.db_path().display(), "opened rate store");
        Ok(store)
    }

    pub fn initialize(&self) -> Result<(), DuckStoreError> {
        let connection = self.manager.acquire()?;
        migrations::apply_migrations(&connection)?;
        Ok(())
    }

    pub fn db_path(&self) -> &Path {
        self.manager.db_path()
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn len(&self) -> Result<usize, DuckStoreError> {
        let connection = self.manager.acquire()?;
        let count: i64 = connection.query_row("SELECT COUNT(*) FROM kv_entries", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    pub fn is_empty(&self) -> Result<bool, DuckStoreError> {
        Ok(self.len()? == 0)
    }

    fn read(&self, key: &str) -> Result<Option<String>, DuckStoreError> {
        let connection = self.manager.acquire()?;
        let mut statement = connection.prepare("SELECT value FROM kv_entries WHERE key = ?")?;
        let mut rows = statement.query_map(params![key], |row| row.get::<_, String>(0))?;
        Ok(rows.next().transpose()?)
    }

    fn write(&self, key: &str, value: &str) -> Result<bool, DuckStoreError> {
        let connection = self.manager.acquire()?;

        if let Some(max_entries) = self.config.max_entries {
            let (exists, total): (i64, i64) = connection.query_row(
                "SELECT COUNT(*) FILTER (WHERE key = ?), COUNT(*) FROM kv_entries",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            if exists == 0 && usize::try_from(total).unwrap_or(usize::MAX) >= max_entries {
                return Ok(false);
            }
        }

        connection.execute(
            "INSERT INTO kv_entries (key, value) VALUES (?, ?)
             ON CONFLICT (key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(true)
    }

    fn delete(&self, key: &str) -> Result<(), DuckStoreError> {
        let connection = self.manager.acquire()?;
        connection.execute("DELETE FROM kv_entries WHERE key = ?", params![key])?;
        Ok(())
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, DuckStoreError> {
        let connection = self.manager.acquire()?;
        let mut statement =
            connection.prepare("SELECT key FROM kv_entries WHERE starts_with(key, ?) ORDER BY key")?;
        let rows = statement.query_map(params![prefix], |row| row.get::<_, String>(0))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

impl KeyValueStore for DuckDbStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.read(key)?)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        if self.write(key, value)? {
            Ok(())
        } else {
            tracing::warn!(%key, "rate store is full");
            Err(StoreError::QuotaExceeded {
                key: key.to_owned(),
            })
        }
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        Ok(self.delete(key)?)
    }

    fn keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        Ok(self.keys_with_prefix(prefix)?)
    }
}

/// `AGILECAST_HOME`, else `$HOME/.agilecast`, else `.agilecast`.
pub fn resolve_agilecast_home() -> PathBuf {
    home_from(|name| env::var_os(name))
}

fn home_from(lookup: impl Fn(&str) -> Option<std::ffi::OsString>) -> PathBuf {
    if let Some(path) = lookup("AGILECAST_HOME") {
        let path = PathBuf::from(path);
        if !path.as_os_str().is_empty() {
            return path;
        }
    }

    if let Some(home) = lookup("HOME") {
        return PathBuf::from(home).join(".agilecast");
    }

    PathBuf::from(".agilecast")
}
