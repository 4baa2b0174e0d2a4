//! Configuration loading from environment variables.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::backend::{Backend, FileBackend};
use crate::db::SqliteBackend;
use crate::store::RECORDS_KEY;

/// Persistent backend kinds selectable from the environment or CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum BackendKind {
    #[default]
    Sqlite,
    File,
}

impl FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "file" | "json" => Ok(Self::File),
            other => bail!("Unknown backend {:?} (expected sqlite or file)", other),
        }
    }
}

/// Where and how records are persisted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub backend: BackendKind,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            backend: BackendKind::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Reads `KIROKU_DATA_DIR` and `KIROKU_BACKEND`, either from the
    /// environment or from a `.env` file. Both are optional.
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(dir) = lookup("KIROKU_DATA_DIR").filter(|d| !d.trim().is_empty()) {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(kind) = lookup("KIROKU_BACKEND") {
            config.backend = kind.parse().context("Invalid KIROKU_BACKEND")?;
        }

        Ok(config)
    }

    /// Apply CLI overrides on top of the environment
    pub fn with_overrides(mut self, data_dir: Option<&Path>, backend: Option<BackendKind>) -> Self {
        if let Some(dir) = data_dir {
            self.data_dir = dir.to_path_buf();
        }
        if let Some(kind) = backend {
            self.backend = kind;
        }
        self
    }

    /// File the configured backend keeps its data in
    pub fn store_path(&self) -> PathBuf {
        match self.backend {
            BackendKind::Sqlite => self.data_dir.join("kiroku.db"),
            BackendKind::File => self.data_dir.join(format!("{}.json", RECORDS_KEY)),
        }
    }

    pub fn open_backend(&self) -> Result<Box<dyn Backend>> {
        let backend: Box<dyn Backend> = match self.backend {
            BackendKind::Sqlite => Box::new(SqliteBackend::open(&self.store_path())?),
            BackendKind::File => Box::new(FileBackend::new(&self.data_dir)?),
        };
        Ok(backend)
    }
}
