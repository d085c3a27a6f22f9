//! `<name>.bt`: a few opaque bytes the catalog layer boots from.
//!
//! Updates go to `<name>.bt_tmp` first and are renamed over the real file, so
//! a crash leaves either the old or the new contents.

use common::{Config, DbError, DbResult};
use std::{
    fs::{self, File, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

#[derive(Debug)]
pub struct Booter {
    path: PathBuf,
    tmp: PathBuf,
}

impl Booter {
    pub fn create(cfg: &Config) -> DbResult<Self> {
        let booter = Self::paths(cfg);
        booter.remove_stale_tmp()?;
        OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&booter.path)
            .map_err(|e| {
                DbError::Storage(format!("Failed to create {}: {e}", booter.path.display()))
            })?;
        Ok(booter)
    }

    pub fn open(cfg: &Config) -> DbResult<Self> {
        let booter = Self::paths(cfg);
        booter.remove_stale_tmp()?;
        if !booter.path.is_file() {
            return Err(DbError::Storage(format!(
                "boot file {} does not exist",
                booter.path.display()
            )));
        }
        Ok(booter)
    }

    fn paths(cfg: &Config) -> Self {
        Self {
            path: cfg.file_path("bt"),
            tmp: cfg.file_path("bt_tmp"),
        }
    }

    fn remove_stale_tmp(&self) -> DbResult<()> {
        if self.tmp.exists() {
            tracing::warn!(path = %self.tmp.display(), "boot.stale_tmp");
            fs::remove_file(&self.tmp)?;
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> DbResult<Vec<u8>> {
        Ok(fs::read(&self.path)?)
    }

    /// Atomically replaces the file contents with `bytes`.
    pub fn update(&self, bytes: &[u8]) -> DbResult<()> {
        let mut tmp = File::create(&self.tmp)?;
        tmp.write_all(bytes)?;
        tmp.sync_all()?;
        drop(tmp);
        fs::rename(&self.tmp, &self.path)?;
        tracing::debug!(len = bytes.len(), "boot.update");
        Ok(())
    }
}
