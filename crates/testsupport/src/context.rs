//! Isolated engine instances for tests.
//!
//! Each [`TestContext`] owns a temporary directory and the engine opened in
//! it. The directory and every database file are removed on drop.

use crate::fixtures::test_config;
use common::Config;
use engine::Engine;
use std::path::Path;
use tempfile::TempDir;

/// A freshly created engine in its own temporary directory.
///
/// # Example
///
/// ```no_run
/// use testsupport::prelude::*;
///
/// let mut ctx = TestContext::new().unwrap();
/// let index = ctx.engine().create_index().unwrap();
/// ctx.reopen().unwrap();
/// ctx.engine().open_index(index).unwrap();
/// ```
pub struct TestContext {
    engine: Option<Engine>,
    config: Config,
    dir: TempDir,
}

impl TestContext {
    /// Create a context with small caches suited to tests.
    pub fn new() -> anyhow::Result<Self> {
        let dir = tempfile::tempdir()?;
        let config = test_config(dir.path());
        Self::with_config(dir, config)
    }

    /// Create a context from an explicit config. `config.data_dir` should
    /// point inside `dir`.
    pub fn with_config(dir: TempDir, config: Config) -> anyhow::Result<Self> {
        let engine = Engine::create(config.clone())?;
        Ok(Self {
            engine: Some(engine),
            config,
            dir,
        })
    }

    /// The open engine.
    ///
    /// # Panics
    ///
    /// Panics if a previous [`reopen`](Self::reopen) or [`crash`](Self::crash)
    /// failed to bring the engine back.
    pub fn engine(&self) -> &Engine {
        self.engine.as_ref().expect("engine is not open")
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn data_dir(&self) -> &Path {
        self.dir.path()
    }

    /// Close the engine cleanly and open it again.
    pub fn reopen(&mut self) -> anyhow::Result<()> {
        if let Some(engine) = self.engine.take() {
            engine.close()?;
        }
        self.engine = Some(Engine::open(self.config.clone())?);
        Ok(())
    }

    /// Drop the engine without closing it, then open it again. Anything not
    /// yet written back to the page file must come back through recovery.
    pub fn crash(&mut self) -> anyhow::Result<()> {
        drop(self.engine.take());
        self.engine = Some(Engine::open(self.config.clone())?);
        Ok(())
    }
}
