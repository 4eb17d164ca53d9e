use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::{IndexError, Result};
use crate::index::{IndexConfig, IndexPreparer, PrepareStats};
use crate::query::engine::QueryEngine;
use crate::query::result::QueryResult;

/// Prepare-then-query lifecycle over one source file. Searches fail with
/// `NotReady` until a preparation has succeeded.
pub struct Searcher {
    source: PathBuf,
    config: IndexConfig,
    engine: Option<QueryEngine>,
}

impl Searcher {
    pub fn new(source: impl Into<PathBuf>, config: IndexConfig) -> Self {
        Self {
            source: source.into(),
            config,
            engine: None,
        }
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn is_ready(&self) -> bool {
        self.engine.is_some()
    }

    pub fn prepare(&mut self) -> Result<PrepareStats> {
        // A failed run must not leave the previous engine in place
        self.engine = None;

        let prepared = IndexPreparer::new(&self.source, self.config.clone())?
            .run()
            .inspect_err(|e| warn!("Index for {} is not ready: {}", self.source.display(), e))?;
        let stats = prepared.manifest.stats.clone();

        self.engine = Some(QueryEngine::from_prepared(prepared, &self.config)?);
        Ok(stats)
    }

    pub fn engine(&self) -> Result<&QueryEngine> {
        self.engine.as_ref().ok_or_else(|| {
            IndexError::NotReady(format!("{} has not been prepared", self.source.display()))
        })
    }

    pub fn search_by_zip(&self, zip: &str) -> Result<QueryResult> {
        self.engine()?.lookup_by_zip(zip)
    }

    pub fn search_by_email(&self, email: &str) -> Result<QueryResult> {
        self.engine()?.lookup_by_email(email)
    }
}
