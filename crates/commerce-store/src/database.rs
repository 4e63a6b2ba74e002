use anyhow::{anyhow, Context, Result};
use commerce_core::Schema;
use std::fs;
use std::io;
use tracing::{debug, trace};

use crate::fs_utils::replace_file;
use crate::StoreLayout;

/// Stacked transaction scopes. Every `begin_scope` is paired with exactly one
/// `commit_scope` or `rollback_scope`; pairs resolve innermost first.
pub trait TransactionScope {
    /// Opens a scope and returns the new nesting depth.
    fn begin_scope(&mut self) -> Result<usize>;
    fn commit_scope(&mut self) -> Result<()>;
    /// Undoes only the work done since the matching `begin_scope`.
    fn rollback_scope(&mut self) -> Result<()>;
    fn depth(&self) -> usize;
}

/// Schema storage that migrations mutate through the working copy.
pub trait SchemaStorage: TransactionScope {
    fn schema(&self) -> &Schema;
    fn schema_mut(&mut self) -> &mut Schema;
    /// Persists the working copy when no scope is open; inside a scope the
    /// outermost commit persists instead.
    fn autocommit(&mut self) -> Result<()>;
}

/// File-backed schema store. Mutations land in a working copy; each open
/// scope holds a savepoint of the schema as it was when the scope began.
#[derive(Debug)]
pub struct SchemaDatabase {
    layout: StoreLayout,
    working: Schema,
    savepoints: Vec<Schema>,
}

impl SchemaDatabase {
    pub fn open(layout: StoreLayout) -> Result<Self> {
        let working = read_schema_file(&layout)?;
        debug!(
            path = %layout.schema_path().display(),
            tables = working.tables.len(),
            "opened schema database"
        );
        Ok(Self {
            layout,
            working,
            savepoints: Vec::new(),
        })
    }

    pub fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    /// The schema as currently persisted, ignoring uncommitted work.
    pub fn persisted_schema(&self) -> Result<Schema> {
        read_schema_file(&self.layout)
    }

    fn persist(&self) -> Result<()> {
        let path = self.layout.schema_path();
        let content = self.working.to_json_pretty()?;
        replace_file(
            &self.layout.schema_staging_path(),
            &path,
            content.as_bytes(),
        )
        .with_context(|| format!("failed to write schema file: {}", path.display()))?;
        debug!(path = %path.display(), "schema persisted");
        Ok(())
    }
}

impl TransactionScope for SchemaDatabase {
    fn begin_scope(&mut self) -> Result<usize> {
        self.savepoints.push(self.working.clone());
        trace!(depth = self.savepoints.len(), "scope opened");
        Ok(self.savepoints.len())
    }

    fn commit_scope(&mut self) -> Result<()> {
        let savepoint = self
            .savepoints
            .pop()
            .ok_or_else(|| anyhow!("cannot commit: no transaction scope is open"))?;
        trace!(depth = self.savepoints.len(), "scope committed");
        if !self.savepoints.is_empty() {
            return Ok(());
        }

        if let Err(err) = self.persist() {
            // The outermost commit did not reach disk, so the scope's work is discarded.
            self.working = savepoint;
            return Err(err.context("outermost commit failed; scope rolled back"));
        }
        Ok(())
    }

    fn rollback_scope(&mut self) -> Result<()> {
        let savepoint = self
            .savepoints
            .pop()
            .ok_or_else(|| anyhow!("cannot roll back: no transaction scope is open"))?;
        self.working = savepoint;
        trace!(depth = self.savepoints.len(), "scope rolled back");
        Ok(())
    }

    fn depth(&self) -> usize {
        self.savepoints.len()
    }
}

impl SchemaStorage for SchemaDatabase {
    fn schema(&self) -> &Schema {
        &self.working
    }

    fn schema_mut(&mut self) -> &mut Schema {
        &mut self.working
    }

    fn autocommit(&mut self) -> Result<()> {
        if self.savepoints.is_empty() {
            self.persist()?;
        }
        Ok(())
    }
}

fn read_schema_file(layout: &StoreLayout) -> Result<Schema> {
    let path = layout.schema_path();
    let raw = match fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Schema::default()),
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to read schema file: {}", path.display()));
        }
    };

    Schema::from_json_str(&raw)
        .with_context(|| format!("failed to parse schema file: {}", path.display()))
}
