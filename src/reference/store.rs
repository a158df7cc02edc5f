use std::path::Path;
use std::sync::{Arc, RwLock};

use super::{ReferenceError, ReferenceTables};

/// Holder of the current reference-table version.
///
/// Readers take an `Arc` snapshot and keep using it for a whole analysis;
/// `replace` swaps the entire version at once.
pub struct ReferenceStore {
    current: RwLock<Arc<ReferenceTables>>,
}

impl ReferenceStore {
    pub fn new(tables: ReferenceTables) -> Self {
        Self {
            current: RwLock::new(Arc::new(tables)),
        }
    }

    pub fn builtin() -> Self {
        Self::new(ReferenceTables::builtin())
    }

    pub fn snapshot(&self) -> Result<Arc<ReferenceTables>, ReferenceError> {
        let current = self.current.read().map_err(|_| ReferenceError::LockFailed)?;
        Ok(Arc::clone(&current))
    }

    /// Publish a new, already validated version.
    pub fn replace(&self, tables: ReferenceTables) -> Result<(), ReferenceError> {
        let mut current = self.current.write().map_err(|_| ReferenceError::LockFailed)?;
        *current = Arc::new(tables);
        Ok(())
    }

    /// Load and validate tables from `dir`, then publish them. On any error
    /// the previous version stays in place.
    pub fn reload_from(&self, dir: &Path) -> Result<(), ReferenceError> {
        let tables = ReferenceTables::load(dir)?;
        self.replace(tables)?;
        tracing::info!(dir = %dir.display(), "Reference tables replaced");
        Ok(())
    }
}
