//! Session persistence.
//!
//! Write-through: the handle persists a full snapshot on every durable
//! mutation. Sub-sessions ride inside the parent's file; they are never
//! stored separately.

use std::path::{Path, PathBuf};

use ens_domain::error::{Error, Result};

use crate::session::Session;

/// Persistence contract consumed by [`crate::SessionHandle`].
pub trait SessionStore: Send + Sync {
    fn persist(&self, session: &Session) -> Result<()>;
    fn load(&self, id: &str) -> Result<Option<Session>>;
    fn list(&self) -> Result<Vec<String>>;
    fn remove(&self, id: &str) -> Result<()>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// JSON file store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One pretty-printed JSON file per session under a directory.
pub struct JsonSessionStore {
    dir: PathBuf,
}

impl JsonSessionStore {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).map_err(Error::Io)?;
        Ok(Self { dir })
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }
}

impl SessionStore for JsonSessionStore {
    fn persist(&self, session: &Session) -> Result<()> {
        let json = serde_json::to_string_pretty(session)?;
        std::fs::write(self.path_for(&session.id), json).map_err(Error::Io)?;
        Ok(())
    }

    fn load(&self, id: &str) -> Result<Option<Session>> {
        let path = self.path_for(id);
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(path).map_err(Error::Io)?;
        Ok(Some(serde_json::from_str(&raw)?))
    }

    fn list(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        for entry in std::fs::read_dir(&self.dir).map_err(Error::Io)? {
            let entry = entry.map_err(Error::Io)?;
            let name = entry.file_name();
            if let Some(id) = name.to_string_lossy().strip_suffix(".json") {
                ids.push(id.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn remove(&self, id: &str) -> Result<()> {
        let path = self.path_for(id);
        if path.exists() {
            std::fs::remove_file(path).map_err(Error::Io)?;
        }
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Null store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Discards everything. Used by one-shot sub-runtimes and tests.
pub struct NullSessionStore;

impl SessionStore for NullSessionStore {
    fn persist(&self, _session: &Session) -> Result<()> {
        Ok(())
    }

    fn load(&self, _id: &str) -> Result<Option<Session>> {
        Ok(None)
    }

    fn list(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    fn remove(&self, _id: &str) -> Result<()> {
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
