use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::core::error::{AppResult, UnitResult};

/// On-disk cache of per-account session blobs. One file per account,
/// keyed by account name. The blob content is opaque to the store;
/// the automation surface produces and consumes it.
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn path_for(&self, account_name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", account_name))
    }

    /// Returns the cached blob for the account, or `None` when no
    /// session has been saved yet.
    pub fn load(&self, account_name: &str) -> AppResult<Option<String>> {
        let path = self.path_for(account_name);
        if !path.exists() {
            return Ok(None);
        }
        let blob = fs::read_to_string(&path)?;
        debug!("[{}] loaded session state from {:?}", account_name, path);
        Ok(Some(blob))
    }

    pub fn save(&self, account_name: &str, blob: &str) -> UnitResult {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(account_name);
        fs::write(&path, blob)?;
        debug!("[{}] saved session state to {:?}", account_name, path);
        Ok(())
    }

    /// Deletes the cached session. Returns whether a file was removed.
    pub fn invalidate(&self, account_name: &str) -> AppResult<bool> {
        let path = self.path_for(account_name);
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path)?;
        info!("[{}] invalidated stale session state", account_name);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_missing_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());

        assert!(store.load("acct_1").unwrap().is_none());
    }

    #[test]
    fn test_save_then_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("nested"));

        store.save("acct_1", r#"[{"name":"sid","value":"abc"}]"#).unwrap();

        let blob = store.load("acct_1").unwrap();
        assert_eq!(blob.as_deref(), Some(r#"[{"name":"sid","value":"abc"}]"#));
    }

    #[test]
    fn test_invalidate_removes_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        store.save("acct_1", "{}").unwrap();

        assert!(store.invalidate("acct_1").unwrap());
        assert!(!store.invalidate("acct_1").unwrap());
        assert!(store.load("acct_1").unwrap().is_none());
    }

    #[test]
    fn test_accounts_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        store.save("acct_1", "one").unwrap();
        store.save("acct_2", "two").unwrap();

        store.invalidate("acct_1").unwrap();

        assert_eq!(store.load("acct_2").unwrap().as_deref(), Some("two"));
    }
}
