//! File-backed session store
//!
//! The session lives in a small JSON file (`session.json` in the data
//! directory). Writes go to a sibling temp file that is renamed over the
//! original, so the file on disk always holds a complete session. On unix
//! the temp file is created owner-only, before any content goes into it.

use async_trait::async_trait;
use passvault_core::Paths;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use crate::{Session, SessionStore, StoreError};

/// Session store persisted to disk across process restarts
pub struct FileSessionStore {
    path: PathBuf,
    /// Loaded lazily on first access; the lock also serializes writers
    cache: Mutex<Option<Session>>,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: Mutex::new(None),
        }
    }

    /// Store at the standard location
    pub fn from_paths(paths: &Paths) -> Self {
        Self::new(paths.session_file())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_file(&self) -> Result<Session, StoreError> {
        match fs::read_to_string(&self.path).await {
            Ok(content) if content.trim().is_empty() => Ok(Session::default()),
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Session::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_file(&self, session: &Session) -> Result<(), StoreError> {
        if session.is_empty() {
            return match fs::remove_file(&self.path).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e.into()),
            };
        }

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let tmp = self.path.with_extension("json.tmp");
        let content = serde_json::to_vec_pretty(session)?;

        let mut file = create_private(&tmp).await?;
        file.write_all(&content).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    /// Apply `f` to the current session and persist the result. The cache is
    /// only updated once the write succeeded.
    async fn update(&self, f: impl FnOnce(&mut Session) + Send) -> Result<(), StoreError> {
        let mut cache = self.cache.lock().await;
        let mut next = match cache.as_ref() {
            Some(session) => session.clone(),
            None => self.read_file().await?,
        };
        f(&mut next);

        self.write_file(&next).await?;
        debug!(
            path = %self.path.display(),
            authenticated = next.is_authenticated(),
            "session written"
        );
        *cache = Some(next);
        Ok(())
    }
}

/// Create `path` fresh, readable by the owner only. A leftover file from an
/// interrupted write is removed first so its mode is never reused.
async fn create_private(path: &Path) -> std::io::Result<File> {
    match fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }

    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);
    options.open(path).await
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn get(&self) -> Result<Session, StoreError> {
        let mut cache = self.cache.lock().await;
        if let Some(session) = cache.as_ref() {
            return Ok(session.clone());
        }

        let session = self.read_file().await?;
        *cache = Some(session.clone());
        Ok(session)
    }

    async fn set_token(&self, token: &str) -> Result<(), StoreError> {
        let token = token.to_string();
        self.update(move |session| session.token = Some(token)).await
    }

    async fn set_username(&self, username: &str) -> Result<(), StoreError> {
        let username = username.to_string();
        self.update(move |session| session.username = Some(username))
            .await
    }

    async fn save(&self, session: Session) -> Result<(), StoreError> {
        self.update(move |current| *current = session).await
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.update(|session| *session = Session::default()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_empty_store() -> Result<(), StoreError> {
        let dir = tempdir()?;
        let store = FileSessionStore::new(dir.path().join("session.json"));

        let session = store.get().await?;
        assert!(session.is_empty());
        assert!(!session.is_authenticated());
        Ok(())
    }

    #[tokio::test]
    async fn test_survives_restart() -> Result<(), StoreError> {
        let dir = tempdir()?;
        let path = dir.path().join("nested").join("session.json");

        {
            let store = FileSessionStore::new(&path);
            store.set_token("tok-1").await?;
            store.set_username("alice").await?;
        }

        let reopened = FileSessionStore::new(&path);
        let session = reopened.get().await?;
        assert_eq!(session.bearer(), Some("tok-1"));
        assert_eq!(session.username.as_deref(), Some("alice"));
        Ok(())
    }

    #[tokio::test]
    async fn test_save_replaces_both_fields() -> Result<(), StoreError> {
        let dir = tempdir()?;
        let store = FileSessionStore::new(dir.path().join("session.json"));

        store.save(Session::new("old", "bob")).await?;
        store.save(Session::new("new", "carol")).await?;

        assert_eq!(store.get().await?, Session::new("new", "carol"));
        assert!(!dir.path().join("session.json.tmp").exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_clear_removes_both() -> Result<(), StoreError> {
        let dir = tempdir()?;
        let path = dir.path().join("session.json");
        let store = FileSessionStore::new(&path);

        store.save(Session::new("tok", "alice")).await?;
        assert!(path.exists());

        store.clear().await?;
        assert!(!path.exists());
        assert!(store.get().await?.is_empty());

        // Clearing twice is fine
        store.clear().await?;

        let reopened = FileSessionStore::new(&path);
        assert!(reopened.get().await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_corrupt_file() -> Result<(), StoreError> {
        let dir = tempdir()?;
        let path = dir.path().join("session.json");
        std::fs::write(&path, "{not json")?;

        let store = FileSessionStore::new(&path);
        assert!(matches!(store.get().await, Err(StoreError::Corrupt(_))));
        Ok(())
    }

    #[tokio::test]
    async fn test_unwritable_location() -> Result<(), StoreError> {
        let dir = tempdir()?;
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "a file, not a directory")?;

        let store = FileSessionStore::new(blocker.join("session.json"));
        assert!(store.save(Session::new("tok", "alice")).await.is_err());
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_file_permissions() -> Result<(), StoreError> {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir()?;
        let path = dir.path().join("session.json");
        let store = FileSessionStore::new(&path);
        store.save(Session::new("tok", "alice")).await?;

        let mode = std::fs::metadata(&path)?.permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_temp_file_is_private_before_write() -> Result<(), StoreError> {
        use std::fs::Permissions;
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir()?;
        let tmp = dir.path().join("session.json.tmp");
        std::fs::write(&tmp, "left over")?;
        std::fs::set_permissions(&tmp, Permissions::from_mode(0o644))?;

        let file = create_private(&tmp).await?;
        let meta = file.metadata().await?;
        assert_eq!(meta.permissions().mode() & 0o777, 0o600);
        assert_eq!(meta.len(), 0);
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stale_temp_file_is_replaced() -> Result<(), StoreError> {
        use std::fs::Permissions;
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir()?;
        let path = dir.path().join("session.json");
        let tmp = dir.path().join("session.json.tmp");
        std::fs::write(&tmp, "left over from a crash")?;
        std::fs::set_permissions(&tmp, Permissions::from_mode(0o644))?;

        let store = FileSessionStore::new(&path);
        store.save(Session::new("tok", "alice")).await?;

        assert!(!tmp.exists());
        let mode = std::fs::metadata(&path)?.permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert_eq!(FileSessionStore::new(&path).get().await?, Session::new("tok", "alice"));
        Ok(())
    }
}
