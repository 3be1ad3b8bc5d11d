//! A token store backed by a local JSON file

use std::{
    io,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use tokio::{fs, io::AsyncWriteExt, sync::Mutex};

use super::{StoreError, TokenPair, TokenStore};

/// A token store that persists the pair to a file
///
/// The pair is written to a sibling temporary file and then renamed over the
/// target, so readers observe either the old pair or the new one. Saves and
/// clears through the same store run one at a time.
#[derive(Debug)]
pub struct FileTokenStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileTokenStore {
    /// Constructs a new file token store
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// The file holding the tokens
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(ToOwned::to_owned)
            .unwrap_or_default();
        name.push(format!(".{}.tmp", std::process::id()));
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn load(&self) -> Result<Option<TokenPair>, StoreError> {
        let data = match fs::read(&self.path).await {
            Ok(data) => data,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        Ok(Some(serde_json::from_slice(&data)?))
    }

    #[tracing::instrument(skip_all, fields(path = %self.path.display()))]
    async fn save(&self, tokens: &TokenPair) -> Result<(), StoreError> {
        let data = serde_json::to_vec_pretty(tokens)?;
        let staging = self.staging_path();
        let _writing = self.write_lock.lock().await;

        let mut opts = fs::OpenOptions::new();
        opts.create(true).truncate(true).write(true);

        #[cfg(unix)]
        opts.mode(0o600);

        let mut file = opts.open(&staging).await?;
        file.write_all(&data).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&staging, &self.path).await?;
        tracing::trace!("persisted token pair");
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        let _writing = self.write_lock.lock().await;
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use color_eyre::Result;

    use super::*;
    use crate::{AccessToken, RefreshToken};

    fn sample_pair() -> TokenPair {
        TokenPair::new(
            AccessToken::from_static("file-access"),
            Some(RefreshToken::from_static("file-refresh")),
        )
    }

    #[tokio::test]
    async fn missing_file_means_no_tokens() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let store = FileTokenStore::new(dir.path().join("tokens.json"));

        assert_eq!(store.load().await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn saved_pair_is_loaded_back() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let store = FileTokenStore::new(dir.path().join("tokens.json"));

        store.save(&sample_pair()).await?;

        assert_eq!(store.load().await?, Some(sample_pair()));
        assert!(!store.staging_path().exists());
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_saves_never_leave_a_partial_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let store = std::sync::Arc::new(FileTokenStore::new(dir.path().join("tokens.json")));
        let pairs: Vec<TokenPair> = (0..4)
            .map(|i| {
                TokenPair::new(
                    AccessToken::new(format!("access-{i}")),
                    Some(RefreshToken::new(format!("refresh-{i}"))),
                )
            })
            .collect();

        for _ in 0..50 {
            let mut saves = tokio::task::JoinSet::new();
            for pair in pairs.iter().cloned() {
                let store = store.clone();
                saves.spawn(async move { store.save(&pair).await });
            }
            while let Some(saved) = saves.join_next().await {
                saved??;
            }

            let loaded = store.load().await?.expect("a pair was saved");
            assert!(pairs.contains(&loaded), "{loaded:?}");
        }

        assert!(!store.staging_path().exists());
        Ok(())
    }

    #[tokio::test]
    async fn file_uses_fixed_storage_keys() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("tokens.json");
        let store = FileTokenStore::new(&path);

        store.save(&sample_pair()).await?;

        let raw: serde_json::Value = serde_json::from_slice(&std::fs::read(&path)?)?;
        assert_eq!(raw["access_token"], "file-access");
        assert_eq!(raw["refresh_token"], "file-refresh");
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn token_file_is_private_to_the_owner() -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir()?;
        let path = dir.path().join("tokens.json");
        let store = FileTokenStore::new(&path);

        store.save(&sample_pair()).await?;

        let mode = std::fs::metadata(&path)?.permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        Ok(())
    }

    #[tokio::test]
    async fn clear_is_idempotent() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let store = FileTokenStore::new(dir.path().join("tokens.json"));
        store.save(&sample_pair()).await?;

        store.clear().await?;
        store.clear().await?;

        assert_eq!(store.load().await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn garbage_in_the_file_is_a_format_error() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("tokens.json");
        std::fs::write(&path, b"not json")?;
        let store = FileTokenStore::new(&path);

        let result = store.load().await;

        assert!(matches!(result, Err(StoreError::Format(_))));
        Ok(())
    }
}
