//! A process-local token store

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{StoreError, TokenPair, TokenStore};

/// A token store that keeps the pair in memory
///
/// Tokens do not survive the process.
#[derive(Default, Debug)]
pub struct InMemoryTokenStore {
    tokens: RwLock<Option<TokenPair>>,
}

impl InMemoryTokenStore {
    /// Constructs an empty store
    pub const fn new() -> Self {
        Self {
            tokens: RwLock::new(None),
        }
    }

    /// Constructs a store already holding `tokens`
    pub fn with_tokens(tokens: TokenPair) -> Self {
        Self {
            tokens: RwLock::new(Some(tokens)),
        }
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn load(&self) -> Result<Option<TokenPair>, StoreError> {
        Ok(self.tokens.read().clone())
    }

    async fn save(&self, tokens: &TokenPair) -> Result<(), StoreError> {
        *self.tokens.write() = Some(tokens.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.tokens.write().take();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AccessToken, RefreshToken};

    #[tokio::test]
    async fn empty_store_has_no_tokens() -> color_eyre::Result<()> {
        let store = InMemoryTokenStore::new();

        assert_eq!(store.load().await?, None);
        assert_eq!(store.access_token().await?, None);
        assert_eq!(store.refresh_token().await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn save_replaces_the_whole_pair() -> color_eyre::Result<()> {
        let store = InMemoryTokenStore::with_tokens(TokenPair::new(
            AccessToken::from_static("old-access"),
            Some(RefreshToken::from_static("old-refresh")),
        ));

        store
            .save(&TokenPair::new(AccessToken::from_static("new-access"), None))
            .await?;

        assert_eq!(
            store.access_token().await?,
            Some(AccessToken::from_static("new-access"))
        );
        assert_eq!(store.refresh_token().await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn clear_removes_both_tokens() -> color_eyre::Result<()> {
        let store = InMemoryTokenStore::with_tokens(TokenPair::new(
            AccessToken::from_static("access"),
            Some(RefreshToken::from_static("refresh")),
        ));

        store.clear().await?;

        assert_eq!(store.load().await?, None);
        Ok(())
    }
}
