//! Token persistence

use std::{io, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{AccessToken, RefreshToken};

#[cfg(feature = "file")]
pub mod file;
pub mod in_memory;

#[cfg(feature = "file")]
pub use file::FileTokenStore;
pub use in_memory::InMemoryTokenStore;

/// The credentials held for a signed-in user
///
/// A pair is always written and removed as a unit, so a store never holds an
/// access token from one exchange next to a refresh token from another.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    /// The bearer credential attached to API calls
    pub access_token: AccessToken,

    /// The credential used to obtain a new access token, if one was issued
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<RefreshToken>,
}

impl TokenPair {
    /// Constructs a new token pair
    pub fn new(access_token: AccessToken, refresh_token: Option<RefreshToken>) -> Self {
        Self {
            access_token,
            refresh_token,
        }
    }
}

/// An error reading or writing persisted tokens
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing storage could not be accessed
    #[error("token storage is unavailable")]
    Io(#[from] io::Error),
    /// The persisted tokens could not be parsed or serialized
    #[error("persisted tokens are malformed")]
    Format(#[from] serde_json::Error),
}

/// Persistent storage for a user's access and refresh tokens
///
/// Implementations are shared between the request path and the refresh path,
/// so all operations take `&self`. Each operation must be atomic with respect
/// to the others.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Loads the stored token pair, if any
    async fn load(&self) -> Result<Option<TokenPair>, StoreError>;

    /// Replaces the stored token pair
    async fn save(&self, tokens: &TokenPair) -> Result<(), StoreError>;

    /// Removes both stored tokens
    async fn clear(&self) -> Result<(), StoreError>;

    /// Loads only the stored access token
    async fn access_token(&self) -> Result<Option<AccessToken>, StoreError> {
        Ok(self.load().await?.map(|pair| pair.access_token))
    }

    /// Loads only the stored refresh token
    async fn refresh_token(&self) -> Result<Option<RefreshToken>, StoreError> {
        Ok(self.load().await?.and_then(|pair| pair.refresh_token))
    }
}

#[async_trait]
impl<S: TokenStore + ?Sized> TokenStore for Arc<S> {
    async fn load(&self) -> Result<Option<TokenPair>, StoreError> {
        (**self).load().await
    }

    async fn save(&self, tokens: &TokenPair) -> Result<(), StoreError> {
        (**self).save(tokens).await
    }

    async fn clear(&self) -> Result<(), StoreError> {
        (**self).clear().await
    }

    async fn access_token(&self) -> Result<Option<AccessToken>, StoreError> {
        (**self).access_token().await
    }

    async fn refresh_token(&self) -> Result<Option<RefreshToken>, StoreError> {
        (**self).refresh_token().await
    }
}
