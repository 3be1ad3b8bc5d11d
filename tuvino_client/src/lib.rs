//! An authenticated client for the TuVino API
//!
//! [`ApiClient`] sends JSON requests to the backend, attaching the access
//! token held in a [`TokenStore`](tuvino_tokens::TokenStore). When the backend
//! rejects the token, the client exchanges the stored refresh token for a new
//! one and retries the request exactly once. However many requests are
//! rejected at the same time, only one exchange is made; every rejected
//! request waits on it and then retries with the new token.
//!
//! If the refresh token is itself rejected, the stored tokens are cleared and
//! the request fails with [`ApiError::SessionExpired`]. Callers should treat
//! this as a signal to sign in again.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use tuvino_client::{ApiClient, AuthSession, ClientConfig};
//! use tuvino_tokens::store::FileTokenStore;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig::from_env()?;
//! let store = Arc::new(FileTokenStore::new(".tuvino/tokens.json"));
//! let client = ApiClient::new(config, store)?;
//!
//! AuthSession::new(client.clone())
//!     .login("ana@example.com", "hunter2")
//!     .await?;
//!
//! let wines = client.search_wines("malbec").await?;
//! # Ok(()) }
//! ```
//!
//! The pieces of the standard stack are public, so they can be assembled by
//! hand with [`ApiClient::from_parts`]:
//!
//! * [`AccessTokenMiddleware`] authorizes requests and replays them after a
//!   refresh,
//! * [`RefreshTokenExchange`] performs the exchange against the refresh
//!   endpoint, and
//! * [`RefreshCoordinator`](tuvino_tokens::RefreshCoordinator) ensures only
//!   one exchange is in flight.

#![warn(
    missing_docs,
    unused_import_braces,
    unused_imports,
    unused_qualifications
)]
#![deny(
    missing_debug_implementations,
    trivial_numeric_casts,
    unsafe_code,
    unused_must_use
)]

pub mod catalog;
mod client;
mod config;
mod error;
mod exchange;
mod middleware;
pub mod session;

pub use catalog::CatalogError;
pub use client::{decode_payload, ApiClient, ApiClientBuilder};
pub use config::{ClientConfig, ConfigError, BACKEND_URL_VAR};
pub use error::{ApiError, SessionExpired};
pub use exchange::{RefreshTokenExchange, REFRESH_PATH};
pub use middleware::{AccessTokenMiddleware, RequiresAuthorization, AUTH_ENDPOINTS};
pub use session::{AuthSession, SessionError, SessionUser};
