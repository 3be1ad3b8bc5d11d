//! Access and refresh tokens for the TuVino backend
//!
//! This crate holds everything about a user's credentials that does not depend
//! on how HTTP requests are made:
//!
//! * braided token types that refuse to print their secrets by accident,
//! * a [`TokenStore`][store::TokenStore] abstraction with in-memory and
//!   file-backed implementations, persisting the access and refresh tokens as
//!   a single unit,
//! * the normalization boundary for token responses from the backend's auth
//!   endpoints,
//! * best-effort decoding of access token claims for display, and
//! * the [`RefreshCoordinator`][refresh::RefreshCoordinator], which guarantees
//!   that at most one refresh-token exchange is in flight at a time.
//!
//! ```
//! use std::sync::{
//!     atomic::{AtomicUsize, Ordering},
//!     Arc,
//! };
//!
//! use tuvino_tokens::refresh::{RefreshCoordinator, RefreshOutcome, TokenRefresher};
//!
//! struct CountingRefresher(AtomicUsize);
//!
//! #[async_trait::async_trait]
//! impl TokenRefresher for CountingRefresher {
//!     async fn refresh(&self) -> RefreshOutcome {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!         RefreshOutcome::Refreshed
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")] async fn main() {
//! let refresher = Arc::new(CountingRefresher(AtomicUsize::new(0)));
//! let coordinator = RefreshCoordinator::from_arc(refresher.clone());
//!
//! // Both requests were sent with the same, now rejected, token
//! let observed = coordinator.generation();
//! assert!(coordinator.refresh(observed).await.is_refreshed());
//! assert!(coordinator.refresh(observed).await.is_refreshed());
//!
//! assert_eq!(refresher.0.load(Ordering::SeqCst), 1);
//! # }
//! ```
//!
//! # Features
//!
//! * `file` (default): Provides [`FileTokenStore`][store::FileTokenStore].

#![cfg_attr(docsrs, feature(doc_cfg))]
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

mod braids;
pub mod claims;
pub mod dto;
pub mod refresh;
pub mod store;

pub use braids::*;
pub use claims::UnverifiedClaims;
pub use refresh::{RefreshCoordinator, RefreshOutcome, TokenRefresher};
pub use store::{TokenPair, TokenStore};
