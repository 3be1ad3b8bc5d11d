//! Typed access to the backend's wine, preference, and menu resources
//!
//! Each resource is exposed as methods on [`ApiClient`](crate::ApiClient), so
//! every call carries the same authorization and refresh behavior as the raw
//! verbs.

mod menu;
mod preferences;
mod wines;

pub use menu::{MenuRecommendationResponse, MenuWineRecommendation};
pub use preferences::{PreferenceCategory, PreferenceOption};
pub use wines::{InvalidWine, RatedWine, Wine, WineStatus};

use std::borrow::Cow;

use thiserror::Error;
use tuvino_tokens::UserIdRef;

use crate::ApiError;

/// An error calling a catalog resource
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The request failed
    #[error(transparent)]
    Api(#[from] ApiError),
    /// Onboarding requires at least one selected preference
    #[error("at least one preference option must be selected")]
    EmptySelection,
}

fn query_value(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

fn path_segment(user_id: &UserIdRef) -> Cow<'_, str> {
    urlencoding::encode(user_id.as_str())
}
