//! DTOs exchanged with the backend's auth endpoints
//!
//! The backend has emitted token fields in both camelCase and snake_case. The
//! canonical contract is camelCase; snake_case is accepted as an alias here,
//! once, so calling code only ever sees a [`TokenPair`].

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use crate::{AccessToken, RefreshToken, RefreshTokenRef, TokenPair};

/// The body returned by the login and refresh endpoints
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    /// The newly issued access token
    #[serde(default, alias = "access_token", deserialize_with = "non_empty")]
    pub access_token: Option<AccessToken>,

    /// The rotated refresh token, if the backend rotated it
    #[serde(default, alias = "refresh_token", deserialize_with = "non_empty")]
    pub refresh_token: Option<RefreshToken>,
}

impl TokenResponse {
    /// Converts the response into a storable token pair
    ///
    /// Returns `None` if the response carried no access token. When the
    /// response did not rotate the refresh token, `fallback_refresh` is kept.
    pub fn into_pair(self, fallback_refresh: Option<RefreshToken>) -> Option<TokenPair> {
        let access_token = self.access_token?;
        Some(TokenPair::new(
            access_token,
            self.refresh_token.or(fallback_refresh),
        ))
    }
}

fn non_empty<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: From<String>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.is_empty()).map(T::from))
}

/// The body sent to the refresh endpoint
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest<'a> {
    /// The refresh token being exchanged
    pub refresh_token: &'a RefreshTokenRef,
}

/// The body sent to the login and register endpoints
#[derive(Serialize)]
pub struct Credentials<'a> {
    /// The user's email address
    pub email: &'a str,
    /// The user's password
    pub password: &'a str,
}

impl fmt::Debug for Credentials<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"***PASSWORD***")
            .finish()
    }
}
