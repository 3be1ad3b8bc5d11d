//! Best-effort inspection of access token claims
//!
//! **WARNING:** nothing here verifies a signature. The decoded claims are only
//! suitable for display purposes (who appears to be signed in, when the token
//! appears to expire). The backend remains the only authority on whether a
//! token is valid.

use base64::{
    alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
    Engine,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::AccessTokenRef;

const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// An error decoding the payload of an access token
#[derive(Debug, Error)]
pub enum ClaimsError {
    /// The token has no payload segment
    #[error("token is not a JWT")]
    NotAJwt,
    /// The payload segment is not valid base64url
    #[error("token payload is not valid base64url")]
    Encoding(#[from] base64::DecodeError),
    /// The payload is not a JSON object
    #[error("token payload is not a JSON object")]
    Payload(#[from] serde_json::Error),
}

/// Claims read from an access token without verifying it
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct UnverifiedClaims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sub: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    exp: Option<serde_json::Value>,
    #[serde(flatten)]
    other: serde_json::Map<String, serde_json::Value>,
}

impl UnverifiedClaims {
    /// Decodes the payload segment of a JWT
    pub fn decode(token: &AccessTokenRef) -> Result<Self, ClaimsError> {
        let mut segments = token.as_str().split('.');
        let payload = match (segments.next(), segments.next()) {
            (Some(_), Some(payload)) if !payload.is_empty() => payload,
            _ => return Err(ClaimsError::NotAJwt),
        };

        let raw = URL_SAFE_LENIENT.decode(payload)?;
        Ok(serde_json::from_slice(&raw)?)
    }

    /// The subject, usually the backend's user ID
    pub fn subject(&self) -> Option<&str> {
        self.sub.as_deref()
    }

    /// The email address, if the backend includes it
    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    /// The expiry as whole seconds since the Unix epoch
    ///
    /// Fractional timestamps are truncated. An `exp` that is not a
    /// non-negative number is ignored.
    pub fn expires_at(&self) -> Option<u64> {
        let exp = self.exp.as_ref()?;
        exp.as_u64().or_else(|| {
            exp.as_f64()
                .filter(|secs| secs.is_finite() && *secs >= 0.0)
                .map(|secs| secs.trunc() as u64)
        })
    }

    /// Whether the token claims to have expired as of `now`
    ///
    /// A token without an `exp` claim never appears expired.
    pub fn is_expired_at(&self, now: u64) -> bool {
        self.expires_at().map_or(false, |exp| exp <= now)
    }

    /// Any other claim by name
    pub fn get(&self, name: &str) -> Option<&serde_json::Value> {
        self.other.get(name)
    }
}
