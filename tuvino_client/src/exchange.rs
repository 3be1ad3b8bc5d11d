//! Exchanges a refresh token with the backend's refresh endpoint

use std::error;

use reqwest::{header, StatusCode, Url};
use reqwest_middleware::ClientWithMiddleware;
use tuvino_tokens::{
    dto::{RefreshRequest, TokenResponse},
    RefreshOutcome, TokenRefresher, TokenStore,
};

/// The refresh endpoint, relative to the API root
pub const REFRESH_PATH: &str = "/auth/refresh";

/// A [`TokenRefresher`] that posts the stored refresh token to the backend
///
/// The client given here must not carry the
/// [`AccessTokenMiddleware`](crate::AccessTokenMiddleware). The refresh
/// endpoint is an auth endpoint and is never sent an access token.
#[derive(Debug)]
pub struct RefreshTokenExchange<S> {
    client: ClientWithMiddleware,
    refresh_url: Url,
    store: S,
}

impl<S> RefreshTokenExchange<S> {
    /// Constructs a new exchange against `refresh_url`
    pub fn new(client: ClientWithMiddleware, refresh_url: Url, store: S) -> Self {
        Self {
            client,
            refresh_url,
            store,
        }
    }

    /// The URL the refresh token is posted to
    pub fn refresh_url(&self) -> &Url {
        &self.refresh_url
    }
}

#[async_trait::async_trait]
impl<S> TokenRefresher for RefreshTokenExchange<S>
where
    S: TokenStore,
{
    #[tracing::instrument(skip(self), fields(url = %self.refresh_url))]
    async fn refresh(&self) -> RefreshOutcome {
        let refresh_token = match self.store.refresh_token().await {
            Ok(Some(token)) => token,
            Ok(None) => {
                tracing::debug!("no refresh token stored");
                return RefreshOutcome::MissingRefreshToken;
            }
            Err(error) => {
                tracing::warn!(
                    error = (&error as &dyn error::Error),
                    "unable to read refresh token"
                );
                return RefreshOutcome::MissingRefreshToken;
            }
        };

        tracing::debug!(refresh_token = %refresh_token, "exchanging refresh token");

        let body = RefreshRequest {
            refresh_token: &refresh_token,
        };
        let response = match self
            .client
            .post(self.refresh_url.clone())
            .header(header::CONTENT_TYPE, "application/json")
            .json(&body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(error) => {
                tracing::warn!(
                    error = (&error as &dyn error::Error),
                    "error sending refresh request"
                );
                return RefreshOutcome::Failed;
            }
        };

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            tracing::info!("refresh token rejected, clearing stored tokens");
            if let Err(error) = self.store.clear().await {
                tracing::error!(
                    error = (&error as &dyn error::Error),
                    "unable to clear rejected tokens"
                );
            }
            return RefreshOutcome::Rejected;
        }

        if !status.is_success() {
            tracing::warn!(%status, "refresh endpoint returned an error");
            return RefreshOutcome::Failed;
        }

        let token_response: TokenResponse = match response.json().await {
            Ok(parsed) => parsed,
            Err(error) => {
                tracing::warn!(
                    error = (&error as &dyn error::Error),
                    "unable to parse refresh response"
                );
                return RefreshOutcome::Failed;
            }
        };

        let Some(tokens) = token_response.into_pair(Some(refresh_token)) else {
            tracing::warn!("refresh response did not include an access token");
            return RefreshOutcome::Failed;
        };

        if let Err(error) = self.store.save(&tokens).await {
            tracing::error!(
                error = (&error as &dyn error::Error),
                "unable to persist refreshed tokens"
            );
            return RefreshOutcome::Failed;
        }

        tracing::debug!(access_token = %tokens.access_token, "stored refreshed access token");
        RefreshOutcome::Refreshed
    }
}
