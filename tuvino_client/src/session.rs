//! Signing in and out

use serde_json::Value;
use thiserror::Error;
use tuvino_tokens::{
    claims::UnverifiedClaims, dto::Credentials, dto::TokenResponse, store::StoreError,
    AccessTokenRef, UserIdRef,
};

use crate::{ApiClient, ApiError};

/// An error signing in or reading the signed-in user
#[derive(Debug, Error)]
pub enum SessionError {
    /// The request failed
    #[error(transparent)]
    Api(#[from] ApiError),
    /// The backend accepted the credentials but returned no access token
    #[error("invalid response from server: access token missing")]
    MissingAccessToken,
    /// The token store could not be accessed
    #[error("error accessing stored tokens")]
    Store(#[from] StoreError),
}

/// The signed-in user, as described by their access token
///
/// The claims are read without verifying the token's signature and are only
/// suitable for display.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SessionUser {
    claims: UnverifiedClaims,
}

impl SessionUser {
    /// Reads the user from an access token
    ///
    /// A token that cannot be decoded yields a user with no known identity.
    pub fn from_token(token: &AccessTokenRef) -> Self {
        let claims = UnverifiedClaims::decode(token).unwrap_or_else(|error| {
            tracing::debug!(%error, "access token claims are unreadable");
            UnverifiedClaims::default()
        });
        Self { claims }
    }

    /// The user's identifier, from the `sub` claim
    pub fn user_id(&self) -> Option<&UserIdRef> {
        self.claims.subject().map(UserIdRef::from_str)
    }

    /// The user's email address
    pub fn email(&self) -> Option<&str> {
        self.claims.email()
    }

    /// Every claim in the access token
    pub fn claims(&self) -> &UnverifiedClaims {
        &self.claims
    }
}

/// Signs users in and out through an [`ApiClient`]
///
/// Tokens obtained here are written to the client's store, so every request
/// made with the client afterwards is authorized.
#[derive(Clone, Debug)]
pub struct AuthSession {
    client: ApiClient,
}

impl AuthSession {
    /// Constructs a session manager for `client`
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// The client requests are made with
    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    /// Exchanges credentials for tokens and stores them
    #[tracing::instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<SessionUser, SessionError> {
        let response = self
            .client
            .post("/auth/login", &Credentials { email, password })
            .await?;

        let response = match response {
            obj @ Value::Object(_) => {
                serde_json::from_value(obj).map_err(|err| SessionError::Api(ApiError::Decode(err)))?
            }
            _ => TokenResponse::default(),
        };
        let tokens = response
            .into_pair(None)
            .ok_or(SessionError::MissingAccessToken)?;

        self.client.store().save(&tokens).await?;
        tracing::info!("signed in");

        Ok(SessionUser::from_token(&tokens.access_token))
    }

    /// Creates an account, then signs in with it
    #[tracing::instrument(skip(self, password))]
    pub async fn register(&self, email: &str, password: &str) -> Result<SessionUser, SessionError> {
        self.client
            .post("/auth/register", &Credentials { email, password })
            .await?;
        tracing::info!("registered");

        self.login(email, password).await
    }

    /// Forgets the stored tokens
    pub async fn logout(&self) -> Result<(), SessionError> {
        self.client.store().clear().await?;
        tracing::info!("signed out");
        Ok(())
    }

    /// The signed-in user, or `None` when signed out
    pub async fn current_user(&self) -> Result<Option<SessionUser>, SessionError> {
        let token = self.client.store().access_token().await?;
        Ok(token.as_deref().map(SessionUser::from_token))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
    use tuvino_tokens::{store::InMemoryTokenStore, TokenStore};

    use super::*;
    use crate::{
        test_support::{reply, MockBackend},
        ClientConfig,
    };

    fn jwt(payload: &str) -> String {
        format!("e30.{}.sig", URL_SAFE_NO_PAD.encode(payload))
    }

    fn session(
        store: Arc<InMemoryTokenStore>,
        backend: Arc<MockBackend>,
    ) -> AuthSession {
        let config = ClientConfig::new("https://api.example.com/api").unwrap();
        let client = ApiClient::builder(config, store)
            .with_arc_layer(backend)
            .build()
            .unwrap();
        AuthSession::new(client)
    }

    mod login {
        use super::*;

        #[tokio::test]
        async fn stores_tokens_and_decodes_the_user() -> color_eyre::Result<()> {
            let token = jwt(r#"{"sub":"user-1","email":"ana@example.com"}"#);
            let body = format!(r#"{{"access_token":"{token}","refresh_token":"r1"}}"#);
            let backend = MockBackend::new(move |_| reply(200, body.clone()));
            let store = Arc::new(InMemoryTokenStore::new());
            let session = session(store.clone(), backend.clone());

            let user = session.login("ana@example.com", "hunter2").await?;

            assert_eq!(user.user_id().map(UserIdRef::as_str), Some("user-1"));
            assert_eq!(user.email(), Some("ana@example.com"));
            let stored = store.load().await?.unwrap();
            assert_eq!(stored.access_token.as_str(), token);
            assert_eq!(
                stored.refresh_token.as_ref().map(|t| t.as_str()),
                Some("r1")
            );

            let requests = backend.requests();
            assert_eq!(requests[0].path, "/api/auth/login");
            assert!(requests[0].authorization.is_none());
            assert_eq!(
                requests[0].body.as_deref(),
                Some(&br#"{"email":"ana@example.com","password":"hunter2"}"#[..])
            );
            Ok(())
        }

        #[tokio::test]
        async fn fails_without_an_access_token() -> color_eyre::Result<()> {
            let backend = MockBackend::new(|_| reply(200, r#"{"message":"ok"}"#));
            let store = Arc::new(InMemoryTokenStore::new());
            let session = session(store.clone(), backend);

            let err = session.login("ana@example.com", "hunter2").await.unwrap_err();

            assert!(matches!(err, SessionError::MissingAccessToken));
            assert!(store.load().await?.is_none());
            Ok(())
        }

        #[tokio::test]
        async fn bad_credentials_are_a_status_error() {
            let backend = MockBackend::new(|_| reply(401, r#"{"detail":"bad credentials"}"#));
            let session = session(Arc::new(InMemoryTokenStore::new()), backend.clone());

            let err = session.login("ana@example.com", "wrong").await.unwrap_err();

            assert!(matches!(
                err,
                SessionError::Api(ApiError::Status { status, .. }) if status == reqwest::StatusCode::UNAUTHORIZED
            ));
            assert_eq!(backend.requests().len(), 1);
        }
    }

    mod register {
        use super::*;

        #[tokio::test]
        async fn signs_in_after_registering() -> color_eyre::Result<()> {
            let backend = MockBackend::new(|req| match req.path.as_str() {
                "/api/auth/register" => reply(201, r#"{"id":"user-1"}"#),
                _ => reply(200, r#"{"accessToken":"opaque"}"#),
            });
            let store = Arc::new(InMemoryTokenStore::new());
            let session = session(store.clone(), backend.clone());

            let user = session.register("ana@example.com", "hunter2").await?;

            assert_eq!(user, SessionUser::default());
            let paths: Vec<_> = backend.requests().into_iter().map(|r| r.path).collect();
            assert_eq!(paths, vec!["/api/auth/register", "/api/auth/login"]);
            assert!(store.load().await?.is_some());
            Ok(())
        }
    }

    mod when_signed_in {
        use super::*;

        #[tokio::test]
        async fn logout_clears_the_store() -> color_eyre::Result<()> {
            let backend = MockBackend::new(|_| reply(200, r#"{"accessToken":"opaque"}"#));
            let store = Arc::new(InMemoryTokenStore::new());
            let session = session(store.clone(), backend);
            session.login("ana@example.com", "hunter2").await?;

            assert!(session.current_user().await?.is_some());
            session.logout().await?;

            assert!(session.current_user().await?.is_none());
            assert!(store.load().await?.is_none());
            Ok(())
        }
    }
}
