//! Middleware that authorizes outgoing requests and recovers from token expiry
//!
//! Include the [`AccessTokenMiddleware`] in a
//! [`ClientWithMiddleware`](reqwest_middleware::ClientWithMiddleware) stack to
//! attach the stored access token to each outbound request. When the backend
//! rejects a request with `401 Unauthorized`, the middleware asks the shared
//! [`RefreshCoordinator`] for a new access token and replays the request with
//! it exactly once.
//!
//! If a request already has an `Authorization` header by the time the
//! middleware executes, the existing value is left in place and the request is
//! never replayed.
//!
//! Requests to the auth endpoints themselves never carry the access token; see
//! [`RequiresAuthorization`].

use std::{error, fmt};

use bytes::{BufMut, BytesMut};
use predicates::{reflection, Predicate};
use reqwest::{header, Request, Response, StatusCode};
use reqwest_middleware::{Error, Middleware, Next, Result};
use tuvino_tokens::{
    refresh::Generation, AccessToken, AccessTokenRef, RefreshCoordinator, TokenStore,
};

use crate::SessionExpired;

/// The paths that handle authentication, relative to the API root
pub const AUTH_ENDPOINTS: [&str; 3] = ["/auth/login", "/auth/register", "/auth/refresh"];

/// A middleware that injects an access token into outgoing requests
#[derive(Clone, Debug)]
pub struct AccessTokenMiddleware<S, P = RequiresAuthorization> {
    store: S,
    coordinator: RefreshCoordinator,
    predicate: P,
}

impl<S> AccessTokenMiddleware<S, RequiresAuthorization> {
    /// Constructs a new middleware from a token store and refresh coordinator
    ///
    /// By default, this middleware authorizes every request except those to
    /// the [auth endpoints](AUTH_ENDPOINTS). To change this behavior, provide
    /// a custom predicate with [`with_predicate()`][Self::with_predicate()].
    pub fn new(store: S, coordinator: RefreshCoordinator) -> Self {
        Self {
            store,
            coordinator,
            predicate: RequiresAuthorization::default(),
        }
    }

    /// Replaces the default predicate with a custom predicate
    pub fn with_predicate<P>(self, predicate: P) -> AccessTokenMiddleware<S, P> {
        AccessTokenMiddleware {
            store: self.store,
            coordinator: self.coordinator,
            predicate,
        }
    }
}

impl<S: TokenStore, P> AccessTokenMiddleware<S, P> {
    async fn current_token(&self) -> Option<AccessToken> {
        match self.store.access_token().await {
            Ok(token) => token,
            Err(error) => {
                tracing::warn!(
                    error = (&error as &dyn error::Error),
                    "unable to read access token, sending request without it"
                );
                None
            }
        }
    }
}

fn bearer(token: &AccessTokenRef) -> Result<header::HeaderValue> {
    let mut header_value = BytesMut::with_capacity(token.as_str().len() + 7);
    header_value.put_slice(b"Bearer ");
    header_value.put_slice(token.as_str().as_bytes());
    let mut value =
        header::HeaderValue::from_maybe_shared(header_value.freeze()).map_err(Error::middleware)?;
    value.set_sensitive(true);
    Ok(value)
}

/// Where an authorized request is in its lifecycle
///
/// Every path through these stages sends the request at most twice.
enum Stage {
    /// Sending the request with the token stored when it was issued
    Attempt {
        request: Request,
        token: AccessToken,
        generation: Generation,
    },
    /// The token was rejected; waiting on the shared refresh
    Refreshing {
        replay: Request,
        generation: Generation,
    },
    /// Replaying the request with the refreshed token
    Retry { request: Request, token: AccessToken },
}

#[async_trait::async_trait]
impl<S, P> Middleware for AccessTokenMiddleware<S, P>
where
    S: TokenStore + 'static,
    P: Predicate<Request> + Send + Sync + 'static,
{
    async fn handle(
        &self,
        req: Request,
        extensions: &mut http::Extensions,
        next: Next<'_>,
    ) -> Result<Response> {
        if !self.predicate.eval(&req) || req.headers().contains_key(header::AUTHORIZATION) {
            return next.run(req, extensions).await;
        }

        let generation = self.coordinator.generation();
        let Some(token) = self.current_token().await else {
            tracing::trace!("no access token stored, sending request without it");
            return next.run(req, extensions).await;
        };

        let mut stage = Stage::Attempt {
            request: req,
            token,
            generation,
        };

        loop {
            stage = match stage {
                Stage::Attempt {
                    mut request,
                    token,
                    generation,
                } => {
                    let replay = request.try_clone();
                    request
                        .headers_mut()
                        .insert(header::AUTHORIZATION, bearer(&token)?);

                    let response = next.clone().run(request, extensions).await?;
                    if response.status() != StatusCode::UNAUTHORIZED {
                        return Ok(response);
                    }

                    tracing::debug!(token = %token, "access token rejected");
                    match replay {
                        Some(replay) => Stage::Refreshing { replay, generation },
                        None => {
                            tracing::warn!("request body cannot be replayed, not refreshing");
                            return Ok(response);
                        }
                    }
                }
                Stage::Refreshing { replay, generation } => {
                    let outcome = self.coordinator.refresh(generation).await;
                    if !outcome.is_refreshed() {
                        tracing::info!(?outcome, "unable to refresh access token");
                        return Err(Error::middleware(SessionExpired));
                    }

                    match self.current_token().await {
                        Some(token) => Stage::Retry {
                            request: replay,
                            token,
                        },
                        None => return Err(Error::middleware(SessionExpired)),
                    }
                }
                Stage::Retry { mut request, token } => {
                    request
                        .headers_mut()
                        .insert(header::AUTHORIZATION, bearer(&token)?);
                    tracing::debug!("replaying request with refreshed access token");
                    return next.clone().run(request, extensions).await;
                }
            };
        }
    }
}

/// Attach an access token unless the request targets an auth endpoint
///
/// Auth endpoints are matched by path suffix, so the predicate works for an
/// API mounted under any prefix.
#[derive(Clone, Debug)]
pub struct RequiresAuthorization {
    exempt: Vec<String>,
}

impl Default for RequiresAuthorization {
    fn default() -> Self {
        Self::exempting(AUTH_ENDPOINTS)
    }
}

impl RequiresAuthorization {
    /// Constructs a predicate that exempts the given paths
    pub fn exempting<I>(paths: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        Self {
            exempt: paths.into_iter().map(Into::into).collect(),
        }
    }

    fn exempted_by<'a>(&'a self, path: &str) -> Option<&'a str> {
        let path = path.trim_end_matches('/');
        self.exempt
            .iter()
            .map(String::as_str)
            .find(|exempt| path.ends_with(exempt))
    }
}

impl Predicate<Request> for RequiresAuthorization {
    #[inline]
    fn eval(&self, req: &Request) -> bool {
        self.exempted_by(req.url().path()).is_none()
    }

    fn find_case(&self, expected: bool, req: &Request) -> Option<reflection::Case> {
        let result = self.eval(req);
        if result != expected {
            Some(
                reflection::Case::new(Some(self), result).add_product(reflection::Product::new(
                    "path",
                    req.url().path().to_owned(),
                )),
            )
        } else {
            None
        }
    }
}

impl reflection::PredicateReflection for RequiresAuthorization {}
impl fmt::Display for RequiresAuthorization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("path not in [")?;
        f.write_str(&self.exempt.join(", "))?;
        f.write_str("]")
    }
}
