//! The authenticated JSON client

use std::{fmt, sync::Arc};

use reqwest::{header, Method};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware, Middleware};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tuvino_tokens::{RefreshCoordinator, TokenStore};

use crate::{
    exchange::{RefreshTokenExchange, REFRESH_PATH},
    AccessTokenMiddleware, ApiError, ClientConfig,
};

/// A JSON-over-HTTP client for the TuVino API
///
/// Requests carry the stored access token. When the backend rejects it, the
/// client refreshes the token once, shared with every other request that was
/// rejected at the same time, and replays the request.
///
/// Cloning the client is cheap and shares the token store and refresh
/// coordinator.
#[derive(Clone)]
pub struct ApiClient {
    config: ClientConfig,
    http: ClientWithMiddleware,
    store: Arc<dyn TokenStore>,
    coordinator: RefreshCoordinator,
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("config", &self.config)
            .field("coordinator", &self.coordinator)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    /// Constructs a client with the standard middleware stack
    pub fn new(config: ClientConfig, store: Arc<dyn TokenStore>) -> Result<Self, ApiError> {
        Self::builder(config, store).build()
    }

    /// Starts building a client
    pub fn builder(config: ClientConfig, store: Arc<dyn TokenStore>) -> ApiClientBuilder {
        ApiClientBuilder {
            config,
            store,
            http: None,
            layers: Vec::new(),
        }
    }

    /// Assembles a client from a pre-built middleware stack
    ///
    /// `http` should include an [`AccessTokenMiddleware`] sharing `store` and
    /// `coordinator`, or requests are sent without authorization.
    pub fn from_parts(
        config: ClientConfig,
        http: ClientWithMiddleware,
        store: Arc<dyn TokenStore>,
        coordinator: RefreshCoordinator,
    ) -> Self {
        Self {
            config,
            http,
            store,
            coordinator,
        }
    }

    /// The client's configuration
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The store holding the session's tokens
    pub fn store(&self) -> &Arc<dyn TokenStore> {
        &self.store
    }

    /// The coordinator serializing refreshes for this client
    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    /// Sends a `GET` request
    pub async fn get(&self, path: &str) -> Result<Value, ApiError> {
        let text = self.execute(Method::GET, path, None).await?;
        Ok(decode_payload(&text))
    }

    /// Sends a `POST` request
    ///
    /// A body that serializes to `null`, such as `()` or `None`, is not sent.
    pub async fn post<B>(&self, path: &str, body: &B) -> Result<Value, ApiError>
    where
        B: Serialize + ?Sized,
    {
        let text = self.execute(Method::POST, path, encode_body(body)?).await?;
        Ok(decode_payload(&text))
    }

    /// Sends a `PUT` request
    ///
    /// A body that serializes to `null` is not sent.
    pub async fn put<B>(&self, path: &str, body: &B) -> Result<Value, ApiError>
    where
        B: Serialize + ?Sized,
    {
        let text = self.execute(Method::PUT, path, encode_body(body)?).await?;
        Ok(decode_payload(&text))
    }

    /// Sends a `DELETE` request
    ///
    /// A body that serializes to `null` is not sent.
    pub async fn delete<B>(&self, path: &str, body: &B) -> Result<Value, ApiError>
    where
        B: Serialize + ?Sized,
    {
        let text = self.execute(Method::DELETE, path, encode_body(body)?).await?;
        Ok(decode_payload(&text))
    }

    /// Sends a `GET` request and deserializes the response
    ///
    /// An empty response is deserialized as JSON `null`.
    pub async fn get_json<T>(&self, path: &str) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
    {
        let text = self.execute(Method::GET, path, None).await?;
        decode_typed(&text)
    }

    /// Sends a `POST` request and deserializes the response
    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let text = self.execute(Method::POST, path, encode_body(body)?).await?;
        decode_typed(&text)
    }

    /// Sends a `PUT` request and deserializes the response
    pub async fn put_json<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let text = self.execute(Method::PUT, path, encode_body(body)?).await?;
        decode_typed(&text)
    }

    #[tracing::instrument(level = "debug", skip(self, body), fields(has_body = body.is_some()))]
    async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> Result<String, ApiError> {
        let url = self.config.url_for(path)?;
        let mut request = self
            .http
            .request(method, url)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(body) = body {
            request = request.body(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await.map_err(ApiError::Network)?;

        if !status.is_success() {
            tracing::debug!(%status, "backend returned an error");
            return Err(ApiError::Status { status, body: text });
        }

        tracing::trace!(%status, len = text.len(), "received response");
        Ok(text)
    }
}

fn encode_body<B>(body: &B) -> Result<Option<Vec<u8>>, ApiError>
where
    B: Serialize + ?Sized,
{
    let value = serde_json::to_value(body).map_err(ApiError::Body)?;
    if value.is_null() {
        return Ok(None);
    }

    serde_json::to_vec(&value).map(Some).map_err(ApiError::Body)
}

/// Interprets a successful response body
///
/// An empty body is `null`. A body that is not JSON is returned as a string.
pub fn decode_payload(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }

    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_owned()))
}

fn decode_typed<T: DeserializeOwned>(text: &str) -> Result<T, ApiError> {
    let text = if text.trim().is_empty() { "null" } else { text };
    serde_json::from_str(text).map_err(ApiError::Decode)
}

/// Builds an [`ApiClient`] with the standard middleware stack
///
/// The stack authorizes each request with an [`AccessTokenMiddleware`] and
/// refreshes through a [`RefreshTokenExchange`] posting to the refresh
/// endpoint. Additional layers run after authorization, on both the API
/// requests and the refresh exchange.
pub struct ApiClientBuilder {
    config: ClientConfig,
    store: Arc<dyn TokenStore>,
    http: Option<reqwest::Client>,
    layers: Vec<Arc<dyn Middleware>>,
}

impl fmt::Debug for ApiClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClientBuilder")
            .field("config", &self.config)
            .field("http", &self.http)
            .field("layers", &self.layers.len())
            .finish_non_exhaustive()
    }
}

impl ApiClientBuilder {
    /// Uses a pre-configured `reqwest` client
    ///
    /// The configured timeout and user agent are not applied to it.
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = Some(http);
        self
    }

    /// Appends a middleware layer
    pub fn with_layer<M: Middleware>(self, layer: M) -> Self {
        self.with_arc_layer(Arc::new(layer))
    }

    /// Appends a shared middleware layer
    pub fn with_arc_layer(mut self, layer: Arc<dyn Middleware>) -> Self {
        self.layers.push(layer);
        self
    }

    /// Builds the client
    pub fn build(self) -> Result<ApiClient, ApiError> {
        let http = match self.http {
            Some(http) => http,
            None => self.config.http_client().map_err(ApiError::Network)?,
        };

        let refresh_url = self.config.url_for(REFRESH_PATH)?;
        let exchange_client = self
            .layers
            .iter()
            .fold(ClientBuilder::new(http.clone()), |builder, layer| {
                builder.with_arc(layer.clone())
            })
            .build();
        let coordinator = RefreshCoordinator::new(RefreshTokenExchange::new(
            exchange_client,
            refresh_url,
            self.store.clone(),
        ));

        let api_client = self
            .layers
            .into_iter()
            .fold(
                ClientBuilder::new(http).with(AccessTokenMiddleware::new(
                    self.store.clone(),
                    coordinator.clone(),
                )),
                |builder, layer| builder.with_arc(layer),
            )
            .build();

        Ok(ApiClient::from_parts(
            self.config,
            api_client,
            self.store,
            coordinator,
        ))
    }
}
