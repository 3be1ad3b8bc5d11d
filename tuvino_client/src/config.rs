//! Client configuration

use std::{env, time::Duration};

use thiserror::Error;

/// The environment variable naming the backend's root URL
pub const BACKEND_URL_VAR: &str = "TUVINO_BACKEND_URL";

/// The backend URL captured when this crate was built, if any
const BUILD_BACKEND_URL: Option<&str> = option_env!("TUVINO_BACKEND_URL");

/// An error building a client configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Neither the runtime environment nor the build provided a backend URL
    #[error("no backend URL configured; set TUVINO_BACKEND_URL")]
    MissingBackendUrl,
    /// The configured backend URL is not a valid absolute URL
    #[error("invalid backend URL {url:?}")]
    InvalidBackendUrl {
        /// The rejected value
        url: String,
        /// The parse failure
        source: url::ParseError,
    },
}

/// Configuration for an [`ApiClient`](crate::ApiClient)
#[derive(Clone, Debug)]
pub struct ClientConfig {
    base_url: String,
    timeout: Option<Duration>,
    user_agent: String,
}

impl ClientConfig {
    /// Constructs a configuration for an API rooted at `base_url`
    ///
    /// Request paths are appended to `base_url` verbatim, so
    /// `https://api.example.com/api` plus `/wines/42` addresses
    /// `https://api.example.com/api/wines/42`.
    pub fn new(base_url: impl Into<String>) -> Result<Self, ConfigError> {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }

        url::Url::parse(&base_url).map_err(|source| ConfigError::InvalidBackendUrl {
            url: base_url.clone(),
            source,
        })?;

        Ok(Self {
            base_url,
            timeout: None,
            user_agent: concat!("tuvino_client/", env!("CARGO_PKG_VERSION")).to_owned(),
        })
    }

    /// Constructs a configuration for the API of a backend rooted at `backend_url`
    ///
    /// The API lives under `/api` on the backend.
    pub fn for_backend(backend_url: &str) -> Result<Self, ConfigError> {
        Self::new(format!("{}/api", backend_url.trim_end_matches('/')))
    }

    /// Reads the backend URL from the environment
    ///
    /// The runtime value of `TUVINO_BACKEND_URL` wins over the value captured
    /// at build time.
    pub fn from_env() -> Result<Self, ConfigError> {
        let backend_url = env::var(BACKEND_URL_VAR)
            .ok()
            .filter(|v| !v.is_empty())
            .or_else(|| BUILD_BACKEND_URL.map(ToOwned::to_owned))
            .ok_or(ConfigError::MissingBackendUrl)?;

        Self::for_backend(&backend_url)
    }

    /// Sets a deadline for each HTTP request
    ///
    /// By default, requests run until they complete or fail.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Overrides the `User-Agent` sent with each request
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// The URL request paths are appended to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The per-request deadline, if any
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// The `User-Agent` sent with each request
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// The absolute URL for a request path
    pub fn url_for(&self, path: &str) -> Result<reqwest::Url, url::ParseError> {
        reqwest::Url::parse(&format!("{}{}", self.base_url, path))
    }

    pub(crate) fn http_client(&self) -> reqwest::Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder().user_agent(&self.user_agent);
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        builder.build()
    }
}
