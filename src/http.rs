//! HTTP client for the scrobble service.
//!
//! This module provides a wrapper around `reqwest::Client` that adds:
//! * Consistent timeouts and headers
//! * Bearer authentication when a token is configured
//!
//! It performs no retries: wrap it in [`Retrying`](crate::retry::Retrying)
//! for that.
//!
//! # Example
//!
//! ```rust
//! use scrobbler::{config::Config, http::Client, retry::Transport};
//! use url::Url;
//!
//! # async fn example() -> scrobbler::error::Result<()> {
//! let endpoint = Url::parse("https://music.example.com/api/scrobble")?;
//! let config = Config::new("living room", endpoint.clone());
//! let client = Client::new(&config)?;
//!
//! let request = Client::post(endpoint, br#"{"scrobbleTypeValue":1}"#.to_vec());
//! let response = client.execute(request).await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    Body, Method, Url,
};

use crate::{config::Config, error::Result, retry::Transport};

/// HTTP client with consistent timeouts and default headers.
#[derive(Clone, Debug)]
pub struct Client {
    inner: reqwest::Client,
}

impl Client {
    /// Duration to keep idle connections alive.
    ///
    /// Prevents frequent reconnection overhead for subsequent requests.
    const KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(60);

    /// The `Content-Type` and `Accept` of scrobble requests.
    const JSON_CONTENT: &str = "application/json";

    /// Creates a new client.
    ///
    /// Connect, read and overall request timeouts are taken from `config`.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// * the token cannot be put into a header
    /// * HTTP client creation fails
    pub fn new(config: &Config) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(Self::JSON_CONTENT));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(Self::JSON_CONTENT));

        if let Some(ref token) = config.token {
            let mut bearer = HeaderValue::from_str(&format!("Bearer {token}"))?;
            bearer.set_sensitive(true);
            headers.insert(AUTHORIZATION, bearer);
        }

        let inner = reqwest::Client::builder()
            .tcp_keepalive(Self::KEEPALIVE_TIMEOUT)
            .connect_timeout(config.connect_timeout)
            .read_timeout(config.read_timeout)
            .timeout(config.timeout)
            .default_headers(headers)
            .user_agent(&config.user_agent)
            .build()?;

        Ok(Self { inner })
    }

    /// Builds a POST request with a JSON body.
    ///
    /// The `Content-Type` is set on the request itself, so that it is also
    /// present when sent over a transport other than this client.
    pub fn post<U, T>(url: U, body: T) -> reqwest::Request
    where
        U: Into<Url>,
        T: Into<Body>,
    {
        let mut request = reqwest::Request::new(Method::POST, url.into());
        request
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static(Self::JSON_CONTENT));
        *request.body_mut() = Some(body.into());

        request
    }
}

#[async_trait]
impl Transport for Client {
    async fn execute(&self, request: reqwest::Request) -> Result<reqwest::Response> {
        trace!("{} {}", request.method(), request.url());
        self.inner.execute(request).await.map_err(Into::into)
    }
}
