use std::collections::BTreeMap;
use std::fmt::{Debug, Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::credentials::CredentialsProvider;
use crate::feed_source::{FeedKey, FeedSource, RawPayload};
use crate::{FeedError, ProviderId, ValidationError};

const ERROR_BODY_PREVIEW: usize = 200;

/// Authentication strategy applied to outgoing HTTP requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpAuth {
    None,
    BearerToken(String),
    Header { name: String, value: String },
}

impl HttpAuth {
    pub fn apply(&self, headers: &mut BTreeMap<String, String>) {
        match self {
            Self::None => {}
            Self::BearerToken(token) => {
                headers.insert(String::from("authorization"), format!("Bearer {token}"));
            }
            Self::Header { name, value } => {
                headers.insert(name.to_ascii_lowercase(), value.clone());
            }
        }
    }
}

/// GET request envelope used by upstream transports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub timeout_ms: u64,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: BTreeMap::new(),
            timeout_ms: 12_000,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_auth(mut self, auth: &HttpAuth) -> Self {
        auth.apply(&mut self.headers);
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn ok_json(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// Transport-level HTTP error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpError {
    message: String,
}

impl HttpError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for HttpError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for HttpError {}

/// Transport contract for upstream calls.
pub trait HttpClient: Send + Sync {
    fn execute<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>>;
}

/// Production HTTP client using reqwest.
#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    client: Arc<reqwest::Client>,
}

impl ReqwestHttpClient {
    pub fn new() -> Self {
        Self {
            client: Arc::new(
                reqwest::Client::builder()
                    .user_agent(concat!("feedgate/", env!("CARGO_PKG_VERSION")))
                    .build()
                    .unwrap_or_else(|_| reqwest::Client::new()),
            ),
        }
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client: Arc::new(client),
        }
    }
}

impl Default for ReqwestHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient for ReqwestHttpClient {
    fn execute<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
        Box::pin(async move {
            let mut builder = self
                .client
                .get(&request.url)
                .timeout(std::time::Duration::from_millis(request.timeout_ms));

            for (name, value) in &request.headers {
                builder = builder.header(name, value);
            }

            let response = builder.send().await.map_err(|e| {
                if e.is_timeout() {
                    HttpError::new(format!("request timeout: {e}"))
                } else if e.is_connect() {
                    HttpError::new(format!("connection failed: {e}"))
                } else {
                    HttpError::new(format!("request failed: {e}"))
                }
            })?;

            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .map_err(|e| HttpError::new(format!("failed to read response body: {e}")))?;

            Ok(HttpResponse { status, body })
        })
    }
}

/// Where the API key goes on the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyPlacement {
    /// Substituted into the `{apikey}` placeholder of the URL template.
    Url,
    Bearer,
    Header(String),
}

/// Wiring for a generic JSON-over-HTTP feed source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpSourceConfig {
    pub provider: ProviderId,
    /// URL with optional `{symbols}` and `{apikey}` placeholders.
    pub url_template: String,
    /// JSON pointer to the quotes array (e.g. `/data/quotes`); `None` uses the body.
    pub quotes_pointer: Option<String>,
    pub key_placement: KeyPlacement,
    pub timeout_ms: u64,
}

impl HttpSourceConfig {
    pub fn new(provider: ProviderId, url_template: impl Into<String>) -> Self {
        Self {
            provider,
            url_template: url_template.into(),
            quotes_pointer: None,
            key_placement: KeyPlacement::Url,
            timeout_ms: 12_000,
        }
    }

    pub fn with_quotes_pointer(mut self, pointer: impl Into<String>) -> Self {
        self.quotes_pointer = Some(pointer.into());
        self
    }

    pub fn with_key_placement(mut self, placement: KeyPlacement) -> Self {
        self.key_placement = placement;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    fn needs_key(&self) -> bool {
        match self.key_placement {
            KeyPlacement::Url => self.url_template.contains("{apikey}"),
            KeyPlacement::Bearer | KeyPlacement::Header(_) => true,
        }
    }
}

/// [`FeedSource`] that fetches a URL template and extracts a quotes array.
pub struct HttpFeedSource {
    config: HttpSourceConfig,
    http_client: Arc<dyn HttpClient>,
    credentials: Arc<dyn CredentialsProvider>,
}

impl HttpFeedSource {
    pub fn new(
        config: HttpSourceConfig,
        http_client: Arc<dyn HttpClient>,
        credentials: Arc<dyn CredentialsProvider>,
    ) -> Self {
        Self {
            config,
            http_client,
            credentials,
        }
    }

    pub fn config(&self) -> &HttpSourceConfig {
        &self.config
    }

    fn build_request(&self, key: &FeedKey) -> Result<HttpRequest, FeedError> {
        let api_key = if self.config.needs_key() {
            let api_key = self.credentials.api_key(&self.config.provider).ok_or_else(|| {
                FeedError::Validation {
                    provider: self.config.provider.to_string(),
                    source: ValidationError::InvalidConfig {
                        key: format!("FEEDGATE_{}_API_KEY", self.config.provider.env_token()),
                        message: String::from("api key is not set"),
                    },
                }
            })?;
            Some(api_key)
        } else {
            None
        };

        let symbols = urlencoding::encode(&key.symbols.join(",")).into_owned();
        let mut url = self.config.url_template.replace("{symbols}", &symbols);

        let mut auth = HttpAuth::None;
        if let Some(api_key) = api_key {
            match &self.config.key_placement {
                KeyPlacement::Url => {
                    url = url.replace("{apikey}", &urlencoding::encode(&api_key));
                }
                KeyPlacement::Bearer => auth = HttpAuth::BearerToken(api_key),
                KeyPlacement::Header(name) => {
                    auth = HttpAuth::Header {
                        name: name.clone(),
                        value: api_key,
                    }
                }
            }
        }

        Ok(HttpRequest::get(url)
            .with_header("accept", "application/json")
            .with_auth(&auth)
            .with_timeout_ms(self.config.timeout_ms))
    }

    fn extract_quotes(&self, body: &str) -> Result<RawPayload, FeedError> {
        let invalid = |message: String| FeedError::Validation {
            provider: self.config.provider.to_string(),
            source: ValidationError::MalformedPayload { message },
        };

        let value: Value = serde_json::from_str(body)
            .map_err(|error| invalid(format!("response is not valid json: {error}")))?;

        match &self.config.quotes_pointer {
            None => Ok(RawPayload::new(value)),
            Some(pointer) => value
                .pointer(pointer)
                .cloned()
                .map(RawPayload::new)
                .ok_or_else(|| invalid(format!("response has no value at '{pointer}'"))),
        }
    }
}

impl Debug for HttpFeedSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpFeedSource")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl FeedSource for HttpFeedSource {
    fn provider(&self) -> &ProviderId {
        &self.config.provider
    }

    fn fetch<'a>(
        &'a self,
        key: &'a FeedKey,
    ) -> Pin<Box<dyn Future<Output = Result<RawPayload, FeedError>> + Send + 'a>> {
        Box::pin(async move {
            let request = self.build_request(key)?;
            debug!(provider = %self.config.provider, key = %key, "requesting upstream");

            let response = self.http_client.execute(request).await.map_err(|error| {
                FeedError::http(self.config.provider.as_str(), None, error.message())
            })?;

            if !response.is_success() {
                let preview: String = response.body.chars().take(ERROR_BODY_PREVIEW).collect();
                return Err(FeedError::http(
                    self.config.provider.as_str(),
                    Some(response.status),
                    preview,
                ));
            }

            self.extract_quotes(&response.body)
        })
    }
}
