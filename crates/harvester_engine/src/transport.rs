use std::time::Duration;

use futures_util::StreamExt;
use harvester_core::{
    Cursor, FailureKind, FetchError, PageFormat, Position, RawPage, SourceConfig,
};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, COOKIE, USER_AGENT};
use reqwest::StatusCode;
use url::Url;

use crate::decode::decode_body;
use crate::html::{parse_cards, validate_catalog};
use crate::CredentialBag;

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub redirect_limit: usize,
    pub max_bytes: u64,
    pub user_agent: String,
    pub allowed_content_types: Vec<String>,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(60),
            redirect_limit: 5,
            max_bytes: 16 * 1024 * 1024,
            user_agent: concat!("listing-harvester/", env!("CARGO_PKG_VERSION")).to_string(),
            allowed_content_types: vec![
                "application/json".to_string(),
                "text/json".to_string(),
                "text/plain".to_string(),
                "text/html".to_string(),
                "application/xhtml+xml".to_string(),
            ],
        }
    }
}

/// Construction-time problems of a transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("invalid header {name:?}: {message}")]
    InvalidHeader { name: String, message: String },
    #[error("invalid selector {selector:?}: {message}")]
    InvalidSelector { selector: String, message: String },
    #[error("failed to build http client: {0}")]
    Client(String),
}

/// Loads one page of a source. The session owns the transport and lends it
/// the credential bag for every call.
#[async_trait::async_trait]
pub trait PageTransport: Send + Sync {
    async fn fetch(&self, cursor: &Cursor, credentials: &CredentialBag)
        -> Result<RawPage, FetchError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    endpoint: String,
    query: Vec<(String, String)>,
    request_body: Option<String>,
    vars: Vec<(String, String)>,
    headers: HeaderMap,
    format: PageFormat,
    settings: FetchSettings,
}

impl ReqwestTransport {
    pub fn new(config: &SourceConfig, settings: FetchSettings) -> Result<Self, TransportError> {
        if let PageFormat::Html(catalog) = &config.format {
            validate_catalog(catalog)?;
        }
        let mut headers = HeaderMap::new();
        for (name, value) in &config.headers {
            let invalid = |message: String| TransportError::InvalidHeader {
                name: name.clone(),
                message,
            };
            let header = HeaderName::from_bytes(name.as_bytes()).map_err(|e| invalid(e.to_string()))?;
            let value = HeaderValue::from_str(value).map_err(|e| invalid(e.to_string()))?;
            headers.insert(header, value);
        }

        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .redirect(reqwest::redirect::Policy::limited(settings.redirect_limit))
            .build()
            .map_err(|err| TransportError::Client(err.to_string()))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            query: config
                .query
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            request_body: config.request_body.clone(),
            vars: config
                .vars
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            headers,
            format: config.format.clone(),
            settings,
        })
    }

    /// Fills the cursor and the source vars into the endpoint template and
    /// the query values.
    pub fn page_url(&self, cursor: &Cursor) -> Result<Url, FetchError> {
        let mut url = Url::parse(&self.fill(&self.endpoint, cursor))
            .map_err(|err| FetchError::new(FailureKind::InvalidUrl, err.to_string()))?;
        if !self.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &self.query {
                pairs.append_pair(key, &self.fill(value, cursor));
            }
        }
        Ok(url)
    }

    /// Body of the POST request for `cursor`, when the source posts.
    pub fn request_body(&self, cursor: &Cursor) -> Option<String> {
        self.request_body
            .as_deref()
            .map(|template| self.fill(template, cursor))
    }

    fn fill(&self, template: &str, cursor: &Cursor) -> String {
        let placeholders = cursor.placeholders();
        let positions = placeholders
            .iter()
            .map(|(name, value)| (*name, value.as_str()));
        let vars = self
            .vars
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()));
        fill_template(template, positions.chain(vars))
    }

    fn is_content_type_allowed(&self, content_type: &str) -> bool {
        let ct = content_type.split(';').next().unwrap_or(content_type).trim();
        self.settings
            .allowed_content_types
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(ct))
    }

    async fn read_body(&self, response: reqwest::Response) -> Result<Vec<u8>, FetchError> {
        let max_bytes = self.settings.max_bytes;
        let too_large = |actual: u64| {
            FetchError::new(
                FailureKind::TooLarge {
                    max_bytes,
                    actual: Some(actual),
                },
                "response too large",
            )
        };
        if let Some(content_len) = response.content_length() {
            if content_len > max_bytes {
                return Err(too_large(content_len));
            }
        }

        let mut bytes = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(map_reqwest_error)?;
            let next_len = bytes.len() as u64 + chunk.len() as u64;
            if next_len > max_bytes {
                return Err(too_large(next_len));
            }
            bytes.extend_from_slice(&chunk);
        }
        Ok(bytes)
    }
}

#[async_trait::async_trait]
impl PageTransport for ReqwestTransport {
    async fn fetch(
        &self,
        cursor: &Cursor,
        credentials: &CredentialBag,
    ) -> Result<RawPage, FetchError> {
        let url = self.page_url(cursor)?;
        let request = match self.request_body(cursor) {
            Some(body) => self
                .client
                .post(url)
                .header(CONTENT_TYPE, "application/json")
                .body(body),
            None => self.client.get(url),
        };
        let mut request = request
            .header(USER_AGENT, self.settings.user_agent.as_str())
            .headers(self.headers.clone());
        if let Some(cookie) = credentials.cookie_header() {
            request = request.header(COOKIE, cookie);
        }

        let response = request.send().await.map_err(map_reqwest_error)?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(FetchError::new(FailureKind::SessionExpired, status.to_string()));
        }
        if !status.is_success() {
            return Err(FetchError::new(
                FailureKind::HttpStatus(status.as_u16()),
                status.to_string(),
            ));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        if let Some(ct) = content_type.as_deref() {
            if !self.is_content_type_allowed(ct) {
                return Err(FetchError::new(
                    FailureKind::UnsupportedContentType {
                        content_type: ct.to_string(),
                    },
                    "unsupported content type",
                ));
            }
        }

        let bytes = self.read_body(response).await?;
        let decoded = decode_body(&bytes, content_type.as_deref())
            .map_err(|err| FetchError::new(FailureKind::Malformed, err.to_string()))?;

        match &self.format {
            PageFormat::Json => serde_json::from_str(&decoded.text)
                .map(RawPage::new)
                .map_err(|err| FetchError::new(FailureKind::Malformed, err.to_string())),
            PageFormat::Html(catalog) => {
                let current = match cursor.position() {
                    Position::Page(n) => *n,
                    _ => cursor.page(),
                };
                parse_cards(&decoded.text, catalog, current)
                    .map_err(|err| FetchError::new(FailureKind::Malformed, err.to_string()))
            }
        }
    }
}

/// Replaces each `{name}` with its value. Cursor placeholders (`{page}`,
/// `{offset}`, `{limit}`, `{token}`) come first, so vars cannot shadow them.
fn fill_template<'a>(template: &str, values: impl Iterator<Item = (&'a str, &'a str)>) -> String {
    values.fold(template.to_string(), |acc, (name, value)| {
        acc.replace(&format!("{{{name}}}"), value)
    })
}

pub(crate) fn map_reqwest_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        return FetchError::new(FailureKind::Timeout, err.to_string());
    }
    if err.is_redirect() {
        return FetchError::new(FailureKind::RedirectLimitExceeded, err.to_string());
    }
    if err.is_builder() {
        return FetchError::new(FailureKind::InvalidUrl, err.to_string());
    }
    FetchError::new(FailureKind::Network, err.to_string())
}
