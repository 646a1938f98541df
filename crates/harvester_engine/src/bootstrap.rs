use std::sync::Arc;

use harvester_core::BootstrapConfig;
use reqwest::header::{SET_COOKIE, USER_AGENT};
use tokio::sync::OnceCell;
use url::Url;

use crate::transport::FetchSettings;
use crate::{BootstrapError, CredentialBag};

/// Obtains the credentials a session sends with every page request.
/// Runs exactly once, before the first fetch.
#[async_trait::async_trait]
pub trait SessionBootstrap: Send + Sync {
    async fn bootstrap(&self) -> Result<CredentialBag, BootstrapError>;
}

/// Credentials known up front; an empty bag for open sources.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    credentials: CredentialBag,
}

impl StaticCredentials {
    pub fn new(credentials: CredentialBag) -> Self {
        Self { credentials }
    }
}

#[async_trait::async_trait]
impl SessionBootstrap for StaticCredentials {
    async fn bootstrap(&self) -> Result<CredentialBag, BootstrapError> {
        Ok(self.credentials.clone())
    }
}

/// Visits a landing page once and keeps every cookie it sets.
#[derive(Debug, Clone)]
pub struct LandingPageBootstrap {
    url: String,
    user_agent: String,
    settings: FetchSettings,
}

impl LandingPageBootstrap {
    pub fn new(url: impl Into<String>, settings: FetchSettings) -> Self {
        Self {
            url: url.into(),
            user_agent: settings.user_agent.clone(),
            settings,
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

#[async_trait::async_trait]
impl SessionBootstrap for LandingPageBootstrap {
    async fn bootstrap(&self) -> Result<CredentialBag, BootstrapError> {
        let url = Url::parse(&self.url).map_err(|err| BootstrapError::InvalidUrl {
            url: self.url.clone(),
            message: err.to_string(),
        })?;
        let client = reqwest::Client::builder()
            .connect_timeout(self.settings.connect_timeout)
            .timeout(self.settings.request_timeout)
            .build()
            .map_err(|err| BootstrapError::Request(err.to_string()))?;

        let response = client
            .get(url)
            .header(USER_AGENT, self.user_agent.as_str())
            .send()
            .await
            .map_err(|err| BootstrapError::Request(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(BootstrapError::HttpStatus(status.as_u16()));
        }

        let mut credentials = CredentialBag::new();
        for header in response.headers().get_all(SET_COOKIE) {
            if let Some((name, value)) = header.to_str().ok().and_then(parse_set_cookie) {
                credentials.insert(name, value);
            }
        }
        if credentials.is_empty() {
            engine_logging::engine_warn!("Landing page {} set no cookies", self.url);
        }
        Ok(credentials)
    }
}

/// Bootstraps once and hands the same credentials to every session holding
/// a clone, so consecutive harvests share one cookie session. A failed
/// bootstrap is not cached; the next session tries again.
#[derive(Clone)]
pub struct SharedBootstrap {
    inner: Arc<dyn SessionBootstrap>,
    credentials: Arc<OnceCell<CredentialBag>>,
}

impl SharedBootstrap {
    pub fn new(inner: Box<dyn SessionBootstrap>) -> Self {
        Self {
            inner: Arc::from(inner),
            credentials: Arc::new(OnceCell::new()),
        }
    }

    pub fn is_bootstrapped(&self) -> bool {
        self.credentials.initialized()
    }
}

#[async_trait::async_trait]
impl SessionBootstrap for SharedBootstrap {
    async fn bootstrap(&self) -> Result<CredentialBag, BootstrapError> {
        self.credentials
            .get_or_try_init(|| self.inner.bootstrap())
            .await
            .cloned()
    }
}

/// Name and value of a `Set-Cookie` header; attributes are dropped.
fn parse_set_cookie(header: &str) -> Option<(String, String)> {
    let pair = header.split(';').next()?;
    let (name, value) = pair.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), value.trim().trim_matches('"').to_string()))
}

/// Bootstrap strategy named by a source config.
pub fn bootstrap_from_config(
    config: &BootstrapConfig,
    settings: &FetchSettings,
) -> Box<dyn SessionBootstrap> {
    match config {
        BootstrapConfig::None => Box::new(StaticCredentials::default()),
        BootstrapConfig::Static(cookies) => Box::new(StaticCredentials::new(
            CredentialBag::from_map(cookies.clone()),
        )),
        BootstrapConfig::LandingPage { url, user_agent } => {
            let bootstrap = LandingPageBootstrap::new(url.clone(), settings.clone());
            Box::new(match user_agent {
                Some(agent) => bootstrap.with_user_agent(agent.clone()),
                None => bootstrap,
            })
        }
    }
}
