use std::future::Future;
use std::time::Duration;

use reqwest::header::LOCATION;
use reqwest::redirect::Policy;
use tracing::debug;
use url::Url;

use crate::error::ResolveError;
use crate::settings::Settings;

const FOUND: u16 = 302;

/// What the resolver needs to know about one HEAD response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadResponse {
    pub status: u16,
    pub location: Option<String>,
    pub headers: Vec<(String, String)>,
}

/// Issues a single HEAD request without following redirects.
pub trait HeadClient {
    fn head(&self, url: &Url) -> impl Future<Output = Result<HeadResponse, ResolveError>> + Send;
}

/// `HeadClient` over a reqwest client with redirects disabled and a request timeout.
pub struct HttpHead {
    client: reqwest::Client,
}

impl HttpHead {
    pub fn new(settings: &Settings) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(Policy::none())
            .timeout(Duration::from_secs(settings.timeout_secs))
            .user_agent(settings.user_agent.as_str())
            .build()?;
        Ok(Self { client })
    }
}

impl HeadClient for HttpHead {
    async fn head(&self, url: &Url) -> Result<HeadResponse, ResolveError> {
        let response = self
            .client
            .head(url.clone())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ResolveError::Timeout {
                        url: url.to_string(),
                    }
                } else {
                    ResolveError::Transport {
                        url: url.to_string(),
                        source: Box::new(e),
                    }
                }
            })?;

        let headers = response
            .headers()
            .iter()
            .map(|(k, v)| {
                (
                    k.as_str().to_string(),
                    String::from_utf8_lossy(v.as_bytes()).into_owned(),
                )
            })
            .collect();
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        Ok(HeadResponse {
            status: response.status().as_u16(),
            location,
            headers,
        })
    }
}

/// Unwraps tracking URLs by walking 302 redirects until the terminal host.
pub struct UrlResolver<C> {
    client: C,
    terminal_host: String,
    target_param: String,
    max_hops: usize,
}

impl<C: HeadClient> UrlResolver<C> {
    pub fn new(client: C, settings: &Settings) -> Self {
        Self {
            client,
            terminal_host: settings.terminal_host.clone(),
            target_param: settings.target_param.clone(),
            max_hops: settings.max_hops,
        }
    }

    pub async fn resolve(&self, tracking_url: &str) -> Result<String, ResolveError> {
        let mut current = Url::parse(tracking_url).map_err(|source| ResolveError::InvalidUrl {
            url: tracking_url.to_string(),
            source,
        })?;
        let mut hops = 0;

        while current.host_str() != Some(self.terminal_host.as_str()) {
            if hops >= self.max_hops {
                return Err(ResolveError::TooManyRedirects {
                    hops,
                    url: current.to_string(),
                });
            }
            let response = self.client.head(&current).await?;
            hops += 1;

            if response.status != FOUND {
                debug!(url = %current, status = response.status, headers = ?response.headers, "unexpected redirect response");
                return Err(ResolveError::UnexpectedStatus {
                    url: current.to_string(),
                    status: response.status,
                    headers: response.headers,
                });
            }
            let location = response.location.ok_or_else(|| ResolveError::MissingLocation {
                url: current.to_string(),
            })?;
            current = current
                .join(&location)
                .map_err(|source| ResolveError::InvalidUrl {
                    url: location.clone(),
                    source,
                })?;
            debug!(hop = hops, url = %current, "followed redirect");
        }

        current
            .query_pairs()
            .find(|(k, _)| k == self.target_param.as_str())
            .map(|(_, v)| v.into_owned())
            .ok_or_else(|| ResolveError::MissingTarget {
                url: current.to_string(),
                param: self.target_param.clone(),
            })
    }
}
