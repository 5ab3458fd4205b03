//! HTTP plumbing shared by the portfolio and task API clients.

pub mod paginate;
pub mod portfolio;
pub mod tasks;

use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use url::Url;

use crate::config::ApiCredentials;
use crate::error::Result;

/// Status and body of a completed GET request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: u16,
    pub body: String,
}

impl Reply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Issues authenticated GET requests against one API.
pub trait Transport {
    /// Base URL that relative links are resolved against.
    fn base_url(&self) -> &str;

    /// Performs a GET on an absolute URL. Only transport failures are errors;
    /// HTTP failure statuses come back as a [`Reply`].
    fn get(&self, url: &str) -> Result<Reply>;
}

/// Bearer-authenticated blocking client for a JSON REST API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    credentials: ApiCredentials,
}

impl ApiClient {
    pub fn new(credentials: ApiCredentials) -> Self {
        Self {
            http: Client::new(),
            credentials,
        }
    }
}

impl Transport for ApiClient {
    fn base_url(&self) -> &str {
        &self.credentials.base_url
    }

    fn get(&self, url: &str) -> Result<Reply> {
        let response = self
            .http
            .get(url)
            .header(AUTHORIZATION, format!("Bearer {}", self.credentials.token))
            .header(ACCEPT, "application/json")
            .send()?;
        let status = response.status().as_u16();
        let body = response.text()?;
        Ok(Reply { status, body })
    }
}

/// Joins `path` onto `base` and appends the given query parameters.
pub fn endpoint_url(base: &str, path: &str, params: &[(&str, &str)]) -> Result<String> {
    let mut url = Url::parse(&join(base, path))?;
    if !params.is_empty() {
        url.query_pairs_mut().extend_pairs(params.iter().copied());
    }
    Ok(url.into())
}

/// Resolves a next-page link: absolute links pass through, relative ones are
/// appended to the API base.
pub fn resolve_link(base: &str, link: &str) -> String {
    if link.starts_with("http://") || link.starts_with("https://") {
        link.to_string()
    } else {
        join(base, link)
    }
}

fn join(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
