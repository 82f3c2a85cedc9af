use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::DataMallError;

pub const DEFAULT_BASE_URL: &str = "http://datamall2.mytransport.sg/ltaodataservice/";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

// `HeaderName` stores names lowercased; the server matches them case-insensitively.
const ACCOUNT_KEY_HEADER: &str = "accountkey";

/// One API record. Its shape is whatever the endpoint returns.
pub type Record = Map<String, Value>;

/// Anything that can return one page of records for a dataset resource.
pub trait PageSource {
    /// Issue a single request for `sub_path` and return the `value` array of the response.
    fn fetch_page(
        &self,
        sub_path: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<Record>, DataMallError>;

    /// Location of `sub_path` as reported in errors.
    fn resource_url(&self, sub_path: &str) -> String {
        sub_path.to_string()
    }
}

impl<T: PageSource + ?Sized> PageSource for &T {
    fn fetch_page(
        &self,
        sub_path: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<Record>, DataMallError> {
        (**self).fetch_page(sub_path, query)
    }

    fn resource_url(&self, sub_path: &str) -> String {
        (**self).resource_url(sub_path)
    }
}

/// Everything needed to talk to the API.
#[derive(Clone)]
pub struct ClientSettings {
    pub base_url: String,
    pub account_key: String,
    pub timeout: Duration,
}

impl std::fmt::Debug for ClientSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSettings")
            .field("base_url", &self.base_url)
            .field("account_key", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Blocking HTTP client with the authentication headers baked in.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(settings: &ClientSettings) -> Result<Self, DataMallError> {
        let mut key = HeaderValue::from_str(settings.account_key.trim()).map_err(|_| {
            DataMallError::Config("account key contains characters not allowed in a header".into())
        })?;
        key.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(HeaderName::from_static(ACCOUNT_KEY_HEADER), key);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http = Client::builder()
            .user_agent(concat!("datamall/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .timeout(settings.timeout)
            .build()
            .map_err(|err| DataMallError::Config(format!("failed to build HTTP client: {err}")))?;

        Ok(Self {
            http,
            base_url: normalize_base_url(&settings.base_url),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Full request URL for a dataset resource.
    pub fn endpoint_url(&self, sub_path: &str) -> String {
        format!("{}{}", self.base_url, sub_path.trim_start_matches('/'))
    }
}

impl PageSource for ApiClient {
    fn fetch_page(
        &self,
        sub_path: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<Record>, DataMallError> {
        let url = self.endpoint_url(sub_path);
        debug!(url = %url, ?query, "GET");

        let response = self
            .http
            .get(&url)
            .query(query)
            .send()
            .map_err(|err| DataMallError::from_transport(&url, err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DataMallError::HttpStatus { url, status });
        }

        let body = response
            .text()
            .map_err(|err| DataMallError::from_transport(&url, err))?;
        parse_page(&url, &body)
    }

    fn resource_url(&self, sub_path: &str) -> String {
        self.endpoint_url(sub_path)
    }
}

#[derive(Debug, Deserialize)]
struct PageEnvelope {
    value: Vec<Record>,
}

/// Extract the `value` array from a response body.
pub fn parse_page(url: &str, body: &str) -> Result<Vec<Record>, DataMallError> {
    serde_json::from_str::<PageEnvelope>(body)
        .map(|envelope| envelope.value)
        .map_err(|err| DataMallError::malformed(url, err.to_string()))
}

fn normalize_base_url(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    }
}
