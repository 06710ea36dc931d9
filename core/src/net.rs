use std::collections::HashMap;
use std::time::Duration;

use bytes::Bytes;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_LENGTH};
use thiserror::Error;

pub const DEFAULT_USER_AGENT: &str = concat!("m3u8get/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Transport-level failures. `Offline` means the transfer died before any
/// HTTP status line was seen (DNS, connect, timeout); everything else is
/// `Transport`. Callers decide which caller-facing error each becomes.
#[derive(Error, Debug, Clone)]
pub enum NetError {
    #[error("offline: {0}")]
    Offline(String),
    #[error("{0}")]
    Transport(String),
}

pub type NetResult<T> = Result<T, NetError>;

#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,
    pub headers: HashMap<String, String>,
    pub user_agent: String,
}

impl FetchRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: HashMap::new(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// Result of a HEAD-equivalent probe.
#[derive(Debug, Clone)]
pub struct HeadInfo {
    pub status_code: u16,
    pub content_length: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status_code: u16,
    pub body: Bytes,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

pub trait NetClient: Send + Sync {
    fn head(&self, req: &FetchRequest) -> NetResult<HeadInfo>;
    fn get(&self, req: &FetchRequest) -> NetResult<FetchResponse>;
}

pub struct ReqwestNetClient {
    client: Client,
}

impl ReqwestNetClient {
    pub fn new(user_agent: &str) -> NetResult<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| NetError::Transport(err.to_string()))?;
        Ok(Self { client })
    }

    fn request_headers(req: &FetchRequest) -> NetResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        for (key, value) in &req.headers {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|err| NetError::Transport(err.to_string()))?;
            let value = HeaderValue::from_str(value)
                .map_err(|err| NetError::Transport(err.to_string()))?;
            headers.insert(name, value);
        }
        Ok(headers)
    }

    fn classify(err: reqwest::Error) -> NetError {
        if err.is_connect() || err.is_timeout() {
            NetError::Offline(err.to_string())
        } else {
            NetError::Transport(err.to_string())
        }
    }
}

impl NetClient for ReqwestNetClient {
    fn head(&self, req: &FetchRequest) -> NetResult<HeadInfo> {
        let resp = self
            .client
            .head(&req.url)
            .headers(Self::request_headers(req)?)
            .send()
            .map_err(Self::classify)?;
        let content_length = resp
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<u64>().ok());
        Ok(HeadInfo {
            status_code: resp.status().as_u16(),
            content_length,
        })
    }

    fn get(&self, req: &FetchRequest) -> NetResult<FetchResponse> {
        let resp = self
            .client
            .get(&req.url)
            .headers(Self::request_headers(req)?)
            .send()
            .map_err(Self::classify)?;
        let status_code = resp.status().as_u16();
        let body = resp.bytes().map_err(Self::classify)?;
        Ok(FetchResponse { status_code, body })
    }
}
