use std::borrow::Cow;

use async_trait::async_trait;
use log::debug;
use reqwest::{
    header::{self, HeaderMap, HeaderName, HeaderValue},
    redirect, Method, StatusCode,
};
use serde::de::DeserializeOwned;
use url::Url;
use vklass_utils::regex;

use crate::error::PortalError;

/// Bookkeeping carried along with a request.  Never sent over the wire.
#[derive(Clone, Copy, Default, PartialEq, Eq, Debug)]
pub struct RequestFlags {
    /// This is the repetition of a request that hit the login page.
    pub retried: bool,
    /// Do not inspect the response for a login page.
    pub skip_login_detect: bool,
}

/// A request as the session layer sees it, before cookies are attached.
#[derive(Clone, Debug)]
pub struct PortalRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<String>,
    pub flags: RequestFlags,
}

impl PortalRequest {
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            headers: HeaderMap::new(),
            body: None,
            flags: RequestFlags::default(),
        }
    }

    pub fn post_form(url: Url, body: String) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );
        Self {
            method: Method::POST,
            url,
            headers,
            body: Some(body),
            flags: RequestFlags::default(),
        }
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn flags(mut self, flags: RequestFlags) -> Self {
        self.flags = flags;
        self
    }
}

/// A fully buffered response.
///
/// The body is kept in memory so that it can be inspected (e.g. to sniff a
/// login page) and still be handed to the caller untouched.
#[derive(Clone, Debug)]
pub struct PortalResponse {
    pub status: StatusCode,
    pub url: Url,
    pub headers: HeaderMap,
    body: Vec<u8>,
}

impl PortalResponse {
    pub fn new(status: StatusCode, url: Url, headers: HeaderMap, body: Vec<u8>) -> Self {
        Self {
            status,
            url,
            headers,
            body,
        }
    }

    pub fn content_type(&self) -> &str {
        self.headers
            .get(header::CONTENT_TYPE)
            .and_then(|x| x.to_str().ok())
            .unwrap_or_default()
    }

    pub fn is_html_or_text(&self) -> bool {
        regex!(r"(?i)html|text/").is_match(self.content_type())
    }

    pub fn is_json(&self) -> bool {
        regex!(r"(?i)application/json").is_match(self.content_type())
    }

    pub fn location(&self) -> Option<&str> {
        self.headers
            .get(header::LOCATION)
            .and_then(|x| x.to_str().ok())
    }

    /// Decodes the body without consuming it.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.body
    }

    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.body)
    }
}

/// The raw HTTP primitive underneath the session layer.
///
/// Implementations must not follow redirects or manage cookies themselves.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, request: PortalRequest) -> Result<PortalResponse, PortalError>;
}

pub struct ReqwestFetch {
    client: reqwest::Client,
}

impl ReqwestFetch {
    pub fn new(user_agent: &str) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .redirect(redirect::Policy::none())
            .connection_verbose(true)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetch for ReqwestFetch {
    async fn fetch(&self, request: PortalRequest) -> Result<PortalResponse, PortalError> {
        debug!("{} {}", request.method, request.url);
        let mut builder = self
            .client
            .request(request.method, request.url)
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }
        let response = builder.send().await?;
        let status = response.status();
        let url = response.url().clone();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();
        debug!("{status} from {url} ({} bytes)", body.len());
        Ok(PortalResponse::new(status, url, headers, body))
    }
}
