use reqwest::StatusCode;
use url::Url;

/// Longest body excerpt carried by an error.
pub const PREVIEW_LEN: usize = 200;

#[derive(Debug, thiserror::Error)]
pub enum PortalError {
    #[error("Missing username/password in the configuration file.")]
    MissingCredentials,
    #[error("Login form not found on {url}")]
    FormNotFound { url: Url },
    #[error("Login failed; no session cookie. Preview: {preview}")]
    LoginRejected { preview: String },
    #[error("Expected JSON response but got {content_type:?}. Preview: {preview}")]
    UnexpectedContentType {
        content_type: String,
        preview: String,
    },
    #[error("News feed fetch failed ({status}). Preview: {preview}")]
    FeedFetchFailed { status: StatusCode, preview: String },
    #[error("Calendar fetch failed ({status}). Preview: {preview}")]
    CalendarFetchFailed { status: StatusCode, preview: String },
    #[error("Gave up after {limit} redirects; last location was {url}")]
    TooManyRedirects { limit: usize, url: Url },
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("Invalid header value: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),
    #[error("Failed to encode form: {0}")]
    FormEncoding(#[from] serde_html_form::ser::Error),
    #[error("Malformed JSON from the portal: {0}")]
    Json(#[from] serde_json::Error),
}

/// First [`PREVIEW_LEN`] characters of `text`.
pub fn preview(text: &str) -> String {
    text.chars().take(PREVIEW_LEN).collect()
}
