use std::{
    collections::BTreeMap,
    fmt::Debug,
    io::{self, BufReader, BufWriter, Write},
    path::PathBuf,
};

use fs_err::File;
use itertools::Itertools;
use log::{debug, info, warn};
use reqwest::header::{HeaderMap, SET_COOKIE};
use serde::{Deserialize, Serialize};

/// Cookies identifying a browsing context with the portal, keyed by cookie name.
///
/// Values are stored exactly as received apart from surrounding whitespace;
/// nothing is URL-decoded.  Expiry is never tracked here.  An expired session
/// is noticed when the portal answers with its login page.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Session {
    cookies: BTreeMap<String, String>,
}
impl Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Values are credentials in disguise
        f.debug_struct("Session")
            .field("cookies", &self.cookies.keys().collect_vec())
            .finish()
    }
}

impl Session {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, SessionLoadError> {
        Ok(serde_json::from_reader(BufReader::new(File::open(path)?))?)
    }

    /// Like [`Session::load`], but any failure yields an empty session.
    pub fn load_or_default(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match Self::load(&path) {
            Ok(session) => {
                info!("Session file was found ({} cookies).", session.len());
                session
            }
            Err(SessionLoadError::NotFound) => {
                info!("Session file was not found at {path:?}.  Starting with an empty session.");
                Self::default()
            }
            Err(e) => {
                warn!("{e}  Starting with an empty session.");
                Self::default()
            }
        }
    }

    pub fn save(&self, path: impl Into<PathBuf>) -> io::Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.cookies.insert(name.into(), value.into());
    }

    /// Value for the `Cookie` request header, or `None` if there is nothing to send.
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .join("; "),
        )
    }

    /// Merges one `Set-Cookie` value, which may carry several cookies joined by commas.
    /// Returns the names that were written.
    pub fn merge_set_cookie(&mut self, raw: &str) -> Vec<String> {
        let mut merged = vec![];
        for part in split_set_cookie(raw) {
            let pair = part.split(';').next().unwrap_or_default();
            let Some((name, value)) = pair.split_once('=') else {
                continue;
            };
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            self.cookies.insert(name.to_owned(), value.trim().to_owned());
            merged.push(name.to_owned());
        }
        merged
    }

    pub fn merge_from_headers(&mut self, headers: &HeaderMap) {
        for value in headers.get_all(SET_COOKIE) {
            let Ok(raw) = value.to_str() else {
                warn!("Ignoring a Set-Cookie header that is not valid UTF-8");
                continue;
            };
            let merged = self.merge_set_cookie(raw);
            debug!("Merged cookies: {merged:?}");
        }
    }
}

/// Splits at the commas that start a new `name=` pair, keeping commas inside
/// attributes such as `Expires=Wed, 21 Oct 2015 07:28:00 GMT` intact.
fn split_set_cookie(raw: &str) -> Vec<&str> {
    let mut parts = vec![];
    let mut start = 0;
    for (i, c) in raw.char_indices() {
        if c != ',' {
            continue;
        }
        let rest = &raw[i + 1..];
        let starts_pair = rest
            .find([';', '='])
            .is_some_and(|j| j > 0 && rest.as_bytes()[j] == b'=');
        if starts_pair {
            parts.push(&raw[start..i]);
            start = i + 1;
        }
    }
    parts.push(&raw[start..]);
    parts
}

#[derive(Debug, thiserror::Error)]
pub enum SessionLoadError {
    #[error("Session file was not found.")]
    NotFound,
    #[error("An I/O error occurred when loading the session file: {0:?}")]
    IOError(io::Error),
    #[error("The session file is corrupted and could not be loaded: {0:?}")]
    JsonError(#[from] serde_json::Error),
}
impl From<io::Error> for SessionLoadError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::NotFound => Self::NotFound,
            _ => Self::IOError(e),
        }
    }
}
