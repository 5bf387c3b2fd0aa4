use std::path::{Path, PathBuf};

use anyhow::Context;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use url::Url;
use vklass_utils::{
    credentials::Credentials,
    fs_json_util::{read_json, write_json_pretty},
};

use crate::schema::{StudentId, StudentRoster};

pub const DEFAULT_BASE_URL: &str = "https://custodian.vklass.se/";
pub const DEFAULT_LOGIN_URL: &str = "https://auth.vklass.se/credentials";
pub const DEFAULT_MAX_REDIRECTS: usize = 10;
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Where the portal lives and how far the client is willing to be redirected.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PortalConfig {
    pub base_url: Url,
    pub login_url: Url,
    pub max_redirects: usize,
    pub user_agent: String,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            base_url: Url::parse(DEFAULT_BASE_URL).expect("DEFAULT_BASE_URL is a valid URL"),
            login_url: Url::parse(DEFAULT_LOGIN_URL).expect("DEFAULT_LOGIN_URL is a valid URL"),
            max_redirects: DEFAULT_MAX_REDIRECTS,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
        }
    }
}

impl PortalConfig {
    fn is_default(&self) -> bool {
        self == &Self::default()
    }
}

/// Previously discovered students, either as a bare id list or with names.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Students {
    Ids(Vec<StudentId>),
    Roster(StudentRoster),
}

impl Students {
    pub fn ids(&self) -> Vec<StudentId> {
        match self {
            Students::Ids(ids) => ids.clone(),
            Students::Roster(roster) => roster.ids().cloned().collect(),
        }
    }
}

/// Contents of `config.json`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(flatten)]
    pub credentials: Credentials,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub students: Option<Students>,
    #[serde(default, skip_serializing_if = "PortalConfig::is_default")]
    pub portal: PortalConfig,
}

#[derive(Clone, Debug)]
pub struct Paths {
    pub base_dir: PathBuf,
    pub config_path: PathBuf,
    pub session_path: PathBuf,
    pub calendar_dir: PathBuf,
    pub attachments_dir: PathBuf,
    pub news_dir: PathBuf,
}

impl Paths {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        Self {
            config_path: base_dir.join("config.json"),
            session_path: base_dir.join("session.json"),
            calendar_dir: base_dir.join("calendar"),
            attachments_dir: base_dir.join("attachments"),
            news_dir: base_dir.join("news"),
            base_dir,
        }
    }

    /// `~/.vklass`
    pub fn default_base_dir() -> anyhow::Result<PathBuf> {
        Ok(dirs::home_dir()
            .context("Could not determine the home directory")?
            .join(".vklass"))
    }

    fn directories(&self) -> [&Path; 4] {
        [
            &self.base_dir,
            &self.calendar_dir,
            &self.attachments_dir,
            &self.news_dir,
        ]
    }
}

/// Creates the directories and, unless a non-empty one exists, a scaffold config file.
pub fn ensure(paths: &Paths) -> anyhow::Result<()> {
    for dir in paths.directories() {
        fs_err::create_dir_all(dir)?;
    }
    let needs_scaffold = match fs_err::read_to_string(&paths.config_path) {
        Ok(raw) => raw.trim().is_empty(),
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("{e}");
            }
            true
        }
    };
    if needs_scaffold {
        info!("Writing a new configuration file to {:?}", paths.config_path);
        write_json_pretty(&paths.config_path, &Credentials::default())?;
    }
    Ok(())
}

/// Reads the configuration file.
///
/// A file that cannot be parsed is an error rather than an empty configuration,
/// so that saving afterwards can never overwrite the stored credentials.
pub fn load(paths: &Paths) -> anyhow::Result<Config> {
    ensure(paths)?;
    read_json(&paths.config_path)
        .with_context(|| format!("Fix or remove {:?} and try again", paths.config_path))
}

pub fn save(paths: &Paths, config: &Config) -> anyhow::Result<()> {
    ensure(paths)?;
    write_json_pretty(&paths.config_path, config)
        .with_context(|| format!("While saving {:?}", paths.config_path))
}
