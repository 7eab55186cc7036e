//! Site description loaded from `site.ron` in the settings directory.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;
use watcher_engine::{CommandSpec, Endpoints, FulfillmentSelectors, InventorySelectors};
use watcher_logging::watch_info;

pub const SITE_FILENAME: &str = "site.ron";

#[derive(Debug, Error)]
pub enum SiteConfigError {
    #[error("failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse {path:?}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("invalid base url {url:?}: {source}")]
    BaseUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    pub base_url: String,
    pub fulfillment_path: String,
    pub login_path: String,
    pub endpoints: Endpoints,
    pub inventory: InventorySelectors,
    pub fulfillment_page: FulfillmentSelectors,
    /// `{text}` and `{wpm}` in args are substituted per announcement.
    pub speech: Option<CommandSpec>,
    pub cue: Option<CommandSpec>,
    pub request_timeout_secs: u64,
    pub settings_sync_ms: u64,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.goatbots.com".to_string(),
            fulfillment_path: "/delivery".to_string(),
            login_path: "/login".to_string(),
            endpoints: Endpoints::default(),
            inventory: InventorySelectors::default(),
            fulfillment_page: FulfillmentSelectors::default(),
            speech: Some(default_speech_command()),
            cue: None,
            request_timeout_secs: 30,
            settings_sync_ms: 250,
        }
    }
}

fn default_speech_command() -> CommandSpec {
    let (program, rate_flag) = if cfg!(target_os = "macos") {
        ("say", "-r")
    } else {
        ("espeak", "-s")
    };
    CommandSpec {
        program: program.to_string(),
        args: vec![rate_flag.to_string(), "{wpm}".to_string(), "{text}".to_string()],
    }
}

impl SiteConfig {
    /// Read `site.ron` from `dir`; a missing file yields the defaults.
    pub fn load(dir: &Path) -> Result<Self, SiteConfigError> {
        let path = dir.join(SITE_FILENAME);
        let content = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                watch_info!("no {SITE_FILENAME} in {dir:?}; using built-in site settings");
                return Ok(Self::default());
            }
            Err(source) => return Err(SiteConfigError::Read { path, source }),
        };
        ron::from_str(&content).map_err(|err| SiteConfigError::Parse {
            path,
            message: err.to_string(),
        })
    }

    pub fn base_url(&self) -> Result<Url, SiteConfigError> {
        Url::parse(&self.base_url).map_err(|source| SiteConfigError::BaseUrl {
            url: self.base_url.clone(),
            source,
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn settings_sync_interval(&self) -> Duration {
        Duration::from_millis(self.settings_sync_ms.max(50))
    }

    /// Absolute login URL, for the error shown when the session expires.
    pub fn login_url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), self.login_path)
    }
}
