use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::backend::DEFAULT_API_BASE;
use crate::store::DB_PATH;

const SITE_HOST: &str = "linkedin.com";
const TIME_UNIT_MS: u64 = 1000;

/// Runtime settings: built-in defaults, overridden by environment variables,
/// overridden in turn by command-line flags.
#[derive(Debug, Clone)]
pub struct Settings {
    pub api_base: String,
    pub db_path: PathBuf,
    pub site_host: String,
    pub time_unit: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            db_path: PathBuf::from(DB_PATH),
            site_host: SITE_HOST.to_string(),
            time_unit: Duration::from_millis(TIME_UNIT_MS),
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let mut s = Self::default();
        if let Some(v) = get("LEADS_API_BASE").filter(|v| !v.is_empty()) {
            s.api_base = v;
        }
        if let Some(v) = get("LEADS_DB_PATH").filter(|v| !v.is_empty()) {
            s.db_path = PathBuf::from(v);
        }
        if let Some(v) = get("LEADS_SITE_HOST").filter(|v| !v.is_empty()) {
            s.site_host = v;
        }
        if let Some(ms) = get("LEADS_TIME_UNIT_MS").and_then(|v| v.parse().ok()) {
            s.time_unit = Duration::from_millis(ms);
        }
        s
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ContextError {
    #[error("Please navigate to {host} first! ({url} is not a {host} page)")]
    WrongSite { url: String, host: String },
    #[error("Not a web page: {0}")]
    NotWeb(String),
}

/// Reject URLs that are not on the configured site (subdomains allowed).
pub fn check_context(url: &Url, host: &str) -> Result<(), ContextError> {
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ContextError::NotWeb(url.to_string()));
    }
    let on_site = url
        .host_str()
        .is_some_and(|h| h == host || h.ends_with(&format!(".{}", host)));
    if on_site {
        Ok(())
    } else {
        Err(ContextError::WrongSite {
            url: url.to_string(),
            host: host.to_string(),
        })
    }
}
