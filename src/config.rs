//! Client configuration: where the service lives and how to authenticate.

use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use url::Url;

use crate::errors::{Error, Result};

/// Environment variable naming the service base URL.
const URL_VAR: &str = "FORESTSENS_URL";
/// Environment variable naming the API token.
const APITOKEN_VAR: &str = "FORESTSENS_APITOKEN";

/// Resolved client configuration. Immutable for the client's lifetime; there
/// is no process-wide mutable configuration anywhere in this crate.
#[derive(Clone, Debug)]
pub struct Config {
    base_url: Url,
    apitoken: String,
}

/// On-disk shape of `~/.forestsens/config.json`.
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    base_url: Option<String>,
    apitoken: Option<String>,
}

impl Config {
    /// Build a configuration from explicit values.
    pub fn new<S: Into<String>>(base_url: &str, apitoken: S) -> Result<Config> {
        let apitoken = apitoken.into();
        if apitoken.trim().is_empty() {
            return Err(Error::config("apitoken must be non-empty"));
        }
        let base_url = Url::parse(base_url)
            .map_err(|e| Error::could_not_parse_url(base_url, e))?;
        Ok(Config { base_url, apitoken })
    }

    /// Resolve a configuration from `FORESTSENS_URL` / `FORESTSENS_APITOKEN`,
    /// falling back to `~/.forestsens/config.json` for whatever the
    /// environment doesn't provide.
    pub fn from_env() -> Result<Config> {
        Config::resolve(
            env::var(URL_VAR).ok(),
            env::var(APITOKEN_VAR).ok(),
            default_path().as_deref(),
        )
    }

    /// Layer explicit values over the config file, field by field.
    fn resolve(
        url: Option<String>,
        token: Option<String>,
        file_path: Option<&Path>,
    ) -> Result<Config> {
        if let (Some(url), Some(token)) = (&url, &token) {
            return Config::new(url, token.clone());
        }

        let file = match file_path {
            Some(path) if path.is_file() => read_config_file(path)?,
            _ => ConfigFile::default(),
        };
        let url = url.or(file.base_url).ok_or_else(|| {
            Error::config(format!(
                "missing base URL: set {} or put `base_url` in ~/.forestsens/config.json",
                URL_VAR
            ))
        })?;
        let token = token.or(file.apitoken).ok_or_else(|| {
            Error::config(format!(
                "missing API token: set {} or put `apitoken` in ~/.forestsens/config.json",
                APITOKEN_VAR
            ))
        })?;
        Config::new(&url, token)
    }

    /// Load a configuration from a specific JSON file with `base_url` and
    /// `apitoken` keys.
    pub fn from_file(path: &Path) -> Result<Config> {
        let file = read_config_file(path)?;
        let url = file.base_url.ok_or_else(|| {
            Error::config(format!("no `base_url` in {}", path.display()))
        })?;
        let token = file.apitoken.ok_or_else(|| {
            Error::config(format!("no `apitoken` in {}", path.display()))
        })?;
        Config::new(&url, token)
    }

    /// The base URL every request is built against.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub(crate) fn apitoken(&self) -> &str {
        &self.apitoken
    }
}

fn read_config_file(path: &Path) -> Result<ConfigFile> {
    let text =
        fs::read_to_string(path).map_err(|e| Error::could_not_read_file(path, e))?;
    serde_json::from_str(&text).map_err(|e| {
        Error::config(format!("could not parse {}: {}", path.display(), e))
    })
}

fn default_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".forestsens").join("config.json"))
}
