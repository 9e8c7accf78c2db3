//! Application configuration loaded from TOML
//!
//! ```toml
//! name = "blog"
//! templates = ["web/templates"]
//!
//! [limits]
//! query_params = 64
//!
//! [[filters]]
//! name = "head"
//!
//! [[filters]]
//! name = "request_log"
//! config = { level = "debug" }
//! ```
//!
//! Every section except `name` is optional. Missing limits keep their
//! defaults, see [`FetchLimits`].

use crate::{
    errors::ConfigError,
    filters::FilterSpec,
    limits::FetchLimits,
    templates::{Finder, PathFinder},
};
use serde::Deserialize;
use std::{fs, path::{Path, PathBuf}, sync::Arc};

/// Everything needed to build an [`App`](crate::App) without code changes.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    pub name: String,

    #[serde(default)]
    pub limits: FetchLimits,

    /// Filters in declaration order.
    #[serde(default)]
    pub filters: Vec<FilterConfig>,

    /// Template roots, searched in order.
    #[serde(default)]
    pub templates: Vec<PathBuf>,
}

/// One `[[filters]]` entry.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilterConfig {
    pub name: String,

    /// Handed to the filter factory as is.
    #[serde(default)]
    pub config: Option<toml::Value>,
}

impl FilterConfig {
    #[inline]
    pub fn spec(&self) -> FilterSpec {
        match &self.config {
            Some(config) => FilterSpec::with_config(&self.name, config.clone()),
            None => FilterSpec::named(&self.name),
        }
    }
}

impl AppConfig {
    /// Parses and validates a config.
    ///
    /// # Errors
    /// [`ConfigError::Parse`] for malformed TOML or unknown keys, and
    /// [`ConfigError::Invalid`] for an empty name or zero limits that would
    /// reject every request.
    pub fn from_toml(src: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(src)?;
        config.validate()?;
        Ok(config)
    }

    /// A [`PathFinder`] per template root, in order.
    pub fn finders(&self) -> Vec<Arc<dyn Finder>> {
        self.templates
            .iter()
            .map(|root| Arc::new(PathFinder::new(root)) as Arc<dyn Finder>)
            .collect()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::Invalid(String::from("`name` must not be empty")));
        }
        if self.limits.query_params == 0 {
            return Err(ConfigError::Invalid(String::from("`limits.query_params` must be greater than 0")));
        }
        if self.limits.header_count == 0 {
            return Err(ConfigError::Invalid(String::from("`limits.header_count` must be greater than 0")));
        }
        if let Some(filter) = self.filters.iter().find(|f| f.name.is_empty()) {
            return Err(ConfigError::Invalid(format!("filter with config {:?} has no name", filter.config)));
        }
        Ok(())
    }
}

/// Reads and validates the config at `path`.
pub fn load_config(path: impl AsRef<Path>) -> Result<AppConfig, ConfigError> {
    AppConfig::from_toml(&fs::read_to_string(path)?)
}
