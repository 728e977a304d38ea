use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use url::Url;

use crate::fetch::Limits;
use crate::parser::rules::RuleSet;

/// Runtime settings: optional `rt_harvest.toml` (or `--config`), then `RT_*`
/// environment variables, then CLI flags.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub db_path: PathBuf,
    pub proxy: Option<String>,
    pub max_concurrency: usize,
    pub requests_per_second: f64,
    pub timeout_secs: u64,
    pub site_base: String,
    pub index_base: String,
    pub min_votes: u32,
    pub rules_path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            db_path: PathBuf::from("data/rt.sqlite"),
            proxy: None,
            max_concurrency: 10,
            requests_per_second: 10.0,
            timeout_secs: 30,
            site_base: "https://www.rottentomatoes.com".into(),
            index_base: "http://epguides.com".into(),
            min_votes: 20,
            rules_path: None,
        }
    }
}

impl Settings {
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let builder = match file {
            Some(path) => Config::builder().add_source(File::from(path).required(true)),
            None => Config::builder().add_source(File::with_name("rt_harvest").required(false)),
        };
        let settings = builder
            .add_source(Environment::with_prefix("RT").try_parsing(true))
            .build()
            .context("Failed to read settings")?
            .try_deserialize()
            .context("Invalid settings")?;
        Ok(settings)
    }

    pub fn limits(&self) -> Limits {
        Limits::new(self.max_concurrency, self.requests_per_second)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn sites(&self) -> Result<Sites> {
        Ok(Sites {
            review: base_url(&self.site_base)
                .with_context(|| format!("Invalid site_base {}", self.site_base))?,
            index: base_url(&self.index_base)
                .with_context(|| format!("Invalid index_base {}", self.index_base))?,
        })
    }

    pub fn rules(&self) -> Result<RuleSet> {
        match &self.rules_path {
            Some(path) => RuleSet::load(path).with_context(|| format!("Failed to load rules {:?}", path)),
            None => Ok(RuleSet::builtin()),
        }
    }
}

/// Parse a base URL and make its path a directory, so relative joins keep
/// any prefix (`http://host/mirror` → `http://host/mirror/menua/`).
fn base_url(raw: &str) -> Result<Url> {
    let mut url = Url::parse(raw)?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// The two upstream bases.
#[derive(Debug, Clone)]
pub struct Sites {
    pub review: Url,
    pub index: Url,
}

impl Sites {
    pub fn index_page(&self, letter: char) -> Result<Url> {
        Ok(self.index.join(&format!("menu{}/", letter))?)
    }

    pub fn search(&self, name: &str) -> Result<Url> {
        Ok(self
            .review
            .join(&format!("search?search={}", urlencoding::encode(name)))?)
    }
}
