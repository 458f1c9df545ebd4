use crate::{digest::DIGEST_FIELDS, template::Template};
use anyhow::{Context, ensure};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Search result pages to watch, checked in this order.
    pub urls: Vec<String>,
    /// Minutes between checks.
    #[serde(default = "default_interval")]
    pub interval: u64,
    #[serde(default)]
    pub to_email: String,
    #[serde(default)]
    pub from_email: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Digest template, relative to the configuration file.
    #[serde(default = "default_template")]
    pub template: PathBuf,
    #[serde(default)]
    pub debug: bool,
    #[serde(default = "default_smtp_host")]
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    /// Prepended to an ad's finn code to link to it.
    #[serde(default = "default_link_prefix")]
    pub link_prefix: String,
    #[serde(default = "default_min_delay_ms")]
    pub min_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Where to remember seen ads between runs, if anywhere.
    #[serde(default)]
    pub state_file: Option<PathBuf>,
}

fn default_interval() -> u64 {
    30
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 5.1; rv:31.0) Gecko/20100101 Firefox/31.0".to_string()
}

fn default_template() -> PathBuf {
    PathBuf::from("default.tmpl")
}

fn default_smtp_host() -> String {
    "localhost".to_string()
}

fn default_smtp_port() -> u16 {
    25
}

fn default_link_prefix() -> String {
    "www.finn.no/finn/finncode/result?finncode=".to_string()
}

fn default_min_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    6000
}

impl Config {
    fn validate(&self) -> anyhow::Result<()> {
        ensure!(
            !self.urls.is_empty(),
            "Invalid configuration. You need to provide at least one url"
        );
        ensure!(
            !self.to_email.trim().is_empty() && !self.from_email.trim().is_empty(),
            "Invalid configuration. You need to provide to_email and from_email"
        );
        self.to_email
            .parse::<lettre::Address>()
            .with_context(|| format!("Invalid to_email '{}'", self.to_email))?;
        self.from_email
            .parse::<lettre::Address>()
            .with_context(|| format!("Invalid from_email '{}'", self.from_email))?;

        ensure!(
            self.interval >= 1,
            "Interval is too small. Set 'interval' to a value larger than zero"
        );
        ensure!(
            self.min_delay_ms <= self.max_delay_ms,
            "min_delay_ms can't be larger than max_delay_ms"
        );

        for url in &self.urls {
            let parsed =
                url::Url::parse(url).with_context(|| format!("Your url '{url}' is invalid"))?;
            ensure!(
                matches!(parsed.scheme(), "http" | "https"),
                "Your url '{url}' is not an http(s) address"
            );
            ensure!(
                is_mobile_search_page(&parsed),
                "Your url '{url}' is in an invalid format. \
                 Are you using the mobile site (m.finn.no/.../search.html)?"
            );
        }

        Ok(())
    }
}

/// Only the mobile site's search result pages carry the ad list we extract.
fn is_mobile_search_page(url: &url::Url) -> bool {
    // At least one path segment before the page, like /bap/forsale/search.html.
    let in_section = url
        .path()
        .strip_suffix("search.html")
        .is_some_and(|dir| dir.len() > 2 && dir.starts_with('/') && dir.ends_with('/'));

    url.host_str() == Some("m.finn.no") && in_section
}

/// A validated configuration together with its parsed digest template.
#[derive(Debug)]
pub struct Generation {
    pub config: Config,
    pub template: Template,
}

impl Generation {
    /// Reads, validates, and resolves a configuration file.
    ///
    /// Relative `template` and `state_file` paths are taken relative to the
    /// directory holding the configuration file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        // Canonicalize the config path so we know it exists and have a base directory.
        let path = std::fs::canonicalize(path).context("Failed to resolve config path")?;
        let base = path.parent().unwrap_or(Path::new("/"));

        let content = std::fs::read_to_string(&path).context("Failed to read config file")?;
        let mut config: Config =
            toml::from_str(&content).context("Failed to deserialize config file")?;
        config.validate()?;

        config.template = base.join(&config.template);
        config.state_file = config.state_file.map(|state_file| base.join(state_file));

        // Dry run: the template must at least parse before we accept it.
        let source = std::fs::read_to_string(&config.template)
            .with_context(|| format!("Failed to read template {}", config.template.display()))?;
        let template = Template::parse(&source, DIGEST_FIELDS)
            .with_context(|| format!("Invalid template {}", config.template.display()))?;

        Ok(Self { config, template })
    }
}
