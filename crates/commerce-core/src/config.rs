use std::collections::HashSet;
use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use semver::{Comparator, Op, Prerelease, VersionReq};
use serde::{Deserialize, Serialize};

/// Settings for the install/upgrade path, read from `commerce.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    /// Registry name of the predecessor product whose schema can be upgraded.
    pub legacy_product: String,
    /// The one predecessor version an upgrade path exists from. Compared
    /// verbatim; no version ordering is applied.
    pub upgrade_source_version: String,
    pub min_host_version: VersionReq,
    pub site_locales: Vec<String>,
    /// Console installs skip user-session event subscriptions.
    pub console: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            legacy_product: "Market".to_string(),
            upgrade_source_version: "0.8.09".to_string(),
            min_host_version: default_min_host_version(),
            site_locales: vec!["en-US".to_string()],
            console: false,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let config: Self = toml::from_str(input).context("failed to parse commerce config")?;
        config.validate()?;
        Ok(config)
    }

    /// Loads the config at `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed reading commerce config: {}", path.display()))?;
        Self::from_toml_str(&raw)
            .with_context(|| format!("invalid commerce config: {}", path.display()))
    }

    fn validate(&self) -> Result<()> {
        if self.legacy_product.trim().is_empty() {
            return Err(anyhow!("legacy_product must not be empty"));
        }
        if self.upgrade_source_version.trim().is_empty() {
            return Err(anyhow!("upgrade_source_version must not be empty"));
        }
        if self.site_locales.is_empty() {
            return Err(anyhow!("site_locales must list at least one locale"));
        }

        let mut seen = HashSet::new();
        for locale in &self.site_locales {
            if locale.trim().is_empty() {
                return Err(anyhow!("site_locales must not contain empty entries"));
            }
            if !seen.insert(locale.as_str()) {
                return Err(anyhow!("duplicate site locale '{locale}'"));
            }
        }
        Ok(())
    }
}

fn default_min_host_version() -> VersionReq {
    VersionReq {
        comparators: vec![Comparator {
            op: Op::GreaterEq,
            major: 2,
            minor: Some(5),
            patch: None,
            pre: Prerelease::EMPTY,
        }],
    }
}
