use crate::EngineConfig;

pub const PLUGIN_NAME: &str = "Commerce";
pub const PLUGIN_HANDLE: &str = "commerce";
pub const PLUGIN_VERSION: &str = "1.0.0000";
pub const SCHEMA_VERSION: &str = "1.0.01";
pub const PLUGIN_DESCRIPTION: &str =
    "An amazingly powerful and flexible e-commerce platform for Craft CMS.";
pub const PLUGIN_DEVELOPER: &str = "Pixel & Tonic";
pub const PLUGIN_DEVELOPER_URL: &str = "https://craftcommerce.com";
pub const PLUGIN_DOCUMENTATION_URL: &str = "https://craftcommerce.com/docs";

/// A product as the host's plugin registry reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledProductRecord {
    pub name: String,
    pub version: String,
    pub schema_version: Option<String>,
    pub installed_at_unix: u64,
}

impl InstalledProductRecord {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            schema_version: None,
            installed_at_unix: 0,
        }
    }
}

/// Passed to every migration step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginContext {
    pub handle: String,
    pub site_locales: Vec<String>,
}

impl PluginContext {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            handle: PLUGIN_HANDLE.to_string(),
            site_locales: config.site_locales.clone(),
        }
    }
}
