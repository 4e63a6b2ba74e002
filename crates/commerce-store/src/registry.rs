use anyhow::{anyhow, Context, Result};
use commerce_core::InstalledProductRecord;
use std::fs;
use std::io;
use std::path::PathBuf;

use crate::fs_utils::remove_file_if_exists;
use crate::StoreLayout;

/// Lookup side of the host's installed-plugin registry.
pub trait PluginRegistry {
    fn find_installed_product(&self, name: &str) -> Result<Option<InstalledProductRecord>>;
}

/// Registry persisted as one `key=value` record per plugin under
/// `state/plugins/`.
#[derive(Debug, Clone)]
pub struct FilePluginRegistry {
    layout: StoreLayout,
}

impl FilePluginRegistry {
    pub fn new(layout: StoreLayout) -> Self {
        Self { layout }
    }

    pub fn write_record(&self, record: &InstalledProductRecord) -> Result<PathBuf> {
        validate_plugin_name(&record.name)?;
        if record.version.trim().is_empty() {
            return Err(anyhow!("plugin '{}' version must not be empty", record.name));
        }

        let mut payload = String::new();
        payload.push_str(&format!("name={}\n", record.name));
        payload.push_str(&format!("version={}\n", record.version));
        if let Some(schema_version) = &record.schema_version {
            payload.push_str(&format!("schema_version={}\n", schema_version));
        }
        payload.push_str(&format!(
            "installed_at_unix={}\n",
            record.installed_at_unix
        ));

        let dir = self.layout.plugins_dir();
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create plugin registry dir: {}", dir.display()))?;
        let path = self.layout.plugin_record_path(&record.name);
        fs::write(&path, payload.as_bytes())
            .with_context(|| format!("failed to write plugin record: {}", path.display()))?;
        Ok(path)
    }

    pub fn read_records(&self) -> Result<Vec<InstalledProductRecord>> {
        let dir = self.layout.plugins_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut records = Vec::new();
        for entry in fs::read_dir(&dir)
            .with_context(|| format!("failed to read plugin registry dir: {}", dir.display()))?
        {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }

            let path = entry.path();
            if path.extension().and_then(|v| v.to_str()) != Some("plugin") {
                continue;
            }

            let raw = fs::read_to_string(&path)
                .with_context(|| format!("failed to read plugin record: {}", path.display()))?;
            let record = parse_plugin_record(&raw)
                .with_context(|| format!("failed to parse plugin record: {}", path.display()))?;
            records.push(record);
        }

        records.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(records)
    }

    pub fn remove_record(&self, name: &str) -> Result<bool> {
        validate_plugin_name(name)?;
        let path = self.layout.plugin_record_path(name);
        if !path.exists() {
            return Ok(false);
        }

        remove_file_if_exists(&path)
            .with_context(|| format!("failed to remove plugin record: {}", path.display()))?;
        Ok(true)
    }
}

impl PluginRegistry for FilePluginRegistry {
    fn find_installed_product(&self, name: &str) -> Result<Option<InstalledProductRecord>> {
        validate_plugin_name(name)?;
        let path = self.layout.plugin_record_path(name);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read plugin record: {}", path.display()));
            }
        };

        let record = parse_plugin_record(&raw)
            .with_context(|| format!("failed to parse plugin record: {}", path.display()))?;
        // Names are matched exactly, so a record filed under another case is a miss.
        if record.name != name {
            return Ok(None);
        }
        Ok(Some(record))
    }
}

pub(crate) fn parse_plugin_record(raw: &str) -> Result<InstalledProductRecord> {
    let mut name = None;
    let mut version = None;
    let mut schema_version = None;
    let mut installed_at_unix = None;

    for line in raw.lines().map(str::trim).filter(|line| !line.is_empty()) {
        let Some((k, v)) = line.split_once('=') else {
            continue;
        };
        match k {
            "name" => name = Some(v.to_string()),
            // Kept verbatim: upgrade eligibility compares the exact string.
            "version" => version = Some(v.to_string()),
            "schema_version" => schema_version = Some(v.to_string()),
            "installed_at_unix" => {
                installed_at_unix = Some(v.parse().context("installed_at_unix must be u64")?)
            }
            _ => {}
        }
    }

    Ok(InstalledProductRecord {
        name: name.context("missing name")?,
        version: version.context("missing version")?,
        schema_version,
        installed_at_unix: installed_at_unix.unwrap_or(0),
    })
}

fn validate_plugin_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.len() <= 64
        && !name.starts_with('.')
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"._-".contains(&b));
    if !valid {
        return Err(anyhow!("invalid plugin name '{name}'"));
    }
    Ok(())
}
