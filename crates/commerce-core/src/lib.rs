mod config;
mod events;
mod plugin;
mod schema;

pub use config::EngineConfig;
pub use events::{EventHandler, EventSubscriptions, EventSubscriptionsBuilder, HostEvent, HostEventKind};
pub use plugin::{
    InstalledProductRecord, PluginContext, PLUGIN_DESCRIPTION, PLUGIN_DEVELOPER,
    PLUGIN_DEVELOPER_URL, PLUGIN_DOCUMENTATION_URL, PLUGIN_HANDLE, PLUGIN_NAME, PLUGIN_VERSION,
    SCHEMA_VERSION,
};
pub use schema::{Column, ColumnKind, Index, Row, Schema, Table};

#[cfg(test)]
mod tests;
