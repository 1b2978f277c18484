//! Plugin descriptor listed in the plugin tray.

use serde::{Deserialize, Serialize};

use super::ids::PluginId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plugin {
    id: PluginId,
    name: String,
    #[serde(rename = "type")]
    pub plugin_type: String,
}

impl Plugin {
    pub fn new(plugin_type: impl Into<String>, name: Option<impl Into<String>>) -> Self {
        let id = PluginId::next();
        let name = name.map(Into::into).unwrap_or_else(|| format!("Plugin{}", id.get()));
        Self { id, name, plugin_type: plugin_type.into() }
    }

    pub fn id(&self) -> PluginId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}
