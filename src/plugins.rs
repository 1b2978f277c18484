//! Plugin tray registry: the plugin types an author can drop onto tracks.

use std::sync::{Arc, RwLock};

use log::debug;
use once_cell::sync::OnceCell;

use crate::core::{Butter, EventName, Module, Payload, WeakButter};
use crate::entities::Plugin;
use crate::error::{ButterError, ButterResult, EntityKind};

#[derive(Default)]
pub struct PluginTray {
    butter: OnceCell<WeakButter>,
    plugins: RwLock<Vec<Plugin>>,
}

impl std::fmt::Debug for PluginTray {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginTray").field("plugins", &self.get_plugins().len()).finish()
    }
}

impl Module for PluginTray {
    fn name(&self) -> &'static str {
        "plugintray"
    }

    fn setup(self: Arc<Self>, butter: &Butter) -> ButterResult<()> {
        self.butter
            .set(butter.downgrade())
            .map_err(|_| ButterError::config("plugintray: already attached to a project"))
    }
}

impl PluginTray {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin type and announce `pluginadded`.
    ///
    /// Without a name the plugin is called `Plugin<n>`.
    pub fn add_plugin(&self, plugin_type: &str, name: Option<&str>) -> ButterResult<Plugin> {
        if plugin_type.is_empty() {
            return Err(ButterError::invalid("plugin type is empty"));
        }
        let butter = self.butter.get().ok_or(ButterError::Detached)?.get()?;
        let plugin = Plugin::new(plugin_type, name);
        {
            let mut plugins = self.plugins.write().unwrap_or_else(|e| e.into_inner());
            if plugins.iter().any(|p| p.name() == plugin.name()) {
                return Err(ButterError::duplicate(EntityKind::Plugin, plugin.name()));
            }
            plugins.push(plugin.clone());
        }
        debug!("PluginTray: {} '{}' ({})", plugin.id(), plugin.name(), plugin.plugin_type);
        butter.trigger(EventName::PluginAdded, Payload::Plugin(plugin.clone()), None);
        Ok(plugin)
    }

    pub fn get_plugins(&self) -> Vec<Plugin> {
        self.plugins.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_add_plugin_announces() {
        let butter = Butter::builder().module(PluginTray::new()).build().unwrap();
        let tray = butter.module::<PluginTray>().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        butter.listen(EventName::PluginAdded, move |e| {
            if let Payload::Plugin(p) = &e.data {
                s.lock().unwrap().push(p.plugin_type.clone());
            }
        }, None);

        tray.add_plugin("footnote", Some("Footnote")).unwrap();
        let unnamed = tray.add_plugin("image", None).unwrap();
        assert!(unnamed.name().starts_with("Plugin"));

        assert_eq!(*seen.lock().unwrap(), vec!["footnote", "image"]);
        let names: Vec<String> = tray.get_plugins().iter().map(|p| p.name().to_string()).collect();
        assert_eq!(names[0], "Footnote");
        assert_eq!(names.len(), 2);
    }

    #[test]
    fn test_duplicate_and_empty_rejected() {
        let butter = Butter::builder().module(PluginTray::new()).build().unwrap();
        let tray = butter.module::<PluginTray>().unwrap();
        tray.add_plugin("footnote", Some("Footnote")).unwrap();
        assert!(matches!(
            tray.add_plugin("text", Some("Footnote")),
            Err(ButterError::DuplicateName { .. })
        ));
        assert!(matches!(tray.add_plugin("", None), Err(ButterError::InvalidArgument(_))));
        assert_eq!(tray.get_plugins().len(), 1);
    }

    #[test]
    fn test_detached_tray() {
        let tray = PluginTray::new();
        assert!(matches!(tray.add_plugin("footnote", None), Err(ButterError::Detached)));
    }
}
