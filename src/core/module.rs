//! Module composition for [`Butter`].
//!
//! Modules (event editor, previewer, plugin tray) are handed to a
//! [`ButterBuilder`] and set up against one project instance at build time.
//! Nothing is patched onto a shared type, so two projects on one host never
//! see each other's modules. Extension APIs are reached through the typed
//! handle: `butter.module::<EventEditor>()`.

use std::any::{Any, TypeId};
use std::sync::Arc;

use log::info;

use super::butter::Butter;
use crate::error::{ButterError, ButterResult};

/// A unit of functionality installed into one project aggregate.
pub trait Module: Any + Send + Sync {
    /// Stable module name, unique per project.
    fn name(&self) -> &'static str;

    /// Wire listeners and initial state. Called once, before the module is
    /// reachable through [`Butter::module`].
    fn setup(self: Arc<Self>, butter: &Butter) -> ButterResult<()>;
}

/// Installed module entry.
#[derive(Clone)]
pub(crate) struct ModuleSlot {
    pub(crate) name: &'static str,
    pub(crate) type_id: TypeId,
    pub(crate) instance: Arc<dyn Any + Send + Sync>,
}

type Installer = Box<dyn FnOnce(&Butter) -> ButterResult<()>>;

/// Builder composing modules into a new project aggregate.
#[derive(Default)]
pub struct ButterBuilder {
    installers: Vec<Installer>,
}

impl ButterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a module; modules are set up in the order they were added.
    pub fn module<M: Module>(mut self, module: M) -> Self {
        self.installers.push(Box::new(move |butter: &Butter| install(butter, module).map(|_| ())));
        self
    }

    pub fn build(self) -> ButterResult<Butter> {
        let butter = Butter::new();
        for installer in self.installers {
            installer(&butter)?;
        }
        Ok(butter)
    }
}

fn install<M: Module>(butter: &Butter, module: M) -> ButterResult<Arc<M>> {
    let name = module.name();
    if butter.module_names().contains(&name) {
        return Err(ButterError::config(format!("module '{}' registered twice", name)));
    }
    let module = Arc::new(module);
    Arc::clone(&module).setup(butter)?;
    butter.register_module(ModuleSlot {
        name,
        type_id: TypeId::of::<M>(),
        instance: Arc::clone(&module) as Arc<dyn Any + Send + Sync>,
    });
    info!("{}: module '{}' installed", butter.id(), name);
    Ok(module)
}
