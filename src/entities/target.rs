//! Target: named handle to a drop zone in the presentation layout.

use serde::{Deserialize, Serialize};

use super::ids::TargetId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    id: TargetId,
    name: String,
    /// Opaque reference to the layout element (element id in the preview document).
    pub element: Option<String>,
}

impl Target {
    pub fn new(name: Option<impl Into<String>>, element: Option<impl Into<String>>) -> Self {
        let id = TargetId::next();
        let name = name.map(Into::into).unwrap_or_else(|| format!("Target{}", id.get()));
        Self { id, name, element: element.map(Into::into) }
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self::new(Some(name), None::<String>)
    }

    pub fn id(&self) -> TargetId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `[name, id]` pair as pushed to remote editors.
    pub fn as_pair(&self) -> (String, u64) {
        (self.name.clone(), self.id.get())
    }
}
