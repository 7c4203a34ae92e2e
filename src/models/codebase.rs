use serde::{Deserialize, Serialize};

use super::ticket::Component;

/// Files a feature is expected to touch, grouped by area.
///
/// Produced by the codebase analysis step and carried onto tickets. Empty when
/// the backend could not be asked.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CodebaseAnalysis {
    #[serde(default)]
    pub frontend_files: Vec<String>,
    #[serde(default)]
    pub style_files: Vec<String>,
    #[serde(default)]
    pub test_files: Vec<String>,
    #[serde(default)]
    pub backend_files: Vec<String>,
}

impl CodebaseAnalysis {
    pub fn is_empty(&self) -> bool {
        self.frontend_files.is_empty()
            && self.style_files.is_empty()
            && self.test_files.is_empty()
            && self.backend_files.is_empty()
    }

    /// Files a ticket for `component` would modify. Parents get none.
    pub fn files_for(&self, component: Option<Component>) -> Vec<String> {
        match component {
            Some(Component::Frontend) => self
                .frontend_files
                .iter()
                .chain(&self.style_files)
                .cloned()
                .collect(),
            Some(Component::Styling) => self.style_files.clone(),
            Some(Component::Backend) => self.backend_files.clone(),
            Some(Component::Testing) => self.test_files.clone(),
            Some(Component::Documentation) | None => Vec::new(),
        }
    }
}
