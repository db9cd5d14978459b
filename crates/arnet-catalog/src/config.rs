/// Controls catalog loading behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogConfig {
    /// Maximum number of documents loaded from a directory.
    pub max_documents_from_directory: usize,
    /// Maximum bytes allowed per catalog document.
    pub max_document_size: usize,
    /// Module names (file stems) to load from a directory. `None` loads every
    /// `*.json` document.
    pub modules: Option<Vec<String>>,
}

/// Features the controller is interested in by default.
pub const DEFAULT_MODULES: [&str; 4] = ["common", "ardrone3", "skyctrl", "drone_manager"];

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            max_documents_from_directory: 64,
            max_document_size: 4 * 1024 * 1024,
            modules: None,
        }
    }
}

impl CatalogConfig {
    /// Restrict directory loading to [`DEFAULT_MODULES`].
    pub fn default_modules() -> Self {
        Self {
            modules: Some(DEFAULT_MODULES.iter().map(|m| m.to_string()).collect()),
            ..Self::default()
        }
    }
}
