//! Application settings persistence
//!
//! Settings live in a JSON file at `~/.config/camrec/settings.json`. A
//! missing file means defaults; an unreadable one is reported but does not
//! block recording, since only the merge/transcribe paths depend on it.

use log::warn;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Explicit path to the external media tool; None means autodetect
    pub tool_path: Option<PathBuf>,
    /// Remote recognition service endpoint; None disables the speech backend
    pub recognizer_endpoint: Option<String>,
    pub recognizer_api_key: Option<String>,
    /// Default directory for new sessions
    pub default_save_dir: Option<PathBuf>,
}

impl Settings {
    /// Default settings file path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("camrec")
            .join("settings.json")
    }

    /// Load settings, falling back to defaults when the file is absent
    pub fn load() -> Self {
        Self::load_from(&Self::default_path())
    }

    pub fn load_from(path: &Path) -> Self {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(_) => return Self::default(),
        };
        match serde_json::from_str(&contents) {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Ignoring malformed settings file {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn save(&self) -> Result<(), String> {
        self.save_to(&Self::default_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create settings directory: {}", e))?;
        }
        let contents = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize settings: {}", e))?;
        std::fs::write(path, contents).map_err(|e| format!("Failed to write settings: {}", e))
    }

    /// Set or clear the external tool path override and persist it
    pub fn set_tool_path(&mut self, tool_path: Option<PathBuf>) -> Result<(), String> {
        self.tool_path = tool_path;
        self.save()
    }
}
