use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::catalog::CatalogMode;
use crate::viewer::{DEFAULT_CACHE_DOCUMENTS, DEFAULT_WORKERS, ScalePolicy, SessionConfig};

pub const CURRENT_VERSION: u32 = 1;
const SETTINGS_FILENAME: &str = "config.yaml";
const APP_NAME: &str = "biopsy-viewer";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogSettings {
    #[serde(default)]
    pub mode: CatalogMode,

    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Applies to catalog requests and document downloads
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl CatalogSettings {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            mode: CatalogMode::default(),
            api_base: default_api_base(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewerSettings {
    #[serde(default = "default_workers")]
    pub workers: usize,

    #[serde(default = "default_cache_documents")]
    pub cache_documents: usize,
}

impl Default for ViewerSettings {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            cache_documents: default_cache_documents(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default)]
    pub catalog: CatalogSettings,

    #[serde(default)]
    pub viewer: ViewerSettings,

    #[serde(default)]
    pub scale: ScalePolicy,
}

fn default_version() -> u32 {
    CURRENT_VERSION
}

fn default_api_base() -> String {
    "http://localhost:8000".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

fn default_cache_documents() -> usize {
    DEFAULT_CACHE_DOCUMENTS
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            catalog: CatalogSettings::default(),
            viewer: ViewerSettings::default(),
            scale: ScalePolicy::default(),
        }
    }
}

impl Settings {
    /// Session tunables; the initial scale comes from the policy's wide factor
    #[must_use]
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            workers: self.viewer.workers.max(1),
            cache_documents: self.viewer.cache_documents,
            initial_scale: self.scale.wide_scale,
        }
    }
}

fn preferred_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|config| config.join(APP_NAME).join(SETTINGS_FILENAME))
}

/// Load settings from `explicit` if given, otherwise from the user config
/// directory. A missing default file is created with defaults; unreadable or
/// invalid files fall back to defaults.
#[must_use]
pub fn load_settings(explicit: Option<&Path>) -> Settings {
    if let Some(path) = explicit {
        return load_settings_from_path(path).unwrap_or_default();
    }

    let Some(path) = preferred_config_path() else {
        warn!("Could not determine config directory, using default settings");
        return Settings::default();
    };

    if path.exists() {
        load_settings_from_path(&path).unwrap_or_default()
    } else {
        info!("Settings file not found, creating with defaults at {path:?}");
        let settings = Settings::default();
        save_settings_to_file(&settings, &path);
        settings
    }
}

fn load_settings_from_path(path: &Path) -> Option<Settings> {
    match fs::read_to_string(path) {
        Ok(content) => match serde_yaml::from_str::<Settings>(&content) {
            Ok(mut settings) => {
                debug!("Loaded settings from {path:?}");

                if settings.version < CURRENT_VERSION {
                    migrate_settings(&mut settings);
                    save_settings_to_file(&settings, path);
                }
                Some(settings)
            }
            Err(e) => {
                error!("Failed to parse settings file {path:?}: {e}");
                None
            }
        },
        Err(e) => {
            error!("Failed to read settings file {path:?}: {e}");
            None
        }
    }
}

fn migrate_settings(settings: &mut Settings) {
    info!(
        "Migrating settings from v{} to v{}",
        settings.version, CURRENT_VERSION
    );
    settings.version = CURRENT_VERSION;
}

pub fn save_settings_to_file(settings: &Settings, path: &Path) {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            if let Err(e) = fs::create_dir_all(parent) {
                error!("Failed to create config directory {parent:?}: {e}");
                return;
            }
        }
    }

    let body = match serde_yaml::to_string(settings) {
        Ok(body) => body,
        Err(e) => {
            error!("Failed to serialize settings: {e}");
            return;
        }
    };
    let content = format!("{SETTINGS_HEADER}{body}");

    match fs::write(path, content) {
        Ok(()) => debug!("Saved settings to {path:?}"),
        Err(e) => error!("Failed to save settings to {path:?}: {e}"),
    }
}

const SETTINGS_HEADER: &str = "\
# biopsy-viewer settings
#
# catalog.mode: auth_token  - the patient key is an access token validated by the backend
#               direct_rut  - the patient key is the patient RUT
# scale: viewport widths below narrow_below / medium_below pick narrow_scale /
#        medium_scale, wider viewports use wide_scale
";
