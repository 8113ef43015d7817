use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, RwLock};

pub const CURRENT_VERSION: u32 = 1;
const SETTINGS_FILENAME: &str = "config.yaml";
const APP_NAME: &str = "folio";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_version")]
    pub version: u32,

    /// Threads rendering pixmaps off the owner thread
    #[serde(default = "default_render_workers")]
    pub render_workers: usize,

    /// Pixmap bytes kept before the oldest ones are unloaded
    #[serde(default = "default_memory_budget")]
    pub memory_budget_bytes: usize,

    #[serde(default = "default_history_size")]
    pub history_size: usize,

    /// Restore the last viewport when reopening a document
    #[serde(default = "default_true")]
    pub remember_viewport: bool,

    #[serde(default = "default_text_lines_per_page")]
    pub text_lines_per_page: usize,

    /// Draw word placeholders on plain text pages
    #[serde(default = "default_true")]
    pub text_word_boxes: bool,
}

fn default_true() -> bool {
    true
}

fn default_version() -> u32 {
    CURRENT_VERSION
}

fn default_render_workers() -> usize {
    2
}

fn default_memory_budget() -> usize {
    256 * 1024 * 1024
}

fn default_history_size() -> usize {
    100
}

fn default_text_lines_per_page() -> usize {
    50
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            render_workers: default_render_workers(),
            memory_budget_bytes: default_memory_budget(),
            history_size: default_history_size(),
            remember_viewport: true,
            text_lines_per_page: default_text_lines_per_page(),
            text_word_boxes: true,
        }
    }
}

static SETTINGS: LazyLock<RwLock<Settings>> = LazyLock::new(|| RwLock::new(Settings::default()));
static CONFIG_PATH_OVERRIDE: LazyLock<RwLock<Option<PathBuf>>> = LazyLock::new(|| RwLock::new(None));

fn preferred_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|config| config.join(APP_NAME).join(SETTINGS_FILENAME))
}

/// Use `path` instead of the per-user config file (None restores the default)
pub fn set_config_path(path: Option<PathBuf>) {
    if let Ok(mut current) = CONFIG_PATH_OVERRIDE.write() {
        *current = path;
    }
}

pub fn config_path() -> Option<PathBuf> {
    CONFIG_PATH_OVERRIDE
        .read()
        .ok()
        .and_then(|p| p.clone())
        .or_else(preferred_config_path)
}

pub fn load_settings() {
    let Some(path) = config_path() else {
        warn!("Could not determine config directory, using default settings");
        return;
    };
    if path.exists() {
        load_settings_from_path(&path);
    } else {
        info!("Settings file not found, creating with defaults at {path:?}");
        if let Ok(settings) = SETTINGS.read() {
            save_settings_to_file(&settings, &path);
        }
    }
}

/// Re-read the settings file; true if any value changed
pub fn reload_settings() -> bool {
    let before = current();
    load_settings();
    before != current()
}

fn load_settings_from_path(path: &Path) {
    match fs::read_to_string(path) {
        Ok(content) => match serde_yaml::from_str::<Settings>(&content) {
            Ok(mut settings) => {
                debug!("Loaded settings from {path:?}");

                if settings.version < CURRENT_VERSION {
                    migrate_settings(&mut settings);
                    save_settings_to_file(&settings, path);
                }

                if let Ok(mut global) = SETTINGS.write() {
                    *global = settings;
                }
            }
            Err(e) => {
                error!("Failed to parse settings file {path:?}: {e}");
            }
        },
        Err(e) => {
            error!("Failed to read settings file {path:?}: {e}");
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

pub fn save_settings() {
    let Some(path) = config_path() else {
        warn!("Could not determine config directory, cannot save settings");
        return;
    };

    if let Ok(settings) = SETTINGS.read() {
        save_settings_to_file(&settings, &path);
    }
}

fn save_settings_to_file(settings: &Settings, path: &Path) {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            if let Err(e) = fs::create_dir_all(parent) {
                error!("Failed to create config directory {parent:?}: {e}");
                return;
            }
        }
    }

    let content = generate_settings_yaml(settings);

    match fs::write(path, content) {
        Ok(()) => debug!("Saved settings to {path:?}"),
        Err(e) => error!("Failed to save settings to {path:?}: {e}"),
    }
}

fn generate_settings_yaml(settings: &Settings) -> String {
    let mut content = String::from(SETTINGS_HEADER);

    content.push_str(&format!("version: {}\n", settings.version));
    content.push_str(&format!("render_workers: {}\n", settings.render_workers));
    content.push_str(&format!(
        "memory_budget_bytes: {}\n",
        settings.memory_budget_bytes
    ));
    content.push_str(&format!("history_size: {}\n", settings.history_size));
    content.push_str(&format!(
        "remember_viewport: {}\n",
        settings.remember_viewport
    ));
    content.push_str(&format!(
        "text_lines_per_page: {}\n",
        settings.text_lines_per_page
    ));
    content.push_str(&format!("text_word_boxes: {}\n", settings.text_word_boxes));

    content
}

const SETTINGS_HEADER: &str = r#"# ============================================================================
# folio settings
# ============================================================================
# render_workers:       threads rendering pages in the background
# memory_budget_bytes:  rendered pixmaps kept before the oldest are unloaded
# history_size:         viewports remembered for back/forward navigation
# remember_viewport:    reopen documents where they were left
# text_lines_per_page:  pagination of plain text documents
# text_word_boxes:      draw word placeholders on plain text pages

"#;

// Public API for accessing/modifying settings

/// Snapshot of the current settings
pub fn current() -> Settings {
    SETTINGS
        .read()
        .map(|s| s.clone())
        .unwrap_or_default()
}

/// Replace the in-memory settings without touching the file
pub fn replace(settings: Settings) {
    if let Ok(mut global) = SETTINGS.write() {
        *global = settings;
    }
}

pub fn get_history_size() -> usize {
    SETTINGS
        .read()
        .map(|s| s.history_size)
        .unwrap_or_else(|_| default_history_size())
}

pub fn get_text_lines_per_page() -> usize {
    SETTINGS
        .read()
        .map(|s| s.text_lines_per_page)
        .unwrap_or_else(|_| default_text_lines_per_page())
}

pub fn get_text_word_boxes() -> bool {
    SETTINGS.read().map(|s| s.text_word_boxes).unwrap_or(true)
}
