use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, RwLock};

use crate::engine::EngineConfig;
use crate::render::{DEFAULT_CACHE_SIZE, DEFAULT_WORKERS};

pub const CURRENT_VERSION: u32 = 2;
const SETTINGS_FILENAME: &str = "config.yaml";
const APP_NAME: &str = "stampdesk";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default = "default_padding")]
    pub padding: f32,

    #[serde(default = "default_padding")]
    pub row_gap: f32,

    #[serde(default = "default_initial_zoom")]
    pub initial_zoom: f32,

    #[serde(default = "default_min_zoom")]
    pub min_zoom: f32,

    #[serde(default = "default_max_zoom")]
    pub max_zoom: f32,

    #[serde(default = "default_zoom_step")]
    pub zoom_step: f32,

    #[serde(default = "default_stamp_width")]
    pub stamp_width: f32,

    #[serde(default = "default_min_scale")]
    pub min_scale: f32,

    #[serde(default = "default_max_scale")]
    pub max_scale: f32,

    #[serde(default = "default_padding")]
    pub duplicate_offset: f32,

    #[serde(default = "default_autoscroll_border")]
    pub autoscroll_border: f32,

    #[serde(default = "default_autoscroll_step")]
    pub autoscroll_step: f32,

    #[serde(default = "default_workers")]
    pub render_workers: usize,

    #[serde(default = "default_cache_size")]
    pub page_cache_size: usize,

    #[serde(default = "default_viewport_width")]
    pub viewport_width: f32,

    #[serde(default = "default_viewport_height")]
    pub viewport_height: f32,

    #[serde(default = "default_pixel_density")]
    pub pixel_density: f32,
}

fn default_version() -> u32 {
    CURRENT_VERSION
}

fn default_padding() -> f32 {
    10.0
}

fn default_initial_zoom() -> f32 {
    100.0
}

fn default_min_zoom() -> f32 {
    10.0
}

fn default_max_zoom() -> f32 {
    1000.0
}

fn default_zoom_step() -> f32 {
    10.0
}

fn default_stamp_width() -> f32 {
    100.0
}

fn default_min_scale() -> f32 {
    0.2
}

fn default_max_scale() -> f32 {
    5.0
}

fn default_autoscroll_border() -> f32 {
    32.0
}

fn default_autoscroll_step() -> f32 {
    12.0
}

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

fn default_cache_size() -> usize {
    DEFAULT_CACHE_SIZE
}

fn default_viewport_width() -> f32 {
    1024.0
}

fn default_viewport_height() -> f32 {
    768.0
}

fn default_pixel_density() -> f32 {
    1.0
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            padding: default_padding(),
            row_gap: default_padding(),
            initial_zoom: default_initial_zoom(),
            min_zoom: default_min_zoom(),
            max_zoom: default_max_zoom(),
            zoom_step: default_zoom_step(),
            stamp_width: default_stamp_width(),
            min_scale: default_min_scale(),
            max_scale: default_max_scale(),
            duplicate_offset: default_padding(),
            autoscroll_border: default_autoscroll_border(),
            autoscroll_step: default_autoscroll_step(),
            render_workers: default_workers(),
            page_cache_size: default_cache_size(),
            viewport_width: default_viewport_width(),
            viewport_height: default_viewport_height(),
            pixel_density: default_pixel_density(),
        }
    }
}

impl Settings {
    /// Engine tunables described by these settings
    #[must_use]
    pub fn engine_config(&self) -> EngineConfig {
        let defaults = EngineConfig::default();
        let (min_zoom, max_zoom) = ordered(self.min_zoom, self.max_zoom);
        let (min_scale, max_scale) = ordered(self.min_scale, self.max_scale);
        EngineConfig {
            padding: self.padding.max(0.0),
            row_gap: self.row_gap.max(0.0),
            initial_zoom: self.initial_zoom.clamp(min_zoom, max_zoom),
            min_zoom,
            max_zoom,
            zoom_step: self.zoom_step.max(1.0),
            stamp_width: self.stamp_width.max(1.0),
            default_stamp_position: defaults.default_stamp_position,
            min_scale,
            max_scale,
            duplicate_offset: self.duplicate_offset,
            autoscroll_border: self.autoscroll_border.max(0.0),
            autoscroll_step: self.autoscroll_step.max(0.0),
        }
    }
}

fn ordered(a: f32, b: f32) -> (f32, f32) {
    if a <= b { (a, b) } else { (b, a) }
}

static SETTINGS: LazyLock<RwLock<Settings>> = LazyLock::new(|| RwLock::new(Settings::default()));

fn preferred_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|config| config.join(APP_NAME).join(SETTINGS_FILENAME))
}

pub fn load_settings() {
    let Some(path) = preferred_config_path() else {
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

/// Replace the global settings with the contents of `path`.
///
/// Parse or read failures are logged and leave the current settings in place.
pub fn load_settings_from_path(path: &Path) {
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

    // v1 stored a single `padding` used for the page gap too
    if settings.version < 2 && settings.row_gap <= 0.0 {
        settings.row_gap = settings.padding;
    }

    settings.version = CURRENT_VERSION;
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
    let mut content = String::new();

    content.push_str(&format!("version: {}\n", settings.version));
    content.push_str(LAYOUT_HEADER);
    content.push_str(&format!("padding: {}\n", settings.padding));
    content.push_str(&format!("row_gap: {}\n", settings.row_gap));
    content.push_str(&format!("initial_zoom: {}\n", settings.initial_zoom));
    content.push_str(&format!("min_zoom: {}\n", settings.min_zoom));
    content.push_str(&format!("max_zoom: {}\n", settings.max_zoom));
    content.push_str(&format!("zoom_step: {}\n", settings.zoom_step));
    content.push('\n');

    content.push_str(STAMP_HEADER);
    content.push_str(&format!("stamp_width: {}\n", settings.stamp_width));
    content.push_str(&format!("min_scale: {}\n", settings.min_scale));
    content.push_str(&format!("max_scale: {}\n", settings.max_scale));
    content.push_str(&format!("duplicate_offset: {}\n", settings.duplicate_offset));
    content.push_str(&format!("autoscroll_border: {}\n", settings.autoscroll_border));
    content.push_str(&format!("autoscroll_step: {}\n", settings.autoscroll_step));
    content.push('\n');

    content.push_str(RENDER_HEADER);
    content.push_str(&format!("render_workers: {}\n", settings.render_workers));
    content.push_str(&format!("page_cache_size: {}\n", settings.page_cache_size));
    content.push_str(&format!("viewport_width: {}\n", settings.viewport_width));
    content.push_str(&format!("viewport_height: {}\n", settings.viewport_height));
    content.push_str(&format!("pixel_density: {}\n", settings.pixel_density));

    content
}

const LAYOUT_HEADER: &str = r#"
# ============================================================================
# Page column
# ============================================================================
# Distances are CSS pixels; zoom values are percent of fit-to-width.
"#;

const STAMP_HEADER: &str = r#"# ============================================================================
# Stamps
# ============================================================================
# stamp_width is the width of a stamp at scale 1, in document units.
"#;

const RENDER_HEADER: &str = r#"# ============================================================================
# Rendering
# ============================================================================
# Viewport values are used by the command line tools, which have no window.
"#;

// Public API for accessing settings

pub fn current() -> Settings {
    SETTINGS.read().map(|s| s.clone()).unwrap_or_default()
}

pub fn engine_config() -> EngineConfig {
    SETTINGS
        .read()
        .map(|s| s.engine_config())
        .unwrap_or_default()
}

pub fn get_render_workers() -> usize {
    SETTINGS
        .read()
        .map(|s| s.render_workers.max(1))
        .unwrap_or_else(|_| default_workers())
}

pub fn get_page_cache_size() -> usize {
    SETTINGS
        .read()
        .map(|s| s.page_cache_size.max(1))
        .unwrap_or_else(|_| default_cache_size())
}

/// Viewport `(width, height, pixel_density)` used without a window
pub fn get_default_viewport() -> (f32, f32, f32) {
    SETTINGS
        .read()
        .map(|s| (s.viewport_width, s.viewport_height, s.pixel_density))
        .unwrap_or_else(|_| {
            (
                default_viewport_width(),
                default_viewport_height(),
                default_pixel_density(),
            )
        })
}

pub fn reset_to_defaults() {
    if let Ok(mut settings) = SETTINGS.write() {
        *settings = Settings::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn generated_yaml_parses_back() {
        let mut settings = Settings::default();
        settings.zoom_step = 25.0;
        settings.render_workers = 4;

        let yaml = generate_settings_yaml(&settings);
        let parsed: Settings = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, settings);
    }

    #[test]
    fn missing_keys_take_defaults() {
        let parsed: Settings = serde_yaml::from_str("version: 2\nstamp_width: 150\n").unwrap();
        assert_eq!(parsed.stamp_width, 150.0);
        assert_eq!(parsed.max_zoom, default_max_zoom());
        assert_eq!(parsed.render_workers, DEFAULT_WORKERS);
    }

    #[test]
    fn engine_config_orders_inverted_limits() {
        let settings = Settings {
            min_zoom: 400.0,
            max_zoom: 50.0,
            ..Settings::default()
        };
        let config = settings.engine_config();
        assert_eq!(config.min_zoom, 50.0);
        assert_eq!(config.max_zoom, 400.0);
        assert_eq!(config.initial_zoom, 100.0);
    }

    #[test]
    #[serial]
    fn load_from_path_replaces_globals_and_migrates() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "version: 1\npadding: 16\nrow_gap: 0\nrender_workers: 3\n").unwrap();

        load_settings_from_path(&path);
        assert_eq!(get_render_workers(), 3);
        assert_eq!(engine_config().row_gap, 16.0);

        let rewritten = fs::read_to_string(&path).unwrap();
        assert!(rewritten.starts_with(&format!("version: {CURRENT_VERSION}")));

        reset_to_defaults();
    }

    #[test]
    #[serial]
    fn unparsable_file_keeps_current_settings() {
        reset_to_defaults();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "padding: [not a number\n").unwrap();

        load_settings_from_path(&path);
        assert_eq!(current(), Settings::default());
    }
}
