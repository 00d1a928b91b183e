//! Render pipeline configuration

use std::fs;
use std::path::{Path, PathBuf};

use log::warn;
use serde::{Deserialize, Serialize};

const APP_NAME: &str = "folio";
const CONFIG_FILENAME: &str = "config.yaml";

/// Tunables for the render service
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Byte budget for the rendered-page cache
    #[serde(default = "default_cache_budget")]
    pub cache_budget_bytes: usize,

    /// Lookahead/lookbehind, in viewport heights on each side
    #[serde(default = "default_buffer_pages")]
    pub buffer_pages: u32,

    /// Device pixel density multiplier applied to target resolutions
    #[serde(default = "default_device_pixel_scale")]
    pub device_pixel_scale: f32,

    /// Number of render worker threads
    #[serde(default = "default_workers")]
    pub workers: usize,
}

fn default_cache_budget() -> usize {
    24 * 1024 * 1024
}

fn default_buffer_pages() -> u32 {
    2
}

fn default_device_pixel_scale() -> f32 {
    1.0
}

fn default_workers() -> usize {
    2
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            cache_budget_bytes: default_cache_budget(),
            buffer_pages: default_buffer_pages(),
            device_pixel_scale: default_device_pixel_scale(),
            workers: default_workers(),
        }
    }
}

impl RenderConfig {
    /// Load configuration from a YAML file, falling back to defaults on a
    /// missing or malformed file (with a logged warning).
    #[must_use]
    pub fn load(path: &Path) -> Self {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("could not read config {}: {e}, using defaults", path.display());
                return Self::default();
            }
        };

        match serde_yaml::from_str::<Self>(&raw) {
            Ok(config) => config.sanitized(),
            Err(e) => {
                warn!("malformed config {}: {e}, using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Preferred config location under the user config directory
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_NAME).join(CONFIG_FILENAME))
    }

    /// Clamp out-of-range values to something workable
    #[must_use]
    pub fn sanitized(mut self) -> Self {
        self.workers = self.workers.max(1);
        if !self.device_pixel_scale.is_finite() || self.device_pixel_scale <= 0.0 {
            self.device_pixel_scale = default_device_pixel_scale();
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_sane() {
        let config = RenderConfig::default();
        assert_eq!(config.cache_budget_bytes, 24 * 1024 * 1024);
        assert_eq!(config.buffer_pages, 2);
        assert_eq!(config.workers, 2);
    }

    #[test]
    fn loads_partial_yaml_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "cache_budget_bytes: 1048576").unwrap();

        let config = RenderConfig::load(file.path());
        assert_eq!(config.cache_budget_bytes, 1 << 20);
        assert_eq!(config.buffer_pages, 2);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = RenderConfig::load(Path::new("/nonexistent/folio.yaml"));
        assert_eq!(config.workers, 2);
    }

    #[test]
    fn sanitize_repairs_bad_values() {
        let config = RenderConfig {
            workers: 0,
            device_pixel_scale: f32::NAN,
            ..Default::default()
        }
        .sanitized();
        assert_eq!(config.workers, 1);
        assert_eq!(config.device_pixel_scale, 1.0);
    }
}
