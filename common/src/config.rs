use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::camera::IntrinsicCameraParams;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub input: InputConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub filters: FiltersConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InputConfig {
    /// Directory holding the frames, processed in file-name order.
    pub dir: PathBuf,
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
    #[serde(default)]
    pub write_foreground: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            write_foreground: false,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FiltersConfig {
    #[serde(default)]
    pub swap: SwapConfig,
    #[serde(default)]
    pub bright_contrast: BrightContrastConfig,
    #[serde(default)]
    pub border: BorderConfig,
    #[serde(default)]
    pub calib: CalibConfig,
    #[serde(default)]
    pub background: BackgroundConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SwapConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub horizontally: bool,
    #[serde(default)]
    pub vertically: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BrightContrastConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub brightness: f64,
    #[serde(default)]
    pub contrast: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BorderConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub size: i32,
    #[serde(default = "default_border_color")]
    pub red: i32,
    #[serde(default = "default_border_color")]
    pub green: i32,
    #[serde(default = "default_border_color")]
    pub blue: i32,
}

impl Default for BorderConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            size: 0,
            red: default_border_color(),
            green: default_border_color(),
            blue: default_border_color(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CalibConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub intrinsics: IntrinsicCameraParams,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackgroundConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_update")]
    pub update: bool,
    /// Model to load before the first frame.
    #[serde(default)]
    pub load_from: Option<PathBuf>,
    /// Where to store the model after the last frame.
    #[serde(default)]
    pub save_to: Option<PathBuf>,
    #[serde(default = "default_min_foreground_area")]
    pub min_foreground_area: u32,
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            update: default_update(),
            load_from: None,
            save_to: None,
            min_foreground_area: default_min_foreground_area(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFile(path.display().to_string(), e))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    ReadFile(String, std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(String),
}

// Default value functions
fn default_extensions() -> Vec<String> {
    vec!["png".into(), "jpg".into(), "jpeg".into(), "bmp".into()]
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("filtered")
}
fn default_border_color() -> i32 {
    0
}
fn default_update() -> bool {
    true
}
fn default_min_foreground_area() -> u32 {
    1000
}
fn default_log_level() -> String {
    "info".into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config() {
        let config = Config::parse("[input]\ndir = \"frames\"\n").unwrap();
        assert_eq!(config.input.dir, PathBuf::from("frames"));
        assert_eq!(config.input.extensions.len(), 4);
        assert_eq!(config.output.dir, PathBuf::from("filtered"));
        assert!(!config.output.write_foreground);
        assert!(!config.filters.swap.enabled);
        assert!(!config.filters.bright_contrast.enabled);
        assert!(!config.filters.border.enabled);
        assert!(!config.filters.calib.enabled);
        assert!(!config.filters.background.enabled);
        assert!(config.filters.background.update);
        assert_eq!(config.filters.background.min_foreground_area, 1000);
        assert_eq!(config.filters.calib.intrinsics.fx, 881.0);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn filter_sections() {
        let config = Config::parse(
            r#"
            [input]
            dir = "in"

            [filters.bright_contrast]
            enabled = true
            brightness = 20.0
            contrast = -10.0

            [filters.border]
            enabled = true
            size = 8
            red = 255

            [filters.calib]
            enabled = true
            intrinsics = { fx = 1200.0, cx = 640.0, distortion = { k1 = -0.1 } }

            [filters.background]
            enabled = true
            update = false
            save_to = "bg.json"

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();

        assert_eq!(config.filters.bright_contrast.brightness, 20.0);
        assert_eq!(config.filters.bright_contrast.contrast, -10.0);
        assert_eq!(config.filters.border.size, 8);
        assert_eq!(config.filters.border.red, 255);
        assert_eq!(config.filters.border.green, 0);
        assert_eq!(config.filters.calib.intrinsics.fx, 1200.0);
        assert_eq!(config.filters.calib.intrinsics.fy, 881.0);
        assert_eq!(config.filters.calib.intrinsics.distortion.k1, -0.1);
        assert!(!config.filters.background.update);
        assert_eq!(
            config.filters.background.save_to,
            Some(PathBuf::from("bg.json"))
        );
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn missing_input_is_a_parse_error() {
        assert!(matches!(
            Config::parse("[logging]\nlevel = \"warn\"\n"),
            Err(ConfigError::Parse(_))
        ));
    }
}
