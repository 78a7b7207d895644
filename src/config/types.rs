use serde::Deserialize;
use std::path::Path;

use super::color::Color;
use crate::renderer::texture_atlas::INITIAL_GLYPH_CAPACITY;
use crate::window::WindowOptions;

/// Default config printed by `--print-default-config`.
const DEFAULT_CONFIG_TOML: &str = r##"# glyphgrid configuration

[window]
title = "glyphgrid"
width = 1024.0
height = 640.0
# x = 200
# y = 200

[colors]
foreground = "#E8E5DF"
background = "#1A1816"

[font]
family = "monospace"
size = 14.0

[atlas]
initial_glyph_capacity = 1024
"##;

/// Top-level application configuration.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Config {
    pub window: WindowSection,
    pub colors: ColorsConfig,
    pub font: FontConfig,
    pub atlas: AtlasConfig,
}

/// Window placement and title.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowSection {
    pub title: String,
    pub width: f64,
    pub height: f64,
    pub position: Option<(i32, i32)>,
}

/// Default cell colors.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorsConfig {
    pub foreground: Color,
    pub background: Color,
}

/// Font configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct FontConfig {
    pub family: String,
    pub size: f64,
}

/// Glyph atlas sizing.
#[derive(Debug, Clone, PartialEq)]
pub struct AtlasConfig {
    pub initial_glyph_capacity: usize,
}

/// Errors that can occur during config loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("validation error: {0}")]
    Validation(String),
}

// ── Serde intermediate structs ──────────────────────────────────────────

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawConfig {
    window: RawWindowConfig,
    colors: RawColorsConfig,
    font: RawFontConfig,
    atlas: RawAtlasConfig,
}

#[derive(Deserialize)]
#[serde(default)]
struct RawWindowConfig {
    title: String,
    width: f64,
    height: f64,
    x: Option<i32>,
    y: Option<i32>,
}

impl Default for RawWindowConfig {
    fn default() -> Self {
        let defaults = WindowSection::default();
        Self {
            title: defaults.title,
            width: defaults.width,
            height: defaults.height,
            x: None,
            y: None,
        }
    }
}

#[derive(Deserialize)]
#[serde(default)]
struct RawColorsConfig {
    foreground: String,
    background: String,
}

impl Default for RawColorsConfig {
    fn default() -> Self {
        Self {
            foreground: "#E8E5DF".to_string(),
            background: "#1A1816".to_string(),
        }
    }
}

#[derive(Deserialize)]
#[serde(default)]
struct RawFontConfig {
    family: String,
    size: f64,
}

impl Default for RawFontConfig {
    fn default() -> Self {
        Self {
            family: "monospace".to_string(),
            size: 14.0,
        }
    }
}

#[derive(Deserialize)]
#[serde(default)]
struct RawAtlasConfig {
    initial_glyph_capacity: usize,
}

impl Default for RawAtlasConfig {
    fn default() -> Self {
        Self {
            initial_glyph_capacity: INITIAL_GLYPH_CAPACITY,
        }
    }
}

// ── Default impls ───────────────────────────────────────────────────────

impl Default for WindowSection {
    fn default() -> Self {
        Self {
            title: "glyphgrid".to_string(),
            width: 1024.0,
            height: 640.0,
            position: None,
        }
    }
}

impl Default for ColorsConfig {
    fn default() -> Self {
        Self {
            foreground: Color::new(0xE8 as f32 / 255.0, 0xE5 as f32 / 255.0, 0xDF as f32 / 255.0, 1.0),
            background: Color::new(0x1A as f32 / 255.0, 0x18 as f32 / 255.0, 0x16 as f32 / 255.0, 1.0),
        }
    }
}

impl Default for FontConfig {
    fn default() -> Self {
        Self {
            family: "monospace".to_string(),
            size: 14.0,
        }
    }
}

impl Default for AtlasConfig {
    fn default() -> Self {
        Self {
            initial_glyph_capacity: INITIAL_GLYPH_CAPACITY,
        }
    }
}

// ── Config implementation ───────────────────────────────────────────────

impl Config {
    /// Load config from a TOML file path. Returns defaults if file does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_toml(&contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("No config file at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(ConfigError::Io(e)),
        }
    }

    /// Parse a TOML string into a Config.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig =
            toml::from_str(toml_str).map_err(|e| ConfigError::Parse(e.to_string()))?;

        let position = match (raw.window.x, raw.window.y) {
            (Some(x), Some(y)) => Some((x, y)),
            (None, None) => None,
            _ => {
                return Err(ConfigError::Validation(
                    "window x and y must be given together".to_string(),
                ))
            }
        };

        let parse_color = |field: &str, value: &str| {
            Color::from_hex(value)
                .map_err(|e| ConfigError::Validation(format!("colors.{field}: {e}")))
        };

        let config = Self {
            window: WindowSection {
                title: raw.window.title,
                width: raw.window.width,
                height: raw.window.height,
                position,
            },
            colors: ColorsConfig {
                foreground: parse_color("foreground", &raw.colors.foreground)?,
                background: parse_color("background", &raw.colors.background)?,
            },
            font: FontConfig {
                family: raw.font.family,
                size: raw.font.size,
            },
            atlas: AtlasConfig {
                initial_glyph_capacity: raw.atlas.initial_glyph_capacity,
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the config, returning an error if any values are out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.font.size.is_finite() || self.font.size <= 0.0 {
            return Err(ConfigError::Validation("font size must be finite and > 0".to_string()));
        }

        let valid_extent = |v: f64| v.is_finite() && v >= 1.0;
        if !valid_extent(self.window.width) || !valid_extent(self.window.height) {
            return Err(ConfigError::Validation(
                "window width and height must be finite and >= 1".to_string(),
            ));
        }

        if self.atlas.initial_glyph_capacity == 0 {
            return Err(ConfigError::Validation(
                "atlas initial_glyph_capacity must be > 0".to_string(),
            ));
        }

        Ok(())
    }

    /// The default configuration as commented TOML.
    pub fn print_default() -> &'static str {
        DEFAULT_CONFIG_TOML
    }

    /// Window construction options derived from this config.
    pub fn window_options(&self) -> WindowOptions {
        WindowOptions {
            fg: Some(self.colors.foreground),
            bg: Some(self.colors.background),
            title: Some(self.window.title.clone()),
            position: self.window.position,
            size: Some((self.window.width, self.window.height)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    // ── Default tests ───────────────────────────────────────────────

    #[test]
    fn default_font() {
        let config = Config::default();
        assert_eq!(config.font.size, 14.0);
        assert_eq!(config.font.family, "monospace");
    }

    #[test]
    fn default_window() {
        let config = Config::default();
        assert_eq!(config.window.title, "glyphgrid");
        assert_eq!(config.window.position, None);
    }

    #[test]
    fn default_atlas_capacity() {
        let config = Config::default();
        assert_eq!(config.atlas.initial_glyph_capacity, 1024);
    }

    #[test]
    fn default_colors_match_default_toml() {
        let parsed = Config::from_toml(Config::print_default()).unwrap();
        assert_eq!(parsed, Config::default());
    }

    // ── TOML parsing tests ──────────────────────────────────────────

    #[test]
    fn parse_complete_toml() {
        let toml = r##"
[window]
title = "demo"
width = 800.0
height = 600.0
x = 200
y = 100

[colors]
foreground = "#66FF00"
background = "#000000"

[font]
family = "JetBrains Mono"
size = 16.0

[atlas]
initial_glyph_capacity = 256
"##;
        let config = Config::from_toml(toml).unwrap();
        assert_eq!(config.window.title, "demo");
        assert_eq!(config.window.width, 800.0);
        assert_eq!(config.window.position, Some((200, 100)));
        assert_eq!(config.colors.foreground, Color::from_hex("#66FF00").unwrap());
        assert_eq!(config.colors.background, Color::BLACK);
        assert_eq!(config.font.family, "JetBrains Mono");
        assert_eq!(config.font.size, 16.0);
        assert_eq!(config.atlas.initial_glyph_capacity, 256);
    }

    #[test]
    fn parse_partial_toml_uses_defaults() {
        let toml = r#"
[font]
size = 18.0
"#;
        let config = Config::from_toml(toml).unwrap();
        assert_eq!(config.font.size, 18.0);
        assert_eq!(config.font.family, "monospace");
        assert_eq!(config.window, WindowSection::default());
        assert_eq!(config.atlas.initial_glyph_capacity, 1024);
    }

    #[test]
    fn parse_empty_toml_uses_all_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn parse_unknown_keys_ignored() {
        let toml = r#"
[font]
size = 14.0
unknown_key = "value"

[unknown_section]
foo = "bar"
"#;
        let config = Config::from_toml(toml).unwrap();
        assert_eq!(config.font.size, 14.0);
    }

    #[test]
    fn parse_malformed_toml_is_parse_error() {
        let result = Config::from_toml("[font\nsize = ");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    // ── Validation tests ────────────────────────────────────────────

    #[test]
    fn invalid_zero_font_size() {
        let toml = r#"
[font]
size = 0.0
"#;
        assert!(Config::from_toml(toml).is_err());
    }

    #[test]
    fn invalid_nan_font_size() {
        let toml = r#"
[font]
size = nan
"#;
        assert!(matches!(
            Config::from_toml(toml),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn invalid_infinite_width() {
        let toml = r#"
[window]
width = inf
"#;
        assert!(matches!(
            Config::from_toml(toml),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn invalid_nan_height() {
        let mut config = Config::default();
        config.window.height = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn invalid_color() {
        let toml = r#"
[colors]
foreground = "green"
"#;
        let err = Config::from_toml(toml).unwrap_err();
        assert!(format!("{err}").contains("colors.foreground"));
    }

    #[test]
    fn invalid_half_position() {
        let toml = r#"
[window]
x = 10
"#;
        assert!(matches!(
            Config::from_toml(toml),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn invalid_zero_capacity() {
        let toml = r#"
[atlas]
initial_glyph_capacity = 0
"#;
        assert!(Config::from_toml(toml).is_err());
    }

    // ── Window options ──────────────────────────────────────────────

    #[test]
    fn window_options_carry_config_values() {
        let mut config = Config::default();
        config.window.position = Some((5, 6));
        let options = config.window_options();
        assert_eq!(options.fg, Some(config.colors.foreground));
        assert_eq!(options.bg, Some(config.colors.background));
        assert_eq!(options.title.as_deref(), Some("glyphgrid"));
        assert_eq!(options.position, Some((5, 6)));
    }

    // ── File loading tests ──────────────────────────────────────────

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("glyphgrid.toml");
        {
            let mut f = std::fs::File::create(&path).unwrap();
            f.write_all(b"[font]\nsize = 20.0\n").unwrap();
        }
        let config = Config::load(&path).unwrap();
        assert_eq!(config.font.size, 20.0);
        assert_eq!(config.window.title, "glyphgrid");
    }

    #[test]
    fn load_missing_file_returns_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.toml");
        let config = Config::load(&path).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn config_error_display() {
        let err = ConfigError::Validation("font size must be finite and > 0".to_string());
        assert!(format!("{err}").contains("font size must be finite and > 0"));
    }
}
