//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$MAILARC_CONFIG` (environment variable)
//! 2. `~/.config/mailarc/config.toml` (Linux/macOS)
//!    `%APPDATA%\mailarc\config.toml` (Windows)
//! 3. Built-in defaults
//!
//! CLI flags always win over the file; the file wins over defaults.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::style::StyleConfig;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General behavior settings.
    pub general: GeneralConfig,
    /// Default page style.
    pub style: StyleSection,
    /// Embedding defaults.
    pub embed: EmbedConfig,
}

/// General behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
}

/// Default page style, overridable per run from the CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StyleSection {
    /// Regular TrueType font file.
    pub font: Option<PathBuf>,
    /// Bold TrueType font file for header labels.
    pub font_bold: Option<PathBuf>,
    /// ICC profile for the output intent.
    pub icc_profile: Option<PathBuf>,
    /// Body font size in points.
    pub font_size_pt: f32,
    /// Uniform page margin in millimetres.
    pub margins_mm: f32,
}

/// Embedding defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedConfig {
    /// Embed the raw source message.
    pub embed_original: bool,
    /// Embed inline parts as standalone attachments.
    pub embed_inline: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
        }
    }
}

impl Default for StyleSection {
    fn default() -> Self {
        let defaults = StyleConfig::default();
        Self {
            font: None,
            font_bold: None,
            icc_profile: None,
            font_size_pt: defaults.font_size_pt,
            margins_mm: defaults.margins_mm,
        }
    }
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self {
            embed_original: true,
            embed_inline: true,
        }
    }
}

impl Config {
    /// The style this configuration describes, before CLI overrides.
    pub fn style(&self) -> StyleConfig {
        StyleConfig {
            font_regular: self.style.font.clone(),
            font_bold: self.style.font_bold.clone(),
            font_size_pt: self.style.font_size_pt,
            margins_mm: self.style.margins_mm,
            icc_profile: self.style.icc_profile.clone(),
            embed_original: self.embed.embed_original,
            embed_inline_as_attachment: self.embed.embed_inline,
        }
    }
}

/// Load configuration, searching standard locations.
///
/// Returns the default configuration if no file is found or on parse error.
pub fn load_config() -> Config {
    if let Some(path) = config_file_path() {
        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(contents) => match toml::from_str::<Config>(&contents) {
                    Ok(cfg) => {
                        tracing::info!(path = %path.display(), "Loaded config");
                        return cfg;
                    }
                    Err(e) => {
                        tracing::warn!(
                            path = %path.display(),
                            error = %e,
                            "Failed to parse config, using defaults"
                        );
                    }
                },
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to read config file, using defaults"
                    );
                }
            }
        }
    }
    Config::default()
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var("MAILARC_CONFIG") {
        return Some(PathBuf::from(env_path));
    }
    dirs::config_dir().map(|d| d.join("mailarc").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = Config::default();
        assert_eq!(cfg.general.log_level, "warn");
        assert_eq!(cfg.style.font_size_pt, 11.0);
        assert_eq!(cfg.style.margins_mm, 20.0);
        assert!(cfg.embed.embed_original);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let partial = r#"
[style]
font_size_pt = 9.5

[embed]
embed_original = false
"#;
        let cfg: Config = toml::from_str(partial).expect("parse partial");
        assert_eq!(cfg.style.font_size_pt, 9.5);
        assert!(!cfg.embed.embed_original);
        // Other fields use defaults
        assert_eq!(cfg.general.log_level, "warn");
        assert_eq!(cfg.style.margins_mm, 20.0);
    }

    #[test]
    fn test_style_conversion() {
        let partial = r#"
[style]
font = "/fonts/body.ttf"
"#;
        let cfg: Config = toml::from_str(partial).expect("parse");
        let style = cfg.style();
        assert_eq!(style.font_regular, Some(PathBuf::from("/fonts/body.ttf")));
        assert!(style.embed_inline_as_attachment);
    }
}
