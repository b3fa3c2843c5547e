//! Kernel configuration (layered: code > env > config file > defaults).

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::action_parser::{ActionParserConfig, GrammarMode, ModelVersion};
use crate::engine::EngineKind;
use crate::error::TarkoError;

const ENV_MAX_ITERATIONS: &str = "TARKO_MAX_ITERATIONS";
const ENV_TOOL_CALL_ENGINE: &str = "TARKO_TOOL_CALL_ENGINE";
const ENV_MAX_IMAGES: &str = "TARKO_MAX_IMAGES";
const ENV_GUI_FACTORS: &str = "TARKO_GUI_FACTORS";
const ENV_GUI_MODEL_VERSION: &str = "TARKO_GUI_MODEL_VERSION";
const ENV_GUI_MODE: &str = "TARKO_GUI_MODE";
const ENV_GUI_SCALE_FACTOR: &str = "TARKO_GUI_SCALE_FACTOR";

/// Whether verbose per-iteration diagnostics are enabled (`TARKO_DEBUG=1`).
pub(crate) fn debug_enabled() -> bool {
    matches!(std::env::var("TARKO_DEBUG").as_deref(), Ok("1"))
}

/// Settings for agents and the GUI action parser.
///
/// ```toml
/// max_iterations = 40
/// tool_call_engine = "gui"
///
/// [gui]
/// factors = [1000.0, 1000.0]
/// model_version = "v1.5"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Model turns per run before the run ends with `length`.
    pub max_iterations: usize,
    pub tool_call_engine: EngineKind,
    /// Most recent environment screenshots replayed to the model.
    pub max_images: usize,
    pub gui: ActionParserConfig,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            tool_call_engine: EngineKind::Native,
            max_images: 5,
            gui: ActionParserConfig::default(),
        }
    }
}

impl KernelConfig {
    /// `<config_dir>/tarko/config.toml`.
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("", "", "tarko")
            .map(|dirs| dirs.config_dir().join("config.toml"))
            .unwrap_or_else(|| PathBuf::from(".tarko").join("config.toml"))
    }

    /// Parse a TOML config file. Missing keys keep their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, TarkoError> {
        let raw = fs::read_to_string(path.as_ref())?;
        let config: Self = toml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by `TARKO_*` variables (`.env` is loaded first).
    pub fn from_env() -> Result<Self, TarkoError> {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        Self::default().with_env(|key| std::env::var(key).ok())
    }

    /// Defaults, then the default config file if present, then the environment.
    pub fn load() -> Result<Self, TarkoError> {
        let _ = dotenvy::dotenv();
        let path = Self::default_path();
        let base = if path.exists() {
            tracing::debug!(path = %path.display(), "loading config file");
            Self::from_file(&path)?
        } else {
            Self::default()
        };
        base.with_env(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup` (an environment accessor).
    pub fn with_env<F>(mut self, lookup: F) -> Result<Self, TarkoError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_MAX_ITERATIONS) {
            self.max_iterations = parse_env(ENV_MAX_ITERATIONS, &value)?;
        }
        if let Some(value) = lookup(ENV_TOOL_CALL_ENGINE) {
            self.tool_call_engine = parse_env(ENV_TOOL_CALL_ENGINE, &value)?;
        }
        if let Some(value) = lookup(ENV_MAX_IMAGES) {
            self.max_images = parse_env(ENV_MAX_IMAGES, &value)?;
        }
        if let Some(value) = lookup(ENV_GUI_FACTORS) {
            self.gui.factors = parse_factors(&value)?;
        }
        if let Some(value) = lookup(ENV_GUI_MODEL_VERSION) {
            self.gui.model_version = parse_env::<ModelVersion>(ENV_GUI_MODEL_VERSION, &value)?;
        }
        if let Some(value) = lookup(ENV_GUI_MODE) {
            self.gui.mode = parse_env::<GrammarMode>(ENV_GUI_MODE, &value)?;
        }
        if let Some(value) = lookup(ENV_GUI_SCALE_FACTOR) {
            self.gui.scale_factor = parse_env(ENV_GUI_SCALE_FACTOR, &value)?;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), TarkoError> {
        if self.max_iterations == 0 {
            return Err(TarkoError::Configuration(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        if self.gui.factors.iter().any(|f| !f.is_finite() || *f <= 0.0) {
            return Err(TarkoError::Configuration(format!(
                "gui.factors must be positive, got {:?}",
                self.gui.factors
            )));
        }
        if !self.gui.scale_factor.is_finite() || self.gui.scale_factor <= 0.0 {
            return Err(TarkoError::Configuration(format!(
                "gui.scale_factor must be positive, got {}",
                self.gui.scale_factor
            )));
        }
        let resize = &self.gui.smart_resize;
        if resize.factor == 0 || resize.min_pixels > resize.max_pixels || resize.max_ratio < 1.0 {
            return Err(TarkoError::Configuration(
                "gui.smart_resize bounds are inconsistent".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_env<T>(key: &str, value: &str) -> Result<T, TarkoError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|err| TarkoError::Configuration(format!("{key}={value:?}: {err}")))
}

/// `"1000,1000"` into `[1000.0, 1000.0]`.
pub fn parse_factors(value: &str) -> Result<[f64; 2], TarkoError> {
    let parts: Vec<&str> = value.split(',').map(str::trim).collect();
    let [width, height] = parts.as_slice() else {
        return Err(TarkoError::Configuration(format!(
            "factors must be \"<width>,<height>\", got {value:?}"
        )));
    };
    Ok([
        parse_env(ENV_GUI_FACTORS, width)?,
        parse_env(ENV_GUI_FACTORS, height)?,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        let config = KernelConfig::default();
        assert_eq!(config.max_iterations, 100);
        assert_eq!(config.max_images, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn env_overrides_defaults() {
        let config = KernelConfig::default()
            .with_env(env(&[
                ("TARKO_MAX_ITERATIONS", "7"),
                ("TARKO_TOOL_CALL_ENGINE", "gui_marker"),
                ("TARKO_GUI_FACTORS", "1280, 720"),
                ("TARKO_GUI_MODEL_VERSION", "v1.5"),
                ("TARKO_GUI_MODE", "o1"),
                ("TARKO_GUI_SCALE_FACTOR", "2"),
            ]))
            .unwrap();
        assert_eq!(config.max_iterations, 7);
        assert_eq!(config.tool_call_engine, EngineKind::GuiMarker);
        assert_eq!(config.gui.factors, [1280.0, 720.0]);
        assert_eq!(config.gui.model_version, ModelVersion::V1_5);
        assert_eq!(config.gui.mode, GrammarMode::O1);
        assert_eq!(config.gui.scale_factor, 2.0);
    }

    #[test]
    fn malformed_values_are_configuration_errors() {
        let err = KernelConfig::default()
            .with_env(env(&[("TARKO_GUI_FACTORS", "1000")]))
            .unwrap_err();
        assert!(matches!(err, TarkoError::Configuration(_)));

        let err = KernelConfig::default()
            .with_env(env(&[("TARKO_MAX_ITERATIONS", "0")]))
            .unwrap_err();
        assert!(err.to_string().contains("max_iterations"));

        let err = KernelConfig::default()
            .with_env(env(&[("TARKO_TOOL_CALL_ENGINE", "telepathy")]))
            .unwrap_err();
        assert!(err.to_string().contains("TARKO_TOOL_CALL_ENGINE"));
    }

    #[test]
    fn file_values_merge_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "max_iterations = 12\ntool_call_engine = \"gui\"\n\n[gui]\nfactors = [1920.0, 1080.0]\nmodel_version = \"v1.5\""
        )
        .unwrap();

        let config = KernelConfig::from_file(file.path()).unwrap();
        assert_eq!(config.max_iterations, 12);
        assert_eq!(config.tool_call_engine, EngineKind::Gui);
        assert_eq!(config.gui.factors, [1920.0, 1080.0]);
        assert_eq!(config.gui.model_version, ModelVersion::V1_5);
        assert_eq!(config.gui.scale_factor, 1.0);
        assert_eq!(config.max_images, 5);
    }

    #[test]
    fn invalid_toml_is_a_config_file_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_iterations = \"many\"").unwrap();
        let err = KernelConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, TarkoError::ConfigFile(_)));
    }

    #[test]
    fn default_path_ends_with_config_toml() {
        let path = KernelConfig::default_path();
        assert!(path.ends_with("config.toml"));
    }
}
