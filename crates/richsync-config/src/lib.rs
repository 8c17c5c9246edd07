use richsync_engine::{EngineQuirks, SurfaceOptions};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {config_path}: {source}")]
    ConfigReadError {
        config_path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {config_path}: {source}")]
    ConfigParseError {
        config_path: PathBuf,
        source: toml::de::Error,
    },
}

/// Browser engine the surface is hosted in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    Gecko,
    Webkit,
    Blink,
    #[default]
    Other,
}

impl EngineKind {
    /// Gecko leaves the DOM selection where it was while the spellcheck
    /// context menu is open.
    pub fn default_quirks(self) -> EngineQuirks {
        EngineQuirks {
            selection_frozen_during_context_menu: self == EngineKind::Gecko,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositionConfig {
    pub resolve_delay_ms: u64,
}

impl Default for CompositionConfig {
    fn default() -> Self {
        Self {
            resolve_delay_ms: richsync_engine::composition::DEFAULT_RESOLVE_DELAY.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuirksConfig {
    pub engine: EngineKind,
    /// Overrides what `engine` implies.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selection_frozen_during_context_menu: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where the replay tool looks for relative trace paths.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_dir: Option<PathBuf>,
    pub composition: CompositionConfig,
    pub quirks: QuirksConfig,
}

impl Config {
    pub fn load_from_path<P: AsRef<Path>>(config_path: P) -> Result<Option<Self>, ConfigError> {
        let config_path = config_path.as_ref();
        if !config_path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(config_path).map_err(|source| {
            ConfigError::ConfigReadError {
                config_path: config_path.to_path_buf(),
                source,
            }
        })?;

        let mut config: Config =
            toml::from_str(&content).map_err(|source| ConfigError::ConfigParseError {
                config_path: config_path.to_path_buf(),
                source,
            })?;

        config.trace_dir = config
            .trace_dir
            .map(|dir| Self::expand_path(&dir).unwrap_or(dir));

        Ok(Some(config))
    }

    pub fn load() -> Result<Option<Self>, ConfigError> {
        let config_path = Self::config_path();
        Self::load_from_path(&config_path)
    }

    pub fn save_to_path<P: AsRef<Path>>(&self, config_path: P) -> anyhow::Result<()> {
        let config_path = config_path.as_ref();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        let config_dir = shellexpand::tilde("~/.config/richsync");
        PathBuf::from(config_dir.as_ref()).join("config.toml")
    }

    pub fn quirks(&self) -> EngineQuirks {
        let mut quirks = self.quirks.engine.default_quirks();
        if let Some(frozen) = self.quirks.selection_frozen_during_context_menu {
            quirks.selection_frozen_during_context_menu = frozen;
        }
        quirks
    }

    pub fn surface_options(&self) -> SurfaceOptions {
        SurfaceOptions {
            resolve_delay: Duration::from_millis(self.composition.resolve_delay_ms),
            quirks: self.quirks(),
        }
    }

    /// Resolves a trace path against `trace_dir` when it is relative.
    pub fn resolve_trace_path(&self, path: &Path) -> PathBuf {
        match &self.trace_dir {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path.to_path_buf(),
        }
    }

    fn expand_path(path: &Path) -> Option<PathBuf> {
        let path_str = path.to_string_lossy();
        match shellexpand::full(&path_str) {
            Ok(expanded) => Some(PathBuf::from(expanded.as_ref())),
            Err(_) => None,
        }
    }
}
