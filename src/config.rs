// Engine configuration - Tempo, hit length, progress polling and pattern source
// Read from RON or JSON; every field is optional

use crate::playback::DEFAULT_PROGRESS_INTERVAL;
use crate::sequencer::compiler::{DEFAULT_HIT_DURATION, PatternCompiler};
use crate::sequencer::pattern::{PatternError, PatternLibrary};
use crate::sequencer::timeline::Tempo;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Longest progress poll interval accepted, in seconds
pub const MAX_PROGRESS_INTERVAL: f64 = 10.0;

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("RON error: {0}")]
    Ron(#[from] ron::error::SpannedError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Pattern library error: {0}")]
    Pattern(#[from] PatternError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Tempo in BPM
    pub tempo: Tempo,

    /// Length of every generated hit, in seconds
    pub hit_duration: f64,

    /// Progress poll interval, in seconds
    pub progress_interval: f64,

    /// Pattern library file; the built-in library is used when unset
    pub pattern_library: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tempo: Tempo::default(),
            hit_duration: DEFAULT_HIT_DURATION,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            pattern_library: None,
        }
    }
}

impl EngineConfig {
    pub fn from_ron_str(ron_data: &str) -> Result<Self, ConfigError> {
        let config: Self = ron::from_str(ron_data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(json_data: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json_data)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file; `.json` is read as JSON, anything else as RON
    ///
    /// A relative `pattern_library` path is resolved against the config
    /// file's directory.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_str(&content)?,
            _ => Self::from_ron_str(&content)?,
        };

        if let (Some(library), Some(dir)) = (config.pattern_library.as_ref(), path.parent()) {
            if library.is_relative() {
                config.pattern_library = Some(dir.join(library));
            }
        }

        log::debug!("Loaded engine config from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.hit_duration.is_finite() && self.hit_duration > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "hit_duration must be positive, got {}",
                self.hit_duration
            )));
        }
        if !(self.progress_interval > 0.0 && self.progress_interval <= MAX_PROGRESS_INTERVAL) {
            return Err(ConfigError::Invalid(format!(
                "progress_interval must be in (0, {}], got {}",
                MAX_PROGRESS_INTERVAL, self.progress_interval
            )));
        }
        Ok(())
    }

    /// The configured pattern library
    pub fn library(&self) -> Result<PatternLibrary, ConfigError> {
        match &self.pattern_library {
            Some(path) => Ok(PatternLibrary::load(path)?),
            None => Ok(PatternLibrary::builtin()),
        }
    }

    /// A compiler set up from this config
    pub fn compiler(&self) -> Result<PatternCompiler, ConfigError> {
        let compiler =
            PatternCompiler::new(self.library()?, self.tempo).with_hit_duration(self.hit_duration);
        Ok(compiler)
    }
}
