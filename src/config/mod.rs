//! Configuration system (layered: code > env > config file > defaults).
//!
//! [`RunConfig`] is chosen per turn by the caller. [`RuntimeConfig`] is fixed
//! per [`Runner`](crate::runner::Runner) and threaded to every agent through
//! the invocation context.

use std::path::Path;
use std::str::FromStr;

use bon::Builder;
use regex::Regex;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::{Result, TrellisError};

/// How model output reaches the caller.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum StreamingMode {
    /// One complete response per model call.
    #[default]
    None,
    /// Incremental partial events followed by one consolidated final event.
    Sse,
    /// Bidirectional live streaming.
    Bidi,
}

/// Per-turn options passed to [`Runner::run`](crate::runner::Runner::run).
#[derive(Debug, Clone, Default, Builder, Serialize, Deserialize, PartialEq)]
pub struct RunConfig {
    #[builder(default)]
    #[serde(default)]
    pub streaming_mode: StreamingMode,
    /// Require a model family capable of compositional function calling.
    #[builder(default)]
    #[serde(default)]
    pub support_cfc: bool,
    /// Off-load inline blobs of the inbound message to the artifact service.
    #[builder(default)]
    #[serde(default)]
    pub save_input_blobs_as_artifacts: bool,
}

impl RunConfig {
    pub fn with_streaming_mode(mut self, mode: StreamingMode) -> Self {
        self.streaming_mode = mode;
        self
    }
}

const DEFAULT_CFC_MODEL_PATTERN: &str = "^gemini-2";
const DEFAULT_PARALLEL_BUFFER: usize = 16;

/// Runner-wide settings.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    cfc_model_pattern: Regex,
    parallel_buffer: usize,
    default_streaming_mode: StreamingMode,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            cfc_model_pattern: Regex::new(DEFAULT_CFC_MODEL_PATTERN)
                .unwrap_or_else(|_| unreachable!("default CFC pattern is a valid regex")),
            parallel_buffer: DEFAULT_PARALLEL_BUFFER,
            default_streaming_mode: StreamingMode::None,
        }
    }
}

/// On-disk shape of the optional TOML config file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RuntimeConfigFile {
    cfc_model_pattern: Option<String>,
    parallel_buffer: Option<usize>,
    default_streaming_mode: Option<StreamingMode>,
}

impl RuntimeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from environment variables (`TRELLIS_*`), reading `.env` if present.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        Self::default().apply_env()
    }

    /// Parse a TOML document on top of the defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let file: RuntimeConfigFile = toml::from_str(raw)
            .map_err(|e| TrellisError::Configuration(format!("invalid config file: {e}")))?;
        let mut config = Self::default();
        if let Some(pattern) = file.cfc_model_pattern {
            config = config.with_cfc_model_pattern(&pattern)?;
        }
        if let Some(buffer) = file.parallel_buffer {
            config = config.with_parallel_buffer(buffer)?;
        }
        if let Some(mode) = file.default_streaming_mode {
            config.default_streaming_mode = mode;
        }
        Ok(config)
    }

    /// Load a TOML file, then let environment variables override it.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&raw)?.apply_env()
    }

    fn apply_env(mut self) -> Result<Self> {
        if let Ok(pattern) = std::env::var("TRELLIS_CFC_MODEL_PATTERN") {
            self = self.with_cfc_model_pattern(&pattern)?;
        }
        if let Ok(raw) = std::env::var("TRELLIS_PARALLEL_BUFFER") {
            let buffer = raw.trim().parse::<usize>().map_err(|_| {
                TrellisError::Configuration(format!("TRELLIS_PARALLEL_BUFFER is not a number: {raw}"))
            })?;
            self = self.with_parallel_buffer(buffer)?;
        }
        if let Ok(raw) = std::env::var("TRELLIS_STREAMING_MODE") {
            self.default_streaming_mode = StreamingMode::from_str(raw.trim()).map_err(|_| {
                TrellisError::Configuration(format!("unknown streaming mode: {raw}"))
            })?;
        }
        Ok(self)
    }

    /// Regex a model name must match for CFC turns.
    pub fn with_cfc_model_pattern(mut self, pattern: &str) -> Result<Self> {
        self.cfc_model_pattern = Regex::new(pattern).map_err(|e| {
            TrellisError::Configuration(format!("invalid CFC model pattern '{pattern}': {e}"))
        })?;
        Ok(self)
    }

    /// Capacity of the bounded queue that merges parallel branches.
    pub fn with_parallel_buffer(mut self, buffer: usize) -> Result<Self> {
        if buffer == 0 {
            return Err(TrellisError::Configuration(
                "parallel buffer must be at least 1".into(),
            ));
        }
        self.parallel_buffer = buffer;
        Ok(self)
    }

    pub fn with_default_streaming_mode(mut self, mode: StreamingMode) -> Self {
        self.default_streaming_mode = mode;
        self
    }

    /// Whether `model_name` belongs to a CFC-capable family.
    pub fn supports_cfc(&self, model_name: &str) -> bool {
        self.cfc_model_pattern.is_match(model_name)
    }

    pub fn cfc_model_pattern(&self) -> &str {
        self.cfc_model_pattern.as_str()
    }

    pub fn parallel_buffer(&self) -> usize {
        self.parallel_buffer
    }

    pub fn default_streaming_mode(&self) -> StreamingMode {
        self.default_streaming_mode
    }

    /// A [`RunConfig`] using this runtime's default streaming mode.
    pub fn default_run_config(&self) -> RunConfig {
        RunConfig::default().with_streaming_mode(self.default_streaming_mode)
    }
}
