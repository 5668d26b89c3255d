//! Configuration loader
//!
//! `defaults/tmcheck.default.toml` is embedded into the binary so that docs
//! and runtime behavior stay in sync. Users layer their own file on top via
//! [`Loader`] before deserializing into [`TmCheckConfig`].

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, File, FileFormat, ValueKind};
use serde::Deserialize;
use std::path::{Path, PathBuf};

const DEFAULT_TOML: &str = include_str!("../defaults/tmcheck.default.toml");

#[derive(Debug, Clone, Deserialize)]
pub struct TmCheckConfig {
    pub grammars: GrammarsConfig,
    pub dump: DumpConfig,
    pub report: ReportConfig,
}

/// Where auxiliary embedded grammars are looked up
#[derive(Debug, Clone, Deserialize)]
pub struct GrammarsConfig {
    pub directory: String,
    pub suffix: String,
}

impl GrammarsConfig {
    /// The configured directory, or `grammars/` next to the running executable.
    pub fn resolve_directory(&self) -> Option<PathBuf> {
        if !self.directory.is_empty() {
            return Some(PathBuf::from(&self.directory));
        }
        let exe = std::env::current_exe().ok()?;
        Some(exe.parent()?.join("grammars"))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DumpConfig {
    pub scope_sample: usize,
    pub line_number_width: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportConfig {
    pub scope_sample: usize,
}

/// Helper for layering user overrides over the built-in defaults.
#[derive(Debug, Clone)]
pub struct Loader {
    builder: ConfigBuilder<DefaultState>,
}

impl Loader {
    pub fn new() -> Self {
        let builder = Config::builder().add_source(File::from_str(DEFAULT_TOML, FileFormat::Toml));
        Self { builder }
    }

    /// Layer a configuration file. Missing files trigger an error.
    pub fn with_file(mut self, path: impl AsRef<Path>) -> Self {
        let source = File::from(path.as_ref())
            .format(FileFormat::Toml)
            .required(true);
        self.builder = self.builder.add_source(source);
        self
    }

    /// Apply a single key/value override (used for CLI flags).
    pub fn set_override<I>(mut self, key: &str, value: I) -> Result<Self, ConfigError>
    where
        I: Into<ValueKind>,
    {
        self.builder = self.builder.set_override(key, value)?;
        Ok(self)
    }

    pub fn build(self) -> Result<TmCheckConfig, ConfigError> {
        self.builder.build()?.try_deserialize()
    }
}

impl Default for Loader {
    fn default() -> Self {
        Self::new()
    }
}

pub fn load_defaults() -> Result<TmCheckConfig, ConfigError> {
    Loader::new().build()
}
