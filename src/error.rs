//! Run-level errors
//!
//! Anything in here aborts the whole run. Problems scoped to a single check
//! live in [`crate::harness::evaluator::CheckError`] instead and never stop
//! evaluation of the remaining checks.

use crate::textmate::TextMateError;
use config::ConfigError;
use std::path::PathBuf;
use thiserror::Error;

/// Fatal harness error: bad inputs, broken grammar or misconfiguration
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid YAML in {}: {source}", path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("No scopeName in grammar: {}", .0.display())]
    MissingScopeName(PathBuf),

    #[error("Failed to load grammar: {scope}: {source}")]
    GrammarLoad {
        scope: String,
        #[source]
        source: TextMateError,
    },

    #[error("No checks[] in {}", .0.display())]
    NoChecks(PathBuf),

    #[error("Tokenization failed at line {line}: {source}")]
    Tokenize {
        line: usize,
        #[source]
        source: TextMateError,
    },

    #[error("Failed to write output: {0}")]
    Output(#[source] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl HarnessError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        HarnessError::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_messages_name_the_offending_input() {
        let err = HarnessError::MissingScopeName(PathBuf::from("nix.tmLanguage.json"));
        assert_eq!(err.to_string(), "No scopeName in grammar: nix.tmLanguage.json");

        let err = HarnessError::NoChecks(PathBuf::from("expect.json"));
        assert_eq!(err.to_string(), "No checks[] in expect.json");

        let err = HarnessError::GrammarLoad {
            scope: "source.nix.embedded".into(),
            source: TextMateError::Source {
                scope: "source.nix.embedded".into(),
                message: "no grammar available".into(),
            },
        };
        assert!(err
            .to_string()
            .starts_with("Failed to load grammar: source.nix.embedded: "));
    }
}
