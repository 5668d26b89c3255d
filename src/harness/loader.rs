//! Grammar loading
//!
//! The primary grammar comes from the path given on the command line. Any
//! scope it embeds is looked up as `<scope><suffix>` in the auxiliary grammar
//! directory; those files have their `scopeName` forced to the requested
//! scope so cross-references resolve no matter what the file declares.

use crate::error::HarnessError;
use crate::textmate::{Grammar, GrammarSource, RawGrammar, Registry, TextMateError};
use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("yaml" | "yml")
    )
}

/// Read a structured document, YAML for `.yaml`/`.yml` and JSON otherwise.
pub fn read_document<T: DeserializeOwned>(path: &Path) -> Result<T, HarnessError> {
    let text = fs::read_to_string(path).map_err(|e| HarnessError::io(path, e))?;
    if is_yaml(path) {
        serde_yaml::from_str(&text).map_err(|source| HarnessError::Yaml {
            path: path.to_path_buf(),
            source,
        })
    } else {
        serde_json::from_str(&text).map_err(|source| HarnessError::Json {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Grammar source backed by the primary grammar plus a fixture directory
pub struct GrammarFiles {
    scope_name: String,
    primary: RawGrammar,
    auxiliary_dir: Option<PathBuf>,
    suffix: String,
}

impl GrammarFiles {
    /// Read the primary grammar. It must declare a `scopeName`.
    pub fn open(
        path: &Path,
        auxiliary_dir: Option<PathBuf>,
        suffix: impl Into<String>,
    ) -> Result<Self, HarnessError> {
        let primary: RawGrammar = read_document(path)?;
        let scope_name = match &primary.scope_name {
            Some(scope) if !scope.is_empty() => scope.clone(),
            _ => return Err(HarnessError::MissingScopeName(path.to_path_buf())),
        };
        Ok(GrammarFiles {
            scope_name,
            primary,
            auxiliary_dir,
            suffix: suffix.into(),
        })
    }

    pub fn scope_name(&self) -> &str {
        &self.scope_name
    }

    fn auxiliary_path(&self, scope_name: &str) -> Option<PathBuf> {
        let dir = self.auxiliary_dir.as_ref()?;
        let path = dir.join(format!("{scope_name}{}", self.suffix));
        path.is_file().then_some(path)
    }

    /// Compile the primary grammar together with everything it embeds.
    pub fn compile(self) -> Result<Grammar, HarnessError> {
        let scope_name = self.scope_name.clone();
        let loaded = Registry::new(self).load_grammar(&scope_name).and_then(|grammar| {
            grammar.ok_or_else(|| TextMateError::Source {
                scope: scope_name.clone(),
                message: "no grammar available".into(),
            })
        });
        loaded.map_err(|source| HarnessError::GrammarLoad {
            scope: scope_name,
            source,
        })
    }
}

impl GrammarSource for GrammarFiles {
    fn load(&self, scope_name: &str) -> Result<Option<RawGrammar>, TextMateError> {
        if scope_name == self.scope_name {
            return Ok(Some(self.primary.clone()));
        }
        let Some(path) = self.auxiliary_path(scope_name) else {
            debug!(scope = scope_name, "no auxiliary grammar");
            return Ok(None);
        };

        debug!(scope = scope_name, path = %path.display(), "loading auxiliary grammar");
        let source_error = |message: String| TextMateError::Source {
            scope: scope_name.to_string(),
            message: format!("{}: {message}", path.display()),
        };
        let text = fs::read_to_string(&path).map_err(|e| source_error(e.to_string()))?;
        let parsed = if is_yaml(&path) {
            RawGrammar::from_yaml(&text)
        } else {
            RawGrammar::from_json(&text)
        };
        let mut grammar = parsed.map_err(|e| source_error(e.to_string()))?;
        grammar.scope_name = Some(scope_name.to_string());
        Ok(Some(grammar))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const HOST: &str = r#"{
        "scopeName": "source.host",
        "patterns": [ {
            "begin": "<<", "end": ">>",
            "contentName": "source.guest.embedded.host",
            "patterns": [ { "include": "source.guest" } ]
        } ]
    }"#;

    fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn missing_scope_name_is_fatal() {
        let dir = TempDir::new().unwrap();
        let path = write(dir.path(), "bad.json", r#"{ "patterns": [] }"#);
        let err = GrammarFiles::open(&path, None, ".tmLanguage.json").err().unwrap();
        assert!(matches!(err, HarnessError::MissingScopeName(_)));
        assert!(err.to_string().starts_with("No scopeName in grammar: "));
    }

    #[test]
    fn empty_scope_name_is_fatal() {
        let dir = TempDir::new().unwrap();
        let path = write(dir.path(), "bad.json", r#"{ "scopeName": "" }"#);
        let err = GrammarFiles::open(&path, None, ".tmLanguage.json").err().unwrap();
        assert!(matches!(err, HarnessError::MissingScopeName(_)));
    }

    #[test]
    fn malformed_grammar_is_fatal() {
        let dir = TempDir::new().unwrap();
        let path = write(dir.path(), "bad.json", "{ nope");
        let err = GrammarFiles::open(&path, None, ".tmLanguage.json").err().unwrap();
        assert!(matches!(err, HarnessError::Json { .. }));
    }

    #[test]
    fn auxiliary_grammar_scope_name_is_forced() {
        let dir = TempDir::new().unwrap();
        let primary = write(dir.path(), "host.json", HOST);
        let grammars = dir.path().join("grammars");
        fs::create_dir(&grammars).unwrap();
        write(
            &grammars,
            "source.guest.tmLanguage.json",
            r#"{ "scopeName": "something.else", "patterns": [] }"#,
        );

        let files = GrammarFiles::open(&primary, Some(grammars), ".tmLanguage.json").unwrap();
        assert_eq!(files.scope_name(), "source.host");

        let guest = GrammarSource::load(&files, "source.guest").unwrap().unwrap();
        assert_eq!(guest.scope_name.as_deref(), Some("source.guest"));
        assert!(GrammarSource::load(&files, "source.absent").unwrap().is_none());
    }

    #[test]
    fn absent_auxiliary_directory_means_no_embedded_grammars() {
        let dir = TempDir::new().unwrap();
        let primary = write(dir.path(), "host.json", HOST);
        let files = GrammarFiles::open(&primary, Some(dir.path().join("nope")), ".tmLanguage.json").unwrap();
        let grammar = files.compile().unwrap();
        assert_eq!(grammar.scope_name(), "source.host");
    }

    #[test]
    fn broken_auxiliary_grammar_is_fatal() {
        let dir = TempDir::new().unwrap();
        let primary = write(dir.path(), "host.json", HOST);
        write(dir.path(), "source.guest.tmLanguage.json", "[");
        let files = GrammarFiles::open(&primary, Some(dir.path().to_path_buf()), ".tmLanguage.json").unwrap();
        let err = files.compile().unwrap_err();
        assert!(matches!(
            &err,
            HarnessError::GrammarLoad { scope, source: TextMateError::Source { .. } } if scope == "source.host"
        ));
        assert!(err.to_string().starts_with("Failed to load grammar: source.host: "));
    }

    #[test]
    fn yaml_documents_are_detected_by_extension() {
        let dir = TempDir::new().unwrap();
        let path = write(dir.path(), "host.yaml", "scopeName: source.yaml.host\npatterns: []\n");
        let files = GrammarFiles::open(&path, None, ".tmLanguage.json").unwrap();
        assert_eq!(files.scope_name(), "source.yaml.host");
    }
}
