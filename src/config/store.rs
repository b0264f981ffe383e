//! Dotted-path access to the global config file.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_yaml::Value;

use super::document::Document;
use super::{Config, expand, known_collections, known_defaults};
use crate::errors::ConfigError;

pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Raw file bytes, or None when the file does not exist.
    pub fn load_raw(&self) -> Result<Option<Vec<u8>>> {
        if !self.path.exists() {
            return Ok(None);
        }
        fs::read(&self.path)
            .map(Some)
            .with_context(|| format!("Failed to read config: {}", self.path.display()))
    }

    fn load_value(&self) -> Result<Value> {
        match self.load_raw()? {
            None => Ok(Value::Mapping(Default::default())),
            Some(bytes) => {
                let text = String::from_utf8(bytes)
                    .with_context(|| format!("Config is not UTF-8: {}", self.path.display()))?;
                let value: Value = serde_yaml::from_str(&text).map_err(|e| {
                    ConfigError::new("", format!("{}: {e}", self.path.display()))
                })?;
                if value.is_null() {
                    return Ok(Value::Mapping(Default::default()));
                }
                Ok(value)
            }
        }
    }

    /// Parse the file into the typed model, expanding `${VAR}` references
    /// in every scalar. Unset scalars receive known defaults.
    pub fn load(&self) -> Result<Config> {
        let mut value = self.load_value()?;
        expand::expand_tree(&mut value, "")?;
        let config: Config = serde_yaml::from_value(value)
            .map_err(|e| ConfigError::new("", format!("{}: {e}", self.path.display())))?;
        Ok(config.with_defaults())
    }

    /// Read a dotted-path key. Scalars return their raw string form;
    /// mappings and sequences return a YAML subtree serialization. A key
    /// absent from the file but present in the known-settings list
    /// returns its default with `found = true`.
    pub fn get(&self, dotted: &str) -> Result<(String, bool)> {
        let value = self.load_value()?;
        match lookup(&value, dotted) {
            Some(v) => Ok((value_to_display(v)?, true)),
            None => {
                for (key, default) in known_defaults() {
                    if key == dotted {
                        return Ok((default.to_string(), true));
                    }
                }
                Ok((String::new(), false))
            }
        }
    }

    /// Apply a batch of dotted-path assignments, preserving comments,
    /// blank lines, and the order of untouched keys.
    pub fn set(&self, values: &BTreeMap<String, String>) -> Result<()> {
        let mut doc = match self.load_raw()? {
            Some(bytes) => Document::parse(&String::from_utf8(bytes)?),
            None => Document::new(),
        };
        for (key, value) in values {
            doc.set(key, value);
        }
        self.write(&doc.to_string())
    }

    /// Remove a dotted-path key. Returns false when it was not present.
    pub fn delete(&self, dotted: &str) -> Result<bool> {
        let Some(bytes) = self.load_raw()? else {
            return Ok(false);
        };
        let mut doc = Document::parse(&String::from_utf8(bytes)?);
        let found = doc.delete(dotted);
        if found {
            self.write(&doc.to_string())?;
        }
        Ok(found)
    }

    /// The merged view: known defaults, known empty collections, then the
    /// file's contents on top. Unknown file keys are preserved.
    pub fn effective(&self) -> Result<Vec<u8>> {
        let mut merged = serde_yaml::Mapping::new();
        for (key, default) in known_defaults() {
            merged.insert(Value::from(key), Value::from(default));
        }
        for key in known_collections() {
            merged.insert(Value::from(key), Value::Mapping(Default::default()));
        }
        if let Value::Mapping(file) = self.load_value()? {
            for (k, v) in file {
                merged.insert(k, v);
            }
        }
        let text = serde_yaml::to_string(&Value::Mapping(merged))?;
        Ok(text.into_bytes())
    }

    fn write(&self, contents: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, contents)
            .with_context(|| format!("Failed to write config: {}", self.path.display()))
    }
}

fn lookup<'a>(value: &'a Value, dotted: &str) -> Option<&'a Value> {
    let mut current = value;
    for segment in dotted.split('.') {
        current = current.as_mapping()?.get(Value::from(segment))?;
    }
    Some(current)
}

fn value_to_display(value: &Value) -> Result<String> {
    Ok(match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Null => String::new(),
        other => serde_yaml::to_string(other)?.trim_end().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(contents: &str) -> (tempfile::TempDir, ConfigStore) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, contents).unwrap();
        (dir, ConfigStore::new(path))
    }

    #[test]
    fn load_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("config.yaml"));
        let cfg = store.load().unwrap();
        assert_eq!(cfg.agent, "claude");
        assert_eq!(cfg.backend, "docker");
    }

    #[test]
    fn set_then_load_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("config.yaml"));
        let mut values = BTreeMap::new();
        values.insert("agent".to_string(), "gemini".to_string());
        values.insert("env.FOO".to_string(), "bar".to_string());
        store.set(&values).unwrap();

        let cfg = store.load().unwrap();
        assert_eq!(cfg.agent, "gemini");
        assert_eq!(cfg.env.get("FOO").map(String::as_str), Some("bar"));
    }

    #[test]
    fn set_preserves_untouched_lines() {
        let original = "# top comment\nagent: claude # why not\n\nbackend: docker\n";
        let (_dir, store) = store_with(original);
        let mut values = BTreeMap::new();
        values.insert("model".to_string(), "opus".to_string());
        store.set(&values).unwrap();

        let text = String::from_utf8(store.load_raw().unwrap().unwrap()).unwrap();
        for line in original.lines() {
            assert!(text.contains(line), "lost line {line:?}");
        }
        assert!(text.contains("model: opus"));
    }

    #[test]
    fn get_scalar_and_known_default() {
        let (_dir, store) = store_with("agent: gemini\n");
        assert_eq!(store.get("agent").unwrap(), ("gemini".to_string(), true));
        // Absent but known: default with found=true.
        assert_eq!(store.get("backend").unwrap(), ("docker".to_string(), true));
        // Absent and unknown.
        assert_eq!(store.get("nope").unwrap(), (String::new(), false));
    }

    #[test]
    fn get_mapping_returns_subtree() {
        let (_dir, store) = store_with("env:\n  A: \"1\"\n  B: two\n");
        let (text, found) = store.get("env").unwrap();
        assert!(found);
        assert!(text.contains("A:"));
        assert!(text.contains("B: two"));
    }

    #[test]
    fn delete_removes_key() {
        let (_dir, store) = store_with("agent: gemini\nmodel: pro\n");
        assert!(store.delete("model").unwrap());
        assert!(!store.delete("model").unwrap());
        let cfg = store.load().unwrap();
        assert_eq!(cfg.model, "");
    }

    #[test]
    fn env_expansion_applies_on_load() {
        // SAFETY: test-local env var with a unique name.
        unsafe { std::env::set_var("TB_STORE_TEST_VAR", "expanded") };
        let (_dir, store) = store_with("model: ${TB_STORE_TEST_VAR}\n");
        assert_eq!(store.load().unwrap().model, "expanded");
        // The raw file is untouched.
        let raw = String::from_utf8(store.load_raw().unwrap().unwrap()).unwrap();
        assert!(raw.contains("${TB_STORE_TEST_VAR}"));
    }

    #[test]
    fn unset_var_error_names_dotted_path() {
        let (_dir, store) = store_with("env:\n  FOO: ${TB_STORE_UNSET_VAR}\n");
        let err = store.load().unwrap_err();
        let cfg = err.downcast_ref::<ConfigError>().unwrap();
        assert_eq!(cfg.path, "env.FOO");
    }

    #[test]
    fn effective_merges_defaults_and_file() {
        let (_dir, store) = store_with("agent: gemini\ncustom_key: kept\n");
        let text = String::from_utf8(store.effective().unwrap()).unwrap();
        assert!(text.contains("agent: gemini"));
        assert!(text.contains("backend: docker"));
        assert!(text.contains("custom_key: kept"));
        assert!(text.contains("env: {}"));
    }
}
