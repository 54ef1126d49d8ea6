//! Persistent named macros: ordered lists of tool steps.
//!
//! Macros are stored as one pretty-printed JSON object keyed by name in the
//! working directory. Steps are kept as raw JSON (`{"tool": ..., "kwargs":
//! {...}}`) and validated only when run, so a macro saved against an older
//! tool table still loads.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::tools::ToolError;

/// Named tool-step sequences with bounded count and file persistence.
#[derive(Debug)]
pub struct MacroStore {
    path: PathBuf,
    max_macros: usize,
    macros: BTreeMap<String, Vec<Value>>,
}

impl MacroStore {
    /// Load the store at `path`. A missing, unreadable, or corrupt file
    /// yields an empty store.
    pub fn open(path: impl Into<PathBuf>, max_macros: usize) -> Self {
        let path = path.into();
        let macros = match std::fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str::<BTreeMap<String, Vec<Value>>>(&text) {
                Ok(macros) => macros,
                Err(e) => {
                    tracing::warn!(path = %path.display(), "ignoring corrupt macro file: {e}");
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                tracing::warn!(path = %path.display(), "cannot read macro file: {e}");
                BTreeMap::new()
            }
        };
        Self {
            path,
            max_macros,
            macros,
        }
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Save `steps` under `name`, replacing any existing macro of that name.
    ///
    /// # Errors
    ///
    /// Invalid name, empty steps, count limit reached, or persistence
    /// failure. On any error the store is unchanged.
    pub fn add(&mut self, name: &str, steps: Vec<Value>) -> Result<String, ToolError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ToolError::Macro("invalid macro name".into()));
        }
        if steps.is_empty() {
            return Err(ToolError::InvalidArguments(
                "steps must be a non-empty list".into(),
            ));
        }
        if !self.macros.contains_key(name) && self.macros.len() >= self.max_macros {
            return Err(ToolError::Macro(format!(
                "macro limit reached ({} saved); remove one first",
                self.max_macros
            )));
        }

        let count = steps.len();
        let previous = self.macros.insert(name.to_owned(), steps);
        if let Err(e) = self.save() {
            match previous {
                Some(steps) => self.macros.insert(name.to_owned(), steps),
                None => self.macros.remove(name),
            };
            return Err(e);
        }

        tracing::info!(name, steps = count, "macro saved");
        Ok(format!("OK: macro '{name}' saved with {count} step(s)"))
    }

    /// Delete a macro.
    ///
    /// # Errors
    ///
    /// [`ToolError::NotFound`] for an unknown name, or a persistence failure
    /// (the macro is then kept).
    pub fn remove(&mut self, name: &str) -> Result<String, ToolError> {
        let name = name.trim();
        let Some(steps) = self.macros.remove(name) else {
            return Err(ToolError::NotFound(format!("macro '{name}'")));
        };
        if let Err(e) = self.save() {
            self.macros.insert(name.to_owned(), steps);
            return Err(e);
        }
        tracing::info!(name, "macro removed");
        Ok(format!("OK: removed macro '{name}'"))
    }

    /// Macro names in lexicographic order.
    pub fn list(&self) -> Vec<&str> {
        self.macros.keys().map(String::as_str).collect()
    }

    /// Raw steps of a macro.
    pub fn get(&self, name: &str) -> Option<&[Value]> {
        self.macros.get(name.trim()).map(Vec::as_slice)
    }

    /// Number of stored macros.
    pub fn len(&self) -> usize {
        self.macros.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.macros.is_empty()
    }

    /// Write the whole map via a temporary file and rename.
    fn save(&self) -> Result<(), ToolError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.macros)
            .map_err(|e| ToolError::Macro(format!("cannot serialize macros: {e}")))?;
        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, json)?;
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use serde_json::json;

    fn step() -> Value {
        json!({"tool": "create_file", "kwargs": {"filename": "hello.txt", "content": "hi"}})
    }

    #[test]
    fn add_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("macros.json");
        let mut store = MacroStore::open(&path, 8);
        let out = store.add("greet", vec![step()]).unwrap();
        assert_eq!(out, "OK: macro 'greet' saved with 1 step(s)");

        let reloaded = MacroStore::open(&path, 8);
        assert_eq!(reloaded.list(), vec!["greet"]);
        assert_eq!(reloaded.get("greet").unwrap(), &[step()]);
    }

    #[test]
    fn rejects_bad_input() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = MacroStore::open(dir.path().join("macros.json"), 8);
        assert_eq!(store.add("  ", vec![step()]).unwrap_err().kind(), "macro error");
        assert_eq!(store.add("x", vec![]).unwrap_err().kind(), "invalid arguments");
        assert!(store.is_empty());
    }

    #[test]
    fn limit_blocks_new_names_but_allows_replacement() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("macros.json");
        let mut store = MacroStore::open(&path, 2);
        store.add("a", vec![step()]).unwrap();
        store.add("b", vec![step()]).unwrap();
        let before = std::fs::read_to_string(&path).unwrap();

        let err = store.add("c", vec![step()]).unwrap_err();
        assert!(err.message().contains("limit"));
        assert_eq!(store.len(), 2);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), before);

        store.add("a", vec![step(), step()]).unwrap();
        assert_eq!(store.get("a").unwrap().len(), 2);
    }

    #[test]
    fn remove_and_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = MacroStore::open(dir.path().join("macros.json"), 8);
        store.add("a", vec![step()]).unwrap();
        assert_eq!(store.remove("a").unwrap(), "OK: removed macro 'a'");
        assert_eq!(store.remove("a").unwrap_err().kind(), "not found");
    }

    #[test]
    fn list_is_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = MacroStore::open(dir.path().join("macros.json"), 8);
        for name in ["zeta", "alpha", "mid"] {
            store.add(name, vec![step()]).unwrap();
        }
        assert_eq!(store.list(), vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn corrupt_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("macros.json");
        std::fs::write(&path, "{not json").unwrap();
        let store = MacroStore::open(&path, 8);
        assert!(store.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn failed_save_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the file should be makes every write fail.
        let path = dir.path().join("macros.json");
        std::fs::create_dir(&path).unwrap();
        let mut store = MacroStore::open(&path, 8);
        assert!(store.add("a", vec![step()]).is_err());
        assert!(store.get("a").is_none());
    }
}
