//! Path resolution for voice-transcribed names.

use std::path::{Component, Path, PathBuf};

use super::ToolSandbox;
use crate::tools::ToolError;

/// Words that introduce a directory hint ("save it in documents").
const HINT_PREPOSITIONS: &[&str] = &["in", "to", "into", "under", "on"];

/// A resolved location guaranteed to lie inside the sandbox root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxPath {
    absolute: PathBuf,
    relative: String,
}

impl SandboxPath {
    /// Absolute filesystem path.
    pub fn absolute(&self) -> &Path {
        &self.absolute
    }

    /// Root-relative display form.
    pub fn relative(&self) -> &str {
        &self.relative
    }
}

/// Repair common transcription artifacts in a spoken path.
///
/// Lowercases, collapses whitespace, and turns spoken separators into their
/// symbols: "dot"/"period"/"point" become `.`, "slash"/"backslash"/"forward
/// slash" become `/`, "underscore"/"under score" become `_`, and
/// "dash"/"hyphen" become `-`. Symbols join their neighbours without spaces.
pub fn normalize_spoken(input: &str) -> String {
    let lower = input.trim().to_lowercase();
    let words: Vec<&str> = lower.split_whitespace().collect();

    let mut out = String::with_capacity(lower.len());
    let mut glued = false;
    let mut i = 0;
    while i < words.len() {
        let (symbol, consumed) = match (words[i], words.get(i + 1).copied()) {
            ("forward", Some("slash")) => (Some('/'), 2),
            ("under", Some("score")) => (Some('_'), 2),
            ("slash" | "backslash", _) => (Some('/'), 1),
            ("dot" | "period" | "point", _) => (Some('.'), 1),
            ("underscore", _) => (Some('_'), 1),
            ("dash" | "hyphen", _) => (Some('-'), 1),
            _ => (None, 1),
        };
        match symbol {
            Some(symbol) => {
                out.push(symbol);
                glued = true;
            }
            None => {
                if !out.is_empty() && !glued {
                    out.push(' ');
                }
                out.push_str(words[i]);
                glued = false;
            }
        }
        i += consumed;
    }
    out
}

/// A spoken target split into its name and an optional hinted base directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SpokenTarget {
    /// Normalised name with the hint phrase removed; spaces become `_`.
    pub name: String,
    /// Directory named by a resolvable hint.
    pub hint: Option<PathBuf>,
}

impl SpokenTarget {
    /// Whether the name contains a directory separator.
    pub fn has_separator(&self) -> bool {
        self.name.contains('/')
    }
}

fn is_hint_key(word: &str) -> bool {
    !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '/'))
}

impl ToolSandbox {
    /// Map a single hint word to an existing directory.
    fn hint_dir(&self, key: &str) -> Option<PathBuf> {
        let dir = match key {
            "home" => dirs::home_dir(),
            "desktop" => dirs::desktop_dir(),
            "downloads" => dirs::download_dir(),
            "documents" | "docs" => dirs::document_dir(),
            "music" => dirs::audio_dir(),
            "pictures" => dirs::picture_dir(),
            "videos" => dirs::video_dir(),
            "repo" | "project" => Some(self.root.clone()),
            "backend" | "frontend" => Some(self.root.join(key)),
            "workspace" | "work" => Some(self.workdir.clone()),
            _ => None,
        }?;
        dir.is_dir().then_some(dir)
    }

    /// Resolve a hint key, including sub-path hints such as `repo/backend`.
    fn resolve_hint(&self, key: &str) -> Option<PathBuf> {
        let key = key.trim_matches('/');
        if let Some(dir) = self.hint_dir(key) {
            return Some(dir);
        }
        let (head, tail) = key.split_once('/')?;
        let base = self.hint_dir(head)?;
        Some(
            tail.split('/')
                .filter(|part| !part.is_empty())
                .fold(base, |dir, part| dir.join(part)),
        )
    }

    /// Normalise a spoken target and strip the first resolvable hint phrase.
    pub(crate) fn parse_target(&self, raw: &str) -> SpokenTarget {
        let normalized = normalize_spoken(&raw.replace('\\', "/"));
        let mut words: Vec<&str> = normalized.split(' ').filter(|w| !w.is_empty()).collect();

        let mut hint = None;
        for i in 0..words.len().saturating_sub(1) {
            if !HINT_PREPOSITIONS.contains(&words[i]) || !is_hint_key(words[i + 1]) {
                continue;
            }
            if let Some(dir) = self.resolve_hint(words[i + 1]) {
                hint = Some(dir);
                words.drain(i..=i + 1);
                break;
            }
        }

        let name = words
            .join(" ")
            .trim()
            .trim_matches(|c| c == '"' || c == '\'')
            .trim()
            .replace(' ', "_");
        SpokenTarget { name, hint }
    }

    /// Resolve a file name for reading or writing.
    ///
    /// A bare name without an extension gets the default extension.
    ///
    /// # Errors
    ///
    /// [`ToolError::InvalidArguments`] for an empty name and
    /// [`ToolError::SandboxViolation`] when the path leaves the root.
    pub fn resolve_file(&self, raw: &str) -> Result<SandboxPath, ToolError> {
        let target = self.parse_target(raw);
        self.resolve_target_file(&target)
    }

    pub(crate) fn resolve_target_file(&self, target: &SpokenTarget) -> Result<SandboxPath, ToolError> {
        if target.name.is_empty() {
            return Err(ToolError::InvalidArguments("missing filename".into()));
        }
        let mut name = target.name.clone();
        if !target.has_separator() && !name.contains('.') && !self.default_extension.is_empty() {
            name = format!("{name}.{}", self.default_extension);
        }
        let base = target.hint.as_deref().unwrap_or(&self.workdir);
        self.confine(base, &name)
    }

    /// Resolve a directory for listing. An empty request means the working
    /// directory; a bare hint word ("desktop") names its directory.
    ///
    /// # Errors
    ///
    /// [`ToolError::SandboxViolation`] when the path leaves the root.
    pub fn resolve_dir(&self, raw: &str) -> Result<SandboxPath, ToolError> {
        let target = self.parse_target(raw);
        let (base, rest) = match target.hint {
            Some(hint) => (hint, target.name),
            None => match self.resolve_hint(&target.name) {
                Some(dir) => (dir, String::new()),
                None => (self.workdir.clone(), target.name),
            },
        };
        self.confine(&base, &rest)
    }

    /// Join `rel` onto `base` and prove the result stays inside the root.
    ///
    /// `..` components are rejected outright. The lexical result must start
    /// with the root, and so must the canonical form of its deepest existing
    /// ancestor (which catches symlinks pointing outside).
    pub(crate) fn confine(&self, base: &Path, rel: &str) -> Result<SandboxPath, ToolError> {
        let rel_path = Path::new(rel);
        if rel_path.components().any(|c| matches!(c, Component::ParentDir))
            || base.components().any(|c| matches!(c, Component::ParentDir))
        {
            return Err(ToolError::SandboxViolation(format!(
                "'..' is not allowed in paths: {rel}"
            )));
        }

        let mut absolute = PathBuf::new();
        for component in base.join(rel_path).components() {
            match component {
                Component::CurDir => {}
                other => absolute.push(other.as_os_str()),
            }
        }

        if !absolute.starts_with(&self.root) {
            return Err(ToolError::SandboxViolation(format!(
                "path escapes sandbox: {rel}"
            )));
        }

        let existing = absolute.ancestors().find(|p| p.exists());
        if let Some(existing) = existing {
            let canonical = existing.canonicalize()?;
            if !canonical.starts_with(&self.root) {
                return Err(ToolError::SandboxViolation(format!(
                    "path escapes sandbox through a link: {rel}"
                )));
            }
        }

        let relative = self.relative(&absolute);
        Ok(SandboxPath { absolute, relative })
    }
}
