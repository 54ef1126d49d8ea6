//! File operations exposed as tools.
//!
//! Each operation returns the speakable success text, or a [`ToolError`]
//! that the dispatcher renders. All paths go through [`ToolSandbox`]
//! resolution first, so nothing here touches the filesystem outside the root.

use std::path::Path;

use walkdir::WalkDir;

use super::ToolSandbox;
use crate::tools::ToolError;

/// Marker appended to reads cut at the byte cap.
pub const TRUNCATION_MARKER: &str = "\n\n[TRUNCATED]";

/// Result count used by the read fallback search.
const READ_FALLBACK_CANDIDATES: usize = 3;

impl ToolSandbox {
    /// Create or overwrite a file.
    ///
    /// An existing file is first renamed to `<name>.bak`. Missing parent
    /// directories are created.
    ///
    /// # Errors
    ///
    /// Resolution errors, or [`ToolError::Io`] on filesystem failure.
    pub fn create_file(&self, filename: &str, content: &str) -> Result<String, ToolError> {
        let target = self.resolve_file(filename)?;
        let path = target.absolute();

        if path.is_dir() {
            return Err(ToolError::Io(format!(
                "{} is a directory",
                target.relative()
            )));
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if path.exists() {
            let mut backup = path.as_os_str().to_owned();
            backup.push(".bak");
            std::fs::rename(path, &backup)?;
            tracing::debug!(file = target.relative(), "kept previous version as .bak");
        }
        std::fs::write(path, content)?;

        tracing::info!(file = target.relative(), bytes = content.len(), "file written");
        Ok(format!(
            "OK: wrote {} bytes to {}",
            content.len(),
            target.relative()
        ))
    }

    /// Read a text file, capped at `max_bytes` (default from config).
    ///
    /// When the resolved path does not exist and the request named no
    /// directory, the first fuzzy match anywhere under the root is read.
    ///
    /// # Errors
    ///
    /// [`ToolError::NotFound`] when nothing matches; resolution or I/O errors
    /// otherwise.
    pub fn read_file(&self, filename: &str, max_bytes: Option<usize>) -> Result<String, ToolError> {
        let target = self.parse_target(filename);
        let resolved = self.resolve_target_file(&target)?;

        let path = if resolved.absolute().is_file() {
            resolved.absolute().to_path_buf()
        } else if !target.has_separator() {
            let candidates = self.find_candidates(&target.name, READ_FALLBACK_CANDIDATES);
            match candidates.into_iter().next() {
                Some(found) => {
                    tracing::debug!(
                        requested = resolved.relative(),
                        found = %self.relative(&found),
                        "read fell back to search"
                    );
                    found
                }
                None => {
                    return Err(ToolError::NotFound(resolved.relative().to_owned()));
                }
            }
        } else {
            return Err(ToolError::NotFound(resolved.relative().to_owned()));
        };

        let bytes = std::fs::read(&path)?;
        let text = String::from_utf8_lossy(&bytes);
        Ok(truncate_text(&text, max_bytes.unwrap_or(self.read_max_bytes)))
    }

    /// List a directory: sorted root-relative entries, directories suffixed
    /// with `/`, or `(empty)`.
    ///
    /// # Errors
    ///
    /// [`ToolError::NotFound`] when the target is not a directory.
    pub fn list_dir(&self, path: &str) -> Result<String, ToolError> {
        let target = self.resolve_dir(path)?;
        let dir = target.absolute();
        if !dir.is_dir() {
            return Err(ToolError::NotFound(format!("directory {}", target.relative())));
        }

        let mut entries = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let full = entry.path();
            let mut rel = self.relative(&full);
            if full.is_dir() {
                rel.push('/');
            }
            entries.push(rel);
        }
        entries.sort();

        if entries.is_empty() {
            Ok("(empty)".to_owned())
        } else {
            Ok(entries.join("\n"))
        }
    }

    /// Find files under the root whose name contains `name`
    /// (case-insensitive), up to `limit` (default from config).
    pub fn find_file(&self, name: &str, limit: Option<usize>) -> Result<String, ToolError> {
        let query = self.parse_target(name).name;
        if query.is_empty() {
            return Err(ToolError::InvalidArguments("missing search name".into()));
        }
        let hits = self.find_candidates(&query, limit.unwrap_or(self.find_limit));
        if hits.is_empty() {
            return Ok("(no matches)".to_owned());
        }
        Ok(hits
            .iter()
            .map(|p| self.relative(p))
            .collect::<Vec<_>>()
            .join("\n"))
    }

    /// Walk the root in file-name order collecting files whose name contains `query`.
    fn find_candidates(&self, query: &str, limit: usize) -> Vec<std::path::PathBuf> {
        let query = query.to_lowercase();
        WalkDir::new(&self.root)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| {
                entry
                    .file_name()
                    .to_string_lossy()
                    .to_lowercase()
                    .contains(&query)
            })
            .map(|entry| entry.into_path())
            .filter(|path| within(path, &self.root))
            .take(limit)
            .collect()
    }
}

/// Walk results can only leave the root through links; canonical check.
fn within(path: &Path, root: &Path) -> bool {
    path.canonicalize()
        .map(|canonical| canonical.starts_with(root))
        .unwrap_or(false)
}

/// Cap `text` at `max_bytes` on a char boundary, appending the marker when cut.
pub fn truncate_text(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_owned();
    }
    let mut end = max_bytes;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}{TRUNCATION_MARKER}", &text[..end])
}
