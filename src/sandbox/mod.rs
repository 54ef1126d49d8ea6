//! Filesystem sandbox for the file tools.
//!
//! Every path a tool touches is resolved through [`ToolSandbox`] and must
//! lie below the configured root. Names arrive from speech transcription,
//! so resolution also repairs spoken artifacts ("notes dot txt") and honours
//! directory hints ("in documents").

pub mod files;
pub mod path;

use std::path::{Path, PathBuf};

use crate::config::SandboxConfig;
use crate::error::{ElysiaError, Result};

pub use path::{SandboxPath, normalize_spoken};

/// Root-confined context for the file tools.
#[derive(Debug, Clone)]
pub struct ToolSandbox {
    root: PathBuf,
    workdir: PathBuf,
    default_extension: String,
    read_max_bytes: usize,
    find_limit: usize,
}

impl ToolSandbox {
    /// Build a sandbox from configuration.
    ///
    /// The root must exist. The working directory is created when missing and
    /// must lie inside the root.
    ///
    /// # Errors
    ///
    /// Returns [`ElysiaError::Config`] when the root is missing or the working
    /// directory falls outside it.
    pub fn new(config: &SandboxConfig) -> Result<Self> {
        let root = config.fs_root.canonicalize().map_err(|e| {
            ElysiaError::Config(format!(
                "sandbox root {} is not usable: {e}",
                config.fs_root.display()
            ))
        })?;

        let workdir = config.effective_workdir();
        std::fs::create_dir_all(&workdir)?;
        let workdir = workdir.canonicalize()?;
        if !workdir.starts_with(&root) {
            return Err(ElysiaError::Config(format!(
                "working directory {} is outside the sandbox root {}",
                workdir.display(),
                root.display()
            )));
        }

        Ok(Self {
            root,
            workdir,
            default_extension: config.default_extension.trim_start_matches('.').to_owned(),
            read_max_bytes: config.read_max_bytes,
            find_limit: config.find_limit,
        })
    }

    /// Canonical sandbox root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Canonical working directory used when no hint is given.
    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Default byte cap for reads.
    pub fn read_max_bytes(&self) -> usize {
        self.read_max_bytes
    }

    /// Default match count for searches.
    pub fn find_limit(&self) -> usize {
        self.find_limit
    }

    /// Root-relative display form with `/` separators.
    pub fn relative(&self, path: &Path) -> String {
        let rel = path.strip_prefix(&self.root).unwrap_or(path);
        let parts: Vec<String> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        if parts.is_empty() {
            ".".to_owned()
        } else {
            parts.join("/")
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn creates_workdir_under_root() {
        let dir = tempfile::tempdir().unwrap();
        let config = SandboxConfig {
            fs_root: dir.path().to_path_buf(),
            ..SandboxConfig::default()
        };
        let sandbox = ToolSandbox::new(&config).unwrap();
        assert!(sandbox.workdir().is_dir());
        assert!(sandbox.workdir().starts_with(sandbox.root()));
        assert_eq!(sandbox.relative(sandbox.workdir()), "workspace");
        assert_eq!(sandbox.relative(sandbox.root()), ".");
    }

    #[test]
    fn rejects_missing_root() {
        let config = SandboxConfig {
            fs_root: PathBuf::from("/nonexistent/elysia/root"),
            ..SandboxConfig::default()
        };
        assert!(ToolSandbox::new(&config).is_err());
    }

    #[test]
    fn rejects_workdir_outside_root() {
        let root = tempfile::tempdir().unwrap();
        let other = tempfile::tempdir().unwrap();
        let config = SandboxConfig {
            fs_root: root.path().to_path_buf(),
            workdir: Some(other.path().to_path_buf()),
            ..SandboxConfig::default()
        };
        let err = ToolSandbox::new(&config).unwrap_err();
        assert!(err.to_string().contains("outside the sandbox root"));
    }
}
