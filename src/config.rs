//! Configuration types for the voice-turn core.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration for an elysia session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ElysiaConfig {
    /// File-tool sandbox settings.
    pub sandbox: SandboxConfig,
    /// Language model settings.
    pub llm: LlmConfig,
    /// Conversation memory settings.
    pub memory: MemoryConfig,
    /// Turn loop settings (exit phrases, farewell).
    pub conversation: ConversationConfig,
    /// WebSocket observer transport.
    pub transport: TransportConfig,
    /// Log output settings.
    pub logging: LoggingConfig,
}

/// Sandbox configuration for the file tools.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Every file operation is confined below this directory.
    pub fs_root: PathBuf,
    /// Default directory for relative names. `None` means `<fs_root>/workspace`.
    pub workdir: Option<PathBuf>,
    /// Extension appended to bare names such as "notes".
    pub default_extension: String,
    /// Default byte cap for `read_file`.
    pub read_max_bytes: usize,
    /// Default result count for `find_file`.
    pub find_limit: usize,
    /// Maximum number of stored macros.
    pub max_macros: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            fs_root: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            workdir: None,
            default_extension: "txt".to_owned(),
            read_max_bytes: 200_000,
            find_limit: 10,
            max_macros: 64,
        }
    }
}

impl SandboxConfig {
    /// The effective working directory for names without a directory hint.
    pub fn effective_workdir(&self) -> PathBuf {
        match &self.workdir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => self.fs_root.join(dir),
            None => self.fs_root.join("workspace"),
        }
    }

    /// Location of the persisted macro table.
    pub fn macro_path(&self) -> PathBuf {
        self.effective_workdir().join("macros.json")
    }
}

/// Language model configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL of the Ollama server.
    pub api_url: String,
    /// Model name to request.
    pub model: String,
    /// Maximum wait for the next response object of a turn, in seconds.
    pub response_timeout_secs: u64,
    /// Maximum wait for the next text fragment of a response, in seconds.
    pub token_timeout_secs: u64,
    /// Send tool schemas to the backend and translate native tool calls
    /// into `tool_code` text.
    ///
    /// Off by default: many small local models reject tool schemas.
    pub native_tools: bool,
    /// Sampling temperature.
    pub temperature: f64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:11434".to_owned(),
            model: "orieg/gemma3-tools:1b-it-qat".to_owned(),
            response_timeout_secs: 45,
            token_timeout_secs: 50,
            native_tools: false,
            temperature: 0.7,
        }
    }
}

/// Conversation memory configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// SQLite database file.
    pub db_path: PathBuf,
    /// Maximum entries pulled from search and from recent history each.
    pub recall_max_results: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            db_path: default_data_dir().join("memory.sqlite"),
            recall_max_results: 4,
        }
    }
}

/// Turn loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    /// Utterances that end the session (compared case-insensitively).
    pub exit_phrases: Vec<String>,
    /// Spoken before the session ends.
    pub farewell: String,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            exit_phrases: ["exit", "quit", "bye", "goodbye"]
                .into_iter()
                .map(str::to_owned)
                .collect(),
            farewell: "Goodbye!".to_owned(),
        }
    }
}

/// WebSocket transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Listen address for observer connections.
    pub bind_addr: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8000".to_owned(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Also write a daily rolling log file.
    pub file_logging: bool,
    /// Directory for rolling log files.
    pub log_dir: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            file_logging: true,
            log_dir: default_data_dir().join("logs"),
        }
    }
}

/// Returns `~/.elysia/`.
fn default_data_dir() -> PathBuf {
    if let Some(home) = dirs::home_dir() {
        home.join(".elysia")
    } else {
        PathBuf::from("/tmp").join(".elysia")
    }
}

impl ElysiaConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::error::ElysiaError::Config(e.to_string()))
    }

    /// Load from `path` when it exists, otherwise start from defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be parsed.
    pub fn load_or_default(path: &Path) -> crate::error::Result<Self> {
        if path.is_file() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::ElysiaError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `~/.config/elysia/config.toml`.
    pub fn default_config_path() -> PathBuf {
        if let Some(config) = std::env::var_os("XDG_CONFIG_HOME") {
            PathBuf::from(config).join("elysia").join("config.toml")
        } else if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join("elysia")
                .join("config.toml")
        } else {
            PathBuf::from("/tmp/elysia-config/config.toml")
        }
    }

    /// Apply `ELYSIA_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply `ELYSIA_*` overrides using an arbitrary variable lookup.
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(model) = non_empty("ELYSIA_MODEL") {
            self.llm.model = model;
        }
        if let Some(root) = non_empty("ELYSIA_FS_ROOT") {
            self.sandbox.fs_root = PathBuf::from(root);
        }
        if let Some(workdir) = non_empty("ELYSIA_WORKDIR") {
            self.sandbox.workdir = Some(PathBuf::from(workdir));
        }
        if let Some(bind) = non_empty("ELYSIA_BIND") {
            self.transport.bind_addr = bind;
        }
    }
}
