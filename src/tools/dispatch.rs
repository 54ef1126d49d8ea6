//! Execution of bound tool invocations.
//!
//! The dispatcher owns the sandbox and the macro store. Every outcome is a
//! string: success text from the tool, or an `ERROR:` line rendered from
//! [`ToolError`]. Nothing here panics or propagates a tool failure.

use std::sync::{Arc, Mutex};

use serde_json::{Map, Value};

use super::error::ToolError;
use super::registry::{ToolInvocation, ToolKind};
use super::tool_code::ToolCall;
use crate::config::SandboxConfig;
use crate::macros::MacroStore;
use crate::sandbox::ToolSandbox;

/// Nesting limit for `run_macro` calls made from inside a macro.
pub const MAX_MACRO_DEPTH: usize = 4;

/// Runs tool invocations against a sandbox and a macro store.
#[derive(Debug)]
pub struct ToolDispatcher {
    sandbox: ToolSandbox,
    macros: Mutex<MacroStore>,
}

impl ToolDispatcher {
    pub fn new(sandbox: ToolSandbox, macros: MacroStore) -> Self {
        Self {
            sandbox,
            macros: Mutex::new(macros),
        }
    }

    /// Build the sandbox and open the macro store from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the sandbox root is unusable.
    pub fn from_config(config: &SandboxConfig) -> crate::error::Result<Self> {
        let sandbox = ToolSandbox::new(config)?;
        let macros = MacroStore::open(config.macro_path(), config.max_macros);
        tracing::debug!(
            path = %macros.path().display(),
            count = macros.len(),
            "macro store loaded"
        );
        Ok(Self::new(sandbox, macros))
    }

    pub fn sandbox(&self) -> &ToolSandbox {
        &self.sandbox
    }

    /// Run one invocation and render the outcome.
    pub fn execute(&self, invocation: &ToolInvocation) -> String {
        match self.run(invocation, 0) {
            Ok(out) => out,
            Err(e) => {
                tracing::warn!(tool = invocation.kind.name(), "tool failed: {e}");
                e.render()
            }
        }
    }

    /// Bind and run one parsed call line (or render its parse error).
    pub fn execute_call(&self, call: Result<ToolCall, ToolError>) -> String {
        let bound = call.and_then(|c| ToolInvocation::bind(&c.name, &c.kwargs));
        match bound {
            Ok(invocation) => self.execute(&invocation),
            Err(e) => {
                tracing::warn!("rejected tool line: {e}");
                e.render()
            }
        }
    }

    /// [`execute_call`](Self::execute_call) on the blocking pool.
    pub async fn execute_call_blocking(
        self: &Arc<Self>,
        call: Result<ToolCall, ToolError>,
    ) -> String {
        let this = Arc::clone(self);
        match tokio::task::spawn_blocking(move || this.execute_call(call)).await {
            Ok(out) => out,
            Err(e) => ToolError::Io(format!("tool task failed: {e}")).render(),
        }
    }

    fn run(&self, invocation: &ToolInvocation, depth: usize) -> Result<String, ToolError> {
        tracing::debug!(tool = invocation.kind.name(), depth, "running tool");
        match invocation.kind {
            ToolKind::CreateFile => self.sandbox.create_file(
                invocation.text("filename").unwrap_or_default(),
                invocation.text("content").unwrap_or_default(),
            ),
            ToolKind::ReadFile => self.sandbox.read_file(
                invocation.text("filename").unwrap_or_default(),
                invocation.integer("max_bytes").map(saturating_usize),
            ),
            ToolKind::ListDir => self
                .sandbox
                .list_dir(invocation.text("path").unwrap_or_default()),
            ToolKind::FindFile => self.sandbox.find_file(
                invocation.text("name").unwrap_or_default(),
                invocation.integer("limit").map(saturating_usize),
            ),
            ToolKind::AddMacro => {
                let name = invocation.text("name").unwrap_or_default();
                let steps = invocation.list("steps").unwrap_or_default().to_vec();
                self.lock_macros()?.add(name, steps)
            }
            ToolKind::RemoveMacro => self
                .lock_macros()?
                .remove(invocation.text("name").unwrap_or_default()),
            ToolKind::ListMacros => {
                let store = self.lock_macros()?;
                let names = store.list();
                if names.is_empty() {
                    Ok("(no macros)".to_owned())
                } else {
                    Ok(names.join("\n"))
                }
            }
            ToolKind::RunMacro => {
                self.run_macro(invocation.text("name").unwrap_or_default(), depth)
            }
        }
    }

    /// Run each stored step in order, one result line per step.
    fn run_macro(&self, name: &str, depth: usize) -> Result<String, ToolError> {
        if depth >= MAX_MACRO_DEPTH {
            return Err(ToolError::Macro(format!(
                "macro '{name}' nested more than {MAX_MACRO_DEPTH} levels deep"
            )));
        }
        // Copy the steps out so steps that edit macros do not deadlock.
        let steps = self
            .lock_macros()?
            .get(name)
            .map(<[Value]>::to_vec)
            .ok_or_else(|| ToolError::NotFound(format!("macro '{}'", name.trim())))?;

        tracing::info!(name, steps = steps.len(), depth, "running macro");
        let lines: Vec<String> = steps
            .iter()
            .enumerate()
            .map(|(i, step)| {
                step_invocation(i + 1, step)
                    .and_then(|inv| self.run(&inv, depth + 1))
                    .unwrap_or_else(|e| e.render())
            })
            .collect();
        Ok(lines.join("\n"))
    }

    fn lock_macros(&self) -> Result<std::sync::MutexGuard<'_, MacroStore>, ToolError> {
        self.macros
            .lock()
            .map_err(|_| ToolError::Macro("macro store is unavailable".into()))
    }
}

/// Validate a stored step (`{"tool": name, "kwargs": {...}}`) and bind it.
fn step_invocation(index: usize, step: &Value) -> Result<ToolInvocation, ToolError> {
    let invalid = |why: &str| ToolError::InvalidArguments(format!("step {index} invalid: {why}"));
    let obj = step.as_object().ok_or_else(|| invalid("not a mapping"))?;
    let tool = obj
        .get("tool")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid("missing 'tool' name"))?;
    let empty = Map::new();
    let kwargs = match obj.get("kwargs") {
        None | Some(Value::Null) => &empty,
        Some(Value::Object(kwargs)) => kwargs,
        Some(_) => return Err(invalid("'kwargs' must be a mapping")),
    };
    ToolInvocation::bind(tool, kwargs)
}

fn saturating_usize(n: u64) -> usize {
    usize::try_from(n).unwrap_or(usize::MAX)
}
