//! Static tool table: names, aliases, and keyword shapes.
//!
//! Dispatch by name resolves to a closed [`ToolKind`]. Argument binding
//! happens here so that a [`ToolInvocation`] is always well-formed: every
//! keyword maps to a declared parameter (aliases folded to the canonical
//! name), values have the declared type, and required parameters are present.

use serde_json::{Map, Value};

use super::error::ToolError;

/// The fixed set of tools the assistant may call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    CreateFile,
    ReadFile,
    ListDir,
    FindFile,
    AddMacro,
    RemoveMacro,
    ListMacros,
    RunMacro,
}

impl ToolKind {
    /// Canonical tool name.
    pub fn name(self) -> &'static str {
        self.spec().name
    }

    /// Descriptor for this tool.
    pub fn spec(self) -> &'static ToolSpec {
        // Every kind has exactly one entry in TOOL_SPECS.
        TOOL_SPECS
            .iter()
            .find(|s| s.kind == self)
            .unwrap_or(&TOOL_SPECS[0])
    }
}

/// Value type a parameter accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    /// String; numbers and booleans are accepted and stringified.
    Text,
    /// Non-negative integer; digit strings are accepted.
    Integer,
    /// List of values.
    List,
}

impl ParamType {
    fn json_type(self) -> &'static str {
        match self {
            Self::Text => "string",
            Self::Integer => "integer",
            Self::List => "array",
        }
    }
}

/// One keyword parameter of a tool.
#[derive(Debug)]
pub struct ParamSpec {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub ty: ParamType,
    pub required: bool,
    pub description: &'static str,
}

impl ParamSpec {
    fn matches(&self, keyword: &str) -> bool {
        self.name == keyword || self.aliases.contains(&keyword)
    }
}

/// Descriptor of one tool.
#[derive(Debug)]
pub struct ToolSpec {
    pub kind: ToolKind,
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub description: &'static str,
    pub params: &'static [ParamSpec],
}

const FILENAME_ALIASES: &[&str] = &["path", "name", "file", "filepath", "file_path", "target"];

/// All tools, in listing order.
pub static TOOL_SPECS: &[ToolSpec] = &[
    ToolSpec {
        kind: ToolKind::CreateFile,
        name: "create_file",
        aliases: &["edit_file"],
        description: "Create or overwrite a text file (an existing file is kept as <name>.bak)",
        params: &[
            ParamSpec {
                name: "filename",
                aliases: FILENAME_ALIASES,
                ty: ParamType::Text,
                required: true,
                description: "File name or path; spoken forms like 'notes dot txt in documents' are understood",
            },
            ParamSpec {
                name: "content",
                aliases: &["text", "body", "data", "contents", "value"],
                ty: ParamType::Text,
                required: false,
                description: "Text to write (default empty)",
            },
        ],
    },
    ToolSpec {
        kind: ToolKind::ReadFile,
        name: "read_file",
        aliases: &["read", "cat"],
        description: "Read a text file",
        params: &[
            ParamSpec {
                name: "filename",
                aliases: FILENAME_ALIASES,
                ty: ParamType::Text,
                required: true,
                description: "File name or path",
            },
            ParamSpec {
                name: "max_bytes",
                aliases: &[],
                ty: ParamType::Integer,
                required: false,
                description: "Maximum bytes to return",
            },
        ],
    },
    ToolSpec {
        kind: ToolKind::ListDir,
        name: "list_dir",
        aliases: &["ls"],
        description: "List a directory",
        params: &[ParamSpec {
            name: "path",
            aliases: &["dir", "directory", "folder"],
            ty: ParamType::Text,
            required: false,
            description: "Directory to list (default: the working directory)",
        }],
    },
    ToolSpec {
        kind: ToolKind::FindFile,
        name: "find_file",
        aliases: &["find"],
        description: "Find files whose name contains a substring",
        params: &[
            ParamSpec {
                name: "name",
                aliases: &["query", "filename", "pattern"],
                ty: ParamType::Text,
                required: true,
                description: "Substring to look for in file names",
            },
            ParamSpec {
                name: "limit",
                aliases: &[],
                ty: ParamType::Integer,
                required: false,
                description: "Maximum number of matches",
            },
        ],
    },
    ToolSpec {
        kind: ToolKind::AddMacro,
        name: "add_macro_tool",
        aliases: &["add_macro"],
        description: "Save a named macro: a list of {'tool': name, 'kwargs': {...}} steps",
        params: &[
            ParamSpec {
                name: "name",
                aliases: &[],
                ty: ParamType::Text,
                required: true,
                description: "Macro name",
            },
            ParamSpec {
                name: "steps",
                aliases: &[],
                ty: ParamType::List,
                required: true,
                description: "Ordered list of tool steps",
            },
        ],
    },
    ToolSpec {
        kind: ToolKind::RemoveMacro,
        name: "remove_macro_tool",
        aliases: &["remove_macro"],
        description: "Delete a saved macro",
        params: &[ParamSpec {
            name: "name",
            aliases: &[],
            ty: ParamType::Text,
            required: true,
            description: "Macro name",
        }],
    },
    ToolSpec {
        kind: ToolKind::ListMacros,
        name: "list_macros",
        aliases: &[],
        description: "List saved macro names",
        params: &[],
    },
    ToolSpec {
        kind: ToolKind::RunMacro,
        name: "run_macro",
        aliases: &[],
        description: "Run a saved macro step by step",
        params: &[ParamSpec {
            name: "name",
            aliases: &[],
            ty: ParamType::Text,
            required: true,
            description: "Macro name",
        }],
    },
];

/// Resolve a tool name or alias.
pub fn lookup(name: &str) -> Option<&'static ToolSpec> {
    let name = name.trim();
    TOOL_SPECS
        .iter()
        .find(|s| s.name == name || s.aliases.contains(&name))
}

/// A validated tool call with arguments keyed by canonical parameter name.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub kind: ToolKind,
    args: Map<String, Value>,
}

impl ToolInvocation {
    /// Resolve `name` and bind `kwargs` against its declared parameters.
    ///
    /// # Errors
    ///
    /// [`ToolError::UnknownTool`] when the name does not resolve;
    /// [`ToolError::InvalidArguments`] for unexpected, repeated, mistyped,
    /// or missing arguments.
    pub fn bind(name: &str, kwargs: &Map<String, Value>) -> Result<Self, ToolError> {
        let spec = lookup(name).ok_or_else(|| ToolError::UnknownTool(name.trim().to_owned()))?;
        let mut args = Map::new();

        for (keyword, value) in kwargs {
            let param = spec
                .params
                .iter()
                .find(|p| p.matches(keyword))
                .ok_or_else(|| {
                    ToolError::InvalidArguments(format!(
                        "unexpected keyword argument '{keyword}' for {}",
                        spec.name
                    ))
                })?;
            if args.contains_key(param.name) {
                return Err(ToolError::InvalidArguments(format!(
                    "argument '{}' given more than once for {}",
                    param.name, spec.name
                )));
            }
            if let Some(value) = coerce(spec, param, value)? {
                args.insert(param.name.to_owned(), value);
            }
        }

        if let Some(missing) = spec
            .params
            .iter()
            .find(|p| p.required && !args.contains_key(p.name))
        {
            return Err(ToolError::InvalidArguments(format!(
                "missing required argument '{}' for {}",
                missing.name, spec.name
            )));
        }

        Ok(Self {
            kind: spec.kind,
            args,
        })
    }

    /// Bound text argument.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.args.get(name).and_then(Value::as_str)
    }

    /// Bound integer argument.
    pub fn integer(&self, name: &str) -> Option<u64> {
        self.args.get(name).and_then(Value::as_u64)
    }

    /// Bound list argument.
    pub fn list(&self, name: &str) -> Option<&[Value]> {
        self.args
            .get(name)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
    }
}

/// Convert `value` to the parameter's type. `None` means "treat as absent".
fn coerce(spec: &ToolSpec, param: &ParamSpec, value: &Value) -> Result<Option<Value>, ToolError> {
    let mismatch = || {
        ToolError::InvalidArguments(format!(
            "argument '{}' for {} must be {}",
            param.name,
            spec.name,
            match param.ty {
                ParamType::Text => "text",
                ParamType::Integer => "a non-negative integer",
                ParamType::List => "a list",
            }
        ))
    };

    if value.is_null() {
        return Ok(None);
    }
    let coerced = match param.ty {
        ParamType::Text => match value {
            Value::String(s) => Value::String(s.clone()),
            Value::Number(n) => Value::String(n.to_string()),
            Value::Bool(b) => Value::String(b.to_string()),
            _ => return Err(mismatch()),
        },
        ParamType::Integer => {
            let n = match value {
                Value::Number(n) => n
                    .as_u64()
                    .or_else(|| n.as_f64().filter(|f| *f >= 0.0 && f.fract() == 0.0).map(|f| f as u64)),
                Value::String(s) => s.trim().parse::<u64>().ok(),
                _ => None,
            };
            Value::from(n.ok_or_else(mismatch)?)
        }
        ParamType::List => match value {
            Value::Array(items) => Value::Array(items.clone()),
            _ => return Err(mismatch()),
        },
    };
    Ok(Some(coerced))
}

/// Human-readable tool listing for the system instruction.
pub fn prompt_listing() -> String {
    let mut lines = Vec::with_capacity(TOOL_SPECS.len());
    for spec in TOOL_SPECS {
        let params: Vec<String> = spec
            .params
            .iter()
            .map(|p| {
                if p.required {
                    p.name.to_owned()
                } else {
                    format!("{}=...", p.name)
                }
            })
            .collect();
        let mut line = format!("- {}({}): {}", spec.name, params.join(", "), spec.description);
        if !spec.aliases.is_empty() {
            line.push_str(&format!(" (also: {})", spec.aliases.join(", ")));
        }
        lines.push(line);
    }
    lines.join("\n")
}

/// Tool schemas in the function-calling format accepted by chat backends.
pub fn schemas_for_api() -> Vec<Value> {
    TOOL_SPECS
        .iter()
        .map(|spec| {
            let mut properties = Map::new();
            for p in spec.params {
                let mut prop = serde_json::json!({
                    "type": p.ty.json_type(),
                    "description": p.description,
                });
                if p.ty == ParamType::List {
                    prop["items"] = serde_json::json!({"type": "object"});
                }
                properties.insert(p.name.to_owned(), prop);
            }
            let required: Vec<&str> = spec
                .params
                .iter()
                .filter(|p| p.required)
                .map(|p| p.name)
                .collect();
            serde_json::json!({
                "type": "function",
                "function": {
                    "name": spec.name,
                    "description": spec.description,
                    "parameters": {
                        "type": "object",
                        "properties": properties,
                        "required": required,
                    }
                }
            })
        })
        .collect()
}
