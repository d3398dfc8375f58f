use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::RwLock;

use axon_types::ports::Sandbox;
use axon_types::{KernelError, SandboxLimits, ToolSchema};

/// A registered tool. Immutable once built: registration replaces the
/// whole entry rather than mutating fields on an existing one, so a
/// handle returned by `ToolRegistry::get` never changes under its caller.
#[derive(Debug, Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    /// Source the Sandbox port executes for this tool. The executor never
    /// interprets it; only the injected sandbox implementation does.
    pub code: String,
    pub limits: SandboxLimits,
}

impl ToolDefinition {
    pub fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name.clone(),
            description: self.description.clone(),
            input_schema: self.input_schema.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ToolResult {
    pub success: bool,
    pub output: Value,
    pub error: Option<String>,
    pub duration_ms: u64,
}

/// Registrable set of tool definitions. Grounded on the reference
/// platform's `ToolRegistry` (a name-keyed map behind a single `RwLock`),
/// generalized from a fixed built-in tool set to one populated entirely
/// by the embedding host at startup.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Arc<RwLock<HashMap<String, Arc<ToolDefinition>>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Arc::new(RwLock::new(HashMap::new())) }
    }

    pub async fn register(&self, tool: ToolDefinition) {
        self.tools.write().await.insert(tool.name.clone(), Arc::new(tool));
    }

    pub async fn get(&self, name: &str) -> Option<Arc<ToolDefinition>> {
        self.tools.read().await.get(name).cloned()
    }

    pub async fn list(&self) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> =
            self.tools.read().await.values().map(|t| t.schema()).collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }
}

/// Checks `input` against a tool's declared JSON Schema. Supports the
/// subset the kernel's tool schemas actually use: `type`, `required`,
/// `properties`, `items`, `enum`. Unknown keywords are ignored rather
/// than rejected, matching a permissive-by-default validator.
pub fn validate_input(schema: &Value, input: &Value) -> Result<(), KernelError> {
    validate_node("$", schema, input)
}

fn validate_node(path: &str, schema: &Value, input: &Value) -> Result<(), KernelError> {
    let Some(obj) = schema.as_object() else { return Ok(()) };

    if let Some(expected) = obj.get("type").and_then(|t| t.as_str()) {
        if !matches_type(expected, input) {
            return Err(KernelError::ValidationError(format!(
                "{path}: expected type `{expected}`, got `{}`",
                type_name(input)
            )));
        }
    }

    if let Some(allowed) = obj.get("enum").and_then(|v| v.as_array()) {
        if !allowed.contains(input) {
            return Err(KernelError::ValidationError(format!("{path}: value not in enum")));
        }
    }

    if let Some(required) = obj.get("required").and_then(|v| v.as_array()) {
        let Some(input_obj) = input.as_object() else {
            return Err(KernelError::ValidationError(format!("{path}: expected an object")));
        };
        for key in required {
            let Some(key) = key.as_str() else { continue };
            if !input_obj.contains_key(key) {
                return Err(KernelError::ValidationError(format!(
                    "{path}: missing required field `{key}`"
                )));
            }
        }
    }

    if let Some(props) = obj.get("properties").and_then(|v| v.as_object()) {
        if let Some(input_obj) = input.as_object() {
            for (key, child_schema) in props {
                if let Some(child_value) = input_obj.get(key) {
                    validate_node(&format!("{path}.{key}"), child_schema, child_value)?;
                }
            }
        }
    }

    if let Some(items_schema) = obj.get("items") {
        if let Some(items) = input.as_array() {
            for (idx, item) in items.iter().enumerate() {
                validate_node(&format!("{path}[{idx}]"), items_schema, item)?;
            }
        }
    }

    Ok(())
}

fn matches_type(expected: &str, value: &Value) -> bool {
    match expected {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.as_i64().is_some() || value.as_u64().is_some(),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Object(_) => "object",
        Value::Array(_) => "array",
        Value::String(_) => "string",
        Value::Number(_) => "number",
        Value::Bool(_) => "boolean",
        Value::Null => "null",
    }
}

/// Runs registered tools inside the injected Sandbox port. Tool results
/// are never transformed: whatever the sandbox returns as `output`
/// reaches the caller as-is.
#[derive(Clone)]
pub struct ToolExecutor {
    registry: ToolRegistry,
    sandbox: Arc<dyn Sandbox>,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry, sandbox: Arc<dyn Sandbox>) -> Self {
        Self { registry, sandbox }
    }

    pub async fn validate(&self, tool_name: &str, input: &Value) -> Result<(), KernelError> {
        let tool = self
            .registry
            .get(tool_name)
            .await
            .ok_or_else(|| KernelError::ToolExecutionError(format!("unknown tool `{tool_name}`")))?;
        validate_input(&tool.input_schema, input)
    }

    /// On timeout the sandbox call is dropped (cancelling the in-flight
    /// future) and the result reports `{success:false, error:"timeout"}`
    /// with `durationMs` equal to the configured `timeoutMs`.
    pub async fn execute(&self, tool_name: &str, input: Value) -> Result<ToolResult, KernelError> {
        let tool = self
            .registry
            .get(tool_name)
            .await
            .ok_or_else(|| KernelError::ToolExecutionError(format!("unknown tool `{tool_name}`")))?;

        validate_input(&tool.input_schema, &input)?;

        let timeout = Duration::from_millis(tool.limits.timeout_ms);
        let outcome = tokio::time::timeout(
            timeout,
            self.sandbox.execute(&tool.code, input, &tool.limits),
        )
        .await;

        match outcome {
            Ok(Ok(output)) => Ok(ToolResult {
                success: output.error.is_none(),
                output: output.output,
                error: output.error,
                duration_ms: output.duration_ms,
            }),
            Ok(Err(err)) => Ok(ToolResult {
                success: false,
                output: json!(null),
                error: Some(err.to_string()),
                duration_ms: 0,
            }),
            Err(_) => Ok(ToolResult {
                success: false,
                output: json!(null),
                error: Some("timeout".to_string()),
                duration_ms: tool.limits.timeout_ms,
            }),
        }
    }
}
