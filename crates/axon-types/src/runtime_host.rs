use serde::{Deserialize, Serialize};

/// Host environment facts a sandboxed tool call may need, independent of
/// which worker runs it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HostOs {
    Windows,
    Linux,
    Macos,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ShellFamily {
    Powershell,
    Posix,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PathStyle {
    Windows,
    Posix,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HostRuntimeContext {
    pub os: HostOs,
    pub arch: String,
    pub shell_family: ShellFamily,
    pub path_style: PathStyle,
}

/// Resource limits enforced by the Sandbox port around one tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxLimits {
    pub timeout_ms: u64,
    pub max_memory_bytes: u64,
    #[serde(default)]
    pub allowed_apis: Vec<String>,
    #[serde(default)]
    pub denied_apis: Vec<String>,
    #[serde(default)]
    pub network_enabled: bool,
    #[serde(default)]
    pub filesystem_enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxOutput {
    pub output: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
    pub memory_used_bytes: u64,
}
