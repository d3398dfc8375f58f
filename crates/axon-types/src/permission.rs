use serde::{Deserialize, Serialize};

/// The closed set of module-facing permissions.
///
/// This enum is exhaustive by design: the Permission Engine never asks a
/// provider for an additional permission at runtime, so any new host
/// capability must be added here deliberately rather than represented as a
/// free-form string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    AiGenerate,
    AiStream,
    StorageRead,
    StorageWrite,
    NetworkFetch,
    MemoryRead,
    MemoryWrite,
    MemorySharedWrite,
    ComputerScreenshot,
    ComputerInput,
    ComputerClipboard,
    ComputerShell,
    ComputerFiles,
    UiNotify,
    UiDashboard,
    ToolExecute,
    AgentCall,
    Filesystem,
}

impl Permission {
    pub const ALL: &'static [Permission] = &[
        Permission::AiGenerate,
        Permission::AiStream,
        Permission::StorageRead,
        Permission::StorageWrite,
        Permission::NetworkFetch,
        Permission::MemoryRead,
        Permission::MemoryWrite,
        Permission::MemorySharedWrite,
        Permission::ComputerScreenshot,
        Permission::ComputerInput,
        Permission::ComputerClipboard,
        Permission::ComputerShell,
        Permission::ComputerFiles,
        Permission::UiNotify,
        Permission::UiDashboard,
        Permission::ToolExecute,
        Permission::AgentCall,
        Permission::Filesystem,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::AiGenerate => "ai_generate",
            Permission::AiStream => "ai_stream",
            Permission::StorageRead => "storage_read",
            Permission::StorageWrite => "storage_write",
            Permission::NetworkFetch => "network_fetch",
            Permission::MemoryRead => "memory_read",
            Permission::MemoryWrite => "memory_write",
            Permission::MemorySharedWrite => "memory_shared_write",
            Permission::ComputerScreenshot => "computer_screenshot",
            Permission::ComputerInput => "computer_input",
            Permission::ComputerClipboard => "computer_clipboard",
            Permission::ComputerShell => "computer_shell",
            Permission::ComputerFiles => "computer_files",
            Permission::UiNotify => "ui_notify",
            Permission::UiDashboard => "ui_dashboard",
            Permission::ToolExecute => "tool_execute",
            Permission::AgentCall => "agent_call",
            Permission::Filesystem => "filesystem",
        }
    }

    pub fn parse(raw: &str) -> Option<Permission> {
        Permission::ALL
            .iter()
            .copied()
            .find(|perm| perm.as_str() == raw)
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
