use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// The closed error taxonomy surfaced by the kernel. Kept as a flat enum (rather
/// than per-crate error types propagating upward untyped) so the
/// propagation policy — which kinds are fatal vs. retried — can be decided
/// once, centrally, by the Worker and Lifecycle.
#[derive(Debug, Error, Clone, Serialize, Deserialize)]
pub enum KernelError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("validation error: {0}")]
    ValidationError(String),
    #[error("module not found: {0}")]
    ModuleNotFound(String),
    #[error("module install failed: {0}")]
    ModuleInstallFailed(String),
    #[error("module version incompatible: {0}")]
    ModuleVersionIncompatible(String),
    #[error("signature verification failed: {0}")]
    SignatureVerificationFailed(String),
    #[error("graph validation error: {0}")]
    GraphValidationError(String),
    #[error("graph iteration limit exceeded at node {node_id} ({limit})")]
    GraphIterationLimit { node_id: String, limit: u32 },
    #[error("provider error: {0}")]
    ProviderError(String),
    #[error("rate limited: {0}")]
    RateLimit(String),
    #[error("timed out: {0}")]
    Timeout(String),
    #[error("tool execution error: {0}")]
    ToolExecutionError(String),
    #[error("tool timed out after {timeout_ms}ms")]
    ToolTimeout { timeout_ms: u64 },
    #[error("tool resource limit exceeded: {0}")]
    ToolResourceExceeded(String),
    #[error("budget exceeded: {0}")]
    BudgetExceeded(String),
    #[error("sandbox error: {0}")]
    SandboxError(String),
    #[error("transport error: {0}")]
    TransportError(String),
}

impl KernelError {
    /// These kinds are fatal: no retry, transition straight to `failed`
    /// then `snapshot_persisted`.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            KernelError::PermissionDenied(_)
                | KernelError::ValidationError(_)
                | KernelError::BudgetExceeded(_)
                | KernelError::GraphIterationLimit { .. }
                | KernelError::SignatureVerificationFailed(_)
        )
    }

    /// Transient errors get retried through the provider's fallback chain
    /// before escalating to `failed`.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            KernelError::RateLimit(_) | KernelError::ProviderError(_) | KernelError::TransportError(_)
        )
    }

    pub fn code(&self) -> &'static str {
        match self {
            KernelError::PermissionDenied(_) => "permission_denied",
            KernelError::ValidationError(_) => "validation_error",
            KernelError::ModuleNotFound(_) => "module_not_found",
            KernelError::ModuleInstallFailed(_) => "module_install_failed",
            KernelError::ModuleVersionIncompatible(_) => "module_version_incompatible",
            KernelError::SignatureVerificationFailed(_) => "signature_verification_failed",
            KernelError::GraphValidationError(_) => "graph_validation_error",
            KernelError::GraphIterationLimit { .. } => "graph_iteration_limit",
            KernelError::ProviderError(_) => "provider_error",
            KernelError::RateLimit(_) => "rate_limit",
            KernelError::Timeout(_) => "timeout",
            KernelError::ToolExecutionError(_) => "tool_execution_error",
            KernelError::ToolTimeout { .. } => "tool_timeout",
            KernelError::ToolResourceExceeded(_) => "tool_resource_exceeded",
            KernelError::BudgetExceeded(_) => "budget_exceeded",
            KernelError::SandboxError(_) => "sandbox_error",
            KernelError::TransportError(_) => "transport_error",
        }
    }

    /// User-visible failure shape carried by every terminal `failed` event.
    pub fn to_failure_detail(&self) -> FailureDetail {
        FailureDetail {
            code: self.code().to_string(),
            message: self.to_string(),
            details: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureDetail {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}
