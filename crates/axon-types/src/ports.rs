//! Port traits the kernel consumes from its embedding host.
//!
//! These are the seams the Runtime is constructed from. Concrete
//! implementations live outside this crate (a desktop app's key-value
//! store, a cloud vector database, a real LLM HTTP client, ...); the kernel
//! only ever depends on these trait objects.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;

use crate::errors::KernelError;
use crate::provider::{CompletionRequest, CompletionResponse};
use crate::runtime_host::{SandboxLimits, SandboxOutput};

/// Generic key-value storage over string keys and JSON values.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, KernelError>;
    async fn set(&self, key: &str, value: Value) -> Result<(), KernelError>;
    async fn delete(&self, key: &str) -> Result<(), KernelError>;
    async fn has(&self, key: &str) -> Result<bool, KernelError>;
    async fn keys(&self, prefix: Option<&str>) -> Result<Vec<String>, KernelError>;
    async fn clear(&self) -> Result<(), KernelError>;
}

/// A single named LLM backend the Provider Router can select among.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn id(&self) -> &str;
    async fn generate(&self, req: &CompletionRequest) -> Result<CompletionResponse, KernelError>;
    async fn generate_stream(
        &self,
        req: &CompletionRequest,
    ) -> Result<BoxStream<'static, Result<StreamChunk, KernelError>>, KernelError>;
}

#[derive(Debug, Clone)]
pub enum StreamChunk {
    TextDelta(String),
    ToolCallDelta { id: String, args_delta: String },
    Done(CompletionResponse),
}

/// Resource-limited execution of sandboxed tool code.
#[async_trait]
pub trait Sandbox: Send + Sync {
    async fn execute(
        &self,
        code: &str,
        context: Value,
        limits: &SandboxLimits,
    ) -> Result<SandboxOutput, KernelError>;
}

#[derive(Debug, Clone)]
pub struct VectorMatch {
    pub id: String,
    pub score: f32,
}

/// Approximate nearest-neighbour index, consumed by the Memory Manager's
/// long-term layer. Optional: when absent, semantic search is unavailable
/// but other memory tiers still function.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn upsert(&self, id: &str, vector: &[f32], meta: Value) -> Result<(), KernelError>;
    async fn search(&self, vector: &[f32], top_k: usize) -> Result<Vec<VectorMatch>, KernelError>;
    async fn delete(&self, id: &str) -> Result<(), KernelError>;
}

/// Text -> vector embedding backend, consumed by the Memory Manager.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn dimension(&self) -> usize;
    async fn embed(&self, text: &str) -> Result<Vec<f32>, KernelError>;
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, KernelError>;
}

/// Secret storage, optional.
#[async_trait]
pub trait SecretVault: Send + Sync {
    async fn store(&self, key: &str, value: &str) -> Result<(), KernelError>;
    async fn retrieve(&self, key: &str) -> Result<Option<String>, KernelError>;
    async fn delete(&self, key: &str) -> Result<(), KernelError>;
    async fn exists(&self, key: &str) -> Result<bool, KernelError>;
    async fn list(&self) -> Result<Vec<String>, KernelError>;
    async fn rotate(&self, key: &str, new_value: &str) -> Result<(), KernelError>;
}
