use std::path::PathBuf;
use std::sync::Arc;

use axon_providers::ProviderEntry;
use axon_snapshot::SnapshotStore;
use axon_tools::ToolRegistry;
use axon_types::ports::{EmbeddingProvider, Sandbox, SecretVault, Storage, VectorStore};
use axon_types::KernelError;

/// Everything a caller must hand the Runtime at construction: the ports
/// it consumes from its embedding host (`storage`, `sandbox`, at least
/// one registered LLM provider) plus the optional ones spec.md marks with
/// `?` (`vectorStore`, `embeddings`, `secretVault`, `snapshotStore`).
/// Grounded on the reference engine binary's `build_state`, generalized
/// from owned concrete backends to the injected trait-object seams.
pub struct RuntimePorts {
    pub storage: Arc<dyn Storage>,
    pub sandbox: Arc<dyn Sandbox>,
    pub providers: Vec<ProviderEntry>,
    pub tools: ToolRegistry,
    pub vector_store: Option<Arc<dyn VectorStore>>,
    pub embeddings: Option<Arc<dyn EmbeddingProvider>>,
    pub secret_vault: Option<Arc<dyn SecretVault>>,
    pub snapshot_store: Option<Arc<SnapshotStore>>,
    pub workspace_root: PathBuf,
}

impl RuntimePorts {
    /// Rejects a Runtime construction with no LLM provider registered.
    /// `storage`/`sandbox` are required by their non-`Option` type; a
    /// caller with no real sandbox backend must still supply a stub.
    pub fn validate(&self) -> Result<(), KernelError> {
        if self.providers.is_empty() {
            return Err(KernelError::ValidationError(
                "Runtime requires at least one registered LLM provider".to_string(),
            ));
        }
        Ok(())
    }
}
