use std::collections::HashMap;
use std::sync::Arc;

use tiktoken_rs::CoreBPE;
use tokio::sync::RwLock;

use axon_types::{ChatMessage, KernelError};

/// Per-execution rolling conversation buffer. Grounded on the reference
/// platform's `chunking.rs` tokenizer (`cl100k_base`, `count_tokens`),
/// generalized from chunking file content to bounding a live message
/// history.
#[derive(Clone)]
pub struct WorkingMemory {
    buffers: Arc<RwLock<HashMap<String, Vec<ChatMessage>>>>,
    tokenizer: Arc<CoreBPE>,
}

impl WorkingMemory {
    pub fn new() -> Result<Self, KernelError> {
        let tokenizer = tiktoken_rs::cl100k_base()
            .map_err(|err| KernelError::ValidationError(format!("failed to load tokenizer: {err}")))?;
        Ok(Self { buffers: Arc::new(RwLock::new(HashMap::new())), tokenizer: Arc::new(tokenizer) })
    }

    pub async fn append_message(&self, execution_id: &str, message: ChatMessage) {
        self.buffers.write().await.entry(execution_id.to_string()).or_default().push(message);
    }

    pub async fn get_conversation_history(&self, execution_id: &str) -> Vec<ChatMessage> {
        self.buffers.read().await.get(execution_id).cloned().unwrap_or_default()
    }

    fn count_tokens(&self, text: &str) -> usize {
        self.tokenizer.encode_ordinary(text).len()
    }

    /// Drops the oldest messages and replaces them with one synthetic
    /// summary message until the buffer's estimated token count is at or
    /// under `max_tokens`. A buffer already within budget is untouched.
    pub async fn compact(&self, execution_id: &str, max_tokens: usize) {
        let mut buffers = self.buffers.write().await;
        let Some(messages) = buffers.get_mut(execution_id) else { return };

        let total = |msgs: &[ChatMessage], tokenizer: &CoreBPE| -> usize {
            msgs.iter().map(|m| tokenizer.encode_ordinary(&m.content).len()).sum()
        };

        if total(messages, &self.tokenizer) <= max_tokens {
            return;
        }

        let mut dropped = 0usize;
        while messages.len() > 1 && total(messages, &self.tokenizer) > max_tokens {
            messages.remove(0);
            dropped += 1;
        }

        if dropped > 0 {
            messages.insert(
                0,
                ChatMessage {
                    role: "system".to_string(),
                    content: format!("[summary] {dropped} earlier message(s) omitted to stay within budget"),
                },
            );
        }
    }

    pub fn estimate_tokens(&self, text: &str) -> usize {
        self.count_tokens(text)
    }
}

impl Default for WorkingMemory {
    fn default() -> Self {
        Self::new().expect("cl100k_base tokenizer must load")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(content: &str) -> ChatMessage {
        ChatMessage { role: "user".to_string(), content: content.to_string() }
    }

    #[tokio::test]
    async fn appended_messages_are_returned_in_order() {
        let memory = WorkingMemory::new().unwrap();
        memory.append_message("exec-1", msg("first")).await;
        memory.append_message("exec-1", msg("second")).await;

        let history = memory.get_conversation_history("exec-1").await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content, "first");
        assert_eq!(history[1].content, "second");
    }

    #[tokio::test]
    async fn compact_is_a_no_op_under_budget() {
        let memory = WorkingMemory::new().unwrap();
        memory.append_message("exec-1", msg("short")).await;
        memory.compact("exec-1", 10_000).await;
        assert_eq!(memory.get_conversation_history("exec-1").await.len(), 1);
    }

    #[tokio::test]
    async fn compact_drops_oldest_messages_once_over_budget() {
        let memory = WorkingMemory::new().unwrap();
        for i in 0..50 {
            memory.append_message("exec-1", msg(&format!("message number {i} with some padding text"))).await;
        }
        memory.compact("exec-1", 20).await;

        let history = memory.get_conversation_history("exec-1").await;
        assert!(history.len() < 50);
        assert!(history[0].content.starts_with("[summary]"));
    }
}
