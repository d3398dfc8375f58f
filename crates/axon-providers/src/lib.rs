use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;

use futures::stream::BoxStream;
use serde_json::json;
use tokio::sync::RwLock;

use axon_budget::{BudgetManager, BudgetScope, UsageDelta};
use axon_core::EventBus;
use axon_types::{CompletionRequest, CompletionResponse, KernelError, KernelEvent, RoutingStrategy};
use axon_types::ports::{LlmProvider, StreamChunk};

/// A registered backend plus the metadata the router needs to rank it
/// against sibling providers serving the same model.
#[derive(Clone)]
pub struct ProviderEntry {
    pub provider: Arc<dyn LlmProvider>,
    pub priority: i32,
    pub cost_per_1k_tokens: f64,
    pub avg_latency_ms: f64,
    /// Model ids this entry can serve. Empty means "serves any model".
    pub supported_models: Vec<String>,
}

impl ProviderEntry {
    fn supports(&self, model_id: &str) -> bool {
        self.supported_models.is_empty()
            || self.supported_models.iter().any(|m| m == model_id)
    }
}

#[derive(Debug, Clone)]
pub struct RouterConfig {
    pub strategy: RoutingStrategy,
    pub max_fallback_attempts: u32,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self { strategy: RoutingStrategy::Priority, max_fallback_attempts: 3 }
    }
}

/// Named registry of LLM backends. Grounded on the reference platform's
/// `ProviderRegistry::select_provider` fallback search, generalized to
/// strategy-ordered candidate lists and a bounded retry count instead of
/// a single default/override pick.
#[derive(Clone)]
pub struct ProviderRouter {
    entries: Arc<RwLock<Vec<ProviderEntry>>>,
    config: Arc<RwLock<RouterConfig>>,
    round_robin_cursor: Arc<AtomicUsize>,
    budget: BudgetManager,
    event_bus: EventBus,
}

impl ProviderRouter {
    pub fn new(budget: BudgetManager, event_bus: EventBus) -> Self {
        Self {
            entries: Arc::new(RwLock::new(Vec::new())),
            config: Arc::new(RwLock::new(RouterConfig::default())),
            round_robin_cursor: Arc::new(AtomicUsize::new(0)),
            budget,
            event_bus,
        }
    }

    pub async fn register(&self, entry: ProviderEntry) {
        self.entries.write().await.push(entry);
    }

    pub async fn set_config(&self, config: RouterConfig) {
        *self.config.write().await = config;
    }

    /// Selects candidates supporting `request.model.model_id`, orders them
    /// by the configured strategy, and attempts them in order up to
    /// `max_fallback_attempts`. On each failure, logs and advances; if all
    /// fail, returns the last error.
    pub async fn route(
        &self,
        request: &CompletionRequest,
        scope: &BudgetScope,
    ) -> Result<CompletionResponse, KernelError> {
        let candidates = self.ordered_candidates(&request.model.model_id).await;
        if candidates.is_empty() {
            return Err(KernelError::ProviderError(format!(
                "no provider configured for model `{}`",
                request.model.model_id
            )));
        }

        let attempts = (self.config.read().await.max_fallback_attempts as usize).min(candidates.len());
        let mut last_err = None;
        for entry in candidates.into_iter().take(attempts) {
            match entry.provider.generate(request).await {
                Ok(response) => {
                    self.record_usage(scope, &entry, &response).await?;
                    return Ok(response);
                }
                Err(err) => {
                    self.event_bus.publish(KernelEvent::new(
                        "provider.fallback",
                        json!({"providerId": entry.provider.id(), "error": err.to_string()}),
                    ));
                    last_err = Some(err);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| KernelError::ProviderError("no provider attempted".into())))
    }

    /// Same selection and fallback as `route`, but yields chunks from the
    /// first candidate that begins streaming successfully. A stream that
    /// fails after it has started is not failed over mid-stream.
    pub async fn route_stream(
        &self,
        request: &CompletionRequest,
    ) -> Result<BoxStream<'static, Result<StreamChunk, KernelError>>, KernelError> {
        let candidates = self.ordered_candidates(&request.model.model_id).await;
        if candidates.is_empty() {
            return Err(KernelError::ProviderError(format!(
                "no provider configured for model `{}`",
                request.model.model_id
            )));
        }

        let attempts = (self.config.read().await.max_fallback_attempts as usize).min(candidates.len());
        let mut last_err = None;
        for entry in candidates.into_iter().take(attempts) {
            match entry.provider.generate_stream(request).await {
                Ok(stream) => return Ok(stream),
                Err(err) => {
                    self.event_bus.publish(KernelEvent::new(
                        "provider.fallback",
                        json!({"providerId": entry.provider.id(), "error": err.to_string()}),
                    ));
                    last_err = Some(err);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| KernelError::ProviderError("no provider attempted".into())))
    }

    pub async fn list(&self) -> Vec<String> {
        self.entries.read().await.iter().map(|e| e.provider.id().to_string()).collect()
    }

    async fn ordered_candidates(&self, model_id: &str) -> Vec<ProviderEntry> {
        let entries = self.entries.read().await;
        let mut candidates: Vec<ProviderEntry> =
            entries.iter().filter(|e| e.supports(model_id)).cloned().collect();
        drop(entries);

        let strategy = self.config.read().await.strategy;
        match strategy {
            RoutingStrategy::Priority => {
                candidates.sort_by(|a, b| b.priority.cmp(&a.priority));
            }
            RoutingStrategy::CostOptimized => {
                candidates.sort_by(|a, b| {
                    a.cost_per_1k_tokens
                        .partial_cmp(&b.cost_per_1k_tokens)
                        .unwrap_or(std::cmp::Ordering::Equal)
                });
            }
            RoutingStrategy::LatencyOptimized => {
                candidates.sort_by(|a, b| {
                    a.avg_latency_ms
                        .partial_cmp(&b.avg_latency_ms)
                        .unwrap_or(std::cmp::Ordering::Equal)
                });
            }
            RoutingStrategy::RoundRobin => {
                if !candidates.is_empty() {
                    let start = self.round_robin_cursor.fetch_add(1, AtomicOrdering::SeqCst) % candidates.len();
                    candidates.rotate_left(start);
                }
            }
        }
        candidates
    }

    async fn record_usage(
        &self,
        scope: &BudgetScope,
        entry: &ProviderEntry,
        response: &CompletionResponse,
    ) -> Result<(), KernelError> {
        let total_tokens = response.usage.prompt_tokens + response.usage.completion_tokens;
        let usd_cost = (total_tokens as f64 / 1000.0) * entry.cost_per_1k_tokens;
        self.budget.record(scope, UsageDelta { tokens: total_tokens, usd_cost }).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use axon_types::{ChatMessage, ModelSpec, ToolCallRequest, UsageTokens};

    use super::*;

    struct StubProvider {
        id: &'static str,
        fails: bool,
        calls: AtomicU32,
    }

    impl StubProvider {
        fn ok(id: &'static str) -> Arc<Self> {
            Arc::new(Self { id, fails: false, calls: AtomicU32::new(0) })
        }
        fn failing(id: &'static str) -> Arc<Self> {
            Arc::new(Self { id, fails: true, calls: AtomicU32::new(0) })
        }
    }

    #[async_trait]
    impl LlmProvider for StubProvider {
        fn id(&self) -> &str {
            self.id
        }

        async fn generate(&self, _req: &CompletionRequest) -> Result<CompletionResponse, KernelError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fails {
                return Err(KernelError::ProviderError(format!("{} is down", self.id)));
            }
            Ok(CompletionResponse {
                content: Some(format!("hi from {}", self.id)),
                tool_calls: Vec::<ToolCallRequest>::new(),
                usage: UsageTokens { prompt_tokens: 10, completion_tokens: 5 },
            })
        }

        async fn generate_stream(
            &self,
            _req: &CompletionRequest,
        ) -> Result<BoxStream<'static, Result<StreamChunk, KernelError>>, KernelError> {
            if self.fails {
                return Err(KernelError::ProviderError(format!("{} is down", self.id)));
            }
            Ok(Box::pin(futures::stream::empty()))
        }
    }

    fn request(model_id: &str) -> CompletionRequest {
        CompletionRequest {
            model: ModelSpec { provider_id: "any".into(), model_id: model_id.into() },
            system_prompt: None,
            messages: vec![ChatMessage { role: "user".into(), content: "hi".into() }],
            temperature: None,
            max_tokens: None,
            tools: None,
        }
    }

    fn scope() -> BudgetScope {
        BudgetScope::Agent("agent.a".into())
    }

    fn entry(provider: Arc<dyn LlmProvider>, priority: i32) -> ProviderEntry {
        ProviderEntry {
            provider,
            priority,
            cost_per_1k_tokens: 0.0,
            avg_latency_ms: 0.0,
            supported_models: Vec::new(),
        }
    }

    #[tokio::test]
    async fn priority_strategy_picks_the_highest_priority_first() {
        let router = ProviderRouter::new(BudgetManager::new(EventBus::new()), EventBus::new());
        router.register(entry(StubProvider::ok("low"), 1)).await;
        router.register(entry(StubProvider::ok("high"), 10)).await;

        let response = router.route(&request("any-model"), &scope()).await.unwrap();
        assert_eq!(response.content, Some("hi from high".to_string()));
    }

    #[tokio::test]
    async fn fallback_advances_through_candidates_on_failure() {
        let router = ProviderRouter::new(BudgetManager::new(EventBus::new()), EventBus::new());
        router.register(entry(StubProvider::failing("a"), 10)).await;
        router.register(entry(StubProvider::ok("b"), 5)).await;

        let response = router.route(&request("any-model"), &scope()).await.unwrap();
        assert_eq!(response.content, Some("hi from b".to_string()));
    }

    #[tokio::test]
    async fn exhausting_all_fallbacks_returns_the_last_error() {
        let router = ProviderRouter::new(BudgetManager::new(EventBus::new()), EventBus::new());
        router.register(entry(StubProvider::failing("a"), 10)).await;
        router.register(entry(StubProvider::failing("b"), 5)).await;

        let result = router.route(&request("any-model"), &scope()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn model_support_filters_out_non_matching_providers() {
        let router = ProviderRouter::new(BudgetManager::new(EventBus::new()), EventBus::new());
        let mut only_gpt = entry(StubProvider::ok("gpt-only"), 10);
        only_gpt.supported_models = vec!["gpt-4".to_string()];
        router.register(only_gpt).await;
        router.register(entry(StubProvider::ok("general"), 1)).await;

        let response = router.route(&request("claude-3"), &scope()).await.unwrap();
        assert_eq!(response.content, Some("hi from general".to_string()));
    }

    #[tokio::test]
    async fn successful_response_records_usage_against_the_budget() {
        let budget = BudgetManager::new(EventBus::new());
        budget
            .set_limit(scope(), axon_budget::BudgetLimit { max_tokens: Some(1000), ..Default::default() })
            .await;
        let router = ProviderRouter::new(budget.clone(), EventBus::new());
        router.register(entry(StubProvider::ok("solo"), 1)).await;

        router.route(&request("any-model"), &scope()).await.unwrap();
        let outcome = budget.check(&scope(), UsageDelta::default()).await;
        assert_eq!(outcome, axon_budget::CheckOutcome::Allowed);
    }
}
