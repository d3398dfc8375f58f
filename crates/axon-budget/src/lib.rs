use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::RwLock;

use axon_core::EventBus;
use axon_types::{KernelError, KernelEvent};

const WARNING_THRESHOLD: f64 = 0.8;

/// Scope a counter is tracked under. The kernel never mixes counters
/// across scopes: an agent's token spend never debits its session's.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum BudgetScope {
    Agent(String),
    Session(String),
    Workspace(String),
}

/// Limits applied to a scope. Grounded on the reference orchestrator's
/// `BudgetLimit` (`max_tokens`/`max_steps`/`max_duration_ms`/
/// `max_cost_usd`), generalized with a fixed-window request-rate limit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetLimit {
    pub max_tokens: Option<u64>,
    pub max_usd_cost: Option<f64>,
    pub max_requests_per_window: Option<u32>,
    #[serde(with = "duration_ms")]
    pub window: Duration,
}

impl Default for BudgetLimit {
    fn default() -> Self {
        Self {
            max_tokens: None,
            max_usd_cost: None,
            max_requests_per_window: None,
            window: Duration::from_secs(60),
        }
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    Allowed,
    Warn,
    Exceed,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UsageDelta {
    pub tokens: u64,
    pub usd_cost: f64,
}

#[derive(Debug, Clone, Default)]
struct ScopeState {
    tokens_used: u64,
    usd_spent: f64,
    window_start: Option<Instant>,
    requests_in_window: u32,
}

/// Tracks consumption per `BudgetScope` against a registered `BudgetLimit`
/// and publishes `budget.warning` / `budget.exceeded` events as thresholds
/// are crossed.
#[derive(Clone)]
pub struct BudgetManager {
    limits: Arc<RwLock<HashMap<BudgetScope, BudgetLimit>>>,
    state: Arc<RwLock<HashMap<BudgetScope, ScopeState>>>,
    event_bus: EventBus,
}

impl BudgetManager {
    pub fn new(event_bus: EventBus) -> Self {
        Self {
            limits: Arc::new(RwLock::new(HashMap::new())),
            state: Arc::new(RwLock::new(HashMap::new())),
            event_bus,
        }
    }

    pub async fn set_limit(&self, scope: BudgetScope, limit: BudgetLimit) {
        self.limits.write().await.insert(scope, limit);
    }

    /// Evaluates a prospective `delta` against the scope's limit without
    /// recording it. A scope with no registered limit is always `Allowed`.
    pub async fn check(&self, scope: &BudgetScope, delta: UsageDelta) -> CheckOutcome {
        let limits = self.limits.read().await;
        let Some(limit) = limits.get(scope) else {
            return CheckOutcome::Allowed;
        };
        let state = self.state.read().await;
        let current = state.get(scope).cloned().unwrap_or_default();

        let mut worst = CheckOutcome::Allowed;
        if let Some(max_tokens) = limit.max_tokens {
            worst = worst.max(ratio_outcome(current.tokens_used + delta.tokens, max_tokens));
        }
        if let Some(max_usd) = limit.max_usd_cost {
            worst = worst.max(ratio_outcome_f64(current.usd_spent + delta.usd_cost, max_usd));
        }
        worst
    }

    /// Atomically applies `delta` to the scope's counters, publishing
    /// `budget.warning` at 80% and `budget.exceeded` at 100% of either the
    /// token or USD limit, whichever is crossed.
    pub async fn record(&self, scope: &BudgetScope, delta: UsageDelta) -> Result<CheckOutcome, KernelError> {
        let limits = self.limits.read().await;
        let limit = limits.get(scope).cloned();
        drop(limits);

        let mut state = self.state.write().await;
        let entry = state.entry(scope.clone()).or_default();
        entry.tokens_used += delta.tokens;
        entry.usd_spent += delta.usd_cost;

        let Some(limit) = limit else {
            return Ok(CheckOutcome::Allowed);
        };

        let mut worst = CheckOutcome::Allowed;
        if let Some(max_tokens) = limit.max_tokens {
            worst = worst.max(ratio_outcome(entry.tokens_used, max_tokens));
        }
        if let Some(max_usd) = limit.max_usd_cost {
            worst = worst.max(ratio_outcome_f64(entry.usd_spent, max_usd));
        }
        drop(state);

        match worst {
            CheckOutcome::Warn => {
                self.event_bus.publish(KernelEvent::new(
                    "budget.warning",
                    json!({"scope": scope, "tokensUsed": delta.tokens, "usdSpent": delta.usd_cost}),
                ));
            }
            CheckOutcome::Exceed => {
                self.event_bus.publish(KernelEvent::new(
                    "budget.exceeded",
                    json!({"scope": scope}),
                ));
                return Err(KernelError::BudgetExceeded(format!(
                    "scope {scope:?} exceeded its budget limit"
                )));
            }
            CheckOutcome::Allowed => {}
        }
        Ok(worst)
    }

    /// Fixed-window request counter keyed by scope. Returns `Exceed` once
    /// the window's request count reaches `max_requests_per_window`; the
    /// window resets the first time it's found expired.
    pub async fn check_rate(&self, scope: &BudgetScope) -> CheckOutcome {
        let limits = self.limits.read().await;
        let Some(limit) = limits.get(scope).cloned() else {
            return CheckOutcome::Allowed;
        };
        drop(limits);
        let Some(max_requests) = limit.max_requests_per_window else {
            return CheckOutcome::Allowed;
        };

        let mut state = self.state.write().await;
        let entry = state.entry(scope.clone()).or_default();
        let now = Instant::now();
        let window_expired = entry
            .window_start
            .map(|start| now.duration_since(start) >= limit.window)
            .unwrap_or(true);
        if window_expired {
            entry.window_start = Some(now);
            entry.requests_in_window = 0;
        }
        entry.requests_in_window += 1;
        if entry.requests_in_window > max_requests {
            CheckOutcome::Exceed
        } else {
            CheckOutcome::Allowed
        }
    }
}

impl CheckOutcome {
    fn max(self, other: Self) -> Self {
        match (self, other) {
            (CheckOutcome::Exceed, _) | (_, CheckOutcome::Exceed) => CheckOutcome::Exceed,
            (CheckOutcome::Warn, _) | (_, CheckOutcome::Warn) => CheckOutcome::Warn,
            _ => CheckOutcome::Allowed,
        }
    }
}

fn ratio_outcome(used: u64, limit: u64) -> CheckOutcome {
    if limit == 0 {
        return CheckOutcome::Exceed;
    }
    ratio_outcome_f64(used as f64, limit as f64)
}

fn ratio_outcome_f64(used: f64, limit: f64) -> CheckOutcome {
    if limit <= 0.0 {
        return CheckOutcome::Exceed;
    }
    let ratio = used / limit;
    if ratio >= 1.0 {
        CheckOutcome::Exceed
    } else if ratio >= WARNING_THRESHOLD {
        CheckOutcome::Warn
    } else {
        CheckOutcome::Allowed
    }
}
