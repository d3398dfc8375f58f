use std::cmp::Ordering;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;

use axon_core::wildcard_matches;

/// `(agentId, action, context)` the Policy Engine evaluates. `context` is
/// an opaque payload a `Policy` implementation may inspect (e.g. the tool
/// name, the target URL) but never mutates.
#[derive(Debug, Clone)]
pub struct PolicyContext {
    pub agent_id: String,
    pub action: String,
    pub context: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyDecision {
    Allow,
    Prompt,
    Deny,
}

impl PolicyDecision {
    /// `deny > prompt > allow`.
    fn strictness(self) -> u8 {
        match self {
            PolicyDecision::Allow => 0,
            PolicyDecision::Prompt => 1,
            PolicyDecision::Deny => 2,
        }
    }
}

impl Ord for PolicyDecision {
    fn cmp(&self, other: &Self) -> Ordering {
        self.strictness().cmp(&other.strictness())
    }
}

impl PartialOrd for PolicyDecision {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A single named policy. Evaluation is synchronous and side-effect free;
/// policies never prompt or block themselves, they only classify.
pub trait Policy: Send + Sync {
    fn name(&self) -> &str;
    fn evaluate(&self, request: &PolicyContext) -> PolicyDecision;
}

/// Matches `(agent pattern, action pattern)` against a fixed decision.
/// Grounded on the permission engine's wildcard rule matcher and the
/// reference spawn-policy evaluator's sequential rule list, generalized
/// from spawn-specific fields to the open `(agentId, action)` pair.
pub struct WildcardPolicy {
    name: String,
    rules: Vec<(String, String, PolicyDecision)>,
    default: PolicyDecision,
}

impl WildcardPolicy {
    pub fn new(name: impl Into<String>, default: PolicyDecision) -> Self {
        Self {
            name: name.into(),
            rules: Vec::new(),
            default,
        }
    }

    pub fn with_rule(
        mut self,
        agent_pattern: impl Into<String>,
        action_pattern: impl Into<String>,
        decision: PolicyDecision,
    ) -> Self {
        self.rules.push((agent_pattern.into(), action_pattern.into(), decision));
        self
    }
}

impl Policy for WildcardPolicy {
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(&self, request: &PolicyContext) -> PolicyDecision {
        self.rules
            .iter()
            .find(|(agent_pattern, action_pattern, _)| {
                wildcard_matches(agent_pattern, &request.agent_id)
                    && wildcard_matches(action_pattern, &request.action)
            })
            .map(|(_, _, decision)| *decision)
            .unwrap_or(self.default)
    }
}

/// Holds the registered policies and aggregates their decisions with
/// strictest-wins semantics: `deny` beats `prompt` beats `allow`.
#[derive(Clone, Default)]
pub struct PolicyEngine {
    policies: Arc<RwLock<Vec<Arc<dyn Policy>>>>,
}

impl PolicyEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, policy: Arc<dyn Policy>) {
        self.policies.write().await.push(policy);
    }

    pub async fn evaluate(&self, request: &PolicyContext) -> PolicyDecision {
        let policies = self.policies.read().await;
        policies
            .iter()
            .map(|policy| policy.evaluate(request))
            .max()
            .unwrap_or(PolicyDecision::Allow)
    }
}
