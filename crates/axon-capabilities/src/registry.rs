use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use axon_core::wildcard_matches;
use axon_types::{Constraint, Grant, KernelError};

/// Holds the active `Grant` per agent and derives/caches its `Constraint`.
/// Grounded on the reference orchestrator's per-role spawn-edge capability
/// model, generalized here to one grant per agent rather than one spec per
/// role.
#[derive(Clone, Default)]
pub struct CapabilityRegistry {
    grants: Arc<RwLock<HashMap<String, Grant>>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn grant(&self, grant: Grant) {
        self.grants.write().await.insert(grant.agent_id.clone(), grant);
    }

    pub async fn revoke(&self, agent_id: &str) {
        self.grants.write().await.remove(agent_id);
    }

    pub async fn constraint_for(&self, agent_id: &str) -> Option<Constraint> {
        self.grants.read().await.get(agent_id).map(Constraint::from)
    }

    pub async fn grant_for(&self, agent_id: &str) -> Option<Grant> {
        self.grants.read().await.get(agent_id).cloned()
    }
}

/// Checks a `Constraint`'s allow-lists against a requested action. A
/// constraint with an empty allow-list for a dimension denies everything
/// on that dimension — an agent granted zero tools cannot call any tool.
pub struct CapabilityVerifier;

impl CapabilityVerifier {
    pub fn verify_tool(constraint: &Constraint, tool_name: &str) -> Result<(), KernelError> {
        if constraint.allowed_tools.iter().any(|p| wildcard_matches(p, tool_name)) {
            Ok(())
        } else {
            Err(KernelError::PermissionDenied(format!(
                "tool `{tool_name}` is not in the agent's allowed_tools"
            )))
        }
    }

    pub fn verify_network_host(constraint: &Constraint, host: &str) -> Result<(), KernelError> {
        if constraint.allowed_network_hosts.iter().any(|p| wildcard_matches(p, host)) {
            Ok(())
        } else {
            Err(KernelError::PermissionDenied(format!(
                "host `{host}` is not in the agent's allowed_network_hosts"
            )))
        }
    }

    pub fn verify_memory_scope(constraint: &Constraint, scope: &str) -> Result<(), KernelError> {
        if constraint.allowed_memory_scopes.iter().any(|p| wildcard_matches(p, scope)) {
            Ok(())
        } else {
            Err(KernelError::PermissionDenied(format!(
                "memory scope `{scope}` is not in the agent's allowed_memory_scopes"
            )))
        }
    }

    pub fn verify_agent_target(constraint: &Constraint, target_agent_id: &str) -> Result<(), KernelError> {
        if constraint.allowed_agent_targets.iter().any(|p| wildcard_matches(p, target_agent_id)) {
            Ok(())
        } else {
            Err(KernelError::PermissionDenied(format!(
                "agent `{target_agent_id}` is not in the caller's allowed_agent_targets"
            )))
        }
    }

    pub fn verify_budget(constraint: &Constraint, tokens_needed: u64) -> Result<(), KernelError> {
        if tokens_needed <= constraint.max_token_budget {
            Ok(())
        } else {
            Err(KernelError::BudgetExceeded(format!(
                "{tokens_needed} tokens requested exceeds max_token_budget {}",
                constraint.max_token_budget
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grant(agent_id: &str) -> Grant {
        Grant {
            agent_id: agent_id.to_string(),
            capabilities: Default::default(),
            max_token_budget: 10_000,
            max_usd_cost: 5.0,
            allowed_tools: vec!["search".to_string(), "read_*".to_string()],
            allowed_network_hosts: vec!["api.example.com".to_string()],
            allowed_memory_scopes: vec!["bot:a".to_string()],
            allowed_agent_targets: vec![],
        }
    }

    #[tokio::test]
    async fn constraint_derives_from_the_active_grant() {
        let registry = CapabilityRegistry::new();
        registry.grant(grant("agent.a")).await;
        let constraint = registry.constraint_for("agent.a").await.unwrap();
        assert_eq!(constraint.max_token_budget, 10_000);
    }

    #[tokio::test]
    async fn revoked_agent_has_no_constraint() {
        let registry = CapabilityRegistry::new();
        registry.grant(grant("agent.a")).await;
        registry.revoke("agent.a").await;
        assert!(registry.constraint_for("agent.a").await.is_none());
    }

    #[test]
    fn wildcard_tool_pattern_matches_prefix() {
        let constraint = Constraint::from(&grant("agent.a"));
        assert!(CapabilityVerifier::verify_tool(&constraint, "read_file").is_ok());
        assert!(CapabilityVerifier::verify_tool(&constraint, "delete_file").is_err());
    }

    #[test]
    fn budget_check_rejects_amount_over_limit() {
        let constraint = Constraint::from(&grant("agent.a"));
        assert!(CapabilityVerifier::verify_budget(&constraint, 10_000).is_ok());
        assert!(CapabilityVerifier::verify_budget(&constraint, 10_001).is_err());
    }

    #[test]
    fn empty_agent_target_allow_list_denies_every_call() {
        let constraint = Constraint::from(&grant("agent.a"));
        assert!(CapabilityVerifier::verify_agent_target(&constraint, "agent.b").is_err());
    }
}
