use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Scope of a declared capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityScope {
    Tool,
    Network,
    Memory,
    TokenBudget,
    AgentBoundary,
}

/// A capability a module or agent can declare it needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Capability {
    pub name: String,
    pub description: String,
    pub scope: CapabilityScope,
}

/// Binds a capability set, a token budget and a max USD cost to one agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Grant {
    pub agent_id: String,
    #[serde(default)]
    pub capabilities: HashSet<String>,
    pub max_token_budget: u64,
    pub max_usd_cost: f64,
    #[serde(default)]
    pub allowed_tools: Vec<String>,
    #[serde(default)]
    pub allowed_network_hosts: Vec<String>,
    #[serde(default)]
    pub allowed_memory_scopes: Vec<String>,
    #[serde(default)]
    pub allowed_agent_targets: Vec<String>,
}

/// The computed allow-list derived from a [`Grant`].
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Constraint {
    pub allowed_tools: Vec<String>,
    pub allowed_network_hosts: Vec<String>,
    pub allowed_memory_scopes: Vec<String>,
    pub max_token_budget: u64,
    pub allowed_agent_targets: Vec<String>,
}

impl From<&Grant> for Constraint {
    fn from(grant: &Grant) -> Self {
        Constraint {
            allowed_tools: grant.allowed_tools.clone(),
            allowed_network_hosts: grant.allowed_network_hosts.clone(),
            allowed_memory_scopes: grant.allowed_memory_scopes.clone(),
            max_token_budget: grant.max_token_budget,
            allowed_agent_targets: grant.allowed_agent_targets.clone(),
        }
    }
}

/// How a child execution's capability grant relates to its parent's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityPropagation {
    None,
    Subset,
    Full,
}

impl Default for CapabilityPropagation {
    fn default() -> Self {
        CapabilityPropagation::None
    }
}

/// Immutable agent definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDefinition {
    pub id: String,
    pub name: String,
    pub graph_id: String,
    pub max_token_budget: u64,
    #[serde(default)]
    pub required_capabilities: HashSet<String>,
    #[serde(default)]
    pub capability_propagation: CapabilityPropagation,
    #[serde(default = "default_true")]
    pub budget_isolated: bool,
}

fn default_true() -> bool {
    true
}
