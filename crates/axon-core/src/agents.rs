use std::collections::HashMap;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use serde::Deserialize;
use tokio::fs;
use tokio::sync::RwLock;

use axon_types::{AgentDefinition, CapabilityPropagation};

#[derive(Debug, Clone, Deserialize)]
struct AgentFrontmatter {
    id: Option<String>,
    name: Option<String>,
    #[serde(rename = "graphId")]
    graph_id: String,
    #[serde(rename = "maxTokenBudget", default = "default_max_token_budget")]
    max_token_budget: u64,
    #[serde(rename = "requiredCapabilities", default)]
    required_capabilities: Vec<String>,
    #[serde(rename = "capabilityPropagation", default)]
    capability_propagation: CapabilityPropagation,
    #[serde(rename = "budgetIsolated", default = "default_true")]
    budget_isolated: bool,
}

fn default_max_token_budget() -> u64 {
    100_000
}

fn default_true() -> bool {
    true
}

/// Holds the Agent Definition set a Runtime was constructed with: the
/// built-in agents plus any custom definitions loaded from a workspace
/// directory, keyed by id.
#[derive(Clone)]
pub struct AgentRegistry {
    agents: Arc<RwLock<HashMap<String, AgentDefinition>>>,
}

impl AgentRegistry {
    pub async fn new(workspace_root: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let mut by_id = HashMap::new();
        for agent in default_agents() {
            by_id.insert(agent.id.clone(), agent);
        }

        let root: PathBuf = workspace_root.into();
        let custom = load_custom_agents(root.join(".axon").join("agents")).await?;
        for agent in custom {
            by_id.insert(agent.id.clone(), agent);
        }

        Ok(Self {
            agents: Arc::new(RwLock::new(by_id)),
        })
    }

    pub async fn list(&self) -> Vec<AgentDefinition> {
        let mut agents = self
            .agents
            .read()
            .await
            .values()
            .cloned()
            .collect::<Vec<_>>();
        agents.sort_by(|a, b| a.id.cmp(&b.id));
        agents
    }

    pub async fn get(&self, id: &str) -> Option<AgentDefinition> {
        self.agents.read().await.get(id).cloned()
    }

    pub async fn register(&self, agent: AgentDefinition) {
        self.agents.write().await.insert(agent.id.clone(), agent);
    }
}

fn default_agents() -> Vec<AgentDefinition> {
    vec![
        AgentDefinition {
            id: "default.assistant".to_string(),
            name: "Assistant".to_string(),
            graph_id: "graph.default_assistant".to_string(),
            max_token_budget: 200_000,
            required_capabilities: HashSet::new(),
            capability_propagation: CapabilityPropagation::None,
            budget_isolated: true,
        },
        AgentDefinition {
            id: "default.researcher".to_string(),
            name: "Researcher".to_string(),
            graph_id: "graph.default_researcher".to_string(),
            max_token_budget: 150_000,
            required_capabilities: ["network_fetch".to_string(), "memory_read".to_string()]
                .into_iter()
                .collect(),
            capability_propagation: CapabilityPropagation::Subset,
            budget_isolated: true,
        },
    ]
}

async fn load_custom_agents(dir: PathBuf) -> anyhow::Result<Vec<AgentDefinition>> {
    let mut out = Vec::new();
    let mut entries = match fs::read_dir(&dir).await {
        Ok(rd) => rd,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(out),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read {}", dir.display()));
        }
    };

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let Some(ext) = path.extension().and_then(|v| v.to_str()) else {
            continue;
        };
        if ext != "md" {
            continue;
        }
        let raw = fs::read_to_string(&path).await?;
        if let Some(agent) = parse_agent_markdown(&raw, &path) {
            out.push(agent);
        }
    }

    Ok(out)
}

fn parse_agent_markdown(raw: &str, path: &Path) -> Option<AgentDefinition> {
    let trimmed = raw.trim_start();
    if !trimmed.starts_with("---") {
        return None;
    }
    let mut parts = trimmed.splitn(3, "---");
    let _ = parts.next();
    let frontmatter = parts.next()?.trim();
    let parsed: AgentFrontmatter = serde_yaml::from_str(frontmatter).ok()?;
    let default_id = path.file_stem()?.to_string_lossy().to_string();
    let id = parsed.id.unwrap_or_else(|| default_id.clone());
    Some(AgentDefinition {
        name: parsed.name.unwrap_or(default_id),
        id,
        graph_id: parsed.graph_id,
        max_token_budget: parsed.max_token_budget,
        required_capabilities: parsed.required_capabilities.into_iter().collect(),
        capability_propagation: parsed.capability_propagation,
        budget_isolated: parsed.budget_isolated,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn built_in_agents_are_registered_by_default() {
        let registry = AgentRegistry::new(std::env::temp_dir().join("axon-test-no-such-dir"))
            .await
            .unwrap();
        let agent = registry.get("default.assistant").await.unwrap();
        assert_eq!(agent.graph_id, "graph.default_assistant");
    }

    #[test]
    fn frontmatter_with_minimal_fields_parses() {
        let raw = "---\ngraphId: graph.custom\n---\nUnused body.";
        let agent = parse_agent_markdown(raw, Path::new("research.md")).unwrap();
        assert_eq!(agent.id, "research");
        assert_eq!(agent.graph_id, "graph.custom");
        assert_eq!(agent.max_token_budget, 100_000);
        assert!(agent.budget_isolated);
    }

    #[test]
    fn non_frontmatter_markdown_is_rejected() {
        assert!(parse_agent_markdown("just some text", Path::new("x.md")).is_none());
    }
}
