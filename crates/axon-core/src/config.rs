//! Layered configuration for the kernel's ambient settings (provider
//! credentials, default budgets, sandbox defaults). Five layers are merged
//! in increasing precedence: global, project, managed (read-only,
//! operator-supplied), environment, runtime (in-memory patches), and CLI
//! overrides.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::fs;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProviderConfig {
    pub api_key: Option<String>,
    pub url: Option<String>,
    pub default_model: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
    pub default_provider: Option<String>,
    #[serde(default)]
    pub default_token_budget: Option<u64>,
}

#[derive(Debug, Clone, Default)]
struct ConfigLayers {
    global: Value,
    project: Value,
    managed: Value,
    env: Value,
    runtime: Value,
    cli: Value,
}

#[derive(Clone)]
pub struct ConfigStore {
    project_path: PathBuf,
    global_path: PathBuf,
    managed_path: PathBuf,
    layers: Arc<RwLock<ConfigLayers>>,
}

impl ConfigStore {
    pub async fn new(path: impl AsRef<Path>, cli_overrides: Option<Value>) -> anyhow::Result<Self> {
        let project_path = path.as_ref().to_path_buf();
        if let Some(parent) = project_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let managed_path = project_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join("managed_config.json");
        let global_path = resolve_global_config_path().await?;

        let mut global = read_json_file(&global_path).await.unwrap_or_else(|_| empty_object());
        let mut project = read_json_file(&project_path).await.unwrap_or_else(|_| empty_object());
        let mut managed = read_json_file(&managed_path).await.unwrap_or_else(|_| empty_object());

        scrub_persisted_secrets(&mut global, &global_path).await?;
        scrub_persisted_secrets(&mut project, &project_path).await?;
        scrub_persisted_secrets(&mut managed, &managed_path).await?;

        let layers = ConfigLayers {
            global,
            project,
            managed,
            env: env_layer(),
            runtime: empty_object(),
            cli: cli_overrides.unwrap_or_else(empty_object),
        };

        let store = Self {
            project_path,
            global_path,
            managed_path,
            layers: Arc::new(RwLock::new(layers)),
        };
        store.save_project().await?;
        store.save_global().await?;
        Ok(store)
    }

    pub async fn get(&self) -> AppConfig {
        let merged = self.get_effective_value().await;
        serde_json::from_value(merged).unwrap_or_default()
    }

    pub async fn get_effective_value(&self) -> Value {
        let layers = self.layers.read().await.clone();
        let mut merged = empty_object();
        deep_merge(&mut merged, &layers.global);
        deep_merge(&mut merged, &layers.project);
        deep_merge(&mut merged, &layers.managed);
        deep_merge(&mut merged, &layers.env);
        deep_merge(&mut merged, &layers.runtime);
        deep_merge(&mut merged, &layers.cli);
        merged
    }

    pub async fn get_layers_value(&self) -> Value {
        let layers = self.layers.read().await;
        json!({
            "global": layers.global,
            "project": layers.project,
            "managed": layers.managed,
            "env": layers.env,
            "runtime": layers.runtime,
            "cli": layers.cli
        })
    }

    pub async fn set(&self, config: AppConfig) -> anyhow::Result<()> {
        let value = serde_json::to_value(config)?;
        self.set_project_value(value).await
    }

    pub async fn patch_project(&self, patch: Value) -> anyhow::Result<Value> {
        {
            let mut layers = self.layers.write().await;
            deep_merge(&mut layers.project, &patch);
        }
        self.save_project().await?;
        Ok(self.get_effective_value().await)
    }

    pub async fn patch_runtime(&self, patch: Value) -> anyhow::Result<Value> {
        {
            let mut layers = self.layers.write().await;
            deep_merge(&mut layers.runtime, &patch);
        }
        Ok(self.get_effective_value().await)
    }

    pub async fn delete_runtime_provider_key(&self, provider_id: &str) -> anyhow::Result<Value> {
        let provider = provider_id.trim().to_string();
        {
            let mut layers = self.layers.write().await;
            let Some(root) = layers.runtime.as_object_mut() else {
                return Ok(self.get_effective_value().await);
            };
            let Some(providers) = root.get_mut("providers").and_then(|v| v.as_object_mut()) else {
                return Ok(self.get_effective_value().await);
            };
            if let Some(cfg) = providers.get_mut(&provider).and_then(|v| v.as_object_mut()) {
                cfg.remove("api_key");
                if cfg.is_empty() {
                    providers.remove(&provider);
                }
            }
        }
        Ok(self.get_effective_value().await)
    }

    async fn set_project_value(&self, value: Value) -> anyhow::Result<()> {
        self.layers.write().await.project = value;
        self.save_project().await
    }

    async fn save_project(&self) -> anyhow::Result<()> {
        let snapshot = self.layers.read().await.project.clone();
        write_json_file(&self.project_path, &snapshot).await
    }

    async fn save_global(&self) -> anyhow::Result<()> {
        let snapshot = self.layers.read().await.global.clone();
        write_json_file(&self.global_path, &snapshot).await
    }

    #[allow(dead_code)]
    async fn save_managed(&self) -> anyhow::Result<()> {
        let snapshot = self.layers.read().await.managed.clone();
        write_json_file(&self.managed_path, &snapshot).await
    }
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

async fn write_json_file(path: &Path, value: &Value) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let mut to_write = value.clone();
    strip_persisted_secrets(&mut to_write);
    let raw = serde_json::to_string_pretty(&to_write)?;
    fs::write(path, raw).await?;
    Ok(())
}

/// Never persist a provider `api_key` to disk when the same key is also
/// resolvable from the process environment — the env var remains the
/// source of truth and the file stays safe to check in by mistake.
fn strip_persisted_secrets(value: &mut Value) {
    let Value::Object(root) = value else { return };
    let Some(providers) = root.get_mut("providers").and_then(|v| v.as_object_mut()) else {
        return;
    };
    for (provider_id, provider_cfg) in providers.iter_mut() {
        let Value::Object(cfg) = provider_cfg else { continue };
        if !cfg.contains_key("api_key") {
            continue;
        }
        if provider_has_runtime_secret(provider_id) {
            cfg.remove("api_key");
        }
    }
}

async fn scrub_persisted_secrets(value: &mut Value, path: &Path) -> anyhow::Result<()> {
    let before = value.clone();
    strip_persisted_secrets(value);
    if *value != before {
        write_json_file(path, value).await?;
    }
    Ok(())
}

fn provider_has_runtime_secret(provider_id: &str) -> bool {
    provider_env_candidates(provider_id)
        .into_iter()
        .any(|key| std::env::var(&key).map(|v| !v.trim().is_empty()).unwrap_or(false))
}

fn provider_env_candidates(provider_id: &str) -> Vec<String> {
    let normalized = provider_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect::<String>()
        .to_ascii_uppercase();

    let mut out = vec![format!("{normalized}_API_KEY")];
    match provider_id.to_ascii_lowercase().as_str() {
        "openai" => out.push("OPENAI_API_KEY".to_string()),
        "anthropic" => out.push("ANTHROPIC_API_KEY".to_string()),
        "openrouter" => out.push("OPENROUTER_API_KEY".to_string()),
        "groq" => out.push("GROQ_API_KEY".to_string()),
        "mistral" => out.push("MISTRAL_API_KEY".to_string()),
        "together" => out.push("TOGETHER_API_KEY".to_string()),
        _ => {}
    }
    out.sort();
    out.dedup();
    out
}

async fn read_json_file(path: &Path) -> anyhow::Result<Value> {
    if !path.exists() {
        return Ok(empty_object());
    }
    let raw = fs::read_to_string(path).await?;
    Ok(serde_json::from_str::<Value>(&raw).unwrap_or_else(|_| empty_object()))
}

async fn resolve_global_config_path() -> anyhow::Result<PathBuf> {
    if let Ok(path) = std::env::var("AXON_GLOBAL_CONFIG") {
        let path = PathBuf::from(path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        return Ok(path);
    }
    if let Some(config_dir) = dirs::config_dir() {
        let path = config_dir.join("axon").join("config.json");
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        return Ok(path);
    }
    Ok(PathBuf::from(".axon/global_config.json"))
}

/// Reads well-known provider API key env vars into the `env` layer so a
/// bare `ANTHROPIC_API_KEY` export is enough to run without a config file.
fn env_layer() -> Value {
    let mut root = empty_object();

    if let Ok(budget) = std::env::var("AXON_DEFAULT_TOKEN_BUDGET") {
        if let Ok(parsed) = budget.trim().parse::<u64>() {
            deep_merge(&mut root, &json!({ "default_token_budget": parsed }));
        }
    }

    add_provider_env(&mut root, "openai", "OPENAI_API_KEY", "https://api.openai.com/v1", "gpt-4o-mini");
    add_provider_env(
        &mut root,
        "anthropic",
        "ANTHROPIC_API_KEY",
        "https://api.anthropic.com/v1",
        "claude-sonnet-4",
    );
    add_provider_env(
        &mut root,
        "openrouter",
        "OPENROUTER_API_KEY",
        "https://openrouter.ai/api/v1",
        "openai/gpt-4o-mini",
    );
    add_provider_env(&mut root, "groq", "GROQ_API_KEY", "https://api.groq.com/openai/v1", "llama-3.1-8b-instant");
    add_provider_env(&mut root, "mistral", "MISTRAL_API_KEY", "https://api.mistral.ai/v1", "mistral-small-latest");
    add_provider_env(
        &mut root,
        "together",
        "TOGETHER_API_KEY",
        "https://api.together.xyz/v1",
        "meta-llama/Llama-3.1-8B-Instruct-Turbo",
    );

    if let Ok(ollama_url) = std::env::var("OLLAMA_URL") {
        deep_merge(
            &mut root,
            &json!({ "providers": { "ollama": { "url": ollama_url, "default_model": "llama3.1:8b" } } }),
        );
    }

    root
}

fn add_provider_env(root: &mut Value, provider: &str, key_env: &str, default_url: &str, model: &str) {
    if let Ok(api_key) = std::env::var(key_env) {
        if api_key.trim().is_empty() {
            return;
        }
        deep_merge(
            root,
            &json!({
                "providers": {
                    provider: {
                        "api_key": api_key,
                        "url": default_url,
                        "default_model": model
                    }
                }
            }),
        );
    }
}

fn deep_merge(base: &mut Value, overlay: &Value) {
    if overlay.is_null() {
        return;
    }
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                if value.is_null() {
                    continue;
                }
                match base_map.get_mut(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base_value, overlay_value) => {
            *base_value = overlay_value.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn unique_temp_file(name: &str) -> PathBuf {
        let mut path = std::env::temp_dir();
        let ts = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_nanos()).unwrap_or(0);
        path.push(format!("axon-core-config-{name}-{ts}.json"));
        path
    }

    #[test]
    fn strip_persisted_secrets_keeps_api_key_without_runtime_env() {
        let mut value = json!({ "providers": { "customprov": { "api_key": "secret" } } });
        strip_persisted_secrets(&mut value);
        assert!(value
            .get("providers")
            .and_then(|v| v.get("customprov"))
            .and_then(Value::as_object)
            .is_some_and(|obj| obj.contains_key("api_key")));
    }

    #[test]
    fn strip_persisted_secrets_removes_api_key_when_env_has_it() {
        std::env::set_var("OPENAI_API_KEY", "runtime-secret");
        let mut value = json!({ "providers": { "openai": { "api_key": "file-secret" } } });
        strip_persisted_secrets(&mut value);
        assert!(value
            .get("providers")
            .and_then(|v| v.get("openai"))
            .and_then(Value::as_object)
            .is_some_and(|obj| !obj.contains_key("api_key")));
        std::env::remove_var("OPENAI_API_KEY");
    }

    #[tokio::test]
    async fn project_patch_merges_without_dropping_other_keys() {
        let path = unique_temp_file("merge");
        let store = ConfigStore::new(&path, None).await.unwrap();
        store
            .patch_project(json!({ "default_provider": "anthropic" }))
            .await
            .unwrap();
        store
            .patch_project(json!({ "default_token_budget": 50_000 }))
            .await
            .unwrap();
        let config = store.get().await;
        assert_eq!(config.default_provider.as_deref(), Some("anthropic"));
        assert_eq!(config.default_token_budget, Some(50_000));
        let _ = fs::remove_file(&path).await;
    }

    #[test]
    fn deep_merge_overlays_nested_objects() {
        let mut base = json!({ "providers": { "openai": { "url": "a" } } });
        deep_merge(&mut base, &json!({ "providers": { "openai": { "default_model": "gpt-4o" } } }));
        assert_eq!(base["providers"]["openai"]["url"], "a");
        assert_eq!(base["providers"]["openai"]["default_model"], "gpt-4o");
    }
}
