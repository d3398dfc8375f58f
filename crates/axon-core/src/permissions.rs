use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::RwLock;
use uuid::Uuid;

use axon_types::{KernelError, KernelEvent, Permission};

use crate::event_bus::EventBus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionAction {
    Allow,
    Ask,
    Deny,
}

/// One rule in the evaluation order: a `(permission, pattern)` pair mapped
/// to an action. `pattern` matches against the module/agent id the
/// permission was requested for; `*` is a full-value wildcard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionRule {
    pub id: String,
    pub permission: Permission,
    pub pattern: String,
    pub action: PermissionAction,
}

/// Tracks per-module grants and evaluates `check` calls against them.
/// Rules are evaluated most-recently-granted-first so a later `revoke`
/// always overrides an earlier `grant` for the same pattern.
#[derive(Clone)]
pub struct PermissionManager {
    rules: Arc<RwLock<Vec<PermissionRule>>>,
    event_bus: EventBus,
}

impl PermissionManager {
    pub fn new(event_bus: EventBus) -> Self {
        Self {
            rules: Arc::new(RwLock::new(Vec::new())),
            event_bus,
        }
    }

    pub async fn grant(&self, module_id: &str, permission: Permission) {
        self.rules.write().await.push(PermissionRule {
            id: Uuid::new_v4().to_string(),
            permission,
            pattern: module_id.to_string(),
            action: PermissionAction::Allow,
        });
        self.event_bus.publish(KernelEvent::new(
            "permission.granted",
            json!({"moduleId": module_id, "permission": permission.as_str()}),
        ));
    }

    pub async fn revoke(&self, module_id: &str, permission: Permission) {
        self.rules.write().await.push(PermissionRule {
            id: Uuid::new_v4().to_string(),
            permission,
            pattern: module_id.to_string(),
            action: PermissionAction::Deny,
        });
        self.event_bus.publish(KernelEvent::new(
            "permission.revoked",
            json!({"moduleId": module_id, "permission": permission.as_str()}),
        ));
    }

    /// Evaluates the most recently added matching rule for `(permission,
    /// module_id)`. Defaults to `Ask` when no rule matches, never `Allow`.
    pub async fn evaluate(&self, permission: Permission, module_id: &str) -> PermissionAction {
        let rules = self.rules.read().await;
        rules
            .iter()
            .rev()
            .find(|rule| rule.permission == permission && wildcard_matches(&rule.pattern, module_id))
            .map(|rule| rule.action)
            .unwrap_or(PermissionAction::Ask)
    }

    /// `check` raises `PermissionDenied` on `Deny` or on an unresolved
    /// `Ask`, and publishes `permission.denied` before returning the error.
    pub async fn check(&self, permission: Permission, module_id: &str) -> Result<(), KernelError> {
        match self.evaluate(permission, module_id).await {
            PermissionAction::Allow => Ok(()),
            PermissionAction::Deny | PermissionAction::Ask => {
                self.event_bus.publish(KernelEvent::new(
                    "permission.denied",
                    json!({"moduleId": module_id, "permission": permission.as_str()}),
                ));
                Err(KernelError::PermissionDenied(format!(
                    "module `{module_id}` lacks permission `{}`",
                    permission.as_str()
                )))
            }
        }
    }

    pub async fn list_rules(&self) -> Vec<PermissionRule> {
        self.rules.read().await.clone()
    }
}

/// `*` matches any value; a pattern with no `*` requires an exact match;
/// a pattern containing `*` matches as a sequence of literal segments, with
/// a trailing `*` allowing trailing content.
pub fn wildcard_matches(pattern: &str, value: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    if !pattern.contains('*') {
        return pattern == value;
    }
    let mut remaining = value;
    let mut is_first = true;
    for part in pattern.split('*') {
        if part.is_empty() {
            continue;
        }
        if is_first {
            if let Some(stripped) = remaining.strip_prefix(part) {
                remaining = stripped;
            } else {
                return false;
            }
            is_first = false;
            continue;
        }
        if let Some(index) = remaining.find(part) {
            remaining = &remaining[index + part.len()..];
        } else {
            return false;
        }
    }
    pattern.ends_with('*') || remaining.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ungranted_permission_defaults_to_ask_and_denies() {
        let manager = PermissionManager::new(EventBus::new());
        let result = manager.check(Permission::NetworkFetch, "mod.a").await;
        assert!(matches!(result, Err(KernelError::PermissionDenied(_))));
    }

    #[tokio::test]
    async fn grant_then_check_succeeds() {
        let manager = PermissionManager::new(EventBus::new());
        manager.grant("mod.a", Permission::StorageRead).await;
        assert!(manager.check(Permission::StorageRead, "mod.a").await.is_ok());
    }

    #[tokio::test]
    async fn revoke_after_grant_wins() {
        let manager = PermissionManager::new(EventBus::new());
        manager.grant("mod.a", Permission::ToolExecute).await;
        manager.revoke("mod.a", Permission::ToolExecute).await;
        let result = manager.check(Permission::ToolExecute, "mod.a").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn wildcard_pattern_grants_across_all_modules() {
        let manager = PermissionManager::new(EventBus::new());
        manager.grant("*", Permission::UiNotify).await;
        assert!(manager.check(Permission::UiNotify, "mod.anything").await.is_ok());
    }

    #[tokio::test]
    async fn denied_check_publishes_event() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let manager = PermissionManager::new(bus);
        let _ = manager.check(Permission::ComputerShell, "mod.a").await;
        let event = rx.recv().await.expect("event");
        assert_eq!(event.event_type, "permission.denied");
    }
}
