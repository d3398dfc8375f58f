use serde::{Deserialize, Serialize};

use axon_types::Permission;

use crate::permissions::PermissionAction;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PermissionRuleTemplate {
    pub permission: Permission,
    pub pattern: String,
    pub action: PermissionAction,
}

/// Higher-risk permissions default to `ask` rather than `allow` even when
/// declared, so a first-run module always surfaces a prompt before it can
/// touch the shell, the filesystem, or another agent's budget.
fn default_action_for(permission: Permission) -> PermissionAction {
    match permission {
        Permission::ComputerShell
        | Permission::ComputerFiles
        | Permission::Filesystem
        | Permission::AgentCall => PermissionAction::Ask,
        _ => PermissionAction::Allow,
    }
}

/// Builds the initial rule set for a module from its manifest-declared
/// permission list, scoped to that module's own id. Declaring a permission
/// does not itself guarantee `allow` — [`default_action_for`] still routes
/// the riskier permissions to `ask`.
pub fn build_module_permission_rules(
    module_id: &str,
    declared: &[Permission],
) -> Vec<PermissionRuleTemplate> {
    declared
        .iter()
        .map(|&permission| PermissionRuleTemplate {
            permission,
            pattern: module_id.to_string(),
            action: default_action_for(permission),
        })
        .collect()
}

/// The minimal rule set a freshly installed module gets with no declared
/// permissions at all: read-only access to its own private memory scope.
pub fn default_empty_module_rules(module_id: &str) -> Vec<PermissionRuleTemplate> {
    vec![PermissionRuleTemplate {
        permission: Permission::MemoryRead,
        pattern: module_id.to_string(),
        action: PermissionAction::Allow,
    }]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shell_permission_defaults_to_ask_even_when_declared() {
        let rules = build_module_permission_rules("mod.a", &[Permission::ComputerShell]);
        assert_eq!(rules[0].action, PermissionAction::Ask);
    }

    #[test]
    fn storage_read_defaults_to_allow_when_declared() {
        let rules = build_module_permission_rules("mod.a", &[Permission::StorageRead]);
        assert_eq!(rules[0].action, PermissionAction::Allow);
    }

    #[test]
    fn empty_declaration_grants_private_memory_read_only() {
        let rules = default_empty_module_rules("mod.a");
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].permission, Permission::MemoryRead);
    }
}
