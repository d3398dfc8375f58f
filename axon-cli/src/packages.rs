use std::path::Path;

use tracing::{info, warn};

use axon_tools::ToolDefinition;
use axon_types::{is_core_version_compatible, validate_manifest, PackageManifest, SandboxLimits};

/// This binary's own version, checked against each discovered package's
/// `minCoreVersion`/`maxCoreVersion` range.
pub const CORE_VERSION: &str = "0.1.0";

fn default_tool_limits() -> SandboxLimits {
    SandboxLimits {
        timeout_ms: 30_000,
        max_memory_bytes: 128 * 1024 * 1024,
        allowed_apis: Vec::new(),
        denied_apis: Vec::new(),
        network_enabled: false,
        filesystem_enabled: false,
    }
}

/// Scans `<workspace_root>/.axon/packages/*/manifest.json`, keeps the
/// manifests that pass shape validation and whose core-version range
/// covers this binary, and turns each compatible package's declared
/// tools into tool definitions the ToolRegistry can dispatch through the
/// Sandbox port. A tool's sandbox `code` becomes `<package id>::<tool
/// name>`, a convention the installed package's own sandbox script is
/// expected to dispatch on; the kernel itself never inspects it.
pub async fn load_workspace_packages(workspace_root: &Path) -> anyhow::Result<Vec<ToolDefinition>> {
    let packages_dir = workspace_root.join(".axon").join("packages");
    if !packages_dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut tools = Vec::new();
    let mut entries = tokio::fs::read_dir(&packages_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let manifest_path = entry.path().join("manifest.json");
        if !manifest_path.is_file() {
            continue;
        }

        let raw = match tokio::fs::read_to_string(&manifest_path).await {
            Ok(raw) => raw,
            Err(err) => {
                warn!(path = %manifest_path.display(), error = %err, "failed to read package manifest");
                continue;
            }
        };
        let manifest: PackageManifest = match serde_json::from_str(&raw) {
            Ok(manifest) => manifest,
            Err(err) => {
                warn!(path = %manifest_path.display(), error = %err, "failed to parse package manifest");
                continue;
            }
        };
        if let Err(err) = validate_manifest(&manifest) {
            warn!(package_id = %manifest.id, error = %err, "package manifest failed validation, skipping");
            continue;
        }
        match is_core_version_compatible(&manifest, CORE_VERSION) {
            Ok(true) => {}
            Ok(false) => {
                warn!(
                    package_id = %manifest.id,
                    min = %manifest.min_core_version,
                    max = %manifest.max_core_version,
                    core = CORE_VERSION,
                    "package manifest incompatible with this core version, skipping",
                );
                continue;
            }
            Err(err) => {
                warn!(package_id = %manifest.id, error = %err, "failed to parse package core version range, skipping");
                continue;
            }
        }

        info!(package_id = %manifest.id, tool_count = manifest.tools.len(), "loaded package manifest");
        for tool in manifest.tools {
            tools.push(ToolDefinition {
                name: tool.name.clone(),
                description: tool.description,
                input_schema: tool.input_schema,
                code: format!("{}::{}", manifest.id, tool.name),
                limits: default_tool_limits(),
            });
        }
    }
    Ok(tools)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    async fn write_manifest(dir: &Path, package_id: &str, manifest: &PackageManifest) {
        let package_dir = dir.join(".axon").join("packages").join(package_id);
        tokio::fs::create_dir_all(&package_dir).await.unwrap();
        let raw = serde_json::to_string_pretty(manifest).unwrap();
        tokio::fs::write(package_dir.join("manifest.json"), raw).await.unwrap();
    }

    fn manifest(id: &str, min: &str, max: &str) -> PackageManifest {
        PackageManifest {
            id: id.to_string(),
            name: id.to_string(),
            version: "1.0.0".to_string(),
            min_core_version: min.to_string(),
            max_core_version: max.to_string(),
            required_capabilities: Vec::new(),
            tools: vec![axon_types::ManifestTool {
                name: "lookup".to_string(),
                description: "looks something up".to_string(),
                input_schema: json!({"type": "object"}),
            }],
            permissions: vec!["ai_generate".to_string()],
            signature: "deadbeef".to_string(),
        }
    }

    #[tokio::test]
    async fn a_compatible_package_contributes_its_declared_tools() {
        let dir = tempdir().expect("tempdir");
        write_manifest(dir.path(), "pkg.compatible", &manifest("pkg.compatible", "0.1.0", "0.x")).await;
        let tools = load_workspace_packages(dir.path()).await.expect("load");
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].code, "pkg.compatible::lookup");
    }

    #[tokio::test]
    async fn an_incompatible_package_is_skipped_without_failing_the_scan() {
        let dir = tempdir().expect("tempdir");
        write_manifest(dir.path(), "pkg.old", &manifest("pkg.old", "0.0.1", "0.0.9")).await;
        write_manifest(dir.path(), "pkg.compatible", &manifest("pkg.compatible", "0.1.0", "0.x")).await;
        let tools = load_workspace_packages(dir.path()).await.expect("load");
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].code, "pkg.compatible::lookup");
    }

    #[tokio::test]
    async fn no_packages_directory_is_not_an_error() {
        let dir = tempdir().expect("tempdir");
        let tools = load_workspace_packages(dir.path()).await.expect("load");
        assert!(tools.is_empty());
    }
}
