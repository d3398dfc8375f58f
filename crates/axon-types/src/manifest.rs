use serde::{Deserialize, Serialize};

use crate::errors::KernelError;

/// A declared tool entry inside a package manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestTool {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// Agent/Skill package manifest. The core only validates this shape and
/// the declared permission set at runtime — packaging, marketplace
/// distribution, and signing live outside the kernel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageManifest {
    pub id: String,
    pub name: String,
    pub version: String,
    pub min_core_version: String,
    pub max_core_version: String,
    #[serde(default)]
    pub required_capabilities: Vec<String>,
    #[serde(default)]
    pub tools: Vec<ManifestTool>,
    #[serde(default)]
    pub permissions: Vec<String>,
    pub signature: String,
}

/// A `MAJOR.MINOR.PATCH` version with optional trailing `.x` expanded to
/// `.999`, so `1.2.x` covers every patch release of the `1.2` line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct CoreVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl CoreVersion {
    pub fn parse(raw: &str) -> Result<CoreVersion, KernelError> {
        let mut parts = raw.trim().split('.');
        let major = parse_component(parts.next(), raw)?;
        let minor_raw = parts.next();
        let patch_raw = parts.next();
        if parts.next().is_some() {
            return Err(KernelError::ValidationError(format!(
                "invalid core version `{raw}`: too many components"
            )));
        }
        let minor = match minor_raw {
            Some("x") => 999,
            other => parse_component(other, raw)?,
        };
        let patch = match patch_raw {
            Some("x") => 999,
            None if minor_raw == Some("x") => 999,
            other => parse_component(other, raw)?,
        };
        Ok(CoreVersion {
            major,
            minor,
            patch,
        })
    }
}

fn parse_component(raw: Option<&str>, full: &str) -> Result<u64, KernelError> {
    match raw {
        Some(value) => value
            .parse::<u64>()
            .map_err(|_| KernelError::ValidationError(format!("invalid core version `{full}`"))),
        None => Ok(0),
    }
}

/// `minCoreVersion <= core <= maxCoreVersion`.
pub fn is_core_version_compatible(
    manifest: &PackageManifest,
    core_version: &str,
) -> Result<bool, KernelError> {
    let min = CoreVersion::parse(&manifest.min_core_version)?;
    let max = CoreVersion::parse(&manifest.max_core_version)?;
    let core = CoreVersion::parse(core_version)?;
    Ok(min <= core && core <= max)
}

/// Validates the manifest shape: non-empty id/name, parseable versions,
/// `minCoreVersion <= maxCoreVersion`, and that every declared permission
/// string is a member of the closed [`crate::Permission`] enum.
pub fn validate_manifest(manifest: &PackageManifest) -> Result<(), KernelError> {
    if manifest.id.trim().is_empty() {
        return Err(KernelError::ValidationError(
            "manifest id must not be empty".to_string(),
        ));
    }
    if manifest.signature.trim().is_empty() {
        return Err(KernelError::ValidationError(
            "manifest signature must not be empty".to_string(),
        ));
    }
    let min = CoreVersion::parse(&manifest.min_core_version)?;
    let max = CoreVersion::parse(&manifest.max_core_version)?;
    if min > max {
        return Err(KernelError::ValidationError(format!(
            "manifest `{}`: minCoreVersion {} is greater than maxCoreVersion {}",
            manifest.id, manifest.min_core_version, manifest.max_core_version
        )));
    }
    for perm in &manifest.permissions {
        if crate::permission::Permission::parse(perm).is_none() {
            return Err(KernelError::ValidationError(format!(
                "manifest `{}` declares unknown permission `{perm}`",
                manifest.id
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest(min: &str, max: &str) -> PackageManifest {
        PackageManifest {
            id: "pkg.example".to_string(),
            name: "Example".to_string(),
            version: "1.0.0".to_string(),
            min_core_version: min.to_string(),
            max_core_version: max.to_string(),
            required_capabilities: vec![],
            tools: vec![],
            permissions: vec!["ai_generate".to_string()],
            signature: "deadbeef".to_string(),
        }
    }

    #[test]
    fn trailing_dot_x_expands_to_999() {
        let v = CoreVersion::parse("1.2.x").unwrap();
        assert_eq!(v, CoreVersion { major: 1, minor: 2, patch: 999 });
    }

    #[test]
    fn compatibility_is_inclusive_on_both_ends() {
        let m = manifest("1.0.0", "1.x");
        assert!(is_core_version_compatible(&m, "1.0.0").unwrap());
        assert!(is_core_version_compatible(&m, "1.999.999").unwrap());
        assert!(!is_core_version_compatible(&m, "2.0.0").unwrap());
        assert!(!is_core_version_compatible(&m, "0.9.0").unwrap());
    }

    #[test]
    fn rejects_unknown_permission_strings() {
        let mut m = manifest("1.0.0", "1.x");
        m.permissions.push("not_a_real_permission".to_string());
        assert!(validate_manifest(&m).is_err());
    }

    #[test]
    fn rejects_inverted_version_range() {
        let m = manifest("2.0.0", "1.0.0");
        assert!(validate_manifest(&m).is_err());
    }
}
