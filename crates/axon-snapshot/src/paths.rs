use std::path::PathBuf;

/// Resolves the base directory snapshots are persisted under:
/// `$AXON_SNAPSHOT_DIR`, else `dirs::data_dir()/axon/snapshots`.
pub fn resolve_snapshot_dir() -> anyhow::Result<PathBuf> {
    if let Ok(dir) = std::env::var("AXON_SNAPSHOT_DIR") {
        return Ok(PathBuf::from(dir));
    }
    let base = dirs::data_dir().ok_or_else(|| anyhow::anyhow!("failed to resolve data dir"))?;
    Ok(base.join("axon").join("snapshots"))
}
