use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Which binary is emitting logs — each gets its own JSONL file prefix so
/// a worker pool and a CLI invocation against the same log directory
/// don't interleave into one file.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessKind {
    Runtime,
    Cli,
}

impl ProcessKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ProcessKind::Runtime => "runtime",
            ProcessKind::Cli => "cli",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LoggingInitInfo {
    pub process: String,
    pub logs_dir: String,
    pub prefix: String,
    pub retention_days: u64,
    pub initialized_at: DateTime<Utc>,
}

/// One structured log line tied to an execution. Fields line up with the
/// kernel's own identifiers (`executionId`, `agentId`, `nodeId`) rather
/// than a generic session/message pair, so a log line can be correlated
/// straight back to a `SnapshotRecord`.
#[derive(Debug, Clone, Serialize)]
pub struct ObservabilityEvent<'a> {
    pub event: &'a str,
    pub component: &'a str,
    pub execution_id: Option<&'a str>,
    pub agent_id: Option<&'a str>,
    pub node_id: Option<&'a str>,
    pub provider_id: Option<&'a str>,
    pub model_id: Option<&'a str>,
    pub status: Option<&'a str>,
    pub error_code: Option<&'a str>,
    pub detail: Option<&'a str>,
}

/// Replaces arbitrary tool-argument or memory-content text with a
/// length-and-hash fingerprint before it reaches a log line.
pub fn redact_text(input: &str) -> String {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    format!("[redacted len={} sha256={}]", trimmed.len(), short_hash(trimmed))
}

pub fn short_hash(input: &str) -> String {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    input.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

pub fn emit_event(level: Level, process: ProcessKind, event: ObservabilityEvent<'_>) {
    let fields = (
        process.as_str(),
        event.component,
        event.event,
        event.execution_id.unwrap_or(""),
        event.agent_id.unwrap_or(""),
        event.node_id.unwrap_or(""),
        event.provider_id.unwrap_or(""),
        event.model_id.unwrap_or(""),
        event.status.unwrap_or(""),
        event.error_code.unwrap_or(""),
        event.detail.unwrap_or(""),
    );
    match level {
        Level::ERROR => tracing::error!(
            target: "axon.obs",
            process = fields.0, component = fields.1, event = fields.2,
            execution_id = fields.3, agent_id = fields.4, node_id = fields.5,
            provider_id = fields.6, model_id = fields.7, status = fields.8,
            error_code = fields.9, detail = fields.10,
            "observability_event"
        ),
        Level::WARN => tracing::warn!(
            target: "axon.obs",
            process = fields.0, component = fields.1, event = fields.2,
            execution_id = fields.3, agent_id = fields.4, node_id = fields.5,
            provider_id = fields.6, model_id = fields.7, status = fields.8,
            error_code = fields.9, detail = fields.10,
            "observability_event"
        ),
        _ => tracing::info!(
            target: "axon.obs",
            process = fields.0, component = fields.1, event = fields.2,
            execution_id = fields.3, agent_id = fields.4, node_id = fields.5,
            provider_id = fields.6, model_id = fields.7, status = fields.8,
            error_code = fields.9, detail = fields.10,
            "observability_event"
        ),
    }
}

pub fn init_process_logging(
    process: ProcessKind,
    logs_dir: &Path,
    retention_days: u64,
) -> anyhow::Result<(WorkerGuard, LoggingInitInfo)> {
    fs::create_dir_all(logs_dir)?;
    cleanup_old_jsonl(logs_dir, process.as_str(), retention_days)?;

    let file_appender = tracing_appender::rolling::Builder::new()
        .rotation(tracing_appender::rolling::Rotation::DAILY)
        .filename_prefix(format!("axon.{}", process.as_str()))
        .filename_suffix("jsonl")
        .build(logs_dir)?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_current_span(false)
        .with_span_list(false);

    let console_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_target(true)
        .with_ansi(true);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .ok();

    let info = LoggingInitInfo {
        process: process.as_str().to_string(),
        logs_dir: logs_dir.display().to_string(),
        prefix: format!("axon.{}", process.as_str()),
        retention_days,
        initialized_at: Utc::now(),
    };

    Ok((guard, info))
}

fn cleanup_old_jsonl(logs_dir: &Path, process: &str, retention_days: u64) -> anyhow::Result<()> {
    let cutoff = Utc::now() - chrono::Duration::days(retention_days as i64);
    let prefix = format!("axon.{}.", process);

    for entry in fs::read_dir(logs_dir)? {
        let Ok(entry) = entry else { continue };
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !name.starts_with(&prefix) || !name.ends_with(".jsonl") {
            continue;
        }
        let date_part = name.trim_start_matches(&prefix).trim_end_matches(".jsonl");
        let Ok(date) = chrono::NaiveDate::parse_from_str(date_part, "%Y-%m-%d") else {
            continue;
        };
        let Some(dt) = date.and_hms_opt(0, 0, 0) else {
            continue;
        };
        if DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc) < cutoff {
            let _ = fs::remove_file(path);
        }
    }
    Ok(())
}

pub fn canonical_logs_dir_from_root(root: &Path) -> PathBuf {
    root.join("logs")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redact_text_masks_content() {
        let raw = "super-secret-token-123";
        let redacted = redact_text(raw);
        assert!(redacted.contains("[redacted len="));
        assert!(!redacted.contains("super-secret-token-123"));
    }

    #[test]
    fn canonical_logs_dir_joins_logs_folder() {
        let root = PathBuf::from("/tmp/axon");
        let logs = canonical_logs_dir_from_root(&root);
        assert_eq!(logs, PathBuf::from("/tmp/axon").join("logs"));
    }
}
