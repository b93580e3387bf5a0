use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use ::time::OffsetDateTime;
use url::Url;

/// Hostname of the URL typed into the dashboard, with dots replaced by
/// underscores. Scheme-less input is read as `https://`.
pub fn report_prefix(url_input: &str) -> String {
    let trimmed = url_input.trim();
    let parsed = Url::parse(trimmed)
        .ok()
        .filter(|u| u.has_host())
        .or_else(|| {
            if trimmed.contains("://") {
                None
            } else {
                Url::parse(&format!("https://{trimmed}")).ok()
            }
        });
    match parsed.as_ref().and_then(Url::host_str) {
        Some(host) if !host.is_empty() => host.replace('.', "_"),
        _ => "report".to_string(),
    }
}

/// `<hostname_with_underscores>_audit_<epoch_ms>.json`
pub fn report_filename(url_input: &str, epoch_ms: i128) -> String {
    format!("{}_audit_{}.json", report_prefix(url_input), epoch_ms)
}

pub fn epoch_millis() -> i128 {
    OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000
}

/// Pretty JSON with a four-space indent.
pub fn serialize_report(result: &Value) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let fmt = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, fmt);
    result.serialize(&mut ser)?;
    Ok(buf)
}

/// Write the report for `result` into `dir` and return its path.
pub fn write_report(dir: &Path, url_input: &str, result: &Value, epoch_ms: i128) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create report directory: {}", dir.display()))?;
    let path = dir.join(report_filename(url_input, epoch_ms));
    let bytes = serialize_report(result)?;
    fs::write(&path, bytes).with_context(|| format!("failed to write report: {}", path.display()))?;
    Ok(path)
}
