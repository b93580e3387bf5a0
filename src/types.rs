use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Sentinel the backend writes for an absent security header.
pub const MISSING: &str = "MISSING";

/// Body of every POST the dashboard sends.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AuditRequest {
    pub url: String,
}

/// Geo/ASN intelligence for the resolved target.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct GeoIntel {
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub org: Option<String>,
    #[serde(
        rename = "as",
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub asn: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub isp: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
}

/// One open port reported by the backend.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct OpenPort {
    pub port: u16,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub banner: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Findings {
    /// Header name -> header value, or [`MISSING`].
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub security_header_audit: Option<BTreeMap<String, Value>>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub proxy_detected: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub server_software: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub operating_system: Option<String>,
}

/// Typed view of an audit result. Every field is optional so a partial
/// payload still renders; the raw document is kept separately for reports.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ScanResult {
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub target_ip: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub vpn_status: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub geo_intel: Option<GeoIntel>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub scan_start_time: Option<String>,
    #[serde(default, deserialize_with = "lenient_ports", skip_serializing_if = "Option::is_none")]
    pub open_ports: Option<Vec<OpenPort>>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub findings: Option<Findings>,
}

impl ScanResult {
    /// Parse the typed view out of a raw backend document. Never fails:
    /// anything unreadable (including a non-object) yields an empty view.
    pub fn from_value(raw: &Value) -> Self {
        Self::deserialize(raw).unwrap_or_default()
    }

    /// Value of a security header from the audit mapping, if reported.
    pub fn security_header(&self, name: &str) -> Option<&Value> {
        self.findings
            .as_ref()
            .and_then(|f| f.security_header_audit.as_ref())
            .and_then(|h| h.get(name))
    }
}

/// Response of the lightweight scrape endpoint.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ScrapeResult {
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient_vec")]
    pub h1: Vec<String>,
    #[serde(default, deserialize_with = "lenient_vec")]
    pub links: Vec<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Reply to a full-scan submission.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct JobTicket {
    pub job_id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Done,
    Failed,
    #[serde(other)]
    Unknown,
}

/// Job record returned by `GET /api/job/{job_id}`.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct JobRecord {
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub status: Option<JobStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_data: Option<Value>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub result_path: Option<String>,
}

impl JobRecord {
    pub fn running() -> Self {
        Self {
            status: Some(JobStatus::Running),
            ..Self::default()
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == Some(JobStatus::Running)
    }
}

/// JavaScript-style truthiness, used for header presence checks.
pub fn is_truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

// Wrongly-typed fields become `None` instead of failing the whole payload.
fn lenient<'de, D, T>(d: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let v = Value::deserialize(d)?;
    Ok(serde_json::from_value(v).ok())
}

fn lenient_vec<'de, D, T>(d: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    Ok(lenient::<D, Vec<T>>(d)?.unwrap_or_default())
}

// Ports that fail to parse are skipped individually.
fn lenient_ports<'de, D>(d: D) -> Result<Option<Vec<OpenPort>>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(d)?;
    Ok(match v {
        Value::Array(items) => Some(
            items
                .into_iter()
                .filter_map(|p| serde_json::from_value(p).ok())
                .collect(),
        ),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wrong_types_degrade_to_none() {
        let raw = json!({
            "target_ip": 12,
            "vpn_status": "No VPN Server Found",
            "geo_intel": "nope",
            "open_ports": [{"port": 80}, {"port": "x"}, {"port": 443, "banner": "nginx"}],
        });
        let scan = ScanResult::from_value(&raw);
        assert_eq!(scan.target_ip, None);
        assert_eq!(scan.vpn_status.as_deref(), Some("No VPN Server Found"));
        assert_eq!(scan.geo_intel, None);
        let ports: Vec<u16> = scan.open_ports.unwrap().iter().map(|p| p.port).collect();
        assert_eq!(ports, vec![80, 443]);
    }

    #[test]
    fn non_object_yields_empty_view() {
        assert_eq!(ScanResult::from_value(&json!([1, 2])), ScanResult::default());
    }

    #[test]
    fn geo_as_field_is_renamed() {
        let geo: GeoIntel = serde_json::from_value(json!({"as": "AS123", "org": "ACME"})).unwrap();
        assert_eq!(geo.asn.as_deref(), Some("AS123"));
    }

    #[test]
    fn unknown_job_status_is_not_running() {
        let job: JobRecord = serde_json::from_value(json!({"status": "queued"})).unwrap();
        assert_eq!(job.status, Some(JobStatus::Unknown));
        assert!(!job.is_running());
    }

    #[test]
    fn truthiness_matches_js() {
        assert!(!is_truthy(&json!(null)));
        assert!(!is_truthy(&json!("")));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!(false)));
        assert!(is_truthy(&json!("max-age=0")));
        assert!(is_truthy(&json!({})));
    }

    #[test]
    fn scrape_tolerates_missing_lists() {
        let s: ScrapeResult = serde_json::from_value(json!({"error": "timeout"})).unwrap();
        assert!(s.links.is_empty());
        assert_eq!(s.error.as_deref(), Some("timeout"));
    }
}
