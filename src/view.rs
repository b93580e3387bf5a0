//! View model for the dashboard: a `{field_id: value}` mapping that the
//! browser page (or the CLI table) paints. Nothing here touches a document.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::types::{is_truthy, ScanResult, MISSING};

/// Element ids of the dashboard page.
pub mod ids {
    pub const IP_DISPLAY: &str = "ipDisplay";
    pub const VPN_DISPLAY: &str = "vpnDisplay";
    pub const RISK_DISPLAY: &str = "riskDisplay";
    pub const ISP_DISPLAY_SMALL: &str = "ispDisplaySmall";
    pub const ASN_DETAIL: &str = "asnDetail";
    pub const ISP_DETAIL: &str = "ispDetail";
    pub const START_DETAIL: &str = "startDetail";
    pub const PORT_DETAIL: &str = "portDetail";
    pub const HSTS_DETAIL: &str = "hstsDetail";
    pub const CSP_DETAIL: &str = "cspDetail";
    pub const PROXY_DETAIL: &str = "proxyDetail";
    pub const SERVER_DETAIL: &str = "serverDetail";
    pub const STATUS_BADGE: &str = "statusBadge";
    pub const DOWNLOAD_BTN: &str = "downloadBtn";
}

pub const NOT_AVAILABLE: &str = "N/A";
pub const NO_PORTS: &str = "No common ports open";
pub const HSTS_HEADER: &str = "Strict-Transport-Security";
pub const CSP_HEADER: &str = "Content-Security-Policy";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Style {
    Plain,
    Present,
    Missing,
    Complete,
    Enabled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Field {
    pub text: String,
    pub style: Style,
}

impl Field {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            style: Style::Plain,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ViewModel {
    fields: BTreeMap<&'static str, Field>,
}

impl ViewModel {
    pub fn set(&mut self, id: &'static str, field: Field) {
        self.fields.insert(id, field);
    }

    pub fn get(&self, id: &str) -> Option<&Field> {
        self.fields.get(id)
    }

    pub fn text(&self, id: &str) -> Option<&str> {
        self.get(id).map(|f| f.text.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &Field)> {
        self.fields.iter().map(|(k, v)| (*k, v))
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Result of mapping a scan onto the view: the fields plus one warning per
/// value that was absent or unreadable and got a placeholder instead.
#[derive(Debug, Clone, Default)]
pub struct Rendered {
    pub view: ViewModel,
    pub warnings: Vec<String>,
}

/// Map a scan result onto the dashboard fields, degrading per field.
pub fn update_ui(data: &ScanResult) -> Rendered {
    let mut out = Rendered::default();
    let geo = data.geo_intel.as_ref();

    let ip = required(&mut out.warnings, "target_ip", data.target_ip.as_deref());
    out.view.set(ids::IP_DISPLAY, Field::plain(ip));

    if data.vpn_status.is_none() {
        out.warnings.push("vpn_status missing from scan result".into());
    }
    out.view.set(
        ids::VPN_DISPLAY,
        Field::plain(vpn_display(data.vpn_status.as_deref())),
    );
    out.view.set(ids::RISK_DISPLAY, Field::plain("AUDITED"));

    if geo.is_none() {
        out.warnings.push("geo_intel missing from scan result".into());
    }
    let org = geo.and_then(|g| g.org.as_deref()).filter(|s| !s.is_empty());
    let asn = geo.and_then(|g| g.asn.as_deref()).filter(|s| !s.is_empty());
    let isp = geo.and_then(|g| g.isp.as_deref());
    out.view
        .set(ids::ISP_DISPLAY_SMALL, Field::plain(org.unwrap_or(NOT_AVAILABLE)));
    out.view
        .set(ids::ASN_DETAIL, Field::plain(asn.unwrap_or(NOT_AVAILABLE)));
    out.view.set(
        ids::ISP_DETAIL,
        Field::plain(format!(
            "{} / {}",
            isp.unwrap_or(NOT_AVAILABLE),
            geo.and_then(|g| g.org.as_deref()).unwrap_or(NOT_AVAILABLE)
        )),
    );

    let start = required(
        &mut out.warnings,
        "scan_start_time",
        data.scan_start_time.as_deref(),
    );
    out.view.set(ids::START_DETAIL, Field::plain(start));

    let ports = match data.open_ports.as_deref() {
        Some(p) => port_detail(p.iter().map(|p| p.port)),
        None => {
            out.warnings.push("open_ports missing from scan result".into());
            NO_PORTS.to_string()
        }
    };
    out.view.set(ids::PORT_DETAIL, Field::plain(ports));

    out.view
        .set(ids::HSTS_DETAIL, format_header(data.security_header(HSTS_HEADER)));
    out.view
        .set(ids::CSP_DETAIL, format_header(data.security_header(CSP_HEADER)));

    let findings = data.findings.as_ref();
    out.view.set(
        ids::PROXY_DETAIL,
        Field::plain(
            findings
                .and_then(|f| f.proxy_detected.as_deref())
                .unwrap_or(NOT_AVAILABLE),
        ),
    );
    out.view.set(
        ids::SERVER_DETAIL,
        Field::plain(
            findings
                .and_then(|f| f.server_software.as_deref())
                .unwrap_or(NOT_AVAILABLE),
        ),
    );

    out.view.set(
        ids::STATUS_BADGE,
        Field {
            text: "Complete".into(),
            style: Style::Complete,
        },
    );
    out.view.set(
        ids::DOWNLOAD_BTN,
        Field {
            text: "Download Report".into(),
            style: Style::Enabled,
        },
    );
    out
}

/// Presence badge for a security header value. Falsy values and the
/// `MISSING` sentinel are absent.
pub fn format_header(value: Option<&Value>) -> Field {
    let present = match value {
        Some(Value::String(s)) => !s.is_empty() && s != MISSING,
        Some(v) => is_truthy(v),
        None => false,
    };
    if present {
        Field {
            text: "PRESENT".into(),
            style: Style::Present,
        }
    } else {
        Field {
            text: MISSING.into(),
            style: Style::Missing,
        }
    }
}

/// `DETECTED` when the backend's status string carries the `Found` marker.
/// Negative reports ("No VPN Server Found", "None Found") also contain the
/// marker and are read as `None`.
pub fn vpn_display(vpn_status: Option<&str>) -> &'static str {
    match vpn_status {
        Some(s) if s.contains("Found") && !is_negative_report(s) => "DETECTED",
        _ => "None",
    }
}

fn is_negative_report(s: &str) -> bool {
    matches!(
        s.split_whitespace().next(),
        Some("No" | "None" | "Not")
    )
}

pub fn port_detail(ports: impl IntoIterator<Item = u16>) -> String {
    let joined = ports
        .into_iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    if joined.is_empty() {
        NO_PORTS.to_string()
    } else {
        joined
    }
}

fn required<'a>(warnings: &mut Vec<String>, name: &str, value: Option<&'a str>) -> &'a str {
    match value {
        Some(v) => v,
        None => {
            warnings.push(format!("{name} missing from scan result"));
            NOT_AVAILABLE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn render(raw: Value) -> Rendered {
        update_ui(&ScanResult::from_value(&raw))
    }

    #[test]
    fn renders_well_formed_scan() {
        let r = render(json!({
            "target_ip": "1.2.3.4",
            "vpn_status": "None Found",
            "geo_intel": {"org": "ACME", "as": "AS123", "isp": "ACME ISP"},
            "scan_start_time": "12:00:00",
            "open_ports": [{"port": 80}, {"port": 443}],
            "findings": {"security_header_audit": {"Strict-Transport-Security": "max-age=0"}}
        }));
        let v = &r.view;
        assert!(r.warnings.is_empty(), "{:?}", r.warnings);
        assert_eq!(v.text(ids::IP_DISPLAY), Some("1.2.3.4"));
        assert_eq!(v.text(ids::VPN_DISPLAY), Some("None"));
        assert_eq!(v.text(ids::RISK_DISPLAY), Some("AUDITED"));
        assert_eq!(v.text(ids::ISP_DISPLAY_SMALL), Some("ACME"));
        assert_eq!(v.text(ids::ASN_DETAIL), Some("AS123"));
        assert_eq!(v.text(ids::ISP_DETAIL), Some("ACME ISP / ACME"));
        assert_eq!(v.text(ids::START_DETAIL), Some("12:00:00"));
        assert_eq!(v.text(ids::PORT_DETAIL), Some("80, 443"));
        assert_eq!(v.text(ids::HSTS_DETAIL), Some("PRESENT"));
        assert_eq!(v.text(ids::CSP_DETAIL), Some("MISSING"));
        assert_eq!(v.get(ids::STATUS_BADGE).unwrap().style, Style::Complete);
        assert_eq!(v.get(ids::DOWNLOAD_BTN).unwrap().style, Style::Enabled);
    }

    #[test]
    fn vpn_without_marker_is_none() {
        assert_eq!(vpn_display(Some("VPN Found! Banner: x")), "DETECTED");
        assert_eq!(vpn_display(Some("Found")), "DETECTED");
        assert_eq!(vpn_display(Some("No VPN Server Found")), "None");
        assert_eq!(vpn_display(Some("clean")), "None");
        assert_eq!(vpn_display(None), "None");
    }

    #[test]
    fn header_presence_rules() {
        assert_eq!(format_header(Some(&json!("max-age=0"))).text, "PRESENT");
        assert_eq!(format_header(Some(&json!("MISSING"))).text, "MISSING");
        assert_eq!(format_header(Some(&json!(""))).text, "MISSING");
        assert_eq!(format_header(Some(&json!(null))).text, "MISSING");
        assert_eq!(format_header(None).text, "MISSING");
        assert_eq!(format_header(None).style, Style::Missing);
    }

    #[test]
    fn empty_port_list_uses_placeholder() {
        assert_eq!(port_detail(Vec::new()), NO_PORTS);
    }

    #[test]
    fn malformed_scan_degrades_field_by_field() {
        let r = render(json!({"vpn_status": 7, "open_ports": "none"}));
        assert_eq!(r.view.text(ids::IP_DISPLAY), Some(NOT_AVAILABLE));
        assert_eq!(r.view.text(ids::VPN_DISPLAY), Some("None"));
        assert_eq!(r.view.text(ids::ISP_DETAIL), Some("N/A / N/A"));
        assert_eq!(r.view.text(ids::PORT_DETAIL), Some(NO_PORTS));
        assert_eq!(r.view.text(ids::STATUS_BADGE), Some("Complete"));
        assert_eq!(r.warnings.len(), 5);
    }
}
