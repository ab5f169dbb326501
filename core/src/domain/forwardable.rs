//! Forwardable port model and label selector matching.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Transport protocol of a forwardable port. Only TCP is forwarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ForwardProtocol {
    #[default]
    #[serde(rename = "TCP")]
    Tcp,
}

impl fmt::Display for ForwardProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => write!(f, "TCP"),
        }
    }
}

/// A port on a cluster resource that can be reached through a tunnel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForwardablePort {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub protocol: ForwardProtocol,
    /// Target resource as `<Kind>/<name>`.
    pub target_name: String,
    pub target_port: u16,
}

impl ForwardablePort {
    pub fn tcp(name: Option<String>, target_name: String, target_port: u16) -> Self {
        Self {
            name,
            protocol: ForwardProtocol::Tcp,
            target_name,
            target_port,
        }
    }

    /// Returns a display name for the port (e.g., "8080 (http)").
    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) if !name.is_empty() => format!("{} ({})", self.target_port, name),
            _ => self.target_port.to_string(),
        }
    }
}

/// Returns true if every selector key/value is present in `labels`.
pub fn selector_matches(
    selector: &BTreeMap<String, String>,
    labels: &BTreeMap<String, String>,
) -> bool {
    selector
        .iter()
        .all(|(key, value)| labels.get(key) == Some(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_selector_is_subset_of_labels() {
        let pod = labels(&[("app", "web"), ("tier", "frontend")]);

        assert!(selector_matches(&labels(&[("app", "web")]), &pod));
        assert!(selector_matches(
            &labels(&[("app", "web"), ("tier", "frontend")]),
            &pod
        ));
        assert!(!selector_matches(&labels(&[("app", "api")]), &pod));
        assert!(!selector_matches(
            &labels(&[("app", "web"), ("env", "prod")]),
            &pod
        ));
    }

    #[test]
    fn test_forwardable_port_display_name() {
        let named = ForwardablePort::tcp(Some("http".to_string()), "Service/web".to_string(), 80);
        assert_eq!(named.display_name(), "80 (http)");

        let unnamed = ForwardablePort::tcp(None, "Deployment/worker".to_string(), 9000);
        assert_eq!(unnamed.display_name(), "9000");
        assert_eq!(
            serde_json::to_value(&unnamed).unwrap()["protocol"],
            "TCP"
        );
    }
}
