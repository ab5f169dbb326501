//! Tunnel target, key and descriptor models.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

// ============================================================================
// TargetKind
// ============================================================================

/// Kind of cluster resource a tunnel can point at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetKind {
    Service,
    Deployment,
    DaemonSet,
    StatefulSet,
    Pod,
}

impl TargetKind {
    /// Canonical kind name as used in `<Kind>/<name>` identifiers.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Service => "Service",
            Self::Deployment => "Deployment",
            Self::DaemonSet => "DaemonSet",
            Self::StatefulSet => "StatefulSet",
            Self::Pod => "Pod",
        }
    }

    /// Resolves a kind from its name, plural or kubectl short name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "service" | "services" | "svc" => Some(Self::Service),
            "deployment" | "deployments" | "deploy" => Some(Self::Deployment),
            "daemonset" | "daemonsets" | "ds" => Some(Self::DaemonSet),
            "statefulset" | "statefulsets" | "sts" => Some(Self::StatefulSet),
            "pod" | "pods" | "po" => Some(Self::Pod),
            _ => None,
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// TargetResource
// ============================================================================

/// A cluster object identified as `<Kind>/<name>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TargetResource {
    pub kind: TargetKind,
    pub name: String,
}

impl TargetResource {
    pub fn new(kind: TargetKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

impl FromStr for TargetResource {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (kind, name) = s.split_once('/').ok_or_else(|| {
            Error::Config(format!("Target '{}' is not of the form <Kind>/<name>", s))
        })?;

        let kind = TargetKind::from_name(kind.trim())
            .ok_or_else(|| Error::UnsupportedTarget(s.to_string()))?;

        let name = name.trim();
        if name.is_empty() || name.contains('/') {
            return Err(Error::Config(format!("Invalid resource name in target '{}'", s)));
        }

        Ok(Self::new(kind, name))
    }
}

impl TryFrom<String> for TargetResource {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<TargetResource> for String {
    fn from(target: TargetResource) -> Self {
        target.to_string()
    }
}

impl fmt::Display for TargetResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

// ============================================================================
// TunnelKey
// ============================================================================

/// Identifies a tunnel slot: at most one live tunnel exists per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TunnelKey {
    pub target: TargetResource,
    pub remote_port: u16,
}

impl TunnelKey {
    pub fn new(target: TargetResource, remote_port: u16) -> Result<Self> {
        if remote_port == 0 {
            return Err(Error::Config(format!(
                "Remote port for {} must be between 1 and 65535",
                target
            )));
        }
        Ok(Self {
            target,
            remote_port,
        })
    }

    /// Parses a `<Kind>/<name>` target and pairs it with a remote port.
    pub fn parse(target: &str, remote_port: u16) -> Result<Self> {
        Self::new(target.parse()?, remote_port)
    }
}

impl fmt::Display for TunnelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.target, self.remote_port)
    }
}

// ============================================================================
// TunnelStatus & TunnelDescriptor
// ============================================================================

/// Lifecycle state of a tunnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TunnelStatus {
    #[default]
    Pending,
    Active,
    Terminated,
}

impl TunnelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Terminated => "terminated",
        }
    }

    pub fn is_terminated(&self) -> bool {
        *self == Self::Terminated
    }
}

/// Snapshot of a tunnel handed out to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TunnelDescriptor {
    pub id: Uuid,
    pub target: TargetResource,
    pub remote_port: u16,
    pub local_port: u16,
    pub status: TunnelStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
}

impl TunnelDescriptor {
    pub fn key(&self) -> TunnelKey {
        TunnelKey {
            target: self.target.clone(),
            remote_port: self.remote_port,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_target_resource() {
        let target: TargetResource = "Service/web".parse().unwrap();
        assert_eq!(target.kind, TargetKind::Service);
        assert_eq!(target.name, "web");
        assert_eq!(target.to_string(), "Service/web");

        let target: TargetResource = "deploy/api".parse().unwrap();
        assert_eq!(target.to_string(), "Deployment/api");

        let target: TargetResource = "ds/node-agent".parse().unwrap();
        assert_eq!(target.kind, TargetKind::DaemonSet);
    }

    #[test]
    fn test_parse_target_resource_errors() {
        let unsupported = "Job/migrate".parse::<TargetResource>();
        assert!(matches!(unsupported, Err(Error::UnsupportedTarget(_))));

        let no_kind = "web".parse::<TargetResource>();
        assert!(matches!(no_kind, Err(Error::Config(_))));

        let no_name = "Service/".parse::<TargetResource>();
        assert!(matches!(no_name, Err(Error::Config(_))));
    }

    #[test]
    fn test_tunnel_key_rejects_port_zero() {
        assert!(matches!(
            TunnelKey::parse("Service/web", 0),
            Err(Error::Config(_))
        ));

        let key = TunnelKey::parse("svc/web", 8080).unwrap();
        assert_eq!(key.to_string(), "Service/web:8080");
    }

    #[test]
    fn test_descriptor_serializes_target_as_string() {
        let descriptor = TunnelDescriptor {
            id: Uuid::nil(),
            target: TargetResource::new(TargetKind::Service, "web"),
            remote_port: 8080,
            local_port: 51234,
            status: TunnelStatus::Active,
            pid: None,
        };
        let json = serde_json::to_value(&descriptor).unwrap();
        assert_eq!(json["target"], "Service/web");
        assert_eq!(json["localPort"], 51234);
        assert_eq!(json["status"], "active");
        assert!(json.get("pid").is_none());
    }
}
