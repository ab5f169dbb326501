//! Kubernetes discovery using kubectl commands.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use super::errors::{KubectlError, Result};
use super::models::{KubernetesResource, ResourceListResponse};
use crate::config::{is_valid_namespace, ForwardConfig};

/// Default paths to search for kubectl.
const KUBECTL_PATHS: &[&str] = &[
    "/opt/homebrew/bin/kubectl", // Apple Silicon
    "/usr/local/bin/kubectl",    // Intel Mac / Homebrew
    "/usr/bin/kubectl",          // System
];

/// Timeout for kubectl discovery commands.
const KUBECTL_TIMEOUT: Duration = Duration::from_secs(15);

/// Resource kinds inspected for forwardable ports.
const FORWARDABLE_KINDS: &str = "services,deployments,daemonsets";

/// Kubernetes discovery service.
pub struct KubernetesDiscovery {
    kubectl_path: Option<PathBuf>,
    context: Option<String>,
}

impl KubernetesDiscovery {
    /// Creates a new KubernetesDiscovery with a custom kubectl path.
    pub fn with_kubectl_path(kubectl_path: Option<PathBuf>) -> Self {
        Self {
            kubectl_path,
            context: None,
        }
    }

    /// Uses the configured kubectl and context, searching when no path is set.
    pub fn from_config(config: &ForwardConfig) -> Self {
        Self {
            kubectl_path: config.kubectl_path.clone().or_else(find_kubectl),
            context: config.context.clone(),
        }
    }

    /// Returns the kubectl path if found.
    pub fn kubectl_path(&self) -> Option<&PathBuf> {
        self.kubectl_path.as_ref()
    }

    /// Fetches the services, deployments and daemonsets of a namespace.
    pub async fn fetch_resources(&self, namespace: &str) -> Result<Vec<KubernetesResource>> {
        if !is_valid_namespace(namespace) {
            return Err(KubectlError::ConfigError(format!(
                "Invalid namespace '{}'",
                namespace
            )));
        }

        let output = self
            .execute_kubectl(&[
                "get",
                FORWARDABLE_KINDS,
                "-n",
                namespace,
                "-o",
                "json",
                "--request-timeout=10s",
            ])
            .await?;

        let response: ResourceListResponse = serde_json::from_str(&output)
            .map_err(|e| KubectlError::ParsingFailed(e.to_string()))?;

        debug!(namespace, count = response.items.len(), "fetched resources");
        Ok(response.items)
    }

    /// Executes a kubectl command and returns the output.
    async fn execute_kubectl(&self, args: &[&str]) -> Result<String> {
        let kubectl_path = self
            .kubectl_path
            .as_ref()
            .ok_or(KubectlError::KubectlNotFound)?;

        let mut command = Command::new(kubectl_path);
        if let Some(context) = &self.context {
            command.arg("--context").arg(context);
        }
        command.args(args).kill_on_drop(true);

        let result = timeout(KUBECTL_TIMEOUT, command.output()).await;

        match result {
            Ok(Ok(output)) => {
                if output.status.success() {
                    String::from_utf8(output.stdout)
                        .map_err(|e| KubectlError::ParsingFailed(e.to_string()))
                } else {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    Err(KubectlError::from_kubectl_error(&stderr))
                }
            }
            Ok(Err(e)) => Err(KubectlError::Io(e)),
            Err(_) => Err(KubectlError::Timeout),
        }
    }
}

/// Looks for kubectl in the well-known locations, then on `PATH`.
pub fn find_kubectl() -> Option<PathBuf> {
    find_executable(KUBECTL_PATHS).or_else(|| find_in_path("kubectl"))
}

/// Finds an executable in the given paths.
fn find_executable(paths: &[&str]) -> Option<PathBuf> {
    paths.iter().map(PathBuf::from).find(|path| path.exists())
}

fn find_in_path(name: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(name))
        .find(|candidate| is_file(candidate))
}

fn is_file(path: &Path) -> bool {
    path.metadata().map(|m| m.is_file()).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_executable() {
        // Test with a path that should exist on most systems
        let result = find_executable(&["/bin/sh", "/usr/bin/sh"]);
        assert!(result.is_some());

        // Test with a path that shouldn't exist
        let result = find_executable(&["/nonexistent/path"]);
        assert!(result.is_none());
    }

    #[test]
    fn test_config_path_takes_precedence() {
        let config = ForwardConfig {
            kubectl_path: Some(PathBuf::from("/opt/k8s/kubectl")),
            ..Default::default()
        };
        let discovery = KubernetesDiscovery::from_config(&config);
        assert_eq!(
            discovery.kubectl_path(),
            Some(&PathBuf::from("/opt/k8s/kubectl"))
        );
    }

    #[tokio::test]
    async fn test_missing_kubectl() {
        let discovery = KubernetesDiscovery::with_kubectl_path(None);
        let result = discovery.fetch_resources("default").await;
        assert!(matches!(result, Err(KubectlError::KubectlNotFound)));
    }

    #[tokio::test]
    async fn test_invalid_namespace_is_rejected_before_running_kubectl() {
        let discovery = KubernetesDiscovery::with_kubectl_path(None);
        let result = discovery.fetch_resources("Bad Namespace").await;
        assert!(matches!(result, Err(KubectlError::ConfigError(_))));
    }

    #[cfg(unix)]
    fn fake_kubectl(dir: &Path, script: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("kubectl");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", script)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_fetch_resources_parses_list() {
        let dir = tempfile::tempdir().unwrap();
        let kubectl = fake_kubectl(
            dir.path(),
            r#"echo '{"kind":"List","items":[{"kind":"Service","metadata":{"name":"web"},"spec":{"selector":{"app":"web"},"ports":[{"port":80}]}}]}'"#,
        );

        let discovery = KubernetesDiscovery::with_kubectl_path(Some(kubectl));
        let resources = discovery.fetch_resources("default").await.unwrap();
        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].target_name().as_deref(), Some("Service/web"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_kubectl_failure_is_classified() {
        let dir = tempfile::tempdir().unwrap();
        let kubectl = fake_kubectl(
            dir.path(),
            "echo 'The connection to the server localhost:8080 was refused - connection refused' >&2\nexit 1",
        );

        let discovery = KubernetesDiscovery::with_kubectl_path(Some(kubectl));
        let err = discovery.fetch_resources("default").await.unwrap_err();
        assert!(err.is_cluster_not_connected());
    }
}
