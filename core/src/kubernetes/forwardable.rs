//! Derives which ports of a set of cluster resources can be port-forwarded.
//!
//! Service ports are always reported through the Service. A workload's
//! container port is only reported on the workload itself when no Service
//! already routes to it.

use std::collections::BTreeMap;

use tracing::trace;

use super::models::{
    ContainerPort, KubernetesResource, ServicePortSpec, ServiceResource, WorkloadResource,
};
use crate::domain::{selector_matches, ForwardablePort};

/// Computes the forwardable ports of `resources`.
///
/// Only Services, Deployments and DaemonSets are considered. Resources
/// without a selector or without ports contribute nothing. Every port is
/// reported as TCP.
pub fn compute_forwardable_ports(resources: &[KubernetesResource]) -> Vec<ForwardablePort> {
    let services: Vec<&ServiceResource> = resources
        .iter()
        .filter_map(|r| match r {
            KubernetesResource::Service(s) => Some(s),
            _ => None,
        })
        .collect();

    let mut ports = Vec::new();

    for resource in resources {
        let KubernetesResource::Service(service) = resource else {
            continue;
        };
        let (Some(service_ports), Some(target_name)) =
            (routable_service_ports(service), resource.target_name())
        else {
            continue;
        };
        for port in service_ports {
            ports.push(ForwardablePort::tcp(
                port.name.clone(),
                target_name.clone(),
                port.port,
            ));
        }
    }

    for resource in resources {
        let workload = match resource {
            KubernetesResource::Deployment(w) | KubernetesResource::DaemonSet(w) => w,
            _ => continue,
        };
        let Some(target_name) = resource.target_name().filter(|_| has_selector(workload)) else {
            continue;
        };
        let labels = &workload.spec.template.metadata.labels;

        for container in &workload.spec.template.spec.containers {
            for container_port in &container.ports {
                if let Some(service) = find_routing_service(&services, labels, container_port) {
                    trace!(
                        workload = %target_name,
                        port = container_port.container_port,
                        service = %service.metadata.name,
                        "container port already reachable through service"
                    );
                    continue;
                }
                ports.push(ForwardablePort::tcp(
                    container_port.name.clone(),
                    target_name.clone(),
                    container_port.container_port,
                ));
            }
        }
    }

    ports
}

/// Returns the first Service that selects `labels` and routes to `container_port`.
fn find_routing_service<'a>(
    services: &[&'a ServiceResource],
    labels: &BTreeMap<String, String>,
    container_port: &ContainerPort,
) -> Option<&'a ServiceResource> {
    services.iter().copied().find(|service| {
        let Some(selector) = non_empty_selector(service) else {
            return false;
        };
        selector_matches(selector, labels)
            && service
                .spec
                .ports
                .iter()
                .flatten()
                .any(|port| port.targets(container_port))
    })
}

fn routable_service_ports(service: &ServiceResource) -> Option<&[ServicePortSpec]> {
    non_empty_selector(service)?;
    service.spec.ports.as_deref().filter(|p| !p.is_empty())
}

fn non_empty_selector(service: &ServiceResource) -> Option<&BTreeMap<String, String>> {
    service.spec.selector.as_ref().filter(|s| !s.is_empty())
}

fn has_selector(workload: &WorkloadResource) -> bool {
    workload
        .spec
        .selector
        .as_ref()
        .is_some_and(|s| !s.match_labels.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ForwardProtocol;
    use crate::kubernetes::models::{
        Container, LabelSelector, ObjectMeta, PodSpec, PodTemplateMeta, PodTemplateSpec,
        ServiceSpec, TargetPort, WorkloadSpec,
    };

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn service(name: &str, selector: &[(&str, &str)], ports: &[(u16, u16)]) -> KubernetesResource {
        KubernetesResource::Service(ServiceResource {
            metadata: ObjectMeta::named(name),
            spec: ServiceSpec {
                selector: Some(labels(selector)),
                ports: Some(
                    ports
                        .iter()
                        .map(|(port, target)| ServicePortSpec {
                            name: None,
                            port: *port,
                            target_port: Some(TargetPort::Int(*target)),
                            protocol: Some("TCP".to_string()),
                        })
                        .collect(),
                ),
            },
        })
    }

    fn workload(name: &str, pod_labels: &[(&str, &str)], ports: &[u16]) -> WorkloadResource {
        WorkloadResource {
            metadata: ObjectMeta::named(name),
            spec: WorkloadSpec {
                selector: Some(LabelSelector {
                    match_labels: labels(pod_labels),
                }),
                template: PodTemplateSpec {
                    metadata: PodTemplateMeta {
                        labels: labels(pod_labels),
                    },
                    spec: PodSpec {
                        containers: vec![Container {
                            name: name.to_string(),
                            ports: ports
                                .iter()
                                .map(|p| ContainerPort {
                                    name: None,
                                    container_port: *p,
                                    protocol: None,
                                })
                                .collect(),
                        }],
                    },
                },
            },
        }
    }

    #[test]
    fn test_service_suppresses_matching_deployment_port() {
        let resources = vec![
            service("web", &[("app", "web")], &[(8080, 8080)]),
            KubernetesResource::Deployment(workload("web", &[("app", "web")], &[8080])),
        ];

        let ports = compute_forwardable_ports(&resources);
        assert_eq!(
            ports,
            vec![ForwardablePort::tcp(None, "Service/web".to_string(), 8080)]
        );
    }

    #[test]
    fn test_unmatched_deployment_port_is_forwardable() {
        let resources = vec![KubernetesResource::Deployment(workload(
            "worker",
            &[("app", "worker")],
            &[9000],
        ))];

        let ports = compute_forwardable_ports(&resources);
        assert_eq!(ports.len(), 1);
        assert_eq!(ports[0].target_name, "Deployment/worker");
        assert_eq!(ports[0].target_port, 9000);
        assert_eq!(ports[0].protocol, ForwardProtocol::Tcp);
    }

    #[test]
    fn test_only_routed_container_ports_are_suppressed() {
        let resources = vec![
            service("web", &[("app", "web")], &[(80, 8080)]),
            KubernetesResource::DaemonSet(workload("web", &[("app", "web")], &[8080, 9090])),
        ];

        let ports = compute_forwardable_ports(&resources);
        let targets: Vec<(String, u16)> = ports
            .iter()
            .map(|p| (p.target_name.clone(), p.target_port))
            .collect();
        assert_eq!(
            targets,
            vec![
                ("Service/web".to_string(), 80),
                ("DaemonSet/web".to_string(), 9090),
            ]
        );
    }

    #[test]
    fn test_selector_must_be_subset_of_pod_labels() {
        let resources = vec![
            service("api", &[("app", "api"), ("tier", "backend")], &[(80, 3000)]),
            KubernetesResource::Deployment(workload("api", &[("app", "api")], &[3000])),
        ];

        let ports = compute_forwardable_ports(&resources);
        assert_eq!(ports.len(), 2);
        assert_eq!(ports[1].target_name, "Deployment/api");
    }

    #[test]
    fn test_resources_without_selector_contribute_nothing() {
        let mut headless = service("external", &[], &[(5432, 5432)]);
        if let KubernetesResource::Service(s) = &mut headless {
            s.spec.selector = None;
        }
        let mut unselected = workload("batch", &[("app", "batch")], &[7000]);
        unselected.spec.selector = None;

        let resources = vec![headless, KubernetesResource::Deployment(unselected)];
        assert!(compute_forwardable_ports(&resources).is_empty());
    }

    #[test]
    fn test_service_without_ports_contributes_nothing_and_suppresses_nothing() {
        let resources = vec![
            service("web", &[("app", "web")], &[]),
            KubernetesResource::Deployment(workload("web", &[("app", "web")], &[8080])),
        ];

        let ports = compute_forwardable_ports(&resources);
        assert_eq!(
            ports,
            vec![ForwardablePort::tcp(None, "Deployment/web".to_string(), 8080)]
        );
    }

    #[test]
    fn test_named_target_port_suppresses_named_container_port() {
        let mut svc = service("web", &[("app", "web")], &[(80, 0)]);
        if let KubernetesResource::Service(s) = &mut svc {
            let ports = s.spec.ports.as_mut().unwrap();
            ports[0].name = Some("http".to_string());
            ports[0].target_port = Some(TargetPort::String("http".to_string()));
        }
        let mut deploy = workload("web", &[("app", "web")], &[8080]);
        deploy.spec.template.spec.containers[0].ports[0].name = Some("http".to_string());

        let ports = compute_forwardable_ports(&[svc, KubernetesResource::Deployment(deploy)]);
        assert_eq!(
            ports,
            vec![ForwardablePort::tcp(
                Some("http".to_string()),
                "Service/web".to_string(),
                80
            )]
        );
    }

    #[test]
    fn test_other_kinds_are_ignored() {
        let resources = vec![KubernetesResource::Other];
        assert!(compute_forwardable_ports(&resources).is_empty());
    }
}
