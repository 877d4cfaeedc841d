//! Installation validation
//!
//! Core components must become ready or the phase fails. The monitoring
//! stack is checked too, but a degraded monitoring stack only produces
//! warnings.

use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, ListParams};
use kube::Client;
use tracing::{info, instrument, warn};

#[cfg(test)]
use mockall::automock;

use super::initialization::plan_initialization;
use crate::components::Component;
use crate::config::Settings;
use crate::crd::InstallationSpec;
use crate::kube_utils::poll_until;
use crate::{Error, OBSERVABILITY_NAMESPACE};

/// Deployments making up the monitoring stack
pub const MONITORING_DEPLOYMENTS: [&str; 2] = ["edge-prometheus", "edge-grafana"];

/// Waits for workloads to become ready
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ReadinessValidator: Send + Sync {
    /// Poll until the deployment and its pods are ready, or `timeout` elapses
    async fn wait_ready(
        &self,
        namespace: &str,
        name: &str,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Result<(), Error>;
}

/// [`ReadinessValidator`] polling Deployments and Pods through the API
pub struct DeploymentReadiness {
    client: Client,
}

impl DeploymentReadiness {
    /// Create a validator for the cluster behind `client`
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ReadinessValidator for DeploymentReadiness {
    #[instrument(skip(self, poll_interval, timeout))]
    async fn wait_ready(
        &self,
        namespace: &str,
        name: &str,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Result<(), Error> {
        let deployments: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);

        poll_until(
            timeout,
            poll_interval,
            format!("deployment {}/{} is not ready", namespace, name),
            || {
                let deployments = deployments.clone();
                async move {
                    // Not found yet means keep waiting
                    let Some(deployment) = deployments.get_opt(name).await? else {
                        return Ok(false);
                    };
                    let (ready, replicas) = replica_counts(&deployment);
                    if !deployment_ready(&deployment) {
                        info!(ready, replicas, "waiting for deployment");
                    }
                    Ok(deployment_ready(&deployment))
                }
            },
        )
        .await
        .map_err(|e| Error::readiness(namespace, name, e.to_string()))?;

        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let list = pods
            .list(&ListParams::default().labels(&format!("app={}", name)))
            .await?;
        let running =
            check_pods_running(&list.items).map_err(|msg| Error::readiness(namespace, name, msg))?;

        info!(pods = running, "deployment is ready");
        Ok(())
    }
}

fn replica_counts(deployment: &Deployment) -> (i32, i32) {
    deployment
        .status
        .as_ref()
        .map(|s| (s.ready_replicas.unwrap_or(0), s.replicas.unwrap_or(0)))
        .unwrap_or((0, 0))
}

/// A deployment is ready once it has replicas and all of them are ready
pub fn deployment_ready(deployment: &Deployment) -> bool {
    let (ready, replicas) = replica_counts(deployment);
    replicas > 0 && ready == replicas
}

/// Require at least one pod and every pod Running; returns the pod count
pub fn check_pods_running(pods: &[Pod]) -> Result<usize, String> {
    if pods.is_empty() {
        return Err("no pods found".to_string());
    }
    for pod in pods {
        let phase = pod
            .status
            .as_ref()
            .and_then(|s| s.phase.as_deref())
            .unwrap_or("Unknown");
        if phase != "Running" {
            let name = pod.metadata.name.as_deref().unwrap_or("<unnamed>");
            return Err(format!("pod {} is not running: {}", name, phase));
        }
    }
    Ok(pods.len())
}

/// Validate every enabled component, then the monitoring stack and
/// initialization settings.
pub async fn validate_installation(
    readiness: &dyn ReadinessValidator,
    spec: &InstallationSpec,
    settings: &Settings,
) -> Result<(), Error> {
    info!("validating installation");

    for component in [Component::Controller, Component::ApiServer, Component::Console] {
        if !component.is_enabled(&spec.components) {
            continue;
        }
        readiness
            .wait_ready(
                component.namespace(),
                component.release_name(),
                settings.poll_interval,
                settings.readiness_timeout,
            )
            .await?;
        info!(component = %component, "validation passed");
    }

    if spec.components.monitoring.enabled {
        validate_monitoring(readiness, settings).await;
    }

    plan_initialization(&spec.initialization);

    info!("all validation checks passed");
    Ok(())
}

/// Check the monitoring deployments; failures are logged, never returned
pub async fn validate_monitoring(readiness: &dyn ReadinessValidator, settings: &Settings) {
    for deployment in MONITORING_DEPLOYMENTS {
        if let Err(e) = readiness
            .wait_ready(
                OBSERVABILITY_NAMESPACE,
                deployment,
                settings.poll_interval,
                settings.readiness_timeout,
            )
            .await
        {
            warn!(deployment, error = %e, "monitoring validation failed");
        }
    }
}
