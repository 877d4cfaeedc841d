//! Cluster prerequisite checks
//!
//! Only an unreachable API server, an empty node list, or a missing system
//! namespace fail the check. Capacity below the recommendation and missing
//! storage classes are logged as warnings.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Namespace, Node};
use k8s_openapi::api::storage::v1::StorageClass;
use kube::api::{Api, ListParams};
use kube::Client;
use tracing::{info, warn};

#[cfg(test)]
use mockall::automock;

use crate::Error;

/// Namespaces every conformant cluster has
pub const REQUIRED_NAMESPACES: [&str; 3] = ["kube-system", "kube-public", "kube-node-lease"];

/// Recommended total allocatable CPU, in millicores
pub const RECOMMENDED_CPU_MILLIS: u64 = 4_000;

/// Recommended total allocatable memory, in bytes (8Gi)
pub const RECOMMENDED_MEMORY_BYTES: u64 = 8 * 1024 * 1024 * 1024;

/// Pass/fail check that the cluster can host the platform
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PrerequisiteChecker: Send + Sync {
    /// Check the cluster; an error means installation must not proceed
    async fn check(&self) -> Result<(), Error>;
}

/// [`PrerequisiteChecker`] backed by the Kubernetes API
pub struct ClusterPrerequisites {
    client: Client,
}

impl ClusterPrerequisites {
    /// Create a checker for the cluster behind `client`
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn check_version(&self) -> Result<(), Error> {
        let version = self.client.apiserver_version().await?;
        // No minimum version is enforced yet
        info!(version = %version.git_version, "kubernetes version");
        Ok(())
    }

    async fn check_nodes(&self) -> Result<(), Error> {
        let nodes: Api<Node> = Api::all(self.client.clone());
        let list = nodes.list(&ListParams::default()).await?;

        let capacity = Capacity::of(&list.items);
        if capacity.nodes == 0 {
            return Err(Error::validation("no nodes found in cluster"));
        }

        info!(
            nodes = capacity.nodes,
            cpu_millis = capacity.cpu_millis,
            memory_bytes = capacity.memory_bytes,
            "cluster allocatable capacity"
        );
        for warning in capacity.shortfalls() {
            warn!("{}", warning);
        }
        Ok(())
    }

    async fn check_namespaces(&self) -> Result<(), Error> {
        let namespaces: Api<Namespace> = Api::all(self.client.clone());
        for name in REQUIRED_NAMESPACES {
            if namespaces.get_opt(name).await?.is_none() {
                return Err(Error::validation(format!(
                    "required namespace {} not found",
                    name
                )));
            }
            info!(namespace = name, "found required namespace");
        }
        Ok(())
    }

    async fn check_storage(&self) {
        let classes: Api<StorageClass> = Api::all(self.client.clone());
        match classes.list(&ListParams::default()).await {
            Ok(list) if list.items.is_empty() => {
                warn!("no storage classes found; persistent volumes may not work")
            }
            Ok(list) => info!(count = list.items.len(), "found storage classes"),
            Err(e) => warn!(error = %e, "failed to list storage classes"),
        }
    }
}

#[async_trait]
impl PrerequisiteChecker for ClusterPrerequisites {
    async fn check(&self) -> Result<(), Error> {
        info!("validating installation prerequisites");

        self.check_version().await?;
        self.check_nodes().await?;
        self.check_namespaces().await?;
        self.check_storage().await;

        info!("all prerequisites validated");
        Ok(())
    }
}

/// Total allocatable resources across nodes
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Capacity {
    /// Number of nodes
    pub nodes: usize,
    /// Allocatable CPU in millicores
    pub cpu_millis: u64,
    /// Allocatable memory in bytes
    pub memory_bytes: u64,
}

impl Capacity {
    /// Sum allocatable CPU and memory over `nodes`
    pub fn of(nodes: &[Node]) -> Self {
        nodes.iter().fold(
            Self {
                nodes: nodes.len(),
                ..Default::default()
            },
            |mut total, node| {
                let allocatable = node.status.as_ref().and_then(|s| s.allocatable.as_ref());
                if let Some(allocatable) = allocatable {
                    if let Some(cpu) = allocatable.get("cpu") {
                        total.cpu_millis += parse_cpu_millis(&cpu.0);
                    }
                    if let Some(memory) = allocatable.get("memory") {
                        total.memory_bytes += parse_bytes(&memory.0);
                    }
                }
                total
            },
        )
    }

    /// Warnings for capacity below the recommendation
    pub fn shortfalls(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.cpu_millis < RECOMMENDED_CPU_MILLIS {
            warnings.push(format!(
                "cluster has less than recommended CPU (recommended: {}m, available: {}m)",
                RECOMMENDED_CPU_MILLIS, self.cpu_millis
            ));
        }
        if self.memory_bytes < RECOMMENDED_MEMORY_BYTES {
            warnings.push(format!(
                "cluster has less than recommended memory (recommended: {} bytes, available: {} bytes)",
                RECOMMENDED_MEMORY_BYTES, self.memory_bytes
            ));
        }
        warnings
    }
}

/// Parse a CPU quantity ("2", "1.5", "500m", "250000000n") into millicores
pub fn parse_cpu_millis(quantity: &str) -> u64 {
    let q = quantity.trim();
    if let Some(milli) = q.strip_suffix('m') {
        milli.parse().unwrap_or(0)
    } else if let Some(nano) = q.strip_suffix('n') {
        nano.parse::<u64>().unwrap_or(0) / 1_000_000
    } else {
        (q.parse::<f64>().unwrap_or(0.0) * 1000.0) as u64
    }
}

/// Parse a memory quantity ("8Gi", "512Mi", "1G", "1048576") into bytes
pub fn parse_bytes(quantity: &str) -> u64 {
    const SUFFIXES: [(&str, u64); 8] = [
        ("Ki", 1 << 10),
        ("Mi", 1 << 20),
        ("Gi", 1 << 30),
        ("Ti", 1 << 40),
        ("k", 1_000),
        ("M", 1_000_000),
        ("G", 1_000_000_000),
        ("T", 1_000_000_000_000),
    ];

    let q = quantity.trim();
    for (suffix, multiplier) in SUFFIXES {
        if let Some(number) = q.strip_suffix(suffix) {
            return number.parse::<u64>().unwrap_or(0).saturating_mul(multiplier);
        }
    }
    q.parse().unwrap_or(0)
}
