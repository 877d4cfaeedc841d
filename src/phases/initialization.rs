//! Cluster initialization check
//!
//! The controller performs initialization itself when started with
//! `enableInit`. This phase only inspects the settings it will receive and
//! reports the defaults that will apply; it never touches the cluster.

use tracing::{info, warn};

use crate::crd::InitializationSpec;

/// Cluster name the controller uses when none is configured
pub const DEFAULT_CLUSTER_NAME: &str = "host";

/// System workspace the controller uses when none is configured
pub const DEFAULT_SYSTEM_WORKSPACE: &str = "system-workspace";

/// What the controller will initialize
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InitializationPlan {
    /// Host cluster name
    pub cluster_name: String,
    /// System workspace name
    pub system_workspace: String,
    /// Namespaces assigned to the system workspace; empty means controller defaults
    pub system_namespaces: Vec<String>,
}

/// Resolve the initialization settings, logging each default that applies.
///
/// Returns `None` when initialization is disabled.
pub fn plan_initialization(spec: &InitializationSpec) -> Option<InitializationPlan> {
    if !spec.enabled {
        info!("cluster initialization disabled, skipping");
        return None;
    }

    let cluster_name = match spec.cluster_name.as_deref().filter(|n| !n.is_empty()) {
        Some(name) => name.to_string(),
        None => {
            warn!("no cluster name specified, using default '{}'", DEFAULT_CLUSTER_NAME);
            DEFAULT_CLUSTER_NAME.to_string()
        }
    };

    let system_workspace = match spec.system_workspace.as_deref().filter(|w| !w.is_empty()) {
        Some(workspace) => workspace.to_string(),
        None => {
            warn!(
                "no system workspace specified, using default '{}'",
                DEFAULT_SYSTEM_WORKSPACE
            );
            DEFAULT_SYSTEM_WORKSPACE.to_string()
        }
    };

    if spec.system_namespaces.is_empty() {
        info!("no system namespaces specified, controller will use defaults");
    } else {
        info!(
            count = spec.system_namespaces.len(),
            "system namespaces will be assigned to the system workspace"
        );
    }

    info!(
        cluster = %cluster_name,
        workspace = %system_workspace,
        "cluster initialization configuration validated"
    );
    Some(InitializationPlan {
        cluster_name,
        system_workspace,
        system_namespaces: spec.system_namespaces.clone(),
    })
}
