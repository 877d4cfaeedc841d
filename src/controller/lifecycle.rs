//! Finalizer lifecycle guard
//!
//! The finalizer keeps an Installation alive until deletion cleanup has run.
//! Rather than checking for the finalizer string at every decision point,
//! the reconciler classifies the object once and dispatches on the result.

use kube::ResourceExt;
use tracing::{info, warn};

use crate::crd::Installation;
use crate::FINALIZER;

/// Where an Installation is in its finalizer lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lifecycle {
    /// Not being deleted and not yet guarded by the finalizer
    Unguarded,
    /// Guarded and live; installation work may proceed
    Active,
    /// Deletion requested; cleanup must run before the finalizer goes
    PendingDeletion,
    /// Deletion requested and cleanup done; nothing left to do
    Removed,
}

impl Lifecycle {
    /// Classify an Installation
    pub fn of(installation: &Installation) -> Self {
        let guarded = installation.finalizers().iter().any(|f| f == FINALIZER);
        let deleting = installation.metadata.deletion_timestamp.is_some();

        match (deleting, guarded) {
            (false, false) => Self::Unguarded,
            (false, true) => Self::Active,
            (true, true) => Self::PendingDeletion,
            (true, false) => Self::Removed,
        }
    }
}

/// Deletion cleanup.
///
/// Installed releases are left in place; the components recorded on the
/// status are reported so an operator can remove them by hand.
pub fn cleanup(installation: &Installation) {
    let name = installation.name_any();
    let remaining: Vec<String> = installation
        .status
        .iter()
        .flat_map(|s| s.components.iter())
        .filter(|(_, status)| status.installed)
        .map(|(component, status)| match &status.release_name {
            Some(release) => format!("{}={}", component, release),
            None => component.to_string(),
        })
        .collect();

    if remaining.is_empty() {
        info!(installation = %name, "no installed components recorded");
    } else {
        info!(
            installation = %name,
            releases = %remaining.join(","),
            "installed components recorded on status"
        );
    }
    warn!(
        installation = %name,
        "component teardown is not implemented; helm releases are left installed"
    );
}
