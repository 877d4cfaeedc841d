//! Edge installer - declarative installer for the Edge platform
//!
//! A single namespaced `Installation` resource describes which Edge
//! components a cluster should run and how they are configured. The
//! installer turns that declaration into installed helm releases, recording
//! progress on the resource's status as it goes.
//!
//! # Architecture
//!
//! An installation run is a fixed sequence of phases:
//! - Prerequisites check (API reachable, nodes, capacity, system namespaces)
//! - CRD installation (bundled CustomResourceDefinitions)
//! - Component installation (controller, apiserver, console, monitoring)
//! - Cluster initialization check
//! - Installation validation (deployments and pods ready)
//!
//! The operator drives runs from a watch on Installation resources. The same
//! run can be executed once from the command line in `install` mode.
//!
//! # Modules
//!
//! - [`crd`] - The Installation custom resource and its status vocabulary
//! - [`components`] - Component catalog and helm values assembly
//! - [`helm`] - Package manager adapter (helm CLI)
//! - [`phases`] - Cluster-facing phase executors
//! - [`controller`] - Orchestrator, reconciler and the operator loop
//! - [`config`] - Process settings shared by every reconcile
//! - [`error`] - Error types for the installer

#![deny(missing_docs)]

pub mod components;
pub mod config;
pub mod controller;
pub mod crd;
pub mod error;
pub mod helm;
pub mod kube_utils;
pub mod phases;
pub mod retry;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Default Configuration Constants
// =============================================================================

/// Finalizer guarding Installation resources until cleanup has run
pub const FINALIZER: &str = "installer.theriseunion.io/finalizer";

/// Field manager used for server-side apply and patches
pub const FIELD_MANAGER: &str = "edge-installer";

/// Namespace for the core Edge components
pub const EDGE_SYSTEM_NAMESPACE: &str = "edge-system";

/// Namespace for the monitoring stack
pub const OBSERVABILITY_NAMESPACE: &str = "observability-system";

/// Name of the Installation resource loaded in one-shot modes
pub const DEFAULT_INSTALLATION_NAME: &str = "edge-platform";

/// Default directory holding the bundled charts
pub const DEFAULT_CHARTS_DIR: &str = "/charts";
