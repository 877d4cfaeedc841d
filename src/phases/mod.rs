//! Phase executors
//!
//! Each orchestration phase delegates its cluster-facing work to one of the
//! collaborators here. The traits are the seams the orchestrator is tested
//! through; the structs are the implementations used against a live cluster.

pub mod crds;
pub mod initialization;
pub mod prerequisites;
pub mod validation;

pub use crds::{BundledCrds, ManifestLoader};
pub use initialization::{plan_initialization, InitializationPlan};
pub use prerequisites::{ClusterPrerequisites, PrerequisiteChecker};
pub use validation::{validate_installation, DeploymentReadiness, ReadinessValidator};
