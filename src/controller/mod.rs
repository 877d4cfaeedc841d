//! Installation controller
//!
//! The reconciler owns the finalizer lifecycle and the terminal phases, and
//! the orchestrator runs the installation phases in order. The runner hosts
//! the reconciler in a kube-runtime controller. Every read and write of the
//! Installation goes through [`InstallationApi`].

mod client;
mod context;
mod key;
mod lifecycle;
mod orchestrator;
mod reconciler;
mod runner;
mod status;

#[cfg(test)]
mod testing;

pub use client::{InstallationApi, KubeInstallations};
pub use context::{Context, ContextBuilder};
pub use key::ObjectKey;
pub use lifecycle::{cleanup, Lifecycle};
pub use orchestrator::{Orchestrator, Phase, RunOutcome, REASON_FAILED, REASON_SUCCEEDED};
pub use reconciler::{
    backoff_delay, error_policy, reconcile, run_installation, ReconcileFailures,
    ERROR_BACKOFF_BASE, ERROR_BACKOFF_MAX,
};
pub use runner::run_operator;
pub use status::update_status;
