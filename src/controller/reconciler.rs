//! Installation reconciler
//!
//! Entry point for one Installation. Safe to call repeatedly and out of
//! order: every decision is taken from a fresh read of the object, not the
//! cached copy the controller hands in.
//!
//! - no finalizer: add it and come back, before any work happens
//! - no phase: initialize status to Pending and come back
//! - Installed or Failed: nothing to do; Failed needs an external reset
//! - otherwise: run the orchestrator and record Installed or Failed
//! - deletion requested: run cleanup, then release the finalizer

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use kube::runtime::controller::Action;
use kube::ResourceExt;
use tracing::{debug, error, info, instrument, warn};

use super::context::Context;
use super::key::ObjectKey;
use super::lifecycle::{cleanup, Lifecycle};
use super::orchestrator::{Orchestrator, RunOutcome};
use super::status::update_status;
use crate::crd::{Condition, ConditionStatus, ConditionType, Installation, InstallationPhase};
use crate::{Error, FINALIZER};

/// First delay after a failed reconcile
pub const ERROR_BACKOFF_BASE: Duration = Duration::from_secs(5);

/// Upper bound for the failed-reconcile delay
pub const ERROR_BACKOFF_MAX: Duration = Duration::from_secs(300);

/// Consecutive reconcile failures per Installation, driving the backoff in
/// [`error_policy`]. A successful reconcile resets the count.
#[derive(Debug, Default)]
pub struct ReconcileFailures {
    counts: DashMap<ObjectKey, u32>,
}

impl ReconcileFailures {
    /// Count one more failure for `key` and return the new total
    pub fn record(&self, key: &ObjectKey) -> u32 {
        let mut count = self.counts.entry(key.clone()).or_insert(0);
        *count = count.saturating_add(1);
        *count
    }

    /// Forget the failures of `key`
    pub fn clear(&self, key: &ObjectKey) {
        self.counts.remove(key);
    }

    /// Current consecutive failures of `key`
    pub fn count(&self, key: &ObjectKey) -> u32 {
        self.counts.get(key).map(|count| *count).unwrap_or(0)
    }
}

fn requeue_now() -> Action {
    Action::requeue(Duration::ZERO)
}

fn key_of(installation: &Installation) -> ObjectKey {
    ObjectKey::new(
        installation.namespace().unwrap_or_default(),
        installation.name_any(),
    )
}

/// Reconcile an Installation
#[instrument(skip(installation, ctx), fields(installation = %installation.name_any()))]
pub async fn reconcile(
    installation: Arc<Installation>,
    ctx: Arc<Context>,
) -> Result<Action, Error> {
    let key = ObjectKey::for_installation(&installation)?;
    let action = reconcile_key(&key, &ctx).await?;
    ctx.failures.clear(&key);
    Ok(action)
}

async fn reconcile_key(key: &ObjectKey, ctx: &Context) -> Result<Action, Error> {
    let api = ctx.installations.as_ref();

    let Some(installation) = api.get(&key.namespace, &key.name).await? else {
        debug!("installation not found");
        return Ok(Action::await_change());
    };

    match Lifecycle::of(&installation) {
        Lifecycle::Removed => Ok(Action::await_change()),
        Lifecycle::PendingDeletion => {
            info!("installation is being deleted");
            cleanup(&installation);
            api.remove_finalizer(&installation, FINALIZER).await?;
            info!("finalizer removed");
            Ok(Action::await_change())
        }
        Lifecycle::Unguarded => {
            info!("adding finalizer");
            api.add_finalizer(&installation, FINALIZER).await?;
            Ok(requeue_now())
        }
        Lifecycle::Active => match installation.phase() {
            None => {
                info!("initializing installation status");
                let written = update_status(api, &key.namespace, &key.name, |status| {
                    status.enter(InstallationPhase::Pending, "Waiting to start installation");
                    status.start_time = Some(Utc::now());
                })
                .await?;
                Ok(match written {
                    Some(_) => requeue_now(),
                    None => Action::await_change(),
                })
            }
            Some(phase) if phase.is_terminal() => {
                debug!(%phase, "installation is in a terminal phase");
                Ok(Action::await_change())
            }
            Some(phase) => {
                info!(%phase, "running installation");
                run_installation(key, ctx).await?;
                Ok(Action::await_change())
            }
        },
    }
}

/// Run the orchestrator once and record the terminal outcome.
///
/// Success moves the Installation to Installed with a Ready condition. A
/// failed phase moves it to Failed with the error on `status.message`. Any
/// other error (a lost status write, an unreachable API server) leaves the
/// status as it is so the next reconcile resumes the run. Errors are
/// returned either way.
pub async fn run_installation(key: &ObjectKey, ctx: &Context) -> Result<RunOutcome, Error> {
    let api = ctx.installations.as_ref();

    match Orchestrator::new(ctx).run(key).await {
        Ok(RunOutcome::Completed) => {
            update_status(api, &key.namespace, &key.name, |status| {
                status.enter(
                    InstallationPhase::Installed,
                    "Installation completed successfully",
                );
                status.completion_time = Some(Utc::now());
                status.set_condition(Condition::new(
                    ConditionType::Ready,
                    ConditionStatus::True,
                    "InstallationComplete",
                    "All components installed and initialized",
                ));
            })
            .await?;
            info!("installation completed");
            Ok(RunOutcome::Completed)
        }
        Ok(RunOutcome::Deleted) => Ok(RunOutcome::Deleted),
        Err(e @ Error::Phase { .. }) => {
            error!(error = %e, "installation failed");
            let message = format!("Installation failed: {}", e);
            let recorded = update_status(api, &key.namespace, &key.name, |status| {
                status.phase = Some(InstallationPhase::Failed);
                status.message = Some(message);
            })
            .await;
            if let Err(write) = recorded {
                warn!(error = %write, "failed to record installation failure");
            }
            Err(e)
        }
        Err(e) => {
            warn!(error = %e, "installation run interrupted");
            Err(e)
        }
    }
}

/// Delay before the next attempt after `failures` consecutive failures: 5s
/// doubled per failure, capped at 5 minutes
pub fn backoff_delay(failures: u32) -> Duration {
    let exponent = failures.saturating_sub(1).min(16);
    ERROR_BACKOFF_BASE
        .saturating_mul(1 << exponent)
        .min(ERROR_BACKOFF_MAX)
}

/// Requeue a failed Installation with per-object exponential backoff
pub fn error_policy(installation: Arc<Installation>, error: &Error, ctx: Arc<Context>) -> Action {
    let key = key_of(&installation);
    let failures = ctx.failures.record(&key);
    let delay = backoff_delay(failures);

    if error.is_conflict() {
        warn!(
            installation = %key,
            failures,
            retry_in_secs = delay.as_secs(),
            "write conflict, retrying with a fresh read"
        );
    } else {
        error!(
            ?error,
            installation = %key,
            failures,
            retry_in_secs = delay.as_secs(),
            "reconciliation failed"
        );
    }
    Action::requeue(delay)
}
