//! Operator loop
//!
//! A kube-runtime [`Controller`] watches Installations in every namespace.
//! Its scheduler deduplicates events per object and never runs two
//! reconciles of the same Installation at once.

use std::sync::Arc;

use futures::StreamExt;
use kube::api::Api;
use kube::runtime::controller::{self, Action, Controller};
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher::{self, Config as WatcherConfig};
use kube::Client;
use tracing::{debug, error, info};

use super::context::Context;
use super::key::ObjectKey;
use super::reconciler::{error_policy, reconcile};
use crate::crd::Installation;
use crate::Error;

type ReconcileResult =
    Result<(ObjectRef<Installation>, Action), controller::Error<Error, watcher::Error>>;

/// Watch Installations in every namespace and reconcile them until a
/// termination signal arrives.
///
/// Reconciles already running when the signal arrives are allowed to finish.
pub async fn run_operator(client: Client, ctx: Arc<Context>) {
    let installations: Api<Installation> = Api::all(client);

    info!("Starting Installation controller");
    Controller::new(installations, WatcherConfig::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx.clone())
        .for_each(|result| {
            let ctx = ctx.clone();
            async move { observe(&ctx, result) }
        })
        .await;
    info!("Installation controller stopped");
}

/// Log one controller result and drop backoff state of vanished objects
fn observe(ctx: &Context, result: ReconcileResult) {
    match result {
        Ok((object, action)) => {
            debug!(installation = %object, ?action, "Installation reconciliation completed");
        }
        // A requeued Installation was deleted before its retry came due
        Err(controller::Error::ObjectNotFound(object)) => {
            if let Some(namespace) = object.namespace.as_deref() {
                ctx.failures.clear(&ObjectKey::new(namespace, &object.name));
            }
            debug!(installation = %object, "Installation no longer exists");
        }
        Err(e) => {
            error!(error = ?e, "Installation reconciliation error");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::testing::{context, FakeInstallations, FakePackages, NAME, NAMESPACE};
    use std::time::Duration;

    fn object_ref() -> ObjectRef<Installation> {
        ObjectRef::new(NAME).within(NAMESPACE)
    }

    /// Backoff state of an Installation deleted while failing is dropped
    /// once its retry finds nothing to reconcile
    #[test]
    fn story_vanished_installation_forgets_its_failures() {
        let ctx = context(FakeInstallations::empty(), FakePackages::new());
        let key = ObjectKey::new(NAMESPACE, NAME);
        ctx.failures.record(&key);
        ctx.failures.record(&key);

        observe(
            &ctx,
            Err(controller::Error::ObjectNotFound(object_ref().erase())),
        );
        assert_eq!(ctx.failures.count(&key), 0);
    }

    #[test]
    fn story_reconcile_outcomes_leave_failures_to_the_reconciler() {
        let ctx = context(FakeInstallations::empty(), FakePackages::new());
        let key = ObjectKey::new(NAMESPACE, NAME);
        ctx.failures.record(&key);

        observe(&ctx, Ok((object_ref(), Action::requeue(Duration::from_secs(5)))));
        observe(
            &ctx,
            Err(controller::Error::ReconcilerFailed(
                Error::internal("boom"),
                object_ref().erase(),
            )),
        );
        assert_eq!(ctx.failures.count(&key), 1);
    }
}
