//! Shared Kubernetes utilities using kube-rs

use std::future::Future;
use std::path::Path;
use std::time::{Duration, Instant};

use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use tracing::trace;

use crate::Error;

/// Default connection timeout for kube clients
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default read timeout for kube clients
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Create a kube client from an optional kubeconfig path.
///
/// Without a path the configuration is inferred (in-cluster service account
/// first, then `KUBECONFIG` / `~/.kube/config`).
pub async fn create_client(kubeconfig: Option<&Path>) -> Result<Client, Error> {
    let mut config = match kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                Error::internal_with_context(
                    "create_client",
                    format!("failed to read kubeconfig {}: {}", path.display(), e),
                )
            })?;
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(|e| {
                    Error::internal_with_context(
                        "create_client",
                        format!("failed to load kubeconfig: {}", e),
                    )
                })?
        }
        None => Config::infer().await.map_err(|e| {
            Error::internal_with_context("create_client", format!("failed to infer config: {}", e))
        })?,
    };
    config.connect_timeout = Some(DEFAULT_CONNECT_TIMEOUT);
    config.read_timeout = Some(DEFAULT_READ_TIMEOUT);

    Client::try_from(config).map_err(|e| {
        Error::internal_with_context("create_client", format!("failed to create client: {}", e))
    })
}

/// Poll `check_fn` every `poll_interval` until it reports true.
///
/// Errors from the check count as "not yet". The first check runs
/// immediately. Returns the last check error (or `timeout_msg`) once
/// `timeout` has elapsed. Dropping the future stops polling.
pub async fn poll_until<F, Fut>(
    timeout: Duration,
    poll_interval: Duration,
    timeout_msg: impl Into<String>,
    mut check_fn: F,
) -> Result<(), Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, Error>>,
{
    let start = Instant::now();
    let timeout_msg = timeout_msg.into();
    let mut last_error: Option<Error> = None;

    loop {
        match check_fn().await {
            Ok(true) => return Ok(()),
            Ok(false) => {
                trace!("Polling condition not yet met, retrying...");
            }
            Err(e) => {
                trace!("Polling check returned error (retrying): {}", e);
                last_error = Some(e);
            }
        }

        if start.elapsed() + poll_interval > timeout {
            return Err(match last_error {
                Some(e) => Error::internal_with_context(
                    "poll_until",
                    format!("{}: last error: {}", timeout_msg, e),
                ),
                None => Error::internal_with_context("poll_until", timeout_msg),
            });
        }

        tokio::time::sleep(poll_interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn poll_returns_as_soon_as_condition_holds() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();

        let result = poll_until(
            Duration::from_secs(1),
            Duration::from_millis(1),
            "never ready",
            || {
                let c = c.clone();
                async move { Ok(c.fetch_add(1, Ordering::SeqCst) >= 2) }
            },
        )
        .await;

        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn poll_times_out_with_message() {
        let result = poll_until(
            Duration::from_millis(20),
            Duration::from_millis(5),
            "deployment never ready",
            || async { Ok(false) },
        )
        .await;

        let err = result.expect_err("should time out");
        assert!(err.to_string().contains("deployment never ready"));
    }

    #[tokio::test]
    async fn poll_treats_errors_as_not_ready_and_reports_the_last_one() {
        let result = poll_until(
            Duration::from_millis(20),
            Duration::from_millis(5),
            "timed out",
            || async { Err(Error::internal("api unavailable")) },
        )
        .await;

        let msg = result.expect_err("should time out").to_string();
        assert!(msg.contains("timed out"));
        assert!(msg.contains("api unavailable"));
    }
}
