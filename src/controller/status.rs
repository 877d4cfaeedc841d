//! Status writes with last-fetch-before-write freshness

use tracing::debug;

use super::client::InstallationApi;
use crate::crd::{Installation, InstallationStatus};
use crate::Error;

/// Re-fetch the Installation, apply `mutate` to its status and persist it.
///
/// Returns `Ok(None)` if the resource no longer exists. The write carries
/// the freshly read resourceVersion, so a concurrent writer surfaces as a
/// conflict error rather than a lost update.
pub async fn update_status<F>(
    api: &dyn InstallationApi,
    namespace: &str,
    name: &str,
    mutate: F,
) -> Result<Option<Installation>, Error>
where
    F: FnOnce(&mut InstallationStatus) + Send,
{
    let Some(mut latest) = api.get(namespace, name).await? else {
        debug!(namespace, name, "installation gone, skipping status write");
        return Ok(None);
    };

    mutate(latest.status.get_or_insert_with(Default::default));
    api.replace_status(&latest).await.map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::client::MockInstallationApi;
    use crate::crd::{InstallationPhase, InstallationSpec};
    use kube::api::ObjectMeta;

    fn installation(resource_version: &str) -> Installation {
        let mut installation = Installation::new(
            "edge-platform",
            InstallationSpec {
                version: "v1.2.0".to_string(),
                components: Default::default(),
                initialization: Default::default(),
            },
        );
        installation.metadata = ObjectMeta {
            name: Some("edge-platform".to_string()),
            namespace: Some("edge-system".to_string()),
            resource_version: Some(resource_version.to_string()),
            ..Default::default()
        };
        installation
    }

    #[tokio::test]
    async fn story_mutation_is_applied_to_the_latest_version() {
        let mut api = MockInstallationApi::new();
        api.expect_get()
            .withf(|ns, name| ns == "edge-system" && name == "edge-platform")
            .returning(|_, _| Ok(Some(installation("42"))));
        api.expect_replace_status()
            .withf(|obj| {
                obj.metadata.resource_version.as_deref() == Some("42")
                    && obj.phase() == Some(InstallationPhase::Pending)
            })
            .times(1)
            .returning(|obj| Ok(obj.clone()));

        let updated = update_status(&api, "edge-system", "edge-platform", |status| {
            status.phase = Some(InstallationPhase::Pending);
        })
        .await
        .expect("write succeeds");

        assert_eq!(
            updated.and_then(|i| i.phase()),
            Some(InstallationPhase::Pending)
        );
    }

    #[tokio::test]
    async fn story_deleted_resource_is_not_written() {
        let mut api = MockInstallationApi::new();
        api.expect_get().returning(|_, _| Ok(None));
        api.expect_replace_status().never();

        let updated = update_status(&api, "edge-system", "edge-platform", |_| {})
            .await
            .expect("no error");
        assert!(updated.is_none());
    }

    #[tokio::test]
    async fn story_conflict_is_surfaced_as_retryable() {
        let mut api = MockInstallationApi::new();
        api.expect_get()
            .returning(|_, _| Ok(Some(installation("7"))));
        api.expect_replace_status().returning(|_| {
            Err(Error::from(kube::Error::Api(kube::error::ErrorResponse {
                status: "Failure".to_string(),
                message: "the object has been modified".to_string(),
                reason: "Conflict".to_string(),
                code: 409,
            })))
        });

        let err = update_status(&api, "edge-system", "edge-platform", |_| {})
            .await
            .expect_err("conflict");
        assert!(err.is_conflict());
        assert!(err.is_retryable());
    }
}
