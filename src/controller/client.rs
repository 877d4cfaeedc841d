//! Persistence of Installation resources
//!
//! All reads and writes of the Installation go through [`InstallationApi`] so
//! the reconciler and orchestrator can be exercised against an in-memory
//! store.

use async_trait::async_trait;
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::{Client, ResourceExt};
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::crd::Installation;
use crate::{Error, FIELD_MANAGER};

/// Reads and writes of Installation resources
#[cfg_attr(test, automock)]
#[async_trait]
pub trait InstallationApi: Send + Sync {
    /// Fetch the latest persisted Installation, `None` if it does not exist
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Installation>, Error>;

    /// Replace the status subresource.
    ///
    /// The write carries the object's resourceVersion, so it fails with a
    /// conflict if the object changed since it was read.
    async fn replace_status(&self, installation: &Installation) -> Result<Installation, Error>;

    /// Add a finalizer (single object write, no-op if present)
    async fn add_finalizer(&self, installation: &Installation, finalizer: &str)
        -> Result<(), Error>;

    /// Remove a finalizer (single object write, no-op if absent)
    async fn remove_finalizer(
        &self,
        installation: &Installation,
        finalizer: &str,
    ) -> Result<(), Error>;
}

/// [`InstallationApi`] backed by the Kubernetes API
pub struct KubeInstallations {
    client: Client,
}

impl KubeInstallations {
    /// Create a new store using the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api_for(&self, installation: &Installation) -> Result<Api<Installation>, Error> {
        let namespace = installation.namespace().ok_or_else(|| {
            Error::validation_for_field("metadata.namespace", "Installation must be namespaced")
        })?;
        Ok(Api::namespaced(self.client.clone(), &namespace))
    }

    async fn patch_finalizers(
        &self,
        installation: &Installation,
        finalizers: Vec<String>,
    ) -> Result<(), Error> {
        let api = self.api_for(installation)?;
        // resourceVersion makes the merge patch conditional on what we read
        let patch = serde_json::json!({
            "metadata": {
                "finalizers": finalizers,
                "resourceVersion": installation.resource_version(),
            }
        });

        api.patch(
            &installation.name_any(),
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(&patch),
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl InstallationApi for KubeInstallations {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Installation>, Error> {
        let api: Api<Installation> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn replace_status(&self, installation: &Installation) -> Result<Installation, Error> {
        let api = self.api_for(installation)?;
        let body = serde_json::to_vec(installation)
            .map_err(|e| Error::serialization_for_kind("Installation", e.to_string()))?;

        let updated = api
            .replace_status(&installation.name_any(), &PostParams::default(), body)
            .await?;
        debug!(
            resource_version = ?updated.resource_version(),
            phase = ?updated.phase(),
            "status replaced"
        );
        Ok(updated)
    }

    async fn add_finalizer(
        &self,
        installation: &Installation,
        finalizer: &str,
    ) -> Result<(), Error> {
        let mut finalizers = installation.finalizers().to_vec();
        if finalizers.iter().any(|f| f == finalizer) {
            return Ok(());
        }
        finalizers.push(finalizer.to_string());
        self.patch_finalizers(installation, finalizers).await
    }

    async fn remove_finalizer(
        &self,
        installation: &Installation,
        finalizer: &str,
    ) -> Result<(), Error> {
        let finalizers: Vec<String> = installation
            .finalizers()
            .iter()
            .filter(|f| f.as_str() != finalizer)
            .cloned()
            .collect();
        if finalizers.len() == installation.finalizers().len() {
            return Ok(());
        }
        self.patch_finalizers(installation, finalizers).await
    }
}
