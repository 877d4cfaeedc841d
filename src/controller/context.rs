//! Shared controller context
//!
//! Built once at startup and shared by every reconcile. Every collaborator
//! is a trait object so tests can substitute in-memory fakes.

use std::path::PathBuf;
use std::sync::Arc;

use kube::Client;

use super::client::{InstallationApi, KubeInstallations};
use super::reconciler::ReconcileFailures;
use crate::config::Settings;
use crate::helm::{HelmCli, PackageInstaller};
use crate::phases::{
    BundledCrds, ClusterPrerequisites, DeploymentReadiness, ManifestLoader, PrerequisiteChecker,
    ReadinessValidator,
};

/// Collaborators and settings for reconciling Installations
pub struct Context {
    /// Installation store (trait object for testability)
    pub installations: Arc<dyn InstallationApi>,
    /// Installs and upgrades component releases
    pub packages: Arc<dyn PackageInstaller>,
    /// Gate run before anything is installed
    pub prerequisites: Arc<dyn PrerequisiteChecker>,
    /// Applies the bundled CRDs
    pub manifests: Arc<dyn ManifestLoader>,
    /// Waits for component deployments to become ready
    pub readiness: Arc<dyn ReadinessValidator>,
    /// Process settings
    pub settings: Settings,
    /// Consecutive reconcile failures, for error backoff
    pub failures: ReconcileFailures,
}

impl Context {
    /// Create a builder for constructing a Context
    pub fn builder(client: Client) -> ContextBuilder {
        ContextBuilder::new(client)
    }

    /// Create a context for testing with custom collaborators
    ///
    /// Readiness polling is shortened so validation failures surface quickly.
    #[cfg(test)]
    pub fn for_testing(
        installations: Arc<dyn InstallationApi>,
        packages: Arc<dyn PackageInstaller>,
        prerequisites: Arc<dyn PrerequisiteChecker>,
        manifests: Arc<dyn ManifestLoader>,
        readiness: Arc<dyn ReadinessValidator>,
    ) -> Self {
        use std::time::Duration;

        Self {
            installations,
            packages,
            prerequisites,
            manifests,
            readiness,
            settings: Settings::new("/charts")
                .with_readiness(Duration::from_millis(10), Duration::from_millis(50)),
            failures: ReconcileFailures::default(),
        }
    }
}

/// Builder for constructing [`Context`] instances
///
/// ```ignore
/// let ctx = Context::builder(client)
///     .settings(Settings::new("/charts").with_helm_bin("/usr/local/bin/helm"))
///     .kubeconfig(Some(path))
///     .build();
/// ```
pub struct ContextBuilder {
    client: Client,
    settings: Settings,
    kubeconfig: Option<PathBuf>,
    installations: Option<Arc<dyn InstallationApi>>,
    packages: Option<Arc<dyn PackageInstaller>>,
}

impl ContextBuilder {
    fn new(client: Client) -> Self {
        Self {
            client,
            settings: Settings::default(),
            kubeconfig: None,
            installations: None,
            packages: None,
        }
    }

    /// Set the process settings
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Kubeconfig handed to helm so it targets the same cluster as the client
    pub fn kubeconfig(mut self, kubeconfig: Option<PathBuf>) -> Self {
        self.kubeconfig = kubeconfig;
        self
    }

    /// Override the Installation store
    pub fn installations(mut self, installations: Arc<dyn InstallationApi>) -> Self {
        self.installations = Some(installations);
        self
    }

    /// Override the package installer
    pub fn packages(mut self, packages: Arc<dyn PackageInstaller>) -> Self {
        self.packages = Some(packages);
        self
    }

    /// Build the Context
    pub fn build(self) -> Context {
        let Self {
            client,
            settings,
            kubeconfig,
            installations,
            packages,
        } = self;

        Context {
            installations: installations
                .unwrap_or_else(|| Arc::new(KubeInstallations::new(client.clone()))),
            packages: packages.unwrap_or_else(|| {
                Arc::new(HelmCli::new(settings.helm_bin.clone()).with_kubeconfig(kubeconfig))
            }),
            prerequisites: Arc::new(ClusterPrerequisites::new(client.clone())),
            manifests: Arc::new(BundledCrds::new(client.clone(), settings.crds_dir.clone())),
            readiness: Arc::new(DeploymentReadiness::new(client)),
            settings,
            failures: ReconcileFailures::default(),
        }
    }
}
