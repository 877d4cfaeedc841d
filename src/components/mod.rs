//! Edge platform components
//!
//! Every component maps to a compiled-in chart, release name, namespace and
//! install timeout. Installation follows one rule for all of them: upgrade
//! the release if it exists, otherwise install it and create the namespace.

mod values;

use std::time::Duration;

use tracing::{info, instrument};

use crate::config::Settings;
use crate::crd::{ComponentStatus, ComponentStatuses, ComponentsSpec, Installation};
use crate::helm::{InstallOptions, PackageInstaller, Release};
use crate::{Error, EDGE_SYSTEM_NAMESPACE, OBSERVABILITY_NAMESPACE};

pub use values::{build_values, CONSOLE_TLS_SECRET, DEFAULT_PROMETHEUS_RETENTION};

/// Install timeout for application components
pub const APP_INSTALL_TIMEOUT: Duration = Duration::from_secs(300);

/// Install timeout for the monitoring stack
pub const MONITORING_INSTALL_TIMEOUT: Duration = Duration::from_secs(600);

/// An independently installable part of the platform
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Component {
    /// Edge controller; performs cluster initialization when enabled
    Controller,
    /// Edge API server
    ApiServer,
    /// Edge web console
    Console,
    /// Prometheus and Grafana
    Monitoring,
}

impl Component {
    /// Installation order. The controller goes first because the others may
    /// rely on initialization it performs.
    pub const INSTALL_ORDER: [Component; 4] = [
        Component::Controller,
        Component::ApiServer,
        Component::Console,
        Component::Monitoring,
    ];

    /// Short name used in status and logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::Controller => "controller",
            Self::ApiServer => "apiserver",
            Self::Console => "console",
            Self::Monitoring => "monitoring",
        }
    }

    /// Helm release name; also the chart directory and deployment name
    pub fn release_name(&self) -> &'static str {
        match self {
            Self::Controller => "edge-controller",
            Self::ApiServer => "edge-apiserver",
            Self::Console => "edge-console",
            Self::Monitoring => "edge-monitoring",
        }
    }

    /// Namespace the release is installed into
    pub fn namespace(&self) -> &'static str {
        match self {
            Self::Monitoring => OBSERVABILITY_NAMESPACE,
            _ => EDGE_SYSTEM_NAMESPACE,
        }
    }

    /// Upper bound for install or upgrade
    pub fn install_timeout(&self) -> Duration {
        match self {
            Self::Monitoring => MONITORING_INSTALL_TIMEOUT,
            _ => APP_INSTALL_TIMEOUT,
        }
    }

    /// Whether the Installation enables this component
    pub fn is_enabled(&self, spec: &ComponentsSpec) -> bool {
        match self {
            Self::Controller => spec.controller.component.enabled,
            Self::ApiServer => spec.apiserver.enabled,
            Self::Console => spec.console.component.enabled,
            Self::Monitoring => spec.monitoring.enabled,
        }
    }

    /// This component's slot in the status
    pub fn status_mut<'a>(
        &self,
        statuses: &'a mut ComponentStatuses,
    ) -> &'a mut Option<ComponentStatus> {
        match self {
            Self::Controller => &mut statuses.controller,
            Self::ApiServer => &mut statuses.apiserver,
            Self::Console => &mut statuses.console,
            Self::Monitoring => &mut statuses.monitoring,
        }
    }

    /// Options for installing or upgrading this component's release
    pub fn install_options(
        &self,
        installation: &Installation,
        settings: &Settings,
    ) -> InstallOptions {
        InstallOptions {
            chart_path: settings.chart_path(self.release_name()),
            release_name: self.release_name().to_string(),
            namespace: self.namespace().to_string(),
            values: build_values(*self, &installation.spec),
            create_namespace: false,
            wait: true,
            timeout: self.install_timeout(),
        }
    }
}

impl std::fmt::Display for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Install or upgrade one component and record it as installed.
///
/// The recorded status is optimistic: readiness is only confirmed later by
/// installation validation.
#[instrument(skip(packages, settings, installation), fields(component = %component))]
pub async fn install_component(
    packages: &dyn PackageInstaller,
    settings: &Settings,
    installation: &mut Installation,
    component: Component,
) -> Result<Release, Error> {
    let mut options = component.install_options(installation, settings);

    let release = if packages
        .exists(&options.release_name, &options.namespace)
        .await?
    {
        info!(release = %options.release_name, "release exists, upgrading");
        packages.upgrade(&options).await?
    } else {
        options.create_namespace = true;
        packages.install(&options).await?
    };

    let version = installation.spec.version.clone();
    let status = installation.status.get_or_insert_with(Default::default);
    *component.status_mut(&mut status.components) = Some(ComponentStatus {
        installed: true,
        ready: true,
        version: Some(version),
        release_name: Some(release.name.clone()),
        message: None,
    });

    info!(release = %release.name, revision = release.revision, "component installed");
    Ok(release)
}

/// Install every enabled component in [`Component::INSTALL_ORDER`].
///
/// Stops at the first failure; later components are not attempted.
pub async fn install_enabled(
    packages: &dyn PackageInstaller,
    settings: &Settings,
    installation: &mut Installation,
) -> Result<Vec<Component>, Error> {
    let enabled: Vec<Component> = Component::INSTALL_ORDER
        .into_iter()
        .filter(|c| c.is_enabled(&installation.spec.components))
        .collect();

    for component in &enabled {
        install_component(packages, settings, installation, *component)
            .await
            .map_err(|e| Error::component(component.name(), e))?;
    }

    Ok(enabled)
}
