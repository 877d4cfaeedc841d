//! Package installer adapter
//!
//! Components are shipped as helm charts under the charts directory. The
//! installer drives the helm CLI: `helm status` to check a release, then
//! `helm install` or `helm upgrade` with the assembled values on stdin.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

#[cfg(test)]
use mockall::automock;

use crate::crd::Values;
use crate::Error;

/// Everything needed to install or upgrade one release
#[derive(Clone, Debug, PartialEq)]
pub struct InstallOptions {
    /// Chart directory or archive
    pub chart_path: PathBuf,
    /// Release name
    pub release_name: String,
    /// Target namespace
    pub namespace: String,
    /// Chart values
    pub values: Values,
    /// Create the namespace if missing
    pub create_namespace: bool,
    /// Block until the release's resources are ready
    pub wait: bool,
    /// Upper bound for the whole operation
    pub timeout: Duration,
}

/// An installed release as reported by the package manager
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Release {
    /// Release name
    pub name: String,
    /// Namespace the release lives in
    pub namespace: String,
    /// Release revision, starting at 1
    pub revision: u32,
    /// Release state (e.g., "deployed")
    pub status: Option<String>,
}

/// Install-or-upgrade primitives for packaged components
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PackageInstaller: Send + Sync {
    /// Whether a release with this name exists in the namespace
    async fn exists(&self, release: &str, namespace: &str) -> Result<bool, Error>;

    /// Install a new release
    async fn install(&self, options: &InstallOptions) -> Result<Release, Error>;

    /// Upgrade an existing release
    async fn upgrade(&self, options: &InstallOptions) -> Result<Release, Error>;
}

/// Helm CLI implementation of [`PackageInstaller`]
#[derive(Clone, Debug)]
pub struct HelmCli {
    bin: PathBuf,
    kubeconfig: Option<PathBuf>,
}

impl HelmCli {
    /// Create an adapter running the given helm executable
    pub fn new(bin: impl Into<PathBuf>) -> Self {
        Self {
            bin: bin.into(),
            kubeconfig: None,
        }
    }

    /// Point helm at an explicit kubeconfig
    pub fn with_kubeconfig(mut self, kubeconfig: Option<PathBuf>) -> Self {
        self.kubeconfig = kubeconfig;
        self
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.bin);
        if let Some(kubeconfig) = &self.kubeconfig {
            cmd.arg("--kubeconfig").arg(kubeconfig);
        }
        // Dropping the future (reconcile cancelled) must not leave helm running
        cmd.kill_on_drop(true);
        cmd
    }

    async fn apply(&self, verb: &str, options: &InstallOptions) -> Result<Release, Error> {
        let release = options.release_name.as_str();
        let values = serde_yaml::to_string(&options.values)
            .map_err(|e| Error::helm(release, format!("failed to encode values: {}", e)))?;

        let mut child = self
            .command()
            .args(release_args(verb, options))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::helm(release, format!("failed to run helm: {}", e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(values.as_bytes())
                .await
                .map_err(|e| Error::helm(release, format!("failed to write values: {}", e)))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| Error::helm(release, format!("failed to wait for helm: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::helm(
                release,
                format!("helm {} failed: {}", verb, stderr.trim()),
            ));
        }

        Ok(parse_release(&output.stdout).unwrap_or_else(|| {
            warn!(release, "could not parse helm output, assuming first revision");
            Release {
                name: options.release_name.clone(),
                namespace: options.namespace.clone(),
                revision: 1,
                status: None,
            }
        }))
    }
}

#[async_trait]
impl PackageInstaller for HelmCli {
    async fn exists(&self, release: &str, namespace: &str) -> Result<bool, Error> {
        let output = self
            .command()
            .args(["status", release, "--namespace", namespace, "--output", "json"])
            .output()
            .await
            .map_err(|e| Error::helm(release, format!("failed to run helm: {}", e)))?;

        if output.status.success() {
            return Ok(true);
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        if is_release_not_found(&stderr) {
            debug!(release, namespace, "release not found");
            return Ok(false);
        }
        Err(Error::helm(
            release,
            format!("failed to check if release exists: {}", stderr.trim()),
        ))
    }

    async fn install(&self, options: &InstallOptions) -> Result<Release, Error> {
        info!(
            release = %options.release_name,
            namespace = %options.namespace,
            chart = %options.chart_path.display(),
            "installing release"
        );
        self.apply("install", options).await
    }

    async fn upgrade(&self, options: &InstallOptions) -> Result<Release, Error> {
        info!(
            release = %options.release_name,
            namespace = %options.namespace,
            chart = %options.chart_path.display(),
            "upgrading release"
        );
        self.apply("upgrade", options).await
    }
}

/// Arguments for `helm install|upgrade`; values are read from stdin
fn release_args(verb: &str, options: &InstallOptions) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        verb.into(),
        options.release_name.as_str().into(),
        options.chart_path.as_os_str().to_owned(),
        "--namespace".into(),
        options.namespace.as_str().into(),
    ];
    if options.create_namespace {
        args.push("--create-namespace".into());
    }
    if options.wait {
        args.push("--wait".into());
    }
    args.push("--timeout".into());
    args.push(format!("{}s", options.timeout.as_secs()).into());
    args.extend(["--values", "-", "--output", "json"].map(OsString::from));
    args
}

fn is_release_not_found(stderr: &str) -> bool {
    stderr.to_ascii_lowercase().contains("not found")
}

#[derive(Deserialize)]
struct HelmRelease {
    name: String,
    namespace: String,
    #[serde(default)]
    version: u32,
    #[serde(default)]
    info: Option<HelmReleaseInfo>,
}

#[derive(Deserialize)]
struct HelmReleaseInfo {
    #[serde(default)]
    status: Option<String>,
}

fn parse_release(stdout: &[u8]) -> Option<Release> {
    let release: HelmRelease = serde_json::from_slice(stdout).ok()?;
    Some(Release {
        name: release.name,
        namespace: release.namespace,
        revision: release.version,
        status: release.info.and_then(|i| i.status),
    })
}
