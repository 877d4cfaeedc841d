//! Edge installer - installs the Edge platform from an Installation resource

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Patch, PatchParams};
use kube::{Api, Client, CustomResourceExt};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use edge_installer::config::Settings;
use edge_installer::controller::{cleanup, run_installation, run_operator, Context, ObjectKey};
use edge_installer::crd::Installation;
use edge_installer::kube_utils::create_client;
use edge_installer::{
    DEFAULT_CHARTS_DIR, DEFAULT_INSTALLATION_NAME, EDGE_SYSTEM_NAMESPACE, FIELD_MANAGER,
};

/// Edge installer - installs and upgrades the Edge platform on a cluster
#[derive(Parser, Debug)]
#[command(name = "edge-installer", version, about, long_about = None)]
struct Cli {
    /// Print the Installation CRD and exit
    #[arg(long)]
    crd: bool,

    /// What to do
    #[arg(long, value_enum, env = "EDGE_INSTALLER_MODE", default_value_t = Mode::Operator)]
    mode: Mode,

    /// Path to a kubeconfig file; in-cluster or default config when unset
    #[arg(long, env = "KUBECONFIG")]
    kubeconfig: Option<PathBuf>,

    /// Installation to load in install and uninstall modes
    #[arg(long, default_value = DEFAULT_INSTALLATION_NAME)]
    installation: String,

    /// Namespace of the Installation in install and uninstall modes
    #[arg(long, default_value = EDGE_SYSTEM_NAMESPACE)]
    namespace: String,

    /// Directory holding one chart per component
    #[arg(long, env = "EDGE_CHARTS_DIR", default_value = DEFAULT_CHARTS_DIR)]
    charts_dir: PathBuf,

    /// Directory holding the CRD manifests [default: <charts-dir>/crds]
    #[arg(long, env = "EDGE_CRDS_DIR")]
    crds_dir: Option<PathBuf>,

    /// Helm executable
    #[arg(long, env = "EDGE_HELM_BIN", default_value = "helm")]
    helm_bin: PathBuf,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Watch Installations and reconcile them continuously
    Operator,
    /// Run one installation to completion, then exit
    Install,
    /// Report what is installed; no teardown is performed
    Uninstall,
}

impl Cli {
    fn settings(&self) -> Settings {
        let settings = Settings::new(&self.charts_dir).with_helm_bin(&self.helm_bin);
        match &self.crds_dir {
            Some(dir) => settings.with_crds_dir(dir),
            None => settings,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    if cli.crd {
        let crd = serde_yaml::to_string(&Installation::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
        println!("{crd}");
        return Ok(());
    }

    let client = create_client(cli.kubeconfig.as_deref())
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;
    let ctx = Context::builder(client.clone())
        .settings(cli.settings())
        .kubeconfig(cli.kubeconfig.clone())
        .build();

    match cli.mode {
        Mode::Operator => run_controller(client, ctx).await,
        Mode::Install => run_install(&cli, ctx).await,
        Mode::Uninstall => run_uninstall(&cli, ctx).await,
    }
}

/// Run the Installation controller until interrupted
async fn run_controller(client: Client, ctx: Context) -> anyhow::Result<()> {
    tracing::info!("Edge installer operator starting...");

    ensure_crd_installed(&client).await?;

    run_operator(client, Arc::new(ctx)).await;

    tracing::info!("Edge installer operator stopped");
    Ok(())
}

/// Install the Installation CRD
///
/// The operator applies its own CRD on startup so its schema always matches
/// the running version.
async fn ensure_crd_installed(client: &Client) -> anyhow::Result<()> {
    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(FIELD_MANAGER).force();

    tracing::info!("Installing Installation CRD...");
    crds.patch(
        "installations.installer.theriseunion.io",
        &params,
        &Patch::Apply(&Installation::crd()),
    )
    .await
    .map_err(|e| anyhow::anyhow!("Failed to install Installation CRD: {}", e))?;

    Ok(())
}

/// Run every phase once against the named Installation
async fn run_install(cli: &Cli, ctx: Context) -> anyhow::Result<()> {
    let key = ObjectKey::new(&cli.namespace, &cli.installation);
    tracing::info!(installation = %key, "running installation");

    if ctx
        .installations
        .get(&key.namespace, &key.name)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to load installation {}: {}", key, e))?
        .is_none()
    {
        anyhow::bail!("Installation {} not found", key);
    }

    run_installation(&key, &ctx)
        .await
        .map_err(|e| anyhow::anyhow!("Installation {} failed: {}", key, e))?;

    tracing::info!(installation = %key, "installation finished");
    Ok(())
}

/// Report the releases an Installation recorded; nothing is removed
async fn run_uninstall(cli: &Cli, ctx: Context) -> anyhow::Result<()> {
    let key = ObjectKey::new(&cli.namespace, &cli.installation);

    match ctx
        .installations
        .get(&key.namespace, &key.name)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to load installation {}: {}", key, e))?
    {
        Some(installation) => cleanup(&installation),
        None => tracing::info!(installation = %key, "installation not found"),
    }

    tracing::warn!("uninstall is not implemented; no resources were removed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::parse_from(["edge-installer"]);
        assert_eq!(cli.mode, Mode::Operator);
        assert_eq!(cli.installation, "edge-platform");
        assert_eq!(cli.namespace, "edge-system");

        let settings = cli.settings();
        assert_eq!(settings.charts_dir, PathBuf::from("/charts"));
        assert_eq!(settings.crds_dir, PathBuf::from("/charts/crds"));
    }

    #[test]
    fn test_crds_dir_override() {
        let cli = Cli::parse_from([
            "edge-installer",
            "--mode",
            "install",
            "--charts-dir",
            "/opt/charts",
            "--crds-dir",
            "/opt/crds",
        ]);
        assert_eq!(cli.mode, Mode::Install);
        let settings = cli.settings();
        assert_eq!(settings.chart_path("edge-console"), PathBuf::from("/opt/charts/edge-console"));
        assert_eq!(settings.crds_dir, PathBuf::from("/opt/crds"));
    }
}
