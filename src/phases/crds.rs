//! Bundled CRD installation
//!
//! CRD manifests ship next to the charts. Every `*.yaml`/`*.yml` file under
//! the CRD directory, subdirectories included, is read in file-name order;
//! files may hold several documents, and every document must be a
//! CustomResourceDefinition.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, Patch, PatchParams};
use kube::Client;
use serde::Deserialize;
use tracing::{debug, info};
use walkdir::WalkDir;

#[cfg(test)]
use mockall::automock;

use crate::retry::{retry_with_backoff_if, RetryConfig};
use crate::{Error, FIELD_MANAGER};

const CRD_KIND: &str = "CustomResourceDefinition";

/// Installs the platform's schema definitions
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ManifestLoader: Send + Sync {
    /// Create or update every bundled CRD; returns how many were applied
    async fn install_crds(&self) -> Result<usize, Error>;
}

/// [`ManifestLoader`] applying CRDs from a directory with server-side apply
pub struct BundledCrds {
    client: Client,
    dir: PathBuf,
    retry: RetryConfig,
}

impl BundledCrds {
    /// Create a loader for the manifests in `dir`
    pub fn new(client: Client, dir: impl Into<PathBuf>) -> Self {
        Self {
            client,
            dir: dir.into(),
            retry: RetryConfig::with_max_attempts(5),
        }
    }
}

#[async_trait]
impl ManifestLoader for BundledCrds {
    async fn install_crds(&self) -> Result<usize, Error> {
        info!(dir = %self.dir.display(), "installing CRDs");
        let manifests = load_crds(&self.dir).await?;
        info!(count = manifests.len(), "found CRDs to install");

        let api: Api<CustomResourceDefinition> = Api::all(self.client.clone());
        let params = PatchParams::apply(FIELD_MANAGER).force();

        for crd in &manifests {
            let name = crd.metadata.name.as_deref().unwrap_or_default();
            let (api, params) = (&api, &params);
            retry_with_backoff_if(&self.retry, "apply_crd", Error::is_retryable, || async move {
                api.patch(name, params, &Patch::Apply(crd))
                    .await
                    .map_err(Error::from)
            })
            .await
            .map_err(|e| {
                Error::internal_with_context(
                    "install_crds",
                    format!("failed to install CRD {}: {}", name, e),
                )
            })?;
            info!(crd = name, "CRD installed");
        }

        Ok(manifests.len())
    }
}

/// Read and parse every CRD manifest under `dir`, walking subdirectories in
/// file-name order
pub async fn load_crds(dir: &Path) -> Result<Vec<CustomResourceDefinition>, Error> {
    let mut crds = Vec::new();
    for path in manifest_paths(dir)? {
        let source = path.display().to_string();
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| Error::manifest(&source, format!("failed to read: {}", e)))?;
        crds.extend(parse_crd_documents(&content, &source)?);
    }
    Ok(crds)
}

/// YAML files under `dir`, depth first with siblings sorted by name
fn manifest_paths(dir: &Path) -> Result<Vec<PathBuf>, Error> {
    let mut paths = Vec::new();

    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(dir).display().to_string();
            Error::manifest(path, format!("failed to read CRD directory: {}", e))
        })?;
        let path = entry.path();
        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );
        if entry.file_type().is_file() && is_yaml {
            paths.push(path.to_path_buf());
        } else if entry.file_type().is_file() {
            debug!(path = %path.display(), "skipping non-manifest file");
        }
    }

    Ok(paths)
}

/// Parse a (possibly multi-document) YAML file of CRDs
pub fn parse_crd_documents(
    content: &str,
    source: &str,
) -> Result<Vec<CustomResourceDefinition>, Error> {
    let mut crds = Vec::new();

    for document in serde_yaml::Deserializer::from_str(content) {
        let value = serde_json::Value::deserialize(document)
            .map_err(|e| Error::manifest(source, format!("invalid YAML: {}", e)))?;
        if value.is_null() {
            continue;
        }

        let kind = value
            .get("kind")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default();
        if kind != CRD_KIND {
            return Err(Error::manifest(
                source,
                format!("expected kind {}, found {:?}", CRD_KIND, kind),
            ));
        }

        let crd: CustomResourceDefinition = serde_json::from_value(value)
            .map_err(|e| Error::manifest(source, format!("failed to decode CRD: {}", e)))?;
        if crd.metadata.name.as_deref().unwrap_or_default().is_empty() {
            return Err(Error::manifest(source, "CRD has no metadata.name"));
        }
        crds.push(crd);
    }

    Ok(crds)
}
