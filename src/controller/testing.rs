//! In-memory collaborators for controller tests
//!
//! The fakes keep state across calls so stories can observe the sequence of
//! status writes a reconcile produces, which mocks with fixed expectations
//! cannot express well.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::api::ObjectMeta;

use super::client::InstallationApi;
use super::context::Context;
use crate::crd::{Installation, InstallationPhase, InstallationSpec, InstallationStatus};
use crate::helm::{InstallOptions, PackageInstaller, Release};
use crate::phases::crds::MockManifestLoader;
use crate::phases::prerequisites::MockPrerequisiteChecker;
use crate::phases::validation::MockReadinessValidator;
use crate::{Error, FINALIZER};

pub const NAMESPACE: &str = "edge-system";
pub const NAME: &str = "edge-platform";

fn api_error(code: u16, reason: &str) -> Error {
    Error::from(kube::Error::Api(kube::error::ErrorResponse {
        status: "Failure".to_string(),
        message: format!("{} (fake store)", reason),
        reason: reason.to_string(),
        code,
    }))
}

/// Spec with every component enabled
pub fn full_spec() -> InstallationSpec {
    let mut spec = InstallationSpec {
        version: "v1.2.0".to_string(),
        components: Default::default(),
        initialization: Default::default(),
    };
    spec.components.controller.component.enabled = true;
    spec.components.apiserver.enabled = true;
    spec.components.console.component.enabled = true;
    spec.components.monitoring.enabled = true;
    spec
}

/// Namespaced Installation carrying the finalizer
pub fn sample_installation(spec: InstallationSpec) -> Installation {
    let mut installation = Installation::new(NAME, spec);
    installation.metadata = ObjectMeta {
        name: Some(NAME.to_string()),
        namespace: Some(NAMESPACE.to_string()),
        finalizers: Some(vec![FINALIZER.to_string()]),
        ..Default::default()
    };
    installation
}

#[derive(Default)]
struct StoreState {
    object: Option<Installation>,
    resource_version: u64,
    status_writes: Vec<InstallationStatus>,
    status_attempts: usize,
    conflicting_status_write: Option<usize>,
    object_writes: usize,
}

impl StoreState {
    fn check_version(&self, incoming: &Installation) -> Result<(), Error> {
        if self.object.is_none() {
            return Err(api_error(404, "NotFound"));
        }
        let expected = self.resource_version.to_string();
        if incoming.metadata.resource_version.as_deref() != Some(expected.as_str()) {
            return Err(api_error(409, "Conflict"));
        }
        Ok(())
    }

    fn bump(&mut self) {
        self.resource_version += 1;
        let version = self.resource_version.to_string();
        if let Some(object) = self.object.as_mut() {
            object.metadata.resource_version = Some(version);
        }
    }
}

/// Installation store enforcing resourceVersion checks like the API server
#[derive(Default)]
pub struct FakeInstallations {
    state: Mutex<StoreState>,
}

impl FakeInstallations {
    pub fn new(installation: Installation) -> Arc<Self> {
        let store = Self::default();
        {
            let mut state = store.state.lock().unwrap();
            state.object = Some(installation);
            state.bump();
        }
        Arc::new(store)
    }

    pub fn empty() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn current(&self) -> Option<Installation> {
        self.state.lock().unwrap().object.clone()
    }

    pub fn status(&self) -> InstallationStatus {
        self.current()
            .and_then(|i| i.status)
            .unwrap_or_default()
    }

    pub fn status_writes(&self) -> Vec<InstallationStatus> {
        self.state.lock().unwrap().status_writes.clone()
    }

    /// Phase recorded by each status write, in order
    pub fn phase_history(&self) -> Vec<Option<InstallationPhase>> {
        self.status_writes().iter().map(|s| s.phase).collect()
    }

    pub fn object_writes(&self) -> usize {
        self.state.lock().unwrap().object_writes
    }

    /// Mutate the stored object as another client would
    pub fn modify(&self, f: impl FnOnce(&mut Installation)) {
        let mut state = self.state.lock().unwrap();
        if let Some(object) = state.object.as_mut() {
            f(object);
        }
        state.bump();
    }

    /// Request deletion; the object stays while finalizers remain
    pub fn delete(&self) {
        let mut state = self.state.lock().unwrap();
        let guarded = state
            .object
            .as_ref()
            .is_some_and(|o| o.metadata.finalizers.as_ref().is_some_and(|f| !f.is_empty()));
        if guarded {
            if let Some(object) = state.object.as_mut() {
                object.metadata.deletion_timestamp = Some(Time(chrono::Utc::now()));
            }
            state.bump();
        } else {
            state.object = None;
        }
    }

    /// Reject the `nth` status write from now (1-based) with a conflict, as
    /// if another writer got there first
    pub fn conflict_on_status_write(&self, nth: usize) {
        let mut state = self.state.lock().unwrap();
        state.conflicting_status_write = Some(state.status_attempts + nth);
    }

    /// Drop the object outright
    pub fn purge(&self) {
        self.state.lock().unwrap().object = None;
    }
}

#[async_trait]
impl InstallationApi for FakeInstallations {
    async fn get(&self, _namespace: &str, _name: &str) -> Result<Option<Installation>, Error> {
        Ok(self.current())
    }

    async fn replace_status(&self, installation: &Installation) -> Result<Installation, Error> {
        let mut state = self.state.lock().unwrap();
        state.status_attempts += 1;
        if state.conflicting_status_write == Some(state.status_attempts) {
            return Err(api_error(409, "Conflict"));
        }
        state.check_version(installation)?;

        let status = installation.status.clone();
        state.status_writes.push(status.clone().unwrap_or_default());
        if let Some(object) = state.object.as_mut() {
            object.status = status;
        }
        state.bump();
        state
            .object
            .clone()
            .ok_or_else(|| api_error(404, "NotFound"))
    }

    async fn add_finalizer(
        &self,
        installation: &Installation,
        finalizer: &str,
    ) -> Result<(), Error> {
        let mut state = self.state.lock().unwrap();
        state.check_version(installation)?;
        if let Some(object) = state.object.as_mut() {
            let finalizers = object.metadata.finalizers.get_or_insert_with(Vec::new);
            if !finalizers.iter().any(|f| f == finalizer) {
                finalizers.push(finalizer.to_string());
            }
        }
        state.object_writes += 1;
        state.bump();
        Ok(())
    }

    async fn remove_finalizer(
        &self,
        installation: &Installation,
        finalizer: &str,
    ) -> Result<(), Error> {
        let mut state = self.state.lock().unwrap();
        state.check_version(installation)?;
        state.object_writes += 1;

        let collect = match state.object.as_mut() {
            Some(object) => {
                if let Some(finalizers) = object.metadata.finalizers.as_mut() {
                    finalizers.retain(|f| f != finalizer);
                }
                object.metadata.deletion_timestamp.is_some()
                    && object
                        .metadata
                        .finalizers
                        .as_ref()
                        .map_or(true, |f| f.is_empty())
            }
            None => false,
        };

        if collect {
            state.object = None;
        } else {
            state.bump();
        }
        Ok(())
    }
}

#[derive(Default)]
struct PackagesState {
    existing: HashSet<String>,
    calls: Vec<String>,
}

/// Package installer remembering which releases exist
#[derive(Default)]
pub struct FakePackages {
    state: Mutex<PackagesState>,
    failing_release: Option<String>,
}

impl FakePackages {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Installs and upgrades of `release` fail
    pub fn failing(release: &str) -> Arc<Self> {
        Arc::new(Self {
            failing_release: Some(release.to_string()),
            ..Default::default()
        })
    }

    /// Calls in order, as `verb:release`
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    fn record(
        &self,
        verb: &str,
        options: &InstallOptions,
        revision: u32,
    ) -> Result<Release, Error> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("{}:{}", verb, options.release_name));
        if self.failing_release.as_deref() == Some(options.release_name.as_str()) {
            return Err(Error::helm(&options.release_name, format!("{} failed", verb)));
        }
        state.existing.insert(options.release_name.clone());
        Ok(Release {
            name: options.release_name.clone(),
            namespace: options.namespace.clone(),
            revision,
            status: Some("deployed".to_string()),
        })
    }
}

#[async_trait]
impl PackageInstaller for FakePackages {
    async fn exists(&self, release: &str, _namespace: &str) -> Result<bool, Error> {
        Ok(self.state.lock().unwrap().existing.contains(release))
    }

    async fn install(&self, options: &InstallOptions) -> Result<Release, Error> {
        self.record("install", options, 1)
    }

    async fn upgrade(&self, options: &InstallOptions) -> Result<Release, Error> {
        self.record("upgrade", options, 2)
    }
}

/// Prerequisites, CRDs and readiness all succeed
pub fn healthy_phases() -> (
    MockPrerequisiteChecker,
    MockManifestLoader,
    MockReadinessValidator,
) {
    let mut prerequisites = MockPrerequisiteChecker::new();
    prerequisites.expect_check().returning(|| Ok(()));
    let mut manifests = MockManifestLoader::new();
    manifests.expect_install_crds().returning(|| Ok(3));
    let mut readiness = MockReadinessValidator::new();
    readiness.expect_wait_ready().returning(|_, _, _, _| Ok(()));
    (prerequisites, manifests, readiness)
}

/// Context with healthy phase collaborators around the given store and installer
pub fn context(
    store: Arc<FakeInstallations>,
    packages: Arc<dyn PackageInstaller>,
) -> Arc<Context> {
    let (prerequisites, manifests, readiness) = healthy_phases();
    Arc::new(Context::for_testing(
        store,
        packages,
        Arc::new(prerequisites),
        Arc::new(manifests),
        Arc::new(readiness),
    ))
}
