//! Shared types for the Installation CRD

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::values::OverrideValues;

// =============================================================================
// Spec types
// =============================================================================

/// Container image configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImageSpec {
    /// Image repository (e.g., "registry.example.com/edge/apiserver")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,

    /// Image tag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,

    /// Image pull policy (Always, IfNotPresent, Never)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_policy: Option<String>,
}

impl ImageSpec {
    /// Returns true if no image field carries a value
    pub fn is_empty(&self) -> bool {
        [&self.repository, &self.tag, &self.pull_policy]
            .iter()
            .all(|f| f.as_deref().unwrap_or_default().is_empty())
    }
}

/// Compute resource limits and requests, keyed by resource name
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct ResourceRequirements {
    /// Maximum resources (e.g., {"cpu": "500m", "memory": "512Mi"})
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub limits: BTreeMap<String, String>,

    /// Requested resources
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub requests: BTreeMap<String, String>,
}

impl ResourceRequirements {
    /// Returns true if neither limits nor requests are set
    pub fn is_empty(&self) -> bool {
        self.limits.is_empty() && self.requests.is_empty()
    }
}

/// Configuration shared by every chart-backed component
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ComponentSpec {
    /// Whether the component should be installed
    #[serde(default)]
    pub enabled: bool,

    /// Replica count
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    /// Image configuration
    #[serde(default, skip_serializing_if = "ImageSpec::is_empty")]
    pub image: ImageSpec,

    /// Resource limits and requests
    #[serde(default, skip_serializing_if = "ResourceRequirements::is_empty")]
    pub resources: ResourceRequirements,

    /// Free-form chart values merged over the derived ones
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<OverrideValues>,
}

/// Controller configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ControllerSpec {
    /// Common component settings
    #[serde(flatten)]
    pub component: ComponentSpec,

    /// Let the controller perform cluster initialization on startup
    #[serde(default)]
    pub enable_init: bool,
}

/// Console ingress configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct IngressSpec {
    /// Whether an Ingress should be created
    #[serde(default)]
    pub enabled: bool,

    /// Ingress hostname
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// Terminate TLS at the ingress
    #[serde(default)]
    pub tls: bool,
}

/// Console configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct ConsoleSpec {
    /// Common component settings
    #[serde(flatten)]
    pub component: ComponentSpec,

    /// Ingress configuration
    #[serde(default)]
    pub ingress: IngressSpec,
}

/// Prometheus configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct PrometheusSpec {
    /// Whether Prometheus should be installed
    #[serde(default)]
    pub enabled: bool,

    /// Retention period (e.g., "15d")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retention: Option<String>,
}

/// Grafana configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct GrafanaSpec {
    /// Whether Grafana should be installed
    #[serde(default)]
    pub enabled: bool,
}

/// Monitoring stack configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct MonitoringSpec {
    /// Whether the monitoring stack should be installed
    #[serde(default)]
    pub enabled: bool,

    /// Prometheus configuration
    #[serde(default)]
    pub prometheus: PrometheusSpec,

    /// Grafana configuration
    #[serde(default)]
    pub grafana: GrafanaSpec,
}

/// Configuration of every installable component
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct ComponentsSpec {
    /// Edge controller
    #[serde(default)]
    pub controller: ControllerSpec,

    /// Edge API server
    #[serde(default)]
    pub apiserver: ComponentSpec,

    /// Edge web console
    #[serde(default)]
    pub console: ConsoleSpec,

    /// Monitoring stack
    #[serde(default)]
    pub monitoring: MonitoringSpec,
}

/// Cluster initialization configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InitializationSpec {
    /// Whether cluster initialization should be performed
    #[serde(default)]
    pub enabled: bool,

    /// Name of the host cluster
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_name: Option<String>,

    /// Name of the system workspace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_workspace: Option<String>,

    /// Namespaces assigned to the system workspace
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub system_namespaces: Vec<String>,
}

// =============================================================================
// Status types
// =============================================================================

/// Installation lifecycle phase
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum InstallationPhase {
    /// Accepted, waiting for the first orchestrator run
    Pending,
    /// Checking cluster prerequisites
    PrerequisitesChecking,
    /// Installing CRDs and components
    Installing,
    /// Checking cluster initialization settings
    Initializing,
    /// Waiting for components to become ready
    Validating,
    /// Every phase completed
    Installed,
    /// A phase failed; requires the phase to be cleared to retry
    Failed,
    /// Upgrading an existing installation
    Upgrading,
}

impl InstallationPhase {
    /// Returns true for phases the reconciler never leaves on its own
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Installed | Self::Failed)
    }
}

impl std::fmt::Display for InstallationPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::PrerequisitesChecking => write!(f, "PrerequisitesChecking"),
            Self::Installing => write!(f, "Installing"),
            Self::Initializing => write!(f, "Initializing"),
            Self::Validating => write!(f, "Validating"),
            Self::Installed => write!(f, "Installed"),
            Self::Failed => write!(f, "Failed"),
            Self::Upgrading => write!(f, "Upgrading"),
        }
    }
}

/// Condition status following Kubernetes conventions
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionStatus {
    /// Condition is true
    True,
    /// Condition is false
    False,
    /// Condition status is unknown
    #[default]
    Unknown,
}

impl std::fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::True => write!(f, "True"),
            Self::False => write!(f, "False"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Condition types written by the installer
///
/// Conditions store their type as a plain string so types written by other
/// tools are kept; this enum names the ones the installer owns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConditionType {
    /// Cluster prerequisites were checked
    PrerequisitesChecked,
    /// Bundled CRDs were applied
    CrdsInstalled,
    /// Every enabled component was installed or upgraded
    ComponentsInstalled,
    /// Initialization settings were checked
    InitializationComplete,
    /// Components are ready
    Ready,
}

impl ConditionType {
    /// Wire name of the condition type
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PrerequisitesChecked => "PrerequisitesChecked",
            Self::CrdsInstalled => "CRDsInstalled",
            Self::ComponentsInstalled => "ComponentsInstalled",
            Self::InitializationComplete => "InitializationComplete",
            Self::Ready => "Ready",
        }
    }
}

impl std::fmt::Display for ConditionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<ConditionType> for String {
    fn from(value: ConditionType) -> Self {
        value.as_str().to_string()
    }
}

/// Kubernetes-style condition for status reporting
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct Condition {
    /// Type of condition (e.g., Ready, CRDsInstalled)
    #[serde(rename = "type")]
    pub type_: String,

    /// Status of the condition (True, False, Unknown)
    pub status: ConditionStatus,

    /// Machine-readable reason for the condition
    #[serde(default)]
    pub reason: String,

    /// Human-readable message
    #[serde(default)]
    pub message: String,

    /// Last time the condition transitioned
    #[serde(rename = "lastTransitionTime")]
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    /// Create a new condition with the current timestamp
    pub fn new(
        type_: impl Into<String>,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            type_: type_.into(),
            status,
            reason: reason.into(),
            message: message.into(),
            last_transition_time: Utc::now(),
        }
    }
}

/// Observed state of one component
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ComponentStatus {
    /// The release was installed or upgraded
    #[serde(default)]
    pub installed: bool,

    /// The component reported ready
    #[serde(default)]
    pub ready: bool,

    /// Platform version the release was installed at
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Helm release name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_name: Option<String>,

    /// Additional status information
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Observed state of every component
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct ComponentStatuses {
    /// Edge controller
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller: Option<ComponentStatus>,

    /// Edge API server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apiserver: Option<ComponentStatus>,

    /// Edge web console
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub console: Option<ComponentStatus>,

    /// Monitoring stack
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monitoring: Option<ComponentStatus>,
}

impl ComponentStatuses {
    /// Returns true if no component has a recorded status
    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    /// Recorded statuses keyed by component name, in install order
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &ComponentStatus)> {
        [
            ("controller", &self.controller),
            ("apiserver", &self.apiserver),
            ("console", &self.console),
            ("monitoring", &self.monitoring),
        ]
        .into_iter()
        .filter_map(|(name, status)| status.as_ref().map(|s| (name, s)))
    }
}
