//! Installation Custom Resource Definition
//!
//! An Installation declares which Edge components a cluster runs, at which
//! platform version, and how each is configured. Its status records how far
//! the installer got and the outcome of every phase.

use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{
    ComponentStatuses, ComponentsSpec, Condition, InitializationSpec, InstallationPhase,
};

/// Desired state of an Installation
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "installer.theriseunion.io",
    version = "v1alpha1",
    kind = "Installation",
    plural = "installations",
    shortname = "inst",
    status = "InstallationStatus",
    namespaced,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Version","type":"string","jsonPath":".spec.version"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct InstallationSpec {
    /// Edge platform version to install
    pub version: String,

    /// Per-component configuration
    #[serde(default)]
    pub components: ComponentsSpec,

    /// Cluster initialization configuration
    #[serde(default)]
    pub initialization: InitializationSpec,
}

impl InstallationSpec {
    /// Validate the declaration before any cluster work starts
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.version.trim().is_empty() {
            return Err(crate::Error::validation_for_field(
                "spec.version",
                "version must not be empty",
            ));
        }
        Ok(())
    }
}

/// Status for an Installation
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InstallationStatus {
    /// Current phase; absent until the installer first sees the resource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<InstallationPhase>,

    /// Human-readable progress note
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_phase: Option<String>,

    /// Per-phase conditions, at most one per type
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// Per-component status
    #[serde(default, skip_serializing_if = "ComponentStatuses::is_empty")]
    pub components: ComponentStatuses,

    /// When the installer first accepted the resource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,

    /// When the last successful run finished
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_time: Option<DateTime<Utc>>,

    /// Most recent failure cause
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl InstallationStatus {
    /// Create a new status with the given phase
    pub fn with_phase(phase: InstallationPhase) -> Self {
        Self {
            phase: Some(phase),
            ..Default::default()
        }
    }

    /// Set the phase and progress note
    pub fn enter(&mut self, phase: InstallationPhase, note: impl Into<String>) {
        self.phase = Some(phase);
        self.current_phase = Some(note.into());
    }

    /// Insert or replace the condition of the same type.
    ///
    /// A known type is updated where it stands so condition order is stable
    /// across runs; a new type is appended.
    pub fn set_condition(&mut self, condition: Condition) {
        match self
            .conditions
            .iter_mut()
            .find(|c| c.type_ == condition.type_)
        {
            Some(existing) => *existing = condition,
            None => self.conditions.push(condition),
        }
    }

    /// Look up a condition by type
    pub fn condition(&self, type_: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.type_ == type_)
    }
}

impl Installation {
    /// Current phase, or `None` if status was never initialized
    pub fn phase(&self) -> Option<InstallationPhase> {
        self.status.as_ref().and_then(|s| s.phase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::types::{ConditionStatus, ConditionType};
    use kube::CustomResourceExt;

    fn sample_spec() -> InstallationSpec {
        serde_yaml::from_str(
            r#"
version: v1.2.0
components:
  controller:
    enabled: true
    enableInit: true
  apiserver:
    enabled: true
    replicas: 3
  console:
    enabled: true
    ingress:
      enabled: true
      host: console.edge.local
      tls: true
  monitoring:
    enabled: false
initialization:
  enabled: true
  clusterName: host
"#,
        )
        .expect("sample spec parses")
    }

    mod conditions {
        use super::*;

        fn condition(type_: ConditionType, status: ConditionStatus) -> Condition {
            Condition::new(type_, status, "ExecutionSucceeded", "done")
        }

        /// Running the same phase many times leaves a single entry per type
        #[test]
        fn story_condition_types_stay_unique() {
            let mut status = InstallationStatus::default();
            for _ in 0..5 {
                status.set_condition(condition(
                    ConditionType::PrerequisitesChecked,
                    ConditionStatus::True,
                ));
                status.set_condition(condition(ConditionType::Ready, ConditionStatus::False));
            }

            assert_eq!(status.conditions.len(), 2);
            assert_eq!(
                status
                    .conditions
                    .iter()
                    .filter(|c| c.type_ == "Ready")
                    .count(),
                1
            );
        }

        #[test]
        fn story_known_type_updates_in_place() {
            let mut status = InstallationStatus::default();
            status.set_condition(condition(
                ConditionType::PrerequisitesChecked,
                ConditionStatus::True,
            ));
            status.set_condition(condition(ConditionType::CrdsInstalled, ConditionStatus::True));
            let first_seen = status.conditions[0].last_transition_time;

            status.set_condition(condition(
                ConditionType::PrerequisitesChecked,
                ConditionStatus::False,
            ));

            assert_eq!(status.conditions[0].type_, "PrerequisitesChecked");
            assert_eq!(status.conditions[0].status, ConditionStatus::False);
            assert!(status.conditions[0].last_transition_time >= first_seen);
            assert_eq!(status.conditions[1].type_, "CRDsInstalled");
        }

        #[test]
        fn story_unknown_types_are_appended() {
            let mut status = InstallationStatus::default();
            status.set_condition(condition(ConditionType::Ready, ConditionStatus::True));
            status.set_condition(Condition::new(
                "ExternalCheck",
                ConditionStatus::Unknown,
                "Probing",
                "",
            ));

            assert_eq!(status.conditions.len(), 2);
            assert!(status.condition("ExternalCheck").is_some());
            assert!(status.condition("Missing").is_none());
        }
    }

    mod lifecycle {
        use super::*;

        #[test]
        fn story_new_installation_has_no_phase() {
            let installation = Installation::new("edge-platform", sample_spec());
            assert_eq!(installation.phase(), None);
        }

        #[test]
        fn story_enter_records_phase_and_note() {
            let mut status = InstallationStatus::with_phase(InstallationPhase::Pending);
            status.enter(InstallationPhase::Installing, "CRD Installation");
            assert_eq!(status.phase, Some(InstallationPhase::Installing));
            assert_eq!(status.current_phase.as_deref(), Some("CRD Installation"));
        }

        #[test]
        fn story_status_without_phase_serializes_without_it() {
            let status = InstallationStatus::default();
            let json = serde_json::to_value(&status).expect("serialize");
            assert!(json.get("phase").is_none());
        }
    }

    mod validation {
        use super::*;

        #[test]
        fn story_valid_spec_passes() {
            assert!(sample_spec().validate().is_ok());
        }

        #[test]
        fn story_empty_version_is_rejected() {
            let mut spec = sample_spec();
            spec.version = "  ".to_string();
            let err = spec.validate().expect_err("empty version");
            assert!(err.to_string().contains("version"));
        }

        /// TLS without a host is left to the values builder, which simply
        /// emits no TLS block
        #[test]
        fn story_console_tls_without_host_is_accepted() {
            let mut spec = sample_spec();
            spec.components.console.ingress.tls = true;
            spec.components.console.ingress.host = None;
            assert!(spec.validate().is_ok());
        }
    }

    #[test]
    fn test_crd_metadata() {
        let crd = Installation::crd();
        assert_eq!(
            crd.metadata.name.as_deref(),
            Some("installations.installer.theriseunion.io")
        );
        assert_eq!(crd.spec.scope, "Namespaced");
        assert_eq!(crd.spec.names.kind, "Installation");

        let version = &crd.spec.versions[0];
        assert_eq!(version.name, "v1alpha1");
        assert!(version
            .subresources
            .as_ref()
            .is_some_and(|s| s.status.is_some()));
        let columns: Vec<_> = version
            .additional_printer_columns
            .iter()
            .flatten()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(columns, vec!["Phase", "Version", "Age"]);
    }
}
