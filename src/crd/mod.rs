//! Custom Resource Definitions for the Edge installer

mod installation;
mod types;
mod values;

pub use installation::{Installation, InstallationSpec, InstallationStatus};
pub use types::{
    ComponentSpec, ComponentStatus, ComponentStatuses, ComponentsSpec, Condition,
    ConditionStatus, ConditionType, ConsoleSpec, ControllerSpec, GrafanaSpec, ImageSpec,
    IngressSpec, InitializationSpec, InstallationPhase, MonitoringSpec, PrometheusSpec,
    ResourceRequirements,
};
pub use values::{OverrideValues, Values};
