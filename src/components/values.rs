//! Helm values assembly
//!
//! Values start empty, gain the fields derived from the typed spec (absent
//! or empty fields are left out), and finally take the free-form override on
//! top, one top-level key at a time.

use serde_json::{json, Map, Value};

use super::Component;
use crate::crd::{
    ComponentSpec, ConsoleSpec, ControllerSpec, InitializationSpec, InstallationSpec,
    MonitoringSpec, Values,
};

/// Secret holding the console's TLS certificate
pub const CONSOLE_TLS_SECRET: &str = "edge-console-tls";

/// Prometheus retention used when none is configured
pub const DEFAULT_PROMETHEUS_RETENTION: &str = "15d";

/// Build the chart values for a component
pub fn build_values(component: Component, spec: &InstallationSpec) -> Values {
    match component {
        Component::Controller => {
            controller_values(&spec.components.controller, &spec.initialization)
        }
        Component::ApiServer => {
            let apiserver = &spec.components.apiserver;
            with_overrides(common_values(apiserver), apiserver)
        }
        Component::Console => console_values(&spec.components.console),
        Component::Monitoring => monitoring_values(&spec.components.monitoring),
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

fn with_overrides(mut values: Values, spec: &ComponentSpec) -> Values {
    if let Some(overrides) = &spec.values {
        overrides.merge_into(&mut values);
    }
    values
}

/// Replica count, image and resources shared by every chart
fn common_values(spec: &ComponentSpec) -> Values {
    let mut values = Values::new();

    if let Some(replicas) = spec.replicas {
        values.insert("replicaCount".into(), json!(replicas));
    }

    // Tag and pull policy only mean something next to a repository
    if let Some(repository) = non_empty(&spec.image.repository) {
        let mut image = Map::new();
        image.insert("repository".into(), json!(repository));
        if let Some(tag) = non_empty(&spec.image.tag) {
            image.insert("tag".into(), json!(tag));
        }
        if let Some(pull_policy) = non_empty(&spec.image.pull_policy) {
            image.insert("pullPolicy".into(), json!(pull_policy));
        }
        values.insert("image".into(), Value::Object(image));
    }

    if !spec.resources.is_empty() {
        let mut resources = Map::new();
        if !spec.resources.limits.is_empty() {
            resources.insert("limits".into(), json!(spec.resources.limits));
        }
        if !spec.resources.requests.is_empty() {
            resources.insert("requests".into(), json!(spec.resources.requests));
        }
        values.insert("resources".into(), Value::Object(resources));
    }

    values
}

fn controller_values(spec: &ControllerSpec, init: &InitializationSpec) -> Values {
    let mut values = common_values(&spec.component);

    if spec.enable_init {
        values.insert("enableInit".into(), json!(true));

        if init.enabled {
            let mut initialization = Map::new();
            if let Some(cluster_name) = non_empty(&init.cluster_name) {
                initialization.insert("clusterName".into(), json!(cluster_name));
            }
            if let Some(workspace) = non_empty(&init.system_workspace) {
                initialization.insert("systemWorkspace".into(), json!(workspace));
            }
            if !init.system_namespaces.is_empty() {
                initialization.insert("systemNamespaces".into(), json!(init.system_namespaces));
            }
            values.insert("initialization".into(), Value::Object(initialization));
        }
    }

    with_overrides(values, &spec.component)
}

fn console_values(spec: &ConsoleSpec) -> Values {
    let mut values = common_values(&spec.component);

    if spec.ingress.enabled {
        let mut ingress = Map::new();
        ingress.insert("enabled".into(), json!(true));

        if let Some(host) = non_empty(&spec.ingress.host) {
            ingress.insert(
                "hosts".into(),
                json!([{"host": host, "paths": [{"path": "/", "pathType": "Prefix"}]}]),
            );
            if spec.ingress.tls {
                ingress.insert(
                    "tls".into(),
                    json!([{"secretName": CONSOLE_TLS_SECRET, "hosts": [host]}]),
                );
            }
        }

        values.insert("ingress".into(), Value::Object(ingress));
    }

    with_overrides(values, &spec.component)
}

fn monitoring_values(spec: &MonitoringSpec) -> Values {
    let mut values = Values::new();

    if spec.prometheus.enabled {
        let retention =
            non_empty(&spec.prometheus.retention).unwrap_or(DEFAULT_PROMETHEUS_RETENTION);
        values.insert(
            "prometheus".into(),
            json!({"enabled": true, "retention": retention}),
        );
    }
    if spec.grafana.enabled {
        values.insert("grafana".into(), json!({"enabled": true}));
    }

    values
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{ImageSpec, OverrideValues, ResourceRequirements};
    use std::collections::BTreeMap;

    fn spec() -> InstallationSpec {
        InstallationSpec {
            version: "v1.2.0".to_string(),
            components: Default::default(),
            initialization: Default::default(),
        }
    }

    // =========================================================================
    // Merge order
    // =========================================================================

    /// Override keys replace derived keys wholesale; untouched keys survive
    #[test]
    fn story_override_wins_over_derived_values() {
        let mut spec = spec();
        spec.components.apiserver = ComponentSpec {
            enabled: true,
            replicas: Some(3),
            image: ImageSpec {
                repository: Some("x/apiserver".to_string()),
                ..Default::default()
            },
            values: Some(OverrideValues(json!({"replicaCount": 5, "extra": "v"}))),
            ..Default::default()
        };

        let values = build_values(Component::ApiServer, &spec);

        assert_eq!(values["replicaCount"], json!(5));
        assert_eq!(values["image"]["repository"], json!("x/apiserver"));
        assert_eq!(values["extra"], json!("v"));
    }

    #[test]
    fn story_absent_fields_are_omitted() {
        let mut spec = spec();
        spec.components.apiserver = ComponentSpec {
            enabled: true,
            image: ImageSpec {
                repository: Some("x/apiserver".to_string()),
                tag: Some("v1.2.0".to_string()),
                pull_policy: Some(String::new()),
            },
            ..Default::default()
        };

        let values = build_values(Component::ApiServer, &spec);

        assert!(values.get("replicaCount").is_none());
        assert!(values.get("resources").is_none());
        assert_eq!(
            values["image"],
            json!({"repository": "x/apiserver", "tag": "v1.2.0"})
        );
    }

    /// Without a repository the chart keeps its own image entirely
    #[test]
    fn story_image_without_repository_is_dropped() {
        let mut spec = spec();
        spec.components.apiserver.image = ImageSpec {
            repository: None,
            tag: Some("v9".to_string()),
            pull_policy: Some("Always".to_string()),
        };
        assert!(build_values(Component::ApiServer, &spec).is_empty());

        spec.components.apiserver.image.repository = Some(String::new());
        assert!(build_values(Component::ApiServer, &spec).get("image").is_none());
    }

    #[test]
    fn story_malformed_override_falls_back_to_derived_values() {
        let mut spec = spec();
        spec.components.apiserver.replicas = Some(2);
        spec.components.apiserver.values = Some(OverrideValues(json!(["not", "a", "map"])));

        let values = build_values(Component::ApiServer, &spec);
        assert_eq!(values.len(), 1);
        assert_eq!(values["replicaCount"], json!(2));
    }

    #[test]
    fn test_resources_only_include_set_sections() {
        let mut spec = spec();
        spec.components.apiserver.resources = ResourceRequirements {
            limits: BTreeMap::from([("memory".to_string(), "512Mi".to_string())]),
            requests: BTreeMap::new(),
        };

        let values = build_values(Component::ApiServer, &spec);
        assert_eq!(values["resources"], json!({"limits": {"memory": "512Mi"}}));
    }

    // =========================================================================
    // Component-specific values
    // =========================================================================

    #[test]
    fn story_controller_carries_initialization_settings() {
        let mut spec = spec();
        spec.components.controller.enable_init = true;
        spec.initialization = InitializationSpec {
            enabled: true,
            cluster_name: Some("host".to_string()),
            system_workspace: None,
            system_namespaces: vec!["kube-system".to_string(), "edge-system".to_string()],
        };

        let values = build_values(Component::Controller, &spec);

        assert_eq!(values["enableInit"], json!(true));
        assert_eq!(
            values["initialization"],
            json!({"clusterName": "host", "systemNamespaces": ["kube-system", "edge-system"]})
        );
    }

    #[test]
    fn story_controller_without_init_has_no_init_values() {
        let mut spec = spec();
        spec.initialization.enabled = true;

        let values = build_values(Component::Controller, &spec);
        assert!(values.get("enableInit").is_none());
        assert!(values.get("initialization").is_none());
    }

    #[test]
    fn story_console_ingress_with_tls() {
        let mut spec = spec();
        spec.components.console.ingress.enabled = true;
        spec.components.console.ingress.host = Some("console.edge.local".to_string());
        spec.components.console.ingress.tls = true;

        let values = build_values(Component::Console, &spec);

        assert_eq!(
            values["ingress"],
            json!({
                "enabled": true,
                "hosts": [{
                    "host": "console.edge.local",
                    "paths": [{"path": "/", "pathType": "Prefix"}]
                }],
                "tls": [{"secretName": "edge-console-tls", "hosts": ["console.edge.local"]}]
            })
        );
    }

    #[test]
    fn story_console_ingress_disabled_emits_nothing() {
        let mut spec = spec();
        spec.components.console.ingress.host = Some("console.edge.local".to_string());

        let values = build_values(Component::Console, &spec);
        assert!(values.get("ingress").is_none());
    }

    #[test]
    fn story_monitoring_defaults_retention_and_ignores_overrides() {
        let mut spec = spec();
        spec.components.monitoring.enabled = true;
        spec.components.monitoring.prometheus.enabled = true;
        spec.components.monitoring.grafana.enabled = true;

        let values = build_values(Component::Monitoring, &spec);

        assert_eq!(
            values["prometheus"],
            json!({"enabled": true, "retention": "15d"})
        );
        assert_eq!(values["grafana"], json!({"enabled": true}));

        spec.components.monitoring.prometheus.retention = Some("30d".to_string());
        spec.components.monitoring.grafana.enabled = false;
        let values = build_values(Component::Monitoring, &spec);
        assert_eq!(values["prometheus"]["retention"], json!("30d"));
        assert!(values.get("grafana").is_none());
    }
}
