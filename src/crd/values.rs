//! Free-form chart values supplied on the Installation

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Chart values handed to the package installer
pub type Values = serde_json::Map<String, serde_json::Value>;

/// An unstructured mapping of chart values, stored verbatim by the API server.
///
/// Overrides are applied with [`OverrideValues::merge_into`]: every top-level
/// key replaces the derived value of the same key wholesale. Nested maps are
/// not merged, so overriding `image` drops every derived `image.*` field.
/// A payload that is not a mapping is ignored.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(transparent)]
pub struct OverrideValues(pub serde_json::Value);

impl OverrideValues {
    /// Top-level entries of the override, if it is a mapping
    pub fn as_map(&self) -> Option<&Values> {
        self.0.as_object()
    }

    /// Shallow-merge this override over `values`
    pub fn merge_into(&self, values: &mut Values) {
        match self.as_map() {
            Some(overrides) => {
                for (key, value) in overrides {
                    values.insert(key.clone(), value.clone());
                }
            }
            None => debug!(payload = %self.0, "ignoring non-mapping values override"),
        }
    }
}

impl From<serde_json::Value> for OverrideValues {
    fn from(value: serde_json::Value) -> Self {
        Self(value)
    }
}

impl JsonSchema for OverrideValues {
    fn schema_name() -> String {
        "OverrideValues".to_string()
    }

    fn json_schema(_gen: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
        let mut schema = schemars::schema::SchemaObject {
            instance_type: Some(schemars::schema::InstanceType::Object.into()),
            metadata: Some(Box::new(schemars::schema::Metadata {
                description: Some(
                    "Chart values merged over the derived values; top-level keys replace wholesale"
                        .to_string(),
                ),
                ..Default::default()
            })),
            ..Default::default()
        };
        schema.extensions.insert(
            "x-kubernetes-preserve-unknown-fields".to_string(),
            serde_json::Value::Bool(true),
        );
        schemars::schema::Schema::Object(schema)
    }
}
