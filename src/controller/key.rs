//! Installation identity

use kube::ResourceExt;

use crate::crd::Installation;
use crate::Error;

/// Identity of a namespaced object
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    /// Object namespace
    pub namespace: String,
    /// Object name
    pub name: String,
}

impl ObjectKey {
    /// Create a key
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Key of an Installation; fails if the object carries no namespace
    pub fn for_installation(installation: &Installation) -> Result<Self, Error> {
        let namespace = installation.namespace().ok_or_else(|| {
            Error::validation_for_field("metadata.namespace", "Installation must be namespaced")
        })?;
        Ok(Self::new(namespace, installation.name_any()))
    }
}

impl std::fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}
