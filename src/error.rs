//! Error types for the Edge installer
//!
//! Errors carry structured fields (release names, deployments, manifest
//! paths) so that the message persisted on the Installation status is enough
//! to diagnose a failed run without reading operator logs.

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for installer operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Invalid or incomplete declaration, or an unmet cluster prerequisite
    #[error("validation error: {message}")]
    Validation {
        /// Description of what's invalid
        message: String,
        /// The offending field path (e.g., "spec.components.console.host")
        field: Option<String>,
    },

    /// Package manager (helm) failure
    #[error("helm error [{release}]: {message}")]
    Helm {
        /// Release the operation targeted
        release: String,
        /// Description of what failed, usually helm's stderr
        message: String,
    },

    /// A workload did not become ready in time
    #[error("readiness error for {namespace}/{name}: {message}")]
    Readiness {
        /// Namespace of the workload
        namespace: String,
        /// Deployment name
        name: String,
        /// Description of what was not ready
        message: String,
    },

    /// Failure reading or applying a bundled manifest
    #[error("manifest error [{path}]: {message}")]
    Manifest {
        /// Path of the manifest file
        path: String,
        /// Description of what failed
        message: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// The resource kind being serialized (if known)
        kind: Option<String>,
    },

    /// A component failed to install
    #[error("{component} installation failed: {source}")]
    Component {
        /// Component name (controller, apiserver, console, monitoring)
        component: String,
        /// The underlying failure
        #[source]
        source: Box<Error>,
    },

    /// An orchestration phase failed
    #[error("phase {phase} failed: {source}")]
    Phase {
        /// Display name of the phase
        phase: String,
        /// The underlying failure
        #[source]
        source: Box<Error>,
    },

    /// Internal error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Where the error occurred
        context: String,
    },
}

impl Error {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
            field: None,
        }
    }

    /// Create a validation error for a specific field
    pub fn validation_for_field(field: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// Create a helm error for a release
    pub fn helm(release: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Helm {
            release: release.into(),
            message: msg.into(),
        }
    }

    /// Create a readiness error for a deployment
    pub fn readiness(
        namespace: impl Into<String>,
        name: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Readiness {
            namespace: namespace.into(),
            name: name.into(),
            message: msg.into(),
        }
    }

    /// Create a manifest error for a file
    pub fn manifest(path: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Manifest {
            path: path.into(),
            message: msg.into(),
        }
    }

    /// Create a serialization error for a specific resource kind
    pub fn serialization_for_kind(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: Some(kind.into()),
        }
    }

    /// Wrap a failure with the component it happened in
    pub fn component(component: impl Into<String>, source: Error) -> Self {
        Self::Component {
            component: component.into(),
            source: Box::new(source),
        }
    }

    /// Wrap a failure with the phase it happened in
    pub fn phase(phase: impl Into<String>, source: Error) -> Self {
        Self::Phase {
            phase: phase.into(),
            source: Box::new(source),
        }
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: UNKNOWN_CONTEXT.to_string(),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Check if this error is retryable
    ///
    /// Validation, manifest and serialization errors need a fix to the
    /// declaration or the bundle. Conflicts are retryable since a fresh read
    /// resolves them.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => match source {
                kube::Error::Api(ae) if ae.code == 409 => true,
                kube::Error::Api(ae) => !(400..500).contains(&ae.code),
                _ => true,
            },
            Error::Validation { .. } => false,
            Error::Helm { .. } => true,
            Error::Readiness { .. } => true,
            Error::Manifest { .. } => false,
            Error::Serialization { .. } => false,
            Error::Component { source, .. } | Error::Phase { source, .. } => source.is_retryable(),
            Error::Internal { .. } => true,
        }
    }

    /// True when a write lost an optimistic concurrency race
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Kube { source: kube::Error::Api(ae) } if ae.code == 409)
    }
}
