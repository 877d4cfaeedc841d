//! Process settings
//!
//! Resolved once at startup from flags and environment, then shared by
//! reference through the controller context.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::DEFAULT_CHARTS_DIR;

/// Subdirectory of the charts directory holding the bundled CRDs
pub const CRDS_SUBDIR: &str = "crds";

/// Default interval between readiness checks
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Default time a deployment may take to become ready
pub const DEFAULT_READINESS_TIMEOUT: Duration = Duration::from_secs(300);

/// Installer settings shared by every reconcile
#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    /// Directory containing one chart per component
    pub charts_dir: PathBuf,
    /// Directory containing the CRD manifests to apply
    pub crds_dir: PathBuf,
    /// Helm executable
    pub helm_bin: PathBuf,
    /// Interval between readiness checks
    pub poll_interval: Duration,
    /// Time a deployment may take to become ready
    pub readiness_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self::new(DEFAULT_CHARTS_DIR)
    }
}

impl Settings {
    /// Settings rooted at a charts directory, CRDs in its `crds` subdirectory
    pub fn new(charts_dir: impl Into<PathBuf>) -> Self {
        let charts_dir = charts_dir.into();
        Self {
            crds_dir: charts_dir.join(CRDS_SUBDIR),
            charts_dir,
            helm_bin: PathBuf::from("helm"),
            poll_interval: DEFAULT_POLL_INTERVAL,
            readiness_timeout: DEFAULT_READINESS_TIMEOUT,
        }
    }

    /// Use a CRD directory outside the charts directory
    pub fn with_crds_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.crds_dir = dir.into();
        self
    }

    /// Use a specific helm executable
    pub fn with_helm_bin(mut self, bin: impl Into<PathBuf>) -> Self {
        self.helm_bin = bin.into();
        self
    }

    /// Override readiness polling
    pub fn with_readiness(mut self, poll_interval: Duration, timeout: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.readiness_timeout = timeout;
        self
    }

    /// Path of a chart inside the charts directory
    pub fn chart_path(&self, chart: &str) -> PathBuf {
        self.charts_dir.join(chart)
    }

    /// Directory holding the CRD manifests
    pub fn crds_dir(&self) -> &Path {
        &self.crds_dir
    }
}
