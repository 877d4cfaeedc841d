//! Phase orchestrator
//!
//! Runs the installation phases in a fixed order against one Installation.
//! Around every phase the status is re-read and written twice: once to
//! record that the phase started, once to record its condition. The first
//! failing phase ends the run; nothing is rolled back, and the next run
//! starts again from the first phase relying on each phase being idempotent.

use tracing::{info, instrument, warn};

use super::context::Context;
use super::key::ObjectKey;
use super::status::update_status;
use crate::components::install_enabled;
use crate::crd::{Condition, ConditionStatus, ConditionType, Installation, InstallationPhase};
use crate::phases::{plan_initialization, validate_installation};
use crate::Error;

/// Condition reason recorded when a phase succeeds
pub const REASON_SUCCEEDED: &str = "ExecutionSucceeded";

/// Condition reason recorded when a phase fails
pub const REASON_FAILED: &str = "ExecutionFailed";

/// One stage of an installation run
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Cluster can host the platform
    Prerequisites,
    /// Bundled CRDs applied
    Crds,
    /// Component releases installed or upgraded
    Components,
    /// Initialization settings checked
    Initialization,
    /// Components ready
    Validation,
}

impl Phase {
    /// Execution order
    pub const ORDER: [Phase; 5] = [
        Phase::Prerequisites,
        Phase::Crds,
        Phase::Components,
        Phase::Initialization,
        Phase::Validation,
    ];

    /// Display name, used in progress notes and error messages
    pub fn name(&self) -> &'static str {
        match self {
            Self::Prerequisites => "Prerequisites Check",
            Self::Crds => "CRD Installation",
            Self::Components => "Component Installation",
            Self::Initialization => "Cluster Initialization",
            Self::Validation => "Installation Validation",
        }
    }

    /// Status phase while this stage runs
    pub fn label(&self) -> InstallationPhase {
        match self {
            Self::Prerequisites => InstallationPhase::PrerequisitesChecking,
            Self::Crds | Self::Components => InstallationPhase::Installing,
            Self::Initialization => InstallationPhase::Initializing,
            Self::Validation => InstallationPhase::Validating,
        }
    }

    /// Condition recording this stage's outcome
    pub fn condition(&self) -> ConditionType {
        match self {
            Self::Prerequisites => ConditionType::PrerequisitesChecked,
            Self::Crds => ConditionType::CrdsInstalled,
            Self::Components => ConditionType::ComponentsInstalled,
            Self::Initialization => ConditionType::InitializationComplete,
            Self::Validation => ConditionType::Ready,
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// How a run ended when no phase failed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every phase succeeded
    Completed,
    /// The Installation disappeared mid-run; nothing more was written
    Deleted,
}

/// Executes [`Phase::ORDER`] for one Installation
pub struct Orchestrator<'a> {
    ctx: &'a Context,
}

impl<'a> Orchestrator<'a> {
    /// Create an orchestrator using the context's collaborators
    pub fn new(ctx: &'a Context) -> Self {
        Self { ctx }
    }

    /// Run every phase in order, stopping at the first failure.
    ///
    /// A failure is returned as [`Error::Phase`] after the phase's condition
    /// has been set to False.
    #[instrument(skip(self, key), fields(installation = %key))]
    pub async fn run(&self, key: &ObjectKey) -> Result<RunOutcome, Error> {
        info!("starting installation run");

        for phase in Phase::ORDER {
            if self.run_phase(key, phase).await? == RunOutcome::Deleted {
                info!(phase = %phase, "installation deleted, stopping run");
                return Ok(RunOutcome::Deleted);
            }
        }

        info!("installation run completed");
        Ok(RunOutcome::Completed)
    }

    async fn run_phase(&self, key: &ObjectKey, phase: Phase) -> Result<RunOutcome, Error> {
        let api = self.ctx.installations.as_ref();
        let note = format!("Running {}", phase.name());

        let Some(mut current) = update_status(api, &key.namespace, &key.name, |status| {
            status.enter(phase.label(), note)
        })
        .await?
        else {
            return Ok(RunOutcome::Deleted);
        };

        info!(phase = %phase, "phase started");
        let result = self.execute(phase, &mut current).await;

        let condition = match &result {
            Ok(()) => Condition::new(
                phase.condition(),
                ConditionStatus::True,
                REASON_SUCCEEDED,
                format!("{} completed successfully", phase.name()),
            ),
            Err(e) => Condition::new(
                phase.condition(),
                ConditionStatus::False,
                REASON_FAILED,
                e.to_string(),
            ),
        };
        // Component statuses recorded during the phase, including partial
        // progress when a later component failed
        let components = (phase == Phase::Components)
            .then(|| current.status.map(|s| s.components).unwrap_or_default());

        let committed = update_status(api, &key.namespace, &key.name, move |status| {
            status.set_condition(condition);
            if let Some(components) = components {
                status.components = components;
            }
        })
        .await;

        match (result, committed) {
            (Err(e), committed) => {
                if let Err(write) = committed {
                    warn!(phase = %phase, error = %write, "failed to record phase failure");
                }
                warn!(phase = %phase, error = %e, "phase failed");
                Err(Error::phase(phase.name(), e))
            }
            (Ok(()), Err(write)) => Err(write),
            (Ok(()), Ok(None)) => Ok(RunOutcome::Deleted),
            (Ok(()), Ok(Some(_))) => {
                info!(phase = %phase, "phase completed");
                Ok(RunOutcome::Completed)
            }
        }
    }

    async fn execute(&self, phase: Phase, current: &mut Installation) -> Result<(), Error> {
        let ctx = self.ctx;
        match phase {
            Phase::Prerequisites => {
                current.spec.validate()?;
                ctx.prerequisites.check().await
            }
            Phase::Crds => {
                let count = ctx.manifests.install_crds().await?;
                info!(count, "CRDs applied");
                Ok(())
            }
            Phase::Components => {
                let installed =
                    install_enabled(ctx.packages.as_ref(), &ctx.settings, current).await?;
                info!(count = installed.len(), "components installed");
                Ok(())
            }
            Phase::Initialization => {
                plan_initialization(&current.spec.initialization);
                Ok(())
            }
            Phase::Validation => {
                validate_installation(ctx.readiness.as_ref(), &current.spec, &ctx.settings).await
            }
        }
    }
}
