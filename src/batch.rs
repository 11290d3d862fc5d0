// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Batch operations with rollback.
//!
//! A __batch__ is an ordered list of steps. Each step pairs a forward action
//! with an optional compensating action that undoes it. Forward actions run
//! strictly in list order. When one of them fails, the compensating actions
//! of every step that already succeeded run in reverse order.
//!
//! # Execution Policies
//!
//! - [`BatchPolicy::StopOnError`]: halt forward execution at the first
//!   failure, then roll back. Steps after the failing one are never invoked
//!   and stay pending.
//! - [`BatchPolicy::ContinueOnError`]: attempt every forward action. If any
//!   of them failed, roll back every step that succeeded, including those
//!   after the first failure.
//!
//! Rollback is best-effort. A compensating action that fails is recorded,
//! and the sweep carries on with the remaining ones.
//!
//! # Step Status
//!
//! Status only ever moves forward: `pending -> done -> rolled_back`, or
//! `pending -> failed`. A step whose compensation failed stays `done`.

pub mod repos;

use crate::config::ValidationError;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashSet,
    fmt::{Display, Formatter, Result as FmtResult},
    future::Future,
    time::{Duration, Instant},
};
use tracing::{error, info, instrument, warn};

/// Zero-argument asynchronous action.
pub type Action = Box<dyn FnOnce() -> BoxFuture<'static, anyhow::Result<()>> + Send>;

/// Box an async closure into an [`Action`].
pub fn action<F, Fut>(f: F) -> Action
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Box::new(move || Box::pin(f()))
}

/// Execution policy of a batch.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchPolicy {
    #[default]
    StopOnError,
    ContinueOnError,
}

/// Status of a batch step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Pending,
    Done,
    Failed,
    RolledBack,
}

impl Display for StepStatus {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(match self {
            Self::Pending => "pending",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::RolledBack => "rolled back",
        })
    }
}

/// Single step of a batch.
pub struct BatchStep {
    id: String,
    forward: Action,
    compensate: Option<Action>,
}

impl BatchStep {
    /// Construct new step without compensating action.
    pub fn new(id: impl Into<String>, forward: Action) -> Self {
        Self {
            id: id.into(),
            forward,
            compensate: None,
        }
    }

    /// Undo forward action with given action during rollback.
    pub fn compensate_with(mut self, compensate: Action) -> Self {
        self.compensate = Some(compensate);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl std::fmt::Debug for BatchStep {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.debug_struct("BatchStep")
            .field("id", &self.id)
            .field("compensate", &self.compensate.is_some())
            .finish()
    }
}

/// Ordered batch of steps.
#[derive(Debug, Default)]
pub struct Batch {
    policy: BatchPolicy,
    steps: Vec<BatchStep>,
    ids: HashSet<String>,
}

impl Batch {
    /// Construct new empty batch.
    pub fn new(policy: BatchPolicy) -> Self {
        Self {
            policy,
            ..Default::default()
        }
    }

    /// Append step to batch.
    ///
    /// # Errors
    ///
    /// - Return [`BatchError::DuplicateId`] if a step with the same id was
    ///   already added.
    pub fn push(&mut self, step: BatchStep) -> Result<()> {
        if !self.ids.insert(step.id.clone()) {
            return Err(BatchError::DuplicateId(step.id));
        }
        self.steps.push(step);

        Ok(())
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Execute every step according to the batch's policy.
    ///
    /// Never fails as a whole. Failures of forward and compensating actions
    /// are reported through [`BatchReport`].
    #[instrument(skip(self), fields(steps = self.steps.len(), policy = ?self.policy))]
    pub async fn execute(self) -> BatchReport {
        let start = Instant::now();
        info!("execute batch of {} steps", self.steps.len());

        let mut reports = Vec::with_capacity(self.steps.len());
        let mut compensations = Vec::with_capacity(self.steps.len());
        let mut failures = Vec::new();

        let mut steps = self.steps.into_iter();
        for (index, step) in steps.by_ref().enumerate() {
            info!("execute step {}", step.id);
            let mut report = StepReport::new(&step.id);
            match (step.forward)().await {
                Ok(()) => {
                    report.status = StepStatus::Done;
                    compensations.push((index, step.compensate));
                }
                Err(err) => {
                    error!("step {} failed: {err:#}", step.id);
                    report.status = StepStatus::Failed;
                    failures.push(StepFailure {
                        id: step.id.clone(),
                        message: format!("{err:#}"),
                    });
                }
            }
            reports.push(report);

            if !failures.is_empty() && self.policy == BatchPolicy::StopOnError {
                warn!("stop batch execution due to failure");
                break;
            }
        }

        // INVARIANT: Steps never started are pending and never rolled back.
        reports.extend(steps.map(|step| StepReport::new(&step.id)));

        let mut rollback_order = Vec::new();
        let mut rollback_failures = Vec::new();
        if !failures.is_empty() {
            warn!("roll back {} completed steps", compensations.len());
            for (index, compensate) in compensations.into_iter().rev() {
                let report = &mut reports[index];
                rollback_order.push(report.id.clone());
                let Some(compensate) = compensate else {
                    report.status = StepStatus::RolledBack;
                    continue;
                };

                info!("roll back step {}", report.id);
                match compensate().await {
                    Ok(()) => report.status = StepStatus::RolledBack,
                    Err(err) => {
                        error!("rollback of step {} failed: {err:#}", report.id);
                        rollback_failures.push(RollbackFailure {
                            id: report.id.clone(),
                            message: format!("{err:#}"),
                        });
                    }
                }
            }
        }

        let report = BatchReport {
            policy: self.policy,
            steps: reports,
            failures,
            rollback_order,
            rollback_failures,
            elapsed: start.elapsed(),
        };
        info!("batch complete: {report}");
        report
    }
}

/// Outcome of a single step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReport {
    pub id: String,
    pub status: StepStatus,
}

impl StepReport {
    fn new(id: &str) -> Self {
        Self {
            id: id.into(),
            status: StepStatus::Pending,
        }
    }
}

/// Forward action failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepFailure {
    pub id: String,
    pub message: String,
}

/// Compensating action failure. Recorded, never propagated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollbackFailure {
    pub id: String,
    pub message: String,
}

/// Outcome of a batch.
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub policy: BatchPolicy,

    /// Status of every step, in batch order.
    pub steps: Vec<StepReport>,

    /// Forward failures, in order of occurrence.
    pub failures: Vec<StepFailure>,

    /// Steps whose compensation was invoked, in order of invocation.
    pub rollback_order: Vec<String>,

    pub rollback_failures: Vec<RollbackFailure>,
    pub elapsed: Duration,
}

impl BatchReport {
    /// Whether every forward action succeeded.
    pub fn succeeded(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn statuses(&self) -> Vec<StepStatus> {
        self.steps.iter().map(|step| step.status).collect()
    }

    pub fn status_of(&self, id: &str) -> Option<StepStatus> {
        self.steps
            .iter()
            .find(|step| step.id == id)
            .map(|step| step.status)
    }
}

impl Display for BatchReport {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        let done = self
            .steps
            .iter()
            .filter(|step| step.status == StepStatus::Done)
            .count();
        let rolled_back = self
            .steps
            .iter()
            .filter(|step| step.status == StepStatus::RolledBack)
            .count();

        write!(
            fmt,
            "{done}/{} done, {} failed, {rolled_back} rolled back, {} rollback failures in {:.2?}",
            self.steps.len(),
            self.failures.len(),
            self.rollback_failures.len(),
            self.elapsed,
        )
    }
}

/// Batch construction errors.
#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    /// Step ids must be unique within a batch.
    #[error("batch already contains a step named {0:?}")]
    DuplicateId(String),

    /// Step cannot be built from its descriptor.
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Friendly result alias :3
pub type Result<T, E = BatchError> = std::result::Result<T, E>;
