// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Parallel dispatch of sync jobs.
//!
//! A fixed number of worker tasks pull descriptors off a shared queue and run
//! a sync job for each. Outcomes land in a shared mapping keyed by descriptor
//! name. Completion order is arbitrary, but the mapping always ends up with
//! exactly one outcome per input descriptor.
//!
//! A job's failure never affects its siblings. With an overall deadline,
//! descriptors still queued when it elapses are never started and receive a
//! failed outcome instead.

use crate::{
    config::RepoDescriptor,
    sync::{SyncError, SyncOutcome, SyncRunner},
};

use futures::future::join_all;
use indicatif::{ProgressBar, ProgressStyle};
use std::{
    collections::{HashMap, HashSet, VecDeque},
    fmt::{Display, Formatter, Result as FmtResult},
    num::NonZeroUsize,
    sync::{Arc, Mutex, PoisonError},
    time::{Duration, Instant},
};
use tracing::{debug, info, instrument, warn};

/// Bounded pool of sync workers.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    workers: NonZeroUsize,
    deadline: Option<Duration>,
    bar: ProgressBar,
}

impl Dispatcher {
    /// Construct new dispatcher with `workers` concurrent jobs at most.
    pub fn new(workers: NonZeroUsize) -> Self {
        Self {
            workers,
            deadline: None,
            bar: ProgressBar::hidden(),
        }
    }

    /// Stop starting new jobs once `deadline` has passed since dispatch.
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Report progress through given bar.
    pub fn with_progress(mut self, bar: ProgressBar) -> Self {
        if let Ok(style) = ProgressStyle::with_template(
            "{elapsed_precise:.green}  {msg:<40}  [{wide_bar:.yellow/blue}] {pos}/{len}",
        ) {
            bar.set_style(style.progress_chars("-Cco."));
        }
        self.bar = bar;
        self
    }

    /// Run sync job of every descriptor.
    ///
    /// # Errors
    ///
    /// - Return [`DispatchError::DuplicateName`] if two descriptors share a
    ///   name, before anything is started.
    #[instrument(skip(self, runner, descriptors), fields(workers = self.workers.get()))]
    pub async fn run<R>(&self, runner: Arc<R>, descriptors: Vec<RepoDescriptor>) -> Result<SyncReport>
    where
        R: SyncRunner,
    {
        let mut seen = HashSet::new();
        for descriptor in &descriptors {
            if !seen.insert(descriptor.name.as_str()) {
                return Err(DispatchError::DuplicateName(descriptor.name.clone()));
            }
        }

        let order: Vec<String> = descriptors.iter().map(|d| d.name.clone()).collect();
        let deadline = self.deadline.map(|deadline| Instant::now() + deadline);
        let workers = self.workers.get().min(descriptors.len().max(1));
        info!("dispatch {} repositories across {workers} worker(s)", order.len());

        self.bar.set_length(order.len() as u64);
        let queue = Arc::new(Mutex::new(VecDeque::from(descriptors)));
        let results = Arc::new(Mutex::new(HashMap::<String, SyncOutcome>::with_capacity(order.len())));

        let handles = (0..workers).map(|worker| {
            let queue = queue.clone();
            let results = results.clone();
            let runner = runner.clone();
            let bar = self.bar.clone();
            tokio::spawn(async move {
                loop {
                    // INVARIANT: Queue lock is released before the job starts.
                    let next = queue.lock().unwrap_or_else(PoisonError::into_inner).pop_front();
                    let Some(descriptor) = next else {
                        break;
                    };

                    let outcome = match deadline {
                        Some(deadline) if Instant::now() >= deadline => {
                            warn!("deadline elapsed, skip {}", descriptor.name);
                            SyncOutcome::not_run(&descriptor.name, &SyncError::NotStarted)
                        }
                        _ => {
                            debug!("worker {worker} picked {}", descriptor.name);
                            bar.set_message(descriptor.name.clone());
                            runner.sync(&descriptor, deadline).await
                        }
                    };

                    results
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .insert(descriptor.name, outcome);
                    bar.inc(1);
                }
            })
        });

        for joined in join_all(handles).await {
            if let Err(error) = joined {
                warn!("sync worker lost: {error}");
            }
        }
        self.bar.finish_and_clear();

        let mut outcomes = std::mem::take(&mut *results.lock().unwrap_or_else(PoisonError::into_inner));

        // INVARIANT: Exactly one outcome per descriptor, even if a worker died mid-job.
        for name in &order {
            outcomes.entry(name.clone()).or_insert_with(|| {
                let error = SyncError::Aborted("worker lost before reporting an outcome".into());
                SyncOutcome::not_run(name, &error)
            });
        }

        let report = SyncReport { order, outcomes };
        info!("dispatch finished: {}", report.summary());

        Ok(report)
    }
}

/// Outcomes of a dispatch run, keyed by descriptor name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    order: Vec<String>,
    outcomes: HashMap<String, SyncOutcome>,
}

impl SyncReport {
    pub fn get(&self, name: &str) -> Option<&SyncOutcome> {
        self.outcomes.get(name)
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Iterate outcomes in input order.
    pub fn iter(&self) -> impl Iterator<Item = &SyncOutcome> + '_ {
        self.order.iter().filter_map(|name| self.outcomes.get(name))
    }

    pub fn into_outcomes(self) -> HashMap<String, SyncOutcome> {
        self.outcomes
    }

    /// Summarize run into a verdict.
    pub fn summary(&self) -> RunSummary {
        let (succeeded, failed): (Vec<_>, Vec<_>) = self.iter().partition(|outcome| outcome.succeeded);
        let verdict = match (succeeded.len(), failed.len()) {
            (_, 0) => Verdict::Complete,
            (0, _) => Verdict::Failed,
            _ => Verdict::Partial,
        };

        RunSummary {
            verdict,
            succeeded: succeeded
                .into_iter()
                .map(|outcome| outcome.descriptor_name.clone())
                .collect(),
            failed: failed
                .into_iter()
                .map(|outcome| {
                    (
                        outcome.descriptor_name.clone(),
                        outcome.error.clone().unwrap_or_default(),
                    )
                })
                .collect(),
        }
    }
}

/// Overall verdict of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Every descriptor succeeded.
    Complete,

    /// Some descriptors failed.
    Partial,

    /// Every descriptor failed.
    Failed,
}

/// Summary of a dispatch run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub verdict: Verdict,
    pub succeeded: Vec<String>,

    /// Failed descriptor names with their error.
    pub failed: Vec<(String, String)>,
}

impl RunSummary {
    pub fn is_complete(&self) -> bool {
        self.verdict == Verdict::Complete
    }
}

impl Display for RunSummary {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        let total = self.succeeded.len() + self.failed.len();
        match self.verdict {
            Verdict::Complete => write!(fmt, "complete, {total}/{total} synchronized"),
            Verdict::Failed => write!(fmt, "failed, 0/{total} synchronized"),
            Verdict::Partial => {
                let names: Vec<_> = self.failed.iter().map(|(name, _)| name.as_str()).collect();
                write!(
                    fmt,
                    "partial, {}/{total} synchronized, failed: {}",
                    self.succeeded.len(),
                    names.join(", ")
                )
            }
        }
    }
}

/// Dispatch error types.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// Outcomes are keyed by name, so names must be unique.
    #[error("repository {0:?} is listed more than once")]
    DuplicateName(String),
}

/// Friendly result alias :3
pub type Result<T, E = DispatchError> = std::result::Result<T, E>;
