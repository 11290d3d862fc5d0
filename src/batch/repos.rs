// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Batch creation of repositories.
//!
//! Create the remote repository and local directory of every descriptor as a
//! single batch. Each step remembers what it actually created, and its
//! compensation only removes that. Repositories or directories that existed
//! beforehand are never touched by a rollback.

use crate::{
    batch::{action, Batch, BatchPolicy, BatchReport, BatchStep, Result},
    config::RepoDescriptor,
    events::{EventEmitter, EventKind, Metadata},
    github::{CreateRepo, RemoteHost},
};

use anyhow::{bail, Context};
use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use tracing::{info, instrument};

/// Batch of remote repository creations.
#[derive(Debug)]
pub struct RepoBatch<H>
where
    H: RemoteHost,
{
    host: Arc<H>,
    user: Option<String>,
    owner: Option<String>,
    workdir: PathBuf,
    policy: BatchPolicy,
    events: Option<Arc<EventEmitter>>,
}

impl<H> RepoBatch<H>
where
    H: RemoteHost,
{
    /// Construct new repository batch.
    pub fn new(host: Arc<H>, user: Option<String>, workdir: impl Into<PathBuf>, policy: BatchPolicy) -> Self {
        Self {
            host,
            user,
            owner: None,
            workdir: workdir.into(),
            policy,
            events: None,
        }
    }

    /// Create repositories without an owner under `owner` instead of user.
    pub fn with_default_owner(mut self, owner: Option<String>) -> Self {
        self.owner = owner;
        self
    }

    /// Emit batch events into given emitter.
    pub fn with_events(mut self, events: Arc<EventEmitter>) -> Self {
        self.events = Some(events);
        self
    }

    /// Build batch with one creation step per descriptor.
    ///
    /// # Errors
    ///
    /// - Return [`BatchError::Validation`](crate::batch::BatchError::Validation)
    ///   if a descriptor has no owner.
    /// - Return [`BatchError::DuplicateId`](crate::batch::BatchError::DuplicateId)
    ///   if two descriptors share a name.
    pub fn build(&self, descriptors: &[RepoDescriptor]) -> Result<Batch> {
        let mut batch = Batch::new(self.policy);
        for descriptor in descriptors {
            let owner = descriptor
                .owner_or(self.owner.as_deref().or(self.user.as_deref()))?.to_string();
            let path = descriptor.resolve_local_path(&self.workdir);
            let effects = Arc::new(Effects::default());

            let forward = {
                let host = self.host.clone();
                let effects = effects.clone();
                let request = CreateRepo {
                    owner: owner.clone(),
                    name: descriptor.name.clone(),
                    description: descriptor.description.clone().unwrap_or_default(),
                    private: descriptor.private,
                    auto_init: false,
                };
                let path = path.clone();
                action(move || async move {
                    match host.find_repo(&request.owner, &request.name).await? {
                        Some(remote) if remote.private != request.private => bail!(
                            "{}/{} exists with private={}, manifest wants private={}",
                            request.owner,
                            request.name,
                            remote.private,
                            request.private
                        ),
                        Some(_) => info!("keep remote {}/{}", request.owner, request.name),
                        None => {
                            host.create_repo(&request).await?;
                            effects.remote.store(true, Ordering::SeqCst);
                        }
                    }

                    if !path.exists() {
                        if let Err(err) = tokio::fs::create_dir_all(&path).await {
                            // INVARIANT: A failed step leaves no remote behind.
                            if effects.remote.swap(false, Ordering::SeqCst) {
                                host.delete_repo(&request.owner, &request.name)
                                    .await
                                    .with_context(|| {
                                        format!("failed to delete {}/{} after {err}", request.owner, request.name)
                                    })?;
                            }
                            return Err(anyhow::Error::from(err)
                                .context(format!("failed to create {}", path.display())));
                        }
                        effects.local.store(true, Ordering::SeqCst);
                    }

                    Ok::<(), anyhow::Error>(())
                })
            };

            let compensate = {
                let host = self.host.clone();
                let name = descriptor.name.clone();
                action(move || async move {
                    let mut failures = Vec::new();
                    if effects.local.load(Ordering::SeqCst) {
                        if let Err(err) = tokio::fs::remove_dir_all(&path).await {
                            failures.push(format!("remove {}: {err}", path.display()));
                        }
                    }
                    if effects.remote.load(Ordering::SeqCst) {
                        if let Err(err) = host.delete_repo(&owner, &name).await {
                            failures.push(format!("delete {owner}/{name}: {err}"));
                        }
                    }

                    // INVARIANT: Every removal is attempted even when an earlier one fails.
                    if !failures.is_empty() {
                        bail!("{}", failures.join("; "));
                    }

                    Ok::<(), anyhow::Error>(())
                })
            };

            batch.push(BatchStep::new(&descriptor.name, forward).compensate_with(compensate))?;
        }

        Ok(batch)
    }

    /// Build and execute batch over `descriptors`.
    ///
    /// # Errors
    ///
    /// - Return [`BatchError`](crate::batch::BatchError) if the batch cannot
    ///   be built. Execution failures are reported through [`BatchReport`].
    #[instrument(skip(self, descriptors), fields(repos = descriptors.len()))]
    pub async fn create_all(&self, descriptors: &[RepoDescriptor]) -> Result<BatchReport> {
        let report = self.build(descriptors)?.execute().await;

        if report.succeeded() {
            if let Some(events) = &self.events {
                let subject = self
                    .user
                    .as_deref()
                    .or_else(|| descriptors.iter().find_map(|d| d.owner.as_deref()))
                    .unwrap_or_default();
                events.emit(
                    EventKind::BatchOperationSuccess,
                    subject,
                    None,
                    Metadata::from([("repos".into(), (descriptors.len() as i64).into())]),
                );
            }
        }

        Ok(report)
    }
}

// What a step created, and therefore what its rollback may remove.
#[derive(Debug, Default)]
struct Effects {
    remote: AtomicBool,
    local: AtomicBool,
}
