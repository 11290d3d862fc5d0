// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Repository synchronization.
//!
//! A __sync job__ takes one [`RepoDescriptor`] through a fixed sequence of
//! stages:
//!
//! ```text
//! NotStarted -> RemoteEnsured -> LocalInitialized -> TemplateApplied
//!            -> Scaffolded -> Pushed
//! ```
//!
//! The first stage that fails ends the job in `Failed(stage)`. Earlier stages
//! are not undone. Every stage is idempotent, so running the job again resumes
//! where the last run stopped.
//!
//! Descriptor validation and template lookup happen before anything is
//! mutated. A job also checks its deadline at each stage boundary, but never
//! interrupts a stage that already began.
//!
//! In dry-run mode no stage mutates anything. The outcome's plan lists what
//! each stage would have done instead.

pub mod dispatch;
pub mod git;

use crate::{
    config::{Options, RepoDescriptor, Transport, ValidationError},
    events::{EventEmitter, EventKind, Metadata},
    github::{CreateRepo, GitHubError, RemoteHost, RemoteRepo},
    scaffold::{self, standard},
    sync::git::{LocalRepo, PushAuth},
};

use secrecy::SecretString;
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    future::Future,
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};
use tracing::{debug, error, info, instrument};

/// Sequential phase of a sync job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Validate,
    Remote,
    Init,
    Template,
    Scaffold,
    Push,
}

impl Display for Stage {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(match self {
            Self::Validate => "validate",
            Self::Remote => "remote",
            Self::Init => "init",
            Self::Template => "template",
            Self::Scaffold => "scaffold",
            Self::Push => "push",
        })
    }
}

/// Last state reached by a sync job.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    #[default]
    NotStarted,
    RemoteEnsured,
    LocalInitialized,
    TemplateApplied,
    Scaffolded,
    Pushed,
    Failed(Stage),
}

/// Result of running a sync job for one descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    pub descriptor_name: String,
    pub succeeded: bool,

    /// Failure formatted as `<stage>: <detail>`.
    pub error: Option<String>,

    pub elapsed: Duration,
    pub state: SyncState,

    /// What each stage did, or in dry-run mode would have done.
    pub plan: Vec<String>,

    pub local_path: Option<PathBuf>,

    /// Whether this job created the remote repository.
    pub created_remote: bool,
}

impl SyncOutcome {
    /// Failed outcome for a job that never reached its first stage.
    pub fn not_run(name: impl Into<String>, error: &SyncError) -> Self {
        Self {
            descriptor_name: name.into(),
            succeeded: false,
            error: Some(error.to_string()),
            elapsed: Duration::ZERO,
            state: SyncState::NotStarted,
            plan: Vec::new(),
            local_path: None,
            created_remote: false,
        }
    }
}

/// Anything that can take a descriptor through synchronization.
pub trait SyncRunner: Send + Sync + 'static {
    /// Synchronize one descriptor.
    ///
    /// Never fails as a whole. Failures are reported through the outcome.
    fn sync(
        &self,
        descriptor: &RepoDescriptor,
        deadline: Option<Instant>,
    ) -> impl Future<Output = SyncOutcome> + Send;
}

/// Global settings shared by every sync job of a run.
#[derive(Debug)]
pub struct SyncSettings {
    /// Authenticated user, subject of emitted events.
    pub user: Option<String>,

    /// Owner of descriptors without one. Falls back to `user`.
    pub owner: Option<String>,

    pub default_branch: String,
    pub commit_message: String,
    pub transport: Transport,
    pub dry_run: bool,
    pub force: bool,
    pub auto_templates: bool,
    pub templates_dir: Option<PathBuf>,

    /// Directory that relative local paths resolve against.
    pub workdir: PathBuf,

    pub git_timeout: Duration,

    /// Token for HTTPS pushes.
    pub token: Option<Arc<SecretString>>,
}

impl SyncSettings {
    /// Construct settings from manifest options.
    pub fn from_options(options: &Options, workdir: impl Into<PathBuf>) -> Self {
        Self {
            user: options.user.clone(),
            owner: options.owner.clone(),
            default_branch: options.default_branch.clone(),
            commit_message: options.commit_message.clone(),
            transport: options.transport,
            dry_run: options.dry_run,
            force: options.force,
            auto_templates: options.auto_templates,
            templates_dir: options.templates_dir.clone(),
            workdir: workdir.into(),
            git_timeout: options.git_timeout(),
            token: None,
        }
    }

    /// Owner of descriptors that do not name one.
    pub fn default_owner(&self) -> Option<&str> {
        self.owner.as_deref().or(self.user.as_deref())
    }

    /// Authenticate HTTPS pushes with `token`.
    pub fn with_token(mut self, token: Arc<SecretString>) -> Self {
        self.token = Some(token);
        self
    }
}

/// Sync job shared by every descriptor of a run.
#[derive(Debug)]
pub struct SyncJob<H>
where
    H: RemoteHost,
{
    host: Arc<H>,
    settings: SyncSettings,
    events: Option<Arc<EventEmitter>>,
}

impl<H> SyncJob<H>
where
    H: RemoteHost,
{
    /// Construct new sync job against given remote host.
    pub fn new(host: Arc<H>, settings: SyncSettings) -> Self {
        Self {
            host,
            settings,
            events: None,
        }
    }

    /// Emit activity events for completed stages.
    pub fn with_events(mut self, events: Arc<EventEmitter>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Take a descriptor through every stage.
    #[instrument(skip(self, descriptor, deadline), fields(repo = %descriptor.name))]
    pub async fn run(&self, descriptor: &RepoDescriptor, deadline: Option<Instant>) -> SyncOutcome {
        let start = Instant::now();
        let mut progress = Progress::default();
        let result = self.drive(descriptor, deadline, &mut progress).await;

        let mut outcome = SyncOutcome {
            descriptor_name: descriptor.name.clone(),
            succeeded: result.is_ok(),
            error: None,
            elapsed: start.elapsed(),
            state: progress.state,
            plan: progress.plan,
            local_path: progress.local_path,
            created_remote: progress.created_remote,
        };

        match result {
            Ok(()) => info!("synchronized {} in {:.2?}", descriptor.name, outcome.elapsed),
            Err(err) => {
                error!("failed to synchronize {}: {err}", descriptor.name);
                if let Some(stage) = err.stage() {
                    outcome.state = SyncState::Failed(stage);
                }
                outcome.error = Some(err.to_string());
            }
        }

        outcome
    }

    async fn drive(
        &self,
        descriptor: &RepoDescriptor,
        deadline: Option<Instant>,
        progress: &mut Progress,
    ) -> Result<()> {
        checkpoint(Stage::Validate, deadline)?;
        descriptor.validate()?;
        let owner = descriptor
            .owner_or(self.settings.default_owner())?
            .to_string();
        let templates_dir = self.resolve_template(descriptor)?;
        let path = descriptor.resolve_local_path(&self.settings.workdir);
        progress.local_path = Some(path.clone());

        checkpoint(Stage::Remote, deadline)?;
        let remote = self.ensure_remote(descriptor, &owner, progress).await?;
        progress.state = SyncState::RemoteEnsured;

        checkpoint(Stage::Init, deadline)?;
        self.ensure_local(descriptor, &owner, &path, progress).await?;
        progress.state = SyncState::LocalInitialized;

        checkpoint(Stage::Template, deadline)?;
        if let (Some(dir), Some(key)) = (templates_dir, descriptor.template.clone()) {
            self.apply_template(descriptor, &owner, dir, key, &path, progress)
                .await?;
        }
        progress.state = SyncState::TemplateApplied;

        checkpoint(Stage::Scaffold, deadline)?;
        self.scaffold(descriptor, &owner, &path, progress).await?;
        progress.state = SyncState::Scaffolded;

        checkpoint(Stage::Push, deadline)?;
        self.push(descriptor, &path, remote.as_ref(), progress)
            .await?;
        progress.state = SyncState::Pushed;

        Ok(())
    }

    fn resolve_template(&self, descriptor: &RepoDescriptor) -> Result<Option<PathBuf>> {
        let Some(key) = &descriptor.template else {
            return Ok(None);
        };

        let missing = || ValidationError::MissingTemplate {
            name: descriptor.name.clone(),
            template: key.clone(),
        };
        let dir = self.settings.templates_dir.as_deref().ok_or_else(missing)?;
        scaffold::template_dir(dir, key).map_err(|_| missing())?;

        Ok(Some(dir.to_path_buf()))
    }

    async fn ensure_remote(
        &self,
        descriptor: &RepoDescriptor,
        owner: &str,
        progress: &mut Progress,
    ) -> Result<Option<RemoteRepo>> {
        let name = descriptor.name.as_str();
        let existing = self
            .host
            .find_repo(owner, name)
            .await
            .map_err(remote_failure)?;

        match existing {
            Some(remote) if remote.private != descriptor.private => Err(SyncError::Conflict(format!(
                "{owner}/{name} exists with private={}, manifest wants private={}",
                remote.private, descriptor.private
            ))),
            Some(remote) => {
                debug!("remote {owner}/{name} already exists");
                progress.plan.push(format!("keep remote {owner}/{name}"));
                Ok(Some(remote))
            }
            None if self.settings.dry_run => {
                progress.plan.push(format!(
                    "create remote {owner}/{name} (private={})",
                    descriptor.private
                ));
                Ok(None)
            }
            None => {
                let request = CreateRepo {
                    owner: owner.into(),
                    name: name.into(),
                    description: descriptor.description.clone().unwrap_or_default(),
                    private: descriptor.private,
                    auto_init: false,
                };
                let remote = self
                    .host
                    .create_repo(&request)
                    .await
                    .map_err(remote_failure)?;
                info!("created remote {owner}/{name}");
                progress
                    .plan
                    .push(format!("created remote {owner}/{name} (private={})", descriptor.private));
                progress.created_remote = true;
                self.emit(
                    EventKind::RepoCreated,
                    owner,
                    name,
                    Metadata::from([
                        ("owner".into(), owner.into()),
                        ("private".into(), descriptor.private.into()),
                    ]),
                );

                Ok(Some(remote))
            }
        }
    }

    async fn ensure_local(
        &self,
        descriptor: &RepoDescriptor,
        owner: &str,
        path: &Path,
        progress: &mut Progress,
    ) -> Result<()> {
        let exists = LocalRepo::exists(path);
        if exists && !self.settings.force {
            debug!("local repository {} already exists", path.display());
            progress.plan.push(format!("keep local repository {}", path.display()));
            return Ok(());
        }

        let verb = if exists { "reinitialize" } else { "initialize" };
        if self.settings.dry_run {
            progress.plan.push(format!("{verb} local repository {}", path.display()));
            return Ok(());
        }

        let target = path.to_path_buf();
        let branch = self.settings.default_branch.clone();
        let timeout = self.settings.git_timeout;
        blocking(Stage::Init, move || {
            LocalRepo::init(target, &branch, timeout).map_err(|err| stage_failure(Stage::Init, err))
        })
        .await?;
        info!("{verb}d local repository {}", path.display());
        progress.plan.push(format!("{verb}d local repository {}", path.display()));
        self.emit(
            EventKind::RepoInitialized,
            owner,
            &descriptor.name,
            Metadata::from([("force".into(), self.settings.force.into())]),
        );

        Ok(())
    }

    async fn apply_template(
        &self,
        descriptor: &RepoDescriptor,
        owner: &str,
        templates_dir: PathBuf,
        key: String,
        path: &Path,
        progress: &mut Progress,
    ) -> Result<()> {
        let dest = path.to_path_buf();
        let dry_run = self.settings.dry_run;
        let template = key.clone();
        let written = blocking(Stage::Template, move || {
            scaffold::apply_template(&templates_dir, &template, &dest, dry_run)
                .map_err(|err| stage_failure(Stage::Template, err))
        })
        .await?;

        let verb = if dry_run { "copy" } else { "copied" };
        progress.plan.push(format!(
            "{verb} {} file(s) from template {key}",
            written.len()
        ));
        if !dry_run {
            self.emit(
                EventKind::TemplateApplied,
                owner,
                &descriptor.name,
                Metadata::from([
                    ("template".into(), key.as_str().into()),
                    ("files".into(), (written.len() as i64).into()),
                ]),
            );
        }

        Ok(())
    }

    async fn scaffold(
        &self,
        descriptor: &RepoDescriptor,
        owner: &str,
        path: &Path,
        progress: &mut Progress,
    ) -> Result<()> {
        let dest = path.to_path_buf();
        let name = descriptor.name.clone();
        let description = descriptor.description.clone();
        let dry_run = self.settings.dry_run;
        let auto_templates = self.settings.auto_templates;

        let (minimal, community) = blocking(Stage::Scaffold, move || {
            let minimal = scaffold::ensure_minimal_files(&dest, &name, description.as_deref(), dry_run)
                .map_err(|err| stage_failure(Stage::Scaffold, err))?;
            let community = if auto_templates {
                standard::write_standard_files(&dest, dry_run)
                    .map_err(|err| stage_failure(Stage::Scaffold, err))?
            } else {
                Default::default()
            };
            Ok((minimal, community))
        })
        .await?;

        let verb = if dry_run { "write" } else { "wrote" };
        for file in minimal.files.iter().chain(community.files.iter()) {
            progress.plan.push(format!("{verb} {}", file.display()));
        }

        if !dry_run && community.contains(standard::SECURITY_PATH) {
            self.emit(
                EventKind::SecurityPolicyAdded,
                owner,
                &descriptor.name,
                Metadata::new(),
            );
        }

        Ok(())
    }

    async fn push(
        &self,
        descriptor: &RepoDescriptor,
        path: &Path,
        remote: Option<&RemoteRepo>,
        progress: &mut Progress,
    ) -> Result<()> {
        let branch = self.settings.default_branch.as_str();
        let url = remote.map(|remote| match self.settings.transport {
            Transport::Https => remote.clone_url.clone(),
            Transport::Ssh => remote.ssh_url.clone(),
        });

        if self.settings.dry_run {
            let target = url.as_deref().unwrap_or("new remote");
            progress.plan.push(format!("commit and push {branch} to {target}"));
            return Ok(());
        }

        let Some(url) = url else {
            return Err(SyncError::Stage {
                stage: Stage::Push,
                detail: format!("no remote URL known for {}", descriptor.name),
            });
        };

        let target = path.to_path_buf();
        let timeout = self.settings.git_timeout;
        let remote_url = url.clone();
        let local = blocking(Stage::Push, move || {
            let local = LocalRepo::open(target, timeout).map_err(|err| stage_failure(Stage::Push, err))?;
            local
                .set_remote(&remote_url)
                .map_err(|err| stage_failure(Stage::Push, err))?;
            Ok(local)
        })
        .await?;

        let committed = local
            .commit_all(&self.settings.commit_message)
            .await
            .map_err(|err| stage_failure(Stage::Push, err))?;
        if committed {
            progress.plan.push(format!("committed \"{}\"", self.settings.commit_message));
        }

        let auth = match (self.settings.transport, self.settings.token.as_deref()) {
            (Transport::Https, Some(token)) => PushAuth::Token(token),
            _ => PushAuth::Ambient,
        };
        local
            .push(branch, &auth)
            .await
            .map_err(|err| stage_failure(Stage::Push, err))?;
        info!("pushed {} to {url}", descriptor.name);
        progress.plan.push(format!("pushed {branch} to {url}"));

        Ok(())
    }

    fn emit(&self, kind: EventKind, owner: &str, target: &str, metadata: Metadata) {
        if let Some(events) = &self.events {
            let subject = self.settings.user.as_deref().unwrap_or(owner);
            events.emit(kind, subject, Some(target), metadata);
        }
    }
}

impl<H> SyncRunner for SyncJob<H>
where
    H: RemoteHost,
{
    async fn sync(&self, descriptor: &RepoDescriptor, deadline: Option<Instant>) -> SyncOutcome {
        self.run(descriptor, deadline).await
    }
}

#[derive(Debug, Default)]
struct Progress {
    state: SyncState,
    plan: Vec<String>,
    local_path: Option<PathBuf>,
    created_remote: bool,
}

fn checkpoint(stage: Stage, deadline: Option<Instant>) -> Result<()> {
    match deadline {
        Some(deadline) if Instant::now() >= deadline => Err(SyncError::Cancelled { stage }),
        _ => Ok(()),
    }
}

fn stage_failure(stage: Stage, error: impl Display) -> SyncError {
    SyncError::Stage {
        stage,
        detail: error.to_string(),
    }
}

fn remote_failure(error: GitHubError) -> SyncError {
    match error {
        GitHubError::Conflict(_) => SyncError::Conflict(error.to_string()),
        error => stage_failure(Stage::Remote, error),
    }
}

// Run filesystem and libgit2 work off the async worker threads.
async fn blocking<T, F>(stage: Stage, work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|err| stage_failure(stage, format!("task failed: {err}")))?
}

/// All possible error types of a sync job.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Descriptor or template reference is malformed.
    #[error("validate: {0}")]
    Validation(#[from] ValidationError),

    /// Remote repository exists in an incompatible state.
    #[error("remote: {0}")]
    Conflict(String),

    /// Named stage failed after its preconditions were met.
    #[error("{stage}: {detail}")]
    Stage { stage: Stage, detail: String },

    /// Deadline elapsed at a stage boundary.
    #[error("{stage}: cancelled, deadline elapsed")]
    Cancelled { stage: Stage },

    /// Deadline elapsed before the job was started.
    #[error("cancelled: deadline elapsed before start")]
    NotStarted,

    /// Job was lost before reporting an outcome.
    #[error("dispatch: {0}")]
    Aborted(String),
}

impl SyncError {
    /// Stage the failure happened in, if the job started.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Validation(_) => Some(Stage::Validate),
            Self::Conflict(_) => Some(Stage::Remote),
            Self::Stage { stage, .. } | Self::Cancelled { stage } => Some(*stage),
            Self::NotStarted | Self::Aborted(_) => None,
        }
    }
}

/// Friendly result alias :3
pub type Result<T, E = SyncError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{events::EventStore, github::Result as GitHubResult};
    use pretty_assertions::assert_eq;
    use std::{collections::HashMap, sync::Mutex};

    // Remote host that remembers which repositories exist.
    #[derive(Debug, Default)]
    struct MemoryHost {
        repos: Mutex<HashMap<String, RemoteRepo>>,
        creations: Mutex<Vec<String>>,
    }

    impl MemoryHost {
        fn with_repo(self, owner: &str, name: &str, private: bool) -> Self {
            self.repos.lock().unwrap().insert(
                format!("{owner}/{name}"),
                RemoteRepo {
                    name: name.into(),
                    private,
                    clone_url: format!("/nonexistent/{owner}/{name}.git"),
                    ssh_url: format!("git@example.org:{owner}/{name}.git"),
                },
            );
            self
        }
    }

    impl RemoteHost for MemoryHost {
        async fn find_repo(&self, owner: &str, name: &str) -> GitHubResult<Option<RemoteRepo>> {
            Ok(self.repos.lock().unwrap().get(&format!("{owner}/{name}")).cloned())
        }

        async fn create_repo(&self, request: &CreateRepo) -> GitHubResult<RemoteRepo> {
            self.creations
                .lock()
                .unwrap()
                .push(format!("{}/{}", request.owner, request.name));
            let repo = RemoteRepo {
                name: request.name.clone(),
                private: request.private,
                clone_url: format!("/nonexistent/{}/{}.git", request.owner, request.name),
                ssh_url: format!("git@example.org:{}/{}.git", request.owner, request.name),
            };
            self.repos
                .lock()
                .unwrap()
                .insert(format!("{}/{}", request.owner, request.name), repo.clone());
            Ok(repo)
        }

        async fn delete_repo(&self, owner: &str, name: &str) -> GitHubResult<()> {
            self.repos.lock().unwrap().remove(&format!("{owner}/{name}"));
            Ok(())
        }
    }

    fn settings(workdir: &Path, dry_run: bool) -> SyncSettings {
        let options = Options {
            user: Some("alice".into()),
            dry_run,
            ..Default::default()
        };
        SyncSettings::from_options(&options, workdir)
    }

    #[tokio::test]
    async fn dry_run_mutates_nothing() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let host = Arc::new(MemoryHost::default());
        let store = Arc::new(EventStore::new());
        let events = Arc::new(EventEmitter::new(store.clone(), Default::default()));
        let job = SyncJob::new(host.clone(), settings(root.path(), true)).with_events(events);

        let mut descriptor = RepoDescriptor::new("demo");
        descriptor.description = Some("Demo".into());
        let outcome = job.run(&descriptor, None).await;

        assert!(outcome.succeeded, "{:?}", outcome.error);
        assert_eq!(outcome.state, SyncState::Pushed);
        assert_eq!(
            outcome.plan,
            vec![
                "create remote alice/demo (private=true)".to_string(),
                format!("initialize local repository {}", root.path().join("demo").display()),
                "write README.md".to_string(),
                "write .gitignore".to_string(),
                "commit and push main to new remote".to_string(),
            ]
        );
        assert!(host.creations.lock().unwrap().is_empty());
        assert!(!root.path().join("demo").exists());
        assert!(store.is_empty());

        Ok(())
    }

    #[tokio::test]
    async fn visibility_mismatch_is_conflict() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let host = Arc::new(MemoryHost::default().with_repo("alice", "demo", false));
        let job = SyncJob::new(host, settings(root.path(), false));

        let outcome = job.run(&RepoDescriptor::new("demo"), None).await;
        assert!(!outcome.succeeded);
        assert_eq!(outcome.state, SyncState::Failed(Stage::Remote));
        assert!(outcome.error.as_deref().is_some_and(|error| error.starts_with("remote: ")));
        assert!(!root.path().join("demo").exists());

        Ok(())
    }

    #[tokio::test]
    async fn missing_template_fails_before_mutation() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let host = Arc::new(MemoryHost::default());
        let mut settings = settings(root.path(), false);
        settings.templates_dir = Some(root.path().join("templates"));
        let job = SyncJob::new(host.clone(), settings);

        let mut descriptor = RepoDescriptor::new("demo");
        descriptor.template = Some("rust".into());
        let outcome = job.run(&descriptor, None).await;

        assert_eq!(outcome.state, SyncState::Failed(Stage::Validate));
        assert!(outcome.error.as_deref().is_some_and(|error| error.starts_with("validate: ")));
        assert!(host.creations.lock().unwrap().is_empty());

        Ok(())
    }

    #[tokio::test]
    async fn elapsed_deadline_cancels_at_first_boundary() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let host = Arc::new(MemoryHost::default());
        let job = SyncJob::new(host.clone(), settings(root.path(), false));

        let outcome = job.run(&RepoDescriptor::new("demo"), Some(Instant::now())).await;
        assert_eq!(outcome.state, SyncState::Failed(Stage::Validate));
        assert_eq!(
            outcome.error.as_deref(),
            Some("validate: cancelled, deadline elapsed")
        );
        assert!(host.creations.lock().unwrap().is_empty());

        Ok(())
    }

    #[tokio::test]
    async fn scaffold_emits_security_policy_event() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let host = Arc::new(MemoryHost::default());
        let store = Arc::new(EventStore::new());
        let events = Arc::new(EventEmitter::new(store.clone(), Default::default()));
        let mut settings = settings(root.path(), false);
        settings.auto_templates = true;
        let job = SyncJob::new(host, settings).with_events(events);

        // Push to a nonexistent remote cannot succeed, every earlier stage must.
        let outcome = job.run(&RepoDescriptor::new("demo"), None).await;

        assert_eq!(outcome.state, SyncState::Failed(Stage::Push));
        assert!(root.path().join("demo/SECURITY.md").exists());
        let kinds: Vec<_> = store.snapshot().into_iter().map(|event| event.kind).collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::RepoCreated,
                EventKind::RepoInitialized,
                EventKind::SecurityPolicyAdded,
            ]
        );
        assert_eq!(store.total_reward("alice"), 50 + 30 + 40);

        Ok(())
    }

    #[tokio::test]
    async fn default_owner_receives_repository_but_user_stays_subject() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let host = Arc::new(MemoryHost::default());
        let store = Arc::new(EventStore::new());
        let events = Arc::new(EventEmitter::new(store.clone(), Default::default()));
        let options = Options {
            user: Some("alice".into()),
            owner: Some("acme".into()),
            ..Default::default()
        };
        let settings = SyncSettings::from_options(&options, root.path());
        let job = SyncJob::new(host.clone(), settings).with_events(events);

        let outcome = job.run(&RepoDescriptor::new("demo"), None).await;

        assert_eq!(outcome.state, SyncState::Failed(Stage::Push));
        assert_eq!(*host.creations.lock().unwrap(), vec!["acme/demo".to_string()]);
        let created = store
            .snapshot()
            .into_iter()
            .find(|event| event.kind == EventKind::RepoCreated)
            .ok_or_else(|| anyhow::anyhow!("no creation event"))?;
        assert_eq!(created.subject, "alice");
        assert_eq!(created.metadata.get("owner"), Some(&"acme".into()));

        Ok(())
    }

    #[tokio::test]
    async fn existing_local_repository_is_kept_without_force() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let path = root.path().join("demo");
        LocalRepo::init(&path, "main", Duration::from_secs(5))?;
        let host = Arc::new(MemoryHost::default().with_repo("alice", "demo", true));
        let store = Arc::new(EventStore::new());
        let events = Arc::new(EventEmitter::new(store.clone(), Default::default()));
        let job = SyncJob::new(host, settings(root.path(), false)).with_events(events);

        let outcome = job.run(&RepoDescriptor::new("demo"), None).await;

        assert_eq!(outcome.state, SyncState::Failed(Stage::Push));
        assert!(outcome.plan.contains(&format!("keep local repository {}", path.display())));
        assert!(!outcome.plan.iter().any(|entry| entry.contains("initialize")));
        assert!(store
            .snapshot()
            .iter()
            .all(|event| event.kind != EventKind::RepoInitialized));

        Ok(())
    }

    #[tokio::test]
    async fn force_reinitializes_existing_local_repository() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let path = root.path().join("demo");
        LocalRepo::init(&path, "main", Duration::from_secs(5))?;
        let host = Arc::new(MemoryHost::default().with_repo("alice", "demo", true));
        let store = Arc::new(EventStore::new());
        let events = Arc::new(EventEmitter::new(store.clone(), Default::default()));
        let mut settings = settings(root.path(), false);
        settings.force = true;
        let job = SyncJob::new(host, settings).with_events(events);

        let outcome = job.run(&RepoDescriptor::new("demo"), None).await;

        // Push to a nonexistent remote cannot succeed, every earlier stage must.
        assert_eq!(outcome.state, SyncState::Failed(Stage::Push));
        assert!(outcome
            .plan
            .contains(&format!("reinitialized local repository {}", path.display())));
        let initialized = store
            .snapshot()
            .into_iter()
            .find(|event| event.kind == EventKind::RepoInitialized)
            .ok_or_else(|| anyhow::anyhow!("no initialization event"))?;
        assert_eq!(initialized.metadata.get("force"), Some(&true.into()));

        let repo = git2::Repository::open(&path)?;
        let origin = repo.find_remote(git::REMOTE_NAME)?;
        assert_eq!(origin.url(), Some("/nonexistent/alice/demo.git"));

        Ok(())
    }

    #[tokio::test]
    async fn forced_dry_run_plans_reinitialization() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let path = root.path().join("demo");
        LocalRepo::init(&path, "main", Duration::from_secs(5))?;
        let host = Arc::new(MemoryHost::default().with_repo("alice", "demo", true));
        let mut settings = settings(root.path(), true);
        settings.force = true;
        let job = SyncJob::new(host, settings);

        let outcome = job.run(&RepoDescriptor::new("demo"), None).await;

        assert!(outcome.succeeded, "{:?}", outcome.error);
        assert!(outcome
            .plan
            .contains(&format!("reinitialize local repository {}", path.display())));
        assert!(git2::Repository::open(&path)?.find_remote(git::REMOTE_NAME).is_err());

        Ok(())
    }
}
