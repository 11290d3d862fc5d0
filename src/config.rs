// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout of the __manifest__ file that repoforge reads to know
//! which repositories to create, scaffold, and push. Serialization and
//! deserialization are handled here. File I/O is left to the caller.
//!
//! # General Layout
//!
//! A manifest is composed of global options, retry settings for the hosting
//! API, event settings, and a listing of repository descriptors:
//!
//! ```toml
//! [options]
//! user = "alice"
//! workers = 4
//!
//! [[repo]]
//! name = "demo"
//! template = "rust"
//! path = "~/src/demo"
//! ```
//!
//! Every descriptor is validated at parse time. A manifest that parses is
//! therefore safe to hand over to the sync machinery without further
//! checks on names.

use crate::{batch::BatchPolicy, events::RewardTable, github::retry::RetryConfig};

use serde::{Deserialize, Serialize};
use std::{
    collections::HashSet,
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    path::{Component, Path, PathBuf},
    str::FromStr,
    time::Duration,
};

/// Longest repository name the hosting API accepts.
pub const MAX_NAME_LEN: usize = 100;

/// Repository manifest layout.
#[derive(Default, Debug, PartialEq, Clone, Deserialize, Serialize)]
pub struct Manifest {
    /// Global options applied to every repository.
    #[serde(default)]
    pub options: Options,

    /// Retry settings for calls to the hosting API.
    #[serde(default)]
    pub retry: RetrySettings,

    /// Activity event settings.
    #[serde(default)]
    pub events: EventSettings,

    /// Ordered listing of repositories to synchronize.
    #[serde(rename = "repo", default)]
    pub repos: Vec<RepoDescriptor>,
}

impl Manifest {
    /// Validate options and every repository descriptor.
    ///
    /// # Errors
    ///
    /// - Return [`ValidationError`] for the first violation found.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.options.workers == 0 {
            return Err(ValidationError::ZeroWorkers);
        }

        if self.retry.max_attempts == 0 {
            return Err(ValidationError::ZeroAttempts);
        }

        if !(0.0..=1.0).contains(&self.retry.jitter) {
            return Err(ValidationError::Jitter(self.retry.jitter));
        }

        let mut seen = HashSet::new();
        for repo in &self.repos {
            repo.validate()?;
            if !seen.insert(repo.name.as_str()) {
                return Err(ValidationError::DuplicateName(repo.name.clone()));
            }
        }

        Ok(())
    }
}

impl FromStr for Manifest {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut manifest: Manifest = toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on every path field.
        if let Some(dir) = manifest.options.templates_dir.take() {
            manifest.options.templates_dir = Some(expand_path(&dir)?);
        }
        for repo in manifest.repos.iter_mut() {
            if let Some(path) = repo.local_path.take() {
                repo.local_path = Some(expand_path(&path)?);
            }
        }

        manifest.validate()?;

        Ok(manifest)
    }
}

impl Display for Manifest {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// Global options.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Options {
    /// Authenticated user. Subject of emitted events, and owner of
    /// repositories when no other owner is given.
    pub user: Option<String>,

    /// Owner of repositories that do not name one, e.g. an organization.
    pub owner: Option<String>,

    /// Branch to push.
    pub default_branch: String,

    /// Message of the commit made before pushing.
    pub commit_message: String,

    /// Transport used to push to the remote.
    pub transport: Transport,

    /// Number of repositories synchronized concurrently.
    pub workers: usize,

    /// Plan every stage without mutating anything.
    pub dry_run: bool,

    /// Reinitialize local repositories even if they already exist.
    pub force: bool,

    /// Write standard community files during scaffolding.
    pub auto_templates: bool,

    /// Execution policy of batch operations.
    pub batch_policy: BatchPolicy,

    /// Overall deadline for a dispatch run, in seconds.
    pub deadline_secs: Option<u64>,

    /// Directory holding template file sets, one sub-directory per key.
    pub templates_dir: Option<PathBuf>,

    /// Base URL of the hosting API.
    pub api_url: String,

    /// Timeout of a single hosting API request, in seconds.
    pub http_timeout_secs: u64,

    /// Timeout of a single git invocation, in seconds.
    pub git_timeout_secs: u64,
}

impl Options {
    /// Owner of repositories without one: `owner`, else `user`.
    pub fn default_owner(&self) -> Option<&str> {
        self.owner.as_deref().or(self.user.as_deref())
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_secs.map(Duration::from_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn git_timeout(&self) -> Duration {
        Duration::from_secs(self.git_timeout_secs)
    }
}

impl Default for Options {
    fn default() -> Self {
        Self {
            user: None,
            owner: None,
            default_branch: "main".into(),
            commit_message: "Initial commit from repoforge".into(),
            transport: Transport::default(),
            workers: 4,
            dry_run: false,
            force: false,
            auto_templates: false,
            batch_policy: BatchPolicy::default(),
            deadline_secs: None,
            templates_dir: None,
            api_url: "https://api.github.com".into(),
            http_timeout_secs: 30,
            git_timeout_secs: 120,
        }
    }
}

/// Transport used to push local repositories to their remote.
#[derive(Default, Debug, PartialEq, Eq, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// Token-authenticated HTTPS.
    #[default]
    Https,

    /// SSH with the user's own keys.
    Ssh,
}

/// Retry settings for hosting API calls.
#[derive(Debug, PartialEq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,

    /// Delay before the first retry, in milliseconds.
    pub base_delay_ms: u64,

    /// Cap on the delay between attempts, in milliseconds.
    pub max_delay_ms: u64,

    /// Random jitter applied to each delay, as a fraction of it.
    pub jitter: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 2000,
            max_delay_ms: 10_000,
            jitter: 0.1,
        }
    }
}

impl From<&RetrySettings> for RetryConfig {
    fn from(settings: &RetrySettings) -> Self {
        RetryConfig {
            max_attempts: settings.max_attempts,
            base_delay: Duration::from_millis(settings.base_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
            jitter: settings.jitter,
        }
    }
}

/// Activity event settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EventSettings {
    /// Webhook receiving every emitted event.
    pub webhook_url: Option<String>,

    /// Timeout of a webhook delivery, in seconds.
    pub timeout_secs: u64,

    /// Reward value of each event kind.
    pub rewards: RewardTable,
}

impl EventSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for EventSettings {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout_secs: 5,
            rewards: RewardTable::default(),
        }
    }
}

/// Declarative record describing one repository to create and synchronize.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct RepoDescriptor {
    /// Name of the repository, local and remote.
    pub name: String,

    /// One sentence description.
    pub description: Option<String>,

    /// Owning user or organization. Defaults to the configured user.
    pub owner: Option<String>,

    /// Visibility of the remote repository.
    #[serde(default = "default_private")]
    pub private: bool,

    /// Key of the template file set to apply.
    pub template: Option<String>,

    /// Local path of the repository. Defaults to `./<name>`.
    #[serde(rename = "path")]
    pub local_path: Option<PathBuf>,
}

impl RepoDescriptor {
    /// Construct new private descriptor with nothing but a name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            owner: None,
            private: true,
            template: None,
            local_path: None,
        }
    }

    /// Check that the name is usable both as a directory and in an API URL.
    ///
    /// # Errors
    ///
    /// - Return [`ValidationError::EmptyName`] if the name is empty.
    /// - Return [`ValidationError::InvalidName`] if the name is not URL-safe.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_name(&self.name)?;
        if let Some(template) = &self.template {
            if !is_single_component(template) {
                return Err(ValidationError::InvalidTemplate {
                    name: self.name.clone(),
                    template: template.clone(),
                });
            }
        }

        Ok(())
    }

    /// Determine owner of repository, falling back to `user`.
    ///
    /// # Errors
    ///
    /// - Return [`ValidationError::MissingOwner`] if neither is known.
    pub fn owner_or<'a>(&'a self, user: Option<&'a str>) -> Result<&'a str, ValidationError> {
        self.owner
            .as_deref()
            .or(user)
            .ok_or_else(|| ValidationError::MissingOwner(self.name.clone()))
    }

    /// Resolve local path relative to a working directory.
    pub fn resolve_local_path(&self, workdir: &Path) -> PathBuf {
        match &self.local_path {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => workdir.join(path),
            None => workdir.join(&self.name),
        }
    }
}

// INVARIANT: Template key names exactly one directory under the templates dir.
pub(crate) fn is_single_component(key: &str) -> bool {
    let mut components = Path::new(key).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    ) && !key.contains(['/', '\\'])
}

/// Check repository name against the hosting API's naming rules.
pub fn validate_name(name: &str) -> Result<(), ValidationError> {
    let invalid = |reason: &'static str| ValidationError::InvalidName {
        name: name.to_string(),
        reason,
    };

    if name.is_empty() {
        return Err(ValidationError::EmptyName);
    }

    if name.len() > MAX_NAME_LEN {
        return Err(invalid("longer than 100 characters"));
    }

    if name == "." || name == ".." {
        return Err(invalid("reserved name"));
    }

    if name.ends_with(".git") {
        return Err(invalid("ends with .git"));
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(invalid("only ASCII letters, digits, '-', '_' and '.' are allowed"));
    }

    Ok(())
}

fn default_private() -> bool {
    true
}

fn expand_path(path: &Path) -> Result<PathBuf> {
    Ok(PathBuf::from(
        shellexpand::full(path.to_string_lossy().as_ref())
            .map_err(ConfigError::ShellExpansion)?
            .into_owned(),
    ))
}

/// Manifest validation failures.
///
/// Detected before any network or filesystem mutation.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("repository name must not be empty")]
    EmptyName,

    #[error("invalid repository name {name:?}: {reason}")]
    InvalidName { name: String, reason: &'static str },

    #[error("repository {0:?} is listed more than once")]
    DuplicateName(String),

    #[error("invalid template key {template:?} for repository {name:?}")]
    InvalidTemplate { name: String, template: String },

    #[error("template {template:?} of repository {name:?} does not exist")]
    MissingTemplate { name: String, template: String },

    #[error("no owner given for repository {0:?} and no user configured")]
    MissingOwner(String),

    #[error("worker count must be at least one")]
    ZeroWorkers,

    #[error("retry attempts must be at least one")]
    ZeroAttempts,

    #[error("retry jitter must lie within 0.0 and 1.0, got {0}")]
    Jitter(f64),
}

/// Configuration error types.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),

    /// Configuration is well-formed but invalid.
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;
