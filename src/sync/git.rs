// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Local version-control collaborator.
//!
//! Repository creation and remote configuration go through libgit2. Staging,
//! committing, and pushing shell out to the user's git binary, so hooks,
//! credential helpers, and SSH configuration behave as they do on the command
//! line. Every git invocation is bounded by a timeout and killed if it
//! overruns.

use base64::{engine::general_purpose::STANDARD, Engine};
use git2::{Repository, RepositoryInitOptions};
use secrecy::{ExposeSecret, SecretString};
use std::{
    ffi::OsStr,
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};
use tokio::process::Command;
use tracing::{debug, instrument};

/// Name of remote that repoforge pushes to.
pub const REMOTE_NAME: &str = "origin";

/// Authentication handed to git for a push.
#[derive(Debug, Default)]
pub enum PushAuth<'a> {
    /// Rely on the user's own git configuration, e.g. SSH keys.
    #[default]
    Ambient,

    /// Token sent as an HTTP authorization header.
    Token(&'a SecretString),
}

impl PushAuth<'_> {
    // INVARIANT: Token travels through environment only, never argv or config.
    fn envs(&self) -> Vec<(String, String)> {
        match self {
            Self::Ambient => Vec::new(),
            Self::Token(token) => {
                let basic = STANDARD.encode(format!("x-access-token:{}", token.expose_secret()));
                vec![
                    ("GIT_CONFIG_COUNT".into(), "1".into()),
                    ("GIT_CONFIG_KEY_0".into(), "http.extraHeader".into()),
                    (
                        "GIT_CONFIG_VALUE_0".into(),
                        format!("Authorization: Basic {basic}"),
                    ),
                ]
            }
        }
    }
}

/// Local repository handle.
#[derive(Debug, Clone)]
pub struct LocalRepo {
    path: PathBuf,
    timeout: Duration,
}

impl LocalRepo {
    /// Open existing local repository.
    ///
    /// # Errors
    ///
    /// - Return [`GitError::Git2`] if no repository exists at `path`.
    pub fn open(path: impl Into<PathBuf>, timeout: Duration) -> Result<Self> {
        let path = path.into();
        Repository::open(&path)?;

        Ok(Self { path, timeout })
    }

    /// Initialize new repository at `path` with `branch` as initial head.
    ///
    /// Leading directories are created as needed. Initializing on top of an
    /// existing repository reinitializes it, which leaves history intact.
    ///
    /// # Errors
    ///
    /// - Return [`GitError::Git2`] if the repository cannot be initialized.
    pub fn init(path: impl Into<PathBuf>, branch: &str, timeout: Duration) -> Result<Self> {
        let path = path.into();
        let mut opts = RepositoryInitOptions::new();
        opts.initial_head(branch);
        opts.mkpath(true);
        Repository::init_opts(&path, &opts)?;

        Ok(Self { path, timeout })
    }

    /// Whether `path` already holds a repository.
    pub fn exists(path: &Path) -> bool {
        Repository::open(path).is_ok()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Point remote named [`REMOTE_NAME`] at `url`, creating it if absent.
    ///
    /// # Errors
    ///
    /// - Return [`GitError::Git2`] if the remote cannot be configured.
    pub fn set_remote(&self, url: &str) -> Result<()> {
        let repo = Repository::open(&self.path)?;
        match repo.find_remote(REMOTE_NAME) {
            Ok(remote) if remote.url() == Some(url) => {}
            Ok(_) => repo.remote_set_url(REMOTE_NAME, url)?,
            Err(_) => {
                repo.remote(REMOTE_NAME, url)?;
            }
        }

        Ok(())
    }

    /// Stage everything and commit it with `message`.
    ///
    /// Returns `false` without committing when the work tree is clean.
    ///
    /// # Errors
    ///
    /// - Return [`GitError`] if git fails or times out.
    #[instrument(skip(self), fields(path = %self.path.display()), level = "debug")]
    pub async fn commit_all(&self, message: &str) -> Result<bool> {
        self.git(["add", "--all"], &PushAuth::Ambient).await?;
        let status = self.git(["status", "--porcelain"], &PushAuth::Ambient).await?;
        if status.trim().is_empty() {
            debug!("nothing to commit");
            return Ok(false);
        }
        self.git(["commit", "--quiet", "-m", message], &PushAuth::Ambient)
            .await?;

        Ok(true)
    }

    /// Push current HEAD to `branch` of remote [`REMOTE_NAME`].
    ///
    /// # Errors
    ///
    /// - Return [`GitError`] if git fails or times out.
    #[instrument(skip(self, auth), fields(path = %self.path.display()), level = "debug")]
    pub async fn push(&self, branch: &str, auth: &PushAuth<'_>) -> Result<()> {
        let refspec = format!("HEAD:refs/heads/{branch}");
        self.git(["push", "--porcelain", REMOTE_NAME, refspec.as_str()], auth)
            .await?;

        Ok(())
    }

    async fn git<I, S>(&self, args: I, auth: &PushAuth<'_>) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let args: Vec<_> = args
            .into_iter()
            .map(|arg| arg.as_ref().to_os_string())
            .collect();
        let mut command = Command::new("git");
        command
            .arg("-C")
            .arg(&self.path)
            .args(&args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .envs(auth.envs())
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let render = || {
            args.iter()
                .map(|arg| arg.to_string_lossy())
                .collect::<Vec<_>>()
                .join(" ")
        };

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| GitError::TimedOut {
                args: render(),
                timeout: self.timeout,
            })?
            .map_err(GitError::Spawn)?;

        let stdout = String::from_utf8_lossy(output.stdout.as_slice()).into_owned();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(output.stderr.as_slice());

            // INVARIANT: Chomp trailing newlines.
            return Err(GitError::Failed {
                args: render(),
                status: output.status.code(),
                stderr: stderr.trim_end().to_string(),
            });
        }

        Ok(stdout)
    }
}

/// Local version-control error types.
#[derive(Debug, thiserror::Error)]
pub enum GitError {
    /// Failure from libgit2.
    #[error(transparent)]
    Git2(#[from] git2::Error),

    /// Git binary could not be spawned.
    #[error("failed to spawn git: {0}")]
    Spawn(#[source] std::io::Error),

    /// Git ran past its timeout and was killed.
    #[error("git {args} timed out after {timeout:?}")]
    TimedOut { args: String, timeout: Duration },

    /// Git exited unsuccessfully.
    #[error("git {args} failed ({}): {stderr}", exit_code(.status))]
    Failed {
        args: String,
        status: Option<i32>,
        stderr: String,
    },
}

fn exit_code(status: &Option<i32>) -> String {
    status
        .map(|code| format!("exit code {code}"))
        .unwrap_or_else(|| "killed by signal".into())
}

/// Friendly result alias :3
pub type Result<T, E = GitError> = std::result::Result<T, E>;
