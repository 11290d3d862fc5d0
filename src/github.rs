// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Remote repository hosting.
//!
//! Repoforge only needs a handful of operations from the hosting API: ask
//! whether a repository exists, create one, and delete one when a batch is
//! rolled back. These are modelled by the [`RemoteHost`] trait so that sync
//! logic never talks to HTTP directly. [`GitHubClient`] implements the trait
//! against the GitHub REST API.
//!
//! # Failure Classification
//!
//! Every API failure is sorted into one of three kinds:
//!
//! - __Transient__: connection errors, timeouts, HTTP 5xx, HTTP 429, and
//!   HTTP 403 caused by an exhausted rate limit. Retried with exponential
//!   backoff, see [`retry`].
//! - __Conflict__: the remote resource already exists in an incompatible
//!   state. Never retried.
//! - __Permanent__: any other 4xx, or a response body that cannot be
//!   understood. Never retried.
//!
//! # Authentication
//!
//! Requests are authenticated with a bearer token taken from `GITHUB_TOKEN`.
//! Installation tokens for GitHub Apps are minted outside of repoforge and
//! handed over through the same variable.

pub mod retry;

use crate::github::retry::{retry_with_backoff, RetryConfig, RetryError, Retryable};

use reqwest::{header, Client, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::{future::Future, sync::Arc, time::Duration};
use tracing::{debug, info, instrument};

/// Environment variable holding the API token.
pub const TOKEN_ENV: &str = "GITHUB_TOKEN";

/// Environment variable naming the authenticated user.
pub const USER_ENV: &str = "GITHUB_USER";

const API_VERSION: &str = "2022-11-28";

/// Repository as reported by the hosting API.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RemoteRepo {
    /// Repository name.
    pub name: String,

    /// Whether the repository is private.
    pub private: bool,

    /// URL to push to over HTTPS.
    pub clone_url: String,

    /// URL to push to over SSH.
    pub ssh_url: String,
}

/// Request to create a remote repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateRepo {
    /// Owning user or organization.
    #[serde(skip)]
    pub owner: String,

    pub name: String,
    pub description: String,
    pub private: bool,
    pub auto_init: bool,
}

/// Layer of indirection for remote repository hosting.
pub trait RemoteHost: Send + Sync + 'static {
    /// Look up repository under owner, `None` if it does not exist.
    fn find_repo(
        &self,
        owner: &str,
        name: &str,
    ) -> impl Future<Output = Result<Option<RemoteRepo>>> + Send;

    /// Create a new repository.
    fn create_repo(&self, request: &CreateRepo) -> impl Future<Output = Result<RemoteRepo>> + Send;

    /// Delete existing repository.
    fn delete_repo(&self, owner: &str, name: &str) -> impl Future<Output = Result<()>> + Send;
}

/// Remote hosting through the GitHub REST API.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: Client,
    api_url: String,
    token: Arc<SecretString>,
    user: Option<String>,
    retry: RetryConfig,
}

impl GitHubClient {
    /// Construct new GitHub client.
    ///
    /// Every request is bounded by `timeout`.
    ///
    /// # Errors
    ///
    /// - Return [`GitHubError::Client`] if the HTTP client cannot be built.
    pub fn new(
        api_url: impl Into<String>,
        token: SecretString,
        user: Option<String>,
        retry: RetryConfig,
        timeout: Duration,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("repoforge/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(GitHubError::Client)?;

        Ok(Self {
            http,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            token: Arc::new(token),
            user,
            retry,
        })
    }

    /// Authenticated user, if known.
    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    fn request(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{path}", self.api_url))
            .bearer_auth(self.token.expose_secret())
            .header(header::ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
    }

    async fn send(
        &self,
        build: impl Fn() -> RequestBuilder,
    ) -> std::result::Result<Response, RetryError<ApiError>> {
        let build = &build;
        retry_with_backoff(&self.retry, || async move {
            let response = build().send().await.map_err(ApiError::transport)?;
            ApiError::check(response).await
        })
        .await
    }

    fn creation_path(&self, owner: &str) -> String {
        match self.user.as_deref() {
            Some(user) if user == owner => "/user/repos".into(),
            _ => format!("/orgs/{owner}/repos"),
        }
    }
}

impl RemoteHost for GitHubClient {
    #[instrument(skip(self), level = "debug")]
    async fn find_repo(&self, owner: &str, name: &str) -> Result<Option<RemoteRepo>> {
        let path = format!("/repos/{owner}/{name}");
        match self.send(|| self.request(reqwest::Method::GET, &path)).await {
            Ok(response) => {
                let repo = response.json().await.map_err(ApiError::malformed)?;
                debug!("found {owner}/{name}");
                Ok(Some(repo))
            }
            Err(RetryError::Terminal(error)) if error.status == Some(StatusCode::NOT_FOUND) => {
                debug!("{owner}/{name} does not exist");
                Ok(None)
            }
            Err(error) => Err(error.into()),
        }
    }

    #[instrument(skip(self, request), fields(owner = %request.owner, name = %request.name))]
    async fn create_repo(&self, request: &CreateRepo) -> Result<RemoteRepo> {
        let path = self.creation_path(&request.owner);
        info!("create {}/{} (private={})", request.owner, request.name, request.private);
        let response = self
            .send(|| self.request(reqwest::Method::POST, &path).json(request))
            .await?;

        Ok(response.json().await.map_err(ApiError::malformed)?)
    }

    #[instrument(skip(self))]
    async fn delete_repo(&self, owner: &str, name: &str) -> Result<()> {
        let path = format!("/repos/{owner}/{name}");
        info!("delete {owner}/{name}");
        self.send(|| self.request(reqwest::Method::DELETE, &path))
            .await?;

        Ok(())
    }
}

/// Read API token from the environment.
///
/// # Errors
///
/// - Return [`GitHubError::MissingToken`] if no token is set.
pub fn token_from_env() -> Result<SecretString> {
    match std::env::var(TOKEN_ENV) {
        Ok(token) if !token.trim().is_empty() => Ok(SecretString::from(token)),
        _ => Err(GitHubError::MissingToken),
    }
}

/// Read authenticated user from the environment.
pub fn user_from_env() -> Option<String> {
    std::env::var(USER_ENV).ok().filter(|user| !user.is_empty())
}

/// Kind of API failure, categorized for retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// Trying again may succeed.
    Transient,

    /// Remote resource already exists in an incompatible state.
    Conflict,

    /// Requires human intervention.
    Permanent,
}

/// Single failed API request.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub status: Option<StatusCode>,
    pub message: String,

    #[source]
    pub source: Option<reqwest::Error>,
}

impl ApiError {
    /// Failure of a remote resource in an incompatible state.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self {
            kind: ApiErrorKind::Conflict,
            status: None,
            message: message.into(),
            source: None,
        }
    }

    fn transport(source: reqwest::Error) -> Self {
        let kind = if source.is_timeout() || source.is_connect() || source.is_request() {
            ApiErrorKind::Transient
        } else {
            ApiErrorKind::Permanent
        };

        Self {
            kind,
            status: source.status(),
            message: format!("request failed: {source}"),
            source: Some(source),
        }
    }

    fn malformed(source: reqwest::Error) -> Self {
        Self {
            kind: ApiErrorKind::Permanent,
            status: None,
            message: format!("malformed response: {source}"),
            source: Some(source),
        }
    }

    async fn check(response: Response) -> std::result::Result<Response, Self> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let rate_limited = response
            .headers()
            .get("x-ratelimit-remaining")
            .is_some_and(|remaining| remaining == "0");
        let body = response.text().await.unwrap_or_default();

        Err(Self {
            kind: classify(status, rate_limited),
            status: Some(status),
            message: format!("HTTP {}: {}", status.as_u16(), body.trim()),
            source: None,
        })
    }
}

impl Retryable for ApiError {
    fn is_transient(&self) -> bool {
        self.kind == ApiErrorKind::Transient
    }
}

fn classify(status: StatusCode, rate_limited: bool) -> ApiErrorKind {
    match status {
        StatusCode::TOO_MANY_REQUESTS => ApiErrorKind::Transient,
        StatusCode::FORBIDDEN if rate_limited => ApiErrorKind::Transient,
        StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => ApiErrorKind::Conflict,
        status if status.is_server_error() => ApiErrorKind::Transient,
        _ => ApiErrorKind::Permanent,
    }
}

/// All possible error types for hosting API interaction.
#[derive(Debug, thiserror::Error)]
pub enum GitHubError {
    /// Transient failures persisted through every retry.
    #[error("transient failure after {attempts} attempt(s): {source}")]
    Transient {
        attempts: u32,
        #[source]
        source: ApiError,
    },

    /// Remote resource exists in an incompatible state.
    #[error("conflict: {0}")]
    Conflict(#[source] ApiError),

    /// Request can never succeed as issued.
    #[error(transparent)]
    Permanent(ApiError),

    /// No API token available.
    #[error("no API token available, set {TOKEN_ENV}")]
    MissingToken,

    /// HTTP client cannot be constructed.
    #[error("failed to build HTTP client")]
    Client(#[source] reqwest::Error),
}

impl From<RetryError<ApiError>> for GitHubError {
    fn from(error: RetryError<ApiError>) -> Self {
        match error {
            RetryError::Exhausted { attempts, source } => Self::Transient { attempts, source },
            RetryError::Terminal(source) if source.kind == ApiErrorKind::Conflict => {
                Self::Conflict(source)
            }
            RetryError::Terminal(source) => Self::Permanent(source),
        }
    }
}

impl From<ApiError> for GitHubError {
    fn from(error: ApiError) -> Self {
        RetryError::Terminal(error).into()
    }
}

/// Friendly result alias :3
pub type Result<T, E = GitHubError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Options, RepoDescriptor};
    use mockito::{Matcher, Server};
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;

    const REPO_JSON: &str = r#"{
        "id": 1,
        "name": "demo",
        "full_name": "acme/demo",
        "private": true,
        "clone_url": "https://github.com/acme/demo.git",
        "ssh_url": "git@github.com:acme/demo.git"
    }"#;

    fn client(url: String, user: Option<&str>) -> GitHubClient {
        let retry = RetryConfig {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            jitter: 0.0,
        };
        GitHubClient::new(
            url,
            SecretString::from("s3cr3t"),
            user.map(Into::into),
            retry,
            Duration::from_secs(5),
        )
        .unwrap()
    }

    fn request(owner: &str) -> CreateRepo {
        CreateRepo {
            owner: owner.into(),
            name: "demo".into(),
            description: "Demo".into(),
            private: true,
            auto_init: false,
        }
    }

    #[test]
    fn classify_status_codes() {
        assert_eq!(classify(StatusCode::BAD_GATEWAY, false), ApiErrorKind::Transient);
        assert_eq!(classify(StatusCode::TOO_MANY_REQUESTS, false), ApiErrorKind::Transient);
        assert_eq!(classify(StatusCode::FORBIDDEN, true), ApiErrorKind::Transient);
        assert_eq!(classify(StatusCode::FORBIDDEN, false), ApiErrorKind::Permanent);
        assert_eq!(classify(StatusCode::UNPROCESSABLE_ENTITY, false), ApiErrorKind::Conflict);
        assert_eq!(classify(StatusCode::NOT_FOUND, false), ApiErrorKind::Permanent);
    }

    #[tokio::test]
    async fn find_existing_repo() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/repos/acme/demo")
            .match_header("authorization", "Bearer s3cr3t")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(REPO_JSON)
            .create_async()
            .await;

        let repo = client(server.url(), None).find_repo("acme", "demo").await.unwrap();
        assert_eq!(
            repo,
            Some(RemoteRepo {
                name: "demo".into(),
                private: true,
                clone_url: "https://github.com/acme/demo.git".into(),
                ssh_url: "git@github.com:acme/demo.git".into(),
            })
        );
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn missing_repo_is_none() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/repos/acme/demo")
            .with_status(404)
            .with_body(r#"{"message":"Not Found"}"#)
            .expect(1)
            .create_async()
            .await;

        let repo = client(server.url(), None).find_repo("acme", "demo").await.unwrap();
        assert_eq!(repo, None);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn server_errors_exhaust_retries() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/repos/acme/demo")
            .with_status(503)
            .expect(3)
            .create_async()
            .await;

        let result = client(server.url(), None).find_repo("acme", "demo").await;
        assert!(matches!(result, Err(GitHubError::Transient { attempts: 3, .. })));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn create_under_authenticated_user() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/user/repos")
            .match_body(Matcher::PartialJsonString(
                r#"{"name":"demo","private":true,"auto_init":false}"#.into(),
            ))
            .with_status(201)
            .with_body(REPO_JSON)
            .create_async()
            .await;

        let repo = client(server.url(), Some("alice"))
            .create_repo(&request("alice"))
            .await
            .unwrap();
        assert_eq!(repo.name, "demo");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn create_under_organization() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/orgs/acme/repos")
            .with_status(201)
            .with_body(REPO_JSON)
            .create_async()
            .await;

        client(server.url(), Some("alice"))
            .create_repo(&request("acme"))
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn default_owner_organization_is_not_created_under_user() {
        let mut server = Server::new_async().await;
        let org = server
            .mock("POST", "/orgs/acme/repos")
            .with_status(201)
            .with_body(REPO_JSON)
            .expect(1)
            .create_async()
            .await;
        let user = server.mock("POST", "/user/repos").expect(0).create_async().await;

        let options = Options {
            user: Some("alice".into()),
            owner: Some("acme".into()),
            ..Default::default()
        };
        let descriptor = RepoDescriptor::new("demo");
        let owner = descriptor.owner_or(options.default_owner()).unwrap();
        client(server.url(), options.user.as_deref())
            .create_repo(&request(owner))
            .await
            .unwrap();
        org.assert_async().await;
        user.assert_async().await;
    }

    #[tokio::test]
    async fn name_collision_is_conflict_and_not_retried() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/orgs/acme/repos")
            .with_status(422)
            .with_body(r#"{"message":"name already exists on this account"}"#)
            .expect(1)
            .create_async()
            .await;

        let result = client(server.url(), None).create_repo(&request("acme")).await;
        assert!(matches!(result, Err(GitHubError::Conflict(_))));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn malformed_body_is_permanent() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/repos/acme/demo")
            .with_status(200)
            .with_body("<html>definitely not json</html>")
            .create_async()
            .await;

        let result = client(server.url(), None).find_repo("acme", "demo").await;
        assert!(matches!(result, Err(GitHubError::Permanent(_))));
    }

    #[tokio::test]
    async fn delete_repo() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("DELETE", "/repos/acme/demo")
            .with_status(204)
            .create_async()
            .await;

        client(server.url(), None).delete_repo("acme", "demo").await.unwrap();
        mock.assert_async().await;
    }

    #[sealed_test(env = [("GITHUB_TOKEN", "ghp_example")])]
    fn read_token_from_env() {
        let token = token_from_env().unwrap();
        assert_eq!(token.expose_secret(), "ghp_example");
    }

    #[sealed_test(env = [("GITHUB_TOKEN", "")])]
    fn empty_token_is_missing() {
        assert!(matches!(token_from_env(), Err(GitHubError::MissingToken)));
    }
}
