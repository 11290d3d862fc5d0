// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Developer activity events.
//!
//! Completed operations are recorded as __events__ that carry a reward value
//! for the developer that caused them. Events are appended to an
//! [`EventStore`] owned by the run that created it, and may additionally be
//! forwarded to an external gamification service through a webhook.
//!
//! # Delivery Guarantees
//!
//! Webhook delivery is fire-and-forget: one POST per event, bounded by a
//! short timeout, never retried. Failures are logged and swallowed. The
//! in-memory record is the source of truth and is written before delivery
//! is even attempted. Delivery is therefore at-most-once with no ordering
//! guarantee between events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter, Result as FmtResult},
    fs::File,
    io::{BufWriter, Write},
    path::Path,
    sync::{Arc, Mutex, RwLock},
    time::Duration,
};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

/// Known kinds of developer activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    RepoCreated,
    RepoInitialized,
    TemplateApplied,
    HealthExcellent,
    HealthGood,
    HealthFair,
    BatchOperationSuccess,
    SecurityPolicyAdded,
    CiSetup,
    TestsAdded,
}

impl EventKind {
    pub const ALL: [EventKind; 10] = [
        Self::RepoCreated,
        Self::RepoInitialized,
        Self::TemplateApplied,
        Self::HealthExcellent,
        Self::HealthGood,
        Self::HealthFair,
        Self::BatchOperationSuccess,
        Self::SecurityPolicyAdded,
        Self::CiSetup,
        Self::TestsAdded,
    ];

    /// Name of kind as used in configuration and on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RepoCreated => "repo_created",
            Self::RepoInitialized => "repo_initialized",
            Self::TemplateApplied => "template_applied",
            Self::HealthExcellent => "health_excellent",
            Self::HealthGood => "health_good",
            Self::HealthFair => "health_fair",
            Self::BatchOperationSuccess => "batch_operation_success",
            Self::SecurityPolicyAdded => "security_policy_added",
            Self::CiSetup => "ci_setup",
            Self::TestsAdded => "tests_added",
        }
    }
}

impl Display for EventKind {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.as_str())
    }
}

/// Mapping of event kinds to reward values.
///
/// Kinds without an entry are worth nothing, but are still recorded.
///
/// # Invariant
///
/// - Configured entries are laid over the default table, so a manifest only
///   needs to list the kinds it wants to change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewardTable(BTreeMap<String, u32>);

impl RewardTable {
    /// Table that rewards nothing.
    pub fn empty() -> Self {
        Self(BTreeMap::new())
    }

    /// Set reward value of given kind.
    pub fn with(mut self, kind: EventKind, value: u32) -> Self {
        self.0.insert(kind.as_str().into(), value);
        self
    }

    /// Reward value of given kind, zero if not configured.
    pub fn reward_for(&self, kind: EventKind) -> u32 {
        self.0.get(kind.as_str()).copied().unwrap_or(0)
    }
}

impl Default for RewardTable {
    fn default() -> Self {
        Self::empty()
            .with(EventKind::RepoCreated, 50)
            .with(EventKind::RepoInitialized, 30)
            .with(EventKind::TemplateApplied, 20)
            .with(EventKind::HealthExcellent, 100)
            .with(EventKind::HealthGood, 50)
            .with(EventKind::HealthFair, 25)
            .with(EventKind::BatchOperationSuccess, 75)
            .with(EventKind::SecurityPolicyAdded, 40)
            .with(EventKind::CiSetup, 60)
            .with(EventKind::TestsAdded, 50)
    }
}

impl Serialize for RewardTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for RewardTable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let overrides = BTreeMap::<String, u32>::deserialize(deserializer)?;
        let mut table = Self::default();
        table.0.extend(overrides);
        Ok(table)
    }
}

/// Scalar metadata value attached to an event.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<u32> for Scalar {
    fn from(value: u32) -> Self {
        Self::Int(value.into())
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Self::Text(value.into())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Event metadata.
pub type Metadata = BTreeMap<String, Scalar>;

/// Recorded developer activity.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Event {
    pub kind: EventKind,

    /// Developer identity.
    pub subject: String,

    /// Repository the activity happened in.
    pub target: Option<String>,

    pub timestamp: DateTime<Utc>,
    pub reward_value: u32,
    pub metadata: Metadata,
}

/// Append-only record of events.
///
/// Shared by every component of a run. Appends are atomic with respect to
/// each other, and readers always see a consistent snapshot.
#[derive(Debug, Default)]
pub struct EventStore {
    events: RwLock<Vec<Event>>,
}

impl EventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, event: Event) {
        match self.events.write() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }

    /// Copy of all events recorded so far, in order of appending.
    pub fn snapshot(&self) -> Vec<Event> {
        self.read(|events| events.to_vec())
    }

    pub fn len(&self) -> usize {
        self.read(|events| events.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sum of reward values over all events of given subject.
    pub fn total_reward(&self, subject: &str) -> u64 {
        self.read(|events| {
            events
                .iter()
                .filter(|event| event.subject == subject)
                .map(|event| u64::from(event.reward_value))
                .sum()
        })
    }

    /// Per-subject and per-kind totals.
    pub fn summary(&self) -> EventSummary {
        self.read(|events| {
            let mut summary = EventSummary::default();
            for event in events {
                summary.total_events += 1;
                summary.total_reward += u64::from(event.reward_value);

                let subject = summary.subjects.entry(event.subject.clone()).or_default();
                subject.events += 1;
                subject.reward += u64::from(event.reward_value);
                if let Some(target) = &event.target {
                    if !subject.targets.contains(target) {
                        subject.targets.push(target.clone());
                    }
                }

                let kind = summary.kinds.entry(event.kind).or_default();
                kind.count += 1;
                kind.reward += u64::from(event.reward_value);
            }
            summary
        })
    }

    /// Export every event as pretty JSON.
    ///
    /// # Errors
    ///
    /// - Return [`EventError::Export`] if the file cannot be written.
    pub fn export(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let export = |source| EventError::Export {
            source,
            path: path.to_path_buf(),
        };

        let mut writer = BufWriter::new(File::create(path).map_err(export)?);
        serde_json::to_writer_pretty(&mut writer, &self.snapshot())
            .map_err(|err| export(err.into()))?;
        writer.flush().map_err(export)?;
        info!("exported {} events to {}", self.len(), path.display());

        Ok(())
    }

    fn read<T>(&self, reader: impl FnOnce(&[Event]) -> T) -> T {
        match self.events.read() {
            Ok(events) => reader(&events),
            Err(poisoned) => reader(&poisoned.into_inner()),
        }
    }
}

/// Aggregated event statistics.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EventSummary {
    pub total_events: usize,
    pub total_reward: u64,
    pub subjects: BTreeMap<String, SubjectSummary>,
    pub kinds: BTreeMap<EventKind, KindSummary>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SubjectSummary {
    pub events: usize,
    pub reward: u64,
    pub targets: Vec<String>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct KindSummary {
    pub count: usize,
    pub reward: u64,
}

/// Emit events into a store, optionally forwarding them to a webhook.
#[derive(Debug)]
pub struct EventEmitter {
    store: Arc<EventStore>,
    rewards: RewardTable,
    sink: Option<WebhookSink>,
    deliveries: Mutex<Vec<JoinHandle<()>>>,
}

impl EventEmitter {
    /// Construct new emitter without webhook.
    pub fn new(store: Arc<EventStore>, rewards: RewardTable) -> Self {
        Self {
            store,
            rewards,
            sink: None,
            deliveries: Mutex::new(Vec::new()),
        }
    }

    /// Forward every emitted event to given webhook.
    pub fn with_webhook(mut self, sink: WebhookSink) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn store(&self) -> &Arc<EventStore> {
        &self.store
    }

    /// Record an event, and hand it to the webhook if one is configured.
    ///
    /// Never blocks on delivery. Outside of a Tokio runtime the webhook is
    /// skipped entirely.
    #[instrument(skip(self, metadata), level = "debug")]
    pub fn emit(
        &self,
        kind: EventKind,
        subject: &str,
        target: Option<&str>,
        metadata: Metadata,
    ) -> Event {
        let event = Event {
            kind,
            subject: subject.into(),
            target: target.map(Into::into),
            timestamp: Utc::now(),
            reward_value: self.rewards.reward_for(kind),
            metadata,
        };
        self.store.append(event.clone());
        debug!("recorded {kind} ({} points) for {subject}", event.reward_value);

        if let Some(sink) = &self.sink {
            match tokio::runtime::Handle::try_current() {
                Ok(runtime) => {
                    let sink = sink.clone();
                    let payload = event.clone();
                    let handle = runtime.spawn(async move {
                        if let Err(error) = sink.deliver(&payload).await {
                            warn!("failed to deliver {} event: {error}", payload.kind);
                        }
                    });
                    self.track(handle);
                }
                Err(_) => warn!("no async runtime available, webhook skipped for {kind}"),
            }
        }

        event
    }

    /// Wait for every in-flight webhook delivery to finish.
    ///
    /// Deliveries are bounded by the sink's timeout, so this never waits
    /// longer than that per event.
    pub async fn drain(&self) {
        let handles = match self.deliveries.lock() {
            Ok(mut handles) => std::mem::take(&mut *handles),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };

        for handle in handles {
            if let Err(error) = handle.await {
                warn!("webhook delivery task failed: {error}");
            }
        }
    }

    fn track(&self, handle: JoinHandle<()>) {
        match self.deliveries.lock() {
            Ok(mut handles) => {
                handles.retain(|handle| !handle.is_finished());
                handles.push(handle);
            }
            Err(poisoned) => poisoned.into_inner().push(handle),
        }
    }
}

/// Webhook destination for events.
#[derive(Debug, Clone)]
pub struct WebhookSink {
    http: reqwest::Client,
    url: String,
}

impl WebhookSink {
    /// Construct new webhook sink.
    ///
    /// # Errors
    ///
    /// - Return [`EventError::Client`] if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(EventError::Client)?;

        Ok(Self {
            http,
            url: url.into(),
        })
    }

    /// POST event once.
    ///
    /// # Errors
    ///
    /// - Return [`EventError::Webhook`] on network failure or non-2xx status.
    pub async fn deliver(&self, event: &Event) -> Result<()> {
        let response = self
            .http
            .post(&self.url)
            .json(event)
            .send()
            .await
            .map_err(EventError::Webhook)?;
        response.error_for_status().map_err(EventError::Webhook)?;
        info!(
            "delivered {} event ({} points) for {}",
            event.kind, event.reward_value, event.subject
        );

        Ok(())
    }
}

/// All possible error types for event handling.
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    /// Webhook delivery fails.
    #[error("webhook delivery failed")]
    Webhook(#[source] reqwest::Error),

    /// HTTP client cannot be constructed.
    #[error("failed to build webhook client")]
    Client(#[source] reqwest::Error),

    /// Event log cannot be written.
    #[error("failed to export events to {:?}", path.display())]
    Export {
        #[source]
        source: std::io::Error,
        path: std::path::PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = EventError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use pretty_assertions::assert_eq;

    fn emitter(rewards: RewardTable) -> EventEmitter {
        EventEmitter::new(Arc::new(EventStore::new()), rewards)
    }

    #[test]
    fn rewards_accumulate_per_subject() {
        let rewards = RewardTable::empty()
            .with(EventKind::RepoCreated, 50)
            .with(EventKind::HealthExcellent, 100);
        let emitter = emitter(rewards);

        emitter.emit(EventKind::RepoCreated, "alice", Some("demo"), Metadata::new());
        emitter.emit(EventKind::HealthExcellent, "alice", Some("demo"), Metadata::new());
        emitter.emit(EventKind::RepoCreated, "bob", None, Metadata::new());

        assert_eq!(emitter.store().total_reward("alice"), 150);
        assert_eq!(emitter.store().total_reward("bob"), 50);
        assert_eq!(emitter.store().len(), 3);
    }

    #[test]
    fn unconfigured_kind_is_worth_nothing_but_recorded() {
        let emitter = emitter(RewardTable::empty().with(EventKind::RepoCreated, 50));
        let event = emitter.emit(EventKind::CiSetup, "alice", None, Metadata::new());

        assert_eq!(event.reward_value, 0);
        assert_eq!(emitter.store().len(), 1);
        assert_eq!(emitter.store().total_reward("alice"), 0);
    }

    #[test]
    fn concurrent_emits_lose_nothing() {
        let emitter = Arc::new(emitter(RewardTable::default()));
        std::thread::scope(|scope| {
            for _ in 0..8 {
                let emitter = emitter.clone();
                scope.spawn(move || {
                    for _ in 0..100 {
                        emitter.emit(EventKind::RepoCreated, "alice", None, Metadata::new());
                    }
                });
            }
        });

        assert_eq!(emitter.store().len(), 800);
        assert_eq!(emitter.store().total_reward("alice"), 800 * 50);
    }

    #[test]
    fn configured_rewards_overlay_defaults() -> anyhow::Result<()> {
        let table: RewardTable = toml::from_str("repo_created = 5\nlegacy_kind = 9\n")?;
        assert_eq!(table.reward_for(EventKind::RepoCreated), 5);
        assert_eq!(table.reward_for(EventKind::HealthExcellent), 100);
        Ok(())
    }

    #[test]
    fn summarize_events() {
        let emitter = emitter(RewardTable::default());
        emitter.emit(EventKind::RepoCreated, "alice", Some("a"), Metadata::new());
        emitter.emit(EventKind::RepoCreated, "alice", Some("b"), Metadata::new());
        emitter.emit(EventKind::TemplateApplied, "bob", Some("a"), Metadata::new());

        let summary = emitter.store().summary();
        assert_eq!(summary.total_events, 3);
        assert_eq!(summary.total_reward, 120);
        assert_eq!(summary.subjects["alice"].targets, vec!["a", "b"]);
        assert_eq!(summary.kinds[&EventKind::RepoCreated].count, 2);
    }

    #[test]
    fn serialized_event_layout() -> anyhow::Result<()> {
        let mut metadata = Metadata::new();
        metadata.insert("private".into(), true.into());
        let event = Event {
            kind: EventKind::HealthGood,
            subject: "alice".into(),
            target: Some("demo".into()),
            timestamp: "2025-01-02T03:04:05Z".parse()?,
            reward_value: 50,
            metadata,
        };

        let value = serde_json::to_value(&event)?;
        assert_eq!(
            value,
            serde_json::json!({
                "kind": "health_good",
                "subject": "alice",
                "target": "demo",
                "timestamp": "2025-01-02T03:04:05Z",
                "reward_value": 50,
                "metadata": { "private": true }
            })
        );

        Ok(())
    }

    #[test]
    fn export_events_as_json() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let emitter = emitter(RewardTable::default());
        emitter.emit(EventKind::RepoCreated, "alice", Some("demo"), Metadata::new());

        let path = dir.path().join("events.json");
        emitter.store().export(&path)?;
        let events: Vec<Event> = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
        assert_eq!(events, emitter.store().snapshot());

        Ok(())
    }

    #[test]
    fn export_reports_unwritable_path() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let emitter = emitter(RewardTable::default());
        emitter.emit(EventKind::RepoCreated, "alice", Some("demo"), Metadata::new());

        let path = dir.path().join("missing/events.json");
        let result = emitter.store().export(&path);
        assert!(matches!(result, Err(EventError::Export { path: failed, .. }) if failed == path));

        Ok(())
    }

    #[tokio::test]
    async fn webhook_receives_event() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/hook")
            .match_body(Matcher::PartialJsonString(
                r#"{"kind":"repo_created","subject":"alice","reward_value":50}"#.into(),
            ))
            .with_status(200)
            .expect(1)
            .create_async()
            .await;

        let sink = WebhookSink::new(format!("{}/hook", server.url()), Duration::from_secs(5)).unwrap();
        let emitter = emitter(RewardTable::default()).with_webhook(sink);
        emitter.emit(EventKind::RepoCreated, "alice", Some("demo"), Metadata::new());
        emitter.drain().await;

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn webhook_failure_is_swallowed() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/hook")
            .with_status(500)
            .expect(1)
            .create_async()
            .await;

        let sink = WebhookSink::new(format!("{}/hook", server.url()), Duration::from_secs(5)).unwrap();
        let emitter = emitter(RewardTable::default()).with_webhook(sink);
        let event = emitter.emit(EventKind::RepoCreated, "alice", None, Metadata::new());
        emitter.drain().await;

        assert_eq!(event.reward_value, 50);
        assert_eq!(emitter.store().total_reward("alice"), 50);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn sink_reports_non_success_status() {
        let mut server = Server::new_async().await;
        server.mock("POST", "/hook").with_status(404).create_async().await;

        let sink = WebhookSink::new(format!("{}/hook", server.url()), Duration::from_secs(5)).unwrap();
        let event = emitter(RewardTable::default())
            .emit(EventKind::RepoCreated, "alice", None, Metadata::new());
        assert!(matches!(sink.deliver(&event).await, Err(EventError::Webhook(_))));
    }
}
