// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use repoforge::{
    batch::{repos::RepoBatch, BatchPolicy},
    config::{Manifest, RepoDescriptor, Transport},
    events::{EventEmitter, EventStore, WebhookSink},
    github::{self, GitHubClient},
    insight::{
        analytics::{Analytics, ReportFormat},
        health::HealthReport,
        names::suggest_names,
    },
    path::{default_manifest_path, default_templates_dir},
    sync::{dispatch::Dispatcher, SyncJob, SyncSettings},
};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::ProgressBar;
use std::{
    fs,
    num::NonZeroUsize,
    path::{Path, PathBuf},
    process::exit,
    sync::Arc,
};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "repoforge [options] <repoforge-command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    async fn run(self) -> Result<()> {
        match self.command {
            Command::Sync(opts) => run_sync(opts).await,
            Command::Init(opts) => run_init(opts),
            Command::List(opts) => run_list(opts),
            Command::Suggest(opts) => run_suggest(opts),
            Command::Health(opts) => run_health(opts),
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Synchronize every repository listed in manifest.
    #[command(override_usage = "repoforge sync [options]")]
    Sync(SyncOptions),

    /// Write starter manifest.
    #[command(override_usage = "repoforge init [options]")]
    Init(InitOptions),

    /// List repositories of manifest.
    #[command(override_usage = "repoforge list [options]")]
    List(ListOptions),

    /// Suggest repository names from a description.
    #[command(override_usage = "repoforge suggest [options] <description>")]
    Suggest(SuggestOptions),

    /// Score health of local repository.
    #[command(override_usage = "repoforge health [<path>]")]
    Health(HealthOptions),
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct SyncOptions {
    /// Path to manifest.
    #[arg(short, long, value_name = "path")]
    pub config: Option<PathBuf>,

    /// Plan every stage without changing anything.
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Reinitialize local repositories that already exist.
    #[arg(short, long)]
    pub force: bool,

    /// Number of repositories synchronized concurrently.
    #[arg(short, long, value_name = "count")]
    pub workers: Option<usize>,

    /// Default owner of repositories without one.
    #[arg(short, long, value_name = "owner")]
    pub owner: Option<String>,

    /// Push through SSH instead of token-authenticated HTTPS.
    #[arg(long)]
    pub ssh: bool,

    /// Keep creating repositories after a batch step fails.
    #[arg(long)]
    pub continue_on_error: bool,

    /// Write standard community files into every repository.
    #[arg(short, long)]
    pub auto_templates: bool,

    /// Directory containing templates.
    #[arg(short, long, value_name = "path")]
    pub templates_dir: Option<PathBuf>,

    /// Create every remote repository as one batch before synchronizing.
    #[arg(short, long)]
    pub batch: bool,

    /// Export event log as JSON.
    #[arg(short, long, value_name = "path")]
    pub events_out: Option<PathBuf>,

    /// Print analytics over created repositories (text or markdown).
    #[arg(long, value_name = "format")]
    pub analytics: Option<ReportFormat>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct InitOptions {
    /// Path to write manifest to.
    #[arg(short, long, value_name = "path")]
    pub config: Option<PathBuf>,

    /// Overwrite existing manifest.
    #[arg(short, long)]
    pub force: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct ListOptions {
    /// Path to manifest.
    #[arg(short, long, value_name = "path")]
    pub config: Option<PathBuf>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct SuggestOptions {
    /// Description of repository.
    #[arg(required = true, value_name = "description")]
    pub description: String,

    /// Current name to exclude from suggestions.
    #[arg(short, long, value_name = "name", default_value = "")]
    pub current: String,

    /// Maximum number of suggestions.
    #[arg(short = 'n', long, value_name = "count", default_value_t = 5)]
    pub count: usize,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct HealthOptions {
    /// Path to repository work tree.
    #[arg(value_name = "path", default_value = ".")]
    pub path: PathBuf,
}

#[tokio::main]
async fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .with_timer(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = run().await {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

async fn run() -> Result<()> {
    Cli::parse().run().await
}

fn read_manifest(path: &Path) -> Result<Manifest> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("failed to read manifest {}", path.display()))?;
    let manifest = data
        .parse::<Manifest>()
        .with_context(|| format!("invalid manifest {}", path.display()))?;

    Ok(manifest)
}

async fn run_sync(opts: SyncOptions) -> Result<()> {
    let path = opts.config.unwrap_or_else(default_manifest_path);
    let mut manifest = read_manifest(&path)?;

    // INVARIANT: Command line flags take precedence over manifest options.
    let options = &mut manifest.options;
    options.user = github::user_from_env().or(options.user.take());
    if let Some(owner) = opts.owner {
        options.owner = Some(owner);
    }
    options.dry_run |= opts.dry_run;
    options.force |= opts.force;
    options.auto_templates |= opts.auto_templates;
    if let Some(workers) = opts.workers {
        options.workers = workers;
    }
    if opts.ssh {
        options.transport = Transport::Ssh;
    }
    if opts.continue_on_error {
        options.batch_policy = BatchPolicy::ContinueOnError;
    }
    options.templates_dir = match opts.templates_dir {
        Some(dir) => Some(dir),
        None => options
            .templates_dir
            .take()
            .or_else(|| default_templates_dir().ok().filter(|dir| dir.is_dir())),
    };
    manifest.validate()?;

    let options = &manifest.options;
    let workers = NonZeroUsize::new(options.workers).context("worker count must be at least one")?;
    let workdir = std::env::current_dir().context("cannot determine working directory")?;

    let host = Arc::new(GitHubClient::new(
        options.api_url.as_str(),
        github::token_from_env()?,
        options.user.clone(),
        (&manifest.retry).into(),
        options.http_timeout(),
    )?);

    let store = Arc::new(EventStore::new());
    let mut emitter = EventEmitter::new(store.clone(), manifest.events.rewards.clone());
    if let Some(url) = &manifest.events.webhook_url {
        emitter = emitter.with_webhook(WebhookSink::new(url.as_str(), manifest.events.timeout())?);
    }
    let events = Arc::new(emitter);

    if opts.batch {
        if options.dry_run {
            info!("dry run, skipping batch creation of {} repositories", manifest.repos.len());
        } else {
            let batch = RepoBatch::new(host.clone(), options.user.clone(), &workdir, options.batch_policy)
                .with_default_owner(options.owner.clone())
                .with_events(events.clone());
            let report = batch.create_all(&manifest.repos).await?;
            info!("batch: {report}");
            if !report.succeeded() {
                for failure in &report.failures {
                    error!("batch step {} failed: {}", failure.id, failure.message);
                }
                for failure in &report.rollback_failures {
                    warn!("rollback of {} failed: {}", failure.id, failure.message);
                }
                finish_events(&events, opts.events_out.as_deref()).await?;
                bail!("batch creation failed, nothing synchronized");
            }
        }
    }

    let settings = SyncSettings::from_options(options, &workdir).with_token(Arc::new(github::token_from_env()?));
    let job = Arc::new(SyncJob::new(host, settings).with_events(events.clone()));
    let dispatcher = Dispatcher::new(workers)
        .with_deadline(options.deadline())
        .with_progress(ProgressBar::new(manifest.repos.len() as u64));
    let report = dispatcher.run(job, manifest.repos.clone()).await?;

    let mut analytics = Analytics::new();
    for outcome in report.iter() {
        match &outcome.error {
            None => println!("{}: ok in {:.2?}", outcome.descriptor_name, outcome.elapsed),
            Some(error) => println!("{}: {error}", outcome.descriptor_name),
        }
        if options.dry_run {
            for step in &outcome.plan {
                println!("  - {step}");
            }
        }

        let Some(descriptor) = find_descriptor(&manifest.repos, &outcome.descriptor_name) else {
            continue;
        };
        if outcome.created_remote {
            let owner = descriptor
                .owner_or(options.default_owner())
                .unwrap_or_default();
            analytics.track(&descriptor.name, owner, descriptor.private, descriptor.template.as_deref());
        }
        if outcome.succeeded && !options.dry_run {
            if let Some(local) = &outcome.local_path {
                match HealthReport::scan(local) {
                    Ok(health) => {
                        let subject = options.user.as_deref().or(descriptor.owner.as_deref()).unwrap_or_default();
                        health.emit(&events, subject, Some(&descriptor.name));
                        info!("{}: {}", descriptor.name, health.rating);
                    }
                    Err(error) => warn!("cannot score {}: {error}", local.display()),
                }
            }
        }
    }

    if let Some(format) = opts.analytics {
        println!("{}", analytics.report(format));
    }

    finish_events(&events, opts.events_out.as_deref()).await?;

    let summary = report.summary();
    if !summary.is_complete() {
        bail!("sync {summary}");
    }
    info!("sync {summary}");

    Ok(())
}

fn find_descriptor<'a>(repos: &'a [RepoDescriptor], name: &str) -> Option<&'a RepoDescriptor> {
    repos.iter().find(|repo| repo.name == name)
}

async fn finish_events(events: &EventEmitter, out: Option<&Path>) -> Result<()> {
    events.drain().await;

    let summary = events.store().summary();
    info!(
        "recorded {} events worth {} points",
        summary.total_events, summary.total_reward
    );
    for (subject, totals) in &summary.subjects {
        info!("  {subject}: {} events, {} points", totals.events, totals.reward);
    }

    if let Some(path) = out {
        events.store().export(path)?;
    }

    Ok(())
}

fn run_init(opts: InitOptions) -> Result<()> {
    let path = opts.config.unwrap_or_else(default_manifest_path);
    if path.exists() && !opts.force {
        bail!("manifest {} already exists, use --force to overwrite", path.display());
    }

    let mut manifest = Manifest::default();
    manifest.options.user = github::user_from_env();
    let mut example = RepoDescriptor::new("my-project");
    example.description = Some("<put one sentence description here>".into());
    manifest.repos.push(example);

    fs::write(&path, manifest.to_string())
        .with_context(|| format!("failed to write manifest {}", path.display()))?;
    info!("wrote starter manifest to {}", path.display());

    Ok(())
}

fn run_list(opts: ListOptions) -> Result<()> {
    let path = opts.config.unwrap_or_else(default_manifest_path);
    let manifest = read_manifest(&path)?;
    let workdir = std::env::current_dir().context("cannot determine working directory")?;

    for repo in &manifest.repos {
        let owner = repo
            .owner_or(manifest.options.default_owner())
            .unwrap_or("<unknown>");
        println!(
            "{owner}/{} ({}) template={} path={}",
            repo.name,
            if repo.private { "private" } else { "public" },
            repo.template.as_deref().unwrap_or("none"),
            repo.resolve_local_path(&workdir).display(),
        );
    }

    Ok(())
}

fn run_suggest(opts: SuggestOptions) -> Result<()> {
    let suggestions = suggest_names(&opts.description, &opts.current, opts.count);
    if suggestions.is_empty() {
        bail!("no suggestions for {:?}", opts.description);
    }
    for suggestion in suggestions {
        println!("{suggestion}");
    }

    Ok(())
}

fn run_health(opts: HealthOptions) -> Result<()> {
    let report = HealthReport::scan(&opts.path)?;
    print!("{report}");

    Ok(())
}
