// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Analytics over created repositories.
//!
//! Track every repository a run creates, then summarize visibility, owners,
//! templates, and naming conventions. Reports render as plain text or
//! Markdown.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use regex::Regex;
use serde::Serialize;
use std::{
    collections::BTreeMap,
    fmt::Write,
    str::FromStr,
    sync::LazyLock,
};

static CAMEL_CASE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-zA-Z0-9]*[A-Z]").ok());

/// Repository tracked for analytics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackedRepo {
    pub name: String,
    pub owner: String,
    pub private: bool,
    pub template: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Naming convention statistics.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct NamePatterns {
    pub kebab_case: usize,
    pub snake_case: usize,
    pub camel_case: usize,

    /// Most common kebab-case prefixes, at most five.
    pub common_prefixes: Vec<(String, usize)>,

    pub average_length: f64,
    pub shortest: Option<String>,
    pub longest: Option<String>,
}

/// Summary statistics over every tracked repository.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub total: usize,
    pub private: usize,
    pub public: usize,
    pub private_percentage: f64,
    pub by_owner: BTreeMap<String, usize>,

    /// Repositories without template are counted under `none`.
    pub by_template: BTreeMap<String, usize>,

    pub name_patterns: NamePatterns,
    pub most_active_owner: Option<String>,
    pub most_used_template: Option<String>,
}

/// Window of the creation trend shown in reports.
pub const REPORT_WINDOW_HOURS: i64 = 24;

/// Creation trend within a time window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trend {
    pub window_hours: i64,
    pub created: usize,
    pub per_hour: f64,
    pub projected_daily: f64,

    /// Recent repositories, newest first.
    pub recent: Vec<TrackedRepo>,
}

/// Output format of an analytics report.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    #[default]
    Text,
    Markdown,
}

impl FromStr for ReportFormat {
    type Err = UnknownFormat;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        match data {
            "text" => Ok(Self::Text),
            "markdown" | "md" => Ok(Self::Markdown),
            other => Err(UnknownFormat(other.into())),
        }
    }
}

/// Report format name is not recognized.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown report format {0:?}, expected text or markdown")]
pub struct UnknownFormat(String);

/// Repository analytics tracker.
#[derive(Debug, Default, Clone)]
pub struct Analytics {
    repos: Vec<TrackedRepo>,
}

impl Analytics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track newly created repository.
    pub fn track(&mut self, name: &str, owner: &str, private: bool, template: Option<&str>) {
        self.track_at(name, owner, private, template, Utc::now());
    }

    /// Track repository created at given instant.
    pub fn track_at(
        &mut self,
        name: &str,
        owner: &str,
        private: bool,
        template: Option<&str>,
        created_at: DateTime<Utc>,
    ) {
        self.repos.push(TrackedRepo {
            name: name.into(),
            owner: owner.into(),
            private,
            template: template.map(Into::into),
            created_at,
        });
    }

    pub fn len(&self) -> usize {
        self.repos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.repos.is_empty()
    }

    pub fn summary(&self) -> Summary {
        if self.repos.is_empty() {
            return Summary::default();
        }

        let total = self.repos.len();
        let private = self.repos.iter().filter(|repo| repo.private).count();

        let mut by_owner = BTreeMap::new();
        let mut by_template = BTreeMap::new();
        for repo in &self.repos {
            *by_owner.entry(repo.owner.clone()).or_insert(0) += 1;
            let template = repo.template.clone().unwrap_or_else(|| "none".into());
            *by_template.entry(template).or_insert(0) += 1;
        }

        Summary {
            total,
            private,
            public: total - private,
            private_percentage: round1(private as f64 / total as f64 * 100.0),
            most_active_owner: most_common(&by_owner),
            most_used_template: most_common(&by_template),
            by_owner,
            by_template,
            name_patterns: self.name_patterns(),
        }
    }

    fn name_patterns(&self) -> NamePatterns {
        let names: Vec<&str> = self.repos.iter().map(|repo| repo.name.as_str()).collect();
        if names.is_empty() {
            return NamePatterns::default();
        }

        let mut prefixes: BTreeMap<String, usize> = BTreeMap::new();
        for name in &names {
            if let Some((prefix, _)) = name.split_once('-') {
                if prefix.len() <= 10 {
                    *prefixes.entry(prefix.into()).or_insert(0) += 1;
                }
            }
        }
        let mut common_prefixes: Vec<_> = prefixes.into_iter().collect();
        common_prefixes.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        common_prefixes.truncate(5);

        let camel = CAMEL_CASE.as_ref();
        NamePatterns {
            kebab_case: names.iter().filter(|n| n.contains('-') && !n.contains('_')).count(),
            snake_case: names.iter().filter(|n| n.contains('_')).count(),
            camel_case: names
                .iter()
                .filter(|n| camel.is_some_and(|re| re.is_match(n)))
                .count(),
            common_prefixes,
            average_length: round1(names.iter().map(|n| n.len()).sum::<usize>() as f64 / names.len() as f64),
            shortest: names.iter().min_by_key(|n| n.len()).map(|n| n.to_string()),
            longest: names.iter().max_by_key(|n| n.len()).map(|n| n.to_string()),
        }
    }

    /// Recommendations derived from the summary.
    pub fn recommendations(&self) -> Vec<String> {
        let summary = self.summary();
        if summary.total == 0 {
            return vec!["Create some repositories to get recommendations".into()];
        }

        let mut recommendations = Vec::new();
        if summary.private == 0 {
            recommendations
                .push("All repositories are public. Consider making sensitive repositories private.".into());
        } else if summary.public == 0 {
            recommendations
                .push("All repositories are private. Consider open-sourcing some if appropriate.".into());
        }

        let untemplated = summary.by_template.get("none").copied().unwrap_or(0);
        if untemplated as f64 > summary.total as f64 * 0.3 {
            recommendations.push(
                "Many repositories without templates. Consider using templates for consistency.".into(),
            );
        }

        let patterns = &summary.name_patterns;
        if patterns.kebab_case > 0 && patterns.snake_case > 0 {
            recommendations.push(
                "Mixed naming conventions detected (kebab-case and snake_case). Consider standardizing on one."
                    .into(),
            );
        }

        if summary.by_owner.len() > 3 {
            recommendations.push(format!(
                "Repositories spread across {} owners. Consider consolidating under fewer organizations.",
                summary.by_owner.len()
            ));
        }

        recommendations
    }

    /// Creation trend over the last `window_hours` hours.
    pub fn trend(&self, window_hours: i64) -> Trend {
        self.trend_at(window_hours, Utc::now())
    }

    fn trend_at(&self, window_hours: i64, now: DateTime<Utc>) -> Trend {
        let cutoff = now - ChronoDuration::hours(window_hours);
        let mut recent: Vec<TrackedRepo> = self
            .repos
            .iter()
            .filter(|repo| repo.created_at >= cutoff)
            .cloned()
            .collect();
        recent.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let per_hour = match recent.last() {
            Some(oldest) => {
                let hours = (now - oldest.created_at).num_seconds() as f64 / 3600.0;
                if hours > 0.0 {
                    recent.len() as f64 / hours
                } else {
                    0.0
                }
            }
            None => 0.0,
        };

        Trend {
            window_hours,
            created: recent.len(),
            per_hour: (per_hour * 100.0).round() / 100.0,
            projected_daily: round1(per_hour * 24.0),
            recent,
        }
    }

    /// Render report in given format.
    pub fn report(&self, format: ReportFormat) -> String {
        let summary = self.summary();
        let trend = self.trend(REPORT_WINDOW_HOURS);
        let recommendations = self.recommendations();
        let generated = Utc::now().format("%Y-%m-%d %H:%M:%S").to_string();

        match format {
            ReportFormat::Text => render_text(&summary, &trend, &recommendations, &generated),
            ReportFormat::Markdown => render_markdown(&summary, &trend, &recommendations, &generated),
        }
    }
}

fn render_text(summary: &Summary, trend: &Trend, recommendations: &[String], generated: &str) -> String {
    let rule = "=".repeat(60);
    let thin = "-".repeat(60);
    let mut out = String::new();

    // INVARIANT: Writing into a String never fails.
    let _ = writeln!(out, "{rule}\nREPOSITORY ANALYTICS REPORT\n{rule}");
    let _ = writeln!(out, "Generated: {generated}\n");
    let _ = writeln!(out, "SUMMARY\n{thin}");
    let _ = writeln!(out, "Total Repositories: {}", summary.total);
    let _ = writeln!(out, "Private: {} ({}%)", summary.private, summary.private_percentage);
    let _ = writeln!(out, "Public: {}\n", summary.public);
    let _ = writeln!(out, "LAST {} HOURS\n{thin}", trend.window_hours);
    let _ = writeln!(out, "Created: {}", trend.created);
    let _ = writeln!(out, "Per Hour: {}", trend.per_hour);
    let _ = writeln!(out, "Projected Daily: {}\n", trend.projected_daily);

    for (heading, counts) in [("BY OWNER", &summary.by_owner), ("BY TEMPLATE", &summary.by_template)] {
        if counts.is_empty() {
            continue;
        }
        let _ = writeln!(out, "{heading}\n{thin}");
        for (key, count) in counts {
            let _ = writeln!(out, "  {key}: {count}");
        }
        let _ = writeln!(out);
    }

    if !recommendations.is_empty() {
        let _ = writeln!(out, "RECOMMENDATIONS\n{thin}");
        for recommendation in recommendations {
            let _ = writeln!(out, "  * {recommendation}");
        }
        let _ = writeln!(out);
    }
    out.push_str(&rule);

    out
}

fn render_markdown(summary: &Summary, trend: &Trend, recommendations: &[String], generated: &str) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "# Repository Analytics Report\n*Generated: {generated}*\n");
    let _ = writeln!(out, "## Summary");
    let _ = writeln!(out, "- **Total Repositories:** {}", summary.total);
    let _ = writeln!(
        out,
        "- **Private:** {} ({}%)",
        summary.private, summary.private_percentage
    );
    let _ = writeln!(out, "- **Public:** {}\n", summary.public);
    let _ = writeln!(out, "## Last {} Hours", trend.window_hours);
    let _ = writeln!(out, "- **Created:** {}", trend.created);
    let _ = writeln!(out, "- **Per Hour:** {}", trend.per_hour);
    let _ = writeln!(out, "- **Projected Daily:** {}\n", trend.projected_daily);

    for (heading, counts) in [("By Owner", &summary.by_owner), ("By Template", &summary.by_template)] {
        if counts.is_empty() {
            continue;
        }
        let _ = writeln!(out, "## {heading}");
        for (key, count) in counts {
            let _ = writeln!(out, "- **{key}:** {count}");
        }
        let _ = writeln!(out);
    }

    if !recommendations.is_empty() {
        let _ = writeln!(out, "## Recommendations");
        for recommendation in recommendations {
            let _ = writeln!(out, "- {recommendation}");
        }
    }

    out
}

// Highest count wins, earliest key on ties.
fn most_common(counts: &BTreeMap<String, usize>) -> Option<String> {
    counts
        .iter()
        .fold(None, |best: Option<(&String, usize)>, (key, &count)| match best {
            Some((_, top)) if top >= count => best,
            _ => Some((key, count)),
        })
        .map(|(key, _)| key.clone())
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    fn sample() -> Analytics {
        let mut analytics = Analytics::new();
        analytics.track("api-gateway", "acme", true, Some("rust"));
        analytics.track("api-auth", "acme", true, Some("rust"));
        analytics.track("web_client", "alice", false, None);
        analytics.track("toolBox", "alice", true, None);
        analytics
    }

    #[test]
    fn summarize_tracked_repositories() {
        let summary = sample().summary();

        assert_eq!(summary.total, 4);
        assert_eq!(summary.private, 3);
        assert_eq!(summary.private_percentage, 75.0);
        assert_eq!(summary.by_owner["acme"], 2);
        assert_eq!(summary.by_template["none"], 2);
        assert_eq!(summary.most_active_owner.as_deref(), Some("acme"));
        assert_eq!(summary.most_used_template.as_deref(), Some("none"));

        let patterns = summary.name_patterns;
        assert_eq!(patterns.kebab_case, 2);
        assert_eq!(patterns.snake_case, 1);
        assert_eq!(patterns.camel_case, 1);
        assert_eq!(patterns.common_prefixes, vec![("api".to_string(), 2)]);
        assert_eq!(patterns.shortest.as_deref(), Some("toolBox"));
        assert_eq!(patterns.longest.as_deref(), Some("api-gateway"));
    }

    #[test]
    fn recommend_from_summary() {
        let recommendations = sample().recommendations();
        assert_eq!(recommendations.len(), 2);
        assert!(recommendations[0].starts_with("Many repositories without templates"));
        assert!(recommendations[1].starts_with("Mixed naming conventions"));

        let mut public = Analytics::new();
        public.track("a", "x", false, Some("t"));
        assert!(public.recommendations()[0].starts_with("All repositories are public"));

        assert_eq!(
            Analytics::new().recommendations(),
            vec!["Create some repositories to get recommendations"]
        );
    }

    #[test]
    fn trend_counts_only_recent_repositories() {
        let now = Utc::now();
        let mut analytics = Analytics::new();
        analytics.track_at("old", "acme", true, None, now - ChronoDuration::hours(48));
        analytics.track_at("mid", "acme", true, None, now - ChronoDuration::hours(2));
        analytics.track_at("new", "acme", true, None, now - ChronoDuration::hours(1));

        let trend = analytics.trend_at(24, now);
        assert_eq!(trend.created, 2);
        assert_eq!(trend.per_hour, 1.0);
        assert_eq!(trend.projected_daily, 24.0);
        let names: Vec<_> = trend.recent.iter().map(|repo| repo.name.as_str()).collect();
        assert_eq!(names, vec!["new", "mid"]);
    }

    #[test]
    fn render_markdown_report() {
        let now = Utc::now();
        let mut analytics = Analytics::new();
        analytics.track_at("demo", "acme", true, Some("rust"), now - ChronoDuration::hours(1));
        let trend = analytics.trend_at(REPORT_WINDOW_HOURS, now);
        let report = render_markdown(&analytics.summary(), &trend, &analytics.recommendations(), "now");

        let expect = indoc! {"
            # Repository Analytics Report
            *Generated: now*

            ## Summary
            - **Total Repositories:** 1
            - **Private:** 1 (100%)
            - **Public:** 0

            ## Last 24 Hours
            - **Created:** 1
            - **Per Hour:** 1
            - **Projected Daily:** 24

            ## By Owner
            - **acme:** 1

            ## By Template
            - **rust:** 1

            ## Recommendations
            - All repositories are private. Consider open-sourcing some if appropriate.
        "};
        assert_eq!(report, expect);
    }

    #[test]
    fn text_report_shows_recent_trend() {
        let report = sample().report(ReportFormat::Text);
        assert!(report.contains("LAST 24 HOURS"));
        assert!(report.contains("Created: 4"));
        assert!(report.contains("Total Repositories: 4"));
    }

    #[test]
    fn parse_report_format() {
        assert_eq!("md".parse::<ReportFormat>().ok(), Some(ReportFormat::Markdown));
        assert_eq!("text".parse::<ReportFormat>().ok(), Some(ReportFormat::Text));
        assert!("pdf".parse::<ReportFormat>().is_err());
    }
}
