// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Repository health scoring.
//!
//! Score a repository by the presence of well-known files. Each check carries
//! a fixed weight, and the weights sum up to 100:
//!
//! | Check           | Weight |
//! |-----------------|--------|
//! | README          | 20     |
//! | License         | 15     |
//! | Ignore file     | 10     |
//! | Contributing    | 10     |
//! | Code of conduct | 10     |
//! | Security policy | 10     |
//! | CI pipeline     | 15     |
//! | Tests           | 10     |

use crate::events::{EventEmitter, EventKind, Metadata};

use ignore::WalkBuilder;
use serde::Serialize;
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
};
use tracing::debug;

/// Single health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Check {
    Readme,
    License,
    Gitignore,
    Contributing,
    CodeOfConduct,
    Security,
    Ci,
    Tests,
}

impl Check {
    pub const ALL: [Check; 8] = [
        Check::Readme,
        Check::License,
        Check::Gitignore,
        Check::Contributing,
        Check::CodeOfConduct,
        Check::Security,
        Check::Ci,
        Check::Tests,
    ];

    pub fn weight(&self) -> u32 {
        match self {
            Self::Readme => 20,
            Self::License | Self::Ci => 15,
            Self::Gitignore
            | Self::Contributing
            | Self::CodeOfConduct
            | Self::Security
            | Self::Tests => 10,
        }
    }

    /// Whether lowercased path `file` satisfies this check.
    fn matches(&self, file: &str) -> bool {
        match self {
            Self::Readme => file.contains("readme"),
            Self::License => file.contains("license") || file.contains("licence"),
            Self::Gitignore => file == ".gitignore",
            Self::Contributing => file.contains("contributing"),
            Self::CodeOfConduct => file.contains("code_of_conduct") || file.contains("code-of-conduct"),
            Self::Security => file.contains("security"),
            Self::Ci => {
                file.contains(".github/workflows") || file.contains(".gitlab-ci") || file.contains("jenkinsfile")
            }
            Self::Tests => file.contains("test"),
        }
    }

    fn recommendation(&self) -> &'static str {
        match self {
            Self::Readme => "Add a README.md with project description and usage instructions",
            Self::License => "Add a LICENSE file to clarify usage rights",
            Self::Gitignore => "Add a .gitignore file to exclude unnecessary files",
            Self::Contributing => "Add CONTRIBUTING.md to guide contributors",
            Self::CodeOfConduct => "Add CODE_OF_CONDUCT.md to set community expectations",
            Self::Security => "Add SECURITY.md to document security policies",
            Self::Ci => "Set up a CI pipeline for automated testing",
            Self::Tests => "Add tests to ensure code quality",
        }
    }
}

/// Qualitative rating of a health score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Rating {
    Excellent,
    Good,
    Fair,
    NeedsImprovement,
}

impl Rating {
    fn from_percentage(percentage: f64) -> Self {
        match percentage {
            p if p >= 90.0 => Self::Excellent,
            p if p >= 75.0 => Self::Good,
            p if p >= 50.0 => Self::Fair,
            _ => Self::NeedsImprovement,
        }
    }

    /// Event kind emitted for this rating, if any.
    pub fn event_kind(&self) -> Option<EventKind> {
        match self {
            Self::Excellent => Some(EventKind::HealthExcellent),
            Self::Good => Some(EventKind::HealthGood),
            Self::Fair => Some(EventKind::HealthFair),
            Self::NeedsImprovement => None,
        }
    }
}

impl Display for Rating {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(match self {
            Self::Excellent => "Excellent",
            Self::Good => "Good",
            Self::Fair => "Fair",
            Self::NeedsImprovement => "Needs Improvement",
        })
    }
}

/// Health report of one repository.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub score: u32,
    pub max_score: u32,
    pub percentage: f64,
    pub rating: Rating,
    pub passed: Vec<Check>,
    pub recommendations: Vec<&'static str>,
}

impl HealthReport {
    /// Score repository from its file listing.
    ///
    /// Paths are matched case-insensitively and relative to the repository
    /// root.
    pub fn score<I, P>(files: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let files: Vec<String> = files
            .into_iter()
            .map(|file| file.as_ref().to_string_lossy().replace('\\', "/").to_lowercase())
            .collect();

        let mut passed = Vec::new();
        let mut recommendations = Vec::new();
        for check in Check::ALL {
            if files.iter().any(|file| check.matches(file)) {
                passed.push(check);
            } else {
                recommendations.push(check.recommendation());
            }
        }

        let score = passed.iter().map(Check::weight).sum();
        let max_score = Check::ALL.iter().map(Check::weight).sum();
        let percentage = (f64::from(score) / f64::from(max_score) * 1000.0).round() / 10.0;

        Self {
            score,
            max_score,
            percentage,
            rating: Rating::from_percentage(percentage),
            passed,
            recommendations,
        }
    }

    /// Score repository at `root` by walking its work tree.
    ///
    /// # Errors
    ///
    /// - Return [`HealthError`] if the work tree cannot be traversed.
    pub fn scan(root: &Path) -> Result<Self> {
        let files = list_files(root)?;
        debug!("scored {} file(s) under {}", files.len(), root.display());
        Ok(Self::score(files))
    }

    /// Emit event matching the rating, if it warrants one.
    pub fn emit(&self, events: &EventEmitter, subject: &str, target: Option<&str>) {
        if let Some(kind) = self.rating.event_kind() {
            let metadata = Metadata::from([
                ("score".into(), self.score.into()),
                ("percentage".into(), self.percentage.into()),
            ]);
            events.emit(kind, subject, target, metadata);
        }
    }
}

impl Display for HealthReport {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        writeln!(
            fmt,
            "health: {}/{} ({}%), {}",
            self.score, self.max_score, self.percentage, self.rating
        )?;
        for recommendation in &self.recommendations {
            writeln!(fmt, "  - {recommendation}")?;
        }

        Ok(())
    }
}

/// List files under `root` relative to it, skipping `.git`.
///
/// # Errors
///
/// - Return [`HealthError`] if the directory cannot be traversed.
pub fn list_files(root: &Path) -> Result<Vec<PathBuf>> {
    let walker = WalkBuilder::new(root)
        .standard_filters(false)
        .filter_entry(|entry| entry.file_name() != ".git")
        .build();

    let mut files = Vec::new();
    for entry in walker {
        let entry = entry?;
        if entry.file_type().is_some_and(|kind| kind.is_file()) {
            if let Ok(relative) = entry.path().strip_prefix(root) {
                files.push(relative.to_path_buf());
            }
        }
    }
    files.sort();

    Ok(files)
}

/// Health scan error types.
#[derive(Debug, thiserror::Error)]
pub enum HealthError {
    #[error(transparent)]
    Walk(#[from] ignore::Error),
}

/// Friendly result alias :3
pub type Result<T, E = HealthError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventStore;
    use simple_test_case::test_case;
    use std::{fs, sync::Arc};

    #[test_case(&["README.md", "LICENSE", ".gitignore", "CONTRIBUTING.md", "CODE_OF_CONDUCT.md", "SECURITY.md", ".github/workflows/ci.yml", "tests/it.rs"], 100, Rating::Excellent; "everything")]
    #[test_case(&["README.md", "LICENSE", ".github/workflows/ci.yml", "src/tests.rs", "SECURITY.md"], 70, Rating::Fair; "partial")]
    #[test_case(&["README.md", "LICENSE", ".gitignore", ".github/workflows/ci.yml", "src/test.rs"], 70, Rating::Fair; "no community files")]
    #[test_case(&["README.md", "LICENSE", ".gitignore", ".gitlab-ci.yml", "test.sh", "SECURITY.md"], 80, Rating::Good; "good")]
    #[test_case(&["main.c"], 0, Rating::NeedsImprovement; "bare")]
    #[test]
    fn score_file_listing(files: &[&str], score: u32, rating: Rating) {
        let report = HealthReport::score(files);
        assert_eq!(report.score, score);
        assert_eq!(report.max_score, 100);
        assert_eq!(report.rating, rating);
        assert_eq!(report.recommendations.len(), Check::ALL.len() - report.passed.len());
    }

    #[test]
    fn recommend_every_missing_item() {
        let report = HealthReport::score(["readme.md", "docs/Code-Of-Conduct.md"]);
        assert_eq!(report.passed, vec![Check::Readme, Check::CodeOfConduct]);
        assert_eq!(report.percentage, 30.0);
        assert!(report
            .recommendations
            .contains(&"Add SECURITY.md to document security policies"));
        assert!(!report
            .recommendations
            .iter()
            .any(|recommendation| recommendation.contains("README")));
    }

    #[test]
    fn scan_skips_git_directory() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        fs::create_dir_all(root.path().join(".git"))?;
        fs::write(root.path().join(".git/SECURITY"), "")?;
        fs::create_dir_all(root.path().join(".github/workflows"))?;
        fs::write(root.path().join(".github/workflows/ci.yml"), "")?;
        fs::write(root.path().join("README.md"), "")?;

        let report = HealthReport::scan(root.path())?;
        assert_eq!(report.passed, vec![Check::Readme, Check::Ci]);
        assert_eq!(
            list_files(root.path())?,
            vec![PathBuf::from(".github/workflows/ci.yml"), PathBuf::from("README.md")]
        );

        Ok(())
    }

    #[test]
    fn rating_emits_matching_event() {
        let store = Arc::new(EventStore::new());
        let events = EventEmitter::new(store.clone(), Default::default());

        HealthReport::score(["README.md", "LICENSE", ".gitignore", "CONTRIBUTING.md", "CODE_OF_CONDUCT.md", "SECURITY.md", ".github/workflows/a.yml", "tests/a.rs"])
            .emit(&events, "alice", Some("demo"));
        HealthReport::score(["main.c"]).emit(&events, "alice", Some("other"));

        let kinds: Vec<_> = store.snapshot().into_iter().map(|event| event.kind).collect();
        assert_eq!(kinds, vec![EventKind::HealthExcellent]);
        assert_eq!(store.total_reward("alice"), 100);
    }
}
