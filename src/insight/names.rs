// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Repository name suggestions.
//!
//! Suggest names from a free-form description. Significant words are the
//! first words longer than three characters that are not filler. Technical
//! terms such as "service" or "python" also contribute a short abbreviation.

use regex::Regex;
use std::sync::LazyLock;

static WORD: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\b\w+\b").ok());

const TECH_TERMS: &[(&str, &str)] = &[
    ("application", "app"),
    ("service", "svc"),
    ("library", "lib"),
    ("framework", "fw"),
    ("interface", "if"),
    ("database", "db"),
    ("microservice", "ms"),
    ("api", "api"),
    ("backend", "be"),
    ("frontend", "fe"),
    ("platform", "platform"),
    ("engine", "engine"),
    ("tool", "tool"),
    ("utility", "util"),
    ("python", "py"),
    ("javascript", "js"),
    ("typescript", "ts"),
    ("java", "java"),
    ("golang", "go"),
    ("rust", "rs"),
    ("ruby", "rb"),
];

const FILLER: &[&str] = &[
    "the", "a", "an", "is", "are", "for", "to", "of", "in", "and", "or", "this", "that",
];

/// Suggest up to `count` names for a repository described by `description`.
///
/// Suggestions are unique, in order of preference, and never equal to
/// `current`.
pub fn suggest_names(description: &str, current: &str, count: usize) -> Vec<String> {
    let Some(word) = WORD.as_ref() else {
        return Vec::new();
    };

    let lowered = description.to_lowercase();
    let words: Vec<&str> = word.find_iter(&lowered).map(|m| m.as_str()).collect();
    let terms: Vec<&str> = words.iter().filter_map(|word| abbreviate(word)).collect();
    let significant: Vec<&str> = words
        .iter()
        .copied()
        .filter(|word| !FILLER.contains(word) && word.len() > 3)
        .take(3)
        .collect();

    let mut candidates = Vec::new();
    if let Some(first) = significant.first() {
        let leading = &significant[..significant.len().min(2)];
        candidates.push(leading.join("-"));

        if let Some(term) = terms.first() {
            candidates.push(format!("{first}-{term}"));
            if significant.len() > 1 {
                candidates.push(format!("{term}-{}", leading.join("-")));
            }
        }

        candidates.push(leading.iter().map(|word| capitalize(word)).collect());

        if significant.len() > 1 {
            candidates.push(leading.join("_"));
        }
    }

    let mut suggestions: Vec<String> = Vec::new();
    for candidate in candidates {
        if !candidate.is_empty() && candidate != current && !suggestions.contains(&candidate) {
            suggestions.push(candidate);
        }
    }
    suggestions.truncate(count);

    suggestions
}

fn abbreviate(word: &str) -> Option<&'static str> {
    TECH_TERMS
        .iter()
        .find(|(term, _)| *term == word)
        .map(|(_, short)| *short)
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
