// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Standard community files.
//!
//! Issue and pull request templates, a security policy, and a code of
//! conduct. Written only when enabled through `auto_templates`, and never
//! over files the repository already has.

use crate::scaffold::{write_all_absent, Result, Written};

use std::path::Path;

pub const BUG_REPORT_PATH: &str = ".github/ISSUE_TEMPLATE/bug_report.md";
pub const PULL_REQUEST_PATH: &str = ".github/PULL_REQUEST_TEMPLATE.md";
pub const SECURITY_PATH: &str = "SECURITY.md";
pub const CODE_OF_CONDUCT_PATH: &str = "CODE_OF_CONDUCT.md";

const BUG_REPORT: &str = r#"---
name: Bug report
about: Create a report to help us improve
title: '[BUG] '
labels: 'bug'
assignees: ''
---

**Describe the bug**
A clear and concise description of what the bug is.

**To Reproduce**
Steps to reproduce the behavior:
1. ...
2. ...

**Expected behavior**
What you expected to happen.

**Environment**
 - OS:
 - Version:

**Additional context**
Anything else about the problem.
"#;

const PULL_REQUEST: &str = r#"## Description
Summary of the change and the issue it addresses.

Fixes # (issue)

## Type of change
- [ ] Bug fix
- [ ] New feature
- [ ] Breaking change
- [ ] Documentation update

## Testing
Describe the tests you ran to verify the change.

## Checklist
- [ ] Code follows the style of this project
- [ ] Self-review performed
- [ ] Documentation updated
- [ ] Tests added that prove the change works
"#;

const SECURITY: &str = r#"# Security Policy

## Supported Versions

| Version | Supported          |
| ------- | ------------------ |
| 1.x.x   | :white_check_mark: |
| < 1.0   | :x:                |

## Reporting a Vulnerability

Please do NOT open a public issue for security problems. Contact the
maintainers privately with a description of the issue and steps to
reproduce it. Expect an initial response within 48 hours.

## Disclosure Policy

Security issues are patched within 30 days. Public disclosure follows once
a patch is available, with credit given to the reporter.
"#;

const CODE_OF_CONDUCT: &str = r#"# Code of Conduct

## Our Pledge

We pledge to make participation in our project a harassment-free experience
for everyone.

## Our Standards

Examples of behavior that contributes to a positive environment:
- Using welcoming and inclusive language
- Being respectful of differing viewpoints
- Gracefully accepting constructive criticism

Examples of unacceptable behavior:
- Trolling, insulting comments, and personal attacks
- Public or private harassment
- Publishing others' private information without permission

## Enforcement

Instances of abusive behavior may be reported by contacting the project team.

## Attribution

Adapted from the Contributor Covenant, version 2.0.
"#;

/// Every standard file as `(relative path, contents)`.
pub fn files() -> [(&'static str, &'static str); 4] {
    [
        (BUG_REPORT_PATH, BUG_REPORT),
        (PULL_REQUEST_PATH, PULL_REQUEST),
        (SECURITY_PATH, SECURITY),
        (CODE_OF_CONDUCT_PATH, CODE_OF_CONDUCT),
    ]
}

/// Write standard community files into `dest` unless present.
///
/// # Errors
///
/// - Return [`ScaffoldError::Io`](crate::scaffold::ScaffoldError::Io) if a
///   file cannot be written.
pub fn write_standard_files(dest: &Path, dry_run: bool) -> Result<Written> {
    write_all_absent(dest, files(), dry_run)
}
