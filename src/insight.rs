// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Repository insights.
//!
//! Static heuristics over repository names, descriptions, and file listings:
//! name suggestions, health scoring, and analytics over what a run created.

pub mod analytics;
pub mod health;
pub mod names;
