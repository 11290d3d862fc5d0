// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Declarative GitHub repository automation.
//!
//! A __manifest__ lists repository descriptors. Each descriptor is driven
//! through a synchronization job that ensures the remote repository exists,
//! initializes the local clone, applies a template, writes scaffold files,
//! and pushes the result. Jobs run in parallel with a bounded number of
//! workers, and every notable effect is recorded as an event.
//!
//! Remote creation can also run as a transactional batch whose completed
//! steps are compensated in reverse order when a later step fails.

pub mod batch;
pub mod config;
pub mod events;
pub mod github;
pub mod insight;
pub mod path;
pub mod scaffold;
pub mod sync;
