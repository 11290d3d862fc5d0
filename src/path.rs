// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine default locations of the manifest and template directory.

use std::path::PathBuf;

/// Manifest file looked up in the current directory by default.
pub const DEFAULT_MANIFEST: &str = "repos.toml";

/// Determine default absolute path to template directory.
///
/// Uses XDG Base Directory path `$XDG_DATA_HOME/repoforge/templates`. Does not
/// check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
///
/// # See Also
///
/// - [XDG Base Directory](https://wiki.archlinux.org/title/XDG_Base_Directory)
pub fn default_templates_dir() -> Result<PathBuf> {
    dirs::data_dir()
        .map(|path| path.join("repoforge").join("templates"))
        .ok_or(NoWayHome)
}

/// Default path of the manifest, relative to the current directory.
pub fn default_manifest_path() -> PathBuf {
    PathBuf::from(DEFAULT_MANIFEST)
}

/// No way to determine user's home directory.
///
/// # See Also
///
/// - [`dirs::data_dir`](https://docs.rs/dirs/latest/dirs/fn.data_dir.html)
#[derive(Clone, Debug, thiserror::Error)]
#[error("cannot determine absolute path to user's home directory")]
pub struct NoWayHome;

/// Friendly result alias :3
pub type Result<T, E = NoWayHome> = std::result::Result<T, E>;
