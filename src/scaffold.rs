// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Local file scaffolding.
//!
//! Populate a repository's work tree before its first push. Three layers are
//! laid down, in order:
//!
//! 1. Template file set from `<templates_dir>/<key>/`, if the repository
//!    names a template.
//! 2. Minimal file set: a README and an ignore file.
//! 3. Standard community files, if enabled.
//!
//! Every layer is additive. A file that already exists at the destination is
//! never overwritten, so repeated runs leave the work tree as the first run
//! (or the user) left it.
//!
//! All operations accept a `dry_run` flag. In dry-run mode nothing touches
//! the filesystem, and the returned paths are the files that would have been
//! written.

pub mod standard;

use crate::config;

use ignore::WalkBuilder;
use std::{
    fs::{self, OpenOptions},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};
use tracing::{debug, instrument};

/// Ignore file written when a repository has none.
pub const DEFAULT_GITIGNORE: &str = ".DS_Store\n.env\n__pycache__/\ntarget/\n";

/// Files laid down by one scaffolding layer.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Written {
    /// Paths relative to the destination root, in write order.
    pub files: Vec<PathBuf>,
}

impl Written {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn contains(&self, path: impl AsRef<Path>) -> bool {
        self.files.iter().any(|file| file == path.as_ref())
    }
}

/// Resolve directory of template `key` under `templates_dir`.
///
/// # Errors
///
/// - Return [`ScaffoldError::MissingTemplate`] if the directory does not
///   exist.
pub fn template_dir(templates_dir: &Path, key: &str) -> Result<PathBuf> {
    let dir = templates_dir.join(key);
    if !config::is_single_component(key) || !dir.is_dir() {
        return Err(ScaffoldError::MissingTemplate {
            key: key.into(),
            path: dir,
        });
    }

    Ok(dir)
}

/// Copy template file set of `key` into `dest` without overwriting.
///
/// Sub-directories are recreated as needed. A `.git` directory inside the
/// template is skipped.
///
/// # Errors
///
/// - Return [`ScaffoldError::MissingTemplate`] if the template does not
///   exist.
/// - Return [`ScaffoldError::Walk`] if the template cannot be traversed.
/// - Return [`ScaffoldError::Io`] if a file cannot be copied.
#[instrument(skip(templates_dir, dest), level = "debug")]
pub fn apply_template(templates_dir: &Path, key: &str, dest: &Path, dry_run: bool) -> Result<Written> {
    let source = template_dir(templates_dir, key)?;
    let mut written = Written::default();

    let walker = WalkBuilder::new(&source)
        .standard_filters(false)
        .filter_entry(|entry| entry.file_name() != ".git")
        .sort_by_file_name(|a, b| a.cmp(b))
        .build();

    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_some_and(|kind| kind.is_file()) {
            continue;
        }

        // INVARIANT: Walker only yields paths below its root.
        let Ok(relative) = entry.path().strip_prefix(&source) else {
            continue;
        };

        let contents = fs::read(entry.path()).map_err(|err| ScaffoldError::io(err, entry.path()))?;
        if write_if_absent(&dest.join(relative), &contents, dry_run)? {
            written.files.push(relative.to_path_buf());
        }
    }
    debug!("template {key} contributed {} file(s)", written.len());

    Ok(written)
}

/// Ensure README and ignore file exist in `dest`.
///
/// # Errors
///
/// - Return [`ScaffoldError::Io`] if a file cannot be written.
pub fn ensure_minimal_files(
    dest: &Path,
    name: &str,
    description: Option<&str>,
    dry_run: bool,
) -> Result<Written> {
    let readme = format!("# {name}\n\n{}\n", description.unwrap_or_default());
    let files = [
        ("README.md", readme.as_str()),
        (".gitignore", DEFAULT_GITIGNORE),
    ];

    write_all_absent(dest, files, dry_run)
}

/// Write each `(relative path, contents)` pair into `dest` unless present.
pub(crate) fn write_all_absent<'a>(
    dest: &Path,
    files: impl IntoIterator<Item = (&'a str, &'a str)>,
    dry_run: bool,
) -> Result<Written> {
    let mut written = Written::default();
    for (relative, contents) in files {
        if write_if_absent(&dest.join(relative), contents.as_bytes(), dry_run)? {
            written.files.push(PathBuf::from(relative));
        }
    }

    Ok(written)
}

/// Write `contents` to `path` unless it already exists.
///
/// Returns whether the file was (or in dry-run mode would be) written.
fn write_if_absent(path: &Path, contents: &[u8], dry_run: bool) -> Result<bool> {
    if path.exists() {
        debug!("keep existing {}", path.display());
        return Ok(false);
    }

    if dry_run {
        return Ok(true);
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| ScaffoldError::io(err, parent))?;
    }

    // INVARIANT: Never clobber a file that appeared after the existence check.
    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == ErrorKind::AlreadyExists => return Ok(false),
        Err(err) => return Err(ScaffoldError::io(err, path)),
    };
    file.write_all(contents)
        .map_err(|err| ScaffoldError::io(err, path))?;

    Ok(true)
}

/// Scaffolding error types.
#[derive(Debug, thiserror::Error)]
pub enum ScaffoldError {
    /// Template key has no directory under the templates directory.
    #[error("template {key:?} not found at {path:?}")]
    MissingTemplate { key: String, path: PathBuf },

    /// Failed to traverse template directory.
    #[error(transparent)]
    Walk(#[from] ignore::Error),

    /// Failed to read or write a file.
    #[error("failed to scaffold {path:?}: {source}")]
    Io {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

impl ScaffoldError {
    fn io(source: std::io::Error, path: impl Into<PathBuf>) -> Self {
        Self::Io {
            source,
            path: path.into(),
        }
    }
}

/// Friendly result alias :3
pub type Result<T, E = ScaffoldError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn template(root: &Path) -> anyhow::Result<PathBuf> {
        let templates = root.join("templates");
        fs::create_dir_all(templates.join("rust/src"))?;
        fs::create_dir_all(templates.join("rust/.git"))?;
        fs::write(templates.join("rust/Cargo.toml"), "[package]\n")?;
        fs::write(templates.join("rust/src/lib.rs"), "// lib\n")?;
        fs::write(templates.join("rust/.gitignore"), "/target\n")?;
        fs::write(templates.join("rust/.git/HEAD"), "ref: refs/heads/main\n")?;
        Ok(templates)
    }

    #[test]
    fn template_copy_is_additive() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let templates = template(root.path())?;
        let dest = root.path().join("demo");
        fs::create_dir_all(&dest)?;
        fs::write(dest.join("Cargo.toml"), "[package]\nname = \"mine\"\n")?;

        let written = apply_template(&templates, "rust", &dest, false)?;
        assert_eq!(
            written.files,
            vec![PathBuf::from(".gitignore"), PathBuf::from("src/lib.rs")]
        );
        assert_eq!(
            fs::read_to_string(dest.join("Cargo.toml"))?,
            "[package]\nname = \"mine\"\n"
        );
        assert_eq!(fs::read_to_string(dest.join("src/lib.rs"))?, "// lib\n");
        assert!(!dest.join(".git").exists());

        Ok(())
    }

    #[test]
    fn template_dry_run_writes_nothing() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let templates = template(root.path())?;
        let dest = root.path().join("demo");

        let written = apply_template(&templates, "rust", &dest, true)?;
        assert_eq!(written.len(), 3);
        assert!(!dest.exists());

        Ok(())
    }

    #[test]
    fn missing_template_is_reported() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let result = apply_template(root.path(), "nope", &root.path().join("demo"), false);
        assert!(matches!(result, Err(ScaffoldError::MissingTemplate { key, .. }) if key == "nope"));

        Ok(())
    }

    #[test]
    fn template_key_must_name_one_template() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let templates = template(root.path())?;
        let dest = root.path().join("demo");

        for key in [".", "..", "rust/src"] {
            let result = apply_template(&templates, key, &dest, false);
            assert!(matches!(result, Err(ScaffoldError::MissingTemplate { .. })), "{key:?}");
        }
        assert!(!dest.exists());

        Ok(())
    }

    #[test]
    fn minimal_files_never_overwrite() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let dest = root.path();
        fs::write(dest.join(".gitignore"), "custom\n")?;

        let written = ensure_minimal_files(dest, "demo", Some("Demo service"), false)?;
        assert_eq!(written.files, vec![PathBuf::from("README.md")]);
        assert_eq!(fs::read_to_string(dest.join("README.md"))?, "# demo\n\nDemo service\n");
        assert_eq!(fs::read_to_string(dest.join(".gitignore"))?, "custom\n");

        let again = ensure_minimal_files(dest, "demo", None, false)?;
        assert!(again.is_empty());

        Ok(())
    }
}
