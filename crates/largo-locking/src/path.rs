//! Resolve a user-supplied path to the canonical form locks are keyed by.

use std::path::{Component, Path, PathBuf};

use largo_core::PathError;

/// Resolve `input` to a `/`-separated path relative to `repo_root`.
///
/// The working directory is canonicalised (symlinks followed) first. Absolute inputs
/// are canonicalised as well; relative inputs are joined to the working directory
/// lexically, so they need not exist yet.
///
/// # Errors
///
/// Returns [`PathError::WorkingDirectory`] when `working_dir` cannot be resolved,
/// [`PathError::Canonicalize`] when the root or an absolute input cannot be resolved,
/// [`PathError::OutsideRepository`] when the result escapes the root, and
/// [`PathError::Directory`] when it names a directory.
pub fn canonical_lock_path(
    repo_root: &Path,
    working_dir: &Path,
    input: &str,
) -> Result<String, PathError> {
    let working_dir = working_dir
        .canonicalize()
        .map_err(|source| PathError::WorkingDirectory { source })?;
    let root = repo_root
        .canonicalize()
        .map_err(|source| PathError::Canonicalize {
            path: repo_root.to_path_buf(),
            source,
        })?;

    let requested = Path::new(input);
    let absolute = if requested.is_absolute() {
        requested
            .canonicalize()
            .map_err(|source| PathError::Canonicalize {
                path: requested.to_path_buf(),
                source,
            })?
    } else {
        normalize(&working_dir.join(requested))
    };

    let path = to_slash(&relative_to(&root, &absolute));
    if path == ".." || path.starts_with("../") {
        return Err(PathError::OutsideRepository { path });
    }
    if absolute.is_dir() {
        return Err(PathError::Directory {
            path: input.to_string(),
        });
    }
    Ok(path)
}

fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other),
        }
    }
    normalized
}

fn relative_to(base: &Path, target: &Path) -> PathBuf {
    let base: Vec<Component<'_>> = base.components().collect();
    let target: Vec<Component<'_>> = target.components().collect();
    let shared = base
        .iter()
        .zip(&target)
        .take_while(|(left, right)| left == right)
        .count();

    let mut relative = PathBuf::new();
    for _ in shared..base.len() {
        relative.push("..");
    }
    for component in &target[shared..] {
        relative.push(component);
    }
    relative
}

fn to_slash(path: &Path) -> String {
    path.components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::fs;

    #[test]
    fn relative_input_is_resolved_against_the_working_directory() -> Result<()> {
        let repo = tempfile::tempdir()?;
        let wd = repo.path().join("foo/bar");
        fs::create_dir_all(&wd)?;

        assert_eq!(canonical_lock_path(repo.path(), &wd, "./baz")?, "foo/bar/baz");
        assert_eq!(canonical_lock_path(repo.path(), &wd, "../qux.psd")?, "foo/qux.psd");
        assert_eq!(canonical_lock_path(repo.path(), repo.path(), "a/b/c.bin")?, "a/b/c.bin");
        Ok(())
    }

    #[test]
    fn absolute_input_is_canonicalised() -> Result<()> {
        let repo = tempfile::tempdir()?;
        fs::create_dir_all(repo.path().join("art"))?;
        let file = repo.path().join("art/hero.psd");
        fs::write(&file, b"psd")?;

        let input = file.to_string_lossy().into_owned();
        assert_eq!(canonical_lock_path(repo.path(), repo.path(), &input)?, "art/hero.psd");
        Ok(())
    }

    #[test]
    fn missing_absolute_input_fails_to_canonicalise() -> Result<()> {
        let repo = tempfile::tempdir()?;
        let input = repo.path().join("nope.bin").to_string_lossy().into_owned();
        let err = canonical_lock_path(repo.path(), repo.path(), &input).expect_err("missing file");
        assert!(matches!(err, PathError::Canonicalize { .. }));
        Ok(())
    }

    #[test]
    fn paths_escaping_the_root_are_rejected() -> Result<()> {
        let repo = tempfile::tempdir()?;
        let wd = repo.path().join("foo");
        fs::create_dir_all(&wd)?;

        let err = canonical_lock_path(repo.path(), &wd, "../../outside.bin").expect_err("escape");
        let PathError::OutsideRepository { path } = err else {
            panic!("expected outside-repository error");
        };
        assert!(path.starts_with("../"), "{path}");
        Ok(())
    }

    #[test]
    fn directories_cannot_be_locked() -> Result<()> {
        let repo = tempfile::tempdir()?;
        fs::create_dir_all(repo.path().join("assets"))?;

        let err = canonical_lock_path(repo.path(), repo.path(), "assets").expect_err("directory");
        assert!(matches!(err, PathError::Directory { ref path } if path == "assets"));
        let root = canonical_lock_path(repo.path(), repo.path(), ".").expect_err("root");
        assert!(matches!(root, PathError::Directory { .. }));
        Ok(())
    }

    #[test]
    fn unresolvable_working_directory_is_fatal() -> Result<()> {
        let repo = tempfile::tempdir()?;
        let err = canonical_lock_path(repo.path(), &repo.path().join("gone"), "a.bin")
            .expect_err("missing working directory");
        assert!(matches!(err, PathError::WorkingDirectory { .. }));
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_working_directory_is_followed() -> Result<()> {
        let repo = tempfile::tempdir()?;
        let outside = tempfile::tempdir()?;
        let real = repo.path().join("real");
        fs::create_dir_all(&real)?;
        let link = outside.path().join("link");
        std::os::unix::fs::symlink(&real, &link)?;

        assert_eq!(canonical_lock_path(repo.path(), &link, "x.bin")?, "real/x.bin");
        Ok(())
    }
}
