//! Temporary repository fixtures.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use largo_core::Pointer;
use sha2::{Digest, Sha256};
use tempfile::TempDir;

const POINTER_VERSION: &str = "version https://git-lfs.github.com/spec/v1";

/// Lowercase hex sha256 of `bytes`, the object id the protocol uses.
#[must_use]
pub fn object_id(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Pointer file text for an object.
#[must_use]
pub fn pointer_text(oid: &str, size: u64) -> String {
    format!("{POINTER_VERSION}\noid sha256:{oid}\nsize {size}\n")
}

/// Working tree with a `.git` directory, removed on drop.
#[derive(Debug)]
pub struct TestRepo {
    dir: TempDir,
}

impl TestRepo {
    /// Create an empty repository layout.
    ///
    /// # Errors
    ///
    /// Returns an error when the temporary directory cannot be created.
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir().context("create temporary repository")?;
        fs::create_dir_all(dir.path().join(".git")).context("create .git directory")?;
        Ok(Self { dir })
    }

    /// Working tree root.
    #[must_use]
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// The `.git` directory.
    #[must_use]
    pub fn git_dir(&self) -> PathBuf {
        self.root().join(".git")
    }

    /// Where the object store keeps `oid`.
    #[must_use]
    pub fn object_path(&self, oid: &str) -> PathBuf {
        self.git_dir()
            .join("lfs")
            .join("objects")
            .join(&oid[0..2])
            .join(&oid[2..4])
            .join(oid)
    }

    /// Write `contents` to `relative`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be written.
    pub fn write_file(&self, relative: impl AsRef<Path>, contents: impl AsRef<[u8]>) -> Result<PathBuf> {
        let path = self.root().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))?;
        Ok(path)
    }

    /// Store `bytes` as a local object without writing a pointer.
    ///
    /// # Errors
    ///
    /// Returns an error when the object cannot be written.
    pub fn seed_object(&self, bytes: &[u8]) -> Result<String> {
        let oid = object_id(bytes);
        let path = self.object_path(&oid);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        fs::write(&path, bytes).with_context(|| format!("write object {oid}"))?;
        Ok(oid)
    }

    /// Track `bytes` at `relative`: seed the object and write its pointer file.
    ///
    /// # Errors
    ///
    /// Returns an error when either file cannot be written.
    pub fn track(&self, relative: &str, bytes: &[u8]) -> Result<Pointer> {
        let oid = self.seed_object(bytes)?;
        let size = bytes.len() as u64;
        self.write_file(relative, pointer_text(&oid, size))?;
        Ok(Pointer::new(oid, size, relative))
    }

    /// Write a pointer file for an object that is not stored locally.
    ///
    /// # Errors
    ///
    /// Returns an error when the pointer file cannot be written.
    pub fn track_remote(&self, relative: &str, bytes: &[u8]) -> Result<Pointer> {
        let oid = object_id(bytes);
        let size = bytes.len() as u64;
        self.write_file(relative, pointer_text(&oid, size))?;
        Ok(Pointer::new(oid, size, relative))
    }
}
