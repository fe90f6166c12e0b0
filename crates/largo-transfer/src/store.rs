//! Content-addressed local object storage under `<git-dir>/lfs/objects`.

use std::path::{Path, PathBuf};

use largo_core::{TransferError, TransferResult};
use sha2::{Digest, Sha256};
use tokio::fs;

/// Local object directory laid out as `<root>/<oid[0..2]>/<oid[2..4]>/<oid>`.
#[derive(Debug, Clone)]
pub struct ObjectStore {
    root: PathBuf,
    tmp: PathBuf,
}

impl ObjectStore {
    /// Store rooted at `<git_dir>/lfs/objects`, with temporary files in `<git_dir>/lfs/tmp`.
    #[must_use]
    pub fn for_git_dir(git_dir: &Path) -> Self {
        let lfs = git_dir.join("lfs");
        Self {
            root: lfs.join("objects"),
            tmp: lfs.join("tmp"),
        }
    }

    /// Object root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Final location of `oid`.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::Storage`] when `oid` cannot name a file.
    pub fn path_for(&self, oid: &str) -> TransferResult<PathBuf> {
        if oid.len() < 5 || !oid.bytes().all(|byte| byte.is_ascii_alphanumeric()) {
            return Err(TransferError::Storage {
                operation: "resolve object path",
                message: format!("invalid object id {oid:?}"),
            });
        }
        Ok(self.root.join(&oid[0..2]).join(&oid[2..4]).join(oid))
    }

    /// Whether an object of `size` bytes is present for `oid`.
    pub async fn contains(&self, oid: &str, size: u64) -> bool {
        let Ok(path) = self.path_for(oid) else {
            return false;
        };
        fs::metadata(path)
            .await
            .is_ok_and(|meta| meta.is_file() && meta.len() == size)
    }

    /// Open `oid` for reading, checking it holds `size` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::MissingObject`] when absent and
    /// [`TransferError::SizeMismatch`] when the stored size differs.
    pub async fn open(&self, oid: &str, size: u64) -> TransferResult<fs::File> {
        let path = self.path_for(oid)?;
        let file = fs::File::open(&path).await.map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                TransferError::MissingObject {
                    oid: oid.to_string(),
                }
            } else {
                storage("open object", &err)
            }
        })?;
        let actual = file
            .metadata()
            .await
            .map_err(|err| storage("stat object", &err))?
            .len();
        if actual != size {
            return Err(TransferError::SizeMismatch {
                expected: size,
                actual,
            });
        }
        Ok(file)
    }

    /// Create a unique temporary file for an incoming object.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::Storage`] when the temporary directory is not writable.
    pub async fn temp_file(&self, oid: &str) -> TransferResult<(PathBuf, fs::File)> {
        fs::create_dir_all(&self.tmp)
            .await
            .map_err(|err| storage("create temp dir", &err))?;
        let suffix: u64 = rand::random();
        let path = self.tmp.join(format!("{oid}-{suffix:016x}"));
        let file = fs::File::create(&path)
            .await
            .map_err(|err| storage("create temp file", &err))?;
        Ok((path, file))
    }

    /// Move a verified temporary file into place for `oid`.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::Storage`] when the rename fails.
    pub async fn commit(&self, temp: &Path, oid: &str) -> TransferResult<PathBuf> {
        let target = self.path_for(oid)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|err| storage("create object dir", &err))?;
        }
        fs::rename(temp, &target)
            .await
            .map_err(|err| storage("commit object", &err))?;
        Ok(target)
    }

    /// Store `bytes`, returning the sha256 object id.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::Storage`] when writing fails.
    pub async fn insert(&self, bytes: &[u8]) -> TransferResult<String> {
        let oid = sha256_hex(bytes);
        let (temp, _) = self.temp_file(&oid).await?;
        fs::write(&temp, bytes)
            .await
            .map_err(|err| storage("write object", &err))?;
        self.commit(&temp, &oid).await?;
        Ok(oid)
    }
}

/// Lowercase hex sha256 digest of `bytes`.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

pub(crate) fn storage(operation: &'static str, err: &std::io::Error) -> TransferError {
    TransferError::Storage {
        operation,
        message: err.to_string(),
    }
}
