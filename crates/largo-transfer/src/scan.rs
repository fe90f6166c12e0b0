//! Pointer file discovery for the working tree.
//!
//! A pointer file is a small text file:
//!
//! ```text
//! version https://git-lfs.github.com/spec/v1
//! oid sha256:<64 hex digits>
//! size <bytes>
//! ```
//!
//! Files that do not start with the version line are ordinary content and are skipped.
//! A file that does start with it but is otherwise invalid aborts the scan.

use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use largo_core::Pointer;
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{ScanError, ScanResult};
use crate::stream::{PointerSender, PointerStream, pointer_channel};

const VERSION_LINE: &str = "version https://git-lfs.github.com/spec/v1";
const OID_PREFIX: &str = "sha256:";
const MAX_POINTER_SIZE: u64 = 1024;

/// Render the pointer file body for an object.
#[must_use]
pub fn format_pointer(oid: &str, size: u64) -> String {
    format!("{VERSION_LINE}\noid {OID_PREFIX}{oid}\nsize {size}\n")
}

/// Parse a pointer file body. Returns `Ok(None)` when `contents` is not a pointer.
///
/// # Errors
///
/// Returns [`ScanError::Malformed`] when the version line is present but the body is invalid.
pub fn parse_pointer(path: &Path, contents: &[u8]) -> ScanResult<Option<Pointer>> {
    let Ok(text) = std::str::from_utf8(contents) else {
        return Ok(None);
    };
    let mut lines = text.lines();
    if lines.next().map(str::trim_end) != Some(VERSION_LINE) {
        return Ok(None);
    }
    let malformed = |reason| ScanError::Malformed {
        path: path.to_path_buf(),
        reason,
    };

    let mut oid = None;
    let mut size = None;
    for line in lines.map(str::trim_end).filter(|line| !line.is_empty()) {
        let (key, value) = line.split_once(' ').ok_or_else(|| malformed("line without value"))?;
        match key {
            "oid" => {
                let hex = value
                    .strip_prefix(OID_PREFIX)
                    .ok_or_else(|| malformed("unsupported oid type"))?;
                let lower_hex = hex
                    .bytes()
                    .all(|byte| byte.is_ascii_digit() || (b'a'..=b'f').contains(&byte));
                if hex.len() != 64 || !lower_hex {
                    return Err(malformed("invalid oid"));
                }
                oid = Some(hex.to_string());
            }
            "size" => {
                size = Some(value.parse::<u64>().map_err(|_| malformed("invalid size"))?);
            }
            _ => {}
        }
    }

    let oid = oid.ok_or_else(|| malformed("missing oid"))?;
    let size = size.ok_or_else(|| malformed("missing size"))?;
    Ok(Some(Pointer::new(oid, size, path)))
}

/// Walk `paths` (relative to `root`) on a blocking task and stream every pointer found.
///
/// Pointer paths are reported relative to `root`. The `.git` directory is skipped and an
/// object referenced by several pointer files is emitted once.
#[must_use]
pub fn spawn_scan(root: PathBuf, paths: Vec<PathBuf>, capacity: usize) -> PointerStream {
    let (tx, stream) = pointer_channel(capacity);
    tokio::task::spawn_blocking(move || {
        let outcome = scan_into(&root, &paths, &tx);
        tx.finish(outcome);
    });
    stream
}

fn scan_into(root: &Path, paths: &[PathBuf], tx: &PointerSender) -> ScanResult<()> {
    let mut seen = HashSet::new();
    for start in paths {
        let start: PathBuf = root.join(start).components().collect();
        let walker = WalkDir::new(&start)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| entry.file_name() != ".git");
        for entry in walker {
            let entry = entry.map_err(|err| ScanError::Walk {
                path: start.clone(),
                message: err.to_string(),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(pointer) = read_pointer(root, entry.path())? else {
                continue;
            };
            if !seen.insert(pointer.oid.clone()) {
                debug!(oid = %pointer.oid, path = %pointer.path.display(), "duplicate pointer skipped");
                continue;
            }
            if !tx.blocking_send(pointer) {
                debug!("pointer consumer went away; stopping scan");
                return Ok(());
            }
        }
    }
    Ok(())
}

fn read_pointer(root: &Path, path: &Path) -> ScanResult<Option<Pointer>> {
    let io_err = |source| ScanError::Io {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(io_err)?;
    let mut contents = Vec::new();
    file.take(MAX_POINTER_SIZE + 1)
        .read_to_end(&mut contents)
        .map_err(io_err)?;
    if contents.len() as u64 > MAX_POINTER_SIZE {
        return Ok(None);
    }
    let relative = path.strip_prefix(root).unwrap_or(path);
    parse_pointer(relative, &contents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StreamError;
    use crate::stream::collect_pointers;

    const OID: &str = "4d7a214614ab2935c943f9e0ff69d22eadbb8f32b1258daaa5e2ca24d17e2393";

    #[test]
    fn round_trips_the_pointer_format() -> anyhow::Result<()> {
        let text = format_pointer(OID, 12_345);
        let pointer = parse_pointer(Path::new("a.bin"), text.as_bytes())?.expect("pointer");
        assert_eq!(pointer.oid, OID);
        assert_eq!(pointer.size, 12_345);
        assert_eq!(pointer.path, PathBuf::from("a.bin"));
        Ok(())
    }

    #[test]
    fn ordinary_content_is_not_a_pointer() -> anyhow::Result<()> {
        assert!(parse_pointer(Path::new("x"), b"hello world\n")?.is_none());
        assert!(parse_pointer(Path::new("x"), &[0xff, 0xfe])?.is_none());
        Ok(())
    }

    #[test]
    fn invalid_pointer_bodies_are_rejected() {
        let missing_size = format!("{VERSION_LINE}\noid sha256:{OID}\n");
        assert!(matches!(
            parse_pointer(Path::new("x"), missing_size.as_bytes()),
            Err(ScanError::Malformed {
                reason: "missing size",
                ..
            })
        ));
        let short_oid = format!("{VERSION_LINE}\noid sha256:abc\nsize 1\n");
        assert!(parse_pointer(Path::new("x"), short_oid.as_bytes()).is_err());
        let md5 = format!("{VERSION_LINE}\noid md5:{OID}\nsize 1\n");
        assert!(parse_pointer(Path::new("x"), md5.as_bytes()).is_err());
    }

    #[tokio::test]
    async fn scan_finds_pointers_and_skips_git_dir() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let root = dir.path().to_path_buf();
        std::fs::create_dir_all(root.join("assets/deep"))?;
        std::fs::create_dir_all(root.join(".git/lfs"))?;
        std::fs::write(root.join("assets/a.bin"), format_pointer(OID, 3))?;
        std::fs::write(root.join("assets/deep/copy.bin"), format_pointer(OID, 3))?;
        std::fs::write(root.join("assets/readme.txt"), "plain text")?;
        std::fs::write(root.join(".git/lfs/stray"), format_pointer(&"b".repeat(64), 1))?;

        let stream = spawn_scan(root.clone(), vec![PathBuf::from(".")], 4);
        let (pointers, outcome) = collect_pointers(stream).await;
        outcome?;
        assert_eq!(pointers.len(), 1);
        assert_eq!(pointers[0].path, PathBuf::from("assets/a.bin"));
        Ok(())
    }

    #[tokio::test]
    async fn malformed_pointer_aborts_scan() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join("bad.bin"), format!("{VERSION_LINE}\nsize 1\n"))?;
        let stream = spawn_scan(dir.path().to_path_buf(), vec![PathBuf::from("bad.bin")], 1);
        let (pointers, outcome) = collect_pointers(stream).await;
        assert!(pointers.is_empty());
        let err = outcome.expect_err("malformed");
        assert!(matches!(err, StreamError::Scan(ScanError::Malformed { .. })));
        Ok(())
    }
}
