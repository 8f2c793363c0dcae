//! Filesystem freshness stamps.
//!
//! A [`FileStamp`] is the validator every filesystem-backed cache entry
//! carries: the byte size, mode bits, and modification time observed when
//! the entry was built. An entry is fresh while a new stat of the same path
//! yields an identical stamp.

use std::fs::Metadata;
use std::io;
use std::path::Path;
use std::time::SystemTime;

/// Size, mode, and modification time of a file or directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileStamp {
    /// Length in bytes as reported by the filesystem.
    pub size: u64,
    /// Permission and file-type bits.
    pub mode: u32,
    /// Last modification time.
    pub modified: SystemTime,
}

impl FileStamp {
    /// Stats `path`, following symlinks, and returns its stamp.
    pub fn of(path: &Path) -> io::Result<Self> {
        let meta = std::fs::metadata(path)?;
        Self::from_metadata(&meta)
    }

    /// Builds a stamp from already-fetched metadata.
    ///
    /// Fails only on platforms that cannot report modification times.
    pub fn from_metadata(meta: &Metadata) -> io::Result<Self> {
        Ok(Self {
            size: meta.len(),
            mode: mode_bits(meta),
            modified: meta.modified()?,
        })
    }

    /// Returns `true` if `self` and `other` describe the same file state.
    ///
    /// All three fields must match exactly.
    pub fn is_fresh(&self, other: &FileStamp) -> bool {
        self.size == other.size && self.mode == other.mode && self.modified == other.modified
    }

    /// Returns `true` if the mode bits mark a directory.
    pub fn is_dir(&self) -> bool {
        self.mode & DIR_BIT != 0
    }
}

/// `S_IFDIR`; synthesized on platforms without Unix mode bits.
const DIR_BIT: u32 = 0o040000;

#[cfg(unix)]
fn mode_bits(meta: &Metadata) -> u32 {
    use std::os::unix::fs::MetadataExt;
    meta.mode()
}

#[cfg(not(unix))]
fn mode_bits(meta: &Metadata) -> u32 {
    let mut mode = if meta.permissions().readonly() { 0o444 } else { 0o666 };
    if meta.is_dir() {
        mode |= DIR_BIT | 0o111;
    }
    mode
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::time::Duration;

    #[test]
    fn identical_stat_is_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.txt");
        std::fs::write(&path, "% Title\n").unwrap();

        let a = FileStamp::of(&path).unwrap();
        let b = FileStamp::of(&path).unwrap();
        assert!(a.is_fresh(&b));
        assert_eq!(a.size, 8);
        assert!(!a.is_dir());
    }

    #[test]
    fn size_change_is_stale() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.html");
        std::fs::write(&path, "one").unwrap();
        let before = FileStamp::of(&path).unwrap();

        std::fs::write(&path, "three").unwrap();
        let file = File::options().write(true).open(&path).unwrap();
        file.set_modified(before.modified).unwrap();

        let after = FileStamp::of(&path).unwrap();
        assert_eq!(before.modified, after.modified);
        assert!(!before.is_fresh(&after));
    }

    #[test]
    fn mtime_change_is_stale() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.html");
        std::fs::write(&path, "same").unwrap();
        let before = FileStamp::of(&path).unwrap();

        let file = File::options().write(true).open(&path).unwrap();
        file.set_modified(before.modified + Duration::from_secs(5))
            .unwrap();

        let after = FileStamp::of(&path).unwrap();
        assert_eq!(before.size, after.size);
        assert!(!before.is_fresh(&after));
    }

    #[test]
    fn directories_carry_dir_bit() {
        let dir = tempfile::tempdir().unwrap();
        let stamp = FileStamp::of(dir.path()).unwrap();
        assert!(stamp.is_dir());
    }

    #[test]
    fn missing_path_errors() {
        let dir = tempfile::tempdir().unwrap();
        let err = FileStamp::of(&dir.path().join("nope")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
