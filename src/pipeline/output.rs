use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::Result;

/// Writes `contents` next to `path` and renames it into place, so readers
/// never observe a partially written changelog.
pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let mut tmp = NamedTempFile::new_in(&dir)?;
    tmp.write_all(contents.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Writes the whole changelog to a stream, reporting a closed pipe as an
/// error instead of panicking like `print!`.
pub fn write_stream<W: Write>(writer: &mut W, contents: &str) -> Result<()> {
    writer.write_all(contents.as_bytes())?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    struct ClosedPipe;

    impl Write for ClosedPipe {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::from(std::io::ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_write_stream() {
        let mut buffer = Vec::new();
        write_stream(&mut buffer, "# Changelog\n").unwrap();
        assert_eq!(buffer, b"# Changelog\n");
    }

    #[test]
    fn test_write_stream_closed_pipe_is_io_error() {
        let err = write_stream(&mut ClosedPipe, "# Changelog\n").unwrap_err();
        match err {
            Error::Io(e) => assert_eq!(e.kind(), std::io::ErrorKind::BrokenPipe),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(Error::Io(std::io::ErrorKind::BrokenPipe.into()).exit_code(), 1);
    }

    #[test]
    fn test_write_atomic_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("CHANGELOG.md");
        std::fs::write(&path, "old").unwrap();

        write_atomic(&path, "# Changelog\n").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "# Changelog\n");
        let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn test_write_atomic_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("CHANGELOG.md");
        assert!(write_atomic(&path, "x").is_err());
        assert!(!path.exists());
    }
}
