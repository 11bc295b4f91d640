//! Reading attached resources for prompt injection.

use std::io;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::prompt::Attachment;

/// Source of attached file contents.
pub trait ResourceReader: Send + Sync {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;
}

/// Reads straight from the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsResourceReader;

impl ResourceReader for FsResourceReader {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }
}

/// Read every path into an [`Attachment`] labelled with its file name.
/// Unreadable files are skipped.
pub fn load_attachments(reader: &dyn ResourceReader, paths: &[PathBuf]) -> Vec<Attachment> {
    paths
        .iter()
        .filter_map(|path| match reader.read(path) {
            Ok(bytes) => Some(Attachment::new(label_for(path), String::from_utf8_lossy(&bytes))),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping unreadable attachment");
                None
            }
        })
        .collect()
}

fn label_for(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    struct MemoryReader(HashMap<PathBuf, &'static str>);

    impl ResourceReader for MemoryReader {
        fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
            self.0
                .get(path)
                .map(|text| text.as_bytes().to_vec())
                .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))
        }
    }

    #[test]
    fn test_missing_files_skipped() {
        let reader = MemoryReader(HashMap::from([(PathBuf::from("/docs/a.md"), "alpha")]));
        let attachments = load_attachments(
            &reader,
            &[PathBuf::from("/docs/a.md"), PathBuf::from("/docs/missing.md")],
        );
        assert_eq!(attachments, vec![Attachment::new("a.md", "alpha")]);
    }

    #[test]
    fn test_reads_from_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "remember the milk").unwrap();

        let attachments = load_attachments(&FsResourceReader, &[path]);
        assert_eq!(attachments.len(), 1);
        assert_eq!(attachments[0].label, "notes.txt");
        assert_eq!(attachments[0].text, "remember the milk");
    }
}
