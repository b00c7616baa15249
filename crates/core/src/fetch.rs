use crate::error::IngestError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Narrow interface to the upload collaborator: resolve a storage path to
/// the raw document bytes.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    async fn get_document_bytes(&self, storage_path: &str) -> Result<Vec<u8>, IngestError>;
}

/// Reads documents from an uploads directory on the local filesystem.
pub struct FileSystemSource {
    root: PathBuf,
}

impl FileSystemSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl DocumentSource for FileSystemSource {
    async fn get_document_bytes(&self, storage_path: &str) -> Result<Vec<u8>, IngestError> {
        let path = self.root.join(storage_path);
        Ok(tokio::fs::read(&path).await?)
    }
}

pub fn discover_pdf_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_pdf = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        if is_pdf {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn discover_pdf_files_is_recursive() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let base = dir.path();
        let nested = base.join("nested");
        fs::create_dir(&nested)?;

        File::create(base.join("a.pdf")).and_then(|mut file| file.write_all(b"%PDF-1.4\n%fake"))?;
        File::create(nested.join("b.pdf"))
            .and_then(|mut file| file.write_all(b"%PDF-1.4\n%fake"))?;
        File::create(base.join("notes.txt")).and_then(|mut file| file.write_all(b"plain"))?;

        let files = discover_pdf_files(base);
        assert_eq!(files.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn filesystem_source_reads_relative_paths() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::write(dir.path().join("doc.pdf"), b"%PDF-1.4")?;

        let source = FileSystemSource::new(dir.path());
        let bytes = source.get_document_bytes("doc.pdf").await?;
        assert_eq!(bytes, b"%PDF-1.4");
        Ok(())
    }

    #[tokio::test]
    async fn missing_file_is_an_io_error() {
        let dir = tempdir().expect("tempdir");
        let source = FileSystemSource::new(dir.path());
        let result = source.get_document_bytes("absent.pdf").await;
        assert!(matches!(result, Err(IngestError::Io(_))));
    }
}
