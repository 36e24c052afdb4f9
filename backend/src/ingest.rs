use actix_multipart::{Field, Multipart};
use futures::{StreamExt, TryStreamExt};
use std::path::{Path, PathBuf};

/// Multipart field carrying the image.
pub const FILE_FIELD: &str = "file";

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("No file uploaded!")]
    MissingFile,
    #[error("No image selected!")]
    EmptyFilename,
    #[error("Failed to read upload: {0}")]
    Read(String),
    #[error("Failed to save upload to {path}: {source}")]
    Save {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl IngestError {
    /// Whether this is one of the conditions reported back to the user as a
    /// plain message rather than a server error.
    pub fn is_user_facing(&self) -> bool {
        matches!(self, IngestError::MissingFile | IngestError::EmptyFilename)
    }
}

#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl UploadedImage {
    /// Writes the upload to `dir` under its own name, replacing any earlier
    /// upload with the same name.
    pub fn persist(&self, dir: &Path) -> Result<PathBuf, IngestError> {
        let path = dir.join(&self.file_name);
        std::fs::create_dir_all(dir)
            .and_then(|_| std::fs::write(&path, &self.bytes))
            .map_err(|source| IngestError::Save {
                path: path.clone(),
                source,
            })?;
        Ok(path)
    }
}

/// Last path component of a client-supplied filename, or `None` when nothing
/// usable is left.
pub fn sanitize_file_name(raw: &str) -> Option<&str> {
    let name = raw.rsplit(['/', '\\']).next().unwrap_or_default();
    match name {
        "" | "." | ".." => None,
        name => Some(name),
    }
}

/// Pulls the first file part named [`FILE_FIELD`] out of the request body.
/// A body that is not valid multipart counts as carrying no file.
pub async fn extract_upload(mut payload: Multipart) -> Result<UploadedImage, IngestError> {
    while let Ok(Some(mut field)) = payload.try_next().await {
        let file_name = match upload_file_name(&field) {
            Some(name) => name,
            None => {
                drain(&mut field).await;
                continue;
            }
        };

        let file_name = sanitize_file_name(&file_name)
            .ok_or(IngestError::EmptyFilename)?
            .to_string();

        let mut bytes = Vec::new();
        while let Some(chunk) = field.next().await {
            let data = chunk.map_err(|e| IngestError::Read(e.to_string()))?;
            bytes.extend_from_slice(&data);
        }
        return Ok(UploadedImage { file_name, bytes });
    }
    Err(IngestError::MissingFile)
}

fn upload_file_name(field: &Field) -> Option<String> {
    if field.name() != Some(FILE_FIELD) {
        return None;
    }
    field
        .content_disposition()
        .and_then(|cd| cd.get_filename())
        .map(str::to_owned)
}

async fn drain(field: &mut Field) {
    while let Some(chunk) = field.next().await {
        if chunk.is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_names_are_kept() {
        assert_eq!(sanitize_file_name("cow.jpg"), Some("cow.jpg"));
        assert_eq!(sanitize_file_name("my cow (1).PNG"), Some("my cow (1).PNG"));
    }

    #[test]
    fn directory_components_are_stripped() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), Some("passwd"));
        assert_eq!(sanitize_file_name("C:\\Users\\farm\\cow.jpg"), Some("cow.jpg"));
    }

    #[test]
    fn empty_or_dot_names_are_rejected() {
        assert_eq!(sanitize_file_name(""), None);
        assert_eq!(sanitize_file_name("uploads/"), None);
        assert_eq!(sanitize_file_name(".."), None);
    }

    #[test]
    fn persist_overwrites_same_name() {
        let dir = tempfile::tempdir().unwrap();
        let first = UploadedImage {
            file_name: "cow.jpg".into(),
            bytes: vec![1, 2, 3],
        };
        let second = UploadedImage {
            file_name: "cow.jpg".into(),
            bytes: vec![9],
        };

        let path = first.persist(dir.path()).unwrap();
        assert_eq!(second.persist(dir.path()).unwrap(), path);
        assert_eq!(std::fs::read(&path).unwrap(), vec![9]);
    }

    #[test]
    fn persist_creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("static").join("uploads");
        let upload = UploadedImage {
            file_name: "calf.png".into(),
            bytes: vec![0; 4],
        };
        assert!(upload.persist(&nested).unwrap().exists());
    }

    #[test]
    fn only_missing_and_empty_are_user_facing() {
        assert!(IngestError::MissingFile.is_user_facing());
        assert!(IngestError::EmptyFilename.is_user_facing());
        assert!(!IngestError::Read("boom".into()).is_user_facing());
    }
}
