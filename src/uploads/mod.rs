//! Local file storage for multipart uploads.
//!
//! Files land in `<root>/<dir>/<field>-<unix millis>-<9 random digits><ext>`
//! and are served back under `/uploads/<dir>/<file>`. Incoming parts are
//! streamed to a hidden `.part` file next to their final name and renamed
//! once the whole request has been accepted.

use rand::Rng;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// URL prefix under which stored files are served
pub const PUBLIC_PREFIX: &str = "/uploads";

/// Named multipart fields that may carry a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UploadField {
    BookImage,
    BookAudio,
    VideoFile,
    Thumbnail,
}

impl UploadField {
    pub const ALL: [UploadField; 4] = [
        UploadField::BookImage,
        UploadField::BookAudio,
        UploadField::VideoFile,
        UploadField::Thumbnail,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.name() == name)
    }

    /// Form field name as sent by the client
    pub fn name(&self) -> &'static str {
        match self {
            UploadField::BookImage => "bookImage",
            UploadField::BookAudio => "bookAudio",
            UploadField::VideoFile => "videoFile",
            UploadField::Thumbnail => "thumbnail",
        }
    }

    /// Required prefix of the declared content type
    pub fn mime_prefix(&self) -> &'static str {
        match self {
            UploadField::BookImage | UploadField::Thumbnail => "image/",
            UploadField::BookAudio => "audio/",
            UploadField::VideoFile => "video/",
        }
    }

    /// Subdirectory of the upload root
    pub fn dir(&self) -> &'static str {
        match self {
            UploadField::BookImage => "images",
            UploadField::BookAudio => "audio",
            UploadField::VideoFile => "videos",
            UploadField::Thumbnail => "thumbnails",
        }
    }
}

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Invalid file type for {field}: expected {expected}*, got {content_type}")]
    InvalidType {
        field: &'static str,
        expected: &'static str,
        content_type: String,
    },

    #[error("File exceeds maximum allowed size of {0} bytes")]
    TooLarge(usize),

    #[error("Only one file is allowed for field {0}")]
    DuplicateField(&'static str),

    #[error("Unexpected file field: {0}")]
    UnexpectedField(String),

    #[error("Failed to store file: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct UploadStore {
    root: PathBuf,
    max_size: usize,
}

impl UploadStore {
    pub fn new(root: impl Into<PathBuf>, max_size: usize) -> Self {
        Self {
            root: root.into(),
            max_size,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the root and one directory per field
    pub async fn ensure_dirs(&self) -> std::io::Result<()> {
        for field in UploadField::ALL {
            fs::create_dir_all(self.root.join(field.dir())).await?;
        }
        Ok(())
    }

    /// Check the declared content type against the field
    pub fn check_type(&self, field: UploadField, content_type: &str) -> Result<(), UploadError> {
        if content_type.to_ascii_lowercase().starts_with(field.mime_prefix()) {
            Ok(())
        } else {
            Err(UploadError::InvalidType {
                field: field.name(),
                expected: field.mime_prefix(),
                content_type: content_type.to_string(),
            })
        }
    }

    /// Open a staging file for an incoming part. The content type is checked
    /// before anything touches the disk.
    pub async fn create(
        &self,
        field: UploadField,
        original_name: Option<&str>,
        content_type: &str,
    ) -> Result<UploadWriter, UploadError> {
        self.check_type(field, content_type)?;

        let file_name = generate_file_name(field, original_name, content_type);
        let dir = self.root.join(field.dir());
        fs::create_dir_all(&dir).await?;

        let temp_path = dir.join(format!(".{}.part", file_name));
        let file = fs::File::create(&temp_path).await?;

        Ok(UploadWriter {
            file,
            staged: StagedFile {
                field,
                file_name,
                temp_path,
                size: 0,
                persisted: false,
            },
            max_size: self.max_size,
        })
    }

    /// Move a staged file to its final name and return its public path
    pub async fn persist(&self, mut staged: StagedFile) -> Result<String, UploadError> {
        let final_path = staged.temp_path.with_file_name(&staged.file_name);
        fs::rename(&staged.temp_path, &final_path).await?;
        staged.persisted = true;

        let public_path = format!("{}/{}/{}", PUBLIC_PREFIX, staged.field.dir(), staged.file_name);
        info!(field = staged.field.name(), path = %public_path, size = staged.size, "Stored upload");
        Ok(public_path)
    }

    /// Map a public path back to a file under the root. Anything that would
    /// escape the root is rejected.
    pub fn resolve(&self, public_path: &str) -> Option<PathBuf> {
        let relative = public_path.strip_prefix(PUBLIC_PREFIX)?.strip_prefix('/')?;
        let relative = Path::new(relative);
        if relative.as_os_str().is_empty()
            || relative
                .components()
                .any(|c| !matches!(c, Component::Normal(_)))
        {
            return None;
        }
        Some(self.root.join(relative))
    }

    /// Best-effort removal of a stored file
    pub async fn remove(&self, public_path: &str) {
        let Some(path) = self.resolve(public_path) else {
            debug!(path = %public_path, "Not a stored upload, skipping removal");
            return;
        };
        match fs::remove_file(&path).await {
            Ok(()) => debug!(path = %path.display(), "Removed upload"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove upload"),
        }
    }

    pub async fn remove_all<'a>(&self, public_paths: impl IntoIterator<Item = &'a str>) {
        for path in public_paths {
            self.remove(path).await;
        }
    }
}

/// Streams one file part into its staging file
#[derive(Debug)]
pub struct UploadWriter {
    file: fs::File,
    staged: StagedFile,
    max_size: usize,
}

impl UploadWriter {
    /// Append a chunk, failing as soon as the running size passes the limit
    pub async fn write(&mut self, chunk: &[u8]) -> Result<(), UploadError> {
        let size = self.staged.size + chunk.len();
        if size > self.max_size {
            return Err(UploadError::TooLarge(self.max_size));
        }
        self.file.write_all(chunk).await?;
        self.staged.size = size;
        Ok(())
    }

    pub async fn finish(mut self) -> Result<StagedFile, UploadError> {
        self.file.flush().await?;
        Ok(self.staged)
    }
}

/// A fully written part waiting under its temporary name. Dropping it
/// without `UploadStore::persist` deletes the staging file.
#[derive(Debug)]
pub struct StagedFile {
    field: UploadField,
    file_name: String,
    temp_path: PathBuf,
    size: usize,
    persisted: bool,
}

impl StagedFile {
    pub fn field(&self) -> UploadField {
        self.field
    }

    pub fn size(&self) -> usize {
        self.size
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if self.persisted {
            return;
        }
        match std::fs::remove_file(&self.temp_path) {
            Ok(()) => debug!(path = %self.temp_path.display(), "Discarded staged upload"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.temp_path.display(), error = %e, "Failed to discard staged upload"),
        }
    }
}

/// `<field>-<unix millis>-<9 random digits><ext>`
pub fn generate_file_name(
    field: UploadField,
    original_name: Option<&str>,
    content_type: &str,
) -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let suffix: u32 = rand::rng().random_range(0..1_000_000_000);
    let ext = extension_for(original_name, content_type);
    format!("{}-{}-{:09}{}", field.name(), millis, suffix, ext)
}

/// Extension from the original name when it looks sane, otherwise from the MIME type
fn extension_for(original_name: Option<&str>, content_type: &str) -> String {
    let from_name = original_name
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.len() <= 10 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| ext.to_ascii_lowercase());

    let ext = from_name.or_else(|| {
        mime_guess::get_mime_extensions_str(content_type)
            .and_then(|exts| exts.first())
            .map(|ext| ext.to_string())
    });

    ext.map(|e| format!(".{}", e)).unwrap_or_default()
}

/// Content type for a part that did not declare one
pub fn guess_content_type(file_name: Option<&str>) -> String {
    file_name
        .map(|name| mime_guess::from_path(name).first_or_octet_stream().to_string())
        .unwrap_or_else(|| "application/octet-stream".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_names_round_trip() {
        for field in UploadField::ALL {
            assert_eq!(UploadField::from_name(field.name()), Some(field));
        }
        assert_eq!(UploadField::from_name("avatar"), None);
    }

    #[test]
    fn test_check_type_by_prefix() {
        let store = UploadStore::new("/tmp/unused", 1024);
        assert!(store.check_type(UploadField::BookImage, "image/png").is_ok());
        assert!(store.check_type(UploadField::BookImage, "IMAGE/JPEG").is_ok());
        assert!(matches!(
            store.check_type(UploadField::BookImage, "application/pdf"),
            Err(UploadError::InvalidType { .. })
        ));
        assert!(store.check_type(UploadField::BookAudio, "audio/mpeg").is_ok());
        assert!(store.check_type(UploadField::VideoFile, "image/png").is_err());
    }

    #[test]
    fn test_generated_name_shape() {
        let name = generate_file_name(UploadField::BookAudio, Some("chapter one.MP3"), "audio/mpeg");
        assert!(name.starts_with("bookAudio-"));
        assert!(name.ends_with(".mp3"));
        let parts: Vec<&str> = name.trim_end_matches(".mp3").split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[2].len(), 9);
    }

    #[test]
    fn test_extension_falls_back_to_mime() {
        assert_eq!(extension_for(None, "image/png"), ".png");
        assert_eq!(extension_for(Some("weird.<>"), "image/png"), ".png");
        assert_eq!(extension_for(None, "application/x-unknown-thing"), "");
    }

    #[test]
    fn test_resolve_rejects_traversal() {
        let store = UploadStore::new("/srv/uploads", 1024);
        assert_eq!(
            store.resolve("/uploads/images/a.png"),
            Some(PathBuf::from("/srv/uploads/images/a.png"))
        );
        assert_eq!(store.resolve("/uploads/../etc/passwd"), None);
        assert_eq!(store.resolve("https://cdn.example.com/a.png"), None);
        assert_eq!(store.resolve("/uploads/"), None);
    }

    async fn stage(store: &UploadStore, chunks: &[&[u8]]) -> Result<StagedFile, UploadError> {
        let mut writer = store.create(UploadField::BookImage, Some("cover.png"), "image/png").await?;
        for chunk in chunks {
            writer.write(chunk).await?;
        }
        writer.finish().await
    }

    fn entries(dir: &Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .map(|entries| {
                entries
                    .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn test_stream_persist_and_remove() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = UploadStore::new(temp_dir.path(), 1024);
        store.ensure_dirs().await.unwrap();

        let staged = stage(&store, &[b"png-", b"bytes"]).await.unwrap();
        assert_eq!(staged.size(), 9);
        let pending = entries(&temp_dir.path().join("images"));
        assert_eq!(pending.len(), 1);
        assert!(pending[0].starts_with(".bookImage-") && pending[0].ends_with(".part"));

        let path = store.persist(staged).await.unwrap();
        assert!(path.starts_with("/uploads/images/bookImage-"));
        assert!(path.ends_with(".png"));

        let on_disk = store.resolve(&path).unwrap();
        assert_eq!(std::fs::read(&on_disk).unwrap(), b"png-bytes");
        assert_eq!(entries(&temp_dir.path().join("images")).len(), 1);

        store.remove(&path).await;
        assert!(!on_disk.exists());
    }

    #[tokio::test]
    async fn test_dropped_staged_file_is_deleted() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = UploadStore::new(temp_dir.path(), 1024);

        let staged = stage(&store, &[b"abc"]).await.unwrap();
        assert_eq!(entries(&temp_dir.path().join("images")).len(), 1);
        drop(staged);
        assert!(entries(&temp_dir.path().join("images")).is_empty());
    }

    #[tokio::test]
    async fn test_limits_checked_while_streaming() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = UploadStore::new(temp_dir.path(), 4);

        let err = store
            .create(UploadField::BookImage, Some("doc.pdf"), "application/pdf")
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::InvalidType { .. }));
        assert!(!temp_dir.path().join("images").exists());

        let err = stage(&store, &[b"abc", b"de"]).await.unwrap_err();
        assert!(matches!(err, UploadError::TooLarge(4)));
        assert!(entries(&temp_dir.path().join("images")).is_empty());
    }
}
