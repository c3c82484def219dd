//! Pieces shared by the book and video handlers: visibility rules and
//! multipart form collection.

use axum::extract::multipart::{Multipart, MultipartError};
use axum::http::StatusCode;
use serde::Deserialize;
use std::collections::HashMap;
use std::str::FromStr;

use super::error::{ApiError, ValidationErrorBuilder};
use super::metrics;
use crate::db::{User, Viewer};
use crate::uploads::{
    guess_content_type, StagedFile, UploadError, UploadField, UploadStore, UploadWriter,
};

#[derive(Debug, Deserialize)]
pub struct RateRequest {
    pub rating: f64,
}

pub fn viewer_for(user: Option<&User>) -> Viewer {
    match user {
        Some(u) if u.is_admin => Viewer::Admin,
        Some(u) => Viewer::User(u.id.clone()),
        None => Viewer::Anonymous,
    }
}

/// Private items are only visible to their owner and admins
pub fn can_see(user: Option<&User>, is_public: bool, owner_id: &str) -> bool {
    is_public || user.is_some_and(|u| u.can_modify(owner_id))
}

/// Text fields and staged files of a multipart upload. Staged files that are
/// never stored are deleted when the form is dropped.
#[derive(Debug, Default)]
pub struct UploadForm {
    fields: HashMap<String, String>,
    files: Vec<StagedFile>,
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::payload_too_large(err.body_text())
        } else {
            ApiError::bad_request(format!("Invalid multipart body: {}", err.body_text()))
        }
    }
}

impl UploadForm {
    /// Drain the multipart stream. File parts are checked against `allowed`
    /// and the store limits as they arrive and are streamed to staging files,
    /// so at most one chunk of a file is held in memory.
    pub async fn read(
        mut multipart: Multipart,
        store: &UploadStore,
        allowed: &[UploadField],
    ) -> Result<Self, ApiError> {
        let mut form = UploadForm::default();

        while let Some(mut field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();

            // Parts without a file name are plain values (`thumbnail` may be a URL)
            if field.file_name().is_none() {
                let value = field.text().await?;
                form.fields.insert(name, value);
                continue;
            }

            let upload_field = match UploadField::from_name(&name) {
                Some(f) if allowed.contains(&f) => f,
                _ => return Err(UploadError::UnexpectedField(name).into()),
            };

            if form.has_file(upload_field) {
                return Err(UploadError::DuplicateField(upload_field.name()).into());
            }

            let file_name = field.file_name().map(str::to_string);
            let content_type = field
                .content_type()
                .map(str::to_string)
                .unwrap_or_else(|| guess_content_type(file_name.as_deref()));

            // Opened on the first chunk: browsers send an empty part for an
            // untouched file input
            let mut writer: Option<UploadWriter> = None;
            while let Some(chunk) = field.chunk().await? {
                if writer.is_none() {
                    writer = Some(
                        store
                            .create(upload_field, file_name.as_deref(), &content_type)
                            .await?,
                    );
                }
                if let Some(writer) = writer.as_mut() {
                    writer.write(&chunk).await?;
                }
            }

            if let Some(writer) = writer {
                let staged = writer.finish().await?;
                if staged.size() > 0 {
                    form.files.push(staged);
                }
            }
        }

        Ok(form)
    }

    pub fn text(&self, name: &str) -> Option<String> {
        self.fields
            .get(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    /// Parse a numeric field, recording a validation error when malformed
    pub fn number<T: FromStr>(&self, name: &str, errors: &mut ValidationErrorBuilder) -> Option<T> {
        let raw = self.text(name)?;
        match raw.parse::<T>() {
            Ok(v) => Some(v),
            Err(_) => {
                errors.add(name, format!("{} must be a number", name));
                None
            }
        }
    }

    /// Parse a boolean field (`true`/`false`/`1`/`0`/`on`)
    pub fn flag(&self, name: &str, errors: &mut ValidationErrorBuilder) -> Option<bool> {
        let raw = self.text(name)?;
        match raw.to_ascii_lowercase().as_str() {
            "true" | "1" | "on" | "yes" => Some(true),
            "false" | "0" | "off" | "no" => Some(false),
            _ => {
                errors.add(name, format!("{} must be true or false", name));
                None
            }
        }
    }

    pub fn has_file(&self, field: UploadField) -> bool {
        self.files.iter().any(|f| f.field() == field)
    }

    /// Move all staged files to their final names. On failure the files
    /// already moved are removed and the rest are discarded.
    pub async fn store(self, store: &UploadStore) -> Result<StoredFiles, ApiError> {
        let mut stored = StoredFiles::default();
        for file in self.files {
            let field = file.field();
            match store.persist(file).await {
                Ok(path) => {
                    metrics::record_upload(field.name());
                    stored.paths.push((field, path));
                }
                Err(e) => {
                    stored.discard(store).await;
                    return Err(e.into());
                }
            }
        }
        Ok(stored)
    }
}

/// Public paths of files written for one upload request
#[derive(Debug, Default)]
pub struct StoredFiles {
    paths: Vec<(UploadField, String)>,
}

impl StoredFiles {
    pub fn get(&self, field: UploadField) -> Option<String> {
        self.paths
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, p)| p.clone())
    }

    /// Remove everything that was written
    pub async fn discard(&self, store: &UploadStore) {
        store.remove_all(self.paths.iter().map(stored_path)).await;
    }
}

fn stored_path(entry: &(UploadField, String)) -> &str {
    entry.1.as_str()
}
