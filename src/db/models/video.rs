//! Video models and queries.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

use super::{now, CatalogQuery, Viewer};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Video {
    pub id: String,
    pub title: String,
    pub instructor: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub thumbnail: Option<String>,
    /// External URL; either this or `video_file` is set
    pub video_url: Option<String>,
    pub video_file: Option<String>,
    /// Uploaded thumbnail owned by this video. `thumbnail` is only a display
    /// value and may point anywhere.
    pub thumbnail_file: Option<String>,
    /// Length in seconds
    pub duration: i64,
    pub rating: f64,
    pub views: i64,
    pub is_public: bool,
    pub featured: bool,
    pub user_id: String,
    pub user_name: String,
    pub created_at: String,
    pub updated_at: String,
}

impl Video {
    /// Uploaded files owned by this record
    pub fn stored_files(&self) -> Vec<&str> {
        [self.video_file.as_deref(), self.thumbnail_file.as_deref()]
            .into_iter()
            .flatten()
            .collect()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateVideoRequest {
    pub title: String,
    pub instructor: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub thumbnail: Option<String>,
    pub video_url: Option<String>,
    pub duration: Option<i64>,
    pub rating: Option<f64>,
    pub is_public: Option<bool>,
    pub featured: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateVideoRequest {
    pub title: Option<String>,
    pub instructor: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub thumbnail: Option<String>,
    pub video_url: Option<String>,
    pub duration: Option<i64>,
    pub rating: Option<f64>,
    pub is_public: Option<bool>,
    pub featured: Option<bool>,
}

#[derive(Debug, Clone, Default)]
pub struct VideoFiles {
    pub video_file: Option<String>,
    pub thumbnail: Option<String>,
}

pub async fn list_videos(
    db: &SqlitePool,
    query: &CatalogQuery,
    viewer: &Viewer,
) -> Result<Vec<Video>, sqlx::Error> {
    let filter = query.to_filter(viewer, "instructor");
    let sql = format!(
        "SELECT * FROM videos {} ORDER BY created_at DESC",
        filter.where_clause
    );
    let mut query_builder = sqlx::query_as::<_, Video>(&sql);
    for binding in &filter.bindings {
        query_builder = query_builder.bind(binding);
    }
    query_builder.fetch_all(db).await
}

pub async fn find_video(db: &SqlitePool, id: &str) -> Result<Option<Video>, sqlx::Error> {
    sqlx::query_as::<_, Video>("SELECT * FROM videos WHERE id = ?")
        .bind(id)
        .fetch_optional(db)
        .await
}

pub async fn insert_video(
    db: &SqlitePool,
    req: &CreateVideoRequest,
    files: &VideoFiles,
    user_id: &str,
    user_name: &str,
) -> Result<Video, sqlx::Error> {
    let id = uuid::Uuid::new_v4().to_string();
    let now = now();
    let thumbnail = files.thumbnail.clone().or_else(|| req.thumbnail.clone());

    sqlx::query(
        r#"
        INSERT INTO videos (id, title, instructor, description, category, thumbnail, video_url, video_file, thumbnail_file, duration, rating, is_public, featured, user_id, user_name, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(req.title.trim())
    .bind(req.instructor.trim())
    .bind(&req.description)
    .bind(&req.category)
    .bind(&thumbnail)
    .bind(&req.video_url)
    .bind(&files.video_file)
    .bind(&files.thumbnail)
    .bind(req.duration.unwrap_or(0))
    .bind(req.rating.unwrap_or(0.0))
    .bind(req.is_public.unwrap_or(true))
    .bind(req.featured.unwrap_or(false))
    .bind(user_id)
    .bind(user_name)
    .bind(&now)
    .bind(&now)
    .execute(db)
    .await?;

    sqlx::query_as::<_, Video>("SELECT * FROM videos WHERE id = ?")
        .bind(&id)
        .fetch_one(db)
        .await
}

/// Apply a partial update. An uploaded thumbnail that is replaced stops being
/// owned by the video; the caller removes files that dropped out of
/// `stored_files`.
pub async fn update_video(
    db: &SqlitePool,
    existing: &Video,
    req: &UpdateVideoRequest,
) -> Result<Video, sqlx::Error> {
    let thumbnail = req.thumbnail.as_ref().or(existing.thumbnail.as_ref());
    let thumbnail_file = existing
        .thumbnail_file
        .as_ref()
        .filter(|file| thumbnail == Some(*file));

    sqlx::query(
        r#"
        UPDATE videos SET
            title = ?,
            instructor = ?,
            description = ?,
            category = ?,
            thumbnail = ?,
            thumbnail_file = ?,
            video_url = ?,
            duration = ?,
            rating = ?,
            is_public = ?,
            featured = ?,
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(req.title.as_deref().map(str::trim).unwrap_or(&existing.title))
    .bind(req.instructor.as_deref().map(str::trim).unwrap_or(&existing.instructor))
    .bind(req.description.as_ref().or(existing.description.as_ref()))
    .bind(req.category.as_ref().or(existing.category.as_ref()))
    .bind(thumbnail)
    .bind(thumbnail_file)
    .bind(req.video_url.as_ref().or(existing.video_url.as_ref()))
    .bind(req.duration.unwrap_or(existing.duration))
    .bind(req.rating.unwrap_or(existing.rating))
    .bind(req.is_public.unwrap_or(existing.is_public))
    .bind(req.featured.unwrap_or(existing.featured))
    .bind(now())
    .bind(&existing.id)
    .execute(db)
    .await?;

    sqlx::query_as::<_, Video>("SELECT * FROM videos WHERE id = ?")
        .bind(&existing.id)
        .fetch_one(db)
        .await
}

pub async fn delete_video(db: &SqlitePool, id: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM videos WHERE id = ?")
        .bind(id)
        .execute(db)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Atomically bump the view counter and return the new value
pub async fn increment_video_views(db: &SqlitePool, id: &str) -> Result<Option<i64>, sqlx::Error> {
    sqlx::query_scalar::<_, i64>("UPDATE videos SET views = views + 1 WHERE id = ? RETURNING views")
        .bind(id)
        .fetch_optional(db)
        .await
}

pub async fn set_video_rating(db: &SqlitePool, id: &str, rating: f64) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE videos SET rating = ?, updated_at = ? WHERE id = ?")
        .bind(rating)
        .bind(now())
        .bind(id)
        .execute(db)
        .await?;
    Ok(())
}
