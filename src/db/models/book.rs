//! Book models and queries.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

use super::{now, CatalogQuery, Viewer};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    pub id: String,
    pub title: String,
    pub author: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub cover_image: Option<String>,
    pub pages: i64,
    pub rating: f64,
    pub price: f64,
    pub views: i64,
    pub is_public: bool,
    pub featured: bool,
    pub user_id: String,
    pub user_name: String,
    pub team_id: Option<String>,
    pub audio_file: Option<String>,
    pub image_file: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Book {
    /// Uploaded files owned by this record
    pub fn stored_files(&self) -> Vec<&str> {
        [self.image_file.as_deref(), self.audio_file.as_deref()]
            .into_iter()
            .flatten()
            .collect()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookRequest {
    pub title: String,
    pub author: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub cover_image: Option<String>,
    pub pages: Option<i64>,
    pub rating: Option<f64>,
    pub price: Option<f64>,
    pub is_public: Option<bool>,
    pub featured: Option<bool>,
    pub team_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBookRequest {
    pub title: Option<String>,
    pub author: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub cover_image: Option<String>,
    pub pages: Option<i64>,
    pub rating: Option<f64>,
    pub price: Option<f64>,
    pub is_public: Option<bool>,
    pub featured: Option<bool>,
    pub team_id: Option<String>,
}

/// Paths of files stored for a new book
#[derive(Debug, Clone, Default)]
pub struct BookFiles {
    pub image_file: Option<String>,
    pub audio_file: Option<String>,
}

pub async fn list_books(
    db: &SqlitePool,
    query: &CatalogQuery,
    viewer: &Viewer,
) -> Result<Vec<Book>, sqlx::Error> {
    let filter = query.to_filter(viewer, "author");
    let sql = format!(
        "SELECT * FROM books {} ORDER BY created_at DESC",
        filter.where_clause
    );
    let mut query_builder = sqlx::query_as::<_, Book>(&sql);
    for binding in &filter.bindings {
        query_builder = query_builder.bind(binding);
    }
    query_builder.fetch_all(db).await
}

pub async fn find_book(db: &SqlitePool, id: &str) -> Result<Option<Book>, sqlx::Error> {
    sqlx::query_as::<_, Book>("SELECT * FROM books WHERE id = ?")
        .bind(id)
        .fetch_optional(db)
        .await
}

pub async fn insert_book(
    db: &SqlitePool,
    req: &CreateBookRequest,
    files: &BookFiles,
    user_id: &str,
    user_name: &str,
) -> Result<Book, sqlx::Error> {
    let id = uuid::Uuid::new_v4().to_string();
    let now = now();
    // An uploaded image doubles as the cover unless one was given explicitly
    let cover_image = req.cover_image.clone().or_else(|| files.image_file.clone());

    sqlx::query(
        r#"
        INSERT INTO books (id, title, author, description, category, cover_image, pages, rating, price, is_public, featured, user_id, user_name, team_id, audio_file, image_file, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(req.title.trim())
    .bind(req.author.trim())
    .bind(&req.description)
    .bind(&req.category)
    .bind(&cover_image)
    .bind(req.pages.unwrap_or(0))
    .bind(req.rating.unwrap_or(0.0))
    .bind(req.price.unwrap_or(0.0))
    .bind(req.is_public.unwrap_or(true))
    .bind(req.featured.unwrap_or(false))
    .bind(user_id)
    .bind(user_name)
    .bind(&req.team_id)
    .bind(&files.audio_file)
    .bind(&files.image_file)
    .bind(&now)
    .bind(&now)
    .execute(db)
    .await?;

    sqlx::query_as::<_, Book>("SELECT * FROM books WHERE id = ?")
        .bind(&id)
        .fetch_one(db)
        .await
}

pub async fn update_book(
    db: &SqlitePool,
    existing: &Book,
    req: &UpdateBookRequest,
) -> Result<Book, sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE books SET
            title = ?,
            author = ?,
            description = ?,
            category = ?,
            cover_image = ?,
            pages = ?,
            rating = ?,
            price = ?,
            is_public = ?,
            featured = ?,
            team_id = ?,
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(req.title.as_deref().map(str::trim).unwrap_or(&existing.title))
    .bind(req.author.as_deref().map(str::trim).unwrap_or(&existing.author))
    .bind(req.description.as_ref().or(existing.description.as_ref()))
    .bind(req.category.as_ref().or(existing.category.as_ref()))
    .bind(req.cover_image.as_ref().or(existing.cover_image.as_ref()))
    .bind(req.pages.unwrap_or(existing.pages))
    .bind(req.rating.unwrap_or(existing.rating))
    .bind(req.price.unwrap_or(existing.price))
    .bind(req.is_public.unwrap_or(existing.is_public))
    .bind(req.featured.unwrap_or(existing.featured))
    .bind(req.team_id.as_ref().or(existing.team_id.as_ref()))
    .bind(now())
    .bind(&existing.id)
    .execute(db)
    .await?;

    sqlx::query_as::<_, Book>("SELECT * FROM books WHERE id = ?")
        .bind(&existing.id)
        .fetch_one(db)
        .await
}

pub async fn delete_book(db: &SqlitePool, id: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM books WHERE id = ?")
        .bind(id)
        .execute(db)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Atomically bump the view counter and return the new value
pub async fn increment_book_views(db: &SqlitePool, id: &str) -> Result<Option<i64>, sqlx::Error> {
    sqlx::query_scalar::<_, i64>("UPDATE books SET views = views + 1 WHERE id = ? RETURNING views")
        .bind(id)
        .fetch_optional(db)
        .await
}

pub async fn set_book_rating(db: &SqlitePool, id: &str, rating: f64) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE books SET rating = ?, updated_at = ? WHERE id = ?")
        .bind(rating)
        .bind(now())
        .bind(id)
        .execute(db)
        .await?;
    Ok(())
}
