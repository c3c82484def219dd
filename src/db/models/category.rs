//! Category lookup table.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub color: Option<String>,
    pub icon: Option<String>,
    pub is_active: bool,
    pub created_at: String,
}

/// Category with counts derived at query time (never persisted)
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CategoryWithCounts {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub category: Category,
    pub book_count: i64,
    pub video_count: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateCategoryRequest {
    pub name: String,
    pub description: Option<String>,
    pub color: Option<String>,
    pub icon: Option<String>,
}

/// Active categories ordered by name, with public book/video counts
pub async fn list_categories(db: &SqlitePool) -> Result<Vec<CategoryWithCounts>, sqlx::Error> {
    sqlx::query_as::<_, CategoryWithCounts>(
        r#"
        SELECT c.*,
            (SELECT COUNT(*) FROM books b WHERE b.category = c.name AND b.is_public = 1) AS book_count,
            (SELECT COUNT(*) FROM videos v WHERE v.category = c.name AND v.is_public = 1) AS video_count
        FROM categories c
        WHERE c.is_active = 1
        ORDER BY c.name ASC
        "#,
    )
    .fetch_all(db)
    .await
}

pub async fn insert_category(
    db: &SqlitePool,
    req: &CreateCategoryRequest,
) -> Result<Category, sqlx::Error> {
    let id = uuid::Uuid::new_v4().to_string();

    sqlx::query(
        "INSERT INTO categories (id, name, description, color, icon, created_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(req.name.trim())
    .bind(&req.description)
    .bind(&req.color)
    .bind(&req.icon)
    .bind(super::now())
    .execute(db)
    .await?;

    sqlx::query_as::<_, Category>("SELECT * FROM categories WHERE id = ?")
        .bind(&id)
        .fetch_one(db)
        .await
}
