//! Database seeders for built-in data
//!
//! Runs on every startup; existing rows are left untouched.

use anyhow::Result;
use sqlx::SqlitePool;
use tracing::info;

/// Seed the default category lookup table
pub async fn seed_categories(pool: &SqlitePool) -> Result<()> {
    // Format: (name, description, color, icon)
    let categories: Vec<(&str, &str, &str, &str)> = vec![
        ("Biography", "Lives and memoirs", "#8B5CF6", "user"),
        ("Business", "Management, finance and entrepreneurship", "#0EA5E9", "briefcase"),
        ("Children", "Stories and lessons for young readers", "#F59E0B", "smile"),
        ("Education", "Courses, tutorials and study material", "#10B981", "graduation-cap"),
        ("Fiction", "Novels and short stories", "#EF4444", "book-open"),
        ("History", "Past events and civilizations", "#A16207", "landmark"),
        ("Science", "Physics, biology, chemistry and more", "#3B82F6", "flask"),
        ("Self-Help", "Personal growth and productivity", "#EC4899", "heart"),
        ("Technology", "Programming, engineering and gadgets", "#6366F1", "cpu"),
    ];

    let mut inserted = 0u64;
    for (name, description, color, icon) in categories {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO categories (id, name, description, color, icon, is_active, created_at)
            VALUES (?, ?, ?, ?, ?, 1, ?)
            "#,
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(name)
        .bind(description)
        .bind(color)
        .bind(icon)
        .bind(super::now())
        .execute(pool)
        .await?;
        inserted += result.rows_affected();
    }

    if inserted > 0 {
        info!(count = inserted, "Seeded default categories");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{list_categories, test_pool};

    #[tokio::test]
    async fn test_seed_categories_is_idempotent() {
        let pool = test_pool().await;
        seed_categories(&pool).await.unwrap();
        seed_categories(&pool).await.unwrap();

        let categories = list_categories(&pool).await.unwrap();
        assert_eq!(categories.len(), 9);

        let names: Vec<&str> = categories.iter().map(|c| c.category.name.as_str()).collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }
}
