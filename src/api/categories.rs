use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;

use crate::db::{self, Category, CategoryWithCounts, CreateCategoryRequest};
use crate::AppState;

use super::auth::AdminUser;
use super::error::{ApiError, ValidationErrorBuilder};
use super::validation::{validate_color, validate_optional_text, validate_required_text};

/// GET /api/categories
pub async fn list_categories(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<CategoryWithCounts>>, ApiError> {
    let categories = db::list_categories(&state.db).await?;
    Ok(Json(categories))
}

/// POST /api/categories (admin)
pub async fn create_category(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Json(req): Json<CreateCategoryRequest>,
) -> Result<(StatusCode, Json<Category>), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    errors
        .check("name", validate_required_text(&req.name, "Name", 100))
        .check("description", validate_optional_text(&req.description, "Description", 500))
        .check("color", validate_color(&req.color))
        .check("icon", validate_optional_text(&req.icon, "Icon", 50));
    errors.finish()?;

    let category = db::insert_category(&state.db, &req).await.map_err(|e| match e {
        sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
            ApiError::conflict(format!("Category '{}' already exists", req.name.trim()))
        }
        e => ApiError::from(e),
    })?;

    tracing::info!(category = %category.name, user_id = %admin.id, "Category created");
    Ok((StatusCode::CREATED, Json(category)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::auth::ensure_admin_user;
    use crate::api::test_support::{body_json, json_request, login, register_user, send, test_state};
    use axum::http::Method;
    use serde_json::json;

    #[tokio::test]
    async fn test_list_includes_seeded_categories_with_counts() {
        let (state, _dir) = test_state().await;
        let (token, _) = register_user(&state, "cat@example.com", "Cat").await;

        for (title, is_public) in [("Public", true), ("Hidden", false)] {
            send(
                &state,
                json_request(
                    Method::POST,
                    "/api/books",
                    Some(&token),
                    &json!({ "title": title, "author": "x", "category": "Science", "isPublic": is_public }),
                ),
            )
            .await;
        }

        let response = send(&state, json_request(Method::GET, "/api/categories", None, &json!(null))).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        let list = body.as_array().unwrap();

        let names: Vec<&str> = list.iter().map(|c| c["name"].as_str().unwrap()).collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);

        let science = list.iter().find(|c| c["name"] == "Science").unwrap();
        assert_eq!(science["bookCount"], 1);
        assert_eq!(science["videoCount"], 0);
    }

    #[tokio::test]
    async fn test_create_is_admin_only() {
        let (state, _dir) = test_state().await;
        let (token, _) = register_user(&state, "plain@example.com", "Plain").await;
        let body = json!({ "name": "Poetry", "color": "#AA33CC" });

        let response = send(&state, json_request(Method::POST, "/api/categories", Some(&token), &body)).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        ensure_admin_user(&state.db, "root@example.com", "root-pass").await.unwrap();
        let admin_token = login(&state, "root@example.com", "root-pass").await;

        let response = send(&state, json_request(Method::POST, "/api/categories", Some(&admin_token), &body)).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(body_json(response).await["name"], "Poetry");

        let response = send(&state, json_request(Method::POST, "/api/categories", Some(&admin_token), &body)).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }
}
