use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

use crate::db::{self, ItemIdRequest, User, UserList};
use crate::AppState;

use super::error::ApiError;
use super::validation::validate_required_text;

fn check_item_id(item_id: &str) -> Result<(), ApiError> {
    validate_required_text(item_id, "Item ID", 100)
        .map_err(|e| ApiError::validation_field("itemId", e))
}

/// GET /api/auth/favorites
pub async fn list_favorites(user: User) -> Json<Vec<String>> {
    Json(user.favorites_list())
}

/// POST /api/auth/favorites
pub async fn add_favorite(
    State(state): State<Arc<AppState>>,
    user: User,
    Json(req): Json<ItemIdRequest>,
) -> Result<Json<Vec<String>>, ApiError> {
    check_item_id(&req.item_id)?;
    let item_id = req.item_id.trim();

    let favorites = db::edit_user_list(&state.db, &user.id, UserList::Favorites, |favorites| {
        db::add_favorite(favorites, item_id)
    })
    .await?;
    Ok(Json(favorites))
}

/// DELETE /api/auth/favorites/:item_id
pub async fn remove_favorite(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(item_id): Path<String>,
) -> Result<Json<Vec<String>>, ApiError> {
    let favorites = db::edit_user_list(&state.db, &user.id, UserList::Favorites, |mut favorites| {
        favorites.retain(|id| id != &item_id);
        favorites
    })
    .await?;
    Ok(Json(favorites))
}

/// POST /api/auth/history
pub async fn record_history(
    State(state): State<Arc<AppState>>,
    user: User,
    Json(req): Json<ItemIdRequest>,
) -> Result<Json<Vec<String>>, ApiError> {
    check_item_id(&req.item_id)?;
    let item_id = req.item_id.trim();

    let history = db::edit_user_list(&state.db, &user.id, UserList::WatchHistory, |history| {
        db::push_history(history, item_id)
    })
    .await?;
    Ok(Json(history))
}
