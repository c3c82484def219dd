use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::db::{self, CreateOrderRequest, OrderWithItems, UpdateOrderStatusRequest, User};
use crate::AppState;

use super::auth::AdminUser;
use super::error::{ApiError, ValidationErrorBuilder};
use super::validation::{
    validate_item_type, validate_optional_text, validate_price, validate_quantity,
    validate_required_text,
};

fn validate_create_request(req: &CreateOrderRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    if req.items.is_empty() {
        errors.add("items", "An order needs at least one item");
    }

    for (i, item) in req.items.iter().enumerate() {
        let prefix = format!("items[{}]", i);
        errors
            .check(&format!("{}.itemId", prefix), validate_required_text(&item.item_id, "Item ID", 100))
            .check(&format!("{}.itemType", prefix), validate_item_type(&item.item_type))
            .check(&format!("{}.title", prefix), validate_required_text(&item.title, "Title", 200))
            .check(&format!("{}.price", prefix), validate_price(item.price))
            .check(&format!("{}.quantity", prefix), validate_quantity(item.quantity));
    }

    errors.check("address", validate_optional_text(&req.address, "Address", 500));
    errors.finish()
}

/// POST /api/orders
pub async fn create_order(
    State(state): State<Arc<AppState>>,
    user: User,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderWithItems>), ApiError> {
    validate_create_request(&req)?;

    let order = db::insert_order(&state.db, &user.id, &req).await?;
    tracing::info!(
        order_id = %order.order.id,
        user_id = %user.id,
        items = order.items.len(),
        total = order.order.total,
        "Order placed"
    );
    Ok((StatusCode::CREATED, Json(order)))
}

/// GET /api/orders
pub async fn list_orders(
    State(state): State<Arc<AppState>>,
    user: User,
) -> Result<Json<Vec<OrderWithItems>>, ApiError> {
    let orders = db::list_user_orders(&state.db, &user.id).await?;
    Ok(Json(orders))
}

/// GET /api/orders/:id
pub async fn get_order(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
) -> Result<Json<OrderWithItems>, ApiError> {
    match db::find_order(&state.db, &id).await? {
        Some(order) if user.can_modify(&order.order.user_id) => Ok(Json(order)),
        _ => Err(ApiError::not_found("Order not found")),
    }
}

/// PUT /api/orders/:id/status (admin)
pub async fn update_order_status(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
    Json(req): Json<UpdateOrderStatusRequest>,
) -> Result<Json<OrderWithItems>, ApiError> {
    if let Err(e) = validate_required_text(&req.status, "Status", 50) {
        return Err(ApiError::validation_field("status", e));
    }

    if !db::set_order_status(&state.db, &id, req.status.trim()).await? {
        return Err(ApiError::not_found("Order not found"));
    }

    let order = db::find_order(&state.db, &id)
        .await?
        .ok_or_else(|| ApiError::not_found("Order not found"))?;

    tracing::info!(order_id = %id, status = %order.order.status, admin_id = %admin.id, "Order status updated");
    Ok(Json(order))
}
