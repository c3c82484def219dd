//! Cart checkout records.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

use super::now;

pub const DEFAULT_ORDER_STATUS: &str = "pending";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    pub user_id: String,
    pub total: f64,
    /// Free text; no transition table is enforced
    pub status: String,
    pub address: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub id: String,
    pub order_id: String,
    pub item_id: String,
    pub item_type: String,
    pub title: String,
    pub price: f64,
    pub quantity: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderWithItems {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemRequest {
    pub item_id: String,
    pub item_type: String,
    pub title: String,
    pub price: f64,
    #[serde(default = "default_quantity")]
    pub quantity: i64,
}

fn default_quantity() -> i64 {
    1
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrderRequest {
    pub items: Vec<OrderItemRequest>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateOrderStatusRequest {
    pub status: String,
}

/// Sum of price * quantity, rounded to cents
pub fn order_total(items: &[OrderItemRequest]) -> f64 {
    let total: f64 = items.iter().map(|i| i.price * i.quantity as f64).sum();
    (total * 100.0).round() / 100.0
}

/// Insert the order and all of its items in one transaction
pub async fn insert_order(
    db: &SqlitePool,
    user_id: &str,
    req: &CreateOrderRequest,
) -> Result<OrderWithItems, sqlx::Error> {
    let id = uuid::Uuid::new_v4().to_string();
    let now = now();
    let total = order_total(&req.items);

    let mut tx = db.begin().await?;

    sqlx::query(
        "INSERT INTO orders (id, user_id, total, status, address, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(user_id)
    .bind(total)
    .bind(DEFAULT_ORDER_STATUS)
    .bind(&req.address)
    .bind(&now)
    .bind(&now)
    .execute(&mut *tx)
    .await?;

    for item in &req.items {
        sqlx::query(
            "INSERT INTO order_items (id, order_id, item_id, item_type, title, price, quantity) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(&id)
        .bind(&item.item_id)
        .bind(&item.item_type)
        .bind(&item.title)
        .bind(item.price)
        .bind(item.quantity)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    find_order(db, &id)
        .await?
        .ok_or(sqlx::Error::RowNotFound)
}

pub async fn find_order(db: &SqlitePool, id: &str) -> Result<Option<OrderWithItems>, sqlx::Error> {
    let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = ?")
        .bind(id)
        .fetch_optional(db)
        .await?;

    match order {
        Some(order) => {
            let items = order_items(db, &order.id).await?;
            Ok(Some(OrderWithItems { order, items }))
        }
        None => Ok(None),
    }
}

pub async fn list_user_orders(
    db: &SqlitePool,
    user_id: &str,
) -> Result<Vec<OrderWithItems>, sqlx::Error> {
    let orders = sqlx::query_as::<_, Order>(
        "SELECT * FROM orders WHERE user_id = ? ORDER BY created_at DESC",
    )
    .bind(user_id)
    .fetch_all(db)
    .await?;

    let mut result = Vec::with_capacity(orders.len());
    for order in orders {
        let items = order_items(db, &order.id).await?;
        result.push(OrderWithItems { order, items });
    }
    Ok(result)
}

async fn order_items(db: &SqlitePool, order_id: &str) -> Result<Vec<OrderItem>, sqlx::Error> {
    sqlx::query_as::<_, OrderItem>("SELECT * FROM order_items WHERE order_id = ? ORDER BY rowid")
        .bind(order_id)
        .fetch_all(db)
        .await
}

pub async fn set_order_status(db: &SqlitePool, id: &str, status: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE orders SET status = ?, updated_at = ? WHERE id = ?")
        .bind(status)
        .bind(now())
        .bind(id)
        .execute(db)
        .await?;
    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{insert_user, test_pool, NewUser};

    fn item(price: f64, quantity: i64) -> OrderItemRequest {
        OrderItemRequest {
            item_id: "b1".to_string(),
            item_type: "book".to_string(),
            title: "Book".to_string(),
            price,
            quantity,
        }
    }

    #[test]
    fn test_order_total() {
        assert_eq!(order_total(&[item(9.99, 2), item(0.01, 1)]), 19.99);
        assert_eq!(order_total(&[]), 0.0);
    }

    #[tokio::test]
    async fn test_insert_and_list_orders() {
        let pool = test_pool().await;
        let user = insert_user(
            &pool,
            NewUser {
                email: "buyer@example.com",
                password_hash: "hash",
                display_name: "Buyer",
                phone: None,
                location: None,
                bio: None,
                is_admin: false,
            },
        )
        .await
        .unwrap();

        let created = insert_order(
            &pool,
            &user.id,
            &CreateOrderRequest {
                items: vec![item(5.0, 2), item(3.5, 1)],
                address: Some("1 Main St".to_string()),
            },
        )
        .await
        .unwrap();

        assert_eq!(created.order.total, 13.5);
        assert_eq!(created.order.status, DEFAULT_ORDER_STATUS);
        assert_eq!(created.items.len(), 2);

        let orders = list_user_orders(&pool, &user.id).await.unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].order.id, created.order.id);

        assert!(set_order_status(&pool, &created.order.id, "shipped").await.unwrap());
        let reloaded = find_order(&pool, &created.order.id).await.unwrap().unwrap();
        assert_eq!(reloaded.order.status, "shipped");
    }
}
