//! Common types and utilities shared across models.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;

/// Fixed-width RFC 3339 timestamp so that TEXT comparison matches time order
pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn now() -> String {
    timestamp(Utc::now())
}

/// Escape LIKE wildcards so user input only matches literally (`ESCAPE '\'`)
fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Who is asking for a catalog listing; decides which private rows are visible
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Viewer {
    Anonymous,
    User(String),
    Admin,
}

/// Query-string filters shared by the book and video listings.
/// All present filters are combined with AND.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogQuery {
    pub is_public: Option<bool>,
    pub featured: Option<bool>,
    pub category: Option<String>,
    pub user_id: Option<String>,
    /// Case-insensitive substring match on title, creator and description
    pub search: Option<String>,
}

/// A WHERE clause plus its positional text bindings
#[derive(Debug, Default)]
pub struct CatalogFilter {
    pub where_clause: String,
    pub bindings: Vec<String>,
}

impl CatalogQuery {
    /// Build the WHERE clause for a catalog table. `creator_column` is the
    /// column searched alongside the title (`author` or `instructor`).
    pub fn to_filter(&self, viewer: &Viewer, creator_column: &str) -> CatalogFilter {
        let mut conditions: Vec<String> = Vec::new();
        let mut bindings: Vec<String> = Vec::new();

        match viewer {
            Viewer::Anonymous => conditions.push("is_public = 1".to_string()),
            Viewer::User(id) => {
                conditions.push("(is_public = 1 OR user_id = ?)".to_string());
                bindings.push(id.clone());
            }
            Viewer::Admin => {}
        }

        if let Some(is_public) = self.is_public {
            conditions.push(format!("is_public = {}", is_public as i32));
        }

        if let Some(featured) = self.featured {
            conditions.push(format!("featured = {}", featured as i32));
        }

        if let Some(category) = self.category.as_deref().filter(|c| !c.is_empty()) {
            conditions.push("category = ?".to_string());
            bindings.push(category.to_string());
        }

        if let Some(user_id) = self.user_id.as_deref().filter(|u| !u.is_empty()) {
            conditions.push("user_id = ?".to_string());
            bindings.push(user_id.to_string());
        }

        if let Some(search) = self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            conditions.push(format!(
                "(title LIKE ? ESCAPE '\\' OR {} LIKE ? ESCAPE '\\' OR description LIKE ? ESCAPE '\\')",
                creator_column
            ));
            let pattern = format!("%{}%", escape_like(search));
            bindings.extend(std::iter::repeat(pattern).take(3));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        CatalogFilter {
            where_clause,
            bindings,
        }
    }
}
