//! User, session and password reset models.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

/// Maximum number of entries kept in a user's watch history
pub const WATCH_HISTORY_LIMIT: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: String,
    pub email: String,
    pub password_hash: String,
    pub display_name: String,
    pub phone: Option<String>,
    pub location: Option<String>,
    pub bio: Option<String>,
    pub subscription_plan: String,
    pub subscription_status: String,
    pub subscription_expiry: Option<String>,
    /// JSON array of item ids, most recent first
    pub watch_history: String,
    /// JSON array of item ids
    pub favorites: String,
    pub pref_language: String,
    pub pref_quality: String,
    pub pref_autoplay: bool,
    pub is_admin: bool,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl User {
    pub fn favorites_list(&self) -> Vec<String> {
        serde_json::from_str(&self.favorites).unwrap_or_default()
    }

    pub fn watch_history_list(&self) -> Vec<String> {
        serde_json::from_str(&self.watch_history).unwrap_or_default()
    }

    /// Owners and admins may mutate a resource
    pub fn can_modify(&self, owner_id: &str) -> bool {
        self.is_admin || self.id == owner_id
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub plan: String,
    pub status: String,
    pub expiry: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    pub language: String,
    pub quality: String,
    pub autoplay: bool,
}

/// Public view of a user; never carries the password hash
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub display_name: String,
    pub phone: Option<String>,
    pub location: Option<String>,
    pub bio: Option<String>,
    pub subscription: Subscription,
    pub watch_history: Vec<String>,
    pub favorites: Vec<String>,
    pub preferences: Preferences,
    pub is_admin: bool,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        let watch_history = user.watch_history_list();
        let favorites = user.favorites_list();
        Self {
            id: user.id,
            email: user.email,
            display_name: user.display_name,
            phone: user.phone,
            location: user.location,
            bio: user.bio,
            subscription: Subscription {
                plan: user.subscription_plan,
                status: user.subscription_status,
                expiry: user.subscription_expiry,
            },
            watch_history,
            favorites,
            preferences: Preferences {
                language: user.pref_language,
                quality: user.pref_quality,
                autoplay: user.pref_autoplay,
            },
            is_admin: user.is_admin,
            is_active: user.is_active,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub token_hash: String,
    pub expires_at: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PasswordResetToken {
    pub id: String,
    pub user_id: String,
    pub token_hash: String,
    pub expires_at: String,
    pub used: bool,
    pub created_at: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub display_name: String,
    pub phone: Option<String>,
    pub location: Option<String>,
    pub bio: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub user: UserResponse,
    pub token: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferencesUpdate {
    pub language: Option<String>,
    pub quality: Option<String>,
    pub autoplay: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    pub display_name: Option<String>,
    pub phone: Option<String>,
    pub location: Option<String>,
    pub bio: Option<String>,
    pub preferences: Option<PreferencesUpdate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemIdRequest {
    pub item_id: String,
}

/// Fields needed to insert a user row
#[derive(Debug)]
pub struct NewUser<'a> {
    pub email: &'a str,
    pub password_hash: &'a str,
    pub display_name: &'a str,
    pub phone: Option<&'a str>,
    pub location: Option<&'a str>,
    pub bio: Option<&'a str>,
    pub is_admin: bool,
}

pub async fn find_user_by_email(db: &SqlitePool, email: &str) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
        .bind(email.trim().to_lowercase())
        .fetch_optional(db)
        .await
}

pub async fn find_user_by_id(db: &SqlitePool, id: &str) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(db)
        .await
}

/// Insert a user. A duplicate email surfaces as a UNIQUE constraint error.
pub async fn insert_user(db: &SqlitePool, new: NewUser<'_>) -> Result<User, sqlx::Error> {
    let id = uuid::Uuid::new_v4().to_string();
    let now = super::now();

    sqlx::query(
        r#"
        INSERT INTO users (id, email, password_hash, display_name, phone, location, bio, is_admin, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(new.email.trim().to_lowercase())
    .bind(new.password_hash)
    .bind(new.display_name)
    .bind(new.phone)
    .bind(new.location)
    .bind(new.bio)
    .bind(new.is_admin)
    .bind(&now)
    .bind(&now)
    .execute(db)
    .await?;

    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(&id)
        .fetch_one(db)
        .await
}

/// Apply a partial profile update; absent fields keep their value
pub async fn update_profile(
    db: &SqlitePool,
    user: &User,
    req: &UpdateProfileRequest,
) -> Result<User, sqlx::Error> {
    let prefs = req.preferences.as_ref();
    let now = super::now();

    sqlx::query(
        r#"
        UPDATE users SET
            display_name = ?,
            phone = ?,
            location = ?,
            bio = ?,
            pref_language = ?,
            pref_quality = ?,
            pref_autoplay = ?,
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(req.display_name.as_deref().unwrap_or(&user.display_name))
    .bind(req.phone.as_deref().or(user.phone.as_deref()))
    .bind(req.location.as_deref().or(user.location.as_deref()))
    .bind(req.bio.as_deref().or(user.bio.as_deref()))
    .bind(prefs.and_then(|p| p.language.as_deref()).unwrap_or(&user.pref_language))
    .bind(prefs.and_then(|p| p.quality.as_deref()).unwrap_or(&user.pref_quality))
    .bind(prefs.and_then(|p| p.autoplay).unwrap_or(user.pref_autoplay))
    .bind(&now)
    .bind(&user.id)
    .execute(db)
    .await?;

    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(&user.id)
        .fetch_one(db)
        .await
}

pub async fn set_password_hash(
    db: &SqlitePool,
    user_id: &str,
    password_hash: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
        .bind(password_hash)
        .bind(super::now())
        .bind(user_id)
        .execute(db)
        .await?;
    Ok(())
}

/// JSON string-list columns on `users`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserList {
    Favorites,
    WatchHistory,
}

impl UserList {
    fn column(&self) -> &'static str {
        match self {
            UserList::Favorites => "favorites",
            UserList::WatchHistory => "watch_history",
        }
    }
}

/// Attempts before a list edit gives up under contention
const LIST_EDIT_ATTEMPTS: usize = 32;

/// Apply `edit` to one of a user's list columns and return the new list.
///
/// The write is conditional on the column still holding the value that was
/// read, and is retried against the fresh value otherwise, so concurrent
/// edits of the same list are never lost.
pub async fn edit_user_list<F>(
    db: &SqlitePool,
    user_id: &str,
    list: UserList,
    edit: F,
) -> Result<Vec<String>, sqlx::Error>
where
    F: Fn(Vec<String>) -> Vec<String>,
{
    let column = list.column();
    let select = format!("SELECT {} FROM users WHERE id = ?", column);
    let update = format!(
        "UPDATE users SET {col} = ?, updated_at = ? WHERE id = ? AND {col} = ?",
        col = column
    );

    for _ in 0..LIST_EDIT_ATTEMPTS {
        let current: String = sqlx::query_scalar(&select)
            .bind(user_id)
            .fetch_one(db)
            .await?;
        let items: Vec<String> = serde_json::from_str(&current).unwrap_or_default();
        let edited = edit(items.clone());
        if edited == items {
            return Ok(edited);
        }

        let json = serde_json::to_string(&edited).unwrap_or_else(|_| "[]".to_string());
        let result = sqlx::query(&update)
            .bind(&json)
            .bind(super::now())
            .bind(user_id)
            .bind(&current)
            .execute(db)
            .await?;
        if result.rows_affected() > 0 {
            return Ok(edited);
        }
    }

    Err(sqlx::Error::Protocol(format!(
        "{} of user {} kept changing during update",
        column, user_id
    )))
}

/// Append `item_id` unless it is already present
pub fn add_favorite(mut favorites: Vec<String>, item_id: &str) -> Vec<String> {
    if !favorites.iter().any(|id| id == item_id) {
        favorites.push(item_id.to_string());
    }
    favorites
}

/// Move `item_id` to the front of the history, dropping the oldest past the limit
pub fn push_history(mut history: Vec<String>, item_id: &str) -> Vec<String> {
    history.retain(|id| id != item_id);
    history.insert(0, item_id.to_string());
    history.truncate(WATCH_HISTORY_LIMIT);
    history
}

pub async fn create_session(
    db: &SqlitePool,
    user_id: &str,
    token_hash: &str,
    expires_at: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO sessions (id, user_id, token_hash, expires_at, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(user_id)
    .bind(token_hash)
    .bind(expires_at)
    .bind(super::now())
    .execute(db)
    .await?;
    Ok(())
}

/// Find a session that has not yet expired
pub async fn find_active_session(
    db: &SqlitePool,
    token_hash: &str,
) -> Result<Option<Session>, sqlx::Error> {
    sqlx::query_as::<_, Session>("SELECT * FROM sessions WHERE token_hash = ? AND expires_at > ?")
        .bind(token_hash)
        .bind(super::now())
        .fetch_optional(db)
        .await
}

pub async fn delete_session(db: &SqlitePool, token_hash: &str) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM sessions WHERE token_hash = ?")
        .bind(token_hash)
        .execute(db)
        .await?;
    Ok(result.rows_affected())
}

pub async fn delete_user_sessions(db: &SqlitePool, user_id: &str) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM sessions WHERE user_id = ?")
        .bind(user_id)
        .execute(db)
        .await?;
    Ok(result.rows_affected())
}

/// Remove expired sessions and reset tokens
pub async fn purge_expired_tokens(db: &SqlitePool) -> Result<u64, sqlx::Error> {
    let now = super::now();
    let sessions = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
        .bind(&now)
        .execute(db)
        .await?;
    let resets = sqlx::query("DELETE FROM password_reset_tokens WHERE expires_at <= ? OR used = 1")
        .bind(&now)
        .execute(db)
        .await?;
    Ok(sessions.rows_affected() + resets.rows_affected())
}

pub async fn create_reset_token(
    db: &SqlitePool,
    user_id: &str,
    token_hash: &str,
    expires_at: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO password_reset_tokens (id, user_id, token_hash, expires_at, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(user_id)
    .bind(token_hash)
    .bind(expires_at)
    .bind(super::now())
    .execute(db)
    .await?;
    Ok(())
}

/// Mark an unused, unexpired reset token as used and return it.
/// The conditional UPDATE guarantees a token is consumed at most once.
pub async fn consume_reset_token(
    db: &SqlitePool,
    token_hash: &str,
) -> Result<Option<PasswordResetToken>, sqlx::Error> {
    let now = super::now();
    let result = sqlx::query(
        "UPDATE password_reset_tokens SET used = 1 WHERE token_hash = ? AND used = 0 AND expires_at > ?",
    )
    .bind(token_hash)
    .bind(&now)
    .execute(db)
    .await?;

    if result.rows_affected() == 0 {
        return Ok(None);
    }

    sqlx::query_as::<_, PasswordResetToken>(
        "SELECT * FROM password_reset_tokens WHERE token_hash = ?",
    )
    .bind(token_hash)
    .fetch_optional(db)
    .await
}
