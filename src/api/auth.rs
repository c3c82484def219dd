use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    async_trait,
    extract::{FromRequestParts, State},
    http::{request::Parts, HeaderMap, StatusCode},
    Json,
};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::config::AuthConfig;
use crate::db::{
    self, AuthResponse, ChangePasswordRequest, ForgotPasswordRequest, LoginRequest, NewUser,
    RegisterRequest, ResetPasswordRequest, UpdateProfileRequest, User, UserResponse,
};
use crate::AppState;

use super::error::{ApiError, ValidationErrorBuilder};
use super::metrics;
use super::validation::{
    validate_display_name, validate_email, validate_optional_text, validate_password,
};

/// JWT claims carried by access tokens
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    pub email: String,
    pub iat: i64,
    pub exp: i64,
    /// Unique per token so two logins in the same second get distinct sessions
    pub jti: String,
}

#[cfg(not(test))]
fn argon2() -> Argon2<'static> {
    Argon2::default()
}

#[cfg(test)]
fn argon2() -> Argon2<'static> {
    // Minimal cost so the test suite does not spend its time hashing
    let params = argon2::Params::new(8, 1, 1, None).expect("valid argon2 params");
    Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params)
}

/// Hash a password using Argon2
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = argon2().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Verify a password against a hash
pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };
    argon2()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

/// Generate a random opaque token (used for password resets)
fn generate_token() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 32] = rng.random();
    hex::encode(bytes)
}

/// Hash a token for storage
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Sign an access token for a user. Returns the token and its expiry timestamp.
pub fn issue_token(
    config: &AuthConfig,
    user: &User,
) -> Result<(String, String), jsonwebtoken::errors::Error> {
    let now = chrono::Utc::now();
    let expires = now + chrono::Duration::days(config.token_ttl_days);

    let claims = Claims {
        sub: user.id.clone(),
        email: user.email.clone(),
        iat: now.timestamp(),
        exp: expires.timestamp(),
        jti: uuid::Uuid::new_v4().to_string(),
    };

    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )?;

    Ok((token, db::timestamp(expires)))
}

/// Verify signature and expiry of an access token
pub fn decode_token(config: &AuthConfig, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )?;
    Ok(data.claims)
}

/// Issue a token and record its session
async fn start_session(state: &AppState, user: &User) -> Result<String, ApiError> {
    let (token, expires_at) = issue_token(&state.config.auth, user).map_err(|e| {
        tracing::error!(error = %e, "Failed to sign token");
        ApiError::internal("Failed to issue token")
    })?;

    db::create_session(&state.db, &user.id, &hash_token(&token), &expires_at).await?;
    Ok(token)
}

/// Extract the bearer token from request headers
pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    let header = headers.get("Authorization").and_then(|h| h.to_str().ok())?;
    let token = header.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

/// Resolve a token to an active user.
///
/// The JWT must verify, its session must still exist and the account must be
/// active. Any failure is a 403.
pub async fn get_current_user(state: &AppState, token: &str) -> Result<User, ApiError> {
    let claims = decode_token(&state.config.auth, token).map_err(|e| {
        tracing::debug!(error = %e, "Rejected access token");
        ApiError::forbidden("Invalid or expired token")
    })?;

    db::find_active_session(&state.db, &hash_token(token))
        .await?
        .ok_or_else(|| ApiError::forbidden("Invalid or expired token"))?;

    let user = db::find_user_by_id(&state.db, &claims.sub)
        .await?
        .ok_or_else(|| ApiError::forbidden("Invalid or expired token"))?;

    if !user.is_active {
        return Err(ApiError::forbidden("Account is disabled"));
    }

    Ok(user)
}

/// Extractor for the authenticated user; 401 without a token, 403 with a bad one
#[async_trait]
impl FromRequestParts<Arc<AppState>> for User {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_token(&parts.headers)
            .ok_or_else(|| ApiError::unauthorized("Access token required"))?;
        get_current_user(state, &token).await
    }
}

/// Extractor for endpoints that also serve anonymous callers
pub struct OptionalUser(pub Option<User>);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for OptionalUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        match extract_token(&parts.headers) {
            Some(token) => Ok(OptionalUser(Some(get_current_user(state, &token).await?))),
            None => Ok(OptionalUser(None)),
        }
    }
}

/// Extractor that additionally requires `is_admin`
pub struct AdminUser(pub User);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let user = User::from_request_parts(parts, state).await?;
        if !user.is_admin {
            return Err(ApiError::forbidden("Admin access required"));
        }
        Ok(AdminUser(user))
    }
}

fn validate_register_request(req: &RegisterRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    errors
        .check("email", validate_email(&req.email))
        .check("password", validate_password(&req.password))
        .check("displayName", validate_display_name(&req.display_name))
        .check("phone", validate_optional_text(&req.phone, "Phone", 32))
        .check("location", validate_optional_text(&req.location, "Location", 200))
        .check("bio", validate_optional_text(&req.bio, "Bio", 2000));
    errors.finish()
}

/// POST /api/auth/register
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    validate_register_request(&req)?;

    if db::find_user_by_email(&state.db, &req.email).await?.is_some() {
        return Err(ApiError::conflict("Email already registered"));
    }

    let password_hash = hash_password(&req.password).map_err(|e| {
        tracing::error!(error = %e, "Failed to hash password");
        ApiError::internal("Failed to hash password")
    })?;

    let user = db::insert_user(
        &state.db,
        NewUser {
            email: &req.email,
            password_hash: &password_hash,
            display_name: req.display_name.trim(),
            phone: req.phone.as_deref(),
            location: req.location.as_deref(),
            bio: req.bio.as_deref(),
            is_admin: false,
        },
    )
    .await
    .map_err(|e| match e {
        // Lost a race with a concurrent registration of the same email
        sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
            ApiError::conflict("Email already registered")
        }
        e => ApiError::from(e),
    })?;

    tracing::info!(user_id = %user.id, email = %user.email, "User registered");
    metrics::record_auth_event("register");

    let token = start_session(&state, &user).await?;

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            user: UserResponse::from(user),
            token,
        }),
    ))
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    if req.email.trim().is_empty() || req.password.is_empty() {
        return Err(ApiError::bad_request("Email and password are required"));
    }

    let user = db::find_user_by_email(&state.db, &req.email).await?;

    let user = match user {
        Some(user) if verify_password(&req.password, &user.password_hash) => user,
        _ => {
            tracing::info!(email = %req.email.trim(), "Failed login attempt");
            metrics::record_auth_event("login_failed");
            return Err(ApiError::bad_request("Invalid credentials"));
        }
    };

    if !user.is_active {
        return Err(ApiError::forbidden("Account is disabled"));
    }

    let token = start_session(&state, &user).await?;
    metrics::record_auth_event("login");
    tracing::info!(user_id = %user.id, "User logged in");

    Ok(Json(AuthResponse {
        user: UserResponse::from(user),
        token,
    }))
}

/// POST /api/auth/logout
pub async fn logout(
    State(state): State<Arc<AppState>>,
    user: User,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    if let Some(token) = extract_token(&headers) {
        db::delete_session(&state.db, &hash_token(&token)).await?;
    }
    tracing::info!(user_id = %user.id, "User logged out");
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/auth/profile
pub async fn get_profile(user: User) -> Json<UserResponse> {
    Json(UserResponse::from(user))
}

/// PUT /api/auth/profile
pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    user: User,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    if let Some(ref name) = req.display_name {
        errors.check("displayName", validate_display_name(name));
    }
    errors
        .check("phone", validate_optional_text(&req.phone, "Phone", 32))
        .check("location", validate_optional_text(&req.location, "Location", 200))
        .check("bio", validate_optional_text(&req.bio, "Bio", 2000));
    if let Some(ref prefs) = req.preferences {
        errors
            .check("preferences.language", validate_optional_text(&prefs.language, "Language", 16))
            .check("preferences.quality", validate_optional_text(&prefs.quality, "Quality", 16));
    }
    errors.finish()?;

    let updated = db::update_profile(&state.db, &user, &req).await?;
    tracing::info!(user_id = %user.id, "Profile updated");
    Ok(Json(UserResponse::from(updated)))
}

/// POST /api/auth/change-password
pub async fn change_password(
    State(state): State<Arc<AppState>>,
    user: User,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<StatusCode, ApiError> {
    if !verify_password(&req.current_password, &user.password_hash) {
        return Err(ApiError::bad_request("Current password is incorrect"));
    }
    if let Err(e) = validate_password(&req.new_password) {
        return Err(ApiError::validation_field("newPassword", e));
    }

    let password_hash = hash_password(&req.new_password)
        .map_err(|e| ApiError::internal(format!("Failed to hash password: {}", e)))?;
    db::set_password_hash(&state.db, &user.id, &password_hash).await?;

    tracing::info!(user_id = %user.id, "Password changed");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/auth/forgot-password
///
/// Always answers 202 so the endpoint cannot be used to probe for accounts.
pub async fn forgot_password(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ForgotPasswordRequest>,
) -> Result<StatusCode, ApiError> {
    if let Some(user) = db::find_user_by_email(&state.db, &req.email).await? {
        let token = create_reset_token(&state, &user).await?;
        // Mail delivery is not wired up; operators relay the token by hand
        tracing::info!(user_id = %user.id, reset_token = %token, "Password reset requested");
    } else {
        tracing::debug!(email = %req.email.trim(), "Password reset for unknown email");
    }
    Ok(StatusCode::ACCEPTED)
}

/// Create and store a reset token for a user, returning the plain token
pub async fn create_reset_token(state: &AppState, user: &User) -> Result<String, ApiError> {
    let token = generate_token();
    let expires = chrono::Utc::now()
        + chrono::Duration::minutes(state.config.auth.reset_token_ttl_minutes);
    db::create_reset_token(&state.db, &user.id, &hash_token(&token), &db::timestamp(expires))
        .await?;
    Ok(token)
}

/// POST /api/auth/reset-password
pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ResetPasswordRequest>,
) -> Result<StatusCode, ApiError> {
    if let Err(e) = validate_password(&req.password) {
        return Err(ApiError::validation_field("password", e));
    }

    let reset = db::consume_reset_token(&state.db, &hash_token(req.token.trim()))
        .await?
        .ok_or_else(|| ApiError::bad_request("Invalid or expired reset token"))?;

    let password_hash = hash_password(&req.password)
        .map_err(|e| ApiError::internal(format!("Failed to hash password: {}", e)))?;
    db::set_password_hash(&state.db, &reset.user_id, &password_hash).await?;
    let revoked = db::delete_user_sessions(&state.db, &reset.user_id).await?;

    tracing::info!(user_id = %reset.user_id, revoked_sessions = revoked, "Password reset");
    Ok(StatusCode::NO_CONTENT)
}

/// Create the configured bootstrap admin if no account uses that email
pub async fn ensure_admin_user(
    pool: &sqlx::SqlitePool,
    email: &str,
    password: &str,
) -> anyhow::Result<()> {
    if db::find_user_by_email(pool, email).await?.is_some() {
        return Ok(());
    }

    let password_hash =
        hash_password(password).map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?;
    db::insert_user(
        pool,
        NewUser {
            email,
            password_hash: &password_hash,
            display_name: "Administrator",
            phone: None,
            location: None,
            bio: None,
            is_admin: true,
        },
    )
    .await?;

    tracing::info!("Created admin user: {}", email);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::{body_json, json_request, send, test_state};
    use axum::http::Method;
    use serde_json::json;

    #[test]
    fn test_password_hash_round_trip() {
        let hash = hash_password("correct horse").unwrap();
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("wrong horse", &hash));
        assert!(!verify_password("anything", "not-a-hash"));
    }

    #[test]
    fn test_extract_token() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_token(&headers), None);

        headers.insert("Authorization", "Basic abc".parse().unwrap());
        assert_eq!(extract_token(&headers), None);

        headers.insert("Authorization", "Bearer abc.def".parse().unwrap());
        assert_eq!(extract_token(&headers), Some("abc.def".to_string()));
    }

    #[test]
    fn test_token_signed_with_other_secret_is_rejected() {
        let config = AuthConfig::default();
        let user = User {
            id: "u1".to_string(),
            email: "u1@example.com".to_string(),
            password_hash: String::new(),
            display_name: "U".to_string(),
            phone: None,
            location: None,
            bio: None,
            subscription_plan: "free".to_string(),
            subscription_status: "active".to_string(),
            subscription_expiry: None,
            watch_history: "[]".to_string(),
            favorites: "[]".to_string(),
            pref_language: "en".to_string(),
            pref_quality: "auto".to_string(),
            pref_autoplay: true,
            is_admin: false,
            is_active: true,
            created_at: String::new(),
            updated_at: String::new(),
        };

        let (token, _) = issue_token(&config, &user).unwrap();
        let claims = decode_token(&config, &token).unwrap();
        assert_eq!(claims.sub, "u1");
        assert!(claims.exp - claims.iat == 7 * 24 * 60 * 60);

        let other = AuthConfig::default();
        assert!(decode_token(&other, &token).is_err());
    }

    #[tokio::test]
    async fn test_register_twice_conflicts() {
        let (state, _dir) = test_state().await;
        let body = json!({
            "email": "dup@example.com",
            "password": "secret1",
            "displayName": "Dup"
        });

        let first = send(&state, json_request(Method::POST, "/api/auth/register", None, &body)).await;
        assert_eq!(first.status(), StatusCode::CREATED);

        let second = send(&state, json_request(Method::POST, "/api/auth/register", None, &body)).await;
        assert_eq!(second.status(), StatusCode::CONFLICT);
        let error = body_json(second).await;
        assert_eq!(error["code"], "conflict");
        assert!(error["error"].is_string());
    }

    #[tokio::test]
    async fn test_register_validates_input() {
        let (state, _dir) = test_state().await;
        let body = json!({ "email": "nope", "password": "123", "displayName": "" });
        let response = send(&state, json_request(Method::POST, "/api/auth/register", None, &body)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let error = body_json(response).await;
        assert_eq!(error["code"], "validation_error");
        assert!(error["details"]["email"].is_array());
        assert!(error["details"]["password"].is_array());
        assert!(error["details"]["displayName"].is_array());
    }

    #[tokio::test]
    async fn test_login_token_authorizes_profile() {
        let (state, _dir) = test_state().await;
        let register = json!({
            "email": "Reader@Example.com",
            "password": "secret1",
            "displayName": "Reader",
            "location": "Lisbon"
        });
        send(&state, json_request(Method::POST, "/api/auth/register", None, &register)).await;

        let login = json!({ "email": "reader@example.com", "password": "secret1" });
        let response = send(&state, json_request(Method::POST, "/api/auth/login", None, &login)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        let token = body["token"].as_str().unwrap().to_string();
        assert!(body["user"].get("passwordHash").is_none());

        let response = send(
            &state,
            json_request(Method::GET, "/api/auth/profile", Some(&token), &json!(null)),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let profile = body_json(response).await;
        assert_eq!(profile["email"], "reader@example.com");
        assert_eq!(profile["displayName"], "Reader");
        assert_eq!(profile["location"], "Lisbon");
        assert_eq!(profile["subscription"]["plan"], "free");
        assert_eq!(profile["preferences"]["autoplay"], true);
    }

    #[tokio::test]
    async fn test_wrong_password_returns_400_without_token() {
        let (state, _dir) = test_state().await;
        let register = json!({ "email": "a@example.com", "password": "secret1", "displayName": "A" });
        send(&state, json_request(Method::POST, "/api/auth/register", None, &register)).await;

        for login in [
            json!({ "email": "a@example.com", "password": "wrong-pass" }),
            json!({ "email": "missing@example.com", "password": "secret1" }),
        ] {
            let response = send(&state, json_request(Method::POST, "/api/auth/login", None, &login)).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            let body = body_json(response).await;
            assert!(body.get("token").is_none());
            assert_eq!(body["error"], "Invalid credentials");
        }
    }

    #[tokio::test]
    async fn test_disabled_account_cannot_log_in() {
        let (state, _dir) = test_state().await;
        let register = json!({ "email": "off@example.com", "password": "secret1", "displayName": "Off" });
        let response = send(&state, json_request(Method::POST, "/api/auth/register", None, &register)).await;
        let body = body_json(response).await;
        let token = body["token"].as_str().unwrap().to_string();
        let user_id = body["user"]["id"].as_str().unwrap().to_string();

        sqlx::query("UPDATE users SET is_active = 0 WHERE id = ?")
            .bind(&user_id)
            .execute(&state.db)
            .await
            .unwrap();

        let login = json!({ "email": "off@example.com", "password": "secret1" });
        let response = send(&state, json_request(Method::POST, "/api/auth/login", None, &login)).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = body_json(response).await;
        assert_eq!(body["code"], "forbidden");
        assert!(body.get("token").is_none());

        let response = send(
            &state,
            json_request(Method::GET, "/api/auth/profile", Some(&token), &json!(null)),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_profile_requires_valid_token() {
        let (state, _dir) = test_state().await;

        let missing = send(
            &state,
            json_request(Method::GET, "/api/auth/profile", None, &json!(null)),
        )
        .await;
        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

        let invalid = send(
            &state,
            json_request(Method::GET, "/api/auth/profile", Some("garbage"), &json!(null)),
        )
        .await;
        assert_eq!(invalid.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_logout_revokes_token() {
        let (state, _dir) = test_state().await;
        let register = json!({ "email": "out@example.com", "password": "secret1", "displayName": "Out" });
        let body = body_json(
            send(&state, json_request(Method::POST, "/api/auth/register", None, &register)).await,
        )
        .await;
        let token = body["token"].as_str().unwrap().to_string();

        let response = send(
            &state,
            json_request(Method::POST, "/api/auth/logout", Some(&token), &json!(null)),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = send(
            &state,
            json_request(Method::GET, "/api/auth/profile", Some(&token), &json!(null)),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_password_reset_flow() {
        let (state, _dir) = test_state().await;
        let register = json!({ "email": "forgot@example.com", "password": "secret1", "displayName": "F" });
        let body = body_json(
            send(&state, json_request(Method::POST, "/api/auth/register", None, &register)).await,
        )
        .await;
        let old_token = body["token"].as_str().unwrap().to_string();

        let response = send(
            &state,
            json_request(
                Method::POST,
                "/api/auth/forgot-password",
                None,
                &json!({ "email": "nobody@example.com" }),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let user = db::find_user_by_email(&state.db, "forgot@example.com")
            .await
            .unwrap()
            .unwrap();
        let reset_token = create_reset_token(&state, &user).await.unwrap();

        let reset = json!({ "token": reset_token, "password": "brand-new" });
        let response = send(&state, json_request(Method::POST, "/api/auth/reset-password", None, &reset)).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        // Token is single use and old sessions are gone
        let response = send(&state, json_request(Method::POST, "/api/auth/reset-password", None, &reset)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let response = send(
            &state,
            json_request(Method::GET, "/api/auth/profile", Some(&old_token), &json!(null)),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let login = json!({ "email": "forgot@example.com", "password": "brand-new" });
        let response = send(&state, json_request(Method::POST, "/api/auth/login", None, &login)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_update_profile_and_change_password() {
        let (state, _dir) = test_state().await;
        let register = json!({ "email": "edit@example.com", "password": "secret1", "displayName": "Before" });
        let body = body_json(
            send(&state, json_request(Method::POST, "/api/auth/register", None, &register)).await,
        )
        .await;
        let token = body["token"].as_str().unwrap().to_string();

        let update = json!({ "displayName": "After", "preferences": { "quality": "1080p", "autoplay": false } });
        let response = send(&state, json_request(Method::PUT, "/api/auth/profile", Some(&token), &update)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let profile = body_json(response).await;
        assert_eq!(profile["displayName"], "After");
        assert_eq!(profile["preferences"]["quality"], "1080p");
        assert_eq!(profile["preferences"]["autoplay"], false);
        assert_eq!(profile["preferences"]["language"], "en");

        let wrong = json!({ "currentPassword": "nope-nope", "newPassword": "another1" });
        let response = send(&state, json_request(Method::POST, "/api/auth/change-password", Some(&token), &wrong)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let change = json!({ "currentPassword": "secret1", "newPassword": "another1" });
        let response = send(&state, json_request(Method::POST, "/api/auth/change-password", Some(&token), &change)).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let login = json!({ "email": "edit@example.com", "password": "another1" });
        let response = send(&state, json_request(Method::POST, "/api/auth/login", None, &login)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_ensure_admin_user_is_idempotent() {
        let (state, _dir) = test_state().await;
        ensure_admin_user(&state.db, "admin@example.com", "admin-pass").await.unwrap();
        ensure_admin_user(&state.db, "admin@example.com", "admin-pass").await.unwrap();

        let admin = db::find_user_by_email(&state.db, "admin@example.com")
            .await
            .unwrap()
            .unwrap();
        assert!(admin.is_admin);
    }
}
