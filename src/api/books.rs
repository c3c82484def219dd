use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::db::{self, Book, BookFiles, CatalogQuery, CreateBookRequest, UpdateBookRequest, User};
use crate::uploads::UploadField;
use crate::AppState;

use super::auth::OptionalUser;
use super::catalog::{can_see, viewer_for, RateRequest, UploadForm};
use super::error::{ApiError, ValidationErrorBuilder};
use super::metrics;
use super::validation::{
    validate_non_negative, validate_optional_text, validate_price, validate_rating,
    validate_required_text,
};

const BOOK_FILE_FIELDS: [UploadField; 2] = [UploadField::BookImage, UploadField::BookAudio];

fn validate_create_request(req: &CreateBookRequest, errors: &mut ValidationErrorBuilder) {
    errors
        .check("title", validate_required_text(&req.title, "Title", 200))
        .check("author", validate_required_text(&req.author, "Author", 200));
    check_common_fields(
        errors,
        &req.description,
        &req.category,
        &req.cover_image,
        &req.team_id,
        req.pages,
        req.rating,
        req.price,
    );
}

fn validate_update_request(req: &UpdateBookRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    if let Some(ref title) = req.title {
        errors.check("title", validate_required_text(title, "Title", 200));
    }
    if let Some(ref author) = req.author {
        errors.check("author", validate_required_text(author, "Author", 200));
    }
    check_common_fields(
        &mut errors,
        &req.description,
        &req.category,
        &req.cover_image,
        &req.team_id,
        req.pages,
        req.rating,
        req.price,
    );
    errors.finish()
}

#[allow(clippy::too_many_arguments)]
fn check_common_fields(
    errors: &mut ValidationErrorBuilder,
    description: &Option<String>,
    category: &Option<String>,
    cover_image: &Option<String>,
    team_id: &Option<String>,
    pages: Option<i64>,
    rating: Option<f64>,
    price: Option<f64>,
) {
    errors
        .check("description", validate_optional_text(description, "Description", 5000))
        .check("category", validate_optional_text(category, "Category", 100))
        .check("coverImage", validate_optional_text(cover_image, "Cover image", 2048))
        .check("teamId", validate_optional_text(team_id, "Team ID", 100));
    if let Some(pages) = pages {
        errors.check("pages", validate_non_negative(pages, "Pages"));
    }
    if let Some(rating) = rating {
        errors.check("rating", validate_rating(rating));
    }
    if let Some(price) = price {
        errors.check("price", validate_price(price));
    }
}

/// Load a book the caller may see; private books of others are reported missing
async fn load_visible(state: &AppState, id: &str, user: Option<&User>) -> Result<Book, ApiError> {
    match db::find_book(&state.db, id).await? {
        Some(book) if can_see(user, book.is_public, &book.user_id) => Ok(book),
        _ => Err(ApiError::not_found("Book not found")),
    }
}

/// Load a book the caller may mutate
async fn load_owned(state: &AppState, id: &str, user: &User) -> Result<Book, ApiError> {
    let book = db::find_book(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Book not found"))?;

    if !user.can_modify(&book.user_id) {
        return Err(ApiError::forbidden("You can only modify your own books"));
    }
    Ok(book)
}

/// GET /api/books
pub async fn list_books(
    State(state): State<Arc<AppState>>,
    OptionalUser(user): OptionalUser,
    Query(query): Query<CatalogQuery>,
) -> Result<Json<Vec<Book>>, ApiError> {
    let books = db::list_books(&state.db, &query, &viewer_for(user.as_ref())).await?;
    Ok(Json(books))
}

/// GET /api/books/:id
pub async fn get_book(
    State(state): State<Arc<AppState>>,
    OptionalUser(user): OptionalUser,
    Path(id): Path<String>,
) -> Result<Json<Book>, ApiError> {
    let book = load_visible(&state, &id, user.as_ref()).await?;
    Ok(Json(book))
}

/// POST /api/books
pub async fn create_book(
    State(state): State<Arc<AppState>>,
    user: User,
    Json(req): Json<CreateBookRequest>,
) -> Result<(StatusCode, Json<Book>), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    validate_create_request(&req, &mut errors);
    errors.finish()?;

    let book = db::insert_book(
        &state.db,
        &req,
        &BookFiles::default(),
        &user.id,
        &user.display_name,
    )
    .await?;

    tracing::info!(book_id = %book.id, user_id = %user.id, title = %book.title, "Book created");
    Ok((StatusCode::CREATED, Json(book)))
}

fn create_request_from_form(form: &UploadForm) -> Result<CreateBookRequest, ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    let req = CreateBookRequest {
        title: form.text("title").unwrap_or_default(),
        author: form.text("author").unwrap_or_default(),
        description: form.text("description"),
        category: form.text("category"),
        cover_image: form.text("coverImage"),
        pages: form.number("pages", &mut errors),
        rating: form.number("rating", &mut errors),
        price: form.number("price", &mut errors),
        is_public: form.flag("isPublic", &mut errors),
        featured: form.flag("featured", &mut errors),
        team_id: form.text("teamId"),
    };
    validate_create_request(&req, &mut errors);
    errors.finish()?;
    Ok(req)
}

/// POST /api/books/upload (multipart: text fields plus `bookImage` / `bookAudio`)
pub async fn upload_book(
    State(state): State<Arc<AppState>>,
    user: User,
    multipart: Multipart,
) -> Result<(StatusCode, Json<Book>), ApiError> {
    let form = UploadForm::read(multipart, &state.uploads, &BOOK_FILE_FIELDS).await?;
    let req = create_request_from_form(&form)?;

    let stored = form.store(&state.uploads).await?;
    let files = BookFiles {
        image_file: stored.get(UploadField::BookImage),
        audio_file: stored.get(UploadField::BookAudio),
    };

    let book = match db::insert_book(&state.db, &req, &files, &user.id, &user.display_name).await {
        Ok(book) => book,
        Err(e) => {
            stored.discard(&state.uploads).await;
            return Err(e.into());
        }
    };

    tracing::info!(
        book_id = %book.id,
        user_id = %user.id,
        has_image = book.image_file.is_some(),
        has_audio = book.audio_file.is_some(),
        "Book uploaded"
    );
    Ok((StatusCode::CREATED, Json(book)))
}

/// PUT /api/books/:id
pub async fn update_book(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
    Json(req): Json<UpdateBookRequest>,
) -> Result<Json<Book>, ApiError> {
    let existing = load_owned(&state, &id, &user).await?;
    validate_update_request(&req)?;

    let book = db::update_book(&state.db, &existing, &req).await?;
    tracing::info!(book_id = %book.id, user_id = %user.id, "Book updated");
    Ok(Json(book))
}

/// DELETE /api/books/:id
pub async fn delete_book(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let book = load_owned(&state, &id, &user).await?;

    if !db::delete_book(&state.db, &book.id).await? {
        return Err(ApiError::not_found("Book not found"));
    }
    state.uploads.remove_all(book.stored_files()).await;

    tracing::info!(book_id = %book.id, user_id = %user.id, "Book deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/books/:id/view
pub async fn view_book(
    State(state): State<Arc<AppState>>,
    OptionalUser(user): OptionalUser,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let book = load_visible(&state, &id, user.as_ref()).await?;

    let views = db::increment_book_views(&state.db, &book.id)
        .await?
        .ok_or_else(|| ApiError::not_found("Book not found"))?;
    metrics::record_view("book");

    Ok(Json(json!({ "views": views })))
}

/// POST /api/books/:id/rate
pub async fn rate_book(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
    Json(req): Json<RateRequest>,
) -> Result<Json<Book>, ApiError> {
    if let Err(e) = validate_rating(req.rating) {
        return Err(ApiError::validation_field("rating", e));
    }
    let book = load_visible(&state, &id, Some(&user)).await?;

    db::set_book_rating(&state.db, &book.id, req.rating).await?;
    let book = load_visible(&state, &id, Some(&user)).await?;

    tracing::debug!(book_id = %book.id, user_id = %user.id, rating = req.rating, "Book rated");
    Ok(Json(book))
}
