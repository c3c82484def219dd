use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::db::{
    self, CatalogQuery, CreateVideoRequest, UpdateVideoRequest, User, Video, VideoFiles,
};
use crate::uploads::UploadField;
use crate::AppState;

use super::auth::OptionalUser;
use super::catalog::{can_see, viewer_for, RateRequest, UploadForm};
use super::error::{ApiError, ValidationErrorBuilder};
use super::metrics;
use super::validation::{
    validate_media_url, validate_non_negative, validate_optional_text, validate_rating,
    validate_required_text,
};

const VIDEO_FILE_FIELDS: [UploadField; 2] = [UploadField::VideoFile, UploadField::Thumbnail];

fn check_common_fields(
    errors: &mut ValidationErrorBuilder,
    description: &Option<String>,
    category: &Option<String>,
    thumbnail: &Option<String>,
    video_url: &Option<String>,
    duration: Option<i64>,
    rating: Option<f64>,
) {
    errors
        .check("description", validate_optional_text(description, "Description", 5000))
        .check("category", validate_optional_text(category, "Category", 100))
        .check("thumbnail", validate_optional_text(thumbnail, "Thumbnail", 2048))
        .check("videoUrl", validate_media_url(video_url));
    if let Some(duration) = duration {
        errors.check("duration", validate_non_negative(duration, "Duration"));
    }
    if let Some(rating) = rating {
        errors.check("rating", validate_rating(rating));
    }
}

fn validate_create_request(req: &CreateVideoRequest, errors: &mut ValidationErrorBuilder) {
    errors
        .check("title", validate_required_text(&req.title, "Title", 200))
        .check("instructor", validate_required_text(&req.instructor, "Instructor", 200));
    check_common_fields(
        errors,
        &req.description,
        &req.category,
        &req.thumbnail,
        &req.video_url,
        req.duration,
        req.rating,
    );
}

fn validate_update_request(req: &UpdateVideoRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    if let Some(ref title) = req.title {
        errors.check("title", validate_required_text(title, "Title", 200));
    }
    if let Some(ref instructor) = req.instructor {
        errors.check("instructor", validate_required_text(instructor, "Instructor", 200));
    }
    check_common_fields(
        &mut errors,
        &req.description,
        &req.category,
        &req.thumbnail,
        &req.video_url,
        req.duration,
        req.rating,
    );
    errors.finish()
}

fn has_video_url(req: &CreateVideoRequest) -> bool {
    req.video_url.as_deref().is_some_and(|u| !u.trim().is_empty())
}

async fn load_visible(state: &AppState, id: &str, user: Option<&User>) -> Result<Video, ApiError> {
    match db::find_video(&state.db, id).await? {
        Some(video) if can_see(user, video.is_public, &video.user_id) => Ok(video),
        _ => Err(ApiError::not_found("Video not found")),
    }
}

async fn load_owned(state: &AppState, id: &str, user: &User) -> Result<Video, ApiError> {
    let video = db::find_video(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Video not found"))?;

    if !user.can_modify(&video.user_id) {
        return Err(ApiError::forbidden("You can only modify your own videos"));
    }
    Ok(video)
}

/// GET /api/videos
pub async fn list_videos(
    State(state): State<Arc<AppState>>,
    OptionalUser(user): OptionalUser,
    Query(query): Query<CatalogQuery>,
) -> Result<Json<Vec<Video>>, ApiError> {
    let videos = db::list_videos(&state.db, &query, &viewer_for(user.as_ref())).await?;
    Ok(Json(videos))
}

/// GET /api/videos/:id
pub async fn get_video(
    State(state): State<Arc<AppState>>,
    OptionalUser(user): OptionalUser,
    Path(id): Path<String>,
) -> Result<Json<Video>, ApiError> {
    let video = load_visible(&state, &id, user.as_ref()).await?;
    Ok(Json(video))
}

/// POST /api/videos
///
/// JSON creation only references externally hosted media, so `videoUrl` is required.
pub async fn create_video(
    State(state): State<Arc<AppState>>,
    user: User,
    Json(req): Json<CreateVideoRequest>,
) -> Result<(StatusCode, Json<Video>), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    validate_create_request(&req, &mut errors);
    if !has_video_url(&req) {
        errors.add("videoUrl", "Video URL is required");
    }
    errors.finish()?;

    let video = db::insert_video(
        &state.db,
        &req,
        &VideoFiles::default(),
        &user.id,
        &user.display_name,
    )
    .await?;

    tracing::info!(video_id = %video.id, user_id = %user.id, title = %video.title, "Video created");
    Ok((StatusCode::CREATED, Json(video)))
}

/// POST /api/videos/upload (multipart: text fields plus `videoFile` / `thumbnail`)
pub async fn upload_video(
    State(state): State<Arc<AppState>>,
    user: User,
    multipart: Multipart,
) -> Result<(StatusCode, Json<Video>), ApiError> {
    let form = UploadForm::read(multipart, &state.uploads, &VIDEO_FILE_FIELDS).await?;

    let mut errors = ValidationErrorBuilder::new();
    let req = CreateVideoRequest {
        title: form.text("title").unwrap_or_default(),
        instructor: form.text("instructor").unwrap_or_default(),
        description: form.text("description"),
        category: form.text("category"),
        thumbnail: form.text("thumbnail"),
        video_url: form.text("videoUrl"),
        duration: form.number("duration", &mut errors),
        rating: form.number("rating", &mut errors),
        is_public: form.flag("isPublic", &mut errors),
        featured: form.flag("featured", &mut errors),
    };
    validate_create_request(&req, &mut errors);
    if !form.has_file(UploadField::VideoFile) && !has_video_url(&req) {
        errors.add("videoFile", "A video file or video URL is required");
    }
    errors.finish()?;

    let stored = form.store(&state.uploads).await?;
    let files = VideoFiles {
        video_file: stored.get(UploadField::VideoFile),
        thumbnail: stored.get(UploadField::Thumbnail),
    };

    let video = match db::insert_video(&state.db, &req, &files, &user.id, &user.display_name).await {
        Ok(video) => video,
        Err(e) => {
            stored.discard(&state.uploads).await;
            return Err(e.into());
        }
    };

    tracing::info!(
        video_id = %video.id,
        user_id = %user.id,
        has_file = video.video_file.is_some(),
        "Video uploaded"
    );
    Ok((StatusCode::CREATED, Json(video)))
}

/// PUT /api/videos/:id
pub async fn update_video(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
    Json(req): Json<UpdateVideoRequest>,
) -> Result<Json<Video>, ApiError> {
    let existing = load_owned(&state, &id, &user).await?;
    validate_update_request(&req)?;

    let video = db::update_video(&state.db, &existing, &req).await?;

    let kept = video.stored_files();
    let released: Vec<&str> = existing
        .stored_files()
        .into_iter()
        .filter(|path| !kept.contains(path))
        .collect();
    state.uploads.remove_all(released).await;

    tracing::info!(video_id = %video.id, user_id = %user.id, "Video updated");
    Ok(Json(video))
}

/// DELETE /api/videos/:id
pub async fn delete_video(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let video = load_owned(&state, &id, &user).await?;

    if !db::delete_video(&state.db, &video.id).await? {
        return Err(ApiError::not_found("Video not found"));
    }
    state.uploads.remove_all(video.stored_files()).await;

    tracing::info!(video_id = %video.id, user_id = %user.id, "Video deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/videos/:id/view
pub async fn view_video(
    State(state): State<Arc<AppState>>,
    OptionalUser(user): OptionalUser,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let video = load_visible(&state, &id, user.as_ref()).await?;

    let views = db::increment_video_views(&state.db, &video.id)
        .await?
        .ok_or_else(|| ApiError::not_found("Video not found"))?;
    metrics::record_view("video");

    Ok(Json(json!({ "views": views })))
}

/// POST /api/videos/:id/rate
pub async fn rate_video(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
    Json(req): Json<RateRequest>,
) -> Result<Json<Video>, ApiError> {
    if let Err(e) = validate_rating(req.rating) {
        return Err(ApiError::validation_field("rating", e));
    }
    let video = load_visible(&state, &id, Some(&user)).await?;

    db::set_video_rating(&state.db, &video.id, req.rating).await?;
    let video = load_visible(&state, &id, Some(&user)).await?;
    Ok(Json(video))
}
