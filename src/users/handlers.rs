use axum::{
    extract::{
        multipart::{Field, MultipartError, MultipartRejection},
        rejection::FormRejection,
        DefaultBodyLimit, Multipart, State,
    },
    routing::{delete, get, put},
    Form, Json, Router,
};
use tracing::{instrument, warn};

use super::{
    dto::{
        AvatarUpload, ChangePasswordRequest, DeleteAccountRequest, ProfileUpdate, UpdateProfileResponse,
        UserSummary,
    },
    services,
};
use crate::{
    auth::{dto::MessageResponse, extractors::AuthUser},
    error::AppError,
    state::AppState,
};

/// Large enough that an oversized avatar gets a JSON 400 from validation.
const UPDATE_BODY_LIMIT: usize = 8 * 1024 * 1024;

pub fn read_routes() -> Router<AppState> {
    Router::new().route("/user/allusers", get(all_users))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/user/update",
            put(update_profile).layer(DefaultBodyLimit::max(UPDATE_BODY_LIMIT)),
        )
        .route("/user/change-password", put(change_password))
        .route("/user/delete-account", delete(delete_account))
}

#[instrument(skip(state))]
pub async fn all_users(
    State(state): State<AppState>,
    AuthUser(_email): AuthUser,
) -> Result<Json<Vec<UserSummary>>, AppError> {
    Ok(Json(services::list_users(&state).await?))
}

/// PUT /user/update (multipart): username, bio, birth_date, country, avatar
#[instrument(skip(state, mp))]
pub async fn update_profile(
    State(state): State<AppState>,
    AuthUser(email): AuthUser,
    mp: Result<Multipart, MultipartRejection>,
) -> Result<Json<UpdateProfileResponse>, AppError> {
    let mut mp = mp.map_err(|e| {
        warn!(error = %e, "not a multipart body");
        AppError::invalid_input("expected a multipart/form-data body")
    })?;
    let mut input = ProfileUpdate::default();

    while let Some(field) = mp.next_field().await.map_err(bad_multipart)? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        match name.as_str() {
            "username" => input.username = Some(text(field).await?),
            "bio" => input.bio = Some(text(field).await?),
            "birth_date" => input.birth_date = Some(text(field).await?),
            "country" => input.country = Some(text(field).await?),
            "avatar" => {
                let file_name = field.file_name().unwrap_or("avatar").to_string();
                let content_type = field
                    .content_type()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "application/octet-stream".into());
                let body = field.bytes().await.map_err(bad_multipart)?;
                // browsers send an empty part when no file was picked
                if !body.is_empty() {
                    input.avatar = Some(AvatarUpload {
                        file_name,
                        content_type,
                        body,
                    });
                }
            }
            other => warn!(field = %other, "ignoring unknown multipart field"),
        }
    }

    let user = services::update_profile(&state, &email, input).await?;
    Ok(Json(UpdateProfileResponse {
        message: "profile updated",
        user,
    }))
}

#[instrument(skip(state, form))]
pub async fn change_password(
    State(state): State<AppState>,
    AuthUser(email): AuthUser,
    form: Result<Form<ChangePasswordRequest>, FormRejection>,
) -> Result<Json<MessageResponse>, AppError> {
    let Form(req) = form.map_err(bad_form)?;
    services::change_password(&state, &email, &req.current_password, &req.new_password).await?;
    Ok(Json(MessageResponse {
        message: "password updated",
    }))
}

#[instrument(skip(state, form))]
pub async fn delete_account(
    State(state): State<AppState>,
    AuthUser(email): AuthUser,
    form: Result<Form<DeleteAccountRequest>, FormRejection>,
) -> Result<Json<MessageResponse>, AppError> {
    let Form(req) = form.map_err(bad_form)?;
    services::delete_account(&state, &email, &req.password).await?;
    Ok(Json(MessageResponse {
        message: "account deleted",
    }))
}

async fn text(field: Field<'_>) -> Result<String, AppError> {
    field.text().await.map_err(bad_multipart)
}

fn bad_multipart(e: MultipartError) -> AppError {
    warn!(error = %e, "malformed multipart body");
    AppError::invalid_input("malformed multipart body")
}

pub(crate) fn bad_form(e: FormRejection) -> AppError {
    warn!(error = %e, "malformed form body");
    AppError::invalid_input(e.body_text())
}
