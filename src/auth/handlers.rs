use axum::{
    extract::{rejection::FormRejection, State},
    http::StatusCode,
    routing::{delete, get, post},
    Form, Json, Router,
};
use tracing::{info, instrument};

use super::{
    dto::{LoginRequest, LoginResponse, MessageResponse, SignupRequest, SignupResponse},
    extractors::{AuthUser, BearerIdentity},
    services,
};
use crate::{error::AppError, state::AppState, users::dto::ProfileView, users::handlers::bad_form};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
}

pub fn session_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/logout", delete(logout))
        .route("/auth/verify-token", get(verify_token))
}

#[instrument(skip(state, form))]
pub async fn signup(
    State(state): State<AppState>,
    form: Result<Form<SignupRequest>, FormRejection>,
) -> Result<(StatusCode, Json<SignupResponse>), AppError> {
    let Form(req) = form.map_err(bad_form)?;
    let user = services::sign_up(&state, &req.username, &req.email, &req.password).await?;
    Ok((
        StatusCode::CREATED,
        Json(SignupResponse {
            message: "user registered",
            user,
        }),
    ))
}

#[instrument(skip(state, form))]
pub async fn login(
    State(state): State<AppState>,
    form: Result<Form<LoginRequest>, FormRejection>,
) -> Result<Json<LoginResponse>, AppError> {
    let Form(req) = form.map_err(bad_form)?;
    let (token, user) = services::login(&state, &req.email, &req.password).await?;
    Ok(Json(LoginResponse {
        message: "login successful",
        token,
        user,
    }))
}

/// Tokens are stateless; the client discards its copy.
#[instrument(skip_all)]
pub async fn logout(BearerIdentity(email): BearerIdentity) -> Json<MessageResponse> {
    info!(email = %email, "user logged out");
    Json(MessageResponse {
        message: "logged out",
    })
}

#[instrument(skip(state))]
pub async fn verify_token(
    State(state): State<AppState>,
    AuthUser(email): AuthUser,
) -> Result<Json<ProfileView>, AppError> {
    Ok(Json(services::verify_and_fetch(&state, &email).await?))
}
