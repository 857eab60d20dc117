use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::{
    auth::{Admin, Authenticated, Viewer, hash_password, verify_password},
    entitlement::AccessRequest,
    error::AppError,
    payment::PaymentConfirmation,
    show::{NewShow, Show, ShowPatch, ShowView},
    state::AppState,
    store::{StoreError, SubjectId},
    user::{Profile, ProfilePatch},
    utils::{is_plausible_email, normalize_email, parse_json},
};

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/auth/signup", post(signup_handler))
        .route("/api/auth/login", post(login_handler))
        .route("/api/auth/update-profile", put(update_profile_handler))
        .route("/api/auth/me", get(me_handler))
        .route("/api/shows", get(list_shows_handler).post(create_show_handler))
        .route(
            "/api/shows/{id}",
            get(get_show_handler)
                .put(update_show_handler)
                .delete(delete_show_handler),
        )
        .route("/api/payment/create-order", post(create_order_handler))
        .route("/api/payment/verify", post(verify_payment_handler))
        .with_state(state)
}

#[derive(Deserialize)]
pub struct Credentials {
    email: String,
    password: String,
}

#[derive(Serialize)]
pub struct Session {
    token: String,
    user: Profile,
}

pub async fn signup_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Credentials>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let credentials = parse_json(payload)?;

    let email = normalize_email(&credentials.email);
    if !is_plausible_email(&email) {
        return Err(AppError::InvalidInput("A valid email is required"));
    }
    if credentials.password.is_empty() {
        return Err(AppError::InvalidInput("Password is required"));
    }

    let password_hash = hash_password(credentials.password, state.bcrypt_cost).await?;
    let user = match state.users.create(&email, &password_hash).await {
        Ok(user) => user,
        Err(StoreError::DuplicateEmail) => return Err(AppError::Conflict),
        Err(e) => return Err(e.into()),
    };

    info!(user = %user.id, "User created");

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "User created" })),
    ))
}

pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Credentials>, JsonRejection>,
) -> Result<Json<Session>, AppError> {
    let credentials = parse_json(payload)?;

    let email = normalize_email(&credentials.email);
    let Some(user) = state.users.find_by_email(&email).await? else {
        return Err(AppError::InvalidCredentials);
    };
    if !verify_password(credentials.password, user.password_hash).await? {
        return Err(AppError::InvalidCredentials);
    }

    let token = state
        .identity
        .issue(&user.id, Utc::now())
        .map_err(|e| AppError::InternalError(Box::new(e)))?;

    Ok(Json(Session {
        token,
        user: current_profile(&state, &user.id).await?,
    }))
}

pub async fn me_handler(
    State(state): State<Arc<AppState>>,
    Authenticated(subject): Authenticated,
) -> Result<Json<Profile>, AppError> {
    Ok(Json(current_profile(&state, &subject).await?))
}

pub async fn update_profile_handler(
    State(state): State<Arc<AppState>>,
    Authenticated(subject): Authenticated,
    payload: Result<Json<ProfilePatch>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let patch = parse_json(payload)?;

    let user = state
        .users
        .update_profile(&subject, &patch)
        .await?
        .ok_or(AppError::NotFound("User"))?;

    Ok(Json(json!({
        "message": "Profile updated",
        "user": user.profile(),
    })))
}

/// Runs the subject through the entitlement evaluator first, so a lapsed
/// subscription is already written back when the profile is read.
async fn current_profile(state: &AppState, subject: &SubjectId) -> Result<Profile, AppError> {
    state
        .entitlements
        .evaluate(&AccessRequest::subject(subject.clone()), Utc::now())
        .await?;

    state
        .users
        .find_by_id(subject)
        .await?
        .map(|user| user.profile())
        .ok_or(AppError::NotFound("User"))
}

pub async fn list_shows_handler(
    State(state): State<Arc<AppState>>,
    Viewer(request): Viewer,
) -> Result<Json<Vec<ShowView>>, AppError> {
    let evaluation = state.entitlements.evaluate(&request, Utc::now()).await?;
    let shows = state.shows.list().await?;

    Ok(Json(
        shows
            .into_iter()
            .map(|show| show.project(evaluation.decision))
            .collect(),
    ))
}

pub async fn get_show_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Viewer(request): Viewer,
) -> Result<Json<ShowView>, AppError> {
    let show = state
        .shows
        .get(&id)
        .await?
        .ok_or(AppError::NotFound("Show"))?;
    let evaluation = state.entitlements.evaluate(&request, Utc::now()).await?;

    Ok(Json(show.project(evaluation.decision)))
}

pub async fn create_show_handler(
    State(state): State<Arc<AppState>>,
    _: Admin,
    payload: Result<Json<NewShow>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let new_show = parse_json(payload)?;
    new_show.validate().map_err(AppError::InvalidInput)?;

    let show = state.shows.create(new_show).await?;
    info!(show = %show.id, name = %show.name, "Show created");

    Ok((StatusCode::CREATED, Json(show)))
}

pub async fn update_show_handler(
    State(state): State<Arc<AppState>>,
    _: Admin,
    Path(id): Path<String>,
    payload: Result<Json<ShowPatch>, JsonRejection>,
) -> Result<Json<Show>, AppError> {
    let patch = parse_json(payload)?;
    patch.validate().map_err(AppError::InvalidInput)?;

    let show = state
        .shows
        .update(&id, patch)
        .await?
        .ok_or(AppError::NotFound("Show"))?;

    Ok(Json(show))
}

pub async fn delete_show_handler(
    State(state): State<Arc<AppState>>,
    _: Admin,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    if !state.shows.delete(&id).await? {
        return Err(AppError::NotFound("Show"));
    }
    info!(show = %id, "Show deleted");

    Ok(Json(json!({ "message": "Show deleted successfully" })))
}

pub async fn create_order_handler(
    State(state): State<Arc<AppState>>,
    Authenticated(subject): Authenticated,
) -> Result<Json<Value>, AppError> {
    let order = state.payments.create_order(&subject).await?;

    let Some(order_id) = order.get("id").and_then(Value::as_str) else {
        return Err(AppError::InternalError("Gateway order without an id".into()));
    };
    state.payment_records.record_order(order_id, &subject).await?;

    Ok(Json(order))
}

/// A confirmation is redeemed at most once, and only by the subject that
/// created the order.
pub async fn verify_payment_handler(
    State(state): State<Arc<AppState>>,
    Authenticated(subject): Authenticated,
    payload: Result<Json<PaymentConfirmation>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let confirmation = parse_json(payload)?;

    if !state.payments.verify(&confirmation) {
        return Err(AppError::PaymentVerification);
    }

    let owner = state
        .payment_records
        .order_owner(&confirmation.razorpay_order_id)
        .await?;
    if owner.as_ref() != Some(&subject) {
        warn!(
            user = %subject,
            order_id = %confirmation.razorpay_order_id,
            "Payment confirmation for an order this user did not create"
        );
        return Err(AppError::PaymentVerification);
    }

    if !state
        .payment_records
        .consume_payment(&confirmation.razorpay_payment_id)
        .await?
    {
        warn!(
            user = %subject,
            payment_id = %confirmation.razorpay_payment_id,
            "Payment already redeemed"
        );
        return Err(AppError::PaymentAlreadyUsed);
    }

    if !state.subscriptions.grant(&subject, Utc::now()).await? {
        return Err(AppError::NotFound("User"));
    }

    info!(
        user = %subject,
        order_id = %confirmation.razorpay_order_id,
        "Subscription granted"
    );

    Ok(Json(json!({ "success": true })))
}
