use actix_web::{web, HttpResponse};
use chrono::Utc;
use validator::Validate;

use super::AppState;
use crate::credentials;
use crate::errors::ApiError;
use crate::middleware::CurrentUser;
use crate::models::{
    ChangePasswordInput, EmailInput, SignInInput, SignUpInput, UpdateProfileInput, UserView,
    VerifyEmailInput,
};
use crate::response;

pub async fn login(
    state: web::Data<AppState>,
    input: web::Json<SignInInput>,
) -> Result<HttpResponse, ApiError> {
    input.validate()?;
    let auth = credentials::login(
        state.store.as_ref(),
        &state.tokens,
        &input.email,
        &input.password,
        Utc::now(),
    )
    .await?;
    Ok(response::ok(auth))
}

pub async fn register(
    state: web::Data<AppState>,
    input: web::Json<SignUpInput>,
) -> Result<HttpResponse, ApiError> {
    input.validate()?;
    credentials::register(state.store.as_ref(), state.notifier.as_ref(), &input).await?;
    Ok(response::created_message("Code for email verification sent!"))
}

pub async fn verify_email(
    state: web::Data<AppState>,
    input: web::Json<VerifyEmailInput>,
) -> Result<HttpResponse, ApiError> {
    input.validate()?;
    credentials::verify_email(state.store.as_ref(), &input.email, &input.code, Utc::now()).await?;
    Ok(response::message("Email verified"))
}

pub async fn resend_verify_email(
    state: web::Data<AppState>,
    input: web::Json<EmailInput>,
) -> Result<HttpResponse, ApiError> {
    input.validate()?;
    credentials::resend_verification(state.store.as_ref(), state.notifier.as_ref(), &input.email)
        .await?;
    Ok(response::message("Code for email verification sent!"))
}

pub async fn forgot_password(
    state: web::Data<AppState>,
    input: web::Json<EmailInput>,
) -> Result<HttpResponse, ApiError> {
    input.validate()?;
    credentials::forgot_password(
        state.store.as_ref(),
        state.notifier.as_ref(),
        &input.email,
        Utc::now(),
    )
    .await?;
    Ok(response::message("Code for reset password sent on email!"))
}

pub async fn change_password(
    state: web::Data<AppState>,
    input: web::Json<ChangePasswordInput>,
) -> Result<HttpResponse, ApiError> {
    input.validate()?;
    credentials::change_password(
        state.store.as_ref(),
        &input.email,
        &input.code,
        &input.password,
        Utc::now(),
    )
    .await?;
    Ok(response::message("Password changed"))
}

pub async fn get_user(
    state: web::Data<AppState>,
    current: CurrentUser,
) -> Result<HttpResponse, ApiError> {
    let user = credentials::profile(state.store.as_ref(), &current).await?;
    Ok(response::ok(UserView::from(&user)))
}

pub async fn update_user(
    state: web::Data<AppState>,
    current: CurrentUser,
    input: web::Json<UpdateProfileInput>,
) -> Result<HttpResponse, ApiError> {
    input.validate()?;
    let user =
        credentials::update_profile(state.store.as_ref(), state.notifier.as_ref(), &current, &input)
            .await?;
    Ok(response::ok(UserView::from(&user)))
}
