use std::collections::BTreeMap;

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;

use crate::response::Envelope;
use crate::store::StoreError;

/// Field name to the messages collected for it.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

const INTERNAL_MESSAGE: &str = "Something went wrong, please contact administrator!";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0} not found!")]
    NotFound(&'static str),

    #[error("You can't add a 3rd level subcategory!")]
    DepthExceeded,

    #[error("You can't add same category as parent!")]
    SelfReference,

    #[error("{0}")]
    PolicyViolation(String),

    #[error("User already requested a password reset code in the last hour!")]
    RateLimited,

    #[error("Time exceeded to use the code, please request a new code")]
    Expired,

    #[error("Bad code or email!")]
    BadCode,

    #[error("User has already verified the email address!")]
    AlreadyVerified,

    #[error("The email has already been taken.")]
    DuplicateEmail,

    #[error("Bad credentials!")]
    BadCredentials,

    #[error("User didn't verify email address")]
    EmailNotVerified,

    #[error("{0}")]
    Unauthorized(&'static str),

    #[error("Bad request!")]
    Validation(FieldErrors),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("file storage error: {0}")]
    Files(#[from] std::io::Error),

    #[error("token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error("password hashing error: {0}")]
    Hash(#[from] argon2::Error),
}

impl ApiError {
    /// A single-field validation failure.
    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(field.to_string(), vec![message.into()]);
        ApiError::Validation(errors)
    }

    fn is_internal(&self) -> bool {
        matches!(
            self,
            ApiError::Store(_) | ApiError::Files(_) | ApiError::Token(_) | ApiError::Hash(_)
        )
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(err: validator::ValidationErrors) -> Self {
        let errors = err
            .field_errors()
            .into_iter()
            .map(|(field, failures)| {
                let messages = failures
                    .iter()
                    .map(|failure| match &failure.message {
                        Some(message) => message.to_string(),
                        None => format!("The {} field is invalid ({}).", field, failure.code),
                    })
                    .collect();
                (field.to_string(), messages)
            })
            .collect();
        ApiError::Validation(errors)
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::DepthExceeded | ApiError::SelfReference | ApiError::PolicyViolation(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Expired | ApiError::AlreadyVerified | ApiError::EmailNotVerified => {
                StatusCode::NOT_ACCEPTABLE
            }
            ApiError::BadCode | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::DuplicateEmail => StatusCode::CONFLICT,
            ApiError::BadCredentials | ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Store(_) | ApiError::Files(_) | ApiError::Token(_) | ApiError::Hash(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let envelope = if self.is_internal() {
            log::error!("{}", self);
            Envelope::<()>::error(INTERNAL_MESSAGE, FieldErrors::new())
        } else {
            let errors = match self {
                ApiError::Validation(errors) => errors.clone(),
                _ => FieldErrors::new(),
            };
            Envelope::<()>::error(self.to_string(), errors)
        };
        HttpResponse::build(self.status_code()).json(envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    use crate::models::CategoryInput;

    #[test]
    fn semantic_errors_map_to_client_statuses() {
        assert_eq!(ApiError::NotFound("Category").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::DepthExceeded.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(ApiError::RateLimited.status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(ApiError::Expired.status_code(), StatusCode::NOT_ACCEPTABLE);
        assert_eq!(ApiError::DuplicateEmail.status_code(), StatusCode::CONFLICT);
        assert_eq!(ApiError::NotFound("Product").to_string(), "Product not found!");
    }

    #[test]
    fn collaborator_failures_are_internal() {
        let err = ApiError::from(std::io::Error::new(std::io::ErrorKind::Other, "disk"));
        assert!(err.is_internal());
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn validation_errors_are_keyed_by_field() {
        let input = CategoryInput { name: String::new(), parent_id: None };
        let err = ApiError::from(input.validate().unwrap_err());
        match err {
            ApiError::Validation(errors) => {
                assert_eq!(errors.keys().collect::<Vec<_>>(), vec!["name"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
