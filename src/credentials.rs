//! Accounts: registration, email verification, login, password reset and
//! self-service profile updates.
//!
//! Every operation takes the current time explicitly, and profile operations
//! take the authenticated [`CurrentUser`] from the request.

use argon2::{self, Config as ArgonConfig};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use rand::distributions::Alphanumeric;
use rand::Rng;
use uuid::Uuid;

use crate::errors::ApiError;
use crate::middleware::CurrentUser;
use crate::models::{AuthResponse, Claims, PasswordReset, SignUpInput, UpdateProfileInput, User};
use crate::notifier::{NotificationKind, Notifier};
use crate::store::{AccountStore, StoreError};

const VERIFY_TOKEN_LEN: usize = 10;
const RESET_TOKEN_LEN: usize = 16;

/// How long a reset code stays usable, and how long before another may be
/// requested for the same email.
pub fn reset_window() -> Duration {
    Duration::hours(1)
}

/// Settings needed to issue access tokens.
#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub secret: String,
    pub ttl: Duration,
}

pub fn one_time_code(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

pub fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt: [u8; 16] = rand::thread_rng().gen();
    let config = ArgonConfig::default();
    Ok(argon2::hash_encoded(password.as_bytes(), &salt, &config)?)
}

fn password_matches(user: &User, password: &str) -> bool {
    argon2::verify_encoded(&user.password_hash, password.as_bytes()).unwrap_or(false)
}

fn email_taken(err: StoreError) -> ApiError {
    match err {
        StoreError::Duplicate(_) => ApiError::DuplicateEmail,
        other => other.into(),
    }
}

async fn user_by_email<S: AccountStore + ?Sized>(store: &S, email: &str) -> Result<User, ApiError> {
    store.find_user_by_email(email).await?.ok_or(ApiError::NotFound("User"))
}

pub async fn register<S: AccountStore + ?Sized>(
    store: &S,
    notifier: &dyn Notifier,
    input: &SignUpInput,
) -> Result<User, ApiError> {
    if input.password != input.password_confirmation {
        return Err(ApiError::invalid("password", "The password confirmation does not match."));
    }
    if store.find_user_by_email(&input.email).await?.is_some() {
        return Err(ApiError::DuplicateEmail);
    }

    let user = User {
        id: Uuid::new_v4().to_string(),
        name: input.name.clone(),
        email: input.email.clone(),
        password_hash: hash_password(&input.password)?,
        email_verified_at: None,
        verify_token: Some(one_time_code(VERIFY_TOKEN_LEN)),
    };
    store.insert_user(&user).await.map_err(email_taken)?;
    log::info!("registered user {}", user.id);

    if let Some(code) = &user.verify_token {
        notifier.send(&user, NotificationKind::VerifyEmail, code);
    }
    Ok(user)
}

pub async fn login<S: AccountStore + ?Sized>(
    store: &S,
    tokens: &TokenConfig,
    email: &str,
    password: &str,
    now: DateTime<Utc>,
) -> Result<AuthResponse, ApiError> {
    let user = match store.find_user_by_email(email).await? {
        Some(user) if password_matches(&user, password) => user,
        _ => return Err(ApiError::BadCredentials),
    };
    if !user.is_verified() {
        return Err(ApiError::EmailNotVerified);
    }

    let claims = Claims {
        sub: user.id.clone(),
        exp: (now + tokens.ttl).timestamp() as usize,
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(tokens.secret.as_ref()),
    )?;
    Ok(AuthResponse { token, user: (&user).into() })
}

pub async fn verify_email<S: AccountStore + ?Sized>(
    store: &S,
    email: &str,
    code: &str,
    now: DateTime<Utc>,
) -> Result<User, ApiError> {
    let mut user = user_by_email(store, email).await?;
    if user.is_verified() {
        return Err(ApiError::AlreadyVerified);
    }
    if user.verify_token.as_deref() != Some(code) {
        return Err(ApiError::BadCode);
    }

    user.email_verified_at = Some(now);
    user.verify_token = None;
    store.update_user(&user).await?;
    log::info!("user {} verified their email", user.id);
    Ok(user)
}

pub async fn resend_verification<S: AccountStore + ?Sized>(
    store: &S,
    notifier: &dyn Notifier,
    email: &str,
) -> Result<(), ApiError> {
    let mut user = user_by_email(store, email).await?;
    if user.is_verified() {
        return Err(ApiError::AlreadyVerified);
    }
    let code = match user.verify_token.clone() {
        Some(code) => code,
        None => {
            let code = one_time_code(VERIFY_TOKEN_LEN);
            user.verify_token = Some(code.clone());
            store.update_user(&user).await?;
            code
        }
    };
    notifier.send(&user, NotificationKind::VerifyEmail, &code);
    Ok(())
}

pub async fn forgot_password<S: AccountStore + ?Sized>(
    store: &S,
    notifier: &dyn Notifier,
    email: &str,
    now: DateTime<Utc>,
) -> Result<PasswordReset, ApiError> {
    let user = user_by_email(store, email).await?;
    if let Some(previous) = store.latest_reset(email).await? {
        if now - previous.created_at < reset_window() {
            log::debug!("reset for {} refused, last one at {}", user.id, previous.created_at);
            return Err(ApiError::RateLimited);
        }
    }

    let reset = PasswordReset {
        email: user.email.clone(),
        token: one_time_code(RESET_TOKEN_LEN),
        created_at: now,
    };
    store.insert_reset(&reset).await?;
    notifier.send(&user, NotificationKind::ForgotPassword, &reset.token);
    Ok(reset)
}

pub async fn change_password<S: AccountStore + ?Sized>(
    store: &S,
    email: &str,
    code: &str,
    password: &str,
    now: DateTime<Utc>,
) -> Result<(), ApiError> {
    let mut user = user_by_email(store, email).await?;
    let reset = match store.latest_reset(email).await? {
        Some(reset) if reset.token == code => reset,
        _ => return Err(ApiError::BadCode),
    };
    if now - reset.created_at > reset_window() {
        return Err(ApiError::Expired);
    }

    user.password_hash = hash_password(password)?;
    store.redeem_reset(&user, &reset).await?;
    log::info!("user {} changed their password with a reset code", user.id);
    Ok(())
}

pub async fn profile<S: AccountStore + ?Sized>(
    store: &S,
    current: &CurrentUser,
) -> Result<User, ApiError> {
    store.find_user(&current.id).await?.ok_or(ApiError::NotFound("User"))
}

/// Changing the email address un-verifies the account and sends a new code.
pub async fn update_profile<S: AccountStore + ?Sized>(
    store: &S,
    notifier: &dyn Notifier,
    current: &CurrentUser,
    changes: &UpdateProfileInput,
) -> Result<User, ApiError> {
    let mut user = profile(store, current).await?;

    if let Some(name) = &changes.name {
        user.name = name.clone();
    }

    let new_email = changes.email.as_ref().filter(|email| **email != user.email);
    if let Some(email) = new_email {
        if let Some(other) = store.find_user_by_email(email).await? {
            if other.id != user.id {
                return Err(ApiError::DuplicateEmail);
            }
        }
        user.email = email.clone();
        user.email_verified_at = None;
        user.verify_token = Some(one_time_code(VERIFY_TOKEN_LEN));
    }

    if let Some(password) = &changes.password {
        user.password_hash = hash_password(password)?;
    }

    store.update_user(&user).await.map_err(email_taken)?;

    if new_email.is_some() {
        if let Some(code) = &user.verify_token {
            notifier.send(&user, NotificationKind::VerifyEmail, code);
        }
    }
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};

    use crate::store::MemoryStore;

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<(String, NotificationKind, String)>>,
    }

    impl RecordingNotifier {
        fn last(&self) -> Option<(String, NotificationKind, String)> {
            self.sent.lock().unwrap().last().cloned()
        }

        fn count(&self) -> usize {
            self.sent.lock().unwrap().len()
        }
    }

    impl Notifier for RecordingNotifier {
        fn send(&self, user: &User, kind: NotificationKind, code: &str) {
            self.sent.lock().unwrap().push((user.email.clone(), kind, code.to_string()));
        }
    }

    fn sign_up(email: &str) -> SignUpInput {
        SignUpInput {
            name: "Ana".to_string(),
            email: email.to_string(),
            password: "secret".to_string(),
            password_confirmation: "secret".to_string(),
        }
    }

    fn tokens() -> TokenConfig {
        TokenConfig { secret: "test-secret".to_string(), ttl: Duration::hours(1) }
    }

    async fn verified_user(store: &MemoryStore, notifier: &RecordingNotifier) -> User {
        let user = register(store, notifier, &sign_up("ana@example.com")).await.unwrap();
        let code = user.verify_token.clone().unwrap();
        verify_email(store, &user.email, &code, Utc::now()).await.unwrap()
    }

    #[actix_web::test]
    async fn register_sends_a_verification_code() {
        let store = MemoryStore::new();
        let notifier = RecordingNotifier::default();

        let user = register(&store, &notifier, &sign_up("ana@example.com")).await.unwrap();

        assert!(!user.is_verified());
        let code = user.verify_token.clone().unwrap();
        assert_eq!(code.len(), 10);
        assert_eq!(
            notifier.last(),
            Some(("ana@example.com".to_string(), NotificationKind::VerifyEmail, code))
        );
        assert_ne!(user.password_hash, "secret");
    }

    #[actix_web::test]
    async fn register_rejects_duplicates_and_mismatched_confirmation() {
        let store = MemoryStore::new();
        let notifier = RecordingNotifier::default();
        register(&store, &notifier, &sign_up("ana@example.com")).await.unwrap();

        let err = register(&store, &notifier, &sign_up("ana@example.com")).await.unwrap_err();
        assert!(matches!(err, ApiError::DuplicateEmail));

        let mut input = sign_up("bo@example.com");
        input.password_confirmation = "other".to_string();
        let err = register(&store, &notifier, &input).await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[actix_web::test]
    async fn verification_is_one_way() {
        let store = MemoryStore::new();
        let notifier = RecordingNotifier::default();
        let user = register(&store, &notifier, &sign_up("ana@example.com")).await.unwrap();
        let code = user.verify_token.clone().unwrap();

        let err = verify_email(&store, &user.email, "wrong", Utc::now()).await.unwrap_err();
        assert!(matches!(err, ApiError::BadCode));

        let verified = verify_email(&store, &user.email, &code, Utc::now()).await.unwrap();
        assert!(verified.is_verified());
        assert_eq!(verified.verify_token, None);

        let err = verify_email(&store, &user.email, &code, Utc::now()).await.unwrap_err();
        assert!(matches!(err, ApiError::AlreadyVerified));
        let err = resend_verification(&store, &notifier, &user.email).await.unwrap_err();
        assert!(matches!(err, ApiError::AlreadyVerified));
    }

    #[actix_web::test]
    async fn resend_reuses_the_pending_code() {
        let store = MemoryStore::new();
        let notifier = RecordingNotifier::default();
        let user = register(&store, &notifier, &sign_up("ana@example.com")).await.unwrap();

        resend_verification(&store, &notifier, &user.email).await.unwrap();

        assert_eq!(notifier.count(), 2);
        assert_eq!(notifier.last().unwrap().2, user.verify_token.unwrap());
        let err = resend_verification(&store, &notifier, "nobody@example.com").await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound("User")));
    }

    #[actix_web::test]
    async fn login_requires_verified_email_and_issues_jwt() {
        let store = MemoryStore::new();
        let notifier = RecordingNotifier::default();
        let user = register(&store, &notifier, &sign_up("ana@example.com")).await.unwrap();

        let err = login(&store, &tokens(), &user.email, "secret", Utc::now()).await.unwrap_err();
        assert!(matches!(err, ApiError::EmailNotVerified));

        let code = user.verify_token.clone().unwrap();
        verify_email(&store, &user.email, &code, Utc::now()).await.unwrap();

        let err = login(&store, &tokens(), &user.email, "nope", Utc::now()).await.unwrap_err();
        assert!(matches!(err, ApiError::BadCredentials));
        let err = login(&store, &tokens(), "x@example.com", "secret", Utc::now()).await.unwrap_err();
        assert!(matches!(err, ApiError::BadCredentials));

        let auth = login(&store, &tokens(), &user.email, "secret", Utc::now()).await.unwrap();
        let claims = decode::<Claims>(
            &auth.token,
            &DecodingKey::from_secret(b"test-secret"),
            &Validation::new(Algorithm::HS256),
        )
        .unwrap()
        .claims;
        assert_eq!(claims.sub, user.id);
        assert_eq!(auth.user.email, "ana@example.com");
    }

    #[actix_web::test]
    async fn reset_requests_are_rate_limited_for_an_hour() {
        let store = MemoryStore::new();
        let notifier = RecordingNotifier::default();
        let user = verified_user(&store, &notifier).await;
        let t = Utc::now();

        forgot_password(&store, &notifier, &user.email, t).await.unwrap();
        let err = forgot_password(&store, &notifier, &user.email, t + Duration::minutes(30))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::RateLimited));

        let again = forgot_password(&store, &notifier, &user.email, t + Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(store.latest_reset(&user.email).await.unwrap(), Some(again));
    }

    #[actix_web::test]
    async fn reset_code_is_usable_until_one_hour() {
        let store = MemoryStore::new();
        let notifier = RecordingNotifier::default();
        let user = verified_user(&store, &notifier).await;
        let t = Utc::now();
        let reset = forgot_password(&store, &notifier, &user.email, t).await.unwrap();
        assert_eq!(reset.token.len(), 16);

        let late = t + Duration::hours(1) + Duration::seconds(1);
        let err = change_password(&store, &user.email, &reset.token, "new", late)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Expired));

        let err = change_password(&store, &user.email, "wrong", "new", t).await.unwrap_err();
        assert!(matches!(err, ApiError::BadCode));

        change_password(&store, &user.email, &reset.token, "new", t + Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(store.latest_reset(&user.email).await.unwrap(), None);
        assert!(login(&store, &tokens(), &user.email, "new", t).await.is_ok());
        assert!(matches!(
            login(&store, &tokens(), &user.email, "secret", t).await,
            Err(ApiError::BadCredentials)
        ));
    }

    #[actix_web::test]
    async fn redeeming_without_a_request_is_a_bad_code() {
        let store = MemoryStore::new();
        let notifier = RecordingNotifier::default();
        let user = verified_user(&store, &notifier).await;
        let err = change_password(&store, &user.email, "anything", "new", Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::BadCode));
    }

    #[actix_web::test]
    async fn changing_email_resets_verification() {
        let store = MemoryStore::new();
        let notifier = RecordingNotifier::default();
        let user = verified_user(&store, &notifier).await;
        register(&store, &notifier, &sign_up("taken@example.com")).await.unwrap();
        let current = CurrentUser { id: user.id.clone() };

        let taken = UpdateProfileInput {
            email: Some("taken@example.com".to_string()),
            ..Default::default()
        };
        let err = update_profile(&store, &notifier, &current, &taken).await.unwrap_err();
        assert!(matches!(err, ApiError::DuplicateEmail));

        let renamed = UpdateProfileInput {
            name: Some("Ana Maria".to_string()),
            email: Some("new@example.com".to_string()),
            ..Default::default()
        };
        let updated = update_profile(&store, &notifier, &current, &renamed).await.unwrap();

        assert_eq!(updated.name, "Ana Maria");
        assert!(!updated.is_verified());
        let (to, kind, code) = notifier.last().unwrap();
        assert_eq!((to.as_str(), kind), ("new@example.com", NotificationKind::VerifyEmail));
        assert_eq!(Some(code), updated.verify_token);
    }

    #[actix_web::test]
    async fn same_email_keeps_verification() {
        let store = MemoryStore::new();
        let notifier = RecordingNotifier::default();
        let user = verified_user(&store, &notifier).await;
        let current = CurrentUser { id: user.id.clone() };
        let sent = notifier.count();

        let changes = UpdateProfileInput {
            email: Some(user.email.clone()),
            password: Some("changed".to_string()),
            ..Default::default()
        };
        let updated = update_profile(&store, &notifier, &current, &changes).await.unwrap();

        assert!(updated.is_verified());
        assert_eq!(notifier.count(), sent);
        assert!(login(&store, &tokens(), &user.email, "changed", Utc::now()).await.is_ok());
    }
}
