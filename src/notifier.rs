use crate::models::User;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    VerifyEmail,
    ForgotPassword,
}

/// Outgoing user messages. Delivery is fire-and-forget.
pub trait Notifier: Send + Sync {
    fn send(&self, user: &User, kind: NotificationKind, code: &str);
}

/// Writes messages to the log instead of delivering them.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send(&self, user: &User, kind: NotificationKind, code: &str) {
        match kind {
            NotificationKind::VerifyEmail => {
                log::info!("verify-email code for {} <{}>: {}", user.name, user.email, code)
            }
            NotificationKind::ForgotPassword => {
                log::info!("password reset code for {} <{}>: {}", user.name, user.email, code)
            }
        }
    }
}
