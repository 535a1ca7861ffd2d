// User-facing feedback: toasts and the request-access prompt
use crate::application::error::ApiError;
use std::sync::Arc;

/// Toast notifications.
pub trait Notifier: Send + Sync {
    fn success(&self, message: &str);
    fn error(&self, message: &str);
}

/// Shown when the backend answers 403.
pub trait PermissionPrompt: Send + Sync {
    fn request_access(&self, action: &str, resource: &str);
}

pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn success(&self, message: &str) {
        tracing::info!("{}", message);
    }

    fn error(&self, message: &str) {
        tracing::warn!("{}", message);
    }
}

pub struct LoggingPermissionPrompt;

impl PermissionPrompt for LoggingPermissionPrompt {
    fn request_access(&self, action: &str, resource: &str) {
        tracing::warn!(
            "Insufficient permission to {} ({}); ask an administrator for access",
            action,
            resource
        );
    }
}

/// Single place where call-site failures become user feedback.
#[derive(Clone)]
pub struct FailureReporter {
    notifier: Arc<dyn Notifier>,
    prompt: Arc<dyn PermissionPrompt>,
}

impl Default for FailureReporter {
    fn default() -> Self {
        Self::new(Arc::new(TracingNotifier), Arc::new(LoggingPermissionPrompt))
    }
}

impl FailureReporter {
    pub fn new(notifier: Arc<dyn Notifier>, prompt: Arc<dyn PermissionPrompt>) -> Self {
        Self { notifier, prompt }
    }

    pub fn report(&self, action: &str, err: &ApiError) {
        match err {
            ApiError::Forbidden { resource } => self.prompt.request_access(action, resource),
            other => {
                tracing::error!("Failed to {}: {}", action, other);
                self.notifier
                    .error(&format!("Failed to {}: {}", action, other));
            }
        }
    }

    pub fn success(&self, message: &str) {
        self.notifier.success(message);
    }

    pub fn error(&self, message: &str) {
        self.notifier.error(message);
    }
}
