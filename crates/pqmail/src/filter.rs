//! Matching emails for `wait_for_email`.

use std::fmt;
use std::sync::Arc;

use crate::inbox::Email;

/// Criteria an email must meet. An empty filter matches everything.
///
/// ```rust
/// use pqmail::EmailFilter;
///
/// let filter = EmailFilter::new()
///     .subject("Reset your password")
///     .from("noreply@")
///     .predicate(|email| email.metadata.to.len() == 1);
/// ```
#[derive(Clone, Default)]
pub struct EmailFilter {
    subject: Option<String>,
    from: Option<String>,
    predicate: Option<Arc<dyn Fn(&Email) -> bool + Send + Sync>>,
}

impl EmailFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require the subject to contain `needle`.
    pub fn subject(mut self, needle: impl Into<String>) -> Self {
        self.subject = Some(needle.into());
        self
    }

    /// Require the sender to contain `needle`.
    pub fn from(mut self, needle: impl Into<String>) -> Self {
        self.from = Some(needle.into());
        self
    }

    /// Require an arbitrary condition.
    pub fn predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Email) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    pub fn matches(&self, email: &Email) -> bool {
        if let Some(needle) = &self.subject {
            if !email.subject().contains(needle.as_str()) {
                return false;
            }
        }
        if let Some(needle) = &self.from {
            if !email.from().contains(needle.as_str()) {
                return false;
            }
        }
        self.predicate.as_ref().map_or(true, |p| p(email))
    }
}

impl fmt::Debug for EmailFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmailFilter")
            .field("subject", &self.subject)
            .field("from", &self.from)
            .field("predicate", &self.predicate.is_some())
            .finish()
    }
}
