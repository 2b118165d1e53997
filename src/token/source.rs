//! Shared, read-only view of the current access token.

use std::fmt;
use std::sync::{Arc, RwLock};

/// Cheap, clonable accessor for the current access token.
///
/// Every clone observes the same cell. Only the
/// [`TokenManager`](crate::token::TokenManager) that created the source
/// writes to it; readers see either the previous or the new token, never a
/// partial value. After the manager stops, the source keeps returning the
/// last token it held.
#[derive(Clone)]
pub struct AccessTokenSource {
    cell: Arc<RwLock<Arc<str>>>,
}

impl AccessTokenSource {
    /// A source that holds no token yet.
    pub(crate) fn empty() -> Self {
        Self::fixed("")
    }

    /// A source that always returns `token`.
    ///
    /// Useful for scripts and tests that already hold a valid token.
    pub fn fixed(token: impl Into<Arc<str>>) -> Self {
        Self {
            cell: Arc::new(RwLock::new(token.into())),
        }
    }

    /// The current access token.
    pub fn get(&self) -> String {
        self.current().to_string()
    }

    /// The current access token without copying the string.
    pub fn current(&self) -> Arc<str> {
        let guard = self.cell.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    /// Whether no token has been published yet.
    pub fn is_empty(&self) -> bool {
        self.current().is_empty()
    }

    pub(crate) fn publish(&self, token: &str) {
        let token: Arc<str> = Arc::from(token);
        *self.cell.write().unwrap_or_else(|e| e.into_inner()) = token;
    }
}

impl fmt::Debug for AccessTokenSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessTokenSource")
            .field("present", &!self.is_empty())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_observe_publication() {
        let source = AccessTokenSource::empty();
        let reader = source.clone();
        assert!(reader.is_empty());

        source.publish("A1");
        assert_eq!(reader.get(), "A1");

        source.publish("A2");
        assert_eq!(&*reader.current(), "A2");
    }

    #[test]
    fn debug_does_not_leak_the_token() {
        let source = AccessTokenSource::fixed("secret");
        assert!(!format!("{source:?}").contains("secret"));
    }
}
