//! Per-request context.
//!
//! A [`RequestContext`] lives exactly as long as one client call. It is distinct
//! from the task the call creates or attaches to: a task may outlive the request
//! that started it.

use tokio_util::sync::{CancellationToken, DropGuard};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct RequestContext {
    request_id: String,
    cancel: CancellationToken,
}

impl RequestContext {
    /// Creates a context with a fresh request id.
    pub fn new() -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            cancel: CancellationToken::new(),
        }
    }

    /// Creates a context that is also cancelled when `parent` is.
    pub fn child_of(parent: &CancellationToken) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            cancel: parent.child_token(),
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Token cancelled when the client goes away or the server shuts down.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Cancels the request when the returned guard is dropped.
    ///
    /// Response streams hold the guard, so a client disconnect (which drops the
    /// stream) propagates to everything started on behalf of the request.
    #[must_use]
    pub fn cancel_on_drop(&self) -> DropGuard {
        self.cancel.clone().drop_guard()
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_request_gets_its_own_id() {
        assert_ne!(RequestContext::new().request_id(), RequestContext::new().request_id());
    }

    #[test]
    fn child_contexts_follow_their_parent() {
        let shutdown = CancellationToken::new();
        let ctx = RequestContext::child_of(&shutdown);
        assert!(!ctx.is_cancelled());
        shutdown.cancel();
        assert!(ctx.is_cancelled());
    }

    #[test]
    fn dropping_the_guard_cancels() {
        let ctx = RequestContext::new();
        let guard = ctx.cancel_on_drop();
        assert!(!ctx.is_cancelled());
        drop(guard);
        assert!(ctx.is_cancelled());
    }
}
