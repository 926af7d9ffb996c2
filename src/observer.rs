//! Observer trait for UI-facing state changes.
//!
//! Inject an [`Arc<dyn ChatObserver>`] via
//! [`crate::config::ChatConfigBuilder::observer`] to be told about every
//! change a chat front end has to reflect: appended messages, the
//! sending/ingesting flags, the staged file and the error line.
//!
//! Events fire synchronously from inside the orchestrator, between suspension
//! points. In particular `on_message_appended` for the user's own message
//! fires before the completion request is sent, so a front end can render it
//! immediately.
//!
//! # Example
//!
//! ```rust
//! use docchat::{ChatObserver, Message};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct Counter(AtomicUsize);
//!
//! impl ChatObserver for Counter {
//!     fn on_message_appended(&self, _index: usize, _message: &Message) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!     }
//! }
//! ```

use crate::message::{Message, PendingFile};
use crate::state::RequestState;
use std::sync::Arc;

/// Receives orchestrator state changes.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait ChatObserver: Send + Sync {
    /// A message was appended at `index` of the transcript.
    fn on_message_appended(&self, index: usize, message: &Message) {
        let _ = (index, message);
    }

    /// One of the in-flight flags changed.
    fn on_request_state_changed(&self, state: RequestState) {
        let _ = state;
    }

    /// A file was staged for the next message.
    fn on_file_staged(&self, file: &PendingFile) {
        let _ = file;
    }

    /// The staged file was consumed by a send or cleared explicitly.
    fn on_file_cleared(&self) {}

    /// The error line changed. `None` means it was cleared.
    fn on_error_changed(&self, error: Option<&str>) {
        let _ = error;
    }
}

/// A no-op observer, used when none is configured.
pub struct NoopObserver;

impl ChatObserver for NoopObserver {}

/// Convenience alias matching the type stored in [`crate::config::ChatConfig`].
pub type ObserverHandle = Arc<dyn ChatObserver>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_observer_does_not_panic() {
        let o = NoopObserver;
        o.on_message_appended(0, &Message::user("hi"));
        o.on_request_state_changed(RequestState::default());
        o.on_file_cleared();
        o.on_error_changed(Some("oops"));
        o.on_error_changed(None);
    }

    #[test]
    fn arc_dyn_observer_works() {
        let o: ObserverHandle = Arc::new(NoopObserver);
        o.on_message_appended(3, &Message::assistant("ok"));
    }
}
