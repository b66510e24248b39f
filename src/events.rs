//! Event-callback trait for preview and submission progress.
//!
//! Inject an [`Arc<dyn SessionEvents>`] via
//! [`crate::config::ReformatterConfigBuilder::events`] to hear about preview
//! tasks and submissions as they happen. A terminal front-end prints lines, a
//! GUI front-end re-renders the affected slot.
//!
//! # Example
//!
//! ```rust
//! use cv_reformatter::{PreviewArtifact, ReformatterConfig, SessionEvents, SlotName};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct ReadyCounter(AtomicUsize);
//!
//! impl SessionEvents for ReadyCounter {
//!     fn on_preview_ready(&self, _slot: SlotName, _generation: u64, _artifact: &PreviewArtifact) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!     }
//! }
//!
//! let config = ReformatterConfig::builder()
//!     .events(Arc::new(ReadyCounter(AtomicUsize::new(0))))
//!     .build()
//!     .unwrap();
//! ```

use crate::error::{PreviewError, SubmitError};
use crate::preview::PreviewArtifact;
use crate::slot::SlotName;
use std::sync::Arc;

/// Called by the slot store and the submission coordinator.
///
/// Preview callbacks run on the preview task, so implementations must be
/// `Send + Sync` and protect their own state. All methods default to no-ops.
pub trait SessionEvents: Send + Sync {
    /// A file was placed in `slot` and its preview task spawned.
    fn on_preview_start(&self, slot: SlotName, generation: u64, file_name: &str) {
        let _ = (slot, generation, file_name);
    }

    /// The current generation's preview resolved successfully.
    fn on_preview_ready(&self, slot: SlotName, generation: u64, artifact: &PreviewArtifact) {
        let _ = (slot, generation, artifact);
    }

    /// The current generation's preview failed.
    fn on_preview_failed(&self, slot: SlotName, generation: u64, error: &PreviewError) {
        let _ = (slot, generation, error);
    }

    /// A preview for a superseded generation arrived and was dropped.
    fn on_preview_discarded(&self, slot: SlotName, generation: u64) {
        let _ = (slot, generation);
    }

    fn on_submission_start(&self) {}

    /// The service returned a document of `text_len` bytes.
    fn on_submission_complete(&self, text_len: usize) {
        let _ = text_len;
    }

    fn on_submission_failed(&self, error: &SubmitError) {
        let _ = error;
    }
}

/// No-op receiver used when no events are configured.
pub struct NoopEvents;

impl SessionEvents for NoopEvents {}

/// Convenience alias matching the type stored in [`crate::config::ReformatterConfig`].
pub type EventSink = Arc<dyn SessionEvents>;
