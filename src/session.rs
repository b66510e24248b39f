//! One user's pass through the wizard.
//!
//! [`ReformatSession`] owns the slot store and the submission coordinator.
//! A stored result only counts while the slots still hold the inputs it was
//! computed from, so any slot mutation clears it in the same locked step that
//! changes the slot. The step is always derived from both, never stored.

use crate::config::ReformatterConfig;
use crate::error::{ReformatError, SubmitError};
use crate::events::{EventSink, NoopEvents};
use crate::preview::{DocumentPreviewer, PreviewGenerator, PreviewOptions};
use crate::service::{HttpReformatService, ReformatService};
use crate::slot::{FilePayload, SlotName};
use crate::step::{derive_step, WizardStep};
use crate::store::{FileSlotStore, SlotsSnapshot};
use crate::submit::{ReformattedDocument, SubmissionCoordinator, SubmissionResult};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

pub struct ReformatSession {
    store: FileSlotStore,
    coordinator: SubmissionCoordinator,
}

impl ReformatSession {
    /// Session with the document previewer and the HTTP reformat client.
    pub fn new(config: &ReformatterConfig) -> Result<Self, ReformatError> {
        let generator = Arc::new(DocumentPreviewer::new(PreviewOptions::from(config)));
        let service = Arc::new(HttpReformatService::new(config)?);
        let events: EventSink = config.events.clone().unwrap_or_else(|| Arc::new(NoopEvents));
        debug!("New session: {:?}", config);
        Ok(Self::with_parts(generator, service, events))
    }

    /// Session over caller-supplied collaborators.
    ///
    /// Previews run on the Tokio runtime current at construction, so
    /// [`add_file`](Self::add_file) may be called from any thread.
    pub fn with_parts(
        generator: Arc<dyn PreviewGenerator>,
        service: Arc<dyn ReformatService>,
        events: EventSink,
    ) -> Self {
        Self {
            store: FileSlotStore::new(generator, events.clone()),
            coordinator: SubmissionCoordinator::new(service, events),
        }
    }

    /// Place a file in `slot`; its preview starts in the background.
    ///
    /// Returns the slot's new preview generation.
    pub fn add_file(&self, slot: SlotName, payload: FilePayload) -> u64 {
        self.store.set_file(slot, payload)
    }

    /// Read `path` and place it in `slot`.
    pub async fn add_path(&self, slot: SlotName, path: impl AsRef<Path>) -> Result<u64, ReformatError> {
        let payload = FilePayload::from_path(path).await?;
        Ok(self.add_file(slot, payload))
    }

    /// Empty `slot`. Returns `false` if it held nothing.
    pub fn remove_file(&self, slot: SlotName) -> bool {
        self.store.clear_file(slot)
    }

    /// Submit the current slots. Previews need not have finished.
    pub async fn submit(&self) -> Result<ReformattedDocument, SubmitError> {
        let slots = self.store.snapshot();
        self.coordinator.submit(&slots).await
    }

    pub fn step(&self) -> WizardStep {
        let slots = self.store.snapshot();
        derive_step(slots.occupancy(), self.coordinator.phase(&slots))
    }

    pub fn slots(&self) -> SlotsSnapshot {
        self.store.snapshot()
    }

    pub fn result(&self) -> Option<SubmissionResult> {
        self.coordinator.result(&self.store.snapshot())
    }

    /// Revision receiver that ticks on every slot change.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.store.subscribe()
    }

    /// Wait until no preview is loading.
    pub async fn previews_settled(&self) -> SlotsSnapshot {
        self.store.settled().await
    }
}
