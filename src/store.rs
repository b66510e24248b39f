//! The three upload slots and their preview tasks.
//!
//! Every mutation of a slot bumps that slot's generation counter, and every
//! preview task is tagged with the generation it was started for. When a task
//! finishes, its result is applied only if the slot is still at that
//! generation; otherwise it is dropped. Arrival order does not matter.
//!
//! Separately, the store counts input changes: every file set or cleared bumps
//! [`SlotsSnapshot::inputs`] under the same lock, so anything computed from a
//! snapshot can later be checked against the slots as they are now.
//!
//! State lives behind a `std::sync::Mutex` that is never held across an
//! `.await`. Observers follow changes through a `watch` channel carrying the
//! store revision. Preview tasks run on the Tokio runtime the store was
//! created on, so files can be added from any thread.

use crate::error::PreviewError;
use crate::events::EventSink;
use crate::preview::{PreviewArtifact, PreviewGenerator};
use crate::slot::{FilePayload, PreviewState, SlotName};
use crate::step::SlotOccupancy;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default)]
pub struct SlotView {
    pub payload: Option<FilePayload>,
    pub preview: PreviewState,
    /// Bumped on every set/clear of this slot.
    pub generation: u64,
}

impl SlotView {
    pub fn is_occupied(&self) -> bool {
        self.payload.is_some()
    }
}

/// Consistent copy of all three slots, taken under the store lock.
#[derive(Debug, Clone, Default)]
pub struct SlotsSnapshot {
    slots: [SlotView; 3],
    /// Store revision this snapshot was taken at.
    pub revision: u64,
    /// Input version: bumped when a file is set or cleared, not when a
    /// preview finishes.
    pub inputs: u64,
}

impl SlotsSnapshot {
    pub fn get(&self, slot: SlotName) -> &SlotView {
        &self.slots[slot.index()]
    }

    pub fn payload(&self, slot: SlotName) -> Option<&FilePayload> {
        self.get(slot).payload.as_ref()
    }

    pub fn preview(&self, slot: SlotName) -> &PreviewState {
        &self.get(slot).preview
    }

    pub fn occupancy(&self) -> SlotOccupancy {
        SlotOccupancy {
            cv: self.get(SlotName::Cv).is_occupied(),
            template: self.get(SlotName::Template).is_occupied(),
            example: self.get(SlotName::Example).is_occupied(),
        }
    }

    /// Required slots without a file, in slot order.
    pub fn missing_required(&self) -> Vec<SlotName> {
        SlotName::ALL
            .into_iter()
            .filter(|s| s.is_required() && !self.get(*s).is_occupied())
            .collect()
    }

    pub fn any_loading(&self) -> bool {
        self.slots.iter().any(|v| v.preview.is_loading())
    }

    pub fn iter(&self) -> impl Iterator<Item = (SlotName, &SlotView)> + '_ {
        SlotName::ALL.into_iter().map(move |s| (s, self.get(s)))
    }

    #[cfg(test)]
    pub(crate) fn with_payload(mut self, slot: SlotName, payload: FilePayload) -> Self {
        let view = &mut self.slots[slot.index()];
        view.payload = Some(payload);
        view.preview = PreviewState::Loading;
        view.generation += 1;
        self.inputs += 1;
        self
    }
}

#[derive(Default)]
struct StoreState {
    slots: [SlotView; 3],
    revision: u64,
    inputs: u64,
}

struct StoreInner {
    state: Mutex<StoreState>,
    runtime: Option<Handle>,
    generator: Arc<dyn PreviewGenerator>,
    events: EventSink,
    revision_tx: watch::Sender<u64>,
}

impl StoreInner {
    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn bump_revision(&self, state: &mut StoreState) {
        state.revision += 1;
        self.revision_tx.send_replace(state.revision);
    }

    /// Apply a finished preview if `generation` is still current.
    fn finish_preview(
        &self,
        slot: SlotName,
        generation: u64,
        outcome: Result<PreviewArtifact, PreviewError>,
    ) {
        let applied = {
            let mut state = self.lock();
            let view = &mut state.slots[slot.index()];
            if view.generation != generation || !view.preview.is_loading() {
                false
            } else {
                view.preview = match &outcome {
                    Ok(artifact) => PreviewState::Ready(artifact.clone()),
                    Err(e) => PreviewState::Failed(e.clone()),
                };
                self.bump_revision(&mut state);
                true
            }
        };

        if !applied {
            debug!("Discarding stale {} preview (generation {})", slot, generation);
            self.events.on_preview_discarded(slot, generation);
            return;
        }

        match outcome {
            Ok(artifact) => {
                debug!("{} preview ready: {}", slot, artifact.summary());
                self.events.on_preview_ready(slot, generation, &artifact);
            }
            Err(e) => {
                warn!("{} preview failed: {}", slot, e);
                self.events.on_preview_failed(slot, generation, &e);
            }
        }
    }
}

/// Shared handle to the upload slots. Cloning is cheap.
#[derive(Clone)]
pub struct FileSlotStore {
    inner: Arc<StoreInner>,
}

impl FileSlotStore {
    /// Store whose preview tasks run on the current Tokio runtime, if any.
    ///
    /// Built outside a runtime, previews fall back to whatever runtime
    /// `set_file` is called from.
    pub fn new(generator: Arc<dyn PreviewGenerator>, events: EventSink) -> Self {
        Self::build(generator, events, Handle::try_current().ok())
    }

    /// Store whose preview tasks run on `runtime`.
    pub fn with_runtime(generator: Arc<dyn PreviewGenerator>, events: EventSink, runtime: Handle) -> Self {
        Self::build(generator, events, Some(runtime))
    }

    fn build(generator: Arc<dyn PreviewGenerator>, events: EventSink, runtime: Option<Handle>) -> Self {
        let (revision_tx, _) = watch::channel(0);
        Self {
            inner: Arc::new(StoreInner {
                state: Mutex::new(StoreState::default()),
                runtime,
                generator,
                events,
                revision_tx,
            }),
        }
    }

    /// Put `payload` in `slot`, replacing whatever was there.
    ///
    /// The slot is `Loading` when this returns and a preview task is running
    /// in the background. Returns the slot's new generation.
    pub fn set_file(&self, slot: SlotName, payload: FilePayload) -> u64 {
        let generation = {
            let mut state = self.inner.lock();
            let view = &mut state.slots[slot.index()];
            view.generation += 1;
            view.payload = Some(payload.clone());
            view.preview = PreviewState::Loading;
            let generation = view.generation;
            state.inputs += 1;
            self.inner.bump_revision(&mut state);
            generation
        };

        info!(
            "{} ← {} ({}, {} bytes, generation {})",
            slot,
            payload.name,
            payload.media_type,
            payload.len(),
            generation
        );
        self.inner.events.on_preview_start(slot, generation, &payload.name);

        let Some(runtime) = self.inner.runtime.clone().or_else(|| Handle::try_current().ok()) else {
            warn!("{} preview not started: no Tokio runtime", slot);
            self.inner.finish_preview(
                slot,
                generation,
                Err(PreviewError::decode("no async runtime available for the preview")),
            );
            return generation;
        };

        let inner = Arc::clone(&self.inner);
        runtime.spawn(async move {
            let generator = Arc::clone(&inner.generator);
            // The generator runs in its own task so a panic still resolves the slot.
            let outcome = tokio::spawn(async move { generator.generate(&payload).await })
                .await
                .unwrap_or_else(|e| Err(PreviewError::decode(format!("preview task failed: {e}"))));
            inner.finish_preview(slot, generation, outcome);
        });

        generation
    }

    /// Empty `slot`. Returns `false` when it was already empty.
    ///
    /// Any preview still running for the removed file is discarded on arrival.
    pub fn clear_file(&self, slot: SlotName) -> bool {
        let mut state = self.inner.lock();
        let view = &mut state.slots[slot.index()];
        if view.payload.is_none() {
            return false;
        }
        view.payload = None;
        view.preview = PreviewState::Absent;
        view.generation += 1;
        let generation = view.generation;
        state.inputs += 1;
        self.inner.bump_revision(&mut state);
        drop(state);

        info!("{} cleared (generation {})", slot, generation);
        true
    }

    pub fn snapshot(&self) -> SlotsSnapshot {
        let state = self.inner.lock();
        SlotsSnapshot {
            slots: state.slots.clone(),
            revision: state.revision,
            inputs: state.inputs,
        }
    }

    /// Receiver that changes whenever any slot does.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.revision_tx.subscribe()
    }

    /// Wait until no slot is `Loading`, then return that state.
    pub async fn settled(&self) -> SlotsSnapshot {
        let mut rx = self.subscribe();
        loop {
            let snapshot = self.snapshot();
            if !snapshot.any_loading() {
                return snapshot;
            }
            if rx.changed().await.is_err() {
                return self.snapshot();
            }
        }
    }
}
