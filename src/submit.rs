//! Submission gating and outcome tracking.
//!
//! [`SubmissionCoordinator::submit`] checks, in order:
//!
//! 1. `cv` and `template` hold files, else [`SubmitError::IncompleteInput`]
//! 2. nothing else is in flight, else [`SubmitError::SubmissionInProgress`]
//!
//! Neither rejection touches stored state. An accepted submission clears the
//! previous result, makes exactly one service call, and stores the outcome
//! tagged with the input version of the snapshot it was built from. Readers
//! pass the slots as they are now, and a result whose version no longer
//! matches is not current: it describes inputs that are no longer there.
//! That check needs no lock shared with the slot store, so a file added
//! while the call is out can never leave a stale result looking current.

use crate::error::{ReformatError, SubmitError};
use crate::events::EventSink;
use crate::export;
use crate::service::{ReformatRequest, ReformatService};
use crate::slot::SlotName;
use crate::step::SubmissionPhase;
use crate::store::SlotsSnapshot;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{info, warn};

/// Text returned by the reformat service. Immutable once received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReformattedDocument {
    text: Arc<str>,
}

impl ReformattedDocument {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: Arc::from(text.into()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Save the text verbatim to `path`.
    pub fn save_to(&self, path: &Path) -> Result<(), ReformatError> {
        export::save_text(&self.text, path)
    }
}

/// The stored outcome of the last completed submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionResult {
    Success(ReformattedDocument),
    Failure(SubmitError),
}

impl SubmissionResult {
    pub fn document(&self) -> Option<&ReformattedDocument> {
        match self {
            SubmissionResult::Success(doc) => Some(doc),
            SubmissionResult::Failure(_) => None,
        }
    }

    pub fn error(&self) -> Option<&SubmitError> {
        match self {
            SubmissionResult::Success(_) => None,
            SubmissionResult::Failure(e) => Some(e),
        }
    }
}

#[derive(Default)]
struct CoordinatorState {
    in_flight: bool,
    /// Last outcome and the [`SlotsSnapshot::inputs`] it was computed from.
    result: Option<(u64, SubmissionResult)>,
}

impl CoordinatorState {
    fn current_result(&self, slots: &SlotsSnapshot) -> Option<&SubmissionResult> {
        match &self.result {
            Some((inputs, result)) if *inputs == slots.inputs => Some(result),
            _ => None,
        }
    }
}

pub struct SubmissionCoordinator {
    service: Arc<dyn ReformatService>,
    events: EventSink,
    state: Mutex<CoordinatorState>,
}

/// Clears the in-flight flag even if the submitting future is dropped.
struct InFlightGuard<'a> {
    state: &'a Mutex<CoordinatorState>,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .in_flight = false;
    }
}

impl SubmissionCoordinator {
    pub fn new(service: Arc<dyn ReformatService>, events: EventSink) -> Self {
        Self {
            service,
            events,
            state: Mutex::new(CoordinatorState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CoordinatorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Submit the files in `slots`.
    pub async fn submit(&self, slots: &SlotsSnapshot) -> Result<ReformattedDocument, SubmitError> {
        let missing = slots.missing_required();
        let (Some(cv), Some(template)) = (slots.payload(SlotName::Cv), slots.payload(SlotName::Template))
        else {
            warn!("Submit rejected: missing {:?}", missing);
            return Err(SubmitError::IncompleteInput { missing });
        };

        let request = ReformatRequest {
            cv: cv.clone(),
            template: template.clone(),
            example: slots.payload(SlotName::Example).cloned(),
        };

        {
            let mut state = self.lock();
            if state.in_flight {
                warn!("Submit rejected: a submission is already in flight");
                return Err(SubmitError::SubmissionInProgress);
            }
            state.in_flight = true;
            state.result = None;
        }
        let _guard = InFlightGuard { state: &self.state };

        self.events.on_submission_start();
        let outcome = self
            .service
            .reformat(request)
            .await
            .map(ReformattedDocument::new)
            .map_err(SubmitError::from);

        match &outcome {
            Ok(doc) => {
                info!("Reformat succeeded ({} bytes)", doc.len());
                self.events.on_submission_complete(doc.len());
            }
            Err(e) => {
                warn!("Reformat failed: {}", e);
                self.events.on_submission_failed(e);
            }
        }

        let result = match &outcome {
            Ok(doc) => SubmissionResult::Success(doc.clone()),
            Err(e) => SubmissionResult::Failure(e.clone()),
        };
        self.lock().result = Some((slots.inputs, result));
        outcome
    }

    /// Phase as seen against `slots`, the slots as they are now.
    pub fn phase(&self, slots: &SlotsSnapshot) -> SubmissionPhase {
        let state = self.lock();
        if state.in_flight {
            return SubmissionPhase::InProgress;
        }
        match state.current_result(slots) {
            Some(SubmissionResult::Success(_)) => SubmissionPhase::Complete,
            Some(SubmissionResult::Failure(_)) => SubmissionPhase::Failed,
            None => SubmissionPhase::Idle,
        }
    }

    /// The stored outcome, if it was computed from exactly these inputs.
    pub fn result(&self, slots: &SlotsSnapshot) -> Option<SubmissionResult> {
        self.lock().current_result(slots).cloned()
    }

    pub fn is_in_flight(&self) -> bool {
        self.lock().in_flight
    }
}
