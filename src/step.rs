//! Wizard step derivation.
//!
//! The step is never stored. It is recomputed from which slots hold a file
//! and where the submission stands, so it cannot drift ahead of missing data.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stage of the upload/submission workflow, in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum WizardStep {
    UploadCv = 0,
    UploadTemplate = 1,
    UploadExample = 2,
    Submitting = 3,
    Complete = 4,
}

impl WizardStep {
    pub const ALL: [WizardStep; 5] = [
        WizardStep::UploadCv,
        WizardStep::UploadTemplate,
        WizardStep::UploadExample,
        WizardStep::Submitting,
        WizardStep::Complete,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn label(self) -> &'static str {
        match self {
            WizardStep::UploadCv => "Upload CV",
            WizardStep::UploadTemplate => "Upload Template",
            WizardStep::UploadExample => "Upload Example (Optional)",
            WizardStep::Submitting => "Reformat",
            WizardStep::Complete => "Complete",
        }
    }
}

impl fmt::Display for WizardStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Which slots currently hold a payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlotOccupancy {
    pub cv: bool,
    pub template: bool,
    pub example: bool,
}

impl SlotOccupancy {
    pub fn required_present(&self) -> bool {
        self.cv && self.template
    }
}

/// Where the submission stands. `Failed` gathers input again.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionPhase {
    #[default]
    Idle,
    InProgress,
    Complete,
    Failed,
}

/// Derive the current step. Pure: same inputs, same step.
pub fn derive_step(slots: SlotOccupancy, phase: SubmissionPhase) -> WizardStep {
    match phase {
        SubmissionPhase::InProgress => WizardStep::Submitting,
        SubmissionPhase::Complete => WizardStep::Complete,
        SubmissionPhase::Idle | SubmissionPhase::Failed => {
            if !slots.cv {
                WizardStep::UploadCv
            } else if !slots.template {
                WizardStep::UploadTemplate
            } else {
                WizardStep::UploadExample
            }
        }
    }
}
