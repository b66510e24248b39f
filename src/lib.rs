//! # cv-reformatter
//!
//! Core of a CV reformatting wizard: three upload slots with live document
//! previews, a derived wizard step, and a gated submission to a remote
//! reformat service.
//!
//! ## Why this crate?
//!
//! Upload wizards tend to keep "current step", "is loading", "preview" and
//! "error" as independent flags updated from several call sites, and sooner or
//! later the flags disagree. Here each slot carries one tagged preview state,
//! previews are correlated to their slot by a generation counter (a superseded
//! upload's late preview is dropped, whatever order results arrive in), and
//! the step is recomputed from slot occupancy and submission phase.
//!
//! ## Flow
//!
//! ```text
//! add_file(slot, payload)
//!  │
//!  ├─ 1. Store    slot ← payload, preview = Loading, generation += 1
//!  ├─ 2. Preview  background task: PDF page 1 / Word excerpt / first slide
//!  ├─ 3. Apply    result kept only if the slot is still at that generation
//!  └─ 4. Step     derive_step(occupancy, submission phase)
//!
//! submit()
//!  │
//!  ├─ 1. Gate     cv + template present, nothing in flight
//!  ├─ 2. POST     multipart cv / template / example → {"reformattedCV": …}
//!  └─ 3. Result   Success → Complete, Failure → back to UploadExample
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cv_reformatter::{ReformatSession, ReformatterConfig, SlotName};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ReformatterConfig::builder()
//!         .endpoint("http://localhost:5000/api/reformat")
//!         .build()?;
//!     let session = ReformatSession::new(&config)?;
//!
//!     session.add_path(SlotName::Cv, "jane_doe.pdf").await?;
//!     session.add_path(SlotName::Template, "template.docx").await?;
//!     println!("step: {}", session.step());
//!
//!     let document = session.submit().await?;
//!     document.save_to("reformatted_cv.md".as_ref())?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `cvreformat` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! cv-reformatter = { version = "0.1", default-features = false }
//! ```
//!
//! PDF previews need a pdfium shared library at runtime, found on the system
//! library path or at [`ReformatterConfig::pdfium_library`]. Word and
//! presentation previews are pure Rust.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod events;
pub mod export;
pub mod format;
pub mod preview;
pub mod service;
pub mod session;
pub mod slot;
pub mod step;
pub mod store;
pub mod submit;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ReformatterConfig, ReformatterConfigBuilder, DEFAULT_ENDPOINT, DEFAULT_EXPORT_NAME};
pub use error::{PreviewError, ReformatError, ServiceError, SubmitError};
pub use events::{EventSink, NoopEvents, SessionEvents};
pub use format::DocumentFormat;
pub use preview::{
    generate_preview, DocumentPreviewer, HtmlExcerpt, PreviewArtifact, PreviewGenerator, PreviewOptions,
    RenderedImage,
};
pub use service::{HttpReformatService, ReformatRequest, ReformatService};
pub use session::ReformatSession;
pub use slot::{FilePayload, PreviewState, SlotName};
pub use step::{derive_step, SlotOccupancy, SubmissionPhase, WizardStep};
pub use store::{FileSlotStore, SlotView, SlotsSnapshot};
pub use submit::{ReformattedDocument, SubmissionCoordinator, SubmissionResult};
