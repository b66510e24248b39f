//! Upload slots, the payloads they hold, and their preview state.
//!
//! There are exactly three slots and they are fixed at compile time. A slot's
//! preview is one tagged variant instead of separate loading/error/preview
//! flags, so "loading and failed at once" cannot be expressed.

use crate::error::{PreviewError, ReformatError};
use crate::format::guess_media_type;
use crate::preview::PreviewArtifact;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

/// One of the three named upload positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotName {
    Cv,
    Template,
    Example,
}

impl SlotName {
    pub const ALL: [SlotName; 3] = [SlotName::Cv, SlotName::Template, SlotName::Example];

    /// The multipart field name and the wire identifier of the slot.
    pub fn as_str(self) -> &'static str {
        match self {
            SlotName::Cv => "cv",
            SlotName::Template => "template",
            SlotName::Example => "example",
        }
    }

    /// Whether submission needs this slot filled.
    pub fn is_required(self) -> bool {
        !matches!(self, SlotName::Example)
    }

    pub(crate) fn index(self) -> usize {
        match self {
            SlotName::Cv => 0,
            SlotName::Template => 1,
            SlotName::Example => 2,
        }
    }
}

impl fmt::Display for SlotName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SlotName {
    type Err = ReformatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cv" => Ok(SlotName::Cv),
            "template" => Ok(SlotName::Template),
            "example" => Ok(SlotName::Example),
            other => Err(ReformatError::UnknownSlot {
                name: other.to_string(),
            }),
        }
    }
}

/// An uploaded file: owned bytes plus what the picker told us about them.
///
/// The bytes sit behind an `Arc` so the payload can be handed to a preview
/// task and to the submission request without copying.
#[derive(Clone, PartialEq, Eq)]
pub struct FilePayload {
    pub name: String,
    pub media_type: String,
    bytes: Arc<[u8]>,
}

impl FilePayload {
    pub fn new(name: impl Into<String>, media_type: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            media_type: media_type.into(),
            bytes: Arc::from(bytes.into()),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Read a local file, declaring its media type from the extension.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, ReformatError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await.map_err(|e| read_error(path, e))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let media_type = guess_media_type(path);
        debug!("Loaded {} ({} bytes, {})", path.display(), bytes.len(), media_type);
        Ok(Self::new(name, media_type, bytes))
    }
}

fn read_error(path: &Path, e: std::io::Error) -> ReformatError {
    let path: PathBuf = path.to_path_buf();
    match e.kind() {
        std::io::ErrorKind::NotFound => ReformatError::FileNotFound { path },
        std::io::ErrorKind::PermissionDenied => ReformatError::PermissionDenied { path },
        _ => ReformatError::ReadFailed { path, source: e },
    }
}

impl fmt::Debug for FilePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilePayload")
            .field("name", &self.name)
            .field("media_type", &self.media_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Preview lifecycle of one slot.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum PreviewState {
    /// No file in the slot.
    #[default]
    Absent,
    /// A preview for the current file is being computed.
    Loading,
    Ready(PreviewArtifact),
    Failed(PreviewError),
}

impl PreviewState {
    pub fn is_loading(&self) -> bool {
        matches!(self, PreviewState::Loading)
    }

    /// `Ready` or `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PreviewState::Ready(_) | PreviewState::Failed(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            PreviewState::Absent => "absent",
            PreviewState::Loading => "loading",
            PreviewState::Ready(_) => "ready",
            PreviewState::Failed(_) => "failed",
        }
    }
}
