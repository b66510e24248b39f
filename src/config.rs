//! Configuration for a reformatting session.
//!
//! All behaviour is controlled through [`ReformatterConfig`], built via its
//! [`ReformatterConfigBuilder`]. Setters clamp values into their useful range;
//! [`ReformatterConfigBuilder::build`] rejects what cannot be clamped (an
//! endpoint that is not an HTTP URL).

use crate::error::ReformatError;
use crate::events::SessionEvents;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Default location of the reformat service.
pub const DEFAULT_ENDPOINT: &str = "http://localhost:5000/api/reformat";

/// Default name for an exported result.
pub const DEFAULT_EXPORT_NAME: &str = "reformatted_cv.md";

/// Configuration for a [`crate::session::ReformatSession`].
///
/// # Example
/// ```rust
/// use cv_reformatter::ReformatterConfig;
///
/// let config = ReformatterConfig::builder()
///     .endpoint("https://cv.example.com/api/reformat")
///     .preview_width(240)
///     .excerpt_chars(800)
///     .build()
///     .unwrap();
/// assert_eq!(config.preview_width, 240);
/// ```
#[derive(Clone)]
pub struct ReformatterConfig {
    /// URL the multipart reformat request is posted to.
    pub endpoint: String,

    /// Timeout for the whole reformat request in seconds. Default: 300.
    ///
    /// The service runs an LLM over three documents; a minute is not unusual.
    pub request_timeout_secs: u64,

    /// Width in pixels of PDF page and slide previews. Range: 32–2000. Default: 200.
    pub preview_width: u32,

    /// Visible-character budget of Word-document excerpts. Default: 500.
    pub excerpt_chars: usize,

    /// Largest decompressed package part read for a preview, in bytes. Default: 32 MiB.
    pub max_part_bytes: u64,

    /// Directory (or full path) of the pdfium library. If None, the system
    /// library search path is used.
    pub pdfium_library: Option<PathBuf>,

    /// Receiver of preview and submission events.
    pub events: Option<Arc<dyn SessionEvents>>,
}

impl Default for ReformatterConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            request_timeout_secs: 300,
            preview_width: 200,
            excerpt_chars: 500,
            max_part_bytes: 32 * 1024 * 1024,
            pdfium_library: None,
            events: None,
        }
    }
}

impl fmt::Debug for ReformatterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReformatterConfig")
            .field("endpoint", &self.endpoint)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("preview_width", &self.preview_width)
            .field("excerpt_chars", &self.excerpt_chars)
            .field("max_part_bytes", &self.max_part_bytes)
            .field("pdfium_library", &self.pdfium_library)
            .field("events", &self.events.as_ref().map(|_| "<dyn SessionEvents>"))
            .finish()
    }
}

impl ReformatterConfig {
    pub fn builder() -> ReformatterConfigBuilder {
        ReformatterConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ReformatterConfig`].
#[derive(Debug)]
pub struct ReformatterConfigBuilder {
    config: ReformatterConfig,
}

impl ReformatterConfigBuilder {
    pub fn endpoint(mut self, url: impl Into<String>) -> Self {
        self.config.endpoint = url.into();
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs.max(1);
        self
    }

    pub fn preview_width(mut self, px: u32) -> Self {
        self.config.preview_width = px.clamp(32, 2000);
        self
    }

    pub fn excerpt_chars(mut self, n: usize) -> Self {
        self.config.excerpt_chars = n.max(1);
        self
    }

    pub fn max_part_bytes(mut self, n: u64) -> Self {
        self.config.max_part_bytes = n.max(1024);
        self
    }

    pub fn pdfium_library(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_library = Some(path.into());
        self
    }

    pub fn events(mut self, events: Arc<dyn SessionEvents>) -> Self {
        self.config.events = Some(events);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ReformatterConfig, ReformatError> {
        let c = &self.config;
        if !is_url(&c.endpoint) {
            return Err(ReformatError::InvalidConfig(format!(
                "endpoint must be an http:// or https:// URL, got '{}'",
                c.endpoint
            )));
        }
        Ok(self.config)
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}
