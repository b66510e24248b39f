//! The remote reformat call.
//!
//! The coordinator talks to a [`ReformatService`]; [`HttpReformatService`]
//! is the real one, posting the uploads as `multipart/form-data` and reading
//! `{"reformattedCV": "..."}` back. There are no retries: a failed call is
//! reported once and the user resubmits.

use crate::config::ReformatterConfig;
use crate::error::{ReformatError, ServiceError};
use crate::slot::{FilePayload, SlotName};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// The files of one submission. `example` is optional.
#[derive(Debug, Clone)]
pub struct ReformatRequest {
    pub cv: FilePayload,
    pub template: FilePayload,
    pub example: Option<FilePayload>,
}

impl ReformatRequest {
    /// `(slot, payload)` for every file present, in slot order.
    pub fn parts(&self) -> impl Iterator<Item = (SlotName, &FilePayload)> + '_ {
        [
            (SlotName::Cv, Some(&self.cv)),
            (SlotName::Template, Some(&self.template)),
            (SlotName::Example, self.example.as_ref()),
        ]
        .into_iter()
        .filter_map(|(slot, p)| p.map(|p| (slot, p)))
    }
}

/// Something that turns a submission into reformatted text.
#[async_trait]
pub trait ReformatService: Send + Sync {
    async fn reformat(&self, request: ReformatRequest) -> Result<String, ServiceError>;
}

#[derive(Deserialize)]
struct SuccessBody {
    #[serde(rename = "reformattedCV")]
    reformatted_cv: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// HTTP client for the reformat endpoint.
pub struct HttpReformatService {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpReformatService {
    pub fn new(config: &ReformatterConfig) -> Result<Self, ReformatError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ReformatError::HttpClient(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

fn file_part(payload: &FilePayload) -> Part {
    let part = Part::bytes(payload.bytes().to_vec()).file_name(payload.name.clone());
    if payload.media_type.is_empty() {
        return part;
    }
    match part.mime_str(&payload.media_type) {
        Ok(part) => part,
        Err(e) => {
            warn!(
                "Media type '{}' of {} rejected ({}), sending without one",
                payload.media_type, payload.name, e
            );
            Part::bytes(payload.bytes().to_vec()).file_name(payload.name.clone())
        }
    }
}

/// Detail for a non-success response: the JSON `error` field, else the body.
fn error_detail(body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => parsed.error,
        Err(_) if body.trim().is_empty() => "no response body".to_string(),
        Err(_) => body.trim().to_string(),
    }
}

#[async_trait]
impl ReformatService for HttpReformatService {
    async fn reformat(&self, request: ReformatRequest) -> Result<String, ServiceError> {
        let mut form = Form::new();
        for (slot, payload) in request.parts() {
            form = form.part(slot.as_str(), file_part(payload));
        }

        info!(
            "POST {} (cv={}, template={}, example={})",
            self.endpoint,
            request.cv.name,
            request.template.name,
            request.example.as_ref().map(|e| e.name.as_str()).unwrap_or("-")
        );
        let start = Instant::now();

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| ServiceError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ServiceError::Transport(format!("reading response body: {e}")))?;
        debug!(
            "Reformat service answered {} in {}ms ({} bytes)",
            status,
            start.elapsed().as_millis(),
            body.len()
        );

        if !status.is_success() {
            return Err(ServiceError::Status {
                status: status.as_u16(),
                detail: error_detail(&body),
            });
        }

        serde_json::from_str::<SuccessBody>(&body)
            .map(|parsed| parsed.reformatted_cv)
            .map_err(|e| ServiceError::MalformedBody(e.to_string()))
    }
}
