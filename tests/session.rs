//! Session-level tests: slot store, step derivation and submission together.
//!
//! The reformat service is mocked; previews use either a stub generator or
//! the real document previewer on in-memory files.

use async_trait::async_trait;
use cv_reformatter::{
    DocumentPreviewer, FilePayload, HtmlExcerpt, NoopEvents, PreviewArtifact, PreviewError,
    PreviewGenerator, PreviewState, ReformatRequest, ReformatService, ReformatSession, ServiceError,
    SlotName, SubmissionResult, SubmitError, WizardStep,
};
use std::io::{Cursor, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tokio_test::{assert_err, assert_ok};

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Records every request and answers with a fixed reply.
struct MockService {
    calls: AtomicUsize,
    reply: Result<String, ServiceError>,
    gate: Option<Arc<Notify>>,
    seen: Mutex<Vec<ReformatRequest>>,
}

impl MockService {
    fn new(reply: Result<String, ServiceError>) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            reply,
            gate: None,
            seen: Mutex::new(Vec::new()),
        })
    }

    fn gated(reply: Result<String, ServiceError>, gate: Arc<Notify>) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            reply,
            gate: Some(gate),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReformatService for MockService {
    async fn reformat(&self, request: ReformatRequest) -> Result<String, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(request);
        if let Some(ref gate) = self.gate {
            gate.notified().await;
        }
        self.reply.clone()
    }
}

/// Answers immediately with the file name as an excerpt.
struct EchoGenerator;

#[async_trait]
impl PreviewGenerator for EchoGenerator {
    async fn generate(&self, payload: &FilePayload) -> Result<PreviewArtifact, PreviewError> {
        Ok(PreviewArtifact::Excerpt(HtmlExcerpt {
            html: format!("<p>{}</p>", payload.name),
            truncated: false,
        }))
    }
}

/// Never finishes: previews stay `Loading` for the whole test.
struct StuckGenerator;

#[async_trait]
impl PreviewGenerator for StuckGenerator {
    async fn generate(&self, _payload: &FilePayload) -> Result<PreviewArtifact, PreviewError> {
        std::future::pending::<Result<PreviewArtifact, PreviewError>>().await
    }
}

fn session_with(service: Arc<MockService>) -> ReformatSession {
    ReformatSession::with_parts(Arc::new(EchoGenerator), service, Arc::new(NoopEvents))
}

fn pdf(name: &str) -> FilePayload {
    FilePayload::new(name, "application/pdf", format!("%PDF-1.4 {name}").into_bytes())
}

fn docx_with_paragraph(text: &str) -> Vec<u8> {
    let xml = format!(
        "<w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\">\
         <w:body><w:p><w:r><w:t>{text}</w:t></w:r></w:p></w:body></w:document>"
    );
    let mut w = zip::ZipWriter::new(Cursor::new(Vec::new()));
    w.start_file("word/document.xml", zip::write::SimpleFileOptions::default())
        .unwrap();
    w.write_all(xml.as_bytes()).unwrap();
    w.finish().unwrap().into_inner()
}

// ── Step derivation ──────────────────────────────────────────────────────────

#[tokio::test]
async fn step_follows_slot_occupancy() {
    let session = session_with(MockService::new(Ok(String::new())));
    assert_eq!(session.step(), WizardStep::UploadCv);

    session.add_file(SlotName::Cv, pdf("cv.pdf"));
    assert_eq!(session.step(), WizardStep::UploadTemplate);

    session.add_file(SlotName::Template, pdf("template.pdf"));
    assert_eq!(session.step(), WizardStep::UploadExample);

    session.add_file(SlotName::Example, pdf("example.pdf"));
    assert_eq!(session.step(), WizardStep::UploadExample);

    // Removing a required file moves back to the first unmet requirement.
    assert!(session.remove_file(SlotName::Cv));
    assert_eq!(session.step(), WizardStep::UploadCv);
    assert!(!session.remove_file(SlotName::Cv));
}

// ── Submission gating ────────────────────────────────────────────────────────

#[tokio::test]
async fn submit_without_template_makes_no_call() {
    let service = MockService::new(Ok("never".into()));
    let session = session_with(service.clone());
    session.add_file(SlotName::Cv, pdf("cv.pdf"));

    let err = assert_err!(session.submit().await);
    assert_eq!(
        err,
        SubmitError::IncompleteInput {
            missing: vec![SlotName::Template]
        }
    );
    assert_eq!(service.calls(), 0);
    assert_eq!(session.step(), WizardStep::UploadTemplate);
    assert!(session.result().is_none());
}

#[tokio::test]
async fn successful_submission_completes_with_exact_text() {
    let body = "# Jane Doe\n\n## Experience\n- Acme, 2019–2024\n";
    let service = MockService::new(Ok(body.to_string()));
    let session = session_with(service.clone());
    session.add_file(SlotName::Cv, pdf("X.pdf"));
    session.add_file(SlotName::Template, pdf("Y.pdf"));

    let doc = assert_ok!(session.submit().await);
    assert_eq!(doc.as_str(), body);
    assert_eq!(session.step(), WizardStep::Complete);
    assert_eq!(session.result(), Some(SubmissionResult::Success(doc)));

    assert_eq!(service.calls(), 1);
    let seen = service.seen.lock().unwrap();
    assert_eq!(seen[0].cv.name, "X.pdf");
    assert_eq!(seen[0].template.name, "Y.pdf");
    assert!(seen[0].example.is_none());
}

#[tokio::test]
async fn failed_submission_returns_to_example_step_with_slots_intact() {
    let service = MockService::new(Err(ServiceError::Status {
        status: 500,
        detail: "An unexpected error occurred. Please try again later.".into(),
    }));
    let session = session_with(service.clone());
    session.add_file(SlotName::Cv, pdf("cv.pdf"));
    session.add_file(SlotName::Template, pdf("template.pdf"));
    let before = session.previews_settled().await;

    let err = assert_err!(session.submit().await);
    assert!(matches!(err, SubmitError::SubmissionFailed { .. }), "got {err:?}");
    assert_eq!(session.step(), WizardStep::UploadExample);

    let after = session.slots();
    for slot in SlotName::ALL {
        assert_eq!(after.payload(slot), before.payload(slot), "{slot} changed");
        assert_eq!(after.preview(slot), before.preview(slot), "{slot} preview changed");
    }

    // Same files can be resubmitted without re-upload.
    assert_err!(session.submit().await);
    assert_eq!(service.calls(), 2);
}

#[tokio::test]
async fn second_submit_while_pending_is_rejected() {
    let gate = Arc::new(Notify::new());
    let service = MockService::gated(Ok("done".into()), gate.clone());
    let session = Arc::new(session_with(service.clone()));
    session.add_file(SlotName::Cv, pdf("cv.pdf"));
    session.add_file(SlotName::Template, pdf("template.pdf"));

    let first = tokio::spawn({
        let session = session.clone();
        async move { session.submit().await }
    });
    while session.step() != WizardStep::Submitting {
        tokio::task::yield_now().await;
    }

    let err = assert_err!(session.submit().await);
    assert_eq!(err, SubmitError::SubmissionInProgress);
    assert_eq!(session.step(), WizardStep::Submitting);

    gate.notify_one();
    let doc = assert_ok!(first.await.unwrap());
    assert_eq!(doc.as_str(), "done");
    assert_eq!(service.calls(), 1);
    assert_eq!(session.step(), WizardStep::Complete);
}

#[tokio::test]
async fn submission_does_not_wait_for_previews() {
    let service = MockService::new(Ok("ok".into()));
    let session = ReformatSession::with_parts(Arc::new(StuckGenerator), service.clone(), Arc::new(NoopEvents));
    session.add_file(SlotName::Cv, pdf("cv.pdf"));
    session.add_file(SlotName::Template, pdf("template.pdf"));
    assert!(session.slots().any_loading());

    assert_ok!(session.submit().await);
    assert_eq!(service.calls(), 1);
}

// ── Result invalidation ──────────────────────────────────────────────────────

#[tokio::test]
async fn slot_mutation_clears_result() {
    let session = session_with(MockService::new(Ok("v1".into())));
    session.add_file(SlotName::Cv, pdf("cv.pdf"));
    session.add_file(SlotName::Template, pdf("template.pdf"));
    assert_ok!(session.submit().await);
    assert_eq!(session.step(), WizardStep::Complete);

    session.add_file(SlotName::Example, pdf("example.pdf"));
    assert!(session.result().is_none());
    assert_eq!(session.step(), WizardStep::UploadExample);
}

#[tokio::test]
async fn removal_clears_failed_result() {
    let session = session_with(MockService::new(Err(ServiceError::Transport("refused".into()))));
    session.add_file(SlotName::Cv, pdf("cv.pdf"));
    session.add_file(SlotName::Template, pdf("template.pdf"));
    assert_err!(session.submit().await);
    assert!(session.result().is_some());

    session.remove_file(SlotName::Template);
    assert!(session.result().is_none());
    assert_eq!(session.step(), WizardStep::UploadTemplate);
}

/// Replies with whether the request carried an example file.
struct ExampleAwareService;

#[async_trait]
impl ReformatService for ExampleAwareService {
    async fn reformat(&self, request: ReformatRequest) -> Result<String, ServiceError> {
        tokio::task::yield_now().await;
        Ok(match request.example {
            Some(_) => "with example".into(),
            None => "without example".into(),
        })
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn result_added_to_during_submit_is_never_current() {
    for _ in 0..2000 {
        let session = Arc::new(ReformatSession::with_parts(
            Arc::new(EchoGenerator),
            Arc::new(ExampleAwareService),
            Arc::new(NoopEvents),
        ));
        session.add_file(SlotName::Cv, pdf("cv.pdf"));
        session.add_file(SlotName::Template, pdf("template.pdf"));

        let submit = tokio::spawn({
            let session = session.clone();
            async move { session.submit().await }
        });
        let add = tokio::spawn({
            let session = session.clone();
            async move { session.add_file(SlotName::Example, pdf("example.pdf")) }
        });
        add.await.unwrap();
        let _ = submit.await.unwrap();

        assert!(session.slots().payload(SlotName::Example).is_some());
        if session.step() == WizardStep::Complete {
            let result = session.result().expect("Complete implies a result");
            assert_eq!(result.document().map(|d| d.as_str()), Some("with example"));
        }
    }
}

#[test]
fn add_file_from_a_thread_without_runtime_context() {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .unwrap();
    let session = {
        let _guard = runtime.enter();
        Arc::new(session_with(MockService::new(Ok("ok".into()))))
    };

    let worker = session.clone();
    std::thread::spawn(move || {
        worker.add_file(SlotName::Cv, pdf("cv.pdf"));
        worker.add_file(SlotName::Template, pdf("template.pdf"));
    })
    .join()
    .unwrap();

    let slots = runtime.block_on(session.previews_settled());
    assert!(matches!(slots.preview(SlotName::Cv), PreviewState::Ready(_)));
    assert_eq!(session.step(), WizardStep::UploadExample);
}

// ── Real previews ────────────────────────────────────────────────────────────

#[tokio::test]
async fn plain_text_preview_fails_but_does_not_block() {
    let service = MockService::new(Ok("ok".into()));
    let session = ReformatSession::with_parts(
        Arc::new(DocumentPreviewer::default()),
        service.clone(),
        Arc::new(NoopEvents),
    );
    session.add_file(SlotName::Cv, FilePayload::new("cv.txt", "text/plain", b"Jane Doe".to_vec()));
    session.add_file(
        SlotName::Template,
        FilePayload::new(
            "template.docx",
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            docx_with_paragraph("Name &amp; Title"),
        ),
    );

    let slots = session.previews_settled().await;
    assert!(matches!(
        slots.preview(SlotName::Cv),
        PreviewState::Failed(PreviewError::UnsupportedFormat { .. })
    ));
    match slots.preview(SlotName::Template) {
        PreviewState::Ready(PreviewArtifact::Excerpt(e)) => {
            assert_eq!(e.html, "<p>Name &amp; Title</p>");
            assert!(!e.truncated);
        }
        other => panic!("expected excerpt, got {other:?}"),
    }

    assert_eq!(session.step(), WizardStep::UploadExample);
    assert_ok!(session.submit().await);
}

#[tokio::test]
async fn add_path_reads_file_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("jane.docx");
    std::fs::write(&path, docx_with_paragraph("Jane")).unwrap();

    let session = session_with(MockService::new(Ok(String::new())));
    assert_ok!(session.add_path(SlotName::Cv, &path).await);
    let slots = session.slots();
    let payload = slots.payload(SlotName::Cv).unwrap();
    assert_eq!(payload.name, "jane.docx");
    assert!(payload.media_type.contains("wordprocessingml"));

    assert_err!(session.add_path(SlotName::Template, dir.path().join("missing.pdf")).await);
    assert_eq!(session.step(), WizardStep::UploadTemplate);
}
