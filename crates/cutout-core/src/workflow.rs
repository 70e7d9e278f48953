//! The upload → process → result workflow.
//!
//! [`Workflow`] owns the stage machine, the source file, the preview and
//! result references, progress, and the user-facing error for one tool
//! session. It never runs the transformation itself: a run is split
//! into [`start_transform`](Workflow::start_transform), any number of
//! [`report_progress`](Workflow::report_progress) calls, and one
//! [`complete_transform`](Workflow::complete_transform). Between those
//! calls the caller is free to await the transformation, and the user is
//! free to reset or load another file.
//!
//! Each run carries a [`RunId`]. Reset, a new file, and a new run all
//! advance the workflow's generation, so progress and completions from
//! an abandoned run are recognized and dropped.
//!
//! # Stage transitions
//!
//! | From | Event | To |
//! |---|---|---|
//! | any | `accept_file` | `Preview` |
//! | `Preview` | `start_transform` | `Processing` |
//! | `Processing` | success | `Done` |
//! | `Processing` | failure | `Preview` |
//! | any | `reset` | `Idle` |

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::config::ToolConfig;
use crate::progress::ProgressTracker;
use crate::reference::{Reference, ReferenceStore};
use crate::types::{SourceFile, Stage};

/// Encoding requested from the transformation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Lossless PNG with alpha.
    #[default]
    Png,
}

impl OutputFormat {
    /// MIME type of the encoded output.
    #[must_use]
    pub const fn mime_type(self) -> &'static str {
        match self {
            Self::Png => "image/png",
        }
    }

    /// File extension of the encoded output, without the dot.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
        }
    }
}

/// The background-removal computation, seen as a black box.
///
/// Implementations report progress as `(current, total)` unit counts
/// through `progress` while they run. There is no cancellation hook:
/// an abandoned run is simply ignored when it settles.
#[allow(async_fn_in_trait)] // Single-threaded UI; callers never need Send futures
pub trait Transform {
    /// Why the computation failed. Only logged, never shown.
    type Error: fmt::Display;

    /// Transform `input` into an image encoded as `output`.
    async fn run(
        &self,
        input: &[u8],
        output: OutputFormat,
        progress: &mut dyn FnMut(u64, u64),
    ) -> Result<Vec<u8>, Self::Error>;
}

/// Identifies one transformation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RunId(u64);

/// Permission to run one transformation, handed out by
/// [`Workflow::start_transform`].
///
/// Holds the input bytes so the caller can run the transformation
/// without borrowing the workflow.
#[derive(Debug)]
#[must_use = "pass the ticket back to complete_transform"]
pub struct TransformTicket {
    run: RunId,
    input: Rc<[u8]>,
    output: OutputFormat,
}

impl TransformTicket {
    /// The run this ticket belongs to.
    #[must_use]
    pub const fn run(&self) -> RunId {
        self.run
    }

    /// Source bytes to transform.
    #[must_use]
    pub fn input(&self) -> &[u8] {
        &self.input
    }

    /// Requested output encoding.
    #[must_use]
    pub const fn output(&self) -> OutputFormat {
        self.output
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The result was stored and the workflow is `Done`.
    Done,
    /// The transformation failed; the workflow is back in `Preview`
    /// with the generic error message set.
    Failed,
    /// The run was abandoned (reset or new file) before it settled; its
    /// outcome was discarded.
    Discarded,
    /// No run was started because the workflow was not in `Preview`.
    NotStarted,
}

/// Errors from workflow operations that require a particular stage.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkflowError {
    /// Download requested before a result exists.
    #[error("no result to download (stage is {0})")]
    NoResult(Stage),
}

/// A save-as request for the transformed image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download<'a> {
    /// Suggested file name, e.g. `portrait-no-bg.png`.
    pub filename: String,
    /// MIME type of `bytes`.
    pub mime_type: &'static str,
    /// Encoded result image.
    pub bytes: &'a [u8],
}

/// The transformed image and the reference displaying it.
struct Artifact<H> {
    handle: H,
    bytes: Vec<u8>,
    format: OutputFormat,
}

/// State of one background-removal tool session.
///
/// Dropping a workflow releases every reference it still holds.
pub struct Workflow<S: ReferenceStore> {
    store: S,
    failure_message: String,
    download_suffix: String,
    output: OutputFormat,
    stage: Stage,
    source: Option<SourceFile>,
    preview: Option<S::Handle>,
    result: Option<Artifact<S::Handle>>,
    progress: ProgressTracker,
    error: Option<String>,
    generation: u64,
}

impl<S: ReferenceStore> Workflow<S> {
    /// A fresh `Idle` workflow creating references through `store`.
    #[must_use]
    pub fn new(store: S, config: &ToolConfig) -> Self {
        Self {
            store,
            failure_message: config.failure_message.clone(),
            download_suffix: config.download_suffix.clone(),
            output: OutputFormat::default(),
            stage: Stage::Idle,
            source: None,
            preview: None,
            result: None,
            progress: ProgressTracker::new(),
            error: None,
            generation: 0,
        }
    }

    /// Current stage.
    #[must_use]
    pub const fn stage(&self) -> Stage {
        self.stage
    }

    /// The accepted source file, present from `Preview` onward.
    #[must_use]
    pub const fn source(&self) -> Option<&SourceFile> {
        self.source.as_ref()
    }

    /// URI of the source preview.
    #[must_use]
    pub fn preview_uri(&self) -> Option<&str> {
        self.preview.as_ref().map(Reference::uri)
    }

    /// URI of the transformed result, present only in `Done`.
    #[must_use]
    pub fn result_uri(&self) -> Option<&str> {
        self.result.as_ref().map(|a| a.handle.uri())
    }

    /// Encoded result bytes, present only in `Done`.
    #[must_use]
    pub fn result_bytes(&self) -> Option<&[u8]> {
        self.result.as_ref().map(|a| a.bytes.as_slice())
    }

    /// Progress of the current or last run, `0..=100`.
    #[must_use]
    pub const fn progress(&self) -> u8 {
        self.progress.percent()
    }

    /// User-facing error from the last failed run.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// The reference store.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Whether `run` is the run currently in flight.
    #[must_use]
    pub const fn is_current(&self, run: RunId) -> bool {
        matches!(self.stage, Stage::Processing) && run.0 == self.generation
    }

    /// Load a validated file, replacing whatever was loaded before.
    ///
    /// Releases the previous preview and result references, abandons
    /// any run in flight, and moves to `Preview`.
    pub fn accept_file(&mut self, file: SourceFile) {
        self.release_references();
        self.generation += 1;

        let handle = self
            .store
            .create(file.bytes(), &file.descriptor().mime_type);
        tracing::debug!(
            name = %file.descriptor().name,
            size = file.descriptor().size,
            from = %self.stage,
            "file accepted"
        );
        self.preview = Some(handle);
        self.source = Some(file);
        self.error = None;
        self.progress.reset();
        self.stage = Stage::Preview;
    }

    /// Begin a transformation run.
    ///
    /// Returns `None`, changing nothing, unless the workflow is in
    /// `Preview` with a source file. In particular a second call while
    /// `Processing` does not start a second run.
    pub fn start_transform(&mut self) -> Option<TransformTicket> {
        if self.stage != Stage::Preview {
            tracing::debug!(stage = %self.stage, "start ignored");
            return None;
        }
        let input = self.source.as_ref()?.shared_bytes();

        self.generation += 1;
        self.stage = Stage::Processing;
        self.progress.reset();
        self.error = None;
        tracing::debug!(run = self.generation, "transformation started");

        Some(TransformTicket {
            run: RunId(self.generation),
            input,
            output: self.output,
        })
    }

    /// Record a progress report from the transformation of `run`.
    ///
    /// Ignored when `total` is zero, when `run` is no longer current,
    /// or when the report is below the highest percentage seen this
    /// run. Returns `true` when the displayed progress changed.
    pub fn report_progress(&mut self, run: RunId, current: u64, total: u64) -> bool {
        if !self.is_current(run) {
            return false;
        }
        self.progress.report(current, total)
    }

    /// Settle the run `ticket` was issued for.
    ///
    /// On success the output becomes the result reference and the
    /// workflow moves to `Done`. On failure the cause is logged, the
    /// generic failure message is set, and the workflow returns to
    /// `Preview` keeping its preview. If the run was abandoned the
    /// outcome is dropped and nothing changes.
    pub fn complete_transform<E: fmt::Display>(
        &mut self,
        ticket: TransformTicket,
        outcome: Result<Vec<u8>, E>,
    ) -> RunOutcome {
        if !self.is_current(ticket.run) {
            tracing::debug!(run = ticket.run.0, current = self.generation, "stale completion discarded");
            return RunOutcome::Discarded;
        }

        match outcome {
            Ok(bytes) => {
                let handle = self.store.create(&bytes, ticket.output.mime_type());
                self.result = Some(Artifact {
                    handle,
                    bytes,
                    format: ticket.output,
                });
                self.progress.report(1, 1);
                self.stage = Stage::Done;
                tracing::debug!(run = ticket.run.0, "transformation finished");
                RunOutcome::Done
            }
            Err(e) => {
                tracing::warn!(run = ticket.run.0, error = %e, "background removal failed");
                self.error = Some(self.failure_message.clone());
                self.stage = Stage::Preview;
                RunOutcome::Failed
            }
        }
    }

    /// The save-as request for the result.
    ///
    /// The file name is the source base name plus the configured suffix
    /// and the output extension.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::NoResult`] outside `Done`.
    pub fn download(&self) -> Result<Download<'_>, WorkflowError> {
        let (Stage::Done, Some(artifact)) = (self.stage, self.result.as_ref()) else {
            return Err(WorkflowError::NoResult(self.stage));
        };
        let base = self
            .source
            .as_ref()
            .map_or("image", |s| s.descriptor().base_name());
        Ok(Download {
            filename: format!(
                "{base}{}.{}",
                self.download_suffix,
                artifact.format.extension()
            ),
            mime_type: artifact.format.mime_type(),
            bytes: &artifact.bytes,
        })
    }

    /// Return to `Idle`, releasing every held reference.
    ///
    /// A run in flight is abandoned. Calling this in `Idle` does
    /// nothing.
    pub fn reset(&mut self) {
        if self.stage == Stage::Idle {
            return;
        }
        tracing::debug!(from = %self.stage, "reset");
        self.release_references();
        self.generation += 1;
        self.source = None;
        self.error = None;
        self.progress.reset();
        self.stage = Stage::Idle;
    }

    fn release_references(&mut self) {
        if let Some(handle) = self.preview.take() {
            self.store.release(handle);
        }
        if let Some(artifact) = self.result.take() {
            self.store.release(artifact.handle);
        }
    }
}

impl<S: ReferenceStore> Drop for Workflow<S> {
    fn drop(&mut self) {
        self.release_references();
    }
}

impl<S: ReferenceStore> fmt::Debug for Workflow<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Workflow")
            .field("stage", &self.stage)
            .field("source", &self.source.as_ref().map(|s| &s.descriptor().name))
            .field("preview", &self.preview_uri())
            .field("result", &self.result_uri())
            .field("progress", &self.progress.percent())
            .field("error", &self.error)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

/// Run one transformation against a shared workflow.
///
/// Starts the run, awaits `transform` while forwarding its progress,
/// and settles the outcome. The workflow is only borrowed for each
/// individual step, never across the await, so the user can still
/// reset (or load another file) while the transformation runs; the
/// late outcome is then discarded.
#[allow(clippy::future_not_send)] // RefCell: single-threaded by design
pub async fn run_transform<S, T>(workflow: &RefCell<Workflow<S>>, transform: &T) -> RunOutcome
where
    S: ReferenceStore,
    T: Transform,
{
    let Some(ticket) = workflow.borrow_mut().start_transform() else {
        return RunOutcome::NotStarted;
    };
    let run = ticket.run();

    let mut on_progress = |current: u64, total: u64| {
        workflow.borrow_mut().report_progress(run, current, total);
    };
    let outcome = transform
        .run(ticket.input(), ticket.output(), &mut on_progress)
        .await;

    workflow.borrow_mut().complete_transform(ticket, outcome)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::reference::MemoryReferences;
    use crate::types::FileDescriptor;

    fn png(name: &str, size: usize) -> SourceFile {
        SourceFile::new(
            FileDescriptor::new(name, size as u64, "image/png"),
            vec![7u8; size],
        )
    }

    fn workflow() -> Workflow<MemoryReferences> {
        Workflow::new(MemoryReferences::new(), &ToolConfig::default())
    }

    fn assert_invariants(wf: &Workflow<MemoryReferences>) {
        assert_eq!(wf.preview_uri().is_some(), wf.stage().holds_preview(), "{wf:?}");
        assert_eq!(wf.result_uri().is_some(), wf.stage().holds_result(), "{wf:?}");
        let expected_live = usize::from(wf.preview_uri().is_some()) + usize::from(wf.result_uri().is_some());
        assert_eq!(wf.store().live_count(), expected_live, "{wf:?}");
        assert_eq!(wf.store().unknown_release_count(), 0);
    }

    #[test]
    fn new_workflow_is_idle_and_empty() {
        let wf = workflow();
        assert_eq!(wf.stage(), Stage::Idle);
        assert!(wf.source().is_none());
        assert_eq!(wf.progress(), 0);
        assert!(wf.error().is_none());
        assert_invariants(&wf);
    }

    #[test]
    fn accept_creates_preview_from_source_bytes() {
        let mut wf = workflow();
        wf.accept_file(png("a.png", 16));
        assert_eq!(wf.stage(), Stage::Preview);
        let uri = wf.preview_uri().unwrap();
        assert_eq!(wf.store().resolve(uri), Some(("image/png", &[7u8; 16][..])));
        assert_invariants(&wf);
    }

    #[test]
    fn accept_replaces_previous_references() {
        let mut wf = workflow();
        wf.accept_file(png("a.png", 4));
        let ticket = wf.start_transform().unwrap();
        wf.complete_transform::<String>(ticket, Ok(vec![1, 2, 3]));
        assert_eq!(wf.store().live_count(), 2);

        wf.accept_file(png("b.png", 4));
        assert_eq!(wf.stage(), Stage::Preview);
        assert_eq!(wf.store().live_count(), 1);
        assert_eq!(wf.store().released_count(), 2);
        assert_eq!(wf.source().unwrap().descriptor().name, "b.png");
        assert_invariants(&wf);
    }

    #[test]
    fn start_is_ignored_outside_preview() {
        let mut wf = workflow();
        assert!(wf.start_transform().is_none());
        assert_eq!(wf.stage(), Stage::Idle);

        wf.accept_file(png("a.png", 4));
        let ticket = wf.start_transform().unwrap();
        assert!(wf.start_transform().is_none(), "second start while processing");
        assert_eq!(wf.stage(), Stage::Processing);

        wf.complete_transform::<String>(ticket, Ok(vec![0]));
        assert!(wf.start_transform().is_none(), "start from done");
        assert_eq!(wf.stage(), Stage::Done);
    }

    #[test]
    fn second_start_does_not_disturb_progress() {
        let mut wf = workflow();
        wf.accept_file(png("a.png", 4));
        let ticket = wf.start_transform().unwrap();
        wf.report_progress(ticket.run(), 40, 100);
        assert!(wf.start_transform().is_none());
        assert_eq!(wf.progress(), 40);
        assert!(wf.report_progress(ticket.run(), 41, 100));
    }

    #[test]
    fn progress_ignores_zero_total_and_regressions() {
        let mut wf = workflow();
        wf.accept_file(png("a.png", 4));
        let ticket = wf.start_transform().unwrap();
        let run = ticket.run();
        wf.report_progress(run, 50, 100);
        wf.report_progress(run, 3, 0);
        wf.report_progress(run, 10, 100);
        assert_eq!(wf.progress(), 50);
    }

    #[test]
    fn failure_returns_to_preview_and_keeps_preview() {
        let mut wf = workflow();
        wf.accept_file(png("a.png", 4));
        let preview = wf.preview_uri().unwrap().to_owned();
        let ticket = wf.start_transform().unwrap();

        let outcome = wf.complete_transform(ticket, Err("model failed to load"));
        assert_eq!(outcome, RunOutcome::Failed);
        assert_eq!(wf.stage(), Stage::Preview);
        assert_eq!(wf.error(), Some(ToolConfig::DEFAULT_FAILURE_MESSAGE));
        assert_eq!(wf.preview_uri(), Some(preview.as_str()));
        assert_eq!(wf.store().released_count(), 0);
        assert_invariants(&wf);
    }

    #[test]
    fn retry_after_failure_clears_error() {
        let mut wf = workflow();
        wf.accept_file(png("a.png", 4));
        let ticket = wf.start_transform().unwrap();
        wf.complete_transform(ticket, Err("boom"));

        let retry = wf.start_transform().unwrap();
        assert!(wf.error().is_none());
        assert_eq!(wf.progress(), 0);
        assert_eq!(wf.complete_transform::<&str>(retry, Ok(vec![9])), RunOutcome::Done);
        assert_invariants(&wf);
    }

    #[test]
    fn download_requires_done() {
        let mut wf = workflow();
        assert_eq!(wf.download().unwrap_err(), WorkflowError::NoResult(Stage::Idle));
        wf.accept_file(png("holiday.photo.png", 4));
        assert_eq!(wf.download().unwrap_err(), WorkflowError::NoResult(Stage::Preview));

        let ticket = wf.start_transform().unwrap();
        wf.complete_transform::<&str>(ticket, Ok(vec![1, 2]));
        let download = wf.download().unwrap();
        assert_eq!(download.filename, "holiday.photo-no-bg.png");
        assert_eq!(download.mime_type, "image/png");
        assert_eq!(download.bytes, &[1, 2]);
        assert_eq!(wf.stage(), Stage::Done);
    }

    #[test]
    fn download_suffix_comes_from_config() {
        let config = ToolConfig {
            download_suffix: "_cutout".into(),
            ..ToolConfig::default()
        };
        let mut wf = Workflow::new(MemoryReferences::new(), &config);
        wf.accept_file(png("cat.jpeg", 4));
        let ticket = wf.start_transform().unwrap();
        wf.complete_transform::<&str>(ticket, Ok(vec![1]));
        assert_eq!(wf.download().unwrap().filename, "cat_cutout.png");
    }

    #[test]
    fn reset_is_idempotent() {
        let mut wf = workflow();
        wf.reset();
        assert_eq!(wf.stage(), Stage::Idle);
        wf.accept_file(png("a.png", 4));
        wf.reset();
        wf.reset();
        assert_eq!(wf.store().released_count(), 1);
        assert_invariants(&wf);
    }

    #[test]
    fn reset_during_processing_discards_late_success() {
        let mut wf = workflow();
        wf.accept_file(png("a.png", 4));
        let ticket = wf.start_transform().unwrap();
        let run = ticket.run();
        wf.reset();

        assert!(!wf.report_progress(run, 90, 100));
        assert_eq!(wf.complete_transform::<&str>(ticket, Ok(vec![1])), RunOutcome::Discarded);
        assert_eq!(wf.stage(), Stage::Idle);
        assert!(wf.result_uri().is_none());
        assert_eq!(wf.progress(), 0);
        assert_eq!(wf.store().created_count(), 1);
        assert_invariants(&wf);
    }

    #[test]
    fn new_file_during_processing_discards_late_failure() {
        let mut wf = workflow();
        wf.accept_file(png("a.png", 4));
        let ticket = wf.start_transform().unwrap();
        wf.accept_file(png("b.png", 4));

        assert_eq!(wf.complete_transform(ticket, Err("late")), RunOutcome::Discarded);
        assert_eq!(wf.stage(), Stage::Preview);
        assert!(wf.error().is_none());
        assert_invariants(&wf);
    }

    #[test]
    fn old_ticket_cannot_settle_a_newer_run() {
        let mut wf = workflow();
        wf.accept_file(png("a.png", 4));
        let first = wf.start_transform().unwrap();
        wf.reset();
        wf.accept_file(png("a.png", 4));
        let second = wf.start_transform().unwrap();

        assert_eq!(wf.complete_transform::<&str>(first, Ok(vec![1])), RunOutcome::Discarded);
        assert_eq!(wf.stage(), Stage::Processing);
        assert_eq!(wf.complete_transform::<&str>(second, Ok(vec![2])), RunOutcome::Done);
        assert_eq!(wf.result_bytes(), Some(&[2u8][..]));
    }

    #[test]
    fn drop_releases_everything() {
        let mut store = MemoryReferences::new();
        {
            let mut wf = Workflow::new(&mut store, &ToolConfig::default());
            wf.accept_file(png("a.png", 4));
            let ticket = wf.start_transform().unwrap();
            wf.complete_transform::<&str>(ticket, Ok(vec![1]));
        }
        assert_eq!(store.created_count(), 2);
        assert_eq!(store.released_count(), 2);
        assert_eq!(store.live_count(), 0);
    }
}
