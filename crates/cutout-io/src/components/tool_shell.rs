//! The background remover's main panel.
//!
//! Owns the session's [`Workflow`] in a signal and renders one view per
//! stage: the upload zone, the preview with its start button, the
//! progress bar, and the before/after comparison with download.

use std::rc::Rc;

use cutout_core::{
    BorderMatte, MatteConfig, OutputFormat, ReferenceStore, RunOutcome, SourceFile, Stage,
    ToolConfig, Transform, TransformTicket, UploadGate, Workflow,
};
use dioxus::prelude::*;
use dioxus_free_icons::Icon;
use dioxus_free_icons::icons::ld_icons::{LdDownload, LdRotateCcw};

use super::{FileUpload, SharePanel};
use crate::object_url::BlobUrls;
use crate::worker::{RemovalWorker, WorkerAssets, WorkerError};
use crate::{analytics, download};

/// Where the removal runs.
#[derive(Clone)]
enum Remover {
    /// In the dedicated web worker, falling back to the main thread if
    /// the worker turns out not to load.
    Worker(Rc<RemovalWorker>, BorderMatte),
    /// On the main thread, when no worker could be created.
    Inline(BorderMatte),
}

impl Remover {
    fn start(assets: WorkerAssets, matte: MatteConfig) -> Self {
        match RemovalWorker::new(assets, matte) {
            Ok(worker) => Self::Worker(Rc::new(worker), BorderMatte::new(matte)),
            Err(e) => {
                web_sys::console::warn_1(
                    &format!("worker unavailable, removing on the main thread: {e}").into(),
                );
                Self::Inline(BorderMatte::new(matte))
            }
        }
    }

    fn abandon(&self) {
        if let Self::Worker(worker, _) = self {
            worker.abandon();
        }
    }

    #[allow(clippy::future_not_send)] // WASM is single-threaded; Send is not needed
    async fn run(
        &self,
        ticket: &TransformTicket,
        progress: &mut dyn FnMut(u64, u64),
    ) -> Result<Vec<u8>, String> {
        match self {
            Self::Worker(worker, matte) => {
                match worker.run(ticket.input(), ticket.output(), progress).await {
                    Err(WorkerError::Unavailable(reason)) => {
                        web_sys::console::warn_1(
                            &format!("worker unavailable, removing on the main thread: {reason}")
                                .into(),
                        );
                        run_inline(matte, ticket, progress).await
                    }
                    outcome => outcome.map_err(|e| e.to_string()),
                }
            }
            Self::Inline(matte) => run_inline(matte, ticket, progress).await,
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run_inline(
    matte: &BorderMatte,
    ticket: &TransformTicket,
    progress: &mut dyn FnMut(u64, u64),
) -> Result<Vec<u8>, String> {
    // Let the browser paint the processing state before the synchronous
    // work blocks the thread.
    gloo_timers::future::TimeoutFuture::new(0).await;
    matte
        .run(ticket.input(), ticket.output(), progress)
        .await
        .map_err(|e| e.to_string())
}

/// Settle a run, returning the cause only when the workflow counted it
/// as a failure. Runs abandoned by reset or a new file settle quietly.
fn settle<S: ReferenceStore>(
    workflow: &mut Workflow<S>,
    ticket: TransformTicket,
    outcome: Result<Vec<u8>, String>,
) -> Option<String> {
    let cause = outcome.as_ref().err().cloned();
    match workflow.complete_transform(ticket, outcome) {
        RunOutcome::Failed => cause,
        RunOutcome::Done | RunOutcome::Discarded | RunOutcome::NotStarted => None,
    }
}

/// Props for the [`ToolShell`] component.
#[derive(Props, Clone, PartialEq)]
pub struct ToolShellProps {
    /// Upload limits, user-facing text, and matte settings.
    config: ToolConfig,
    /// The embedded removal worker.
    worker: WorkerAssets,
    /// Site name shown in share titles.
    site_name: String,
    /// Message shared alongside the page link.
    share_text: String,
}

/// Upload → preview → processing → result, in one panel.
#[component]
#[allow(clippy::too_many_lines)]
pub fn ToolShell(props: ToolShellProps) -> Element {
    let mut workflow = use_signal(|| Workflow::new(BlobUrls::new(), &props.config));
    let mut download_error = use_signal(|| Option::<String>::None);
    let remover = use_hook(|| Remover::start(props.worker, props.config.matte));
    let gate = UploadGate::new(&props.config);

    {
        let remover = remover.clone();
        use_drop(move || {
            remover.abandon();
            if let Ok(mut wf) = workflow.try_write() {
                wf.reset();
            }
        });
    }

    let on_accept = {
        let remover = remover.clone();
        move |file: SourceFile| {
            remover.abandon();
            download_error.set(None);
            workflow.write().accept_file(file);
        }
    };

    let on_remove = {
        let remover = remover.clone();
        move |_| {
            let Some(ticket) = workflow.write().start_transform() else {
                return;
            };
            analytics::track_removal();
            let remover = remover.clone();
            spawn(async move {
                let run = ticket.run();
                let mut on_progress = move |current: u64, total: u64| {
                    workflow.write().report_progress(run, current, total);
                };
                let outcome = remover.run(&ticket, &mut on_progress).await;
                let failure = settle(&mut *workflow.write(), ticket, outcome);
                if let Some(cause) = failure {
                    web_sys::console::warn_1(&format!("background removal failed: {cause}").into());
                }
            });
        }
    };

    let on_reset = move |_| {
        remover.abandon();
        download_error.set(None);
        workflow.write().reset();
    };

    let on_download = move |_| {
        let saved = {
            let wf = workflow.read();
            wf.download()
                .map_err(|e| e.to_string())
                .and_then(|d| download::save(&d).map_err(|e| e.to_string()))
        };
        match saved {
            Ok(()) => {
                download_error.set(None);
                analytics::track_download(OutputFormat::Png.extension());
            }
            Err(e) => download_error.set(Some(format!("Download failed: {e}"))),
        }
    };

    let (stage, preview, result, progress, error, name) = {
        let wf = workflow.read();
        (
            wf.stage(),
            wf.preview_uri().map(str::to_owned).unwrap_or_default(),
            wf.result_uri().map(str::to_owned).unwrap_or_default(),
            wf.progress(),
            wf.error().map(str::to_owned),
            wf.source()
                .map(|s| s.descriptor().name.clone())
                .unwrap_or_default(),
        )
    };

    let primary = "inline-flex items-center gap-2 px-4 py-2 bg-[var(--btn-primary)] hover:bg-[var(--btn-primary-hover)] rounded text-white font-medium transition-colors cursor-pointer";
    let secondary = "inline-flex items-center gap-2 px-4 py-2 rounded border border-[var(--border)] hover:bg-[var(--surface-active)] transition-colors cursor-pointer";
    let checkerboard = "background-color: #fff; background-image: conic-gradient(#e5e5e5 25%, transparent 0 50%, #e5e5e5 0 75%, transparent 0); background-size: 16px 16px;";

    let body = match stage {
        Stage::Idle => rsx! {
            FileUpload { gate, on_accept }
        },
        Stage::Preview => rsx! {
            div { class: "flex flex-col items-center gap-4",
                img {
                    src: "{preview}",
                    alt: "{name}",
                    class: "max-h-[60vh] w-auto rounded object-contain",
                }
                if let Some(ref err) = error {
                    p { class: "text-[var(--text-error)]", role: "alert", "{err}" }
                }
                div { class: "flex gap-2",
                    button { class: primary, onclick: on_remove, "Remove Background" }
                    button { class: secondary, onclick: on_reset,
                        Icon { width: 16, height: 16, icon: LdRotateCcw }
                        "Choose another"
                    }
                }
            }
        },
        Stage::Processing => rsx! {
            div { class: "flex flex-col items-center gap-4",
                img {
                    src: "{preview}",
                    alt: "{name}",
                    class: "max-h-[60vh] w-auto rounded object-contain opacity-60",
                }
                div {
                    class: "w-full max-w-md h-2 rounded bg-[var(--surface)] overflow-hidden",
                    role: "progressbar",
                    "aria-valuemin": "0",
                    "aria-valuemax": "100",
                    "aria-valuenow": "{progress}",
                    div {
                        class: "h-full bg-[var(--btn-primary)] transition-all",
                        style: "width: {progress}%",
                    }
                }
                p { class: "text-[var(--text-secondary)] text-sm", "Removing background… {progress}%" }
                button { class: secondary, onclick: on_reset, "Cancel" }
            }
        },
        Stage::Done => rsx! {
            div { class: "flex flex-col gap-4",
                div { class: "grid grid-cols-1 md:grid-cols-2 gap-4",
                    figure { class: "flex flex-col items-center gap-1",
                        img { src: "{preview}", alt: "Original", class: "max-h-[50vh] w-auto rounded object-contain" }
                        figcaption { class: "text-sm text-[var(--muted)]", "Original" }
                    }
                    figure { class: "flex flex-col items-center gap-1",
                        img {
                            src: "{result}",
                            alt: "Background removed",
                            class: "max-h-[50vh] w-auto rounded object-contain",
                            style: checkerboard,
                        }
                        figcaption { class: "text-sm text-[var(--muted)]", "Background removed" }
                    }
                }
                if let Some(ref err) = download_error() {
                    p { class: "text-[var(--text-error)] text-sm", role: "alert", "{err}" }
                }
                div { class: "flex justify-center gap-2",
                    button { class: primary, onclick: on_download,
                        Icon { width: 16, height: 16, icon: LdDownload }
                        "Download PNG"
                    }
                    button { class: secondary, onclick: on_reset,
                        Icon { width: 16, height: 16, icon: LdRotateCcw }
                        "Remove another"
                    }
                }
                SharePanel {
                    site_name: props.site_name.clone(),
                    share_text: props.share_text.clone(),
                }
            }
        },
    };

    rsx! {
        section { class: "w-full max-w-4xl mx-auto p-6 rounded-lg bg-[var(--surface)]",
            {body}
        }
    }
}
