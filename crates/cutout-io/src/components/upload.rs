//! File upload zone with drag-and-drop and file picker.

use cutout_core::{SourceFile, UploadGate, describe_file, format_byte_limit};
use dioxus::html::{FileData, HasFileData};
use dioxus::prelude::*;
use dioxus_free_icons::Icon;
use dioxus_free_icons::icons::ld_icons::LdUpload;

/// Props for the [`FileUpload`] component.
#[derive(Props, Clone, PartialEq)]
pub struct FileUploadProps {
    /// Size and type constraints applied to the chosen file.
    gate: UploadGate,
    /// Called with the file once it has passed the gate.
    on_accept: EventHandler<SourceFile>,
}

/// A drag-and-drop zone with a file picker button.
///
/// Only the first file of a selection is considered. Its reported size
/// and type are checked against the gate before any bytes are read; a
/// rejection is shown inline and nothing is forwarded.
#[component]
pub fn FileUpload(props: FileUploadProps) -> Element {
    let mut dragging = use_signal(|| false);
    let mut error = use_signal(|| Option::<String>::None);

    // Shared by the picker (`handle_files`) and drag-and-drop
    // (`handle_drop`) paths.
    let process_files = {
        let gate = props.gate.clone();
        move |files: Vec<FileData>| {
            let gate = gate.clone();
            async move {
                let Some(file) = files.first() else {
                    return;
                };
                let reported_type = file.content_type();
                let descriptor = describe_file(file.name(), file.size(), reported_type.as_deref());
                if let Err(e) = gate.check(&descriptor) {
                    error.set(Some(e.to_string()));
                    return;
                }
                match file.read_bytes().await {
                    Ok(bytes) => {
                        error.set(None);
                        props.on_accept.call(SourceFile::new(descriptor, bytes.to_vec()));
                    }
                    Err(e) => error.set(Some(format!("Failed to read file: {e}"))),
                }
            }
        }
    };

    let handle_files = {
        let process_files = process_files.clone();
        move |evt: FormEvent| {
            let process_files = process_files.clone();
            async move {
                process_files(evt.files()).await;
            }
        }
    };

    let handle_drop = move |evt: DragEvent| {
        let process_files = process_files.clone();
        async move {
            evt.prevent_default();
            dragging.set(false);
            process_files(evt.files()).await;
        }
    };

    let border_class = if dragging() {
        "border-[var(--border-accent)] bg-[var(--surface-active)]"
    } else {
        "border-[var(--border-muted)] bg-[var(--surface)]"
    };
    let accept = props.gate.accepted_types().join(",");
    let limit = format_byte_limit(props.gate.max_file_size());

    rsx! {
        div {
            class: "border-2 border-dashed rounded-lg p-10 text-center transition-colors {border_class}",
            ondragover: move |evt| {
                evt.prevent_default();
                dragging.set(true);
            },
            ondragleave: move |_| {
                dragging.set(false);
            },
            ondrop: handle_drop,

            div { class: "flex justify-center mb-3 text-[var(--muted)]",
                Icon { width: 40, height: 40, icon: LdUpload }
            }

            p { class: "text-[var(--text-secondary)] mb-3",
                "Drop an image here or "
            }

            label {
                class: "inline-block px-4 py-2 bg-[var(--btn-primary)] hover:bg-[var(--btn-primary-hover)] rounded cursor-pointer text-white font-medium transition-colors",
                input {
                    r#type: "file",
                    accept: "{accept}",
                    class: "hidden",
                    onchange: handle_files,
                }
                "Choose File"
            }

            p { class: "text-[var(--muted)] text-sm mt-2",
                "JPG, PNG, WEBP up to {limit}"
            }

            if let Some(ref err) = error() {
                p { class: "text-[var(--text-error)] mt-3", role: "alert",
                    "{err}"
                }
            }
        }
    }
}
