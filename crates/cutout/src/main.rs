use cutout_io::{ToolShell, WorkerAssets};
use dioxus::prelude::*;

/// Site name; `_` marks where the heading may break.
const SITE_NAME: &str = "Background_Remover";

const SHARE_TEXT: &str = "Remove image backgrounds for free, right in your browser";

/// The removal worker, compiled by the build script. Empty outside
/// `wasm32` builds.
const WORKER: WorkerAssets = WorkerAssets {
    glue: include_str!(env!("WORKER_JS_PATH")),
    wasm: include_bytes!(env!("WORKER_WASM_PATH")),
};

fn main() {
    dioxus::launch(app);
}

/// Root application component.
///
/// Loads the page's tool configuration once and hands it to the
/// [`ToolShell`], which owns the workflow.
fn app() -> Element {
    let config = use_hook(cutout_io::page::tool_config);
    let title = SITE_NAME.replacen('_', " ", 1);

    rsx! {
        style { dangerous_inner_html: include_str!(env!("TAILWIND_CSS_PATH")) }
        style { dangerous_inner_html: include_str!("../assets/theme.css") }

        div { class: "min-h-screen flex flex-col",
            header { class: "px-6 py-4 border-b border-[var(--border)]",
                h1 { class: "text-2xl font-semibold", "{title}" }
                p { class: "text-[var(--muted)] text-sm",
                    "Remove the background from JPG, PNG and WEBP images. Nothing is uploaded."
                }
            }

            main { class: "flex-1 p-6",
                ToolShell {
                    config,
                    worker: WORKER,
                    site_name: SITE_NAME.to_string(),
                    share_text: SHARE_TEXT.to_string(),
                }
            }
        }
    }
}
