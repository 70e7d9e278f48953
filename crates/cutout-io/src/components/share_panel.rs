//! Share buttons and copy-link control.

use cutout_core::share::{ShareData, SharePlatform, default_platforms};
use dioxus::prelude::*;
use dioxus_free_icons::Icon;
use dioxus_free_icons::icons::ld_icons::LdLink;

use crate::{clipboard, page};

/// Props for the [`SharePanel`] component.
#[derive(Props, Clone, PartialEq)]
pub struct SharePanelProps {
    /// Site name; the first `_` is dropped for the share title.
    site_name: String,
    /// Message shared alongside the link.
    share_text: String,
    /// Platforms offered. Disabled entries are hidden.
    #[props(default = default_platforms())]
    platforms: Vec<SharePlatform>,
}

/// Links for sharing the current page, plus a copy-link button.
#[component]
pub fn SharePanel(props: SharePanelProps) -> Element {
    let mut copied = use_signal(|| false);

    let Some(page_url) = page::current_page_url() else {
        return rsx! {};
    };
    let data = ShareData::new(page_url.clone(), &props.site_name, &props.share_text);

    let copy_link = move |_| {
        let page_url = page_url.clone();
        async move {
            match clipboard::write_text(&page_url).await {
                Ok(()) => copied.set(true),
                Err(e) => web_sys::console::warn_1(&format!("copy link failed: {e}").into()),
            }
        }
    };

    rsx! {
        div { class: "space-y-2",
            h3 { class: "text-sm font-semibold text-[var(--text-heading)]", "Share this tool" }
            div { class: "flex flex-wrap gap-2",
                for platform in props.platforms.iter().filter(|p| p.enabled) {
                    {render_platform(platform, &data)}
                }
                button {
                    class: "inline-flex items-center gap-1 px-3 py-1 rounded border border-[var(--border)] text-sm cursor-pointer hover:bg-[var(--surface-active)]",
                    onclick: copy_link,
                    Icon { width: 14, height: 14, icon: LdLink }
                    if copied() { "Copied!" } else { "Copy link" }
                }
            }
        }
    }
}

fn render_platform(platform: &SharePlatform, data: &ShareData) -> Element {
    let link = platform.link(data);
    rsx! {
        button {
            key: "{platform.id}",
            class: "px-3 py-1 rounded border border-[var(--border)] text-sm cursor-pointer hover:bg-[var(--surface-active)]",
            aria_label: "Share on {platform.name}",
            onclick: move |_| page::open_share_window(&link),
            "{platform.name}"
        }
    }
}
