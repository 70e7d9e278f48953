//! Page-level browser helpers: the page URL, share windows, and the
//! embedded tool configuration.

use cutout_core::ToolConfig;

/// Id of the `<script type="application/json">` element that may carry
/// a [`ToolConfig`] override.
pub const CONFIG_ELEMENT_ID: &str = "cutout-config";

/// The URL of the current page, if there is one.
#[must_use]
pub fn current_page_url() -> Option<String> {
    web_sys::window()?.location().href().ok()
}

/// Open `url` in a new tab without giving it access to this page.
///
/// Popup blockers may refuse; that is logged and otherwise ignored.
pub fn open_share_window(url: &str) {
    let Some(window) = web_sys::window() else {
        return;
    };
    if let Err(e) =
        window.open_with_url_and_target_and_features(url, "_blank", "noopener,noreferrer")
    {
        web_sys::console::warn_1(&format!("share window blocked: {e:?}").into());
    }
}

/// The tool configuration embedded in the page.
///
/// Reads the JSON in the [`CONFIG_ELEMENT_ID`] element. Missing fields
/// take their defaults; a missing element means all defaults. An
/// invalid override is logged and ignored.
#[must_use]
pub fn tool_config() -> ToolConfig {
    let json = web_sys::window()
        .and_then(|w| w.document())
        .and_then(|d| d.get_element_by_id(CONFIG_ELEMENT_ID))
        .and_then(|e| e.text_content());
    let Some(json) = json else {
        return ToolConfig::default();
    };
    ToolConfig::from_json(&json).unwrap_or_else(|e| {
        web_sys::console::warn_1(&format!("ignoring invalid {CONFIG_ELEMENT_ID}: {e}").into());
        ToolConfig::default()
    })
}
