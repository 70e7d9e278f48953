//! Share link construction.
//!
//! Each platform is a URL template with `{url}`, `{text}` and `{title}`
//! placeholders. Values are percent-encoded the same way as
//! `encodeURIComponent`, so the produced links match what a browser
//! would build.

use std::fmt::Write;

use serde::{Deserialize, Serialize};

/// A share target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharePlatform {
    /// Stable identifier (e.g. `"reddit"`).
    pub id: String,
    /// Display name.
    pub name: String,
    /// URL template with `{url}`, `{text}`, `{title}` placeholders.
    pub template: String,
    /// Hidden from the share panel when `false`.
    pub enabled: bool,
}

impl SharePlatform {
    fn builtin(id: &str, name: &str, template: &str) -> Self {
        Self {
            id: id.to_owned(),
            name: name.to_owned(),
            template: template.to_owned(),
            enabled: true,
        }
    }

    /// Fill the template with `data`.
    #[must_use]
    pub fn link(&self, data: &ShareData) -> String {
        build_share_url(&self.template, data)
    }
}

/// The platforms offered by default.
#[must_use]
pub fn default_platforms() -> Vec<SharePlatform> {
    vec![
        SharePlatform::builtin(
            "facebook",
            "Facebook",
            "https://www.facebook.com/sharer/sharer.php?u={url}",
        ),
        SharePlatform::builtin(
            "x",
            "X",
            "https://twitter.com/intent/tweet?text={text}&url={url}",
        ),
        SharePlatform::builtin(
            "reddit",
            "Reddit",
            "https://www.reddit.com/submit?url={url}&title={title}",
        ),
        SharePlatform::builtin("whatsapp", "WhatsApp", "https://wa.me/?text={text}%20{url}"),
        SharePlatform::builtin(
            "telegram",
            "Telegram",
            "https://t.me/share/url?url={url}&text={text}",
        ),
        SharePlatform::builtin(
            "linkedin",
            "LinkedIn",
            "https://www.linkedin.com/sharing/share-offsite/?url={url}",
        ),
        SharePlatform::builtin(
            "pinterest",
            "Pinterest",
            "https://pinterest.com/pin/create/button/?url={url}&description={text}",
        ),
        SharePlatform::builtin("vk", "VK", "https://vk.com/share.php?url={url}"),
    ]
}

/// Values substituted into share templates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareData {
    /// Page URL being shared.
    pub url: String,
    /// Message body.
    pub text: String,
    /// Short title.
    pub title: String,
}

impl ShareData {
    /// Build share data for a page.
    ///
    /// The title is `site_name` with its first underscore removed (site
    /// names use `_` as a line-break marker in headings), and the text is
    /// `"<share_text> — <title>"`.
    #[must_use]
    pub fn new(url: impl Into<String>, site_name: &str, share_text: &str) -> Self {
        let title = site_name.replacen('_', "", 1);
        Self {
            url: url.into(),
            text: format!("{share_text} — {title}"),
            title,
        }
    }
}

/// Substitute every `{url}`, `{text}` and `{title}` in `template`.
#[must_use]
pub fn build_share_url(template: &str, data: &ShareData) -> String {
    template
        .replace("{url}", &encode_component(&data.url))
        .replace("{text}", &encode_component(&data.text))
        .replace("{title}", &encode_component(&data.title))
}

/// Percent-encode like `encodeURIComponent`: everything except ASCII
/// alphanumerics and `-_.!~*'()` is encoded as UTF-8 bytes.
#[must_use]
pub fn encode_component(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        if byte.is_ascii_alphanumeric() || b"-_.!~*'()".contains(&byte) {
            out.push(char::from(byte));
        } else {
            let _ = write!(out, "%{byte:02X}");
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data() -> ShareData {
        ShareData::new(
            "https://example.com/tool?a=1&b=2",
            "Background Remover_Pro",
            "Remove backgrounds for free",
        )
    }

    #[test]
    fn encodes_like_encode_uri_component() {
        assert_eq!(encode_component("a b&c=d/e?"), "a%20b%26c%3Dd%2Fe%3F");
        assert_eq!(encode_component("keep-_.!~*'()"), "keep-_.!~*'()");
        assert_eq!(encode_component("—"), "%E2%80%94");
        assert_eq!(encode_component(""), "");
    }

    #[test]
    fn share_data_derives_title_and_text() {
        let data = data();
        assert_eq!(data.title, "Background RemoverPro");
        assert_eq!(data.text, "Remove backgrounds for free — Background RemoverPro");
    }

    #[test]
    fn template_placeholders_are_all_replaced() {
        let url = build_share_url("https://x.test/?u={url}&t={text}&h={title}&again={url}", &data());
        assert!(!url.contains('{'));
        assert_eq!(
            url.matches("https%3A%2F%2Fexample.com%2Ftool%3Fa%3D1%26b%3D2").count(),
            2
        );
        assert!(url.contains("h=Background%20RemoverPro"));
    }

    #[test]
    fn reddit_link() {
        let reddit = default_platforms()
            .into_iter()
            .find(|p| p.id == "reddit")
            .unwrap_or_else(|| SharePlatform::builtin("", "", ""));
        let data = ShareData::new("https://a.io", "Tool", "Hi");
        assert_eq!(
            reddit.link(&data),
            "https://www.reddit.com/submit?url=https%3A%2F%2Fa.io&title=Tool"
        );
    }

    #[test]
    fn defaults_are_unique_and_enabled() {
        let platforms = default_platforms();
        assert_eq!(platforms.len(), 8);
        let mut ids: Vec<_> = platforms.iter().map(|p| p.id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 8);
        assert!(platforms.iter().all(|p| p.enabled));
    }
}
