//! `blob:` object URLs as the workflow's [`ReferenceStore`].
//!
//! Every preview and result image is displayed through an object URL
//! created with `URL.createObjectURL` and revoked with
//! `URL.revokeObjectURL` once the workflow lets go of it.

use cutout_core::{Reference, ReferenceStore};
use wasm_bindgen::JsValue;
use web_sys::BlobPropertyBag;

/// Errors from creating a Blob or its object URL.
#[derive(Debug, thiserror::Error)]
pub enum ObjectUrlError {
    /// A browser API call returned an error.
    #[error("browser API error: {0}")]
    JsError(String),
}

impl From<JsValue> for ObjectUrlError {
    fn from(value: JsValue) -> Self {
        Self::JsError(format!("{value:?}"))
    }
}

/// Wrap `bytes` in a `Blob` of type `mime_type`.
///
/// # Errors
///
/// Returns [`ObjectUrlError::JsError`] if the Blob cannot be created.
pub fn bytes_to_blob(bytes: &[u8], mime_type: &str) -> Result<web_sys::Blob, ObjectUrlError> {
    let uint8_array = js_sys::Uint8Array::from(bytes);
    let parts = js_sys::Array::new();
    parts.push(&uint8_array);

    let opts = BlobPropertyBag::new();
    opts.set_type(mime_type);
    Ok(web_sys::Blob::new_with_u8_array_sequence_and_options(
        &parts, &opts,
    )?)
}

/// Create an object URL for `bytes`. Must be revoked when unused.
///
/// # Errors
///
/// Returns [`ObjectUrlError::JsError`] if Blob or URL creation fails.
pub fn create_object_url(bytes: &[u8], mime_type: &str) -> Result<String, ObjectUrlError> {
    let blob = bytes_to_blob(bytes, mime_type)?;
    Ok(web_sys::Url::create_object_url_with_blob(&blob)?)
}

/// A live object URL owned by the workflow.
#[derive(Debug, PartialEq, Eq)]
pub struct BlobUrl {
    url: String,
}

impl Reference for BlobUrl {
    fn uri(&self) -> &str {
        &self.url
    }
}

/// [`ReferenceStore`] backed by `URL.createObjectURL`.
///
/// If the browser refuses to create a URL the failure is logged and
/// the handle carries an empty URI; releasing it does nothing.
#[derive(Debug, Default)]
pub struct BlobUrls {
    live: usize,
}

impl BlobUrls {
    /// A store with no live URLs.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of object URLs created and not yet revoked.
    #[must_use]
    pub const fn live_count(&self) -> usize {
        self.live
    }
}

impl ReferenceStore for BlobUrls {
    type Handle = BlobUrl;

    fn create(&mut self, bytes: &[u8], mime_type: &str) -> BlobUrl {
        match create_object_url(bytes, mime_type) {
            Ok(url) => {
                self.live += 1;
                BlobUrl { url }
            }
            Err(e) => {
                web_sys::console::error_1(&format!("object URL creation failed: {e}").into());
                BlobUrl { url: String::new() }
            }
        }
    }

    fn release(&mut self, handle: BlobUrl) {
        if handle.url.is_empty() {
            return;
        }
        if web_sys::Url::revoke_object_url(&handle.url).is_ok() {
            self.live = self.live.saturating_sub(1);
        }
    }
}
